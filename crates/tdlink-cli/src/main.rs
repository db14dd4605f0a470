//! # tdlink
//!
//! Command-line client for a team messaging event session: ping the server,
//! stream events as JSON lines, wait for one event, or send one.

#![deny(unsafe_code)]

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tdlink_core::logging::{LogFormat, init_subscriber};
use tdlink_session::{Session, SessionConfig};
use tdlink_settings::TdlinkSettings;
use tdlink_settings::loader::{load_settings, load_settings_from_path};
use tracing::info;

/// tdlink event session client.
#[derive(Parser, Debug)]
#[command(name = "tdlink", about = "Event session client for team messaging servers")]
struct Cli {
    /// Settings file (defaults to `~/.tdlink/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Full messaging WebSocket URL; overrides `--server` and `--team`.
    #[arg(long, global = true)]
    url: Option<String>,

    /// Server base URL (`http`, `https`, `ws` or `wss`).
    #[arg(long, global = true)]
    server: Option<String>,

    /// Team name used to build the messaging path.
    #[arg(long, global = true)]
    team: Option<String>,

    /// Access token sent in the handshake.
    #[arg(long, global = true)]
    token: Option<String>,

    /// Extra handshake header, `name=value`. Repeatable.
    #[arg(long = "header", global = true, value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Raise log verbosity (`-v` debug, `-vv` trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log JSON lines instead of compact text.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Round-trip `client.ping` and report latency.
    Ping {
        /// Number of pings.
        #[arg(long, default_value_t = 1)]
        count: u32,
        /// Pause between pings.
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
    /// Print inbound events as JSON lines.
    Listen {
        /// Only this kind (all kinds when omitted).
        #[arg(long)]
        kind: Option<String>,
        /// Stop after this many events.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Wait for one event of a kind and print it.
    Wait {
        /// Kind to wait for.
        #[arg(long)]
        kind: String,
        /// Give up after this long (defaults to the request timeout).
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Send one event.
    Send {
        /// Event kind.
        #[arg(long)]
        kind: String,
        /// Params as a JSON document.
        #[arg(long, default_value = "{}")]
        params: String,
        /// Attach a confirm id and wait for the server to confirm it.
        #[arg(long)]
        confirm: bool,
    },
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_owned(), value.to_owned()))
        }
        _ => Err(format!("expected name=value, got {raw:?}")),
    }
}

impl Cli {
    fn load_settings(&self) -> Result<TdlinkSettings> {
        let mut settings = match &self.settings {
            Some(path) => load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings: {}", path.display()))?,
            None => load_settings().context("Failed to load settings")?,
        };
        self.apply_to(&mut settings);
        Ok(settings)
    }

    /// Command-line flags take precedence over file and environment.
    fn apply_to(&self, settings: &mut TdlinkSettings) {
        let conn = &mut settings.connection;
        if let Some(url) = &self.url {
            conn.url = Some(url.clone());
        }
        if let Some(server) = &self.server {
            conn.server.clone_from(server);
        }
        if self.team.is_some() {
            conn.team.clone_from(&self.team);
        }
        if self.token.is_some() {
            conn.token.clone_from(&self.token);
        }
        for (name, value) in &self.headers {
            let _ = conn.headers.insert(name.clone(), value.clone());
        }
        if self.log_json {
            settings.logging.json = true;
        }
    }

    fn log_level<'a>(&self, settings: &'a TdlinkSettings) -> &'a str {
        match self.verbose {
            0 => &settings.logging.level,
            1 => "debug",
            _ => "trace",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;

    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    init_subscriber(cli.log_level(&settings), format);

    let config = SessionConfig::from_settings(&settings).context("Invalid connection settings")?;
    let session = Session::connect(config)
        .await
        .context("Failed to open session")?;

    let outcome = tokio::select! {
        result = commands::run(&session, &cli.command) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            Ok(())
        }
    };

    // Flushes anything still queued before the close frame
    session.close().await;
    outcome
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use clap::CommandFactory;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tdlink").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn ping_defaults() {
        let cli = parse(&["ping"]);
        assert_eq!(
            cli.command,
            Command::Ping {
                count: 1,
                interval_ms: 1000
            }
        );
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = parse(&["listen", "--kind", "server.message", "--team", "ops", "-vv"]);
        assert_eq!(cli.team.as_deref(), Some("ops"));
        assert_eq!(cli.verbose, 2);
        assert_matches!(cli.command, Command::Listen { kind: Some(ref k), limit: None } if k == "server.message");
    }

    #[test]
    fn send_requires_kind() {
        let err = Cli::try_parse_from(["tdlink", "send"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn header_values_may_contain_equals() {
        assert_eq!(
            parse_header("x-sig=a=b"),
            Ok(("x-sig".to_owned(), "a=b".to_owned()))
        );
        assert!(parse_header("novalue").is_err());
        assert!(parse_header("=v").is_err());
    }

    #[test]
    fn flags_override_settings() {
        let cli = parse(&[
            "--server",
            "https://chat.example.com",
            "--team",
            "ops",
            "--token",
            "t0k",
            "--header",
            "x-client=cli",
            "--log-json",
            "ping",
        ]);
        let mut settings = TdlinkSettings::default();
        settings.connection.team = Some("dev".into());
        cli.apply_to(&mut settings);

        assert_eq!(settings.connection.server, "https://chat.example.com");
        assert_eq!(settings.connection.team.as_deref(), Some("ops"));
        assert_eq!(settings.connection.token.as_deref(), Some("t0k"));
        assert_eq!(settings.connection.headers["x-client"], "cli");
        assert!(settings.logging.json);

        let config = SessionConfig::from_settings(&settings).unwrap();
        assert_eq!(config.url, "wss://chat.example.com/messaging/ops");
    }

    #[test]
    fn unset_flags_keep_settings() {
        let cli = parse(&["ping"]);
        let mut settings = TdlinkSettings::default();
        settings.connection.team = Some("dev".into());
        cli.apply_to(&mut settings);
        assert_eq!(settings.connection.team.as_deref(), Some("dev"));
        assert!(!settings.logging.json);
    }

    #[test]
    fn verbosity_selects_level() {
        let settings = TdlinkSettings::default();
        assert_eq!(parse(&["ping"]).log_level(&settings), "info");
        assert_eq!(parse(&["-v", "ping"]).log_level(&settings), "debug");
        assert_eq!(parse(&["-vvv", "ping"]).log_level(&settings), "trace");
    }
}
