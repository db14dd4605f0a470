//! Subcommand implementations. Each runs against an open session; the
//! caller closes it afterwards.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::Value;
use tdlink_core::Event;
use tdlink_session::{InboundEvent, KindFilter, Session};
use tracing::debug;

use crate::Command;

pub(crate) async fn run(session: &Session, command: &Command) -> Result<()> {
    match command {
        Command::Ping { count, interval_ms } => {
            ping(session, *count, Duration::from_millis(*interval_ms)).await
        }
        Command::Listen { kind, limit } => listen(session, kind.as_deref(), *limit).await,
        Command::Wait { kind, timeout_ms } => {
            let timeout = timeout_ms
                .map_or(session.config().request_timeout, Duration::from_millis);
            let event = session.wait_for(kind, timeout).await?;
            print_event(&event);
            Ok(())
        }
        Command::Send {
            kind,
            params,
            confirm,
        } => send(session, kind, params, *confirm).await,
    }
}

async fn ping(session: &Session, count: u32, interval: Duration) -> Result<()> {
    let timeout = session.config().request_timeout;
    for seq in 0..count {
        if seq > 0 {
            tokio::time::sleep(interval).await;
        }
        let started = Instant::now();
        let id = session
            .ping(timeout)
            .await
            .with_context(|| format!("ping {seq} failed"))?;
        println!(
            "seq={seq} confirm_id={id} time={:.1}ms",
            started.elapsed().as_secs_f64() * 1000.0
        );
    }
    Ok(())
}

async fn listen(session: &Session, kind: Option<&str>, limit: Option<usize>) -> Result<()> {
    let filter = kind.map_or(KindFilter::Any, KindFilter::kind);
    let mut events = session.subscribe(filter)?;
    debug!(listener = ?events.id(), "listening");

    let mut seen = 0_usize;
    while limit.is_none_or(|limit| seen < limit) {
        print_event(&events.recv().await?);
        seen += 1;
    }
    Ok(())
}

async fn send(session: &Session, kind: &str, params: &str, confirm: bool) -> Result<()> {
    let params: Value = serde_json::from_str(params).context("--params is not valid JSON")?;
    let event = Event::new(kind, params);
    if confirm {
        let id = session
            .send_confirmed(event, session.config().request_timeout)
            .await?;
        println!("confirmed {id}");
    } else {
        session.send(&event).await?;
    }
    Ok(())
}

fn print_event(event: &InboundEvent) {
    println!("{}", String::from_utf8_lossy(event.raw()));
}
