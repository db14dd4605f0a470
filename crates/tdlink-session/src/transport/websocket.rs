//! WebSocket transport over `tokio-tungstenite`.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, trace};

use super::{Connection, Connector, FrameSink, FrameSource};
use crate::errors::TransportError;

/// Close code reported when the peer's close frame carried no status.
const NO_STATUS: u16 = 1005;

/// Opens WebSocket connections with `connect_async`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<Connection, TransportError> {
        let connect_err = |reason: String| TransportError::Connect {
            url: url.to_owned(),
            reason,
        };

        let mut request = url
            .into_client_request()
            .map_err(|e| connect_err(e.to_string()))?;
        for (name, value) in headers {
            let invalid = |reason: String| TransportError::InvalidHeader {
                name: name.clone(),
                reason,
            };
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
            let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
            let _ = request.headers_mut().insert(header_name, header_value);
        }

        let (stream, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| connect_err(e.to_string()))?;
        debug!(url, status = %response.status(), "websocket handshake complete");

        Ok(split_stream(stream))
    }
}

/// Split an established WebSocket stream into a [`Connection`].
///
/// Works for client streams from [`WebSocketConnector`] and for server-side
/// streams from `accept_async`.
pub fn split_stream<S>(stream: WebSocketStream<S>) -> Connection
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, source) = stream.split();
    Connection {
        source: Box::new(WsSource { stream: source }),
        sink: Box::new(WsSink { sink }),
    }
}

struct WsSource<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

#[async_trait]
impl<S> FrameSource for WsSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read_frame(&mut self) -> Result<Bytes, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(data),
                Some(Ok(Message::Text(text))) => return Ok(Bytes::copy_from_slice(text.as_bytes())),
                Some(Ok(Message::Close(frame))) => {
                    return Err(match frame {
                        Some(frame) => TransportError::Closed {
                            code: u16::from(frame.code),
                            reason: frame.reason.as_str().to_owned(),
                        },
                        None => TransportError::Closed {
                            code: NO_STATUS,
                            reason: String::new(),
                        },
                    });
                }
                // Pings are answered by tungstenite itself
                Some(Ok(other)) => trace!(?other, "ignoring control frame"),
                Some(Err(e)) => return Err(map_ws_error(e)),
                None => return Err(TransportError::Dropped),
            }
        }
    }
}

struct WsSink<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

#[async_trait]
impl<S> FrameSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn write_frame(&mut self, frame: Bytes) -> Result<(), TransportError> {
        self.sink
            .send(Message::Binary(frame))
            .await
            .map_err(map_ws_error)
    }

    async fn close_normally(&mut self, reason: &str) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: reason.to_owned().into(),
        };
        self.sink
            .send(Message::Close(Some(frame)))
            .await
            .map_err(map_ws_error)
    }
}

fn map_ws_error(err: WsError) -> TransportError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Dropped,
        other => TransportError::WebSocket(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn closed_errors_map_to_dropped() {
        assert_eq!(map_ws_error(WsError::ConnectionClosed), TransportError::Dropped);
        assert_eq!(map_ws_error(WsError::AlreadyClosed), TransportError::Dropped);
    }

    #[test]
    fn other_errors_keep_message() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = map_ws_error(WsError::Io(io));
        assert_matches!(err, TransportError::WebSocket(msg) if msg.contains("reset by peer"));
    }

    #[tokio::test]
    async fn invalid_header_rejected_before_connecting() {
        let headers = vec![("bad header".to_string(), "v".to_string())];
        let err = WebSocketConnector
            .open("ws://127.0.0.1:9/messaging/t", &headers)
            .await
            .unwrap_err();
        assert_matches!(err, TransportError::InvalidHeader { name, .. } if name == "bad header");
    }

    #[tokio::test]
    async fn invalid_url_is_connect_error() {
        let err = WebSocketConnector.open("not a url", &[]).await.unwrap_err();
        assert_matches!(err, TransportError::Connect { .. });
    }
}
