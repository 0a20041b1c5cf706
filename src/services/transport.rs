use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message;

/// Transport-level failures. All of them are transient: the connection is
/// dropped and retried after the backoff.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// One inbound network frame.
///
/// `last` marks the logical end of a message; a message may be spread over
/// several frames and is only decoded once its last frame arrives.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text { data: String, last: bool },
    Binary { data: Vec<u8>, last: bool },
    Close,
}

impl Frame {
    /// A complete single-frame text message
    pub fn text(data: impl Into<String>) -> Self {
        Frame::Text {
            data: data.into(),
            last: true,
        }
    }

    /// A complete single-frame binary message
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Frame::Binary {
            data: data.into(),
            last: true,
        }
    }
}

/// Inbound side of an open connection. Dropping it disposes the connection.
pub type FrameStream = BoxStream<'static, Result<Frame, TransportError>>;

/// Opens duplex connections to the remote authority.
///
/// The remote client only depends on this trait, so tests can script
/// connections without a network.
pub trait Connector: Send + Sync {
    fn connect(&self, endpoint: &str) -> BoxFuture<'static, Result<FrameStream, TransportError>>;
}

/// WebSocket implementation of [`Connector`]
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self, endpoint: &str) -> BoxFuture<'static, Result<FrameStream, TransportError>> {
        let endpoint = endpoint.to_string();

        async move {
            let (socket, response) = tokio_tungstenite::connect_async(endpoint.as_str())
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;

            tracing::debug!(
                "WebSocket handshake with {} completed: HTTP {}",
                endpoint,
                response.status()
            );

            // tungstenite reassembles continuation frames itself, so every
            // data message surfaces here as one complete frame
            let frames = socket.filter_map(|message| async move {
                match message {
                    Ok(Message::Text(data)) => Some(Ok(Frame::Text { data, last: true })),
                    Ok(Message::Binary(data)) => Some(Ok(Frame::Binary { data, last: true })),
                    Ok(Message::Close(_)) => Some(Ok(Frame::Close)),
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => None,
                    Err(e) => Some(Err(TransportError::Protocol(e.to_string()))),
                }
            });

            Ok(frames.boxed())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_constructors_are_complete() {
        assert_eq!(
            Frame::text("{}"),
            Frame::Text {
                data: "{}".to_string(),
                last: true
            }
        );
        assert!(matches!(Frame::binary(vec![1, 2]), Frame::Binary { last: true, .. }));
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_endpoint_fails() {
        // Port 9 on localhost is not expected to run a WebSocket server
        let connector = WebSocketConnector::new();
        let result = connector.connect("ws://127.0.0.1:9/config").await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}
