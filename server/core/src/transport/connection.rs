//! Per-connection handling
//!
//! [`serve_connection`] turns one byte stream into one session: it reads the
//! handshake, spawns a reader task that forwards client events into the
//! session's input channel, and hands a [`WireSink`] over the write half to
//! the [`SessionRuntime`].

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::frame::{write_message, FramedReader};
use super::messages::{ClientEvent, ServerMessage};
use super::{TransportConfig, TransportError, PROTOCOL_VERSION};
use crate::program::{Input, RenderedFrame};
use crate::runtime::{SessionReport, SessionRuntime};
use crate::session::{EndReason, FrameSink, SessionError, SessionHandle, SessionId};

/// [`FrameSink`] that writes [`ServerMessage`]s to a stream
#[derive(Debug)]
pub struct WireSink<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin + Send> WireSink<W> {
    /// Wrap the write half of a connection
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    async fn write(&mut self, msg: &ServerMessage) -> Result<(), SessionError> {
        write_message(&mut self.writer, msg)
            .await
            .map_err(|e| SessionError::Write(e.to_string()))
    }

    async fn close(&mut self, msg: &ServerMessage) -> Result<(), SessionError> {
        self.write(msg).await?;
        self.writer
            .shutdown()
            .await
            .map_err(|e| SessionError::Write(e.to_string()))
    }

    /// Tell the client why it is being turned away, ignoring write errors
    async fn refuse(&mut self, reason: String) {
        if let Err(e) = self.close(&ServerMessage::Rejected { reason }).await {
            debug!(error = %e, "Failed to send rejection");
        }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> FrameSink for WireSink<W> {
    async fn send(&mut self, frame: RenderedFrame) -> Result<(), SessionError> {
        self.write(&ServerMessage::from(&frame)).await
    }

    async fn start(&mut self, id: SessionId, tick_period: Duration) -> Result<(), SessionError> {
        self.write(&ServerMessage::welcome(id, tick_period)).await
    }

    async fn finish(&mut self, reason: EndReason) -> Result<(), SessionError> {
        self.close(&ServerMessage::Goodbye {
            reason: reason.to_string(),
        })
        .await
    }

    async fn reject(&mut self, error: &SessionError) -> Result<(), SessionError> {
        self.close(&ServerMessage::Rejected {
            reason: error.to_string(),
        })
        .await
    }
}

/// Aborts the reader task if the connection future is dropped early
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Serve one connection until its session ends
///
/// # Errors
///
/// Returns a transport error if the handshake is missing, late, or invalid,
/// and [`TransportError::Session`] if the runtime declined the session. In
/// every declined case the client has already been sent a
/// [`ServerMessage::Rejected`] where the stream allowed it.
pub async fn serve_connection<S>(
    stream: S,
    peer: impl Into<String>,
    runtime: &SessionRuntime,
    config: &TransportConfig,
) -> Result<SessionReport, TransportError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let peer = peer.into();
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = FramedReader::new(read_half);
    let mut sink = WireSink::new(write_half);

    let first = tokio::time::timeout(config.handshake_timeout, reader.next::<ClientEvent>())
        .await
        .map_err(|_| TransportError::HandshakeTimeout(config.handshake_timeout))??;

    let terminal = match first {
        Some(ClientEvent::Handshake {
            protocol_version,
            terminal,
        }) if protocol_version == PROTOCOL_VERSION => terminal,
        Some(ClientEvent::Handshake {
            protocol_version, ..
        }) => {
            let err = TransportError::UnsupportedVersion(protocol_version);
            sink.refuse(err.to_string()).await;
            return Err(err);
        }
        Some(other) => {
            let err = TransportError::UnexpectedMessage(format!("{other:?} before handshake"));
            sink.refuse("expected handshake".to_string()).await;
            return Err(err);
        }
        None => return Err(TransportError::ConnectionClosed),
    };

    let (input_tx, input_rx) = mpsc::channel(config.input_capacity);
    let _reader = AbortOnDrop(tokio::spawn(forward_input(reader, input_tx, peer.clone())));

    let report = runtime
        .run(SessionHandle::new(peer, terminal, input_rx, sink))
        .await?;
    Ok(report)
}

/// Decode client events into session input until the client goes away
async fn forward_input<R>(mut reader: FramedReader<R>, input: mpsc::Sender<Input>, peer: String)
where
    R: AsyncRead + Unpin,
{
    loop {
        match reader.next::<ClientEvent>().await {
            Ok(None | Some(ClientEvent::Disconnect)) => {
                debug!(peer = %peer, "Connection closed by peer");
                break;
            }
            Ok(Some(event)) => match event.into_input() {
                Some(event) => {
                    if input.send(event).await.is_err() {
                        break;
                    }
                }
                None => debug!(peer = %peer, "Ignoring repeated handshake"),
            },
            Err(e) => {
                warn!(peer = %peer, error = %e, "Frame decode error");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Frame, FrameCatalog, StylePalette};
    use crate::program::KeyPress;
    use crate::runtime::RuntimeConfig;
    use crate::session::TerminalInfo;
    use std::sync::Arc;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    fn runtime() -> SessionRuntime {
        SessionRuntime::new(
            Arc::new(FrameCatalog::new(vec![Frame::from("<o"), Frame::from("o>")]).unwrap()),
            Arc::new(StylePalette::default()),
            RuntimeConfig::from_fps(10).unwrap().with_seed(7),
        )
        .unwrap()
    }

    fn terminal() -> TerminalInfo {
        TerminalInfo {
            term: "xterm".to_string(),
            cols: 80,
            rows: 24,
        }
    }

    struct Client {
        reader: FramedReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Client {
        async fn send(&mut self, event: ClientEvent) {
            write_message(&mut self.writer, &event).await.unwrap();
        }

        async fn recv(&mut self) -> Option<ServerMessage> {
            self.reader.next().await.unwrap()
        }
    }

    fn connect(
        runtime: &SessionRuntime,
        config: TransportConfig,
    ) -> (Client, JoinHandle<Result<SessionReport, TransportError>>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let runtime = runtime.clone();
        let task = tokio::spawn(async move {
            serve_connection(server, "test-peer", &runtime, &config).await
        });
        let (reader, writer) = tokio::io::split(client);
        (
            Client {
                reader: FramedReader::new(reader),
                writer,
            },
            task,
        )
    }

    fn handshake(terminal: Option<TerminalInfo>) -> ClientEvent {
        ClientEvent::Handshake {
            protocol_version: PROTOCOL_VERSION,
            terminal,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_over_stream() {
        let runtime = runtime();
        let (mut client, task) = connect(&runtime, TransportConfig::default());

        client.send(handshake(Some(terminal()))).await;
        assert!(matches!(
            client.recv().await,
            Some(ServerMessage::Welcome { tick_ms: 100, .. })
        ));
        assert!(matches!(
            client.recv().await,
            Some(ServerMessage::Frame { index: 0, .. })
        ));
        assert!(matches!(
            client.recv().await,
            Some(ServerMessage::Frame { index: 1, .. })
        ));

        client.send(ClientEvent::Key(KeyPress::char('q'))).await;
        let goodbye = loop {
            match client.recv().await {
                Some(ServerMessage::Frame { .. }) => continue,
                other => break other,
            }
        };
        assert_eq!(
            goodbye,
            Some(ServerMessage::Goodbye {
                reason: "quit".to_string()
            })
        );
        assert_eq!(client.recv().await, None);

        let report = task.await.unwrap().unwrap();
        assert_eq!(report.end, EndReason::Quit);
        assert_eq!(report.peer, "test-peer");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_terminal_is_rejected() {
        let runtime = runtime();
        let (mut client, task) = connect(&runtime, TransportConfig::default());

        client.send(handshake(None)).await;
        assert_eq!(
            client.recv().await,
            Some(ServerMessage::Rejected {
                reason: "partty requires an active terminal".to_string()
            })
        );

        let result = task.await.unwrap();
        assert!(matches!(
            result,
            Err(TransportError::Session(SessionError::NoTerminal))
        ));
        assert_eq!(runtime.stats().rejected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_protocol_version_is_rejected() {
        let runtime = runtime();
        let (mut client, task) = connect(&runtime, TransportConfig::default());

        client
            .send(ClientEvent::Handshake {
                protocol_version: 99,
                terminal: Some(terminal()),
            })
            .await;
        assert!(matches!(
            client.recv().await,
            Some(ServerMessage::Rejected { .. })
        ));
        assert!(matches!(
            task.await.unwrap(),
            Err(TransportError::UnsupportedVersion(99))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_before_handshake_is_rejected() {
        let runtime = runtime();
        let (mut client, task) = connect(&runtime, TransportConfig::default());

        client.send(ClientEvent::Key(KeyPress::char('x'))).await;
        assert!(matches!(
            client.recv().await,
            Some(ServerMessage::Rejected { .. })
        ));
        assert!(matches!(
            task.await.unwrap(),
            Err(TransportError::UnexpectedMessage(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_client_times_out() {
        let runtime = runtime();
        let config = TransportConfig {
            handshake_timeout: Duration::from_secs(1),
            ..TransportConfig::default()
        };
        let (_client, task) = connect(&runtime, config);

        assert!(matches!(
            task.await.unwrap(),
            Err(TransportError::HandshakeTimeout(_))
        ));
        assert_eq!(runtime.stats().started, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_disconnect_ends_session() {
        let runtime = runtime();
        let (mut client, task) = connect(&runtime, TransportConfig::default());

        client.send(handshake(Some(terminal()))).await;
        assert!(matches!(
            client.recv().await,
            Some(ServerMessage::Welcome { .. })
        ));
        client.send(ClientEvent::Disconnect).await;

        let report = task.await.unwrap().unwrap();
        assert_eq!(report.end, EndReason::Disconnected);
        assert_eq!(runtime.active_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_interrupt_is_a_quit() {
        let runtime = runtime();
        let (mut client, task) = connect(&runtime, TransportConfig::default());

        client.send(handshake(Some(terminal()))).await;
        client.send(ClientEvent::Interrupt).await;

        let report = task.await.unwrap().unwrap();
        assert_eq!(report.end, EndReason::Quit);
    }
}
