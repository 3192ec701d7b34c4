//! TCP transport: accept loop, join handshake, per-connection tasks
//!
//! Each connection gets a reader loop (frames → lobby commands) and a
//! writer task (lobby outbound channel → frames). The first frame must be
//! a Join; the token is verified once, then the identity is opaque. A
//! malformed frame closes only its own connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::backend::TokenVerifier;
use crate::config::ServerConfig;
use crate::lobby::instance::LobbyCommand;
use crate::lobby::manager::LobbyService;
use crate::metrics::Metrics;
use crate::net::framing::{self, FramingError};
use crate::net::protocol::{
    decode_client_message, encode_server_message, ClientMessage, ServerMessage,
};

pub struct Transport {
    listener: TcpListener,
    service: Arc<LobbyService>,
    verifier: Arc<dyn TokenVerifier>,
    metrics: Arc<Metrics>,
}

impl Transport {
    pub async fn bind(
        config: &ServerConfig,
        service: Arc<LobbyService>,
        verifier: Arc<dyn TokenVerifier>,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<Self> {
        let addr = SocketAddr::new(config.bind_address, config.port);
        let listener = TcpListener::bind(addr).await?;
        info!("listening on {}", addr);
        Ok(Self {
            listener,
            service,
            verifier,
            metrics,
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            debug!(%peer, "connection accepted");
            self.metrics.connections_total.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

            let service = self.service.clone();
            let verifier = self.verifier.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer, service, verifier).await {
                    debug!(%peer, "connection ended: {e}");
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    service: Arc<LobbyService>,
    verifier: Arc<dyn TokenVerifier>,
) -> anyhow::Result<()> {
    let (mut reader, mut writer) = stream.into_split();

    // Handshake: the first frame must be a Join
    let first = framing::read_message(&mut reader).await?;
    let (token, name, class) = match decode_client_message(&first) {
        Ok(ClientMessage::Join { token, name, class }) => (token, name, class),
        Ok(_) => {
            warn!(%peer, "first message was not a join, dropping");
            return Ok(());
        }
        Err(e) => {
            warn!(%peer, "malformed join frame: {e}");
            return Ok(());
        }
    };

    let Some(identity) = verifier.verify_token(&token) else {
        let reject = encode_server_message(&ServerMessage::JoinRejected {
            reason: "invalid token".to_string(),
        })?;
        framing::write_message(&mut writer, &reject).await?;
        return Ok(());
    };

    let ticket = match service.join(identity, name, class).await {
        Ok(ticket) => ticket,
        Err(e) => {
            let reject = encode_server_message(&ServerMessage::JoinRejected {
                reason: e.to_string(),
            })?;
            framing::write_message(&mut writer, &reject).await?;
            return Ok(());
        }
    };
    let session_id = ticket.session_id;
    let mut outbound = ticket.outbound;
    let lobby_tx = ticket.lobby_tx;

    // Writer task: drain the lobby's outbound channel onto the socket
    let writer_task = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            let bytes = match encode_server_message(&msg) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("encode failed, skipping message: {e}");
                    continue;
                }
            };
            if framing::write_message(&mut writer, &bytes).await.is_err() {
                break;
            }
        }
    });

    // Reader loop: frames become commands on the lobby channel the join
    // pinned us to
    read_loop(&mut reader, &lobby_tx, session_id, peer).await;
    let _ = lobby_tx.send(LobbyCommand::Disconnect {
        session: session_id,
    });
    writer_task.abort();
    Ok(())
}

/// Pump frames into the session's lobby until the connection ends
async fn read_loop(
    reader: &mut OwnedReadHalf,
    lobby_tx: &tokio::sync::mpsc::UnboundedSender<LobbyCommand>,
    session_id: crate::net::session::SessionId,
    peer: SocketAddr,
) {
    loop {
        match framing::read_message(reader).await {
            Ok(bytes) => match decode_client_message(&bytes) {
                Ok(message) => {
                    if lobby_tx
                        .send(LobbyCommand::Message {
                            session: session_id,
                            message,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    warn!(%peer, "malformed frame, closing connection: {e}");
                    break;
                }
            },
            Err(FramingError::ConnectionClosed) => break,
            Err(e) => {
                debug!(%peer, "read error: {e}");
                break;
            }
        }
    }
}
