use crate::core::DaemonEvent;
use crate::BroadcastMessage;
use encore_proto::protocol::{Broadcast, Command, Message, PROTOCOL_VERSION};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{error, info, warn};

pub fn start_server(
    bind_address: String,
    port: u16,
    event_tx: mpsc::Sender<DaemonEvent>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);

        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind TCP socket {}: {}", addr, e);
                return;
            }
        };

        info!("TCP server listening at {}", addr);

        let mut client_id = 0usize;

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    client_id += 1;
                    let id = client_id;
                    info!("Client {} connected from {}", id, peer);

                    let evt_tx = event_tx.clone();
                    let bcast_rx = broadcast_tx.subscribe();
                    tokio::spawn(async move {
                        handle_client(stream, id, evt_tx, bcast_rx).await;
                        info!("Client {} disconnected", id);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    })
}

async fn handle_client(
    stream: TcpStream,
    client_id: usize,
    event_tx: mpsc::Sender<DaemonEvent>,
    mut broadcast_rx: broadcast::Receiver<BroadcastMessage>,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut tmp = [0u8; 4096];
    let mut read_buf: Vec<u8> = Vec::new();

    let hello = Broadcast::Hello {
        protocol_version: PROTOCOL_VERSION,
    };
    if send(&mut write_half, hello).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            result = read_half.read(&mut tmp) => {
                match result {
                    Ok(0) => {
                        info!("Client {} closed connection", client_id);
                        break;
                    }
                    Ok(n) => {
                        read_buf.extend_from_slice(&tmp[..n]);

                        loop {
                            let frame = match Message::frame_len(&read_buf) {
                                Ok(Some(frame)) => frame,
                                Ok(None) => break,
                                Err(e) => {
                                    warn!("Client {} sent an unusable frame: {}", client_id, e);
                                    let _ = send(&mut write_half, Broadcast::Error { message: e.to_string() }).await;
                                    return;
                                }
                            };
                            let decoded = Message::decode(&read_buf[..frame]);
                            read_buf.drain(..frame);

                            let reply = match decoded {
                                Ok((Message::Command(cmd), _)) => {
                                    info!("Client {} sent command: {:?}", client_id, cmd);
                                    let Some(reply) = run_command(&event_tx, cmd).await else {
                                        warn!("DaemonEvent channel closed");
                                        return;
                                    };
                                    reply
                                }
                                Ok(_) => continue,
                                Err(e) => {
                                    warn!("Client {} sent an invalid message: {}", client_id, e);
                                    Broadcast::Error {
                                        message: format!("invalid message: {}", e),
                                    }
                                }
                            };
                            if send(&mut write_half, reply).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        error!("Read error from client {}: {}", client_id, e);
                        break;
                    }
                }
            }

            msg = broadcast_rx.recv() => {
                let broadcast = match msg {
                    Ok(BroadcastMessage::Notice { session, message }) => Broadcast::Notice { session, message },
                    Ok(BroadcastMessage::Log(message)) => Broadcast::Log { message },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client {} missed {} broadcast messages", client_id, n);
                        continue;
                    }
                    Err(_) => break,
                };
                if send(&mut write_half, broadcast).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn send<W>(writer: &mut W, broadcast: Broadcast) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match Message::Broadcast(broadcast).encode() {
        Ok(encoded) => writer.write_all(&encoded).await,
        Err(e) => {
            error!("Failed to encode broadcast: {}", e);
            Ok(())
        }
    }
}

/// Hand `cmd` to the event loop and wait for its reply line.
async fn run_command(event_tx: &mpsc::Sender<DaemonEvent>, cmd: Command) -> Option<Broadcast> {
    let session = cmd.session().clone();
    let (reply_tx, reply_rx) = oneshot::channel();
    event_tx
        .send(DaemonEvent::ClientCommand {
            cmd,
            reply: reply_tx,
        })
        .await
        .ok()?;

    Some(match reply_rx.await {
        Ok(message) => Broadcast::Reply { session, message },
        Err(_) => Broadcast::Error {
            message: "command dropped before completion".to_string(),
        },
    })
}
