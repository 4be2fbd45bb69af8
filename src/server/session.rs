//! Per-connection session
//!
//! A session registers its socket with the hub, then splits into two halves:
//! the reader (this task) decodes client frames and calls into the hub, the
//! writer (a spawned task) merges replies and hub deliveries onto the socket.
//! The connection is unregistered exactly once, when the reader finishes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::hub::{ConnectionId, Hub, Mailbox};
use crate::server::config::ServerConfig;
use crate::server::protocol::{decode_client_frame, ClientFrame, ServerFrame, WireMessage};

/// Replies queued for the writer before the reader waits
const REPLY_QUEUE_CAPACITY: usize = 64;

/// How long the writer may keep flushing after the reader is done
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of reading one line from the client
enum ReadOutcome {
    Frame(String),
    Eof,
}

/// State of a single client session
pub(crate) struct Session {
    id: ConnectionId,
    peer_addr: SocketAddr,
    config: ServerConfig,
    hub: Arc<Hub>,
}

impl Session {
    /// Register the socket with the hub and run the session to completion
    pub(crate) async fn run(
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: ServerConfig,
        hub: Arc<Hub>,
    ) -> Result<()> {
        let (read_half, mut write_half) = socket.into_split();

        let (id, mailbox) = match hub.register_channel().await {
            Ok(registered) => registered,
            Err(e) => {
                tracing::warn!(peer = %peer_addr, error = %e, "Connection rejected by hub");
                let _ = write_half.write_all(&ServerFrame::error(&e).encode()?).await;
                let _ = write_half.shutdown().await;
                return Err(e.into());
            }
        };

        tracing::debug!(connection_id = %id, peer = %peer_addr, "Session started");

        let session = Session {
            id,
            peer_addr,
            config,
            hub,
        };

        let (reply_tx, reply_rx) = mpsc::channel(REPLY_QUEUE_CAPACITY);
        let _ = reply_tx
            .send(ServerFrame::Welcome { connection_id: id })
            .await;

        let (activity_tx, activity_rx) = watch::channel(());
        let mut writer = tokio::spawn(write_loop(write_half, mailbox, reply_rx, activity_tx));

        let result = session.read_loop(read_half, &reply_tx, activity_rx).await;

        drop(reply_tx);
        session.hub.unregister(session.id).await;

        match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await {
            Ok(Ok(Err(e))) => {
                tracing::debug!(connection_id = %session.id, error = %e, "Writer error");
            }
            Ok(_) => {}
            Err(_) => writer.abort(),
        }

        tracing::debug!(
            connection_id = %session.id,
            peer = %session.peer_addr,
            "Session ended"
        );

        result
    }

    async fn read_loop(
        &self,
        read_half: OwnedReadHalf,
        replies: &mpsc::Sender<ServerFrame>,
        mut activity: watch::Receiver<()>,
    ) -> Result<()> {
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        let idle_timeout = self.config.idle_timeout;

        loop {
            let read = {
                let next_line = read_line(&mut reader, &mut line, self.config.max_frame_len);
                tokio::pin!(next_line);
                let idle = tokio::time::sleep(idle_timeout);
                tokio::pin!(idle);

                loop {
                    tokio::select! {
                        read = &mut next_line => break Some(read),
                        _ = &mut idle => break None,
                        // Deliveries written to the client count as activity
                        changed = activity.changed() => {
                            if changed.is_err() {
                                return Ok(());
                            }
                            idle.as_mut().reset(Instant::now() + idle_timeout);
                        }
                        // Writer exits once the hub pruned this connection
                        _ = replies.closed() => return Ok(()),
                    }
                }
            };

            let text = match read {
                None => {
                    tracing::debug!(connection_id = %self.id, "Idle timeout");
                    return Ok(());
                }
                Some(Ok(ReadOutcome::Eof)) => return Ok(()),
                Some(Ok(ReadOutcome::Frame(text))) => text,
                Some(Err(e @ Error::FrameTooLarge { .. })) => {
                    let _ = replies.send(ServerFrame::error(&e)).await;
                    return Err(e);
                }
                Some(Err(e)) => return Err(e),
            };

            if text.trim().is_empty() {
                continue;
            }

            let frames = match decode_client_frame(&text) {
                Ok(frame) => self.handle_frame(frame).await,
                Err(e) => vec![ServerFrame::error(e)],
            };

            for frame in frames {
                if replies.send(frame).await.is_err() {
                    return Ok(());
                }
            }
        }
    }

    /// Apply a client frame to the hub and build the replies
    async fn handle_frame(&self, frame: ClientFrame) -> Vec<ServerFrame> {
        match frame {
            ClientFrame::Join { room } => {
                let name = match self.hub.room_name(&room) {
                    Ok(name) => name,
                    Err(e) => return vec![ServerFrame::error(e)],
                };
                let replay = match self
                    .hub
                    .join_with_replay(name.as_str(), self.id, self.config.history_replay)
                    .await
                {
                    Ok((_, replay)) => replay,
                    Err(e) => return vec![ServerFrame::error(e)],
                };

                let mut frames = vec![ServerFrame::Joined { room: name }];
                frames.extend(
                    replay
                        .iter()
                        .map(|m| ServerFrame::Message(WireMessage::from(m.as_ref()))),
                );
                frames
            }
            ClientFrame::Leave { room } => match self.hub.room_name(&room) {
                Ok(name) => {
                    self.hub.leave(name.as_str(), self.id).await;
                    vec![ServerFrame::Left { room: name }]
                }
                Err(e) => vec![ServerFrame::error(e)],
            },
            ClientFrame::Publish { room, payload } => {
                match self.hub.broadcast(payload, room.as_deref()).await {
                    Ok(report) => vec![ServerFrame::Published(report)],
                    Err(e) => vec![ServerFrame::error(e)],
                }
            }
            ClientFrame::History { room, limit } => {
                let limit = limit.min(self.hub.config().history_capacity);
                let messages = match room {
                    Some(room) => self.hub.recent_in_room(&room, limit).await,
                    None => self.hub.recent(limit).await,
                };
                vec![ServerFrame::History {
                    messages: messages
                        .iter()
                        .map(|m| WireMessage::from(m.as_ref()))
                        .collect(),
                }]
            }
            ClientFrame::Status => vec![ServerFrame::Status(self.hub.status().await)],
            ClientFrame::Ping => vec![ServerFrame::Pong],
        }
    }
}

/// Read one newline-terminated line of at most `max_len` bytes
async fn read_line(
    reader: &mut BufReader<OwnedReadHalf>,
    line: &mut String,
    max_len: usize,
) -> Result<ReadOutcome> {
    line.clear();

    // One extra byte leaves room for the terminating newline
    let mut limited = (&mut *reader).take(max_len as u64 + 1);
    let n = limited.read_line(line).await?;

    if n == 0 {
        return Ok(ReadOutcome::Eof);
    }
    if !line.ends_with('\n') && line.len() > max_len {
        return Err(Error::FrameTooLarge { limit: max_len });
    }

    Ok(ReadOutcome::Frame(std::mem::take(line)))
}

/// Write replies and hub deliveries until either source closes
///
/// Signals `activity` after each hub delivery reaches the socket.
async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut mailbox: Mailbox,
    mut replies: mpsc::Receiver<ServerFrame>,
    activity: watch::Sender<()>,
) -> Result<()> {
    loop {
        let (frame, delivered) = tokio::select! {
            biased;
            reply = replies.recv() => match reply {
                Some(frame) => (frame, false),
                None => break,
            },
            message = mailbox.recv() => match message {
                Some(message) => (ServerFrame::Message(WireMessage::from(message.as_ref())), true),
                None => break,
            },
        };

        writer.write_all(&frame.encode()?).await?;
        if delivered {
            activity.send_replace(());
        }
    }

    let _ = writer.shutdown().await;
    Ok(())
}
