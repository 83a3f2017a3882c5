//! TCP transport and inbound server.
//!
//! Each peer gets one persistent connection carrying newline-delimited
//! [`Frame`]s. A post writes one `Post` frame and waits for the matching
//! `Ack` or `Reject`, so posts to the same peer are strictly ordered.
//! Frames longer than [`MAX_FRAME_LEN`] are refused and end the connection.

use crate::config::NodeConfig;
use crate::error::{NetError, Result};
use crate::peer::PeerAddr;
use crate::transport::Transport;
use crate::wire::{Frame, MAX_FRAME_LEN};
use async_trait::async_trait;
use causeway_clock::Message;
use causeway_delivery::SharedEngine;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Connection {
    fn new(stream: TcpStream) -> Self {
        let (read, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer,
        }
    }

    /// Read one line of at most [`MAX_FRAME_LEN`] bytes. `None` on a clean
    /// close.
    async fn read_line(&mut self) -> Result<Option<String>> {
        let mut buf = Vec::new();
        let read = (&mut self.reader)
            .take(MAX_FRAME_LEN as u64 + 1)
            .read_until(b'\n', &mut buf)
            .await?;
        if read == 0 {
            return Ok(None);
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        } else if buf.len() > MAX_FRAME_LEN {
            return Err(NetError::FrameTooLong(MAX_FRAME_LEN));
        }
        String::from_utf8(buf)
            .map(Some)
            .map_err(|e| NetError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    /// Write one frame and read the reply.
    async fn exchange(&mut self, frame: &Frame) -> Result<Frame> {
        self.writer.write_all(&frame.encode()?).await?;
        match self.read_line().await? {
            Some(line) => Frame::decode(&line),
            None => Err(NetError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed the connection",
            ))),
        }
    }
}

type Slot = Arc<tokio::sync::Mutex<Option<Connection>>>;

/// Outbound TCP transport with one lazily dialed connection per peer.
pub struct TcpTransport {
    connect_timeout: Duration,
    request_timeout: Duration,
    connections: parking_lot::Mutex<HashMap<PeerAddr, Slot>>,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            request_timeout: Duration::from_secs(5),
            connections: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Transport using the dial and reply limits of `config`.
    pub fn from_config(config: &NodeConfig) -> Self {
        Self::new(config.connect_timeout).with_request_timeout(config.request_timeout)
    }

    /// Bound on writing a post and reading its reply. A connection that
    /// misses it is dropped.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn slot(&self, peer: &PeerAddr) -> Slot {
        self.connections.lock().entry(*peer).or_default().clone()
    }

    async fn dial(&self, peer: &PeerAddr) -> Result<Connection> {
        let connect = TcpStream::connect(peer.socket_addr());
        let stream = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| NetError::ConnectionFailed {
                peer: peer.to_string(),
                reason: format!("timed out after {:?}", self.connect_timeout),
            })?
            .map_err(|e| NetError::ConnectionFailed {
                peer: peer.to_string(),
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true)?;
        debug!(%peer, "connected");
        Ok(Connection::new(stream))
    }

    /// The outer error is a missed deadline, the inner one a failed
    /// exchange.
    async fn exchange(
        &self,
        peer: &PeerAddr,
        conn: &mut Connection,
        frame: &Frame,
    ) -> Result<Result<Frame>> {
        tokio::time::timeout(self.request_timeout, conn.exchange(frame))
            .await
            .map_err(|_| NetError::SendFailed {
                peer: peer.to_string(),
                reason: format!("no reply within {:?}", self.request_timeout),
            })
    }

    /// Number of peers with an open connection.
    pub fn open_connections(&self) -> usize {
        let slots: Vec<Slot> = self.connections.lock().values().cloned().collect();
        slots
            .iter()
            .filter(|slot| slot.try_lock().map(|c| c.is_some()).unwrap_or(true))
            .count()
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

fn send_failed(peer: &PeerAddr, err: NetError) -> NetError {
    NetError::SendFailed {
        peer: peer.to_string(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl Transport for TcpTransport {
    /// Post over the cached connection, dialing one if there is none.
    ///
    /// A cached connection whose exchange fails is assumed stale: it is
    /// redialed and the post written once more, and the receiver drops the
    /// copy by id if the first write got through. That is the only retry. A
    /// failed fresh dial, a missed reply deadline or a rejection is returned
    /// as is. A connection that fails or misses the deadline is dropped and
    /// the next post dials afresh.
    async fn post(&self, to: &PeerAddr, msg: &Message) -> Result<()> {
        let slot = self.slot(to);
        let mut guard = slot.lock().await;
        let frame = Frame::Post {
            message: msg.clone(),
        };

        let (mut conn, reused) = match guard.take() {
            Some(conn) => (conn, true),
            None => (self.dial(to).await?, false),
        };

        let reply = match self.exchange(to, &mut conn, &frame).await? {
            Ok(reply) => reply,
            Err(err) if reused => {
                debug!(peer = %to, error = %err, "stale connection, redialing");
                conn = self.dial(to).await?;
                self.exchange(to, &mut conn, &frame)
                    .await?
                    .map_err(|e| send_failed(to, e))?
            }
            Err(err) => return Err(send_failed(to, err)),
        };
        *guard = Some(conn);

        match reply {
            Frame::Ack => Ok(()),
            Frame::Reject { reason } => Err(NetError::Rejected {
                peer: to.to_string(),
                reason,
            }),
            Frame::Post { .. } => Err(NetError::SendFailed {
                peer: to.to_string(),
                reason: "unexpected reply frame".to_string(),
            }),
        }
    }
}

/// Accepts peer connections and feeds their posts into a delivery engine.
pub struct TcpServer {
    listener: TcpListener,
}

impl TcpServer {
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever, one task per connection.
    pub async fn serve(self, engine: SharedEngine) -> Result<()> {
        info!(addr = ?self.listener.local_addr().ok(), "listening for peers");
        loop {
            match self.listener.accept().await {
                Ok((stream, remote)) => {
                    let engine = engine.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, remote, engine).await {
                            debug!(%remote, error = %e, "connection closed with error");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    pub fn spawn(self, engine: SharedEngine) -> JoinHandle<Result<()>> {
        tokio::spawn(self.serve(engine))
    }
}

async fn handle_connection(
    stream: TcpStream,
    remote: SocketAddr,
    engine: SharedEngine,
) -> Result<()> {
    trace!(%remote, "peer connected");
    let mut conn = Connection::new(stream);

    loop {
        let line = match conn.read_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(NetError::FrameTooLong(limit)) => {
                warn!(%remote, limit, "oversized frame, closing connection");
                let reply = Frame::Reject {
                    reason: NetError::FrameTooLong(limit).to_string(),
                };
                conn.writer.write_all(&reply.encode()?).await?;
                return Err(NetError::FrameTooLong(limit));
            }
            Err(e) => return Err(e),
        };
        if line.trim().is_empty() {
            continue;
        }
        let reply = match Frame::decode(&line) {
            Ok(Frame::Post { message }) => {
                let id = message.id();
                match engine.submit(message) {
                    Ok(delivered) => {
                        trace!(%remote, %id, delivered, "accepted message");
                        Frame::Ack
                    }
                    Err(e) => {
                        warn!(%remote, %id, error = %e, "rejecting message");
                        Frame::Reject {
                            reason: e.to_string(),
                        }
                    }
                }
            }
            Ok(_) => Frame::Reject {
                reason: "expected a post frame".to_string(),
            },
            Err(e) => {
                warn!(%remote, error = %e, "undecodable frame");
                Frame::Reject {
                    reason: e.to_string(),
                }
            }
        };
        conn.writer.write_all(&reply.encode()?).await?;
    }

    trace!(%remote, "peer disconnected");
    Ok(())
}
