//! # Connection Supervisor
//!
//! TCP listener plus one task per accepted connection.
//!
//! Each connection task owns its socket, a scratch read buffer and a [`Session`]. It waits on
//! a socket read, the next chunk in the connection's outbox, and two close signals: the
//! server's force-close and the outbox's overflow. Reads are passed to the session; outbox
//! chunks are written to the socket one write per chunk, in order. When the session closes,
//! whatever is still in the outbox is written before the socket is dropped.
//!
//! The outbox is bounded by `server.outbox_capacity`. A peer that stops reading eventually
//! fills it; the connection is then dropped without draining, even mid-write.
//!
//! ## Shutdown
//! - [`Server::close`] stops accepting and force-closes every connection immediately
//! - [`Server::shutdown`] stops accepting and waits for connections to end on their own, failing
//!   with [`ProtocolError::Timeout`] if they outlast the deadline
//!
//! A second call to either returns [`ProtocolError::ServerClosed`].

use crate::context::ServerContext;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::session::Session;
use crate::transport::outbox::{self, OutboxReceiver};
use crate::utils::timeout::{with_optional_timeout, with_timeout_error};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

pub struct Server {
    ctx: Arc<ServerContext>,
    local_addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    accept: CancellationToken,
    force: CancellationToken,
    tracker: TaskTracker,
    closed: AtomicBool,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .field("connections", &self.tracker.len())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl Server {
    /// Bind the configured listen address.
    pub async fn bind(ctx: Arc<ServerContext>) -> Result<Self> {
        let listener = TcpListener::bind(&ctx.settings.server.address).await?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "Listening");

        Ok(Self {
            ctx,
            local_addr,
            listener: Mutex::new(Some(listener)),
            accept: CancellationToken::new(),
            force: CancellationToken::new(),
            tracker: TaskTracker::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// Number of connection tasks still running.
    pub fn connections(&self) -> usize {
        self.tracker.len()
    }

    /// Accept connections until [`Server::close`] or [`Server::shutdown`] is called.
    ///
    /// The listener is dropped when this returns.
    #[instrument(skip(self), fields(address = %self.local_addr))]
    pub async fn serve(&self) -> Result<()> {
        let listener = self
            .listener
            .lock()
            .map_err(|_| ProtocolError::Custom(constants::ERR_LOCK_POISONED.to_string()))?
            .take()
            .ok_or(ProtocolError::ServerClosed)?;

        loop {
            tokio::select! {
                _ = self.accept.cancelled() => {
                    info!("No longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.ctx.metrics.connection_established();
                        let ctx = Arc::clone(&self.ctx);
                        let force = self.force.child_token();
                        self.tracker.spawn(run_connection(ctx, stream, peer, force));
                    }
                    Err(e) => error!(error = %e, "Error accepting connection"),
                }
            }
        }

        Ok(())
    }

    fn mark_closed(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(ProtocolError::ServerClosed);
        }
        self.accept.cancel();
        self.tracker.close();
        if let Ok(mut listener) = self.listener.lock() {
            listener.take();
        }
        Ok(())
    }

    /// Stop accepting and drop every connection now.
    pub fn close(&self) -> Result<()> {
        self.mark_closed()?;
        self.force.cancel();
        info!(connections = self.tracker.len(), "Server closed");
        Ok(())
    }

    /// Stop accepting and wait up to `timeout` for connections to finish.
    ///
    /// Connections still open at the deadline are force-closed and `Timeout` is returned.
    #[instrument(skip(self))]
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        self.mark_closed()?;
        info!(connections = self.tracker.len(), "Shutting down, waiting for connections");

        let drained = with_timeout_error(
            async {
                self.tracker.wait().await;
                Ok(())
            },
            timeout,
        )
        .await;

        if drained.is_err() {
            warn!(connections = self.tracker.len(), "Shutdown timeout reached, forcing close");
            self.force.cancel();
        } else {
            info!("All connections closed");
        }
        drained
    }
}

#[instrument(skip(ctx, stream, force), fields(peer = %peer))]
async fn run_connection(
    ctx: Arc<ServerContext>,
    stream: TcpStream,
    peer: SocketAddr,
    force: CancellationToken,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "Failed to set TCP_NODELAY");
    }
    let (mut reader, mut writer) = stream.into_split();
    let (outbox, mut rx) = outbox::channel(ctx.settings.server.outbox_capacity);
    let overflow = rx.overflow();
    let mut session = Session::new(Arc::clone(&ctx), outbox, peer);

    let read_timeout = ctx.settings.server.read_timeout;
    let write_timeout = ctx.settings.server.write_timeout;
    let mut buf = vec![0u8; ctx.settings.server.read_buffer_size];

    debug!("Connection opened");
    loop {
        tokio::select! {
            _ = force.cancelled() => {
                debug!("Connection force-closed");
                break;
            }
            _ = overflow.cancelled() => {
                info!("Closing connection with a full outbox");
                break;
            }
            read = with_optional_timeout(
                async { reader.read(&mut buf).await.map_err(ProtocolError::from) },
                read_timeout,
            ) => {
                let n = match read {
                    Ok(0) => {
                        debug!("Peer closed connection");
                        break;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        debug!(error = %e, "Read failed");
                        break;
                    }
                };
                ctx.metrics.bytes_in(n as u64);

                if let Err(e) = session.handle(&mut buf[..n]) {
                    debug!(phase = %session.phase(), error = %e, "Session error");
                }
                if session.is_closed() {
                    drain(&ctx, &mut rx, &mut writer, write_timeout).await;
                    break;
                }
            }
            Some(chunk) = rx.recv() => {
                let written = tokio::select! {
                    _ = force.cancelled() => Err(ProtocolError::ConnectionClosed),
                    _ = overflow.cancelled() => Err(ProtocolError::OutboxFull),
                    written = write_chunk(&ctx, &mut writer, &chunk, write_timeout) => written,
                };
                if let Err(e) = written {
                    debug!(error = %e, "Write failed");
                    break;
                }
            }
        }
    }

    session.close();
    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "Socket shutdown failed");
    }
    ctx.metrics.connection_closed();
    debug!("Connection closed");
}

async fn write_chunk(
    ctx: &ServerContext,
    writer: &mut OwnedWriteHalf,
    chunk: &[u8],
    timeout: Option<Duration>,
) -> Result<()> {
    with_optional_timeout(
        async { writer.write_all(chunk).await.map_err(ProtocolError::from) },
        timeout,
    )
    .await?;
    ctx.metrics.bytes_out(chunk.len() as u64);
    Ok(())
}

/// Write out everything already queued, then refuse more.
async fn drain(
    ctx: &ServerContext,
    rx: &mut OutboxReceiver,
    writer: &mut OwnedWriteHalf,
    timeout: Option<Duration>,
) {
    rx.close();
    while let Some(chunk) = rx.try_recv() {
        if let Err(e) = write_chunk(ctx, writer, &chunk, timeout).await {
            debug!(error = %e, "Write failed while draining");
            return;
        }
    }
}
