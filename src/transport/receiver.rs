//! TCP Receiver
//!
//! Accepts client and peer connections, applies per-source admission and
//! hands each admitted connection to a concurrency-limited handler service.
//! Each connection carries exactly one request and is closed after the
//! response has been written.
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tower::limit::ConcurrencyLimit;
use tower::{Service, ServiceBuilder, ServiceExt};
use tracing::{debug, warn};

use super::admission::ConnectionLimiter;
use crate::error::{CommandError, MagpieError, Result};
use crate::node::CommandProcessor;
use crate::protocol::{read_frame_bytes, write_file, write_frame, OutboundMessage};

/// Pause after a failed accept, e.g. when out of file descriptors
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// An admitted inbound connection
#[derive(Debug)]
pub struct Connection {
    pub stream: TcpStream,
    pub peer_addr: SocketAddr,
}

/// One request/response cycle per connection
#[derive(Clone)]
pub struct ConnectionHandler {
    processor: Arc<CommandProcessor>,
    io_timeout: Duration,
}

impl ConnectionHandler {
    pub fn new(processor: Arc<CommandProcessor>, io_timeout: Duration) -> Self {
        Self {
            processor,
            io_timeout,
        }
    }

    pub async fn handle(&self, connection: Connection) -> Result<()> {
        let Connection {
            mut stream,
            peer_addr,
        } = connection;

        let payload = match read_frame_bytes(&mut stream, self.io_timeout).await? {
            Some(payload) => payload,
            None => {
                debug!("{} closed without sending a request", peer_addr);
                return Ok(());
            }
        };

        let messages = match String::from_utf8(payload) {
            Ok(request) => {
                debug!("Received from {}: {}", peer_addr, request);
                self.processor.process(&request).await?
            }
            Err(e) => {
                debug!("Undecodable request from {}: {}", peer_addr, e);
                vec![CommandError::MalformedRequest.into()]
            }
        };
        for message in messages {
            match message {
                OutboundMessage::Frame(text) => {
                    debug!("Sending to {}: {}", peer_addr, text);
                    write_frame(&mut stream, &text, self.io_timeout).await?;
                }
                OutboundMessage::File { path, size } => {
                    let sent = write_file(&mut stream, &path, size, self.io_timeout).await?;
                    debug!("Sent {} bytes of {} to {}", sent, path.display(), peer_addr);
                }
            }
        }

        timeout(self.io_timeout, stream.shutdown()).await??;
        Ok(())
    }
}

impl Service<Connection> for ConnectionHandler {
    type Response = ();
    type Error = MagpieError;
    type Future = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, connection: Connection) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move { handler.handle(connection).await })
    }
}

/// Accept loop feeding the bounded handler service
pub struct TcpReceiver {
    listener: TcpListener,
    local_addr: SocketAddr,
    limiter: ConnectionLimiter,
    service: ConcurrencyLimit<ConnectionHandler>,
}

impl TcpReceiver {
    /// Wrap an already bound listener.
    ///
    /// At most `max_workers` handlers run at once; further admitted
    /// connections wait for a slot without being refused.
    pub fn new(
        listener: TcpListener,
        limiter: ConnectionLimiter,
        handler: ConnectionHandler,
        max_workers: usize,
    ) -> Result<Self> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| MagpieError::Transport(format!("Socket creation failed: {}", e)))?;
        let service = ServiceBuilder::new()
            .concurrency_limit(max_workers.max(1))
            .service(handler);

        Ok(Self {
            listener,
            local_addr,
            limiter,
            service,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the accept loop until the task is dropped
    pub async fn run(mut self) {
        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("TCP accept failed: {}", e);
                    sleep(ACCEPT_RETRY_DELAY).await;
                    continue;
                }
            };

            if !self.limiter.admit(peer_addr.ip()) {
                debug!("Dropping {}: connection interval limit", peer_addr);
                drop(stream);
                continue;
            }

            let service = self.service.clone();
            tokio::spawn(async move {
                let connection = Connection { stream, peer_addr };
                if let Err(e) = service.oneshot(connection).await {
                    warn!("Connection from {} failed: {}", peer_addr, e);
                }
            });
        }
    }
}
