//! tokio TCP driver for the connection state machine.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use decayrng_core::EntropyEngine;

use crate::error::{Result, ServerError};
use crate::session::{Action, BUF_SIZE, Connection, Event, State};

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6666,
        }
    }
}

/// Bound listener plus the single connection slot.
pub struct ProtocolServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    conn: Connection,
}

impl ProtocolServer {
    /// Bind the listening socket.
    pub async fn bind(config: &ServerConfig, engine: Arc<EntropyEngine>) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;
        log::info!("listening on {local_addr}");
        Ok(Self {
            listener,
            local_addr,
            conn: Connection::new(engine),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> State {
        self.conn.state()
    }

    /// Accept and serve clients one at a time, forever.
    pub async fn run(mut self) -> Infallible {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    log::info!("accepted {peer}");
                    self.serve(stream).await;
                }
                Err(e) => {
                    log::warn!("accept failed: {e}");
                    self.conn.dispatch(Event::AcceptFailed);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    async fn serve(&mut self, mut stream: TcpStream) {
        let greeting = self.conn.dispatch(Event::Accept);
        let mut open = self.apply(&mut stream, greeting).await;
        let mut buf = [0u8; BUF_SIZE];

        while open {
            let actions = tokio::select! {
                read = stream.read(&mut buf) => match read {
                    Ok(0) => self.conn.dispatch(Event::PeerClosed),
                    Ok(n) => self.conn.dispatch(Event::Received(&buf[..n])),
                    Err(e) => {
                        log::warn!("receive failed: {e}");
                        self.conn.dispatch(Event::Error)
                    }
                },
                incoming = self.listener.accept() => {
                    match incoming {
                        Ok((extra, peer)) => {
                            if self.conn.dispatch(Event::Accept).contains(&Action::Refuse) {
                                log::warn!("refused {peer}: a client is already connected");
                                drop(extra);
                            }
                        }
                        Err(e) => {
                            log::warn!("accept failed: {e}");
                            self.conn.dispatch(Event::AcceptFailed);
                        }
                    }
                    Vec::new()
                }
            };
            open = self.apply(&mut stream, actions).await;
        }

        self.conn.dispatch(Event::Closed);
    }

    /// Carry out actions in order. Returns `false` once the client is closed.
    async fn apply(&mut self, stream: &mut TcpStream, actions: Vec<Action>) -> bool {
        let mut work: VecDeque<Action> = actions.into();
        while let Some(action) = work.pop_front() {
            match action {
                Action::Send(bytes) => match stream.write_all(&bytes).await {
                    Ok(()) => {
                        work.extend(self.conn.dispatch(Event::Sent(bytes.len())));
                    }
                    Err(e) => {
                        log::warn!("send failed: {e}");
                        work.clear();
                        work.extend(self.conn.dispatch(Event::Error));
                    }
                },
                Action::Close => {
                    if let Err(e) = stream.shutdown().await {
                        log::debug!("shutdown: {e}");
                    }
                    return false;
                }
                // Only produced for a second accept, handled at the call site.
                Action::Refuse => {}
            }
        }
        true
    }
}

/// Bind, then serve forever. Only setup failures return.
pub async fn service(config: &ServerConfig, engine: Arc<EntropyEngine>) -> Result<Infallible> {
    let server = ProtocolServer::bind(config, engine).await?;
    Ok(server.run().await)
}
