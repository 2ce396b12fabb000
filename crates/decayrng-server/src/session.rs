//! Connection state machine.
//!
//! Transport-agnostic: the driver feeds [`Event`]s in and carries out the
//! returned [`Action`]s. There is exactly one [`Connection`] per server, so at
//! most one client is served at a time.
//!
//! ```text
//! Listening --Accept--> Accepted --greeting issued--> Serving
//!     ^                                                 |  ^
//!     |                                           Sent  |  | (counts acked bytes)
//!     |                                                 v  |
//!     +------------Closed------------ Closing <--end / bad stride / error / EOF
//! ```

use std::sync::Arc;

use decayrng_core::EntropyEngine;

use crate::protocol::{self, Command, GREETING, STRIDE, StrideReader};

/// Send and receive buffer size.
pub const BUF_SIZE: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No client attached.
    Listening,
    /// Client attached, greeting not yet issued. Transient: accepting a
    /// client issues the greeting in the same dispatch.
    Accepted,
    /// Handling commands.
    Serving,
    /// Client handle being released.
    Closing,
}

/// Something the transport observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    /// A client connected.
    Accept,
    /// The listener reported a failed accept.
    AcceptFailed,
    /// Bytes arrived from the client.
    Received(&'a [u8]),
    /// The transport finished writing this many bytes.
    Sent(usize),
    /// The client closed its side.
    PeerClosed,
    /// The transport failed on the client connection.
    Error,
    /// The driver released the client handle.
    Closed,
}

/// Something the transport must do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write these bytes to the current client.
    Send(Vec<u8>),
    /// Close the current client.
    Close,
    /// Close the connection that was just accepted; keep the current one.
    Refuse,
}

/// Per-connection buffers and byte counters.
pub struct ConnectionContext {
    send: Box<[u8; BUF_SIZE]>,
    recv: Box<[u8; BUF_SIZE]>,
    to_send_len: usize,
    sent_len: usize,
    recv_len: usize,
}

impl ConnectionContext {
    fn new() -> Self {
        Self {
            send: Box::new([0; BUF_SIZE]),
            recv: Box::new([0; BUF_SIZE]),
            to_send_len: 0,
            sent_len: 0,
            recv_len: 0,
        }
    }

    fn reset(&mut self) {
        self.to_send_len = 0;
        self.sent_len = 0;
        self.recv_len = 0;
    }

    /// Copy `msg` into the send buffer (truncating at capacity) and emit it.
    fn stage(&mut self, msg: &[u8]) -> Action {
        let n = msg.len().min(BUF_SIZE);
        self.send[..n].copy_from_slice(&msg[..n]);
        self.to_send_len = n;
        self.sent_len = 0;
        Action::Send(self.send[..n].to_vec())
    }

    /// Copy a received segment in, truncating at capacity.
    fn receive(&mut self, data: &[u8]) -> &[u8] {
        let n = data.len().min(BUF_SIZE);
        if n < data.len() {
            log::warn!("receive buffer overflow: kept {n} of {} bytes", data.len());
        }
        self.recv[..n].copy_from_slice(&data[..n]);
        self.recv_len = n;
        &self.recv[..n]
    }

    /// Length of the last staged response.
    pub fn to_send_len(&self) -> usize {
        self.to_send_len
    }

    /// Bytes of the last staged response the transport has confirmed.
    pub fn sent_len(&self) -> usize {
        self.sent_len
    }

    /// Length of the last received segment.
    pub fn recv_len(&self) -> usize {
        self.recv_len
    }
}

/// The single client slot.
pub struct Connection {
    state: State,
    ctx: ConnectionContext,
    strides: StrideReader,
    engine: Arc<EntropyEngine>,
}

impl Connection {
    pub fn new(engine: Arc<EntropyEngine>) -> Self {
        Self {
            state: State::Listening,
            ctx: ConnectionContext::new(),
            strides: StrideReader::new(),
            engine,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.ctx
    }

    /// Feed one event, get back what the transport must do, in order.
    pub fn dispatch(&mut self, event: Event<'_>) -> Vec<Action> {
        log::debug!("{:?} <- {:?}", self.state, event);
        match self.state {
            State::Listening => self.on_listening(event),
            State::Accepted => self.on_accepted(event),
            State::Serving => self.on_serving(event),
            State::Closing => self.on_closing(event),
        }
    }

    fn on_listening(&mut self, event: Event<'_>) -> Vec<Action> {
        match event {
            Event::Accept => {
                log::info!("client connected");
                self.state = State::Accepted;
                self.greet()
            }
            Event::AcceptFailed => {
                log::warn!("accept failed, still listening");
                Vec::new()
            }
            other => {
                log::debug!("ignoring {other:?} while listening");
                Vec::new()
            }
        }
    }

    fn on_accepted(&mut self, event: Event<'_>) -> Vec<Action> {
        match event {
            Event::Accept => vec![Action::Refuse],
            Event::Error | Event::PeerClosed => self.begin_close(),
            Event::Received(data) => {
                log::warn!("{} bytes received before greeting, closing", data.len());
                self.begin_close()
            }
            Event::AcceptFailed | Event::Sent(_) | Event::Closed => Vec::new(),
        }
    }

    fn greet(&mut self) -> Vec<Action> {
        let send = self.ctx.stage(GREETING);
        self.state = State::Serving;
        vec![send]
    }

    fn on_serving(&mut self, event: Event<'_>) -> Vec<Action> {
        match event {
            Event::Accept => {
                log::warn!("refusing second client while serving");
                vec![Action::Refuse]
            }
            Event::Received(data) => self.on_received(data),
            Event::Sent(n) => {
                self.ctx.sent_len += n;
                log::debug!("sent {}/{} bytes", self.ctx.sent_len, self.ctx.to_send_len);
                Vec::new()
            }
            Event::PeerClosed => {
                log::info!("client closed the connection");
                self.begin_close()
            }
            Event::Error => {
                log::warn!("transport error, closing client");
                self.begin_close()
            }
            Event::AcceptFailed | Event::Closed => Vec::new(),
        }
    }

    fn on_received(&mut self, data: &[u8]) -> Vec<Action> {
        let segment = self.ctx.receive(data).to_vec();
        let strides = self.strides.feed(&segment);
        log::debug!(
            "received {} bytes, {} command(s), {} pending",
            segment.len(),
            strides.len(),
            self.strides.pending().len()
        );

        let mut actions = Vec::with_capacity(strides.len());
        for (i, stride) in strides.iter().enumerate() {
            match Command::parse(stride) {
                Some(Command::Request) => {
                    let entry = self.engine.pop_entropy();
                    let available = self.engine.available_count();
                    let line = protocol::render_entropy(entry, available);
                    actions.push(self.ctx.stage(line.as_bytes()));
                }
                Some(Command::Stats) => {
                    let line = protocol::render_stats(&self.engine.stats_snapshot());
                    actions.push(self.ctx.stage(line.as_bytes()));
                }
                Some(Command::End) => {
                    log::info!("client sent end");
                    actions.extend(self.begin_close());
                    break;
                }
                None => {
                    log::warn!(
                        "protocol violation at stride {}: {:?}",
                        i + 1,
                        String::from_utf8_lossy(&stride[..STRIDE])
                    );
                    actions.extend(self.begin_close());
                    break;
                }
            }
        }
        actions
    }

    fn begin_close(&mut self) -> Vec<Action> {
        self.state = State::Closing;
        vec![Action::Close]
    }

    fn on_closing(&mut self, event: Event<'_>) -> Vec<Action> {
        match event {
            Event::Closed => {
                self.ctx.reset();
                self.strides.clear();
                self.state = State::Listening;
                log::info!("client released, listening");
                Vec::new()
            }
            Event::Accept => vec![Action::Refuse],
            other => {
                log::debug!("ignoring {other:?} while closing");
                Vec::new()
            }
        }
    }
}
