//! Line-protocol entropy server.
//!
//! One TCP listener, one client at a time. On connect the server writes
//! `ready\n`; the client then sends 3-byte commands:
//!
//! | command | response                                              |
//! |---------|-------------------------------------------------------|
//! | `req`   | `<value>:<source_counter>:<available>\n`              |
//! | `sta`   | `cpm:<last>:<avg>:loop:<min>:<max>:<below>:<above>\n` |
//! | `end`   | connection closed                                     |
//!
//! Anything else closes the connection. An empty queue answers `req` with
//! `256:0:<available>`.
//!
//! The protocol logic lives in [`session::Connection`], a transport-agnostic
//! state machine; [`server::ProtocolServer`] drives it over tokio sockets.

pub mod error;
pub mod protocol;
pub mod server;
pub mod session;

pub use error::ServerError;
pub use protocol::{Command, GREETING, STRIDE};
pub use server::{ProtocolServer, ServerConfig, service};
pub use session::{Action, BUF_SIZE, Connection, Event, State};
