//! AtPort Library
//!
//! Request/response sessions over line-oriented serial devices. A reply
//! ends at an exact terminator line or after a quiet period that starts
//! once the command has drained to the wire.

pub mod cli;
pub mod core;
pub mod domain;
pub mod infrastructure;

pub use domain::error::{AtPortError, AtPortResult, ExecutorError, TransportError, TransportResult};
pub use domain::config::{AtPortConfig, SessionConfig};
pub use core::session::{LineStream, Session};
pub use core::communication::{
    CommandExecutor, Connection, Line, LineSplitter, LoopbackDevice, LoopbackTransport, Transport,
};
pub use infrastructure::serial::SerialTransport;
