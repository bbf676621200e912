// Communication module - Line framing, command exchanges and the transport seam
pub mod executor;
pub mod lines;
pub mod loopback;
pub mod transport;

pub use executor::{CommandExecutor, ExchangePhase, ExchangeState};
pub use lines::{Line, LineSplitter};
pub use loopback::{LoopbackDevice, LoopbackTransport};
pub use transport::{Connection, InboundBytes, Transport, TransportType};
