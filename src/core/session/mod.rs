// Session module - Device session lifecycle and line subscription
pub mod session;
pub mod state;
pub mod subscription;

pub use session::Session;
pub use state::{SessionState, SessionStatistics, SessionStatus};
pub use subscription::{LineStream, SubscriberSlot};
