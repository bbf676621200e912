// Core module - Session layer and response framing
pub mod communication;
pub mod session;
