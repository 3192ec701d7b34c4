//! Networking: protocol, framing, sessions, interest-filtered broadcast,
//! and the TCP transport.

pub mod broadcast;
pub mod framing;
pub mod protocol;
pub mod session;
pub mod transport;
