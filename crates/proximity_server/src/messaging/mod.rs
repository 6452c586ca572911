//! Wire messages and request dispatch.

pub mod router;
pub mod types;

pub use router::{MessageRouter, Session};
pub use types::{ClientRequest, ErrorCode, NearbyUserEntry, ServerMessage};
