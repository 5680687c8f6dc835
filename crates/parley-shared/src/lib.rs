//! # parley-shared
//!
//! Wire types shared by the Parley hub and its clients: identifier
//! newtypes, the inbound/outbound JSON envelopes, and the error codes a
//! client may receive.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::{ErrorCode, ProtocolError};
pub use protocol::{Command, InboundEnvelope, MessageBody, OutboundEnvelope, OutboundKind, ReplyMeta};
pub use types::{ChatKind, GroupId, UserId};
