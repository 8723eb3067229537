//! Wire-level protocol model.
//!
//! Every operation against the broker is a *triplet* — a
//! ([`DataGroups`], [`Dat`], [`Msg`]) tuple — addressed from an origin
//! identity to a destination identity, carrying a typed [`Payload`] and
//! returning a [`ResultCode`]. Failures additionally park a
//! [`ConditionCode`] on the owning application.

pub mod identity;
pub mod payload;
pub mod triplet;

pub use identity::{Identity, ProtocolVersion};
pub use payload::{CallbackFn, CallbackReg, EventPayload, Payload};
pub use triplet::{ConditionCode, Dat, DataGroups, Msg, ResultCode};
