//! # interledger-service
//!
//! The abstractions the routing core depends on but does not implement:
//! the directory of configured accounts, and the per-account [`Link`] that
//! carries packets to a peer and reports its connection lifecycle.

use interledger_packet::{Fulfill, Reject};

mod account;
mod link;

pub use self::account::{
    AccountDirectory, AccountId, AccountRelationship, AccountSettings, InvalidAccountId,
};
pub use self::link::{Link, LinkError, LinkEvent, LinkEventKind};

/// The result of sending an ILP Prepare: either a Fulfill or a Reject.
pub type IlpResult = Result<Fulfill, Reject>;
