//! Interledger addresses, address prefixes and packet value types.
//!
//! The routing core only needs typed packets: the binary (OER) encoding of
//! packets lives with the transport and is not part of this crate.

mod address;
mod error;
mod packet;

pub use self::address::{Address, AddressError, AddressPrefix};
pub use self::error::{ErrorClass, ErrorCode};
pub use self::packet::{Fulfill, FulfillBuilder, Prepare, PrepareBuilder, Reject, RejectBuilder};
