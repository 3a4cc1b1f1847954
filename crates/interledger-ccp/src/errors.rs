use interledger_packet::{Address, AddressError, ErrorCode, Reject, RejectBuilder};
use interledger_service::{AccountId, LinkError};
use tracing::{error, warn};

/// Errors raised by the routing service. Configuration problems are fatal
/// for the operation that hit them; the rest indicate a caller broke a
/// contract.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RoutingError {
    #[error("node is configured to use its parent for the default route, but no parent account exists")]
    MissingParentAccount,
    #[error("no account exists for the configured default route: {0:?}")]
    MissingDefaultRouteAccount(Option<AccountId>),
    #[error("could not derive a child address: {0}")]
    InvalidChildAddress(#[from] AddressError),
    #[error("account {0} is already tracked for routing")]
    AccountAlreadyTracked(AccountId),
    #[error("account {0} was not found")]
    AccountNotFound(AccountId),
    #[error("no link is available for account {0}")]
    LinkNotFound(AccountId),
}

/// Errors from turning CCP messages into bytes and back.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("could not encode CCP message: {0}")]
    Encode(String),
    #[error("could not decode CCP message: {0}")]
    Decode(String),
    #[error("invalid CCP packet: {0}")]
    InvalidPacket(String),
}

/// The requested epoch is not covered by the epoch log.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("epoch {requested} is outside the retained log (oldest: {oldest}, current: {current})")]
pub struct EpochGap {
    pub requested: u32,
    pub oldest: u32,
    pub current: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("could not load settings: {0}")]
    Config(#[from] config::ConfigError),
}

pub(crate) fn reject(code: ErrorCode, message: &str, triggered_by: &Address) -> Reject {
    RejectBuilder {
        code,
        message: message.as_bytes(),
        triggered_by: Some(triggered_by),
        data: &[],
    }
    .build()
}

/// Converts a failed send into the Reject handed back to the caller. Rejects
/// from the peer pass through untouched.
pub(crate) fn reject_from_link_error(
    err: LinkError,
    account_id: &AccountId,
    operator_address: &Address,
) -> Reject {
    match err {
        LinkError::Rejected(reject) => {
            warn!(
                account_id = %account_id,
                code = %reject.code(),
                "Peer rejected CCP message"
            );
            reject
        }
        LinkError::Unreachable(message) => {
            warn!(account_id = %account_id, "Peer unreachable: {}", message);
            self::reject(ErrorCode::T01_PEER_UNREACHABLE, &message, operator_address)
        }
        LinkError::Other(err) => {
            error!(account_id = %account_id, "Error sending CCP message: {}", err);
            self::reject(
                ErrorCode::F99_APPLICATION_ERROR,
                &err.to_string(),
                operator_address,
            )
        }
    }
}
