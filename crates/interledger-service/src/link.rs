use crate::AccountId;
use async_trait::async_trait;
use futures::channel::mpsc::UnboundedSender;
use interledger_packet::{Fulfill, Prepare, Reject};
use std::error::Error as StdError;
use uuid::Uuid;

/// Something that happened to the link of one account.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkEvent {
    pub account_id: AccountId,
    pub kind: LinkEventKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LinkEventKind {
    Connected,
    Disconnected,
    Error(String),
}

impl LinkEvent {
    pub fn connected(account_id: AccountId) -> Self {
        LinkEvent {
            account_id,
            kind: LinkEventKind::Connected,
        }
    }

    pub fn disconnected(account_id: AccountId) -> Self {
        LinkEvent {
            account_id,
            kind: LinkEventKind::Disconnected,
        }
    }

    pub fn error(account_id: AccountId, message: impl Into<String>) -> Self {
        LinkEvent {
            account_id,
            kind: LinkEventKind::Error(message.into()),
        }
    }
}

/// Errors returned by [`Link::send_packet`].
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The peer answered with an ILP Reject.
    #[error("packet rejected by peer: {0:?}")]
    Rejected(Reject),
    /// The packet could not be delivered to the peer.
    #[error("peer unreachable: {0}")]
    Unreachable(String),
    #[error("{0}")]
    Other(#[from] Box<dyn StdError + Send + Sync + 'static>),
}

/// The logical connection to one peer.
///
/// Links deliver lifecycle events through channels instead of callbacks: a
/// subscriber hands over the sending half of a channel and receives every
/// subsequent [`LinkEvent`] on it until it removes itself again.
#[async_trait]
pub trait Link: Send + Sync {
    fn account_id(&self) -> &AccountId;

    fn is_connected(&self) -> bool;

    /// Send a Prepare to the peer and wait for its response. Links handle
    /// retries themselves, if they retry at all.
    async fn send_packet(&self, prepare: Prepare) -> Result<Fulfill, LinkError>;

    fn add_event_listener(&self, listener_id: Uuid, events: UnboundedSender<LinkEvent>);

    fn remove_event_listener(&self, listener_id: &Uuid);
}
