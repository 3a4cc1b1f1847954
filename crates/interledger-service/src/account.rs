use crate::Link;
use serde::{Deserialize, Serialize};
use std::{
    convert::TryFrom,
    fmt,
    str::{self, FromStr},
    sync::Arc,
};

/// The identifier of an account configured on this node.
///
/// Account ids double as the last segment of a child account's ILP address,
/// so they are restricted to the characters allowed in an address segment.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid account id: {0:?}")]
pub struct InvalidAccountId(String);

impl AccountId {
    /// # Panics
    ///
    /// Panics if the string is not a valid account id.
    pub fn new(id: &'static str) -> Self {
        AccountId::from_str(id).expect("invalid account id")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid_account_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|byte| byte == b'_' || byte == b'-' || byte == b'~' || byte.is_ascii_alphanumeric())
}

impl FromStr for AccountId {
    type Err = InvalidAccountId;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        if is_valid_account_id(id) {
            Ok(AccountId(id.to_string()))
        } else {
            Err(InvalidAccountId(id.to_string()))
        }
    }
}

impl TryFrom<String> for AccountId {
    type Error = InvalidAccountId;

    fn try_from(id: String) -> Result<Self, Self::Error> {
        if is_valid_account_id(&id) {
            Ok(AccountId(id))
        } else {
            Err(InvalidAccountId(id))
        }
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("AccountId").field(&self.0).finish()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The type of relationship we have with an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountRelationship {
    Parent,
    Peer,
    Child,
}

impl AccountRelationship {
    /// The priority used as the primary tie-break between routes learned from
    /// different peers. Larger weights win.
    /// Directories can assign other weights through
    /// [`AccountDirectory::route_weight`].
    pub fn weight(self) -> u32 {
        match self {
            AccountRelationship::Parent => 200,
            AccountRelationship::Peer => 100,
            AccountRelationship::Child => 50,
        }
    }
}

impl FromStr for AccountRelationship {
    type Err = String;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        match string.to_lowercase().as_str() {
            "parent" => Ok(AccountRelationship::Parent),
            "peer" => Ok(AccountRelationship::Peer),
            "child" => Ok(AccountRelationship::Child),
            _ => Err(format!("unknown account relationship: {}", string)),
        }
    }
}

/// The routing-relevant settings of one account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountSettings {
    pub id: AccountId,
    pub relationship: AccountRelationship,
    /// Whether we send CCP route updates to this account. Defaults to true
    /// for parents and peers and false for children.
    #[serde(default)]
    pub send_routes: Option<bool>,
    /// Whether we accept CCP route updates from this account. Defaults to
    /// true for parents and peers and false for children.
    #[serde(default)]
    pub receive_routes: Option<bool>,
}

impl AccountSettings {
    pub fn new(id: AccountId, relationship: AccountRelationship) -> Self {
        AccountSettings {
            id,
            relationship,
            send_routes: None,
            receive_routes: None,
        }
    }

    pub fn send_routes(mut self, send_routes: bool) -> Self {
        self.send_routes = Some(send_routes);
        self
    }

    pub fn receive_routes(mut self, receive_routes: bool) -> Self {
        self.receive_routes = Some(receive_routes);
        self
    }

    pub fn is_parent(&self) -> bool {
        self.relationship == AccountRelationship::Parent
    }

    pub fn is_child(&self) -> bool {
        self.relationship == AccountRelationship::Child
    }

    pub fn should_send_routes(&self) -> bool {
        self.send_routes.unwrap_or(!self.is_child())
    }

    pub fn should_receive_routes(&self) -> bool {
        self.receive_routes.unwrap_or(!self.is_child())
    }
}

/// Lookup of the accounts configured on this node and the links used to
/// reach them.
pub trait AccountDirectory: Send + Sync + 'static {
    fn get_account(&self, account_id: &AccountId) -> Option<AccountSettings>;

    fn get_all_accounts(&self) -> Vec<AccountSettings>;

    fn get_link(&self, account_id: &AccountId) -> Option<Arc<dyn Link>>;

    /// The parent account used for the default route when the node is
    /// configured to route unknown destinations to its parent.
    fn get_primary_parent_account(&self) -> Option<AccountSettings> {
        self.get_all_accounts()
            .into_iter()
            .find(AccountSettings::is_parent)
    }

    /// How strongly routes learned from the account are preferred over those
    /// of other accounts. Larger weights win. Defaults to the weight of the
    /// account's relationship. `None` if the account is unknown.
    fn route_weight(&self, account_id: &AccountId) -> Option<u32> {
        self.get_account(account_id)
            .map(|account| account.relationship.weight())
    }
}
