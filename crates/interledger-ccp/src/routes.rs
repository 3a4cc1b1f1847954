use crate::packet::AdvertisedRoute;
use interledger_packet::{Address, AddressPrefix};
use interledger_service::AccountId;
use once_cell::sync::Lazy;
use ring::{
    digest::{digest, SHA256},
    hmac,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Next hop of the route to our own address.
pub static SELF_ACCOUNT_ID: Lazy<AccountId> = Lazy::new(|| AccountId::new("self"));

/// Anything that can be stored in a [`RoutingTable`](crate::RoutingTable).
pub trait RoutingTableEntry: Clone + fmt::Debug + Send + Sync + 'static {
    fn route_prefix(&self) -> &AddressPrefix;

    /// `None` for entries that record a withdrawal.
    fn next_hop_account_id(&self) -> Option<&AccountId>;
}

/// "To reach `route_prefix`, forward to `next_hop_account_id`."
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub route_prefix: AddressPrefix,
    pub next_hop_account_id: AccountId,
    /// Operator addresses this route was advertised through, most recent first.
    pub path: Vec<Address>,
    pub auth: [u8; 32],
}

impl Route {
    /// A route that this node originates itself, authenticated with the
    /// routing secret.
    pub fn originated(
        route_prefix: AddressPrefix,
        next_hop_account_id: AccountId,
        routing_secret: &[u8; 32],
    ) -> Self {
        let auth = hmac_auth(routing_secret, &route_prefix);
        Route {
            route_prefix,
            next_hop_account_id,
            path: Vec::new(),
            auth,
        }
    }

    /// The route as it is advertised to our peers: our address goes in front of
    /// the path and the auth tag is hashed once more.
    pub fn to_forwarding_route(&self, operator_address: &Address) -> Route {
        let mut path = Vec::with_capacity(self.path.len() + 1);
        path.push(operator_address.clone());
        path.extend(self.path.iter().cloned());
        Route {
            route_prefix: self.route_prefix.clone(),
            next_hop_account_id: self.next_hop_account_id.clone(),
            path,
            auth: hash(&self.auth),
        }
    }

    pub fn to_advertised_route(&self) -> AdvertisedRoute {
        AdvertisedRoute {
            prefix: self.route_prefix.clone(),
            path: self.path.clone(),
            auth: self.auth,
        }
    }
}

impl RoutingTableEntry for Route {
    fn route_prefix(&self) -> &AddressPrefix {
        &self.route_prefix
    }

    fn next_hop_account_id(&self) -> Option<&AccountId> {
        Some(&self.next_hop_account_id)
    }
}

/// A route exactly as a specific peer advertised it to us.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingRoute {
    pub peer_account_id: AccountId,
    pub route_prefix: AddressPrefix,
    pub path: Vec<Address>,
    pub auth: [u8; 32],
}

impl IncomingRoute {
    pub fn from_advertised(peer_account_id: AccountId, route: AdvertisedRoute) -> Self {
        IncomingRoute {
            peer_account_id,
            route_prefix: route.prefix,
            path: route.path,
            auth: route.auth,
        }
    }
}

impl From<IncomingRoute> for Route {
    fn from(route: IncomingRoute) -> Self {
        Route {
            route_prefix: route.route_prefix,
            next_hop_account_id: route.peer_account_id,
            path: route.path,
            auth: route.auth,
        }
    }
}

impl RoutingTableEntry for IncomingRoute {
    fn route_prefix(&self) -> &AddressPrefix {
        &self.route_prefix
    }

    fn next_hop_account_id(&self) -> Option<&AccountId> {
        Some(&self.peer_account_id)
    }
}

/// One entry of the outgoing epoch log. A missing route is a withdrawal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteUpdate {
    pub route_prefix: AddressPrefix,
    pub route: Option<Route>,
    pub epoch: u32,
}

impl RoutingTableEntry for RouteUpdate {
    fn route_prefix(&self) -> &AddressPrefix {
        &self.route_prefix
    }

    fn next_hop_account_id(&self) -> Option<&AccountId> {
        self.route.as_ref().map(|route| &route.next_hop_account_id)
    }
}

/// Identifies one generation of a routing table. A node picks a new id every
/// time it starts over with a fresh table, which tells its peers to resync
/// from epoch zero.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingTableId(Uuid);

impl RoutingTableId {
    pub fn new_random() -> Self {
        RoutingTableId(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        RoutingTableId(id)
    }
}

impl fmt::Debug for RoutingTableId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("RoutingTableId")
            .field(&self.0.to_hyphenated_ref().to_string())
            .finish()
    }
}

impl fmt::Display for RoutingTableId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

pub(crate) fn hash(preimage: &[u8; 32]) -> [u8; 32] {
    let mut out = [0; 32];
    out.copy_from_slice(digest(&SHA256, preimage).as_ref());
    out
}

/// Auth tag of a route we originate: HMAC-SHA256 of the prefix, keyed with
/// the routing secret.
pub(crate) fn hmac_auth(routing_secret: &[u8; 32], prefix: &AddressPrefix) -> [u8; 32] {
    let key = hmac::Key::new(hmac::HMAC_SHA256, routing_secret);
    let mut out = [0; 32];
    out.copy_from_slice(hmac::sign(&key, prefix.as_str().as_bytes()).as_ref());
    out
}
