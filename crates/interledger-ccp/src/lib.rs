//! # interledger-ccp
//!
//! The routing core of an Interledger connector. It exchanges routes with
//! peers using the Connector-to-Connector Protocol (CCP), ranks the routes it
//! learns, keeps the local routing table used to pick a next hop for each
//! packet, and maintains the epoch-versioned table it advertises to peers.
//!
//! The entry point is [`RoutingService`], built with
//! [`RoutingServiceBuilder`] from shared [`ConnectorSettings`] and an
//! [`AccountDirectory`](interledger_service::AccountDirectory).

mod codec;
mod errors;
#[cfg(test)]
mod fixtures;
mod packet;
mod ranking;
mod receiver;
mod routes;
mod routing_service;
mod routing_table;
mod sender;
mod settings;
#[cfg(test)]
mod test_helpers;

pub use codec::{CcpCodec, JsonCcpCodec};
pub use errors::{CodecError, EpochGap, RoutingError, SettingsError};
pub use packet::{
    AdvertisedRoute, Mode, RouteControlRequest, RouteUpdateRequest, CCP_CONTROL_DESTINATION,
    CCP_RESPONSE, CCP_UPDATE_DESTINATION, PEER_PROTOCOL_CONDITION, PEER_PROTOCOL_FULFILLMENT,
};
pub use ranking::{compare_ranked_routes, PeerRouteComparator, RankedRoute};
pub use receiver::{CcpReceiver, RouteUpdateOutcome};
pub use routes::{
    IncomingRoute, Route, RouteUpdate, RoutingTableEntry, RoutingTableId, SELF_ACCOUNT_ID,
};
pub use routing_service::{
    DragonFilter, NoDragonFilter, RoutableAccount, RoutingService, RoutingServiceBuilder,
};
pub use routing_table::{ForwardingRoutingTable, RoutingTable};
pub use sender::CcpSender;
pub use settings::{ConnectorSettings, GlobalRoutingSettings, SharedSettings, StaticRoute};
