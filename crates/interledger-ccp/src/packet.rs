use crate::{errors::CodecError, routes::RoutingTableId};
use interledger_packet::{Address, AddressPrefix, Fulfill, FulfillBuilder, Prepare, PrepareBuilder};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

pub static CCP_CONTROL_DESTINATION: Lazy<Address> =
    Lazy::new(|| Address::new("peer.route.control"));
pub static CCP_UPDATE_DESTINATION: Lazy<Address> = Lazy::new(|| Address::new("peer.route.update"));
pub const PEER_PROTOCOL_FULFILLMENT: [u8; 32] = [0; 32];
/// SHA-256 of [`PEER_PROTOCOL_FULFILLMENT`].
pub const PEER_PROTOCOL_CONDITION: [u8; 32] = [
    102, 104, 122, 173, 248, 98, 189, 119, 108, 143, 193, 139, 142, 159, 142, 32, 8, 151, 20, 133,
    110, 226, 51, 179, 144, 42, 89, 29, 13, 95, 41, 37,
];

pub static CCP_RESPONSE: Lazy<Fulfill> = Lazy::new(|| {
    FulfillBuilder {
        fulfillment: &PEER_PROTOCOL_FULFILLMENT,
        data: &[],
    }
    .build()
});

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Idle,
    Sync,
}

/// Sent to a peer to ask it to start (or stop) sending us route updates.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct RouteControlRequest {
    pub mode: Mode,
    /// `None` until we have seen a route update from the peer.
    pub last_known_routing_table_id: Option<RoutingTableId>,
    pub last_known_epoch: u32,
    #[serde(default)]
    pub features: Vec<String>,
}

/// A route as it appears inside a [`RouteUpdateRequest`]. The next hop is
/// implicit: it is whoever sent the update.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct AdvertisedRoute {
    pub prefix: AddressPrefix,
    pub path: Vec<Address>,
    #[serde(with = "auth_hex")]
    pub auth: [u8; 32],
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct RouteUpdateRequest {
    pub routing_table_id: RoutingTableId,
    pub current_epoch_index: u32,
    pub from_epoch_index: u32,
    pub to_epoch_index: u32,
    /// How long (in milliseconds) the receiver may keep these routes without
    /// hearing from us again.
    pub hold_down_time: u32,
    pub speaker: Address,
    pub new_routes: Vec<AdvertisedRoute>,
    pub withdrawn_routes: Vec<AddressPrefix>,
}

impl RouteUpdateRequest {
    pub fn is_heartbeat(&self) -> bool {
        self.new_routes.is_empty() && self.withdrawn_routes.is_empty()
    }
}

/// Wrap an encoded CCP message in the zero-amount Prepare that carries it
/// to the peer.
pub(crate) fn ccp_prepare(destination: &Address, data: &[u8], expiry: Duration) -> Prepare {
    PrepareBuilder {
        destination: destination.clone(),
        amount: 0,
        expires_at: SystemTime::now() + expiry,
        execution_condition: &PEER_PROTOCOL_CONDITION,
        data,
    }
    .build()
}

/// Checks the envelope of an incoming CCP packet before its payload is decoded.
pub(crate) fn validate_ccp_prepare(prepare: &Prepare, now: SystemTime) -> Result<(), CodecError> {
    if prepare.expires_at() < now {
        return Err(CodecError::InvalidPacket("packet expired".to_string()));
    }
    if prepare.execution_condition() != PEER_PROTOCOL_CONDITION {
        return Err(CodecError::InvalidPacket(format!(
            "wrong condition: {}",
            hex::encode(prepare.execution_condition())
        )));
    }
    Ok(())
}

mod auth_hex {
    use hex::FromHex;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(auth: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(auth))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        <[u8; 32]>::from_hex(String::deserialize(deserializer)?).map_err(|err| {
            D::Error::custom(format!(
                "Invalid hex value (must be 32 hex-encoded bytes): {:?}",
                err
            ))
        })
    }
}
