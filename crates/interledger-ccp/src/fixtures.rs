/* kcov-ignore-start */
use crate::packet::*;
use crate::routes::RoutingTableId;
use interledger_packet::{Address, AddressPrefix};
use once_cell::sync::Lazy;
use uuid::Uuid;

pub static CONTROL_REQUEST: Lazy<RouteControlRequest> = Lazy::new(|| RouteControlRequest {
    mode: Mode::Sync,
    last_known_routing_table_id: Some(RoutingTableId::from_uuid(Uuid::from_bytes([
        112, 209, 161, 52, 160, 223, 79, 71, 150, 79, 110, 25, 226, 171, 55, 144,
    ]))), // "70d1a134-a0df-4f47-964f-6e19e2ab3790"
    last_known_epoch: 32,
    features: vec!["foo".to_string(), "bar".to_string()],
});

pub static UPDATE_REQUEST_SIMPLE: Lazy<RouteUpdateRequest> = Lazy::new(|| RouteUpdateRequest {
    routing_table_id: RoutingTableId::from_uuid(Uuid::from_bytes([
        33, 229, 95, 142, 171, 205, 78, 151, 154, 185, 191, 15, 240, 10, 34, 76,
    ])), // '21e55f8e-abcd-4e97-9ab9-bf0ff00a224c'
    current_epoch_index: 52,
    from_epoch_index: 52,
    to_epoch_index: 52,
    hold_down_time: 30000,
    speaker: Address::new("example.alice"),
    new_routes: Vec::new(),
    withdrawn_routes: Vec::new(),
});

pub static UPDATE_REQUEST_COMPLEX: Lazy<RouteUpdateRequest> = Lazy::new(|| RouteUpdateRequest {
    routing_table_id: RoutingTableId::from_uuid(Uuid::from_bytes([
        191, 251, 246, 173, 13, 220, 77, 59, 161, 229, 180, 240, 83, 115, 101, 189,
    ])), // 'bffbf6ad-0ddc-4d3b-a1e5-b4f0537365bd'
    current_epoch_index: 52,
    from_epoch_index: 46,
    to_epoch_index: 50,
    hold_down_time: 30000,
    speaker: Address::new("example.alice"),
    new_routes: vec![
        AdvertisedRoute {
            prefix: AddressPrefix::new("example.prefix1"),
            path: vec![Address::new("example.prefix1")],
            auth: [
                122, 108, 125, 133, 134, 124, 70, 162, 250, 191, 173, 26, 250, 122, 74, 94, 34,
                156, 229, 116, 252, 206, 99, 245, 237, 238, 223, 192, 63, 132, 104, 234,
            ],
        },
        AdvertisedRoute {
            prefix: AddressPrefix::new("example.prefix2"),
            path: vec![
                Address::new("example.connector1"),
                Address::new("example.prefix2"),
            ],
            auth: [
                43, 8, 229, 63, 188, 193, 124, 95, 27, 213, 74, 224, 217, 173, 123, 163, 154, 95,
                154, 123, 18, 108, 169, 181, 192, 148, 86, 9, 163, 83, 36, 204,
            ],
        },
    ],
    withdrawn_routes: vec![
        AddressPrefix::new("example.prefix3"),
        AddressPrefix::new("example.prefix4"),
    ],
});
/* kcov-ignore-end */
