use crate::{
    codec::CcpCodec,
    errors::{reject, reject_from_link_error},
    packet::{ccp_prepare, Mode, RouteControlRequest, RouteUpdateRequest, CCP_CONTROL_DESTINATION},
    routes::{IncomingRoute, Route, RoutingTableId},
    routing_table::RoutingTable,
    settings::SharedSettings,
};
use interledger_packet::{AddressPrefix, ErrorCode};
use interledger_service::{AccountId, IlpResult, Link};
use parking_lot::{Mutex, RwLock};
use std::{
    cmp::max,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tracing::{debug, error, trace};

#[derive(Debug)]
struct ReceiverState {
    routing_table_id: Option<RoutingTableId>,
    epoch: u32,
    routing_table_expiry: SystemTime,
}

/// What applying a route update did.
#[derive(Clone, Debug, PartialEq)]
pub enum RouteUpdateOutcome {
    /// The update was applied. Holds the prefixes whose routes changed.
    Applied(Vec<AddressPrefix>),
    /// No routes, only a newer epoch.
    Heartbeat,
    /// The update starts after the last epoch we have, so epochs are missing.
    Gap { expected_epoch: u32 },
    /// Every epoch in the update was already applied.
    Stale,
    /// `from_epoch_index` is past `to_epoch_index`.
    Invalid,
}

impl RouteUpdateOutcome {
    pub fn into_changed_prefixes(self) -> Vec<AddressPrefix> {
        match self {
            RouteUpdateOutcome::Applied(changed_prefixes) => changed_prefixes,
            _ => Vec::new(),
        }
    }
}

/// Tracks the routes one peer has advertised to us, and how far along that
/// peer's epoch log we are.
pub struct CcpReceiver {
    peer_account_id: AccountId,
    link: Arc<dyn Link>,
    codec: Arc<dyn CcpCodec>,
    settings: SharedSettings,
    state: Mutex<ReceiverState>,
    incoming_routes: RwLock<RoutingTable<IncomingRoute>>,
}

impl CcpReceiver {
    pub fn new(
        peer_account_id: AccountId,
        link: Arc<dyn Link>,
        codec: Arc<dyn CcpCodec>,
        settings: SharedSettings,
    ) -> Self {
        CcpReceiver {
            peer_account_id,
            link,
            codec,
            settings,
            state: Mutex::new(ReceiverState {
                routing_table_id: None,
                epoch: 0,
                routing_table_expiry: UNIX_EPOCH,
            }),
            incoming_routes: RwLock::new(RoutingTable::new()),
        }
    }

    pub fn peer_account_id(&self) -> &AccountId {
        &self.peer_account_id
    }

    /// Apply a route update from the peer and return the prefixes whose routes
    /// changed: withdrawals first, then new or modified routes, each in the
    /// order the peer sent them.
    ///
    /// Updates that skip epochs we have not seen, or that only cover epochs we
    /// already applied, are dropped without touching our routes.
    pub fn handle_route_update_request(&self, request: RouteUpdateRequest) -> Vec<AddressPrefix> {
        self.apply_route_update(request).into_changed_prefixes()
    }

    /// Like [`handle_route_update_request`](Self::handle_route_update_request),
    /// but reports what happened to the update.
    pub fn apply_route_update(&self, request: RouteUpdateRequest) -> RouteUpdateOutcome {
        let mut state = self.state.lock();

        let hold_down_expiry =
            SystemTime::now() + Duration::from_millis(u64::from(request.hold_down_time));
        state.routing_table_expiry = max(state.routing_table_expiry, hold_down_expiry);

        if state.routing_table_id != Some(request.routing_table_id) {
            debug!(
                account_id = %self.peer_account_id,
                "Saw new routing table. Old ID: {:?}, new ID: {}",
                state.routing_table_id,
                request.routing_table_id
            );
            state.routing_table_id = Some(request.routing_table_id);
            state.epoch = 0;
        }

        if request.from_epoch_index > request.to_epoch_index {
            debug!(
                account_id = %self.peer_account_id,
                "Ignoring route update that ends before it starts: {}..{}",
                request.from_epoch_index,
                request.to_epoch_index
            );
            return RouteUpdateOutcome::Invalid;
        }

        if request.from_epoch_index > state.epoch {
            debug!(
                account_id = %self.peer_account_id,
                "Gap in routing table. Expected epoch: {}, got from_epoch: {}",
                state.epoch,
                request.from_epoch_index
            );
            return RouteUpdateOutcome::Gap {
                expected_epoch: state.epoch,
            };
        }

        if state.epoch > request.to_epoch_index {
            trace!(
                account_id = %self.peer_account_id,
                "Ignoring old route update for epochs {}..{} (current epoch: {})",
                request.from_epoch_index,
                request.to_epoch_index,
                state.epoch
            );
            return RouteUpdateOutcome::Stale;
        }

        if request.is_heartbeat() {
            trace!(
                account_id = %self.peer_account_id,
                "Got heartbeat route update for table ID: {}, epoch: {}",
                request.routing_table_id,
                request.to_epoch_index
            );
            state.epoch = request.to_epoch_index;
            return RouteUpdateOutcome::Heartbeat;
        }

        let mut changed_prefixes =
            Vec::with_capacity(request.withdrawn_routes.len() + request.new_routes.len());
        {
            let mut incoming_routes = self.incoming_routes.write();
            for prefix in request.withdrawn_routes {
                incoming_routes.remove_route(&prefix);
                changed_prefixes.push(prefix);
            }

            for route in request.new_routes {
                let route = IncomingRoute::from_advertised(self.peer_account_id.clone(), route);
                let prefix = route.route_prefix.clone();
                let previous = incoming_routes.add_route(route.clone());
                if previous.as_ref() != Some(&route) {
                    changed_prefixes.push(prefix);
                }
            }
        }

        state.epoch = request.to_epoch_index;
        trace!(
            account_id = %self.peer_account_id,
            "Updated routing table {} to epoch: {}",
            request.routing_table_id,
            state.epoch
        );

        RouteUpdateOutcome::Applied(changed_prefixes)
    }

    /// Ask the peer to send us route updates, starting after the last epoch we
    /// have. Never retries.
    pub async fn send_route_control(&self) -> IlpResult {
        let request = {
            let state = self.state.lock();
            RouteControlRequest {
                mode: Mode::Sync,
                last_known_routing_table_id: state.routing_table_id,
                last_known_epoch: state.epoch,
                features: Vec::new(),
            }
        };
        let (operator_address, expiry) = {
            let settings = self.settings.read();
            (
                settings.operator_address.clone(),
                settings.global_routing_settings.route_expiry(),
            )
        };

        let data = match self.codec.encode_control(&request) {
            Ok(data) => data,
            Err(err) => {
                error!(account_id = %self.peer_account_id, "Unable to encode route control request: {}", err);
                return Err(reject(
                    ErrorCode::F99_APPLICATION_ERROR,
                    &err.to_string(),
                    &operator_address,
                ));
            }
        };

        debug!(
            account_id = %self.peer_account_id,
            "Sending Route Control Request, last known table id: {:?}, last known epoch: {}",
            request.last_known_routing_table_id,
            request.last_known_epoch
        );
        let prepare = ccp_prepare(&CCP_CONTROL_DESTINATION, &data, expiry);
        self.link
            .send_packet(prepare)
            .await
            .map_err(|err| reject_from_link_error(err, &self.peer_account_id, &operator_address))
    }

    /// Whether the peer has let its routes lapse: it sent us a routing table
    /// at some point but nothing since the hold-down time ran out.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        let state = self.state.lock();
        state.routing_table_id.is_some() && now > state.routing_table_expiry
    }

    /// Forget everything this peer told us, so the next route update must
    /// start from epoch zero. Returns the prefixes that were removed.
    pub fn clear_routes(&self) -> Vec<AddressPrefix> {
        let mut state = self.state.lock();
        state.routing_table_id = None;
        state.epoch = 0;
        let mut incoming_routes = self.incoming_routes.write();
        let prefixes = incoming_routes.get_all_prefixes();
        incoming_routes.reset();
        prefixes
    }

    pub fn for_each_incoming_route<F: FnMut(&IncomingRoute)>(&self, visit: F) {
        self.incoming_routes.read().for_each(visit)
    }

    pub fn get_incoming_route_for_prefix(&self, prefix: &AddressPrefix) -> Option<IncomingRoute> {
        self.incoming_routes
            .read()
            .get_route_by_prefix(prefix)
            .cloned()
    }

    pub fn get_route_for_prefix(&self, prefix: &AddressPrefix) -> Option<Route> {
        self.get_incoming_route_for_prefix(prefix).map(Route::from)
    }

    pub fn incoming_prefixes(&self) -> Vec<AddressPrefix> {
        self.incoming_routes.read().get_all_prefixes()
    }

    pub fn epoch(&self) -> u32 {
        self.state.lock().epoch
    }

    pub fn routing_table_id(&self) -> Option<RoutingTableId> {
        self.state.lock().routing_table_id
    }

    pub fn routing_table_expiry(&self) -> SystemTime {
        self.state.lock().routing_table_expiry
    }
}

#[cfg(test)]
mod handle_route_update_request {
    use super::*;
    use crate::fixtures::*;
    use crate::packet::AdvertisedRoute;
    use crate::test_helpers::*;
    use interledger_packet::Address;

    fn advertised(prefix: &'static str) -> AdvertisedRoute {
        AdvertisedRoute {
            prefix: AddressPrefix::new(prefix),
            path: Vec::new(),
            auth: [1; 32],
        }
    }

    fn update(from: u32, to: u32, new: Vec<AdvertisedRoute>, withdrawn: Vec<&'static str>) -> RouteUpdateRequest {
        RouteUpdateRequest {
            from_epoch_index: from,
            to_epoch_index: to,
            current_epoch_index: to,
            new_routes: new,
            withdrawn_routes: withdrawn.into_iter().map(AddressPrefix::new).collect(),
            ..UPDATE_REQUEST_SIMPLE.clone()
        }
    }

    #[test]
    fn stores_table_id_from_first_update() {
        let receiver = test_receiver(TestLink::new("peer"));
        let mut request = UPDATE_REQUEST_SIMPLE.clone();
        request.from_epoch_index = 0;
        receiver.handle_route_update_request(request.clone());
        assert_eq!(receiver.routing_table_id(), Some(request.routing_table_id));
        assert_eq!(receiver.epoch(), 52);
    }

    #[test]
    fn new_table_id_resets_epoch() {
        let receiver = test_receiver(TestLink::new("peer"));
        receiver.handle_route_update_request(update(0, 5, vec![advertised("example.a")], vec![]));
        assert_eq!(receiver.epoch(), 5);

        // a different table starting from a later epoch is a gap
        let request = RouteUpdateRequest {
            routing_table_id: UPDATE_REQUEST_COMPLEX.routing_table_id,
            ..update(3, 6, vec![advertised("example.b")], vec![])
        };
        assert!(receiver.handle_route_update_request(request).is_empty());
        assert_eq!(receiver.epoch(), 0);
        assert_eq!(
            receiver.routing_table_id(),
            Some(UPDATE_REQUEST_COMPLEX.routing_table_id)
        );
    }

    #[test]
    fn ignores_update_with_gap() {
        let receiver = test_receiver(TestLink::new("peer"));
        receiver.handle_route_update_request(update(0, 2, vec![advertised("example.a")], vec![]));
        let changed =
            receiver.handle_route_update_request(update(3, 4, vec![advertised("example.b")], vec!["example.a"]));
        assert!(changed.is_empty());
        assert_eq!(receiver.epoch(), 2);
        assert_eq!(receiver.incoming_prefixes(), vec![AddressPrefix::new("example.a")]);
    }

    #[test]
    fn ignores_old_update() {
        let receiver = test_receiver(TestLink::new("peer"));
        receiver.handle_route_update_request(update(0, 3, vec![advertised("example.a")], vec![]));
        let changed =
            receiver.handle_route_update_request(update(0, 1, vec![], vec!["example.a"]));
        assert!(changed.is_empty());
        assert_eq!(receiver.epoch(), 3);
        assert!(receiver
            .get_incoming_route_for_prefix(&AddressPrefix::new("example.a"))
            .is_some());
    }

    #[test]
    fn reports_outcome_of_each_update() {
        let receiver = test_receiver(TestLink::new("peer"));
        assert_eq!(
            receiver.apply_route_update(update(0, 2, vec![advertised("example.a")], vec![])),
            RouteUpdateOutcome::Applied(vec![AddressPrefix::new("example.a")])
        );
        assert_eq!(
            receiver.apply_route_update(update(2, 3, vec![], vec![])),
            RouteUpdateOutcome::Heartbeat
        );
        assert_eq!(
            receiver.apply_route_update(update(1, 2, vec![], vec!["example.a"])),
            RouteUpdateOutcome::Stale
        );
        assert_eq!(
            receiver.apply_route_update(update(5, 6, vec![], vec![])),
            RouteUpdateOutcome::Gap { expected_epoch: 3 }
        );
        assert_eq!(receiver.epoch(), 3);
    }

    #[test]
    fn rejects_update_ending_before_it_starts() {
        let receiver = test_receiver(TestLink::new("peer"));
        receiver.handle_route_update_request(update(0, 3, vec![advertised("example.a")], vec![]));
        assert_eq!(
            receiver.apply_route_update(update(3, 1, vec![advertised("example.b")], vec!["example.a"])),
            RouteUpdateOutcome::Invalid
        );
        assert_eq!(receiver.epoch(), 3);
        assert_eq!(receiver.incoming_prefixes(), vec![AddressPrefix::new("example.a")]);
    }

    #[test]
    fn new_table_from_later_epoch_is_a_gap_for_synced_peer() {
        let receiver = test_receiver(TestLink::new("peer"));
        receiver.handle_route_update_request(update(0, 4, vec![advertised("example.a")], vec![]));
        let request = RouteUpdateRequest {
            routing_table_id: UPDATE_REQUEST_COMPLEX.routing_table_id,
            ..update(2, 6, vec![advertised("example.b")], vec![])
        };
        assert_eq!(
            receiver.apply_route_update(request),
            RouteUpdateOutcome::Gap { expected_epoch: 0 }
        );
        assert!(receiver
            .get_incoming_route_for_prefix(&AddressPrefix::new("example.b"))
            .is_none());
    }

    #[test]
    fn heartbeat_advances_epoch() {
        let receiver = test_receiver(TestLink::new("peer"));
        let changed = receiver.handle_route_update_request(update(0, 7, vec![], vec![]));
        assert!(changed.is_empty());
        assert_eq!(receiver.epoch(), 7);
    }

    #[test]
    fn returns_withdrawals_then_additions() {
        let receiver = test_receiver(TestLink::new("peer"));
        receiver.handle_route_update_request(update(0, 1, vec![advertised("example.a")], vec![]));
        let changed = receiver.handle_route_update_request(update(
            1,
            2,
            vec![advertised("example.c"), advertised("example.b")],
            vec!["example.a", "example.never"],
        ));
        assert_eq!(
            changed,
            vec![
                AddressPrefix::new("example.a"),
                AddressPrefix::new("example.never"),
                AddressPrefix::new("example.c"),
                AddressPrefix::new("example.b"),
            ]
        );
        assert!(receiver
            .get_incoming_route_for_prefix(&AddressPrefix::new("example.a"))
            .is_none());
        let route = receiver
            .get_incoming_route_for_prefix(&AddressPrefix::new("example.b"))
            .unwrap();
        assert_eq!(route.peer_account_id, AccountId::new("peer"));
        assert_eq!(receiver.epoch(), 2);
    }

    #[test]
    fn only_signals_routes_whose_content_changed() {
        let receiver = test_receiver(TestLink::new("peer"));
        receiver.handle_route_update_request(update(0, 1, vec![advertised("example.a")], vec![]));

        let same = receiver.handle_route_update_request(update(1, 2, vec![advertised("example.a")], vec![]));
        assert!(same.is_empty());
        assert_eq!(receiver.epoch(), 2);

        let mut longer = advertised("example.a");
        longer.path = vec![Address::new("example.other")];
        let changed = receiver.handle_route_update_request(update(2, 3, vec![longer.clone()], vec![]));
        assert_eq!(changed, vec![AddressPrefix::new("example.a")]);
        assert_eq!(
            receiver
                .get_incoming_route_for_prefix(&AddressPrefix::new("example.a"))
                .unwrap()
                .path,
            longer.path
        );
    }

    #[test]
    fn applies_consecutive_updates() {
        let receiver = test_receiver(TestLink::new("peer"));
        let updates = vec![
            update(0, 1, vec![advertised("example.a"), advertised("example.b")], vec![]),
            update(1, 3, vec![advertised("example.c")], vec!["example.a"]),
            update(3, 3, vec![], vec![]),
            update(3, 4, vec![advertised("example.d")], vec![]),
        ];
        for request in updates {
            receiver.handle_route_update_request(request);
        }
        assert_eq!(receiver.epoch(), 4);
        let mut prefixes = receiver.incoming_prefixes();
        prefixes.sort();
        assert_eq!(
            prefixes,
            vec![
                AddressPrefix::new("example.b"),
                AddressPrefix::new("example.c"),
                AddressPrefix::new("example.d"),
            ]
        );
    }

    #[test]
    fn extends_expiry_but_never_shortens_it() {
        let receiver = test_receiver(TestLink::new("peer"));
        assert!(!receiver.is_expired(SystemTime::now()));

        receiver.handle_route_update_request(update(0, 1, vec![], vec![]));
        let expiry = receiver.routing_table_expiry();
        assert!(expiry > SystemTime::now());

        let mut short = update(1, 2, vec![], vec![]);
        short.hold_down_time = 0;
        receiver.handle_route_update_request(short);
        assert_eq!(receiver.routing_table_expiry(), expiry);

        assert!(!receiver.is_expired(SystemTime::now()));
        assert!(receiver.is_expired(expiry + Duration::from_millis(1)));
    }

    #[test]
    fn clearing_routes_forces_resync() {
        let receiver = test_receiver(TestLink::new("peer"));
        receiver.handle_route_update_request(update(0, 2, vec![advertised("example.a")], vec![]));
        assert_eq!(receiver.clear_routes(), vec![AddressPrefix::new("example.a")]);
        assert_eq!(receiver.epoch(), 0);
        assert!(receiver.routing_table_id().is_none());
        assert!(receiver.incoming_prefixes().is_empty());
    }
}
