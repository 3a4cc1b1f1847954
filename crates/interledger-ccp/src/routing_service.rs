use crate::{
    codec::{CcpCodec, JsonCcpCodec},
    errors::{reject, RoutingError},
    packet::{
        validate_ccp_prepare, Mode, RouteUpdateRequest, CCP_CONTROL_DESTINATION, CCP_RESPONSE,
        CCP_UPDATE_DESTINATION,
    },
    ranking::PeerRouteComparator,
    receiver::{CcpReceiver, RouteUpdateOutcome},
    routes::{IncomingRoute, Route, RouteUpdate, RoutingTableEntry, SELF_ACCOUNT_ID},
    routing_table::{ForwardingRoutingTable, RoutingTable},
    sender::CcpSender,
    settings::SharedSettings,
};
use futures::{
    channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender},
    StreamExt,
};
use interledger_packet::{Address, AddressPrefix, ErrorCode, Prepare};
use interledger_service::{
    AccountDirectory, AccountId, AccountSettings, IlpResult, Link, LinkEvent, LinkEventKind,
};
use parking_lot::{Mutex, RwLock};
use std::{
    collections::{hash_map::Entry, HashMap, HashSet},
    sync::Arc,
    time::SystemTime,
};
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

/// Decides whether a route may be left out of our advertisements because a
/// less specific route we already advertise covers it.
pub trait DragonFilter: Send + Sync + 'static {
    fn should_filter(&self, prefix: &AddressPrefix, route: &Route) -> bool;
}

/// Never suppresses anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDragonFilter;

impl DragonFilter for NoDragonFilter {
    fn should_filter(&self, _prefix: &AddressPrefix, _route: &Route) -> bool {
        false
    }
}

/// A connected account we exchange routes with, together with the protocol
/// state for each direction.
#[derive(Clone)]
pub struct RoutableAccount {
    account: AccountSettings,
    ccp_sender: Arc<CcpSender>,
    ccp_receiver: Arc<CcpReceiver>,
}

impl RoutableAccount {
    pub fn new(
        account: AccountSettings,
        ccp_sender: Arc<CcpSender>,
        ccp_receiver: Arc<CcpReceiver>,
    ) -> Self {
        RoutableAccount {
            account,
            ccp_sender,
            ccp_receiver,
        }
    }

    pub fn account(&self) -> &AccountSettings {
        &self.account
    }

    pub fn ccp_sender(&self) -> &Arc<CcpSender> {
        &self.ccp_sender
    }

    pub fn ccp_receiver(&self) -> &Arc<CcpReceiver> {
        &self.ccp_receiver
    }
}

type UnregisterCallback = Box<dyn FnOnce() + Send + Sync>;

/// Builder for [`RoutingService`].
pub struct RoutingServiceBuilder {
    settings: SharedSettings,
    directory: Arc<dyn AccountDirectory>,
    codec: Arc<dyn CcpCodec>,
    dragon_filter: Arc<dyn DragonFilter>,
}

impl RoutingServiceBuilder {
    pub fn new(settings: SharedSettings, directory: Arc<dyn AccountDirectory>) -> Self {
        RoutingServiceBuilder {
            settings,
            directory,
            codec: Arc::new(JsonCcpCodec),
            dragon_filter: Arc::new(NoDragonFilter),
        }
    }

    pub fn codec(&mut self, codec: Arc<dyn CcpCodec>) -> &mut Self {
        self.codec = codec;
        self
    }

    pub fn dragon_filter(&mut self, dragon_filter: Arc<dyn DragonFilter>) -> &mut Self {
        self.dragon_filter = dragon_filter;
        self
    }

    pub fn build(&self) -> RoutingService {
        let (link_events, link_event_receiver) = unbounded();
        RoutingService {
            settings: self.settings.clone(),
            directory: self.directory.clone(),
            codec: self.codec.clone(),
            originated_routes: Arc::new(RwLock::new(RoutingTable::new())),
            local_table: Arc::new(RwLock::new(RoutingTable::new())),
            incoming_table: Arc::new(RwLock::new(ForwardingRoutingTable::default())),
            outgoing_table: Arc::new(RwLock::new(ForwardingRoutingTable::default())),
            tracked_accounts: Arc::new(RwLock::new(HashMap::new())),
            unregister_callbacks: Arc::new(Mutex::new(HashMap::new())),
            comparator: PeerRouteComparator::new(self.directory.clone()),
            dragon_filter: self.dragon_filter.clone(),
            link_events,
            link_event_receiver: Arc::new(Mutex::new(Some(link_event_receiver))),
            recompute_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Keeps the node's routing tables up to date and exchanges routes with
/// its peers.
///
/// Routes flow through three tables:
/// - each peer's receiver holds the routes that peer advertised,
/// - the local table holds the best route per prefix, picked from static
///   routes, routes we originate and the peers' routes,
/// - the outgoing table holds what we advertise, with an epoch log the
///   senders drain to each peer.
#[derive(Clone)]
pub struct RoutingService {
    settings: SharedSettings,
    directory: Arc<dyn AccountDirectory>,
    codec: Arc<dyn CcpCodec>,
    /// Routes this node originates: its own address, the default route and
    /// one per child account. Rebuilt by `reload_local_routes`.
    originated_routes: Arc<RwLock<RoutingTable<Route>>>,
    local_table: Arc<RwLock<RoutingTable<Route>>>,
    /// The peer route currently ranked best for each prefix.
    incoming_table: Arc<RwLock<ForwardingRoutingTable<IncomingRoute>>>,
    outgoing_table: Arc<RwLock<ForwardingRoutingTable<RouteUpdate>>>,
    tracked_accounts: Arc<RwLock<HashMap<AccountId, RoutableAccount>>>,
    unregister_callbacks: Arc<Mutex<HashMap<AccountId, UnregisterCallback>>>,
    comparator: PeerRouteComparator,
    dragon_filter: Arc<dyn DragonFilter>,
    link_events: UnboundedSender<LinkEvent>,
    link_event_receiver: Arc<Mutex<Option<UnboundedReceiver<LinkEvent>>>>,
    /// Serializes route recomputation so the local, incoming and outgoing
    /// tables always reflect the last computation to finish.
    recompute_lock: Arc<Mutex<()>>,
}

impl RoutingService {
    /// Load our own routes and subscribe to the links of every account in
    /// the directory.
    pub fn start(&self) -> Result<(), RoutingError> {
        self.reload_local_routes()?;
        for account in self.directory.get_all_accounts() {
            if let Err(err) = self.register_account(&account.id) {
                warn!(account_id = %account.id, "Not registering account: {}", err);
            }
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        let account_ids: Vec<AccountId> = self.unregister_callbacks.lock().keys().cloned().collect();
        for account_id in account_ids {
            if let Err(err) = self.unregister_account(&account_id) {
                error!(account_id = %account_id, "Error unregistering account: {}", err);
            }
        }
    }

    /// Subscribe to the lifecycle events of the account's link. Registering
    /// an account twice has no effect.
    pub fn register_account(&self, account_id: &AccountId) -> Result<(), RoutingError> {
        let mut callbacks = self.unregister_callbacks.lock();
        if callbacks.contains_key(account_id) {
            warn!(account_id = %account_id, "Account is already registered for routing");
            return Ok(());
        }
        if self.directory.get_account(account_id).is_none() {
            return Err(RoutingError::AccountNotFound(account_id.clone()));
        }
        let link = self
            .directory
            .get_link(account_id)
            .ok_or_else(|| RoutingError::LinkNotFound(account_id.clone()))?;

        let listener_id = Uuid::new_v4();
        link.add_event_listener(listener_id, self.link_events.clone());
        callbacks.insert(
            account_id.clone(),
            Box::new(move || link.remove_event_listener(&listener_id)),
        );
        debug!(account_id = %account_id, "Registered account for routing");
        Ok(())
    }

    /// Unsubscribe from the account's link and withdraw whatever it had
    /// contributed to our routes.
    pub fn unregister_account(&self, account_id: &AccountId) -> Result<(), RoutingError> {
        let callback = self.unregister_callbacks.lock().remove(account_id);
        match callback {
            Some(unsubscribe) => unsubscribe(),
            None => debug!(account_id = %account_id, "Account was not registered"),
        }
        self.untrack_account(account_id)
    }

    /// Process link events until every sender of the channel is gone. Only
    /// the first call consumes events.
    pub async fn run(&self) {
        let receiver = self.link_event_receiver.lock().take();
        let mut receiver = match receiver {
            Some(receiver) => receiver,
            None => {
                warn!("Routing service event loop is already running");
                return;
            }
        };
        while let Some(event) = receiver.next().await {
            self.handle_link_event(event).await;
        }
    }

    pub async fn handle_link_event(&self, event: LinkEvent) {
        let account_id = event.account_id;
        match event.kind {
            LinkEventKind::Connected => {
                if let Err(err) = self.handle_connect(&account_id).await {
                    error!(account_id = %account_id, "Error handling link connect: {}", err);
                }
            }
            LinkEventKind::Disconnected => {
                if let Err(err) = self.untrack_account(&account_id) {
                    error!(account_id = %account_id, "Error handling link disconnect: {}", err);
                }
            }
            LinkEventKind::Error(message) => {
                error!(account_id = %account_id, "Link error: {}", message);
            }
        }
    }

    async fn handle_connect(&self, account_id: &AccountId) -> Result<(), RoutingError> {
        let link = self
            .directory
            .get_link(account_id)
            .ok_or_else(|| RoutingError::LinkNotFound(account_id.clone()))?;
        if !link.is_connected() {
            error!(account_id = %account_id, "Got connect event but link is not connected");
            return Ok(());
        }

        // A reconnect only needs a fresh route control request
        if let Some(tracked) = self.get_tracked_account(account_id) {
            debug!(account_id = %account_id, "Tracked account reconnected");
            if tracked.account.should_receive_routes() {
                self.request_routes(&tracked).await;
            }
            return Ok(());
        }

        let account = self
            .directory
            .get_account(account_id)
            .ok_or_else(|| RoutingError::AccountNotFound(account_id.clone()))?;
        if !account.should_send_routes() && !account.should_receive_routes() {
            debug!(account_id = %account_id, "Not tracking account that neither sends nor receives routes");
            return Ok(());
        }

        let routable = self.build_routable_account(account, link);
        self.set_tracked_account(routable.clone())?;
        if routable.account.should_receive_routes() {
            self.request_routes(&routable).await;
        }
        self.reload_local_routes()?;

        if routable.account.should_send_routes() {
            tokio::spawn(routable.ccp_sender.clone().broadcast_routes());
        }
        Ok(())
    }

    fn build_routable_account(
        &self,
        account: AccountSettings,
        link: Arc<dyn Link>,
    ) -> RoutableAccount {
        let ccp_sender = CcpSender::new(
            account.id.clone(),
            link.clone(),
            self.codec.clone(),
            self.settings.clone(),
            self.outgoing_table.clone(),
        );
        if !account.should_send_routes() {
            ccp_sender.stop_broadcasting();
        }
        let ccp_receiver = CcpReceiver::new(
            account.id.clone(),
            link,
            self.codec.clone(),
            self.settings.clone(),
        );
        RoutableAccount::new(account, Arc::new(ccp_sender), Arc::new(ccp_receiver))
    }

    async fn request_routes(&self, routable: &RoutableAccount) {
        match routable.ccp_receiver.send_route_control().await {
            Ok(_) => trace!(account_id = %routable.account.id, "Peer accepted route control request"),
            Err(reject) => warn!(
                account_id = %routable.account.id,
                "Route control request was rejected: {:?}",
                reject
            ),
        }
    }

    /// Stop exchanging routes with the account and recompute every prefix it
    /// had advertised to us.
    fn untrack_account(&self, account_id: &AccountId) -> Result<(), RoutingError> {
        let removed = self.tracked_accounts.write().remove(account_id);
        let routable = match removed {
            Some(routable) => routable,
            None => {
                trace!(account_id = %account_id, "Account was not tracked");
                return Ok(());
            }
        };
        debug!(account_id = %account_id, "No longer tracking account for routing");
        routable.ccp_sender.stop_broadcasting();

        for prefix in routable.ccp_receiver.incoming_prefixes() {
            self.update_prefix(&prefix)?;
        }
        if routable.account.is_child() {
            let child_prefix = self.child_prefix(account_id)?;
            self.update_prefix(&child_prefix)?;
        }
        Ok(())
    }

    pub fn get_tracked_account(&self, account_id: &AccountId) -> Option<RoutableAccount> {
        self.tracked_accounts.read().get(account_id).cloned()
    }

    pub fn set_tracked_account(&self, routable: RoutableAccount) -> Result<(), RoutingError> {
        match self.tracked_accounts.write().entry(routable.account.id.clone()) {
            Entry::Occupied(entry) => Err(RoutingError::AccountAlreadyTracked(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(routable);
                Ok(())
            }
        }
    }

    fn child_prefix(&self, account_id: &AccountId) -> Result<AddressPrefix, RoutingError> {
        let operator_address = self.settings.read().operator_address.clone();
        Ok(AddressPrefix::from(
            operator_address.with_suffix(account_id.as_str())?,
        ))
    }

    /// Rebuild the routes we originate and recompute every prefix they, or
    /// the static routes, touch.
    pub fn reload_local_routes(&self) -> Result<(), RoutingError> {
        let _recompute = self.recompute_lock.lock();
        let (operator_address, routing) = {
            let settings = self.settings.read();
            (
                settings.operator_address.clone(),
                settings.global_routing_settings.clone(),
            )
        };
        let secret = &routing.routing_secret;

        let default_route_account = if routing.use_parent_for_default_route {
            self.directory
                .get_primary_parent_account()
                .ok_or(RoutingError::MissingParentAccount)?
                .id
        } else {
            match routing.default_route {
                Some(ref account_id) if self.directory.get_account(account_id).is_some() => {
                    account_id.clone()
                }
                other => return Err(RoutingError::MissingDefaultRouteAccount(other)),
            }
        };

        let mut routes = vec![
            Route::originated(
                AddressPrefix::from(&operator_address),
                SELF_ACCOUNT_ID.clone(),
                secret,
            ),
            Route::originated(routing.global_prefix.clone(), default_route_account, secret),
        ];
        for account in self.directory.get_all_accounts() {
            if account.is_child() {
                let child_prefix = self.child_prefix(&account.id)?;
                routes.push(Route::originated(child_prefix, account.id, secret));
            }
        }

        let previous_prefixes = {
            let mut originated_routes = self.originated_routes.write();
            let previous_prefixes = originated_routes.get_all_prefixes();
            originated_routes.reset();
            for route in routes.iter() {
                originated_routes.add_route(route.clone());
            }
            previous_prefixes
        };
        debug!("Reloaded {} local routes", routes.len());

        let mut seen = HashSet::new();
        let prefixes = routes
            .into_iter()
            .map(|route| route.route_prefix)
            .chain(previous_prefixes)
            .chain(
                routing
                    .static_routes
                    .into_iter()
                    .map(|static_route| static_route.target_prefix),
            )
            .filter(|prefix| seen.insert(prefix.clone()))
            .collect::<Vec<_>>();
        for prefix in prefixes.iter() {
            self.recompute_prefix(prefix)?;
        }
        Ok(())
    }

    /// Recompute the best route for `prefix` and, if its next hop changed,
    /// update the local table and what we advertise.
    pub fn update_prefix(&self, prefix: &AddressPrefix) -> Result<(), RoutingError> {
        let _recompute = self.recompute_lock.lock();
        self.recompute_prefix(prefix)
    }

    /// Callers hold `recompute_lock`.
    fn recompute_prefix(&self, prefix: &AddressPrefix) -> Result<(), RoutingError> {
        let best_peer_route = self.get_best_peer_route_for_prefix(prefix)?;
        {
            let mut incoming_table = self.incoming_table.write();
            match best_peer_route {
                Some(ref route) => {
                    incoming_table.add_route(route.clone());
                }
                None => {
                    incoming_table.remove_route(prefix);
                }
            }
        }
        let new_best_route = self.select_route(prefix, best_peer_route);

        let current_next_hop = self
            .local_table
            .read()
            .get_route_by_prefix(prefix)
            .map(|route| route.next_hop_account_id.clone());
        let new_next_hop = new_best_route
            .as_ref()
            .map(|route| route.next_hop_account_id.clone());
        if current_next_hop == new_next_hop {
            return Ok(());
        }

        match new_best_route {
            Some(ref route) => {
                debug!(
                    "New best route for prefix {}. Old next hop: {:?}, new next hop: {}",
                    prefix, current_next_hop, route.next_hop_account_id
                );
                self.local_table.write().add_route(route.clone());
            }
            None => {
                debug!("No more routes available for prefix {}", prefix);
                self.local_table.write().remove_route(prefix);
            }
        }
        self.update_forwarding_route(prefix, new_best_route.as_ref());
        Ok(())
    }

    /// The best route for `prefix`: a static route, then a route we
    /// originate, then the best route any peer advertised.
    pub fn get_best_route_for_prefix(
        &self,
        prefix: &AddressPrefix,
    ) -> Result<Option<Route>, RoutingError> {
        let best_peer_route = self.get_best_peer_route_for_prefix(prefix)?;
        Ok(self.select_route(prefix, best_peer_route))
    }

    fn select_route(
        &self,
        prefix: &AddressPrefix,
        best_peer_route: Option<IncomingRoute>,
    ) -> Option<Route> {
        self.get_static_route_for_prefix(prefix)
            .or_else(|| {
                self.originated_routes
                    .read()
                    .get_route_by_prefix(prefix)
                    .cloned()
            })
            .or_else(|| best_peer_route.map(Route::from))
    }

    fn get_static_route_for_prefix(&self, prefix: &AddressPrefix) -> Option<Route> {
        let settings = self.settings.read();
        let routing = &settings.global_routing_settings;
        let static_route = routing
            .static_routes
            .iter()
            .find(|static_route| &static_route.target_prefix == prefix)?;
        if self
            .directory
            .get_account(&static_route.peer_account_id)
            .is_none()
        {
            warn!(
                "Ignoring configured route, account does not exist. prefix={} account_id={}",
                prefix, static_route.peer_account_id
            );
            return None;
        }
        Some(Route::originated(
            prefix.clone(),
            static_route.peer_account_id.clone(),
            &routing.routing_secret,
        ))
    }

    fn get_best_peer_route_for_prefix(
        &self,
        prefix: &AddressPrefix,
    ) -> Result<Option<IncomingRoute>, RoutingError> {
        let candidates: Vec<Option<IncomingRoute>> = self
            .tracked_accounts
            .read()
            .values()
            .map(|routable| routable.ccp_receiver.get_incoming_route_for_prefix(prefix))
            .collect();
        self.comparator.best_route(candidates)
    }

    fn is_advertisable(
        &self,
        prefix: &AddressPrefix,
        route: &Route,
        operator_address: &Address,
        global_prefix: &AddressPrefix,
    ) -> bool {
        let operator_prefix = AddressPrefix::from(operator_address);
        if prefix.root_prefix() != *global_prefix {
            trace!("Not advertising route outside of the global prefix: {}", prefix);
            false
        } else if prefix == global_prefix {
            trace!("Not advertising the default route");
            false
        } else if prefix != &operator_prefix
            && prefix.starts_with(&operator_prefix)
            && route.path.len() == 1
        {
            trace!("Not advertising local customer route: {}", prefix);
            false
        } else if self.dragon_filter.should_filter(prefix, route) {
            trace!("Route suppressed by DRAGON filter: {}", prefix);
            false
        } else {
            true
        }
    }

    /// Record the route we now advertise for `prefix` (or its withdrawal) in
    /// the outgoing table, then re-check the more specific prefixes below it.
    fn update_forwarding_route(&self, prefix: &AddressPrefix, local_route: Option<&Route>) {
        let (operator_address, global_prefix, max_epoch_log_len) = {
            let settings = self.settings.read();
            (
                settings.operator_address.clone(),
                settings.global_routing_settings.global_prefix.clone(),
                settings.global_routing_settings.max_epoch_log_len,
            )
        };
        let forwarding_route = local_route
            .map(|route| route.to_forwarding_route(&operator_address))
            .filter(|route| self.is_advertisable(prefix, route, &operator_address, &global_prefix));

        let more_specific_prefixes = {
            let mut outgoing_table = self.outgoing_table.write();
            let current = outgoing_table.get_route_by_prefix(prefix).cloned();
            let current_next_hop = current
                .as_ref()
                .and_then(|update| update.next_hop_account_id());
            let new_next_hop = forwarding_route
                .as_ref()
                .map(|route| &route.next_hop_account_id);
            if current_next_hop == new_next_hop {
                return;
            }

            let current_epoch = outgoing_table.get_current_epoch();
            let epoch = current_epoch + 1;
            let update = RouteUpdate {
                route_prefix: prefix.clone(),
                route: forwarding_route,
                epoch,
            };
            debug!("Logging route update: {:?}", update);
            if let Some(previous) = current {
                outgoing_table.reset_epoch_value(previous.epoch);
            }
            outgoing_table.add_route(update.clone());
            outgoing_table.set_epoch_value(epoch, update);
            outgoing_table.prune_epoch_log(max_epoch_log_len);
            if !outgoing_table.compare_and_set_current_epoch(current_epoch, epoch) {
                error!(
                    "Outgoing routing table epoch moved while logging epoch {}",
                    epoch
                );
            }

            outgoing_table
                .get_keys_starting_with(prefix)
                .into_iter()
                .filter(|key| key != prefix)
                .collect::<Vec<_>>()
        };

        for more_specific_prefix in more_specific_prefixes {
            let local_route = self
                .local_table
                .read()
                .get_route_by_prefix(&more_specific_prefix)
                .cloned();
            self.update_forwarding_route(&more_specific_prefix, local_route.as_ref());
        }
    }

    /// Handle a CCP packet (route control or route update) from one of our
    /// accounts.
    pub async fn handle_ccp_prepare(&self, from: &AccountId, prepare: Prepare) -> IlpResult {
        let (operator_address, global_prefix) = {
            let settings = self.settings.read();
            (
                settings.operator_address.clone(),
                settings.global_routing_settings.global_prefix.clone(),
            )
        };
        let routable = match self.get_tracked_account(from) {
            Some(routable) => routable,
            None => {
                return Err(reject(
                    ErrorCode::F00_BAD_REQUEST,
                    "Account is not tracked for routing",
                    &operator_address,
                ))
            }
        };

        let destination = prepare.destination();
        if destination != &*CCP_CONTROL_DESTINATION && destination != &*CCP_UPDATE_DESTINATION {
            return Err(reject(
                ErrorCode::F02_UNREACHABLE,
                "Packet is not a CCP message",
                &operator_address,
            ));
        }
        if let Err(err) = validate_ccp_prepare(&prepare, SystemTime::now()) {
            return Err(reject(
                ErrorCode::F00_BAD_REQUEST,
                &err.to_string(),
                &operator_address,
            ));
        }

        if destination == &*CCP_CONTROL_DESTINATION {
            self.handle_route_control_request(&routable, &prepare, &operator_address)
        } else {
            self.handle_route_update_request(&routable, &prepare, &operator_address, &global_prefix)
        }
    }

    fn handle_route_control_request(
        &self,
        routable: &RoutableAccount,
        prepare: &Prepare,
        operator_address: &Address,
    ) -> IlpResult {
        if !routable.account.should_send_routes() {
            return Err(reject(
                ErrorCode::F00_BAD_REQUEST,
                "We are not configured to send routes to you, sorry",
                operator_address,
            ));
        }
        let request = self.codec.decode_control(prepare.data()).map_err(|err| {
            debug!(account_id = %routable.account.id, "Invalid route control request: {}", err);
            reject(
                ErrorCode::F00_BAD_REQUEST,
                "Invalid route control request",
                operator_address,
            )
        })?;
        debug!(
            account_id = %routable.account.id,
            "Got route control request: {:?}",
            request
        );

        routable.ccp_sender.handle_route_control_request(&request);
        if request.mode == Mode::Sync {
            let ccp_sender = routable.ccp_sender.clone();
            tokio::spawn(async move {
                // Failures are logged by the sender
                let _ = ccp_sender.send_route_update().await;
            });
        }
        Ok(CCP_RESPONSE.clone())
    }

    fn handle_route_update_request(
        &self,
        routable: &RoutableAccount,
        prepare: &Prepare,
        operator_address: &Address,
        global_prefix: &AddressPrefix,
    ) -> IlpResult {
        if !routable.account.should_receive_routes() {
            return Err(reject(
                ErrorCode::F00_BAD_REQUEST,
                "Your route broadcasts are not accepted here",
                operator_address,
            ));
        }
        let request = self.codec.decode_update(prepare.data()).map_err(|err| {
            debug!(account_id = %routable.account.id, "Invalid route update request: {}", err);
            reject(
                ErrorCode::F00_BAD_REQUEST,
                "Invalid route update request",
                operator_address,
            )
        })?;
        debug!(
            account_id = %routable.account.id,
            "Got route update request: {:?}",
            request
        );

        let request = filter_routes(request, operator_address, global_prefix);
        let from_epoch_index = request.from_epoch_index;
        let receiver = routable.ccp_receiver.clone();
        let changed_prefixes = match receiver.apply_route_update(request) {
            RouteUpdateOutcome::Applied(prefixes) => prefixes,
            RouteUpdateOutcome::Heartbeat | RouteUpdateOutcome::Stale => Vec::new(),
            RouteUpdateOutcome::Invalid => {
                return Err(reject(
                    ErrorCode::F00_BAD_REQUEST,
                    "Invalid route update request",
                    operator_address,
                ));
            }
            RouteUpdateOutcome::Gap { expected_epoch } => {
                warn!(
                    account_id = %routable.account.id,
                    "Gap in route updates, requesting updates from epoch {}",
                    expected_epoch
                );
                let message = format!(
                    "Gap in routing table. Expected epoch: {}, got from_epoch: {}",
                    expected_epoch, from_epoch_index
                );
                tokio::spawn(async move {
                    // Failures are logged by the receiver
                    let _ = receiver.send_route_control().await;
                });
                return Err(reject(
                    ErrorCode::F00_BAD_REQUEST,
                    &message,
                    operator_address,
                ));
            }
        };

        for prefix in changed_prefixes.iter() {
            if let Err(err) = self.update_prefix(prefix) {
                error!(
                    account_id = %routable.account.id,
                    "Error updating route for prefix {}: {}",
                    prefix,
                    err
                );
                return Err(reject(
                    ErrorCode::T00_INTERNAL_ERROR,
                    "Error processing route update",
                    operator_address,
                ));
            }
        }
        Ok(CCP_RESPONSE.clone())
    }

    /// Drop the routes of every peer whose hold-down time has passed, and ask
    /// those peers for a fresh copy.
    pub async fn purge_expired_routes(&self, now: SystemTime) {
        let expired: Vec<RoutableAccount> = self
            .tracked_accounts
            .read()
            .values()
            .filter(|routable| routable.ccp_receiver.is_expired(now))
            .cloned()
            .collect();
        for routable in expired {
            let prefixes = routable.ccp_receiver.clear_routes();
            debug!(
                account_id = %routable.account.id,
                "Routes expired, withdrawing {} prefixes",
                prefixes.len()
            );
            for prefix in prefixes.iter() {
                if let Err(err) = self.update_prefix(prefix) {
                    error!(account_id = %routable.account.id, "Error withdrawing expired route: {}", err);
                }
            }
            self.request_routes(&routable).await;
        }
    }

    /// Longest-prefix lookup in the local table.
    pub fn find_best_next_hop(&self, destination: &Address) -> Option<Route> {
        self.local_table
            .read()
            .find_next_hop_route(destination)
            .cloned()
    }

    pub fn local_routing_table(&self) -> Arc<RwLock<RoutingTable<Route>>> {
        self.local_table.clone()
    }

    pub fn incoming_routing_table(&self) -> Arc<RwLock<ForwardingRoutingTable<IncomingRoute>>> {
        self.incoming_table.clone()
    }

    pub fn outgoing_routing_table(&self) -> Arc<RwLock<ForwardingRoutingTable<RouteUpdate>>> {
        self.outgoing_table.clone()
    }
}

/// Remove routes we should never accept before they reach the receiver.
fn filter_routes(
    mut update: RouteUpdateRequest,
    operator_address: &Address,
    global_prefix: &AddressPrefix,
) -> RouteUpdateRequest {
    let operator_prefix = AddressPrefix::from(operator_address);
    update.new_routes.retain(|route| {
        if route.prefix.root_prefix() != *global_prefix {
            warn!("Got route for a different global prefix: {:?}", route);
            false
        } else if route.prefix == *global_prefix {
            warn!("Got route broadcast for the global prefix: {:?}", route);
            false
        } else if route.prefix.starts_with(&operator_prefix) {
            debug!(
                "Ignoring route broadcast for a prefix that starts with our own address: {:?}",
                route
            );
            false
        } else if route.path.contains(operator_address) {
            debug!(
                "Ignoring route broadcast for a route that includes us: {:?}",
                route
            );
            false
        } else {
            true
        }
    });
    update
}
