/* kcov-ignore-start */
use crate::{
    codec::JsonCcpCodec,
    packet::CCP_RESPONSE,
    receiver::CcpReceiver,
    routes::RouteUpdate,
    routing_service::{RoutingService, RoutingServiceBuilder},
    routing_table::ForwardingRoutingTable,
    sender::CcpSender,
    settings::{ConnectorSettings, GlobalRoutingSettings, SharedSettings},
};
use async_trait::async_trait;
use futures::channel::mpsc::UnboundedSender;
use interledger_packet::{Address, Fulfill, Prepare};
use interledger_service::{
    AccountDirectory, AccountId, AccountRelationship, AccountSettings, Link, LinkError, LinkEvent,
};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use uuid::Uuid;

pub static OPERATOR_ADDRESS: Lazy<Address> = Lazy::new(|| Address::new("example.connector"));
pub const ROUTING_SECRET: [u8; 32] = [7; 32];

pub static PARENT_ACCOUNT: Lazy<AccountSettings> =
    Lazy::new(|| AccountSettings::new(AccountId::new("parent"), AccountRelationship::Parent));
pub static PEER_ACCOUNT: Lazy<AccountSettings> =
    Lazy::new(|| AccountSettings::new(AccountId::new("peer"), AccountRelationship::Peer));
pub static OTHER_PEER_ACCOUNT: Lazy<AccountSettings> =
    Lazy::new(|| AccountSettings::new(AccountId::new("other"), AccountRelationship::Peer));
pub static CHILD_ACCOUNT: Lazy<AccountSettings> =
    Lazy::new(|| AccountSettings::new(AccountId::new("child"), AccountRelationship::Child));
pub static NON_ROUTING_ACCOUNT: Lazy<AccountSettings> = Lazy::new(|| {
    AccountSettings::new(AccountId::new("quiet"), AccountRelationship::Peer)
        .send_routes(false)
        .receive_routes(false)
});

/// An in-memory link that records what it sends and answers with queued
/// responses, or with the CCP fulfill once the queue is empty.
pub struct TestLink {
    account_id: AccountId,
    connected: AtomicBool,
    sent: Mutex<Vec<Prepare>>,
    responses: Mutex<VecDeque<Result<Fulfill, LinkError>>>,
    listeners: Mutex<HashMap<Uuid, UnboundedSender<LinkEvent>>>,
}

impl TestLink {
    pub fn new(account_id: &'static str) -> Arc<TestLink> {
        Arc::new(TestLink {
            account_id: AccountId::new(account_id),
            connected: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            listeners: Mutex::new(HashMap::new()),
        })
    }

    pub fn respond_with(&self, response: Result<Fulfill, LinkError>) {
        self.responses.lock().push_back(response);
    }

    pub fn sent_packets(&self) -> Vec<Prepare> {
        self.sent.lock().clone()
    }

    pub fn clear_sent_packets(&self) {
        self.sent.lock().clear();
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn emit(&self, event: LinkEvent) {
        for listener in self.listeners.lock().values() {
            let _ = listener.unbounded_send(event.clone());
        }
    }
}

#[async_trait]
impl Link for TestLink {
    fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_packet(&self, prepare: Prepare) -> Result<Fulfill, LinkError> {
        self.sent.lock().push(prepare);
        let response = self.responses.lock().pop_front();
        response.unwrap_or_else(|| Ok(CCP_RESPONSE.clone()))
    }

    fn add_event_listener(&self, listener_id: Uuid, events: UnboundedSender<LinkEvent>) {
        self.listeners.lock().insert(listener_id, events);
    }

    fn remove_event_listener(&self, listener_id: &Uuid) {
        self.listeners.lock().remove(listener_id);
    }
}

#[derive(Clone, Default)]
pub struct TestDirectory {
    accounts: Arc<RwLock<Vec<AccountSettings>>>,
    links: Arc<RwLock<HashMap<AccountId, Arc<TestLink>>>>,
    route_weights: Arc<RwLock<HashMap<AccountId, u32>>>,
}

impl TestDirectory {
    /// Creates a directory where every account has a connected [`TestLink`].
    pub fn new(accounts: Vec<AccountSettings>) -> Self {
        let links = accounts
            .iter()
            .map(|account| {
                let link = Arc::new(TestLink {
                    account_id: account.id.clone(),
                    connected: AtomicBool::new(true),
                    sent: Mutex::new(Vec::new()),
                    responses: Mutex::new(VecDeque::new()),
                    listeners: Mutex::new(HashMap::new()),
                });
                (account.id.clone(), link)
            })
            .collect();
        TestDirectory {
            accounts: Arc::new(RwLock::new(accounts)),
            links: Arc::new(RwLock::new(links)),
            route_weights: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn test_link(&self, account_id: &AccountId) -> Arc<TestLink> {
        self.links.read()[account_id].clone()
    }

    pub fn remove_account(&self, account_id: &AccountId) {
        self.accounts.write().retain(|account| &account.id != account_id);
    }

    /// Overrides the relationship weight of the account's routes.
    pub fn set_route_weight(&self, account_id: &AccountId, weight: u32) {
        self.route_weights.write().insert(account_id.clone(), weight);
    }
}

impl AccountDirectory for TestDirectory {
    fn get_account(&self, account_id: &AccountId) -> Option<AccountSettings> {
        self.accounts
            .read()
            .iter()
            .find(|account| &account.id == account_id)
            .cloned()
    }

    fn get_all_accounts(&self) -> Vec<AccountSettings> {
        self.accounts.read().clone()
    }

    fn get_link(&self, account_id: &AccountId) -> Option<Arc<dyn Link>> {
        self.links
            .read()
            .get(account_id)
            .map(|link| link.clone() as Arc<dyn Link>)
    }

    fn route_weight(&self, account_id: &AccountId) -> Option<u32> {
        let account = self.get_account(account_id)?;
        let weight = self.route_weights.read().get(account_id).copied();
        Some(weight.unwrap_or_else(|| account.relationship.weight()))
    }
}

pub fn test_settings() -> SharedSettings {
    let mut routing = GlobalRoutingSettings::new(ROUTING_SECRET);
    routing.global_prefix = interledger_packet::AddressPrefix::new("example");
    routing.use_parent_for_default_route = true;
    ConnectorSettings::new(OPERATOR_ADDRESS.clone(), routing).into_shared()
}

pub fn test_outgoing_table() -> Arc<RwLock<ForwardingRoutingTable<RouteUpdate>>> {
    Arc::new(RwLock::new(ForwardingRoutingTable::default()))
}

pub fn test_receiver(link: Arc<TestLink>) -> CcpReceiver {
    CcpReceiver::new(
        link.account_id.clone(),
        link,
        Arc::new(JsonCcpCodec),
        test_settings(),
    )
}

pub fn test_sender(
    link: Arc<TestLink>,
    outgoing_table: Arc<RwLock<ForwardingRoutingTable<RouteUpdate>>>,
) -> CcpSender {
    CcpSender::new(
        link.account_id.clone(),
        link,
        Arc::new(JsonCcpCodec),
        test_settings(),
        outgoing_table,
    )
}

pub fn test_directory() -> TestDirectory {
    TestDirectory::new(vec![
        PARENT_ACCOUNT.clone(),
        PEER_ACCOUNT.clone(),
        OTHER_PEER_ACCOUNT.clone(),
        CHILD_ACCOUNT.clone(),
        NON_ROUTING_ACCOUNT.clone(),
    ])
}

/// A routing service for `example.connector` with a parent, two peers, a
/// child and an account that exchanges no routes. Local routes are loaded.
pub fn test_service() -> (RoutingService, TestDirectory) {
    test_service_with_settings(test_settings())
}

pub fn test_service_with_settings(settings: SharedSettings) -> (RoutingService, TestDirectory) {
    let directory = test_directory();
    let service = RoutingServiceBuilder::new(settings, Arc::new(directory.clone())).build();
    service
        .reload_local_routes()
        .expect("local routes should load");
    (service, directory)
}
/* kcov-ignore-end */
