use crate::{
    codec::CcpCodec,
    errors::{reject, reject_from_link_error},
    packet::{
        ccp_prepare, Mode, RouteControlRequest, RouteUpdateRequest, CCP_RESPONSE,
        CCP_UPDATE_DESTINATION,
    },
    routes::RouteUpdate,
    routing_table::ForwardingRoutingTable,
    settings::SharedSettings,
};
use interledger_packet::ErrorCode;
use interledger_service::{AccountId, IlpResult, Link};
use parking_lot::{Mutex, RwLock};
use std::{
    cmp::min,
    convert::TryFrom,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::{debug, error, trace};

#[derive(Debug)]
struct SenderState {
    /// Epoch of our outgoing table the peer is known to have applied.
    last_known_epoch: u32,
    mode: Mode,
}

/// Sends the changes in our outgoing routing table to one peer.
///
/// The sender stays idle until the peer asks for routes with a `Sync` route
/// control request.
pub struct CcpSender {
    peer_account_id: AccountId,
    link: Arc<dyn Link>,
    codec: Arc<dyn CcpCodec>,
    settings: SharedSettings,
    outgoing_table: Arc<RwLock<ForwardingRoutingTable<RouteUpdate>>>,
    state: Mutex<SenderState>,
    broadcasting: AtomicBool,
}

impl CcpSender {
    pub fn new(
        peer_account_id: AccountId,
        link: Arc<dyn Link>,
        codec: Arc<dyn CcpCodec>,
        settings: SharedSettings,
        outgoing_table: Arc<RwLock<ForwardingRoutingTable<RouteUpdate>>>,
    ) -> Self {
        CcpSender {
            peer_account_id,
            link,
            codec,
            settings,
            outgoing_table,
            state: Mutex::new(SenderState {
                last_known_epoch: 0,
                mode: Mode::Idle,
            }),
            broadcasting: AtomicBool::new(true),
        }
    }

    pub fn peer_account_id(&self) -> &AccountId {
        &self.peer_account_id
    }

    pub fn handle_route_control_request(&self, request: &RouteControlRequest) {
        let mut state = self.state.lock();
        match request.mode {
            Mode::Idle => {
                debug!(account_id = %self.peer_account_id, "Peer asked us to stop sending route updates");
                state.mode = Mode::Idle;
            }
            Mode::Sync => {
                let table = self.outgoing_table.read();
                state.mode = Mode::Sync;
                state.last_known_epoch =
                    if request.last_known_routing_table_id == Some(table.routing_table_id()) {
                        min(request.last_known_epoch, table.get_current_epoch())
                    } else {
                        0
                    };
                debug!(
                    account_id = %self.peer_account_id,
                    "Peer requested route updates from epoch {}",
                    state.last_known_epoch
                );
            }
        }
    }

    /// Collect everything the peer has not seen yet into one update. If the
    /// epoch log no longer reaches back that far, the update carries our whole
    /// table starting from epoch zero, withdrawals included.
    pub fn create_route_update(&self) -> RouteUpdateRequest {
        let last_known_epoch = self.state.lock().last_known_epoch;
        let (operator_address, hold_down_time) = {
            let settings = self.settings.read();
            (
                settings.operator_address.clone(),
                u32::try_from(settings.global_routing_settings.route_expiry_ms)
                    .unwrap_or(u32::max_value()),
            )
        };

        let table = self.outgoing_table.read();
        let current_epoch_index = table.get_current_epoch();
        let (from_epoch_index, updates) = match table.updates_since(last_known_epoch) {
            Ok(updates) => (last_known_epoch, updates),
            Err(gap) => {
                debug!(
                    account_id = %self.peer_account_id,
                    "Sending full routing table: {}",
                    gap
                );
                let mut updates = table.current_routes();
                updates.extend(table.current_withdrawals());
                (0, updates)
            }
        };

        let mut new_routes = Vec::new();
        let mut withdrawn_routes = Vec::new();
        for update in updates {
            match update.route {
                Some(route) => new_routes.push(route.to_advertised_route()),
                None => withdrawn_routes.push(update.route_prefix),
            }
        }

        RouteUpdateRequest {
            routing_table_id: table.routing_table_id(),
            current_epoch_index,
            from_epoch_index,
            to_epoch_index: current_epoch_index,
            hold_down_time,
            speaker: operator_address,
            new_routes,
            withdrawn_routes,
        }
    }

    /// Send the peer whatever it has not seen yet. Updates without routes are
    /// still sent and serve as heartbeats.
    pub async fn send_route_update(&self) -> IlpResult {
        if !self.is_broadcasting() || self.mode() == Mode::Idle {
            trace!(account_id = %self.peer_account_id, "Not sending route update to idle peer");
            return Ok(CCP_RESPONSE.clone());
        }

        let (operator_address, expiry) = {
            let settings = self.settings.read();
            (
                settings.operator_address.clone(),
                settings.global_routing_settings.route_expiry(),
            )
        };
        let request = self.create_route_update();
        let data = match self.codec.encode_update(&request) {
            Ok(data) => data,
            Err(err) => {
                error!(account_id = %self.peer_account_id, "Unable to encode route update: {}", err);
                return Err(reject(
                    ErrorCode::F99_APPLICATION_ERROR,
                    &err.to_string(),
                    &operator_address,
                ));
            }
        };

        debug!(
            account_id = %self.peer_account_id,
            "Sending route update for epochs from: {} to: {} ({} new, {} withdrawn)",
            request.from_epoch_index,
            request.to_epoch_index,
            request.new_routes.len(),
            request.withdrawn_routes.len()
        );
        let prepare = ccp_prepare(&CCP_UPDATE_DESTINATION, &data, expiry);
        match self.link.send_packet(prepare).await {
            Ok(fulfill) => {
                self.state.lock().last_known_epoch = request.to_epoch_index;
                Ok(fulfill)
            }
            Err(err) => {
                let reject = reject_from_link_error(err, &self.peer_account_id, &operator_address);
                error!(
                    account_id = %self.peer_account_id,
                    "Error sending route update: {:?}",
                    reject
                );
                Err(reject)
            }
        }
    }

    /// Send route updates until the sender is stopped, waiting the configured
    /// broadcast interval before each round. The interval is read again every
    /// round, so settings changes reach running loops.
    pub async fn broadcast_routes(self: Arc<Self>) {
        loop {
            let interval = self
                .settings
                .read()
                .global_routing_settings
                .route_broadcast_interval();
            tokio::time::delay_for(interval).await;
            if !self.is_broadcasting() {
                debug!(account_id = %self.peer_account_id, "Stopped broadcasting routes");
                break;
            }
            // Failures are already logged and the next round retries
            let _ = self.send_route_update().await;
        }
    }

    pub fn stop_broadcasting(&self) {
        self.broadcasting.store(false, Ordering::SeqCst);
    }

    pub fn is_broadcasting(&self) -> bool {
        self.broadcasting.load(Ordering::SeqCst)
    }

    pub fn mode(&self) -> Mode {
        self.state.lock().mode
    }

    pub fn last_known_epoch(&self) -> u32 {
        self.state.lock().last_known_epoch
    }
}
