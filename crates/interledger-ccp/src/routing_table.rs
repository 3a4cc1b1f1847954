use crate::{
    errors::EpochGap,
    routes::{RouteUpdate, RoutingTableEntry, RoutingTableId},
};
use interledger_packet::{Address, AddressPrefix};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::trace;

/// Routes keyed by their exact prefix. A prefix maps to at most one entry.
#[derive(Clone, Debug)]
pub struct RoutingTable<R> {
    routes: HashMap<AddressPrefix, R>,
}

impl<R: RoutingTableEntry> RoutingTable<R> {
    pub fn new() -> Self {
        RoutingTable {
            routes: HashMap::new(),
        }
    }

    /// Insert a route, returning the one it replaced.
    pub fn add_route(&mut self, route: R) -> Option<R> {
        self.routes.insert(route.route_prefix().clone(), route)
    }

    pub fn remove_route(&mut self, prefix: &AddressPrefix) -> Option<R> {
        self.routes.remove(prefix)
    }

    pub fn get_route_by_prefix(&self, prefix: &AddressPrefix) -> Option<&R> {
        self.routes.get(prefix)
    }

    /// Longest-prefix match: try the destination itself, then each of its
    /// ancestors, and finally the global prefix.
    pub fn find_next_hop_route(&self, destination: &Address) -> Option<&R> {
        let mut candidate = Some(AddressPrefix::from(destination));
        while let Some(prefix) = candidate {
            if let Some(route) = self.routes.get(&prefix) {
                return Some(route);
            }
            candidate = prefix.parent();
        }
        self.routes.get(&AddressPrefix::global())
    }

    pub fn get_all_prefixes(&self) -> Vec<AddressPrefix> {
        self.routes.keys().cloned().collect()
    }

    /// Every stored prefix equal to or more specific than `prefix`.
    pub fn get_keys_starting_with(&self, prefix: &AddressPrefix) -> Vec<AddressPrefix> {
        self.routes
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn for_each<F: FnMut(&R)>(&self, mut visit: F) {
        self.routes.values().for_each(|route| visit(route))
    }

    pub fn reset(&mut self) {
        self.routes.clear();
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<R: RoutingTableEntry> Default for RoutingTable<R> {
    fn default() -> Self {
        RoutingTable::new()
    }
}

/// A [`RoutingTable`] that also keeps a log of [`RouteUpdate`]s indexed by
/// epoch, so that peers can be sent only what changed since the epoch they
/// last saw.
///
/// Epoch `n` lives in slot `n`; the first slot is epoch 1. Superseded slots
/// are cleared in place and the oldest slots may be pruned, but no slot ever
/// changes its epoch.
#[derive(Debug)]
pub struct ForwardingRoutingTable<R> {
    id: RoutingTableId,
    table: RoutingTable<R>,
    current_epoch: AtomicU32,
    log: VecDeque<Option<RouteUpdate>>,
    /// Epoch of `log[0]`.
    log_start: u32,
}

impl<R: RoutingTableEntry> ForwardingRoutingTable<R> {
    pub fn new(id: RoutingTableId) -> Self {
        ForwardingRoutingTable {
            id,
            table: RoutingTable::new(),
            current_epoch: AtomicU32::new(0),
            log: VecDeque::new(),
            log_start: 1,
        }
    }

    pub fn routing_table_id(&self) -> RoutingTableId {
        self.id
    }

    pub fn get_current_epoch(&self) -> u32 {
        self.current_epoch.load(Ordering::SeqCst)
    }

    pub fn compare_and_set_current_epoch(&self, expected: u32, next: u32) -> bool {
        self.current_epoch
            .compare_exchange(expected, next, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn set_epoch_value(&mut self, epoch: u32, update: RouteUpdate) {
        if epoch < self.log_start {
            trace!("Not writing epoch {} which was already pruned", epoch);
            return;
        }
        let index = (epoch - self.log_start) as usize;
        while self.log.len() <= index {
            self.log.push_back(None);
        }
        self.log[index] = Some(update);
    }

    pub fn reset_epoch_value(&mut self, epoch: u32) {
        if epoch < self.log_start {
            return;
        }
        if let Some(slot) = self.log.get_mut((epoch - self.log_start) as usize) {
            *slot = None;
        }
    }

    /// The oldest epoch still held in the log.
    pub fn oldest_epoch(&self) -> u32 {
        self.log_start
    }

    /// Every update after `from_epoch` up to and including the current epoch,
    /// in epoch order. Fails if `from_epoch` is in the future or if slots the
    /// caller needs have already been pruned.
    pub fn updates_since(&self, from_epoch: u32) -> Result<Vec<RouteUpdate>, EpochGap> {
        let current = self.get_current_epoch();
        if from_epoch > current || from_epoch + 1 < self.log_start {
            return Err(EpochGap {
                requested: from_epoch,
                oldest: self.log_start,
                current,
            });
        }
        let skip = (from_epoch + 1 - self.log_start) as usize;
        let take = (current - from_epoch) as usize;
        Ok(self
            .log
            .iter()
            .skip(skip)
            .take(take)
            .filter_map(|slot| slot.clone())
            .collect())
    }

    /// Drop the oldest slots until at most `max_len` remain.
    pub fn prune_epoch_log(&mut self, max_len: usize) {
        while self.log.len() > max_len {
            self.log.pop_front();
            self.log_start += 1;
        }
    }

    pub fn add_route(&mut self, route: R) -> Option<R> {
        self.table.add_route(route)
    }

    pub fn remove_route(&mut self, prefix: &AddressPrefix) -> Option<R> {
        self.table.remove_route(prefix)
    }

    pub fn get_route_by_prefix(&self, prefix: &AddressPrefix) -> Option<&R> {
        self.table.get_route_by_prefix(prefix)
    }

    pub fn find_next_hop_route(&self, destination: &Address) -> Option<&R> {
        self.table.find_next_hop_route(destination)
    }

    pub fn get_all_prefixes(&self) -> Vec<AddressPrefix> {
        self.table.get_all_prefixes()
    }

    pub fn get_keys_starting_with(&self, prefix: &AddressPrefix) -> Vec<AddressPrefix> {
        self.table.get_keys_starting_with(prefix)
    }

    pub fn for_each<F: FnMut(&R)>(&self, visit: F) {
        self.table.for_each(visit)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl ForwardingRoutingTable<RouteUpdate> {
    /// The advertisements currently in effect, ordered by epoch. Used for
    /// full resyncs.
    pub fn current_routes(&self) -> Vec<RouteUpdate> {
        let mut routes = Vec::with_capacity(self.table.len());
        self.table.for_each(|update| {
            if update.route.is_some() {
                routes.push(update.clone());
            }
        });
        routes.sort_by_key(|update| update.epoch);
        routes
    }

    /// The withdrawals still recorded for prefixes we once advertised,
    /// ordered by epoch. A full resync carries them so that a peer which
    /// missed the original withdrawal drops the route.
    pub fn current_withdrawals(&self) -> Vec<RouteUpdate> {
        let mut withdrawals = Vec::new();
        self.table.for_each(|update| {
            if update.route.is_none() {
                withdrawals.push(update.clone());
            }
        });
        withdrawals.sort_by_key(|update| update.epoch);
        withdrawals
    }
}

impl<R: RoutingTableEntry> Default for ForwardingRoutingTable<R> {
    fn default() -> Self {
        ForwardingRoutingTable::new(RoutingTableId::new_random())
    }
}

#[cfg(test)]
mod routing_table {
    use super::*;
    use crate::routes::Route;
    use interledger_service::AccountId;

    fn route(prefix: &'static str, next_hop: &'static str) -> Route {
        Route {
            route_prefix: AddressPrefix::new(prefix),
            next_hop_account_id: AccountId::new(next_hop),
            path: Vec::new(),
            auth: [0; 32],
        }
    }

    #[test]
    fn add_returns_previous_route() {
        let mut table = RoutingTable::new();
        assert!(table.add_route(route("g.a", "one")).is_none());
        let previous = table.add_route(route("g.a", "two")).unwrap();
        assert_eq!(previous.next_hop_account_id, AccountId::new("one"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn removes_route() {
        let mut table = RoutingTable::new();
        table.add_route(route("g.a", "one"));
        assert!(table.remove_route(&AddressPrefix::new("g.a")).is_some());
        assert!(table.remove_route(&AddressPrefix::new("g.a")).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn resolves_to_longest_matching_prefix() {
        let mut table = RoutingTable::new();
        table.add_route(route("g.bank", "bank"));
        table.add_route(route("g.bank.alice", "alice"));
        table.add_route(route("g", "default"));

        let next_hop = |address: &'static str| {
            table
                .find_next_hop_route(&Address::new(address))
                .map(|route| route.next_hop_account_id.to_string())
        };
        assert_eq!(next_hop("g.bank.alice.invoice42").unwrap(), "alice");
        assert_eq!(next_hop("g.bank.alice").unwrap(), "alice");
        assert_eq!(next_hop("g.bank.bob").unwrap(), "bank");
        assert_eq!(next_hop("g.banker").unwrap(), "default");
    }

    #[test]
    fn falls_back_to_global_prefix() {
        let mut table = RoutingTable::new();
        table.add_route(route("g", "default"));
        assert_eq!(
            table
                .find_next_hop_route(&Address::new("test.somewhere"))
                .unwrap()
                .next_hop_account_id,
            AccountId::new("default")
        );
    }

    #[test]
    fn returns_none_without_matching_prefix() {
        let mut table = RoutingTable::new();
        table.add_route(route("g.bank", "bank"));
        assert!(table
            .find_next_hop_route(&Address::new("g.other.alice"))
            .is_none());
    }

    #[test]
    fn finds_keys_starting_with_prefix() {
        let mut table = RoutingTable::new();
        table.add_route(route("g.bank", "bank"));
        table.add_route(route("g.bank.alice", "alice"));
        table.add_route(route("g.banker", "banker"));
        let mut keys = table.get_keys_starting_with(&AddressPrefix::new("g.bank"));
        keys.sort();
        assert_eq!(
            keys,
            vec![AddressPrefix::new("g.bank"), AddressPrefix::new("g.bank.alice")]
        );
    }

    #[test]
    fn reset_clears_everything() {
        let mut table = RoutingTable::new();
        table.add_route(route("g.a", "one"));
        table.add_route(route("g.b", "two"));
        table.reset();
        assert!(table.is_empty());
        assert!(table.get_all_prefixes().is_empty());
    }
}
