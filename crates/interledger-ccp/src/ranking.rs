use crate::{errors::RoutingError, routes::IncomingRoute};
use interledger_service::AccountDirectory;
use std::{cmp::Ordering, sync::Arc};

/// A peer route together with the route weight the directory assigns to the
/// peer that advertised it.
#[derive(Clone, Debug, PartialEq)]
pub struct RankedRoute {
    pub weight: u32,
    pub route: IncomingRoute,
}

/// Total order over candidate routes where the best route sorts first:
/// higher weight, then shorter path, then smaller account id. Absent routes
/// sort after every present one.
pub fn compare_ranked_routes(a: Option<&RankedRoute>, b: Option<&RankedRoute>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => b
            .weight
            .cmp(&a.weight)
            .then_with(|| a.route.path.len().cmp(&b.route.path.len()))
            .then_with(|| a.route.peer_account_id.cmp(&b.route.peer_account_id)),
    }
}

/// Picks the best of several peers' routes for the same prefix.
#[derive(Clone)]
pub struct PeerRouteComparator {
    directory: Arc<dyn AccountDirectory>,
}

impl PeerRouteComparator {
    pub fn new(directory: Arc<dyn AccountDirectory>) -> Self {
        PeerRouteComparator { directory }
    }

    /// Look up the weight of the peer that advertised `route`. Every peer we
    /// hold routes for must be in the directory.
    pub fn rank(&self, route: IncomingRoute) -> Result<RankedRoute, RoutingError> {
        let weight = self
            .directory
            .route_weight(&route.peer_account_id)
            .ok_or_else(|| RoutingError::AccountNotFound(route.peer_account_id.clone()))?;
        Ok(RankedRoute { weight, route })
    }

    pub fn best_route<I>(&self, candidates: I) -> Result<Option<IncomingRoute>, RoutingError>
    where
        I: IntoIterator<Item = Option<IncomingRoute>>,
    {
        let mut ranked = candidates
            .into_iter()
            .map(|candidate| candidate.map(|route| self.rank(route)).transpose())
            .collect::<Result<Vec<Option<RankedRoute>>, RoutingError>>()?;
        ranked.sort_by(|a, b| compare_ranked_routes(a.as_ref(), b.as_ref()));
        Ok(ranked
            .into_iter()
            .next()
            .and_then(|best| best.map(|ranked| ranked.route)))
    }
}
