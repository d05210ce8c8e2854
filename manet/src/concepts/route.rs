use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::framework::NodeId;
use crate::seqno::Sequence;
use crate::util::{is_reachable, NOT_REACHABLE};

/// Common view over the per-protocol routing table entries
pub trait TableEntry: Clone + Debug + Display {
    fn destination(&self) -> &str;
    fn next_hop(&self) -> &str;
    fn metric(&self) -> i32;
    fn is_reachable(&self) -> bool {
        is_reachable(self.metric())
    }
}

/// Routes keyed by destination, at most one entry per destination, kept in insertion order
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingTable<E> {
    entries: Vec<E>,
}

impl<E> Default for RoutingTable<E> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<E: TableEntry> RoutingTable<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_route_for(&self, destination: &str) -> Option<&E> {
        self.entries.iter().find(|e| e.destination() == destination)
    }

    pub fn get_route_for_mut(&mut self, destination: &str) -> Option<&mut E> {
        self.entries.iter_mut().find(|e| e.destination() == destination)
    }

    /// adds the entry, replacing the entry for the same destination in place
    pub fn insert(&mut self, entry: E) {
        match self.get_route_for_mut(entry.destination()) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut E> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<E: TableEntry> Display for RoutingTable<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

fn fmt_metric(metric: i32) -> String {
    if is_reachable(metric) {
        metric.to_string()
    } else {
        "unreachable".to_string()
    }
}

// region DSDV
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsdvEntry {
    pub destination: NodeId,
    pub next_hop: NodeId,
    pub metric: i32,
    /// freshness of this route, owned by the destination
    pub sequence: Sequence,
}

impl TableEntry for DsdvEntry {
    fn destination(&self) -> &str {
        &self.destination
    }
    fn next_hop(&self) -> &str {
        &self.next_hop
    }
    fn metric(&self) -> i32 {
        self.metric
    }
}

impl Display for DsdvEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} via {} metric {} seq {}",
            self.destination,
            self.next_hop,
            fmt_metric(self.metric),
            self.sequence.number
        )
    }
}
// endregion

// region AODV
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AodvEntry {
    pub destination: NodeId,
    pub next_hop: NodeId,
    pub metric: i32,
    /// destination sequence number, `None` until the destination advertised one
    pub sequence: Option<Sequence>,
    /// precursors of this route and how often each was registered
    pub active_neighbours: BTreeMap<NodeId, u32>,
}

impl AodvEntry {
    pub fn new(destination: &str, next_hop: &str, metric: i32, sequence: Option<Sequence>) -> Self {
        Self {
            destination: destination.to_string(),
            next_hop: next_hop.to_string(),
            metric,
            sequence,
            active_neighbours: BTreeMap::new(),
        }
    }

    pub fn add_precursor(&mut self, neighbour: &str) {
        *self
            .active_neighbours
            .entry(neighbour.to_string())
            .or_insert(0) += 1;
    }
}

impl TableEntry for AodvEntry {
    fn destination(&self) -> &str {
        &self.destination
    }
    fn next_hop(&self) -> &str {
        &self.next_hop
    }
    fn metric(&self) -> i32 {
        self.metric
    }
}

impl Display for AodvEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} via {} metric {}",
            self.destination,
            self.next_hop,
            fmt_metric(self.metric)
        )?;
        if let Some(sequence) = &self.sequence {
            write!(f, " seq {}", sequence.number)?;
        }
        if !self.active_neighbours.is_empty() {
            let precursors: Vec<String> = self
                .active_neighbours
                .iter()
                .map(|(n, c)| format!("{n}x{c}"))
                .collect();
            write!(f, " precursors [{}]", precursors.join(", "))?;
        }
        Ok(())
    }
}
// endregion

// region DSR
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsrEntry {
    pub destination: NodeId,
    pub next_hop: NodeId,
    pub metric: i32,
    /// cached source routes, each starts at the owner and ends at the destination, shortest first
    pub routes: Vec<Vec<NodeId>>,
}

impl DsrEntry {
    pub fn new(destination: &str) -> Self {
        Self {
            destination: destination.to_string(),
            next_hop: String::new(),
            metric: NOT_REACHABLE,
            routes: Vec::new(),
        }
    }

    /// caches a route if it is not cached yet, returns true if the cache changed
    pub fn add_route(&mut self, route: Vec<NodeId>) -> bool {
        if route.len() < 2 || self.routes.contains(&route) {
            return false;
        }
        self.routes.push(route);
        self.refresh();
        true
    }

    /// drops every cached route that traverses the link between `a` and `b`, in either direction
    pub fn purge_link(&mut self, a: &str, b: &str) -> bool {
        let before = self.routes.len();
        self.routes.retain(|route| {
            !route
                .windows(2)
                .any(|hop| (hop[0] == a && hop[1] == b) || (hop[0] == b && hop[1] == a))
        });
        let changed = before != self.routes.len();
        if changed {
            self.refresh();
        }
        changed
    }

    pub fn best_route(&self) -> Option<&Vec<NodeId>> {
        self.routes.first()
    }

    fn refresh(&mut self) {
        self.routes.sort_by_key(|route| route.len());
        match self.routes.first() {
            Some(route) => {
                self.next_hop = route[1].clone();
                self.metric = (route.len() - 1) as i32;
            }
            None => self.metric = NOT_REACHABLE,
        }
    }
}

impl TableEntry for DsrEntry {
    fn destination(&self) -> &str {
        &self.destination
    }
    fn next_hop(&self) -> &str {
        &self.next_hop
    }
    fn metric(&self) -> i32 {
        self.metric
    }
}

impl Display for DsrEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} via {} metric {}",
            self.destination,
            self.next_hop,
            fmt_metric(self.metric)
        )?;
        for route in &self.routes {
            write!(f, " [{}]", route.join(" > "))?;
        }
        Ok(())
    }
}
// endregion

// region OLSR
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OlsrEntry {
    pub destination: NodeId,
    pub next_hop: NodeId,
    pub metric: i32,
}

impl TableEntry for OlsrEntry {
    fn destination(&self) -> &str {
        &self.destination
    }
    fn next_hop(&self) -> &str {
        &self.next_hop
    }
    fn metric(&self) -> i32 {
        self.metric
    }
}

impl Display for OlsrEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} via {} metric {}",
            self.destination,
            self.next_hop,
            fmt_metric(self.metric)
        )
    }
}
// endregion
