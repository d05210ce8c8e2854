//! Optimized Link State Routing.
//!
//! Nodes learn their one- and two-hop neighbourhood from hello messages, pick multipoint
//! relays (MPRs) covering every two-hop neighbour, and flood topology control messages
//! through those relays. Routes are shortest paths over everything learned.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Write;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::concepts::message::olsr::{HelloMessage, OlsrMessage, TopologyControlMessage};
use crate::concepts::message::{Message, MessageKind, Payload};
use crate::concepts::route::{OlsrEntry, RoutingTable, TableEntry};
use crate::feedback::{RoutingError, RoutingWarning};
use crate::framework::{NodeId, ProtocolKind};
use crate::protocols::{Direction, HandlerEntry, NodeContext, RoutingLogic};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum OlsrState {
    Hello,
    ReceiveHello,
    Calculate,
    TopologyControl,
}

/// Last topology control message seen from one originator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyTuple {
    pub sequence_nr: u32,
    pub selectors: BTreeSet<NodeId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Olsr {
    id: NodeId,
    table: RoutingTable<OlsrEntry>,
    step: u64,
    state: OlsrState,
    one_hop: BTreeSet<NodeId>,
    /// two-hop neighbour -> one-hop neighbours it is reachable through
    two_hop: BTreeMap<NodeId, BTreeSet<NodeId>>,
    mprs: BTreeSet<NodeId>,
    /// neighbours that selected this node as their relay
    mpr_selectors: BTreeSet<NodeId>,
    topology: BTreeMap<NodeId, TopologyTuple>,
    tc_sequence: u32,
    tc_broadcast_done: bool,
    /// a new one-hop neighbour appeared during the current drain
    hello_updated: bool,
    /// anything in the neighbourhood changed during the current drain
    neighbourhood_changed: bool,
}

impl Olsr {
    pub fn new(owner: &str) -> Self {
        Self {
            id: owner.to_string(),
            table: RoutingTable::new(),
            step: 0,
            state: OlsrState::Hello,
            one_hop: BTreeSet::new(),
            two_hop: BTreeMap::new(),
            mprs: BTreeSet::new(),
            mpr_selectors: BTreeSet::new(),
            topology: BTreeMap::new(),
            tc_sequence: 0,
            tc_broadcast_done: false,
            hello_updated: false,
            neighbourhood_changed: false,
        }
    }

    pub fn state(&self) -> OlsrState {
        self.state
    }

    pub fn table(&self) -> &RoutingTable<OlsrEntry> {
        &self.table
    }

    pub fn one_hop_neighbours(&self) -> &BTreeSet<NodeId> {
        &self.one_hop
    }

    pub fn two_hop_neighbours(&self) -> &BTreeMap<NodeId, BTreeSet<NodeId>> {
        &self.two_hop
    }

    pub fn mprs(&self) -> &BTreeSet<NodeId> {
        &self.mprs
    }

    pub fn mpr_selectors(&self) -> &BTreeSet<NodeId> {
        &self.mpr_selectors
    }

    // region Hello
    fn send_hello(&mut self, node: &mut NodeContext<'_>) {
        let lost: Vec<NodeId> = self
            .one_hop
            .iter()
            .filter(|n| !node.is_connection_reachable(n))
            .cloned()
            .collect();
        for neighbour in lost {
            debug!("[{}] dropping neighbour {neighbour}", self.id);
            self.forget_neighbour(&neighbour);
        }

        let hello = Message::new(
            self.id.clone(),
            self.id.clone(),
            Payload::Olsr(OlsrMessage::Hello(HelloMessage {
                neighbors: self.one_hop.iter().cloned().collect(),
                mprs: self.mprs.iter().cloned().collect(),
            })),
        );
        node.broadcast(&hello, true);
    }

    fn forget_neighbour(&mut self, neighbour: &str) {
        self.one_hop.remove(neighbour);
        self.mprs.remove(neighbour);
        self.mpr_selectors.remove(neighbour);
        for access in self.two_hop.values_mut() {
            access.remove(neighbour);
        }
        self.two_hop.retain(|_, access| !access.is_empty());
    }

    fn handle_hello(&mut self, _node: &mut NodeContext<'_>, message: Message) -> Result<(), RoutingError> {
        let Payload::Olsr(OlsrMessage::Hello(hello)) = &message.payload else {
            return Ok(());
        };
        let sender = message.sender();

        if self.one_hop.insert(sender.to_string()) {
            trace!("[{}] new neighbour {sender}", self.id);
            self.hello_updated = true;
            self.neighbourhood_changed = true;
        }
        if self.two_hop.remove(sender).is_some() {
            self.neighbourhood_changed = true;
        }

        for neighbour in &hello.neighbors {
            if *neighbour == self.id || self.one_hop.contains(neighbour) {
                continue;
            }
            let access = self.two_hop.entry(neighbour.clone()).or_default();
            if access.insert(sender.to_string()) {
                self.neighbourhood_changed = true;
            }
        }
        // the sender no longer reaches these
        for (two_hop, access) in self.two_hop.iter_mut() {
            if !hello.neighbors.contains(two_hop) && access.remove(sender) {
                self.neighbourhood_changed = true;
            }
        }
        self.two_hop.retain(|_, access| !access.is_empty());

        let selected = hello.mprs.iter().any(|m| *m == self.id);
        let changed = if selected {
            self.mpr_selectors.insert(sender.to_string())
        } else {
            self.mpr_selectors.remove(sender)
        };
        self.neighbourhood_changed |= changed;
        Ok(())
    }
    // endregion

    // region Calculation
    /// Greedy relay selection: neighbours that are the only way to some two-hop node first,
    /// then whichever neighbour covers the most uncovered two-hop nodes, smallest id on ties
    fn select_mprs(&mut self) {
        let mut mprs: BTreeSet<NodeId> = self
            .two_hop
            .values()
            .filter(|access| access.len() == 1)
            .flat_map(|access| access.iter().cloned())
            .collect();

        let mut uncovered: BTreeSet<&NodeId> = self
            .two_hop
            .iter()
            .filter(|(_, access)| access.is_disjoint(&mprs))
            .map(|(id, _)| id)
            .collect();

        while !uncovered.is_empty() {
            let mut best: Option<(&NodeId, usize)> = None;
            for candidate in self.one_hop.iter().filter(|n| !mprs.contains(*n)) {
                let coverage = uncovered
                    .iter()
                    .filter(|t| self.two_hop[**t].contains(candidate))
                    .count();
                if coverage > best.map_or(0, |(_, c)| c) {
                    best = Some((candidate, coverage));
                }
            }
            let Some((relay, _)) = best else {
                break;
            };
            uncovered.retain(|t| !self.two_hop[*t].contains(relay));
            mprs.insert(relay.clone());
        }

        if mprs != self.mprs {
            debug!("[{}] relays {:?}", self.id, mprs);
        }
        self.mprs = mprs;
    }

    /// Rebuilds the table with a breadth-first search over every known link
    fn compute_routes(&mut self) {
        let mut edges: Vec<(&str, &str)> = Vec::new();
        for neighbour in &self.one_hop {
            edges.push((self.id.as_str(), neighbour.as_str()));
        }
        for (two_hop, access) in &self.two_hop {
            for neighbour in access {
                edges.push((neighbour.as_str(), two_hop.as_str()));
            }
        }
        for (originator, tuple) in &self.topology {
            for selector in &tuple.selectors {
                edges.push((originator.as_str(), selector.as_str()));
            }
        }
        let mut links: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (a, b) in edges {
            links.entry(a).or_default().insert(b);
            links.entry(b).or_default().insert(a);
        }

        self.table.clear();
        let mut visited: BTreeSet<&str> = BTreeSet::from([self.id.as_str()]);
        let mut queue: VecDeque<(&str, &str, i32)> = VecDeque::new();
        for neighbour in &self.one_hop {
            if visited.insert(neighbour.as_str()) {
                queue.push_back((neighbour.as_str(), neighbour.as_str(), 1));
            }
        }
        while let Some((current, first_hop, metric)) = queue.pop_front() {
            self.table.insert(OlsrEntry {
                destination: current.to_string(),
                next_hop: first_hop.to_string(),
                metric,
            });
            let Some(adjacent) = links.get(current) else {
                continue;
            };
            for next in adjacent {
                if visited.insert(*next) {
                    queue.push_back((*next, first_hop, metric + 1));
                }
            }
        }
    }
    // endregion

    // region Topology control
    fn send_topology_control(&mut self, node: &mut NodeContext<'_>) {
        self.tc_sequence += 1;
        let tc = Message::new(
            self.id.clone(),
            self.id.clone(),
            Payload::Olsr(OlsrMessage::TopologyControl(TopologyControlMessage {
                originator: self.id.clone(),
                mpr_selector_set: self.mpr_selectors.iter().cloned().collect(),
                sequence_nr: self.tc_sequence,
            })),
        );
        node.broadcast(&tc, true);
    }

    fn handle_topology_control(&mut self, node: &mut NodeContext<'_>, message: Message) -> Result<(), RoutingError> {
        let Payload::Olsr(OlsrMessage::TopologyControl(tc)) = &message.payload else {
            return Ok(());
        };
        if tc.originator == self.id {
            return Ok(());
        }
        if let Some(known) = self.topology.get(&tc.originator) {
            if tc.sequence_nr <= known.sequence_nr {
                return Ok(());
            }
        }
        self.topology.insert(
            tc.originator.clone(),
            TopologyTuple {
                sequence_nr: tc.sequence_nr,
                selectors: tc.mpr_selector_set.iter().cloned().collect(),
            },
        );
        self.compute_routes();

        if self.mpr_selectors.contains(message.sender()) {
            trace!("[{}] relaying topology of {}", self.id, tc.originator);
            node.broadcast(&message, true);
        }
        Ok(())
    }
    // endregion

    fn handle_outgoing_data(&mut self, node: &mut NodeContext<'_>, mut message: Message) -> Result<(), RoutingError> {
        if message.receiver() == self.id {
            node.receive_data(&message);
            return Ok(());
        }
        let Some(hop) = self.get_route(message.receiver()).map(str::to_string) else {
            warn!(
                "{}",
                RoutingWarning::NoRoute {
                    node: self.id.clone(),
                    destination: message.receiver().to_string(),
                    message: message.id(),
                }
            );
            return Ok(());
        };
        message.header.next_receiver = Some(hop.clone());
        node.send_to_neighbour(&hop, message);
        Ok(())
    }

    fn drain(&mut self, node: &mut NodeContext<'_>) -> Result<(), RoutingError> {
        self.hello_updated = false;
        self.neighbourhood_changed = false;
        self.drain_input(node)
    }
}

impl RoutingLogic for Olsr {
    const KIND: ProtocolKind = ProtocolKind::Olsr;
    const HANDLERS: &'static [HandlerEntry<Self>] = &[
        HandlerEntry {
            kind: MessageKind::OlsrHello,
            direction: Direction::Incoming,
            handler: Olsr::handle_hello,
        },
        HandlerEntry {
            kind: MessageKind::OlsrTopologyControl,
            direction: Direction::Incoming,
            handler: Olsr::handle_topology_control,
        },
        HandlerEntry {
            kind: MessageKind::Data,
            direction: Direction::Incoming,
            handler: Olsr::deliver_or_forward,
        },
        HandlerEntry {
            kind: MessageKind::Data,
            direction: Direction::Outgoing,
            handler: Olsr::handle_outgoing_data,
        },
    ];

    fn initialize(&mut self) {
        *self = Olsr::new(&self.id);
    }

    fn perform_routing_step(&mut self, node: &mut NodeContext<'_>) -> Result<(), RoutingError> {
        if self.step > 0 && self.step % node.params.periodic_update_interval.max(1) == 0 {
            self.state = OlsrState::Hello;
            self.tc_broadcast_done = false;
        }

        match self.state {
            OlsrState::Hello => {
                self.send_hello(node);
                self.state = OlsrState::ReceiveHello;
            }
            OlsrState::ReceiveHello => {
                self.drain(node)?;
                self.state = if self.hello_updated {
                    OlsrState::Hello
                } else {
                    OlsrState::Calculate
                };
            }
            OlsrState::Calculate => {
                self.select_mprs();
                self.compute_routes();
                self.state = OlsrState::TopologyControl;
            }
            OlsrState::TopologyControl => {
                if !self.tc_broadcast_done && !self.mpr_selectors.is_empty() {
                    self.send_topology_control(node);
                    self.tc_broadcast_done = true;
                }
                self.drain(node)?;
                if self.hello_updated {
                    self.state = OlsrState::Hello;
                } else if self.neighbourhood_changed {
                    self.select_mprs();
                    self.compute_routes();
                }
            }
        }
        self.step += 1;
        Ok(())
    }

    fn routing_data(&self) -> String {
        let mut out = format!("OLSR {} step {} state {:?}\n{}", self.id, self.step, self.state, self.table);
        let join = |set: &BTreeSet<NodeId>| set.iter().cloned().collect::<Vec<_>>().join(", ");
        let _ = writeln!(out, "one hop: {}", join(&self.one_hop));
        for (two_hop, access) in &self.two_hop {
            let _ = writeln!(out, "two hop: {two_hop} through {}", join(access));
        }
        let _ = writeln!(out, "relays: {}", join(&self.mprs));
        let _ = writeln!(out, "selectors: {}", join(&self.mpr_selectors));
        for (originator, tuple) in &self.topology {
            let _ = writeln!(
                out,
                "topology: {originator} #{} [{}]",
                tuple.sequence_nr,
                join(&tuple.selectors)
            );
        }
        out
    }

    fn get_route(&self, destination: &str) -> Option<&str> {
        self.table
            .get_route_for(destination)
            .filter(|e| e.is_reachable())
            .map(|e| e.next_hop.as_str())
    }

    fn route_metric(&self, destination: &str) -> Option<i32> {
        self.table.get_route_for(destination).map(|e| e.metric)
    }
}
