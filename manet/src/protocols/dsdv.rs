//! Destination-Sequenced Distance Vector routing.
//!
//! Every node periodically floods its whole table, and floods it immediately whenever
//! the table or one of its links changed. Routes are ranked by the destination's
//! sequence number first and by metric second.

use std::collections::BTreeSet;
use std::fmt::Write;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::concepts::message::dsdv::{DsdvMessage, UpdateMessage};
use crate::concepts::message::{Message, MessageKind, Payload};
use crate::concepts::route::{DsdvEntry, RoutingTable, TableEntry};
use crate::feedback::{RoutingError, RoutingWarning};
use crate::framework::{NodeId, ProtocolKind};
use crate::protocols::{Direction, HandlerEntry, NodeContext, RoutingLogic};
use crate::seqno::Sequence;
use crate::util::{hop_further, is_reachable, is_shorter, NOT_REACHABLE};

#[derive(Debug, Serialize, Deserialize)]
pub struct Dsdv {
    id: NodeId,
    table: RoutingTable<DsdvEntry>,
    step: u64,
    /// offline connections whose failure was already written to the table
    offline_links: BTreeSet<String>,
    first_broadcast_done: bool,
    table_updated: bool,
}

impl Dsdv {
    pub fn new(owner: &str) -> Self {
        let mut dsdv = Self {
            id: owner.to_string(),
            table: RoutingTable::new(),
            step: 0,
            offline_links: BTreeSet::new(),
            first_broadcast_done: false,
            table_updated: false,
        };
        dsdv.initialize();
        dsdv
    }

    pub fn table(&self) -> &RoutingTable<DsdvEntry> {
        &self.table
    }

    pub fn own_sequence(&self) -> Option<&Sequence> {
        self.table.get_route_for(&self.id).map(|e| &e.sequence)
    }

    // region Topology
    fn detect_link_changes(&self, node: &NodeContext<'_>) -> bool {
        for (peer, connection) in node.neighbours() {
            if connection.is_offline() {
                // a broken link still routed over
                let routed = self
                    .table
                    .get_route_for(peer)
                    .is_some_and(|e| e.next_hop == *peer && e.is_reachable());
                if routed {
                    return true;
                }
            } else if self.offline_links.contains(&connection.id) {
                // a tracked link came back
                return true;
            } else if self.table.get_route_for(peer).is_none() {
                // a new link
                return true;
            }
        }
        // a direct route whose link was removed
        self.table.iter().any(|e| {
            e.destination != self.id
                && e.destination == e.next_hop
                && e.is_reachable()
                && node.connection_to(&e.destination).is_none()
        })
    }

    fn process_link_changes(&mut self, node: &NodeContext<'_>) {
        let links: Vec<(NodeId, String, bool)> = node
            .neighbours()
            .map(|(peer, c)| (peer.clone(), c.id.clone(), c.is_offline()))
            .collect();

        self.offline_links
            .retain(|tracked| links.iter().any(|(_, id, offline)| id == tracked && *offline));

        for (peer, link, offline) in &links {
            if *offline && self.offline_links.insert(link.clone()) {
                debug!("[{}] link {link} to {peer} went offline", self.id);
                self.invalidate_direct(peer);
            }
        }

        let removed: Vec<NodeId> = self
            .table
            .iter()
            .filter(|e| {
                e.destination != self.id
                    && e.destination == e.next_hop
                    && e.is_reachable()
                    && node.connection_to(&e.destination).is_none()
            })
            .map(|e| e.destination.clone())
            .collect();
        for peer in removed {
            debug!("[{}] link to {peer} was removed", self.id);
            self.invalidate_direct(&peer);
        }
    }

    /// Marks the direct route to `peer` as broken and bumps its sequence to an odd number,
    /// then every route through `peer` follows it
    fn invalidate_direct(&mut self, peer: &str) {
        let Some(entry) = self.table.get_route_for_mut(peer) else {
            return;
        };
        if entry.next_hop != peer || !entry.is_reachable() {
            return;
        }
        entry.metric = NOT_REACHABLE;
        entry.sequence.increment_by(1);
        warn!(
            "{}",
            RoutingWarning::LinkBroken {
                node: self.id.clone(),
                neighbour: peer.to_string(),
            }
        );
        self.invalidate_routes_via(peer, peer);
    }

    fn invalidate_routes_via(&mut self, next_hop: &str, except: &str) {
        for entry in self.table.iter_mut() {
            if entry.next_hop == next_hop
                && entry.destination != except
                && entry.destination != self.id
                && entry.is_reachable()
            {
                entry.metric = NOT_REACHABLE;
            }
        }
    }
    // endregion

    // region Update handling
    fn handle_update(&mut self, _node: &mut NodeContext<'_>, message: Message) -> Result<(), RoutingError> {
        let Payload::Dsdv(DsdvMessage::Update(update)) = &message.payload else {
            return Ok(());
        };
        let changed = self.merge(message.sender(), &update.update_table)?;
        self.table_updated |= changed;
        Ok(())
    }

    /// Merges a neighbour's table, returns true if any route changed
    pub fn merge(&mut self, sender: &str, received: &RoutingTable<DsdvEntry>) -> Result<bool, RoutingError> {
        let mut updated = false;
        for remote in received.iter() {
            if remote.destination == self.id {
                continue;
            }
            let metric = hop_further(remote.metric);
            let Some(local) = self.table.get_route_for_mut(&remote.destination) else {
                self.table.insert(DsdvEntry {
                    destination: remote.destination.clone(),
                    next_hop: sender.to_string(),
                    metric,
                    sequence: remote.sequence.clone(),
                });
                updated = true;
                continue;
            };

            match remote.sequence.compare(&local.sequence)? {
                std::cmp::Ordering::Equal => {
                    if is_reachable(metric) && is_shorter(metric, local.metric) {
                        local.next_hop = sender.to_string();
                        local.metric = metric;
                        updated = true;
                    }
                }
                std::cmp::Ordering::Greater if metric == local.metric => {
                    local.sequence = remote.sequence.clone();
                }
                std::cmp::Ordering::Greater => {
                    let previous = std::mem::replace(&mut local.next_hop, sender.to_string());
                    local.sequence = remote.sequence.clone();
                    local.metric = metric;
                    updated = true;
                    if !is_reachable(metric) {
                        trace!(
                            "[{}] {} reported {} unreachable",
                            self.id,
                            sender,
                            remote.destination
                        );
                        self.invalidate_routes_via(&previous, &previous);
                    }
                }
                std::cmp::Ordering::Less => {}
            }
        }
        Ok(updated)
    }
    // endregion

    fn handle_outgoing_data(&mut self, node: &mut NodeContext<'_>, message: Message) -> Result<(), RoutingError> {
        if message.receiver() == self.id {
            node.receive_data(&message);
            return Ok(());
        }
        let next_hop = self
            .table
            .get_route_for(message.receiver())
            .filter(|e| e.is_reachable())
            .map(|e| e.next_hop.clone());
        match next_hop {
            Some(hop) if node.is_connection_reachable(&hop) => {
                node.send_to_neighbour(&hop, message);
            }
            _ => warn!(
                "{}",
                RoutingWarning::NoRoute {
                    node: self.id.clone(),
                    destination: message.receiver().to_string(),
                    message: message.id(),
                }
            ),
        }
        Ok(())
    }

    fn broadcast_table(&mut self, node: &mut NodeContext<'_>, link_changed: bool) {
        if link_changed && self.first_broadcast_done {
            if let Some(own) = self.table.get_route_for_mut(&self.id) {
                own.sequence.increment_by(2);
            }
        }
        self.first_broadcast_done = true;
        let update = Message::new(
            self.id.clone(),
            self.id.clone(),
            Payload::Dsdv(DsdvMessage::Update(UpdateMessage {
                update_table: self.table.clone(),
            })),
        );
        node.broadcast(&update, true);
    }
}

impl RoutingLogic for Dsdv {
    const KIND: ProtocolKind = ProtocolKind::Dsdv;
    const HANDLERS: &'static [HandlerEntry<Self>] = &[
        HandlerEntry {
            kind: MessageKind::DsdvUpdate,
            direction: Direction::Incoming,
            handler: Dsdv::handle_update,
        },
        HandlerEntry {
            kind: MessageKind::Data,
            direction: Direction::Incoming,
            handler: Dsdv::deliver_or_forward,
        },
        HandlerEntry {
            kind: MessageKind::Data,
            direction: Direction::Outgoing,
            handler: Dsdv::handle_outgoing_data,
        },
    ];

    fn initialize(&mut self) {
        self.table.clear();
        self.table.insert(DsdvEntry {
            destination: self.id.clone(),
            next_hop: self.id.clone(),
            metric: 0,
            sequence: Sequence::new(self.id.clone(), 0),
        });
        self.step = 0;
        self.offline_links.clear();
        self.first_broadcast_done = false;
        self.table_updated = false;
    }

    fn perform_routing_step(&mut self, node: &mut NodeContext<'_>) -> Result<(), RoutingError> {
        let link_changed = self.detect_link_changes(node);
        self.table_updated = false;
        self.drain_input(node)?;

        if link_changed {
            self.process_link_changes(node);
        }
        let periodic = self.step % node.params.periodic_update_interval.max(1) == 0;
        if (link_changed || self.table_updated || periodic) && node.has_active_neighbour() {
            self.broadcast_table(node, link_changed);
        }
        self.step += 1;
        Ok(())
    }

    fn routing_data(&self) -> String {
        let mut out = format!("DSDV {} step {}\n{}", self.id, self.step, self.table);
        if !self.offline_links.is_empty() {
            let links: Vec<&str> = self.offline_links.iter().map(String::as_str).collect();
            let _ = writeln!(out, "offline links: {}", links.join(", "));
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
