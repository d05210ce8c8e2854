//! Dynamic Source Routing.
//!
//! The sender puts the whole path into every data frame. Paths are found by flooding a
//! route request that records every node it visits, and are cached per destination.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::concepts::message::dsr::{
    DsrMessage, FrameMessage, RouteErrorMessage, RouteReplyMessage, RouteRequestMessage,
};
use crate::concepts::message::{Message, MessageKind, Payload};
use crate::concepts::route::{DsrEntry, RoutingTable, TableEntry};
use crate::feedback::{RoutingError, RoutingWarning};
use crate::framework::{NodeId, ProtocolKind};
use crate::protocols::discovery::DiscoveryBuffer;
use crate::protocols::{Direction, HandlerEntry, NodeContext, RoutingLogic};

#[derive(Debug, Serialize, Deserialize)]
pub struct Dsr {
    id: NodeId,
    table: RoutingTable<DsrEntry>,
    step: u64,
    request_id: u32,
    /// originator -> request ids already handled
    seen_requests: BTreeMap<NodeId, BTreeSet<u32>>,
    discoveries: DiscoveryBuffer,
}

impl Dsr {
    pub fn new(owner: &str) -> Self {
        Self {
            id: owner.to_string(),
            table: RoutingTable::new(),
            step: 0,
            request_id: 0,
            seen_requests: BTreeMap::new(),
            discoveries: DiscoveryBuffer::default(),
        }
    }

    pub fn table(&self) -> &RoutingTable<DsrEntry> {
        &self.table
    }

    pub fn discoveries(&self) -> &DiscoveryBuffer {
        &self.discoveries
    }

    pub fn best_route(&self, destination: &str) -> Option<&Vec<NodeId>> {
        self.table.get_route_for(destination)?.best_route()
    }

    // region Route cache
    /// Caches every prefix of `path`, which has to start at this node
    fn learn_route(&mut self, path: &[NodeId]) -> bool {
        let mut changed = false;
        for (index, destination) in path.iter().enumerate().skip(1) {
            if *destination == self.id {
                continue;
            }
            if self.table.get_route_for(destination).is_none() {
                self.table.insert(DsrEntry::new(destination));
            }
            if let Some(entry) = self.table.get_route_for_mut(destination) {
                changed |= entry.add_route(path[..=index].to_vec());
            }
        }
        changed
    }

    /// Caches both directions of a path this node is part of
    fn learn_path(&mut self, path: &[NodeId]) -> bool {
        let Some(position) = path.iter().position(|hop| *hop == self.id) else {
            return false;
        };
        let backward: Vec<NodeId> = path[..=position].iter().rev().cloned().collect();
        let forward = self.learn_route(&path[position..]);
        self.learn_route(&backward) || forward
    }

    fn purge_link(&mut self, a: &str, b: &str) {
        for entry in self.table.iter_mut() {
            if entry.purge_link(a, b) {
                trace!("[{}] dropped routes to {} over {a}-{b}", self.id, entry.destination);
            }
        }
    }
    // endregion

    // region Discovery
    fn send_route_request(&mut self, node: &mut NodeContext<'_>, target: &str) {
        self.request_id += 1;
        self.seen_requests
            .entry(self.id.clone())
            .or_default()
            .insert(self.request_id);
        let request = Message::new(
            self.id.clone(),
            target,
            Payload::Dsr(DsrMessage::RouteRequest(RouteRequestMessage {
                request_id: self.request_id,
                visited_nodes: vec![self.id.clone()],
            })),
        );
        debug!("[{}] looking for {target} (request {})", self.id, self.request_id);
        node.broadcast(&request, false);
    }

    fn handle_route_request(&mut self, node: &mut NodeContext<'_>, message: Message) -> Result<(), RoutingError> {
        let Payload::Dsr(DsrMessage::RouteRequest(request)) = &message.payload else {
            return Ok(());
        };
        if request.visited_nodes.contains(&self.id) {
            return Ok(());
        }
        let originator = message.sender();
        let target = message.receiver();
        let fresh = self
            .seen_requests
            .entry(originator.to_string())
            .or_default()
            .insert(request.request_id);
        if !fresh {
            return Ok(());
        }

        let mut visited = request.visited_nodes.clone();
        visited.push(self.id.clone());
        self.learn_path(&visited);

        let route = if target == self.id {
            Some(visited.clone())
        } else {
            self.best_route(target)
                .filter(|cached| cached[1..].iter().all(|hop| !visited.contains(hop)))
                .map(|cached| {
                    let mut route = visited.clone();
                    route.extend(cached[1..].iter().cloned());
                    route
                })
        };

        match route {
            Some(route) => {
                debug!("[{}] answering request for {target}: {}", self.id, route.join(" > "));
                let reply = Message::new(
                    target,
                    originator,
                    Payload::Dsr(DsrMessage::RouteReply(RouteReplyMessage { route })),
                );
                self.send_backward(node, reply);
            }
            None => {
                let relay = Message {
                    header: message.header.clone(),
                    payload: Payload::Dsr(DsrMessage::RouteRequest(RouteRequestMessage {
                        request_id: request.request_id,
                        visited_nodes: visited,
                    })),
                };
                node.broadcast(&relay, false);
            }
        }
        Ok(())
    }

    /// hands a reply to the node before this one on its route
    fn send_backward(&self, node: &mut NodeContext<'_>, reply: Message) {
        let previous = match &reply.payload {
            Payload::Dsr(DsrMessage::RouteReply(r)) => r.get_next_reverse_hop(&self.id).cloned(),
            Payload::Dsr(DsrMessage::RouteError(e)) => e.get_next_reverse_hop(&self.id).cloned(),
            _ => None,
        };
        match previous {
            Some(hop) if node.is_connection_reachable(&hop) => {
                node.send_to_neighbour(&hop, reply);
            }
            _ => warn!(
                "{}",
                RoutingWarning::NoRoute {
                    node: self.id.clone(),
                    destination: reply.receiver().to_string(),
                    message: reply.id(),
                }
            ),
        }
    }

    fn handle_route_reply(&mut self, node: &mut NodeContext<'_>, message: Message) -> Result<(), RoutingError> {
        let Payload::Dsr(DsrMessage::RouteReply(reply)) = &message.payload else {
            return Ok(());
        };
        self.learn_path(&reply.route);

        if message.receiver() == self.id {
            let buffered = self.discoveries.complete(message.sender());
            debug!(
                "[{}] found {}, flushing {} message(s)",
                self.id,
                reply.route.join(" > "),
                buffered.len()
            );
            for data in buffered {
                self.handle_outgoing_data(node, data)?;
            }
            return Ok(());
        }
        self.send_backward(node, message);
        Ok(())
    }
    // endregion

    // region Forwarding
    fn handle_frame(&mut self, node: &mut NodeContext<'_>, message: Message) -> Result<(), RoutingError> {
        let Payload::Dsr(DsrMessage::Frame(frame)) = &message.payload else {
            return Ok(());
        };
        if frame.data.receiver() == self.id {
            node.receive_data(&frame.data);
            return Ok(());
        }
        let Some(next) = frame.get_next_hop(&self.id).cloned() else {
            warn!(
                "{}",
                RoutingWarning::NoRoute {
                    node: self.id.clone(),
                    destination: frame.data.receiver().to_string(),
                    message: frame.data.id(),
                }
            );
            return Ok(());
        };
        if node.is_connection_reachable(&next) {
            node.send_to_neighbour(&next, message);
            return Ok(());
        }

        warn!(
            "{}",
            RoutingWarning::LinkBroken {
                node: self.id.clone(),
                neighbour: next.clone(),
            }
        );
        self.purge_link(&self.id.clone(), &next);
        let Some(source) = frame.route.first() else {
            return Ok(());
        };
        let error = Message::new(
            self.id.clone(),
            source.clone(),
            Payload::Dsr(DsrMessage::RouteError(RouteErrorMessage {
                route: frame.route.clone(),
                not_reachable_node: next,
            })),
        );
        self.send_backward(node, error);
        Ok(())
    }

    fn handle_route_error(&mut self, node: &mut NodeContext<'_>, message: Message) -> Result<(), RoutingError> {
        let Payload::Dsr(DsrMessage::RouteError(error)) = &message.payload else {
            return Ok(());
        };
        if let Some(origin) = error.broken_link_origin() {
            self.purge_link(origin, &error.not_reachable_node);
        }
        if message.receiver() != self.id {
            self.send_backward(node, message);
        }
        Ok(())
    }

    fn handle_outgoing_data(&mut self, node: &mut NodeContext<'_>, message: Message) -> Result<(), RoutingError> {
        if message.receiver() == self.id {
            node.receive_data(&message);
            return Ok(());
        }
        let destination = message.receiver().to_string();

        while let Some(route) = self.best_route(&destination).cloned() {
            let first_hop = route[1].clone();
            if !node.is_connection_reachable(&first_hop) {
                self.purge_link(&self.id.clone(), &first_hop);
                continue;
            }
            let frame = Message::new(
                self.id.clone(),
                destination.clone(),
                Payload::Dsr(DsrMessage::Frame(FrameMessage {
                    data: Box::new(message),
                    route,
                })),
            );
            node.send_to_neighbour(&first_hop, frame);
            return Ok(());
        }

        if message.sender() == self.id {
            if self.discoveries.buffer(&destination, message, self.step) {
                self.send_route_request(node, &destination);
            }
        } else {
            warn!(
                "{}",
                RoutingWarning::NoRoute {
                    node: self.id.clone(),
                    destination,
                    message: message.id(),
                }
            );
        }
        Ok(())
    }
    // endregion

    fn retry_discoveries(&mut self, node: &mut NodeContext<'_>) {
        let expired = self.discoveries.expire(self.step, node.params);
        for destination in expired.retry {
            self.send_route_request(node, &destination);
        }
        for (destination, dropped) in expired.abandoned {
            warn!(
                "{}",
                RoutingWarning::DiscoveryAbandoned {
                    node: self.id.clone(),
                    destination,
                    dropped: dropped.len(),
                }
            );
        }
    }
}

impl RoutingLogic for Dsr {
    const KIND: ProtocolKind = ProtocolKind::Dsr;
    const HANDLERS: &'static [HandlerEntry<Self>] = &[
        HandlerEntry {
            kind: MessageKind::DsrRouteRequest,
            direction: Direction::Incoming,
            handler: Dsr::handle_route_request,
        },
        HandlerEntry {
            kind: MessageKind::DsrRouteReply,
            direction: Direction::Incoming,
            handler: Dsr::handle_route_reply,
        },
        HandlerEntry {
            kind: MessageKind::DsrFrame,
            direction: Direction::Incoming,
            handler: Dsr::handle_frame,
        },
        HandlerEntry {
            kind: MessageKind::DsrRouteError,
            direction: Direction::Incoming,
            handler: Dsr::handle_route_error,
        },
        HandlerEntry {
            kind: MessageKind::Data,
            direction: Direction::Incoming,
            handler: Dsr::deliver_or_forward,
        },
        HandlerEntry {
            kind: MessageKind::Data,
            direction: Direction::Outgoing,
            handler: Dsr::handle_outgoing_data,
        },
    ];

    fn initialize(&mut self) {
        self.table.clear();
        self.step = 0;
        self.request_id = 0;
        self.seen_requests.clear();
        self.discoveries.clear();
    }

    fn perform_routing_step(&mut self, node: &mut NodeContext<'_>) -> Result<(), RoutingError> {
        let down: Vec<NodeId> = node
            .neighbours()
            .filter(|(_, c)| c.is_offline())
            .map(|(peer, _)| peer.clone())
            .collect();
        for peer in down {
            self.purge_link(&self.id.clone(), &peer);
        }

        self.drain_input(node)?;
        self.retry_discoveries(node);
        self.step += 1;
        Ok(())
    }

    fn routing_data(&self) -> String {
        let mut out = format!(
            "DSR {} step {} request {}\n{}",
            self.id, self.step, self.request_id, self.table
        );
        let _ = write!(out, "{}", self.discoveries);
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

#[cfg(test)]
mod tests {
    use super::*;

    fn route(hops: &[&str]) -> Vec<NodeId> {
        hops.iter().map(|h| h.to_string()).collect()
    }

    #[test]
    fn learning_a_path_caches_both_directions() {
        let mut dsr = Dsr::new("b");
        assert!(dsr.learn_path(&route(&["a", "b", "c", "d"])));

        assert_eq!(dsr.best_route("d"), Some(&route(&["b", "c", "d"])));
        assert_eq!(dsr.best_route("c"), Some(&route(&["b", "c"])));
        assert_eq!(dsr.best_route("a"), Some(&route(&["b", "a"])));
        assert_eq!(dsr.route_metric("d"), Some(2));
        assert_eq!(dsr.get_route("a"), Some("a"));
        // nothing new the second time
        assert!(!dsr.learn_path(&route(&["a", "b", "c", "d"])));
    }

    #[test]
    fn paths_without_this_node_are_ignored() {
        let mut dsr = Dsr::new("z");
        assert!(!dsr.learn_path(&route(&["a", "b"])));
        assert!(dsr.table().is_empty());
    }

    #[test]
    fn purging_a_link_invalidates_routes_over_it() {
        let mut dsr = Dsr::new("a");
        dsr.learn_path(&route(&["a", "b", "c"]));
        dsr.learn_path(&route(&["a", "d", "e", "c"]));
        assert_eq!(dsr.get_route("c"), Some("b"));

        dsr.purge_link("c", "b");
        assert_eq!(dsr.get_route("c"), Some("d"));
        assert_eq!(dsr.route_metric("c"), Some(3));
        assert_eq!(dsr.route_metric("b"), Some(1));

        dsr.purge_link("a", "d");
        assert_eq!(dsr.get_route("c"), None);
        assert_eq!(dsr.route_metric("e"), Some(crate::util::NOT_REACHABLE));
    }
}
