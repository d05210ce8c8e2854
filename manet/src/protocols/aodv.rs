//! Ad hoc On-Demand Distance Vector routing.
//!
//! Routes are only looked for when data needs one. A route request floods the network,
//! leaving a reverse route at every node it passes, and the reply travels back along
//! that reverse route installing the forward route. Broken links are reported to the
//! precursors of every route that used them.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::concepts::message::aodv::{
    AodvMessage, RouteErrorMessage, RouteReplyMessage, RouteRequestMessage,
};
use crate::concepts::message::{Message, MessageKind, Payload};
use crate::concepts::route::{AodvEntry, RoutingTable, TableEntry};
use crate::feedback::{RoutingError, RoutingWarning};
use crate::framework::{NodeId, ProtocolKind};
use crate::protocols::discovery::DiscoveryBuffer;
use crate::protocols::{Direction, HandlerEntry, NodeContext, RoutingLogic};
use crate::seqno::Sequence;
use crate::util::{is_shorter, NOT_REACHABLE};

#[serde_as]
#[derive(Debug, Serialize, Deserialize)]
pub struct Aodv {
    id: NodeId,
    /// always holds this node's own entry, which carries its sequence number
    table: RoutingTable<AodvEntry>,
    step: u64,
    request_id: u32,
    /// (originator, request id) -> neighbours the request was received from
    #[serde_as(as = "Vec<(_, _)>")]
    seen_requests: BTreeMap<(NodeId, u32), BTreeSet<NodeId>>,
    discoveries: DiscoveryBuffer,
}

impl Aodv {
    pub fn new(owner: &str) -> Self {
        let mut aodv = Self {
            id: owner.to_string(),
            table: RoutingTable::new(),
            step: 0,
            request_id: 0,
            seen_requests: BTreeMap::new(),
            discoveries: DiscoveryBuffer::default(),
        };
        aodv.initialize();
        aodv
    }

    pub fn table(&self) -> &RoutingTable<AodvEntry> {
        &self.table
    }

    pub fn discoveries(&self) -> &DiscoveryBuffer {
        &self.discoveries
    }

    pub fn own_sequence(&self) -> Sequence {
        self.table
            .get_route_for(&self.id)
            .and_then(|e| e.sequence.clone())
            .unwrap_or_else(|| Sequence::new(self.id.clone(), 0))
    }

    fn set_own_sequence(&mut self, number: u32) {
        if let Some(own) = self.table.get_route_for_mut(&self.id) {
            own.sequence = Some(Sequence::new(self.id.clone(), number));
        }
    }

    fn valid_route(&self, destination: &str) -> Option<&AodvEntry> {
        self.table
            .get_route_for(destination)
            .filter(|e| e.is_reachable())
    }

    /// Installs or updates a route, returns true if the table accepted it.
    /// A fresher sequence always wins, an equal one needs a shorter path, an invalid route is always replaced.
    fn install_route(
        &mut self,
        destination: &str,
        next_hop: &str,
        metric: i32,
        sequence: Option<Sequence>,
    ) -> Result<bool, RoutingError> {
        if destination == self.id {
            return Ok(false);
        }
        let Some(entry) = self.table.get_route_for_mut(destination) else {
            self.table
                .insert(AodvEntry::new(destination, next_hop, metric, sequence));
            return Ok(true);
        };
        let accept = if !entry.is_reachable() {
            true
        } else {
            match (&sequence, &entry.sequence) {
                (Some(new), Some(old)) => match new.compare(old)? {
                    Ordering::Greater => true,
                    Ordering::Equal => is_shorter(metric, entry.metric),
                    Ordering::Less => false,
                },
                (Some(_), None) => true,
                (None, _) => is_shorter(metric, entry.metric),
            }
        };
        if accept {
            entry.next_hop = next_hop.to_string();
            entry.metric = metric;
            if sequence.is_some() {
                entry.sequence = sequence;
            }
        }
        Ok(accept)
    }

    fn send_error(&self, node: &mut NodeContext<'_>, precursor: &str, destination: &str, sequence: Option<Sequence>) {
        if !node.is_connection_reachable(precursor) {
            return;
        }
        let error = Message::new(
            self.id.clone(),
            precursor,
            Payload::Aodv(AodvMessage::RouteError(RouteErrorMessage {
                unreachable_destination: destination.to_string(),
                unreachable_destination_sequence_nr: sequence,
            })),
        );
        node.send_to_neighbour(precursor, error);
    }

    /// invalidates every route whose next hop can no longer be reached
    fn detect_broken_links(&mut self, node: &mut NodeContext<'_>) {
        let mut broken = Vec::new();
        for entry in self.table.iter_mut() {
            if entry.destination == self.id
                || !entry.is_reachable()
                || node.is_connection_reachable(&entry.next_hop)
            {
                continue;
            }
            entry.metric = NOT_REACHABLE;
            if let Some(sequence) = &mut entry.sequence {
                sequence.increment_by(1);
            }
            let precursors: Vec<NodeId> = entry.active_neighbours.keys().cloned().collect();
            broken.push((entry.destination.clone(), entry.sequence.clone(), precursors));
        }

        for (destination, sequence, precursors) in broken {
            if let Some(entry) = self.table.get_route_for(&destination) {
                if entry.next_hop == destination {
                    warn!(
                        "{}",
                        RoutingWarning::LinkBroken {
                            node: self.id.clone(),
                            neighbour: destination.clone(),
                        }
                    );
                }
            }
            debug!("[{}] route to {destination} broke", self.id);
            for precursor in precursors {
                self.send_error(node, &precursor, &destination, sequence.clone());
            }
        }
    }

    // region Discovery
    fn send_route_request(&mut self, node: &mut NodeContext<'_>, target: &str) {
        self.request_id += 1;
        let own = self.own_sequence().number + 1;
        self.set_own_sequence(own);
        self.seen_requests
            .entry((self.id.clone(), self.request_id))
            .or_default()
            .insert(self.id.clone());

        let known = self
            .table
            .get_route_for(target)
            .and_then(|e| e.sequence.clone());
        let request = Message::new(
            self.id.clone(),
            target,
            Payload::Aodv(AodvMessage::RouteRequest(RouteRequestMessage {
                request_id: self.request_id,
                hop_count: 0,
                last_hop: self.id.clone(),
                sender_sequence_nr: self.own_sequence(),
                destination_sequence_nr: known,
            })),
        );
        debug!("[{}] looking for {target} (request {})", self.id, self.request_id);
        node.broadcast(&request, false);
    }

    fn handle_route_request(&mut self, node: &mut NodeContext<'_>, message: Message) -> Result<(), RoutingError> {
        let Payload::Aodv(AodvMessage::RouteRequest(request)) = &message.payload else {
            return Ok(());
        };
        let originator = message.sender();
        let target = message.receiver();
        if originator == self.id {
            return Ok(());
        }

        let seen = self
            .seen_requests
            .entry((originator.to_string(), request.request_id))
            .or_default();
        let first = seen.is_empty();
        seen.insert(request.last_hop.clone());
        if !first {
            trace!("[{}] duplicate request {} from {originator}", self.id, request.request_id);
            return Ok(());
        }

        let hops = request.hop_count + 1;
        self.install_route(&request.last_hop, &request.last_hop, 1, None)?;
        self.install_route(
            originator,
            &request.last_hop,
            hops as i32,
            Some(request.sender_sequence_nr.clone()),
        )?;

        if target == self.id {
            let own = self.own_sequence();
            if let Some(requested) = &request.destination_sequence_nr {
                if requested.compare(&own)? != Ordering::Less {
                    self.set_own_sequence(requested.number + 1);
                }
            }
            let reply = Message::new(
                self.id.clone(),
                originator,
                Payload::Aodv(AodvMessage::RouteReply(RouteReplyMessage {
                    hop_count: 0,
                    last_hop: self.id.clone(),
                    receiver_sequence_nr: self.own_sequence(),
                })),
            );
            self.unicast_reply(node, reply);
            return Ok(());
        }

        let fresh = match (self.valid_route(target), &request.destination_sequence_nr) {
            (Some(entry), requested) => match (&entry.sequence, requested) {
                (Some(known), Some(requested)) => known.compare(requested)? != Ordering::Less,
                (Some(_), None) => true,
                (None, _) => false,
            },
            (None, _) => false,
        };
        if fresh {
            let Some(entry) = self.valid_route(target).cloned() else {
                return Ok(());
            };
            let Some(sequence) = entry.sequence.clone() else {
                return Ok(());
            };
            if let Some(forward) = self.table.get_route_for_mut(target) {
                forward.add_precursor(&request.last_hop);
            }
            if let Some(reverse) = self.table.get_route_for_mut(originator) {
                reverse.add_precursor(&entry.next_hop);
            }
            debug!("[{}] answering for {target}", self.id);
            let reply = Message::new(
                target,
                originator,
                Payload::Aodv(AodvMessage::RouteReply(RouteReplyMessage {
                    hop_count: entry.metric as u32,
                    last_hop: self.id.clone(),
                    receiver_sequence_nr: sequence,
                })),
            );
            self.unicast_reply(node, reply);
            return Ok(());
        }

        let mut relay = message.clone();
        if let Payload::Aodv(AodvMessage::RouteRequest(request)) = &mut relay.payload {
            request.hop_count = hops;
            request.last_hop = self.id.clone();
        }
        node.broadcast(&relay, false);
        Ok(())
    }

    /// sends a reply one step further along the reverse route to its receiver
    fn unicast_reply(&self, node: &mut NodeContext<'_>, reply: Message) {
        let next_hop = self
            .valid_route(reply.receiver())
            .map(|e| e.next_hop.clone())
            .filter(|hop| node.is_connection_reachable(hop));
        match next_hop {
            Some(hop) => {
                node.send_to_neighbour(&hop, reply);
            }
            None => warn!(
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
        let Payload::Aodv(AodvMessage::RouteReply(reply)) = &message.payload else {
            return Ok(());
        };
        let destination = message.sender();
        let originator = message.receiver();
        let hops = reply.hop_count + 1;

        self.install_route(&reply.last_hop, &reply.last_hop, 1, None)?;
        self.install_route(
            destination,
            &reply.last_hop,
            hops as i32,
            Some(reply.receiver_sequence_nr.clone()),
        )?;

        if originator == self.id {
            let buffered = self.discoveries.complete(destination);
            debug!(
                "[{}] found {destination} in {hops} hops, flushing {} message(s)",
                self.id,
                buffered.len()
            );
            for data in buffered {
                self.handle_outgoing_data(node, data)?;
            }
            return Ok(());
        }

        let Some(reverse_hop) = self.valid_route(originator).map(|e| e.next_hop.clone()) else {
            warn!(
                "{}",
                RoutingWarning::NoRoute {
                    node: self.id.clone(),
                    destination: originator.to_string(),
                    message: message.id(),
                }
            );
            return Ok(());
        };
        if let Some(forward) = self.table.get_route_for_mut(destination) {
            forward.add_precursor(&reverse_hop);
        }
        if let Some(reverse) = self.table.get_route_for_mut(originator) {
            reverse.add_precursor(&reply.last_hop);
        }

        let mut relay = message.clone();
        if let Payload::Aodv(AodvMessage::RouteReply(reply)) = &mut relay.payload {
            reply.hop_count = hops;
            reply.last_hop = self.id.clone();
        }
        self.unicast_reply(node, relay);
        Ok(())
    }
    // endregion

    fn handle_route_error(&mut self, node: &mut NodeContext<'_>, message: Message) -> Result<(), RoutingError> {
        let Payload::Aodv(AodvMessage::RouteError(error)) = &message.payload else {
            return Ok(());
        };
        let Some(entry) = self.table.get_route_for_mut(&error.unreachable_destination) else {
            return Ok(());
        };
        if entry.next_hop != message.sender() || !entry.is_reachable() {
            return Ok(());
        }
        entry.metric = NOT_REACHABLE;
        let reported = error.unreachable_destination_sequence_nr.clone();
        entry.sequence = match (entry.sequence.take(), reported) {
            (Some(local), Some(reported)) => {
                if reported.compare(&local)? == Ordering::Greater {
                    Some(reported)
                } else {
                    Some(local)
                }
            }
            (Some(mut local), None) => {
                local.increment_by(1);
                Some(local)
            }
            (None, reported) => reported,
        };
        let sequence = entry.sequence.clone();
        let precursors: Vec<NodeId> = entry
            .active_neighbours
            .keys()
            .filter(|p| *p != message.sender())
            .cloned()
            .collect();

        debug!(
            "[{}] {} is unreachable through {}",
            self.id,
            error.unreachable_destination,
            message.sender()
        );
        for precursor in precursors {
            self.send_error(node, &precursor, &error.unreachable_destination, sequence.clone());
        }
        Ok(())
    }

    fn handle_hello(&mut self, _node: &mut NodeContext<'_>, message: Message) -> Result<(), RoutingError> {
        let sender = message.sender().to_string();
        self.install_route(&sender, &sender, 1, None)?;
        Ok(())
    }

    fn handle_outgoing_data(&mut self, node: &mut NodeContext<'_>, message: Message) -> Result<(), RoutingError> {
        if message.receiver() == self.id {
            node.receive_data(&message);
            return Ok(());
        }
        let next_hop = self
            .valid_route(message.receiver())
            .map(|e| e.next_hop.clone())
            .filter(|hop| node.is_connection_reachable(hop));
        if let Some(hop) = next_hop {
            node.send_to_neighbour(&hop, message);
            return Ok(());
        }

        if message.sender() == self.id {
            let destination = message.receiver().to_string();
            if self.discoveries.buffer(&destination, message, self.step) {
                self.send_route_request(node, &destination);
            }
        } else {
            warn!(
                "{}",
                RoutingWarning::NoRoute {
                    node: self.id.clone(),
                    destination: message.receiver().to_string(),
                    message: message.id(),
                }
            );
        }
        Ok(())
    }

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

impl RoutingLogic for Aodv {
    const KIND: ProtocolKind = ProtocolKind::Aodv;
    const HANDLERS: &'static [HandlerEntry<Self>] = &[
        HandlerEntry {
            kind: MessageKind::AodvRouteRequest,
            direction: Direction::Incoming,
            handler: Aodv::handle_route_request,
        },
        HandlerEntry {
            kind: MessageKind::AodvRouteReply,
            direction: Direction::Incoming,
            handler: Aodv::handle_route_reply,
        },
        HandlerEntry {
            kind: MessageKind::AodvRouteError,
            direction: Direction::Incoming,
            handler: Aodv::handle_route_error,
        },
        HandlerEntry {
            kind: MessageKind::AodvHello,
            direction: Direction::Incoming,
            handler: Aodv::handle_hello,
        },
        HandlerEntry {
            kind: MessageKind::Data,
            direction: Direction::Incoming,
            handler: Aodv::deliver_or_forward,
        },
        HandlerEntry {
            kind: MessageKind::Data,
            direction: Direction::Outgoing,
            handler: Aodv::handle_outgoing_data,
        },
    ];

    fn initialize(&mut self) {
        self.table.clear();
        self.table.insert(AodvEntry::new(
            &self.id,
            &self.id,
            0,
            Some(Sequence::new(self.id.clone(), 0)),
        ));
        self.step = 0;
        self.request_id = 0;
        self.seen_requests.clear();
        self.discoveries.clear();
    }

    fn perform_routing_step(&mut self, node: &mut NodeContext<'_>) -> Result<(), RoutingError> {
        self.detect_broken_links(node);
        self.drain_input(node)?;
        self.retry_discoveries(node);

        if self.step % node.params.hello_interval.max(1) == 0 && node.has_active_neighbour() {
            let hello = Message::new(
                self.id.clone(),
                self.id.clone(),
                Payload::Aodv(AodvMessage::Hello),
            );
            node.broadcast(&hello, true);
        }
        self.step += 1;
        Ok(())
    }

    fn routing_data(&self) -> String {
        let mut out = format!(
            "AODV {} step {} request {}\n{}",
            self.id, self.step, self.request_id, self.table
        );
        let _ = write!(out, "{}", self.discoveries);
        out
    }

    fn get_route(&self, destination: &str) -> Option<&str> {
        self.valid_route(destination).map(|e| e.next_hop.as_str())
    }

    fn route_metric(&self, destination: &str) -> Option<i32> {
        self.table.get_route_for(destination).map(|e| e.metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresher_sequence_replaces_route() {
        let mut aodv = Aodv::new("a");
        assert!(aodv
            .install_route("d", "b", 3, Some(Sequence::new("d", 2)))
            .unwrap());
        // same freshness, longer
        assert!(!aodv
            .install_route("d", "c", 4, Some(Sequence::new("d", 2)))
            .unwrap());
        // same freshness, shorter
        assert!(aodv
            .install_route("d", "c", 2, Some(Sequence::new("d", 2)))
            .unwrap());
        // stale
        assert!(!aodv
            .install_route("d", "b", 1, Some(Sequence::new("d", 1)))
            .unwrap());
        // fresher but longer
        assert!(aodv
            .install_route("d", "b", 5, Some(Sequence::new("d", 4)))
            .unwrap());
        assert_eq!(aodv.get_route("d"), Some("b"));
        assert_eq!(aodv.route_metric("d"), Some(5));
    }

    #[test]
    fn invalid_routes_are_always_replaced() {
        let mut aodv = Aodv::new("a");
        aodv.install_route("b", "b", 1, Some(Sequence::new("b", 4)))
            .unwrap();
        aodv.table.get_route_for_mut("b").unwrap().metric = NOT_REACHABLE;
        assert_eq!(aodv.get_route("b"), None);
        assert!(aodv.install_route("b", "b", 1, None).unwrap());
        assert_eq!(aodv.get_route("b"), Some("b"));
        // the sequence survives a hello refresh
        assert_eq!(
            aodv.table().get_route_for("b").unwrap().sequence,
            Some(Sequence::new("b", 4))
        );
    }

    #[test]
    fn foreign_sequence_fails_fast() {
        let mut aodv = Aodv::new("a");
        aodv.install_route("d", "b", 3, Some(Sequence::new("d", 2)))
            .unwrap();
        let err = aodv
            .install_route("d", "b", 1, Some(Sequence::new("x", 9)))
            .unwrap_err();
        assert!(matches!(err, RoutingError::SequenceOwnerMismatch { .. }));
    }

    #[test]
    fn own_route_is_never_installed() {
        let mut aodv = Aodv::new("a");
        assert!(!aodv.install_route("a", "b", 1, None).unwrap());
        assert_eq!(aodv.route_metric("a"), Some(0));
        assert_eq!(aodv.own_sequence(), Sequence::new("a", 0));
    }
}
