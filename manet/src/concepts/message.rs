use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::concepts::route::{DsdvEntry, RoutingTable};
use crate::framework::NodeId;

/// Base fields shared by every message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub id: Uuid,
    pub sender: NodeId,
    pub receiver: NodeId,
    /// the neighbour the last forwarding node handed this message to
    pub next_receiver: Option<NodeId>,
}

impl MessageHeader {
    pub fn new(sender: impl Into<NodeId>, receiver: impl Into<NodeId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            receiver: receiver.into(),
            next_receiver: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub header: MessageHeader,
    pub payload: Payload,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Data(DataMessage),
    Dsdv(dsdv::DsdvMessage),
    Aodv(aodv::AodvMessage),
    Dsr(dsr::DsrMessage),
    Olsr(olsr::OlsrMessage),
}

/// Discriminant of a message, used to look up its handler
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Data,
    DsdvUpdate,
    AodvRouteRequest,
    AodvRouteReply,
    AodvRouteError,
    AodvHello,
    DsrRouteRequest,
    DsrRouteReply,
    DsrFrame,
    DsrRouteError,
    OlsrHello,
    OlsrTopologyControl,
}

impl Display for MessageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MessageKind::Data => "data",
            MessageKind::DsdvUpdate => "DSDV update",
            MessageKind::AodvRouteRequest => "AODV route request",
            MessageKind::AodvRouteReply => "AODV route reply",
            MessageKind::AodvRouteError => "AODV route error",
            MessageKind::AodvHello => "AODV hello",
            MessageKind::DsrRouteRequest => "DSR route request",
            MessageKind::DsrRouteReply => "DSR route reply",
            MessageKind::DsrFrame => "DSR frame",
            MessageKind::DsrRouteError => "DSR route error",
            MessageKind::OlsrHello => "OLSR hello",
            MessageKind::OlsrTopologyControl => "OLSR topology control",
        };
        f.write_str(name)
    }
}

impl Message {
    pub fn new(sender: impl Into<NodeId>, receiver: impl Into<NodeId>, payload: Payload) -> Self {
        Self {
            header: MessageHeader::new(sender, receiver),
            payload,
        }
    }

    pub fn data(sender: impl Into<NodeId>, receiver: impl Into<NodeId>, data: impl Into<String>) -> Self {
        Self::new(
            sender,
            receiver,
            Payload::Data(DataMessage { data: data.into() }),
        )
    }

    pub fn id(&self) -> Uuid {
        self.header.id
    }

    pub fn sender(&self) -> &str {
        &self.header.sender
    }

    pub fn receiver(&self) -> &str {
        &self.header.receiver
    }

    pub fn kind(&self) -> MessageKind {
        match &self.payload {
            Payload::Data(_) => MessageKind::Data,
            Payload::Dsdv(dsdv::DsdvMessage::Update(_)) => MessageKind::DsdvUpdate,
            Payload::Aodv(aodv::AodvMessage::RouteRequest(_)) => MessageKind::AodvRouteRequest,
            Payload::Aodv(aodv::AodvMessage::RouteReply(_)) => MessageKind::AodvRouteReply,
            Payload::Aodv(aodv::AodvMessage::RouteError(_)) => MessageKind::AodvRouteError,
            Payload::Aodv(aodv::AodvMessage::Hello) => MessageKind::AodvHello,
            Payload::Dsr(dsr::DsrMessage::RouteRequest(_)) => MessageKind::DsrRouteRequest,
            Payload::Dsr(dsr::DsrMessage::RouteReply(_)) => MessageKind::DsrRouteReply,
            Payload::Dsr(dsr::DsrMessage::Frame(_)) => MessageKind::DsrFrame,
            Payload::Dsr(dsr::DsrMessage::RouteError(_)) => MessageKind::DsrRouteError,
            Payload::Olsr(olsr::OlsrMessage::Hello(_)) => MessageKind::OlsrHello,
            Payload::Olsr(olsr::OlsrMessage::TopologyControl(_)) => MessageKind::OlsrTopologyControl,
        }
    }

    /// A copy addressed from `sender` to `receiver`, used when duplicating a broadcast
    pub fn readdressed(&self, sender: &str, receiver: &str) -> Self {
        let mut copy = self.clone();
        copy.header.sender = sender.to_string();
        copy.header.receiver = receiver.to_string();
        copy
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let MessageHeader {
            sender, receiver, ..
        } = &self.header;
        match &self.payload {
            Payload::Data(data) => write!(f, "{sender} -> {receiver}: {}", data.data),
            Payload::Dsdv(dsdv::DsdvMessage::Update(update)) => write!(
                f,
                "{} {sender} -> {receiver} ({} routes)",
                self.kind(),
                update.update_table.len()
            ),
            Payload::Aodv(aodv::AodvMessage::RouteRequest(req)) => write!(
                f,
                "{} #{} {sender} -> {receiver} hops {} via {}",
                self.kind(),
                req.request_id,
                req.hop_count,
                req.last_hop
            ),
            Payload::Aodv(aodv::AodvMessage::RouteReply(rep)) => write!(
                f,
                "{} {sender} -> {receiver} hops {} via {}",
                self.kind(),
                rep.hop_count,
                rep.last_hop
            ),
            Payload::Aodv(aodv::AodvMessage::RouteError(err)) => write!(
                f,
                "{} {sender} -> {receiver} lost {}",
                self.kind(),
                err.unreachable_destination
            ),
            Payload::Dsr(dsr::DsrMessage::RouteRequest(req)) => write!(
                f,
                "{} #{} {sender} -> {receiver} [{}]",
                self.kind(),
                req.request_id,
                req.visited_nodes.join(" > ")
            ),
            Payload::Dsr(dsr::DsrMessage::RouteReply(rep)) => write!(
                f,
                "{} {sender} -> {receiver} [{}]",
                self.kind(),
                rep.route.join(" > ")
            ),
            Payload::Dsr(dsr::DsrMessage::Frame(frame)) => {
                write!(f, "{} [{}] {}", self.kind(), frame.route.join(" > "), frame.data)
            }
            Payload::Dsr(dsr::DsrMessage::RouteError(err)) => write!(
                f,
                "{} {sender} -> {receiver} lost {}",
                self.kind(),
                err.not_reachable_node
            ),
            Payload::Olsr(olsr::OlsrMessage::Hello(hello)) => write!(
                f,
                "{} {sender} -> {receiver} neighbours [{}]",
                self.kind(),
                hello.neighbors.join(", ")
            ),
            Payload::Olsr(olsr::OlsrMessage::TopologyControl(tc)) => write!(
                f,
                "{} from {} #{} selectors [{}]",
                self.kind(),
                tc.originator,
                tc.sequence_nr,
                tc.mpr_selector_set.join(", ")
            ),
            Payload::Aodv(aodv::AodvMessage::Hello) => {
                write!(f, "{} {sender} -> {receiver}", self.kind())
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataMessage {
    pub data: String,
}

pub mod dsdv {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub enum DsdvMessage {
        Update(UpdateMessage),
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct UpdateMessage {
        /// deep copy of the sender's table
        pub update_table: RoutingTable<DsdvEntry>,
    }
}

pub mod aodv {
    use super::*;
    use crate::seqno::Sequence;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub enum AodvMessage {
        RouteRequest(RouteRequestMessage),
        RouteReply(RouteReplyMessage),
        RouteError(RouteErrorMessage),
        Hello,
    }

    /// Flooded by the originator (header sender) looking for the header receiver
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RouteRequestMessage {
        pub request_id: u32,
        pub hop_count: u32,
        /// the node that relayed this copy
        pub last_hop: NodeId,
        pub sender_sequence_nr: Sequence,
        /// the freshest sequence the originator knows for the destination
        pub destination_sequence_nr: Option<Sequence>,
    }

    /// Unicast back to the originator (header receiver) on behalf of the destination (header sender)
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RouteReplyMessage {
        pub hop_count: u32,
        pub last_hop: NodeId,
        pub receiver_sequence_nr: Sequence,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RouteErrorMessage {
        pub unreachable_destination: NodeId,
        pub unreachable_destination_sequence_nr: Option<Sequence>,
    }
}

pub mod dsr {
    use super::*;
    use crate::util::{next_in_route, previous_in_route};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub enum DsrMessage {
        RouteRequest(RouteRequestMessage),
        RouteReply(RouteReplyMessage),
        Frame(FrameMessage),
        RouteError(RouteErrorMessage),
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RouteRequestMessage {
        pub request_id: u32,
        /// originator first, every relay appends itself
        pub visited_nodes: Vec<NodeId>,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RouteReplyMessage {
        /// full hop list from the originator to the destination
        pub route: Vec<NodeId>,
    }

    pub type RouteResponseMessage = RouteReplyMessage;

    impl RouteReplyMessage {
        pub fn get_next_reverse_hop(&self, current: &str) -> Option<&NodeId> {
            previous_in_route(&self.route, current)
        }
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct FrameMessage {
        pub data: Box<Message>,
        pub route: Vec<NodeId>,
    }

    impl FrameMessage {
        pub fn get_next_hop(&self, current: &str) -> Option<&NodeId> {
            next_in_route(&self.route, current)
        }

        pub fn get_next_reverse_hop(&self, current: &str) -> Option<&NodeId> {
            previous_in_route(&self.route, current)
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RouteErrorMessage {
        pub route: Vec<NodeId>,
        pub not_reachable_node: NodeId,
    }

    impl RouteErrorMessage {
        pub fn get_next_reverse_hop(&self, current: &str) -> Option<&NodeId> {
            previous_in_route(&self.route, current)
        }

        /// the node that failed to reach `not_reachable_node`
        pub fn broken_link_origin(&self) -> Option<&NodeId> {
            previous_in_route(&self.route, &self.not_reachable_node)
        }
    }
}

pub mod olsr {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub enum OlsrMessage {
        Hello(HelloMessage),
        TopologyControl(TopologyControlMessage),
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct HelloMessage {
        /// the sender's one-hop neighbours
        pub neighbors: Vec<NodeId>,
        /// the neighbours the sender selected as multipoint relays
        pub mprs: Vec<NodeId>,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TopologyControlMessage {
        pub originator: NodeId,
        pub mpr_selector_set: Vec<NodeId>,
        pub sequence_nr: u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seqno::Sequence;

    fn route(hops: &[&str]) -> Vec<NodeId> {
        hops.iter().map(|h| h.to_string()).collect()
    }

    #[test]
    fn readdressed_copy_keeps_identity() {
        let original = Message::data("a", "c", "hello");
        let copy = original.readdressed("a", "b");
        assert_eq!(copy.id(), original.id());
        assert_eq!(copy.receiver(), "b");
        assert_eq!(original.receiver(), "c");
    }

    #[test]
    fn cloned_update_table_is_independent() {
        let mut table = RoutingTable::new();
        table.insert(DsdvEntry {
            destination: "a".to_string(),
            next_hop: "a".to_string(),
            metric: 0,
            sequence: Sequence::new("a", 0),
        });
        let original = Message::new(
            "a",
            "b",
            Payload::Dsdv(dsdv::DsdvMessage::Update(dsdv::UpdateMessage {
                update_table: table,
            })),
        );
        let mut copy = original.clone();
        if let Payload::Dsdv(dsdv::DsdvMessage::Update(update)) = &mut copy.payload {
            update.update_table.get_route_for_mut("a").unwrap().metric = 7;
        }
        let Payload::Dsdv(dsdv::DsdvMessage::Update(update)) = &original.payload else {
            panic!("payload changed variant");
        };
        assert_eq!(update.update_table.get_route_for("a").unwrap().metric, 0);
        assert_eq!(copy.kind(), MessageKind::DsdvUpdate);
    }

    #[test]
    fn cloned_request_has_its_own_hop_list() {
        let original = dsr::RouteRequestMessage {
            request_id: 1,
            visited_nodes: route(&["a"]),
        };
        let mut copy = original.clone();
        copy.visited_nodes.push("b".to_string());
        assert_eq!(original.visited_nodes, route(&["a"]));
    }

    #[test]
    fn frame_hop_lookup() {
        let frame = dsr::FrameMessage {
            data: Box::new(Message::data("a", "c", "x")),
            route: route(&["a", "b", "c"]),
        };
        assert_eq!(frame.get_next_hop("a").map(String::as_str), Some("b"));
        assert_eq!(frame.get_next_hop("c"), None);
        // an absent node never resolves to the first hop
        assert_eq!(frame.get_next_hop("x"), None);
        assert_eq!(frame.get_next_reverse_hop("x"), None);

        let empty = dsr::FrameMessage {
            data: Box::new(Message::data("a", "c", "x")),
            route: Vec::new(),
        };
        assert_eq!(empty.get_next_hop("a"), None);
    }

    #[test]
    fn reply_reverse_hop_lookup() {
        let reply: dsr::RouteResponseMessage = dsr::RouteReplyMessage {
            route: route(&["a", "b", "c"]),
        };
        assert_eq!(reply.get_next_reverse_hop("c").map(String::as_str), Some("b"));
        assert_eq!(reply.get_next_reverse_hop("a"), None);
        assert_eq!(reply.get_next_reverse_hop("q"), None);
    }

    #[test]
    fn data_display_names_both_ends() {
        let message = Message::data("a", "c", "ping");
        assert_eq!(message.to_string(), "a -> c: ping");
    }
}
