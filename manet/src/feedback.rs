use thiserror::Error;
use uuid::Uuid;

use crate::concepts::message::MessageKind;
use crate::framework::{NodeId, ProtocolKind};
use crate::protocols::Direction;

/// These are critical errors, a routing step that returns one is a defect in the protocol or its caller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// Sequences are only comparable when they are owned by the same node
    #[error("cannot compare a sequence owned by {left} with a sequence owned by {right}")]
    SequenceOwnerMismatch { left: NodeId, right: NodeId },
    /// The protocol has no handler registered for this message kind and direction
    #[error("{protocol} does not support {direction} {kind} messages")]
    Unsupported {
        protocol: ProtocolKind,
        kind: MessageKind,
        direction: Direction,
    },
    #[error("client {0} has no initialized routing protocol")]
    NotInitialized(NodeId),
    #[error("unknown client {0}")]
    UnknownClient(NodeId),
}

/// Rejected topology edits, a rejected edit never partially applies
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("a client with id {0} already exists")]
    DuplicateClient(NodeId),
    #[error("{a} and {b} are already connected")]
    DuplicateConnection { a: NodeId, b: NodeId },
    #[error("unknown client {0}")]
    UnknownClient(NodeId),
    #[error("cannot connect {0} to itself")]
    SelfLoop(NodeId),
    #[error("a connection with id {0} already exists")]
    DuplicateConnectionId(String),
    #[error("{a} and {b} are not connected")]
    UnknownConnection { a: NodeId, b: NodeId },
}

/// Although this is an error enum, these should be treated as warnings.
/// They are logged and the step carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingWarning {
    #[error("{node} has no route to {destination}, dropping message {message}")]
    NoRoute {
        node: NodeId,
        destination: NodeId,
        message: Uuid,
    },
    #[error("{node} gave up discovering a route to {destination}, dropping {dropped} buffered message(s)")]
    DiscoveryAbandoned {
        node: NodeId,
        destination: NodeId,
        dropped: usize,
    },
    #[error("{node} lost its link to {neighbour}")]
    LinkBroken { node: NodeId, neighbour: NodeId },
}
