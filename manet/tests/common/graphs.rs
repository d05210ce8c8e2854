use crate::common::virtual_network::VirtualNetwork;
use manet::framework::ProtocolKind;

/// a - b - c
pub fn vnet_path3(kind: ProtocolKind) -> VirtualNetwork {
    VirtualNetwork::create(kind, &["a", "b", "c"], &[("a", "b", 1), ("b", "c", 1)])
}

/// a - b - c - d
pub fn vnet_path4(kind: ProtocolKind) -> VirtualNetwork {
    VirtualNetwork::create(
        kind,
        &["a", "b", "c", "d"],
        &[("a", "b", 1), ("b", "c", 1), ("c", "d", 1)],
    )
}

/// a and d joined through both b and c, plus a longer detour over e
pub fn vnet_diamond(kind: ProtocolKind) -> VirtualNetwork {
    VirtualNetwork::create(
        kind,
        &["a", "b", "c", "d", "e"],
        &[
            ("a", "b", 1),
            ("a", "c", 1),
            ("b", "d", 1),
            ("c", "d", 1),
            ("a", "e", 1),
        ],
    )
}
