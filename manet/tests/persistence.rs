use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use manet::framework::{ProtocolKind, ProtocolParams, StateEvent};
use manet::simulator::Simulator;
use manet::topology::TopologyRecord;

mod common;

use common::virtual_network::VirtualNetwork;

fn routing_snapshot(network: &VirtualNetwork) -> Vec<String> {
    network
        .sim
        .clients()
        .iter()
        .map(|c| c.routing_data())
        .collect()
}

#[test]
fn restored_network_runs_identically() {
    for kind in [ProtocolKind::Dsdv, ProtocolKind::Olsr, ProtocolKind::Aodv, ProtocolKind::Dsr] {
        let mut network = common::graphs::vnet_diamond(kind);
        network.tick_n(7);
        network.send("e", "d", "frozen");
        network.tick();

        let mut restored = VirtualNetwork::restore(network.freeze());
        assert_eq!(routing_snapshot(&restored), routing_snapshot(&network), "{kind}");

        network.tick_n(15);
        restored.tick_n(15);
        assert_eq!(routing_snapshot(&restored), routing_snapshot(&network), "{kind}");
        assert_eq!(restored.data_at("d"), network.data_at("d"), "{kind}");
    }
}

#[test]
fn restored_network_notifies_new_observers() {
    let mut network = common::graphs::vnet_path3(ProtocolKind::Dsdv);
    network.tick_n(3);
    let mut restored = VirtualNetwork::restore(network.freeze());

    let events = Arc::new(AtomicUsize::new(0));
    let counter = events.clone();
    restored.sim.subscribe(Arc::new(move |_: &StateEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    restored.tick();
    assert!(events.load(Ordering::SeqCst) > 0);
}

#[test]
fn topology_records_rebuild_the_network() {
    let mut network = common::graphs::vnet_diamond(ProtocolKind::Dsdv);
    network.set_link_offline("a", "e", true);
    let record = network.sim.to_topology();
    assert_eq!(record.nodes.len(), 5);
    assert_eq!(record.links.len(), 5);

    let json = record.to_json().unwrap();
    let parsed = TopologyRecord::from_json(&json).unwrap();
    let mut rebuilt = Simulator::from_topology(&parsed, ProtocolParams::default()).unwrap();
    assert!(rebuilt.connection("e", "a").unwrap().is_offline());
    assert!(rebuilt.client("a").unwrap().protocol().is_none());

    rebuilt.initialize_protocol(ProtocolKind::Dsdv);
    let mut rebuilt = VirtualNetwork { sim: rebuilt };
    rebuilt.tick_n(10);
    assert_eq!(rebuilt.get_metric_to("a", "d"), 2);
    assert!(!rebuilt.has_route("a", "e"));
}

#[test]
fn rejected_edits_change_nothing() {
    let mut network = common::graphs::vnet_path3(ProtocolKind::Dsdv);
    network.tick_n(5);
    let before = network.sim.to_topology();

    assert!(network.sim.add_client("b", 3.0, 3.0).is_err());
    assert!(network.sim.add_connection("a", "b", 4).is_err());
    assert!(network.sim.add_connection("a", "nobody", 1).is_err());
    assert!(network.sim.remove_connection("a", "c").is_err());
    assert!(network.sim.set_connection_offline("a", "c", true).is_err());
    assert!(network.sim.set_client_offline("nobody", true).is_err());

    assert_eq!(network.sim.to_topology(), before);
    assert_eq!(network.sim.connection("a", "b").unwrap().metric, 1);
}

#[test]
fn offline_client_goes_silent() {
    let mut network = common::graphs::vnet_path3(ProtocolKind::Dsdv);
    network.tick_n(15);
    network.sim.set_client_offline("b", true).unwrap();
    network.tick_n(3);
    assert_eq!(network.get_metric_to("a", "b"), -1);
    assert_eq!(network.get_metric_to("c", "b"), -1);

    network.sim.set_client_offline("b", false).unwrap();
    network.tick_n(5);
    assert_eq!(network.get_metric_to("a", "c"), 2);
}
