use manet::framework::ProtocolKind;
use manet::protocols::olsr::OlsrState;
use std::collections::BTreeSet;

mod common;

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn hello_discovers_neighbours() {
    let mut network = common::graphs::vnet_path3(ProtocolKind::Olsr);
    network.tick_n(2);
    assert_eq!(network.olsr("a").one_hop_neighbours(), &set(&["b"]));
    assert_eq!(network.olsr("b").one_hop_neighbours(), &set(&["a", "c"]));

    network.tick_n(4);
    let two_hop = network.olsr("a").two_hop_neighbours();
    assert_eq!(two_hop.get("c"), Some(&set(&["b"])));
    assert!(!two_hop.contains_key("a"));
}

#[test]
fn new_neighbours_repeat_the_hello() {
    let mut network = common::graphs::vnet_path3(ProtocolKind::Olsr);
    assert_eq!(network.olsr("a").state(), OlsrState::Hello);
    network.tick();
    assert_eq!(network.olsr("a").state(), OlsrState::ReceiveHello);

    // b was unknown, so a says hello again before calculating
    network.tick();
    assert_eq!(network.olsr("a").state(), OlsrState::Hello);
    network.tick();
    assert_eq!(network.olsr("a").state(), OlsrState::ReceiveHello);
    network.tick();
    assert_eq!(network.olsr("a").state(), OlsrState::Calculate);
    network.tick();
    assert_eq!(network.olsr("a").state(), OlsrState::TopologyControl);
}

#[test]
fn cycle_restarts_every_interval() {
    let mut network = common::graphs::vnet_path3(ProtocolKind::Olsr);
    network.tick_n(10);
    for node in ["a", "b", "c"] {
        assert_eq!(network.olsr(node).state(), OlsrState::TopologyControl);
    }

    // step 10 sends a fresh hello instead of staying in topology control
    network.tick();
    for node in ["a", "b", "c"] {
        assert_eq!(network.olsr(node).state(), OlsrState::ReceiveHello);
    }
    network.tick();
    assert_eq!(network.olsr("a").state(), OlsrState::Calculate);
}

#[test]
fn topology_control_is_resent_each_cycle() {
    let mut network = common::graphs::vnet_path3(ProtocolKind::Olsr);
    network.tick_n(15);
    let routing = network.sim.routing_data("a").unwrap();
    assert!(routing.contains("topology: b #1 [a, c]"), "{routing}");

    network.tick_n(5);
    let routing = network.sim.routing_data("a").unwrap();
    assert!(routing.contains("topology: b #1 [a, c]"), "{routing}");

    network.tick_n(5);
    let routing = network.sim.routing_data("a").unwrap();
    assert!(routing.contains("topology: b #2 [a, c]"), "{routing}");
}

#[test]
fn middle_node_is_the_relay() {
    let mut network = common::graphs::vnet_path3(ProtocolKind::Olsr);
    // selectors are only learned from the second hello round
    network.tick_n(15);
    assert_eq!(network.olsr("a").mprs(), &set(&["b"]));
    assert_eq!(network.olsr("c").mprs(), &set(&["b"]));
    assert!(network.olsr("b").mprs().is_empty());
    assert_eq!(network.olsr("b").mpr_selectors(), &set(&["a", "c"]));
    assert_eq!(network.olsr("b").state(), OlsrState::TopologyControl);
}

#[test]
fn topology_control_spreads_routes() {
    let mut network = common::graphs::vnet_path4(ProtocolKind::Olsr);
    network.tick_n(20);

    assert_eq!(network.get_next_hop("a", "d"), "b");
    assert_eq!(network.get_metric_to("a", "d"), 3);
    assert_eq!(network.get_next_hop("d", "a"), "c");
    assert_eq!(network.get_metric_to("d", "a"), 3);
    assert_eq!(network.get_metric_to("b", "d"), 2);
    assert!(!network.has_route("a", "a"));
}

#[test]
fn data_follows_computed_routes() {
    let mut network = common::graphs::vnet_path4(ProtocolKind::Olsr);
    network.tick_n(20);

    network.send("a", "d", "over the relays");
    network.tick_n(10);
    assert_eq!(network.data_at("d"), "a -> d: over the relays\n");
    assert_eq!(network.data_at("b"), "");
    assert_eq!(network.data_at("c"), "");
}

#[test]
fn lost_neighbour_is_forgotten() {
    let mut network = common::graphs::vnet_path3(ProtocolKind::Olsr);
    network.tick_n(15);
    assert_eq!(network.olsr("a").one_hop_neighbours(), &set(&["b"]));

    network.set_link_offline("a", "b", true);
    // the next hello round prunes the neighbour
    network.tick_n(6);
    assert!(network.olsr("a").one_hop_neighbours().is_empty());
    assert!(!network.olsr("b").one_hop_neighbours().contains("a"));
}
