use manet::framework::ProtocolKind;
use manet::util::NOT_REACHABLE;

mod common;

#[test]
fn path_converges_to_hop_count() {
    let mut network = common::graphs::vnet_path3(ProtocolKind::Dsdv);
    network.tick_n(10); // just make it converge

    assert_eq!(network.get_next_hop("a", "c"), "b");
    assert_eq!(network.get_metric_to("a", "c"), 2);
    assert_eq!(network.get_metric_to("a", "b"), 1);
    assert_eq!(network.get_next_hop("c", "a"), "b");
    assert_eq!(network.get_metric_to("b", "a"), 1);
    assert_eq!(network.get_metric_to("b", "c"), 1);
    assert_eq!(network.get_metric_to("a", "a"), 0);
}

#[test]
fn sequence_numbers_settle() {
    let mut network = common::graphs::vnet_path3(ProtocolKind::Dsdv);
    network.tick_n(15);
    let snapshot: Vec<u32> = ["a", "b", "c"]
        .iter()
        .map(|n| network.dsdv(n).own_sequence().unwrap().number)
        .collect();

    network.tick_n(25);
    let later: Vec<u32> = ["a", "b", "c"]
        .iter()
        .map(|n| network.dsdv(n).own_sequence().unwrap().number)
        .collect();
    assert_eq!(snapshot, later);
    // a node only ever advances its own sequence in even steps
    assert!(later.iter().all(|n| n % 2 == 0));
}

#[test]
fn first_update_carries_sequence_zero() {
    let mut network = common::graphs::vnet_path3(ProtocolKind::Dsdv);
    network.tick();
    for node in ["a", "b", "c"] {
        assert_eq!(network.dsdv(node).own_sequence().unwrap().number, 0);
    }

    // the neighbours only show up in the tables after the first update, which counts as a link change
    network.tick();
    assert_eq!(network.dsdv("a").own_sequence().unwrap().number, 2);
    let learned = network.dsdv("b").table().get_route_for("a").unwrap();
    assert_eq!(learned.sequence.number, 0);
    assert_eq!(learned.metric, 1);

    network.tick();
    assert_eq!(network.dsdv("b").table().get_route_for("a").unwrap().sequence.number, 2);
}

#[test]
fn link_failure_cascades() {
    let mut network = common::graphs::vnet_path3(ProtocolKind::Dsdv);
    network.tick_n(15);

    network.set_link_offline("a", "b", true);
    network.tick_n(3);

    assert_eq!(network.get_metric_to("a", "b"), NOT_REACHABLE);
    assert_eq!(network.get_metric_to("a", "c"), NOT_REACHABLE);
    assert_eq!(network.get_metric_to("b", "a"), NOT_REACHABLE);
    assert_eq!(network.get_metric_to("c", "a"), NOT_REACHABLE);
    assert!(!network.has_route("a", "c"));
    // b and c still see each other
    assert_eq!(network.get_metric_to("c", "b"), 1);

    // the broken link carries an odd sequence
    let b_at_a = network.dsdv("a").table().get_route_for("b").unwrap().sequence.number;
    assert_eq!(b_at_a % 2, 1);
}

#[test]
fn link_recovery() {
    let mut network = common::graphs::vnet_path3(ProtocolKind::Dsdv);
    network.tick_n(15);
    network.set_link_offline("a", "b", true);
    network.tick_n(5);

    network.set_link_offline("a", "b", false);
    network.tick_n(5);
    assert_eq!(network.get_next_hop("a", "c"), "b");
    assert_eq!(network.get_metric_to("a", "c"), 2);
    assert_eq!(network.get_metric_to("c", "a"), 2);
}

#[test]
fn alternative_path_takes_over() {
    let mut network = common::graphs::vnet_diamond(ProtocolKind::Dsdv);
    network.tick_n(15);
    assert_eq!(network.get_metric_to("a", "d"), 2);
    assert_eq!(network.get_metric_to("e", "d"), 3);

    let used = network.get_next_hop("a", "d");
    let other = if used == "b" { "c" } else { "b" };
    network.set_link_offline("a", &used, true);
    network.tick_n(12);

    assert_eq!(network.get_next_hop("a", "d"), other);
    assert_eq!(network.get_metric_to("a", "d"), 2);
    assert_eq!(network.get_metric_to("e", "d"), 3);
}

#[test]
fn removed_link_is_detected() {
    let mut network = common::graphs::vnet_path3(ProtocolKind::Dsdv);
    network.tick_n(15);

    network.sim.remove_connection("b", "c").unwrap();
    network.tick_n(3);
    assert_eq!(network.get_metric_to("b", "c"), NOT_REACHABLE);
    assert_eq!(network.get_metric_to("a", "c"), NOT_REACHABLE);
    assert_eq!(network.get_metric_to("a", "b"), 1);
}

#[test]
fn routing_data_lists_every_destination() {
    let mut network = common::graphs::vnet_path3(ProtocolKind::Dsdv);
    network.tick_n(10);
    let data = network.sim.routing_data("a").unwrap();
    assert!(data.contains("c via b metric 2"));
    assert!(data.contains("b via b metric 1"));
}
