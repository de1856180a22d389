//! Name collision handling.

mod common;

use common::*;
use std::collections::HashSet;
use zcpublish_announce::naming::LABEL_MAX;
use zcpublish_announce::{GroupState, PublicationState, SimOp};
use zcpublish_core::types::EndpointId;

fn committed_names(h: &Harness) -> Vec<String> {
    h.sim
        .ops()
        .into_iter()
        .filter_map(|op| match op {
            SimOp::Commit { name, .. } => Some(name),
            _ => None,
        })
        .collect()
}

#[test]
fn test_scripted_collisions_yield_distinct_names() {
    let mut h = Harness::new(vec![]);
    let before = committed_names(&h).len();
    h.sim.collide_next(3);

    h.add(built_in_audio());

    let names: Vec<String> = committed_names(&h).split_off(before);
    assert_eq!(
        names,
        vec![
            BUILT_IN_AUDIO.to_string(),
            format!("{} #2", BUILT_IN_AUDIO),
            format!("{} #3", BUILT_IN_AUDIO),
            format!("{} #4", BUILT_IN_AUDIO),
        ]
    );
    let distinct: HashSet<&String> = names.iter().collect();
    assert_eq!(distinct.len(), 4);

    let record = h.publisher.registry().get(EndpointId(7)).unwrap();
    assert_eq!(record.name(), format!("{} #4", BUILT_IN_AUDIO));
    assert_eq!(record.state(), PublicationState::Established);
}

#[test]
fn test_name_taken_by_another_host() {
    let mut h = Harness::new(vec![]);
    h.sim.occupy(BUILT_IN_AUDIO);
    h.sim.occupy(format!("{} #2", BUILT_IN_AUDIO));

    h.add(built_in_audio());

    assert_eq!(h.name_of(7), Some(format!("{} #3", BUILT_IN_AUDIO)));
    assert!(h
        .sim
        .live_services()
        .contains(&format!("{} #3", BUILT_IN_AUDIO)));
}

#[test]
fn test_endpoints_with_equal_descriptions() {
    let mut h = Harness::new(vec![sink(1, "USB Audio")]);
    h.add(sink(2, "USB Audio"));

    assert_eq!(h.name_of(1).as_deref(), Some("alice@host: USB Audio"));
    assert_eq!(h.name_of(2).as_deref(), Some("alice@host: USB Audio #2"));
}

#[test]
fn test_sink_and_source_may_share_a_name() {
    let h = Harness::new(vec![sink(1, "Headset"), source(2, "Headset")]);

    assert_eq!(h.name_of(1), h.name_of(2));
    assert_eq!(h.sim.live_services().len(), 3);
}

#[test]
fn test_main_record_collision() {
    let sim = zcpublish_announce::Simulator::new();
    sim.occupy(SERVER_NAME);
    let h = Harness::with_simulator(sim, vec![]);

    let main = h.publisher.registry().main();
    assert_eq!(main.name(), "alice@host #2");
    assert_eq!(main.state(), PublicationState::Established);
}

#[test]
fn test_renamed_long_name_fits_one_label() {
    let description = "a".repeat(80);
    let mut h = Harness::new(vec![]);
    h.sim.collide_next(1);

    h.add(sink(1, &description));

    let name = h.name_of(1).unwrap();
    assert!(name.len() <= LABEL_MAX);
    assert!(name.ends_with(" #2"));
}

#[test]
fn test_collision_after_established_renames() {
    let mut h = Harness::new(vec![built_in_audio()]);
    let group = h.sim.last_group_named(BUILT_IN_AUDIO).unwrap();

    h.sim.emit_group_state(group, GroupState::Collision);
    h.settle();

    assert_eq!(h.name_of(7), Some(format!("{} #2", BUILT_IN_AUDIO)));
    assert_eq!(h.sim.last_group_named(&format!("{} #2", BUILT_IN_AUDIO)), Some(group));
}

#[test]
fn test_collision_on_reset_group_is_ignored() {
    let mut h = Harness::new(vec![built_in_audio()]);
    let group = h.sim.last_group_named(BUILT_IN_AUDIO).unwrap();
    h.publisher.unpublish_all(false);
    let commits = h.sim.commit_count();

    h.sim.emit_group_state(group, GroupState::Collision);
    h.settle();

    assert_eq!(h.name_of(7).as_deref(), Some(BUILT_IN_AUDIO));
    assert_eq!(h.sim.commit_count(), commits);
}
