//! Graph integration tests
//!
//! Units, routing and parameter automation built through the facade.

use crate::helpers::*;
use approx::assert_relative_eq;
use cadenza::prelude::*;

#[test]
fn test_registered_unit_renders() {
    let engine = mono_engine();
    assert_eq!(engine.register(level_unit()).unwrap(), "level");
    // Registering again is a no-op.
    assert_eq!(engine.register(level_unit()).unwrap(), "level");

    let mut node = engine.create_node("level", &UnitOptions::new()).unwrap();
    node.connect_to(engine.destination()).unwrap();

    let audio = engine.render_offline(blocks(2)).unwrap();
    assert!(audio
        .iter()
        .all(|s| (s - 0.5).abs() < tolerances::FLOAT_EPSILON));
}

#[test]
fn test_sources_mix_at_destination() {
    let engine = mono_engine();
    engine.register(level_unit()).unwrap();

    let mut a = engine.create_node("level", &UnitOptions::new()).unwrap();
    let mut b = engine
        .create_node("level", &UnitOptions::new().param("amount", 0.125))
        .unwrap();
    a.connect_to(engine.destination()).unwrap();
    b.connect_to(engine.destination()).unwrap();

    let audio = engine.render_offline(blocks(1)).unwrap();
    assert_relative_eq!(audio[0], 0.625, epsilon = tolerances::FLOAT_EPSILON);

    b.dispose();
    let audio = engine.render_offline(blocks(1)).unwrap();
    assert!((audio[0] - 0.5).abs() < tolerances::FLOAT_EPSILON);
}

#[test]
fn test_controller_ramp_through_facade() {
    let engine = mono_engine();
    engine.register(level_unit()).unwrap();
    let mut node = engine.create_node("level", &UnitOptions::new()).unwrap();
    node.connect_to(engine.destination()).unwrap();

    let mut ctl = engine.controller(0.0).unwrap();
    ctl.add_target(&node.get_param("amount").unwrap(), 1.0);
    ctl.ramp(1.0, blocks(2), RampMethod::Linear);

    let audio = engine.render_offline(blocks(4)).unwrap();
    assert_relative_eq!(audio[0], 0.0, epsilon = tolerances::RAMP_EPSILON);
    assert_relative_eq!(audio[TEST_BLOCK_SIZE], 0.5, epsilon = tolerances::RAMP_EPSILON);
    assert_relative_eq!(audio[3 * TEST_BLOCK_SIZE], 1.0, epsilon = tolerances::RAMP_EPSILON);
    assert_relative_eq!(ctl.value(), 1.0, epsilon = tolerances::RAMP_EPSILON);
}

#[test]
fn test_inactive_node_is_silent() {
    let engine = mono_engine();
    engine.register(level_unit()).unwrap();
    let mut node = engine.create_node("level", &UnitOptions::new()).unwrap();
    node.connect_to(engine.destination()).unwrap();

    node.set_active(false).unwrap();
    let audio = engine.render_offline(blocks(1)).unwrap();
    assert_silence(&audio, tolerances::SILENCE_THRESHOLD);
}
