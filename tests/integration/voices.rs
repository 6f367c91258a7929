//! Voice pool integration tests
//!
//! Tone voices allocated, released and recycled through the facade.

use crate::helpers::*;
use cadenza::prelude::*;
use cadenza::{Error, VoiceState};

#[test]
fn test_tone_voices_play_and_recycle() {
    let engine = mono_engine();
    let mut voices = engine.tone_voices(2, LeastRecentlyUsed::new()).unwrap();
    assert_eq!(voices.len(), 2);
    assert_eq!(voices.strategy_name(), "lru");

    let key = voices.allocate_node().unwrap();
    voices.voice(key).unwrap().post(NodeCommand::Start).unwrap();

    let audio = engine.render_offline(blocks(8)).unwrap();
    assert_has_audio(&audio, 0.05);

    assert!(voices.release_node(key));
    assert_eq!(voices.state(key), Some(VoiceState::Releasing));

    // 100 ms covers the default 50 ms release.
    let audio = engine.render_offline(0.1).unwrap();
    assert_silence(&audio[audio.len() - TEST_BLOCK_SIZE..], tolerances::SILENCE_THRESHOLD);

    voices.process_events();
    assert_eq!(voices.state(key), Some(VoiceState::Idle));
    assert_eq!(voices.available_count(), 2);
}

#[test]
fn test_round_robin_voices_exhaust() {
    let engine = test_engine();
    let mut voices = engine.tone_voices(2, RoundRobin::new()).unwrap();

    assert!(voices.allocate_node().is_some());
    assert!(voices.allocate_node().is_some());
    assert_eq!(voices.allocate_node(), None);
}

#[test]
fn test_voice_pool_of_registered_unit() {
    let engine = mono_engine();
    engine.register(level_unit()).unwrap();

    let options = UnitOptions::new().param("amount", 0.25);
    let mut voices = engine
        .voice_pool("level", &options, 3, RoundRobin::new())
        .unwrap();
    assert_eq!(voices.len(), 3);

    // Pool voices start unconnected.
    let audio = engine.render_offline(blocks(1)).unwrap();
    assert_silence(&audio, tolerances::FLOAT_EPSILON);

    let destination = engine.destination();
    voices.apply_to_all(|v| {
        v.connect_to(destination.clone()).unwrap();
    });
    let audio = engine.render_offline(blocks(1)).unwrap();
    assert!((audio[0] - 0.75).abs() < tolerances::FLOAT_EPSILON);

    voices.dispose();
    assert!(voices.is_disposed());
    let audio = engine.render_offline(blocks(1)).unwrap();
    assert_silence(&audio, tolerances::FLOAT_EPSILON);
}

#[test]
fn test_voice_pool_errors_are_wrapped() {
    let engine = test_engine();

    assert!(matches!(
        engine.tone_voices(0, RoundRobin::new()),
        Err(Error::Synth(cadenza::synth::Error::InvalidConfig(_)))
    ));
    assert!(matches!(
        engine.voice_pool("missing", &UnitOptions::new(), 2, RoundRobin::new()),
        Err(Error::Synth(cadenza::synth::Error::Core(_)))
    ));
}
