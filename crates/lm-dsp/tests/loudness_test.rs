//! Loudness measurement integration tests
//!
//! Drives complete signals through the block loudness engine and checks
//! the calibrated end-to-end numbers: the −18 LUFS sine reference, gate
//! behavior on silence and near-silence, and length invariance.

use lm_dsp::loudness::BlockLoudnessEngine;
use lm_dsp::Processor;

const SAMPLE_RATE: f64 = 48000.0;

fn process_sine(engine: &mut BlockLoudnessEngine, freq: f64, amplitude: f64, seconds: f64) {
    let frames = (SAMPLE_RATE * seconds).round() as usize;
    for i in 0..frames {
        let t = i as f64 / SAMPLE_RATE;
        let s = amplitude * (2.0 * std::f64::consts::PI * freq * t).sin();
        engine.process_frame(s, s);
    }
}

fn process_silence(engine: &mut BlockLoudnessEngine, seconds: f64) {
    let frames = (SAMPLE_RATE * seconds).round() as usize;
    for _ in 0..frames {
        engine.process_frame(0.0, 0.0);
    }
}

#[test]
fn test_sine_reference_reads_minus_18_lufs() {
    // 5 s of 1 kHz stereo sine at 10^(-18/20): the canonical calibration
    // signal must read -18.0 LUFS integrated.
    let mut engine = BlockLoudnessEngine::new(SAMPLE_RATE);
    let amplitude = 10.0_f64.powf(-18.0 / 20.0);
    process_sine(&mut engine, 1000.0, amplitude, 5.0);

    let reading = engine.reading();
    assert!(
        (reading.integrated - -18.0).abs() < 0.1,
        "integrated {} LUFS",
        reading.integrated
    );
    assert!(
        (reading.momentary - -18.0).abs() < 0.2,
        "momentary {} LUFS",
        reading.momentary
    );
    assert!(
        (reading.short_term - -18.0).abs() < 0.2,
        "short-term {} LUFS",
        reading.short_term
    );
    assert!(
        (45..=47).contains(&reading.block_count),
        "block_count {}",
        reading.block_count
    );
}

#[test]
fn test_silence_measures_negative_infinity() {
    let mut engine = BlockLoudnessEngine::new(SAMPLE_RATE);
    process_silence(&mut engine, 2.0);

    let reading = engine.reading();
    assert_eq!(reading.momentary, f64::NEG_INFINITY);
    assert_eq!(reading.short_term, f64::NEG_INFINITY);
    assert_eq!(reading.integrated, f64::NEG_INFINITY);
    // 2 s minus the 400 ms warm-up at a 100 ms hop.
    assert!(
        (15..=17).contains(&reading.block_count),
        "block_count {}",
        reading.block_count
    );
}

#[test]
fn test_silence_stays_silent_indefinitely() {
    let mut engine = BlockLoudnessEngine::new(SAMPLE_RATE);
    process_silence(&mut engine, 12.0);
    assert_eq!(engine.integrated(), f64::NEG_INFINITY);
    assert_eq!(engine.short_term(), f64::NEG_INFINITY);
    assert_eq!(engine.momentary(), f64::NEG_INFINITY);
    assert!(engine.block_count() > 100);
}

#[test]
fn test_absolute_gate_removes_sub_threshold_signal() {
    // ~-80 LUFS sits below the -70 absolute gate: every block is
    // discarded and integrated loudness stays undefined.
    let mut engine = BlockLoudnessEngine::new(SAMPLE_RATE);
    process_sine(&mut engine, 1000.0, 1e-4, 10.0);

    assert_eq!(engine.integrated(), f64::NEG_INFINITY);
    assert_eq!(engine.short_term(), f64::NEG_INFINITY);
    assert_eq!(engine.momentary(), f64::NEG_INFINITY);
    assert!(engine.block_count() > 90);
}

#[test]
fn test_signal_just_above_gate_is_kept() {
    // -60 LUFS passes the absolute gate.
    let mut engine = BlockLoudnessEngine::new(SAMPLE_RATE);
    process_sine(&mut engine, 1000.0, 10.0_f64.powf(-60.0 / 20.0), 5.0);
    let integrated = engine.integrated();
    assert!(
        (integrated - -60.0).abs() < 0.2,
        "integrated {integrated} LUFS"
    );
}

#[test]
fn test_constant_signal_is_length_invariant() {
    let amplitude = 10.0_f64.powf(-23.0 / 20.0);

    let mut short = BlockLoudnessEngine::new(SAMPLE_RATE);
    process_sine(&mut short, 1000.0, amplitude, 2.0);
    assert!(short.block_count() >= 10);

    let mut long = BlockLoudnessEngine::new(SAMPLE_RATE);
    process_sine(&mut long, 1000.0, amplitude, 9.0);

    let diff = (short.integrated() - long.integrated()).abs();
    assert!(diff < 0.1, "drifted {diff} LU between 2 s and 9 s");
}

#[test]
fn test_relative_gate_drops_quiet_tail() {
    // Loud passage followed by a much quieter (but above absolute gate)
    // tail: the relative gate keeps integrated close to the loud part.
    let mut engine = BlockLoudnessEngine::new(SAMPLE_RATE);
    process_sine(&mut engine, 1000.0, 10.0_f64.powf(-14.0 / 20.0), 4.0);
    process_sine(&mut engine, 1000.0, 10.0_f64.powf(-50.0 / 20.0), 4.0);

    let integrated = engine.integrated();
    assert!(
        (integrated - -14.0).abs() < 1.0,
        "integrated {integrated} LUFS, quiet tail not gated out"
    );
}

#[test]
fn test_momentary_tracks_latest_block() {
    let mut engine = BlockLoudnessEngine::new(SAMPLE_RATE);
    process_sine(&mut engine, 1000.0, 10.0_f64.powf(-14.0 / 20.0), 2.0);
    let loud = engine.momentary();
    assert!((loud - -14.0).abs() < 0.5, "momentary {loud}");

    // One full window of silence later the momentary block is silent.
    process_silence(&mut engine, 0.6);
    assert_eq!(engine.momentary(), f64::NEG_INFINITY);
}

#[test]
fn test_short_term_window_is_three_seconds() {
    let mut engine = BlockLoudnessEngine::new(SAMPLE_RATE);
    process_sine(&mut engine, 1000.0, 10.0_f64.powf(-30.0 / 20.0), 2.0);
    // Then 4 s of louder signal: the 3 s short-term window now contains
    // only the loud passage, while integrated still sees both.
    process_sine(&mut engine, 1000.0, 10.0_f64.powf(-12.0 / 20.0), 4.0);

    let st = engine.short_term();
    assert!((st - -12.0).abs() < 0.5, "short-term {st}");
    // Integrated still reflects both passages (relative gate permitting).
    let integrated = engine.integrated();
    assert!(
        integrated > -16.0 && integrated < -11.9,
        "integrated {integrated}"
    );
}

#[test]
fn test_mono_duplication_matches_stereo() {
    // A mono source duplicated into both channels must read the same as
    // the identical stereo signal, by construction.
    let mut stereo = BlockLoudnessEngine::new(SAMPLE_RATE);
    let mut mono = BlockLoudnessEngine::new(SAMPLE_RATE);
    let amplitude = 0.1;
    let frames = (SAMPLE_RATE * 3.0) as usize;
    for i in 0..frames {
        let s = amplitude * (2.0 * std::f64::consts::PI * 440.0 * i as f64 / SAMPLE_RATE).sin();
        stereo.process_frame(s, s);
        mono.process_frame(s, s);
    }
    assert_eq!(stereo.integrated(), mono.integrated());
}

#[test]
fn test_reset_after_signal_behaves_like_new() {
    let mut engine = BlockLoudnessEngine::new(SAMPLE_RATE);
    process_sine(&mut engine, 1000.0, 0.2, 3.0);
    engine.reset();

    let mut fresh = BlockLoudnessEngine::new(SAMPLE_RATE);
    let amplitude = 10.0_f64.powf(-20.0 / 20.0);
    process_sine(&mut engine, 1000.0, amplitude, 3.0);
    process_sine(&mut fresh, 1000.0, amplitude, 3.0);

    assert_eq!(engine.block_count(), fresh.block_count());
    assert!((engine.integrated() - fresh.integrated()).abs() < 1e-9);
}
