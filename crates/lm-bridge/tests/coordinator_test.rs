//! Coordinator integration tests
//!
//! Exercises the full control plane against a real mix bus driven
//! inline: balancing decisions from measured loudness, solo round-trips,
//! the warm-up guard, clamping policies, and event delivery.

use lm_bridge::{Command, Coordinator, Event, LimiterUpdate, Response, StreamDirectory};
use lm_core::{LmError, StreamId};
use lm_engine::{mix_bus, MixBus, SilenceSource, SineSource};
use lm_state::{BalancerSettings, SettingsStore};

const SR: f64 = 48000.0;

fn setup() -> (MixBus, Coordinator) {
    let (bus, handle) = mix_bus(SR);
    let coordinator = Coordinator::new(handle, BalancerSettings::default());
    (bus, coordinator)
}

/// Render `seconds` of audio through the bus, then drain notices into
/// the coordinator.
fn drive(bus: &mut MixBus, coordinator: &mut Coordinator, seconds: f64) {
    let frames = (SR * seconds) as usize;
    let mut out_l = vec![0.0; 512];
    let mut out_r = vec![0.0; 512];
    for _ in 0..frames / 512 {
        bus.render(&mut out_l, &mut out_r);
    }
    coordinator.pump();
}

fn sine_at_lufs(lufs: f64) -> Box<SineSource> {
    // A full-scale 1 kHz stereo sine reads ~0 LUFS, so amplitude in dB
    // maps directly onto integrated loudness.
    Box::new(SineSource::new(SR, 1000.0, 10.0_f64.powf(lufs / 20.0)))
}

fn gain_of(coordinator: &Coordinator, id: StreamId) -> f64 {
    coordinator
        .stream_snapshots()
        .iter()
        .find(|s| s.stream_id == id)
        .map(|s| s.gain_db)
        .unwrap()
}

#[test]
fn test_balance_convergence_clamped_then_reaching() {
    let (mut bus, mut coordinator) = setup();
    let id = StreamId(1);
    coordinator
        .register_stream(id, "music", sine_at_lufs(-30.0))
        .unwrap();
    drive(&mut bus, &mut coordinator, 3.0);

    // Max gain defaults to 0 dB: the +16 dB requirement is clamped away.
    coordinator.balance_now(Some(-14.0));
    assert_eq!(gain_of(&coordinator, id), 0.0);

    // With headroom the stream reaches the target: -14 - (-30) = +16.
    coordinator.set_max_gain(id, 20.0).unwrap();
    coordinator.balance_now(Some(-14.0));
    let gain = gain_of(&coordinator, id);
    assert!((gain - 16.0).abs() < 0.05, "gain {gain}");

    // Measurements are pre-fader, so a second pass lands on the same
    // answer instead of compounding.
    drive(&mut bus, &mut coordinator, 1.0);
    coordinator.balance_now(Some(-14.0));
    let again = gain_of(&coordinator, id);
    assert!((again - 16.0).abs() < 0.05, "gain drifted to {again}");
}

#[test]
fn test_balance_target_is_clamped() {
    let (mut bus, mut coordinator) = setup();
    let id = StreamId(1);
    coordinator
        .register_stream(id, "music", sine_at_lufs(-30.0))
        .unwrap();
    coordinator.set_max_gain(id, 20.0).unwrap();
    drive(&mut bus, &mut coordinator, 3.0);

    // -100 clamps to -60: required gain is -60 - (-30) = -30.
    coordinator.balance_now(Some(-100.0));
    let gain = gain_of(&coordinator, id);
    assert!((gain - -30.0).abs() < 0.05, "gain {gain}");

    // +100 clamps to 0: required +30 clamps to the +20 ceiling.
    coordinator.balance_now(Some(100.0));
    let gain = gain_of(&coordinator, id);
    assert!((gain - 20.0).abs() < 0.05, "gain {gain}");
}

#[test]
fn test_warmup_guard_skips_young_streams() {
    let (mut bus, mut coordinator) = setup();
    let id = StreamId(1);
    coordinator
        .register_stream(id, "young", sine_at_lufs(-20.0))
        .unwrap();
    coordinator.set_max_gain(id, 20.0).unwrap();

    // 1 s produces ~6 blocks: integrated is already finite but below the
    // 10-block reliability floor, so balancing must not touch the gain.
    drive(&mut bus, &mut coordinator, 1.0);
    let snapshot = &coordinator.stream_snapshots()[0];
    assert!(snapshot.reading.block_count < 10);
    assert!(snapshot.reading.integrated.is_finite());

    coordinator.balance_now(Some(-14.0));
    assert_eq!(gain_of(&coordinator, id), 0.0);

    // Once warmed up, the same pass applies.
    drive(&mut bus, &mut coordinator, 1.0);
    coordinator.balance_now(Some(-14.0));
    assert!(gain_of(&coordinator, id) > 5.0);
}

#[test]
fn test_balance_on_silent_streams_is_noop() {
    let (mut bus, mut coordinator) = setup();
    coordinator
        .register_stream(StreamId(1), "silent", Box::new(SilenceSource::new(SR)))
        .unwrap();
    let events = coordinator.subscribe();
    drive(&mut bus, &mut coordinator, 2.0);

    coordinator.balance_now(Some(-14.0));
    // Integrated is -inf on every stream: no gain updates at all.
    let got_gain_update = events
        .try_iter()
        .any(|e| matches!(e, Event::GainUpdated { .. }));
    assert!(!got_gain_update);
    assert_eq!(gain_of(&coordinator, StreamId(1)), 0.0);
}

#[test]
fn test_solo_round_trip_restores_gains() {
    let (mut bus, mut coordinator) = setup();
    let (a, b, c) = (StreamId(1), StreamId(2), StreamId(3));
    for (id, label) in [(a, "a"), (b, "b"), (c, "c")] {
        coordinator
            .register_stream(id, label, sine_at_lufs(-20.0))
            .unwrap();
    }
    coordinator.set_gain(a, -3.0).unwrap();
    coordinator.set_gain(b, -6.0).unwrap();
    coordinator.set_gain(c, 0.0).unwrap();

    // Solo B: stored gains must survive untouched.
    assert_eq!(coordinator.toggle_solo(b).unwrap(), Some(b));
    assert_eq!(gain_of(&coordinator, a), -3.0);
    assert_eq!(gain_of(&coordinator, b), -6.0);
    assert_eq!(gain_of(&coordinator, c), 0.0);

    // While solo is held, only B is audible on the bus.
    let frames = (SR * 0.5) as usize;
    let mut out_l = vec![0.0; frames];
    let mut out_r = vec![0.0; frames];
    bus.render(&mut out_l, &mut out_r);
    let tail = &out_l[frames / 2..];
    let peak = tail.iter().fold(0.0_f64, |m, &v| m.max(v.abs()));
    let b_amp = 0.1 * 10.0_f64.powf(-6.0 / 20.0); // -20 dB source at -6 dB fader
    assert!((peak - b_amp).abs() < 0.01, "solo peak {peak}");

    // Second toggle clears solo and everything is back.
    assert_eq!(coordinator.toggle_solo(b).unwrap(), None);
    assert_eq!(coordinator.solo_stream(), None);
    assert_eq!(gain_of(&coordinator, a), -3.0);
    assert_eq!(gain_of(&coordinator, b), -6.0);
    assert_eq!(gain_of(&coordinator, c), 0.0);
}

#[test]
fn test_balance_skips_solo_muted_streams() {
    let (mut bus, mut coordinator) = setup();
    let (a, b) = (StreamId(1), StreamId(2));
    coordinator
        .register_stream(a, "a", sine_at_lufs(-30.0))
        .unwrap();
    coordinator
        .register_stream(b, "b", sine_at_lufs(-20.0))
        .unwrap();
    coordinator.set_max_gain(a, 20.0).unwrap();
    coordinator.set_max_gain(b, 20.0).unwrap();
    drive(&mut bus, &mut coordinator, 3.0);

    coordinator.toggle_solo(b).unwrap();
    coordinator.balance_now(Some(-14.0));

    // The muted stream keeps its stored gain; the solo stream balances.
    assert_eq!(gain_of(&coordinator, a), 0.0);
    let gain_b = gain_of(&coordinator, b);
    assert!((gain_b - 6.0).abs() < 0.1, "gain_b {gain_b}");
}

#[test]
fn test_unregistering_solo_stream_clears_solo() {
    let (_bus, mut coordinator) = setup();
    let (a, b) = (StreamId(1), StreamId(2));
    coordinator
        .register_stream(a, "a", sine_at_lufs(-20.0))
        .unwrap();
    coordinator
        .register_stream(b, "b", sine_at_lufs(-20.0))
        .unwrap();
    coordinator.set_gain(a, -9.0).unwrap();

    coordinator.toggle_solo(b).unwrap();
    coordinator.unregister_stream(b).unwrap();

    assert_eq!(coordinator.solo_stream(), None);
    // A is unmuted again with its stored gain intact.
    assert_eq!(gain_of(&coordinator, a), -9.0);
}

#[test]
fn test_duplicate_registration_is_rejected() {
    let (_bus, mut coordinator) = setup();
    coordinator
        .register_stream(StreamId(1), "first", sine_at_lufs(-20.0))
        .unwrap();
    let err = coordinator
        .register_stream(StreamId(1), "second", sine_at_lufs(-20.0))
        .unwrap_err();
    assert!(matches!(err, LmError::AlreadyRegistered(StreamId(1))));
    assert_eq!(coordinator.stream_count(), 1);
}

#[test]
fn test_gain_request_is_clamped_and_reported() {
    let (_bus, mut coordinator) = setup();
    let id = StreamId(1);
    coordinator
        .register_stream(id, "s", sine_at_lufs(-20.0))
        .unwrap();

    // +100 dB on a stream with max 0 applies 0.
    let applied = coordinator.set_gain(id, 100.0).unwrap();
    assert_eq!(applied, 0.0);

    let response = coordinator
        .execute(Command::SetGain {
            stream_id: id,
            gain_db: -200.0,
        })
        .unwrap();
    assert!(matches!(
        response,
        Response::Gain {
            applied_gain_db
        } if applied_gain_db == -60.0
    ));
}

#[test]
fn test_auto_balance_toggle_leaves_gains_untouched() {
    let (_bus, mut coordinator) = setup();
    let id = StreamId(1);
    coordinator
        .register_stream(id, "s", sine_at_lufs(-20.0))
        .unwrap();
    coordinator.set_gain(id, -12.0).unwrap();

    let on = coordinator.set_auto_balance(Some(true), Some(-18.0));
    assert!(on.enabled);
    assert_eq!(on.target_lufs, -18.0);
    let off = coordinator.set_auto_balance(Some(false), None);
    assert!(!off.enabled);
    assert_eq!(off.target_lufs, -18.0);

    assert_eq!(gain_of(&coordinator, id), -12.0);
}

#[test]
fn test_double_reset_equals_single_reset() {
    let (mut bus, mut coordinator) = setup();
    let id = StreamId(1);
    coordinator
        .register_stream(id, "s", sine_at_lufs(-20.0))
        .unwrap();
    drive(&mut bus, &mut coordinator, 2.0);
    assert!(coordinator.stream_snapshots()[0].reading.block_count > 0);

    coordinator.reset_measurements(id).unwrap();
    let once = coordinator.stream_snapshots()[0].reading;
    coordinator.reset_measurements(id).unwrap();
    let twice = coordinator.stream_snapshots()[0].reading;

    assert_eq!(once, twice);
    assert_eq!(once.block_count, 0);
    assert_eq!(once.integrated, f64::NEG_INFINITY);
}

#[test]
fn test_event_stream_for_lifecycle() {
    let (mut bus, mut coordinator) = setup();
    let events = coordinator.subscribe();
    let id = StreamId(5);

    coordinator
        .register_stream(id, "s", sine_at_lufs(-20.0))
        .unwrap();
    drive(&mut bus, &mut coordinator, 1.0);
    coordinator.set_gain(id, -3.0).unwrap();
    let limiter = coordinator.limiter();
    coordinator.set_limiter(limiter);
    coordinator.unregister_stream(id).unwrap();

    let collected: Vec<Event> = events.try_iter().collect();
    assert!(collected
        .iter()
        .any(|e| matches!(e, Event::CaptureStarted { stream_id, .. } if *stream_id == id)));
    assert!(collected
        .iter()
        .any(|e| matches!(e, Event::LoudnessUpdate { .. })));
    assert!(collected
        .iter()
        .any(|e| matches!(e, Event::GainUpdated { gain_db, .. } if *gain_db == -3.0)));
    assert!(collected
        .iter()
        .any(|e| matches!(e, Event::LimiterUpdated { .. })));
    assert!(collected
        .iter()
        .any(|e| matches!(e, Event::CaptureStopped { stream_id } if *stream_id == id)));
}

#[test]
fn test_limiter_partial_update_and_persistence() {
    let dir = tempfile::tempdir().unwrap();
    let store = SettingsStore::new(dir.path().join("settings.json"));

    let (_bus, handle) = mix_bus(SR);
    let mut coordinator =
        Coordinator::new(handle, store.load()).with_store(store.clone());

    let response = coordinator
        .execute(Command::SetLimiter(LimiterUpdate {
            threshold_db: Some(-3.0),
            ..Default::default()
        }))
        .unwrap();
    match response {
        Response::Limiter(limiter) => {
            assert_eq!(limiter.threshold_db, -3.0);
            // Untouched fields keep defaults.
            assert_eq!(limiter.ratio, 20.0);
        }
        other => panic!("unexpected {other:?}"),
    }
    coordinator.set_auto_balance(Some(true), Some(-16.0));

    // A fresh coordinator sees the persisted records.
    let reloaded = store.load();
    assert_eq!(reloaded.limiter.threshold_db, -3.0);
    assert!(reloaded.auto_balance.enabled);
    assert_eq!(reloaded.auto_balance.target_lufs, -16.0);
}

struct FixedDirectory(Vec<StreamId>);

impl StreamDirectory for FixedDirectory {
    fn stream_alive(&self, stream_id: StreamId) -> bool {
        self.0.contains(&stream_id)
    }
}

#[test]
fn test_stale_streams_are_cleaned_up() {
    let (_bus, handle) = mix_bus(SR);
    let mut coordinator = Coordinator::new(handle, BalancerSettings::default())
        .with_directory(Box::new(FixedDirectory(vec![StreamId(1)])));
    let events = coordinator.subscribe();

    coordinator
        .register_stream(StreamId(1), "alive", sine_at_lufs(-20.0))
        .unwrap();
    coordinator
        .register_stream(StreamId(2), "gone", sine_at_lufs(-20.0))
        .unwrap();

    coordinator.cleanup_stale();
    assert_eq!(coordinator.stream_count(), 1);
    assert!(events.try_iter().any(|e| matches!(
        e,
        Event::StreamEnded { stream_id, reason } if stream_id == StreamId(2) && reason == "stream gone"
    )));
}

#[test]
fn test_ended_source_publishes_stream_ended() {
    let (mut bus, mut coordinator) = setup();
    let events = coordinator.subscribe();
    coordinator
        .register_stream(
            StreamId(9),
            "finite",
            Box::new(SineSource::new(SR, 440.0, 0.1).with_duration_frames(4096)),
        )
        .unwrap();

    drive(&mut bus, &mut coordinator, 0.5);
    assert_eq!(coordinator.stream_count(), 0);
    assert!(events.try_iter().any(|e| matches!(
        e,
        Event::StreamEnded { stream_id, .. } if stream_id == StreamId(9)
    )));
}
