//! LevelMix demo driver
//!
//! Runs the full balancing core against synthetic sources: a dedicated
//! "audio" thread renders the mix bus in real time while the control
//! loop measures, balances toward the target, and protects the sum with
//! the shared limiter. Events are printed as they arrive.

use std::time::{Duration, Instant};

use lm_bridge::{Command, ControlLoop, Coordinator, Event, Response};
use lm_core::StreamId;
use lm_engine::{mix_bus, SineSource};
use lm_state::SettingsStore;

const SAMPLE_RATE: f64 = 48000.0;
const BLOCK_FRAMES: usize = 512;
const RUN_SECONDS: u64 = 10;

fn main() {
    env_logger::init();
    log::info!("Starting LevelMix demo...");

    let (mut bus, handle) = mix_bus(SAMPLE_RATE);
    let store = SettingsStore::new("levelmix-settings.json");
    let mut coordinator = Coordinator::new(handle, store.load()).with_store(store);
    let events = coordinator.subscribe();
    let control = ControlLoop::spawn(coordinator);

    // Synthetic "tabs" at very different program levels.
    let sources: [(u64, &str, f64); 3] = [
        (1, "quiet podcast", -34.0),
        (2, "music", -18.0),
        (3, "loud ad", -8.0),
    ];
    for (id, label, lufs) in sources {
        let source = SineSource::new(SAMPLE_RATE, 220.0 * id as f64, 10.0_f64.powf(lufs / 20.0));
        match control.handle().execute(Command::RegisterStream {
            stream_id: StreamId(id),
            label: label.to_string(),
            source: Box::new(source),
        }) {
            Ok(Response::Ok) => log::info!("registered '{label}' (~{lufs} LUFS)"),
            Ok(other) => log::warn!("unexpected response: {other:?}"),
            Err(e) => log::error!("failed to register '{label}': {e}"),
        }
        // Give quiet streams headroom to climb.
        let _ = control.handle().execute(Command::SetMaxGain {
            stream_id: StreamId(id),
            max_gain_db: 20.0,
        });
    }

    if let Err(e) = control.handle().execute(Command::SetAutoBalance {
        enabled: Some(true),
        target_lufs: Some(-16.0),
    }) {
        log::error!("failed to enable auto-balance: {e}");
    }

    // "Audio thread": render in real time.
    let audio = std::thread::Builder::new()
        .name("lm-audio".into())
        .spawn(move || {
            let block = Duration::from_secs_f64(BLOCK_FRAMES as f64 / SAMPLE_RATE);
            let mut out_l = vec![0.0; BLOCK_FRAMES];
            let mut out_r = vec![0.0; BLOCK_FRAMES];
            let deadline = Instant::now() + Duration::from_secs(RUN_SECONDS);
            let mut peak: f64 = 0.0;
            while Instant::now() < deadline {
                let started = Instant::now();
                bus.render(&mut out_l, &mut out_r);
                peak = out_l.iter().fold(peak, |m, &v| m.max(v.abs()));
                if let Some(rest) = block.checked_sub(started.elapsed()) {
                    std::thread::sleep(rest);
                }
            }
            peak
        })
        .expect("spawn audio thread");

    // Report events until the run ends.
    let end = Instant::now() + Duration::from_secs(RUN_SECONDS);
    while Instant::now() < end {
        match events.recv_timeout(Duration::from_millis(200)) {
            Ok(Event::LoudnessUpdate { stream_id, reading }) => {
                log::debug!(
                    "{stream_id}: M {:6.1}  S {:6.1}  I {:6.1}  ({} blocks)",
                    reading.momentary,
                    reading.short_term,
                    reading.integrated,
                    reading.block_count
                );
            }
            Ok(Event::GainUpdated { stream_id, gain_db }) => {
                log::info!("{stream_id}: gain -> {gain_db:+.1} dB");
            }
            Ok(event) => log::info!("{event:?}"),
            Err(_) => {}
        }
    }

    let peak = audio.join().expect("audio thread");
    log::info!("output peak over the run: {peak:.3}");

    let coordinator = control.join();
    for snapshot in coordinator.stream_snapshots() {
        log::info!(
            "{}: '{}' gain {:+.1} dB, integrated {:.1} LUFS",
            snapshot.stream_id,
            snapshot.label,
            snapshot.gain_db,
            snapshot.reading.integrated
        );
    }
    log::info!("LevelMix demo finished.");
}
