//! Stream coordinator
//!
//! Owns the set of registered streams, the solo and auto-balance state,
//! and the shared limiter settings, and converts loudness readings into
//! gain decisions. Runs entirely on the control thread; everything that
//! crosses into the audio thread goes through the engine handle's rings
//! and the per-stream atomic gain slots.

use crate::command::{Command, Response, StreamSnapshot};
use crate::event::{Event, EventHub};
use crossbeam_channel::Receiver;
use lm_core::{LmError, LmResult, StreamId, MAX_TARGET_LUFS, MIN_TARGET_LUFS};
use lm_dsp::dynamics::LimiterSettings;
use lm_dsp::loudness::{LoudnessReading, MIN_BLOCKS_FOR_RELIABLE_LUFS};
use lm_engine::{CaptureSource, EngineCommand, EngineHandle, EngineNotice, StreamProcessor};
use lm_state::{BalancerSettings, SettingsStore};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Most streams the coordinator will register, matching the mix bus cap.
pub const MAX_STREAMS: usize = lm_engine::mixer::MAX_STREAMS;

/// Shared cache of the latest reading per stream, for hosts that poll
/// meters directly instead of consuming `LoudnessUpdate` events.
pub type ReadingCache = Arc<RwLock<HashMap<StreamId, LoudnessReading>>>;

/// Host-side view of which sources still exist, used by the periodic
/// stale-stream cleanup.
pub trait StreamDirectory: Send {
    fn stream_alive(&self, stream_id: StreamId) -> bool;
}

/// The balancing control plane.
pub struct Coordinator {
    streams: HashMap<StreamId, StreamProcessor>,
    engine: EngineHandle,
    events: EventHub,
    settings: BalancerSettings,
    solo_stream: Option<StreamId>,
    store: Option<SettingsStore>,
    directory: Option<Box<dyn StreamDirectory>>,
    reading_cache: ReadingCache,
}

impl Coordinator {
    /// Build a coordinator over an engine handle, starting from the given
    /// persisted settings. The limiter record is pushed to the audio side
    /// immediately.
    pub fn new(engine: EngineHandle, settings: BalancerSettings) -> Self {
        let mut coordinator = Self {
            streams: HashMap::new(),
            engine,
            events: EventHub::new(),
            settings: settings.clamped(),
            solo_stream: None,
            store: None,
            directory: None,
            reading_cache: Arc::new(RwLock::new(HashMap::new())),
        };
        coordinator
            .engine
            .send(EngineCommand::SetLimiter(coordinator.settings.limiter));
        coordinator
    }

    /// Persist settings changes through `store`.
    pub fn with_store(mut self, store: SettingsStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Enable stale-stream cleanup against the host's directory.
    pub fn with_directory(mut self, directory: Box<dyn StreamDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Subscribe to core events.
    pub fn subscribe(&mut self) -> Receiver<Event> {
        self.events.subscribe()
    }

    /// Cache handle for meter-polling hosts.
    pub fn reading_cache(&self) -> ReadingCache {
        self.reading_cache.clone()
    }

    pub fn auto_balance(&self) -> lm_state::AutoBalanceSettings {
        self.settings.auto_balance
    }

    pub fn limiter(&self) -> LimiterSettings {
        self.settings.limiter
    }

    pub fn solo_stream(&self) -> Option<StreamId> {
        self.solo_stream
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    // ─── Stream lifecycle ────────────────────────────────────────────────

    /// Register a new stream and start capturing from `source`. On
    /// capture failure the stream is not registered, a `CaptureError`
    /// event is published, and the error is also returned to the caller.
    pub fn register_stream(
        &mut self,
        stream_id: StreamId,
        label: impl Into<String>,
        source: Box<dyn CaptureSource>,
    ) -> LmResult<()> {
        if self.streams.contains_key(&stream_id) {
            return Err(LmError::AlreadyRegistered(stream_id));
        }
        if self.streams.len() >= MAX_STREAMS {
            return Err(LmError::Internal(format!(
                "stream capacity ({MAX_STREAMS}) exhausted"
            )));
        }

        let mut processor = StreamProcessor::new(stream_id, label);
        let channel = match processor.start(source) {
            Ok(channel) => channel,
            Err(err) => {
                if let LmError::CaptureFailed { kind, .. } = &err {
                    self.events.publish(Event::CaptureError {
                        stream_id,
                        kind: *kind,
                    });
                }
                return Err(err);
            }
        };

        // A held solo mutes every other stream, including late arrivals.
        if matches!(self.solo_stream, Some(solo) if solo != stream_id) {
            processor.set_muted(true);
        }

        let sample_rate = processor.sample_rate();
        if !self.engine.send(EngineCommand::AddStream(channel)) {
            return Err(LmError::Internal("engine command ring full".into()));
        }

        log::info!("registered {stream_id} at {sample_rate} Hz");
        self.events.publish(Event::CaptureStarted {
            stream_id,
            sample_rate,
        });
        self.streams.insert(stream_id, processor);
        Ok(())
    }

    /// Stop and remove a stream. Idempotent at the engine level; unknown
    /// ids are an error.
    pub fn unregister_stream(&mut self, stream_id: StreamId) -> LmResult<()> {
        let mut processor = self
            .streams
            .remove(&stream_id)
            .ok_or(LmError::UnknownStream(stream_id))?;
        processor.stop();
        self.engine.send(EngineCommand::RemoveStream(stream_id));
        self.reading_cache.write().remove(&stream_id);
        self.events.publish(Event::CaptureStopped { stream_id });
        log::info!("unregistered {stream_id}");

        if self.solo_stream == Some(stream_id) {
            self.clear_solo();
        }
        Ok(())
    }

    // ─── Gain ────────────────────────────────────────────────────────────

    /// Apply a gain request; the applied (possibly clamped) value is
    /// returned and broadcast.
    pub fn set_gain(&mut self, stream_id: StreamId, gain_db: f64) -> LmResult<f64> {
        let processor = self
            .streams
            .get_mut(&stream_id)
            .ok_or(LmError::UnknownStream(stream_id))?;
        let applied = processor.set_gain(gain_db);
        self.events.publish(Event::GainUpdated {
            stream_id,
            gain_db: applied,
        });
        Ok(applied)
    }

    /// Set the per-stream gain ceiling. Returns `(max, gain)` after
    /// clamping; a pulled-down gain is broadcast.
    pub fn set_max_gain(&mut self, stream_id: StreamId, max_gain_db: f64) -> LmResult<(f64, f64)> {
        let processor = self
            .streams
            .get_mut(&stream_id)
            .ok_or(LmError::UnknownStream(stream_id))?;
        let before = processor.gain_db();
        let (applied_max, applied_gain) = processor.set_max_gain(max_gain_db);
        if applied_gain != before {
            self.events.publish(Event::GainUpdated {
                stream_id,
                gain_db: applied_gain,
            });
        }
        Ok((applied_max, applied_gain))
    }

    // ─── Measurements ────────────────────────────────────────────────────

    pub fn reset_measurements(&mut self, stream_id: StreamId) -> LmResult<()> {
        let processor = self
            .streams
            .get_mut(&stream_id)
            .ok_or(LmError::UnknownStream(stream_id))?;
        processor.clear_reading();
        self.reading_cache.write().remove(&stream_id);
        self.engine
            .send(EngineCommand::ResetMeasurements(stream_id));
        self.events.publish(Event::MeasurementsReset { stream_id });
        Ok(())
    }

    /// Drain audio-side notices: cache fresh readings, publish loudness
    /// events, and clean up after self-terminated sources. Call this
    /// often (the control loop runs it on a fast tick).
    pub fn pump(&mut self) {
        while let Some(notice) = self.engine.poll_notice() {
            match notice {
                EngineNotice::Reading(update) => {
                    if let Some(processor) = self.streams.get_mut(&update.stream_id) {
                        processor.update_reading(update.reading);
                        self.reading_cache
                            .write()
                            .insert(update.stream_id, update.reading);
                        self.events.publish(Event::LoudnessUpdate {
                            stream_id: update.stream_id,
                            reading: update.reading,
                        });
                    }
                }
                EngineNotice::StreamEnded(stream_id) => {
                    self.remove_ended(stream_id, "source ended");
                }
            }
        }
        self.engine.collect_retired();
    }

    // ─── Solo ────────────────────────────────────────────────────────────

    /// Toggle solo on a stream: soloing an already-solo stream clears
    /// solo and restores every stored gain.
    pub fn toggle_solo(&mut self, stream_id: StreamId) -> LmResult<Option<StreamId>> {
        if !self.streams.contains_key(&stream_id) {
            return Err(LmError::UnknownStream(stream_id));
        }

        if self.solo_stream == Some(stream_id) {
            Ok(self.clear_solo())
        } else {
            self.solo_stream = Some(stream_id);
            for processor in self.streams.values_mut() {
                processor.set_muted(processor.id() != stream_id);
            }
            self.events.publish(Event::SoloChanged {
                solo_stream: self.solo_stream,
            });
            Ok(self.solo_stream)
        }
    }

    /// Clear solo, restoring every stream's stored gain. Always succeeds.
    pub fn clear_solo(&mut self) -> Option<StreamId> {
        if self.solo_stream.take().is_some() {
            for processor in self.streams.values_mut() {
                processor.set_muted(false);
            }
            self.events.publish(Event::SoloChanged { solo_stream: None });
        }
        None
    }

    // ─── Balancing ───────────────────────────────────────────────────────

    /// Update auto-balance settings; absent fields keep their value.
    pub fn set_auto_balance(
        &mut self,
        enabled: Option<bool>,
        target_lufs: Option<f64>,
    ) -> lm_state::AutoBalanceSettings {
        if let Some(enabled) = enabled {
            self.settings.auto_balance.enabled = enabled;
        }
        if let Some(target) = target_lufs {
            self.settings.auto_balance.target_lufs = target.clamp(MIN_TARGET_LUFS, MAX_TARGET_LUFS);
        }
        self.persist();
        self.settings.auto_balance
    }

    /// One balancing pass toward `target` (defaults to the configured
    /// target). Streams that are solo-muted, still warming up, or without
    /// usable integrated loudness are left alone.
    pub fn balance_now(&mut self, target_lufs: Option<f64>) {
        let target = target_lufs
            .unwrap_or(self.settings.auto_balance.target_lufs)
            .clamp(MIN_TARGET_LUFS, MAX_TARGET_LUFS);

        let mut updates = Vec::new();
        for processor in self.streams.values_mut() {
            if !matches!(processor.status(), lm_core::StreamStatus::Capturing) {
                continue;
            }
            // Solo-muted streams stay pinned at the mute sentinel.
            if processor.is_muted() {
                continue;
            }

            let reading = processor.latest_reading();
            if reading.block_count < MIN_BLOCKS_FOR_RELIABLE_LUFS
                || !reading.integrated.is_finite()
            {
                continue;
            }

            let required = target - reading.integrated;
            let applied = processor.set_gain(required);
            updates.push((processor.id(), applied));
        }

        for (stream_id, gain_db) in updates {
            log::debug!("balance: {stream_id} -> {gain_db:.1} dB");
            self.events.publish(Event::GainUpdated {
                stream_id,
                gain_db,
            });
        }
    }

    // ─── Limiter ─────────────────────────────────────────────────────────

    /// Replace the limiter settings record (already merged from a partial
    /// update by the caller), push it to the audio side, and broadcast.
    pub fn set_limiter(&mut self, settings: LimiterSettings) -> LimiterSettings {
        self.settings.limiter = settings.clamped();
        self.engine
            .send(EngineCommand::SetLimiter(self.settings.limiter));
        self.persist();
        self.events.publish(Event::LimiterUpdated {
            limiter: self.settings.limiter,
        });
        self.settings.limiter
    }

    // ─── Housekeeping ────────────────────────────────────────────────────

    /// Drop streams whose source no longer exists according to the host
    /// directory. Run every 5 s by the control loop.
    pub fn cleanup_stale(&mut self) {
        let Some(directory) = &self.directory else {
            return;
        };
        let stale: Vec<StreamId> = self
            .streams
            .keys()
            .copied()
            .filter(|id| !directory.stream_alive(*id))
            .collect();
        for stream_id in stale {
            self.remove_ended(stream_id, "stream gone");
        }
    }

    fn remove_ended(&mut self, stream_id: StreamId, reason: &str) {
        if let Some(mut processor) = self.streams.remove(&stream_id) {
            processor.mark_ended();
            self.engine.send(EngineCommand::RemoveStream(stream_id));
            self.reading_cache.write().remove(&stream_id);
            log::info!("{stream_id} ended: {reason}");
            self.events.publish(Event::StreamEnded {
                stream_id,
                reason: reason.to_string(),
            });
            if self.solo_stream == Some(stream_id) {
                self.clear_solo();
            }
        }
    }

    fn persist(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&self.settings) {
                log::warn!("failed to persist settings: {e}");
            }
        }
    }

    /// Snapshot every stream for the host.
    pub fn stream_snapshots(&self) -> Vec<StreamSnapshot> {
        let mut snapshots: Vec<StreamSnapshot> = self
            .streams
            .values()
            .map(|p| StreamSnapshot {
                stream_id: p.id(),
                label: p.label().to_string(),
                status: p.status(),
                gain_db: p.gain_db(),
                max_gain_db: p.max_gain_db(),
                solo: self.solo_stream == Some(p.id()),
                reading: p.latest_reading(),
            })
            .collect();
        snapshots.sort_by_key(|s| s.stream_id);
        snapshots
    }

    // ─── Command surface ─────────────────────────────────────────────────

    /// Execute one tagged command. This is the single entry point for
    /// channel-attached hosts; typed methods remain available for
    /// in-process callers.
    pub fn execute(&mut self, command: Command) -> LmResult<Response> {
        match command {
            Command::RegisterStream {
                stream_id,
                label,
                source,
            } => {
                self.register_stream(stream_id, label, source)?;
                Ok(Response::Ok)
            }
            Command::UnregisterStream { stream_id } => {
                self.unregister_stream(stream_id)?;
                Ok(Response::Ok)
            }
            Command::SetGain { stream_id, gain_db } => {
                let applied_gain_db = self.set_gain(stream_id, gain_db)?;
                Ok(Response::Gain { applied_gain_db })
            }
            Command::SetMaxGain {
                stream_id,
                max_gain_db,
            } => {
                let (applied_max_gain_db, applied_gain_db) =
                    self.set_max_gain(stream_id, max_gain_db)?;
                Ok(Response::MaxGain {
                    applied_max_gain_db,
                    applied_gain_db,
                })
            }
            Command::ResetMeasurements { stream_id } => {
                self.reset_measurements(stream_id)?;
                Ok(Response::Ok)
            }
            Command::GetStreams => Ok(Response::Streams {
                streams: self.stream_snapshots(),
                solo_stream: self.solo_stream,
            }),
            Command::ToggleSolo { stream_id } => {
                let solo_stream = self.toggle_solo(stream_id)?;
                Ok(Response::Solo { solo_stream })
            }
            Command::ClearSolo => {
                let solo_stream = self.clear_solo();
                Ok(Response::Solo { solo_stream })
            }
            Command::SetAutoBalance {
                enabled,
                target_lufs,
            } => {
                let settings = self.set_auto_balance(enabled, target_lufs);
                Ok(Response::AutoBalance(settings))
            }
            Command::BalanceNow { target_lufs } => {
                self.balance_now(target_lufs);
                Ok(Response::Ok)
            }
            Command::SetLimiter(update) => {
                let merged = update.apply_to(self.settings.limiter);
                Ok(Response::Limiter(self.set_limiter(merged)))
            }
            Command::GetLimiter => Ok(Response::Limiter(self.settings.limiter)),
        }
    }
}
