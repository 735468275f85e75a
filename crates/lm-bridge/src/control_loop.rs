//! Control thread
//!
//! Puts a [`Coordinator`] on its own thread and multiplexes four inputs:
//! host commands (with replies), the fast reading drain, the 500 ms
//! auto-balance cadence, and the 5 s stale-stream cleanup. The 500 ms
//! cadence against the 100 ms block hop guarantees at least four fresh
//! blocks between balance passes, which keeps the loop from oscillating.

use crate::command::{Command, Response};
use crate::coordinator::Coordinator;
use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use lm_core::{LmError, LmResult};
use std::thread::JoinHandle;
use std::time::Duration;

/// Auto-balance pass cadence.
pub const BALANCE_INTERVAL: Duration = Duration::from_millis(500);

/// Stale-stream cleanup cadence.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(5);

/// Reading-drain cadence. Readings arrive at ~10 Hz per stream; draining
/// at 20 Hz keeps latency low without busy-waiting.
pub const PUMP_INTERVAL: Duration = Duration::from_millis(50);

enum Request {
    Execute(Command, Sender<LmResult<Response>>),
    Shutdown,
}

/// Handle for talking to a running control loop.
pub struct ControlHandle {
    requests: Sender<Request>,
}

impl ControlHandle {
    /// Execute a command on the control thread and wait for its response.
    pub fn execute(&self, command: Command) -> LmResult<Response> {
        let (reply_tx, reply_rx) = bounded(1);
        self.requests
            .send(Request::Execute(command, reply_tx))
            .map_err(|_| LmError::Internal("control loop is gone".into()))?;
        reply_rx
            .recv()
            .map_err(|_| LmError::Internal("control loop dropped the reply".into()))?
    }

    /// Ask the loop to stop. Pending commands are answered first.
    pub fn shutdown(&self) {
        let _ = self.requests.send(Request::Shutdown);
    }
}

/// The control thread wrapper.
pub struct ControlLoop {
    handle: ControlHandle,
    thread: JoinHandle<Coordinator>,
}

impl ControlLoop {
    /// Move `coordinator` onto a dedicated thread and start the cadences.
    pub fn spawn(coordinator: Coordinator) -> Self {
        let (request_tx, request_rx) = bounded::<Request>(64);
        let thread = std::thread::Builder::new()
            .name("lm-control".into())
            .spawn(move || run(coordinator, request_rx))
            .expect("spawn control thread");

        Self {
            handle: ControlHandle {
                requests: request_tx,
            },
            thread,
        }
    }

    pub fn handle(&self) -> &ControlHandle {
        &self.handle
    }

    /// Stop the loop and get the coordinator back.
    pub fn join(self) -> Coordinator {
        self.handle.shutdown();
        match self.thread.join() {
            Ok(coordinator) => coordinator,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

fn run(mut coordinator: Coordinator, requests: Receiver<Request>) -> Coordinator {
    let pump = tick(PUMP_INTERVAL);
    let balance = tick(BALANCE_INTERVAL);
    let cleanup = tick(CLEANUP_INTERVAL);

    loop {
        select! {
            recv(requests) -> request => match request {
                Ok(Request::Execute(command, reply)) => {
                    log::trace!("command: {command:?}");
                    let response = coordinator.execute(command);
                    let _ = reply.send(response);
                }
                // Explicit shutdown or every handle dropped.
                Ok(Request::Shutdown) | Err(_) => break,
            },
            recv(pump) -> _ => coordinator.pump(),
            recv(balance) -> _ => {
                if coordinator.auto_balance().enabled {
                    coordinator.pump();
                    coordinator.balance_now(None);
                }
            }
            recv(cleanup) -> _ => coordinator.cleanup_stale(),
        }
    }
    coordinator
}

#[cfg(test)]
mod tests {
    use super::*;
    use lm_engine::{mix_bus, SineSource};
    use lm_state::BalancerSettings;

    #[test]
    fn test_spawn_execute_join() {
        let (_bus, handle) = mix_bus(48000.0);
        let coordinator = Coordinator::new(handle, BalancerSettings::default());
        let control = ControlLoop::spawn(coordinator);

        let response = control
            .handle()
            .execute(Command::RegisterStream {
                stream_id: lm_core::StreamId(1),
                label: "one".into(),
                source: Box::new(SineSource::new(48000.0, 440.0, 0.1)),
            })
            .unwrap();
        assert!(matches!(response, Response::Ok));

        let response = control.handle().execute(Command::GetStreams).unwrap();
        match response {
            Response::Streams { streams, .. } => assert_eq!(streams.len(), 1),
            other => panic!("unexpected {other:?}"),
        }

        let coordinator = control.join();
        assert_eq!(coordinator.stream_count(), 1);
    }

    #[test]
    fn test_unknown_stream_error_round_trips() {
        let (_bus, handle) = mix_bus(48000.0);
        let coordinator = Coordinator::new(handle, BalancerSettings::default());
        let control = ControlLoop::spawn(coordinator);

        let err = control
            .handle()
            .execute(Command::SetGain {
                stream_id: lm_core::StreamId(42),
                gain_db: -3.0,
            })
            .unwrap_err();
        assert!(matches!(err, LmError::UnknownStream(_)));
        control.join();
    }
}
