//! Event adapter between the message bus and the detection handlers.
//!
//! The subscriber loop turns every bus notification into a [`BusFrame`] and
//! hands it to [`on_snapshot_event`]. Control frames are ignored; each
//! message spawns its own worker thread which runs the handler to completion.
//! The subscriber never joins these workers. There is no pool and no queue
//! limit: a burst of snapshots means a burst of threads.

mod events;
mod publisher;
mod router;
mod snapshot;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::error::ProcessError;

pub use events::{DetectionEvent, SnapshotEvent, DETECTION_CHANNEL, DETECTION_LIST_NAME};
pub use publisher::{EventPublisher, MemoryPublisher, PublishedMessage};
pub use router::EventRouter;
pub use snapshot::SnapshotHandler;

pub(crate) use events::peek_camera_name;

/// One notification read from the bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusFrame {
    /// An application message.
    Message { topic: String, payload: Vec<u8> },
    /// Acks, pings, subscription confirmations and the like.
    Control,
}

impl BusFrame {
    pub fn message(topic: &str, payload: impl Into<Vec<u8>>) -> Self {
        Self::Message {
            topic: topic.to_string(),
            payload: payload.into(),
        }
    }
}

/// Processes one inbound message payload.
pub trait EventHandler: Send + Sync + 'static {
    /// Label used in thread names and log lines.
    fn name(&self) -> &'static str;

    fn handle_payload(&self, payload: &[u8]) -> Result<(), ProcessError>;
}

/// Dispatch `frame` to `handler` on a fresh worker thread.
///
/// Returns `None` for control frames (and when the thread could not be
/// spawned); the caller is free to drop the handle.
pub fn on_snapshot_event(
    handler: Arc<dyn EventHandler>,
    frame: &BusFrame,
) -> Option<JoinHandle<()>> {
    let BusFrame::Message { payload, .. } = frame else {
        return None;
    };
    let payload = payload.clone();
    let thread_name = format!("{}-worker", handler.name());
    let spawned = std::thread::Builder::new()
        .name(thread_name)
        .spawn(move || run_isolated(handler.as_ref(), &payload));
    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::error!("({}) failed to spawn event worker: {}", handler_label(frame), e);
            None
        }
    }
}

/// Run one unit of work, logging every failure and swallowing panics.
pub fn run_isolated(handler: &dyn EventHandler, payload: &[u8]) {
    match panic::catch_unwind(AssertUnwindSafe(|| handler.handle_payload(payload))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            log::error!(
                "an error occurred while handling a {} event (camera {}) [{}]: {:#}",
                handler.name(),
                camera_label(payload),
                e.kind(),
                e
            );
        }
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!(
                "a {} worker panicked (camera {}) [internal]: {}",
                handler.name(),
                camera_label(payload),
                reason
            );
        }
    }
}

fn camera_label(payload: &[u8]) -> String {
    peek_camera_name(payload).unwrap_or_else(|| "unknown".to_string())
}

fn handler_label(frame: &BusFrame) -> String {
    match frame {
        BusFrame::Message { payload, .. } => format!("camera {}", camera_label(payload)),
        BusFrame::Control => "control".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        panic_on: &'static [u8],
    }

    impl EventHandler for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn handle_payload(&self, payload: &[u8]) -> Result<(), ProcessError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if payload == self.panic_on {
                panic!("boom");
            }
            if payload.is_empty() {
                return Err(ProcessError::malformed("empty payload"));
            }
            Ok(())
        }
    }

    fn counting() -> Arc<Counting> {
        Arc::new(Counting {
            calls: AtomicUsize::new(0),
            panic_on: b"panic",
        })
    }

    #[test]
    fn control_frames_are_ignored() {
        let handler = counting();
        assert!(on_snapshot_event(handler.clone(), &BusFrame::Control).is_none());
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn each_message_runs_on_its_own_worker() {
        let handler = counting();
        let handles: Vec<_> = (0..4)
            .filter_map(|i| {
                on_snapshot_event(handler.clone(), &BusFrame::message("read_service", vec![i]))
            })
            .collect();
        assert_eq!(handles.len(), 4);
        for handle in handles {
            assert_eq!(handle.thread().name(), Some("counting-worker"));
            handle.join().expect("worker");
        }
        assert_eq!(handler.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn failures_and_panics_stay_inside_the_worker() {
        let handler = counting();
        for payload in [Vec::new(), b"panic".to_vec()] {
            let handle = on_snapshot_event(handler.clone(), &BusFrame::message("t", payload))
                .expect("spawned");
            assert!(handle.join().is_ok());
        }
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    }
}
