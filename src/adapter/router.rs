use std::sync::Arc;
use std::thread::JoinHandle;

use super::{on_snapshot_event, BusFrame, EventHandler};
use crate::policy::PolicyStore;

/// Routes bus frames by topic: snapshots fan out to every registered
/// handler, policy-change signals reload the policy store in place.
pub struct EventRouter {
    snapshot_topic: String,
    policy_topic: String,
    handlers: Vec<Arc<dyn EventHandler>>,
    policies: Arc<PolicyStore>,
}

impl EventRouter {
    pub fn new(snapshot_topic: &str, policy_topic: &str, policies: Arc<PolicyStore>) -> Self {
        Self {
            snapshot_topic: snapshot_topic.to_string(),
            policy_topic: policy_topic.to_string(),
            handlers: Vec::new(),
            policies,
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Topics the subscriber must be subscribed to.
    pub fn topics(&self) -> Vec<&str> {
        vec![self.snapshot_topic.as_str(), self.policy_topic.as_str()]
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Route one frame. Returns the handles of any workers spawned.
    pub fn route(&self, frame: &BusFrame) -> Vec<JoinHandle<()>> {
        let BusFrame::Message { topic, .. } = frame else {
            return Vec::new();
        };
        if *topic == self.snapshot_topic {
            return self
                .handlers
                .iter()
                .filter_map(|handler| on_snapshot_event(Arc::clone(handler), frame))
                .collect();
        }
        if *topic == self.policy_topic {
            match self.policies.reload() {
                Ok(count) => log::info!("policy change applied, {} cameras configured", count),
                Err(e) => log::error!("policy reload failed, keeping previous policies: {:#}", e),
            }
            return Vec::new();
        }
        log::debug!("ignoring message on unexpected topic {}", topic);
        Vec::new()
    }
}
