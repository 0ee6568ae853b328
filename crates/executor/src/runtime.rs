//! Shared execution state: settings, admission controllers and queue counters.
//!
//! One [`ExecutionRuntime`] is created at startup and handed to every
//! [`Executor`](crate::Executor) that should share the same limits.

use crate::admission::AdmissionController;
use crate::queue::{QueueState, QueueSubscription, QueueTracker};
use crate::settings::{ExecutorSettings, SettingsError, SettingsUpdate};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use tracing::{info, warn};

#[derive(Debug)]
pub struct ExecutionRuntime {
    settings: RwLock<ExecutorSettings>,
    global: AdmissionController,
    per_tool: Mutex<HashMap<String, AdmissionController>>,
    queue: QueueTracker,
}

impl Default for ExecutionRuntime {
    fn default() -> Self {
        Self::new(ExecutorSettings::default())
    }
}

impl ExecutionRuntime {
    pub fn new(settings: ExecutorSettings) -> Self {
        let settings = settings.validated().unwrap_or_else(|e| {
            warn!("Invalid executor settings ({}), using defaults", e);
            ExecutorSettings::default()
        });
        Self {
            global: AdmissionController::new(settings.global_concurrency),
            settings: RwLock::new(settings),
            per_tool: Mutex::new(HashMap::new()),
            queue: QueueTracker::new(),
        }
    }

    /// Current settings. Each call returns an independent copy.
    pub fn settings(&self) -> ExecutorSettings {
        self.settings.read().clone()
    }

    /// Apply a partial update. A new global limit takes effect immediately;
    /// calls already past policy resolution keep the values they resolved.
    pub fn configure(&self, update: &SettingsUpdate) -> Result<ExecutorSettings, SettingsError> {
        let next = {
            let mut settings = self.settings.write();
            let next = settings.apply(update)?;
            *settings = next.clone();
            next
        };
        self.global.set_limit(next.global_concurrency);
        info!(
            "Executor settings updated: timeout={}ms concurrency={} retries={}",
            next.default_timeout_ms, next.global_concurrency, next.default_retry.max_retries
        );
        Ok(next)
    }

    pub fn global_admission(&self) -> &AdmissionController {
        &self.global
    }

    /// Controller for `tool_id`, created on first use. An existing controller
    /// is re-limited when the tool's policy has changed. Controllers nobody
    /// holds are dropped here so the map only tracks tools in use.
    pub fn tool_admission(&self, tool_id: &str, limit: usize) -> AdmissionController {
        let mut per_tool = self.per_tool.lock();
        per_tool.retain(|id, controller| id == tool_id || !controller.is_unshared());
        match per_tool.get(tool_id) {
            Some(controller) => {
                if controller.limit() != limit.max(1) {
                    controller.set_limit(limit);
                }
                controller.clone()
            }
            None => {
                let controller = AdmissionController::new(limit);
                per_tool.insert(tool_id.to_string(), controller.clone());
                controller
            }
        }
    }

    /// Number of per-tool controllers currently kept.
    pub fn tracked_tools(&self) -> usize {
        self.per_tool.lock().len()
    }

    pub fn queue(&self) -> &QueueTracker {
        &self.queue
    }

    pub fn queue_state(&self) -> QueueState {
        self.queue.snapshot()
    }

    pub fn subscribe<F>(&self, listener: F) -> QueueSubscription
    where
        F: Fn(&QueueState) + Send + Sync + 'static,
    {
        self.queue.subscribe(listener)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_resizes_global_limit() {
        let runtime = ExecutionRuntime::default();
        assert_eq!(runtime.global_admission().limit(), 4);
        runtime
            .configure(&SettingsUpdate {
                global_concurrency: Some(2),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(runtime.global_admission().limit(), 2);
        assert_eq!(runtime.settings().global_concurrency, 2);
    }

    #[test]
    fn test_settings_are_copied_on_read() {
        let runtime = ExecutionRuntime::default();
        let mut copy = runtime.settings();
        copy.default_timeout_ms = 1;
        assert_eq!(runtime.settings().default_timeout_ms, 30_000);
    }

    #[test]
    fn test_rejected_update_leaves_settings_alone() {
        let runtime = ExecutionRuntime::default();
        let result = runtime.configure(&SettingsUpdate {
            default_timeout_ms: Some(0),
            global_concurrency: Some(9),
            ..Default::default()
        });
        assert!(result.is_err());
        assert_eq!(runtime.settings(), ExecutorSettings::default());
        assert_eq!(runtime.global_admission().limit(), 4);
    }

    #[test]
    fn test_tool_controller_is_reused_and_relimited() {
        let runtime = ExecutionRuntime::default();
        let first = runtime.tool_admission("t", 1);
        let _permit = first.try_acquire().unwrap();
        let second = runtime.tool_admission("t", 3);
        assert_eq!(second.in_flight(), 1);
        assert_eq!(first.limit(), 3);
    }

    #[test]
    fn test_idle_tool_controllers_are_pruned() {
        let runtime = ExecutionRuntime::default();
        drop(runtime.tool_admission("idle", 1));
        let busy = runtime.tool_admission("busy", 1);
        let permit = busy.try_acquire().unwrap();
        drop(busy);

        let _other = runtime.tool_admission("other", 1);
        assert_eq!(runtime.tracked_tools(), 2);

        // The held permit kept "busy" alive with its slot taken.
        assert!(runtime.tool_admission("busy", 1).try_acquire().is_none());
        drop(permit);
        assert!(runtime.tool_admission("busy", 1).try_acquire().is_some());
    }
}
