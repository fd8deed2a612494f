//! Per-monitor check loops

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::model::{check_interval_in_range, Monitor, MonitorError, MonitorRequest};
use super::registry::MonitorRegistry;
use crate::alerts::{
    Alert, AlertLog, AlertPipeline, Channel, ChannelStatsSnapshot, DispatchError, Dispatchers,
    Severity,
};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, SchedulerSettings};
use crate::sources::{self, CheckRequest, CheckerError, CheckerStatsSnapshot, SourceChecker, TriggerSet};

/// Minimum spacing between internal-fault alerts for one monitor
const FAULT_ALERT_WINDOW: Duration = Duration::from_secs(300);

/// Source tag of alerts raised by the loop itself
pub const SYSTEM_SOURCE: &str = "system";

/// Owns the monitors and drives one check loop per active monitor
#[derive(Clone)]
pub struct MonitorService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    registry: MonitorRegistry,
    checkers: Vec<SourceChecker>,
    pipeline: AlertPipeline,
    clock: Arc<dyn Clock>,
    settings: SchedulerSettings,
    handles: DashMap<String, LoopHandle>,
    #[cfg(test)]
    injected_panics: std::sync::atomic::AtomicU32,
}

struct LoopHandle {
    task: JoinHandle<()>,
    wake: Arc<Notify>,
}

/// What one check cycle produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub alerts: usize,
    pub failed_deliveries: usize,
}

/// Faults inside the loop's own book-keeping
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("Monitor {0} is not registered")]
    MonitorMissing(String),

    #[error("Check cycle panicked: {0}")]
    Panicked(String),
}

/// Errors building the service from configuration
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Source setup failed: {0}")]
    Sources(#[from] CheckerError),

    #[error("Dispatcher setup failed: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Allows at most one fault alert per window
#[derive(Debug)]
pub struct FaultGate {
    window: Duration,
    last: Option<Instant>,
}

impl FaultGate {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn allow(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.window => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

impl MonitorService {
    pub fn new(
        checkers: Vec<SourceChecker>,
        pipeline: AlertPipeline,
        settings: SchedulerSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                registry: MonitorRegistry::new(),
                checkers,
                pipeline,
                clock,
                settings,
                handles: DashMap::new(),
                #[cfg(test)]
                injected_panics: std::sync::atomic::AtomicU32::new(0),
            }),
        }
    }

    /// Wire sources, dispatchers and the alert log from configuration
    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        let checkers = sources::build_checkers(&config.sources)?;
        let dispatchers = Dispatchers::from_config(&config.notify)?;
        let pipeline = AlertPipeline::new(Arc::new(AlertLog::new()), dispatchers);

        Ok(Self::new(
            checkers,
            pipeline,
            config.scheduler.clone(),
            Arc::new(SystemClock),
        ))
    }

    /// Register a monitor and spawn its loop; the first cycle runs right away.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, request: MonitorRequest) -> Result<String, MonitorError> {
        request.validate()?;
        let check_interval = self.effective_interval(&request);
        check_interval_in_range(check_interval)?;

        let now = self.inner.clock.now();
        let id = format!("mon_{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
        let monitor = Monitor {
            id: id.clone(),
            target_name: request.target_name.trim().to_string(),
            target_identifier: request.target_identifier,
            trigger_keywords: request.trigger_keywords,
            notification_channels: request.channels,
            active: true,
            check_interval,
            last_check_time: None,
            created_at: now,
            expires_at: now + chrono::Duration::days(i64::from(request.duration_days)),
            checks_completed: 0,
            alerts_generated: 0,
        };

        tracing::info!(
            monitor_id = %id,
            target = %monitor.target_name,
            interval = ?monitor.check_interval,
            channels = ?monitor.notification_channels,
            "Monitor started"
        );
        self.inner.registry.insert(monitor);

        let wake = Arc::new(Notify::new());
        let task = tokio::spawn(monitor_loop(
            Arc::clone(&self.inner),
            id.clone(),
            Arc::clone(&wake),
        ));
        self.inner.handles.insert(id.clone(), LoopHandle { task, wake });

        Ok(id)
    }

    /// Interval a monitor registered with `request` would run at
    pub fn effective_interval(&self, request: &MonitorRequest) -> Duration {
        request
            .check_interval
            .unwrap_or(self.inner.settings.default_check_interval)
    }

    /// When a monitor registered now with `request` would next be checked
    /// after its immediate first cycle
    pub fn next_check(
        &self,
        request: &MonitorRequest,
    ) -> Result<chrono::DateTime<chrono::Utc>, MonitorError> {
        let interval = self.effective_interval(request);
        check_interval_in_range(interval)?;
        chrono::Duration::from_std(interval)
            .ok()
            .and_then(|d| self.inner.clock.now().checked_add_signed(d))
            .ok_or(MonitorError::InvalidInterval)
    }

    /// String-typed registration used by the dashboard layer
    pub fn start_monitor(
        &self,
        target_name: &str,
        target_identifier: Option<String>,
        triggers: impl IntoIterator<Item = String>,
        channels: &[String],
        duration_days: u32,
    ) -> Result<String, MonitorError> {
        let channels = channels
            .iter()
            .map(|c| {
                c.parse::<Channel>()
                    .map_err(|_| MonitorError::UnknownChannel(c.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut request = MonitorRequest::new(target_name)
            .with_triggers(triggers)
            .with_channels(channels)
            .with_duration_days(duration_days);
        request.target_identifier = target_identifier;

        self.start(request)
    }

    /// Stop a monitor; false if the id is unknown.
    ///
    /// A cycle already running completes; the loop then exits instead of
    /// rescheduling.
    pub fn stop(&self, id: &str) -> bool {
        if !self.inner.registry.deactivate(id) {
            return false;
        }

        if let Some(handle) = self.inner.handles.get(id) {
            handle.wake.notify_one();
        }
        tracing::info!(monitor_id = %id, "Monitor stopped");
        true
    }

    /// Same as [`MonitorService::stop`]
    pub fn stop_monitor(&self, id: &str) -> bool {
        self.stop(id)
    }

    pub fn get(&self, id: &str) -> Option<Monitor> {
        self.inner.registry.get(id)
    }

    pub fn list(&self) -> Vec<Monitor> {
        self.inner.registry.list()
    }

    pub fn active_count(&self) -> usize {
        self.inner.registry.active_count()
    }

    /// Whether the loop task of a monitor is still alive
    pub fn is_running(&self, id: &str) -> bool {
        self.inner
            .handles
            .get(id)
            .map(|h| !h.task.is_finished())
            .unwrap_or(false)
    }

    /// Alerts created within the last `hours` hours (inclusive lower bound)
    pub fn get_recent_alerts(&self, hours: u32) -> Vec<Alert> {
        self.inner
            .pipeline
            .log()
            .recent(hours, self.inner.clock.now())
    }

    /// Logged alerts, newest first, optionally filtered by severity
    pub fn alerts(&self, severity: Option<Severity>, limit: usize) -> Vec<Alert> {
        self.inner.pipeline.log().query(severity, limit)
    }

    pub fn alert_log(&self) -> &Arc<AlertLog> {
        self.inner.pipeline.log()
    }

    pub fn checker_stats(&self) -> Vec<(&'static str, CheckerStatsSnapshot)> {
        self.inner
            .checkers
            .iter()
            .map(|c| (c.name(), c.stats().snapshot()))
            .collect()
    }

    pub fn delivery_stats(&self) -> Vec<(Channel, ChannelStatsSnapshot)> {
        Channel::ALL
            .iter()
            .map(|&c| (c, self.inner.pipeline.stats().snapshot(c)))
            .collect()
    }

    /// Run one check cycle for a monitor outside its loop
    pub async fn run_cycle(&self, id: &str) -> Result<CycleSummary, CycleError> {
        let monitor = self
            .inner
            .registry
            .get(id)
            .ok_or_else(|| CycleError::MonitorMissing(id.to_string()))?;
        self.inner.run_cycle(&monitor).await
    }

    /// Deactivate every monitor and abort the loop tasks
    pub fn shutdown(&self) {
        for handle in self.inner.handles.iter() {
            self.inner.registry.deactivate(handle.key());
            handle.task.abort();
        }
        tracing::info!("Monitor service shut down");
    }

    /// Make the next `n` check cycles panic
    #[cfg(test)]
    pub(crate) fn inject_cycle_panics(&self, n: u32) {
        self.inner
            .injected_panics
            .store(n, std::sync::atomic::Ordering::SeqCst);
    }

    #[cfg(test)]
    pub(crate) async fn report_fault(&self, id: &str, gate: &mut FaultGate, error: &str) -> bool {
        match self.inner.registry.get(id) {
            Some(monitor) => self.inner.report_fault(&monitor, gate, error).await,
            None => false,
        }
    }
}

impl ServiceInner {
    async fn run_cycle(&self, monitor: &Monitor) -> Result<CycleSummary, CycleError> {
        #[cfg(test)]
        if self
            .injected_panics
            .fetch_update(
                std::sync::atomic::Ordering::SeqCst,
                std::sync::atomic::Ordering::SeqCst,
                |n| n.checked_sub(1),
            )
            .is_ok()
        {
            panic!("injected cycle panic");
        }

        let request = Arc::new(CheckRequest {
            target_name: monitor.target_name.clone(),
            target_identifier: monitor.target_identifier.clone(),
            triggers: TriggerSet::new(&monitor.trigger_keywords),
            channels: monitor.notification_channels.clone(),
            now: self.clock.now(),
        });

        let alerts = sources::check_all(&self.checkers, request).await;
        let produced = alerts.len();

        let reports = self.pipeline.process(alerts).await;
        let failed_deliveries = reports
            .iter()
            .flat_map(|r| r.outcomes.iter())
            .filter(|o| o.is_failure())
            .count();

        if !self
            .registry
            .record_cycle(&monitor.id, self.clock.now(), produced)
        {
            return Err(CycleError::MonitorMissing(monitor.id.clone()));
        }

        if produced > 0 {
            tracing::info!(
                monitor_id = %monitor.id,
                alerts = produced,
                failed_deliveries,
                "Check cycle raised alerts"
            );
        } else {
            tracing::debug!(monitor_id = %monitor.id, "Check cycle complete, nothing found");
        }

        Ok(CycleSummary {
            alerts: produced,
            failed_deliveries,
        })
    }

    /// Log an internal fault and, if the gate allows, raise a warning alert
    async fn report_fault(&self, monitor: &Monitor, gate: &mut FaultGate, error: &str) -> bool {
        tracing::error!(monitor_id = %monitor.id, error = %error, "Monitor loop fault");

        if !gate.allow(Instant::now()) {
            tracing::debug!(monitor_id = %monitor.id, "Fault alert suppressed");
            return false;
        }

        let alert = Alert::builder(SYSTEM_SOURCE, monitor.target_name.clone())
            .title("Monitoring error")
            .message(format!(
                "Error monitoring {}: {}",
                monitor.target_name, error
            ))
            .severity(Severity::Warning)
            .target_identifier(monitor.target_identifier.clone())
            .channels(monitor.notification_channels.clone())
            .meta("monitor_id", monitor.id.clone())
            .meta("error", error.to_string())
            .build(self.clock.now());

        self.pipeline.process(vec![alert]).await;
        self.registry.record_alerts(&monitor.id, 1);
        true
    }
}

async fn monitor_loop(inner: Arc<ServiceInner>, id: String, wake: Arc<Notify>) {
    let mut fault_gate = FaultGate::new(FAULT_ALERT_WINDOW);

    loop {
        let Some(monitor) = inner.registry.get(&id) else {
            break;
        };
        if !monitor.active {
            break;
        }
        if monitor.is_expired(inner.clock.now()) {
            inner.registry.deactivate(&id);
            tracing::info!(monitor_id = %id, "Monitor tracking period ended");
            break;
        }

        let outcome = AssertUnwindSafe(inner.run_cycle(&monitor))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(CycleError::Panicked(panic_message(&*panic))));

        let pause = match outcome {
            Ok(_) => monitor.check_interval,
            Err(e) => {
                inner
                    .report_fault(&monitor, &mut fault_gate, &e.to_string())
                    .await;
                inner.settings.fault_backoff
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = wake.notified() => {}
        }
    }

    tracing::debug!(monitor_id = %id, "Monitor loop exited");
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
