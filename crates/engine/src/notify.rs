//! Notification and report dispatch
//!
//! Decisions and final reports are delivered to external collaborators
//! (dashboards, alerting channels) on a best-effort basis: dispatch is
//! fire-and-forget through a bounded queue, deliveries are retried with
//! capped exponential backoff, and a slow or failing sink never stalls the
//! scheduler loop.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::{EngineError, Result};
use ab_automation_config::NotificationConfig;
use ab_automation_types::{FinalReport, Notification};

/// Destination for engine notifications
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// Destination for final experiment reports
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn deliver_report(&self, report: &FinalReport) -> Result<()>;
}

/// Sink that writes notifications and reports to the log
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        info!(
            event = ?notification.event,
            experiment_id = %notification.experiment_id,
            "{}",
            notification.message
        );
        Ok(())
    }
}

#[async_trait]
impl ReportSink for LogSink {
    async fn deliver_report(&self, report: &FinalReport) -> Result<()> {
        info!(
            experiment_id = %report.summary.experiment_id,
            experiment_name = %report.summary.experiment_name,
            decision = ?report.decision.decision,
            participants = report.summary.total_participants,
            "final experiment report"
        );
        Ok(())
    }
}

/// In-memory sink for tests
#[derive(Debug, Default)]
pub struct MemorySink {
    notifications: Mutex<Vec<Notification>>,
    reports: Mutex<Vec<FinalReport>>,
    /// Number of initial deliveries to fail, for retry tests
    fail_first: Mutex<u32>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(times: u32) -> Self {
        Self {
            fail_first: Mutex::new(times),
            ..Default::default()
        }
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().expect("lock").clone()
    }

    pub fn reports(&self) -> Vec<FinalReport> {
        self.reports.lock().expect("lock").clone()
    }
}

#[async_trait]
impl NotificationSink for MemorySink {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        {
            let mut remaining = self.fail_first.lock().expect("lock");
            if *remaining > 0 {
                *remaining -= 1;
                return Err(EngineError::NotificationDelivery(
                    "simulated delivery failure".to_string(),
                ));
            }
        }
        self.notifications
            .lock()
            .expect("lock")
            .push(notification.clone());
        Ok(())
    }
}

#[async_trait]
impl ReportSink for MemorySink {
    async fn deliver_report(&self, report: &FinalReport) -> Result<()> {
        self.reports.lock().expect("lock").push(report.clone());
        Ok(())
    }
}

enum Outbound {
    Event(Notification),
    Report(FinalReport),
}

/// Fire-and-forget dispatcher with a bounded queue and retrying worker
pub struct Notifier {
    config: NotificationConfig,
    sender: Mutex<Option<mpsc::Sender<Outbound>>>,
    receiver: Mutex<Option<mpsc::Receiver<Outbound>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    sink: Arc<dyn NotificationSink>,
    report_sink: Arc<dyn ReportSink>,
}

impl Notifier {
    pub fn new(
        config: NotificationConfig,
        sink: Arc<dyn NotificationSink>,
        report_sink: Arc<dyn ReportSink>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_size);
        Self {
            config,
            sender: Mutex::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            worker: Mutex::new(None),
            sink,
            report_sink,
        }
    }

    /// Spawn the delivery worker. Must be called from a runtime context;
    /// calling twice is a no-op.
    pub fn start(&self) {
        let mut worker = self.worker.lock().expect("lock");
        if worker.is_some() {
            return;
        }

        let Some(mut rx) = self.receiver.lock().expect("lock").take() else {
            return;
        };

        let sink = self.sink.clone();
        let report_sink = self.report_sink.clone();
        let max_retries = self.config.max_retries;
        let backoff_ms = self.config.retry_backoff_ms;

        *worker = Some(tokio::spawn(async move {
            while let Some(outbound) = rx.recv().await {
                Self::deliver_with_retry(
                    &*sink,
                    &*report_sink,
                    outbound,
                    max_retries,
                    backoff_ms,
                )
                .await;
            }
            debug!("notification worker drained and shut down");
        }));
    }

    async fn deliver_with_retry(
        sink: &dyn NotificationSink,
        report_sink: &dyn ReportSink,
        outbound: Outbound,
        max_retries: u32,
        backoff_ms: u64,
    ) {
        let mut attempt = 0u32;
        loop {
            let result = match &outbound {
                Outbound::Event(notification) => sink.deliver(notification).await,
                Outbound::Report(report) => report_sink.deliver_report(report).await,
            };

            match result {
                Ok(()) => return,
                Err(e) if attempt < max_retries => {
                    let backoff = backoff_ms.saturating_mul(1u64 << attempt.min(10));
                    warn!(attempt, "notification delivery failed, retrying: {e}");
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!("notification delivery failed after {attempt} retries: {e}");
                    return;
                }
            }
        }
    }

    /// Queue a notification without waiting for delivery.
    ///
    /// Disabled notifications and queue overflow are dropped; overflow is
    /// logged.
    pub fn dispatch(&self, notification: Notification) {
        if !self.config.enable_notifications {
            return;
        }
        self.try_enqueue(Outbound::Event(notification));
    }

    /// Queue a final report without waiting for delivery.
    pub fn dispatch_report(&self, report: FinalReport) {
        if !self.config.enable_automatic_reporting {
            return;
        }
        self.try_enqueue(Outbound::Report(report));
    }

    fn try_enqueue(&self, outbound: Outbound) {
        let sender = self.sender.lock().expect("lock");
        let Some(tx) = sender.as_ref() else {
            return;
        };

        match tx.try_send(outbound) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("notification queue full, dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("notification channel closed, dropping message");
            }
        }
    }

    /// Close the queue and wait for the worker to drain, bounded by the
    /// given timeout.
    pub async fn shutdown(&self, timeout: Duration) {
        // Dropping the sender lets the worker drain and exit
        self.sender.lock().expect("lock").take();

        let handle = self.worker.lock().expect("lock").take();
        if let Some(handle) = handle {
            if tokio::time::timeout(timeout, handle).await.is_err() {
                warn!("notification worker did not drain within {timeout:?}");
            }
        }
    }
}
