use crate::agent::DecisionLoop;
use crate::gateways::MailGateway;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::collections::{HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};

/// Remembers which messages already got a draft, oldest forgotten first
pub struct ProcessedLedger {
    capacity: usize,
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl ProcessedLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            ids: HashSet::new(),
        }
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.ids.contains(message_id)
    }

    pub fn record(&mut self, message_id: &str) {
        if self.capacity == 0 || !self.ids.insert(message_id.to_string()) {
            return;
        }
        self.order.push_back(message_id.to_string());
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Counts for one poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub fetched: usize,
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Fixed-interval driver feeding new mail to the decision loop, one email
/// at a time
pub struct Poller {
    mail: Arc<dyn MailGateway>,
    agent: DecisionLoop,
    interval: Duration,
    lookback_slack: Duration,
    processed: ProcessedLedger,
}

impl Poller {
    pub fn new(
        mail: Arc<dyn MailGateway>,
        agent: DecisionLoop,
        interval: Duration,
        lookback_slack: Duration,
        ledger_capacity: usize,
    ) -> Self {
        Self {
            mail,
            agent,
            interval,
            lookback_slack,
            processed: ProcessedLedger::new(ledger_capacity),
        }
    }

    /// How far back each tick looks for mail
    pub fn lookback(&self) -> Duration {
        self.interval + self.lookback_slack
    }

    pub fn processed(&self) -> &ProcessedLedger {
        &self.processed
    }

    /// Tick now, then every interval, forever
    pub async fn run(&mut self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            lookback_secs = self.lookback().as_secs(),
            "assistant_started"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    pub async fn tick(&mut self) -> TickReport {
        self.tick_at(Utc::now()).await
    }

    /// One poll cycle as of `now`. Never fails: every error is logged and
    /// counted.
    pub async fn tick_at(&mut self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        let lookback = self.lookback();
        let since = chrono::Duration::from_std(lookback)
            .ok()
            .and_then(|d| now.checked_sub_signed(d))
            .unwrap_or(now);

        let emails = match self.mail.list_since(since).await {
            Ok(emails) => emails,
            Err(e) => {
                tracing::error!(error = %e, "email_check_error");
                return report;
            }
        };
        report.fetched = emails.len();

        if emails.is_empty() {
            tracing::info!(minutes = lookback.as_secs() / 60, "no_new_emails");
            return report;
        }
        tracing::info!(count = emails.len(), "found_new_emails");

        for email in &emails {
            if self.processed.contains(&email.id) {
                tracing::info!(email_id = %email.id, "email_already_processed");
                report.skipped += 1;
                continue;
            }

            tracing::info!(
                email_id = %email.id,
                subject = %email.subject,
                sender = %email.sender,
                "processing_email"
            );

            match AssertUnwindSafe(self.agent.run(email)).catch_unwind().await {
                Ok(Ok(outcome)) => {
                    tracing::info!(
                        email_id = %email.id,
                        status = %outcome.status,
                        steps = outcome.steps,
                        actions = outcome.trace.len(),
                        "email_processed"
                    );
                    self.processed.record(&email.id);
                    report.processed += 1;
                }
                Ok(Err(e)) => {
                    tracing::error!(
                        email_id = %email.id,
                        error = %e,
                        actions = e.trace().len(),
                        "email_processing_error"
                    );
                    report.failed += 1;
                }
                Err(panic) => {
                    tracing::error!(
                        email_id = %email.id,
                        error = %panic_message(panic.as_ref()),
                        "email_processing_error"
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panic: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panic: {}", message)
    } else {
        "panic".to_string()
    }
}
