//! Caller silence detection.
//!
//! The monitor owns a single `tokio::time::Sleep`. Inbound frames re-arm it in
//! place; each expiry either yields a reminder to speak or, once the retry
//! budget is spent, tells the owner to end the call. Dropping the timer in
//! [`SilenceMonitor::cleanup`] makes any later expiry unobservable.

use std::future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{Instant, Sleep};
use tracing::{debug, info, warn};

use super::messages::OutboundFrame;

pub const DEFAULT_SILENCE_THRESHOLD: Duration = Duration::from_secs(5);
pub const DEFAULT_SILENCE_RETRIES: u32 = 3;
pub const DEFAULT_REMINDER_TEXT: &str = "Are you still there?";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SilenceConfig {
    /// Idle time before a reminder
    pub threshold: Duration,
    /// Reminders sent before the call is ended
    pub max_retries: u32,
    pub reminder_text: String,
}

impl Default for SilenceConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SILENCE_THRESHOLD,
            max_retries: DEFAULT_SILENCE_RETRIES,
            reminder_text: DEFAULT_REMINDER_TEXT.to_string(),
        }
    }
}

/// Outcome of a silence timer expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SilenceEvent {
    /// Speak `frame` to the caller; the timer is already re-armed
    Reminder { attempt: u32, frame: OutboundFrame },
    /// Retry budget spent; the timer is disarmed
    Exhausted { retries: u32 },
}

#[derive(Debug)]
pub struct SilenceMonitor {
    config: SilenceConfig,
    retry_count: u32,
    started: bool,
    timer: Option<Pin<Box<Sleep>>>,
}

impl SilenceMonitor {
    pub fn new(config: SilenceConfig) -> Self {
        Self {
            config,
            retry_count: 0,
            started: false,
            timer: None,
        }
    }

    /// Arm the timer. Returns false if monitoring is already running.
    pub fn start_monitoring(&mut self) -> bool {
        if self.started {
            warn!("Silence monitoring already started");
            return false;
        }
        self.started = true;
        self.retry_count = 0;
        self.arm();
        debug!(
            threshold_ms = self.config.threshold.as_millis() as u64,
            max_retries = self.config.max_retries,
            "Silence monitoring started"
        );
        true
    }

    /// Re-arm the timer for an inbound frame of `frame_type`.
    ///
    /// `info` frames are gateway chatter, not caller activity, so they keep
    /// the retry count.
    pub fn reset_timer(&mut self, frame_type: &str) {
        if !self.started {
            return;
        }
        if is_caller_activity(frame_type) {
            self.retry_count = 0;
        }
        self.arm();
    }

    /// Stop monitoring. Safe to call repeatedly or before starting.
    pub fn cleanup(&mut self) {
        self.timer = None;
        self.started = false;
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Wait for the next expiry. Pending forever while disarmed.
    ///
    /// Cancel-safe: state only changes after the timer has fired.
    pub async fn next_event(&mut self) -> SilenceEvent {
        match self.timer.as_mut() {
            Some(timer) => timer.as_mut().await,
            None => future::pending::<()>().await,
        }
        self.on_expiry()
    }

    fn on_expiry(&mut self) -> SilenceEvent {
        if self.retry_count < self.config.max_retries {
            self.retry_count += 1;
            self.arm();
            info!(
                attempt = self.retry_count,
                max_retries = self.config.max_retries,
                "Caller silent, sending reminder"
            );
            SilenceEvent::Reminder {
                attempt: self.retry_count,
                frame: OutboundFrame::text(self.config.reminder_text.clone(), true),
            }
        } else {
            self.timer = None;
            info!(retries = self.retry_count, "Caller silent after all reminders");
            SilenceEvent::Exhausted {
                retries: self.retry_count,
            }
        }
    }

    fn arm(&mut self) {
        let deadline = Instant::now() + self.config.threshold;
        match self.timer.as_mut() {
            Some(timer) => timer.as_mut().reset(deadline),
            None => self.timer = Some(Box::pin(tokio::time::sleep_until(deadline))),
        }
    }
}

fn is_caller_activity(frame_type: &str) -> bool {
    matches!(frame_type, "setup" | "prompt" | "interrupt" | "dtmf")
}
