// Display port: everything the user sees goes out as a DisplayUpdate.
//
// The pipeline never renders anything itself. `TracingDisplay` is the
// terminal sink used by the binary; tests record updates instead.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub total: usize,
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayUpdate {
    Counts(Counts),
    Limits {
        daily: u32,
        daily_cap: u32,
        hourly: u32,
        hourly_cap: u32,
    },
    /// Percent, 0..=100.
    Progress(u8),
    Status(String),
    Countdown { remaining: Duration },
    Log(LogLine),
}

pub trait DisplayPort: Send + Sync {
    fn update(&self, update: DisplayUpdate);
}

/// Convenience wrapper the pipeline components share.
#[derive(Clone)]
pub struct Reporter {
    port: Arc<dyn DisplayPort>,
}

impl Reporter {
    pub fn new(port: Arc<dyn DisplayPort>) -> Self {
        Self { port }
    }

    pub fn send(&self, update: DisplayUpdate) {
        self.port.update(update);
    }

    pub fn log(&self, severity: Severity, message: impl Into<String>) {
        self.send(DisplayUpdate::Log(LogLine {
            timestamp: Utc::now(),
            severity,
            message: message.into(),
        }));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Severity::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.log(Severity::Success, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(Severity::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Severity::Error, message);
    }

    pub fn status(&self, text: impl Into<String>) {
        self.send(DisplayUpdate::Status(text.into()));
    }

    pub fn progress(&self, percent: usize) {
        self.send(DisplayUpdate::Progress(percent.min(100) as u8));
    }

    pub fn counts(&self, counts: Counts) {
        self.send(DisplayUpdate::Counts(counts));
    }

    pub fn limits(&self, daily: u32, daily_cap: u32, hourly: u32, hourly_cap: u32) {
        self.send(DisplayUpdate::Limits {
            daily,
            daily_cap,
            hourly,
            hourly_cap,
        });
    }

    pub fn countdown(&self, remaining: Duration) {
        self.send(DisplayUpdate::Countdown { remaining });
    }
}

/// Format a wait as `m:ss`.
pub fn format_countdown(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Renders updates as tracing events.
pub struct TracingDisplay;

impl DisplayPort for TracingDisplay {
    fn update(&self, update: DisplayUpdate) {
        match update {
            DisplayUpdate::Log(line) => match line.severity {
                Severity::Info => info!("{}", line.message),
                Severity::Success => info!(success = true, "{}", line.message),
                Severity::Warning => warn!("{}", line.message),
                Severity::Error => error!("{}", line.message),
            },
            DisplayUpdate::Status(text) => info!(status = text.as_str(), "Status"),
            DisplayUpdate::Counts(c) => debug!(
                total = c.total,
                pending = c.pending,
                completed = c.completed,
                failed = c.failed,
                "Counts"
            ),
            DisplayUpdate::Limits {
                daily,
                daily_cap,
                hourly,
                hourly_cap,
            } => debug!(daily, daily_cap, hourly, hourly_cap, "Limits"),
            DisplayUpdate::Progress(p) => debug!(percent = p, "Progress"),
            DisplayUpdate::Countdown { remaining } => {
                let secs = remaining.as_secs();
                if secs > 0 && secs % 60 == 0 {
                    info!("Next batch in {}", format_countdown(remaining));
                } else {
                    debug!(remaining = %format_countdown(remaining), "Countdown");
                }
            }
        }
    }
}
