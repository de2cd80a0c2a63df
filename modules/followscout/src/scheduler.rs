// Quota-aware batch scheduler.
//
// Drains the pending queue in randomized-size batches, one action at a time,
// under daily and per-interval caps. Every wait is interruptible through
// RunControl; the partition and counters are owned here for the whole run.

use std::sync::Arc;
use std::time::Duration;

use followscout_common::{Candidate, HourlyLimitPolicy, ThrottleConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::control::{RunControl, RunState, WaitOutcome};
use crate::display::{format_countdown, Reporter};
use crate::queue::{FailureReason, Outcome, Partition};
use crate::traits::SocialGraphService;

/// Action counters. Kept by the session across runs so a restarted run
/// cannot exceed the caps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaCounters {
    pub daily: u32,
    /// Reset at the end of each inter-batch delay.
    pub hourly: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    /// Nothing left pending.
    Done,
    Stopped,
    DailyLimit,
    HourlyLimit,
    SessionRejected,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub end: RunEnd,
    pub completed: usize,
    pub failed_daily_limit: usize,
    pub failed_hourly_limit: usize,
    pub failed_api_error: usize,
    pub failed_exception: usize,
    pub already_related: usize,
    pub skipped: usize,
    pub still_pending: usize,
    pub daily_count: u32,
    pub hourly_count: u32,
    pub batches: u32,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.failed_daily_limit + self.failed_hourly_limit + self.failed_api_error + self.failed_exception
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Follow Run Complete ===")?;
        writeln!(f, "Result:           {:?}", self.end)?;
        writeln!(f, "Batches:          {}", self.batches)?;
        writeln!(f, "Followed:         {}", self.completed)?;
        writeln!(f, "Already followed: {}", self.already_related)?;
        writeln!(f, "Skipped:          {}", self.skipped)?;
        writeln!(f, "Still pending:    {}", self.still_pending)?;
        writeln!(f, "Failed:           {}", self.failed())?;
        writeln!(f, "  daily_limit:  {}", self.failed_daily_limit)?;
        writeln!(f, "  hourly_limit: {}", self.failed_hourly_limit)?;
        writeln!(f, "  api_error:    {}", self.failed_api_error)?;
        writeln!(f, "  exception:    {}", self.failed_exception)?;
        writeln!(f, "\nDaily count:  {}", self.daily_count)?;
        writeln!(f, "Hourly count: {}", self.hourly_count)?;
        Ok(())
    }
}

/// Draw a batch size: base ± variation, clamped to `[1, min(hard_cap, remaining)]`.
pub fn batch_size<R: Rng>(throttle: &ThrottleConfig, remaining: usize, rng: &mut R) -> usize {
    let base = i64::from(throttle.batch_size_base);
    let variation = i64::from(throttle.batch_size_variation);
    let drawn = if variation == 0 {
        base
    } else {
        base + rng.random_range(-variation..=variation)
    };
    let upper = (throttle.batch_size_hard_cap as usize).min(remaining).max(1);
    (drawn.max(1) as usize).min(upper)
}

pub struct QuotaScheduler {
    service: Arc<dyn SocialGraphService>,
    throttle: ThrottleConfig,
    control: RunControl,
    reporter: Reporter,
    partition: Partition,
    counters: QuotaCounters,
    rng: StdRng,
    /// Inter-batch delay still to be served before the next batch.
    owed_delay: Option<Duration>,
    batches: u32,
    run_id: Uuid,
}

impl QuotaScheduler {
    pub fn new(
        service: Arc<dyn SocialGraphService>,
        throttle: ThrottleConfig,
        control: RunControl,
        reporter: Reporter,
        partition: Partition,
        counters: QuotaCounters,
    ) -> Self {
        Self {
            service,
            throttle,
            control,
            reporter,
            partition,
            counters,
            rng: StdRng::from_os_rng(),
            owed_delay: None,
            batches: 0,
            run_id: Uuid::new_v4(),
        }
    }

    /// Replace the random source, for reproducible runs.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn counters(&self) -> QuotaCounters {
        self.counters
    }

    pub fn into_parts(self) -> (Partition, QuotaCounters) {
        (self.partition, self.counters)
    }

    /// Drain the queue. The caller must have moved the state to Following.
    pub async fn run(&mut self) -> RunSummary {
        info!(
            run_id = %self.run_id,
            pending = self.partition.pending().len(),
            daily = self.counters.daily,
            "Follow run started"
        );
        self.reporter.status("Following...");
        self.report();

        let end = loop {
            if self.partition.pending().is_empty() {
                break RunEnd::Done;
            }

            match self.control.state() {
                RunState::Following => {}
                RunState::Paused => {
                    self.reporter.status("Paused");
                    if self.control.wait_while_paused().await != RunState::Following {
                        break RunEnd::Stopped;
                    }
                    self.reporter.status("Following...");
                    continue;
                }
                _ => break RunEnd::Stopped,
            }

            if let Some(owed) = self.owed_delay.take() {
                match self.countdown(owed).await {
                    WaitOutcome::Completed => {
                        self.counters.hourly = 0;
                        debug!(run_id = %self.run_id, "Hourly counter reset");
                        self.report_limits();
                    }
                    WaitOutcome::Interrupted { remaining, .. } => {
                        self.owed_delay = Some(remaining);
                    }
                }
                continue;
            }

            if let Some(halt) = self.run_batch().await {
                break halt;
            }

            if !self.partition.pending().is_empty() && self.control.state() == RunState::Following {
                let delay = self.throttle.inter_batch_delay.sample(&mut self.rng);
                info!(run_id = %self.run_id, delay_secs = delay.as_secs(), "Batch complete");
                self.reporter
                    .info(format!("Batch complete. Next batch in {}", format_countdown(delay)));
                self.owed_delay = Some(delay);
            }
        };

        let summary = self.summary(end);
        match end {
            RunEnd::Done => self.reporter.success("All done!"),
            RunEnd::Stopped => self.reporter.info("Process stopped"),
            RunEnd::DailyLimit => self.reporter.warning("Daily limit reached, run halted"),
            RunEnd::HourlyLimit => self.reporter.warning("Hourly limit reached, run halted"),
            RunEnd::SessionRejected => self.reporter.error("Session rejected, run halted"),
        }
        self.reporter.info(format!(
            "Final stats: {} followed, {} failed, {} already followed, {} skipped, {} pending",
            summary.completed,
            summary.failed(),
            summary.already_related,
            summary.skipped,
            summary.still_pending
        ));
        self.reporter.status("Ready");
        info!(run_id = %self.run_id, end = ?end, completed = summary.completed, failed = summary.failed(), "Follow run finished");
        summary
    }

    async fn countdown(&self, total: Duration) -> WaitOutcome {
        let reporter = self.reporter.clone();
        reporter.countdown(total);
        self.control
            .wait(total, RunState::Following, |left| reporter.countdown(left))
            .await
    }

    /// One batch. Returns a halt reason if the run must end.
    async fn run_batch(&mut self) -> Option<RunEnd> {
        if self.throttle.shuffle_every_batch {
            self.partition.shuffle_pending(&mut self.rng);
        }
        let size = batch_size(&self.throttle, self.partition.pending().len(), &mut self.rng);
        let batch: Vec<Candidate> = self.partition.pending()[..size].to_vec();
        self.batches += 1;

        info!(run_id = %self.run_id, batch = self.batches, size, "Starting batch");
        self.reporter
            .info(format!("Starting batch {} ({size} accounts)", self.batches));

        for candidate in &batch {
            if self.control.state() != RunState::Following {
                return None;
            }
            if let Some(halt) = self.process(candidate).await {
                return Some(halt);
            }
        }
        None
    }

    async fn process(&mut self, candidate: &Candidate) -> Option<RunEnd> {
        if self.counters.daily >= self.throttle.daily_cap {
            self.resolve(candidate, Outcome::Failed(FailureReason::DailyLimit));
            warn!(run_id = %self.run_id, daily = self.counters.daily, "Daily cap reached");
            return Some(RunEnd::DailyLimit);
        }

        if self.counters.hourly >= self.throttle.hourly_cap {
            self.resolve(candidate, Outcome::Failed(FailureReason::HourlyLimit));
            return match self.throttle.hourly_limit_policy {
                HourlyLimitPolicy::FailItem => {
                    self.reporter
                        .warning(format!("Hourly limit reached, skipped {candidate}"));
                    None
                }
                HourlyLimitPolicy::HaltRun => {
                    warn!(run_id = %self.run_id, hourly = self.counters.hourly, "Hourly cap reached");
                    Some(RunEnd::HourlyLimit)
                }
            };
        }

        match self.service.relationship_status(&candidate.id).await {
            Ok(true) => {
                self.reporter.info(format!("Already following {candidate}"));
                self.resolve(candidate, Outcome::AlreadyRelated);
                return None;
            }
            Ok(false) => {}
            Err(e) => debug!(candidate = %candidate, error = %e, "Re-probe failed, treating as not followed"),
        }

        let delay = self.throttle.per_action_delay.sample(&mut self.rng);
        self.reporter.info(format!(
            "Waiting {} before following {candidate}",
            format_countdown(delay)
        ));
        if let WaitOutcome::Interrupted { .. } =
            self.control.wait(delay, RunState::Following, |_| {}).await
        {
            return None;
        }

        let (outcome, halt) = match self.service.perform_action(&candidate.id).await {
            Ok(result) if result.ok => {
                self.counters.daily += 1;
                self.counters.hourly += 1;
                self.reporter.success(format!("Followed {candidate}"));
                (Outcome::Completed, None)
            }
            Ok(result) => {
                warn!(candidate = %candidate, status = result.status, "Follow not confirmed");
                self.reporter
                    .warning(format!("Failed to follow {candidate} (status {})", result.status));
                (Outcome::Failed(FailureReason::ApiError), None)
            }
            Err(e) if e.is_terminal() => {
                error!(candidate = %candidate, error = %e, "Session rejected");
                self.reporter.error(format!("Error following {candidate}: {e}"));
                (Outcome::Failed(FailureReason::Exception), Some(RunEnd::SessionRejected))
            }
            Err(e) => {
                error!(candidate = %candidate, error = %e, "Follow request failed");
                self.reporter.error(format!("Error following {candidate}: {e}"));
                (Outcome::Failed(FailureReason::Exception), None)
            }
        };
        self.resolve(candidate, outcome);
        halt
    }

    fn resolve(&mut self, candidate: &Candidate, outcome: Outcome) {
        self.partition.resolve(&candidate.id, outcome);
        self.report();
    }

    fn report(&self) {
        self.reporter.counts(self.partition.counts());
        self.reporter.progress(self.partition.percent_complete());
        self.report_limits();
    }

    fn report_limits(&self) {
        self.reporter.limits(
            self.counters.daily,
            self.throttle.daily_cap,
            self.counters.hourly,
            self.throttle.hourly_cap,
        );
    }

    fn summary(&self, end: RunEnd) -> RunSummary {
        let p = &self.partition;
        debug_assert_eq!(p.bucket_sum(), p.total(), "bucket sizes drifted from total");
        RunSummary {
            run_id: self.run_id,
            end,
            completed: p.completed().len(),
            failed_daily_limit: p.failed_by(FailureReason::DailyLimit),
            failed_hourly_limit: p.failed_by(FailureReason::HourlyLimit),
            failed_api_error: p.failed_by(FailureReason::ApiError),
            failed_exception: p.failed_by(FailureReason::Exception),
            already_related: p.already_related().len(),
            skipped: p.skipped().len(),
            still_pending: p.pending().len(),
            daily_count: self.counters.daily,
            hourly_count: self.counters.hourly,
            batches: self.batches,
        }
    }
}
