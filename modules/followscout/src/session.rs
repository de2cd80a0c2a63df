// Session controller: scan pipeline, follow runs, and the command loop.

use std::future::Future;
use std::sync::Arc;

use followscout_common::{ContainerKind, ContainerRef, FileConfig, FollowScoutError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::control::{RunControl, RunState};
use crate::display::{DisplayPort, Reporter};
use crate::harvester::{HarvestEnd, Harvester};
use crate::membership::MembershipFilter;
use crate::queue::Partition;
use crate::resolver::IdentityResolver;
use crate::scheduler::{QuotaCounters, QuotaScheduler, RunSummary};
use crate::traits::SocialGraphService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEnd {
    /// Candidates are classified and waiting for Start.
    Ready,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct ScanReport {
    pub end: ScanEnd,
    pub harvest_end: Option<HarvestEnd>,
    pub harvested: usize,
    pub already_related: usize,
    pub pending: usize,
    pub skipped: usize,
}

impl ScanReport {
    fn stopped(harvest_end: Option<HarvestEnd>, harvested: usize) -> Self {
        Self {
            end: ScanEnd::Stopped,
            harvest_end,
            harvested,
            already_related: 0,
            pending: 0,
            skipped: 0,
        }
    }
}

pub struct FollowScout {
    service: Arc<dyn SocialGraphService>,
    config: FileConfig,
    control: RunControl,
    reporter: Reporter,
    prepared: Option<Partition>,
    counters: QuotaCounters,
    rng_seed: Option<u64>,
}

impl FollowScout {
    pub fn new(
        service: Arc<dyn SocialGraphService>,
        config: FileConfig,
        display: Arc<dyn DisplayPort>,
    ) -> Self {
        Self {
            service,
            config,
            control: RunControl::new(),
            reporter: Reporter::new(display),
            prepared: None,
            counters: QuotaCounters::default(),
            rng_seed: None,
        }
    }

    pub fn with_control(mut self, control: RunControl) -> Self {
        self.control = control;
        self
    }

    /// Seed the scheduler's random source.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    /// The classified queue waiting for Start, if any.
    pub fn prepared(&self) -> Option<&Partition> {
        self.prepared.as_ref()
    }

    pub fn counters(&self) -> QuotaCounters {
        self.counters
    }

    /// Resolve, harvest, and classify the target named by `input`.
    pub async fn scan(&mut self, input: &str) -> Result<ScanReport, FollowScoutError> {
        let reference = match ContainerRef::parse(input) {
            Ok(reference) => reference,
            Err(e) => {
                self.reporter.error(format!("Invalid target: {e}"));
                return Err(e);
            }
        };

        self.control.begin_scan()?;
        let result = self.scan_inner(&reference).await;
        self.control.end_scan();

        match &result {
            Ok(report) if report.end == ScanEnd::Stopped => {
                self.reporter.info("Scan stopped");
                self.reporter.status("Idle");
            }
            Ok(_) => {}
            Err(FollowScoutError::NotFound(_)) => {
                self.reporter.error(format!("Could not find an identifier for {reference}"));
                self.reporter.status("Identifier not found");
            }
            Err(e) => {
                self.reporter.error(format!("Scan failed: {e}"));
                self.reporter.status("Idle");
            }
        }
        result
    }

    async fn scan_inner(&mut self, reference: &ContainerRef) -> Result<ScanReport, FollowScoutError> {
        self.prepared = None;
        self.reporter.status("Scanning...");
        self.reporter.progress(0);
        info!(reference = %reference, "Scan started");

        let container = IdentityResolver::new(self.service.clone())
            .resolve(reference)
            .await?;

        let harvester = Harvester::new(
            self.service.clone(),
            self.config.harvest.clone(),
            self.control.clone(),
            self.reporter.clone(),
        );
        let harvest = harvester.fetch_all(&container).await?;
        if harvest.end == HarvestEnd::Stopped {
            return Ok(ScanReport::stopped(Some(harvest.end), harvest.candidates.len()));
        }

        let mut candidates = harvest.candidates;
        if candidates.is_empty() && container.kind == ContainerKind::Likers {
            self.reporter.info("Trying alternative method...");
            candidates = harvester.embedded_fallback(reference).await;
        }
        if candidates.is_empty() {
            return Err(FollowScoutError::NoCandidates);
        }
        let harvested = candidates.len();
        self.reporter
            .info(format!("Found {harvested} {}", container.kind));

        let filter = MembershipFilter::new(
            self.service.clone(),
            self.config.harvest.clone(),
            self.control.clone(),
            self.reporter.clone(),
        );
        let Some(classification) = filter.classify(candidates).await else {
            return Ok(ScanReport::stopped(Some(harvest.end), harvested));
        };

        let mut partition = Partition::new(classification.pending, classification.already_related);
        if self.config.throttle.randomize_order {
            partition.shuffle_pending(&mut rand::rng());
        }
        let skipped = partition.skip_percentage(self.config.throttle.skip_percentage);
        if skipped > 0 {
            self.reporter.info(format!("Skipping {skipped} accounts"));
        }

        let report = ScanReport {
            end: ScanEnd::Ready,
            harvest_end: Some(harvest.end),
            harvested,
            already_related: partition.already_related().len(),
            pending: partition.pending().len(),
            skipped,
        };
        info!(
            harvested,
            already_related = report.already_related,
            pending = report.pending,
            skipped,
            "Scan ready"
        );

        self.reporter.counts(partition.counts());
        self.reporter.progress(100);
        self.reporter.status("Ready!");
        self.reporter.success(format!(
            "Ready! {} to follow, {} already followed",
            report.pending, report.already_related
        ));
        self.prepared = Some(partition);
        Ok(report)
    }

    /// Drain the prepared queue. Pending leftovers stay prepared for another Start.
    pub async fn start(&mut self) -> Result<RunSummary, FollowScoutError> {
        let has_pending = self
            .prepared
            .as_ref()
            .is_some_and(|p| !p.pending().is_empty());
        if !has_pending {
            self.reporter.warning("Nothing to follow. Scan a target first");
            return Err(FollowScoutError::NothingPending);
        }

        self.control.begin_following()?;
        let Some(partition) = self.prepared.take() else {
            self.control.finish();
            return Err(FollowScoutError::NothingPending);
        };

        let mut scheduler = QuotaScheduler::new(
            self.service.clone(),
            self.config.throttle.clone(),
            self.control.clone(),
            self.reporter.clone(),
            partition,
            self.counters,
        );
        if let Some(seed) = self.rng_seed {
            scheduler = scheduler.with_rng(StdRng::seed_from_u64(seed));
        }

        let summary = scheduler.run().await;
        self.control.finish();

        let (partition, counters) = scheduler.into_parts();
        self.counters = counters;
        if !partition.pending().is_empty() {
            self.prepared = Some(partition);
        }
        Ok(summary)
    }

    /// A sender for this session and the receiver to hand to `run`.
    pub fn command_channel(&self) -> (CommandSender, mpsc::UnboundedReceiver<QueuedCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            CommandSender {
                control: self.control.clone(),
                reporter: self.reporter.clone(),
                tx,
            },
            rx,
        )
    }

    /// Process queued Scan and Start commands until every sender is dropped.
    pub async fn run(&mut self, rx: mpsc::UnboundedReceiver<QueuedCommand>) {
        self.run_until(rx, std::future::pending()).await;
    }

    /// Like `run`, but returns once `shutdown` resolves. A scan or follow run in
    /// progress is stopped and allowed to finish its summary; commands still
    /// queued are dropped.
    pub async fn run_until(
        &mut self,
        mut rx: mpsc::UnboundedReceiver<QueuedCommand>,
        shutdown: impl Future<Output = ()>,
    ) {
        let control = self.control.clone();
        tokio::pin!(shutdown);

        loop {
            let command = tokio::select! {
                command = rx.recv() => command,
                _ = &mut shutdown => None,
            };
            let Some(command) = command else { break };

            let execute = self.execute(command);
            tokio::pin!(execute);
            tokio::select! {
                _ = &mut execute => {}
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    control.stop();
                    execute.await;
                    break;
                }
            }
        }
    }

    async fn execute(&mut self, command: QueuedCommand) {
        match command {
            QueuedCommand::Scan(input) => {
                if let Err(e) = self.scan(&input).await {
                    warn!(error = %e, "Scan failed");
                }
            }
            QueuedCommand::Start => match self.start().await {
                Ok(summary) => info!("{summary}"),
                Err(e) => warn!(error = %e, "Start rejected"),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Scan(String),
    Start,
    PauseResume,
    Stop,
}

/// The commands that wait their turn on the session task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueuedCommand {
    Scan(String),
    Start,
}

impl Command {
    /// Parse a typed command line. `quit` is left to the caller.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        match (word.to_ascii_lowercase().as_str(), rest) {
            ("scan", target) if !target.is_empty() => Some(Command::Scan(target.to_string())),
            ("start", "") => Some(Command::Start),
            ("pause" | "resume" | "p", "") => Some(Command::PauseResume),
            ("stop", "") => Some(Command::Stop),
            _ => None,
        }
    }
}

/// Entry point for commands. Pause/Resume and Stop act on the run state
/// immediately; Scan and Start are queued for the session task.
#[derive(Clone)]
pub struct CommandSender {
    control: RunControl,
    reporter: Reporter,
    tx: mpsc::UnboundedSender<QueuedCommand>,
}

impl CommandSender {
    pub fn send(&self, command: Command) -> Result<(), FollowScoutError> {
        match command {
            Command::PauseResume => {
                let before = self.control.state();
                match (before, self.control.pause_resume()) {
                    (_, RunState::Paused) => self.reporter.info("Process paused"),
                    (_, RunState::Following) => self.reporter.info("Process resumed"),
                    (RunState::Scanning, RunState::Idle) => self.reporter.info("Process stopped"),
                    _ => {}
                }
                Ok(())
            }
            Command::Stop => {
                if self.control.stop() != RunState::Idle {
                    self.reporter.info("Process stopped");
                }
                Ok(())
            }
            Command::Scan(input) => self.enqueue(QueuedCommand::Scan(input)),
            Command::Start => self.enqueue(QueuedCommand::Start),
        }
    }

    fn enqueue(&self, command: QueuedCommand) -> Result<(), FollowScoutError> {
        self.tx
            .send(command)
            .map_err(|_| anyhow::anyhow!("session task has exited").into())
    }
}
