// Candidate partition for one run.
//
// Every candidate sits in exactly one bucket. Items only ever leave
// `pending`, and never come back.

use std::collections::HashSet;
use std::fmt;

use followscout_common::Candidate;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::display::Counts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    DailyLimit,
    HourlyLimit,
    ApiError,
    Exception,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::DailyLimit => write!(f, "daily_limit"),
            FailureReason::HourlyLimit => write!(f, "hourly_limit"),
            FailureReason::ApiError => write!(f, "api_error"),
            FailureReason::Exception => write!(f, "exception"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    AlreadyRelated,
    Completed,
    Failed(FailureReason),
    Skipped,
}

#[derive(Debug, Clone, Default)]
pub struct Partition {
    total: usize,
    pending: Vec<Candidate>,
    already_related: Vec<Candidate>,
    completed: Vec<Candidate>,
    failed: Vec<(Candidate, FailureReason)>,
    skipped: Vec<Candidate>,
}

impl Partition {
    /// Start a partition. Duplicate ids keep their first occurrence.
    pub fn new(pending: Vec<Candidate>, already_related: Vec<Candidate>) -> Self {
        let mut seen = HashSet::new();
        let pending: Vec<Candidate> = pending
            .into_iter()
            .filter(|c| seen.insert(c.id.clone()))
            .collect();
        let already_related: Vec<Candidate> = already_related
            .into_iter()
            .filter(|c| seen.insert(c.id.clone()))
            .collect();
        Self {
            total: pending.len() + already_related.len(),
            pending,
            already_related,
            ..Default::default()
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn pending(&self) -> &[Candidate] {
        &self.pending
    }

    pub fn already_related(&self) -> &[Candidate] {
        &self.already_related
    }

    pub fn completed(&self) -> &[Candidate] {
        &self.completed
    }

    pub fn failed(&self) -> &[(Candidate, FailureReason)] {
        &self.failed
    }

    pub fn skipped(&self) -> &[Candidate] {
        &self.skipped
    }

    pub fn failed_by(&self, reason: FailureReason) -> usize {
        self.failed.iter().filter(|(_, r)| *r == reason).count()
    }

    pub fn shuffle_pending<R: Rng>(&mut self, rng: &mut R) {
        self.pending.shuffle(rng);
    }

    /// Move a pending candidate to its final bucket. Returns false if `id` is not pending.
    pub fn resolve(&mut self, id: &str, outcome: Outcome) -> bool {
        let Some(pos) = self.pending.iter().position(|c| c.id == id) else {
            return false;
        };
        let candidate = self.pending.remove(pos);
        match outcome {
            Outcome::AlreadyRelated => self.already_related.push(candidate),
            Outcome::Completed => self.completed.push(candidate),
            Outcome::Failed(reason) => self.failed.push((candidate, reason)),
            Outcome::Skipped => self.skipped.push(candidate),
        }
        true
    }

    /// Move the first `percent`% of pending (rounded down) to skipped. Returns how many.
    pub fn skip_percentage(&mut self, percent: u8) -> usize {
        let n = self.pending.len() * usize::from(percent.min(100)) / 100;
        let moved: Vec<Candidate> = self.pending.drain(..n).collect();
        self.skipped.extend(moved);
        n
    }

    pub fn counts(&self) -> Counts {
        Counts {
            total: self.total,
            pending: self.pending.len(),
            completed: self.completed.len(),
            failed: self.failed.len(),
        }
    }

    /// Share of candidates no longer pending.
    pub fn percent_complete(&self) -> usize {
        if self.total == 0 {
            return 100;
        }
        (self.total - self.pending.len()) * 100 / self.total
    }

    /// Sum of all bucket sizes. Always equal to `total()`.
    pub fn bucket_sum(&self) -> usize {
        self.pending.len()
            + self.already_related.len()
            + self.completed.len()
            + self.failed.len()
            + self.skipped.len()
    }
}
