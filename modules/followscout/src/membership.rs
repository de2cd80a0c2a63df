// Splits harvested candidates into already-followed and pending by probing
// relationship status in small concurrent groups.

use std::sync::Arc;

use followscout_common::{Candidate, HarvestConfig};
use futures::future::join_all;
use tracing::{debug, info};

use crate::control::{RunControl, RunState, WaitOutcome};
use crate::display::Reporter;
use crate::traits::SocialGraphService;

#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub already_related: Vec<Candidate>,
    /// In harvest order.
    pub pending: Vec<Candidate>,
}

pub struct MembershipFilter {
    service: Arc<dyn SocialGraphService>,
    config: HarvestConfig,
    control: RunControl,
    reporter: Reporter,
}

impl MembershipFilter {
    pub fn new(
        service: Arc<dyn SocialGraphService>,
        config: HarvestConfig,
        control: RunControl,
        reporter: Reporter,
    ) -> Self {
        Self {
            service,
            config,
            control,
            reporter,
        }
    }

    /// Returns `None` if the scan was stopped part way.
    pub async fn classify(&self, candidates: Vec<Candidate>) -> Option<Classification> {
        let total = candidates.len();
        let group_size = self.config.probe_concurrency.max(1);
        let groups: Vec<Vec<Candidate>> = candidates
            .chunks(group_size)
            .map(<[Candidate]>::to_vec)
            .collect();
        let group_count = groups.len();

        self.reporter.info("Checking which accounts you already follow...");
        let mut result = Classification::default();
        let mut processed = 0usize;

        for (index, group) in groups.into_iter().enumerate() {
            if self.control.state() != RunState::Scanning {
                return None;
            }

            let statuses = join_all(group.iter().map(|c| self.probe(c))).await;
            processed += group.len();
            for (candidate, related) in group.into_iter().zip(statuses) {
                if related {
                    result.already_related.push(candidate);
                } else {
                    result.pending.push(candidate);
                }
            }
            self.reporter.progress(50 + processed * 50 / total);

            if index + 1 < group_count {
                let delay = self.config.probe_group_delay.sample(&mut rand::rng());
                if let WaitOutcome::Interrupted { .. } =
                    self.control.wait(delay, RunState::Scanning, |_| {}).await
                {
                    return None;
                }
            }
        }

        info!(
            total,
            already_related = result.already_related.len(),
            pending = result.pending.len(),
            "Classification complete"
        );
        Some(result)
    }

    /// Errors count as not related.
    async fn probe(&self, candidate: &Candidate) -> bool {
        match self.service.relationship_status(&candidate.id).await {
            Ok(related) => related,
            Err(e) => {
                debug!(candidate = %candidate, error = %e, "Relationship probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{candidate, harvest_config, recording_reporter, MockGraph, ProbeScript};

    fn filter(mock: Arc<MockGraph>, config: HarvestConfig) -> (MembershipFilter, RunControl) {
        let control = RunControl::new();
        control.begin_scan().unwrap();
        let (reporter, _) = recording_reporter();
        (
            MembershipFilter::new(mock, config, control.clone(), reporter),
            control,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn splits_and_keeps_order() {
        let mock = Arc::new(MockGraph::new());
        mock.set_probe("2", ProbeScript::Related(true));
        mock.set_probe("5", ProbeScript::Related(true));
        let (f, _) = filter(mock, harvest_config());

        let result = f
            .classify((1..=7).map(|i| candidate(&i.to_string())).collect())
            .await
            .unwrap();

        let pending: Vec<&str> = result.pending.iter().map(|c| c.id.as_str()).collect();
        let related: Vec<&str> = result.already_related.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(pending, vec!["1", "3", "4", "6", "7"]);
        assert_eq!(related, vec!["2", "5"]);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_error_means_pending() {
        let mock = Arc::new(MockGraph::new());
        mock.set_probe("1", ProbeScript::Error);
        let (f, _) = filter(mock, harvest_config());

        let result = f.classify(vec![candidate("1")]).await.unwrap();
        assert_eq!(result.pending.len(), 1);
        assert!(result.already_related.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_probes_never_exceed_group_size() {
        let mock = Arc::new(MockGraph::new());
        let config = HarvestConfig {
            probe_concurrency: 3,
            ..harvest_config()
        };
        let (f, _) = filter(mock.clone(), config);

        f.classify((0..10).map(|i| candidate(&i.to_string())).collect())
            .await
            .unwrap();

        assert_eq!(mock.probe_calls(), 10);
        assert_eq!(mock.max_in_flight_probes(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_scan_returns_none() {
        let mock = Arc::new(MockGraph::new());
        let (f, control) = filter(mock.clone(), harvest_config());
        control.stop();

        assert!(f.classify(vec![candidate("1")]).await.is_none());
        assert_eq!(mock.probe_calls(), 0);
    }
}
