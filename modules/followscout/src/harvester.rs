// Cursor-paginated harvesting of a container's member listing.
//
// Pages are fetched one at a time with a jittered pause between them.
// A 429 gets a fixed cooldown and a bounded number of retries of the same
// page. Any other trouble ends the harvest with what was gathered so far;
// only a rejected session is an error.

use std::collections::HashSet;
use std::sync::Arc;

use followscout_common::{Candidate, Container, ContainerRef, FollowScoutError, HarvestConfig};
use graph_client::{GraphClientError, ListingPage, UserNode};
use tracing::{debug, info, warn};

use crate::control::{RunControl, RunState, WaitOutcome};
use crate::display::Reporter;
use crate::embedded::embedded_likers;
use crate::traits::SocialGraphService;

/// Why a harvest stopped fetching pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestEnd {
    /// The listing reported no further page, or returned an empty one.
    Exhausted,
    /// `max_pages` pages were fetched and a cursor was still outstanding.
    PageLimit,
    /// The unpaginated secondary schema came back.
    AlternateSchema,
    Malformed(String),
    RateLimitExhausted,
    Stopped,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct Harvest {
    pub candidates: Vec<Candidate>,
    pub pages: u32,
    pub rate_limit_retries: u32,
    pub end: HarvestEnd,
}

pub fn candidate_from_node(node: UserNode) -> Candidate {
    Candidate {
        id: node.id,
        handle: node.username,
        display_name: node.full_name.unwrap_or_default(),
        avatar_ref: node.profile_pic_url,
        is_private: node.is_private,
        is_verified: node.is_verified,
    }
}

/// Append nodes whose id has not been seen yet. Returns how many were new.
fn absorb(
    nodes: Vec<UserNode>,
    seen: &mut HashSet<String>,
    candidates: &mut Vec<Candidate>,
) -> usize {
    let before = candidates.len();
    for node in nodes {
        if seen.insert(node.id.clone()) {
            candidates.push(candidate_from_node(node));
        }
    }
    candidates.len() - before
}

pub struct Harvester {
    service: Arc<dyn SocialGraphService>,
    config: HarvestConfig,
    control: RunControl,
    reporter: Reporter,
}

impl Harvester {
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

    /// Walk the listing until it ends, `max_pages` is reached, or something goes wrong.
    pub async fn fetch_all(&self, container: &Container) -> Result<Harvest, FollowScoutError> {
        let max_pages = self.config.max_pages;
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0u32;
        let mut retries = 0u32;

        info!(container = %container, page_size = self.config.page_size, max_pages, "Starting harvest");
        self.reporter.info(format!("Fetching {container}..."));

        let end = loop {
            let response = self
                .fetch_with_cooldown(container, cursor.as_deref(), &mut retries)
                .await;

            // A page that arrives after a Stop is dropped.
            if self.control.state() != RunState::Scanning {
                break HarvestEnd::Stopped;
            }

            match response {
                Ok(ListingPage::Primary {
                    members,
                    next_cursor,
                }) => {
                    pages += 1;
                    let empty = members.is_empty();
                    let new = absorb(members, &mut seen, &mut candidates);
                    info!(page = pages, new, found = candidates.len(), "Fetched page");
                    self.reporter
                        .info(format!("Page {pages}: {} found so far", candidates.len()));
                    self.reporter
                        .progress((pages as usize * 100 / max_pages as usize).min(95));

                    cursor = match next_cursor {
                        Some(next) if !empty => Some(next),
                        _ => break HarvestEnd::Exhausted,
                    };
                    if pages >= max_pages {
                        break HarvestEnd::PageLimit;
                    }

                    let delay = self.config.page_delay.sample(&mut rand::rng());
                    debug!(delay_ms = delay.as_millis() as u64, "Waiting before next page");
                    if let WaitOutcome::Interrupted { .. } =
                        self.control.wait(delay, RunState::Scanning, |_| {}).await
                    {
                        break HarvestEnd::Stopped;
                    }
                }
                Ok(ListingPage::Alternate { members }) => {
                    pages += 1;
                    let new = absorb(members, &mut seen, &mut candidates);
                    info!(page = pages, new, "Alternate listing schema, no further pages");
                    break HarvestEnd::AlternateSchema;
                }
                Ok(ListingPage::RateLimited) => {
                    warn!(page = pages + 1, retries, "Rate limit retries exhausted");
                    self.reporter
                        .warning("Still rate limited, keeping what was fetched so far");
                    break HarvestEnd::RateLimitExhausted;
                }
                Ok(ListingPage::Malformed { reason }) => {
                    warn!(page = pages + 1, reason = reason.as_str(), "Unrecognized listing response");
                    self.reporter
                        .warning(format!("Unexpected response on page {}", pages + 1));
                    break HarvestEnd::Malformed(reason);
                }
                Err(e) if e.is_terminal() => {
                    self.reporter.error(format!("Session rejected: {e}"));
                    return Err(FollowScoutError::SessionRejected(e.to_string()));
                }
                Err(e) => {
                    warn!(page = pages + 1, error = %e, "Listing request failed");
                    self.reporter.warning(format!("Error fetching page {}: {e}", pages + 1));
                    break HarvestEnd::Failed(e.to_string());
                }
            }
        };

        info!(
            pages,
            found = candidates.len(),
            rate_limit_retries = retries,
            end = ?end,
            "Harvest finished"
        );

        Ok(Harvest {
            candidates,
            pages,
            rate_limit_retries: retries,
            end,
        })
    }

    /// One listing request, retried after a cooldown while rate limited.
    /// Returns `Ok(RateLimited)` once the retry budget for this page is spent.
    async fn fetch_with_cooldown(
        &self,
        container: &Container,
        cursor: Option<&str>,
        retries: &mut u32,
    ) -> graph_client::Result<ListingPage> {
        let mut attempt = 0u32;
        loop {
            let response = self
                .service
                .list_members(container, cursor, self.config.page_size)
                .await;

            let limited = matches!(
                response,
                Ok(ListingPage::RateLimited) | Err(GraphClientError::RateLimited)
            );
            if !limited {
                return response;
            }
            if attempt >= self.config.max_rate_limit_retries {
                return Ok(ListingPage::RateLimited);
            }

            attempt += 1;
            *retries += 1;
            let cooldown = self.config.rate_limit_cooldown;
            warn!(
                attempt,
                cooldown_secs = cooldown.as_secs(),
                "Rate limited, cooling down"
            );
            self.reporter.warning(format!(
                "Rate limited. Waiting {} seconds...",
                cooldown.as_secs()
            ));
            tokio::time::sleep(cooldown).await;
        }
    }

    /// Read likers from the markup of the content page itself. Used when the
    /// listing query gave nothing.
    pub async fn embedded_fallback(&self, reference: &ContainerRef) -> Vec<Candidate> {
        let url = reference.page_url(self.service.base_url());
        let html = match self.service.fetch_page(&url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(url = url.as_str(), error = %e, "Content page fetch failed");
                return Vec::new();
            }
        };

        let Some(nodes) = embedded_likers(&html) else {
            debug!(url = url.as_str(), "No embedded likers in page");
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        absorb(nodes, &mut seen, &mut candidates);
        info!(found = candidates.len(), "Read likers from page markup");
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harvest_config, node, recording_reporter, ListingScript, MockGraph};
    use followscout_common::ContainerKind;
    use std::time::Duration;

    fn followers() -> Container {
        Container {
            kind: ContainerKind::Followers,
            id: "42".into(),
        }
    }

    fn page(ids: std::ops::Range<u32>, cursor: Option<&str>) -> ListingScript {
        ListingScript::Page(ListingPage::Primary {
            members: ids.map(|i| node(&i.to_string())).collect(),
            next_cursor: cursor.map(String::from),
        })
    }

    fn harvester(mock: Arc<MockGraph>, config: HarvestConfig) -> (Harvester, RunControl) {
        let control = RunControl::new();
        control.begin_scan().unwrap();
        let (reporter, _) = recording_reporter();
        (Harvester::new(mock, config, control.clone(), reporter), control)
    }

    #[tokio::test(start_paused = true)]
    async fn dedupes_across_pages() {
        let mock = Arc::new(MockGraph::new());
        mock.push_listing(page(0..3, Some("c1")));
        mock.push_listing(page(2..5, None));
        let (h, _) = harvester(mock.clone(), harvest_config());

        let harvest = h.fetch_all(&followers()).await.unwrap();

        let ids: Vec<&str> = harvest.candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1", "2", "3", "4"]);
        assert_eq!(harvest.end, HarvestEnd::Exhausted);
        assert_eq!(mock.listing_cursors(), vec![None, Some("c1".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_retries_are_capped() {
        let mock = Arc::new(MockGraph::new());
        mock.push_listing(page(0..2, Some("c1")));
        for _ in 0..5 {
            mock.push_listing(ListingScript::Page(ListingPage::RateLimited));
        }
        let config = harvest_config();
        let (h, _) = harvester(mock.clone(), config.clone());

        let started = tokio::time::Instant::now();
        let harvest = h.fetch_all(&followers()).await.unwrap();

        assert_eq!(harvest.end, HarvestEnd::RateLimitExhausted);
        assert_eq!(harvest.rate_limit_retries, config.max_rate_limit_retries);
        assert_eq!(harvest.candidates.len(), 2);
        assert_eq!(mock.listing_calls(), 1 + 1 + config.max_rate_limit_retries as usize);
        assert!(started.elapsed() >= config.rate_limit_cooldown * config.max_rate_limit_retries);
    }

    #[tokio::test(start_paused = true)]
    async fn alternate_schema_stops_after_one_page() {
        let mock = Arc::new(MockGraph::new());
        mock.push_listing(ListingScript::Page(ListingPage::Alternate {
            members: vec![node("7"), node("8"), node("7")],
        }));
        mock.push_listing(page(100..110, None));
        let (h, _) = harvester(mock.clone(), harvest_config());

        let harvest = h
            .fetch_all(&Container {
                kind: ContainerKind::Likers,
                id: "ABC".into(),
            })
            .await
            .unwrap();

        assert_eq!(harvest.end, HarvestEnd::AlternateSchema);
        assert_eq!(harvest.candidates.len(), 2);
        assert_eq!(mock.listing_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_keeps_partial_result() {
        let mock = Arc::new(MockGraph::new());
        mock.push_listing(page(0..4, Some("c1")));
        mock.push_listing(ListingScript::Page(ListingPage::Malformed {
            reason: "unexpected keys: [message]".into(),
        }));
        let (h, _) = harvester(mock, harvest_config());

        let harvest = h.fetch_all(&followers()).await.unwrap();
        assert!(matches!(harvest.end, HarvestEnd::Malformed(_)));
        assert_eq!(harvest.candidates.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_page_with_cursor_is_terminal() {
        let mock = Arc::new(MockGraph::new());
        mock.push_listing(page(0..0, Some("c1")));
        let (h, _) = harvester(mock.clone(), harvest_config());

        let harvest = h.fetch_all(&followers()).await.unwrap();
        assert_eq!(harvest.end, HarvestEnd::Exhausted);
        assert_eq!(mock.listing_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn endless_cursor_stops_at_max_pages() {
        let mock = Arc::new(MockGraph::new());
        mock.endless_listing(3);
        let config = HarvestConfig {
            max_pages: 4,
            ..harvest_config()
        };
        let (h, _) = harvester(mock.clone(), config);

        let harvest = h.fetch_all(&followers()).await.unwrap();
        assert_eq!(harvest.end, HarvestEnd::PageLimit);
        assert_eq!(harvest.pages, 4);
        assert_eq!(mock.listing_calls(), 4);
        assert_eq!(harvest.candidates.len(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_is_session_rejected() {
        let mock = Arc::new(MockGraph::new());
        mock.push_listing(page(0..2, Some("c1")));
        mock.push_listing(ListingScript::Error(GraphClientError::Unauthorized { status: 401 }));
        let (h, _) = harvester(mock, harvest_config());

        let err = h.fetch_all(&followers()).await.unwrap_err();
        assert!(matches!(err, FollowScoutError::SessionRejected(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn network_error_keeps_partial_result() {
        let mock = Arc::new(MockGraph::new());
        mock.push_listing(page(0..2, Some("c1")));
        mock.push_listing(ListingScript::Error(GraphClientError::Network("reset".into())));
        let (h, _) = harvester(mock, harvest_config());

        let harvest = h.fetch_all(&followers()).await.unwrap();
        assert!(matches!(harvest.end, HarvestEnd::Failed(_)));
        assert_eq!(harvest.candidates.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_between_pages() {
        let mock = Arc::new(MockGraph::new());
        mock.endless_listing(2);
        let config = HarvestConfig {
            page_delay: followscout_common::DelayRange::from_millis(5_000, 5_000),
            ..harvest_config()
        };
        let (h, control) = harvester(mock.clone(), config);

        let stopper = control.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(7_500)).await;
            stopper.stop();
        });

        let harvest = h.fetch_all(&followers()).await.unwrap();
        assert_eq!(harvest.end, HarvestEnd::Stopped);
        assert_eq!(harvest.pages, 2);
        assert_eq!(mock.listing_calls(), 2);
    }

    #[tokio::test]
    async fn embedded_fallback_reads_page_markup() {
        let mock = Arc::new(MockGraph::new());
        mock.set_page(
            "https://www.instagram.com/p/ABC/",
            r#"<script>window._sharedData = {"entry_data":{"PostPage":[{"graphql":{"shortcode_media":{"edge_liked_by":{"edges":[{"node":{"id":"1","username":"a"}},{"node":{"id":"1","username":"a"}}]}}}}]}};</script>"#,
        );
        let (h, _) = harvester(mock, harvest_config());

        let reference = ContainerRef::parse("https://www.instagram.com/p/ABC/").unwrap();
        let found = h.embedded_fallback(&reference).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].handle, "a");
    }
}
