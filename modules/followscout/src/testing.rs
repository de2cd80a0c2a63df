// Test mocks for the follow pipeline.
//
// - MockGraph (SocialGraphService): scripted listing pages, page markup by
//   URL, per-id probe and action results, call logs
// - RecordingDisplay (DisplayPort): keeps every update, optional hook
//
// Plus helpers for candidates, nodes, and zero-delay configs.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use followscout_common::{
    Candidate, Container, DelayRange, FileConfig, HarvestConfig, HourlyLimitPolicy, ThrottleConfig,
};
use graph_client::{FollowOutcome, GraphClientError, ListingPage, UserNode};

use crate::display::{DisplayPort, DisplayUpdate, Reporter};
use crate::traits::SocialGraphService;

pub const MOCK_BASE_URL: &str = "https://www.instagram.com";

// ---------------------------------------------------------------------------
// MockGraph
// ---------------------------------------------------------------------------

/// One scripted response from the listing endpoint.
pub enum ListingScript {
    Page(ListingPage),
    Error(GraphClientError),
}

#[derive(Debug, Clone, Copy)]
pub enum ProbeScript {
    Related(bool),
    Error,
}

#[derive(Debug, Clone, Copy)]
pub enum ActionScript {
    Ok,
    /// The service answered but did not confirm.
    Reject,
    /// Transport failure.
    Fault,
    Unauthorized,
}

#[derive(Default)]
struct MockState {
    listings: VecDeque<ListingScript>,
    /// Page size of the endless listing, if enabled. Used once `listings` runs dry.
    endless: Option<usize>,
    endless_next_id: usize,
    listing_cursors: Vec<Option<String>>,
    pages: HashMap<String, String>,
    page_fetches: usize,
    probes: HashMap<String, ProbeScript>,
    probe_calls: usize,
    actions: HashMap<String, ActionScript>,
    action_calls: Vec<String>,
}

/// Scripted social graph. Unscripted probes say "not related", unscripted
/// actions succeed, and an exhausted listing script returns an empty last page.
pub struct MockGraph {
    state: Mutex<MockState>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MockGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGraph {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn push_listing(&self, script: ListingScript) {
        self.state.lock().unwrap().listings.push_back(script);
    }

    /// After the scripted pages, serve pages of `per_page` fresh members forever.
    pub fn endless_listing(&self, per_page: usize) {
        self.state.lock().unwrap().endless = Some(per_page);
    }

    pub fn set_page(&self, url: &str, html: &str) {
        self.state
            .lock()
            .unwrap()
            .pages
            .insert(url.to_string(), html.to_string());
    }

    pub fn set_probe(&self, id: &str, script: ProbeScript) {
        self.state.lock().unwrap().probes.insert(id.to_string(), script);
    }

    pub fn set_action(&self, id: &str, script: ActionScript) {
        self.state.lock().unwrap().actions.insert(id.to_string(), script);
    }

    pub fn listing_calls(&self) -> usize {
        self.state.lock().unwrap().listing_cursors.len()
    }

    pub fn listing_cursors(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().listing_cursors.clone()
    }

    pub fn page_fetches(&self) -> usize {
        self.state.lock().unwrap().page_fetches
    }

    pub fn probe_calls(&self) -> usize {
        self.state.lock().unwrap().probe_calls
    }

    pub fn max_in_flight_probes(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn action_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().action_calls.clone()
    }
}

#[async_trait]
impl SocialGraphService for MockGraph {
    fn base_url(&self) -> &str {
        MOCK_BASE_URL
    }

    async fn fetch_page(&self, url: &str) -> graph_client::Result<String> {
        let mut state = self.state.lock().unwrap();
        state.page_fetches += 1;
        state.pages.get(url).cloned().ok_or(GraphClientError::Api {
            status: 404,
            message: format!("no page scripted for {url}"),
        })
    }

    async fn list_members(
        &self,
        _container: &Container,
        cursor: Option<&str>,
        _page_size: u32,
    ) -> graph_client::Result<ListingPage> {
        let mut state = self.state.lock().unwrap();
        state.listing_cursors.push(cursor.map(String::from));

        if let Some(script) = state.listings.pop_front() {
            return match script {
                ListingScript::Page(page) => Ok(page),
                ListingScript::Error(e) => Err(e),
            };
        }

        match state.endless {
            Some(per_page) => {
                let start = state.endless_next_id;
                state.endless_next_id += per_page;
                Ok(ListingPage::Primary {
                    members: (start..start + per_page)
                        .map(|i| node(&format!("e{i}")))
                        .collect(),
                    next_cursor: Some(format!("cursor-{}", start + per_page)),
                })
            }
            None => Ok(ListingPage::Primary {
                members: Vec::new(),
                next_cursor: None,
            }),
        }
    }

    async fn relationship_status(&self, id: &str) -> graph_client::Result<bool> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        // Hold the slot long enough for concurrent probes to overlap.
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let script = {
            let mut state = self.state.lock().unwrap();
            state.probe_calls += 1;
            state.probes.get(id).copied()
        };
        match script.unwrap_or(ProbeScript::Related(false)) {
            ProbeScript::Related(related) => Ok(related),
            ProbeScript::Error => Err(GraphClientError::Api {
                status: 500,
                message: "probe failed".into(),
            }),
        }
    }

    async fn perform_action(&self, id: &str) -> graph_client::Result<FollowOutcome> {
        let mut state = self.state.lock().unwrap();
        state.action_calls.push(id.to_string());
        match state.actions.get(id).copied().unwrap_or(ActionScript::Ok) {
            ActionScript::Ok => Ok(FollowOutcome { ok: true, status: 200 }),
            ActionScript::Reject => Ok(FollowOutcome {
                ok: false,
                status: 400,
            }),
            ActionScript::Fault => Err(GraphClientError::Network("connection reset".into())),
            ActionScript::Unauthorized => Err(GraphClientError::Unauthorized { status: 403 }),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingDisplay
// ---------------------------------------------------------------------------

type Hook = Box<dyn Fn(&DisplayUpdate) + Send + Sync>;

/// Records every update. The optional hook runs synchronously on each one,
/// which lets a test react at an exact point (e.g. stop on the first countdown).
#[derive(Default)]
pub struct RecordingDisplay {
    updates: Mutex<Vec<DisplayUpdate>>,
    hook: Option<Hook>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook(hook: impl Fn(&DisplayUpdate) + Send + Sync + 'static) -> Self {
        Self {
            updates: Mutex::new(Vec::new()),
            hook: Some(Box::new(hook)),
        }
    }

    pub fn updates(&self) -> Vec<DisplayUpdate> {
        self.updates.lock().unwrap().clone()
    }

    /// Log messages, in order.
    pub fn messages(&self) -> Vec<String> {
        self.updates()
            .into_iter()
            .filter_map(|u| match u {
                DisplayUpdate::Log(line) => Some(line.message),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.updates()
            .into_iter()
            .filter_map(|u| match u {
                DisplayUpdate::Status(s) => Some(s),
                _ => None,
            })
            .collect()
    }
}

impl DisplayPort for RecordingDisplay {
    fn update(&self, update: DisplayUpdate) {
        if let Some(hook) = &self.hook {
            hook(&update);
        }
        self.updates.lock().unwrap().push(update);
    }
}

pub fn recording_reporter() -> (Reporter, Arc<RecordingDisplay>) {
    let display = Arc::new(RecordingDisplay::new());
    (Reporter::new(display.clone()), display)
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn node(id: &str) -> UserNode {
    UserNode {
        id: id.to_string(),
        username: format!("user_{id}"),
        full_name: Some(format!("User {id}")),
        profile_pic_url: None,
        is_private: false,
        is_verified: false,
    }
}

pub fn candidate(id: &str) -> Candidate {
    Candidate {
        id: id.to_string(),
        handle: format!("user_{id}"),
        display_name: format!("User {id}"),
        avatar_ref: None,
        is_private: false,
        is_verified: false,
    }
}

/// No waits anywhere, fixed batches of 5, generous caps, no reordering or skipping.
pub fn throttle() -> ThrottleConfig {
    ThrottleConfig {
        batch_size_base: 5,
        batch_size_variation: 0,
        batch_size_hard_cap: 5,
        per_action_delay: DelayRange::ZERO,
        inter_batch_delay: DelayRange::ZERO,
        daily_cap: 100,
        hourly_cap: 50,
        randomize_order: false,
        shuffle_every_batch: false,
        skip_percentage: 0,
        hourly_limit_policy: HourlyLimitPolicy::FailItem,
    }
}

/// No page or group delays; the rate-limit cooldown keeps its real length
/// so paused-clock tests can observe it.
pub fn harvest_config() -> HarvestConfig {
    HarvestConfig {
        page_size: 50,
        max_pages: 20,
        rate_limit_cooldown: Duration::from_secs(60),
        max_rate_limit_retries: 3,
        page_delay: DelayRange::ZERO,
        probe_concurrency: 5,
        probe_group_delay: DelayRange::ZERO,
    }
}

pub fn file_config() -> FileConfig {
    FileConfig {
        throttle: throttle(),
        harvest: harvest_config(),
    }
}
