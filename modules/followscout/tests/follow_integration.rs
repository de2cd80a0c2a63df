//! End-to-end runs of the scan pipeline and the follow scheduler against MockGraph.

use std::sync::Arc;
use std::time::Duration;

use followscout::harvester::{HarvestEnd, Harvester};
use followscout::testing::{
    file_config, harvest_config, node, recording_reporter, ActionScript, ListingScript, MockGraph,
    ProbeScript, RecordingDisplay,
};
use followscout::{Command, DisplayUpdate, FollowScout, RunControl, RunEnd, RunState, ScanEnd};
use followscout_common::{
    Container, ContainerKind, DelayRange, FileConfig, FollowScoutError, ThrottleConfig,
};
use graph_client::ListingPage;

const PROFILE_URL: &str = "https://www.instagram.com/someone/";

fn profile_mock() -> Arc<MockGraph> {
    let mock = Arc::new(MockGraph::new());
    mock.set_page(PROFILE_URL, r#"<html>{"page_id":"profilePage_42"}</html>"#);
    mock
}

fn primary(ids: std::ops::Range<u32>, cursor: Option<&str>) -> ListingScript {
    ListingScript::Page(ListingPage::Primary {
        members: ids.map(|i| node(&i.to_string())).collect(),
        next_cursor: cursor.map(String::from),
    })
}

fn with_throttle(throttle: ThrottleConfig) -> FileConfig {
    FileConfig {
        throttle,
        ..file_config()
    }
}

fn scout(mock: Arc<MockGraph>, config: FileConfig) -> (FollowScout, Arc<RecordingDisplay>) {
    let display = Arc::new(RecordingDisplay::new());
    (
        FollowScout::new(mock, config, display.clone()).with_seed(7),
        display,
    )
}

// Scenario A: pages of 50, 50, 20 yield 120 candidates.
#[tokio::test(start_paused = true)]
async fn three_pages_harvest_all_members() {
    let mock = profile_mock();
    mock.push_listing(primary(0..50, Some("c1")));
    mock.push_listing(primary(50..100, Some("c2")));
    mock.push_listing(primary(100..120, None));
    let (mut scout, display) = scout(mock.clone(), file_config());

    let report = scout.scan("@someone").await.unwrap();

    assert_eq!(report.end, ScanEnd::Ready);
    assert_eq!(report.harvest_end, Some(HarvestEnd::Exhausted));
    assert_eq!(report.harvested, 120);
    assert_eq!(report.pending, 120);
    assert_eq!(mock.listing_calls(), 3);
    assert_eq!(scout.control().state(), RunState::Idle);
    assert!(display.statuses().contains(&"Ready!".to_string()));
}

// Scenario B: page 2 is rate limited twice, then served.
#[tokio::test(start_paused = true)]
async fn rate_limited_page_is_retried_after_cooldown() {
    let mock = Arc::new(MockGraph::new());
    mock.push_listing(primary(0..50, Some("c1")));
    mock.push_listing(ListingScript::Page(ListingPage::RateLimited));
    mock.push_listing(ListingScript::Page(ListingPage::RateLimited));
    mock.push_listing(primary(40..70, None));

    let control = RunControl::new();
    control.begin_scan().unwrap();
    let (reporter, _) = recording_reporter();
    let harvester = Harvester::new(mock.clone(), harvest_config(), control, reporter);

    let started = tokio::time::Instant::now();
    let harvest = harvester
        .fetch_all(&Container {
            kind: ContainerKind::Followers,
            id: "42".into(),
        })
        .await
        .unwrap();

    assert_eq!(harvest.rate_limit_retries, 2);
    assert_eq!(harvest.end, HarvestEnd::Exhausted);
    assert_eq!(harvest.candidates.len(), 70);
    assert_eq!(
        mock.listing_cursors(),
        vec![
            None,
            Some("c1".to_string()),
            Some("c1".to_string()),
            Some("c1".to_string())
        ]
    );
    assert!(started.elapsed() >= Duration::from_secs(120));
}

// Scenario C: daily cap of 5 with 8 pending.
#[tokio::test(start_paused = true)]
async fn daily_cap_halts_and_leaves_rest_pending() {
    let mock = profile_mock();
    mock.push_listing(primary(0..8, None));
    let throttle = ThrottleConfig {
        daily_cap: 5,
        ..file_config().throttle
    };
    let (mut scout, _) = scout(mock.clone(), with_throttle(throttle));

    scout.scan("@someone").await.unwrap();
    let summary = scout.start().await.unwrap();

    assert_eq!(summary.end, RunEnd::DailyLimit);
    assert_eq!(summary.completed, 5);
    assert_eq!(summary.failed_daily_limit, 1);
    assert_eq!(summary.still_pending, 2);
    assert_eq!(mock.action_calls().len(), 5);
    assert_eq!(scout.control().state(), RunState::Idle);

    // The leftovers stay queued, but the cap still holds on a second Start.
    assert_eq!(scout.prepared().map(|p| p.pending().len()), Some(2));
    let again = scout.start().await.unwrap();
    assert_eq!(again.end, RunEnd::DailyLimit);
    assert_eq!(mock.action_calls().len(), 5);
}

// Scenario D: Stop during the inter-batch countdown.
#[tokio::test(start_paused = true)]
async fn stop_during_countdown_freezes_the_run() {
    let mock = profile_mock();
    mock.push_listing(primary(0..8, None));
    let throttle = ThrottleConfig {
        inter_batch_delay: DelayRange::from_millis(300_000, 600_000),
        ..file_config().throttle
    };

    let control = RunControl::new();
    let stopper = control.clone();
    let display = Arc::new(RecordingDisplay::with_hook(move |update| {
        if matches!(update, DisplayUpdate::Countdown { .. }) {
            stopper.stop();
        }
    }));
    let mut scout = FollowScout::new(mock.clone(), with_throttle(throttle), display.clone())
        .with_control(control.clone());

    scout.scan("@someone").await.unwrap();
    let summary = scout.start().await.unwrap();

    assert_eq!(summary.end, RunEnd::Stopped);
    assert_eq!(summary.completed, 5);
    assert_eq!(summary.still_pending, 3);
    assert_eq!(mock.action_calls().len(), 5);
    assert_eq!(control.state(), RunState::Idle);

    let updates = display.updates();
    let countdown_at = updates
        .iter()
        .position(|u| matches!(u, DisplayUpdate::Countdown { .. }))
        .unwrap();
    assert!(!updates[countdown_at..]
        .iter()
        .any(|u| matches!(u, DisplayUpdate::Counts(_))));
}

// Scenario E: a probe error leaves the candidate pending.
#[tokio::test(start_paused = true)]
async fn probe_error_means_pending() {
    let mock = profile_mock();
    mock.push_listing(primary(0..3, None));
    mock.set_probe("1", ProbeScript::Error);
    mock.set_probe("2", ProbeScript::Related(true));
    let (mut scout, _) = scout(mock, file_config());

    let report = scout.scan("@someone").await.unwrap();

    assert_eq!(report.pending, 2);
    assert_eq!(report.already_related, 1);
    let pending: Vec<&str> = scout
        .prepared()
        .unwrap()
        .pending()
        .iter()
        .map(|c| c.id.as_str())
        .collect();
    assert_eq!(pending, vec!["0", "1"]);
}

#[tokio::test(start_paused = true)]
async fn partition_accounts_for_every_candidate() {
    let mock = profile_mock();
    mock.push_listing(primary(0..30, None));
    mock.set_probe("3", ProbeScript::Related(true));
    mock.set_action("10", ActionScript::Reject);
    mock.set_action("11", ActionScript::Fault);
    let throttle = ThrottleConfig {
        daily_cap: 20,
        hourly_cap: 8,
        randomize_order: true,
        shuffle_every_batch: true,
        skip_percentage: 10,
        ..file_config().throttle
    };
    let (mut scout, _) = scout(mock.clone(), with_throttle(throttle));

    let report = scout.scan("@someone").await.unwrap();
    assert_eq!(report.skipped, 2);

    let summary = scout.start().await.unwrap();
    let total = summary.completed
        + summary.failed()
        + summary.already_related
        + summary.skipped
        + summary.still_pending;
    assert_eq!(total, 30);
    assert!(summary.daily_count <= 20);

    let mut acted = mock.action_calls();
    acted.sort();
    acted.dedup();
    assert_eq!(acted.len(), mock.action_calls().len(), "no candidate acted on twice");
}

#[tokio::test(start_paused = true)]
async fn likers_fall_back_to_page_markup() {
    let mock = Arc::new(MockGraph::new());
    mock.set_page(
        "https://www.instagram.com/p/ABC123/",
        r#"<link rel="canonical" href="https://www.instagram.com/p/ABC123/"><script>window._sharedData = {"entry_data":{"PostPage":[{"graphql":{"shortcode_media":{"shortcode":"ABC123","edge_liked_by":{"edges":[{"node":{"id":"5","username":"five"}},{"node":{"id":"6","username":"six"}}]}}}}]}};</script>"#,
    );
    let (mut scout, _) = scout(mock.clone(), file_config());

    let report = scout
        .scan("https://www.instagram.com/p/ABC123/")
        .await
        .unwrap();

    assert_eq!(report.harvested, 2);
    assert_eq!(report.pending, 2);
    assert_eq!(mock.page_fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn empty_listing_is_no_candidates() {
    let mock = profile_mock();
    let (mut scout, display) = scout(mock, file_config());

    let err = scout.scan("@someone").await.unwrap_err();

    assert!(matches!(err, FollowScoutError::NoCandidates));
    assert_eq!(scout.control().state(), RunState::Idle);
    assert!(display.statuses().contains(&"Idle".to_string()));
}

#[tokio::test(start_paused = true)]
async fn unresolvable_target_reports_not_found() {
    let mock = Arc::new(MockGraph::new());
    let (mut scout, display) = scout(mock, file_config());

    let err = scout.scan("@nobody").await.unwrap_err();

    assert!(matches!(err, FollowScoutError::NotFound(_)));
    assert_eq!(
        display.statuses().last().map(String::as_str),
        Some("Identifier not found")
    );
}

#[tokio::test(start_paused = true)]
async fn start_without_scan_is_rejected() {
    let (mut scout, _) = scout(Arc::new(MockGraph::new()), file_config());
    assert!(matches!(
        scout.start().await,
        Err(FollowScoutError::NothingPending)
    ));
}

#[tokio::test(start_paused = true)]
async fn queued_commands_drive_a_full_session() {
    let mock = profile_mock();
    mock.push_listing(primary(0..3, None));
    let (mut scout, display) = scout(mock.clone(), file_config());

    let (commands, rx) = scout.command_channel();
    commands.send(Command::Scan("@someone".into())).unwrap();
    commands.send(Command::Start).unwrap();
    drop(commands);
    scout.run(rx).await;

    assert_eq!(mock.action_calls().len(), 3);
    assert!(display.messages().iter().any(|m| m == "All done!"));
}

#[tokio::test(start_paused = true)]
async fn pause_then_stop_through_commands() {
    let mock = profile_mock();
    mock.push_listing(primary(0..4, None));
    let throttle = ThrottleConfig {
        per_action_delay: DelayRange::from_millis(10_000, 10_000),
        ..file_config().throttle
    };
    let (mut scout, display) = scout(mock.clone(), with_throttle(throttle));
    scout.scan("@someone").await.unwrap();

    let (commands, _rx) = scout.command_channel();
    let remote = commands.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(15_500)).await;
        remote.send(Command::PauseResume).unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        remote.send(Command::Stop).unwrap();
    });

    let summary = scout.start().await.unwrap();

    assert_eq!(summary.end, RunEnd::Stopped);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.still_pending, 3);
    let messages = display.messages();
    assert!(messages.iter().any(|m| m == "Process paused"));
    assert!(messages.iter().any(|m| m == "Process stopped"));
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_run_and_drops_queued_commands() {
    let mock = profile_mock();
    mock.push_listing(primary(0..4, None));
    let throttle = ThrottleConfig {
        per_action_delay: DelayRange::from_millis(10_000, 10_000),
        ..file_config().throttle
    };
    let (mut scout, display) = scout(mock.clone(), with_throttle(throttle));

    let (commands, rx) = scout.command_channel();
    commands.send(Command::Scan("@someone".into())).unwrap();
    commands.send(Command::Start).unwrap();
    commands.send(Command::Start).unwrap();

    scout
        .run_until(rx, tokio::time::sleep(Duration::from_millis(15_500)))
        .await;

    assert_eq!(scout.control().state(), RunState::Idle);
    assert!(mock.action_calls().len() < 4);
    assert_eq!(scout.prepared().map(|p| p.pending().len()), Some(4 - mock.action_calls().len()));

    // The interrupted run still reports its final stats, and the second Start never runs.
    let messages = display.messages();
    assert!(messages.iter().any(|m| m == "Process stopped"));
    assert_eq!(
        messages.iter().filter(|m| m.starts_with("Final stats")).count(),
        1
    );
    drop(commands);
}
