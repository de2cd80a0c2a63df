// Identifier resolution: one page fetch, then an ordered chain of
// extraction heuristics over the markup. First plausible match wins.

use std::sync::{Arc, LazyLock};

use followscout_common::{is_valid_shortcode, Container, ContainerKind, ContainerRef, FollowScoutError};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::embedded::shared_data;
use crate::traits::SocialGraphService;

enum Extract {
    /// First capture group of the pattern.
    Capture(Regex),
    /// A string or number at this JSON pointer inside `_sharedData`.
    SharedData(&'static str),
}

struct Heuristic {
    name: &'static str,
    extract: Extract,
}

fn capture(name: &'static str, pattern: &str) -> Heuristic {
    Heuristic {
        name,
        extract: Extract::Capture(Regex::new(pattern).expect("valid regex")),
    }
}

fn shared(name: &'static str, pointer: &'static str) -> Heuristic {
    Heuristic {
        name,
        extract: Extract::SharedData(pointer),
    }
}

static PROFILE_HEURISTICS: LazyLock<Vec<Heuristic>> = LazyLock::new(|| {
    vec![
        capture("profile_page", r#""profilePage_(\d+)""#),
        shared("shared_data", "/entry_data/ProfilePage/0/graphql/user/id"),
        capture("id_username", r#""id":"(\d+)","username":""#),
        capture("user_id", r#""user_id"\s*:\s*"(\d+)""#),
        capture("profile_id", r#""profile_id"\s*:\s*"(\d+)""#),
        capture("instagram_id", r#""instagram_id"\s*:\s*"(\d+)""#),
        capture(
            "app_link_meta",
            r#"<meta\s[^>]*content="[^"]*://user\?username=[^"&]+&(?:amp;)?id=(\d+)""#,
        ),
        capture(
            "json_ld_person",
            r#""@type"\s*:\s*"Person"[^{}]*?"identifier"\s*:\s*"(\d+)""#,
        ),
        capture(
            "id_username_loose",
            r#""id"\s*:\s*"(\d+)"[^{}]*?"username"\s*:\s*""#,
        ),
    ]
});

static CONTENT_HEURISTICS: LazyLock<Vec<Heuristic>> = LazyLock::new(|| {
    vec![
        capture(
            "canonical_link",
            r#"<link\s[^>]*rel="canonical"[^>]*href="[^"]*/(?:p|reel|tv)/([A-Za-z0-9_-]+)"#,
        ),
        capture(
            "og_url",
            r#"<meta\s[^>]*property="og:url"[^>]*content="[^"]*/(?:p|reel|tv)/([A-Za-z0-9_-]+)"#,
        ),
        shared(
            "shared_data",
            "/entry_data/PostPage/0/graphql/shortcode_media/shortcode",
        ),
        capture("shortcode_literal", r#""shortcode"\s*:\s*"([A-Za-z0-9_-]+)""#),
    ]
});

fn plausible(kind: ContainerKind, candidate: &str) -> bool {
    match kind {
        ContainerKind::Followers => {
            !candidate.is_empty() && candidate.chars().all(|c| c.is_ascii_digit())
        }
        ContainerKind::Likers => is_valid_shortcode(candidate),
    }
}

/// Run the heuristic chain for `kind` over `html`. Returns the heuristic name and the identifier.
pub fn extract_identifier(kind: ContainerKind, html: &str) -> Option<(&'static str, String)> {
    let heuristics = match kind {
        ContainerKind::Followers => &*PROFILE_HEURISTICS,
        ContainerKind::Likers => &*CONTENT_HEURISTICS,
    };

    // Parsed at most once, and only if a shared-data heuristic is reached.
    let mut embedded: Option<Option<serde_json::Value>> = None;

    for heuristic in heuristics {
        let found = match &heuristic.extract {
            Extract::Capture(re) => re
                .captures(html)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string()),
            Extract::SharedData(pointer) => embedded
                .get_or_insert_with(|| shared_data(html))
                .as_ref()
                .and_then(|data| data.pointer(pointer))
                .and_then(|v| match v {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                }),
        };

        match found {
            Some(id) if plausible(kind, &id) => {
                debug!(heuristic = heuristic.name, id = id.as_str(), "Identifier matched");
                return Some((heuristic.name, id));
            }
            Some(id) => {
                debug!(heuristic = heuristic.name, id = id.as_str(), "Implausible identifier skipped");
            }
            None => {}
        }
    }
    None
}

pub struct IdentityResolver {
    service: Arc<dyn SocialGraphService>,
}

impl IdentityResolver {
    pub fn new(service: Arc<dyn SocialGraphService>) -> Self {
        Self { service }
    }

    /// Resolve a reference to the container its listing is keyed by.
    pub async fn resolve(&self, reference: &ContainerRef) -> Result<Container, FollowScoutError> {
        let kind = reference.kind();
        let url = reference.page_url(self.service.base_url());

        let html = match self.service.fetch_page(&url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(reference = %reference, url = url.as_str(), error = %e, "Page fetch failed");
                return Err(FollowScoutError::NotFound(reference.to_string()));
            }
        };

        let Some((_, id)) = extract_identifier(kind, &html) else {
            warn!(reference = %reference, "No identifier found in page");
            return Err(FollowScoutError::NotFound(reference.to_string()));
        };

        info!(reference = %reference, kind = %kind, id = id.as_str(), "Resolved identifier");
        Ok(Container { kind, id })
    }
}
