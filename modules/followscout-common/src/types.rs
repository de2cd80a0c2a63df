use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FollowScoutError;

// --- Candidates ---

/// An account discovered by harvesting, eligible for the follow action.
/// Identity is by `id`; two candidates with the same id are the same account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub handle: String,
    pub display_name: String,
    pub avatar_ref: Option<String>,
    pub is_private: bool,
    pub is_verified: bool,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Candidate {}

impl std::hash::Hash for Candidate {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.handle)
    }
}

// --- Targets ---

/// Which listing a scan walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    /// The follower list of a profile.
    Followers,
    /// The liked-by list of a post, reel, or video.
    Likers,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerKind::Followers => write!(f, "followers"),
            ContainerKind::Likers => write!(f, "likers"),
        }
    }
}

/// A human reference to a scan target, before identifier resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerRef {
    Profile { handle: String },
    /// `section` is the path prefix the code was pasted under (`p`, `reel`, or `tv`).
    Content { section: String, shortcode: String },
}

/// Path prefixes that address a content item rather than a profile.
const CONTENT_PREFIXES: &[&str] = &["p", "reel", "tv"];

/// First path segments that look like handles but are site sections.
const RESERVED_SEGMENTS: &[&str] = &["explore", "accounts", "stories", "direct", "graphql", "api"];

const MAX_HANDLE_LEN: usize = 30;

/// Pasted URLs must point at the service itself. The page is always refetched
/// from the configured base URL, never from the pasted host.
const SERVICE_DOMAIN: &str = "instagram.com";

impl ContainerRef {
    /// Parse a pasted handle (`@name`, `name`) or URL (profile, `/p/`, `/reel/`, `/tv/`).
    pub fn parse(input: &str) -> Result<Self, FollowScoutError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(FollowScoutError::InvalidReference("empty reference".into()));
        }

        if looks_like_url(trimmed) {
            return parse_url_reference(trimmed);
        }

        let handle = trimmed.trim_start_matches('@');
        if is_valid_handle(handle) {
            Ok(ContainerRef::Profile {
                handle: handle.to_string(),
            })
        } else {
            Err(FollowScoutError::InvalidReference(trimmed.to_string()))
        }
    }

    pub fn kind(&self) -> ContainerKind {
        match self {
            ContainerRef::Profile { .. } => ContainerKind::Followers,
            ContainerRef::Content { .. } => ContainerKind::Likers,
        }
    }

    /// The page whose markup carries this target's identifier.
    pub fn page_url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            ContainerRef::Profile { handle } => format!("{base}/{handle}/"),
            ContainerRef::Content { section, shortcode } => format!("{base}/{section}/{shortcode}/"),
        }
    }
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerRef::Profile { handle } => write!(f, "@{handle}"),
            ContainerRef::Content { shortcode, .. } => write!(f, "post {shortcode}"),
        }
    }
}

fn looks_like_url(s: &str) -> bool {
    s.contains("://") || (s.contains('.') && s.contains('/'))
}

fn parse_url_reference(raw: &str) -> Result<ContainerRef, FollowScoutError> {
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let url = url::Url::parse(&with_scheme)
        .map_err(|e| FollowScoutError::InvalidReference(format!("{raw}: {e}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(FollowScoutError::InvalidReference(format!(
            "{raw}: only http/https URLs are supported"
        )));
    }
    let on_service = url
        .host_str()
        .is_some_and(|host| host == SERVICE_DOMAIN || host.ends_with(&format!(".{SERVICE_DOMAIN}")));
    if !on_service {
        return Err(FollowScoutError::InvalidReference(format!(
            "{raw}: not an {SERVICE_DOMAIN} address"
        )));
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    match segments.as_slice() {
        [prefix, code, ..] if CONTENT_PREFIXES.contains(prefix) => {
            if !is_valid_shortcode(code) {
                return Err(FollowScoutError::InvalidReference(format!(
                    "{raw}: malformed content code"
                )));
            }
            Ok(ContainerRef::Content {
                section: prefix.to_string(),
                shortcode: code.to_string(),
            })
        }
        [first, ..] if !RESERVED_SEGMENTS.contains(first) && is_valid_handle(first) => {
            Ok(ContainerRef::Profile {
                handle: first.to_string(),
            })
        }
        _ => Err(FollowScoutError::InvalidReference(format!(
            "{raw}: no profile or content path"
        ))),
    }
}

fn is_valid_handle(handle: &str) -> bool {
    !handle.is_empty()
        && handle.len() <= MAX_HANDLE_LEN
        && handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
}

/// Content codes are URL-safe base64-ish tokens.
pub fn is_valid_shortcode(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= 64
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// A resolved scan target: a stable platform identifier and the listing it keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub kind: ContainerKind,
    pub id: String,
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {}", self.kind, self.id)
    }
}
