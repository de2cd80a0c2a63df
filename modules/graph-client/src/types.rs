use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Which member listing a query addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingKind {
    /// Accounts following a profile. Keyed by numeric user id.
    Followers,
    /// Accounts that liked a content item. Keyed by shortcode.
    Likers,
}

/// A member node as it appears inside listing edges.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserNode {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub profile_pic_url: Option<String>,
    #[serde(default, deserialize_with = "bool_or_null")]
    pub is_private: bool,
    #[serde(default, deserialize_with = "bool_or_null")]
    pub is_verified: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Edge {
    pub node: UserNode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageInfo {
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

/// An `edge_*` connection block: a page of edges plus optional paging info.
#[derive(Debug, Clone, Deserialize)]
pub struct EdgeConnection {
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub page_info: Option<PageInfo>,
}

impl EdgeConnection {
    pub fn into_members(self) -> Vec<UserNode> {
        self.edges.into_iter().map(|e| e.node).collect()
    }
}

/// One listing response, classified by shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingPage {
    /// The paginated schema: a page of members and the cursor for the next page.
    Primary {
        members: Vec<UserNode>,
        next_cursor: Option<String>,
    },
    /// The secondary schema the likers query sometimes returns. Never paginated.
    Alternate { members: Vec<UserNode> },
    /// HTTP 429 from the listing endpoint.
    RateLimited,
    /// Neither schema matched.
    Malformed { reason: String },
}

impl ListingPage {
    /// Classify a decoded listing body for the given listing kind.
    pub fn classify(kind: ListingKind, body: &Value) -> Self {
        let primary_path = match kind {
            ListingKind::Followers => "/data/user/edge_followed_by",
            ListingKind::Likers => "/data/shortcode_media/edge_liked_by",
        };

        if let Some(conn) = connection_at(body, primary_path) {
            if let Some(page_info) = conn.page_info.clone() {
                let next_cursor = if page_info.has_next_page {
                    page_info.end_cursor.filter(|c| !c.is_empty())
                } else {
                    None
                };
                return ListingPage::Primary {
                    members: conn.into_members(),
                    next_cursor,
                };
            }
        }

        if kind == ListingKind::Likers {
            if let Some(conn) = connection_at(body, "/data/shortcode_media/edge_media_preview_like") {
                return ListingPage::Alternate {
                    members: conn.into_members(),
                };
            }
        }

        ListingPage::Malformed {
            reason: describe_shape(body),
        }
    }
}

fn connection_at(body: &Value, path: &str) -> Option<EdgeConnection> {
    let raw = body.pointer(path)?;
    serde_json::from_value(raw.clone()).ok()
}

/// Short description of an unrecognized body, for log lines.
fn describe_shape(body: &Value) -> String {
    match body {
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).take(8).collect();
            format!("unexpected keys: [{}]", keys.join(", "))
        }
        Value::Null => "empty body".to_string(),
        other => format!("unexpected JSON type: {}", json_type(other)),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Body of the relationship-status endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct FriendshipStatus {
    pub following: Option<bool>,
}

/// Body of the follow endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FollowResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub friendship_status: Option<FriendshipStatus>,
}

impl FollowResponse {
    /// The action is confirmed when the service says `ok` or reports the new relationship.
    pub fn confirmed(&self) -> bool {
        self.status.as_deref() == Some("ok")
            || self
                .friendship_status
                .as_ref()
                .and_then(|f| f.following)
                .unwrap_or(false)
    }
}

/// Result of a follow request that reached the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowOutcome {
    pub ok: bool,
    pub status: u16,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            json_type(&other)
        ))),
    }
}

fn bool_or_null<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}
