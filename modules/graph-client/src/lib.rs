pub mod error;
pub mod types;

pub use error::{GraphClientError, Result};
pub use types::{
    EdgeConnection, FollowOutcome, FollowResponse, FriendshipStatus, ListingKind, ListingPage,
    UserNode,
};

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::StatusCode;

/// Session credentials attached to every request. Read-only for the client's lifetime.
#[derive(Clone)]
pub struct Session {
    pub session_id: String,
    pub csrf_token: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &"<redacted>")
            .field("csrf_token", &"<redacted>")
            .finish()
    }
}

/// Persisted-query hashes for the two member listings.
#[derive(Debug, Clone)]
pub struct QueryHashes {
    pub followers: String,
    pub likers: String,
}

pub struct GraphClient {
    client: reqwest::Client,
    base_url: String,
    query_hashes: QueryHashes,
}

impl GraphClient {
    pub fn new(base_url: &str, session: Session, query_hashes: QueryHashes) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let cookie = format!(
            "csrftoken={}; sessionid={}",
            session.csrf_token, session.session_id
        );
        let mut cookie = HeaderValue::from_str(&cookie)
            .map_err(|e| GraphClientError::Parse(format!("invalid session cookie: {e}")))?;
        cookie.set_sensitive(true);
        headers.insert(COOKIE, cookie);

        let mut csrf = HeaderValue::from_str(&session.csrf_token)
            .map_err(|e| GraphClientError::Parse(format!("invalid csrf token: {e}")))?;
        csrf.set_sensitive(true);
        headers.insert("X-CSRFToken", csrf);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .user_agent(concat!("followscout/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            query_hashes,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the HTML of a profile or content page.
    pub async fn fetch_page(&self, url: &str) -> Result<String> {
        let resp = self.client.get(url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            tracing::debug!(url, status = status.as_u16(), "Page fetch failed");
            let message = resp.text().await.unwrap_or_default();
            return Err(error_for_status(status, message));
        }

        Ok(resp.text().await?)
    }

    /// Fetch one page of a member listing. `cursor` is the previous page's end cursor.
    pub async fn list_members(
        &self,
        kind: ListingKind,
        container_id: &str,
        cursor: Option<&str>,
        first: u32,
    ) -> Result<ListingPage> {
        let (hash, mut variables) = match kind {
            ListingKind::Followers => (
                &self.query_hashes.followers,
                serde_json::json!({
                    "id": container_id,
                    "include_reel": false,
                    "fetch_mutual": false,
                    "first": first,
                }),
            ),
            ListingKind::Likers => (
                &self.query_hashes.likers,
                serde_json::json!({
                    "shortcode": container_id,
                    "include_reel": true,
                    "first": first,
                }),
            ),
        };
        if let Some(after) = cursor {
            variables["after"] = serde_json::Value::String(after.to_string());
        }

        let url = format!("{}/graphql/query/", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("query_hash", hash.as_str()),
                ("variables", variables.to_string().as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(ListingPage::RateLimited);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(error_for_status(status, message));
        }

        let text = resp.text().await?;
        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(body) => Ok(ListingPage::classify(kind, &body)),
            Err(e) => Ok(ListingPage::Malformed {
                reason: format!("body is not JSON: {e}"),
            }),
        }
    }

    /// Whether the session's account already follows `user_id`.
    pub async fn friendship_status(&self, user_id: &str) -> Result<bool> {
        let url = format!("{}/api/v1/friendships/show/{}/", self.base_url, user_id);
        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(error_for_status(status, message));
        }

        let body: FriendshipStatus = resp.json().await?;
        body.following
            .ok_or_else(|| GraphClientError::Parse("friendship status without `following`".into()))
    }

    /// Follow `user_id`. A response that reached the service is an `Ok` outcome even
    /// when the service declined; only transport, parse, and session errors are `Err`.
    pub async fn follow(&self, user_id: &str) -> Result<FollowOutcome> {
        let url = format!(
            "{}/api/v1/web/friendships/{}/follow/",
            self.base_url, user_id
        );
        let resp = self
            .client
            .post(&url)
            .header("X-Requested-With", "XMLHttpRequest")
            .form(&[("user_id", user_id)])
            .send()
            .await?;

        let status = resp.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(GraphClientError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Ok(FollowOutcome {
                ok: false,
                status: status.as_u16(),
            });
        }

        let body: FollowResponse = resp.json().await?;
        Ok(FollowOutcome {
            ok: body.confirmed(),
            status: status.as_u16(),
        })
    }
}

fn error_for_status(status: StatusCode, message: String) -> GraphClientError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GraphClientError::Unauthorized {
            status: status.as_u16(),
        },
        StatusCode::TOO_MANY_REQUESTS => GraphClientError::RateLimited,
        _ => GraphClientError::Api {
            status: status.as_u16(),
            message,
        },
    }
}
