// Trait abstraction for the social graph service.
//
// SocialGraphService is the seam between the pipeline and the network.
// Production uses GraphClient; tests use MockGraph from `testing`.

use async_trait::async_trait;
use followscout_common::{Container, ContainerKind};
use graph_client::{FollowOutcome, GraphClient, ListingKind, ListingPage};

#[async_trait]
pub trait SocialGraphService: Send + Sync {
    /// Base URL that relative page references resolve against.
    fn base_url(&self) -> &str;

    /// Fetch the markup of a profile or content page.
    async fn fetch_page(&self, url: &str) -> graph_client::Result<String>;

    /// Fetch one page of the container's member listing.
    async fn list_members(
        &self,
        container: &Container,
        cursor: Option<&str>,
        page_size: u32,
    ) -> graph_client::Result<ListingPage>;

    /// Whether the session account already follows `id`.
    async fn relationship_status(&self, id: &str) -> graph_client::Result<bool>;

    /// Follow `id`.
    async fn perform_action(&self, id: &str) -> graph_client::Result<FollowOutcome>;
}

fn listing_kind(kind: ContainerKind) -> ListingKind {
    match kind {
        ContainerKind::Followers => ListingKind::Followers,
        ContainerKind::Likers => ListingKind::Likers,
    }
}

#[async_trait]
impl SocialGraphService for GraphClient {
    fn base_url(&self) -> &str {
        GraphClient::base_url(self)
    }

    async fn fetch_page(&self, url: &str) -> graph_client::Result<String> {
        GraphClient::fetch_page(self, url).await
    }

    async fn list_members(
        &self,
        container: &Container,
        cursor: Option<&str>,
        page_size: u32,
    ) -> graph_client::Result<ListingPage> {
        GraphClient::list_members(
            self,
            listing_kind(container.kind),
            &container.id,
            cursor,
            page_size,
        )
        .await
    }

    async fn relationship_status(&self, id: &str) -> graph_client::Result<bool> {
        self.friendship_status(id).await
    }

    async fn perform_action(&self, id: &str) -> graph_client::Result<FollowOutcome> {
        self.follow(id).await
    }
}
