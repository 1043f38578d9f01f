//! View-facing facade: loads authoritative state and drives toggles through one controller.

use std::sync::Arc;

use anyhow::Result;
use shared::{
    domain::{PostId, ToggleKey, UserId},
    protocol::{FeedPage, UserProfile},
};
use tracing::{debug, warn};

use crate::{
    api::SocialApiClient,
    toggle::{OptimisticActionController, SeedOutcome, ToggleStore},
    ToggleError,
};

pub struct SocialSession {
    api: Arc<SocialApiClient>,
    controller: OptimisticActionController<ToggleKey>,
}

impl SocialSession {
    pub fn new(api: Arc<SocialApiClient>) -> Self {
        Self::with_store(api, ToggleStore::new())
    }

    pub fn with_store(api: Arc<SocialApiClient>, store: ToggleStore<ToggleKey>) -> Self {
        let controller = OptimisticActionController::new(store, api.clone());
        Self { api, controller }
    }

    pub fn api(&self) -> &SocialApiClient {
        &self.api
    }

    pub fn controller(&self) -> &OptimisticActionController<ToggleKey> {
        &self.controller
    }

    pub fn store(&self) -> &ToggleStore<ToggleKey> {
        self.controller.store()
    }

    pub async fn load_profile(&self, user_id: UserId) -> Result<UserProfile> {
        let profile = self.api.fetch_profile(user_id).await?;
        let key = ToggleKey::Follow(user_id);
        if self.controller.seed(key, profile.is_following, Some(profile.follower_count))
            == SeedOutcome::SkippedPending
        {
            debug!(%key, "profile loaded while a follow toggle is in flight");
        }
        Ok(profile)
    }

    pub async fn load_feed(&self, page: u32, page_size: u32) -> Result<FeedPage> {
        let feed = self.api.fetch_feed(page, page_size).await?;
        for post in &feed.posts {
            self.controller.seed(
                ToggleKey::Like(post.post_id),
                post.liked_by_me,
                Some(post.like_count),
            );
        }
        debug!(page, posts = feed.posts.len(), "feed page seeded");
        Ok(feed)
    }

    pub async fn toggle_follow(&self, user_id: UserId) -> Result<bool, ToggleError> {
        self.toggle(ToggleKey::Follow(user_id)).await
    }

    pub async fn toggle_like(&self, post_id: PostId) -> Result<bool, ToggleError> {
        self.toggle(ToggleKey::Like(post_id)).await
    }

    async fn toggle(&self, key: ToggleKey) -> Result<bool, ToggleError> {
        let result = self.controller.toggle_displayed(key).await;
        match &result {
            Ok(state) => debug!(%key, state, "toggle settled"),
            Err(err @ ToggleError::Concurrent { .. }) => debug!(%key, "{err}"),
            Err(err @ ToggleError::Failed { .. }) => warn!(%key, "{err}"),
        }
        result
    }

    pub fn follower_count(&self, user_id: UserId) -> Option<u64> {
        self.store().counter(&ToggleKey::Follow(user_id))
    }

    pub fn like_count(&self, post_id: PostId) -> Option<u64> {
        self.store().counter(&ToggleKey::Like(post_id))
    }

    /// Drops every idle record, e.g. when the owning view goes away.
    pub fn reset(&self) -> usize {
        self.store().clear()
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
