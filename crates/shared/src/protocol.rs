use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{PostId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    pub follower_count: u64,
    pub following_count: u64,
    pub is_following: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostSummary {
    pub post_id: PostId,
    pub author_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_username: Option<String>,
    pub body: String,
    pub like_count: u64,
    pub liked_by_me: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPage {
    pub page: u32,
    pub page_size: u32,
    pub posts: Vec<PostSummary>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedQuery {
    pub page: u32,
    pub page_size: u32,
}
