use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─── Cursors ──────────────────────────────────────────────────────────────

/// Cursor sent with the first page request.
pub const CURSOR_INITIAL: &str = "-1";

/// Cursor returned by the server once the last page has been delivered.
pub const CURSOR_TERMINAL: &str = "0";

/// Maximum ids or names accepted by one lookup request.
pub const LOOKUP_BATCH_LIMIT: usize = 100;

// ─── Users ────────────────────────────────────────────────────────────────

/// A user profile as seen by the authenticated identity that fetched it.
///
/// The relationship flags (`blocking`, `blocked_by`, `muting`, `following`,
/// `followed_by`) are relative to the requesting account. A record fetched
/// through one account says nothing about another account's relationships.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    pub id_str: String,
    pub screen_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub blocked_by: bool,
    #[serde(default)]
    pub blocking: bool,
    #[serde(default)]
    pub muting: bool,
    #[serde(default)]
    pub following: bool,
    #[serde(default)]
    pub followed_by: bool,
    #[serde(default)]
    pub follow_request_sent: bool,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub friends_count: u64,
    #[serde(default)]
    pub followers_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_url_https: Option<String>,
    /// Most recent tweet. Absent for accounts that never tweeted, and for
    /// protected accounts the requester does not follow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LastStatus>,
}

/// The part of a user's latest tweet that is embedded in the user object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LastStatus {
    /// e.g. `Wed Oct 10 20:19:24 +0000 2018`
    pub created_at: String,
}

impl User {
    /// Minimal record with every relationship flag cleared.
    pub fn new(id: impl Into<String>, screen_name: impl Into<String>) -> Self {
        let screen_name = screen_name.into();
        Self {
            id_str: id.into(),
            name: screen_name.clone(),
            screen_name,
            blocked_by: false,
            blocking: false,
            muting: false,
            following: false,
            followed_by: false,
            follow_request_sent: false,
            protected: false,
            verified: false,
            friends_count: 0,
            followers_count: 0,
            created_at: None,
            description: None,
            profile_image_url_https: None,
            status: None,
        }
    }
}

// ─── Tweets ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Tweet {
    pub id_str: String,
    pub user: User,
    #[serde(default, alias = "full_text")]
    pub text: String,
    #[serde(default)]
    pub retweet_count: u64,
    #[serde(default)]
    pub favorite_count: u64,
    #[serde(default)]
    pub entities: TweetEntities,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TweetEntities {
    #[serde(default)]
    pub user_mentions: Vec<UserMention>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserMention {
    pub id_str: String,
    pub screen_name: String,
}

// ─── Relationships ────────────────────────────────────────────────────────

/// `friendships/show` payload: both sides of one relationship.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Relationship {
    pub source: RelationshipSource,
    pub target: RelationshipTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RelationshipSource {
    pub id_str: String,
    pub screen_name: String,
    #[serde(default)]
    pub following: bool,
    #[serde(default)]
    pub followed_by: bool,
    #[serde(default)]
    pub blocking: bool,
    #[serde(default)]
    pub blocked_by: bool,
    #[serde(default)]
    pub muting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RelationshipTarget {
    pub id_str: String,
    pub screen_name: String,
    #[serde(default)]
    pub following: bool,
    #[serde(default)]
    pub followed_by: bool,
}

// ─── Rate limits ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Limit {
    pub limit: u32,
    pub remaining: u32,
    /// Unix timestamp at which `remaining` is refilled.
    pub reset: i64,
}

/// `application/rate_limit_status` resources, keyed by family then endpoint
/// (e.g. `"followers" -> "/followers/ids"`).
pub type LimitStatus = HashMap<String, HashMap<String, Limit>>;

// ─── Pages ────────────────────────────────────────────────────────────────

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub next_cursor: String,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.next_cursor == CURSOR_TERMINAL
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct IdsResponse {
    pub next_cursor_str: String,
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UsersResponse {
    pub next_cursor_str: String,
    pub users: Vec<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RelationshipResponse {
    pub relationship: Relationship,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LimitStatusResponse {
    pub resources: LimitStatus,
}

// ─── Listing kinds ────────────────────────────────────────────────────────

/// Which side of a user's follow graph to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowKind {
    Followers,
    /// Accounts the user follows (`friends` in the REST API).
    Friends,
}

impl FollowKind {
    pub fn as_path(self) -> &'static str {
        match self {
            FollowKind::Followers => "followers",
            FollowKind::Friends => "friends",
        }
    }
}

/// Tweet engagements that can be listed as user ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    Retweeted,
    Liked,
}

impl ReactionKind {
    pub fn as_path(self) -> &'static str {
        match self {
            ReactionKind::Retweeted => "/statuses/retweeters/ids.json",
            ReactionKind::Liked => "/statuses/favoriters/ids.json",
        }
    }
}

/// Lookup key for `users/lookup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKey {
    UserId,
    ScreenName,
}

impl LookupKey {
    pub fn as_param(self) -> &'static str {
        match self {
            LookupKey::UserId => "user_id",
            LookupKey::ScreenName => "screen_name",
        }
    }
}
