use async_trait::async_trait;

use crate::types::{
    FollowKind, LimitStatus, LookupKey, Page, ReactionKind, Relationship, Tweet, User,
    LOOKUP_BATCH_LIMIT,
};
use crate::{GraphError, Result};

// ─── GraphApi ─────────────────────────────────────────────────────────────

/// Everything the engine needs from the platform, issued as one identity.
///
/// Implemented over HTTP by [`crate::HttpGraphClient`]; tests substitute an
/// in-memory graph. Every method is a single request: pagination, retries and
/// delays live in [`crate::paging`], never here.
#[async_trait]
pub trait GraphApi: Send + Sync {
    /// The account these credentials belong to.
    async fn verify_credentials(&self) -> Result<User>;

    async fn rate_limit_status(&self) -> Result<LimitStatus>;

    /// One page of follower / following ids.
    async fn follow_ids(&self, kind: FollowKind, user_id: &str, cursor: &str)
        -> Result<Page<String>>;

    /// One page of follower / following user records.
    async fn follow_users(
        &self,
        kind: FollowKind,
        user_id: &str,
        cursor: &str,
    ) -> Result<Page<User>>;

    /// One page of ids that retweeted or liked `tweet_id`.
    async fn reaction_ids(
        &self,
        kind: ReactionKind,
        tweet_id: &str,
        cursor: &str,
    ) -> Result<Page<String>>;

    async fn search_users(&self, query: &str, cursor: &str) -> Result<Page<User>>;

    /// Raw `users/lookup`. Callers go through [`GraphApi::lookup_users_by_ids`]
    /// or [`GraphApi::lookup_users_by_names`], which enforce the batch contract.
    async fn users_lookup(&self, key: LookupKey, values: &[String]) -> Result<Vec<User>>;

    async fn user_by_id(&self, user_id: &str) -> Result<User>;

    async fn user_by_name(&self, screen_name: &str) -> Result<User>;

    async fn tweet_by_id(&self, tweet_id: &str) -> Result<Tweet>;

    async fn relationship(&self, source_id: &str, target_id: &str) -> Result<Relationship>;

    async fn block_user(&self, user_id: &str) -> Result<User>;

    async fn unblock_user(&self, user_id: &str) -> Result<User>;

    async fn mute_user(&self, user_id: &str) -> Result<User>;

    async fn unmute_user(&self, user_id: &str) -> Result<User>;

    /// Hydrate up to [`LOOKUP_BATCH_LIMIT`] ids. Empty input returns an empty
    /// list without a request.
    async fn lookup_users_by_ids(&self, ids: &[String]) -> Result<Vec<User>> {
        let ids = prepare_lookup(ids)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.users_lookup(LookupKey::UserId, &ids).await
    }

    async fn lookup_users_by_names(&self, names: &[String]) -> Result<Vec<User>> {
        let names = prepare_lookup(names)?;
        if names.is_empty() {
            return Ok(Vec::new());
        }
        self.users_lookup(LookupKey::ScreenName, &names).await
    }
}

/// Check the batch size and drop duplicates, keeping first occurrences.
pub fn prepare_lookup(values: &[String]) -> Result<Vec<String>> {
    if values.len() > LOOKUP_BATCH_LIMIT {
        return Err(GraphError::Validation(format!(
            "too many users in one lookup ({} > {LOOKUP_BATCH_LIMIT})",
            values.len()
        )));
    }
    let mut seen = std::collections::HashSet::new();
    Ok(values
        .iter()
        .filter(|v| seen.insert(v.as_str()))
        .cloned()
        .collect())
}
