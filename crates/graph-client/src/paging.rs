use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use tracing::{debug, warn};

use crate::api::GraphApi;
use crate::types::{
    FollowKind, Page, ReactionKind, User, CURSOR_INITIAL, CURSOR_TERMINAL, LOOKUP_BATCH_LIMIT,
};
use crate::{GraphError, Result};

// ─── PageSource ───────────────────────────────────────────────────────────

/// A single cursor-addressed listing endpoint.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send;

    async fn fetch_page(&self, cursor: &str) -> Result<Page<Self::Item>>;
}

/// `followers/ids` or `friends/ids` of one user.
pub struct FollowIds {
    pub api: Arc<dyn GraphApi>,
    pub kind: FollowKind,
    pub user_id: String,
}

#[async_trait]
impl PageSource for FollowIds {
    type Item = String;

    async fn fetch_page(&self, cursor: &str) -> Result<Page<String>> {
        self.api.follow_ids(self.kind, &self.user_id, cursor).await
    }
}

/// `followers/list` or `friends/list` of one user.
pub struct FollowUsers {
    pub api: Arc<dyn GraphApi>,
    pub kind: FollowKind,
    pub user_id: String,
}

#[async_trait]
impl PageSource for FollowUsers {
    type Item = User;

    async fn fetch_page(&self, cursor: &str) -> Result<Page<User>> {
        self.api.follow_users(self.kind, &self.user_id, cursor).await
    }
}

/// Retweeter or liker ids of one tweet.
pub struct ReactionIds {
    pub api: Arc<dyn GraphApi>,
    pub kind: ReactionKind,
    pub tweet_id: String,
}

#[async_trait]
impl PageSource for ReactionIds {
    type Item = String;

    async fn fetch_page(&self, cursor: &str) -> Result<Page<String>> {
        self.api.reaction_ids(self.kind, &self.tweet_id, cursor).await
    }
}

pub struct SearchUsers {
    pub api: Arc<dyn GraphApi>,
    pub query: String,
}

#[async_trait]
impl PageSource for SearchUsers {
    type Item = User;

    async fn fetch_page(&self, cursor: &str) -> Result<Page<User>> {
        self.api.search_users(&self.query, cursor).await
    }
}

/// An in-memory id list served in lookup-sized pages. The cursor is the
/// offset of the page, so a listing already held in memory can be resumed
/// the same way as a server-side one.
pub struct IdList {
    ids: Vec<String>,
}

impl IdList {
    pub fn new(ids: Vec<String>) -> Self {
        Self { ids }
    }
}

#[async_trait]
impl PageSource for IdList {
    type Item = String;

    async fn fetch_page(&self, cursor: &str) -> Result<Page<String>> {
        let offset = if cursor == CURSOR_INITIAL {
            0
        } else {
            cursor
                .parse::<usize>()
                .map_err(|_| GraphError::Validation(format!("invalid offset cursor '{cursor}'")))?
        };
        let end = (offset + LOOKUP_BATCH_LIMIT).min(self.ids.len());
        let items = self.ids.get(offset..end).unwrap_or_default().to_vec();
        let next_cursor = if end >= self.ids.len() {
            CURSOR_TERMINAL.to_string()
        } else {
            end.to_string()
        };
        Ok(Page { next_cursor, items })
    }
}

// ─── Paginator ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PagingOptions {
    /// Pause between consecutive page requests.
    pub delay: Duration,
    /// Consecutive failures tolerated on one cursor before giving up.
    /// `None` retries forever; rate-limit errors are never counted.
    pub max_retries: Option<u32>,
}

impl Default for PagingOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(200),
            max_retries: None,
        }
    }
}

/// Walks a [`PageSource`] from a cursor until the server returns `"0"`.
///
/// Yields one `Result` per item. A failed page request yields a single `Err`
/// and the next call retries the same cursor, so one bad response never ends
/// the sequence.
pub struct Paginator<S: PageSource> {
    source: S,
    options: PagingOptions,
    /// Cursor of the next page to request.
    next_cursor: String,
    /// Cursor of the page whose items are in `buffer`.
    page_cursor: String,
    buffer: VecDeque<S::Item>,
    requested: bool,
    finished: bool,
    failures: u32,
}

impl<S: PageSource> Paginator<S> {
    pub fn new(source: S, options: PagingOptions) -> Self {
        Self::resume(source, options, CURSOR_INITIAL)
    }

    /// Start from an arbitrary cursor, e.g. one reported by [`Paginator::cursor`].
    pub fn resume(source: S, options: PagingOptions, cursor: impl Into<String>) -> Self {
        let cursor = cursor.into();
        let finished = cursor == CURSOR_TERMINAL;
        Self {
            source,
            options,
            page_cursor: cursor.clone(),
            next_cursor: cursor,
            buffer: VecDeque::new(),
            requested: false,
            finished,
            failures: 0,
        }
    }

    /// Cursor to resume from without losing undelivered items.
    pub fn cursor(&self) -> &str {
        if self.buffer.is_empty() {
            &self.next_cursor
        } else {
            &self.page_cursor
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished && self.buffer.is_empty()
    }

    pub async fn next_item(&mut self) -> Option<Result<S::Item>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.finished {
                return None;
            }
            if self.requested && !self.options.delay.is_zero() {
                tokio::time::sleep(self.options.delay).await;
            }
            self.requested = true;

            match self.source.fetch_page(&self.next_cursor).await {
                Ok(page) => {
                    debug!(
                        cursor = %self.next_cursor,
                        next = %page.next_cursor,
                        items = page.items.len(),
                        "page fetched"
                    );
                    self.failures = 0;
                    self.finished = page.is_last();
                    self.page_cursor = std::mem::replace(&mut self.next_cursor, page.next_cursor);
                    self.buffer.extend(page.items);
                }
                Err(err) => {
                    if !err.is_rate_limited() {
                        self.failures += 1;
                    }
                    warn!(cursor = %self.next_cursor, failures = self.failures, error = %err, "page request failed");
                    if let Some(max) = self.options.max_retries {
                        if self.failures > max {
                            self.finished = true;
                            return Some(Err(GraphError::RetriesExhausted {
                                cursor: self.next_cursor.clone(),
                                attempts: self.failures,
                            }));
                        }
                    }
                    return Some(Err(err));
                }
            }
        }
    }

    /// Adapt into a `futures::Stream`.
    pub fn into_stream(self) -> impl Stream<Item = Result<S::Item>>
    where
        S: 'static,
    {
        futures::stream::unfold(self, |mut paginator| async move {
            paginator.next_item().await.map(|item| (item, paginator))
        })
    }
}

// ─── Hydrator ─────────────────────────────────────────────────────────────

/// Turns a paginated id listing into full user records, looking ids up in
/// batches of at most [`LOOKUP_BATCH_LIMIT`] through `api`.
///
/// The records carry `api`'s relationship flags, whichever account produced
/// the id listing.
pub struct Hydrator<S: PageSource<Item = String>> {
    ids: Paginator<S>,
    api: Arc<dyn GraphApi>,
    batch: Vec<String>,
    ready: VecDeque<User>,
    /// Listing cursor from before the first id of `batch` was taken.
    batch_cursor: String,
    ids_done: bool,
    /// Consecutive failed lookups of the current batch.
    failures: u32,
    exhausted: bool,
}

impl<S: PageSource<Item = String>> Hydrator<S> {
    pub fn new(ids: Paginator<S>, api: Arc<dyn GraphApi>) -> Self {
        let batch_cursor = ids.cursor().to_string();
        Self {
            ids,
            api,
            batch: Vec::with_capacity(LOOKUP_BATCH_LIMIT),
            ready: VecDeque::new(),
            batch_cursor,
            ids_done: false,
            failures: 0,
            exhausted: false,
        }
    }

    /// Resume point that re-reads, never skips, users not yet delivered.
    pub fn cursor(&self) -> &str {
        if self.batch.is_empty() && self.ready.is_empty() {
            self.ids.cursor()
        } else {
            &self.batch_cursor
        }
    }

    pub async fn next_user(&mut self) -> Option<Result<User>> {
        loop {
            if let Some(user) = self.ready.pop_front() {
                return Some(Ok(user));
            }
            if self.exhausted {
                return None;
            }
            let full = self.batch.len() >= LOOKUP_BATCH_LIMIT;
            if !self.batch.is_empty() && (full || self.ids_done) {
                if let Err(err) = self.hydrate_batch().await {
                    return Some(Err(err));
                }
                continue;
            }
            if self.ids_done {
                return None;
            }
            if self.batch.is_empty() {
                self.batch_cursor = self.ids.cursor().to_string();
            }
            match self.ids.next_item().await {
                Some(Ok(id)) => self.batch.push(id),
                Some(Err(err)) => return Some(Err(err)),
                None => self.ids_done = true,
            }
        }
    }

    /// A failed batch is kept and looked up again on the next call, after
    /// the page delay. Past `max_retries` consecutive failures (rate limits
    /// not counted) it ends the sequence with `RetriesExhausted`.
    async fn hydrate_batch(&mut self) -> Result<()> {
        let delay = self.ids.options.delay;
        if self.failures > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.api.lookup_users_by_ids(&self.batch).await {
            Ok(users) => {
                self.failures = 0;
                self.batch.clear();
                self.ready.extend(users);
                Ok(())
            }
            Err(err) => {
                if !err.is_rate_limited() {
                    self.failures += 1;
                }
                warn!(
                    ids = self.batch.len(),
                    failures = self.failures,
                    error = %err,
                    "user lookup failed"
                );
                match self.ids.options.max_retries {
                    Some(max) if self.failures > max => {
                        self.exhausted = true;
                        Err(GraphError::RetriesExhausted {
                            cursor: self.batch_cursor.clone(),
                            attempts: self.failures,
                        })
                    }
                    _ => Err(err),
                }
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
