use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use graph_client::paging::{FollowIds, FollowUsers, IdList, ReactionIds, SearchUsers};
use graph_client::{
    FollowKind, GraphApi, GraphError, Hydrator, PageSource, Paginator, PagingOptions,
    CURSOR_INITIAL, CURSOR_TERMINAL,
};
use tracing::{debug, info, warn};

use crate::actor::Actor;
use crate::error::{EngineError, Result};
use crate::types::{Reaction, TargetSpec, TargetUser};

// ─── CandidateSource ──────────────────────────────────────────────────────

/// A lazy, resumable sequence of users to act on.
///
/// Failures come through as `Some(Err(..))` and the next call carries on, so
/// only `None` ends the sequence.
#[async_trait]
pub trait CandidateSource: Send {
    async fn next_candidate(&mut self) -> Option<graph_client::Result<TargetUser>>;

    /// Where to resume without skipping undelivered candidates.
    fn cursor(&self) -> String;
}

/// Who reads the listing and whose view the hydrated records carry.
#[derive(Debug, Clone)]
pub struct MaterializeContext {
    /// Paginates listings. May differ from `executor` when the target
    /// blocks the executor.
    pub retriever: Actor,
    /// Hydrates records, so relationship flags are relative to it.
    pub executor: Actor,
    pub paging: PagingOptions,
    pub quick_mode: bool,
}

impl MaterializeContext {
    /// Full user pages can be consumed directly only when the account that
    /// lists them is the one that will act on them.
    fn direct_users_allowed(&self) -> bool {
        self.quick_mode && self.retriever.same_identity(&self.executor)
    }
}

/// Turn a target into candidates, starting at `resume` when given.
///
/// Fails synchronously only on a malformed target.
pub fn materialize(
    ctx: &MaterializeContext,
    spec: &TargetSpec,
    resume: Option<&str>,
) -> Result<Box<dyn CandidateSource>> {
    let cursor = resume.unwrap_or(CURSOR_INITIAL).to_string();
    let reader = ctx.retriever.api.clone();
    let hydrator = ctx.executor.api.clone();

    let source: Box<dyn CandidateSource> = match spec {
        TargetSpec::FollowerList { user, list } => {
            if user.id_str.is_empty() {
                return Err(EngineError::Validation("target user has no id".into()));
            }
            match list.follow_kind() {
                Some(kind) if ctx.direct_users_allowed() => {
                    let source = FollowUsers {
                        api: reader,
                        kind,
                        user_id: user.id_str.clone(),
                    };
                    Box::new(Direct(Paginator::resume(source, ctx.paging.clone(), cursor)))
                }
                Some(kind) => {
                    let source = FollowIds {
                        api: reader,
                        kind,
                        user_id: user.id_str.clone(),
                    };
                    hydrated(source, ctx.paging.clone(), cursor, hydrator)
                }
                None => Box::new(MutualFollowers::new(
                    reader,
                    hydrator,
                    user.id_str.clone(),
                    ctx.paging.clone(),
                    cursor,
                )),
            }
        }
        TargetSpec::TweetReaction { tweet_id, reactions } => {
            if tweet_id.trim().is_empty() {
                return Err(EngineError::Validation("empty tweet id".into()));
            }
            let mut reactions = reactions.clone();
            reactions.sort();
            reactions.dedup();
            match reactions.as_slice() {
                [] => return Err(EngineError::Validation("no reaction selected".into())),
                [reaction] => reaction_source(ctx, tweet_id, *reaction, cursor),
                _ => Box::new(Chained::resume(&cursor, reactions.len(), |part, cursor| {
                    reaction_source(ctx, tweet_id, reactions[part], cursor)
                })),
            }
        }
        TargetSpec::ImportedIds { ids } => {
            if ids.is_empty() {
                return Err(EngineError::Validation("imported id set is empty".into()));
            }
            hydrated(IdList::new(ids.clone()), ctx.paging.clone(), cursor, hydrator)
        }
        TargetSpec::SearchQuery { query } => {
            if query.trim().is_empty() {
                return Err(EngineError::Validation("empty search query".into()));
            }
            let source = SearchUsers {
                api: reader,
                query: query.clone(),
            };
            Box::new(Direct(Paginator::resume(source, ctx.paging.clone(), cursor)))
        }
    };
    debug!(target_kind = spec.kind(), quick = ctx.quick_mode, "candidates materialized");
    Ok(source)
}

fn reaction_source(
    ctx: &MaterializeContext,
    tweet_id: &str,
    reaction: Reaction,
    cursor: String,
) -> Box<dyn CandidateSource> {
    let hydrator = ctx.executor.api.clone();
    match reaction.reaction_kind() {
        Some(kind) => {
            let source = ReactionIds {
                api: ctx.retriever.api.clone(),
                kind,
                tweet_id: tweet_id.to_string(),
            };
            hydrated(source, ctx.paging.clone(), cursor, hydrator)
        }
        None => Box::new(Mentions::new(
            ctx.retriever.api.clone(),
            hydrator,
            tweet_id.to_string(),
            ctx.paging.clone(),
            cursor,
        )),
    }
}

fn hydrated<S>(
    source: S,
    paging: PagingOptions,
    cursor: String,
    api: Arc<dyn GraphApi>,
) -> Box<dyn CandidateSource>
where
    S: PageSource<Item = String> + 'static,
{
    Box::new(Hydrated(Hydrator::new(
        Paginator::resume(source, paging, cursor),
        api,
    )))
}

// ─── Sources ──────────────────────────────────────────────────────────────

/// Ids from a listing, looked up in batches.
struct Hydrated<S: PageSource<Item = String>>(Hydrator<S>);

#[async_trait]
impl<S> CandidateSource for Hydrated<S>
where
    S: PageSource<Item = String> + 'static,
{
    async fn next_candidate(&mut self) -> Option<graph_client::Result<TargetUser>> {
        self.0.next_user().await
    }

    fn cursor(&self) -> String {
        self.0.cursor().to_string()
    }
}

/// A listing that already returns full records.
struct Direct<S: PageSource<Item = TargetUser>>(Paginator<S>);

#[async_trait]
impl<S> CandidateSource for Direct<S>
where
    S: PageSource<Item = TargetUser> + 'static,
{
    async fn next_candidate(&mut self) -> Option<graph_client::Result<TargetUser>> {
        self.0.next_item().await
    }

    fn cursor(&self) -> String {
        self.0.cursor().to_string()
    }
}

/// Collects both follow listings in full, intersects them, then hydrates.
///
/// The resume cursor applies to the intersection, which is rebuilt on every
/// run.
struct MutualFollowers {
    stage: MutualStage,
    hydrator: Arc<dyn GraphApi>,
    paging: PagingOptions,
    resume: String,
}

enum MutualStage {
    Collecting {
        followers: BoxStream<'static, graph_client::Result<String>>,
        friends: BoxStream<'static, graph_client::Result<String>>,
        follower_ids: Vec<String>,
        friend_ids: HashSet<String>,
    },
    Hydrating(Hydrator<IdList>),
}

impl MutualFollowers {
    fn new(
        reader: Arc<dyn GraphApi>,
        hydrator: Arc<dyn GraphApi>,
        user_id: String,
        paging: PagingOptions,
        resume: String,
    ) -> Self {
        let listing = |kind| {
            let source = FollowIds {
                api: reader.clone(),
                kind,
                user_id: user_id.clone(),
            };
            Paginator::new(source, paging.clone()).into_stream().boxed()
        };
        Self {
            stage: MutualStage::Collecting {
                followers: listing(FollowKind::Followers),
                friends: listing(FollowKind::Friends),
                follower_ids: Vec::new(),
                friend_ids: HashSet::new(),
            },
            hydrator,
            paging,
            resume,
        }
    }
}

#[async_trait]
impl CandidateSource for MutualFollowers {
    async fn next_candidate(&mut self) -> Option<graph_client::Result<TargetUser>> {
        loop {
            match &mut self.stage {
                MutualStage::Hydrating(users) => return users.next_user().await,
                MutualStage::Collecting {
                    followers,
                    friends,
                    follower_ids,
                    friend_ids,
                } => {
                    if let Some(item) = followers.next().await {
                        match item {
                            Ok(id) => follower_ids.push(id),
                            Err(err) => return Some(Err(err)),
                        }
                        continue;
                    }
                    if let Some(item) = friends.next().await {
                        match item {
                            Ok(id) => {
                                friend_ids.insert(id);
                            }
                            Err(err) => return Some(Err(err)),
                        }
                        continue;
                    }
                    let mutual: Vec<String> = std::mem::take(follower_ids)
                        .into_iter()
                        .filter(|id| friend_ids.contains(id))
                        .collect();
                    info!(mutual = mutual.len(), "mutual followers collected");
                    let ids = Paginator::resume(
                        IdList::new(mutual),
                        self.paging.clone(),
                        self.resume.clone(),
                    );
                    self.stage = MutualStage::Hydrating(Hydrator::new(ids, self.hydrator.clone()));
                }
            }
        }
    }

    fn cursor(&self) -> String {
        match &self.stage {
            MutualStage::Collecting { .. } => self.resume.clone(),
            MutualStage::Hydrating(users) => users.cursor().to_string(),
        }
    }
}

/// Accounts mentioned in one tweet. The tweet is read lazily through the
/// retriever and the mentions hydrated through the executor.
///
/// A failed read is retried on the next call after the page delay, and
/// counts toward `max_retries` like a failed page. A deleted tweet yields
/// its error once, then nothing.
struct Mentions {
    reader: Arc<dyn GraphApi>,
    hydrator: Arc<dyn GraphApi>,
    tweet_id: String,
    paging: PagingOptions,
    resume: String,
    users: Option<Hydrator<IdList>>,
    failures: u32,
    exhausted: bool,
}

impl Mentions {
    fn new(
        reader: Arc<dyn GraphApi>,
        hydrator: Arc<dyn GraphApi>,
        tweet_id: String,
        paging: PagingOptions,
        resume: String,
    ) -> Self {
        Self {
            reader,
            hydrator,
            tweet_id,
            paging,
            resume,
            users: None,
            failures: 0,
            exhausted: false,
        }
    }

    fn start(&mut self, ids: Vec<String>) {
        let ids = Paginator::resume(IdList::new(ids), self.paging.clone(), self.resume.clone());
        self.users = Some(Hydrator::new(ids, self.hydrator.clone()));
    }

    /// Read the tweet once. `Err` is the item to yield for a failed read.
    async fn read_tweet(&mut self) -> graph_client::Result<()> {
        if self.failures > 0 && !self.paging.delay.is_zero() {
            tokio::time::sleep(self.paging.delay).await;
        }
        let err = match self.reader.tweet_by_id(&self.tweet_id).await {
            Ok(tweet) => {
                self.failures = 0;
                let ids = tweet
                    .entities
                    .user_mentions
                    .into_iter()
                    .map(|m| m.id_str)
                    .collect();
                self.start(ids);
                return Ok(());
            }
            Err(err) => err,
        };
        // a deleted tweet will never have mentions
        if matches!(&err, GraphError::ApiFail(r) if r.status == 404) {
            self.start(Vec::new());
            return Err(err);
        }
        if !err.is_rate_limited() {
            self.failures += 1;
        }
        warn!(
            tweet_id = %self.tweet_id,
            failures = self.failures,
            error = %err,
            "tweet read failed"
        );
        match self.paging.max_retries {
            Some(max) if self.failures > max => {
                self.exhausted = true;
                Err(GraphError::RetriesExhausted {
                    cursor: self.resume.clone(),
                    attempts: self.failures,
                })
            }
            _ => Err(err),
        }
    }
}

#[async_trait]
impl CandidateSource for Mentions {
    async fn next_candidate(&mut self) -> Option<graph_client::Result<TargetUser>> {
        if self.exhausted {
            return None;
        }
        if self.users.is_none() {
            if let Err(err) = self.read_tweet().await {
                return Some(Err(err));
            }
        }
        match &mut self.users {
            Some(users) => users.next_user().await,
            None => None,
        }
    }

    fn cursor(&self) -> String {
        match &self.users {
            Some(users) => users.cursor().to_string(),
            None => self.resume.clone(),
        }
    }
}

/// Several sources read one after another, each user delivered once.
///
/// The cursor is `<part>:<cursor within part>`. A cursor without a part
/// prefix belongs to the first part. Users seen before a resume are not
/// remembered, so a resumed chain may repeat a user from an earlier part.
struct Chained {
    /// `None` for parts already finished when the chain was resumed.
    parts: Vec<Option<Box<dyn CandidateSource>>>,
    current: usize,
    seen: HashSet<String>,
}

impl Chained {
    fn resume(
        cursor: &str,
        len: usize,
        mut build: impl FnMut(usize, String) -> Box<dyn CandidateSource>,
    ) -> Self {
        let (start, inner) = match cursor.split_once(':') {
            Some((part, inner)) => (part.parse().unwrap_or(len), inner.to_string()),
            None => (0, cursor.to_string()),
        };
        let parts = (0..len)
            .map(|part| match part.cmp(&start) {
                std::cmp::Ordering::Less => None,
                std::cmp::Ordering::Equal => Some(build(part, inner.clone())),
                std::cmp::Ordering::Greater => Some(build(part, CURSOR_INITIAL.to_string())),
            })
            .collect();
        Self {
            parts,
            current: start.min(len),
            seen: HashSet::new(),
        }
    }
}

#[async_trait]
impl CandidateSource for Chained {
    async fn next_candidate(&mut self) -> Option<graph_client::Result<TargetUser>> {
        while let Some(part) = self.parts.get_mut(self.current) {
            let item = match part {
                Some(source) => source.next_candidate().await,
                None => None,
            };
            match item {
                Some(Ok(user)) => {
                    if self.seen.insert(user.id_str.clone()) {
                        return Some(Ok(user));
                    }
                }
                Some(Err(err)) => return Some(Err(err)),
                None => self.current += 1,
            }
        }
        None
    }

    fn cursor(&self) -> String {
        match self.parts.get(self.current) {
            Some(Some(source)) => format!("{}:{}", self.current, source.cursor()),
            _ => format!("{}:{CURSOR_TERMINAL}", self.parts.len()),
        }
    }
}
