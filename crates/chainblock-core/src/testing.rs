//! In-memory `GraphApi` for engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use graph_client::{
    ApiResponse, FollowKind, GraphApi, GraphError, Limit, LimitStatus, LookupKey, Page,
    ReactionKind, Relationship, Tweet, User, CURSOR_INITIAL, CURSOR_TERMINAL,
};

use crate::actor::Actor;

pub(crate) fn api_fail(endpoint: &str, status: u16) -> GraphError {
    GraphError::ApiFail(ApiResponse {
        status,
        endpoint: endpoint.into(),
        body: String::new(),
        reset_at: None,
    })
}

pub(crate) fn rate_limited(endpoint: &str) -> GraphError {
    GraphError::RateLimited(ApiResponse {
        status: 429,
        endpoint: endpoint.into(),
        body: String::new(),
        reset_at: None,
    })
}

pub(crate) fn user(id: &str) -> User {
    User::new(id, format!("user{id}"))
}

/// One account's view of a small social graph.
///
/// Relationship flags on stored users are relative to `me`. Listings are
/// served in pages of `page_size`, the cursor being the offset.
pub(crate) struct FakeGraph {
    pub me: User,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    users: HashMap<String, User>,
    followers: HashMap<String, Vec<String>>,
    friends: HashMap<String, Vec<String>>,
    retweeters: HashMap<String, Vec<String>>,
    likers: HashMap<String, Vec<String>>,
    tweets: HashMap<String, Tweet>,
    search: HashMap<String, Vec<String>>,
    failures: HashMap<&'static str, VecDeque<GraphError>>,
    calls: Vec<String>,
    page_size: usize,
}

impl FakeGraph {
    pub fn new(me_id: &str) -> Arc<Self> {
        Arc::new(Self {
            me: user(me_id),
            state: Mutex::new(State {
                page_size: 2,
                ..State::default()
            }),
        })
    }

    pub fn actor(self: &Arc<Self>) -> Actor {
        Actor::new(self.me.clone(), self.clone())
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn add_user(&self, user: User) {
        self.with(|s| s.users.insert(user.id_str.clone(), user));
    }

    pub fn add_users(&self, users: impl IntoIterator<Item = User>) {
        for u in users {
            self.add_user(u);
        }
    }

    pub fn get_user(&self, id: &str) -> Option<User> {
        self.with(|s| s.users.get(id).cloned())
    }

    pub fn set_followers(&self, user_id: &str, ids: &[&str]) {
        let ids = ids.iter().map(|s| s.to_string()).collect();
        self.with(|s| s.followers.insert(user_id.into(), ids));
    }

    pub fn set_friends(&self, user_id: &str, ids: &[&str]) {
        let ids = ids.iter().map(|s| s.to_string()).collect();
        self.with(|s| s.friends.insert(user_id.into(), ids));
    }

    pub fn set_reactions(&self, kind: ReactionKind, tweet_id: &str, ids: &[&str]) {
        let ids = ids.iter().map(|s| s.to_string()).collect();
        self.with(|s| match kind {
            ReactionKind::Retweeted => s.retweeters.insert(tweet_id.into(), ids),
            ReactionKind::Liked => s.likers.insert(tweet_id.into(), ids),
        });
    }

    pub fn add_tweet(&self, tweet: Tweet) {
        self.with(|s| s.tweets.insert(tweet.id_str.clone(), tweet));
    }

    pub fn set_search(&self, query: &str, ids: &[&str]) {
        let ids = ids.iter().map(|s| s.to_string()).collect();
        self.with(|s| s.search.insert(query.into(), ids));
    }

    /// Queue an error for the next call of `op`.
    pub fn fail_next(&self, op: &'static str, err: GraphError) {
        self.with(|s| s.failures.entry(op).or_default().push_back(err));
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    /// Number of recorded calls of `op`.
    pub fn count(&self, op: &str) -> usize {
        let prefix = format!("{op}:");
        self.with(|s| s.calls.iter().filter(|c| c.starts_with(&prefix)).count())
    }

    fn enter(&self, op: &'static str, arg: &str) -> graph_client::Result<()> {
        self.with(|s| {
            s.calls.push(format!("{op}:{arg}"));
            match s.failures.get_mut(op).and_then(VecDeque::pop_front) {
                Some(err) => Err(err),
                None => Ok(()),
            }
        })
    }

    fn page_of<T: Clone>(&self, items: &[T], cursor: &str) -> Page<T> {
        let size = self.with(|s| s.page_size);
        let offset = if cursor == CURSOR_INITIAL {
            0
        } else {
            cursor.parse().unwrap_or(items.len())
        };
        let end = (offset + size).min(items.len());
        Page {
            next_cursor: if end >= items.len() {
                CURSOR_TERMINAL.to_string()
            } else {
                end.to_string()
            },
            items: items.get(offset..end).unwrap_or_default().to_vec(),
        }
    }

    fn user_or_404(&self, id: &str, endpoint: &str) -> graph_client::Result<User> {
        self.get_user(id).ok_or_else(|| api_fail(endpoint, 404))
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut User)) -> User {
        self.with(|s| {
            let entry = s.users.entry(id.to_string()).or_insert_with(|| user(id));
            f(entry);
            entry.clone()
        })
    }
}

#[async_trait]
impl GraphApi for FakeGraph {
    async fn verify_credentials(&self) -> graph_client::Result<User> {
        self.enter("verify", "")?;
        Ok(self.me.clone())
    }

    async fn rate_limit_status(&self) -> graph_client::Result<LimitStatus> {
        self.enter("limits", "")?;
        let mut blocks = HashMap::new();
        blocks.insert(
            "/blocks/ids".to_string(),
            Limit {
                limit: 15,
                remaining: 15,
                reset: 0,
            },
        );
        let mut status = HashMap::new();
        status.insert("blocks".to_string(), blocks);
        Ok(status)
    }

    async fn follow_ids(
        &self,
        kind: FollowKind,
        user_id: &str,
        cursor: &str,
    ) -> graph_client::Result<Page<String>> {
        self.enter("follow_ids", &format!("{}:{user_id}:{cursor}", kind.as_path()))?;
        let ids = self.with(|s| {
            let map = match kind {
                FollowKind::Followers => &s.followers,
                FollowKind::Friends => &s.friends,
            };
            map.get(user_id).cloned().unwrap_or_default()
        });
        Ok(self.page_of(&ids, cursor))
    }

    async fn follow_users(
        &self,
        kind: FollowKind,
        user_id: &str,
        cursor: &str,
    ) -> graph_client::Result<Page<User>> {
        self.enter("follow_users", &format!("{}:{user_id}:{cursor}", kind.as_path()))?;
        let users: Vec<User> = self.with(|s| {
            let map = match kind {
                FollowKind::Followers => &s.followers,
                FollowKind::Friends => &s.friends,
            };
            map.get(user_id)
                .into_iter()
                .flatten()
                .filter_map(|id| s.users.get(id).cloned())
                .collect()
        });
        Ok(self.page_of(&users, cursor))
    }

    async fn reaction_ids(
        &self,
        kind: ReactionKind,
        tweet_id: &str,
        cursor: &str,
    ) -> graph_client::Result<Page<String>> {
        self.enter("reaction_ids", &format!("{tweet_id}:{cursor}"))?;
        let ids = self.with(|s| {
            let map = match kind {
                ReactionKind::Retweeted => &s.retweeters,
                ReactionKind::Liked => &s.likers,
            };
            map.get(tweet_id).cloned().unwrap_or_default()
        });
        Ok(self.page_of(&ids, cursor))
    }

    async fn search_users(&self, query: &str, cursor: &str) -> graph_client::Result<Page<User>> {
        self.enter("search", &format!("{query}:{cursor}"))?;
        let users: Vec<User> = self.with(|s| {
            s.search
                .get(query)
                .into_iter()
                .flatten()
                .filter_map(|id| s.users.get(id).cloned())
                .collect()
        });
        Ok(self.page_of(&users, cursor))
    }

    async fn users_lookup(
        &self,
        key: LookupKey,
        values: &[String],
    ) -> graph_client::Result<Vec<User>> {
        self.enter("lookup", &values.join(","))?;
        Ok(self.with(|s| {
            values
                .iter()
                .filter_map(|v| match key {
                    LookupKey::UserId => s.users.get(v).cloned(),
                    LookupKey::ScreenName => {
                        s.users.values().find(|u| &u.screen_name == v).cloned()
                    }
                })
                .collect()
        }))
    }

    async fn user_by_id(&self, user_id: &str) -> graph_client::Result<User> {
        self.enter("user_by_id", user_id)?;
        self.user_or_404(user_id, "/users/show.json")
    }

    async fn user_by_name(&self, screen_name: &str) -> graph_client::Result<User> {
        self.enter("user_by_name", screen_name)?;
        self.with(|s| {
            s.users
                .values()
                .find(|u| u.screen_name == screen_name)
                .cloned()
        })
        .ok_or_else(|| api_fail("/users/show.json", 404))
    }

    async fn tweet_by_id(&self, tweet_id: &str) -> graph_client::Result<Tweet> {
        self.enter("tweet", tweet_id)?;
        self.with(|s| s.tweets.get(tweet_id).cloned())
            .ok_or_else(|| api_fail("/statuses/show.json", 404))
    }

    async fn relationship(
        &self,
        source_id: &str,
        target_id: &str,
    ) -> graph_client::Result<Relationship> {
        self.enter("relationship", &format!("{source_id}:{target_id}"))?;
        Err(api_fail("/friendships/show.json", 501))
    }

    async fn block_user(&self, user_id: &str) -> graph_client::Result<User> {
        self.enter("block", user_id)?;
        Ok(self.update(user_id, |u| {
            u.blocking = true;
            u.following = false;
            u.followed_by = false;
        }))
    }

    async fn unblock_user(&self, user_id: &str) -> graph_client::Result<User> {
        self.enter("unblock", user_id)?;
        Ok(self.update(user_id, |u| u.blocking = false))
    }

    async fn mute_user(&self, user_id: &str) -> graph_client::Result<User> {
        self.enter("mute", user_id)?;
        Ok(self.update(user_id, |u| u.muting = true))
    }

    async fn unmute_user(&self, user_id: &str) -> graph_client::Result<User> {
        self.enter("unmute", user_id)?;
        Ok(self.update(user_id, |u| u.muting = false))
    }
}
