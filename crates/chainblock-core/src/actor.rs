use std::fmt;
use std::sync::Arc;

use graph_client::{GraphApi, Tweet, User};
use tracing::{debug, warn};

use crate::error::Result;

/// An authenticated identity: who it is and a client that acts as it.
#[derive(Clone)]
pub struct Actor {
    pub user: User,
    pub api: Arc<dyn GraphApi>,
}

impl Actor {
    pub fn new(user: User, api: Arc<dyn GraphApi>) -> Self {
        Self { user, api }
    }

    /// Ask the API who these credentials belong to.
    pub async fn connect(api: Arc<dyn GraphApi>) -> Result<Self> {
        let user = api.verify_credentials().await?;
        Ok(Self { user, api })
    }

    pub fn id(&self) -> &str {
        &self.user.id_str
    }

    pub fn same_identity(&self, other: &Actor) -> bool {
        self.user.id_str == other.user.id_str
    }
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("id", &self.user.id_str)
            .field("screen_name", &self.user.screen_name)
            .finish_non_exhaustive()
    }
}

/// Outcome of [`ActorPool::resolve_for_tweet`].
#[derive(Debug, Clone)]
pub struct TweetResolution {
    pub actor: Actor,
    /// `None` when no identity could read the tweet.
    pub tweet: Option<Tweet>,
    pub retrieved_via_primary: bool,
}

/// Every identity available to a session, in fallback order.
#[derive(Debug, Clone, Default)]
pub struct ActorPool {
    actors: Vec<Actor>,
}

impl ActorPool {
    pub fn new(actors: Vec<Actor>) -> Self {
        Self { actors }
    }

    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn find_by_name(&self, screen_name: &str) -> Option<&Actor> {
        self.actors
            .iter()
            .find(|a| a.user.screen_name.eq_ignore_ascii_case(screen_name))
    }

    fn others<'a>(&'a self, primary: &'a Actor) -> impl Iterator<Item = &'a Actor> + 'a {
        self.actors.iter().filter(move |a| !a.same_identity(primary))
    }

    /// Pick an identity that can see `target`.
    ///
    /// Returns `primary` untouched when the target does not block it.
    /// Otherwise tries the other identities with one lookup each and
    /// returns the first one the target does not block. When none
    /// qualifies the primary comes back and the caller must cope with a
    /// blind reader.
    pub async fn resolve(&self, primary: &Actor, target: &User) -> Actor {
        if !target.blocked_by {
            return primary.clone();
        }
        for actor in self.others(primary) {
            match actor.api.user_by_id(&target.id_str).await {
                Ok(seen) if !seen.blocked_by => {
                    debug!(user_id = %target.id_str, via = %actor.user.screen_name, "found unblocked reader");
                    return actor.clone();
                }
                Ok(_) => debug!(user_id = %target.id_str, via = %actor.user.screen_name, "also blocked"),
                Err(err) => debug!(user_id = %target.id_str, via = %actor.user.screen_name, error = %err, "fallback lookup failed"),
            }
        }
        warn!(user_id = %target.id_str, "no identity can see the target, using primary");
        primary.clone()
    }

    /// Like [`ActorPool::resolve`] but for a tweet whose author may block
    /// the primary.
    pub async fn resolve_for_tweet(&self, primary: &Actor, tweet_id: &str) -> TweetResolution {
        match primary.api.tweet_by_id(tweet_id).await {
            Ok(tweet) => {
                return TweetResolution {
                    actor: primary.clone(),
                    tweet: Some(tweet),
                    retrieved_via_primary: true,
                }
            }
            Err(err) => debug!(tweet = tweet_id, error = %err, "primary cannot read tweet"),
        }
        for actor in self.others(primary) {
            match actor.api.tweet_by_id(tweet_id).await {
                Ok(tweet) if !tweet.user.blocked_by => {
                    debug!(tweet = tweet_id, via = %actor.user.screen_name, "tweet readable");
                    return TweetResolution {
                        actor: actor.clone(),
                        tweet: Some(tweet),
                        retrieved_via_primary: false,
                    };
                }
                Ok(_) => debug!(tweet = tweet_id, via = %actor.user.screen_name, "author blocks reader"),
                Err(err) => debug!(tweet = tweet_id, via = %actor.user.screen_name, error = %err, "fallback lookup failed"),
            }
        }
        warn!(tweet = tweet_id, "no identity can read the tweet");
        TweetResolution {
            actor: primary.clone(),
            tweet: None,
            retrieved_via_primary: true,
        }
    }
}
