use chrono::{DateTime, Duration, Utc};
use graph_client::{GraphError, User};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::actor::Actor;
use crate::quota::{must_hold, QuotaLimiter};
use crate::types::{InactivePeriod, Purpose, SessionOptions, Verb};

// ---------------------------------------------------------------------------
// Relationship roles
// ---------------------------------------------------------------------------

/// How a candidate relates to the acting account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipRole {
    /// Follows and is followed by the actor.
    Mutual,
    MyFollower,
    MyFollowing,
    /// The actor blocks the candidate and the candidate blocks back.
    MutualBlocked,
    Others,
}

pub fn role(user: &User) -> RelationshipRole {
    if user.blocking && user.blocked_by {
        RelationshipRole::MutualBlocked
    } else if user.following && user.followed_by {
        RelationshipRole::Mutual
    } else if user.followed_by {
        RelationshipRole::MyFollower
    } else if user.following {
        RelationshipRole::MyFollowing
    } else {
        RelationshipRole::Others
    }
}

/// Map a candidate to the verb the session options ask for.
///
/// Chainblock never returns `Unblock` and never touches a mutual follow.
/// Unchainblock only ever returns `Skip` or `Unblock`. Export always
/// returns `Skip`.
pub fn decide(
    user: &User,
    role: RelationshipRole,
    purpose: Purpose,
    options: &SessionOptions,
) -> Verb {
    let verb = match purpose {
        Purpose::Chainblock => match role {
            RelationshipRole::Mutual => Verb::Skip,
            RelationshipRole::MyFollower => options.my_followers,
            RelationshipRole::MyFollowing => options.my_followings,
            RelationshipRole::MutualBlocked | RelationshipRole::Others => options.others,
        },
        Purpose::Unchainblock => match role {
            RelationshipRole::MutualBlocked => options.mutual_blocked,
            _ if user.blocking => Verb::Unblock,
            _ => Verb::Skip,
        },
        Purpose::Export => Verb::Skip,
    };
    if Verb::allowed_for(purpose).contains(&verb) {
        verb
    } else {
        Verb::Skip
    }
}

/// Twitter's `created_at` layout, e.g. `Wed Oct 10 20:19:24 +0000 2018`.
const TWEET_TIME_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// The account has not tweeted within `period` before `now`.
///
/// An account with no visible last tweet counts as inactive unless it is
/// protected. A timestamp that does not parse counts as active.
pub fn is_inactive(user: &User, period: InactivePeriod, now: DateTime<Utc>) -> bool {
    let Some(days) = period.days() else {
        return false;
    };
    let Some(status) = &user.status else {
        return !user.protected;
    };
    match DateTime::parse_from_str(&status.created_at, TWEET_TIME_FORMAT) {
        Ok(last) => now.signed_duration_since(last) > Duration::days(days),
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

/// A single relationship change against the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutation {
    Block,
    Unblock,
    Mute,
    Unmute,
}

impl Mutation {
    pub fn as_str(self) -> &'static str {
        match self {
            Mutation::Block => "block",
            Mutation::Unblock => "unblock",
            Mutation::Mute => "mute",
            Mutation::Unmute => "unmute",
        }
    }

    /// Block and unblock count against the action quota; mute and unmute
    /// do not.
    pub fn is_metered(self) -> bool {
        matches!(self, Mutation::Block | Mutation::Unblock)
    }

    fn already_applied(self, user: &User) -> bool {
        match self {
            Mutation::Block => user.blocking,
            Mutation::Unblock => !user.blocking,
            Mutation::Mute => user.muting,
            Mutation::Unmute => !user.muting,
        }
    }

    fn from_verb(verb: Verb) -> Option<Mutation> {
        match verb {
            Verb::Skip => None,
            Verb::Mute => Some(Mutation::Mute),
            Verb::Block => Some(Mutation::Block),
            Verb::Unblock => Some(Mutation::Unblock),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The API call went through; carries the updated record.
    Applied(User),
    /// Nothing to do, no request made.
    AlreadyDone(User),
    Skipped,
}

#[derive(Debug, Error)]
pub enum ExecuteError {
    /// No request was made: the quota is used up for this window.
    #[error("action quota exhausted")]
    QuotaExhausted,

    #[error(transparent)]
    Graph(#[from] GraphError),
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Applies verbs through an actor, gated by a shared quota.
#[derive(Debug, Clone)]
pub struct Executor {
    quota: QuotaLimiter,
}

impl Executor {
    pub fn new(quota: QuotaLimiter) -> Self {
        Self { quota }
    }

    pub fn quota(&self) -> &QuotaLimiter {
        &self.quota
    }

    pub async fn apply(
        &self,
        actor: &Actor,
        user: &User,
        verb: Verb,
    ) -> Result<Outcome, ExecuteError> {
        match Mutation::from_verb(verb) {
            None => Ok(Outcome::Skipped),
            Some(mutation) => self.mutate(actor, user, mutation).await,
        }
    }

    pub async fn mutate(
        &self,
        actor: &Actor,
        user: &User,
        mutation: Mutation,
    ) -> Result<Outcome, ExecuteError> {
        if mutation.already_applied(user) {
            debug!(user_id = %user.id_str, action = mutation.as_str(), "already in state");
            return Ok(Outcome::AlreadyDone(user.clone()));
        }
        if mutation.is_metered() && must_hold(&self.quota.status()) {
            return Err(ExecuteError::QuotaExhausted);
        }

        let id = user.id_str.as_str();
        let mut updated = match mutation {
            Mutation::Block => actor.api.block_user(id).await?,
            Mutation::Unblock => actor.api.unblock_user(id).await?,
            Mutation::Mute => actor.api.mute_user(id).await?,
            Mutation::Unmute => actor.api.unmute_user(id).await?,
        };
        // the mutation endpoints do not always echo the new edge
        match mutation {
            Mutation::Block => updated.blocking = true,
            Mutation::Unblock => updated.blocking = false,
            Mutation::Mute => updated.muting = true,
            Mutation::Unmute => updated.muting = false,
        }

        if mutation.is_metered() {
            let status = self.quota.record_mutation();
            debug!(current = status.current, max = status.max, "quota used");
        }
        info!(
            actor = %actor.user.screen_name,
            user_id = %user.id_str,
            screen_name = %user.screen_name,
            action = mutation.as_str(),
            "applied"
        );
        Ok(Outcome::Applied(updated))
    }
}
