use graph_client::{FollowKind, ReactionKind, User};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EngineError;

/// A user record whose relationship flags are relative to one actor.
pub type TargetUser = User;

// ---------------------------------------------------------------------------
// Purpose
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    /// Block or mute the derived target set.
    Chainblock,
    /// Undo earlier blocks across the derived target set.
    Unchainblock,
    /// Collect the target set's ids without changing any relationship.
    Export,
}

impl Purpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Purpose::Chainblock => "chainblock",
            Purpose::Unchainblock => "unchainblock",
            Purpose::Export => "export",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Purpose {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chainblock" => Ok(Purpose::Chainblock),
            "unchainblock" => Ok(Purpose::Unchainblock),
            "export" => Ok(Purpose::Export),
            _ => Err(EngineError::Validation(format!("unknown purpose '{s}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Verb
// ---------------------------------------------------------------------------

/// What to do with one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    Skip,
    Mute,
    Block,
    #[serde(alias = "UnBlock")]
    Unblock,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Skip => "skip",
            Verb::Mute => "mute",
            Verb::Block => "block",
            Verb::Unblock => "unblock",
        }
    }

    /// Verbs an operator may configure for the given purpose.
    pub fn allowed_for(purpose: Purpose) -> &'static [Verb] {
        match purpose {
            Purpose::Chainblock => &[Verb::Skip, Verb::Mute, Verb::Block],
            Purpose::Unchainblock => &[Verb::Skip, Verb::Unblock],
            Purpose::Export => &[Verb::Skip],
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Verb {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Verb::Skip),
            "mute" => Ok(Verb::Mute),
            "block" => Ok(Verb::Block),
            "unblock" => Ok(Verb::Unblock),
            _ => Err(EngineError::Validation(format!("unknown verb '{s}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// TargetSpec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowList {
    Followers,
    Followings,
    /// Users who both follow and are followed by the target.
    MutualFollowers,
}

impl FollowList {
    /// The single listing endpoint behind this list, if there is one.
    pub fn follow_kind(self) -> Option<FollowKind> {
        match self {
            FollowList::Followers => Some(FollowKind::Followers),
            FollowList::Followings => Some(FollowKind::Friends),
            FollowList::MutualFollowers => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reaction {
    Retweeted,
    Liked,
    /// Accounts mentioned in the tweet text.
    Mentioned,
}

impl Reaction {
    pub fn reaction_kind(self) -> Option<ReactionKind> {
        match self {
            Reaction::Retweeted => Some(ReactionKind::Retweeted),
            Reaction::Liked => Some(ReactionKind::Liked),
            Reaction::Mentioned => None,
        }
    }
}

/// Where the candidates of a session come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetSpec {
    FollowerList { user: User, list: FollowList },
    /// Users who reacted to one tweet in any of `reactions`, each once.
    TweetReaction {
        tweet_id: String,
        reactions: Vec<Reaction>,
    },
    ImportedIds { ids: Vec<String> },
    SearchQuery { query: String },
}

impl TargetSpec {
    /// Users who reacted to `tweet_id` in one way.
    pub fn tweet_reaction(tweet_id: impl Into<String>, reaction: Reaction) -> Self {
        TargetSpec::TweetReaction {
            tweet_id: tweet_id.into(),
            reactions: vec![reaction],
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TargetSpec::FollowerList { .. } => "follower_list",
            TargetSpec::TweetReaction { .. } => "tweet_reaction",
            TargetSpec::ImportedIds { .. } => "imported_ids",
            TargetSpec::SearchQuery { .. } => "search_query",
        }
    }
}

// ---------------------------------------------------------------------------
// InactivePeriod
// ---------------------------------------------------------------------------

/// How long without a tweet makes an account count as inactive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InactivePeriod {
    #[default]
    #[serde(rename = "never")]
    Never,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "2y")]
    TwoYears,
    #[serde(rename = "3y")]
    ThreeYears,
}

impl InactivePeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            InactivePeriod::Never => "never",
            InactivePeriod::OneYear => "1y",
            InactivePeriod::TwoYears => "2y",
            InactivePeriod::ThreeYears => "3y",
        }
    }

    /// `None` for [`InactivePeriod::Never`].
    pub fn days(self) -> Option<i64> {
        match self {
            InactivePeriod::Never => None,
            InactivePeriod::OneYear => Some(365),
            InactivePeriod::TwoYears => Some(2 * 365),
            InactivePeriod::ThreeYears => Some(3 * 365),
        }
    }
}

impl fmt::Display for InactivePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InactivePeriod {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(InactivePeriod::Never),
            "1y" => Ok(InactivePeriod::OneYear),
            "2y" => Ok(InactivePeriod::TwoYears),
            "3y" => Ok(InactivePeriod::ThreeYears),
            _ => Err(EngineError::Validation(format!("unknown inactive period '{s}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionOptions / SessionRequest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Candidates who follow the acting account.
    #[serde(default = "default_skip")]
    pub my_followers: Verb,
    /// Candidates the acting account follows.
    #[serde(default = "default_skip")]
    pub my_followings: Verb,
    /// Candidates with no follow relationship to the acting account.
    #[serde(default = "default_block")]
    pub others: Verb,
    /// Unchainblock only: pairs that block each other.
    #[serde(default = "default_skip")]
    pub mutual_blocked: Verb,
    /// Read full user pages instead of ids + lookup where possible.
    #[serde(default)]
    pub quick_mode: bool,
    /// Leave accounts alone that have not tweeted for this long.
    /// Chainblock and export only.
    #[serde(default)]
    pub skip_inactive: InactivePeriod,
}

fn default_skip() -> Verb {
    Verb::Skip
}

fn default_block() -> Verb {
    Verb::Block
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            my_followers: default_skip(),
            my_followings: default_skip(),
            others: default_block(),
            mutual_blocked: default_skip(),
            quick_mode: false,
            skip_inactive: InactivePeriod::Never,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub purpose: Purpose,
    pub target: TargetSpec,
    #[serde(default)]
    pub options: SessionOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verb_parses_case_insensitively() {
        assert_eq!("Block".parse::<Verb>().unwrap(), Verb::Block);
        assert_eq!("unblock".parse::<Verb>().unwrap(), Verb::Unblock);
        assert!("nuke".parse::<Verb>().is_err());
    }

    #[test]
    fn verb_deserializes_legacy_unblock_spelling() {
        let v: Verb = serde_json::from_str(r#""UnBlock""#).unwrap();
        assert_eq!(v, Verb::Unblock);
    }

    #[test]
    fn allowed_verbs_depend_on_purpose() {
        assert!(!Verb::allowed_for(Purpose::Chainblock).contains(&Verb::Unblock));
        assert!(!Verb::allowed_for(Purpose::Unchainblock).contains(&Verb::Block));
    }

    #[test]
    fn request_defaults_options() {
        let json = r#"{"purpose":"chainblock","target":{"type":"search_query","query":"spam"}}"#;
        let req: SessionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.options, SessionOptions::default());
        assert_eq!(req.target.kind(), "search_query");
    }

    #[test]
    fn export_purpose_round_trips() {
        assert_eq!("export".parse::<Purpose>().unwrap(), Purpose::Export);
        assert_eq!(Verb::allowed_for(Purpose::Export), &[Verb::Skip]);
        let json = serde_json::to_string(&Purpose::Export).unwrap();
        assert_eq!(json, r#""export""#);
    }

    #[test]
    fn inactive_period_parses_short_names() {
        assert_eq!("2y".parse::<InactivePeriod>().unwrap(), InactivePeriod::TwoYears);
        assert!("5y".parse::<InactivePeriod>().is_err());
        assert_eq!(InactivePeriod::Never.days(), None);
        let json = r#"{"skip_inactive":"1y"}"#;
        let options: SessionOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.skip_inactive, InactivePeriod::OneYear);
        assert_eq!(options.others, Verb::Block);
    }

    #[test]
    fn tweet_reaction_target_lists_reactions() {
        let json = r#"{"type":"tweet_reaction","tweet_id":"5","reactions":["liked","mentioned"]}"#;
        let target: TargetSpec = serde_json::from_str(json).unwrap();
        assert_eq!(
            target,
            TargetSpec::TweetReaction {
                tweet_id: "5".into(),
                reactions: vec![Reaction::Liked, Reaction::Mentioned],
            }
        );
    }

    #[test]
    fn mutual_followers_has_no_single_endpoint() {
        assert!(FollowList::MutualFollowers.follow_kind().is_none());
        assert_eq!(FollowList::Followings.follow_kind(), Some(FollowKind::Friends));
    }
}
