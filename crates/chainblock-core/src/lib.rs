//! `chainblock-core`: the chain-block session engine.
//!
//! A session turns a [`TargetSpec`] into candidates
//! ([`materialize`]), decides a [`Verb`] for each one from its relationship
//! to the acting account ([`executor`]), applies it under a shared
//! [`QuotaLimiter`], and reports progress through [`SessionController`].
//!
//! ```text
//! SessionController ── one tokio task per session
//!     │
//!     ├── ActorPool::resolve      pick a reader the target does not block
//!     ├── materialize             ids → hydrated users, in order
//!     └── Executor::apply         skip / mute / block / unblock
//!             └── QuotaLimiter    shared by every session of the account
//! ```

pub mod actor;
pub mod blocklist;
pub mod config;
pub mod controller;
pub mod error;
pub mod executor;
pub mod io;
pub mod materialize;
pub mod quota;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;

pub use actor::{Actor, ActorPool, TweetResolution};
pub use blocklist::Blocklist;
pub use config::{ActorProfile, Config, ConfigWarning, WarnLevel};
pub use controller::{CleanupMode, SessionController};
pub use error::{EngineError, Result};
pub use executor::{
    decide, is_inactive, role, ExecuteError, Executor, Mutation, Outcome, RelationshipRole,
};
pub use materialize::{materialize, CandidateSource, MaterializeContext};
pub use quota::{can_mutate, must_hold, QuotaLimiter, QuotaStatus};
pub use session::{validate_request, Counters, SessionId, SessionReport, SessionState};
pub use types::{
    FollowList, InactivePeriod, Purpose, Reaction, SessionOptions, SessionRequest, TargetSpec,
    TargetUser, Verb,
};
