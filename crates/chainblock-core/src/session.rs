use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use graph_client::{GraphError, PagingOptions, CURSOR_INITIAL};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::actor::{Actor, ActorPool};
use crate::error::{EngineError, Result};
use crate::executor::{decide, is_inactive, role, ExecuteError, Executor, Outcome};
use crate::materialize::{materialize, CandidateSource, MaterializeContext};
use crate::quota::rate_limit_delay;
use crate::types::{Purpose, SessionRequest, TargetSpec, TargetUser, Verb};

pub type SessionId = Uuid;

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created and validated, waiting for the operator to start it.
    Initializing,
    Running,
    /// Hit a 429; resumes on its own after the backoff.
    RateLimited,
    /// Quota used up; waits for `resume` or a quota reset.
    Paused,
    Completed,
    Stopped,
    Error,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Initializing => "initializing",
            SessionState::Running => "running",
            SessionState::RateLimited => "rate_limited",
            SessionState::Paused => "paused",
            SessionState::Completed => "completed",
            SessionState::Stopped => "stopped",
            SessionState::Error => "error",
        }
    }

    /// The session's task has ended and will not run again unless rewound.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Stopped | SessionState::Error
        )
    }

    /// Suspended in a way only the operator can lift.
    pub fn needs_operator(self) -> bool {
        matches!(self, SessionState::Initializing | SessionState::Paused)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Progress report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// Mutations actually issued.
    pub succeeded: u64,
    pub skipped: u64,
    /// Already in the wanted state, no request made.
    pub already: u64,
    pub failed: u64,
    pub blocked: u64,
    pub muted: u64,
    pub unblocked: u64,
    /// Export sessions: ids collected.
    #[serde(default)]
    pub exported: u64,
}

impl Counters {
    pub fn processed(&self) -> u64 {
        self.succeeded + self.skipped + self.already + self.failed + self.exported
    }

    fn record_applied(&mut self, verb: Verb) {
        self.succeeded += 1;
        match verb {
            Verb::Block => self.blocked += 1,
            Verb::Mute => self.muted += 1,
            Verb::Unblock => self.unblocked += 1,
            Verb::Skip => {}
        }
    }
}

/// Snapshot of one session, as shown to the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub id: SessionId,
    pub purpose: Purpose,
    pub target: String,
    pub state: SessionState,
    pub cursor: String,
    pub counters: Counters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Identity that reads listings, once resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retriever: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionReport {
    pub(crate) fn new(id: SessionId, request: &SessionRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            purpose: request.purpose,
            target: request.target.kind().to_string(),
            state: SessionState::Initializing,
            cursor: CURSOR_INITIAL.to_string(),
            counters: Counters::default(),
            last_error: None,
            retriever: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Back to the state of a fresh, unstarted session.
    pub(crate) fn rewind(&mut self) {
        self.cursor = CURSOR_INITIAL.to_string();
        self.counters = Counters::default();
        self.last_error = None;
        self.retriever = None;
        self.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Reject a request that cannot run, before any network call.
pub fn validate_request(request: &SessionRequest, primary: &Actor) -> Result<()> {
    let options = &request.options;
    let checked: Vec<(&str, Verb)> = match request.purpose {
        Purpose::Chainblock => vec![
            ("my_followers", options.my_followers),
            ("my_followings", options.my_followings),
            ("others", options.others),
        ],
        Purpose::Unchainblock => vec![("mutual_blocked", options.mutual_blocked)],
        Purpose::Export => Vec::new(),
    };
    for (name, verb) in &checked {
        if !Verb::allowed_for(request.purpose).contains(verb) {
            return Err(EngineError::Validation(format!(
                "{name}={verb} is not allowed for {}",
                request.purpose
            )));
        }
    }

    match &request.target {
        TargetSpec::FollowerList { user, .. } => {
            if user.id_str.is_empty() {
                return Err(EngineError::Validation("target user has no id".into()));
            }
            if user.id_str == primary.id() {
                return Err(EngineError::Validation(
                    "cannot target the acting account itself".into(),
                ));
            }
            if user.protected && !user.following {
                return Err(EngineError::Validation(format!(
                    "@{} is protected and not followed",
                    user.screen_name
                )));
            }
        }
        TargetSpec::TweetReaction { tweet_id, .. } if tweet_id.trim().is_empty() => {
            return Err(EngineError::Validation("empty tweet id".into()));
        }
        TargetSpec::TweetReaction { reactions, .. } if reactions.is_empty() => {
            return Err(EngineError::Validation("no reaction selected".into()));
        }
        TargetSpec::ImportedIds { ids } if ids.is_empty() => {
            return Err(EngineError::Validation("imported id set is empty".into()));
        }
        TargetSpec::SearchQuery { query } if query.trim().is_empty() => {
            return Err(EngineError::Validation("empty search query".into()));
        }
        _ => {}
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Everything one session task needs. Built by the controller.
pub(crate) struct SessionRunner {
    pub request: SessionRequest,
    pub primary: Actor,
    pub pool: ActorPool,
    pub executor: Executor,
    pub paging: PagingOptions,
    pub backoff: Duration,
    pub report: Arc<watch::Sender<SessionReport>>,
    pub stop: watch::Receiver<bool>,
    pub resume: Arc<Notify>,
    /// Ids collected by an export session.
    pub exported: Arc<Mutex<Vec<String>>>,
}

/// How a suspension ended.
enum Wake {
    Continue,
    Stop,
}

impl SessionRunner {
    fn id(&self) -> SessionId {
        self.report.borrow().id
    }

    fn update(&self, f: impl FnOnce(&mut SessionReport)) {
        self.report.send_modify(|report| {
            f(report);
            report.updated_at = Utc::now();
        });
    }

    fn set_state(&self, state: SessionState) {
        debug!(session = %self.id(), state = %state, "state change");
        self.update(|r| r.state = state);
    }

    /// A dropped controller counts as a stop.
    fn stop_requested(&self) -> bool {
        *self.stop.borrow() || self.stop.has_changed().is_err()
    }

    pub async fn run(mut self) {
        let id = self.id();
        self.set_state(SessionState::Running);
        let resume_cursor = self.report.borrow().cursor.clone();

        let mut source = match self.prepare(&resume_cursor).await {
            Ok(source) => source,
            Err(err) => {
                error!(session = %id, error = %err, "session setup failed");
                self.update(|r| {
                    r.state = SessionState::Error;
                    r.last_error = Some(err.to_string());
                });
                return;
            }
        };
        let actor = self.primary.clone();
        let mut pending: Option<TargetUser> = None;

        let final_state = loop {
            if self.stop_requested() {
                break SessionState::Stopped;
            }
            let user = match pending.take() {
                Some(user) => user,
                None => match source.next_candidate().await {
                    None => break SessionState::Completed,
                    Some(Ok(user)) => user,
                    Some(Err(err)) => match self.on_listing_error(err, source.cursor()).await {
                        Some(state) => break state,
                        None => continue,
                    },
                },
            };

            if user.id_str == actor.id() || self.leave_alone(&user) {
                self.update(|r| {
                    r.counters.skipped += 1;
                    r.cursor = source.cursor();
                });
                continue;
            }
            if self.request.purpose == Purpose::Export {
                if let Ok(mut ids) = self.exported.lock() {
                    ids.push(user.id_str.clone());
                }
                self.update(|r| {
                    r.counters.exported += 1;
                    r.cursor = source.cursor();
                });
                continue;
            }
            let verb = decide(&user, role(&user), self.request.purpose, &self.request.options);
            match self.executor.apply(&actor, &user, verb).await {
                Ok(outcome) => self.update(|r| {
                    match outcome {
                        Outcome::Applied(_) => r.counters.record_applied(verb),
                        Outcome::AlreadyDone(_) => r.counters.already += 1,
                        Outcome::Skipped => r.counters.skipped += 1,
                    }
                    r.cursor = source.cursor();
                }),
                Err(ExecuteError::QuotaExhausted) => {
                    info!(session = %id, "quota exhausted, pausing");
                    pending = Some(user);
                    self.set_state(SessionState::Paused);
                    if let Wake::Stop = self.suspend(None).await {
                        break SessionState::Stopped;
                    }
                    self.set_state(SessionState::Running);
                }
                Err(ExecuteError::Graph(err)) if err.is_rate_limited() => {
                    pending = Some(user);
                    if let Wake::Stop = self.rate_limited(&err).await {
                        break SessionState::Stopped;
                    }
                }
                Err(ExecuteError::Graph(err)) => {
                    warn!(session = %id, user_id = %user.id_str, error = %err, "mutation failed");
                    self.update(|r| {
                        r.counters.failed += 1;
                        r.last_error = Some(err.to_string());
                        r.cursor = source.cursor();
                    });
                }
            }
        };

        let counters = self.report.borrow().counters.clone();
        info!(
            session = %id,
            state = %final_state,
            succeeded = counters.succeeded,
            skipped = counters.skipped,
            already = counters.already,
            failed = counters.failed,
            exported = counters.exported,
            "session finished"
        );
        self.update(|r| {
            r.state = final_state;
            r.cursor = source.cursor();
        });
    }

    /// Inactive accounts are left out of chainblock and export sessions.
    fn leave_alone(&self, user: &TargetUser) -> bool {
        let period = self.request.options.skip_inactive;
        self.request.purpose != Purpose::Unchainblock && is_inactive(user, period, Utc::now())
    }

    /// Pick the reading identity and build the candidate source.
    async fn prepare(&self, cursor: &str) -> Result<Box<dyn CandidateSource>> {
        let retriever = match &self.request.target {
            TargetSpec::FollowerList { user, .. } => self.pool.resolve(&self.primary, user).await,
            TargetSpec::TweetReaction { tweet_id, .. } => {
                let found = self.pool.resolve_for_tweet(&self.primary, tweet_id).await;
                if found.tweet.is_none() {
                    return Err(EngineError::Validation(format!(
                        "tweet {tweet_id} is not readable by any account"
                    )));
                }
                found.actor
            }
            TargetSpec::ImportedIds { .. } | TargetSpec::SearchQuery { .. } => {
                self.primary.clone()
            }
        };
        let screen_name = retriever.user.screen_name.clone();
        self.update(|r| r.retriever = Some(screen_name));

        let ctx = MaterializeContext {
            retriever,
            executor: self.primary.clone(),
            paging: self.paging.clone(),
            quick_mode: self.request.options.quick_mode,
        };
        materialize(&ctx, &self.request.target, Some(cursor))
    }

    /// Returns the state to end in, or `None` to keep going.
    async fn on_listing_error(
        &mut self,
        err: GraphError,
        cursor: String,
    ) -> Option<SessionState> {
        let id = self.id();
        if err.is_rate_limited() {
            return match self.rate_limited(&err).await {
                Wake::Stop => Some(SessionState::Stopped),
                Wake::Continue => None,
            };
        }
        let fatal = matches!(err, GraphError::RetriesExhausted { .. });
        warn!(session = %id, cursor = %cursor, error = %err, "listing failed");
        self.update(|r| {
            r.counters.failed += 1;
            r.last_error = Some(err.to_string());
        });
        fatal.then_some(SessionState::Error)
    }

    async fn rate_limited(&mut self, err: &GraphError) -> Wake {
        let wait = rate_limit_delay(err, self.backoff, Utc::now().timestamp());
        warn!(session = %self.id(), wait_secs = wait.as_secs(), "rate limited");
        self.update(|r| {
            r.state = SessionState::RateLimited;
            r.last_error = Some(err.to_string());
        });
        let wake = self.suspend(Some(wait)).await;
        if let Wake::Continue = wake {
            self.set_state(SessionState::Running);
        }
        wake
    }

    /// Wait for a resume, the timeout if any, or a stop request.
    async fn suspend(&mut self, timeout: Option<Duration>) -> Wake {
        if self.stop_requested() {
            return Wake::Stop;
        }
        let resume = self.resume.clone();
        let stop = &mut self.stop;
        let sleep = async {
            match timeout {
                Some(wait) => tokio::time::sleep(wait).await,
                None => std::future::pending::<()>().await,
            }
        };
        let stopped = async {
            // a dropped controller can never resume us either
            let _ = stop.wait_for(|stopped| *stopped).await;
        };
        tokio::select! {
            _ = resume.notified() => Wake::Continue,
            _ = sleep => Wake::Continue,
            _ = stopped => Wake::Stop,
        }
    }
}
