use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use graph_client::PagingOptions;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::actor::{Actor, ActorPool};
use crate::config::{Config, SessionConfig};
use crate::error::{EngineError, Result};
use crate::executor::Executor;
use crate::quota::QuotaLimiter;
use crate::session::{
    validate_request, SessionId, SessionReport, SessionRunner, SessionState,
};
use crate::types::SessionRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupMode {
    /// Sessions that have finished, stopped or failed.
    Inactive,
    /// Sessions never started within the confirmation timeout.
    NotConfirmed,
    NukeAll,
}

impl CleanupMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CleanupMode::Inactive => "inactive",
            CleanupMode::NotConfirmed => "not-confirmed",
            CleanupMode::NukeAll => "nuke-all",
        }
    }
}

impl fmt::Display for CleanupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CleanupMode {
    type Err = EngineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "inactive" => Ok(CleanupMode::Inactive),
            "not-confirmed" => Ok(CleanupMode::NotConfirmed),
            "nuke-all" => Ok(CleanupMode::NukeAll),
            _ => Err(EngineError::Validation(format!("unknown cleanup mode '{s}'"))),
        }
    }
}

struct SessionEntry {
    request: SessionRequest,
    report: Arc<watch::Sender<SessionReport>>,
    stop: watch::Sender<bool>,
    resume: Arc<Notify>,
    exported: Arc<Mutex<Vec<String>>>,
    task: Option<JoinHandle<()>>,
}

impl SessionEntry {
    fn state(&self) -> SessionState {
        self.report.borrow().state
    }

    fn set_state(&self, state: SessionState) {
        self.report.send_modify(|r| {
            r.state = state;
            r.updated_at = Utc::now();
        });
    }
}

/// Owns every session for one acting account.
///
/// Commands naming an unknown session id do nothing. Each started session
/// runs as its own tokio task; all of them share one quota.
pub struct SessionController {
    primary: Actor,
    pool: ActorPool,
    quota: QuotaLimiter,
    paging: PagingOptions,
    session: SessionConfig,
    sessions: HashMap<SessionId, SessionEntry>,
}

impl SessionController {
    pub fn new(primary: Actor, pool: ActorPool, quota: QuotaLimiter, config: &Config) -> Self {
        Self {
            primary,
            pool,
            quota,
            paging: config.paging_options(),
            session: config.session.clone(),
            sessions: HashMap::new(),
        }
    }

    pub fn primary(&self) -> &Actor {
        &self.primary
    }

    pub fn quota(&self) -> &QuotaLimiter {
        &self.quota
    }

    /// Validate and register a session. It stays `Initializing` until
    /// [`SessionController::start`].
    pub fn create_session(&mut self, request: SessionRequest) -> Result<SessionId> {
        validate_request(&request, &self.primary)?;
        let id = Uuid::new_v4();
        let (report, _) = watch::channel(SessionReport::new(id, &request));
        let (stop, _) = watch::channel(false);
        info!(session = %id, purpose = %request.purpose, target_kind = request.target.kind(), "session created");
        self.sessions.insert(
            id,
            SessionEntry {
                request,
                report: Arc::new(report),
                stop,
                resume: Arc::new(Notify::new()),
                exported: Arc::new(Mutex::new(Vec::new())),
                task: None,
            },
        );
        Ok(id)
    }

    /// Operator confirmation: begin running an `Initializing` session.
    pub fn start(&mut self, id: SessionId) -> Result<()> {
        let Some(entry) = self.sessions.get(&id) else {
            return Ok(());
        };
        let state = entry.state();
        if state != SessionState::Initializing {
            return Err(EngineError::InvalidTransition {
                from: state.to_string(),
                to: SessionState::Running.to_string(),
                reason: "session was already started".into(),
            });
        }
        self.spawn(id);
        Ok(())
    }

    /// Drop a session. A running one is told to stop first.
    pub fn cancel(&mut self, id: SessionId) {
        self.stop(id);
        if self.sessions.remove(&id).is_some() {
            debug!(session = %id, "session cancelled");
        }
    }

    /// Ask a session to stop at its next loop boundary.
    pub fn stop(&mut self, id: SessionId) {
        let Some(entry) = self.sessions.get(&id) else {
            return;
        };
        match entry.state() {
            SessionState::Initializing => entry.set_state(SessionState::Stopped),
            state if state.is_terminal() => {}
            _ => {
                entry.stop.send_replace(true);
                info!(session = %id, "stop requested");
            }
        }
    }

    pub fn stop_all(&mut self) {
        let ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        for id in ids {
            self.stop(id);
        }
    }

    /// Restart a stopped session from the first page with fresh counters.
    pub fn rewind(&mut self, id: SessionId) -> Result<()> {
        let Some(entry) = self.sessions.get_mut(&id) else {
            return Ok(());
        };
        let state = entry.state();
        let still_running = entry.task.as_ref().is_some_and(|t| !t.is_finished());
        if !matches!(state, SessionState::Stopped | SessionState::Error) || still_running {
            return Err(EngineError::InvalidTransition {
                from: state.to_string(),
                to: SessionState::Running.to_string(),
                reason: "only a stopped session can be rewound".into(),
            });
        }
        entry.report.send_modify(SessionReport::rewind);
        entry.stop = watch::channel(false).0;
        entry.resume = Arc::new(Notify::new());
        entry.exported = Arc::new(Mutex::new(Vec::new()));
        info!(session = %id, "session rewound");
        self.spawn(id);
        Ok(())
    }

    /// Wake a paused or rate-limited session now.
    pub fn resume(&mut self, id: SessionId) {
        if let Some(entry) = self.sessions.get(&id) {
            Self::wake(id, entry);
        }
    }

    /// Start a new quota window and wake every session waiting on it.
    pub fn reset_quota(&mut self) {
        self.quota.reset();
        info!(max = self.quota.status().max, "quota reset");
        for (id, entry) in &self.sessions {
            if entry.state() == SessionState::Paused {
                Self::wake(*id, entry);
            }
        }
    }

    fn wake(id: SessionId, entry: &SessionEntry) {
        if matches!(
            entry.state(),
            SessionState::Paused | SessionState::RateLimited
        ) {
            entry.set_state(SessionState::Running);
            entry.resume.notify_one();
            debug!(session = %id, "session resumed");
        }
    }

    /// Snapshots of every session, oldest first.
    pub fn progress(&self) -> Vec<SessionReport> {
        let mut reports: Vec<SessionReport> = self
            .sessions
            .values()
            .map(|e| e.report.borrow().clone())
            .collect();
        reports.sort_by_key(|r| r.created_at);
        reports
    }

    pub fn report(&self, id: SessionId) -> Option<SessionReport> {
        self.sessions.get(&id).map(|e| e.report.borrow().clone())
    }

    /// Ids an export session has collected so far, in listing order.
    pub fn exported_ids(&self, id: SessionId) -> Option<Vec<String>> {
        let entry = self.sessions.get(&id)?;
        let ids = entry.exported.lock().ok()?;
        Some(ids.clone())
    }

    /// Remove sessions matching `mode`. Returns how many were removed.
    pub fn cleanup(&mut self, mode: CleanupMode) -> usize {
        let timeout = Duration::from_secs(self.session.confirm_timeout_secs);
        let now = Utc::now();
        let doomed: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, entry)| {
                let report = entry.report.borrow();
                match mode {
                    CleanupMode::Inactive => report.state.is_terminal(),
                    CleanupMode::NotConfirmed => {
                        report.state == SessionState::Initializing
                            && (now - report.created_at).to_std().unwrap_or_default() >= timeout
                    }
                    CleanupMode::NukeAll => true,
                }
            })
            .map(|(id, _)| *id)
            .collect();
        for id in &doomed {
            self.cancel(*id);
        }
        info!(mode = %mode, removed = doomed.len(), "cleanup");
        doomed.len()
    }

    /// Wait until a session ends or needs the operator (unstarted or paused
    /// on quota), then return its report. Once a stop was requested only the
    /// end counts.
    pub async fn wait(&self, id: SessionId) -> Option<SessionReport> {
        let entry = self.sessions.get(&id)?;
        let stopping = *entry.stop.borrow();
        let mut rx = entry.report.subscribe();
        let settled = rx
            .wait_for(|r| r.state.is_terminal() || (!stopping && r.state.needs_operator()))
            .await
            .ok()
            .map(|r| r.clone());
        settled
    }

    fn spawn(&mut self, id: SessionId) {
        let Some(entry) = self.sessions.get_mut(&id) else {
            return;
        };
        entry.set_state(SessionState::Running);
        let runner = SessionRunner {
            request: entry.request.clone(),
            primary: self.primary.clone(),
            pool: self.pool.clone(),
            executor: Executor::new(self.quota.clone()),
            paging: self.paging.clone(),
            backoff: Duration::from_secs(self.session.rate_limit_backoff_secs),
            report: entry.report.clone(),
            stop: entry.stop.subscribe(),
            resume: entry.resume.clone(),
            exported: entry.exported.clone(),
        };
        info!(session = %id, "session started");
        entry.task = Some(tokio::spawn(runner.run()));
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        for entry in self.sessions.values() {
            entry.stop.send_replace(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::QuotaStatus;
    use crate::testing::{api_fail, rate_limited, user, FakeGraph};
    use crate::types::{FollowList, InactivePeriod, Purpose, SessionOptions, TargetSpec};
    use graph_client::{LastStatus, User};

    fn config() -> Config {
        let mut config = Config::default();
        config.paging.delay_ms = 0;
        config.session.rate_limit_backoff_secs = 0;
        config
    }

    fn controller(graph: &Arc<FakeGraph>, quota: QuotaStatus) -> SessionController {
        let primary = graph.actor();
        SessionController::new(
            primary.clone(),
            ActorPool::new(vec![primary]),
            QuotaLimiter::with_status(quota),
            &config(),
        )
    }

    fn search(query: &str) -> SessionRequest {
        SessionRequest {
            purpose: Purpose::Chainblock,
            target: TargetSpec::SearchQuery {
                query: query.into(),
            },
            options: SessionOptions::default(),
        }
    }

    fn quota(current: u32, max: u32) -> QuotaStatus {
        QuotaStatus { current, max }
    }

    /// Search "spam" finds a stranger, a follower, a mutual, an account
    /// already blocked, and the acting account itself.
    fn seeded_graph() -> Arc<FakeGraph> {
        let graph = FakeGraph::new("1");
        graph.add_users([
            user("10"),
            User {
                followed_by: true,
                ..user("11")
            },
            User {
                following: true,
                followed_by: true,
                ..user("12")
            },
            User {
                blocking: true,
                ..user("13")
            },
            user("1"),
        ]);
        graph.set_search("spam", &["10", "11", "12", "13", "1"]);
        graph
    }

    #[tokio::test]
    async fn session_runs_to_completion() {
        let graph = seeded_graph();
        let mut ctl = controller(&graph, quota(0, 10));
        let id = ctl.create_session(search("spam")).unwrap();
        assert_eq!(ctl.report(id).unwrap().state, SessionState::Initializing);

        ctl.start(id).unwrap();
        let report = ctl.wait(id).await.unwrap();
        assert_eq!(report.state, SessionState::Completed);
        assert_eq!(report.counters.succeeded, 1);
        assert_eq!(report.counters.blocked, 1);
        assert_eq!(report.counters.already, 1);
        assert_eq!(report.counters.skipped, 3);
        assert_eq!(report.cursor, "0");
        assert_eq!(graph.count("block"), 1);
        assert!(graph.get_user("12").is_some_and(|u| !u.blocking));
        assert_eq!(ctl.quota().status().current, 1);
    }

    #[tokio::test]
    async fn exhausted_quota_pauses_until_reset() {
        let graph = seeded_graph();
        let mut ctl = controller(&graph, quota(10, 10));
        let id = ctl.create_session(search("spam")).unwrap();
        ctl.start(id).unwrap();

        let report = ctl.wait(id).await.unwrap();
        assert_eq!(report.state, SessionState::Paused);
        assert_eq!(graph.count("block"), 0);

        ctl.reset_quota();
        let report = ctl.wait(id).await.unwrap();
        assert_eq!(report.state, SessionState::Completed);
        assert_eq!(report.counters.blocked, 1);
        assert_eq!(graph.count("block"), 1);
    }

    #[tokio::test]
    async fn rate_limited_mutation_is_retried() {
        let graph = seeded_graph();
        graph.fail_next("block", rate_limited("/blocks/create.json"));
        let mut ctl = controller(&graph, quota(0, 10));
        let id = ctl.create_session(search("spam")).unwrap();
        ctl.start(id).unwrap();

        let report = ctl.wait(id).await.unwrap();
        assert_eq!(report.state, SessionState::Completed);
        assert_eq!(report.counters.blocked, 1);
        assert_eq!(report.counters.failed, 0);
        assert_eq!(graph.count("block"), 2);
        assert!(report.last_error.unwrap().contains("rate limited"));
    }

    #[tokio::test]
    async fn failed_mutation_is_counted_and_session_continues() {
        let graph = seeded_graph();
        graph.fail_next("block", api_fail("/blocks/create.json", 403));
        let mut ctl = controller(&graph, quota(0, 10));
        let id = ctl.create_session(search("spam")).unwrap();
        ctl.start(id).unwrap();

        let report = ctl.wait(id).await.unwrap();
        assert_eq!(report.state, SessionState::Completed);
        assert_eq!(report.counters.failed, 1);
        assert_eq!(report.counters.succeeded, 0);
        assert_eq!(report.counters.processed(), 5);
    }

    #[tokio::test]
    async fn exhausted_retries_end_in_error() {
        let graph = seeded_graph();
        graph.fail_next("search", api_fail("/users/search.json", 500));
        let primary = graph.actor();
        let mut config = config();
        config.paging.max_retries = Some(0);
        let mut ctl = SessionController::new(
            primary.clone(),
            ActorPool::new(vec![primary]),
            QuotaLimiter::new(10),
            &config,
        );
        let id = ctl.create_session(search("spam")).unwrap();
        ctl.start(id).unwrap();

        let report = ctl.wait(id).await.unwrap();
        assert_eq!(report.state, SessionState::Error);
        assert!(report.last_error.unwrap().contains("gave up"));
    }

    #[tokio::test]
    async fn skipping_the_actor_advances_the_cursor() {
        let graph = FakeGraph::new("1");
        graph.add_users([user("10"), user("1"), user("11")]);
        graph.set_search("spam", &["10", "1", "11"]);
        let mut ctl = controller(&graph, quota(0, 1));
        let id = ctl.create_session(search("spam")).unwrap();
        ctl.start(id).unwrap();

        // "11" on the second page waits for quota
        let report = ctl.wait(id).await.unwrap();
        assert_eq!(report.state, SessionState::Paused);
        assert_eq!(report.counters.blocked, 1);
        assert_eq!(report.counters.skipped, 1);
        assert_eq!(report.cursor, "2");
    }

    #[tokio::test]
    async fn export_collects_ids_without_mutating() {
        let graph = seeded_graph();
        let mut ctl = controller(&graph, quota(0, 10));
        let mut request = search("spam");
        request.purpose = Purpose::Export;
        let id = ctl.create_session(request).unwrap();
        assert_eq!(ctl.exported_ids(id), Some(Vec::new()));
        ctl.start(id).unwrap();

        let report = ctl.wait(id).await.unwrap();
        assert_eq!(report.state, SessionState::Completed);
        assert_eq!(report.counters.exported, 4);
        assert_eq!(report.counters.skipped, 1);
        assert_eq!(report.counters.succeeded, 0);
        assert_eq!(
            ctl.exported_ids(id).unwrap(),
            vec!["10", "11", "12", "13"]
        );
        assert!(graph
            .calls()
            .iter()
            .all(|c| c.starts_with("search:") || c.starts_with("verify:")));
        assert_eq!(ctl.quota().status().current, 0);
    }

    #[tokio::test]
    async fn inactive_accounts_are_skipped() {
        let graph = FakeGraph::new("1");
        let tweeted = |id: &str, at: String| User {
            status: Some(LastStatus { created_at: at }),
            ..user(id)
        };
        let recent = (Utc::now() - chrono::Duration::days(10))
            .format("%a %b %d %H:%M:%S %z %Y")
            .to_string();
        graph.add_users([
            tweeted("20", recent),
            tweeted("21", "Wed Oct 10 20:19:24 +0000 2018".into()),
            user("22"),
        ]);
        graph.set_search("q", &["20", "21", "22"]);
        let mut ctl = controller(&graph, quota(0, 10));
        let mut request = search("q");
        request.options.skip_inactive = InactivePeriod::OneYear;
        let id = ctl.create_session(request).unwrap();
        ctl.start(id).unwrap();

        let report = ctl.wait(id).await.unwrap();
        assert_eq!(report.state, SessionState::Completed);
        assert_eq!(report.counters.blocked, 1);
        assert_eq!(report.counters.skipped, 2);
        assert!(graph.get_user("20").is_some_and(|u| u.blocking));
        assert!(graph.get_user("21").is_some_and(|u| !u.blocking));
    }

    #[tokio::test]
    async fn stop_then_rewind_restarts_from_scratch() {
        let graph = seeded_graph();
        let mut ctl = controller(&graph, quota(10, 10));
        let id = ctl.create_session(search("spam")).unwrap();
        ctl.start(id).unwrap();
        assert_eq!(ctl.wait(id).await.unwrap().state, SessionState::Paused);

        ctl.stop(id);
        let report = ctl.wait(id).await.unwrap();
        assert_eq!(report.state, SessionState::Stopped);
        // a stopped session is terminal
        assert!(ctl.start(id).is_err());

        ctl.quota().reset();
        // the task may still be unwinding right after the state flips
        while ctl.rewind(id).is_err() {
            tokio::task::yield_now().await;
        }
        let report = ctl.wait(id).await.unwrap();
        assert_eq!(report.state, SessionState::Completed);
        assert_eq!(report.counters.blocked, 1);
        assert_eq!(report.counters.processed(), 5);
    }

    #[tokio::test]
    async fn rewind_refuses_live_sessions() {
        let graph = seeded_graph();
        let mut ctl = controller(&graph, quota(0, 10));
        let id = ctl.create_session(search("spam")).unwrap();
        assert!(matches!(
            ctl.rewind(id),
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_ids_are_no_ops() {
        let graph = seeded_graph();
        let mut ctl = controller(&graph, quota(0, 10));
        let ghost = Uuid::new_v4();
        ctl.start(ghost).unwrap();
        ctl.stop(ghost);
        ctl.cancel(ghost);
        ctl.resume(ghost);
        ctl.rewind(ghost).unwrap();
        assert!(ctl.wait(ghost).await.is_none());
        assert!(ctl.progress().is_empty());
    }

    #[tokio::test]
    async fn invalid_request_creates_nothing() {
        let graph = seeded_graph();
        let mut ctl = controller(&graph, quota(0, 10));
        let err = ctl
            .create_session(SessionRequest {
                purpose: Purpose::Chainblock,
                target: TargetSpec::ImportedIds { ids: Vec::new() },
                options: SessionOptions::default(),
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(ctl.progress().is_empty());
        assert!(graph.calls().is_empty());
    }

    #[tokio::test]
    async fn cleanup_modes() {
        let graph = seeded_graph();
        let mut config = config();
        config.session.confirm_timeout_secs = 0;
        let primary = graph.actor();
        let mut ctl = SessionController::new(
            primary.clone(),
            ActorPool::new(vec![primary]),
            QuotaLimiter::new(10),
            &config,
        );
        let done = ctl.create_session(search("spam")).unwrap();
        ctl.start(done).unwrap();
        ctl.wait(done).await.unwrap();
        let unconfirmed = ctl.create_session(search("spam")).unwrap();
        let _other = ctl.create_session(search("spam")).unwrap();

        assert_eq!(ctl.cleanup(CleanupMode::Inactive), 1);
        assert!(ctl.report(done).is_none());
        assert_eq!(ctl.cleanup(CleanupMode::NotConfirmed), 2);
        assert!(ctl.report(unconfirmed).is_none());

        ctl.create_session(search("spam")).unwrap();
        assert_eq!(ctl.cleanup(CleanupMode::NukeAll), 1);
        assert!(ctl.progress().is_empty());
    }

    #[tokio::test]
    async fn blocked_target_is_listed_through_another_actor() {
        let primary = FakeGraph::new("1");
        let alt = FakeGraph::new("2");
        let target = User {
            blocked_by: true,
            ..user("100")
        };
        alt.add_user(user("100"));
        alt.set_followers("100", &["10"]);
        primary.add_user(user("10"));
        let mut ctl = SessionController::new(
            primary.actor(),
            ActorPool::new(vec![primary.actor(), alt.actor()]),
            QuotaLimiter::new(10),
            &config(),
        );
        let id = ctl
            .create_session(SessionRequest {
                purpose: Purpose::Chainblock,
                target: TargetSpec::FollowerList {
                    user: target,
                    list: FollowList::Followers,
                },
                options: SessionOptions::default(),
            })
            .unwrap();
        ctl.start(id).unwrap();

        let report = ctl.wait(id).await.unwrap();
        assert_eq!(report.state, SessionState::Completed);
        assert_eq!(report.retriever.as_deref(), Some("user2"));
        assert_eq!(alt.count("follow_ids"), 1);
        assert_eq!(primary.count("lookup"), 1);
        assert_eq!(primary.count("block"), 1);
        assert_eq!(alt.count("block"), 0);
    }

    #[test]
    fn cleanup_mode_parses_kebab_case() {
        assert_eq!(
            "not-confirmed".parse::<CleanupMode>().unwrap(),
            CleanupMode::NotConfirmed
        );
        assert!("everything".parse::<CleanupMode>().is_err());
    }
}
