//! Coordinated recovery from expired tokens.
//!
//! When several in-flight calls learn at about the same time that the access
//! token has expired, only one refresh call may run. [`RefreshCoordinator`]
//! owns that decision:
//!
//! ```text
//!            first expired response             refresh settles
//!   Idle ─────────────────────────▶ Refreshing ─────────────────▶ Replaying
//!    ▲                                  │  ▲                          │
//!    │                                  │  └── later callers enqueue ─┤
//!    └──────────── queue drained ───────┴─────────────────────────────┘
//! ```
//!
//! - The first caller to observe an expired token while the coordinator is
//!   idle becomes the leader and starts the refresh. It is not queued.
//! - Every caller that arrives while a refresh or replay is underway is
//!   queued and resumes, in arrival order, once the refresh settles.
//! - On success the token store is updated before any waiter resumes.
//! - On failure the store is cleared, the notifier is told the session
//!   expired, and every waiter receives the same failure.
//!
//! The refresh runs on a spawned task, so dropping the leader's future does
//! not strand the queue. Waiters whose callers went away are skipped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::ClientError;
use crate::auth::{TokenRefresher, TokenStore};
use crate::notify::Notifier;

/// The coordinator's state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing,
    Replaying,
}

type Outcome = Result<String, ClientError>;

struct RefreshState {
    phase: RefreshPhase,
    waiters: VecDeque<oneshot::Sender<Outcome>>,
    /// Bumped on every successful refresh.
    generation: u64,
}

enum Role {
    Leader,
    Waiter(oneshot::Receiver<Outcome>),
    AlreadyRefreshed,
}

/// Deduplicates concurrent token refreshes and replays queued callers.
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    refresher: Arc<dyn TokenRefresher>,
    tokens: Arc<dyn TokenStore>,
    notifier: Arc<dyn Notifier>,
    refresh_count: AtomicU64,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("phase", &self.phase())
            .field("waiting", &self.waiting())
            .field("refresh_count", &self.refresh_count())
            .finish_non_exhaustive()
    }
}

impl RefreshCoordinator {
    pub fn new(
        refresher: Arc<dyn TokenRefresher>,
        tokens: Arc<dyn TokenStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            state: Mutex::new(RefreshState {
                phase: RefreshPhase::Idle,
                waiters: VecDeque::new(),
                generation: 0,
            }),
            refresher,
            tokens,
            notifier,
            refresh_count: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> RefreshPhase {
        self.lock().phase
    }

    /// Number of queued waiters.
    pub fn waiting(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Number of refresh calls issued so far.
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::SeqCst)
    }

    /// The token generation. Callers record it before sending a request and
    /// pass it to [`recover`](Self::recover) if that request comes back
    /// expired.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Recover from an expired token, returning the new access token.
    ///
    /// `observed_generation` is the [`generation`](Self::generation) seen
    /// when the failed request was sent. If a refresh has completed since,
    /// the current token is returned without refreshing again.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AuthExpired`] if the refresh fails.
    pub async fn recover(
        self: &Arc<Self>,
        observed_generation: u64,
    ) -> Result<String, ClientError> {
        let role = {
            let mut state = self.lock();
            match state.phase {
                RefreshPhase::Idle if state.generation != observed_generation => {
                    Role::AlreadyRefreshed
                }
                RefreshPhase::Idle => {
                    state.phase = RefreshPhase::Refreshing;
                    Role::Leader
                }
                RefreshPhase::Refreshing | RefreshPhase::Replaying => {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push_back(tx);
                    Role::Waiter(rx)
                }
            }
        };

        match role {
            Role::AlreadyRefreshed => self
                .tokens
                .access_token()
                .ok_or_else(|| ClientError::auth_expired("no access token after refresh")),
            Role::Waiter(rx) => rx
                .await
                .unwrap_or_else(|_| Err(ClientError::auth_expired("token refresh was abandoned"))),
            Role::Leader => {
                let this = Arc::clone(self);
                let handle = tokio::spawn(async move { this.run_refresh().await });
                match handle.await {
                    Ok(outcome) => outcome,
                    Err(join_error) => {
                        let err = ClientError::auth_expired(format!(
                            "token refresh task failed: {join_error}"
                        ));
                        self.settle(Err(err.clone()));
                        Err(err)
                    }
                }
            }
        }
    }

    async fn run_refresh(&self) -> Outcome {
        #[cfg(feature = "tracing")]
        tracing::debug!(phase = ?RefreshPhase::Refreshing, "token refresh started");

        self.refresh_count.fetch_add(1, Ordering::SeqCst);
        let outcome = match self.refresher.refresh(self.tokens.refresh_token()).await {
            Ok(pair) => {
                let token = pair.access_token.clone();
                self.tokens.set_tokens(pair);
                Ok(token)
            }
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %err, "token refresh failed");

                self.tokens.clear();
                let message = format!("token refresh failed: {}", err.message());
                self.notifier.session_expired(&message);
                Err(ClientError::auth_expired(message))
            }
        };

        self.settle(outcome.clone());
        outcome
    }

    /// Hand `outcome` to every waiter in FIFO order, then return to idle.
    ///
    /// Waiters that enqueue while the queue is being drained receive the same
    /// outcome.
    fn settle(&self, outcome: Outcome) {
        let mut first_pass = true;
        loop {
            let waiters = {
                let mut state = self.lock();
                if first_pass && outcome.is_ok() {
                    state.generation += 1;
                }
                first_pass = false;
                if state.waiters.is_empty() {
                    state.phase = RefreshPhase::Idle;
                    #[cfg(feature = "tracing")]
                    tracing::debug!(phase = ?RefreshPhase::Idle, "token refresh settled");
                    return;
                }
                state.phase = RefreshPhase::Replaying;
                std::mem::take(&mut state.waiters)
            };

            #[cfg(feature = "tracing")]
            tracing::debug!(
                phase = ?RefreshPhase::Replaying,
                waiters = waiters.len(),
                "resuming queued requests"
            );

            for waiter in waiters {
                let _ = waiter.send(outcome.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryTokenStore, RefreshFn, TokenPair};
    use crate::notify::TracingNotifier;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingNotifier {
        expired: AtomicUsize,
    }

    impl Notifier for CountingNotifier {
        fn error_modal(&self, _title: &str, _message: &str) {}
        fn error_message(&self, _message: &str) {}
        fn success_message(&self, _message: &str, _blocking: bool) {}
        fn session_expired(&self, _message: &str) {
            self.expired.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn gated_refresher(
        gate: Arc<tokio::sync::Notify>,
        result: Result<&'static str, &'static str>,
    ) -> Arc<dyn TokenRefresher> {
        Arc::new(RefreshFn::new(move |_refresh_token: Option<String>| {
            let gate = gate.clone();
            async move {
                gate.notified().await;
                result
                    .map(TokenPair::new)
                    .map_err(|msg| ClientError::http_status(http::StatusCode::BAD_REQUEST, msg))
            }
        }))
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_waiters_resume_in_fifo_order() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let tokens = Arc::new(MemoryTokenStore::with_tokens(TokenPair::new("stale")));
        let coordinator = Arc::new(RefreshCoordinator::new(
            gated_refresher(gate.clone(), Ok("fresh")),
            tokens.clone(),
            Arc::new(TracingNotifier),
        ));

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut tasks = Vec::new();
        for tag in 0..5u32 {
            let coordinator = coordinator.clone();
            let order = order.clone();
            tasks.push(tokio::spawn(async move {
                let token = coordinator.recover(0).await.unwrap();
                order.lock().unwrap().push(tag);
                token
            }));
        }

        while coordinator.waiting() < 4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(coordinator.phase(), RefreshPhase::Refreshing);
        gate.notify_one();

        for task in tasks {
            assert_eq!(task.await.unwrap(), "fresh");
        }

        let waiters: Vec<u32> = order
            .lock()
            .unwrap()
            .iter()
            .copied()
            .filter(|tag| *tag != 0)
            .collect();
        assert_eq!(waiters, vec![1, 2, 3, 4]);
        assert_eq!(coordinator.refresh_count(), 1);
        assert_eq!(coordinator.phase(), RefreshPhase::Idle);
        assert_eq!(coordinator.waiting(), 0);
        assert_eq!(tokens.access_token().as_deref(), Some("fresh"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_failure_rejects_every_waiter() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let tokens = Arc::new(MemoryTokenStore::with_tokens(
            TokenPair::new("stale").with_refresh_token("r"),
        ));
        let notifier = Arc::new(CountingNotifier::default());
        let coordinator = Arc::new(RefreshCoordinator::new(
            gated_refresher(gate.clone(), Err("refresh token revoked")),
            tokens.clone(),
            notifier.clone(),
        ));

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.recover(0).await })
            })
            .collect();

        while coordinator.waiting() < 2 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();

        let mut messages = Vec::new();
        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert_eq!(err.kind(), dualfetch_core::FailureKind::AuthExpired);
            messages.push(err.message());
        }
        assert!(messages.iter().all(|m| m == &messages[0]));
        assert!(messages[0].contains("refresh token revoked"));

        assert_eq!(notifier.expired.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.refresh_count(), 1);
        assert!(tokens.access_token().is_none());
        assert!(tokens.refresh_token().is_none());
        assert_eq!(coordinator.phase(), RefreshPhase::Idle);
        assert_eq!(coordinator.generation(), 0);
    }

    #[tokio::test]
    async fn test_stale_generation_skips_refresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let tokens = Arc::new(MemoryTokenStore::new());
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::new(RefreshFn::new(move |_refresh_token: Option<String>| {
                let n = counted.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, ClientError>(TokenPair::new(format!("t{}", n + 1))) }
            })),
            tokens,
            Arc::new(TracingNotifier),
        ));

        assert_eq!(coordinator.recover(0).await.unwrap(), "t1");
        assert_eq!(coordinator.generation(), 1);

        // A request sent before the refresh finished reuses the new token.
        assert_eq!(coordinator.recover(0).await.unwrap(), "t1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A request sent after it starts a new cycle.
        assert_eq!(coordinator.recover(1).await.unwrap(), "t2");
        assert_eq!(coordinator.refresh_count(), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_dropped_waiter_does_not_block_others() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let coordinator = Arc::new(RefreshCoordinator::new(
            gated_refresher(gate.clone(), Ok("fresh")),
            Arc::new(MemoryTokenStore::new()),
            Arc::new(TracingNotifier),
        ));

        let leader = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.recover(0).await })
        };
        let abandoned = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.recover(0).await })
        };
        let kept = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.recover(0).await })
        };

        while coordinator.waiting() < 2 {
            tokio::task::yield_now().await;
        }
        abandoned.abort();
        gate.notify_one();

        assert_eq!(leader.await.unwrap().unwrap(), "fresh");
        assert_eq!(kept.await.unwrap().unwrap(), "fresh");
        assert_eq!(coordinator.phase(), RefreshPhase::Idle);
    }

    #[tokio::test]
    async fn test_cancelled_leader_still_settles_queue() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let coordinator = Arc::new(RefreshCoordinator::new(
            gated_refresher(gate.clone(), Ok("fresh")),
            Arc::new(MemoryTokenStore::new()),
            Arc::new(TracingNotifier),
        ));

        let leader = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.recover(0).await })
        };
        while coordinator.phase() != RefreshPhase::Refreshing {
            tokio::task::yield_now().await;
        }
        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.recover(0).await })
        };
        while coordinator.waiting() < 1 {
            tokio::task::yield_now().await;
        }

        leader.abort();
        gate.notify_one();

        let token = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(token, "fresh");
    }
}
