//! Retry loop with per-kind recovery actions.

use futures_util::future::{self, BoxFuture};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::failure::{Classify, FailureKind};
use crate::policy::RetryPolicy;

/// Action run between attempts: receives the failure and the zero-based
/// index of the attempt that failed.
type RecoveryFn<E> = Arc<dyn Fn(&E, u32) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Matcher {
    Kind(FailureKind),
    Any,
}

impl Matcher {
    fn matches(self, kind: FailureKind) -> bool {
        match self {
            Matcher::Kind(k) => k == kind,
            Matcher::Any => true,
        }
    }
}

struct RecoveryEntry<E> {
    matcher: Matcher,
    action: RecoveryFn<E>,
}

/// Executes fallible operations under a [`RetryPolicy`].
///
/// Recovery actions are consulted in registration order; the first whose
/// kind matches the failure runs. The failure of the last attempt is
/// returned to the caller as is.
pub struct RecoveryManager<E> {
    recoveries: Vec<RecoveryEntry<E>>,
}

impl<E> Default for RecoveryManager<E> {
    fn default() -> Self {
        Self {
            recoveries: Vec::new(),
        }
    }
}

impl<E> std::fmt::Debug for RecoveryManager<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryManager")
            .field(
                "recoveries",
                &self.recoveries.iter().map(|r| r.matcher).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<E> RecoveryManager<E>
where
    E: Classify + Display + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronous recovery action for one failure kind.
    pub fn register_recovery<F>(&mut self, kind: FailureKind, action: F)
    where
        F: Fn(&E, u32) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.push(Matcher::Kind(kind), sync_action(action));
    }

    /// Register an asynchronous recovery action for one failure kind.
    ///
    /// The action receives its own copy of the failure.
    pub fn register_async_recovery<F, Fut>(&mut self, kind: FailureKind, action: F)
    where
        E: Clone,
        F: Fn(E, u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.push(Matcher::Kind(kind), async_action(action));
    }

    /// Register a synchronous action that matches every failure kind.
    pub fn register_fallback_recovery<F>(&mut self, action: F)
    where
        F: Fn(&E, u32) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.push(Matcher::Any, sync_action(action));
    }

    /// Number of registered recovery actions.
    pub fn recovery_count(&self) -> usize {
        self.recoveries.len()
    }

    fn push(&mut self, matcher: Matcher, action: RecoveryFn<E>) {
        debug!(matcher = ?matcher, "Registered recovery action");
        self.recoveries.push(RecoveryEntry { matcher, action });
    }

    /// Run an asynchronous operation, retrying per `policy`.
    pub async fn execute_with_recovery<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let total = policy.total_attempts();
        let mut attempt: u32 = 0;

        loop {
            let err = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(attempt = attempt + 1, total, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let kind = Classify::kind(&err);
            warn!(
                attempt = attempt + 1,
                total,
                kind = %kind,
                error = %err,
                "Attempt failed"
            );

            if attempt >= policy.max_attempts() {
                error!(attempts = total, kind = %kind, error = %err, "All retries exhausted");
                return Err(err);
            }

            self.run_recovery(&err, kind, attempt).await;

            let delay = policy.delay(attempt);
            if !delay.is_zero() {
                info!(
                    delay_ms = delay.as_millis() as u64,
                    next_attempt = attempt + 2,
                    total,
                    "Retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }

            attempt += 1;
        }
    }

    /// Run a synchronous operation, retrying per `policy`.
    ///
    /// Backoff sleeps still yield to the runtime.
    pub async fn execute_sync_with_recovery<T, F>(
        &self,
        policy: &RetryPolicy,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
    {
        self.execute_with_recovery(policy, || future::ready(operation()))
            .await
    }

    async fn run_recovery(&self, err: &E, kind: FailureKind, attempt: u32) {
        let Some(entry) = self.recoveries.iter().find(|r| r.matcher.matches(kind)) else {
            return;
        };

        match (entry.action)(err, attempt).await {
            Ok(()) => debug!(kind = %kind, attempt, "Recovery action completed"),
            Err(recovery_err) => error!(
                kind = %kind,
                attempt,
                error = %recovery_err,
                "Recovery action failed"
            ),
        }
    }
}

fn sync_action<E, F>(action: F) -> RecoveryFn<E>
where
    E: 'static,
    F: Fn(&E, u32) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(move |err: &E, attempt: u32| -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(future::ready(action(err, attempt)))
    })
}

fn async_action<E, F, Fut>(action: F) -> RecoveryFn<E>
where
    E: Clone + 'static,
    F: Fn(E, u32) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |err: &E, attempt: u32| -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(action(err.clone(), attempt))
    })
}
