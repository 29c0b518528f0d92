// Background start/stop/restart of a service: guarded, retried, time-boxed and panic-safe.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::RuntimeError;
use crate::guard::{OperationGuard, ServiceLease};
use crate::retry::{RetryConfig, RetryError, with_retry};
use crate::runtime::{ContainerRuntime, Project, ServiceOp};

pub const LIFECYCLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Another lifecycle operation already holds the service.
#[derive(Debug, Error)]
#[error("an operation is already in progress for service '{service}'")]
pub struct Busy {
    pub service: String,
}

#[derive(Debug)]
pub enum LifecycleOutcome {
    Succeeded,
    Failed(RuntimeError),
    /// The operation's own time budget ran out.
    TimedOut(Duration),
    /// The parent was canceled before the operation started.
    Aborted,
    Panicked(String),
}

impl LifecycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LifecycleOutcome::Succeeded)
    }
}

impl fmt::Display for LifecycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleOutcome::Succeeded => f.write_str("succeeded"),
            LifecycleOutcome::Failed(e) => write!(f, "failed: {e}"),
            LifecycleOutcome::TimedOut(d) => write!(f, "timed out after {}s", d.as_secs()),
            LifecycleOutcome::Aborted => f.write_str("aborted: request canceled"),
            LifecycleOutcome::Panicked(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

#[derive(Clone)]
pub struct LifecycleRunner {
    runtime: Arc<dyn ContainerRuntime>,
    guard: Arc<dyn OperationGuard>,
    project: Project,
    retry: RetryConfig,
    timeout: Duration,
    parent: CancellationToken,
}

impl LifecycleRunner {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        guard: Arc<dyn OperationGuard>,
        project: Project,
    ) -> Self {
        Self {
            runtime,
            guard,
            project,
            retry: RetryConfig::default(),
            timeout: LIFECYCLE_TIMEOUT,
            parent: CancellationToken::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Token of the request that triggers operations. Only checked before
    /// an operation starts; a running operation is bounded by its own timeout.
    pub fn with_parent(mut self, parent: CancellationToken) -> Self {
        self.parent = parent;
        self
    }

    /// Claims the service and runs `op` in a background task. Fails fast with
    /// [`Busy`] when the service is already being operated on.
    pub fn spawn(
        &self,
        service: &str,
        op: ServiceOp,
    ) -> Result<JoinHandle<LifecycleOutcome>, Busy> {
        let lease = ServiceLease::acquire(self.guard.clone(), service).ok_or_else(|| Busy {
            service: service.to_string(),
        })?;
        let runner = self.clone();
        Ok(tokio::spawn(async move {
            let outcome = runner.execute(lease.service(), op).await;
            drop(lease);
            outcome
        }))
    }

    /// [`spawn`](Self::spawn) and wait for the outcome.
    pub async fn run(&self, service: &str, op: ServiceOp) -> Result<LifecycleOutcome, Busy> {
        let handle = self.spawn(service, op)?;
        Ok(handle.await.unwrap_or_else(|e| {
            if e.is_cancelled() {
                LifecycleOutcome::Aborted
            } else {
                LifecycleOutcome::Panicked(e.to_string())
            }
        }))
    }

    async fn execute(&self, service: &str, op: ServiceOp) -> LifecycleOutcome {
        if self.parent.is_cancelled() {
            info!(service, %op, "parent canceled, not starting");
            return LifecycleOutcome::Aborted;
        }

        let deadline = Instant::now() + self.timeout;
        let call = with_retry(deadline, &self.retry, || {
            self.runtime.apply(&self.project, service, op)
        });

        let outcome = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(())) => LifecycleOutcome::Succeeded,
            Ok(Err(RetryError::Canceled { .. })) => LifecycleOutcome::TimedOut(self.timeout),
            Ok(Err(RetryError::NonRecoverable(e) | RetryError::Exhausted { source: e, .. })) => {
                LifecycleOutcome::Failed(e)
            }
            Err(payload) => LifecycleOutcome::Panicked(panic_message(payload.as_ref())),
        };

        match &outcome {
            LifecycleOutcome::Succeeded => info!(service, %op, "lifecycle operation succeeded"),
            LifecycleOutcome::Panicked(msg) => {
                error!(service, %op, panic = %msg, "lifecycle operation panicked")
            }
            other => warn!(service, %op, outcome = %other, "lifecycle operation did not succeed"),
        }
        outcome
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
