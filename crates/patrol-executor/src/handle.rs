use crate::LegOutcome;
use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A navigation command running on its own task.
///
/// Cancelling is non-blocking; the command observes its token and winds
/// down on its own schedule.
pub struct CommandHandle {
    name: &'static str,
    cancel: CancellationToken,
    task: JoinHandle<LegOutcome>,
}

impl CommandHandle {
    /// Spawn `command` with a token that is cancelled together with `parent`.
    pub fn spawn<F, Fut>(name: &'static str, parent: &CancellationToken, command: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = LegOutcome> + Send + 'static,
    {
        let cancel = parent.child_token();
        let task = tokio::spawn(command(cancel.clone()));
        Self { name, cancel, task }
    }

    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!("Cancelling {} command", self.name);
            self.cancel.cancel();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the command result. Safe to use inside `select!`.
    pub async fn wait(&mut self) -> LegOutcome {
        match (&mut self.task).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => LegOutcome::Cancelled,
            Err(e) => LegOutcome::Failed(format!("{} command task failed: {}", self.name, e)),
        }
    }
}
