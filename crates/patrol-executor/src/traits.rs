use crate::{AnnounceError, Frame, LegOutcome, NavigateRequest, Pose, Result};
use async_trait::async_trait;
use path_compiler::Waypoint;
use tokio_util::sync::CancellationToken;

/// Robot navigation as seen by a patrol.
///
/// Commands run until they resolve or `cancel` fires; a cancelled command
/// should return [`LegOutcome::Cancelled`] promptly.
#[async_trait]
pub trait NavigationService: Send + Sync {
    /// Current robot pose in the world frame.
    async fn current_pose(&self) -> Result<Pose>;

    /// World-frame target for a waypoint expressed relative to `origin`.
    fn compute_target_frame(&self, origin: &Pose, offset: &Waypoint) -> Frame {
        Frame {
            pose: origin.compose(&Pose::from(offset)),
        }
    }

    /// Turn the head toward a target. Runs until cancelled.
    async fn orient_towards(&self, target: Frame, cancel: CancellationToken) -> LegOutcome;

    /// Drive to a target. Resolves with the leg result.
    async fn navigate_towards(
        &self,
        request: NavigateRequest,
        cancel: CancellationToken,
    ) -> LegOutcome;
}

/// Human-facing speech or display channel. Fire-and-forget.
pub trait Announcer: Send + Sync {
    fn announce(&self, text: &str) -> Result<(), AnnounceError>;
}

/// Append-only operator log.
pub trait LogSink: Send + Sync {
    fn log_line(&self, text: &str);
}

/// Announcer that only writes to the tracing output.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAnnouncer;

impl Announcer for TracingAnnouncer {
    fn announce(&self, text: &str) -> Result<(), AnnounceError> {
        tracing::info!(target: "patrol::announce", "{}", text);
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl LogSink for TracingLog {
    fn log_line(&self, text: &str) {
        tracing::info!(target: "patrol::log", "{}", text);
    }
}
