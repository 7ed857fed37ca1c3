//! Scripted collaborators for tests and dry runs.

use crate::{
    AnnounceError, Announcer, Frame, LegOutcome, LogSink, NavigateRequest, NavigationService,
    PatrolError, Pose, Result,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Behaviour of one leg in a [`ScriptedNavigation`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegScript {
    /// Fail this many attempts, then succeed
    FailTimes(u32),
    AlwaysFail,
    /// Never resolve until cancelled
    Hang,
}

/// In-process navigation backend. Legs succeed unless scripted otherwise.
pub struct ScriptedNavigation {
    origin: Pose,
    pose_error: Option<String>,
    travel_time: Duration,
    legs: Mutex<HashMap<usize, LegScript>>,
    navigate_calls: Mutex<Vec<NavigateRequest>>,
    orient_calls: Mutex<Vec<Frame>>,
    orient_cancellations: Mutex<usize>,
}

impl Default for ScriptedNavigation {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedNavigation {
    pub fn new() -> Self {
        Self {
            origin: Pose::default(),
            pose_error: None,
            travel_time: Duration::from_millis(100),
            legs: Mutex::new(HashMap::new()),
            navigate_calls: Mutex::new(Vec::new()),
            orient_calls: Mutex::new(Vec::new()),
            orient_cancellations: Mutex::new(0),
        }
    }

    pub fn with_origin(mut self, origin: Pose) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_travel_time(mut self, travel_time: Duration) -> Self {
        self.travel_time = travel_time;
        self
    }

    /// Make `current_pose` fail, as when localization is lost.
    pub fn with_pose_error(mut self, message: &str) -> Self {
        self.pose_error = Some(message.to_string());
        self
    }

    pub fn script_leg(self, leg: usize, script: LegScript) -> Self {
        self.legs.lock().insert(leg, script);
        self
    }

    pub fn navigate_calls(&self) -> Vec<NavigateRequest> {
        self.navigate_calls.lock().clone()
    }

    pub fn navigated_legs(&self) -> Vec<usize> {
        self.navigate_calls.lock().iter().map(|r| r.leg).collect()
    }

    pub fn orient_calls(&self) -> usize {
        self.orient_calls.lock().len()
    }

    pub fn orient_cancellations(&self) -> usize {
        *self.orient_cancellations.lock()
    }

    /// Consume one attempt of the leg's script.
    fn next_result(&self, leg: usize) -> Option<LegOutcome> {
        let mut legs = self.legs.lock();
        match legs.get_mut(&leg) {
            None | Some(LegScript::FailTimes(0)) => Some(LegOutcome::Succeeded),
            Some(LegScript::FailTimes(n)) => {
                *n -= 1;
                Some(LegOutcome::Failed("obstacle detected".to_string()))
            }
            Some(LegScript::AlwaysFail) => {
                Some(LegOutcome::Failed("obstacle detected".to_string()))
            }
            Some(LegScript::Hang) => None,
        }
    }
}

#[async_trait]
impl NavigationService for ScriptedNavigation {
    async fn current_pose(&self) -> Result<Pose> {
        match &self.pose_error {
            Some(message) => Err(PatrolError::Navigation(message.clone())),
            None => Ok(self.origin),
        }
    }

    async fn orient_towards(&self, target: Frame, cancel: CancellationToken) -> LegOutcome {
        self.orient_calls.lock().push(target);
        cancel.cancelled().await;
        *self.orient_cancellations.lock() += 1;
        LegOutcome::Cancelled
    }

    async fn navigate_towards(
        &self,
        request: NavigateRequest,
        cancel: CancellationToken,
    ) -> LegOutcome {
        self.navigate_calls.lock().push(request);
        let result = self.next_result(request.leg);

        tokio::select! {
            _ = cancel.cancelled() => return LegOutcome::Cancelled,
            _ = tokio::time::sleep(self.travel_time) => {}
        }

        match result {
            Some(outcome) => outcome,
            None => {
                cancel.cancelled().await;
                LegOutcome::Cancelled
            }
        }
    }
}

/// Records announcements; optionally fails every call.
#[derive(Default)]
pub struct RecordingAnnouncer {
    lines: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingAnnouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn count(&self, text: &str) -> usize {
        self.lines.lock().iter().filter(|l| l.as_str() == text).count()
    }
}

impl Announcer for RecordingAnnouncer {
    fn announce(&self, text: &str) -> Result<(), AnnounceError> {
        self.lines.lock().push(text.to_string());
        if self.fail {
            return Err(AnnounceError::Unavailable("speaker offline".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingLog {
    lines: Mutex<Vec<String>>,
}

impl RecordingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl LogSink for RecordingLog {
    fn log_line(&self, text: &str) {
        tracing::debug!("log: {}", text);
        self.lines.lock().push(text.to_string());
    }
}
