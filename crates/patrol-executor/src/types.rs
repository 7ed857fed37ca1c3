use path_compiler::Waypoint;
use serde::{Deserialize, Serialize};

/// Planar pose: metres and radians.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    /// Apply `offset` as a rigid transform expressed in this pose's frame.
    pub fn compose(&self, offset: &Pose) -> Pose {
        let (sin, cos) = self.theta.sin_cos();
        Pose {
            x: self.x + cos * offset.x - sin * offset.y,
            y: self.y + sin * offset.x + cos * offset.y,
            theta: self.theta + offset.theta,
        }
    }
}

impl From<&Waypoint> for Pose {
    fn from(wp: &Waypoint) -> Self {
        Pose::new(wp.x, wp.y, wp.theta)
    }
}

/// A navigation target in the world frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub pose: Pose,
}

/// Navigate-to command for one leg.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NavigateRequest {
    pub leg: usize,
    pub target: Frame,
    pub max_speed: f64,
    pub avoid_obstacles: bool,
}

/// Result of a navigation-service command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LegOutcome {
    Succeeded,
    Failed(String),
    Cancelled,
}

/// Position within a running patrol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatrolCursor {
    pub index: usize,
    pub retries: u32,
}

impl PatrolCursor {
    /// Move to the next leg; used for both success and skip.
    pub fn advance(&mut self) {
        self.index += 1;
        self.retries = 0;
    }

    /// Count a failed attempt on the current leg and return the new total.
    pub fn record_failure(&mut self) -> u32 {
        self.retries += 1;
        self.retries
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PatrolEvent {
    LegStarted { index: usize, attempt: u32 },
    LegSucceeded { index: usize },
    LegFailed { index: usize, retries: u32, reason: String },
    LegSkipped { index: usize },
    Finished,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum PatrolOutcome {
    Finished,
    Cancelled,
    /// Setup failed before any leg was attempted
    Aborted(String),
}

/// Summary of one patrol run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatrolReport {
    pub route: String,
    pub outcome: PatrolOutcome,
    pub cursor: PatrolCursor,
    pub events: Vec<PatrolEvent>,
}

impl PatrolReport {
    /// Leg indices in the order navigation was attempted, one entry per attempt.
    pub fn attempted_legs(&self) -> Vec<usize> {
        self.events
            .iter()
            .filter_map(|e| match e {
                PatrolEvent::LegStarted { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    pub fn skipped_legs(&self) -> Vec<usize> {
        self.events
            .iter()
            .filter_map(|e| match e {
                PatrolEvent::LegSkipped { index } => Some(*index),
                _ => None,
            })
            .collect()
    }

    pub fn failure_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, PatrolEvent::LegFailed { .. }))
            .count()
    }

    pub fn finished_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, PatrolEvent::Finished))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_compose_identity_origin() {
        let origin = Pose::default();
        let offset = Pose::new(1.5, -2.0, FRAC_PI_2);
        assert_eq!(origin.compose(&offset), offset);
    }

    #[test]
    fn test_compose_rotated_origin() {
        let origin = Pose::new(10.0, 5.0, FRAC_PI_2);
        let target = origin.compose(&Pose::new(2.0, 0.0, 0.0));
        assert!((target.x - 10.0).abs() < 1e-9);
        assert!((target.y - 7.0).abs() < 1e-9);
        assert!((target.theta - FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn test_cursor_advance_resets_retries() {
        let mut cursor = PatrolCursor::default();
        assert_eq!(cursor.record_failure(), 1);
        assert_eq!(cursor.record_failure(), 2);
        cursor.advance();
        assert_eq!(cursor, PatrolCursor { index: 1, retries: 0 });
    }
}
