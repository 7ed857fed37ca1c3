//! patrol-executor: drives a robot through a compiled waypoint route
//!
//! This crate provides:
//! - Narrow traits for the navigation, announcement and log services a patrol consumes
//! - A sequential executor with retry-then-skip handling of blocked legs
//! - Route configuration (built-in corridor and expo routes, YAML overrides)
//! - A mode controller exposing `start_patrol` / `stop_patrol`
//! - Prometheus counters for patrol progress
//!
//! The default `mock` feature adds scripted collaborators so flows are testable
//! without a robot.

mod types;
pub use types::{
    Frame, LegOutcome, NavigateRequest, PatrolCursor, PatrolEvent, PatrolOutcome, PatrolReport,
    Pose,
};

mod error;
pub use error::{AnnounceError, PatrolError, Result};

mod config;
pub use config::ExecutorConfig;

mod traits;
pub use traits::{Announcer, LogSink, NavigationService, TracingAnnouncer, TracingLog};

mod handle;
pub use handle::CommandHandle;

mod executor;
pub use executor::{PatrolExecutor, PatrolPlan, SkipPolicy};

pub mod routes;
pub use routes::{Announcements, Route, RouteBook, RouteConfig};

mod controller;
pub use controller::PatrolController;

mod metrics;
pub use metrics::PatrolMetrics;

#[cfg(feature = "mock")]
pub mod mock;

pub use path_compiler::{CompileError, Direction, Instruction, Waypoint};
