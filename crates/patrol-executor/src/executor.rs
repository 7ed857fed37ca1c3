use crate::routes::Announcements;
use crate::{
    Announcer, CommandHandle, ExecutorConfig, Frame, LegOutcome, LogSink, NavigateRequest,
    NavigationService, PatrolCursor, PatrolEvent, PatrolMetrics, PatrolOutcome, PatrolReport,
    Pose,
};
use path_compiler::Waypoint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Legs that may be abandoned after repeated failures.
///
/// Legs outside the set are retried until they succeed or the patrol is
/// stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkipPolicy {
    legs: BTreeSet<usize>,
}

impl SkipPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn legs(legs: impl IntoIterator<Item = usize>) -> Self {
        Self {
            legs: legs.into_iter().collect(),
        }
    }

    pub fn allows(&self, index: usize) -> bool {
        self.legs.contains(&index)
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.legs.iter().copied()
    }
}

/// A compiled route ready to run.
#[derive(Debug, Clone)]
pub struct PatrolPlan {
    pub route: String,
    pub waypoints: Vec<Waypoint>,
    pub skippable: SkipPolicy,
    pub announcements: Announcements,
    /// Prefix of per-leg log lines, e.g. "Step" or "Expo Step"
    pub step_prefix: String,
}

/// Runs one patrol at a time against the navigation service.
pub struct PatrolExecutor {
    nav: Arc<dyn NavigationService>,
    announcer: Arc<dyn Announcer>,
    log: Arc<dyn LogSink>,
    config: ExecutorConfig,
    metrics: Option<PatrolMetrics>,
}

/// State owned by a single run.
struct PatrolRun<'a> {
    plan: &'a PatrolPlan,
    origin: Pose,
    cursor: PatrolCursor,
    events: Vec<PatrolEvent>,
}

impl PatrolRun<'_> {
    fn report(self, outcome: PatrolOutcome) -> PatrolReport {
        PatrolReport {
            route: self.plan.route.clone(),
            outcome,
            cursor: self.cursor,
            events: self.events,
        }
    }
}

impl PatrolExecutor {
    pub fn new(
        nav: Arc<dyn NavigationService>,
        announcer: Arc<dyn Announcer>,
        log: Arc<dyn LogSink>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            nav,
            announcer,
            log,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: PatrolMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Full patrol start: capture the origin, announce, count down, run.
    ///
    /// `stop` may fire at any point, including before the origin is captured.
    pub async fn launch(&self, plan: &PatrolPlan, stop: &CancellationToken) -> PatrolReport {
        let origin = tokio::select! {
            biased;
            _ = stop.cancelled() => return self.stopped(PatrolRun::new(plan, Pose::default())),
            pose = self.nav.current_pose() => pose,
        };
        let origin = match origin {
            Ok(pose) => pose,
            Err(e) => {
                warn!("Could not capture patrol origin for {}: {}", plan.route, e);
                self.log_line(&format!("System: {} patrol aborted: {}", plan.route, e));
                return PatrolRun::new(plan, Pose::default())
                    .report(PatrolOutcome::Aborted(e.to_string()));
            }
        };
        debug!(
            "Origin for {} captured at ({:.2}, {:.2}, {:.2})",
            plan.route, origin.x, origin.y, origin.theta
        );

        self.log_line(&format!(
            "System: {} patrol in {}s...",
            plan.route,
            self.config.start_delay().as_secs_f32()
        ));
        self.announce(&plan.announcements.start);

        tokio::select! {
            biased;
            _ = stop.cancelled() => return self.stopped(PatrolRun::new(plan, origin)),
            _ = tokio::time::sleep(self.config.start_delay()) => {}
        }

        self.run(plan, origin, stop).await
    }

    /// Drive through `plan` with every waypoint interpreted relative to `origin`.
    ///
    /// Returns when the last leg is resolved or `stop` fires. No navigate
    /// command is issued once `stop` has been observed.
    pub async fn run(
        &self,
        plan: &PatrolPlan,
        origin: Pose,
        stop: &CancellationToken,
    ) -> PatrolReport {
        let mut run = PatrolRun::new(plan, origin);
        let total = plan.waypoints.len();
        info!("Patrol {} started with {} legs", plan.route, total);

        // Target of the current leg, reused across retries
        let mut target: Option<Frame> = None;
        let mut attempt: u32 = 0;

        loop {
            if stop.is_cancelled() {
                return self.stopped(run);
            }

            let index = run.cursor.index;
            let Some(waypoint) = plan.waypoints.get(index) else {
                return self.finished(run);
            };

            let frame = *target
                .get_or_insert_with(|| self.nav.compute_target_frame(&run.origin, waypoint));
            attempt += 1;

            self.log_line(&format!("{} {}: {}", plan.step_prefix, index + 1, waypoint));
            run.events.push(PatrolEvent::LegStarted { index, attempt });
            if let Some(m) = &self.metrics {
                m.current_leg.set(index as i64);
            }

            let Some(outcome) = self.drive_leg(index, frame, stop).await else {
                return self.stopped(run);
            };

            let reason = match outcome {
                LegOutcome::Succeeded => {
                    debug!("Leg {} of {} reached", index + 1, total);
                    run.cursor.advance();
                    run.events.push(PatrolEvent::LegSucceeded { index });
                    if let Some(m) = &self.metrics {
                        m.legs_completed.inc();
                    }
                    target = None;
                    attempt = 0;
                    continue;
                }
                LegOutcome::Failed(reason) => reason,
                // Cancelled by the service itself, not by a stop request
                LegOutcome::Cancelled => "navigation cancelled".to_string(),
            };

            self.on_failure(&mut run, index, reason);
            if self.should_skip(&run, index) {
                self.skip(&mut run, index);
                target = None;
                attempt = 0;
                continue;
            }

            // Retry the same target after settling
            tokio::select! {
                biased;
                _ = stop.cancelled() => return self.stopped(run),
                _ = tokio::time::sleep(self.config.settle_delay()) => {}
            }
        }
    }

    /// Issue orient + navigate for one leg and wait for navigation.
    ///
    /// `None` means `stop` fired first; both commands have been cancelled.
    async fn drive_leg(
        &self,
        index: usize,
        frame: Frame,
        stop: &CancellationToken,
    ) -> Option<LegOutcome> {
        let nav = Arc::clone(&self.nav);
        let orient = CommandHandle::spawn("orient", stop, move |cancel| async move {
            nav.orient_towards(frame, cancel).await
        });

        let request = NavigateRequest {
            leg: index,
            target: frame,
            max_speed: self.config.max_speed,
            avoid_obstacles: true,
        };
        let nav = Arc::clone(&self.nav);
        let mut navigate = CommandHandle::spawn("navigate", stop, move |cancel| async move {
            nav.navigate_towards(request, cancel).await
        });

        let outcome = tokio::select! {
            biased;
            _ = stop.cancelled() => None,
            outcome = navigate.wait() => Some(outcome),
        };

        // Orientation is best-effort and never awaited
        orient.cancel();
        navigate.cancel();
        outcome
    }

    fn on_failure(&self, run: &mut PatrolRun<'_>, index: usize, reason: String) {
        let retries = run.cursor.record_failure();
        warn!("Leg {} blocked ({}), retry #{}", index + 1, reason, retries);
        self.log_line(&format!("Blocked! Retry #{retries}"));
        run.events.push(PatrolEvent::LegFailed {
            index,
            retries,
            reason,
        });
        if let Some(m) = &self.metrics {
            m.leg_failures.inc();
        }
    }

    fn should_skip(&self, run: &PatrolRun<'_>, index: usize) -> bool {
        run.cursor.retries >= self.config.skip_after_retries && run.plan.skippable.allows(index)
    }

    fn skip(&self, run: &mut PatrolRun<'_>, index: usize) {
        info!("Skipping leg {} of {}", index + 1, run.plan.route);
        self.log_line("Skipping step.");
        self.announce(&run.plan.announcements.skip);
        run.cursor.advance();
        run.events.push(PatrolEvent::LegSkipped { index });
        if let Some(m) = &self.metrics {
            m.legs_skipped.inc();
        }
    }

    fn finished(&self, mut run: PatrolRun<'_>) -> PatrolReport {
        info!("Patrol {} finished", run.plan.route);
        self.announce(&run.plan.announcements.finished);
        self.log_line("Patrol Complete.");
        run.events.push(PatrolEvent::Finished);
        if let Some(m) = &self.metrics {
            m.patrols_finished.inc();
        }
        run.report(PatrolOutcome::Finished)
    }

    fn stopped(&self, mut run: PatrolRun<'_>) -> PatrolReport {
        info!(
            "Patrol {} stopped at leg {}",
            run.plan.route,
            run.cursor.index + 1
        );
        self.log_line("Patrol stopped.");
        run.events.push(PatrolEvent::Cancelled);
        if let Some(m) = &self.metrics {
            m.patrols_cancelled.inc();
        }
        run.report(PatrolOutcome::Cancelled)
    }

    fn announce(&self, text: &str) {
        if let Err(e) = self.announcer.announce(text) {
            warn!("Announcement '{}' failed: {}", text, e);
        }
    }

    fn log_line(&self, text: &str) {
        self.log.log_line(text);
    }
}

impl<'a> PatrolRun<'a> {
    fn new(plan: &'a PatrolPlan, origin: Pose) -> Self {
        Self {
            plan,
            origin,
            cursor: PatrolCursor::default(),
            events: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{LegScript, RecordingAnnouncer, RecordingLog, ScriptedNavigation};
    use crate::{Route, RouteBook};
    use std::time::Duration;

    struct Harness {
        nav: Arc<ScriptedNavigation>,
        announcer: Arc<RecordingAnnouncer>,
        log: Arc<RecordingLog>,
        executor: Arc<PatrolExecutor>,
    }

    fn harness(nav: ScriptedNavigation) -> Harness {
        harness_with(nav, RecordingAnnouncer::new())
    }

    fn harness_with(nav: ScriptedNavigation, announcer: RecordingAnnouncer) -> Harness {
        let nav = Arc::new(nav);
        let announcer = Arc::new(announcer);
        let log = Arc::new(RecordingLog::new());
        let executor = PatrolExecutor::new(
            nav.clone(),
            announcer.clone(),
            log.clone(),
            ExecutorConfig::default(),
        );
        Harness {
            nav,
            announcer,
            log,
            executor: Arc::new(executor),
        }
    }

    fn plan(route: Route) -> PatrolPlan {
        RouteBook::builtin().plan(route).unwrap()
    }

    /// Every repeat visit of a leg must follow a recorded failure of that leg.
    fn assert_orderly(report: &PatrolReport) {
        let mut last_started: Option<usize> = None;
        let mut failed_since = false;
        for event in &report.events {
            match event {
                PatrolEvent::LegStarted { index, .. } => {
                    if let Some(prev) = last_started {
                        assert!(*index >= prev, "cursor went back from {prev} to {index}");
                        assert!(*index <= prev + 1, "cursor jumped from {prev} to {index}");
                        if *index == prev {
                            assert!(failed_since, "leg {index} repeated without a failure");
                        }
                    }
                    last_started = Some(*index);
                    failed_since = false;
                }
                PatrolEvent::LegFailed { .. } => failed_since = true,
                _ => {}
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_corridor_runs_to_completion() {
        let h = harness(ScriptedNavigation::new());
        let stop = CancellationToken::new();
        let report = h.executor.run(&plan(Route::Corridor), Pose::default(), &stop).await;

        assert_eq!(report.outcome, PatrolOutcome::Finished);
        assert_eq!(report.cursor, PatrolCursor { index: 19, retries: 0 });
        assert_eq!(report.attempted_legs(), (0..19).collect::<Vec<_>>());
        assert_eq!(report.finished_count(), 1);
        assert_eq!(h.announcer.count("Patrol finished."), 1);
        assert_orderly(&report);

        let calls = h.nav.navigate_calls();
        assert_eq!(calls.len(), 19);
        assert!(calls.iter().all(|c| c.max_speed == 0.35 && c.avoid_obstacles));
        let corridor = plan(Route::Corridor);
        for (i, call) in calls.iter().enumerate() {
            assert_eq!(call.leg, i);
            assert_eq!(call.target.pose, Pose::from(&corridor.waypoints[i]));
        }
        assert_eq!(h.nav.orient_calls(), 19);

        let log = h.log.lines();
        assert_eq!(log.first().map(String::as_str), Some("Step 1: Forward -> (1.36, 0.00)"));
        assert_eq!(log.last().map(String::as_str), Some("Patrol Complete."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skippable_leg_skipped_after_three_failures() {
        let h = harness(ScriptedNavigation::new().script_leg(4, LegScript::AlwaysFail));
        let stop = CancellationToken::new();
        let report = h.executor.run(&plan(Route::Corridor), Pose::default(), &stop).await;

        assert_eq!(report.outcome, PatrolOutcome::Finished);
        assert_eq!(report.skipped_legs(), vec![4]);
        assert_eq!(report.failure_count(), 3);
        assert_eq!(
            h.nav.navigated_legs().iter().filter(|&&l| l == 4).count(),
            3
        );
        assert_eq!(h.announcer.count("Skipping."), 1);
        assert!(h.log.lines().iter().any(|l| l == "Blocked! Retry #3"));
        assert!(h.log.lines().iter().any(|l| l == "Skipping step."));
        assert_orderly(&report);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_failures_then_success_resets_retries() {
        let h = harness(ScriptedNavigation::new().script_leg(4, LegScript::FailTimes(2)));
        let stop = CancellationToken::new();
        let report = h.executor.run(&plan(Route::Corridor), Pose::default(), &stop).await;

        assert_eq!(report.outcome, PatrolOutcome::Finished);
        assert!(report.skipped_legs().is_empty());
        let retries: Vec<u32> = report
            .events
            .iter()
            .filter_map(|e| match e {
                PatrolEvent::LegFailed { index: 4, retries, .. } => Some(*retries),
                _ => None,
            })
            .collect();
        assert_eq!(retries, vec![1, 2]);
        assert!(report
            .events
            .contains(&PatrolEvent::LegSucceeded { index: 4 }));
        assert_eq!(report.cursor.retries, 0);
        assert_eq!(h.announcer.count("Skipping."), 0);
        assert_orderly(&report);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_reuses_target_and_waits_settle_delay() {
        let origin = Pose::new(10.0, 5.0, std::f64::consts::FRAC_PI_2);
        let h = harness(
            ScriptedNavigation::new()
                .with_origin(origin)
                .script_leg(0, LegScript::FailTimes(1)),
        );
        let stop = CancellationToken::new();
        let started = tokio::time::Instant::now();
        let report = h.executor.run(&plan(Route::Expo), origin, &stop).await;
        assert_eq!(report.outcome, PatrolOutcome::Finished);

        let calls = h.nav.navigate_calls();
        assert_eq!(calls[0].leg, 0);
        assert_eq!(calls[1].leg, 0);
        assert_eq!(calls[0].target, calls[1].target);

        // First expo leg is 11.25 m straight ahead of a robot facing +y
        let target = calls[0].target.pose;
        assert!((target.x - 10.0).abs() < 1e-9);
        assert!((target.y - 16.25).abs() < 1e-9);

        // 8 navigate attempts of 100 ms plus one 500 ms settle
        assert!(started.elapsed() >= Duration::from_millis(1300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unskippable_leg_blocks_until_stopped() {
        let h = harness(ScriptedNavigation::new().script_leg(2, LegScript::AlwaysFail));
        let stop = CancellationToken::new();
        let executor = h.executor.clone();
        let task_stop = stop.clone();
        let task = tokio::spawn(async move {
            executor
                .run(&plan(Route::Expo), Pose::default(), &task_stop)
                .await
        });

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!task.is_finished());
        let attempts_on_2 = h.nav.navigated_legs().iter().filter(|&&l| l == 2).count();
        assert!(attempts_on_2 > 10, "only {attempts_on_2} attempts");
        assert!(h.nav.navigated_legs().iter().all(|&l| l <= 2));

        stop.cancel();
        let report = task.await.unwrap();
        assert_eq!(report.outcome, PatrolOutcome::Cancelled);
        assert_eq!(report.cursor.index, 2);
        assert!(report.skipped_legs().is_empty());
        assert_eq!(h.announcer.count("Expo Patrol finished."), 0);
        assert_orderly(&report);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leg_outside_allow_list_never_skipped() {
        // Corridor skips legs 4, 5, 11 and 12 only
        let h = harness(ScriptedNavigation::new().script_leg(6, LegScript::AlwaysFail));
        let stop = CancellationToken::new();
        let executor = h.executor.clone();
        let task_stop = stop.clone();
        let task = tokio::spawn(async move {
            executor
                .run(&plan(Route::Corridor), Pose::default(), &task_stop)
                .await
        });

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!task.is_finished());
        let legs = h.nav.navigated_legs();
        let attempts_on_6 = legs.iter().filter(|&&l| l == 6).count();
        assert!(attempts_on_6 > 3, "only {attempts_on_6} attempts");
        assert!(!legs.contains(&7));

        stop.cancel();
        let report = task.await.unwrap();
        assert_eq!(report.outcome, PatrolOutcome::Cancelled);
        assert_eq!(report.cursor.index, 6);
        assert!(report.skipped_legs().is_empty());
        assert!(!report
            .events
            .iter()
            .any(|e| matches!(e, PatrolEvent::LegSkipped { .. })));
        assert_eq!(h.announcer.count("Skipping."), 0);
        assert_orderly(&report);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_mid_leg_issues_no_further_legs() {
        let h = harness(ScriptedNavigation::new().script_leg(1, LegScript::Hang));
        let stop = CancellationToken::new();
        let executor = h.executor.clone();
        let task_stop = stop.clone();
        let task = tokio::spawn(async move {
            executor
                .run(&plan(Route::Corridor), Pose::default(), &task_stop)
                .await
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        stop.cancel();
        let report = task.await.unwrap();

        assert_eq!(report.outcome, PatrolOutcome::Cancelled);
        assert_eq!(report.events.last(), Some(&PatrolEvent::Cancelled));
        // Let the best-effort orientation cancels land
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.nav.navigated_legs(), vec![0, 1]);
        assert_eq!(h.nav.orient_cancellations(), h.nav.orient_calls());
        assert_eq!(h.log.lines().last().map(String::as_str), Some("Patrol stopped."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_before_run_issues_nothing() {
        let h = harness(ScriptedNavigation::new());
        let stop = CancellationToken::new();
        stop.cancel();
        let report = h.executor.run(&plan(Route::Corridor), Pose::default(), &stop).await;
        assert_eq!(report.outcome, PatrolOutcome::Cancelled);
        assert!(h.nav.navigate_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_announcements_do_not_escalate() {
        let h = harness_with(
            ScriptedNavigation::new().script_leg(4, LegScript::AlwaysFail),
            RecordingAnnouncer::failing(),
        );
        let stop = CancellationToken::new();
        let report = h.executor.run(&plan(Route::Corridor), Pose::default(), &stop).await;
        assert_eq!(report.outcome, PatrolOutcome::Finished);
        assert_eq!(h.announcer.count("Skipping."), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_plan_finishes_immediately() {
        let h = harness(ScriptedNavigation::new());
        let mut empty = plan(Route::Expo);
        empty.waypoints.clear();
        let report = h
            .executor
            .run(&empty, Pose::default(), &CancellationToken::new())
            .await;
        assert_eq!(report.outcome, PatrolOutcome::Finished);
        assert!(h.nav.navigate_calls().is_empty());
        assert_eq!(h.announcer.count("Expo Patrol finished."), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_announces_and_counts_down() {
        let h = harness(ScriptedNavigation::new());
        let stop = CancellationToken::new();
        let started = tokio::time::Instant::now();
        let report = h.executor.launch(&plan(Route::Expo), &stop).await;

        assert_eq!(report.outcome, PatrolOutcome::Finished);
        assert!(started.elapsed() >= Duration::from_millis(3000 + 7 * 100));
        assert_eq!(
            h.announcer.lines(),
            vec![
                "Starting Expo patrol in 3 seconds.".to_string(),
                "Expo Patrol finished.".to_string()
            ]
        );
        assert!(h.log.lines().iter().any(|l| l.starts_with("Expo Step 7: ")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_aborts_without_origin() {
        let h = harness(ScriptedNavigation::new().with_pose_error("localization lost"));
        let report = h
            .executor
            .launch(&plan(Route::Corridor), &CancellationToken::new())
            .await;
        assert!(matches!(report.outcome, PatrolOutcome::Aborted(_)));
        assert!(h.nav.navigate_calls().is_empty());
        assert!(h.announcer.lines().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_track_progress() {
        let metrics = PatrolMetrics::new().unwrap();
        let nav = Arc::new(ScriptedNavigation::new().script_leg(5, LegScript::AlwaysFail));
        let executor = PatrolExecutor::new(
            nav,
            Arc::new(RecordingAnnouncer::new()),
            Arc::new(RecordingLog::new()),
            ExecutorConfig::default(),
        )
        .with_metrics(metrics.clone());

        let report = executor
            .run(&plan(Route::Corridor), Pose::default(), &CancellationToken::new())
            .await;
        assert_eq!(report.outcome, PatrolOutcome::Finished);
        assert_eq!(metrics.legs_completed.get(), 18);
        assert_eq!(metrics.legs_skipped.get(), 1);
        assert_eq!(metrics.leg_failures.get(), 3);
        assert_eq!(metrics.patrols_finished.get(), 1);
        assert_eq!(metrics.current_leg.get(), 18);
    }
}
