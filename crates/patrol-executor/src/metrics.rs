use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct PatrolMetrics {
    pub registry: Registry,
    pub legs_completed: IntCounter,
    pub leg_failures: IntCounter,
    pub legs_skipped: IntCounter,
    pub patrols_finished: IntCounter,
    pub patrols_cancelled: IntCounter,
    pub current_leg: IntGauge,
}

impl PatrolMetrics {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let counter = |name: &str, help: &str| {
            IntCounter::new(name, help).map_err(|e| format!("metrics init error: {e}"))
        };
        let legs_completed = counter("patrol_legs_completed", "Patrol legs reached")?;
        let leg_failures = counter("patrol_leg_failures", "Failed navigation attempts")?;
        let legs_skipped = counter("patrol_legs_skipped", "Legs abandoned after retries")?;
        let patrols_finished = counter("patrol_runs_finished", "Patrols run to completion")?;
        let patrols_cancelled = counter("patrol_runs_cancelled", "Patrols stopped externally")?;
        let current_leg = IntGauge::new("patrol_current_leg", "Index of the leg in progress")
            .map_err(|e| format!("metrics init error: {e}"))?;

        let _ = registry.register(Box::new(legs_completed.clone()));
        let _ = registry.register(Box::new(leg_failures.clone()));
        let _ = registry.register(Box::new(legs_skipped.clone()));
        let _ = registry.register(Box::new(patrols_finished.clone()));
        let _ = registry.register(Box::new(patrols_cancelled.clone()));
        let _ = registry.register(Box::new(current_leg.clone()));

        Ok(Self {
            registry,
            legs_completed,
            leg_failures,
            legs_skipped,
            patrols_finished,
            patrols_cancelled,
            current_leg,
        })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_counters() {
        let metrics = PatrolMetrics::new().unwrap();
        metrics.legs_completed.inc();
        metrics.current_leg.set(4);
        let text = metrics.encode_text();
        assert!(text.contains("patrol_legs_completed 1"));
        assert!(text.contains("patrol_current_leg 4"));
    }
}
