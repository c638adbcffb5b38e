use log::warn;
use serde::Serialize;

use crate::eval::Resolver;
use crate::store::Store;
use crate::telemetry::{MetricsSource, Telemetry};
use crate::user::User;

const HEALTH_OPERATION: &str = "health_check_resolve";
const PROBE_USER_ID: &str = "health-check";

/// HealthCheck verifies that a flag store is populated and that resolving against it stays within
/// a latency budget.
#[derive(Clone, Debug, PartialEq)]
pub struct HealthCheck {
    /// Number of resolutions timed.
    pub iterations: usize,
    /// Largest acceptable average resolution time, in milliseconds.
    pub latency_budget_ms: f64,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            iterations: 1000,
            latency_budget_ms: 0.1,
        }
    }
}

/// Outcome of a [HealthCheck].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub healthy: bool,
    pub flag_count: usize,
    /// `None` when no resolution could be timed.
    pub average_resolution_ms: Option<f64>,
    pub issues: Vec<String>,
}

impl HealthCheck {
    pub fn run(&self, store: &dyn Store) -> HealthReport {
        let names = store.flag_names();
        let mut issues = Vec::new();

        let average_resolution_ms = match names.first() {
            None => {
                issues.push("no flags are defined".to_string());
                None
            }
            Some(flag) => self.time_resolution(store, flag, &mut issues),
        };

        if let Some(average) = average_resolution_ms {
            if average > self.latency_budget_ms {
                issues.push(format!(
                    "average resolution took {:.4}ms, budget is {:.4}ms",
                    average, self.latency_budget_ms
                ));
            }
        }

        for issue in &issues {
            warn!("flag health check: {}", issue);
        }

        HealthReport {
            healthy: issues.is_empty(),
            flag_count: names.len(),
            average_resolution_ms,
            issues,
        }
    }

    fn time_resolution(
        &self,
        store: &dyn Store,
        flag: &str,
        issues: &mut Vec<String>,
    ) -> Option<f64> {
        let probe = Telemetry::with_capacity(self.iterations);
        let resolver = Resolver::new(store);
        let user = User::user(PROBE_USER_ID);

        for _ in 0..self.iterations {
            let resolved =
                probe.measure(HEALTH_OPERATION, None, || resolver.is_enabled(flag, &user));
            if let Err(e) = resolved {
                issues.push(format!("flag {} is not reachable: {}", flag, e));
                return None;
            }
        }

        let average = probe.stats(HEALTH_OPERATION).map(|stats| stats.avg);
        if average.is_none() {
            issues.push(format!("no resolution of flag {} was timed", flag));
        }
        average
    }
}
