//! Fixed-outcome checkers (for testing).

use async_trait::async_trait;
use meshmon_proto::{probe, Probe};

use crate::checker::Checker;
use crate::probes::Probes;

/// A checker that always reports a single probe with a fixed outcome.
pub struct FixedChecker {
    name: String,
    status: probe::Type,
    error: Option<String>,
}

impl FixedChecker {
    /// A checker whose probe is always running.
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: probe::Type::Running,
            error: None,
        }
    }

    /// A checker whose probe always fails with `error`.
    pub fn failing(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: probe::Type::Failed,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
impl Checker for FixedChecker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, reporter: &mut Probes) {
        reporter.add(Probe {
            checker: self.name.clone(),
            status: self.status as i32,
            detail: String::new(),
            error: self.error.clone().unwrap_or_default(),
            timestamp: Some(meshmon_proto::timestamp_now()),
        });
    }
}

/// A checker that never completes, for exercising cancellation paths.
pub struct HangingChecker {
    name: String,
}

impl HangingChecker {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Checker for HangingChecker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, _reporter: &mut Probes) {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshmon_proto::node_status;

    #[tokio::test]
    async fn healthy_checker_reports_running() {
        let checker = FixedChecker::healthy("ok");
        let mut probes = Probes::new();
        checker.check(&mut probes).await;
        assert_eq!(probes.status(), node_status::Type::Healthy);
    }

    #[tokio::test]
    async fn failing_checker_reports_failure() {
        let checker = FixedChecker::failing("bad", "boom");
        let mut probes = Probes::new();
        checker.check(&mut probes).await;
        assert_eq!(probes.status(), node_status::Type::Degraded);
        assert_eq!(probes.probes()[0].error, "boom");
    }
}
