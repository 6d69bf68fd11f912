//! The checker contract and the composite checker.

use std::sync::Arc;

use async_trait::async_trait;

use crate::probes::Probes;

/// A named, pluggable health probe.
///
/// Implementations must not panic out of `check`: every failure mode is
/// reported into the accumulator so the rollup always sees a complete
/// picture. The agent never inspects concrete checker types; only
/// `name` and `check` are consumed.
#[async_trait]
pub trait Checker: Send + Sync {
    /// Name of this checker as it appears in probe output.
    fn name(&self) -> &str;

    /// Run the probe, reporting every outcome into `reporter`.
    async fn check(&self, reporter: &mut Probes);
}

/// A checker that wraps an ordered sequence of sub-checkers.
///
/// Delegates `check` to each sub-checker in order, concatenating their
/// probes, so that a multi-endpoint service (e.g. several kv peers)
/// appears as a single logical entry in the registry.
pub struct CompositeChecker {
    name: String,
    checkers: Vec<Arc<dyn Checker>>,
}

impl CompositeChecker {
    pub fn new(name: impl Into<String>, checkers: Vec<Arc<dyn Checker>>) -> Self {
        Self {
            name: name.into(),
            checkers,
        }
    }
}

#[async_trait]
impl Checker for CompositeChecker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, reporter: &mut Probes) {
        for checker in &self.checkers {
            checker.check(reporter).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::FixedChecker;
    use meshmon_proto::{node_status, probe};

    #[tokio::test]
    async fn composite_concatenates_in_order() {
        let composite = CompositeChecker::new(
            "kv",
            vec![
                Arc::new(FixedChecker::healthy("kv-0")),
                Arc::new(FixedChecker::failing("kv-1", "connection refused")),
                Arc::new(FixedChecker::healthy("kv-2")),
            ],
        );

        let mut probes = Probes::new();
        composite.check(&mut probes).await;

        let names: Vec<&str> = probes.probes().iter().map(|p| p.checker.as_str()).collect();
        assert_eq!(names, vec!["kv-0", "kv-1", "kv-2"]);
        assert_eq!(probes.probes()[1].status, probe::Type::Failed as i32);
        assert_eq!(probes.status(), node_status::Type::Degraded);
    }

    #[tokio::test]
    async fn empty_composite_reports_nothing() {
        let composite = CompositeChecker::new("empty", vec![]);
        let mut probes = Probes::new();
        composite.check(&mut probes).await;
        assert!(probes.is_empty());
        assert_eq!(probes.status(), node_status::Type::Unknown);
    }
}
