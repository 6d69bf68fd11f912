//! Probe accumulator and node-level rollup.

use meshmon_proto::{node_status, probe, Probe};

/// Mutable collector for individual check outcomes.
///
/// One accumulator is handed to a single checker at a time; combining
/// outcomes across checkers happens in the collector, so `Probes` has
/// no interior synchronization. Insertion order is preserved.
#[derive(Debug, Default)]
pub struct Probes {
    probes: Vec<Probe>,
}

impl Probes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a single probe outcome.
    pub fn add(&mut self, probe: Probe) {
        self.probes.push(probe);
    }

    /// Record a failed probe for `checker` with the given error detail.
    pub fn add_failure(&mut self, checker: &str, error: impl ToString) {
        self.probes.push(Probe {
            checker: checker.to_string(),
            status: probe::Type::Failed as i32,
            detail: String::new(),
            error: error.to_string(),
            timestamp: Some(meshmon_proto::timestamp_now()),
        });
    }

    /// Roll the accumulated probes up into a node-level verdict.
    ///
    /// Any non-running probe forces `Degraded`; an empty accumulator
    /// means no collection happened and yields `Unknown`.
    pub fn status(&self) -> node_status::Type {
        if self.probes.is_empty() {
            return node_status::Type::Unknown;
        }
        let all_running = self
            .probes
            .iter()
            .all(|p| p.status == probe::Type::Running as i32);
        if all_running {
            node_status::Type::Healthy
        } else {
            node_status::Type::Degraded
        }
    }

    /// The accumulated probes, in insertion order.
    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    pub fn into_probes(self) -> Vec<Probe> {
        self.probes
    }

    /// Append all probes from `other`, preserving order.
    pub fn extend(&mut self, other: Probes) {
        self.probes.extend(other.probes);
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(checker: &str, status: probe::Type) -> Probe {
        Probe {
            checker: checker.to_string(),
            status: status as i32,
            detail: String::new(),
            error: String::new(),
            timestamp: Some(meshmon_proto::timestamp_now()),
        }
    }

    #[test]
    fn empty_rolls_up_unknown() {
        let probes = Probes::new();
        assert_eq!(probes.status(), node_status::Type::Unknown);
    }

    #[test]
    fn all_running_rolls_up_healthy() {
        let mut probes = Probes::new();
        probes.add(probe("a", probe::Type::Running));
        probes.add(probe("b", probe::Type::Running));
        assert_eq!(probes.status(), node_status::Type::Healthy);
    }

    #[test]
    fn any_failed_rolls_up_degraded() {
        let mut probes = Probes::new();
        probes.add(probe("a", probe::Type::Running));
        probes.add(probe("b", probe::Type::Failed));
        probes.add(probe("c", probe::Type::Running));
        assert_eq!(probes.status(), node_status::Type::Degraded);
    }

    #[test]
    fn terminated_rolls_up_degraded() {
        let mut probes = Probes::new();
        probes.add(probe("a", probe::Type::Terminated));
        assert_eq!(probes.status(), node_status::Type::Degraded);
    }

    #[test]
    fn insertion_order_preserved() {
        let mut probes = Probes::new();
        for name in ["c", "a", "b"] {
            probes.add(probe(name, probe::Type::Running));
        }
        let names: Vec<&str> = probes.probes().iter().map(|p| p.checker.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn extend_appends_in_order() {
        let mut left = Probes::new();
        left.add(probe("a", probe::Type::Running));
        let mut right = Probes::new();
        right.add(probe("b", probe::Type::Failed));
        right.add(probe("c", probe::Type::Running));

        left.extend(right);
        let names: Vec<&str> = left.probes().iter().map(|p| p.checker.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(left.status(), node_status::Type::Degraded);
    }

    #[test]
    fn add_failure_records_error_detail() {
        let mut probes = Probes::new();
        probes.add_failure("kv", "connection refused");
        assert_eq!(probes.len(), 1);
        let p = &probes.probes()[0];
        assert_eq!(p.checker, "kv");
        assert_eq!(p.status, probe::Type::Failed as i32);
        assert_eq!(p.error, "connection refused");
    }
}
