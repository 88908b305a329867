//! Per-user migration-cost model: an in-memory `(src,dst) -> (T_pre_mig, T_mig)` map
//! with a monotone connect-count and undefined-until-populated aggregates (§4.4).
//! Owned by the orchestrator, not the store (§5 "in-memory maps owned by the
//! orchestrator").

use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairCost {
    pub t_pre_mig: f64,
    pub t_mig: f64,
}

#[derive(Debug, Default)]
pub struct MigrationCostModel {
    pairs: FxHashMap<(String, String), PairCost>,
    connect_count: u64,
}

impl MigrationCostModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the (src,dst) entry from a fresh container-monitor recompute and bumps
    /// the monotone connect-count.
    pub fn update_pair(&mut self, src: &str, dst: &str, cost: PairCost) {
        self.pairs.insert((src.to_string(), dst.to_string()), cost);
        self.connect_count += 1;
    }

    /// Overwrites only `T_pre_mig` with the measured prepare-phase duration reported
    /// by the source agent (§4.4 "updated with the measured prepare time").
    pub fn record_measured_prepare(&mut self, src: &str, dst: &str, measured_prepare_s: f64) {
        if let Some(entry) = self.pairs.get_mut(&(src.to_string(), dst.to_string())) {
            entry.t_pre_mig = measured_prepare_s;
        }
    }

    pub fn get(&self, src: &str, dst: &str) -> Option<PairCost> {
        self.pairs.get(&(src.to_string(), dst.to_string())).copied()
    }

    pub fn connect_count(&self) -> u64 {
        self.connect_count
    }

    pub fn populated_pairs(&self) -> usize {
        self.pairs.len()
    }

    /// Undefined until at least `server_count - 1` distinct pairs are populated.
    pub fn is_defined(&self, server_count: usize) -> bool {
        server_count > 0 && self.pairs.len() >= server_count.saturating_sub(1)
    }

    pub fn avg_t_pre_mig(&self, server_count: usize) -> Option<f64> {
        self.aggregate(server_count, |c| c.t_pre_mig, Aggregate::Avg)
    }

    pub fn max_t_pre_mig(&self, server_count: usize) -> Option<f64> {
        self.aggregate(server_count, |c| c.t_pre_mig, Aggregate::Max)
    }

    pub fn avg_t_mig(&self, server_count: usize) -> Option<f64> {
        self.aggregate(server_count, |c| c.t_mig, Aggregate::Avg)
    }

    pub fn max_t_mig(&self, server_count: usize) -> Option<f64> {
        self.aggregate(server_count, |c| c.t_mig, Aggregate::Max)
    }

    fn aggregate(
        &self,
        server_count: usize,
        field: impl Fn(&PairCost) -> f64,
        kind: Aggregate,
    ) -> Option<f64> {
        if !self.is_defined(server_count) || self.pairs.is_empty() {
            return None;
        }
        let values: Vec<f64> = self.pairs.values().map(field).collect();
        Some(match kind {
            Aggregate::Avg => values.iter().sum::<f64>() / values.len() as f64,
            Aggregate::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        })
    }
}

enum Aggregate {
    Avg,
    Max,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_until_enough_pairs_populated() {
        let mut model = MigrationCostModel::new();
        assert!(!model.is_defined(3));
        model.update_pair("edge01", "edge02", PairCost { t_pre_mig: 1.0, t_mig: 2.0 });
        assert!(!model.is_defined(3));
        model.update_pair("edge01", "edge03", PairCost { t_pre_mig: 1.5, t_mig: 2.5 });
        assert!(model.is_defined(3));
        assert_eq!(model.avg_t_mig(3), Some(2.25));
    }

    #[test]
    fn connect_count_is_monotone() {
        let mut model = MigrationCostModel::new();
        model.update_pair("a", "b", PairCost { t_pre_mig: 1.0, t_mig: 1.0 });
        model.update_pair("a", "b", PairCost { t_pre_mig: 2.0, t_mig: 2.0 });
        assert_eq!(model.connect_count(), 2);
        assert_eq!(model.get("a", "b").unwrap().t_pre_mig, 2.0);
    }

    #[test]
    fn measured_prepare_overwrites_only_pre_mig() {
        let mut model = MigrationCostModel::new();
        model.update_pair("a", "b", PairCost { t_pre_mig: 1.0, t_mig: 5.0 });
        model.record_measured_prepare("a", "b", 0.75);
        let cost = model.get("a", "b").unwrap();
        assert_eq!(cost.t_pre_mig, 0.75);
        assert_eq!(cost.t_mig, 5.0);
    }
}
