//! `T_pre_mig`/`T_mig` recomputation from container-monitor figures (§4.2), triggered
//! by a store write but owned here rather than in `mecctl-store` since the resulting
//! map is orchestrator-owned, in-memory state.

/// Inputs needed to recompute `(T_pre_mig, T_mig)` for one destination server.
#[derive(Debug, Clone, Copy)]
pub struct CostInputs {
    pub delta_memory_bytes: f64,
    pub pre_checkpoint_bytes: f64,
    pub time_xdelta_s: f64,
    pub size_mb: f64,
    pub phi: f64,
    pub rho: f64,
    pub cpu_max_mhz: f64,
    pub core_count: u32,
    pub bw_mbps: f64,
}

/// `t_checkpoint = phi*size/(cpu_max*cores)`.
fn t_checkpoint(inputs: &CostInputs) -> f64 {
    inputs.phi * inputs.size_mb / (inputs.cpu_max_mhz * inputs.core_count as f64)
}

/// `t_restore = rho*(size + (pre_checkpoint+delta_mem)/1e6)/(cpu_max*cores)`.
fn t_restore(inputs: &CostInputs) -> f64 {
    inputs.rho
        * (inputs.size_mb + (inputs.pre_checkpoint_bytes + inputs.delta_memory_bytes) / 1_000_000.0)
        / (inputs.cpu_max_mhz * inputs.core_count as f64)
}

/// `T_pre_mig = t_checkpoint + max(delta_mem, pre_checkpoint)*8/(1e6*bw) + time_xdelta`.
pub fn t_pre_mig(inputs: &CostInputs) -> f64 {
    let transfer = inputs.delta_memory_bytes.max(inputs.pre_checkpoint_bytes) * 8.0
        / (1_000_000.0 * inputs.bw_mbps);
    t_checkpoint(inputs) + transfer + inputs.time_xdelta_s
}

/// `T_mig = t_checkpoint + delta_mem*8/(1e6*bw) + t_restore + time_xdelta`.
pub fn t_mig(inputs: &CostInputs) -> f64 {
    let transfer = inputs.delta_memory_bytes * 8.0 / (1_000_000.0 * inputs.bw_mbps);
    t_checkpoint(inputs) + transfer + t_restore(inputs) + inputs.time_xdelta_s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_inputs() -> CostInputs {
        CostInputs {
            delta_memory_bytes: 10_000_000.0,
            pre_checkpoint_bytes: 5_000_000.0,
            time_xdelta_s: 0.2,
            size_mb: 500.0,
            phi: 0.001,
            rho: 0.002,
            cpu_max_mhz: 2400.0,
            core_count: 4,
            bw_mbps: 100.0,
        }
    }

    #[test]
    fn t_pre_mig_uses_the_larger_of_the_two_transfer_sizes() {
        let inputs = sample_inputs();
        let got = t_pre_mig(&inputs);
        let expected = t_checkpoint(&inputs)
            + inputs.delta_memory_bytes.max(inputs.pre_checkpoint_bytes) * 8.0
                / (1_000_000.0 * inputs.bw_mbps)
            + inputs.time_xdelta_s;
        assert!((got - expected).abs() < 1e-9);
    }

    #[test]
    fn t_mig_includes_restore_time() {
        let inputs = sample_inputs();
        let got = t_mig(&inputs);
        assert!(got > t_checkpoint(&inputs));
        assert!(got > t_restore(&inputs));
    }
}
