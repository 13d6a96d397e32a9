//! Genesis-fixed consensus parameters.
//!
//! These structures are loaded by the embedder (JSON via `serde`), fixed
//! at genesis, and may change only through a versioned upgrade. They are
//! not consensus-encoded: headers commit to policy tables, not to these
//! runtime parameters.

use serde::{Deserialize, Serialize};

/// How the difficulty controller folds observations into Θ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetargetMode {
    /// Fold the EMA and move Θ on every accepted block.
    PerBlockEma,
    /// Fold the EMA every block but move Θ only at window boundaries.
    PerEpochWindow {
        /// Window length in blocks; must be at least 1.
        window: u64,
    },
}

/// Difficulty controller parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetargetParams {
    /// Retarget mode; a policy switch, not a hardcoded choice.
    pub mode: RetargetMode,
    /// Target inter-block interval in seconds.
    pub tau_target_secs: u64,
    /// EMA gain β, µ-scaled.
    pub beta: u64,
    /// Clip on a single observation `z`, µ-nats.
    pub z_cap: u64,
    /// Update gain κ, µ-scaled.
    pub kappa: u64,
    /// Clip on the smoothed error `m`, µ-nats.
    pub m_cap: u64,
    /// Deadband ε: |m| at or below this forces ΔΘ = 0, µ-nats.
    pub deadband: u64,
    /// Lower clip on an observed interval, seconds.
    pub dt_min_secs: u64,
    /// Upper clip on an observed interval, seconds.
    pub dt_max_secs: u64,
    /// Θ floor, µ-nats.
    pub theta_min: u64,
    /// Θ ceiling, µ-nats.
    pub theta_max: u64,
    /// Minimum strict timestamp step, milliseconds.
    pub min_step_ms: u64,
    /// Maximum |timestamp − local_time| on receipt, seconds.
    pub max_clock_skew_secs: u64,
    /// When set, substitute the median of this many parent timestamps for
    /// the local clock when none is supplied.
    pub median_window: Option<u32>,
}

impl Default for RetargetParams {
    fn default() -> Self {
        Self {
            mode: RetargetMode::PerBlockEma,
            tau_target_secs: 10,
            beta: 200_000,
            z_cap: 2_000_000,
            kappa: 350_000,
            m_cap: 1_500_000,
            deadband: 10_000,
            dt_min_secs: 1,
            dt_max_secs: 600,
            theta_min: 500_000,
            theta_max: 50_000_000,
            min_step_ms: 500,
            max_clock_skew_secs: 5,
            median_window: Some(11),
        }
    }
}

/// Fork-choice and reorg-policy parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkChoiceParams {
    /// Upper clamp Δ_cap on per-block effective work above Θ, µ-nats.
    pub delta_cap: u64,
    /// Work difference below which tips compare by height, µ-nats.
    pub epsilon_work: u64,
    /// Maximum fork depth a reorg may cross.
    pub d_max: u64,
    /// Fork-point age beyond which the hard threshold applies, seconds.
    pub t_max_reorg_secs: u64,
    /// Work threshold for reorgs past an aged fork point, µ-nats.
    pub tau_hard: u64,
    /// Base of the linear reorg penalty, µ-nats.
    pub tau_0: u64,
    /// Per-depth slope of the linear reorg penalty, µ-nats per block.
    pub k_linear: u64,
}

impl Default for ForkChoiceParams {
    fn default() -> Self {
        Self {
            delta_cap: 4_000_000,
            epsilon_work: 1_000,
            d_max: 100,
            t_max_reorg_secs: 3_600,
            tau_hard: 50_000_000,
            tau_0: 0,
            k_linear: 250_000,
        }
    }
}

/// The complete genesis-fixed parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// The local chain id.
    pub chain_id: u32,
    /// The header version this node seals and accepts.
    pub version: u16,
    /// Θ for the first post-genesis block, µ-nats.
    pub genesis_theta: u64,
    /// Difficulty controller parameters.
    pub retarget: RetargetParams,
    /// Fork-choice parameters.
    pub fork_choice: ForkChoiceParams,
}

impl ConsensusParams {
    /// Parameters for a local development chain.
    pub fn dev(chain_id: u32) -> Self {
        Self {
            chain_id,
            version: 1,
            genesis_theta: 2_000_000,
            retarget: RetargetParams::default(),
            fork_choice: ForkChoiceParams::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_roundtrip_through_json() {
        let params = ConsensusParams::dev(7);
        let doc = serde_json::to_string(&params).unwrap();
        let back: ConsensusParams = serde_json::from_str(&doc).unwrap();
        assert_eq!(params, back);
    }

    #[test]
    fn epoch_mode_serializes_with_window() {
        let mut params = ConsensusParams::dev(7);
        params.retarget.mode = RetargetMode::PerEpochWindow { window: 32 };
        let doc = serde_json::to_string(&params).unwrap();
        let back: ConsensusParams = serde_json::from_str(&doc).unwrap();
        assert_eq!(back.retarget.mode, RetargetMode::PerEpochWindow { window: 32 });
    }
}
