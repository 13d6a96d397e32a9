//! Fork choice: the strict total order over tips and the reorg policy.

use animica_types::config::ForkChoiceParams;
use animica_types::BlockHash;
use std::cmp::Ordering;

/// What fork choice needs to know about a tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TipInfo {
    /// The tip's block hash.
    pub hash: BlockHash,
    /// The tip's height.
    pub number: u64,
    /// Cumulative work from genesis, µ-nats.
    pub cumulative_work: u64,
}

/// Compares two tips; `Ordering::Greater` means `a` is preferred.
///
/// Work differences beyond `epsilon_work` decide outright; otherwise the
/// greater height wins; otherwise the lexicographically smaller hash.
/// Exactly one of `a > b`, `a < b`, `a = b` holds, and `a = b` only for
/// the same hash.
pub fn compare_tips(a: &TipInfo, b: &TipInfo, epsilon_work: u64) -> Ordering {
    let work_gap = a.cumulative_work.abs_diff(b.cumulative_work);
    if work_gap > epsilon_work {
        return a.cumulative_work.cmp(&b.cumulative_work);
    }
    match a.number.cmp(&b.number) {
        Ordering::Equal => b.hash.cmp(&a.hash),
        other => other,
    }
}

/// The reorg policy's verdict on a proposed switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorgVerdict {
    /// Switch to the new tip.
    Switch,
    /// Keep the current tip; the candidate stays stored.
    Refuse {
        /// The work threshold the candidate failed to clear, µ-nats.
        threshold: u64,
    },
}

/// Evaluates the reorg policy for a candidate that ranks above the
/// current best tip.
///
/// `depth` is the distance from the current best tip to the fork point,
/// `delta_work` the candidate's cumulative-work advantage, and
/// `fork_age_secs` the time between the fork point and the current tip.
pub fn evaluate_reorg(
    params: &ForkChoiceParams,
    depth: u64,
    delta_work: u64,
    fork_age_secs: u64,
) -> ReorgVerdict {
    if depth > params.d_max {
        return ReorgVerdict::Refuse { threshold: u64::MAX };
    }
    let mut threshold = params
        .tau_0
        .saturating_add(params.k_linear.saturating_mul(depth));
    if fork_age_secs > params.t_max_reorg_secs {
        threshold = threshold.max(params.tau_hard);
    }
    if delta_work >= threshold {
        ReorgVerdict::Switch
    } else {
        ReorgVerdict::Refuse { threshold }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tip(hash_byte: u8, number: u64, work: u64) -> TipInfo {
        TipInfo {
            hash: [hash_byte; 32],
            number,
            cumulative_work: work,
        }
    }

    #[test]
    fn work_dominates_beyond_epsilon() {
        let a = tip(1, 5, 10_000_000);
        let b = tip(2, 9, 8_000_000);
        assert_eq!(compare_tips(&a, &b, 1_000), Ordering::Greater);
        assert_eq!(compare_tips(&b, &a, 1_000), Ordering::Less);
    }

    #[test]
    fn height_breaks_near_ties() {
        let a = tip(1, 6, 10_000_400);
        let b = tip(2, 5, 10_000_000);
        assert_eq!(compare_tips(&a, &b, 1_000), Ordering::Greater);
    }

    #[test]
    fn smaller_hash_breaks_full_ties() {
        let a = tip(1, 5, 10_000_000);
        let b = tip(2, 5, 10_000_000);
        assert_eq!(compare_tips(&a, &b, 1_000), Ordering::Greater);
        assert_eq!(compare_tips(&b, &a, 1_000), Ordering::Less);
        assert_eq!(compare_tips(&a, &a, 1_000), Ordering::Equal);
    }

    #[test]
    fn totality_over_a_tip_population() {
        let tips: Vec<TipInfo> = (0..12u8)
            .map(|i| tip(i, 5 + (i as u64 % 3), 10_000_000 + (i as u64 / 3) * 5_000))
            .collect();
        for a in &tips {
            for b in &tips {
                let ab = compare_tips(a, b, 1_000);
                let ba = compare_tips(b, a, 1_000);
                assert_eq!(ab, ba.reverse());
                if a.hash == b.hash {
                    assert_eq!(ab, Ordering::Equal);
                } else {
                    assert_ne!(ab, Ordering::Equal);
                }
            }
        }
    }

    #[test]
    fn linear_penalty_refuses_shallow_advantage() {
        // Spec scenario: D = 30, ΔW = 5.0, τ_0 = 0, k = 0.25 → τ = 7.5.
        let params = ForkChoiceParams {
            tau_0: 0,
            k_linear: 250_000,
            ..ForkChoiceParams::default()
        };
        assert_eq!(
            evaluate_reorg(&params, 30, 5_000_000, 60),
            ReorgVerdict::Refuse { threshold: 7_500_000 }
        );
        assert_eq!(
            evaluate_reorg(&params, 30, 7_500_000, 60),
            ReorgVerdict::Switch
        );
    }

    #[test]
    fn depth_cap_is_absolute() {
        let params = ForkChoiceParams::default();
        assert!(matches!(
            evaluate_reorg(&params, params.d_max + 1, u64::MAX, 0),
            ReorgVerdict::Refuse { .. }
        ));
    }

    #[test]
    fn aged_fork_points_demand_the_hard_threshold() {
        let params = ForkChoiceParams::default();
        let age = params.t_max_reorg_secs + 1;
        assert!(matches!(
            evaluate_reorg(&params, 2, params.tau_hard - 1, age),
            ReorgVerdict::Refuse { .. }
        ));
        assert_eq!(
            evaluate_reorg(&params, 2, params.tau_hard, age),
            ReorgVerdict::Switch
        );
    }
}
