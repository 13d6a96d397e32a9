//! The serialized block admission pipeline.
//!
//! A candidate block is validated completely before any shared structure
//! is touched: structural checks, timestamp guards, the policy-root gate,
//! transaction signatures, envelope verification, scoring, and the Θ
//! agreement check all run against immutable state. The commit step then
//! inserts the header, registers nullifiers, advances the controller, and
//! runs fork choice as one all-or-nothing mutation.

use crate::events::HeadUpdate;
use crate::forkchoice::{compare_tips, evaluate_reorg, ReorgVerdict, TipInfo};
use crate::nullifiers::NullifierSet;
use crate::store::{HeaderStore, StoredHeader};
use animica_consensus::difficulty::{advance, check_timestamp, TimestampContext};
use animica_consensus::scorer::{score_and_accept, ScoredEnvelope};
use animica_consensus::ControllerState;
use animica_crypto::sign::batch::verify_transactions;
use animica_crypto::SchemeRegistry;
use animica_proofs::budget::DEFAULT_ENVELOPE_BUDGET;
use animica_proofs::{hashshare, verify_all, BeaconView, VerifyContext};
use animica_types::block::{Block, Header};
use animica_types::codec::to_bytes_canonical;
use animica_types::config::ConsensusParams;
use animica_types::error::{AdmitError, SchemaError};
use animica_types::hashing::merkle_root;
use animica_types::policy::PolicyBundle;
use animica_types::{BlockHash, Nullifier};
use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, warn};

/// A beacon view that follows one branch of the header DAG.
struct BranchBeacon<'a> {
    store: &'a HeaderStore,
    tip: BlockHash,
}

impl BeaconView for BranchBeacon<'_> {
    fn beacon(&self, height: u64) -> Option<[u8; 32]> {
        self.store
            .ancestor_at(&self.tip, height)
            .map(|stored| stored.header.mix_seed)
    }
}

/// How the head changed when a block was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadChange {
    /// The block extended the best tip.
    Extended,
    /// The block completed a better branch and the chain switched.
    Reorged {
        /// Fork depth crossed by the switch.
        depth: u64,
    },
    /// The block was stored on a branch that does not outrank the head.
    SideBranch,
    /// The branch outranks the head but the reorg policy refused it.
    ReorgRefused {
        /// The candidate's cumulative-work advantage, µ-nats.
        delta_work: u64,
        /// The threshold it failed to clear, µ-nats.
        threshold: u64,
    },
}

/// The admission pipeline's result for one accepted block.
#[derive(Debug, Clone, Copy)]
pub struct AdmitOutcome {
    /// The admitted block's hash.
    pub hash: BlockHash,
    /// The block score `S`, µ-nats.
    pub score: u64,
    /// The block's effective work `w`, µ-nats.
    pub work: u64,
    /// How the head changed.
    pub head: HeadChange,
}

/// A consistent read snapshot for RPC and mempool consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainSnapshot {
    /// The best tip's hash.
    pub best: BlockHash,
    /// The best tip's height.
    pub number: u64,
    /// Θ the next block must meet, µ-nats.
    pub next_theta: u64,
    /// Cumulative work at the best tip, µ-nats.
    pub cumulative_work: u64,
}

/// The consensus core's only mutable state: headers, nullifiers, and the
/// current head. All mutation goes through [`ChainState::admit_block`].
pub struct ChainState {
    params: ConsensusParams,
    bundle: PolicyBundle,
    registry: SchemeRegistry,
    store: HeaderStore,
    nullifiers: NullifierSet,
    best: BlockHash,
    events: VecDeque<HeadUpdate>,
}

impl ChainState {
    /// Seeds a chain from its genesis header.
    pub fn new(
        genesis: Header,
        params: ConsensusParams,
        bundle: PolicyBundle,
    ) -> Result<Self, AdmitError> {
        if !genesis.is_genesis() {
            return Err(
                SchemaError::InvalidValue("genesis must be height 0 with a zero parent".into())
                    .into(),
            );
        }
        if genesis.chain_id != params.chain_id {
            return Err(AdmitError::ChainIdMismatch {
                expected: params.chain_id,
                got: genesis.chain_id,
            });
        }
        let hash = genesis.hash();
        let mut store = HeaderStore::new();
        store.insert(StoredHeader {
            hash,
            work: 0,
            cumulative_work: 0,
            controller: ControllerState::genesis(params.genesis_theta),
            nullifiers_added: Vec::new(),
            header: genesis,
        });
        Ok(Self {
            params,
            bundle,
            registry: SchemeRegistry::standard(),
            store,
            nullifiers: NullifierSet::new(),
            best: hash,
            events: VecDeque::new(),
        })
    }

    /// The genesis-fixed parameters.
    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    /// The active policy bundle.
    pub fn bundle(&self) -> &PolicyBundle {
        &self.bundle
    }

    /// The best tip's hash.
    pub fn best_hash(&self) -> BlockHash {
        self.best
    }

    /// Looks up a stored header by hash.
    pub fn stored(&self, hash: &BlockHash) -> Option<&StoredHeader> {
        self.store.get(hash)
    }

    /// A consistent snapshot of the head.
    pub fn snapshot(&self) -> ChainSnapshot {
        match self.store.get(&self.best) {
            Some(tip) => ChainSnapshot {
                best: tip.hash,
                number: tip.header.number,
                next_theta: tip.controller.theta,
                cumulative_work: tip.cumulative_work,
            },
            None => ChainSnapshot {
                best: self.best,
                number: 0,
                next_theta: self.params.genesis_theta,
                cumulative_work: 0,
            },
        }
    }

    /// Drains the pending head-update events, oldest first.
    pub fn drain_events(&mut self) -> Vec<HeadUpdate> {
        self.events.drain(..).collect()
    }

    /// Epoch GC: drops headers below `height` and reclaims expired
    /// nullifier entries.
    pub fn prune_below(&mut self, height: u64) {
        self.store.prune_below(height);
        self.nullifiers.expire_below(height);
    }

    /// Runs the full admission pipeline on a candidate block.
    ///
    /// `local_time` is the embedder's clock at receipt; `None` selects the
    /// median-of-parents substitution when the parameters enable it.
    pub fn admit_block(
        &mut self,
        block: &Block,
        local_time: Option<u64>,
    ) -> Result<AdmitOutcome, AdmitError> {
        let header = &block.header;
        let hash = header.hash();

        // Structural checks: nothing below touches state.
        if self.store.contains(&hash) {
            return Err(SchemaError::InvalidValue("block already known".into()).into());
        }
        if header.chain_id != self.params.chain_id {
            return Err(AdmitError::ChainIdMismatch {
                expected: self.params.chain_id,
                got: header.chain_id,
            });
        }
        if header.version != self.params.version {
            return Err(SchemaError::InvalidValue(format!(
                "unsupported header version {}",
                header.version
            ))
            .into());
        }
        let parent = self
            .store
            .get(&header.parent_hash)
            .ok_or(AdmitError::ParentUnknown(header.parent_hash))?
            .clone();
        if header.number != parent.header.number + 1 {
            return Err(SchemaError::InvalidValue(format!(
                "height {} does not follow parent height {}",
                header.number, parent.header.number
            ))
            .into());
        }

        // Timestamp guards.
        let parent_timestamps = self.recent_timestamps(&parent);
        check_timestamp(
            &self.params.retarget,
            parent.header.timestamp,
            header.timestamp,
            &TimestampContext {
                parent_timestamps: &parent_timestamps,
                local_time,
            },
        )?;

        // Policy gate: both roots must match the loaded bundle bit-exactly.
        if !self.bundle.matches(&header.policy_roots) {
            return Err(AdmitError::PolicyRootMismatch);
        }

        // Θ agreement with the controller expectation at the parent.
        if header.theta != parent.controller.theta {
            return Err(AdmitError::ThetaMismatch {
                expected: parent.controller.theta,
                got: header.theta,
            });
        }

        // Transaction commitment and signatures.
        let encoded_txs: Vec<Vec<u8>> = block.txs.iter().map(to_bytes_canonical).collect();
        if merkle_root(&encoded_txs) != header.tx_root {
            return Err(SchemaError::InvalidValue("txRoot mismatch".into()).into());
        }
        verify_transactions(&self.registry, &self.bundle.alg, &block.txs)
            .map_err(|(idx, e)| AdmitError::Signature(format!("tx {idx}: {e}")))?;

        // Nullifier uniqueness: within the block, then against the live
        // history of the candidate's own branch. Uniqueness is a per-chain
        // rule, so a side branch is judged on its ancestry, not on the
        // best chain's set.
        let ttl = self.bundle.poies.nullifier_ttl;
        let mut seen: HashSet<Nullifier> = HashSet::with_capacity(block.proofs.len());
        for envelope in &block.proofs {
            if !seen.insert(envelope.nullifier) {
                return Err(AdmitError::NullifierReuse(envelope.nullifier));
            }
        }
        if parent.hash == self.best {
            for envelope in &block.proofs {
                if self.nullifiers.is_live(&envelope.nullifier, header.number) {
                    return Err(AdmitError::NullifierReuse(envelope.nullifier));
                }
            }
        } else if let Some(nullifier) =
            self.branch_nullifier_conflict(&parent, &seen, header.number, ttl)
        {
            return Err(AdmitError::NullifierReuse(nullifier));
        }

        // Envelope verification, parallel per envelope; a failure zeroes
        // that envelope's ψ but does not reject the block by itself.
        let beacon = BranchBeacon {
            store: &self.store,
            tip: parent.hash,
        };
        let ctx = VerifyContext {
            chain_id: header.chain_id,
            height: header.number,
            parent_hash: header.parent_hash,
            mix_seed: header.mix_seed,
            nonce: header.nonce,
            policy: &self.bundle.poies,
            registry: &self.registry,
            beacon: &beacon,
        };
        let outcomes = verify_all(&block.proofs, &ctx, DEFAULT_ENVELOPE_BUDGET);
        let scored: Vec<ScoredEnvelope> = block
            .proofs
            .iter()
            .zip(outcomes)
            .map(|(envelope, o)| ScoredEnvelope {
                nullifier: o.nullifier,
                kind: envelope.body.kind(),
                metrics: o.result.ok(),
            })
            .collect();

        // Scoring and the acceptance predicate.
        let draw = hashshare::draw_digest(&ctx);
        let breakdown = score_and_accept(&self.bundle, header, &draw, &scored)?;
        if breakdown.proofs_root != header.proofs_root {
            return Err(SchemaError::InvalidValue("proofsRoot mismatch".into()).into());
        }

        // Everything validated; compute the commit records.
        let work = breakdown.score.clamp(
            header.theta,
            header.theta.saturating_add(self.params.fork_choice.delta_cap),
        );
        let cumulative_work = parent.cumulative_work.saturating_add(work);
        let dt = header.timestamp - parent.header.timestamp;
        let controller = advance(&self.params.retarget, &parent.controller, header.number, dt);
        let stored = StoredHeader {
            header: header.clone(),
            hash,
            work,
            cumulative_work,
            controller,
            nullifiers_added: block.proofs.iter().map(|e| e.nullifier).collect(),
        };

        // Head selection; nullifier transactions are staged so a refused
        // or conflicting switch leaves no trace.
        let head = self.select_head(&parent, &stored, ttl)?;
        self.store.insert(stored);
        match head {
            HeadChange::Extended | HeadChange::Reorged { .. } => {
                self.best = hash;
            }
            HeadChange::SideBranch | HeadChange::ReorgRefused { .. } => {}
        }
        info!(
            number = header.number,
            hash = %hex::encode(hash),
            score = breakdown.score,
            work,
            ?head,
            "admitted block"
        );
        Ok(AdmitOutcome {
            hash,
            score: breakdown.score,
            work,
            head,
        })
    }

    /// Decides the head change for a fully validated candidate and applies
    /// the nullifier transaction that change implies.
    fn select_head(
        &mut self,
        parent: &StoredHeader,
        candidate: &StoredHeader,
        ttl: u64,
    ) -> Result<HeadChange, AdmitError> {
        let number = candidate.header.number;
        if parent.hash == self.best {
            self.nullifiers.expire_below(number);
            for nullifier in &candidate.nullifiers_added {
                self.nullifiers.insert(*nullifier, number + ttl);
            }
            self.events.push_back(HeadUpdate::extension(candidate.hash));
            return Ok(HeadChange::Extended);
        }

        let best = self
            .store
            .get(&self.best)
            .ok_or_else(|| AdmitError::Verifier("best tip missing from store".into()))?
            .clone();
        let candidate_tip = TipInfo {
            hash: candidate.hash,
            number,
            cumulative_work: candidate.cumulative_work,
        };
        let best_tip = TipInfo {
            hash: best.hash,
            number: best.header.number,
            cumulative_work: best.cumulative_work,
        };
        if compare_tips(&candidate_tip, &best_tip, self.params.fork_choice.epsilon_work)
            != Ordering::Greater
        {
            return Ok(HeadChange::SideBranch);
        }

        let fork = self
            .store
            .fork_point(&parent.hash, &best.hash)
            .ok_or_else(|| AdmitError::Verifier("fork point not found".into()))?
            .clone();
        let depth = best.header.number - fork.header.number;
        let delta_work = candidate
            .cumulative_work
            .saturating_sub(best.cumulative_work);
        let fork_age = best
            .header
            .timestamp
            .saturating_sub(fork.header.timestamp);
        match evaluate_reorg(&self.params.fork_choice, depth, delta_work, fork_age) {
            ReorgVerdict::Refuse { threshold } => {
                debug!(depth, delta_work, threshold, "reorg refused");
                Ok(HeadChange::ReorgRefused {
                    delta_work,
                    threshold,
                })
            }
            ReorgVerdict::Switch => {
                let removed = self
                    .store
                    .path_from(&fork.hash, &best.hash)
                    .ok_or_else(|| AdmitError::Verifier("orphaned path broken".into()))?;
                let mut added = self
                    .store
                    .path_from(&fork.hash, &parent.hash)
                    .ok_or_else(|| AdmitError::Verifier("adopted path broken".into()))?;
                added.push(candidate.hash);

                let mut removals: Vec<Nullifier> = Vec::new();
                for hash in &removed {
                    if let Some(stored) = self.store.get(hash) {
                        removals.extend_from_slice(&stored.nullifiers_added);
                    }
                }
                let mut insertions: Vec<(Nullifier, u64)> = Vec::new();
                for hash in &added {
                    if *hash == candidate.hash {
                        for nullifier in &candidate.nullifiers_added {
                            insertions.push((*nullifier, number + ttl));
                        }
                    } else if let Some(stored) = self.store.get(hash) {
                        for nullifier in &stored.nullifiers_added {
                            insertions.push((*nullifier, stored.header.number + ttl));
                        }
                    }
                }
                self.nullifiers
                    .apply_switch(&removals, &insertions, number)
                    .map_err(|nullifier| {
                        warn!(
                            nullifier = %hex::encode(nullifier),
                            "reorg aborted: branch reuses a live nullifier"
                        );
                        AdmitError::NullifierReuse(nullifier)
                    })?;
                self.nullifiers.expire_below(number);
                self.events.push_back(HeadUpdate {
                    removed,
                    added,
                });
                Ok(HeadChange::Reorged { depth })
            }
        }
    }

    /// Scans the candidate's own ancestry for a nullifier still live at
    /// `height`. The maintained set tracks the best chain only, so
    /// side-branch admission walks stored headers back to the TTL horizon.
    fn branch_nullifier_conflict(
        &self,
        parent: &StoredHeader,
        candidates: &HashSet<Nullifier>,
        height: u64,
        ttl: u64,
    ) -> Option<Nullifier> {
        // An entry inserted at block k is live at h while k + ttl ≥ h.
        let horizon = height.saturating_sub(ttl);
        let mut current = Some(parent.hash);
        while let Some(hash) = current {
            let Some(stored) = self.store.get(&hash) else {
                // Ancestors beyond the pruning boundary are also beyond
                // any unexpired TTL.
                break;
            };
            if stored.header.number < horizon {
                break;
            }
            for nullifier in &stored.nullifiers_added {
                if candidates.contains(nullifier) {
                    return Some(*nullifier);
                }
            }
            current = if stored.header.number == 0 {
                None
            } else {
                Some(stored.header.parent_hash)
            };
        }
        None
    }

    /// Collects up to `median_window` ancestor timestamps ending at
    /// `parent`, oldest first.
    fn recent_timestamps(&self, parent: &StoredHeader) -> Vec<u64> {
        let window = self
            .params
            .retarget
            .median_window
            .unwrap_or(0)
            .max(1) as usize;
        let mut out = Vec::with_capacity(window);
        let mut current = Some(parent.hash);
        while out.len() < window {
            let Some(hash) = current else { break };
            let Some(stored) = self.store.get(&hash) else { break };
            out.push(stored.header.timestamp);
            current = if stored.header.number == 0 {
                None
            } else {
                Some(stored.header.parent_hash)
            };
        }
        out.reverse();
        out
    }
}

impl BeaconView for ChainState {
    /// The canonical beacon: the mix seed of the best-chain block at
    /// `height`.
    fn beacon(&self, height: u64) -> Option<[u8; 32]> {
        self.store
            .ancestor_at(&self.best, height)
            .map(|stored| stored.header.mix_seed)
    }
}
