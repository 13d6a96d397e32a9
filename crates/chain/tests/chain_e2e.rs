//! End-to-end admission scenarios over a real chain state.

use animica_chain::{ChainState, HeadChange};
use animica_proofs::hashshare::{self, draw_for};
use animica_proofs::{FixedBeacon, VerifyContext};
use animica_crypto::SchemeRegistry;
use animica_types::block::{Block, Header};
use animica_types::codec::to_bytes_canonical;
use animica_types::config::ConsensusParams;
use animica_types::error::AdmitError;
use animica_types::hashing::merkle_root;
use animica_types::policy::PolicyBundle;
use animica_types::proof::{HashShareBody, ProofBody, ProofEnvelope, ProofReceipt, PsiSource};
use animica_types::units::neg_ln_from_draw;
use animica_types::BlockHash;

const CHAIN_ID: u32 = 7;
const TAU: u64 = 10;

fn empty_root() -> [u8; 32] {
    merkle_root::<Vec<u8>>(&[])
}

fn genesis_header(bundle: &PolicyBundle) -> Header {
    Header {
        parent_hash: [0; 32],
        number: 0,
        timestamp: 1_000_000,
        chain_id: CHAIN_ID,
        state_root: [0; 32],
        tx_root: empty_root(),
        receipts_root: [0; 32],
        proofs_root: empty_root(),
        da_root: [0; 32],
        mix_seed: [1; 32],
        nonce: [0; 8],
        theta: 0,
        policy_roots: bundle.roots(),
        version: 1,
    }
}

fn dev_chain() -> (ChainState, BlockHash) {
    dev_chain_with(|_| {})
}

fn dev_chain_with(tune: impl FnOnce(&mut ConsensusParams)) -> (ChainState, BlockHash) {
    let bundle = PolicyBundle::dev();
    let mut params = ConsensusParams::dev(CHAIN_ID);
    // Deterministic per-block work for fork-choice arithmetic.
    params.fork_choice.delta_cap = 0;
    tune(&mut params);
    let genesis = genesis_header(&bundle);
    let g_hash = genesis.hash();
    let chain = ChainState::new(genesis, params, bundle).unwrap();
    (chain, g_hash)
}

/// Mines an empty block extending `parent`: loops the nonce until the
/// header's own draw clears the controller's Θ expectation.
fn mine_block(chain: &ChainState, parent: BlockHash, mix_salt: u8) -> Block {
    let stored = chain.stored(&parent).unwrap();
    let number = stored.header.number + 1;
    let theta = stored.controller.theta;
    let mut header = Header {
        parent_hash: parent,
        number,
        timestamp: stored.header.timestamp + TAU,
        chain_id: CHAIN_ID,
        state_root: [0; 32],
        tx_root: empty_root(),
        receipts_root: [0; 32],
        proofs_root: empty_root(),
        da_root: [0; 32],
        mix_seed: [mix_salt; 32],
        nonce: [0; 8],
        theta,
        policy_roots: chain.bundle().roots(),
        version: 1,
    };
    for nonce in 0u64.. {
        header.nonce = nonce.to_be_bytes();
        let draw = draw_for(CHAIN_ID, number, &parent, &header.mix_seed, &header.nonce);
        if neg_ln_from_draw(&draw) >= theta {
            break;
        }
    }
    Block {
        header,
        proofs: vec![],
        txs: vec![],
    }
}

#[test]
fn baseline_chain_extends_and_snapshots_track_the_head() {
    let (mut chain, genesis) = dev_chain();
    let mut tip = genesis;
    for salt in 2..=6u8 {
        let block = mine_block(&chain, tip, salt);
        let outcome = chain.admit_block(&block, None).unwrap();
        assert_eq!(outcome.head, HeadChange::Extended);
        assert!(outcome.score >= block.header.theta);
        assert_eq!(outcome.work, block.header.theta); // Δ_cap = 0
        tip = outcome.hash;
    }
    let snap = chain.snapshot();
    assert_eq!(snap.best, tip);
    assert_eq!(snap.number, 5);
    assert_eq!(snap.cumulative_work, 5 * 2_000_000);

    let events = chain.drain_events();
    assert_eq!(events.len(), 5);
    assert!(events.iter().all(|e| e.removed.is_empty() && e.added.len() == 1));
}

#[test]
fn determinism_two_observers_agree_on_everything() {
    let (mut alice, genesis) = dev_chain();
    let (mut bob, _) = dev_chain();
    let mut tip = genesis;
    let mut blocks = Vec::new();
    for salt in 2..=9u8 {
        let block = mine_block(&alice, tip, salt);
        let outcome = alice.admit_block(&block, None).unwrap();
        tip = outcome.hash;
        blocks.push(block);
    }
    for block in &blocks {
        bob.admit_block(block, None).unwrap();
    }
    assert_eq!(alice.snapshot(), bob.snapshot());
    let a_tip = alice.stored(&alice.best_hash()).unwrap();
    let b_tip = bob.stored(&bob.best_hash()).unwrap();
    assert_eq!(a_tip.cumulative_work, b_tip.cumulative_work);
    assert_eq!(a_tip.controller, b_tip.controller);
}

#[test]
fn wrong_theta_is_a_policy_rejection() {
    let (mut chain, genesis) = dev_chain();
    let mut block = mine_block(&chain, genesis, 2);
    block.header.theta += 1;
    assert!(matches!(
        chain.admit_block(&block, None),
        Err(AdmitError::ThetaMismatch { .. })
    ));
}

#[test]
fn unknown_parent_and_chain_id_are_structural() {
    let (mut chain, genesis) = dev_chain();
    let mut block = mine_block(&chain, genesis, 2);
    block.header.parent_hash = [0xEE; 32];
    assert!(matches!(
        chain.admit_block(&block, None),
        Err(AdmitError::ParentUnknown(_))
    ));

    let mut block = mine_block(&chain, genesis, 2);
    block.header.chain_id = CHAIN_ID + 1;
    assert!(matches!(
        chain.admit_block(&block, None),
        Err(AdmitError::ChainIdMismatch { .. })
    ));
}

#[test]
fn stalled_timestamp_is_rejected() {
    let (mut chain, genesis) = dev_chain();
    let mut block = mine_block(&chain, genesis, 2);
    block.header.timestamp = chain.stored(&genesis).unwrap().header.timestamp;
    assert!(matches!(
        chain.admit_block(&block, None),
        Err(AdmitError::TimestampSkew(_))
    ));
}

#[test]
fn mismatched_policy_roots_fail_closed() {
    let (mut chain, genesis) = dev_chain();
    let mut block = mine_block(&chain, genesis, 2);
    block.header.policy_roots.poies = [0xAB; 32];
    assert!(matches!(
        chain.admit_block(&block, None),
        Err(AdmitError::PolicyRootMismatch)
    ));
}

#[test]
fn duplicate_blocks_are_rejected() {
    let (mut chain, genesis) = dev_chain();
    let block = mine_block(&chain, genesis, 2);
    chain.admit_block(&block, None).unwrap();
    assert!(chain.admit_block(&block, None).is_err());
}

/// Builds a block carrying one hash-share envelope, with the receipts
/// commitment the scorer will recompute.
fn mine_block_with_share(chain: &ChainState, parent: BlockHash, mix_salt: u8) -> Block {
    let mut block = mine_block(chain, parent, mix_salt);
    // Seed a placeholder envelope so the sealing pass rebuilds it against
    // the mined header.
    block.proofs = vec![ProofEnvelope::seal(ProofBody::HashShare(HashShareBody {
        chain_id: block.header.chain_id,
        height: block.header.number,
        parent_hash: block.header.parent_hash,
        mix_seed: block.header.mix_seed,
        nonce: block.header.nonce,
    }))];
    remine(chain, &mut block);
    block
}

/// Re-derives a passing nonce after header edits, then refreshes the
/// share envelope binding and receipt root.
fn remine(chain: &ChainState, block: &mut Block) {
    let theta = block.header.theta;
    for nonce in 0u64.. {
        block.header.nonce = nonce.to_be_bytes();
        let draw = draw_for(
            CHAIN_ID,
            block.header.number,
            &block.header.parent_hash,
            &block.header.mix_seed,
            &block.header.nonce,
        );
        if neg_ln_from_draw(&draw) >= theta {
            break;
        }
    }
    if block.proofs.is_empty() {
        return;
    }
    let header = &block.header;
    let body = HashShareBody {
        chain_id: header.chain_id,
        height: header.number,
        parent_hash: header.parent_hash,
        mix_seed: header.mix_seed,
        nonce: header.nonce,
    };
    let envelope = ProofEnvelope::seal(ProofBody::HashShare(body.clone()));
    let registry = SchemeRegistry::standard();
    let beacon = FixedBeacon {
        start: 0,
        entries: vec![],
    };
    let ctx = VerifyContext {
        chain_id: header.chain_id,
        height: header.number,
        parent_hash: header.parent_hash,
        mix_seed: header.mix_seed,
        nonce: header.nonce,
        policy: &chain.bundle().poies,
        registry: &registry,
        beacon: &beacon,
    };
    let metrics = hashshare::verify(&body, &ctx).unwrap();
    let receipt = ProofReceipt {
        metrics: metrics.receipt_subset(),
        nullifier: envelope.nullifier,
        psi_input: 0,
        kind: metrics.kind(),
        units: metrics.psi_inputs().units,
    };
    block.header.proofs_root = merkle_root(&[to_bytes_canonical(&receipt)]);
    block.proofs = vec![envelope];
}

#[test]
fn nullifier_reuse_across_blocks_is_rejected() {
    let (mut chain, genesis) = dev_chain();
    let b1 = mine_block_with_share(&chain, genesis, 2);
    let reused = b1.proofs[0].clone();
    let b1_hash = chain.admit_block(&b1, None).unwrap().hash;

    // B2 extends B1 and replays B1's envelope verbatim.
    let mut b2 = mine_block(&chain, b1_hash, 3);
    b2.proofs = vec![reused.clone()];
    let err = chain.admit_block(&b2, None).unwrap_err();
    match err {
        AdmitError::NullifierReuse(n) => assert_eq!(n, reused.nullifier),
        other => panic!("expected NullifierReuse, got {other:?}"),
    }
    // The head is still B1.
    assert_eq!(chain.best_hash(), b1_hash);
}

#[test]
fn duplicate_nullifiers_within_one_block_are_rejected() {
    let (mut chain, genesis) = dev_chain();
    let mut block = mine_block_with_share(&chain, genesis, 2);
    let dup = block.proofs[0].clone();
    block.proofs.push(dup);
    assert!(matches!(
        chain.admit_block(&block, None),
        Err(AdmitError::NullifierReuse(_))
    ));
}

fn extend_n(chain: &mut ChainState, from: BlockHash, salts: &[u8]) -> Vec<BlockHash> {
    let mut tip = from;
    let mut out = Vec::new();
    for salt in salts {
        let block = mine_block(chain, tip, *salt);
        tip = chain.admit_block(&block, None).unwrap().hash;
        out.push(tip);
    }
    out
}

#[test]
fn heavier_branch_reorgs_within_policy() {
    let (mut chain, genesis) = dev_chain();
    let main = extend_n(&mut chain, genesis, &[2, 3, 4]);
    let best_before = *main.last().unwrap();
    assert_eq!(chain.best_hash(), best_before);

    // A four-block side branch from genesis: ΔW = 2.0 nats at depth 3,
    // clearing τ(3) = 0.75 nats.
    let side = extend_n(&mut chain, genesis, &[0x12, 0x13, 0x14, 0x15]);
    let side_tip = *side.last().unwrap();
    assert_eq!(chain.best_hash(), side_tip);

    let events = chain.drain_events();
    let reorg = events.last().unwrap();
    assert_eq!(reorg.removed.len(), 3);
    assert_eq!(reorg.added.len(), 4);
    assert_eq!(*reorg.removed.last().unwrap(), best_before);
    assert_eq!(*reorg.added.last().unwrap(), side_tip);
}

#[test]
fn shallow_advantage_cannot_cross_a_steep_penalty() {
    let (mut chain, genesis) = dev_chain_with(|p| {
        p.fork_choice.k_linear = 3_000_000;
    });
    let main = extend_n(&mut chain, genesis, &[2, 3, 4]);
    let best_before = *main.last().unwrap();

    // ΔW = 2.0 nats at depth 3 < τ(3) = 9.0 nats: refused.
    let side_blocks: Vec<u8> = vec![0x12, 0x13, 0x14, 0x15];
    let mut tip = genesis;
    let mut last_outcome = None;
    for salt in side_blocks {
        let block = mine_block(&chain, tip, salt);
        let outcome = chain.admit_block(&block, None).unwrap();
        tip = outcome.hash;
        last_outcome = Some(outcome);
    }
    assert!(matches!(
        last_outcome.unwrap().head,
        HeadChange::ReorgRefused { .. }
    ));
    assert_eq!(chain.best_hash(), best_before);
}

#[test]
fn reorg_reverts_orphaned_nullifiers() {
    let (mut chain, genesis) = dev_chain();
    // Main chain: one block carrying an envelope.
    let b1 = mine_block_with_share(&chain, genesis, 2);
    let orphaned_nullifier = b1.proofs[0].nullifier;
    let b1_hash = chain.admit_block(&b1, None).unwrap().hash;
    assert_eq!(chain.best_hash(), b1_hash);

    // A heavier empty side branch takes over.
    extend_n(&mut chain, genesis, &[0x21, 0x22, 0x23]);
    assert_ne!(chain.best_hash(), b1_hash);

    // The orphaned nullifier is free again: a block on the new head may
    // consume it.
    let head = chain.best_hash();
    let mut replay = mine_block(&chain, head, 0x24);
    replay.proofs = vec![ProofEnvelope {
        body: b1.proofs[0].body.clone(),
        nullifier: orphaned_nullifier,
    }];
    // The share body no longer binds this header, so the envelope fails
    // verification and scores zero, but the nullifier check passes: the
    // block is judged on its own draw.
    let receipt = ProofReceipt {
        metrics: Default::default(),
        nullifier: orphaned_nullifier,
        psi_input: 0,
        kind: animica_types::proof::ProofKind::HashShare,
        units: 0,
    };
    replay.header.proofs_root = merkle_root(&[to_bytes_canonical(&receipt)]);
    remine_header_only(&mut replay);
    chain.admit_block(&replay, None).unwrap();
}

#[test]
fn side_branch_may_reuse_a_best_chain_nullifier() {
    let (mut chain, genesis) = dev_chain();
    // Best chain: B1 consumes nullifier N.
    let b1 = mine_block_with_share(&chain, genesis, 2);
    let envelope = b1.proofs[0].clone();
    let b1_hash = chain.admit_block(&b1, None).unwrap().hash;

    // A side block from genesis replays the same envelope. N is live on
    // the best chain but absent from this branch's ancestry, so the
    // per-chain rule admits the block; the foreign binding just fails
    // verification and scores zero.
    let mut s1 = mine_block(&chain, genesis, 0x31);
    s1.proofs = vec![envelope.clone()];
    let receipt = ProofReceipt {
        metrics: Default::default(),
        nullifier: envelope.nullifier,
        psi_input: 0,
        kind: animica_types::proof::ProofKind::HashShare,
        units: 0,
    };
    s1.header.proofs_root = merkle_root(&[to_bytes_canonical(&receipt)]);
    remine_header_only(&mut s1);
    let s1_hash = chain.admit_block(&s1, None).unwrap().hash;
    assert_eq!(chain.best_hash(), b1_hash);

    // Growing the side branch past B1 switches the head; the reorg
    // transaction removes B1's entry and re-inserts the branch's own.
    let side = extend_n(&mut chain, s1_hash, &[0x32, 0x33]);
    assert_eq!(chain.best_hash(), *side.last().unwrap());
}

/// Re-mines the nonce without touching the proof pack.
fn remine_header_only(block: &mut Block) {
    let theta = block.header.theta;
    for nonce in 0u64.. {
        block.header.nonce = nonce.to_be_bytes();
        let draw = draw_for(
            CHAIN_ID,
            block.header.number,
            &block.header.parent_hash,
            &block.header.mix_seed,
            &block.header.nonce,
        );
        if neg_ln_from_draw(&draw) >= theta {
            break;
        }
    }
}
