use alloc::vec::Vec;

use super::{Block, ControlFlowGraph, Function};

/// Structural errors detected by [`verify`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("{block} is empty or does not end in a terminator")]
    MissingTerminator { block: Block },
    #[error("{block} contains a terminator before its final instruction")]
    MisplacedTerminator { block: Block },
    #[error("{block} has a φ node after its first non-φ instruction")]
    MisplacedPhi { block: Block },
    #[error("φ in {block} has {incoming} incoming entries but the block has {preds} predecessors")]
    PhiPredecessorMismatch {
        block: Block,
        incoming: usize,
        preds: usize,
    },
    #[error("φ in {block} names {pred} as a predecessor, but it is not one")]
    PhiUnknownPredecessor { block: Block, pred: Block },
    #[error("function has no blocks")]
    NoBlocks,
}

/// Check structural invariants of `func`: every block is terminated, with
/// exactly one terminator; φ nodes are grouped at block tops and carry one
/// incoming entry per predecessor edge.
///
/// Value dominance is not checked; the verifier is a guard for CFG surgery,
/// not a full SSA validator.
pub fn verify(func: &Function) -> Result<(), VerifyError> {
    if func.num_blocks() == 0 {
        return Err(VerifyError::NoBlocks);
    }
    let cfg = ControlFlowGraph::compute(func);
    for block in func.blocks() {
        let insts = func.insts(block);
        if func.terminator(block).is_none() {
            return Err(VerifyError::MissingTerminator { block });
        }
        let mut seen_non_phi = false;
        for (index, inst) in insts.iter().enumerate() {
            let data = func.dfg.inst(*inst);
            if data.is_terminator() && index + 1 != insts.len() {
                return Err(VerifyError::MisplacedTerminator { block });
            }
            if data.is_phi() {
                if seen_non_phi {
                    return Err(VerifyError::MisplacedPhi { block });
                }
                verify_phi(&cfg, block, data.phi_args().unwrap())?;
            } else {
                seen_non_phi = true;
            }
        }
    }
    Ok(())
}

fn verify_phi(
    cfg: &ControlFlowGraph,
    block: Block,
    args: &[(Block, super::Value)],
) -> Result<(), VerifyError> {
    let preds = cfg.preds(block);
    if args.len() != preds.len() {
        return Err(VerifyError::PhiPredecessorMismatch {
            block,
            incoming: args.len(),
            preds: preds.len(),
        });
    }
    // One entry per predecessor edge; count multiplicity on both sides.
    let mut remaining: Vec<Block> = preds.to_vec();
    for (pred, _) in args {
        match remaining.iter().position(|p| p == pred) {
            Some(pos) => {
                remaining.swap_remove(pos);
            }
            None => {
                return Err(VerifyError::PhiUnknownPredecessor { block, pred: *pred });
            }
        }
    }
    Ok(())
}
