use blake2b_simd::Params;
use serde::{Deserialize, Serialize};

use crate::encoding::SiaEncodable;
use crate::types::{
    BlockID, ChainIndex, FileContractElement, Hash256, Leaf, SiacoinElement, SiafundElement,
    StateElement,
};

pub const LEAF_HASH_PREFIX: &[u8; 1] = &[0];
pub const NODE_HASH_PREFIX: &[u8; 1] = &[1];

fn params() -> Params {
    let mut params = Params::new();
    params.hash_length(32);
    params
}

/// Hashes a leaf of raw data.
pub fn sum_leaf(leaf: &[u8]) -> Hash256 {
    params()
        .to_state()
        .update(LEAF_HASH_PREFIX)
        .update(leaf)
        .finalize()
        .into()
}

/// Hashes an interior node from its two children.
pub fn sum_node(left: &Hash256, right: &Hash256) -> Hash256 {
    params()
        .to_state()
        .update(NODE_HASH_PREFIX)
        .update(left.as_ref())
        .update(right.as_ref())
        .finalize()
        .into()
}

fn element_leaf_hash<F>(prefix: &str, spent: bool, write_payload: F) -> Hash256
where
    F: FnOnce(&mut blake2b_simd::State),
{
    let mut state = params().to_state();
    state.update(LEAF_HASH_PREFIX);
    prefix.encode(&mut state).unwrap();
    write_payload(&mut state);
    spent.encode(&mut state).unwrap();
    state.finalize().into()
}

/// The accumulator leaf hash of a siacoin element. The hash covers the
/// element's ID and output along with its spent flag, but not its leaf index
/// or proof.
pub fn siacoin_leaf_hash(e: &SiacoinElement, spent: bool) -> Hash256 {
    element_leaf_hash("sia/leaf/siacoin", spent, |state| {
        e.state_element.id.encode(state).unwrap();
        e.siacoin_output.encode(state).unwrap();
    })
}

/// The accumulator leaf hash of a siafund element.
pub fn siafund_leaf_hash(e: &SiafundElement, spent: bool) -> Hash256 {
    element_leaf_hash("sia/leaf/siafund", spent, |state| {
        e.state_element.id.encode(state).unwrap();
        e.siafund_output.encode(state).unwrap();
        e.claim_start.encode(state).unwrap();
    })
}

/// The accumulator leaf hash of a file contract element. Revising a contract
/// rewrites its leaf; resolving it sets the spent flag.
pub fn file_contract_leaf_hash(e: &FileContractElement, spent: bool) -> Hash256 {
    element_leaf_hash("sia/leaf/filecontract", spent, |state| {
        e.state_element.id.encode(state).unwrap();
        e.file_contract.encode(state).unwrap();
    })
}

/// The leaf hash of a 64-byte segment of contract data, as proven by a
/// storage proof.
pub fn storage_proof_leaf_hash(leaf: &Leaf) -> Hash256 {
    sum_leaf(leaf.as_ref())
}

/// Folds a storage proof's sibling hashes over the selected leaf, yielding
/// the file Merkle root implied by the proof.
pub fn storage_proof_root(leaf: &Leaf, leaf_index: u64, proof: &[Hash256]) -> Hash256 {
    let mut node = storage_proof_leaf_hash(leaf);
    for (level, sibling) in proof.iter().enumerate() {
        node = if (leaf_index >> level) & 1 == 1 {
            sum_node(sibling, &node)
        } else {
            sum_node(&node, sibling)
        };
    }
    node
}

/// A Merkle forest: an append-only sequence of leaves organized into perfect
/// trees sized by the binary decomposition of the leaf count. Proofs are
/// sibling paths within a leaf's tree; they are invalidated whenever the
/// forest changes shape and must be refreshed against the new forest.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerkleForest {
    leaves: Vec<Hash256>,
}

impl MerkleForest {
    pub fn new() -> Self {
        MerkleForest { leaves: Vec::new() }
    }

    pub fn num_leaves(&self) -> u64 {
        self.leaves.len() as u64
    }

    /// Appends a leaf, returning its index.
    pub fn push(&mut self, leaf: Hash256) -> u64 {
        self.leaves.push(leaf);
        self.leaves.len() as u64 - 1
    }

    /// Overwrites the leaf at the given index.
    pub fn set(&mut self, leaf_index: u64, leaf: Hash256) {
        self.leaves[leaf_index as usize] = leaf;
    }

    /// Returns the (offset, height) of the perfect tree containing the leaf.
    fn tree_range(&self, leaf_index: u64) -> Option<(u64, u32)> {
        let n = self.num_leaves();
        if leaf_index >= n {
            return None;
        }
        let mut offset = 0u64;
        for k in (0..64).rev() {
            if n & (1 << k) != 0 {
                let size = 1u64 << k;
                if leaf_index < offset + size {
                    return Some((offset, k));
                }
                offset += size;
            }
        }
        None
    }

    fn subtree_root(&self, offset: u64, height: u32) -> Hash256 {
        if height == 0 {
            return self.leaves[offset as usize];
        }
        let mid = offset + (1 << (height - 1));
        sum_node(
            &self.subtree_root(offset, height - 1),
            &self.subtree_root(mid, height - 1),
        )
    }

    /// Computes the sibling path of the leaf within its tree.
    pub fn proof(&self, leaf_index: u64) -> Option<Vec<Hash256>> {
        let (offset, height) = self.tree_range(leaf_index)?;
        let rel = leaf_index - offset;
        let mut proof = Vec::with_capacity(height as usize);
        for level in 0..height {
            let sibling_rel = (rel >> level) ^ 1;
            proof.push(self.subtree_root(offset + (sibling_rel << level), level));
        }
        Some(proof)
    }

    /// Verifies that the claimed leaf hash and proof reproduce the root of
    /// the tree containing the leaf.
    pub fn verify(&self, leaf: &Hash256, leaf_index: u64, proof: &[Hash256]) -> bool {
        let Some((offset, height)) = self.tree_range(leaf_index) else {
            return false;
        };
        if proof.len() != height as usize {
            return false;
        }
        let rel = leaf_index - offset;
        let mut node = *leaf;
        for (level, sibling) in proof.iter().enumerate() {
            node = if (rel >> level) & 1 == 1 {
                sum_node(sibling, &node)
            } else {
                sum_node(&node, sibling)
            };
        }
        node == self.subtree_root(offset, height)
    }
}

/// The status of a state element within the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementStatus {
    Unspent,
    Spent,
    Missing,
}

/// The set-membership accumulator for unspent state elements. Spending an
/// element flips its leaf's spent flag rather than removing it, so a stale
/// parent proves Spent rather than merely failing to prove Unspent.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementAccumulator {
    forest: MerkleForest,
}

impl ElementAccumulator {
    pub fn new() -> Self {
        ElementAccumulator {
            forest: MerkleForest::new(),
        }
    }

    pub fn num_leaves(&self) -> u64 {
        self.forest.num_leaves()
    }

    pub fn add_leaf(&mut self, leaf: Hash256) -> u64 {
        self.forest.push(leaf)
    }

    pub fn set_leaf(&mut self, leaf_index: u64, leaf: Hash256) {
        self.forest.set(leaf_index, leaf)
    }

    pub fn proof(&self, leaf_index: u64) -> Option<Vec<Hash256>> {
        self.forest.proof(leaf_index)
    }

    /// Checks a claimed element against the accumulator. `unspent_leaf` and
    /// `spent_leaf` are the element's leaf hashes with the spent flag clear
    /// and set respectively.
    pub fn status(
        &self,
        se: &StateElement,
        unspent_leaf: Hash256,
        spent_leaf: Hash256,
    ) -> ElementStatus {
        if self.forest.verify(&unspent_leaf, se.leaf_index, &se.merkle_proof) {
            ElementStatus::Unspent
        } else if self.forest.verify(&spent_leaf, se.leaf_index, &se.merkle_proof) {
            ElementStatus::Spent
        } else {
            ElementStatus::Missing
        }
    }
}

/// An accumulator over the chain's block IDs, proving that a given index is
/// an ancestor of the current tip. Storage proofs use it to authenticate the
/// block ID their leaf selection was derived from.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryAccumulator {
    forest: MerkleForest,
}

impl HistoryAccumulator {
    pub fn new() -> Self {
        HistoryAccumulator {
            forest: MerkleForest::new(),
        }
    }

    pub fn num_leaves(&self) -> u64 {
        self.forest.num_leaves()
    }

    /// Records a block ID. Blocks must be pushed in height order.
    pub fn push(&mut self, id: &BlockID) -> u64 {
        self.forest.push(sum_leaf(id.as_ref()))
    }

    /// Computes a proof of the block at the given height.
    pub fn proof(&self, height: u64) -> Option<Vec<Hash256>> {
        self.forest.proof(height)
    }

    /// Verifies that the index's block ID is an ancestor of the current tip.
    pub fn verify(&self, index: &ChainIndex, proof: &[Hash256]) -> bool {
        self.forest
            .verify(&sum_leaf(index.id.as_ref()), index.height, proof)
    }
}
