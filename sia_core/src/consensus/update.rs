use std::collections::HashSet;

use crate::consensus::State;
use crate::merkle::{file_contract_leaf_hash, siacoin_leaf_hash, siafund_leaf_hash};
use crate::types::{
    Block, ChainIndex, ContractResolution, Currency, ElementID, FileContractElement,
    Hash256, SiacoinElement, SiacoinOutput, SiafundElement, StateElement, StorageProof,
    Transaction, Work, EPHEMERAL_LEAF_INDEX,
};

/// An ApplyUpdate is the result of applying a block: the next State, plus the
/// elements the block created, revised, and resolved. Elements held by the
/// caller must have their proofs refreshed against the new state before they
/// can be used again.
#[derive(Debug)]
pub struct ApplyUpdate {
    pub state: State,
    pub new_siacoin_elements: Vec<SiacoinElement>,
    pub new_siafund_elements: Vec<SiafundElement>,
    pub new_file_contracts: Vec<FileContractElement>,
    pub revised_file_contracts: Vec<FileContractElement>,
    pub resolved_file_contracts: Vec<FileContractElement>,
}

impl ApplyUpdate {
    fn new(state: State) -> Self {
        ApplyUpdate {
            state,
            new_siacoin_elements: Vec::new(),
            new_siafund_elements: Vec::new(),
            new_file_contracts: Vec::new(),
            revised_file_contracts: Vec::new(),
            resolved_file_contracts: Vec::new(),
        }
    }

    /// A proof that the applied block is part of the commitment chain, for
    /// use as the window proof of a storage proof whose window starts at this
    /// block.
    pub fn history_proof(&self) -> Vec<Hash256> {
        self.state
            .history
            .proof(self.state.index.height)
            .unwrap_or_default()
    }

    /// Refreshes an element's Merkle proof against the new accumulator.
    pub fn update_element_proof(&self, se: &mut StateElement) {
        if se.leaf_index == EPHEMERAL_LEAF_INDEX {
            return;
        }
        if let Some(proof) = self.state.elements.proof(se.leaf_index) {
            se.merkle_proof = proof;
        }
    }

    /// Refreshes a storage proof's window proof against the new history
    /// accumulator.
    pub fn update_window_proof(&self, sp: &mut StorageProof) {
        if let Some(proof) = self.state.history.proof(sp.window_start.height) {
            sp.window_proof = proof;
        }
    }

    fn push_siacoin_element(&mut self, id: ElementID, output: SiacoinOutput) {
        let mut elem = SiacoinElement {
            state_element: StateElement {
                id,
                leaf_index: 0,
                merkle_proof: Vec::new(),
            },
            siacoin_output: output,
        };
        elem.state_element.leaf_index = self.state.elements.add_leaf(siacoin_leaf_hash(&elem, false));
        self.new_siacoin_elements.push(elem);
    }

    fn apply_transactions(&mut self, txns: &[Transaction]) {
        // elements created and consumed within this block are never inserted
        let ephemeral_spent: HashSet<ElementID> = txns
            .iter()
            .flat_map(|txn| txn.siacoin_inputs.iter())
            .filter(|input| input.parent.state_element.leaf_index == EPHEMERAL_LEAF_INDEX)
            .map(|input| input.parent.state_element.id)
            .collect();

        for txn in txns {
            for input in &txn.siacoin_inputs {
                let se = &input.parent.state_element;
                if se.leaf_index != EPHEMERAL_LEAF_INDEX {
                    self.state
                        .elements
                        .set_leaf(se.leaf_index, siacoin_leaf_hash(&input.parent, true));
                }
            }
            for input in &txn.siafund_inputs {
                let se = &input.parent.state_element;
                self.state
                    .elements
                    .set_leaf(se.leaf_index, siafund_leaf_hash(&input.parent, true));
            }
            for fcr in &txn.file_contract_revisions {
                let elem = FileContractElement {
                    state_element: StateElement {
                        id: fcr.parent.state_element.id,
                        leaf_index: fcr.parent.state_element.leaf_index,
                        merkle_proof: Vec::new(),
                    },
                    file_contract: fcr.revision.clone(),
                };
                self.state
                    .elements
                    .set_leaf(elem.state_element.leaf_index, file_contract_leaf_hash(&elem, false));
                self.revised_file_contracts.push(elem);
            }

            // the IDs of a transaction's created elements enumerate its
            // siacoin outputs, siafund claim outputs, siafund outputs, and
            // file contracts, in that order; resolution payouts and renewal
            // contracts extend the same enumeration
            let mut next_index = (txn.siacoin_outputs.len()
                + txn.siafund_inputs.len()
                + txn.siafund_outputs.len()
                + txn.file_contracts.len()) as u64;
            let source = Hash256::from(txn.id());

            for fcr in &txn.file_contract_resolutions {
                self.state.elements.set_leaf(
                    fcr.parent.state_element.leaf_index,
                    file_contract_leaf_hash(&fcr.parent, true),
                );
                self.resolved_file_contracts.push(fcr.parent.clone());

                let fc = &fcr.parent.file_contract;
                let host_output = match &fcr.resolution {
                    ContractResolution::Missed => fc.missed_host_output(),
                    _ => fc.host_output.clone(),
                };
                self.push_siacoin_element(
                    ElementID {
                        source,
                        index: next_index,
                    },
                    fc.renter_output.clone(),
                );
                self.push_siacoin_element(
                    ElementID {
                        source,
                        index: next_index + 1,
                    },
                    host_output,
                );
                next_index += 2;

                if let ContractResolution::Renewal(renewal) = &fcr.resolution {
                    let tax = self.state.file_contract_tax(&renewal.new_contract);
                    self.state.siafund_pool =
                        self.state.siafund_pool.checked_add(tax).unwrap_or(Currency::MAX);
                    let mut elem = FileContractElement {
                        state_element: StateElement {
                            id: ElementID {
                                source,
                                index: next_index,
                            },
                            leaf_index: 0,
                            merkle_proof: Vec::new(),
                        },
                        file_contract: renewal.new_contract.clone(),
                    };
                    next_index += 1;
                    elem.state_element.leaf_index = self
                        .state
                        .elements
                        .add_leaf(file_contract_leaf_hash(&elem, false));
                    self.new_file_contracts.push(elem);
                }
            }

            for (i, fc) in txn.file_contracts.iter().enumerate() {
                let tax = self.state.file_contract_tax(fc);
                self.state.siafund_pool =
                    self.state.siafund_pool.checked_add(tax).unwrap_or(Currency::MAX);
                let mut elem = FileContractElement {
                    state_element: StateElement {
                        id: txn.file_contract_id(i),
                        leaf_index: 0,
                        merkle_proof: Vec::new(),
                    },
                    file_contract: fc.clone(),
                };
                elem.state_element.leaf_index = self
                    .state
                    .elements
                    .add_leaf(file_contract_leaf_hash(&elem, false));
                self.new_file_contracts.push(elem);
            }

            for (i, output) in txn.siacoin_outputs.iter().enumerate() {
                let id = txn.siacoin_output_id(i);
                if ephemeral_spent.contains(&id) {
                    continue;
                }
                self.push_siacoin_element(id, output.clone());
            }

            for (i, input) in txn.siafund_inputs.iter().enumerate() {
                // the claim output earns the element's share of the pool
                // growth since it was created
                let earned = self
                    .state
                    .siafund_pool
                    .checked_sub(input.parent.claim_start)
                    .unwrap_or(Currency::ZERO);
                let claim_value = earned
                    .saturating_mul64(input.parent.siafund_output.value)
                    .div64(self.state.siafund_count());
                self.push_siacoin_element(
                    txn.siafund_claim_output_id(i),
                    SiacoinOutput {
                        value: claim_value,
                        address: input.claim_address,
                    },
                );
            }

            for (i, output) in txn.siafund_outputs.iter().enumerate() {
                let mut elem = SiafundElement {
                    state_element: StateElement {
                        id: txn.siafund_output_id(i),
                        leaf_index: 0,
                        merkle_proof: Vec::new(),
                    },
                    siafund_output: output.clone(),
                    claim_start: self.state.siafund_pool,
                };
                elem.state_element.leaf_index =
                    self.state.elements.add_leaf(siafund_leaf_hash(&elem, false));
                self.new_siafund_elements.push(elem);
            }

            if let Some(addr) = txn.new_foundation_address {
                self.state.foundation_address = addr;
            }
        }
    }

    /// Recomputes the proofs of the elements the update created or revised.
    fn refresh_proofs(&mut self) {
        let elements = &self.state.elements;
        for e in self.new_siacoin_elements.iter_mut() {
            e.state_element.merkle_proof =
                elements.proof(e.state_element.leaf_index).unwrap_or_default();
        }
        for e in self.new_siafund_elements.iter_mut() {
            e.state_element.merkle_proof =
                elements.proof(e.state_element.leaf_index).unwrap_or_default();
        }
        for e in self
            .new_file_contracts
            .iter_mut()
            .chain(self.revised_file_contracts.iter_mut())
        {
            e.state_element.merkle_proof =
                elements.proof(e.state_element.leaf_index).unwrap_or_default();
        }
    }
}

/// Creates the initial State by applying the genesis block. The genesis block
/// is not validated.
pub fn genesis_update(genesis: &Block, difficulty: Work) -> ApplyUpdate {
    let mut state = State {
        index: ChainIndex {
            height: genesis.header.height,
            id: genesis.id(),
        },
        prev_timestamps: vec![genesis.header.timestamp],
        difficulty,
        ..Default::default()
    };
    state.history.push(&genesis.id());

    let mut update = ApplyUpdate::new(state);
    update.push_siacoin_element(
        genesis.miner_output_id(),
        SiacoinOutput {
            value: State::INITIAL_COINBASE,
            address: genesis.header.miner_address,
        },
    );
    update.apply_transactions(&genesis.transactions);
    update.refresh_proofs();
    update
}

/// Applies a block to the given State, producing the next State along with
/// the block's effects. The block must have already been validated.
pub fn apply_block(s: &State, block: &Block) -> ApplyUpdate {
    let reward = block
        .transactions
        .iter()
        .fold(s.block_reward(), |sum, txn| {
            sum.checked_add(txn.miner_fee).unwrap_or(Currency::MAX)
        });

    let mut state = s.clone();
    state.index = ChainIndex {
        height: block.header.height,
        id: block.id(),
    };
    state.prev_timestamps.push(block.header.timestamp);
    if state.prev_timestamps.len() > State::MEDIAN_TIMESTAMP_WINDOW {
        state.prev_timestamps.remove(0);
    }
    state.history.push(&block.id());

    let mut update = ApplyUpdate::new(state);
    update.push_siacoin_element(
        block.miner_output_id(),
        SiacoinOutput {
            value: reward,
            address: block.header.miner_address,
        },
    );
    update.apply_transactions(&block.transactions);
    update.refresh_proofs();
    update
}
