use blake2b_simd::Params;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::encoding::{CountingSink, SiaEncodable};
use crate::merkle::{ElementAccumulator, HistoryAccumulator};
use crate::types::work::hash_requiring_work;
use crate::types::{
    Address, Attestation, BlockID, ChainIndex, ContractResolution, Currency, ElementID,
    FileContract, FileContractRenewal, Hash256, Transaction, Work,
};

/// State represents the state of the chain as of a particular block. It
/// carries everything needed to validate the next block or transaction. A
/// validator never mutates it; applying a block produces a fresh State.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    pub index: ChainIndex,
    /// Timestamps of up to the last 11 blocks, oldest first.
    pub prev_timestamps: Vec<OffsetDateTime>,
    pub difficulty: Work,
    pub siafund_pool: Currency,
    pub foundation_address: Address,

    pub elements: ElementAccumulator,
    pub history: HistoryAccumulator,
}

impl State {
    /// The block reward at the first block.
    pub const INITIAL_COINBASE: Currency = Currency::siacoins(300_000);
    /// The floor of the block reward schedule.
    pub const MINIMUM_COINBASE: Currency = Currency::siacoins(30_000);
    /// The number of ancestor timestamps used for the median timestamp check.
    pub const MEDIAN_TIMESTAMP_WINDOW: usize = 11;
    /// How far ahead of local time a block timestamp may be.
    pub const MAX_FUTURE_TIMESTAMP: Duration = Duration::hours(2);

    /// The height of the next block.
    pub fn child_height(&self) -> u64 {
        self.index.height + 1
    }

    /// The number of siafunds in existence.
    pub fn siafund_count(&self) -> u64 {
        10_000
    }

    /// The reward for mining a child block: the initial coinbase reduced by
    /// one siacoin per block, floored at the minimum coinbase.
    pub fn block_reward(&self) -> Currency {
        let reward = Self::INITIAL_COINBASE.checked_sub(Currency::siacoins(self.child_height()));
        match reward {
            Some(reward) if reward >= Self::MINIMUM_COINBASE => reward,
            _ => Self::MINIMUM_COINBASE,
        }
    }

    /// The maximum combined weight of a block's transactions.
    pub fn max_block_weight(&self) -> u64 {
        2_000_000
    }

    /// The weight of a transaction: its canonical encoded size.
    pub fn transaction_weight(&self, txn: &Transaction) -> u64 {
        let mut sink = CountingSink::new();
        txn.encode(&mut sink).unwrap(); // writes to a CountingSink are infallible
        sink.written()
    }

    /// The target that a child block's ID must meet.
    pub fn child_target(&self) -> BlockID {
        hash_requiring_work(self.difficulty)
    }

    /// The portion of a new contract's payout that is sent to the siafund
    /// pool: 4% of the renter and host payouts, floored.
    pub fn file_contract_tax(&self, fc: &FileContract) -> Currency {
        let payout = (*fc.renter_output.value).saturating_add(*fc.host_output.value);
        Currency::new(payout).div64(25)
    }

    /// The median of the ancestor timestamp window. For an even number of
    /// timestamps, the midpoint of the two middle values is used.
    pub fn median_timestamp(&self) -> OffsetDateTime {
        let mut ts = self.prev_timestamps.clone();
        ts.sort();
        let n = ts.len();
        if n == 0 {
            return OffsetDateTime::UNIX_EPOCH;
        }
        if n % 2 == 1 {
            ts[n / 2]
        } else {
            let (a, b) = (ts[n / 2 - 1], ts[n / 2]);
            a + (b - a) / 2
        }
    }

    /// Deterministically selects which 64-byte leaf of a contract's data must
    /// be proven. The index is derived from the ID of the block at the start
    /// of the proof window together with the contract's ID, so it cannot be
    /// predicted before the window opens.
    pub fn storage_proof_leaf_index(
        &self,
        filesize: u64,
        window_start: &ChainIndex,
        contract_id: ElementID,
    ) -> u64 {
        const LEAF_SIZE: u64 = 64;
        let num_leaves = filesize.div_ceil(LEAF_SIZE);
        if num_leaves == 0 {
            return 0;
        }
        let mut state = Params::new().hash_length(32).to_state();
        "sia/id/storageproofleaf".encode(&mut state).unwrap();
        window_start.id.encode(&mut state).unwrap();
        contract_id.encode(&mut state).unwrap();
        let seed = state.finalize();

        // reduce the 256-bit seed modulo num_leaves, big-endian
        let mut r: u64 = 0;
        for chunk in seed.as_bytes().chunks(8) {
            let v = u64::from_be_bytes(chunk.try_into().unwrap());
            r = ((((r as u128) << 64) | v as u128) % num_leaves as u128) as u64;
        }
        r
    }

    /// The hash signed by each of a transaction's inputs. It covers all of
    /// the transaction's semantically meaningful fields, but deliberately
    /// omits the input signature lists (so that signatures over the hash are
    /// well-defined) and the parents' Merkle proofs (so that the hash remains
    /// stable under proof refresh).
    pub fn input_sig_hash(&self, txn: &Transaction) -> Hash256 {
        let mut h = Params::new().hash_length(32).to_state();
        "sia/sig/input".encode(&mut h).unwrap();
        txn.siacoin_inputs.len().encode(&mut h).unwrap();
        for input in &txn.siacoin_inputs {
            input.parent.state_element.id.encode(&mut h).unwrap();
            input.spend_policy.encode(&mut h).unwrap();
        }
        txn.siacoin_outputs.encode(&mut h).unwrap();
        txn.siafund_inputs.len().encode(&mut h).unwrap();
        for input in &txn.siafund_inputs {
            input.parent.state_element.id.encode(&mut h).unwrap();
            input.claim_address.encode(&mut h).unwrap();
            input.spend_policy.encode(&mut h).unwrap();
        }
        txn.siafund_outputs.encode(&mut h).unwrap();
        txn.file_contracts.encode(&mut h).unwrap();
        txn.file_contract_revisions.len().encode(&mut h).unwrap();
        for fcr in &txn.file_contract_revisions {
            fcr.parent.state_element.id.encode(&mut h).unwrap();
            fcr.revision.encode(&mut h).unwrap();
        }
        txn.file_contract_resolutions.len().encode(&mut h).unwrap();
        for fcr in &txn.file_contract_resolutions {
            fcr.parent.state_element.id.encode(&mut h).unwrap();
            match &fcr.resolution {
                ContractResolution::Renewal(renewal) => {
                    0u8.encode(&mut h).unwrap();
                    renewal.encode(&mut h).unwrap();
                }
                ContractResolution::StorageProof(sp) => {
                    1u8.encode(&mut h).unwrap();
                    sp.window_start.encode(&mut h).unwrap();
                }
                ContractResolution::Finalization(fc) => {
                    2u8.encode(&mut h).unwrap();
                    fc.encode(&mut h).unwrap();
                }
                ContractResolution::Missed => 3u8.encode(&mut h).unwrap(),
            }
        }
        txn.attestations.encode(&mut h).unwrap();
        txn.arbitrary_data.encode(&mut h).unwrap();
        txn.new_foundation_address.encode(&mut h).unwrap();
        txn.miner_fee.encode(&mut h).unwrap();
        Hash256::from(h.finalize())
    }

    /// The hash signed by a contract's renter and host keys. It covers every
    /// contract field except the signatures themselves.
    pub fn contract_sig_hash(&self, fc: &FileContract) -> Hash256 {
        let mut h = Params::new().hash_length(32).to_state();
        "sia/sig/contract".encode(&mut h).unwrap();
        fc.filesize.encode(&mut h).unwrap();
        fc.file_merkle_root.encode(&mut h).unwrap();
        fc.window_start.encode(&mut h).unwrap();
        fc.window_end.encode(&mut h).unwrap();
        fc.renter_output.encode(&mut h).unwrap();
        fc.host_output.encode(&mut h).unwrap();
        fc.missed_host_value.encode(&mut h).unwrap();
        fc.total_collateral.encode(&mut h).unwrap();
        fc.renter_public_key.encode(&mut h).unwrap();
        fc.host_public_key.encode(&mut h).unwrap();
        fc.revision_number.encode(&mut h).unwrap();
        Hash256::from(h.finalize())
    }

    /// The hash signed by both parties to a renewal. It covers the final
    /// revision, the new contract, and the rollover amounts.
    pub fn renewal_sig_hash(&self, renewal: &FileContractRenewal) -> Hash256 {
        let mut h = Params::new().hash_length(32).to_state();
        "sia/sig/renewal".encode(&mut h).unwrap();
        renewal.final_revision.encode(&mut h).unwrap();
        renewal.new_contract.encode(&mut h).unwrap();
        renewal.renter_rollover.encode(&mut h).unwrap();
        renewal.host_rollover.encode(&mut h).unwrap();
        Hash256::from(h.finalize())
    }

    /// The hash signed by an attestation's key, covering the attesting key,
    /// the attestation key, and the value.
    pub fn attestation_sig_hash(&self, attestation: &Attestation) -> Hash256 {
        let mut h = Params::new().hash_length(32).to_state();
        "sia/sig/attestation".encode(&mut h).unwrap();
        attestation.public_key.encode(&mut h).unwrap();
        attestation.key.encode(&mut h).unwrap();
        attestation.value.encode(&mut h).unwrap();
        Hash256::from(h.finalize())
    }

    /// The commitment hash that a block header must carry, binding the miner
    /// address and the transaction set. The validator recomputes it.
    pub fn commitment(&self, miner_address: &Address, transactions: &[Transaction]) -> Hash256 {
        let mut h = Params::new().hash_length(32).to_state();
        "sia/commitment".encode(&mut h).unwrap();
        miner_address.encode(&mut h).unwrap();
        transactions.len().encode(&mut h).unwrap();
        for txn in transactions {
            txn.id().encode(&mut h).unwrap();
        }
        Hash256::from(h.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SiacoinOutput, SiafundOutput};

    #[test]
    fn test_block_reward_value() {
        let reward = |height: u64| {
            State {
                index: ChainIndex {
                    height: height - 1,
                    id: BlockID::default(),
                },
                ..Default::default()
            }
            .block_reward()
        };

        let tests = [
            (1, Currency::siacoins(299_999)),
            (100_000, Currency::siacoins(200_000)),
            (269_999, Currency::siacoins(30_001)),
            (270_000, Currency::siacoins(30_000)),
            (270_001, Currency::siacoins(30_000)),
            (1_000_000, Currency::siacoins(30_000)),
        ];
        for (height, expected) in tests {
            assert_eq!(reward(height), expected, "height {}", height);
        }
    }

    #[test]
    fn test_transaction_weight() {
        let s = State::default();
        let empty = Transaction::default();
        let w = s.transaction_weight(&empty);
        assert!(w > 0);

        let larger = Transaction {
            siacoin_outputs: vec![SiacoinOutput {
                value: Currency::siacoins(1),
                address: Address::new([0; 32]),
            }],
            siafund_outputs: vec![SiafundOutput {
                value: 1,
                address: Address::new([0; 32]),
            }],
            ..Default::default()
        };
        assert!(s.transaction_weight(&larger) > w);
    }

    #[test]
    fn test_storage_proof_leaf_index() {
        let s = State::default();
        let window_start = ChainIndex {
            height: 5,
            id: BlockID::new([7; 32]),
        };
        let contract_id = ElementID {
            source: Hash256::new([1; 32]),
            index: 4,
        };

        // deterministic, and depends only on (filesize, window_start.id, id)
        let index = s.storage_proof_leaf_index(640, &window_start, contract_id);
        assert_eq!(index, s.storage_proof_leaf_index(640, &window_start, contract_id));
        assert!(index < 10);
        let same_id = ChainIndex {
            height: 9999,
            id: window_start.id,
        };
        assert_eq!(index, s.storage_proof_leaf_index(640, &same_id, contract_id));

        // a different contract or entropy source selects independently
        let other_id = ElementID {
            source: Hash256::new([2; 32]),
            index: 4,
        };
        let mut distinct = false;
        for filesize in (64..64 * 100).step_by(64) {
            let a = s.storage_proof_leaf_index(filesize, &window_start, contract_id);
            let b = s.storage_proof_leaf_index(filesize, &window_start, other_id);
            assert!(a < filesize.div_ceil(64));
            assert!(b < filesize.div_ceil(64));
            distinct = distinct || a != b;
        }
        assert!(distinct);

        // an empty file has a single (zero-filled) leaf
        assert_eq!(s.storage_proof_leaf_index(0, &window_start, contract_id), 0);
    }

    #[test]
    fn test_median_timestamp() {
        let ts = |secs: i64| OffsetDateTime::from_unix_timestamp(secs).unwrap();
        let mut s = State {
            prev_timestamps: vec![ts(100)],
            ..Default::default()
        };
        assert_eq!(s.median_timestamp(), ts(100));

        s.prev_timestamps = vec![ts(100), ts(300)];
        assert_eq!(s.median_timestamp(), ts(200));

        s.prev_timestamps = vec![ts(300), ts(100), ts(200)];
        assert_eq!(s.median_timestamp(), ts(200));
    }

    #[test]
    fn test_commitment_binds_contents() {
        let s = State::default();
        let txn = Transaction {
            miner_fee: Currency::siacoins(1),
            ..Default::default()
        };
        let base = s.commitment(&Address::new([1; 32]), std::slice::from_ref(&txn));
        assert_eq!(
            base,
            s.commitment(&Address::new([1; 32]), std::slice::from_ref(&txn))
        );
        assert_ne!(base, s.commitment(&Address::new([2; 32]), std::slice::from_ref(&txn)));
        assert_ne!(base, s.commitment(&Address::new([1; 32]), &[]));
    }
}
