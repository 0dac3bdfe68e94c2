use std::collections::{HashMap, HashSet};

use thiserror::Error;
use time::OffsetDateTime;

use crate::consensus::State;
use crate::merkle::{
    file_contract_leaf_hash, siacoin_leaf_hash, siafund_leaf_hash, storage_proof_root,
    ElementStatus,
};
use crate::types::{
    Address, Block, BlockID, ContractResolution, Currency, ElementID, FileContract,
    FileContractElement, Hash256, SiacoinElement, SiafundElement, SpendPolicy, Transaction,
    TransactionID, EPHEMERAL_LEAF_INDEX, MAX_REVISION_NUMBER,
};
use crate::signing::Signature;

/// The reasons a transaction, transaction set, or block can be rejected.
/// Validation is total: the first rule violated determines the error, and no
/// error is recovered locally.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("transaction is structurally invalid: {0}")]
    Structural(&'static str),
    #[error("transaction set contains a duplicate transaction ({0})")]
    DuplicateTransaction(TransactionID),
    #[error("currency overflow: {0}")]
    CurrencyOverflow(&'static str),
    #[error("zero-valued output")]
    ZeroValuedOutput,
    #[error("address does not match spend policy")]
    AddressMismatch,
    #[error("invalid signature: {0}")]
    SignatureInvalid(&'static str),
    #[error("spend policy was not satisfied: {0}")]
    PolicyUnsatisfied(&'static str),
    #[error("element {0} not found in the accumulator")]
    ElementNotFound(ElementID),
    #[error("element {0} was double-spent")]
    DoubleSpend(ElementID),
    #[error("invalid file contract: {0}")]
    InvalidContract(&'static str),
    #[error("invalid file contract revision: {0}")]
    InvalidRevision(&'static str),
    #[error("invalid file contract resolution: {0}")]
    InvalidResolution(&'static str),
    #[error("file contract {0} was updated multiple times (previously updated in transaction {1})")]
    DoubleContractUpdate(ElementID, TransactionID),
    #[error("block height {got} does not match expected height {want}")]
    BlockHeight { got: u64, want: u64 },
    #[error("block parent {got} does not match expected parent {want}")]
    BlockParent { got: BlockID, want: BlockID },
    #[error("block timestamp {0}")]
    BlockTimestamp(&'static str),
    #[error("block commitment does not match header")]
    BlockCommitment,
    #[error("block ID does not meet target")]
    BlockTarget,
    #[error("block weight {weight} exceeds maximum {max}")]
    BlockOverweight { weight: u64, max: u64 },
    #[error("invalid foundation address update")]
    InvalidFoundationUpdate,
}

/// Attempts to satisfy a policy, marking the signatures it consumes in
/// `used`. The evaluator is deterministic and side-effect-free: its only
/// observable result is success or the first rule violation encountered.
fn evaluate_policy(
    policy: &SpendPolicy,
    sig_hash: &Hash256,
    height: u64,
    sigs: &[Signature],
    used: &mut Vec<bool>,
) -> Result<(), &'static str> {
    match policy {
        SpendPolicy::Above(h) => {
            if height > *h {
                Ok(())
            } else {
                Err("height is not above the policy height")
            }
        }
        SpendPolicy::AnyoneCanSpend => Ok(()),
        SpendPolicy::PublicKey(pk) => {
            for i in 0..sigs.len() {
                if !used[i] && pk.verify_hash(sig_hash, &sigs[i]) {
                    used[i] = true;
                    return Ok(());
                }
            }
            Err("no remaining signature matches the public key")
        }
        SpendPolicy::Threshold(n, subs) => {
            // sub-policies are attempted greedily in the order listed; a
            // sub-policy that consumes signatures commits them even if
            // alternative satisfactions exist
            let mut satisfied: u8 = 0;
            for sub in subs {
                if satisfied >= *n {
                    break;
                }
                let mut trial = used.clone();
                if evaluate_policy(sub, sig_hash, height, sigs, &mut trial).is_ok() {
                    *used = trial;
                    satisfied += 1;
                }
            }
            if satisfied >= *n {
                Ok(())
            } else {
                Err("threshold was not met")
            }
        }
        SpendPolicy::UnlockConditions(uc) => {
            if height < uc.timelock {
                return Err("timelock has not expired");
            }
            let mut remaining = uc.signatures_required;
            for pk in &uc.public_keys {
                if remaining == 0 {
                    break;
                }
                for i in 0..sigs.len() {
                    if !used[i] && pk.verify_hash(sig_hash, &sigs[i]) {
                        used[i] = true;
                        remaining -= 1;
                        break;
                    }
                }
            }
            if remaining == 0 {
                Ok(())
            } else {
                Err("not enough valid signatures")
            }
        }
    }
}

fn validate_spend_policy(
    s: &State,
    policy: &SpendPolicy,
    sig_hash: &Hash256,
    sigs: &[Signature],
) -> Result<(), ValidationError> {
    let mut used = vec![false; sigs.len()];
    evaluate_policy(policy, sig_hash, s.index.height, sigs, &mut used)
        .map_err(ValidationError::PolicyUnsatisfied)
}

fn siacoin_status(s: &State, parent: &SiacoinElement) -> ElementStatus {
    s.elements.status(
        &parent.state_element,
        siacoin_leaf_hash(parent, false),
        siacoin_leaf_hash(parent, true),
    )
}

fn siafund_status(s: &State, parent: &SiafundElement) -> ElementStatus {
    s.elements.status(
        &parent.state_element,
        siafund_leaf_hash(parent, false),
        siafund_leaf_hash(parent, true),
    )
}

fn contract_status(s: &State, parent: &FileContractElement) -> ElementStatus {
    s.elements.status(
        &parent.state_element,
        file_contract_leaf_hash(parent, false),
        file_contract_leaf_hash(parent, true),
    )
}

fn validate_shape(txn: &Transaction) -> Result<(), ValidationError> {
    if txn.siacoin_inputs.is_empty()
        && txn.siacoin_outputs.is_empty()
        && txn.siafund_inputs.is_empty()
        && txn.siafund_outputs.is_empty()
        && txn.file_contracts.is_empty()
        && txn.file_contract_revisions.is_empty()
        && txn.file_contract_resolutions.is_empty()
        && txn.attestations.is_empty()
        && txn.arbitrary_data.is_empty()
        && txn.new_foundation_address.is_none()
        && txn.miner_fee.is_zero()
    {
        return Err(ValidationError::Structural("transaction has no effect"));
    }
    Ok(())
}

fn validate_currency_values(txn: &Transaction) -> Result<(), ValidationError> {
    for output in &txn.siacoin_outputs {
        if output.value.is_zero() {
            return Err(ValidationError::ZeroValuedOutput);
        }
    }
    for output in &txn.siafund_outputs {
        if output.value == 0 {
            return Err(ValidationError::ZeroValuedOutput);
        }
    }
    Ok(())
}

/// The total siacoins locked up by a new contract: both payouts, the
/// collateral, and the siafund tax.
fn contract_funding(s: &State, fc: &FileContract) -> Option<Currency> {
    fc.renter_output
        .value
        .checked_add(fc.host_output.value)?
        .checked_add(fc.total_collateral)?
        .checked_add(s.file_contract_tax(fc))
}

fn validate_balance(s: &State, txn: &Transaction) -> Result<(), ValidationError> {
    let mut inputs = Currency::ZERO;
    for input in &txn.siacoin_inputs {
        inputs = inputs
            .checked_add(input.parent.siacoin_output.value)
            .ok_or(ValidationError::CurrencyOverflow("siacoin inputs"))?;
    }

    let mut outputs = Currency::ZERO;
    for output in &txn.siacoin_outputs {
        outputs = outputs
            .checked_add(output.value)
            .ok_or(ValidationError::CurrencyOverflow("siacoin outputs"))?;
    }
    for fc in &txn.file_contracts {
        let funding = contract_funding(s, fc)
            .ok_or(ValidationError::CurrencyOverflow("file contract funding"))?;
        outputs = outputs
            .checked_add(funding)
            .ok_or(ValidationError::CurrencyOverflow("file contract funding"))?;
    }
    for fcr in &txn.file_contract_resolutions {
        if let ContractResolution::Renewal(renewal) = &fcr.resolution {
            // the new contract is funded by the rollover plus any new inputs
            let funding = contract_funding(s, &renewal.new_contract)
                .ok_or(ValidationError::CurrencyOverflow("renewal funding"))?;
            let rollover = renewal
                .renter_rollover
                .checked_add(renewal.host_rollover)
                .ok_or(ValidationError::CurrencyOverflow("renewal rollover"))?;
            let net = funding
                .checked_sub(rollover)
                .ok_or(ValidationError::CurrencyOverflow("renewal rollover"))?;
            outputs = outputs
                .checked_add(net)
                .ok_or(ValidationError::CurrencyOverflow("renewal funding"))?;
        }
    }
    outputs = outputs
        .checked_add(txn.miner_fee)
        .ok_or(ValidationError::CurrencyOverflow("miner fee"))?;

    if inputs != outputs {
        return Err(ValidationError::Structural(
            "siacoin inputs do not equal outputs",
        ));
    }

    let mut sf_inputs: u64 = 0;
    for input in &txn.siafund_inputs {
        sf_inputs = sf_inputs
            .checked_add(input.parent.siafund_output.value)
            .ok_or(ValidationError::CurrencyOverflow("siafund inputs"))?;
    }
    let mut sf_outputs: u64 = 0;
    for output in &txn.siafund_outputs {
        sf_outputs = sf_outputs
            .checked_add(output.value)
            .ok_or(ValidationError::CurrencyOverflow("siafund outputs"))?;
    }
    if sf_inputs != sf_outputs {
        return Err(ValidationError::Structural(
            "siafund inputs do not equal outputs",
        ));
    }
    Ok(())
}

fn validate_siacoin_inputs(
    s: &State,
    txn: &Transaction,
    sig_hash: &Hash256,
) -> Result<(), ValidationError> {
    for input in &txn.siacoin_inputs {
        let parent = &input.parent;
        // ephemeral parents are validated against the rest of the set
        if parent.state_element.leaf_index != EPHEMERAL_LEAF_INDEX {
            match siacoin_status(s, parent) {
                ElementStatus::Unspent => {}
                ElementStatus::Spent => {
                    return Err(ValidationError::DoubleSpend(parent.state_element.id))
                }
                ElementStatus::Missing => {
                    return Err(ValidationError::ElementNotFound(parent.state_element.id))
                }
            }
        }
        if input.spend_policy.address() != parent.siacoin_output.address {
            return Err(ValidationError::AddressMismatch);
        }
        validate_spend_policy(s, &input.spend_policy, sig_hash, &input.signatures)?;
    }
    Ok(())
}

fn validate_siafund_inputs(
    s: &State,
    txn: &Transaction,
    sig_hash: &Hash256,
) -> Result<(), ValidationError> {
    for input in &txn.siafund_inputs {
        let parent = &input.parent;
        match siafund_status(s, parent) {
            ElementStatus::Unspent => {}
            ElementStatus::Spent => {
                return Err(ValidationError::DoubleSpend(parent.state_element.id))
            }
            ElementStatus::Missing => {
                return Err(ValidationError::ElementNotFound(parent.state_element.id))
            }
        }
        if input.spend_policy.address() != parent.siafund_output.address {
            return Err(ValidationError::AddressMismatch);
        }
        validate_spend_policy(s, &input.spend_policy, sig_hash, &input.signatures)?;
    }
    Ok(())
}

fn validate_file_contracts(s: &State, txn: &Transaction) -> Result<(), ValidationError> {
    for fc in &txn.file_contracts {
        if fc.window_end < fc.window_start {
            return Err(ValidationError::InvalidContract(
                "proof window ends before it begins",
            ));
        }
        let sig_hash = s.contract_sig_hash(fc);
        if !fc.renter_public_key.verify_hash(&sig_hash, &fc.renter_signature) {
            return Err(ValidationError::InvalidContract("invalid renter signature"));
        }
        if !fc.host_public_key.verify_hash(&sig_hash, &fc.host_signature) {
            return Err(ValidationError::InvalidContract("invalid host signature"));
        }
    }
    Ok(())
}

fn validate_file_contract_revisions(s: &State, txn: &Transaction) -> Result<(), ValidationError> {
    for fcr in &txn.file_contract_revisions {
        let parent = &fcr.parent;
        match contract_status(s, parent) {
            ElementStatus::Unspent => {}
            ElementStatus::Spent => {
                return Err(ValidationError::InvalidRevision(
                    "contract has already been resolved",
                ))
            }
            ElementStatus::Missing => {
                return Err(ValidationError::ElementNotFound(parent.state_element.id))
            }
        }
        let rev = &fcr.revision;
        if rev.revision_number <= parent.file_contract.revision_number {
            return Err(ValidationError::InvalidRevision(
                "revision number must increase",
            ));
        }
        if rev.window_end < rev.window_start {
            return Err(ValidationError::InvalidRevision(
                "proof window ends before it begins",
            ));
        }
        // revisions may shift value between payouts, but the total is fixed
        let parent_sum = parent
            .file_contract
            .renter_output
            .value
            .checked_add(parent.file_contract.host_output.value)
            .and_then(|sum| sum.checked_add(parent.file_contract.total_collateral))
            .ok_or(ValidationError::CurrencyOverflow("revision payouts"))?;
        let rev_sum = rev
            .renter_output
            .value
            .checked_add(rev.host_output.value)
            .and_then(|sum| sum.checked_add(rev.total_collateral))
            .ok_or(ValidationError::CurrencyOverflow("revision payouts"))?;
        if parent_sum != rev_sum {
            return Err(ValidationError::InvalidRevision(
                "revision must not change the payout sum",
            ));
        }
        let sig_hash = s.contract_sig_hash(rev);
        if !parent
            .file_contract
            .renter_public_key
            .verify_hash(&sig_hash, &rev.renter_signature)
        {
            return Err(ValidationError::InvalidRevision("invalid renter signature"));
        }
        if !parent
            .file_contract
            .host_public_key
            .verify_hash(&sig_hash, &rev.host_signature)
        {
            return Err(ValidationError::InvalidRevision("invalid host signature"));
        }
    }
    Ok(())
}

fn validate_file_contract_resolutions(s: &State, txn: &Transaction) -> Result<(), ValidationError> {
    for fcr in &txn.file_contract_resolutions {
        let parent = &fcr.parent;
        match contract_status(s, parent) {
            ElementStatus::Unspent => {}
            ElementStatus::Spent => {
                return Err(ValidationError::InvalidResolution(
                    "contract has already been resolved",
                ))
            }
            ElementStatus::Missing => {
                return Err(ValidationError::ElementNotFound(parent.state_element.id))
            }
        }
        let fc = &parent.file_contract;
        match &fcr.resolution {
            ContractResolution::Renewal(renewal) => {
                let sig_hash = s.renewal_sig_hash(renewal);
                if !fc.renter_public_key.verify_hash(&sig_hash, &renewal.renter_signature) {
                    return Err(ValidationError::InvalidResolution(
                        "invalid renter renewal signature",
                    ));
                }
                if !fc.host_public_key.verify_hash(&sig_hash, &renewal.host_signature) {
                    return Err(ValidationError::InvalidResolution(
                        "invalid host renewal signature",
                    ));
                }
                if renewal.final_revision.revision_number != MAX_REVISION_NUMBER {
                    return Err(ValidationError::InvalidResolution(
                        "final revision must set the maximum revision number",
                    ));
                }
                if renewal.renter_rollover > renewal.final_revision.renter_output.value
                    || renewal.host_rollover > renewal.final_revision.host_output.value
                {
                    return Err(ValidationError::InvalidResolution(
                        "rollover exceeds the final revision payouts",
                    ));
                }
                let new_contract = &renewal.new_contract;
                if new_contract.window_end < new_contract.window_start {
                    return Err(ValidationError::InvalidResolution(
                        "renewed proof window ends before it begins",
                    ));
                }
                let sig_hash = s.contract_sig_hash(new_contract);
                if !new_contract
                    .renter_public_key
                    .verify_hash(&sig_hash, &new_contract.renter_signature)
                    || !new_contract
                        .host_public_key
                        .verify_hash(&sig_hash, &new_contract.host_signature)
                {
                    return Err(ValidationError::InvalidResolution(
                        "invalid renewed contract signature",
                    ));
                }
            }
            ContractResolution::StorageProof(sp) => {
                if sp.window_start.height != fc.window_start {
                    return Err(ValidationError::InvalidResolution(
                        "proof window start does not match the contract",
                    ));
                }
                if !s.history.verify(&sp.window_start, &sp.window_proof) {
                    return Err(ValidationError::InvalidResolution("invalid history proof"));
                }
                let leaf_index = s.storage_proof_leaf_index(
                    fc.filesize,
                    &sp.window_start,
                    parent.state_element.id,
                );
                if storage_proof_root(&sp.leaf, leaf_index, &sp.proof) != fc.file_merkle_root {
                    return Err(ValidationError::InvalidResolution(
                        "storage proof root does not match the file Merkle root",
                    ));
                }
            }
            ContractResolution::Finalization(finalization) => {
                if finalization.revision_number != MAX_REVISION_NUMBER {
                    return Err(ValidationError::InvalidResolution(
                        "finalization must set the maximum revision number",
                    ));
                }
                if s.index.height >= fc.window_end {
                    return Err(ValidationError::InvalidResolution(
                        "proof window has expired",
                    ));
                }
                let sig_hash = s.contract_sig_hash(finalization);
                if !fc
                    .renter_public_key
                    .verify_hash(&sig_hash, &finalization.renter_signature)
                {
                    return Err(ValidationError::InvalidResolution(
                        "invalid renter signature",
                    ));
                }
                if !fc
                    .host_public_key
                    .verify_hash(&sig_hash, &finalization.host_signature)
                {
                    return Err(ValidationError::InvalidResolution("invalid host signature"));
                }
            }
            ContractResolution::Missed => {
                if s.index.height <= fc.window_end {
                    return Err(ValidationError::InvalidResolution(
                        "proof window has not expired",
                    ));
                }
            }
        }
    }
    Ok(())
}

fn validate_attestations(s: &State, txn: &Transaction) -> Result<(), ValidationError> {
    for attestation in &txn.attestations {
        let sig_hash = s.attestation_sig_hash(attestation);
        if !attestation
            .public_key
            .verify_hash(&sig_hash, &attestation.signature)
        {
            return Err(ValidationError::SignatureInvalid(
                "invalid attestation signature",
            ));
        }
    }
    Ok(())
}

fn validate_foundation_update(s: &State, txn: &Transaction) -> Result<(), ValidationError> {
    if txn.new_foundation_address.is_none() {
        return Ok(());
    }
    // only the current foundation address may designate its successor
    let authorized = txn
        .siacoin_inputs
        .iter()
        .any(|input| input.parent.siacoin_output.address == s.foundation_address);
    if authorized {
        Ok(())
    } else {
        Err(ValidationError::InvalidFoundationUpdate)
    }
}

/// Validates a transaction against the given State. Ephemeral inputs are
/// validated against the rest of their transaction set, not here.
pub fn validate_transaction(s: &State, txn: &Transaction) -> Result<(), ValidationError> {
    validate_shape(txn)?;
    validate_currency_values(txn)?;
    validate_balance(s, txn)?;
    let sig_hash = s.input_sig_hash(txn);
    validate_siacoin_inputs(s, txn, &sig_hash)?;
    validate_siafund_inputs(s, txn, &sig_hash)?;
    validate_file_contracts(s, txn)?;
    validate_file_contract_revisions(s, txn)?;
    validate_file_contract_resolutions(s, txn)?;
    validate_attestations(s, txn)?;
    validate_foundation_update(s, txn)
}

/// Validates a set of transactions as a unit: total weight, no duplicate
/// transactions, no double-spends, no double contract updates, and ephemeral
/// inputs resolving to earlier outputs within the set. Each transaction must
/// also be individually valid.
pub fn validate_transaction_set(s: &State, txns: &[Transaction]) -> Result<(), ValidationError> {
    let weight = txns
        .iter()
        .fold(0u64, |sum, txn| sum.saturating_add(s.transaction_weight(txn)));
    if weight > s.max_block_weight() {
        return Err(ValidationError::BlockOverweight {
            weight,
            max: s.max_block_weight(),
        });
    }

    let mut seen_txns: HashSet<TransactionID> = HashSet::new();
    let mut spent: HashSet<ElementID> = HashSet::new();
    let mut updated_contracts: HashMap<ElementID, TransactionID> = HashMap::new();
    let mut set_outputs: HashMap<ElementID, (Address, Currency)> = HashMap::new();

    for txn in txns {
        let txid = txn.id();
        if !seen_txns.insert(txid) {
            return Err(ValidationError::DuplicateTransaction(txid));
        }
        for input in &txn.siacoin_inputs {
            let parent = &input.parent;
            let id = parent.state_element.id;
            if !spent.insert(id) {
                return Err(ValidationError::DoubleSpend(id));
            }
            if parent.state_element.leaf_index == EPHEMERAL_LEAF_INDEX {
                // an ephemeral parent must exactly match an output of an
                // earlier transaction in the set
                match set_outputs.get(&id) {
                    Some((address, value))
                        if *address == parent.siacoin_output.address
                            && *value == parent.siacoin_output.value => {}
                    _ => return Err(ValidationError::ElementNotFound(id)),
                }
            }
        }
        for input in &txn.siafund_inputs {
            let id = input.parent.state_element.id;
            if !spent.insert(id) {
                return Err(ValidationError::DoubleSpend(id));
            }
            if input.parent.state_element.leaf_index == EPHEMERAL_LEAF_INDEX {
                return Err(ValidationError::ElementNotFound(id));
            }
        }
        for fcr in &txn.file_contract_revisions {
            let id = fcr.parent.state_element.id;
            if let Some(prev) = updated_contracts.insert(id, txid) {
                return Err(ValidationError::DoubleContractUpdate(id, prev));
            }
        }
        for fcr in &txn.file_contract_resolutions {
            let id = fcr.parent.state_element.id;
            if let Some(prev) = updated_contracts.insert(id, txid) {
                return Err(ValidationError::DoubleContractUpdate(id, prev));
            }
        }
        for (i, output) in txn.siacoin_outputs.iter().enumerate() {
            set_outputs.insert(txn.siacoin_output_id(i), (output.address, output.value));
        }
    }

    for txn in txns {
        validate_transaction(s, txn)?;
    }
    Ok(())
}

/// Validates a block against the State at its parent: header checks first,
/// then the body as a transaction set.
pub fn validate_block(s: &State, block: &Block) -> Result<(), ValidationError> {
    let header = &block.header;
    if header.height != s.index.height + 1 {
        return Err(ValidationError::BlockHeight {
            got: header.height,
            want: s.index.height + 1,
        });
    }
    if header.parent_id != s.index.id {
        return Err(ValidationError::BlockParent {
            got: header.parent_id,
            want: s.index.id,
        });
    }
    if header.timestamp < s.median_timestamp() {
        return Err(ValidationError::BlockTimestamp(
            "is earlier than the median of recent blocks",
        ));
    }
    if header.timestamp > OffsetDateTime::now_utc() + State::MAX_FUTURE_TIMESTAMP {
        return Err(ValidationError::BlockTimestamp("is too far in the future"));
    }
    if header.commitment != s.commitment(&header.miner_address, &block.transactions) {
        return Err(ValidationError::BlockCommitment);
    }
    if !header.id().meets_target(&s.child_target()) {
        return Err(ValidationError::BlockTarget);
    }
    validate_transaction_set(s, &block.transactions)
}
