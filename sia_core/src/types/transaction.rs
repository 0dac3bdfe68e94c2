use blake2b_simd::Params;
use serde::de::{Error, MapAccess, Visitor};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;

use crate::encoding::{self, SiaDecodable, SiaDecode, SiaEncodable, SiaEncode};
use crate::signing::{PublicKey, Signature};
use crate::types::{
    Address, BlockID, ChainIndex, Currency, ElementID, Hash256, Leaf, SiacoinOutput,
    SiafundOutput, SpendPolicy, StateElement, TransactionID, EPHEMERAL_LEAF_INDEX,
};

/// An Attestation associates a key-value pair with an identity. For example,
/// hosts attest to their network address by setting the key to
/// "HostAnnouncement" and the value to their address, allowing renters to
/// discover them. An attestation for a particular key overwrites any previous
/// attestation with the same key.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, SiaEncode, SiaDecode)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    pub public_key: PublicKey,
    pub key: String,
    pub value: Vec<u8>,

    pub signature: Signature,
}

/// A FileContract is a storage agreement between a renter and a host. It
/// consists of a bidirectional payment channel that resolves as either
/// "valid" or "missed" depending on whether a valid resolution is submitted
/// for the contract before its proof window expires.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, SiaEncode, SiaDecode)]
#[serde(rename_all = "camelCase")]
pub struct FileContract {
    pub filesize: u64,
    pub file_merkle_root: Hash256,
    pub window_start: u64,
    pub window_end: u64,
    pub renter_output: SiacoinOutput,
    pub host_output: SiacoinOutput,
    pub missed_host_value: Currency,
    pub total_collateral: Currency,
    pub renter_public_key: PublicKey,
    pub host_public_key: PublicKey,
    pub revision_number: u64,

    // signatures cover above fields
    pub renter_signature: Signature,
    pub host_signature: Signature,
}

/// MAX_REVISION_NUMBER is used to finalize a contract. When a contract's
/// revision number is set to this value, no further revisions are possible.
pub const MAX_REVISION_NUMBER: u64 = u64::MAX;

impl FileContract {
    /// The host output created if the contract resolves missed; the host
    /// forfeits everything above missed_host_value.
    pub fn missed_host_output(&self) -> SiacoinOutput {
        SiacoinOutput {
            value: self.missed_host_value,
            address: self.host_output.address,
        }
    }
}

/// A SiacoinElement is a volume of siacoins that is created and spent as an
/// atomic unit.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, SiaEncode, SiaDecode)]
#[serde(rename_all = "camelCase")]
pub struct SiacoinElement {
    pub state_element: StateElement,
    pub siacoin_output: SiacoinOutput,
}

/// A SiafundElement is a volume of siafunds that is created and spent as an
/// atomic unit. claim_start records the value of the siafund pool when the
/// element was created.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, SiaEncode, SiaDecode)]
#[serde(rename_all = "camelCase")]
pub struct SiafundElement {
    pub state_element: StateElement,
    pub siafund_output: SiafundOutput,
    pub claim_start: Currency,
}

/// A FileContractElement is a record of a FileContract within the state
/// accumulator.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, SiaEncode, SiaDecode)]
#[serde(rename_all = "camelCase")]
pub struct FileContractElement {
    pub state_element: StateElement,
    pub file_contract: FileContract,
}

/// A SiacoinInput spends an unspent SiacoinElement in the state accumulator
/// by revealing its spend policy and signing the transaction.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, SiaEncode, SiaDecode)]
#[serde(rename_all = "camelCase")]
pub struct SiacoinInput {
    pub parent: SiacoinElement,
    pub spend_policy: SpendPolicy,
    pub signatures: Vec<Signature>,
}

/// A SiafundInput spends an unspent SiafundElement in the state accumulator.
/// It also includes a claim address, specifying the recipient of the siacoins
/// that were earned by the element.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, SiaEncode, SiaDecode)]
#[serde(rename_all = "camelCase")]
pub struct SiafundInput {
    pub parent: SiafundElement,
    pub claim_address: Address,
    pub spend_policy: SpendPolicy,
    pub signatures: Vec<Signature>,
}

/// A FileContractRevision updates the state of an existing file contract.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, SiaEncode, SiaDecode)]
#[serde(rename_all = "camelCase")]
pub struct FileContractRevision {
    pub parent: FileContractElement,
    pub revision: FileContract,
}

/// A FileContractRenewal finalizes a file contract and initializes a new one,
/// optionally rolling over a portion of the old contract's funds.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, SiaEncode, SiaDecode)]
#[serde(rename_all = "camelCase")]
pub struct FileContractRenewal {
    pub final_revision: FileContract,
    pub new_contract: FileContract,
    pub renter_rollover: Currency,
    pub host_rollover: Currency,

    // signatures cover above fields
    pub renter_signature: Signature,
    pub host_signature: Signature,
}

/// A StorageProof asserts the presence of a randomly-selected leaf within the
/// Merkle tree of a FileContract's data.
///
/// Selecting the leaf requires a source of unpredictable entropy; the ID of
/// the block at the start of the proof window is used. The proof includes
/// that index and asserts its presence in the chain via a separate Merkle
/// proof. window_start.height must match the window_start field of the
/// contract's final revision; otherwise the prover could choose any index,
/// giving them control over the leaf selection.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, SiaEncode, SiaDecode)]
#[serde(rename_all = "camelCase")]
pub struct StorageProof {
    pub window_start: ChainIndex,
    pub window_proof: Vec<Hash256>,

    // The leaf is always 64 bytes, extended with zeros if necessary.
    pub leaf: Leaf,
    pub proof: Vec<Hash256>,
}

/// The four mutually exclusive ways to resolve a file contract:
///
/// 1. The renter and host can renew the contract. The old contract is
///    finalized, and a portion of its funds are "rolled over" into a new
///    contract.
///
/// 2. The host can submit a valid storage proof within the contract's proof
///    window. This is a "valid" resolution.
///
/// 3. The renter and host can sign a final revision (a "finalization") with
///    the maximum revision number, submittable any time before the contract's
///    window_end. This is a "valid" resolution.
///
/// 4. After the proof window has expired, anyone can submit an empty
///    resolution. This is a "missed" resolution: the host output is reduced
///    to missed_host_value.
#[derive(Debug, PartialEq, Clone)]
pub enum ContractResolution {
    Renewal(FileContractRenewal),
    StorageProof(StorageProof),
    Finalization(FileContract),
    Missed,
}

/// A FileContractResolution closes a file contract's payment channel. Once a
/// contract has been resolved, it cannot be revised or resolved again.
#[derive(Debug, PartialEq, Clone)]
pub struct FileContractResolution {
    pub parent: FileContractElement,
    pub resolution: ContractResolution,
}

impl SiaEncodable for FileContractResolution {
    fn encode<W: std::io::Write>(&self, w: &mut W) -> encoding::Result<()> {
        self.parent.encode(w)?;
        match &self.resolution {
            ContractResolution::Renewal(renewal) => {
                0u8.encode(w)?;
                renewal.encode(w)
            }
            ContractResolution::StorageProof(proof) => {
                1u8.encode(w)?;
                proof.encode(w)
            }
            ContractResolution::Finalization(fc) => {
                2u8.encode(w)?;
                fc.encode(w)
            }
            ContractResolution::Missed => 3u8.encode(w),
        }
    }
}

impl SiaDecodable for FileContractResolution {
    fn decode<R: std::io::Read>(r: &mut R) -> encoding::Result<Self> {
        let parent = FileContractElement::decode(r)?;
        let resolution = match u8::decode(r)? {
            0 => ContractResolution::Renewal(FileContractRenewal::decode(r)?),
            1 => ContractResolution::StorageProof(StorageProof::decode(r)?),
            2 => ContractResolution::Finalization(FileContract::decode(r)?),
            3 => ContractResolution::Missed,
            _ => {
                return Err(encoding::Error::Custom(
                    "invalid contract resolution type".to_string(),
                ))
            }
        };
        Ok(FileContractResolution { parent, resolution })
    }
}

impl Serialize for FileContractResolution {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("FileContractResolution", 3)?;
        state.serialize_field("parent", &self.parent)?;
        state.serialize_field(
            "type",
            &match &self.resolution {
                ContractResolution::Renewal(_) => "renewal",
                ContractResolution::StorageProof(_) => "storageProof",
                ContractResolution::Finalization(_) => "finalization",
                ContractResolution::Missed => "missed",
            },
        )?;
        let resolution = match &self.resolution {
            ContractResolution::Renewal(renewal) => {
                serde_json::to_value(renewal).map_err(serde::ser::Error::custom)?
            }
            ContractResolution::StorageProof(proof) => {
                serde_json::to_value(proof).map_err(serde::ser::Error::custom)?
            }
            ContractResolution::Finalization(fc) => {
                serde_json::to_value(fc).map_err(serde::ser::Error::custom)?
            }
            ContractResolution::Missed => json!({}),
        };
        state.serialize_field("resolution", &resolution)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for FileContractResolution {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct FileContractResolutionVisitor;

        impl<'de> Visitor<'de> for FileContractResolutionVisitor {
            type Value = FileContractResolution;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("struct FileContractResolution")
            }

            fn visit_map<V>(self, mut map: V) -> Result<Self::Value, V::Error>
            where
                V: MapAccess<'de>,
            {
                let mut parent: Option<FileContractElement> = None;
                let mut resolution_type: Option<String> = None;
                let mut resolution_value: Option<serde_json::Value> = None;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "parent" => parent = Some(map.next_value()?),
                        "type" => resolution_type = Some(map.next_value()?),
                        "resolution" => resolution_value = Some(map.next_value()?),
                        _ => {
                            return Err(serde::de::Error::unknown_field(
                                key.as_str(),
                                &["parent", "type", "resolution"],
                            ));
                        }
                    }
                }

                let parent = parent.ok_or_else(|| serde::de::Error::missing_field("parent"))?;
                let resolution_type =
                    resolution_type.ok_or_else(|| serde::de::Error::missing_field("type"))?;
                let resolution_value = resolution_value
                    .ok_or_else(|| serde::de::Error::missing_field("resolution"))?;

                let resolution = match resolution_type.as_str() {
                    "renewal" => ContractResolution::Renewal(
                        serde_json::from_value(resolution_value).map_err(Error::custom)?,
                    ),
                    "storageProof" => ContractResolution::StorageProof(
                        serde_json::from_value(resolution_value).map_err(Error::custom)?,
                    ),
                    "finalization" => ContractResolution::Finalization(
                        serde_json::from_value(resolution_value).map_err(Error::custom)?,
                    ),
                    "missed" => ContractResolution::Missed,
                    _ => return Err(serde::de::Error::custom("invalid contract resolution type")),
                };

                Ok(FileContractResolution { parent, resolution })
            }
        }
        deserializer.deserialize_struct(
            "FileContractResolution",
            &["parent", "type", "resolution"],
            FileContractResolutionVisitor,
        )
    }
}

/// A Transaction effects a change of blockchain state.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize, SiaEncode, SiaDecode)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub siacoin_inputs: Vec<SiacoinInput>,
    pub siacoin_outputs: Vec<SiacoinOutput>,
    pub siafund_inputs: Vec<SiafundInput>,
    pub siafund_outputs: Vec<SiafundOutput>,
    pub file_contracts: Vec<FileContract>,
    pub file_contract_revisions: Vec<FileContractRevision>,
    pub file_contract_resolutions: Vec<FileContractResolution>,
    pub attestations: Vec<Attestation>,
    pub arbitrary_data: Vec<u8>,
    pub new_foundation_address: Option<Address>,
    pub miner_fee: Currency,
}

impl Transaction {
    /// Returns the "semantic hash" of the transaction, covering all of its
    /// effects but not incidental data such as input signatures or Merkle
    /// proofs. This ensures that the ID remains stable (i.e. non-malleable)
    /// under proof refresh and signature stripping.
    pub fn id(&self) -> TransactionID {
        let mut h = Params::new().hash_length(32).to_state();
        "sia/id/transaction".encode(&mut h).unwrap();
        self.siacoin_inputs.len().encode(&mut h).unwrap();
        for input in &self.siacoin_inputs {
            input.parent.state_element.id.encode(&mut h).unwrap();
        }
        self.siacoin_outputs.encode(&mut h).unwrap();
        self.siafund_inputs.len().encode(&mut h).unwrap();
        for input in &self.siafund_inputs {
            input.parent.state_element.id.encode(&mut h).unwrap();
        }
        self.siafund_outputs.encode(&mut h).unwrap();
        self.file_contracts.encode(&mut h).unwrap();
        self.file_contract_revisions.len().encode(&mut h).unwrap();
        for fcr in &self.file_contract_revisions {
            fcr.parent.state_element.id.encode(&mut h).unwrap();
            fcr.revision.encode(&mut h).unwrap();
        }
        self.file_contract_resolutions.len().encode(&mut h).unwrap();
        for fcr in &self.file_contract_resolutions {
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
        self.attestations.encode(&mut h).unwrap();
        self.arbitrary_data.encode(&mut h).unwrap();
        self.new_foundation_address.encode(&mut h).unwrap();
        self.miner_fee.encode(&mut h).unwrap();
        TransactionID::from(h.finalize())
    }

    /// Returns the ID of the siacoin output at index i.
    pub fn siacoin_output_id(&self, i: usize) -> ElementID {
        ElementID {
            source: Hash256::from(self.id()),
            index: i as u64,
        }
    }

    /// Returns the ID of the siacoin claim output for the siafund input at
    /// index i.
    pub fn siafund_claim_output_id(&self, i: usize) -> ElementID {
        ElementID {
            source: Hash256::from(self.id()),
            index: (self.siacoin_outputs.len() + i) as u64,
        }
    }

    /// Returns the ID of the siafund output at index i.
    pub fn siafund_output_id(&self, i: usize) -> ElementID {
        ElementID {
            source: Hash256::from(self.id()),
            index: (self.siacoin_outputs.len() + self.siafund_inputs.len() + i) as u64,
        }
    }

    /// Returns the ID of the file contract at index i.
    pub fn file_contract_id(&self, i: usize) -> ElementID {
        ElementID {
            source: Hash256::from(self.id()),
            index: (self.siacoin_outputs.len()
                + self.siafund_inputs.len()
                + self.siafund_outputs.len()
                + i) as u64,
        }
    }

    /// Returns the siacoin output at index i as an ephemeral element, for use
    /// as the parent of an input within the same block.
    pub fn ephemeral_siacoin_element(&self, i: usize) -> SiacoinElement {
        SiacoinElement {
            state_element: StateElement {
                id: self.siacoin_output_id(i),
                leaf_index: EPHEMERAL_LEAF_INDEX,
                merkle_proof: Vec::new(),
            },
            siacoin_output: self.siacoin_outputs[i].clone(),
        }
    }
}

/// A BlockHeader contains a block's non-transaction data.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, SiaEncode, SiaDecode)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub height: u64,
    #[serde(rename = "parentID")]
    pub parent_id: BlockID,
    pub nonce: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub miner_address: Address,
    pub commitment: Hash256,
}

impl BlockHeader {
    /// Returns a hash that uniquely identifies the block. Although only 48
    /// bytes of data are hashed, the preimage is an 80-byte buffer with the
    /// nonce at [32:40] for compatibility with existing mining hardware.
    pub fn id(&self) -> BlockID {
        let mut buf = [0u8; 32 + 8 + 8 + 32];
        buf[..12].copy_from_slice(b"sia/id/block");
        buf[32..40].copy_from_slice(&self.nonce.to_le_bytes());
        buf[40..48].copy_from_slice(&(self.timestamp.unix_timestamp() as u64).to_le_bytes());
        buf[48..].copy_from_slice(self.commitment.as_ref());
        BlockID::from(Params::new().hash_length(32).hash(&buf))
    }

    /// Returns the header's chain index.
    pub fn index(&self) -> ChainIndex {
        ChainIndex {
            height: self.height,
            id: self.id(),
        }
    }

    /// Returns the index of the header's parent.
    pub fn parent_index(&self) -> ChainIndex {
        ChainIndex {
            height: self.height - 1,
            id: self.parent_id,
        }
    }
}

/// A Block is a set of transactions grouped under a header.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, SiaEncode, SiaDecode)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Returns a hash that uniquely identifies the block. Equivalent to
    /// header.id().
    pub fn id(&self) -> BlockID {
        self.header.id()
    }

    /// Returns the block's chain index. Equivalent to header.index().
    pub fn index(&self) -> ChainIndex {
        self.header.index()
    }

    /// Returns the ID of the miner reward output created by the block.
    pub fn miner_output_id(&self) -> ElementID {
        ElementID {
            source: Hash256::from(self.id()),
            index: 0,
        }
    }
}
