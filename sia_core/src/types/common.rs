use core::fmt;

use blake2b_simd::Params;
use serde::{Deserialize, Serialize};

use crate::encoding::{SiaDecodable, SiaDecode, SiaEncodable, SiaEncode};
use crate::macros::impl_hash_id;
use crate::types::currency::Currency;

impl_hash_id!(Hash256, "h");
impl_hash_id!(BlockID, "bid");
impl_hash_id!(TransactionID, "txid");

/// The leaf index assigned to state elements that are created and spent within
/// the same block. Such elements carry no accumulator proof and are never
/// inserted into the accumulator, but they still contribute to transaction
/// IDs and the block commitment.
pub const EPHEMERAL_LEAF_INDEX: u64 = u64::MAX;

impl BlockID {
    /// meets_target returns true if the ID is not greater than t, interpreting
    /// both as 256-bit big-endian integers.
    pub fn meets_target(&self, t: &BlockID) -> bool {
        self.0 <= t.0
    }
}

impl From<BlockID> for Hash256 {
    fn from(id: BlockID) -> Self {
        Hash256::new(id.into())
    }
}

impl From<TransactionID> for Hash256 {
    fn from(id: TransactionID) -> Self {
        Hash256::new(id.into())
    }
}

/// A ChainIndex pairs a block's height with its ID.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, SiaEncode, SiaDecode)]
pub struct ChainIndex {
    pub height: u64,
    pub id: BlockID,
}

impl ChainIndex {
    pub fn child_height(&self) -> u64 {
        self.height + 1
    }

    pub fn parse_string(s: &str) -> Result<Self, HexParseError> {
        let (height, id) = s.split_once("::").ok_or(HexParseError::MissingPrefix)?;
        let height = height.parse().map_err(|_| HexParseError::InvalidPrefix)?;
        if id.len() != 64 {
            return Err(HexParseError::InvalidLength);
        }
        let mut data = [0u8; 32];
        hex::decode_to_slice(id, &mut data).map_err(HexParseError::HexError)?;
        Ok(ChainIndex {
            height,
            id: BlockID::new(data),
        })
    }
}

impl fmt::Display for ChainIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}::{}", self.height, hex::encode(self.id))
    }
}

impl Serialize for ChainIndex {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            String::serialize(&self.to_string(), serializer)
        } else {
            (self.height, self.id).serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for ChainIndex {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            ChainIndex::parse_string(&s).map_err(|e| serde::de::Error::custom(format!("{:?}", e)))
        } else {
            let (height, id) = <(u64, BlockID)>::deserialize(deserializer)?;
            Ok(ChainIndex { height, id })
        }
    }
}

/// An ElementID uniquely identifies a state element. The source is either the
/// ID of the block that created the element (for block rewards and subsidies)
/// or the ID of the transaction that created it; the index enumerates that
/// source's outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, SiaEncode, SiaDecode)]
pub struct ElementID {
    pub source: Hash256,
    pub index: u64,
}

impl ElementID {
    pub fn parse_string(s: &str) -> Result<Self, HexParseError> {
        let s = s.strip_prefix("elem:").ok_or(HexParseError::MissingPrefix)?;
        let (source, index) = s.split_once(':').ok_or(HexParseError::InvalidPrefix)?;
        Ok(ElementID {
            source: Hash256::parse_string(source)?,
            index: index.parse().map_err(|_| HexParseError::InvalidPrefix)?,
        })
    }
}

impl fmt::Display for ElementID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "elem:{}:{}", hex::encode(self.source), self.index)
    }
}

impl Default for ElementID {
    fn default() -> Self {
        ElementID {
            source: Hash256::default(),
            index: 0,
        }
    }
}

impl Serialize for ElementID {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            String::serialize(&self.to_string(), serializer)
        } else {
            (self.source, self.index).serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for ElementID {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            ElementID::parse_string(&s).map_err(|e| serde::de::Error::custom(format!("{:?}", e)))
        } else {
            let (source, index) = <(Hash256, u64)>::deserialize(deserializer)?;
            Ok(ElementID { source, index })
        }
    }
}

/// encapsulates the various errors that can occur when parsing a Sia object
/// from a string
#[derive(Debug, PartialEq)]
pub enum HexParseError {
    MissingPrefix,
    InvalidLength,
    InvalidPrefix,
    InvalidChecksum, // not every object has a checksum
    HexError(hex::FromHexError),
}

/// An address that can be used to receive UTXOs. An address is the hash of the
/// spend policy that controls its outputs.
#[derive(Default, Debug, PartialEq, Eq, Hash, Clone, Copy, SiaEncode, SiaDecode)]
pub struct Address([u8; 32]);

impl Address {
    const PREFIX: &'static str = "addr:";

    /// An address whose signing policy does not exist. Sending coins to it
    /// ensures that they will never be recoverable by anyone.
    pub const VOID: Address = Address([0; 32]);

    pub const fn new(addr: [u8; 32]) -> Address {
        Address(addr)
    }

    pub fn parse_string(s: &str) -> Result<Self, HexParseError> {
        let s = s.strip_prefix(Self::PREFIX).unwrap_or(s);
        if s.len() != 76 {
            return Err(HexParseError::InvalidLength);
        }

        let mut data = [0u8; 38];
        hex::decode_to_slice(s, &mut data).map_err(HexParseError::HexError)?;

        let h = Params::new()
            .hash_length(32)
            .to_state()
            .update(&data[..32])
            .finalize();
        let checksum = h.as_bytes();

        if checksum[..6] != data[32..] {
            return Err(HexParseError::InvalidChecksum);
        }

        Ok(data[..32].into())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Address::parse_string(&s).map_err(|e| serde::de::Error::custom(format!("{:?}", e)))
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_string().serialize(serializer)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for Address {
    fn from(val: &[u8]) -> Self {
        let mut data = [0u8; 32];
        data.copy_from_slice(val);
        Address(data)
    }
}

impl From<[u8; 32]> for Address {
    fn from(val: [u8; 32]) -> Self {
        Address(val)
    }
}

impl From<blake2b_simd::Hash> for Address {
    fn from(hash: blake2b_simd::Hash) -> Self {
        let mut addr = [0; 32];
        addr.copy_from_slice(&hash.as_bytes()[..32]);
        Address(addr)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut buf = [0u8; 32 + 6];
        buf[..32].copy_from_slice(&self.0);

        let h = Params::new()
            .hash_length(32)
            .to_state()
            .update(&self.0)
            .finalize();

        buf[32..].copy_from_slice(&h.as_bytes()[..6]);
        write!(f, "{}{}", Self::PREFIX, hex::encode(buf))
    }
}

/// A SiacoinOutput is the recipient of some of the siacoins spent in a
/// transaction.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, SiaEncode, SiaDecode)]
#[serde(rename_all = "camelCase")]
pub struct SiacoinOutput {
    pub value: Currency,
    pub address: Address,
}

/// A SiafundOutput is the recipient of some of the siafunds spent in a
/// transaction.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, SiaEncode, SiaDecode)]
#[serde(rename_all = "camelCase")]
pub struct SiafundOutput {
    pub value: u64,
    pub address: Address,
}

/// A Leaf is a 64-byte piece of data that is stored in a Merkle tree.
#[derive(Debug, PartialEq, Clone, SiaEncode, SiaDecode)]
pub struct Leaf([u8; 64]);

impl Leaf {
    pub fn parse_string(s: &str) -> Result<Self, HexParseError> {
        if s.len() != 128 {
            return Err(HexParseError::InvalidLength);
        }

        let mut data = [0u8; 64];
        hex::decode_to_slice(s, &mut data).map_err(HexParseError::HexError)?;
        Ok(Leaf(data))
    }
}

impl Default for Leaf {
    fn default() -> Self {
        Leaf([0; 64])
    }
}

impl From<[u8; 64]> for Leaf {
    fn from(data: [u8; 64]) -> Self {
        Leaf(data)
    }
}

impl AsRef<[u8]> for Leaf {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl AsMut<[u8]> for Leaf {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serialize for Leaf {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        String::serialize(&self.to_string(), serializer)
    }
}

impl<'de> Deserialize<'de> for Leaf {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let data = hex::decode(s).map_err(|e| serde::de::Error::custom(format!("{:?}", e)))?;
        if data.len() != 64 {
            return Err(serde::de::Error::custom("invalid length"));
        }
        Ok(Leaf(data.try_into().unwrap()))
    }
}

/// A StateElement is a generic element within the state accumulator. A
/// leaf_index of EPHEMERAL_LEAF_INDEX marks an element created and spent
/// within the same block; such elements carry no proof.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, SiaEncode, SiaDecode)]
#[serde(rename_all = "camelCase")]
pub struct StateElement {
    pub id: ElementID,
    pub leaf_index: u64,
    pub merkle_proof: Vec<Hash256>,
}

#[cfg(test)]
mod tests {
    use crate::address;

    use super::*;

    #[test]
    fn test_serialize_hash256() {
        let hash_str = "9aac1ffb1cfd1079a8c6c87b47da1d567e35b97234993c288c1ad0db1d1ce1b6";
        let hash = Hash256::new(hex::decode(hash_str).unwrap().try_into().unwrap());

        // binary
        let mut hash_serialized: Vec<u8> = Vec::new();
        hash.encode(&mut hash_serialized).unwrap();
        assert_eq!(hash_serialized, hex::decode(hash_str).unwrap());
        let hash_deserialized = Hash256::decode(&mut &hash_serialized[..]).unwrap();
        assert_eq!(hash_deserialized, hash); // deserialize

        // json
        let hash_serialized = serde_json::to_string(&hash).unwrap();
        let hash_deserialized: Hash256 = serde_json::from_str(&hash_serialized).unwrap();
        assert_eq!(hash_serialized, format!("\"h:{0}\"", hash_str)); // serialize
        assert_eq!(hash_deserialized, hash); // deserialize
    }

    #[test]
    fn test_serialize_address() {
        let addr_str = "8fb49ccf17dfdcc9526dec6ee8a5cca20ff8247302053d3777410b9b0494ba8c";
        let checksum = "df32abee86f0";
        let address = address!(
            "8fb49ccf17dfdcc9526dec6ee8a5cca20ff8247302053d3777410b9b0494ba8cdf32abee86f0"
        );

        // binary
        let mut addr_serialized: Vec<u8> = Vec::new();
        address.encode(&mut addr_serialized).unwrap();
        assert_eq!(addr_serialized, hex::decode(addr_str).unwrap()); // serialize
        let addr_deserialized = Address::decode(&mut &addr_serialized[..]).unwrap();
        assert_eq!(addr_deserialized, address); // deserialize

        // json
        let addr_serialized = serde_json::to_string(&address).unwrap();
        let addr_deserialized: Address = serde_json::from_str(&addr_serialized).unwrap();
        assert_eq!(
            addr_serialized,
            format!("\"addr:{0}{1}\"", addr_str, checksum)
        ); // serialize
        assert_eq!(addr_deserialized, address); // deserialize
    }

    #[test]
    fn test_address_checksum() {
        let address = Address::new([0xab; 32]);
        let text = address.to_string();
        assert_eq!(Address::parse_string(&text).unwrap(), address);

        // altering any content byte must invalidate the checksum
        let raw = hex::decode(text.strip_prefix("addr:").unwrap()).unwrap();
        for i in 0..32 {
            let mut corrupted = raw.clone();
            corrupted[i] ^= 1;
            let corrupted_text = format!("addr:{}", hex::encode(&corrupted));
            assert_eq!(
                Address::parse_string(&corrupted_text),
                Err(HexParseError::InvalidChecksum),
                "byte {}",
                i
            );
        }
    }

    #[test]
    fn test_chain_index_text() {
        let ci = ChainIndex {
            height: 555,
            id: BlockID::new([0x01; 32]),
        };
        let text = ci.to_string();
        assert_eq!(text, format!("555::{}", hex::encode([0x01; 32])));
        assert_eq!(ChainIndex::parse_string(&text).unwrap(), ci);
    }

    #[test]
    fn test_element_id_text() {
        let id = ElementID {
            source: Hash256::new([0xfe; 32]),
            index: 12,
        };
        let text = id.to_string();
        assert_eq!(text, format!("elem:{}:12", hex::encode([0xfe; 32])));
        assert_eq!(ElementID::parse_string(&text).unwrap(), id);
        assert!(ElementID::parse_string("bad").is_err());
    }

    #[test]
    fn test_serialize_state_element() {
        let se = StateElement {
            id: ElementID {
                source: Hash256::default(),
                index: 2,
            },
            leaf_index: 7,
            merkle_proof: vec![Hash256::default()],
        };
        let json_str = "{\"id\":\"elem:0000000000000000000000000000000000000000000000000000000000000000:2\",\"leafIndex\":7,\"merkleProof\":[\"h:0000000000000000000000000000000000000000000000000000000000000000\"]}";
        assert_eq!(serde_json::to_string(&se).unwrap(), json_str);
        let deserialized: StateElement = serde_json::from_str(json_str).unwrap();
        assert_eq!(deserialized, se);

        let mut binary = Vec::new();
        se.encode(&mut binary).unwrap();
        assert_eq!(StateElement::decode(&mut &binary[..]).unwrap(), se);
    }
}
