use serde::{Deserialize, Serialize};
use uint::construct_uint;

use crate::encoding::{self, SiaDecodable, SiaEncodable};
use crate::types::BlockID;

construct_uint! {
    /// Work is a 256-bit unsigned integer representing an expected number of
    /// hashes. Arithmetic wraps; Work is only used for difficulty and target
    /// comparisons, never for currency.
    pub struct Work(4);
}

impl From<&[u8; 32]> for Work {
    fn from(bytes: &[u8; 32]) -> Self {
        Work::from_big_endian(bytes)
    }
}

impl SiaEncodable for Work {
    fn encode<W: std::io::Write>(&self, w: &mut W) -> encoding::Result<()> {
        self.to_big_endian().encode(w)
    }
}

impl SiaDecodable for Work {
    fn decode<R: std::io::Read>(r: &mut R) -> encoding::Result<Self> {
        Ok(Work::from_big_endian(&<[u8; 32]>::decode(r).map_err(
            |_| encoding::Error::Custom("invalid work".to_string()),
        )?))
    }
}

impl Serialize for Work {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Work {
    fn deserialize<D>(deserializer: D) -> Result<Work, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Work::from_dec_str(&String::deserialize(deserializer)?).map_err(serde::de::Error::custom)
    }
}

/// work_required_for_hash estimates how much work was required to produce the
/// given id, i.e. 2^256 / id. The mapping is not injective; many ids may
/// require the same expected amount of work.
pub fn work_required_for_hash(id: &BlockID) -> Work {
    let id = Work::from_big_endian(id.as_ref());
    if id.is_zero() {
        // This should never happen as long as inputs are properly validated
        // and the laws of physics are intact.
        panic!("impossibly good block ID");
    }
    // As a special case, an id of 1 requires the maximum possible amount of
    // work; 2^256 does not fit in the representation.
    if id == Work::one() {
        return Work::MAX;
    }
    // 2^256 / id == (Work::MAX / id) + extra, where extra accounts for the
    // remainder of (Work::MAX + 1).
    let quo = Work::MAX / id;
    let rem = Work::MAX % id;
    if rem + Work::one() == id {
        quo + Work::one()
    } else {
        quo
    }
}

/// hash_requiring_work returns the best block ID that the given amount of
/// work would be expected to produce. Many ids may require the same amount of
/// work; this returns the lowest of them.
pub fn hash_requiring_work(w: Work) -> BlockID {
    if w.is_zero() {
        panic!("no hash requires zero work");
    }
    if w == Work::one() {
        return BlockID::new([0xff; 32]);
    }
    let quo = Work::MAX / w;
    let rem = Work::MAX % w;
    let id = if rem + Work::one() == w {
        quo + Work::one()
    } else {
        quo
    };
    BlockID::new(id.to_big_endian())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_hash_conversions() {
        // difficulty 256 corresponds to a target with 8 leading zero bits
        let difficulty = Work::from(256u64);
        let target = hash_requiring_work(difficulty);
        let mut expected = [0u8; 32];
        expected[0] = 0x01;
        assert_eq!(target, BlockID::new(expected));
        assert_eq!(work_required_for_hash(&target), difficulty);

        // boundary cases
        assert_eq!(hash_requiring_work(Work::one()), BlockID::new([0xff; 32]));
        let mut one = [0u8; 32];
        one[31] = 1;
        assert_eq!(work_required_for_hash(&BlockID::new(one)), Work::MAX);
    }

    #[test]
    fn test_meets_target() {
        let target = hash_requiring_work(Work::from(256u64));
        let mut below = [0u8; 32];
        below[1] = 0xff;
        assert!(BlockID::new(below).meets_target(&target));
        assert!(target.meets_target(&target));
        let mut above = [0u8; 32];
        above[0] = 0x02;
        assert!(!BlockID::new(above).meets_target(&target));
    }

    #[test]
    fn test_serialize_work() {
        let w = Work::from(123456789u64);
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, "\"123456789\"");
        let decoded: Work = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, w);

        let mut binary = Vec::new();
        w.encode(&mut binary).unwrap();
        assert_eq!(binary.len(), 32);
        assert_eq!(Work::decode(&mut &binary[..]).unwrap(), w);
    }
}
