use core::fmt;

use blake2b_simd::Params;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::encoding::{self, SiaDecodable, SiaDecode, SiaEncodable, SiaEncode};
use crate::signing::PublicKey;
use crate::types::Address;

const POLICY_ABOVE_PREFIX: u8 = 1;
const POLICY_PUBLIC_KEY_PREFIX: u8 = 2;
const POLICY_THRESHOLD_PREFIX: u8 = 3;
const POLICY_UNLOCK_CONDITIONS_PREFIX: u8 = 4;
const POLICY_ANYONE_CAN_SPEND_PREFIX: u8 = 5;

const POLICY_ABOVE_STR: &str = "above";
const POLICY_PUBLIC_KEY_STR: &str = "pk";
const POLICY_THRESHOLD_STR: &str = "thresh";
const POLICY_UNLOCK_CONDITIONS_STR: &str = "uc";
const POLICY_ANYONE_CAN_SPEND_STR: &str = "anyoneCanSpend";

/// A set of conditions for spending an output under the legacy scheme: at
/// least `signatures_required` of `public_keys` must sign, and the spend is
/// only valid once the chain has reached `timelock`.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, SiaEncode, SiaDecode)]
#[serde(rename_all = "camelCase")]
pub struct UnlockConditions {
    pub timelock: u64,
    pub public_keys: Vec<PublicKey>,
    pub signatures_required: u64,
}

impl UnlockConditions {
    pub fn standard_unlock_conditions(public_key: PublicKey) -> UnlockConditions {
        UnlockConditions {
            timelock: 0,
            public_keys: vec![public_key],
            signatures_required: 1,
        }
    }
}

/// A spend policy is a condition or set of conditions that must be met in
/// order to spend a UTXO.
#[derive(Debug, PartialEq, Clone)]
pub enum SpendPolicy {
    /// A policy that is only valid once the chain height is strictly above
    /// the given height
    Above(u64),
    /// A policy that requires a valid signature from an ed25519 key pair
    PublicKey(PublicKey),
    /// A threshold policy that requires n-of-m sub-policies to be met
    Threshold(u8, Vec<SpendPolicy>),
    /// A set of legacy unlock conditions
    UnlockConditions(UnlockConditions),
    /// A policy that anyone can satisfy
    AnyoneCanSpend,
}

impl SpendPolicy {
    fn type_prefix(&self) -> u8 {
        match self {
            SpendPolicy::Above(_) => POLICY_ABOVE_PREFIX,
            SpendPolicy::PublicKey(_) => POLICY_PUBLIC_KEY_PREFIX,
            SpendPolicy::Threshold(_, _) => POLICY_THRESHOLD_PREFIX,
            SpendPolicy::UnlockConditions(_) => POLICY_UNLOCK_CONDITIONS_PREFIX,
            SpendPolicy::AnyoneCanSpend => POLICY_ANYONE_CAN_SPEND_PREFIX,
        }
    }

    fn type_str(&self) -> &str {
        match self {
            SpendPolicy::Above(_) => POLICY_ABOVE_STR,
            SpendPolicy::PublicKey(_) => POLICY_PUBLIC_KEY_STR,
            SpendPolicy::Threshold(_, _) => POLICY_THRESHOLD_STR,
            SpendPolicy::UnlockConditions(_) => POLICY_UNLOCK_CONDITIONS_STR,
            SpendPolicy::AnyoneCanSpend => POLICY_ANYONE_CAN_SPEND_STR,
        }
    }

    /// Create a policy that is only valid above a certain block height
    pub fn above(height: u64) -> Self {
        Self::Above(height)
    }

    /// Create a policy that requires a valid signature from a public key
    pub fn public_key(pk: PublicKey) -> Self {
        Self::PublicKey(pk)
    }

    /// Create a threshold policy with n-of-m sub-policies
    pub fn threshold(n: u8, policies: Vec<SpendPolicy>) -> Self {
        Self::Threshold(n, policies)
    }

    /// Create a legacy unlock conditions policy
    pub fn unlock_conditions(uc: UnlockConditions) -> Self {
        Self::UnlockConditions(uc)
    }

    /// Create a policy that anyone can satisfy
    pub fn anyone_can_spend() -> Self {
        Self::AnyoneCanSpend
    }

    /// Returns the address (root) of the policy. Equal policies always hash
    /// to equal addresses; each variant is domain-separated by its type
    /// prefix within the policy encoding.
    pub fn address(&self) -> Address {
        let mut state = Params::new().hash_length(32).to_state();
        "sia/id/address".encode(&mut state).unwrap();
        self.encode(&mut state).unwrap();
        Address::from(state.finalize())
    }
}

impl<'de> Deserialize<'de> for SpendPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct SpendPolicyVisitor;

        impl<'de> Visitor<'de> for SpendPolicyVisitor {
            type Value = SpendPolicy;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a spend policy")
            }

            fn visit_map<V>(self, mut map: V) -> Result<Self::Value, V::Error>
            where
                V: MapAccess<'de>,
            {
                let mut policy_type: Option<String> = None;
                let mut policy_value: Option<serde_json::Value> = None;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "type" => {
                            policy_type = Some(map.next_value()?);
                        }
                        "policy" => {
                            policy_value = Some(map.next_value()?);
                        }
                        _ => return Err(de::Error::unknown_field(&key, &["type", "policy"])),
                    }
                }

                let policy_type = policy_type.ok_or_else(|| de::Error::missing_field("type"))?;
                let policy_value =
                    policy_value.ok_or_else(|| de::Error::missing_field("policy"))?;

                match policy_type.as_str() {
                    POLICY_ABOVE_STR => {
                        let height =
                            serde_json::from_value(policy_value).map_err(de::Error::custom)?;
                        Ok(SpendPolicy::Above(height))
                    }
                    POLICY_PUBLIC_KEY_STR => {
                        let pk: PublicKey =
                            serde_json::from_value(policy_value).map_err(de::Error::custom)?;
                        Ok(SpendPolicy::PublicKey(pk))
                    }
                    POLICY_THRESHOLD_STR => {
                        #[derive(Deserialize)]
                        struct ThreshPolicy {
                            n: u8,
                            of: Vec<SpendPolicy>,
                        }
                        let thresh: ThreshPolicy =
                            serde_json::from_value(policy_value).map_err(de::Error::custom)?;
                        Ok(SpendPolicy::Threshold(thresh.n, thresh.of))
                    }
                    POLICY_UNLOCK_CONDITIONS_STR => {
                        let uc: UnlockConditions =
                            serde_json::from_value(policy_value).map_err(de::Error::custom)?;
                        Ok(SpendPolicy::UnlockConditions(uc))
                    }
                    POLICY_ANYONE_CAN_SPEND_STR => Ok(SpendPolicy::AnyoneCanSpend),
                    _ => Err(de::Error::unknown_variant(
                        &policy_type,
                        &[
                            POLICY_ABOVE_STR,
                            POLICY_PUBLIC_KEY_STR,
                            POLICY_THRESHOLD_STR,
                            POLICY_UNLOCK_CONDITIONS_STR,
                            POLICY_ANYONE_CAN_SPEND_STR,
                        ],
                    )),
                }
            }
        }

        deserializer.deserialize_map(SpendPolicyVisitor)
    }
}

impl Serialize for SpendPolicy {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("SpendPolicy", 2)?;
        state.serialize_field("type", self.type_str())?;
        match self {
            SpendPolicy::Above(height) => {
                state.serialize_field("policy", height)?;
            }
            SpendPolicy::PublicKey(pk) => {
                state.serialize_field("policy", &pk)?;
            }
            SpendPolicy::Threshold(n, policies) => {
                state.serialize_field(
                    "policy",
                    &json!({
                        "n": n,
                        "of": policies,
                    }),
                )?;
            }
            SpendPolicy::UnlockConditions(uc) => {
                state.serialize_field("policy", uc)?;
            }
            SpendPolicy::AnyoneCanSpend => {
                state.serialize_field("policy", &json!({}))?;
            }
        }
        state.end()
    }
}

impl SiaEncodable for SpendPolicy {
    fn encode<W: std::io::Write>(&self, w: &mut W) -> encoding::Result<()> {
        // helper to recursively encode policies
        fn encode_policy<W: std::io::Write>(
            policy: &SpendPolicy,
            w: &mut W,
        ) -> encoding::Result<()> {
            policy.type_prefix().encode(w)?;
            match policy {
                SpendPolicy::Above(height) => height.encode(w),
                SpendPolicy::PublicKey(pk) => pk.encode(w),
                SpendPolicy::Threshold(n, policies) => {
                    n.encode(w)?;
                    (policies.len() as u8).encode(w)?;
                    for policy in policies {
                        encode_policy(policy, w)?;
                    }
                    Ok(())
                }
                SpendPolicy::UnlockConditions(uc) => uc.encode(w),
                SpendPolicy::AnyoneCanSpend => Ok(()),
            }
        }
        1u8.encode(w)?; // policy version
        encode_policy(self, w)
    }
}

impl SiaDecodable for SpendPolicy {
    fn decode<R: std::io::Read>(r: &mut R) -> encoding::Result<Self> {
        // helper to recursively decode policies
        fn decode_policy<R: std::io::Read>(r: &mut R) -> encoding::Result<SpendPolicy> {
            let policy_type = u8::decode(r)?;
            match policy_type {
                POLICY_ABOVE_PREFIX => Ok(SpendPolicy::Above(u64::decode(r)?)),
                POLICY_PUBLIC_KEY_PREFIX => Ok(SpendPolicy::PublicKey(PublicKey::decode(r)?)),
                POLICY_THRESHOLD_PREFIX => {
                    let n = u8::decode(r)?;
                    let len = u8::decode(r)?;
                    let mut policies = Vec::with_capacity(len as usize);
                    while policies.len() < len as usize {
                        policies.push(decode_policy(r)?);
                    }
                    Ok(SpendPolicy::Threshold(n, policies))
                }
                POLICY_UNLOCK_CONDITIONS_PREFIX => {
                    Ok(SpendPolicy::UnlockConditions(UnlockConditions::decode(r)?))
                }
                POLICY_ANYONE_CAN_SPEND_PREFIX => Ok(SpendPolicy::AnyoneCanSpend),
                _ => Err(encoding::Error::Custom("invalid policy type".to_string())),
            }
        }
        let policy_version = u8::decode(r)?;
        if policy_version != 1 {
            return Err(encoding::Error::Custom(
                "invalid policy version".to_string(),
            ));
        }
        decode_policy(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_stability() {
        let policies = vec![
            SpendPolicy::above(100),
            SpendPolicy::above(101),
            SpendPolicy::public_key(PublicKey::new([0; 32])),
            SpendPolicy::public_key(PublicKey::new([1; 32])),
            SpendPolicy::anyone_can_spend(),
            SpendPolicy::threshold(
                2,
                vec![
                    SpendPolicy::public_key(PublicKey::new([0; 32])),
                    SpendPolicy::above(100),
                ],
            ),
            SpendPolicy::threshold(
                1,
                vec![
                    SpendPolicy::public_key(PublicKey::new([0; 32])),
                    SpendPolicy::above(100),
                ],
            ),
            SpendPolicy::unlock_conditions(UnlockConditions::standard_unlock_conditions(
                PublicKey::new([0; 32]),
            )),
        ];

        // address() is a pure function: equal policies hash to equal
        // addresses, and no two of the distinct policies above collide
        for (i, a) in policies.iter().enumerate() {
            assert_eq!(a.address(), a.clone().address());
            for (j, b) in policies.iter().enumerate() {
                if i != j {
                    assert_ne!(a.address(), b.address(), "{} vs {}", i, j);
                }
            }
        }
    }

    #[test]
    fn test_policy_encoding() {
        let test_cases = vec![
            (
                SpendPolicy::above(100),
                "{\"type\":\"above\",\"policy\":100}",
                "01016400000000000000",
            ),
            (
                SpendPolicy::public_key(PublicKey::new([1; 32])),
                "{\"type\":\"pk\",\"policy\":\"ed25519:0101010101010101010101010101010101010101010101010101010101010101\"}",
                "01020101010101010101010101010101010101010101010101010101010101010101",
            ),
            (
                SpendPolicy::anyone_can_spend(),
                "{\"type\":\"anyoneCanSpend\",\"policy\":{}}",
                "0105",
            ),
            (
                SpendPolicy::threshold(
                    2,
                    vec![
                        SpendPolicy::public_key(PublicKey::new([0; 32])),
                        SpendPolicy::above(100),
                    ],
                ),
                "{\"type\":\"thresh\",\"policy\":{\"n\":2,\"of\":[{\"policy\":\"ed25519:0000000000000000000000000000000000000000000000000000000000000000\",\"type\":\"pk\"},{\"policy\":100,\"type\":\"above\"}]}}",
                "01030202020000000000000000000000000000000000000000000000000000000000000000016400000000000000",
            ),
            (
                SpendPolicy::unlock_conditions(UnlockConditions {
                    timelock: 100,
                    public_keys: vec![PublicKey::new([0; 32]), PublicKey::new([1; 32])],
                    signatures_required: 2,
                }),
                "{\"type\":\"uc\",\"policy\":{\"timelock\":100,\"publicKeys\":[\"ed25519:0000000000000000000000000000000000000000000000000000000000000000\",\"ed25519:0101010101010101010101010101010101010101010101010101010101010101\"],\"signaturesRequired\":2}}",
                "010464000000000000000200000000000000000000000000000000000000000000000000000000000000000000000000000001010101010101010101010101010101010101010101010101010101010101010200000000000000",
            ),
        ];

        for (i, (policy, json, binary)) in test_cases.iter().enumerate() {
            let serialized_json = serde_json::to_string(&policy)
                .unwrap_or_else(|e| panic!("failed to serialize json in test case {}: {}", i, e));
            assert_eq!(serialized_json, *json, "test case {}", i);
            let deserialized_json: SpendPolicy = serde_json::from_str(json)
                .unwrap_or_else(|e| panic!("failed to deserialize json in test case {}: {}", i, e));
            assert_eq!(deserialized_json, *policy, "test case {}", i);

            let mut serialized_binary = Vec::new();
            policy
                .encode(&mut serialized_binary)
                .unwrap_or_else(|e| panic!("failed to serialize binary in test case {}: {}", i, e));
            assert_eq!(
                hex::encode(serialized_binary.clone()),
                *binary,
                "test case {}",
                i
            );

            let deserialized_binary = SpendPolicy::decode(&mut &serialized_binary[..])
                .unwrap_or_else(|e| {
                    panic!("failed to deserialize binary in test case {}: {}", i, e)
                });
            assert_eq!(deserialized_binary, *policy, "test case {}", i);
        }
    }
}
