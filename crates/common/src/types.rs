use crate::error::{CommonError, Result};
use rlp::RlpStream;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const ADDRESS_LENGTH: usize = 20;

/// Token amount in base units
pub type Amount = u128;

/// Unix timestamp in seconds
pub type Timestamp = i64;

// --- NewTypes ---

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Address(pub [u8; ADDRESS_LENGTH]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ADDRESS_LENGTH {
            return Err(CommonError::InvalidLength {
                expected: ADDRESS_LENGTH,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; ADDRESS_LENGTH];
        arr.copy_from_slice(bytes);
        Ok(Address(arr))
    }

    /// Address with `n` in its low-order bytes. Handy for fixtures.
    pub fn from_low_u64(n: u64) -> Self {
        let mut arr = [0u8; ADDRESS_LENGTH];
        arr[ADDRESS_LENGTH - 8..].copy_from_slice(&n.to_be_bytes());
        Address(arr)
    }

    /// Address of a contract created by `deployer` at `nonce`
    /// (`keccak256(rlp([deployer, nonce]))[12..]`).
    pub fn create(deployer: &Address, nonce: u64) -> Self {
        let mut stream = RlpStream::new();
        stream.begin_list(2);
        stream.append(&deployer.0.to_vec());
        stream.append(&nonce);

        let hash = keccak_hash::keccak(&stream.out());
        let mut arr = [0u8; ADDRESS_LENGTH];
        arr.copy_from_slice(&hash.0[12..]);
        Address(arr)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address(0x{})", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(digits)?;
        Address::from_slice(&bytes)
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// --- Helper Modules for Serde ---

/// Serializes an [`Amount`] as a decimal string so JSON clients don't lose precision.
pub mod amount_serde {
    use super::Amount;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Amount, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.trim().parse::<Amount>().map_err(serde::de::Error::custom)
    }
}

/// Same as [`amount_serde`] for sequences of amounts.
pub mod amount_vec_serde {
    use super::Amount;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(amounts: &[Amount], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(amounts.len()))?;
        for amount in amounts {
            seq.serialize_element(&amount.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Amount>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Vec::<String>::deserialize(deserializer)?;
        raw.iter()
            .map(|s| s.trim().parse::<Amount>().map_err(serde::de::Error::custom))
            .collect()
    }
}
