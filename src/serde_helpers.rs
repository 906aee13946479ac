//! Serde helpers for wire formats
//!
//! The coordination service mixes JSON numbers and decimal strings for
//! integer fields and uses `0x`-prefixed hex for byte blobs.

use ethers_core::types::U256;
use serde::{Deserialize, Deserializer, Serializer};

/// Serialize/deserialize [u8; 65] as `0x`-prefixed hex string
pub mod hex65 {
    use super::*;

    pub fn serialize<S>(bytes: &[u8; 65], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 65], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 65 bytes"))
    }
}

/// Integer carried either as a JSON number or as a decimal/hex string
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

fn parse_u256<E: serde::de::Error>(value: NumberOrString) -> Result<U256, E> {
    match value {
        NumberOrString::Number(n) => Ok(U256::from(n)),
        NumberOrString::String(s) => {
            if let Some(hex) = s.strip_prefix("0x") {
                U256::from_str_radix(hex, 16).map_err(E::custom)
            } else {
                U256::from_dec_str(&s).map_err(E::custom)
            }
        }
    }
}

/// Serialize U256 as a decimal string; accept number or string on input
pub mod u256_dec {
    use super::*;

    pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        parse_u256(NumberOrString::deserialize(deserializer)?)
    }
}

/// Optional variant of [`u256_dec`]; `null` maps to `None`
pub mod u256_dec_option {
    use super::*;

    pub fn serialize<S>(value: &Option<U256>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => serializer.serialize_some(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<U256>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<NumberOrString>::deserialize(deserializer)? {
            Some(v) => parse_u256(v).map(Some),
            None => Ok(None),
        }
    }
}
