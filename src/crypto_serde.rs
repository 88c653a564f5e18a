use anyhow::{anyhow, Result};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use serde::de::Error as DeError;
use serde::ser::Error as SerError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Canonically serializes any arkworks type into a 0x-prefixed lowercase hex
/// string, the transport encoding used inside transaction JSON payloads.
pub fn canonical_serialize_hex<T>(value: &T) -> Result<String>
where
    T: CanonicalSerialize,
{
    let mut buf = Vec::new();
    value
        .serialize_compressed(&mut buf)
        .map_err(|err| anyhow!("canonical serialize failed: {err}"))?;
    Ok(format!("0x{}", hex::encode(buf)))
}

pub fn canonical_deserialize_hex<T>(encoded: &str) -> Result<T>
where
    T: CanonicalDeserialize,
{
    let stripped = encoded.strip_prefix("0x").unwrap_or(encoded);
    let bytes = hex::decode(stripped).map_err(|err| anyhow!("invalid hex: {err}"))?;
    T::deserialize_compressed(&bytes[..])
        .map_err(|err| anyhow!("canonical deserialize failed: {err}"))
}

/// Serde helpers for a single group element or field element.
pub mod element {
    use super::*;

    pub fn serialize<T, S>(value: &T, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        T: CanonicalSerialize,
        S: Serializer,
    {
        let hex = canonical_serialize_hex(value).map_err(SerError::custom)?;
        serializer.serialize_str(&hex)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> std::result::Result<T, D::Error>
    where
        T: CanonicalDeserialize,
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        canonical_deserialize_hex(&s).map_err(DeError::custom)
    }
}

/// Serde helpers for vectors of group or field elements.
pub mod element_vec {
    use super::*;

    pub fn serialize<T, S>(value: &[T], serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        T: CanonicalSerialize,
        S: Serializer,
    {
        let encoded: Vec<String> = value
            .iter()
            .map(|item| canonical_serialize_hex(item).map_err(SerError::custom))
            .collect::<std::result::Result<_, _>>()?;
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
    where
        T: CanonicalDeserialize,
        D: Deserializer<'de>,
    {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|s| canonical_deserialize_hex(s).map_err(DeError::custom))
            .collect()
    }
}

/// Serde helpers for `[ballot][chunk]` matrices of group elements.
pub mod element_matrix {
    use super::*;

    pub fn serialize<T, S>(value: &[Vec<T>], serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        T: CanonicalSerialize,
        S: Serializer,
    {
        let encoded: Vec<Vec<String>> = value
            .iter()
            .map(|row| {
                row.iter()
                    .map(|item| canonical_serialize_hex(item).map_err(SerError::custom))
                    .collect::<std::result::Result<_, _>>()
            })
            .collect::<std::result::Result<_, _>>()?;
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> std::result::Result<Vec<Vec<T>>, D::Error>
    where
        T: CanonicalDeserialize,
        D: Deserializer<'de>,
    {
        let encoded = Vec::<Vec<String>>::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|row| {
                row.iter()
                    .map(|s| canonical_deserialize_hex(s).map_err(DeError::custom))
                    .collect()
            })
            .collect()
    }
}

/// Serde helpers for lists of `[ballot][chunk]` matrices.
pub mod element_matrix_seq {
    use super::*;

    pub fn serialize<T, S>(
        value: &[Vec<Vec<T>>],
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error>
    where
        T: CanonicalSerialize,
        S: Serializer,
    {
        let encoded: Vec<Vec<Vec<String>>> = value
            .iter()
            .map(|matrix| {
                matrix
                    .iter()
                    .map(|row| {
                        row.iter()
                            .map(|item| canonical_serialize_hex(item).map_err(SerError::custom))
                            .collect::<std::result::Result<_, _>>()
                    })
                    .collect::<std::result::Result<_, _>>()
            })
            .collect::<std::result::Result<_, _>>()?;
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, T, D>(
        deserializer: D,
    ) -> std::result::Result<Vec<Vec<Vec<T>>>, D::Error>
    where
        T: CanonicalDeserialize,
        D: Deserializer<'de>,
    {
        let encoded = Vec::<Vec<Vec<String>>>::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|matrix| {
                matrix
                    .iter()
                    .map(|row| {
                        row.iter()
                            .map(|s| canonical_deserialize_hex(s).map_err(DeError::custom))
                            .collect()
                    })
                    .collect()
            })
            .collect()
    }
}

/// Serde helpers encoding raw byte strings (keys, signatures) as 0x hex.
pub mod hex_bytes {
    use super::*;

    pub fn serialize<S>(value: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(value)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let stripped = encoded.strip_prefix("0x").unwrap_or(&encoded);
        hex::decode(stripped).map_err(DeError::custom)
    }
}
