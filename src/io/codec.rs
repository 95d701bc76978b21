//! Ready-made serializers and deserializers for `Inputs::take` / `Outputs::take`.

use anyhow::{bail, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Minimal big-endian encoding: leading zero bytes are stripped, zero is a single `0x00`.
pub fn u64_to_bytes(value: &u64) -> Result<Vec<u8>> {
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    Ok(bytes[first..].to_vec())
}

/// Accepts from one to eight big-endian bytes.
pub fn u64_from_bytes(bytes: &[u8]) -> Result<u64> {
    if bytes.is_empty() {
        bail!("cannot decode an integer from an empty payload");
    }
    if bytes.len() > 8 {
        bail!("payload of {} bytes does not fit in a u64", bytes.len());
    }
    Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

pub fn json_serializer<T: Serialize + 'static>() -> impl Fn(&T) -> Result<Vec<u8>> + Send + Sync + 'static {
    |value: &T| Ok(serde_json::to_vec(value)?)
}

pub fn json_deserializer<T: DeserializeOwned + 'static>() -> impl Fn(&[u8]) -> Result<T> + Send + Sync + 'static
{
    |bytes: &[u8]| Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u64_minimal_encoding() {
        assert_eq!(u64_to_bytes(&0).unwrap(), vec![0]);
        assert_eq!(u64_to_bytes(&3).unwrap(), vec![3]);
        assert_eq!(u64_to_bytes(&0x0102).unwrap(), vec![1, 2]);
        assert_eq!(u64_from_bytes(&[1, 2]).unwrap(), 0x0102);
        assert_eq!(u64_from_bytes(&u64::MAX.to_be_bytes()).unwrap(), u64::MAX);
    }

    #[test]
    fn test_u64_rejects_bad_lengths() {
        assert!(u64_from_bytes(&[]).is_err());
        assert!(u64_from_bytes(&[0; 9]).is_err());
    }

    #[test]
    fn test_json_helpers() {
        let ser = json_serializer::<Vec<u32>>();
        let de = json_deserializer::<Vec<u32>>();
        let bytes = ser(&vec![1, 2, 3]).unwrap();
        assert_eq!(de(&bytes).unwrap(), vec![1, 2, 3]);
        assert!(de(b"not json").is_err());
    }
}
