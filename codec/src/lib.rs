// Copyright 2024 Orbit project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The opaque byte-blob codec for user values: serialization format is treated as a black box
//! by the invocation engine; this module fixes it concretely to `bincode` over `serde`, the same
//! choice used elsewhere in this codebase for caching opaque result bytes.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug)]
pub struct CodecError(bincode::Error);

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "serialization error: {}", self.0)
    }
}

impl std::error::Error for CodecError {}

/// Serialize `value` to its wire bytes.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(value).map_err(CodecError)
}

/// Deserialize `bytes` back into `T`. Round-trips with [`encode`] for every `T` this crate is
/// instantiated with.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    bincode::deserialize(bytes).map_err(CodecError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Point {
        x: i64,
        y: i64,
    }

    #[test]
    fn round_trips_a_struct() {
        let value = Point { x: 1, y: -2 };
        let bytes = encode(&value).unwrap();
        let decoded: Point = decode(&bytes).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn round_trips_a_tuple_of_args_and_kwargs() {
        let value = ((1_i64, "two".to_string()), vec![("flag".to_string(), true)]);
        let bytes = encode(&value).unwrap();
        let decoded: ((i64, String), Vec<(String, bool)>) = decode(&bytes).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn rejects_truncated_bytes() {
        let value = Point { x: 1, y: 2 };
        let mut bytes = encode(&value).unwrap();
        bytes.truncate(bytes.len() - 1);
        let result: Result<Point, _> = decode(&bytes);
        assert!(result.is_err());
    }
}
