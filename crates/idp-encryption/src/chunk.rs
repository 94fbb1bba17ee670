//! Plaintext chunking around the KMS per-call size ceiling, and the
//! chunk-list bodies that carry the per-chunk ciphertexts.

use crate::{CryptoError, CryptoResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Largest plaintext a single KMS encrypt call accepts.
pub const MAX_KMS_PLAINTEXT: usize = 4096;

/// Size of every chunk but the last for a plaintext of `len` bytes.
///
/// `ceil(len / (floor(len / MAX) + 1))`, which is always `<= MAX`.
/// Floor division here can leave a trailing chunk above the ceiling.
#[must_use]
pub fn chunk_size(len: usize) -> usize {
    let num_chunks = len / MAX_KMS_PLAINTEXT;
    len.div_ceil(num_chunks + 1)
}

/// Splits plaintext into consecutive chunks of [`chunk_size`] bytes, the
/// last one holding the remainder. Empty input yields no chunks.
#[must_use]
pub fn split(plaintext: &[u8]) -> Vec<&[u8]> {
    if plaintext.is_empty() {
        return Vec::new();
    }
    plaintext.chunks(chunk_size(plaintext.len())).collect()
}

/// Encodes chunk ciphertexts as a JSON array of base64 strings.
pub fn encode_json(chunks: &[Vec<u8>]) -> CryptoResult<Vec<u8>> {
    let encoded: Vec<String> = chunks.iter().map(|c| STANDARD.encode(c)).collect();
    serde_json::to_vec(&encoded)
        .map_err(|e| CryptoError::encryption(format!("chunk list serialization failed: {e}")))
}

/// Decodes a JSON array of base64 strings.
pub fn decode_json(body: &[u8]) -> CryptoResult<Vec<Vec<u8>>> {
    let encoded: Vec<String> = serde_json::from_slice(body)
        .map_err(|e| CryptoError::encryption(format!("chunk list is not a JSON array: {e}")))?;
    encoded
        .iter()
        .map(|c| {
            STANDARD
                .decode(c)
                .map_err(|e| CryptoError::encryption(format!("chunk is not base64: {e}")))
        })
        .collect()
}

/// One chunk of a MessagePack body.
///
/// Written as `bin`; read from either `bin` or `str`, since older writers
/// packed the JSON envelopes as strings.
struct PackedChunk(Vec<u8>);

impl Serialize for PackedChunk {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for PackedChunk {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ChunkVisitor;

        impl<'de> Visitor<'de> for ChunkVisitor {
            type Value = PackedChunk;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a bin or str chunk")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                Ok(PackedChunk(v.to_vec()))
            }

            fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
                Ok(PackedChunk(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(PackedChunk(v.as_bytes().to_vec()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
                Ok(PackedChunk(v.into_bytes()))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(b) = seq.next_element::<u8>()? {
                    bytes.push(b);
                }
                Ok(PackedChunk(bytes))
            }
        }

        deserializer.deserialize_any(ChunkVisitor)
    }
}

/// Encodes chunk ciphertexts as a MessagePack array of `bin` values.
pub fn encode_packed(chunks: &[Vec<u8>]) -> CryptoResult<Vec<u8>> {
    let packed: Vec<PackedChunk> = chunks.iter().cloned().map(PackedChunk).collect();
    rmp_serde::to_vec(&packed)
        .map_err(|e| CryptoError::encryption(format!("chunk pack failed: {e}")))
}

/// Decodes a MessagePack array of `bin` or `str` chunks.
pub fn decode_packed(body: &[u8]) -> CryptoResult<Vec<Vec<u8>>> {
    let packed: Vec<PackedChunk> = rmp_serde::from_slice(body)
        .map_err(|e| CryptoError::encryption(format!("chunk unpack failed: {e}")))?;
    Ok(packed.into_iter().map(|c| c.0).collect())
}
