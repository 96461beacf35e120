//! Face encoding storage format and distance metric.
//!
//! Encodings are fixed-length f32 vectors produced by an external
//! embedding model. They are persisted as little-endian byte blobs;
//! the format is stable for the lifetime of a database.

/// Convert an f32 encoding to bytes for storage
pub fn encoding_to_bytes(encoding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(encoding.len() * 4);
    for &val in encoding {
        bytes.extend_from_slice(&val.to_le_bytes());
    }
    bytes
}

/// Convert stored bytes back to an f32 encoding
pub fn bytes_to_encoding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| {
            let arr: [u8; 4] = chunk.try_into().unwrap();
            f32::from_le_bytes(arr)
        })
        .collect()
}

/// Euclidean distance between two encodings.
///
/// This is the native metric of the embedding space; mismatched or
/// empty vectors are treated as maximally distant so they never match.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return f32::INFINITY;
    }

    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
