//! Embedding vector blob codec
//!
//! Vectors are stored as little-endian IEEE-754 `f32` values, 4 bytes per
//! dimension, in their original order.

const F32_WIDTH: usize = std::mem::size_of::<f32>();

/// Encode a vector into its blob form
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * F32_WIDTH);
    for value in vector {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Decode a blob back into a vector.
///
/// Returns `None` when the buffer length is not a multiple of 4.
pub fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % F32_WIDTH != 0 {
        return None;
    }

    Some(
        bytes
            .chunks_exact(F32_WIDTH)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_vector() {
        assert!(encode_vector(&[]).is_empty());
        assert_eq!(decode_vector(&[]), Some(vec![]));
    }

    #[test]
    fn test_length_is_four_per_value() {
        for n in [1usize, 3, 384, 1024] {
            let v = vec![0.5f32; n];
            assert_eq!(encode_vector(&v).len(), 4 * n);
        }
    }

    #[test]
    fn test_special_values_survive() {
        let v = vec![0.0, -0.0, f32::MAX, f32::MIN, -1.25, f32::MIN_POSITIVE];
        let decoded = decode_vector(&encode_vector(&v)).unwrap();
        assert_eq!(decoded.len(), v.len());
        for (a, b) in v.iter().zip(&decoded) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_little_endian_layout() {
        assert_eq!(encode_vector(&[1.0]), vec![0x00, 0x00, 0x80, 0x3f]);
    }

    #[test]
    fn test_rejects_ragged_buffer() {
        assert_eq!(decode_vector(&[0, 0, 128]), None);
        assert_eq!(decode_vector(&[0, 0, 128, 63, 1]), None);
    }
}
