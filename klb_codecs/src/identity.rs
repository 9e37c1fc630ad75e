use anyhow::Result;

use klb_core::codec::Codec;

/// No-op codec: stores blocks verbatim, with no compression
/// (`compression_type = 0`, spec.md §3).
pub struct IdentityCodec;

impl Codec for IdentityCodec {
    fn id(&self) -> u8 {
        0
    }

    fn name(&self) -> &'static str {
        "none"
    }

    fn bound(&self, raw_len: usize) -> usize {
        raw_len
    }

    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decompress(&self, compressed: &[u8], _raw_len: usize) -> Result<Vec<u8>> {
        Ok(compressed.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_verbatim() {
        let codec = IdentityCodec;
        let raw = b"some raw block bytes".to_vec();
        let compressed = codec.compress(&raw).unwrap();
        assert_eq!(compressed, raw);
        let back = codec.decompress(&compressed, raw.len()).unwrap();
        assert_eq!(back, raw);
    }
}
