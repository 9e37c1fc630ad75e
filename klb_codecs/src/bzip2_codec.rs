use std::io::Write;

use anyhow::{Context, Result};
use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;

use klb_core::codec::Codec;

/// BZIP2 codec (`compression_type = 1`), the original format's primary
/// compressor (spec.md §3, §4.3; grounded on `examples/original_source`,
/// which has no other general-purpose codec).
pub struct Bzip2Codec;

/// `blockSize100k`, clamped to bzip2's valid `1..=9` range, scaled to the
/// block's raw size so small blocks don't pay for a huge bzip2 window
/// (spec.md §4.3).
fn block_size_100k(raw_len: usize) -> u32 {
    let hundred_k_blocks = (raw_len + 99_999) / 100_000;
    hundred_k_blocks.clamp(1, 9) as u32
}

impl Codec for Bzip2Codec {
    fn id(&self) -> u8 {
        1
    }

    fn name(&self) -> &'static str {
        "bzip2"
    }

    fn bound(&self, raw_len: usize) -> usize {
        // Standard bzip2 worst-case expansion bound (spec.md §4.3).
        (raw_len as f64 * 1.05).ceil() as usize + 50
    }

    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let level = Compression::new(block_size_100k(raw.len()));
        let mut encoder = BzEncoder::new(Vec::with_capacity(self.bound(raw.len())), level);
        encoder.write_all(raw).context("bzip2 compress")?;
        encoder.finish().context("bzip2 finish")
    }

    fn decompress(&self, compressed: &[u8], raw_len: usize) -> Result<Vec<u8>> {
        let mut decoder = BzDecoder::new(compressed);
        let mut out = Vec::with_capacity(raw_len);
        std::io::copy(&mut decoder, &mut out).context("bzip2 decompress")?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let codec = Bzip2Codec;
        let raw: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let compressed = codec.compress(&raw).unwrap();
        let back = codec.decompress(&compressed, raw.len()).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn block_size_100k_is_clamped() {
        assert_eq!(block_size_100k(1), 1);
        assert_eq!(block_size_100k(100_000), 1);
        assert_eq!(block_size_100k(100_001), 2);
        assert_eq!(block_size_100k(100_000_000), 9);
    }
}
