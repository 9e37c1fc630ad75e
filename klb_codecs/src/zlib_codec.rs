use std::io::Write;

use anyhow::{Context, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use klb_core::codec::Codec;

/// ZLIB codec (`compression_type = 2`), the standardized third
/// compression type spec.md adds alongside the original format's
/// none/BZIP2 pair (spec.md §3).
pub struct ZlibCodec;

impl Codec for ZlibCodec {
    fn id(&self) -> u8 {
        2
    }

    fn name(&self) -> &'static str {
        "zlib"
    }

    fn bound(&self, raw_len: usize) -> usize {
        // zlib's own `compressBound` formula.
        raw_len + (raw_len >> 12) + (raw_len >> 14) + (raw_len >> 25) + 13
    }

    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(
            Vec::with_capacity(self.bound(raw.len())),
            Compression::default(),
        );
        encoder.write_all(raw).context("zlib compress")?;
        encoder.finish().context("zlib finish")
    }

    fn decompress(&self, compressed: &[u8], raw_len: usize) -> Result<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(compressed);
        let mut out = Vec::with_capacity(raw_len);
        std::io::copy(&mut decoder, &mut out).context("zlib decompress")?;
        Ok(out)
    }
}
