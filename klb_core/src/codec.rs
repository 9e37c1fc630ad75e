use anyhow::Result;

/// Core compression abstraction (spec.md §4.5, C5).
///
/// Each block is compressed and decompressed independently, with no
/// cross-block state, which is what makes random-access ROI reads
/// possible without touching sibling blocks.
pub trait Codec: Send + Sync {
    /// Stable codec ID stored as `compression_type` in the header.
    fn id(&self) -> u8;

    /// Human-readable codec name for CLI display.
    fn name(&self) -> &'static str;

    /// Upper bound on the compressed size of `raw_len` raw bytes, used to
    /// size the scratch buffer a compressor worker writes into.
    fn bound(&self, raw_len: usize) -> usize;

    /// Compress one block's raw bytes.
    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>>;

    /// Decompress one block, given its known raw (uncompressed) length.
    fn decompress(&self, compressed: &[u8], raw_len: usize) -> Result<Vec<u8>>;
}
