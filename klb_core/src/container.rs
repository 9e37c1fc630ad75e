use crate::header::{BLOCK_OFFSET_ENTRY_SIZE, FIXED_HEADER_SIZE};

/// Total on-disk size of the header region: fixed portion plus one
/// `u64` cumulative offset per block. Shared by the writer (to know where
/// the payload region starts) and the reader (to know where to seek for a
/// block's compressed bytes).
pub fn header_region_size(total_blocks: u64) -> u64 {
    FIXED_HEADER_SIZE + total_blocks * BLOCK_OFFSET_ENTRY_SIZE
}

/// Byte offset, from the start of the file, where the offset-vector region
/// begins — i.e. where the writer seeks back to after streaming all blocks,
/// to overwrite the placeholder zeros with the real cumulative offsets.
pub fn offset_vector_start() -> u64 {
    FIXED_HEADER_SIZE
}
