mod bzip2_codec;
mod identity;
mod zlib_codec;

pub use bzip2_codec::Bzip2Codec;
pub use identity::IdentityCodec;
pub use zlib_codec::ZlibCodec;

use std::sync::Arc;

use klb_core::Codec;

/// Resolve a codec from its on-disk `compression_type` byte.
///
/// Called by the CLI when opening an existing KLB file, so the reader can
/// be initialized with the right codec automatically, the way the
/// teacher's `codec_by_id` resolves a stored `codec_id`.
pub fn codec_by_id(id: u8) -> anyhow::Result<Arc<dyn Codec>> {
    match id {
        0 => Ok(Arc::new(IdentityCodec)),
        1 => Ok(Arc::new(Bzip2Codec)),
        2 => Ok(Arc::new(ZlibCodec)),
        _ => anyhow::bail!(
            "unknown compression_type {id}; this build supports 0 (none), 1 (bzip2), 2 (zlib)"
        ),
    }
}
