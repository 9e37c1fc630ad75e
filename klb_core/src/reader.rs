use std::fs::File;
use std::io::{Read as _, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Context, Result};

use crate::codec::Codec;
use crate::container::header_region_size;
use crate::geometry::{copy_rows_raw, strides, BlockGeometry};
use crate::header::Header;
use crate::roi::Roi;
use crate::status::{InputOpenError, MalformedError};

/// Tuning knobs for [`read_full`]/[`read_roi`].
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// `0` means "use hardware concurrency".
    pub workers: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions { workers: 0 }
    }
}

fn resolve_workers(requested: usize, total_blocks: u64) -> usize {
    let hw = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let w = if requested == 0 { hw } else { requested };
    w.min(total_blocks.max(1) as usize).max(1)
}

/// Parses a KLB file's header (fixed portion plus the block offset index)
/// without touching the payload (spec.md §4.1 "Parse", C7).
pub fn read_header(path: impl AsRef<Path>) -> Result<Header> {
    let mut file = File::open(path.as_ref())
        .map_err(InputOpenError)
        .with_context(|| format!("opening {}", path.as_ref().display()))?;
    let file_size = file
        .metadata()
        .map_err(InputOpenError)
        .with_context(|| format!("stat'ing {}", path.as_ref().display()))?
        .len();
    Header::parse(&mut file, file_size)
}

/// Reads the whole image into `dst`. Equivalent to `read_roi` with the
/// full-extent ROI (spec.md §8 "Full-image equivalence"), implemented by
/// literally delegating rather than duplicating the pipeline.
pub fn read_full(
    path: impl AsRef<Path>,
    header: &Header,
    codec: &dyn Codec,
    dst: &mut [u8],
    options: &ReadOptions,
) -> Result<()> {
    read_roi(path, header, &Roi::full(header), codec, dst, options)
}

/// Reads a rectangular region of interest into `dst`, which must hold
/// exactly `roi.size_elements() * bytes_per_elem` bytes, packed row-major
/// with the ROI's own extent (axis 0 fastest) (spec.md §4.6, C7).
pub fn read_roi(
    path: impl AsRef<Path>,
    header: &Header,
    roi: &Roi,
    codec: &dyn Codec,
    dst: &mut [u8],
    options: &ReadOptions,
) -> Result<()> {
    roi.validate(header)?;
    let bytes_per_elem = header.bytes_per_elem();
    let expected_len = roi.size_elements() * bytes_per_elem as u64;
    if dst.len() as u64 != expected_len {
        bail!(MalformedError(format!(
            "destination buffer is {} bytes, expected {expected_len} for roi {roi:?}",
            dst.len()
        )));
    }

    let geom = BlockGeometry::new(header);
    let nb = geom.total_blocks();
    let workers = resolve_workers(options.workers, nb);
    let roi_extent = roi.extent();
    let roi_strides = strides(&roi_extent);

    let full = Roi::full(header);
    let is_full_image = *roi == full;

    let dst_guard = DisjointMut::new(dst);
    let claim = AtomicU64::new(0);
    let first_error: std::sync::Mutex<Option<anyhow::Error>> = std::sync::Mutex::new(None);

    if is_full_image {
        let mut file = File::open(path.as_ref())
            .map_err(InputOpenError)
            .with_context(|| format!("opening {}", path.as_ref().display()))?;
        file.seek(SeekFrom::Start(header_region_size(nb)))
            .map_err(InputOpenError)?;
        let mut payload = vec![0u8; header.payload_size() as usize];
        file.read_exact(&mut payload)
            .map_err(InputOpenError)
            .context("reading full compressed payload")?;

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let geom = &geom;
                let payload = &payload;
                let claim = &claim;
                let first_error = &first_error;
                let dst_guard = &dst_guard;
                scope.spawn(move || loop {
                    let k = claim.fetch_add(1, Ordering::SeqCst);
                    if k >= nb {
                        break;
                    }
                    let start = if k == 0 {
                        0
                    } else {
                        header.block_offsets[k as usize - 1]
                    };
                    let end = header.block_offsets[k as usize];
                    let compressed = &payload[start as usize..end as usize];
                    decode_and_scatter(
                        header, geom, k, compressed, codec, &full, roi_strides, dst_guard,
                        bytes_per_elem, first_error,
                    );
                });
            }
        });
    } else {
        let file = File::open(path.as_ref())
            .map_err(InputOpenError)
            .with_context(|| format!("opening {}", path.as_ref().display()))?;

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let geom = &geom;
                let claim = &claim;
                let first_error = &first_error;
                let dst_guard = &dst_guard;
                // Clone before spawning so a dup() failure (e.g. EMFILE
                // under fd pressure with many workers) is observed here,
                // not inside the thread.
                let worker_file = file.try_clone();
                scope.spawn(move || {
                    let mut worker_file = match worker_file {
                        Ok(f) => f,
                        Err(e) => {
                            let mut slot = first_error.lock().unwrap();
                            if slot.is_none() {
                                *slot = Some(InputOpenError(e).into());
                            }
                            drop(slot);
                            // Still drain the claim counter so sibling
                            // workers don't starve on a skewed share
                            // (spec.md §7 "Propagation").
                            while claim.fetch_add(1, Ordering::SeqCst) < nb {}
                            return;
                        }
                    };
                    loop {
                        let k = claim.fetch_add(1, Ordering::SeqCst);
                        if k >= nb {
                            break;
                        }
                        if geom.intersect(k, roi).is_none() {
                            continue;
                        }
                        let offset = header.absolute_offset(k as usize);
                        let len = header.compressed_len(k as usize);
                        let mut compressed = vec![0u8; len as usize];
                        if let Err(e) = worker_file
                            .seek(SeekFrom::Start(offset))
                            .and_then(|_| worker_file.read_exact(&mut compressed))
                        {
                            let mut slot = first_error.lock().unwrap();
                            if slot.is_none() {
                                *slot = Some(InputOpenError(e).into());
                            }
                            continue;
                        }
                        decode_and_scatter(
                            header, geom, k, &compressed, codec, roi, roi_strides, dst_guard,
                            bytes_per_elem, first_error,
                        );
                    }
                });
            }
        });
    }

    if let Some(e) = first_error.lock().unwrap().take() {
        return Err(e);
    }
    Ok(())
}

/// Decompresses block `k` and scatters the part of it that intersects
/// `roi` into the destination buffer, packed with `roi`'s own extent and
/// strides. Skips blocks the ROI does not touch.
#[allow(clippy::too_many_arguments)]
fn decode_and_scatter(
    header: &Header,
    geom: &BlockGeometry,
    k: u64,
    compressed: &[u8],
    codec: &dyn Codec,
    roi: &Roi,
    roi_strides: [u64; crate::header::DIMS],
    dst: &DisjointMut,
    bytes_per_elem: usize,
    first_error: &std::sync::Mutex<Option<anyhow::Error>>,
) {
    let Some(box_) = geom.intersect(k, roi) else {
        return;
    };
    let (block_origin, block_extent) = geom.block_box(k);
    let raw_len = block_extent.iter().map(|&e| e as u64).product::<u64>() as usize * bytes_per_elem;

    let raw = match codec.decompress(compressed, raw_len) {
        Ok(raw) => raw,
        Err(e) => {
            let mut slot = first_error.lock().unwrap();
            if slot.is_none() {
                *slot = Some(e);
            }
            return;
        }
    };

    let block_strides = strides(&block_extent);
    let intersect_extent = box_.extent();

    let mut src_base = 0u64;
    let mut dst_base = 0u64;
    for i in 0..crate::header::DIMS {
        let local_in_block = box_.lb[i] - block_origin[i];
        src_base += local_in_block as u64 * block_strides[i];
        let local_in_roi = box_.lb[i] - roi.lb[i];
        dst_base += local_in_roi as u64 * roi_strides[i];
    }

    debug_assert!(
        (dst_base as usize + intersect_extent.iter().map(|&e| e as u64).product::<u64>() as usize)
            * bytes_per_elem
            <= dst.len()
    );

    // SAFETY: block k's intersection with roi occupies a disjoint byte
    // range of dst from every other block's intersection, since blocks
    // tile the image without overlap and the ROI restriction of disjoint
    // sets stays disjoint.
    unsafe {
        copy_rows_raw(
            intersect_extent,
            raw.as_ptr(),
            src_base,
            block_strides,
            dst.as_mut_ptr(),
            dst_base,
            roi_strides,
            bytes_per_elem,
        );
    }
}

/// `Send + Sync` wrapper around a destination buffer's raw pointer, so
/// multiple read-worker threads can each write into their own disjoint
/// byte range without a lock (spec.md §5 "Concurrency discipline").
///
/// Grounded on the `SyncCDictPtr` pattern: a one-field newtype plus
/// `unsafe impl Send + Sync`, justified by a documented disjointness
/// invariant rather than by `Sync`-by-construction immutability.
struct DisjointMut {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: callers of `as_mut_ptr` only ever write to byte ranges that the
// block/ROI intersection arithmetic in `decode_and_scatter` guarantees are
// disjoint across threads.
unsafe impl Send for DisjointMut {}
unsafe impl Sync for DisjointMut {}

impl DisjointMut {
    fn new(dst: &mut [u8]) -> Self {
        DisjointMut {
            ptr: dst.as_mut_ptr(),
            len: dst.len(),
        }
    }

    fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr
    }

    fn len(&self) -> usize {
        self.len
    }
}
