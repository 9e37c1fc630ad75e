use crate::header::{Header, DIMS};
use crate::roi::Roi;

/// Per-axis element strides for a row-major array with axis 0 (x) varying
/// fastest, the convention used throughout this crate for both the full
/// image and for a single block's local buffer.
pub fn strides(extent: &[u32; DIMS]) -> [u64; DIMS] {
    let mut s = [1u64; DIMS];
    for i in 1..DIMS {
        s[i] = s[i - 1] * extent[i - 1] as u64;
    }
    s
}

/// Derives block shape and placement from a header's `xyzct`/`block_size`.
/// Blocks are enumerated with axis 0 varying fastest, matching `strides`.
pub struct BlockGeometry<'h> {
    header: &'h Header,
    nb: [u64; DIMS],
}

impl<'h> BlockGeometry<'h> {
    pub fn new(header: &'h Header) -> Self {
        BlockGeometry {
            header,
            nb: header.nb_per_axis(),
        }
    }

    pub fn nb_per_axis(&self) -> [u64; DIMS] {
        self.nb
    }

    pub fn total_blocks(&self) -> u64 {
        self.nb.iter().product()
    }

    /// Per-axis block coordinates of block index `k`.
    pub fn coords(&self, k: u64) -> [u64; DIMS] {
        let mut c = [0u64; DIMS];
        let mut rem = k;
        for i in 0..DIMS {
            c[i] = rem % self.nb[i];
            rem /= self.nb[i];
        }
        c
    }

    /// Image-space origin of block `k`.
    pub fn origin(&self, coords: &[u64; DIMS]) -> [u32; DIMS] {
        let mut o = [0u32; DIMS];
        for i in 0..DIMS {
            o[i] = coords[i] as u32 * self.header.block_size[i];
        }
        o
    }

    /// Block extent, clamped at the image boundary so edge blocks are
    /// smaller than `block_size` (spec.md §4.4 edge cases).
    pub fn extent(&self, origin: &[u32; DIMS]) -> [u32; DIMS] {
        let mut e = [0u32; DIMS];
        for i in 0..DIMS {
            let remaining = self.header.xyzct[i] - origin[i];
            e[i] = remaining.min(self.header.block_size[i]);
        }
        e
    }

    /// Convenience: origin and extent of block `k` together.
    pub fn block_box(&self, k: u64) -> ([u32; DIMS], [u32; DIMS]) {
        let coords = self.coords(k);
        let origin = self.origin(&coords);
        let extent = self.extent(&origin);
        (origin, extent)
    }

    /// Intersection, in image coordinates, of block `k`'s box with `roi`.
    /// `None` if the ROI does not touch this block at all. Both `roi` and
    /// the returned box use inclusive upper bounds (spec.md §4.2).
    pub fn intersect(&self, k: u64, roi: &Roi) -> Option<Roi> {
        let (origin, extent) = self.block_box(k);
        let mut lb = [0u32; DIMS];
        let mut ub = [0u32; DIMS];
        for i in 0..DIMS {
            let block_lb = origin[i];
            let block_ub = origin[i] + extent[i] - 1;
            lb[i] = roi.lb[i].max(block_lb);
            ub[i] = roi.ub[i].min(block_ub);
            if lb[i] > ub[i] {
                return None;
            }
        }
        Some(Roi { lb, ub })
    }
}

/// Iterates the starting coordinate of every contiguous axis-0 run inside
/// a box of the given `extent`, visiting axes 1..DIMS in odometer order.
/// Axis 0 of each yielded coordinate is always 0; callers copy `extent[0]`
/// contiguous elements per row.
pub struct RowIter {
    extent: [u32; DIMS],
    pos: [u32; DIMS],
    done: bool,
}

impl RowIter {
    pub fn new(extent: [u32; DIMS]) -> Self {
        let done = extent.iter().any(|&e| e == 0);
        RowIter {
            extent,
            pos: [0; DIMS],
            done,
        }
    }
}

impl Iterator for RowIter {
    type Item = [u32; DIMS];

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let row = self.pos;

        for i in 1..DIMS {
            self.pos[i] += 1;
            if self.pos[i] < self.extent[i] {
                return Some(row);
            }
            self.pos[i] = 0;
        }
        self.done = true;
        Some(row)
    }
}

/// Copies `extent`-shaped data between two differently-strided buffers, one
/// row (one contiguous axis-0 run) at a time, via raw pointers. `src_base`/
/// `dst_base` are element offsets of the box's `[0,0,0,0,0]` corner in each
/// buffer; axis 0 is assumed contiguous (stride 1) in both.
///
/// This is the core shared by the write pipeline's image-to-block copy-out
/// (`copy_rows`, below, a safe wrapper since a block's scratch buffer has
/// exactly one writer) and the read pipeline's block-to-ROI scatter, which
/// runs this same loop concurrently across worker threads and therefore
/// needs raw pointers rather than a `&mut [u8]` spanning the whole
/// destination (see `reader::DisjointMut`).
///
/// SAFETY: caller must ensure `src_ptr`/`dst_ptr` are valid for the byte
/// ranges this `extent`/`*_base`/`*_strides` combination touches, and that
/// no other concurrent access overlaps the bytes written at `dst_ptr`.
#[allow(clippy::too_many_arguments)]
pub unsafe fn copy_rows_raw(
    extent: [u32; DIMS],
    src_ptr: *const u8,
    src_base: u64,
    src_strides: [u64; DIMS],
    dst_ptr: *mut u8,
    dst_base: u64,
    dst_strides: [u64; DIMS],
    elem_size: usize,
) {
    let row_bytes = extent[0] as usize * elem_size;

    for row in RowIter::new(extent) {
        let mut src_off = src_base;
        let mut dst_off = dst_base;
        for i in 1..DIMS {
            src_off += row[i] as u64 * src_strides[i];
            dst_off += row[i] as u64 * dst_strides[i];
        }
        let src_byte = src_off as usize * elem_size;
        let dst_byte = dst_off as usize * elem_size;
        std::ptr::copy_nonoverlapping(
            src_ptr.add(src_byte),
            dst_ptr.add(dst_byte),
            row_bytes,
        );
    }
}

/// Safe wrapper around [`copy_rows_raw`] for the single-writer case: `dst`
/// is a plain `&mut [u8]` the caller exclusively owns for the duration of
/// the call (the write pipeline's per-block scratch buffer).
#[allow(clippy::too_many_arguments)]
pub fn copy_rows(
    extent: [u32; DIMS],
    src: &[u8],
    src_base: u64,
    src_strides: [u64; DIMS],
    dst: &mut [u8],
    dst_base: u64,
    dst_strides: [u64; DIMS],
    elem_size: usize,
) {
    // SAFETY: `src`/`dst` are ordinary live slices for the whole call, and
    // `dst` is uniquely borrowed here, so no concurrent writer can overlap.
    unsafe {
        copy_rows_raw(
            extent,
            src.as_ptr(),
            src_base,
            src_strides,
            dst.as_mut_ptr(),
            dst_base,
            dst_strides,
            elem_size,
        );
    }
}
