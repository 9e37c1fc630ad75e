use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use anyhow::{anyhow, bail, Context, Result};

use crate::codec::Codec;
use crate::container::offset_vector_start;
use crate::geometry::{copy_rows, strides, BlockGeometry};
use crate::header::{CompressionType, DataType, Header, DIMS, METADATA_SIZE};
use crate::queue::BoundedQueue;
use crate::status::{CodecError, MalformedError, OutputOpenError};

/// Block `compressed_len` slot still waiting on its compressor.
const PENDING: u64 = u64::MAX;
/// Block `compressed_len` slot whose compressor failed.
const ERRORED: u64 = u64::MAX - 1;

/// Tuning knobs for [`write`]/[`write_slices`], mirroring the `--block-size`
/// / `--metadata` style flags the teacher's CLI exposes as `clap` defaults.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub pixel_size: [f32; DIMS],
    /// `None` derives the default shape from the data type's element size.
    pub block_size: Option<[u32; DIMS]>,
    pub metadata: [u8; METADATA_SIZE],
    /// `0` means "use hardware concurrency".
    pub workers: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            pixel_size: [1.0; DIMS],
            block_size: None,
            metadata: [0u8; METADATA_SIZE],
            workers: 0,
        }
    }
}

fn resolve_workers(requested: usize, total_blocks: u64) -> usize {
    let hw = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let w = if requested == 0 { hw } else { requested };
    w.min(total_blocks.max(1) as usize).max(1)
}

/// Writes a full in-memory array to a new KLB file in one shot (spec.md
/// §4.5, C6). `data` must hold exactly `prod(xyzct)` elements of
/// `data_type.bytes_per_elem()` bytes each, laid out with axis 0 (x)
/// fastest.
pub fn write(
    path: impl AsRef<Path>,
    xyzct: [u32; DIMS],
    data_type: DataType,
    data: &[u8],
    codec: &dyn Codec,
    options: &WriteOptions,
) -> Result<Header> {
    for (i, &x) in xyzct.iter().enumerate() {
        if x == 0 {
            bail!(MalformedError(format!("xyzct[{i}] is zero")));
        }
    }
    let bytes_per_elem = data_type.bytes_per_elem();
    let expected_len = xyzct.iter().map(|&x| x as u64).product::<u64>() * bytes_per_elem as u64;
    if data.len() as u64 != expected_len {
        bail!(MalformedError(format!(
            "source buffer is {} bytes, expected {expected_len} for shape {xyzct:?}",
            data.len()
        )));
    }

    let block_size =
        options
            .block_size
            .unwrap_or_else(|| crate::header::default_block_size(bytes_per_elem));
    for i in 0..DIMS {
        if block_size[i] == 0 || block_size[i] > xyzct[i] {
            bail!(MalformedError(format!(
                "block_size[{i}]={} is invalid for xyzct[{i}]={}",
                block_size[i], xyzct[i]
            )));
        }
    }

    let compression_type = CompressionType::from_code(codec.id()).ok_or_else(|| {
        anyhow!(CodecError(format!(
            "codec id {} is not a recognized compression_type",
            codec.id()
        )))
    })?;

    let mut file = File::create(path.as_ref())
        .map_err(OutputOpenError)
        .with_context(|| format!("creating {}", path.as_ref().display()))?;

    let mut header_stub = Header {
        header_version: crate::header::HEADER_VERSION,
        xyzct,
        pixel_size: options.pixel_size,
        data_type,
        compression_type,
        metadata: options.metadata,
        block_size,
        block_offsets: Vec::new(),
    };
    let nb = header_stub.total_blocks();
    if nb == 0 {
        bail!(MalformedError("computed block count is zero".to_string()));
    }

    let header = Header::write_placeholder(
        &mut file,
        header_stub.header_version,
        xyzct,
        options.pixel_size,
        data_type,
        compression_type,
        options.metadata,
        block_size,
        nb,
    )
    .context("writing placeholder header")?;
    header_stub = header;

    let geom = BlockGeometry::new(&header_stub);
    let full_strides = strides(&xyzct);
    let workers = resolve_workers(options.workers, nb);

    let compressed_len: Vec<AtomicU64> = (0..nb).map(|_| AtomicU64::new(PENDING)).collect();
    let owner: Vec<AtomicUsize> = (0..nb).map(|_| AtomicUsize::new(usize::MAX)).collect();
    let claim = AtomicU64::new(0);
    let notify = (Mutex::new(()), Condvar::new());
    let first_error: Mutex<Option<anyhow::Error>> = Mutex::new(None);
    let queue_capacity = BoundedQueue::<Vec<u8>>::capacity_for(workers, nb);
    let queues: Vec<BoundedQueue<Vec<u8>>> =
        (0..workers).map(|_| BoundedQueue::new(queue_capacity)).collect();

    let outcome: Result<Vec<u64>> = std::thread::scope(|scope| {
        for wid in 0..workers {
            let queue = &queues[wid];
            let geom = &geom;
            let compressed_len = &compressed_len;
            let owner = &owner;
            let claim = &claim;
            let notify = &notify;
            let first_error = &first_error;
            let bytes_per_elem = bytes_per_elem;
            scope.spawn(move || loop {
                let k = claim.fetch_add(1, Ordering::SeqCst);
                if k >= nb {
                    break;
                }
                let (origin, extent) = geom.block_box(k);
                let block_elems = extent.iter().map(|&e| e as u64).product::<u64>() as usize;
                let mut raw = vec![0u8; block_elems * bytes_per_elem];
                let src_base = origin
                    .iter()
                    .zip(full_strides.iter())
                    .map(|(&o, &s)| o as u64 * s)
                    .sum();
                let block_strides = strides(&extent);
                copy_rows(
                    extent,
                    data,
                    src_base,
                    full_strides,
                    &mut raw,
                    0,
                    block_strides,
                    bytes_per_elem,
                );

                match codec.compress(&raw) {
                    Ok(compressed) => {
                        let len = compressed.len() as u64;
                        // Queue capacity can't be exceeded: only this worker
                        // ever pushes to its own queue, and the writer
                        // drains strictly in order, so pushes here never
                        // race a close() except on a sibling's error.
                        if queue.push(compressed).is_ok() {
                            owner[k as usize].store(wid, Ordering::SeqCst);
                            compressed_len[k as usize].store(len, Ordering::SeqCst);
                        } else {
                            compressed_len[k as usize].store(ERRORED, Ordering::SeqCst);
                        }
                    }
                    Err(e) => {
                        let mut slot = first_error.lock().unwrap();
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                        compressed_len[k as usize].store(ERRORED, Ordering::SeqCst);
                    }
                }
                let (lock, cvar) = notify;
                let _guard = lock.lock().unwrap();
                cvar.notify_all();
            });
        }

        let mut offsets = vec![0u64; nb as usize];
        let mut running = 0u64;
        let mut result_err: Option<anyhow::Error> = None;

        for k in 0..nb as usize {
            let (lock, cvar) = &notify;
            let mut guard = lock.lock().unwrap();
            while compressed_len[k].load(Ordering::SeqCst) == PENDING {
                guard = cvar.wait(guard).unwrap();
            }
            drop(guard);

            let len = compressed_len[k].load(Ordering::SeqCst);
            if len == ERRORED {
                for q in &queues {
                    q.close();
                }
                result_err = Some(
                    first_error
                        .lock()
                        .unwrap()
                        .take()
                        .unwrap_or_else(|| anyhow!(CodecError(format!("block {k} failed")))),
                );
                break;
            }

            let owner_id = owner[k].load(Ordering::SeqCst);
            let compressed = queues[owner_id]
                .pop()
                .expect("compressor publishes length only after pushing its bytes");
            if let Err(io_err) = file.write_all(&compressed) {
                for q in &queues {
                    q.close();
                }
                result_err = Some(anyhow!(OutputOpenError(io_err)));
                break;
            }
            running += len;
            offsets[k] = running;
        }

        match result_err {
            Some(e) => Err(e),
            None => Ok(offsets),
        }
    });

    let offsets = outcome?;

    file.seek(SeekFrom::Start(offset_vector_start()))
        .map_err(OutputOpenError)?;
    for off in &offsets {
        file.write_all(&off.to_le_bytes()).map_err(OutputOpenError)?;
    }
    file.flush().map_err(OutputOpenError)?;

    header_stub.block_offsets = offsets;
    Ok(header_stub)
}

/// Variant of [`write`] that takes one raw byte slice per z-plane instead
/// of one contiguous buffer; requires `xyzct[3] == xyzct[4] == 1`.
/// Produces byte-identical output to calling [`write`] on the same data
/// concatenated in z order (spec.md §8 seed scenario 6).
pub fn write_slices(
    path: impl AsRef<Path>,
    xyzct: [u32; DIMS],
    data_type: DataType,
    slices: &[&[u8]],
    codec: &dyn Codec,
    options: &WriteOptions,
) -> Result<Header> {
    if xyzct[3] != 1 || xyzct[4] != 1 {
        bail!(MalformedError(
            "write_slices requires xyzct[3] == xyzct[4] == 1".to_string()
        ));
    }
    if slices.len() != xyzct[2] as usize {
        bail!(MalformedError(format!(
            "write_slices got {} slices, expected xyzct[2]={}",
            slices.len(),
            xyzct[2]
        )));
    }
    let plane_elems = xyzct[0] as usize * xyzct[1] as usize;
    let plane_bytes = plane_elems * data_type.bytes_per_elem();

    let mut buf = Vec::with_capacity(plane_bytes * slices.len());
    for (z, s) in slices.iter().enumerate() {
        if s.len() != plane_bytes {
            bail!(MalformedError(format!(
                "slice {z} is {} bytes, expected {plane_bytes}",
                s.len()
            )));
        }
        buf.extend_from_slice(s);
    }

    write(path, xyzct, data_type, &buf, codec, options)
}
