/// End-to-end round-trip tests against the seed scenarios and testable
/// properties: every block is written then read back, with and without a
/// restricting ROI, across every codec and worker count the format
/// supports.
use klb_codecs::{Bzip2Codec, IdentityCodec, ZlibCodec};
use klb_core::header::{CompressionType, DataType, DIMS};
use klb_core::{read_full, read_header, read_roi, write, write_slices, Codec, ReadOptions, Roi, WriteOptions};

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("klb_roundtrip_{name}_{}.klb", std::process::id()))
}

fn gradient_u16(xyzct: [u32; DIMS]) -> Vec<u8> {
    let n: u64 = xyzct.iter().map(|&x| x as u64).product();
    let mut out = Vec::with_capacity(n as usize * 2);
    for i in 0..n {
        out.extend_from_slice(&((i % 65535) as u16).to_le_bytes());
    }
    out
}

fn read_back(
    path: &std::path::Path,
    header: &klb_core::Header,
    codec: &dyn Codec,
    expected_len: usize,
) -> Vec<u8> {
    let mut dst = vec![0u8; expected_len];
    read_full(path, header, codec, &mut dst, &ReadOptions::default()).unwrap();
    dst
}

// ── seed scenario 1: smallest possible file ───────────────────────────────

#[test]
fn seed_1_single_element_uint8_uncompressed() {
    let path = temp_path("seed1");
    let codec = IdentityCodec;
    let data = [42u8];
    let header = write(
        &path,
        [1, 1, 1, 1, 1],
        DataType::Uint8,
        &data,
        &codec,
        &WriteOptions::default(),
    )
    .unwrap();

    assert_eq!(header.total_blocks(), 1);
    assert_eq!(header.compression_type, CompressionType::None);

    let file_len = std::fs::metadata(&path).unwrap().len();
    assert_eq!(file_len, 319 + 8 + 1);

    let back = read_back(&path, &header, &codec, 1);
    assert_eq!(back, vec![42u8]);
    std::fs::remove_file(&path).ok();
}

// ── seed scenario 2: single block, exact fit ──────────────────────────────

#[test]
fn seed_2_single_block_exact_fit() {
    let path = temp_path("seed2");
    let codec = Bzip2Codec;
    let xyzct = [4, 4, 4, 1, 1];
    let data = gradient_u16(xyzct);
    let options = WriteOptions {
        block_size: Some([4, 4, 4, 1, 1]),
        ..Default::default()
    };
    let header = write(&path, xyzct, DataType::Uint16, &data, &codec, &options).unwrap();
    assert_eq!(header.total_blocks(), 1);

    let back = read_back(&path, &header, &codec, data.len());
    assert_eq!(back, data);
    std::fs::remove_file(&path).ok();
}

// ── seed scenario 3: border blocks on every active axis ──────────────────

#[test]
fn seed_3_border_blocks_and_plane_roi() {
    let path = temp_path("seed3");
    let codec = Bzip2Codec;
    let xyzct = [20, 17, 10, 1, 1];
    let data = gradient_u16(xyzct);
    let options = WriteOptions {
        block_size: Some([8, 4, 2, 1, 1]),
        ..Default::default()
    };
    let header = write(&path, xyzct, DataType::Uint16, &data, &codec, &options).unwrap();

    // 20/8 -> 3 blocks (last partial), 17/4 -> 5 blocks (last partial), 10/2 -> 5 blocks exact.
    assert_eq!(header.nb_per_axis(), [3, 5, 5, 1, 1]);

    let back = read_back(&path, &header, &codec, data.len());
    assert_eq!(back, data, "full read must equal source for a grid with border blocks");

    let z = 5u32;
    let roi = Roi::plane(&header, 2, z);
    let plane_elems = xyzct[0] as usize * xyzct[1] as usize;
    let mut plane = vec![0u8; plane_elems * 2];
    read_roi(&path, &header, &roi, &codec, &mut plane, &ReadOptions::default()).unwrap();

    let plane_start = z as usize * plane_elems * 2;
    let expected = &data[plane_start..plane_start + plane_elems * 2];
    assert_eq!(plane, expected, "z={z} plane ROI must equal that plane of the source");
    std::fs::remove_file(&path).ok();
}

// ── seed scenario 4: float32, ZLIB, bit-identical ─────────────────────────

#[test]
fn seed_4_float32_zlib_bit_identical() {
    let path = temp_path("seed4");
    let codec = ZlibCodec;
    let xyzct = [4, 4, 4, 4, 1];
    let mut rng = 0x1234_5678_9abc_def0u64;
    let n: usize = xyzct.iter().map(|&x| x as usize).product();
    let mut data = Vec::with_capacity(n * 4);
    for _ in 0..n {
        rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let bits = (rng >> 32) as u32;
        let f = f32::from_bits(bits);
        let f = if f.is_nan() { 0.0 } else { f };
        data.extend_from_slice(&f.to_le_bytes());
    }
    let options = WriteOptions {
        block_size: Some([4, 4, 4, 1, 1]),
        ..Default::default()
    };
    let header = write(&path, xyzct, DataType::Float32, &data, &codec, &options).unwrap();

    let back = read_back(&path, &header, &codec, data.len());
    assert_eq!(back, data, "float32 round-trip through zlib must be bit-identical");
    std::fs::remove_file(&path).ok();
}

// ── seed scenario 5: gradient volume, many workers ────────────────────────

#[test]
fn seed_5_gradient_volume_many_workers() {
    let path = temp_path("seed5");
    let codec = Bzip2Codec;
    let xyzct = [1002, 200, 54, 1, 1];
    let data = gradient_u16(xyzct);
    let options = WriteOptions {
        block_size: Some([256, 256, 32, 1, 1]),
        workers: 12,
        ..Default::default()
    };
    let header = write(&path, xyzct, DataType::Uint16, &data, &codec, &options).unwrap();

    let back = read_back(&path, &header, &codec, data.len());
    assert_eq!(back, data, "12-worker write/read must reproduce the i mod 65535 gradient");
    std::fs::remove_file(&path).ok();
}

// ── seed scenario 6: write_slices matches write byte-for-byte ────────────

#[test]
fn seed_6_write_slices_matches_write() {
    let xyzct = [101, 151, 29, 1, 1];
    let data = gradient_u16(xyzct);
    let codec = Bzip2Codec;
    let options = WriteOptions::default();

    let path_whole = temp_path("seed6_whole");
    write(&path_whole, xyzct, DataType::Uint16, &data, &codec, &options).unwrap();

    let plane_bytes = xyzct[0] as usize * xyzct[1] as usize * 2;
    let slices: Vec<&[u8]> = data.chunks(plane_bytes).collect();
    assert_eq!(slices.len(), xyzct[2] as usize);

    let path_slices = temp_path("seed6_slices");
    write_slices(&path_slices, xyzct, DataType::Uint16, &slices, &codec, &options).unwrap();

    let whole_bytes = std::fs::read(&path_whole).unwrap();
    let slices_bytes = std::fs::read(&path_slices).unwrap();
    assert_eq!(whole_bytes, slices_bytes, "write_slices must be byte-identical to write");

    std::fs::remove_file(&path_whole).ok();
    std::fs::remove_file(&path_slices).ok();
}

// ── universal / cross-cutting properties ──────────────────────────────────

#[test]
fn full_image_equivalence_read_full_matches_read_roi_full() {
    let path = temp_path("full_equiv");
    let codec = Bzip2Codec;
    let xyzct = [20, 17, 10, 1, 1];
    let data = gradient_u16(xyzct);
    let options = WriteOptions {
        block_size: Some([8, 4, 2, 1, 1]),
        ..Default::default()
    };
    let header = write(&path, xyzct, DataType::Uint16, &data, &codec, &options).unwrap();

    let mut via_full = vec![0u8; data.len()];
    read_full(&path, &header, &codec, &mut via_full, &ReadOptions::default()).unwrap();

    let mut via_roi = vec![0u8; data.len()];
    let roi = Roi::full(&header);
    read_roi(&path, &header, &roi, &codec, &mut via_roi, &ReadOptions::default()).unwrap();

    assert_eq!(via_full, via_roi);
    std::fs::remove_file(&path).ok();
}

#[test]
fn worker_count_invariance() {
    let xyzct = [20, 17, 10, 1, 1];
    let data = gradient_u16(xyzct);
    let codec = Bzip2Codec;

    let mut outputs = Vec::new();
    for workers in [1usize, 3, 8] {
        let path = temp_path(&format!("workers_{workers}"));
        let options = WriteOptions {
            block_size: Some([8, 4, 2, 1, 1]),
            workers,
            ..Default::default()
        };
        let header = write(&path, xyzct, DataType::Uint16, &data, &codec, &options).unwrap();
        let back = read_back(&path, &header, &codec, data.len());
        outputs.push(back);
        std::fs::remove_file(&path).ok();
    }
    assert!(outputs.windows(2).all(|w| w[0] == w[1]), "decoded output must not depend on worker count");
}

#[test]
fn block_order_invariance_across_read_worker_counts() {
    let path = temp_path("block_order");
    let codec = Bzip2Codec;
    let xyzct = [20, 17, 10, 1, 1];
    let data = gradient_u16(xyzct);
    let options = WriteOptions {
        block_size: Some([8, 4, 2, 1, 1]),
        ..Default::default()
    };
    let header = write(&path, xyzct, DataType::Uint16, &data, &codec, &options).unwrap();

    for workers in [1usize, 4, 16] {
        let mut dst = vec![0u8; data.len()];
        read_full(
            &path,
            &header,
            &codec,
            &mut dst,
            &ReadOptions { workers },
        )
        .unwrap();
        assert_eq!(dst, data, "read with {workers} workers must reproduce the source");
    }
    std::fs::remove_file(&path).ok();
}

#[test]
fn default_block_sanity_on_a_small_volume() {
    let path = temp_path("default_block");
    let codec = Bzip2Codec;
    let xyzct = [50, 40, 8, 1, 1];
    let data = gradient_u16(xyzct);
    let header = write(
        &path,
        xyzct,
        DataType::Uint16,
        &data,
        &codec,
        &WriteOptions::default(),
    )
    .unwrap();

    assert_eq!(header.block_size, [96, 96, 8, 1, 1]);
    assert_eq!(header.total_blocks(), 1);

    let back = read_back(&path, &header, &codec, data.len());
    assert_eq!(back, data);
    std::fs::remove_file(&path).ok();
}

#[test]
fn read_header_does_not_touch_payload() {
    let path = temp_path("header_only");
    let codec = Bzip2Codec;
    let xyzct = [20, 17, 10, 1, 1];
    let data = gradient_u16(xyzct);
    let options = WriteOptions {
        block_size: Some([8, 4, 2, 1, 1]),
        ..Default::default()
    };
    let written = write(&path, xyzct, DataType::Uint16, &data, &codec, &options).unwrap();

    let parsed = read_header(&path).unwrap();
    assert_eq!(parsed.xyzct, written.xyzct);
    assert_eq!(parsed.block_offsets, written.block_offsets);
    std::fs::remove_file(&path).ok();
}

#[test]
fn roi_rejects_reversed_and_out_of_bounds_regions() {
    let path = temp_path("roi_bounds");
    let codec = IdentityCodec;
    let xyzct = [10, 10, 10, 1, 1];
    let data = vec![0u8; 1000];
    let header = write(
        &path,
        xyzct,
        DataType::Uint8,
        &data,
        &codec,
        &WriteOptions::default(),
    )
    .unwrap();

    let mut dst = vec![0u8; 100];
    let oob = Roi {
        lb: [0, 0, 0, 0, 0],
        ub: [11, 10, 10, 1, 1],
    };
    assert!(read_roi(&path, &header, &oob, &codec, &mut dst, &ReadOptions::default()).is_err());
    std::fs::remove_file(&path).ok();
}
