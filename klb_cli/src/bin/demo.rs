//! KLB demo
//!
//! Generates a synthetic volumetric stack, writes it as a KLB file with
//! BZIP2 compression, then demonstrates the core access-native claim: a
//! single z-plane can be read back in microseconds without decompressing
//! the rest of the volume.

use std::time::{Duration, Instant};

use anyhow::Result;

use klb_codecs::Bzip2Codec;
use klb_core::header::{DataType, DIMS};
use klb_core::{read_full, read_roi, write, ReadOptions, Roi, WriteOptions};

// ── synthetic volume ─────────────────────────────────────────────────────

const XYZCT: [u32; DIMS] = [512, 512, 64, 1, 1];
const BLOCK_SIZE: [u32; DIMS] = [128, 128, 16, 1, 1];

/// Deterministic uint16 gradient: `value = (x + y + z) mod 65536`, the
/// same shape of generator `i mod 65535` used by the seed scenarios.
fn generate_volume(xyzct: [u32; DIMS]) -> Vec<u8> {
    let (nx, ny, nz) = (xyzct[0] as usize, xyzct[1] as usize, xyzct[2] as usize);
    let mut data = vec![0u8; nx * ny * nz * 2];
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let v = ((x + y + z) % 65536) as u16;
                let idx = (z * ny + y) * nx + x;
                data[idx * 2..idx * 2 + 2].copy_from_slice(&v.to_le_bytes());
            }
        }
    }
    data
}

// ── timing / formatting helpers ──────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut v = n as f64;
    let mut u = 0;
    while v >= 1024.0 && u < UNITS.len() - 1 {
        v /= 1024.0;
        u += 1;
    }
    if u == 0 {
        format!("{n} B")
    } else {
        format!("{v:.2} {}", UNITS[u])
    }
}

fn fmt_duration(d: Duration) -> String {
    let ms = d.as_secs_f64() * 1000.0;
    if ms < 1.0 {
        format!("{:.1} µs", ms * 1000.0)
    } else if ms < 1000.0 {
        format!("{ms:.1} ms")
    } else {
        format!("{:.2} s", d.as_secs_f64())
    }
}

fn speedup(slow: Duration, fast: Duration) -> f64 {
    slow.as_secs_f64() / fast.as_secs_f64().max(1e-9)
}

fn section(title: &str) {
    println!("━━━ {title} {}", "━".repeat(70usize.saturating_sub(title.len() + 5)));
}

// ── demo runner ───────────────────────────────────────────────────────────

fn run() -> Result<()> {
    let out_dir = std::env::temp_dir().join("klb_demo");
    std::fs::create_dir_all(&out_dir)?;
    let path = out_dir.join("volume.klb");

    println!();
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║            KLB container format  ·  demo                         ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    section("0 · DATA GENERATION");
    eprint!("  generating a {}×{}×{} uint16 gradient volume ", XYZCT[0], XYZCT[1], XYZCT[2]);
    let t0 = Instant::now();
    let volume = generate_volume(XYZCT);
    eprintln!("done  ({:.2}s, {})", t0.elapsed().as_secs_f64(), human_bytes(volume.len() as u64));

    section("1 · WRITE");
    let codec = Bzip2Codec;
    let options = WriteOptions {
        block_size: Some(BLOCK_SIZE),
        ..Default::default()
    };
    let t0 = Instant::now();
    let header = write(&path, XYZCT, DataType::Uint16, &volume, &codec, &options)?;
    let write_elapsed = t0.elapsed();
    let compressed_size = std::fs::metadata(&path)?.len();

    println!("  blocks      : {}", header.total_blocks());
    println!("  raw size    : {}", human_bytes(volume.len() as u64));
    println!("  compressed  : {}", human_bytes(compressed_size));
    println!("  ratio       : {:.2}x", volume.len() as f64 / compressed_size as f64);
    println!("  elapsed     : {}", fmt_duration(write_elapsed));

    section("2 · THE CORE CLAIM — one z-plane without decoding the volume");

    let plane_elems = XYZCT[0] as u64 * XYZCT[1] as u64;
    let plane_bytes = (plane_elems * header.bytes_per_elem() as u64) as usize;
    let mid_z = XYZCT[2] / 2;
    let roi = Roi::plane(&header, 2, mid_z);

    let (roi_dur, roi_plane) = {
        let mut dst = vec![0u8; plane_bytes];
        let t0 = Instant::now();
        read_roi(&path, &header, &roi, &codec, &mut dst, &ReadOptions::default())?;
        (t0.elapsed(), dst)
    };

    let (full_dur, full_plane) = {
        let mut dst = vec![0u8; volume.len()];
        let t0 = Instant::now();
        read_full(&path, &header, &codec, &mut dst, &ReadOptions::default())?;
        let plane_start = mid_z as usize * plane_bytes;
        (t0.elapsed(), dst[plane_start..plane_start + plane_bytes].to_vec())
    };

    let matches = roi_plane == full_plane;
    println!(
        "  {:<42}  {:>12}",
        format!("read_roi(z={mid_z})"),
        fmt_duration(roi_dur)
    );
    println!(
        "  {:<42}  {:>12}",
        "read_full (decodes every block)",
        fmt_duration(full_dur)
    );
    println!();
    println!(
        "  plane from ROI read matches plane from full read: {}",
        if matches { "yes" } else { "NO — mismatch" }
    );
    println!(
        "  read_roi is {:.1}x faster than read_full for a single plane",
        speedup(full_dur, roi_dur)
    );

    section("3 · RANDOM ROI ACCESS BENCHMARK — 200 random z-planes");
    let mut rng = 0xDEAD_BEEF_CAFE_BABEu64;
    let indices: Vec<u32> = (0..200)
        .map(|_| {
            rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((rng >> 33) % XYZCT[2] as u64) as u32
        })
        .collect();

    let mut latencies_us = Vec::with_capacity(indices.len());
    let mut dst = vec![0u8; plane_bytes];
    for &z in &indices {
        let roi = Roi::plane(&header, 2, z);
        let t0 = Instant::now();
        read_roi(&path, &header, &roi, &codec, &mut dst, &ReadOptions::default())?;
        latencies_us.push(t0.elapsed().as_micros() as u64);
    }
    latencies_us.sort_unstable();
    let p50 = latencies_us[latencies_us.len() / 2];
    let p99 = latencies_us[(latencies_us.len() as f64 * 0.99) as usize];
    println!("  latency p50 : {p50} µs");
    println!("  latency p99 : {p99} µs");

    section("SUMMARY");
    println!("  {}×{}×{} uint16 volume, BZIP2, block {:?}", XYZCT[0], XYZCT[1], XYZCT[2], BLOCK_SIZE);
    println!("  {:<42}  {}", "compression ratio:", format!("{:.2}x", volume.len() as f64 / compressed_size as f64));
    println!("  {:<42}  {}", "single-plane ROI read:", fmt_duration(roi_dur));
    println!("  {:<42}  {}", "full-volume read:", fmt_duration(full_dur));
    println!("  {:<42}  {}", "random ROI read (p50 / p99):", format!("{p50} µs / {p99} µs"));

    let _ = std::fs::remove_file(&path);
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
