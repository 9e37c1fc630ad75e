use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use klb_codecs::{codec_by_id, Bzip2Codec, IdentityCodec, ZlibCodec};
use klb_core::header::{DataType, DIMS};
use klb_core::{read_full, read_header, read_roi, write, Codec};
use klb_core::{ReadOptions, Roi, WriteOptions};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "klb",
    about = "KLB container format — write, inspect, and randomly read multi-dimensional arrays",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a raw binary file into a new KLB container
    Write {
        /// Source file holding raw, tightly packed pixel data
        input: PathBuf,
        /// Destination KLB file
        output: PathBuf,
        /// Image shape, comma-separated x,y,z,c,t
        #[arg(long, value_delimiter = ',')]
        xyzct: Vec<u32>,
        /// Element type: u8,u16,u32,u64,i8,i16,i32,i64,f32,f64
        #[arg(long)]
        data_type: String,
        /// Codec to use: none | bzip2 | zlib
        #[arg(short, long, default_value = "bzip2")]
        codec: String,
        /// Block shape, comma-separated x,y,z,c,t (default: derived from data type)
        #[arg(long, value_delimiter = ',')]
        block_size: Option<Vec<u32>>,
        /// Worker thread count (0 = hardware concurrency)
        #[arg(short, long, default_value_t = 0)]
        workers: usize,
    },
    /// Read a whole KLB file back into a raw binary file
    ReadFull {
        /// Source KLB file
        input: PathBuf,
        /// Destination raw file
        output: PathBuf,
        #[arg(short, long, default_value_t = 0)]
        workers: usize,
    },
    /// Read a rectangular region of interest from a KLB file
    ReadRoi {
        /// Source KLB file
        input: PathBuf,
        /// Destination raw file
        output: PathBuf,
        /// Inclusive-lower ROI bound, comma-separated x,y,z,c,t
        #[arg(long, value_delimiter = ',')]
        lb: Vec<u32>,
        /// Inclusive-upper ROI bound, comma-separated x,y,z,c,t
        #[arg(long, value_delimiter = ',')]
        ub: Vec<u32>,
        #[arg(short, long, default_value_t = 0)]
        workers: usize,
    },
    /// Print header metadata and the block offset index
    Header {
        /// KLB file to inspect
        file: PathBuf,
        /// Print every block's offset/compressed length
        #[arg(long)]
        blocks: bool,
    },
    /// Benchmark random single-z-plane ROI reads
    Bench {
        /// KLB file
        file: PathBuf,
        /// Number of random planes to read
        #[arg(short, long, default_value_t = 100)]
        count: u64,
        /// Fixed random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(short, long, default_value_t = 0)]
        workers: usize,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn data_type_from_name(name: &str) -> anyhow::Result<DataType> {
    Ok(match name {
        "u8" => DataType::Uint8,
        "u16" => DataType::Uint16,
        "u32" => DataType::Uint32,
        "u64" => DataType::Uint64,
        "i8" => DataType::Int8,
        "i16" => DataType::Int16,
        "i32" => DataType::Int32,
        "i64" => DataType::Int64,
        "f32" => DataType::Float32,
        "f64" => DataType::Float64,
        other => anyhow::bail!("unknown data type '{other}'; valid: u8,u16,u32,u64,i8,i16,i32,i64,f32,f64"),
    })
}

fn codec_from_name(name: &str) -> anyhow::Result<Box<dyn Codec>> {
    match name {
        "none" | "identity" => Ok(Box::new(IdentityCodec)),
        "bzip2" | "bz2" => Ok(Box::new(Bzip2Codec)),
        "zlib" => Ok(Box::new(ZlibCodec)),
        other => anyhow::bail!("unknown codec '{other}'. Valid options: none, bzip2, zlib"),
    }
}

fn fixed_axes(label: &str, values: Vec<u32>) -> anyhow::Result<[u32; DIMS]> {
    if values.len() != DIMS {
        anyhow::bail!("{label} needs exactly {DIMS} comma-separated values, got {}", values.len());
    }
    let mut out = [0u32; DIMS];
    out.copy_from_slice(&values);
    Ok(out)
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{v:.2} {}", UNITS[unit])
    }
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_write(
    input: PathBuf,
    output: PathBuf,
    xyzct: Vec<u32>,
    data_type: &str,
    codec_name: &str,
    block_size: Option<Vec<u32>>,
    workers: usize,
) -> anyhow::Result<()> {
    let xyzct = fixed_axes("--xyzct", xyzct)?;
    let data_type = data_type_from_name(data_type)?;
    let codec = codec_from_name(codec_name)?;
    let block_size = block_size.map(|v| fixed_axes("--block-size", v)).transpose()?;

    let mut data = Vec::new();
    File::open(&input)
        .with_context(|| format!("opening input file {input:?}"))?
        .read_to_end(&mut data)?;

    let options = WriteOptions {
        block_size,
        workers,
        ..Default::default()
    };

    let t0 = Instant::now();
    let header = write(&output, xyzct, data_type, &data, codec.as_ref(), &options)?;
    let elapsed = t0.elapsed();

    let compressed_size = std::fs::metadata(&output)?.len();
    eprintln!("  codec       : {}", codec.name());
    eprintln!("  blocks      : {}", header.total_blocks());
    eprintln!("  raw size    : {}", human_bytes(data.len() as u64));
    eprintln!("  compressed  : {}", human_bytes(compressed_size));
    eprintln!("  ratio       : {:.2}x", data.len() as f64 / compressed_size as f64);
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_read_full(input: PathBuf, output: PathBuf, workers: usize) -> anyhow::Result<()> {
    let header = read_header(&input)?;
    let codec = codec_by_id(header.compression_type.code())?;
    let mut dst = vec![0u8; (header.xyzct.iter().map(|&x| x as u64).product::<u64>()
        * header.bytes_per_elem() as u64) as usize];

    let t0 = Instant::now();
    read_full(&input, &header, codec.as_ref(), &mut dst, &ReadOptions { workers })?;
    let elapsed = t0.elapsed();

    File::create(&output)
        .with_context(|| format!("creating output file {output:?}"))?
        .write_all(&dst)?;
    eprintln!("  raw size    : {}", human_bytes(dst.len() as u64));
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_read_roi(
    input: PathBuf,
    output: PathBuf,
    lb: Vec<u32>,
    ub: Vec<u32>,
    workers: usize,
) -> anyhow::Result<()> {
    let header = read_header(&input)?;
    let codec = codec_by_id(header.compression_type.code())?;
    let roi = Roi {
        lb: fixed_axes("--lb", lb)?,
        ub: fixed_axes("--ub", ub)?,
    };
    let mut dst = vec![0u8; (roi.size_elements() * header.bytes_per_elem() as u64) as usize];

    let t0 = Instant::now();
    read_roi(&input, &header, &roi, codec.as_ref(), &mut dst, &ReadOptions { workers })?;
    let elapsed = t0.elapsed();

    File::create(&output)
        .with_context(|| format!("creating output file {output:?}"))?
        .write_all(&dst)?;
    eprintln!("  roi size    : {}", human_bytes(dst.len() as u64));
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_header(file: PathBuf, show_blocks: bool) -> anyhow::Result<()> {
    let header = read_header(&file)?;
    let file_size = std::fs::metadata(&file)?.len();

    println!("=== KLB file: {file:?} ===");
    println!();
    println!("  header version : {}", header.header_version);
    println!("  xyzct          : {:?}", header.xyzct);
    println!("  pixel size     : {:?}", header.pixel_size);
    println!("  data type      : {:?}", header.data_type);
    println!(
        "  compression    : {:?} (id={})",
        header.compression_type,
        header.compression_type.code()
    );
    println!("  block size     : {:?}", header.block_size);
    println!("  blocks         : {}", header.total_blocks());
    println!("  header region  : {}", human_bytes(header.header_size()));
    println!("  payload size   : {}", human_bytes(header.payload_size()));
    println!("  file on disk   : {}", human_bytes(file_size));

    if show_blocks {
        println!();
        println!("  {:>8}  {:>14}  {:>12}", "block", "file offset", "compressed");
        println!("  {}", "-".repeat(38));
        for k in 0..header.total_blocks() as usize {
            println!(
                "  {k:>8}  {:>14}  {:>12}",
                header.absolute_offset(k),
                human_bytes(header.compressed_len(k))
            );
        }
    }

    Ok(())
}

fn run_bench(file: PathBuf, count: u64, seed: u64, workers: usize) -> anyhow::Result<()> {
    let header = read_header(&file)?;
    let codec = codec_by_id(header.compression_type.code())?;
    let depth = header.xyzct[2] as u64;
    if depth == 0 {
        anyhow::bail!("file has no z-planes");
    }

    // Simple LCG for reproducible random plane indices (teacher's style, no external dep).
    let indices: Vec<u32> = {
        let mut rng = seed;
        (0..count)
            .map(|_| {
                rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((rng >> 33) % depth) as u32
            })
            .collect()
    };

    eprintln!("benchmarking {count} random z-plane reads across {depth} planes...");

    let plane_elems = header.xyzct[0] as u64 * header.xyzct[1] as u64;
    let mut dst = vec![0u8; (plane_elems * header.bytes_per_elem() as u64) as usize];
    let t0 = Instant::now();
    let mut latencies_us = Vec::with_capacity(count as usize);

    for &z in &indices {
        let roi = Roi::plane(&header, 2, z);
        let t = Instant::now();
        read_roi(&file, &header, &roi, codec.as_ref(), &mut dst, &ReadOptions { workers })?;
        latencies_us.push(t.elapsed().as_micros() as u64);
    }

    let elapsed = t0.elapsed();
    latencies_us.sort_unstable();
    let p50 = latencies_us[latencies_us.len() / 2];
    let p99 = latencies_us[(latencies_us.len() as f64 * 0.99) as usize];

    println!();
    println!("=== Random ROI Read Benchmark ===");
    println!("  planes read : {count}");
    println!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    println!("  latency p50 : {p50} µs");
    println!("  latency p99 : {p99} µs");
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Write {
            input,
            output,
            xyzct,
            data_type,
            codec,
            block_size,
            workers,
        } => run_write(input, output, xyzct, &data_type, &codec, block_size, workers),
        Commands::ReadFull { input, output, workers } => run_read_full(input, output, workers),
        Commands::ReadRoi {
            input,
            output,
            lb,
            ub,
            workers,
        } => run_read_roi(input, output, lb, ub, workers),
        Commands::Header { file, blocks } => run_header(file, blocks),
        Commands::Bench { file, count, seed, workers } => run_bench(file, count, seed, workers),
    };

    if let Err(e) = &result {
        let status = klb_core::status_code(e);
        eprintln!("error: {e:#}");
        std::process::exit(status.code() as i32);
    }
    result
}
