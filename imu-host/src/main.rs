//! CLI for decoding a `data.txt` bulk log recorded by the IMU array
//! firmware's BulkLogWrite mode into human-readable records.

mod decode;

use std::fs;
use std::path::PathBuf;

use clap::Parser;

use decode::Frame;

/// Decode an IMU array bulk log into per-tick raw and calibrated records.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the recorded log file (matches the firmware's `LOG_FILE_NAME`
    /// unless the card was read out under a different name).
    log_path: PathBuf,

    /// Only print calibrated records, skipping raw sensor chunks.
    #[arg(long)]
    calibrated_only: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let bytes = match fs::read(&args.log_path) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::error!("failed to read {}: {}", args.log_path.display(), err);
            std::process::exit(1);
        }
    };

    let (frames, consumed) = decode::decode_stream(&bytes);
    if consumed < bytes.len() {
        log::warn!(
            "stopped decoding after {} of {} bytes; remaining data is malformed or truncated",
            consumed,
            bytes.len()
        );
    }

    let mut raw_count = 0usize;
    let mut cal_count = 0usize;
    for frame in &frames {
        match frame {
            Frame::Raw1(chunk) => {
                raw_count += 1;
                if !args.calibrated_only {
                    println!("tick {}: sensor[0] = {:?}", chunk.time_stamp, chunk.sensors[0]);
                }
            }
            Frame::Raw2(_) => {
                raw_count += 1;
            }
            Frame::Calibrated(record) => {
                cal_count += 1;
                println!(
                    "calibrated: dTheta={:?} dV={:?} q={:?} tempC={:.2}",
                    record.delta_theta, record.delta_v, record.attitude, record.avg_temp_c
                );
            }
        }
    }

    log::info!(
        "decoded {} raw chunks and {} calibrated records from {}",
        raw_count,
        cal_count,
        args.log_path.display()
    );
}
