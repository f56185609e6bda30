// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Manual-inspection CLI for the waveframe pipeline: probes a file, prints
//! its stream and metadata, and optionally decodes it to raw PCM — the
//! pipeline's playback driver with no audio output device attached.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;
use log::{error, info};

use waveframe::Runtime;

#[derive(Parser)]
#[command(name = "waveframe-play", about = "Inspect and decode audio through the waveframe pipeline")]
struct Cli {
    /// The input file path, or a `file://`/`http(s)://` URI.
    input: String,

    /// Only probe the input and print its stream/metadata information.
    #[arg(long, conflicts_with_all = ["decode_only", "seek"])]
    probe_only: bool,

    /// Decode the full stream without writing output.
    #[arg(long)]
    decode_only: bool,

    /// Seek to this many milliseconds before decoding.
    #[arg(long, value_name = "MS")]
    seek: Option<u64>,

    /// Write decoded interleaved i16 PCM to this file.
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let runtime = Runtime::new();
    let mut stream = match runtime.open(&cli.input) {
        Ok(stream) => stream,
        Err(err) => {
            error!("failed to open '{}': {err}", cli.input);
            std::process::exit(1);
        }
    };

    print_stream_info(&cli.input, &stream);

    if cli.probe_only {
        return;
    }

    if let Some(seek_ms) = cli.seek {
        if !stream.seek_to_ms(seek_ms) {
            error!("seek to {seek_ms}ms failed");
            std::process::exit(1);
        }
        info!("seeked to {seek_ms}ms, landed at {}ms", stream.position_ms());
    }

    let mut sink = cli.output.as_ref().map(|path| {
        BufWriter::new(File::create(path).unwrap_or_else(|e| {
            error!("failed to create '{}': {e}", path.display());
            std::process::exit(1);
        }))
    });

    let mut buf = [0i16; 4096];
    let mut total_samples = 0u64;
    loop {
        let n = stream.read_pcm(&mut buf);
        if n == 0 {
            break;
        }
        total_samples += n as u64;
        if let Some(writer) = sink.as_mut() {
            for sample in &buf[..n] {
                if writer.write_all(&sample.to_le_bytes()).is_err() {
                    error!("write failed, aborting decode");
                    std::process::exit(1);
                }
            }
        }
    }

    if let Some(writer) = sink.as_mut() {
        let _ = writer.flush();
    }

    println!("| decoded {total_samples} interleaved samples ({}ms)", stream.position_ms());

    if !cli.decode_only {
        println!("| (no audio output device attached; use --output to capture raw PCM)");
    }
}

fn print_stream_info(path: &str, stream: &waveframe::DecodedStream) {
    println!("+ {path}");
    println!("|");
    println!("| // Stream //");
    println!("|     Codec:           {}", stream.codec_name());
    println!("|     Sample Rate:     {}", stream.sample_rate());
    println!("|     Channels:        {}", stream.channels());
    println!("|     Duration:        {}ms", stream.length_ms());

    if !stream.metadata().is_empty() {
        println!("|");
        println!("| // Tags //");
        for (idx, (key, value)) in stream.metadata().iter().enumerate() {
            println!("|     [{:0>2}] {:<20}: {value}", idx + 1, key);
        }
    }
    println!("-");
}
