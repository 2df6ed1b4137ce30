//! qonconv - pack still images into a QON animation container and back.

use std::path::PathBuf;
use std::process::exit;

use qon::{OutputFormat, PackOptions, pack_files, unpack_files};

fn usage() -> ! {
    println!("Usage: qonconv <operation>");
    println!("Operations:");
    println!("  pack [options] <infile.txt> <outfile.qon>");
    println!("     Packs the source files listed in <infile.txt> into <outfile.qon>");
    println!("       [options]:");
    println!("         -i: Use inter-frame compression where it results in a smaller file");
    println!("         -d <microseconds>: Delay between successive frames in microseconds");
    println!("         -l: Loop the animation sequence");
    println!("  unpack <format> <infile.qon> <outdir>");
    println!("     Unpacks each frame in <infile.qon> into the directory <outdir> in <format>");
    println!("       <format>: png or qoi");
    println!("Examples:");
    println!("  qonconv pack -i -d 100000 InputFileList.txt output.qon");
    println!("  qonconv unpack png input.qon frames/");
    exit(1);
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        usage();
    }
    match args[1].as_str() {
        "pack" => run_pack(&args[2..]),
        "unpack" => run_unpack(&args[2..]),
        _ => usage(),
    }
}

fn run_pack(args: &[String]) {
    let mut options = PackOptions::default();
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-i" => options.interframe = true,
            "-l" => options.loop_playback = true,
            "-d" => {
                let value = iter.next().unwrap_or_else(|| usage());
                options.frame_duration_us = value.parse().unwrap_or_else(|_| usage());
            }
            _ if arg.starts_with('-') => usage(),
            _ => positional.push(PathBuf::from(arg)),
        }
    }
    if positional.len() != 2 {
        usage();
    }
    let list_path = &positional[0];
    let output = &positional[1];

    let list = match std::fs::read_to_string(list_path) {
        Ok(list) => list,
        Err(e) => {
            println!("Error opening list file {}: {e}", list_path.display());
            exit(1);
        }
    };
    let inputs: Vec<PathBuf> = list
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect();

    match pack_files(&inputs, output, &options) {
        Ok(stats) => println!("Packed {}: {stats}", output.display()),
        Err(e) => {
            println!("Error packing {}: {e}", output.display());
            exit(1);
        }
    }
}

fn run_unpack(args: &[String]) {
    if args.len() != 3 {
        usage();
    }
    let format: OutputFormat = match args[0].parse() {
        Ok(format) => format,
        Err(_) => usage(),
    };
    let input = PathBuf::from(&args[1]);
    let outdir = PathBuf::from(&args[2]);

    match unpack_files(&input, &outdir, format) {
        Ok(stats) => {
            if let Some(frame) = stats.failed_frame {
                // A bad frame stops the unpack but keeps what was written.
                println!(
                    "Failed to decode frame {frame} in {}; kept {stats}",
                    input.display()
                );
            } else {
                println!("Unpacked {}: {stats}", input.display());
            }
        }
        Err(e) => {
            println!("Error unpacking {}: {e}", input.display());
            exit(1);
        }
    }
}
