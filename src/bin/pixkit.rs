//! pixkit CLI - inspect, convert and transform raster images
//!
//! Reads JPEG, PNG, GIF and BMP; writes binary PAM (P7).

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use log::{LevelFilter, Metadata, Record};

use pixkit::composite::{mirror_h, mirror_v};
use pixkit::transform::{rotate, scale, Interpolation};
use pixkit::{decode, probe, ColorType, Format, Image, Source};

/// Decode, inspect and transform JPEG, PNG, GIF and BMP images.
#[derive(Parser, Debug)]
#[command(name = "pixkit")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print format, dimensions and native channel count
    Info {
        /// Input image file
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },
    /// Decode to a binary PAM file
    Convert {
        /// Input image file
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        /// Output PAM file
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
        /// Output channels (0 keeps the native layout)
        #[arg(
            short,
            long,
            default_value = "0",
            value_parser = clap::value_parser!(u8).range(0..=4)
        )]
        channels: u8,
    },
    /// Print a region of RGBA values as a table
    Dump {
        /// Input image file
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        /// Left column of the region
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        x: i32,
        /// Top row of the region
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        y: i32,
        /// Region width
        #[arg(long, default_value = "8")]
        width: i32,
        /// Region height
        #[arg(long, default_value = "8")]
        height: i32,
    },
    /// Mirror, scale and rotate, writing RGBA PAM
    Transform {
        /// Input image file
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        /// Output PAM file
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
        /// Reverse pixel order within each row
        #[arg(long)]
        mirror_v: bool,
        /// Reverse row order
        #[arg(long)]
        mirror_h: bool,
        /// Scale factor
        #[arg(long)]
        scale: Option<f64>,
        /// Rotation in degrees
        #[arg(long, allow_hyphen_values = true)]
        rotate: Option<f64>,
        /// Bilinear sampling for rotation
        #[arg(long)]
        bilinear: bool,
    },
}

/// Minimal stderr logger.
struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn tuple_type(channels: usize) -> &'static str {
    match ColorType::from_channels(channels) {
        Some(ColorType::Gray) => "GRAYSCALE",
        Some(ColorType::GrayAlpha) => "GRAYSCALE_ALPHA",
        Some(ColorType::Rgb) => "RGB",
        _ => "RGB_ALPHA",
    }
}

/// Write interleaved 8-bit samples as a binary PAM file.
fn write_pam(
    path: &Path,
    width: u32,
    height: u32,
    channels: usize,
    pixels: &[u8],
) -> Result<u64, Box<dyn std::error::Error>> {
    let mut out = Vec::with_capacity(pixels.len() + 80);
    write!(
        out,
        "P7\nWIDTH {width}\nHEIGHT {height}\nDEPTH {channels}\nMAXVAL 255\nTUPLTYPE {}\nENDHDR\n",
        tuple_type(channels)
    )?;
    out.extend_from_slice(pixels);
    fs::write(path, &out)?;
    Ok(out.len() as u64)
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Info { input } => {
            let data = fs::read(&input)?;
            let format = pixkit::guess_format(&data);
            let info = probe(Source::Memory(&data))?;
            println!(
                "{}: {} {}x{} channels={}",
                input.display(),
                format.map_or("unknown", Format::name),
                info.width,
                info.height,
                info.channels
            );
        }
        Command::Convert {
            input,
            output,
            channels,
        } => {
            let start = Instant::now();
            let mut file = File::open(&input)?;
            let img = decode(Source::File(&mut file), channels as usize)?;
            let decode_time = start.elapsed();
            let depth = if channels == 0 {
                img.channels
            } else {
                channels as usize
            };
            let size = write_pam(&output, img.width, img.height, depth, &img.pixels)?;
            log::info!("decoded in {decode_time:.2?}");
            println!(
                "{} -> {} ({}x{}, {} channels, {})",
                input.display(),
                output.display(),
                img.width,
                img.height,
                depth,
                format_size(size)
            );
        }
        Command::Dump {
            input,
            x,
            y,
            width,
            height,
        } => {
            let img = Image::load(&input)?;
            print!("{}", img.dump(x, y, width, height));
        }
        Command::Transform {
            input,
            output,
            mirror_v: flip_columns,
            mirror_h: flip_rows,
            scale: factor,
            rotate: degrees,
            bilinear,
        } => {
            let mut img = Image::load(&input)?;
            if flip_columns {
                img = mirror_v(&img);
            }
            if flip_rows {
                img = mirror_h(&img);
            }
            if let Some(factor) = factor {
                img = scale(&img, factor)?;
            }
            if let Some(degrees) = degrees {
                let quality = if bilinear {
                    Interpolation::Bilinear
                } else {
                    Interpolation::Nearest
                };
                img = rotate(&img, degrees, quality)?;
            }
            let size = write_pam(&output, img.width(), img.height(), 4, img.pixels())?;
            println!(
                "{} -> {} ({}x{}, {})",
                input.display(),
                output.display(),
                img.width(),
                img.height(),
                format_size(size)
            );
        }
    }

    Ok(())
}
