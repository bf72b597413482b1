use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing::Level;

use image_watermark::{
    default_output_path, Operation, ProcessOptions, ProcessResult, ProtectOptions, StampOptions,
    WatermarkEngine,
};

#[derive(Parser)]
#[command(
    name = "image-watermark",
    about = "Embed invisible LSB watermarks and visible text stamps into images",
    version,
    after_help = "Invisible payloads live in the lowest bit of the R/G/B channels.\n\
                  JPEG input is written back as PNG when an invisible payload is embedded."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Embed an invisible text payload
    Embed {
        #[command(flatten)]
        io: IoArgs,
        /// Payload to embed
        #[arg(short, long)]
        text: String,
    },
    /// Recover an invisible text payload
    Decode {
        /// Input image file or directory
        input: String,
    },
    /// Draw a visible text stamp in the bottom-right corner
    Stamp {
        #[command(flatten)]
        io: IoArgs,
        /// Stamp text
        #[arg(short, long)]
        text: String,
        #[command(flatten)]
        stamp: StampArgs,
    },
    /// Embed and stamp, keeping the original image if either step fails
    Protect {
        #[command(flatten)]
        io: IoArgs,
        /// Invisible payload
        #[arg(long)]
        mark: Option<String>,
        /// Visible stamp text
        #[arg(long)]
        stamp: Option<String>,
        #[command(flatten)]
        stamp_args: StampArgs,
    },
}

#[derive(Args)]
struct IoArgs {
    /// Input image file or directory
    input: String,

    /// Output file or directory (default: {name}_marked.{ext})
    #[arg(short, long)]
    output: Option<String>,
}

#[derive(Args)]
struct StampArgs {
    /// Stamp opacity, exclusive range (0.0-1.0)
    #[arg(long, default_value = "0.35")]
    opacity: f32,

    /// Text height as a fraction of image width (0.0-1.0)
    #[arg(long, default_value = "0.035")]
    text_height: f32,

    /// Corner margin as a fraction of the shorter side (0.0-1.0)
    #[arg(long, default_value = "0.02")]
    margin: f32,
}

impl From<&StampArgs> for StampOptions {
    fn from(args: &StampArgs) -> Self {
        Self {
            opacity: args.opacity,
            text_height_ratio: args.text_height,
            margin_ratio: args.margin,
        }
    }
}

fn init_logging(opts: &ProcessOptions) {
    let level = if opts.verbose {
        Level::DEBUG
    } else if opts.quiet {
        Level::ERROR
    } else {
        Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    let opts = ProcessOptions {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };
    init_logging(&opts);

    let (input, output, op, stamp_options) = match cli.command {
        Command::Embed { io, text } => (io.input, io.output, Operation::Embed(text), None),
        Command::Decode { input } => (input, None, Operation::Decode, None),
        Command::Stamp { io, text, stamp } => (
            io.input,
            io.output,
            Operation::Stamp(text),
            Some(StampOptions::from(&stamp)),
        ),
        Command::Protect {
            io,
            mark,
            stamp,
            stamp_args,
        } => {
            if mark.is_none() && stamp.is_none() {
                eprintln!("Error: protect needs --mark, --stamp, or both");
                process::exit(1);
            }
            (
                io.input,
                io.output,
                Operation::Protect(ProtectOptions { mark, stamp }),
                Some(StampOptions::from(&stamp_args)),
            )
        }
    };

    let engine = match WatermarkEngine::new(stamp_options.unwrap_or_default()) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let input_path = Path::new(&input);
    if !input_path.exists() {
        eprintln!("Error: Input path does not exist: {input}");
        process::exit(1);
    }

    let results = if input_path.is_dir() {
        let output_dir = match (&output, &op) {
            (Some(o), _) => PathBuf::from(o),
            (None, Operation::Decode) => input_path.to_path_buf(),
            (None, _) => {
                eprintln!("Error: Output directory is required for batch processing");
                eprintln!("Usage: image-watermark <command> <input_dir> -o <output_dir>");
                process::exit(1);
            }
        };
        engine.process_directory(input_path, &output_dir, &op)
    } else {
        let output_path = match &output {
            Some(o) => PathBuf::from(o),
            None => default_output_path(input_path),
        };
        vec![engine.process_file(input_path, &output_path, &op)]
    };

    let mut success_count = 0u32;
    let mut skip_count = 0u32;
    let mut fail_count = 0u32;

    for r in &results {
        print_result(r, &opts);
        if r.skipped {
            skip_count += 1;
        } else if r.success {
            success_count += 1;
        } else {
            fail_count += 1;
        }
    }

    if results.len() > 1 && !opts.quiet {
        eprintln!();
        eprint!("[Summary] Processed: {success_count}");
        if skip_count > 0 {
            eprint!(", Skipped: {skip_count}");
        }
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", results.len());
    }

    if fail_count > 0 {
        process::exit(1);
    }
}

fn print_result(result: &ProcessResult, opts: &ProcessOptions) {
    let filename = result.path.file_name().map_or_else(
        || result.path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    );

    // Decoded payloads go to stdout so they can be piped.
    if let Some(payload) = &result.payload {
        println!("{filename}\t{payload}");
    } else if result.skipped && result.output.is_none() && result.success {
        println!("{filename}\t[NONE]");
    }

    if opts.quiet && result.success {
        return;
    }

    if result.skipped {
        eprintln!("[SKIP] {filename}: {}", result.message);
    } else if result.success {
        match &result.output {
            Some(out) => eprintln!("[OK] {filename} -> {}", out.display()),
            None => eprintln!("[OK] {filename}"),
        }
    } else {
        eprintln!("[FAIL] {filename}: {}", result.message);
    }

    if opts.verbose && !result.message.is_empty() {
        eprintln!("  -> {}", result.message);
    }
}
