// src/bin/pixelshift.rs
//
// Command-line host: `pixelshift <tool> [options] <files...> --out <dir>`

use clap::Parser;
use pixelshift::engine::BatchObserver;
use pixelshift::{DirectorySink, Encoder, InputFile, PixelShiftError, Session, Tool};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// PixelShift - compress, convert, resize and watermark images in batches
#[derive(Parser, Debug)]
#[command(name = "pixelshift")]
#[command(version, about, long_about = None)]
struct Args {
    /// compressor, converter, resizer, watermarker or suite
    #[arg(value_parser = parse_tool)]
    tool: Tool,

    /// Input images
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Directory the result is written to
    #[arg(short, long, default_value = ".")]
    out: PathBuf,

    /// Output format: source, jpeg, png or webp
    #[arg(short, long)]
    format: Option<String>,

    /// Lossy quality, 0-100
    #[arg(short, long)]
    quality: Option<String>,

    /// Target width in pixels
    #[arg(long)]
    width: Option<String>,

    /// Target height in pixels
    #[arg(long)]
    height: Option<String>,

    /// none, grayscale, sepia, invert, vintage, cool, warm or dramatic
    #[arg(long)]
    filter: Option<String>,

    /// Watermark text
    #[arg(long)]
    text: Option<String>,

    /// Watermark logo image; switches the watermark to image mode
    #[arg(long)]
    logo: Option<PathBuf>,

    /// TrueType/OpenType file registered under --font
    #[arg(long)]
    font_file: Option<PathBuf>,

    /// Watermark font family
    #[arg(long)]
    font: Option<String>,

    /// Watermark color, #RRGGBB
    #[arg(long)]
    color: Option<String>,

    /// Watermark opacity, 0-1
    #[arg(long)]
    opacity: Option<String>,

    /// Watermark size, percent of image width
    #[arg(long)]
    size: Option<String>,

    /// Watermark anchor, e.g. bottom-right
    #[arg(long)]
    position: Option<String>,

    /// Skip the mozjpeg/libwebp/oxipng optimizer pass
    #[arg(long)]
    no_optimize: bool,
}

fn parse_tool(name: &str) -> Result<Tool, String> {
    name.parse::<Tool>().map_err(|e| e.to_string())
}

/// Logs progress; warnings are already logged by the batch runner.
struct CliObserver;

impl BatchObserver for CliObserver {
    fn on_progress(&mut self, completed: usize, total: usize) {
        tracing::debug!(target: "pixelshift::cli", completed, total, "progress");
    }

    fn on_warning(&mut self, name: &str, error: &PixelShiftError) {
        eprintln!("warning: {name}: {error}");
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pixelshift=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Feed a raw flag value through an option setter; rejected values keep the default.
fn apply(flag: &str, value: Option<&str>, setter: impl FnOnce(&str) -> bool) {
    if let Some(value) = value {
        if !setter(value) {
            tracing::warn!(target: "pixelshift::cli", flag, value, "ignoring invalid value");
        }
    }
}

fn run(args: Args) -> Result<(), PixelShiftError> {
    let mut session = Session::for_tool(args.tool);
    if args.no_optimize {
        session = session.with_encoder(Encoder::direct());
    }

    if let Some(path) = &args.font_file {
        let family = args.font.clone().unwrap_or_else(|| "sans-serif".to_string());
        let data = std::fs::read(path)
            .map_err(|e| PixelShiftError::file_read_failed(path.display().to_string(), e))?;
        session.register_font(family, data)?;
    }
    if let Some(path) = &args.logo {
        session.set_logo(&InputFile::from_path(path)?)?;
        session.options_mut().set_watermark_kind_input("image");
    }

    let options = session.options_mut();
    apply("--format", args.format.as_deref(), |v| options.set_format_input(v));
    apply("--quality", args.quality.as_deref(), |v| options.set_quality_input(v));
    apply("--width", args.width.as_deref(), |v| options.set_width_input(v));
    apply("--height", args.height.as_deref(), |v| options.set_height_input(v));
    apply("--filter", args.filter.as_deref(), |v| options.set_filter_input(v));
    apply("--color", args.color.as_deref(), |v| {
        options.set_watermark_color_input(v)
    });
    apply("--opacity", args.opacity.as_deref(), |v| {
        options.set_watermark_opacity_input(v)
    });
    apply("--size", args.size.as_deref(), |v| options.set_watermark_size_input(v));
    apply("--position", args.position.as_deref(), |v| {
        options.set_watermark_position_input(v)
    });
    if let Some(text) = &args.text {
        options.set_watermark_text(text.clone());
    }
    if let Some(font) = &args.font {
        options.set_watermark_font(font.clone());
    }

    let files = args
        .files
        .iter()
        .map(InputFile::from_path)
        .collect::<Result<Vec<_>, _>>()?;
    session.add_files(files)?;

    let mut sink = DirectorySink::new(&args.out);
    let report = session.process(&mut CliObserver, &mut sink)?;

    let path = args.out.join(&report.download.filename);
    println!(
        "{} ({} of {} images, {:.1}% smaller)",
        path.display(),
        report.processed,
        report.total,
        report.savings_percent()
    );
    for failure in &report.failures {
        println!("  skipped {}: {}", failure.name, failure.message);
    }
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
