use clap::{Parser, Subcommand};
use imageio_bind::config::{self, Config};
use imageio_bind::{Attribute, ImageBuf, ImageCache, TypeDesc};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "imageio")]
#[command(about = "Inspect, convert and cache-read images")]
#[command(long_about = "\
Inspect, convert and cache-read images

Files are opened through an image cache: headers first, pixels only when a
command needs them. By default every file goes through the process-wide
shared cache; set `[cache] shared = false` in the config for a private one.

Logging goes to stderr. Set RUST_LOG for fine-grained control, or pass -v
for debug output.

Run 'imageio gen-config' to generate a documented config.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file
    #[arg(long, default_value = "imageio.toml", global = true)]
    config: PathBuf,

    /// Raise log verbosity to debug
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the spec of each file
    Info {
        files: Vec<PathBuf>,
        /// Emit one JSON object per file
        #[arg(long)]
        json: bool,
    },
    /// Read an image and write it in another format or data type
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Output format (default: from the output extension)
        #[arg(long)]
        format: Option<String>,
        /// Pixel data type, e.g. uint8, uint16, float
        #[arg(long)]
        data_format: Option<TypeDesc>,
        /// Set an attribute: NAME=VALUE, VALUE parsed as JSON, else text.
        /// Stored in PNG text chunks and TIFF tags; JPEG and WebP drop them
        #[arg(long = "attr", value_parser = parse_attr)]
        attrs: Vec<(String, serde_json::Value)>,
    },
    /// Read files in parallel through one cache and print its statistics
    Stats {
        /// Files or directories (walked recursively)
        paths: Vec<PathBuf>,
        /// Report detail: 0 summary, 1 counters, 2 per-file list
        #[arg(long, default_value_t = 1)]
        level: i32,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

/// What `info --json` prints per file.
#[derive(Serialize)]
struct SpecSummary {
    path: String,
    file_format: String,
    width: i32,
    height: i32,
    nchannels: i32,
    format: String,
    channel_names: Vec<String>,
    orientation: i32,
    attributes: Vec<Attribute>,
}

impl SpecSummary {
    fn of(buf: &ImageBuf) -> Self {
        let spec = buf.spec();
        Self {
            path: buf.name(),
            file_format: buf.file_format_name(),
            width: spec.width(),
            height: spec.height(),
            nchannels: spec.nchannels(),
            format: spec.format().to_string(),
            channel_names: spec.channel_names(),
            orientation: buf.orientation(),
            attributes: spec.attributes(),
        }
    }
}

fn parse_attr(s: &str) -> Result<(String, serde_json::Value), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))?;
    if name.is_empty() {
        return Err(format!("attribute name missing in '{s}'"));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let config = config::load_config(&cli.config)?;
    let mut cache = ImageCache::with_config(&config.cache);

    match cli.command {
        Command::Info { files, json } => {
            for path in &files {
                let buf = ImageBuf::open_with_cache(path, &cache)?;
                let summary = SpecSummary::of(&buf);
                if json {
                    println!("{}", serde_json::to_string(&summary)?);
                } else {
                    print_summary(&summary);
                }
            }
        }
        Command::Convert {
            input,
            output,
            format,
            data_format,
            attrs,
        } => {
            convert(&config, &cache, &input, &output, format, data_format, &attrs)?;
            println!("{} → {}", input.display(), output.display());
        }
        Command::Stats { paths, level } => {
            init_thread_pool(&config.processing);
            let files = collect_images(&paths);
            let failures: Vec<String> = files
                .par_iter()
                .filter_map(|path| {
                    let mut buf = ImageBuf::from_path_with_cache(path, Some(&cache));
                    buf.read(false)
                        .err()
                        .map(|e| format!("{}: {e}", path.display()))
                })
                .collect();
            for failure in &failures {
                eprintln!("warning: {failure}");
            }
            print!("{}", cache.get_stats(level));
        }
        Command::GenConfig => {}
    }

    cache.destroy(false);
    Ok(())
}

/// Install the stderr subscriber. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores — user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn print_summary(s: &SpecSummary) {
    println!(
        "{} : {} x {}, {} channel, {} {}",
        s.path, s.width, s.height, s.nchannels, s.format, s.file_format
    );
    println!("    channel list: {}", s.channel_names.join(", "));
    if s.orientation != 1 {
        println!("    orientation: {}", s.orientation);
    }
    for attr in &s.attributes {
        println!("    {}: {}", attr.name, attr.value);
    }
}

fn convert(
    config: &Config,
    cache: &ImageCache,
    input: &Path,
    output: &Path,
    format: Option<String>,
    data_format: Option<TypeDesc>,
    attrs: &[(String, serde_json::Value)],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut buf = ImageBuf::open_with_cache(input, cache)?;
    buf.read(false)?;
    {
        let mut spec = buf.spec_mut();
        config.write.apply_attributes(&mut spec)?;
        for (name, value) in attrs {
            spec.set_attribute_json(name, value)?;
        }
    }
    buf.set_write_format(data_format.unwrap_or_else(|| config.write.data_format()))?;
    if let Some([w, h]) = config.write.tiles {
        buf.set_write_tiles(w, h, 1)?;
    }
    let format = format.or_else(|| config.write.format.clone()).unwrap_or_default();
    buf.write_file(output, &format)?;
    Ok(())
}

/// Files named on the command line plus every image found under the
/// directories, in walk order.
fn collect_images(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        for entry in WalkDir::new(path).sort_by_file_name() {
            match entry {
                Ok(entry) if entry.file_type().is_file() && is_image(entry.path()) => {
                    files.push(entry.into_path());
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "skipping unreadable entry"),
            }
        }
    }
    files
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            matches!(
                ext.to_ascii_lowercase().as_str(),
                "png" | "jpg" | "jpeg" | "tif" | "tiff" | "webp"
            )
        })
}
