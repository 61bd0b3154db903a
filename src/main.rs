use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use pdf_squeeze::codec::{self, CodecKind};
use pdf_squeeze::notification::Notification;
use pdf_squeeze::report::{format_file_size, summary};
use pdf_squeeze::{CompressionLevel, CompressionSession, Config, FileCandidate, SessionEvent};

/// Shrink a PDF by re-encoding its images
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Input PDF file
    input: PathBuf,

    /// Output PDF file [default: compressed_<input name> next to the input]
    output: Option<PathBuf>,

    /// Compression level
    #[arg(long, value_enum)]
    level: Option<CompressionLevel>,

    /// Codec to run; the simulated one writes placeholder bytes
    #[arg(long, value_enum)]
    codec: Option<CodecKind>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Milliseconds between simulated progress ticks
    #[arg(long)]
    tick_ms: Option<u64>,
}

fn init_logging(cfg: &Config) {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(cfg.logging.level.as_str()),
    )
    .init();
}

fn notify(n: Notification) {
    match n.severity {
        pdf_squeeze::notification::Severity::Error => eprintln!("{}", n),
        _ => println!("{}", n),
    }
}

fn output_path(args: &Args, download_name: &str) -> PathBuf {
    match &args.output {
        Some(path) => path.clone(),
        None => args
            .input
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(download_name),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut cfg = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(kind) = args.codec {
        cfg.codec.kind = kind;
    }
    if let Some(tick) = args.tick_ms {
        cfg.simulated.tick_ms = tick;
    }
    init_logging(&cfg);

    let level = args.level.unwrap_or(cfg.codec.default_level);
    let port = codec::build(cfg.codec.kind, &cfg.simulated);
    let mut session = CompressionSession::new(Arc::clone(&port));

    notify(Notification::info(format!("Loading PDF: {}", args.input.display())));
    let candidate = FileCandidate::from_path(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    if let Err(e) = session.select(candidate) {
        notify(Notification::from(&e));
        return Err(e.into());
    }
    session.choose_level(level)?;

    let start = Instant::now();
    if let Err(e) = session.start() {
        notify(Notification::from(&e));
        return Err(e.into());
    }

    let terminal = session
        .run_to_end(|event| {
            if let SessionEvent::Progress(p) = event {
                log::info!("{:>5.1}%  {}", p.percent, p.phase.label());
            }
        })
        .await;

    match terminal {
        Some(SessionEvent::Completed(stats)) => {
            println!("Compressed in {:.2?}", start.elapsed());
            println!("Original size: {}", format_file_size(stats.original_size));
            println!("New size:      {}", format_file_size(stats.compressed_size));
            println!("{}", summary(&stats));
            notify(Notification::compressed(&stats));

            let download = session.download()?;
            let out = output_path(&args, &download.file_name);
            std::fs::write(&out, &download.bytes)
                .with_context(|| format!("writing {}", out.display()))?;
            println!("Saved: {:?}", out);
            notify(Notification::download_started(&download.file_name));
            session.reset();
            Ok(())
        }
        Some(SessionEvent::Failed(e)) => {
            notify(Notification::from(&e));
            Err(e.into())
        }
        _ => Err(anyhow!("compression ended without a result")),
    }
}
