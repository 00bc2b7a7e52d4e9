use anyhow::Context;
use clap::Parser;
use ocr_preprocess::batch::{self, BatchOptions};
use ocr_preprocess::config::{builtin_profiles, PipelineConfig};
use ocr_preprocess::profiles::{ProfileResolver, DEFAULT_PROFILES};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod settings;

#[derive(Parser, Debug)]
#[command(name = "ocr-preprocess")]
#[command(about = "Prepare scanned images for OCR engines using tuned preprocessing profiles")]
#[command(version)]
pub struct Args {
    /// OCR engine the images are prepared for (selects its default profile)
    #[arg(long, env = "PPRO_ENGINE", default_value = "tesseract")]
    pub engine: String,

    /// Profile name, overriding the engine's default
    #[arg(long, env = "PPRO_PROFILE")]
    pub profile: Option<String>,

    /// Directory searched for `<profile>.json` before the bundled profiles
    #[arg(long, env = "PPRO_PROFILE_DIR")]
    pub profile_dir: Option<PathBuf>,

    /// Directory processed images are written to (as PNG)
    #[arg(long, env = "PPRO_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Images processed concurrently (default: number of CPU cores)
    #[arg(long, env = "PPRO_JOBS")]
    pub jobs: Option<usize>,

    /// Print each image's execution trace as JSON
    #[arg(long)]
    pub trace: bool,

    /// List bundled profiles and the engine table, then exit
    #[arg(long)]
    pub list_profiles: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Input images
    pub files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if args.list_profiles {
        for name in builtin_profiles() {
            println!("{}", name);
        }
        for (engine, profile) in DEFAULT_PROFILES {
            println!("{:>10} -> {}", engine, profile);
        }
        return Ok(());
    }

    let settings = settings::Settings::from(args);
    if settings.inputs.is_empty() {
        anyhow::bail!("no input images given");
    }

    let profile = ProfileResolver::default().resolve(&settings.engine, settings.profile.as_deref())?;
    let config = PipelineConfig::load_named(&profile, settings.profile_dir.as_deref())
        .with_context(|| format!("failed to load profile '{}'", profile))?;

    if let Some(dir) = &settings.output_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }

    tracing::info!(
        "ocr-preprocess v{}: {} image(s) with profile {}",
        env!("CARGO_PKG_VERSION"),
        settings.inputs.len(),
        config.name
    );

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, finishing images in progress");
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    let options = BatchOptions {
        output_dir: settings.output_dir.clone(),
        jobs: settings.jobs,
    };
    let outcomes = batch::run_batch(settings.inputs.clone(), Arc::new(config), &options, cancel).await;

    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(trace) => {
                if settings.trace {
                    let line = serde_json::json!({ "input": outcome.input, "trace": trace });
                    println!("{}", line);
                }
                if let Some(output) = &outcome.output {
                    tracing::info!("{} -> {}", outcome.input.display(), output.display());
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("{}: {}", outcome.input.display(), e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} image(s) failed", failed, outcomes.len());
    }
    Ok(())
}
