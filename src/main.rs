use anyhow::Context;
use clap::Parser;
use meteogram::core::controller::MAX_ATTEMPTS;
use meteogram::domain::ports::ConfigStore;
use meteogram::utils::error::ErrorSeverity;
use meteogram::utils::{logger, validation::Validate};
use meteogram::{
    AcquisitionController, AcquisitionState, ControllerHandle, DocumentClient, ForecastClient,
    LocalStorage, MeteogramError, TomlConfig,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "meteogram")]
#[command(about = "Fetches, renders and sanitizes weather meteogram SVGs")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "meteogram.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Write the sanitized document here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Keep running, writing every refreshed document, until Ctrl-C
    #[arg(short, long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.json_logs {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("Starting meteogram");
    tracing::info!("Loading configuration from: {}", args.config);

    let config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => fail(&e),
    };

    if let Err(e) = config.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        fail(&e);
    }

    let storage = LocalStorage::new(config.storage_path());
    let mut widget = config.to_widget_config();

    if widget.literal_svg().is_none() {
        match storage.read_svg_code().await {
            Ok(Some(svg)) => {
                tracing::info!(
                    "Using stored SVG from {} as fallback",
                    storage.svg_code_path().display()
                );
                widget.svg_code = Some(svg);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Could not read stored SVG: {}", e),
        }
    }

    let forecast = ForecastClient::with_endpoint(config.forecast_endpoint())
        .with_user_agent(config.forecast_user_agent());
    let documents = DocumentClient::with_timeout(config.document_timeout());
    let mut handle = AcquisitionController::spawn(forecast, documents, storage);
    handle.reconfigure(widget);

    let result = if args.watch {
        watch(&mut handle, &args).await
    } else {
        once(&mut handle, &args).await
    };
    handle.shutdown().await;

    match result {
        Ok(None) => Ok(()),
        Ok(Some(e)) => fail(&e),
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("❌ {:#}", e);
            std::process::exit(exit_code(ErrorSeverity::Critical));
        }
    }
}

/// Waits for the first settled state and emits it.
async fn once(handle: &mut ControllerHandle, args: &Args) -> anyhow::Result<Option<MeteogramError>> {
    match handle.next_settled().await {
        Some(state) => emit(&state, args).await,
        None => anyhow::bail!("acquisition controller stopped unexpectedly"),
    }
}

async fn watch(handle: &mut ControllerHandle, args: &Args) -> anyhow::Result<Option<MeteogramError>> {
    tracing::info!("Watching for updates, press Ctrl-C to stop");

    loop {
        tokio::select! {
            state = handle.next_settled() => match state {
                Some(state) => {
                    if let Some(e) = emit(&state, args).await? {
                        tracing::warn!("{}", e.user_friendly_message());
                    }
                }
                None => anyhow::bail!("acquisition controller stopped unexpectedly"),
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                tracing::info!("Interrupted, shutting down");
                return Ok(None);
            }
        }
    }
}

/// Writes the view for `state`; returns the error to report for non-ready states.
async fn emit(state: &AcquisitionState, args: &Args) -> anyhow::Result<Option<MeteogramError>> {
    match state {
        AcquisitionState::Ready(doc) => {
            write_output(&doc.sanitized_html, args).await?;
            Ok(None)
        }
        AcquisitionState::Degraded(url) => {
            tracing::warn!("Falling back to an embedded frame for {}", url);
            write_output(&degraded_frame(url), args).await?;
            Ok(Some(MeteogramError::ExhaustedRetries {
                attempts: MAX_ATTEMPTS,
            }))
        }
        AcquisitionState::Failed(message) => {
            eprintln!("❌ {}", message);
            Ok(Some(MeteogramError::ExhaustedRetries {
                attempts: MAX_ATTEMPTS,
            }))
        }
        AcquisitionState::Idle => Ok(Some(MeteogramError::MissingConfigError {
            field: "source.url or source.svg_code".to_string(),
        })),
        AcquisitionState::Loading => Ok(None),
    }
}

async fn write_output(content: &str, args: &Args) -> anyhow::Result<()> {
    match &args.output {
        Some(path) => {
            tokio::fs::write(path, content)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!("📁 Output saved to: {}", path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}

/// Markup embedding the source page itself.
fn degraded_frame(url: &str) -> String {
    let src = url
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!(
        r#"<iframe src="{}" title="Meteogram" style="width: 100%; height: 100%; border: 0"></iframe>"#,
        src
    )
}

fn exit_code(severity: ErrorSeverity) -> i32 {
    match severity {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}

fn fail(e: &MeteogramError) -> ! {
    tracing::error!(
        "{} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(exit_code(e.severity()));
}
