mod cli;
mod logging;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use streamloader_core::{
    load_layered, metrics, validate_config, Config, FirehoseClient, IamRoleClient,
    IngestOrchestrator, LineFileSource, RunSummary, SystemClock,
};

use cli::{Cli, Commands, LoadArgs, PipelineArgs};

/// Exit code for failures before the run starts (config, clients).
const EXIT_STARTUP: i32 = 1;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            EXIT_STARTUP
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Load(args) => load(cli.config.as_deref(), args).await,
        Commands::Check(args) => {
            let config = resolve_config(cli.config.as_deref(), &args)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&config).context("Failed to render config")?
            );
            Ok(0)
        }
    }
}

/// Defaults, then file, then environment, then flags; validated.
fn resolve_config(path: Option<&Path>, args: &PipelineArgs) -> Result<Config> {
    let mut config = load_layered(path).context("Failed to load configuration")?;
    args.apply(&mut config);
    validate_config(&config).context("Configuration validation failed")?;
    Ok(config)
}

async fn load(config_path: Option<&Path>, args: LoadArgs) -> Result<i32> {
    let config = resolve_config(config_path, &args.pipeline)?;
    let spec = config.pipeline.to_spec();

    info!(
        "Loading {} into pipeline {} (region {}, batch size {})",
        args.input.display(),
        spec.name,
        config.aws.region,
        config.dispatch.batch_size
    );

    let roles = Arc::new(IamRoleClient::from_config(&config.aws).await);
    let delivery = Arc::new(FirehoseClient::from_config(&config.aws).await);
    let orchestrator =
        IngestOrchestrator::from_config(roles, delivery, Arc::new(SystemClock), &config);

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_signal(cancel.clone()));

    let source = LineFileSource::new(&args.input);
    let result = orchestrator.run(&spec, &source, &cancel).await;
    watcher.abort();

    let code = match result {
        Ok(summary) => {
            print_summary(&summary, args.json)?;
            summary.exit_code(args.strict)
        }
        Err(e) => e.exit_code(),
    };

    if args.metrics {
        eprintln!("{}", metrics::encode_metrics());
    }

    Ok(code)
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(summary).context("Failed to render summary")?
        );
        return Ok(());
    }

    let report = &summary.dispatch;
    println!("Pipeline:            {} ({})", summary.pipeline, summary.pipeline_arn);
    if summary.created {
        println!("Created:             yes");
    }
    if let Some(activation) = &summary.activation {
        println!(
            "Activation:          {} polls, {:.1}s",
            activation.attempts,
            activation.elapsed.as_secs_f64()
        );
    }
    println!("Records delivered:   {}", report.delivered());
    println!("Permanently failed:  {}", report.permanent_failures());
    println!("Batches:             {}", report.total_batches);
    println!(
        "Retried:             {} ({} recovered)",
        report.retried_records, report.recovered_records
    );
    if !report.permanently_failed.is_empty() {
        let indices: Vec<String> = report
            .failed_indices()
            .iter()
            .map(|i| i.to_string())
            .collect();
        println!("Failed indices:      {}", indices.join(", "));
    }
    if report.cancelled {
        println!("Cancelled before all records were sent");
    }
    Ok(())
}

/// Cancel `token` on Ctrl+C or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    warn!("Shutdown signal received, stopping after in-flight work");
    token.cancel();
}
