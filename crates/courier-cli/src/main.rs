//! courier - demo driver for the courier-core pipeline
//!
//! SyntheticSource → WorkQueue → workers → SimulatedSender を動かし、
//! Ctrl-C（または --run-for-secs 経過）で graceful shutdown して
//! final スナップショットを JSON で標準出力に出す。

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use courier_core::config::{PipelineConfigBuilder, RawPipelineConfig};
use courier_core::impls::{SimulatedSender, SyntheticSource};
use courier_core::logging::{LogFormat, init_logging};
use courier_core::{CourierError, OverflowPolicy, PipelineBuilder};

#[derive(Parser, Debug, Clone)]
#[command(name = "courier")]
#[command(about = "Run a bounded producer/worker pipeline against a simulated sender")]
#[command(version)]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Queue capacity
    #[arg(long)]
    capacity: Option<usize>,

    /// Number of concurrent workers
    #[arg(long = "workers")]
    worker_count: Option<usize>,

    /// Retry budget per item
    #[arg(long)]
    max_retries: Option<u32>,

    /// First retry delay in milliseconds
    #[arg(long, value_name = "MS")]
    backoff_base_ms: Option<u64>,

    /// Overflow policy when the queue is full (block, drop-newest, drop-oldest)
    #[arg(long = "overflow", value_name = "POLICY")]
    overflow_policy: Option<OverflowPolicy>,

    /// Metrics snapshot interval in milliseconds
    #[arg(long, value_name = "MS")]
    metrics_interval_ms: Option<u64>,

    /// Share of simulated sends that fail transiently (0.0 - 1.0)
    #[arg(long, default_value_t = 0.2)]
    failure_rate: f64,

    /// Simulated send latency upper bound in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 50)]
    max_latency_ms: u64,

    /// Stop after producing this many items (default: unbounded)
    #[arg(long)]
    items: Option<u64>,

    /// Request shutdown after this many seconds
    #[arg(long, value_name = "SECS")]
    run_for_secs: Option<u64>,

    /// Seed for the producer and the simulated sender
    #[arg(long)]
    seed: Option<u64>,

    /// Log level used when RUST_LOG is unset
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long = "log-json")]
    log_json: bool,
}

impl Args {
    fn pipeline_config(&self) -> Result<courier_core::PipelineConfig, CourierError> {
        let raw = match &self.config {
            Some(path) => RawPipelineConfig::from_json_file(path)?,
            None => RawPipelineConfig::default(),
        };

        let mut builder = PipelineConfigBuilder::from_raw(raw);
        if let Some(capacity) = self.capacity {
            builder = builder.capacity(capacity);
        }
        if let Some(workers) = self.worker_count {
            builder = builder.worker_count(workers);
        }
        if let Some(max_retries) = self.max_retries {
            builder = builder.max_retries(max_retries);
        }
        if let Some(ms) = self.backoff_base_ms {
            builder = builder.backoff_base(Duration::from_millis(ms));
        }
        if let Some(policy) = self.overflow_policy {
            builder = builder.overflow_policy(policy);
        }
        if let Some(ms) = self.metrics_interval_ms {
            builder = builder.metrics_interval(Duration::from_millis(ms));
        }
        if let Some(seed) = self.seed {
            builder = builder.seed(seed);
        }
        Ok(builder.build()?)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let format = if args.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_logging(format, &args.log_level);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "courier failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), CourierError> {
    let config = args.pipeline_config()?;

    let mut sender = SimulatedSender::new(args.failure_rate)
        .with_latency(Duration::ZERO, Duration::from_millis(args.max_latency_ms));
    let mut source = match args.items {
        Some(limit) => SyntheticSource::limited(limit),
        None => SyntheticSource::unbounded(),
    };
    if let Some(seed) = args.seed {
        sender = sender.with_seed(seed);
        source = source.with_seed(seed);
    }

    let handle = PipelineBuilder::new(config)
        .sender(sender)
        .source(source)
        .build()?
        .start();

    // Ctrl-C / 時間切れで cancel。wait() 側は producer の停止から順に回収する
    let coordinator = handle.coordinator();
    let run_for = args.run_for_secs.map(Duration::from_secs);
    tokio::spawn(async move {
        stop_requested(tokio::signal::ctrl_c(), run_for).await;
        coordinator.cancel();
    });

    let report = handle.wait().await?;

    for worker in report.failed_workers() {
        warn!(worker_id = worker.worker_id, exit = %worker.exit, "worker ended abnormally");
    }

    let json = serde_json::to_string_pretty(&report.final_snapshot)
        .map_err(|err| CourierError::Other(format!("failed to encode final snapshot: {err}")))?;
    println!("{json}");
    Ok(())
}

/// Resolves on Ctrl-C or once `run_for` has elapsed, whichever comes first.
///
/// If the Ctrl-C handler cannot be installed the deadline still applies.
async fn stop_requested<F>(ctrl_c: F, run_for: Option<Duration>)
where
    F: Future<Output = io::Result<()>>,
{
    let deadline = async {
        match run_for {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    tokio::select! {
        res = ctrl_c => match res {
            Ok(()) => info!("ctrl-c received, shutting down"),
            Err(err) => {
                warn!(error = %err, "failed to listen for ctrl-c, waiting for the run time only");
                (&mut deadline).await;
                info!("run time elapsed, shutting down");
            }
        },
        _ = &mut deadline => info!("run time elapsed, shutting down"),
    }
}
