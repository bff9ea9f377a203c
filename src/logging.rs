//! Console and run-log setup.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// File name of the run log written into the derivatives directory.
pub const RUN_LOG: &str = "run_pipeline.log";

fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "mstseg=trace,mstseg_tools=trace,mstseg_common=trace"
    } else {
        "mstseg=info,mstseg_tools=info,mstseg_common=info"
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the verbose flag. When `log_dir` is given, a plain-text copy of
/// the log goes to `<log_dir>/run_pipeline.log`; keep the returned guard alive until
/// exit so buffered lines are flushed.
pub fn init(verbose: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter(verbose)))
        .context("Invalid log filter")?;

    let console_layer = tracing_subscriber::fmt::layer().with_target(false);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {:?}", dir))?;
            let appender = tracing_appender::rolling::never(dir, RUN_LOG);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Logger initialization failed")?;

    Ok(guard)
}
