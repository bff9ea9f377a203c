mod cli;

use mstseg::{
    config,
    conversion::ConversionTemplate,
    logging,
    pipeline::{Pipeline, RunSummary},
    stages::Stage,
};
use mstseg_common::{SessionId, SubjectId, UnitId};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // `run` sets up logging itself once it knows where the run log goes
    let _guard = if matches!(cli.command, Commands::Run { .. }) {
        None
    } else {
        logging::init(cli.verbose, None)?
    };

    match cli.command {
        Commands::Run {
            serial,
            no_extract,
            skip_qc,
            threads,
        } => {
            let mut config = config::load_config_or_default(cli.config.as_deref())?;

            // CLI flags override the config file
            if serial {
                config.dispatch.serial = true;
            }
            if threads.is_some() {
                config.dispatch.threads = threads;
            }
            if no_extract {
                config.extraction.enabled = false;
            }
            if skip_qc {
                config.qc.enabled = false;
            }
            config::validate_config(&config)?;

            let log_dir = config
                .paths
                .log_to_file
                .then_some(config.paths.derivatives_dir.as_path());
            let _run_guard = logging::init(cli.verbose, log_dir)?;
            log_config_warnings(&config);

            run_pipeline(&config)
        }
        Commands::Derive { files } => derive(&files),
        Commands::RenderConfig {
            template,
            subject,
            session,
            output,
        } => render_config(cli.config.as_deref(), &template, &subject, &session, &output),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate { file } => {
            let path = file.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("mstseg {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn log_config_warnings(config: &config::Config) {
    for warning in config::config_warnings(config) {
        tracing::warn!("{}", warning);
    }
}

fn run_pipeline(config: &config::Config) -> Result<()> {
    let result = Pipeline::new(config).and_then(Pipeline::run);

    match result {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!(">> FAILED << {:#}", e);
            Err(e)
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!("\nRun summary:");
    for report in &summary.stages {
        println!(
            "  {:<26} {} succeeded, {} skipped, {} failed",
            report.stage.name(),
            report.success_count(),
            report.skipped_count(),
            report.failure_count()
        );
    }

    if !summary.removed.is_empty() {
        println!("\nRemoved by {}:", Stage::CohortFilter);
        for removal in &summary.removed {
            println!("  {} - {}", removal.unit, removal.reason);
        }
    }

    if !summary.warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &summary.warnings {
            println!("  {}", warning);
        }
    }

    println!("\nSegmented units: {}", summary.cohort.len());
}

fn derive(files: &[PathBuf]) -> Result<()> {
    let mut rejected = 0;

    for file in files {
        match UnitId::from_filename(file) {
            Ok(unit) => {
                let bids = unit.to_bids();
                println!(
                    "{}\t{}\t{}\t{}",
                    file.display(),
                    unit.subject,
                    unit.session,
                    bids.key()
                );
            }
            Err(e) => {
                rejected += 1;
                eprintln!("✗ {}", e);
            }
        }
    }

    if rejected > 0 {
        anyhow::bail!("{} of {} file(s) rejected", rejected, files.len());
    }
    Ok(())
}

fn render_config(
    config_path: Option<&Path>,
    template: &Path,
    subject: &str,
    session: &str,
    output: &Path,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let template = ConversionTemplate::load(template, &config.conversion.criteria_field)?;

    let subject = SubjectId::new(subject.strip_prefix("sub-").unwrap_or(subject)).to_bids();
    let session = SessionId::new(session.strip_prefix("ses-").unwrap_or(session)).to_bids();
    if subject.label().is_empty() || session.label().is_empty() {
        anyhow::bail!("Subject and session labels must contain alphanumeric characters");
    }

    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory: {:?}", output))?;
    let path = template.render(&subject, &session, output)?;
    println!("{}", path.display());
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    log_config_warnings(&config);
    println!("Checking external tools...\n");

    let tools = mstseg_tools::check_tools(config.programs());
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them or point the [tools] section at them.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    let dispatcher = config.dispatch.dispatcher();
    println!("  Raw input: {:?}", config.paths.raw_dir);
    println!("  BIDS: {:?}", config.paths.bids_dir);
    println!("  Derivatives: {:?}", config.paths.derivatives_dir);
    println!("  Workers: {}", dispatcher.workers());
    println!(
        "  Cohort filter: {}",
        if config.filter.enabled {
            format!(
                "{} {:?} {:?}",
                config.filter.field, config.filter.mode, config.filter.pattern
            )
        } else {
            "disabled".to_string()
        }
    );
    println!("  Quality control: {}", config.qc.enabled);
    println!("  Cluster statistics: {}", config.stats.enabled);
    println!("  Tools: {}", config.tools.named().len());

    for warning in config::config_warnings(&config) {
        println!("  ! {}", warning);
    }

    Ok(())
}
