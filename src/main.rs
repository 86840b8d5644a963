use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use gridcorr::cli::{Cli, Commands, OutputFormat, render_template};
use gridcorr::input::JobConfig;
use gridcorr::{JobSummary, run_job_with_progress};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let base_config = match &cli.config {
        Some(path) if cli.uses_config() => Some(load_config(path)?),
        _ => None,
    };
    init_logging(&cli, base_config.as_ref());

    match &cli.command {
        Commands::Run(args) => {
            let config = args
                .resolve(base_config)
                .context("Failed to assemble job configuration")?;
            config.validate().context("Invalid job configuration")?;
            if args.dry_run {
                info!("Dry run: configuration is valid, nothing was processed");
                return print_report(&cli.output_format, &config, None);
            }
            let summary = run(&cli, &config)?;
            print_report(&cli.output_format, &config, Some(&summary))
        }
        Commands::Validate {
            config_file,
            detailed,
        } => {
            let config = match (config_file, base_config) {
                (Some(path), _) => load_config(path)?,
                (None, Some(config)) => config,
                (None, None) => anyhow::bail!("No configuration given: pass a file or --config"),
            };
            config.validate().context("Invalid job configuration")?;
            if !cli.quiet {
                println!("✓ Configuration is valid");
            }
            if *detailed {
                print_report(&cli.output_format, &config, None)?;
            }
            Ok(())
        }
        Commands::Template {
            template_type,
            output,
            format,
        } => {
            let text = render_template(template_type, format)?;
            write_or_print(output.as_deref(), &text)
        }
        Commands::Completions { shell, output } => {
            let mut command = Cli::command();
            match output {
                Some(path) => {
                    let mut file = fs::File::create(path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    clap_complete::generate(*shell, &mut command, "gridcorr", &mut file);
                }
                None => {
                    clap_complete::generate(*shell, &mut command, "gridcorr", &mut io::stdout())
                }
            }
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<JobConfig> {
    JobConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

fn init_logging(cli: &Cli, config: Option<&JobConfig>) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        config
            .and_then(|c| c.log_level.as_deref())
            .unwrap_or("info")
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    debug!("Log level: {}", level);
}

fn run(cli: &Cli, config: &JobConfig) -> Result<JobSummary> {
    let spinner = if cli.quiet {
        ProgressBar::hidden()
    } else {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]")
                .context("Invalid progress template")?,
        );
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    };

    let result = run_job_with_progress(config, |stage| {
        spinner.set_message(stage.describe());
    });
    spinner.finish_and_clear();
    result.context("Correlation job failed")
}

fn print_report(
    format: &OutputFormat,
    config: &JobConfig,
    summary: Option<&JobSummary>,
) -> Result<()> {
    match format {
        OutputFormat::Human => {
            println!("Source:    {} ({})", config.source.path, config.source.variable);
            println!(
                "Reference: {} ({})",
                config.reference.path, config.reference.variable
            );
            println!(
                "Resample:  order {}, clamp {:?}",
                config.resample.order, config.resample.clamp
            );
            for (i, filter) in config.bounds.iter().enumerate() {
                println!("Bound {}:   {} on {}", i + 1, filter.kind(), filter.dimension_name());
            }
            if let Some(summary) = summary {
                println!(
                    "Grid:      {} steps x {} x {}",
                    summary.shape.0, summary.shape.1, summary.shape.2
                );
                println!(
                    "Cells:     {} of {} defined",
                    summary.defined_cells, summary.cells
                );
                if let Some(regions) = summary.regions {
                    println!("Regions:   {}", regions);
                }
                for output in &summary.outputs {
                    println!("Wrote:     {}", output);
                }
                println!("Elapsed:   {:.2}s", summary.elapsed_seconds);
            }
        }
        OutputFormat::Json => {
            let report = serde_json::json!({ "job": config, "summary": summary });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Yaml => {
            let report = serde_json::json!({ "job": config, "summary": summary });
            print!("{}", serde_yaml::to_string(&report)?);
        }
    }
    Ok(())
}

fn write_or_print(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}
