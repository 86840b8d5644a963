//! # CLI Module
//!
//! Command-line interface for gridcorr:
//! - Argument parsing with clap
//! - Environment variables with the `GRIDCORR_` prefix
//! - Merging of config file, environment and arguments (CLI > env > file)
//! - Filter DSL parsing for command line and environment variables

use crate::align::{ClampPolicy, ResampleOptions};
use crate::error::{ConfigError, ConfigResult};
use crate::input::{
    DatasetConfig, FilterConfig, JobConfig, ListParams, OutputConfig, RangeParams,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Per-pixel correlation between two gridded datasets
#[derive(Parser, Debug)]
#[command(name = "gridcorr")]
#[command(about = "Resample gridded datasets onto a common grid and map per-pixel correlations")]
#[command(version)]
#[command(long_about = "
gridcorr pairs two gridded (time, lat, lon) datasets cell by cell and maps
their correlation. The source dataset is resampled onto the reference grid
with a B-spline of configurable order, missing cells are propagated to both
datasets, and the Pearson and Spearman coefficients with two-sided p-values
are computed for every cell.

FEATURES:
  • B-spline resampling, order 0 (nearest) to 5, with optional clamping
  • Pearson and Spearman statistics per cell, computed in parallel
  • Coordinate bounds on time, latitude and longitude
  • Zonal summaries from a rasterized region-label grid
  • JSON and YAML job files with templates
  • Shell completions for bash, zsh, fish and PowerShell

EXAMPLES:
  # Run a job file
  gridcorr --config job.yaml run

  # Run without a job file
  gridcorr run --source smap.nc --source-variable soil_moisture \\
    --reference ndvi.nc --reference-variable ndvi --output stats.parquet

  # Narrow the window and use linear interpolation
  gridcorr --config job.yaml run --range 'lat:35:45' --order 1

  # Generate a template
  gridcorr template regions --format yaml > job.yaml

  # Generate completions
  gridcorr completions bash > ~/.bash_completion.d/gridcorr
")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode - suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format for the run/validate report
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Job configuration file (JSON or YAML)
    #[arg(short, long, global = true, env = "GRIDCORR_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a correlation job
    #[command(long_about = "
Run a correlation job.

The job comes from --config, from arguments, or from both; arguments and
GRIDCORR_* environment variables override the job file. Filters given on
the command line or in the environment are added to the job's bounds.

EXAMPLES:
  # Job file with an output override
  gridcorr --config job.json run --output other.parquet

  # Nearest-neighbour resampling, clamped to non-negative values
  gridcorr --config job.json run --order 0 --clamp non-negative

  # Validate the merged job without reading any data
  gridcorr --config job.json run --dry-run
")]
    Run(RunArgs),

    /// Validate a job configuration
    #[command(long_about = "
Validate a job configuration without reading any data.

Checks the file syntax, the spline order, the bounds and that every output
has what it needs.

EXAMPLES:
  gridcorr validate job.yaml
  gridcorr --config job.json validate --detailed
")]
    Validate {
        /// Configuration file to validate (defaults to --config)
        config_file: Option<PathBuf>,

        /// Show the parsed job
        #[arg(long)]
        detailed: bool,
    },

    /// Generate configuration templates
    #[command(long_about = "
Generate a job file template.

Available templates:
• basic: source, reference, bounds and statistics output
• regions: basic plus a region-label grid and zonal summary

EXAMPLES:
  gridcorr template basic
  gridcorr template regions --format yaml -o job.yaml
")]
    Template {
        /// Template type to generate
        #[arg(value_enum)]
        template_type: TemplateType,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Configuration format
        #[arg(long, value_enum, default_value_t = ConfigFormat::Json)]
        format: ConfigFormat,
    },

    /// Generate shell completions
    #[command(long_about = "
Generate shell completion scripts.

INSTALLATION:
  # Bash
  gridcorr completions bash > ~/.bash_completion.d/gridcorr

  # Zsh
  gridcorr completions zsh > ~/.zsh/completions/_gridcorr

  # Fish
  gridcorr completions fish > ~/.config/fish/completions/gridcorr.fish
")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    /// Whether the command reads the job file given by `--config`.
    pub fn uses_config(&self) -> bool {
        match &self.command {
            Commands::Run(_) => true,
            Commands::Validate { config_file, .. } => config_file.is_none(),
            Commands::Template { .. } | Commands::Completions { .. } => false,
        }
    }
}

/// Arguments of `gridcorr run`.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Source NetCDF file (resampled onto the reference grid)
    #[arg(long, env = "GRIDCORR_SOURCE")]
    pub source: Option<String>,

    /// Variable to read from the source file
    #[arg(long, env = "GRIDCORR_SOURCE_VARIABLE")]
    pub source_variable: Option<String>,

    /// Reference NetCDF file (defines the target grid)
    #[arg(long, env = "GRIDCORR_REFERENCE")]
    pub reference: Option<String>,

    /// Variable to read from the reference file
    #[arg(long, env = "GRIDCORR_REFERENCE_VARIABLE")]
    pub reference_variable: Option<String>,

    /// Parquet file for the per-cell statistics
    #[arg(short, long, env = "GRIDCORR_OUTPUT")]
    pub output: Option<String>,

    /// Parquet file for the resampled source values
    #[arg(long, env = "GRIDCORR_RESAMPLED_OUTPUT")]
    pub resampled_output: Option<String>,

    /// Spline order (0 nearest, 1 linear, 3 cubic, up to 5)
    #[arg(long, env = "GRIDCORR_ORDER")]
    pub order: Option<usize>,

    /// Policy for negative interpolated values
    #[arg(long, value_enum, env = "GRIDCORR_CLAMP")]
    pub clamp: Option<ClampArg>,

    /// Apply range filter: dimension:min:max
    #[arg(long = "range", value_parser = parse_range_filter)]
    pub range_filters: Vec<RangeFilterArg>,

    /// Apply list filter: dimension:val1,val2,val3
    #[arg(long = "list", value_parser = parse_list_filter)]
    pub list_filters: Vec<ListFilterArg>,

    /// Dry run - validate the merged job without processing
    #[arg(long, env = "GRIDCORR_DRY_RUN")]
    pub dry_run: bool,
}

#[derive(ValueEnum, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON structured output
    Json,
    /// YAML structured output
    Yaml,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClampArg {
    /// Keep interpolated values unchanged
    None,
    /// Replace negative values with zero
    NonNegative,
}

impl From<ClampArg> for ClampPolicy {
    fn from(arg: ClampArg) -> Self {
        match arg {
            ClampArg::None => ClampPolicy::None,
            ClampArg::NonNegative => ClampPolicy::NonNegative,
        }
    }
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum TemplateType {
    /// Source, reference, bounds and statistics output
    Basic,
    /// Basic plus zonal statistics over a region-label grid
    Regions,
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON configuration format
    Json,
    /// YAML configuration format
    Yaml,
}

/// Range filter argument from command line
#[derive(Clone, Debug, PartialEq)]
pub struct RangeFilterArg {
    pub dimension: String,
    pub min_value: f64,
    pub max_value: f64,
}

/// List filter argument from command line
#[derive(Clone, Debug, PartialEq)]
pub struct ListFilterArg {
    pub dimension: String,
    pub values: Vec<f64>,
}

/// Parse range filter from command line argument
/// Format: dimension:min:max
pub fn parse_range_filter(s: &str) -> Result<RangeFilterArg, String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        return Err("Range filter must be in format 'dimension:min:max'".to_string());
    }

    let dimension = parts[0].trim().to_string();
    if dimension.is_empty() {
        return Err("Range filter dimension cannot be empty".to_string());
    }
    let min_value = parts[1]
        .trim()
        .parse::<f64>()
        .map_err(|_| "Invalid minimum value in range filter")?;
    let max_value = parts[2]
        .trim()
        .parse::<f64>()
        .map_err(|_| "Invalid maximum value in range filter")?;

    if min_value > max_value {
        return Err("Minimum value must not exceed maximum value".to_string());
    }

    Ok(RangeFilterArg {
        dimension,
        min_value,
        max_value,
    })
}

/// Parse list filter from command line argument
/// Format: dimension:val1,val2,val3
pub fn parse_list_filter(s: &str) -> Result<ListFilterArg, String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 {
        return Err("List filter must be in format 'dimension:val1,val2,val3'".to_string());
    }

    let dimension = parts[0].trim().to_string();
    let values: Result<Vec<f64>, _> = parts[1]
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect();

    let values = values.map_err(|_| "Invalid numeric values in list filter")?;

    if dimension.is_empty() || values.is_empty() {
        return Err("List filter needs a dimension and at least one value".to_string());
    }

    Ok(ListFilterArg { dimension, values })
}

impl From<RangeFilterArg> for FilterConfig {
    fn from(arg: RangeFilterArg) -> Self {
        FilterConfig::Range {
            params: RangeParams {
                dimension_name: arg.dimension,
                min_value: arg.min_value,
                max_value: arg.max_value,
            },
        }
    }
}

impl From<ListFilterArg> for FilterConfig {
    fn from(arg: ListFilterArg) -> Self {
        FilterConfig::List {
            params: ListParams {
                dimension_name: arg.dimension,
                values: arg.values,
            },
        }
    }
}

/// Range and list filters parsed from the environment
type FilterResult = Result<(Vec<RangeFilterArg>, Vec<ListFilterArg>), String>;

/// Environment variable format:
/// - GRIDCORR_RANGE_FILTERS: "dim1:min1:max1,dim2:min2:max2"
/// - GRIDCORR_LIST_FILTERS: "dim1:val1,val2,val3;dim2:val4,val5"
pub fn parse_filters_from_env() -> FilterResult {
    let mut range_filters = Vec::new();
    let mut list_filters = Vec::new();

    if let Ok(range_env) = env::var("GRIDCORR_RANGE_FILTERS")
        && !range_env.trim().is_empty()
    {
        for filter_str in range_env.split(',') {
            let filter_str = filter_str.trim();
            if !filter_str.is_empty() {
                range_filters.push(parse_range_filter(filter_str).map_err(|e| {
                    format!("Invalid range filter in GRIDCORR_RANGE_FILTERS: {}", e)
                })?);
            }
        }
    }

    if let Ok(list_env) = env::var("GRIDCORR_LIST_FILTERS")
        && !list_env.trim().is_empty()
    {
        for filter_str in list_env.split(';') {
            let filter_str = filter_str.trim();
            if !filter_str.is_empty() {
                list_filters.push(parse_list_filter(filter_str).map_err(|e| {
                    format!("Invalid list filter in GRIDCORR_LIST_FILTERS: {}", e)
                })?);
            }
        }
    }

    Ok((range_filters, list_filters))
}

/// Merge CLI filters with environment variable filters.
/// For each filter kind, CLI arguments replace the environment.
pub fn merge_filters(
    cli_range: Vec<RangeFilterArg>,
    cli_list: Vec<ListFilterArg>,
) -> FilterResult {
    let (env_range, env_list) = parse_filters_from_env()?;

    let merged_range = if cli_range.is_empty() {
        env_range
    } else {
        cli_range
    };
    let merged_list = if cli_list.is_empty() {
        env_list
    } else {
        cli_list
    };

    Ok((merged_range, merged_list))
}

fn dataset_override(
    role: &str,
    base: Option<DatasetConfig>,
    path: &Option<String>,
    variable: &Option<String>,
) -> ConfigResult<DatasetConfig> {
    match (base, path, variable) {
        (Some(mut dataset), path, variable) => {
            if let Some(path) = path {
                dataset.path = path.clone();
            }
            if let Some(variable) = variable {
                dataset.variable = variable.clone();
            }
            Ok(dataset)
        }
        (None, Some(path), Some(variable)) => Ok(DatasetConfig::new(path, variable)),
        (None, _, _) => Err(ConfigError::Invalid(format!(
            "no {role} dataset: pass --config or both --{role} and --{role}-variable"
        ))),
    }
}

impl RunArgs {
    /// Applies these arguments on top of an optional job file.
    ///
    /// Without a job file, source, reference and output must all be given.
    /// Range and list filters from the command line, or failing that from
    /// `GRIDCORR_RANGE_FILTERS`/`GRIDCORR_LIST_FILTERS`, are appended to the
    /// job's bounds.
    pub fn resolve(&self, base: Option<JobConfig>) -> ConfigResult<JobConfig> {
        let (range, list) = merge_filters(self.range_filters.clone(), self.list_filters.clone())
            .map_err(ConfigError::Invalid)?;

        let (source, reference, output, mut bounds, mut resample, regions, log_level) = match base
        {
            Some(job) => (
                Some(job.source),
                Some(job.reference),
                Some(job.output),
                job.bounds,
                job.resample,
                job.regions,
                job.log_level,
            ),
            None => (
                None,
                None,
                None,
                Vec::new(),
                ResampleOptions::default(),
                None,
                None,
            ),
        };

        let source = dataset_override("source", source, &self.source, &self.source_variable)?;
        let reference = dataset_override(
            "reference",
            reference,
            &self.reference,
            &self.reference_variable,
        )?;

        let mut output = match (output, &self.output) {
            (Some(mut output), Some(path)) => {
                output.statistics = path.clone();
                output
            }
            (Some(output), None) => output,
            (None, Some(path)) => OutputConfig::new(path),
            (None, None) => {
                return Err(ConfigError::Invalid(
                    "no statistics output: pass --config or --output".to_string(),
                ));
            }
        };
        if let Some(path) = &self.resampled_output {
            output.resampled = Some(path.clone());
        }

        if let Some(order) = self.order {
            resample.order = order;
        }
        if let Some(clamp) = self.clamp {
            resample.clamp = clamp.into();
        }
        bounds.extend(range.into_iter().map(FilterConfig::from));
        bounds.extend(list.into_iter().map(FilterConfig::from));

        Ok(JobConfig {
            source,
            reference,
            bounds,
            resample,
            output,
            regions,
            log_level,
        })
    }
}

/// Template job for `gridcorr template`.
pub fn template(template_type: &TemplateType) -> JobConfig {
    let mut job = JobConfig::example();
    if *template_type == TemplateType::Regions {
        job.regions = Some(DatasetConfig::new("ecoregions.nc", "region"));
        job.output.regions = Some("correlation_by_region.parquet".to_string());
    }
    job
}

/// Renders a template in the requested format.
pub fn render_template(template_type: &TemplateType, format: &ConfigFormat) -> ConfigResult<String> {
    let job = template(template_type);
    match format {
        ConfigFormat::Json => job.to_json(),
        ConfigFormat::Yaml => job.to_yaml(),
    }
}
