use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use tddflow::analysis::ErrorAnalyzer;
use tddflow::core::{order_features_smart, parse_dependencies, topological_sort, FeatureSpec};
use tddflow::pipeline::{PipelineStatus, StateManager};
use tddflow::trace::ExecutionReport;
use tddflow::{zlog, Result};

/// tddflow - test-driven code generation toolkit
#[derive(Parser, Debug)]
#[command(name = "tddflow")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    TDDFLOW_DEBUG=1     Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.tddflow/tddflow.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Categorize an error message and print the result as JSON
    Analyze {
        /// Raw error text (traceback, compiler output...)
        message: String,
    },

    /// Print the implementation order for a design document
    Order {
        /// Design document containing FEATURE[n] blocks
        design_file: PathBuf,

        /// Order these titles instead of the parsed features
        #[arg(long = "title")]
        titles: Vec<String>,
    },

    /// Print the timeline of a saved execution report
    Timeline {
        /// Path to an execution_report_<session>.json file
        report: PathBuf,
    },

    /// List persisted job pipelines
    Pipelines {
        /// State file to read (defaults to ~/.tddflow/pipelines.json)
        #[arg(long)]
        state_file: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tddflow::log::init_with_debug(cli.debug);

    match cli.command {
        Command::Analyze { message } => run_analyze(&message),
        Command::Order { design_file, titles } => run_order(design_file, titles),
        Command::Timeline { report } => run_timeline(report),
        Command::Pipelines { state_file } => run_pipelines(state_file),
    }
}

fn run_analyze(message: &str) -> Result<()> {
    zlog!("Analyze command: {} bytes", message.len());
    let info = ErrorAnalyzer::new().analyze_error(message);
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

fn run_order(design_file: PathBuf, titles: Vec<String>) -> Result<()> {
    zlog!("Order command: design={}, titles={}", design_file.display(), titles.len());
    let design = fs::read_to_string(&design_file)?;

    if !titles.is_empty() {
        let specs = FeatureSpec::from_titles(titles.as_slice());
        for (i, spec) in order_features_smart(&specs, &design).iter().enumerate() {
            println!("{:>3}. {}", i + 1, spec.title);
        }
        return Ok(());
    }

    let features = parse_dependencies(&design);
    if features.is_empty() {
        println!("No FEATURE[n] blocks found in {}", design_file.display());
        return Ok(());
    }

    for (i, feature) in topological_sort(&features).iter().enumerate() {
        if feature.dependencies.is_empty() {
            println!("{:>3}. [{}] {}", i + 1, feature.id, feature.title);
        } else {
            println!(
                "{:>3}. [{}] {} (after {})",
                i + 1,
                feature.id,
                feature.title,
                feature.dependencies.join(", ")
            );
        }
    }
    Ok(())
}

fn run_timeline(path: PathBuf) -> Result<()> {
    zlog!("Timeline command: report={}", path.display());
    let report = ExecutionReport::load(&path)?;

    println!("Session:  {}", report.session_id);
    println!("Duration: {}ms", report.duration_ms);
    println!();
    if report.timeline.is_empty() {
        println!("  (no phase events recorded)");
    }
    for entry in &report.timeline {
        println!("  {}  {}", entry.timestamp.format("%H:%M:%S%.3f"), entry.description);
    }
    Ok(())
}

fn run_pipelines(state_file: Option<PathBuf>) -> Result<()> {
    zlog!("Pipelines command: state_file={:?}", state_file);

    let rt = tokio::runtime::Runtime::new()?;
    let pipelines = rt.block_on(async {
        let manager = match state_file {
            Some(path) => StateManager::open(path).await?,
            None => StateManager::open_default().await?,
        };
        Ok::<_, tddflow::Error>(manager.list_pipelines().await)
    })?;

    if pipelines.is_empty() {
        println!("No pipelines");
        return Ok(());
    }

    for pipeline in pipelines {
        println!(
            "{}  {:<16} {:<18} {}/{}",
            pipeline.id.short(),
            pipeline.stage.as_str(),
            format_status(pipeline.status),
            pipeline.repo_name,
            truncate_string(&pipeline.feature_name, 40)
        );
    }
    Ok(())
}

/// Format pipeline status with color codes for terminal.
fn format_status(status: PipelineStatus) -> String {
    match status {
        PipelineStatus::Completed => format!("\x1b[32m{}\x1b[0m", status),
        PipelineStatus::Failed => format!("\x1b[31m{}\x1b[0m", status),
        PipelineStatus::AwaitingFeedback => format!("\x1b[33m{}\x1b[0m", status),
        PipelineStatus::Active => format!("\x1b[34m{}\x1b[0m", status),
    }
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
