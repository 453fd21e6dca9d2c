use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use fixedline::{
    config::parse_launch_delay, run, ChunkConfig, ChunkStatus, ConfigOverrides, EncodingMode,
    OutputOrder, ReadStrategy, RunReport,
};
use std::{num::NonZeroUsize, path::PathBuf, time::Duration};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Rebuild a fixed-width-line text file by reading it in concurrent chunks
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// File to split into chunks (may also come from a config file)
    input: Option<PathBuf>,

    /// File the rebuilt lines are written to [default: output.txt]
    output: Option<PathBuf>,

    /// Soft target for lines per chunk
    #[arg(short = 'l', long = "lines-per-chunk")]
    lines_per_chunk: Option<NonZeroUsize>,

    /// Hard cap on the number of chunks (and worker threads)
    #[arg(short = 'j', long = "max-chunks")]
    max_chunks: Option<NonZeroUsize>,

    /// Pause between chunk launches (e.g. 100ms)
    #[arg(long, value_parser = parse_launch_delay)]
    launch_delay: Option<Duration>,

    /// Write chunks in input order instead of completion order
    #[arg(long)]
    ordered: bool,

    /// Encoding mode for invalid UTF-8 (failfast|lossy)
    #[arg(long)]
    encoding: Option<EncodingMode>,

    /// How chunks are read from the input (auto|positioned|mmap)
    #[arg(long)]
    read_strategy: Option<ReadStrategy>,

    /// Sample the input and check that every line has the probed width
    #[arg(long)]
    verify_width: bool,

    /// Exit with an error if any chunk failed
    #[arg(long)]
    strict: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    /// Path to a YAML config file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Log level (error|warn|info|debug|trace), overridden by RUST_LOG
    #[arg(long)]
    log_level: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            input_path: self.input.clone(),
            output_path: self.output.clone(),
            soft_lines_per_chunk: self.lines_per_chunk,
            max_concurrent_chunks: self.max_chunks,
            launch_delay: self.launch_delay,
            output_order: self.ordered.then_some(OutputOrder::ChunkIndex),
            encoding_mode: self.encoding,
            read_strategy: self.read_strategy,
            verify_line_width: self.verify_width,
            log_level: self.log_level.clone(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ChunkConfig::load_from(cli.config.as_deref())?.merge_with_cli(cli.overrides());
    init_logging(&config.log_level);
    debug!("Effective configuration: {:?}", config);

    if cli.print_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    let report = run(&config)?;
    if cli.json {
        println!("{}", report.to_json()?);
    } else {
        print_summary(&report);
    }

    report.into_result(cli.strict)?;
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_summary(report: &RunReport) {
    println!(
        "{} -> {}",
        report.input_path.display().to_string().blue(),
        report.output_path.display().to_string().blue()
    );
    println!(
        "Planned {} chunks of {} lines ({} bytes per line, {} bytes)",
        report.plan.task_count, report.plan.lines_per_chunk, report.line.line_bytes, report.file_size
    );

    for outcome in &report.outcomes {
        match &outcome.status {
            ChunkStatus::Written { lines, bytes } => println!(
                "  chunk {}: {} ({} lines, {} bytes)",
                outcome.index,
                "written".green(),
                lines,
                bytes
            ),
            ChunkStatus::Empty => {
                println!("  chunk {}: {}", outcome.index, "empty".yellow())
            }
            ChunkStatus::Failed { error } => {
                println!("  chunk {}: {} {}", outcome.index, "failed".red(), error)
            }
        }
    }

    let failed = report.failed_count();
    let summary = format!(
        "Wrote {} lines from {} chunks in {:?}",
        report.lines_written(),
        report.outcomes.len(),
        report.elapsed
    );
    if failed == 0 {
        println!("\n{}", summary.green());
    } else {
        println!(
            "\n{} ({})",
            summary.yellow(),
            format!("{} chunks failed", failed).red()
        );
    }
}
