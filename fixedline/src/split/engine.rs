use rayon::ThreadPoolBuilder;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::planner::{ChunkTask, Plan};
use super::probe::{probe_line_plan, verify_line_width};
use super::worker::ChunkWorker;
use crate::config::{ChunkConfig, OutputOrder};
use crate::errors::{ChunkError, ChunkResult};
use crate::gate::{ChunkSink, OrderedOutput, OutputGate};
use crate::metrics::RunMetrics;
use crate::results::{ChunkOutcome, ChunkStatus, RunReport};
use crate::source::{open_source, InputSource};

/// Opens the input, rejecting paths that are missing or not regular files
fn open_input(path: &Path) -> ChunkResult<File> {
    let file = File::open(path).map_err(|e| ChunkError::from_open(path, e))?;
    if !file.metadata()?.is_file() {
        return Err(ChunkError::input_not_found(path));
    }
    Ok(file)
}

/// Splits the input into chunks, rebuilds them concurrently and writes the
/// result to the output file.
///
/// The output is created (truncated) after the input has been opened and
/// before the first line is probed, so a missing input leaves the output
/// untouched while an empty input leaves an empty output behind.
///
/// Only setup failures are returned as errors. Chunk failures are recorded in
/// the report and never stop sibling chunks.
pub fn run(config: &ChunkConfig) -> ChunkResult<RunReport> {
    config.validate()?;
    let started = Instant::now();
    info!(
        "Starting chunked rebuild of {} into {}",
        config.input_path.display(),
        config.output_path.display()
    );

    let input = open_input(&config.input_path)?;
    let output = File::create(&config.output_path)?;

    let line = probe_line_plan(&mut BufReader::new(&input), &config.input_path)?;
    let source = open_source(input, config.read_strategy)?;
    let file_size = source.len();

    if config.verify_line_width {
        verify_line_width(
            source.as_ref(),
            &line,
            config.verify_samples,
            &config.input_path,
        )?;
    }

    let plan = Plan::compute(
        file_size,
        &line,
        config.soft_lines_per_chunk,
        config.max_concurrent_chunks,
    );
    info!(
        "Planned {} chunks of {} lines ({} bytes per line, {} byte input)",
        plan.task_count, plan.lines_per_chunk, line.line_bytes, file_size
    );

    let sink: Box<dyn ChunkSink> = match config.output_order {
        OutputOrder::Completion => Box::new(OutputGate::new(output)),
        OutputOrder::ChunkIndex => Box::new(OrderedOutput::new(output)),
    };

    let metrics = RunMetrics::new();
    let worker = ChunkWorker::new(line, config.encoding_mode, metrics.clone());
    let tasks = plan.tasks(file_size);

    let mut report = RunReport::new(
        config.input_path.clone(),
        config.output_path.clone(),
        file_size,
        line,
        plan,
    );
    for outcome in launch(
        &tasks,
        source.as_ref(),
        sink.as_ref(),
        &worker,
        config.launch_delay(),
    )? {
        report.add_outcome(outcome);
    }

    for failure in sink.finish() {
        match failure {
            ChunkError::ChunkWrite { index, .. } => {
                warn!("Chunk {} failed to reach the output: {}", index, failure);
                if let Some(ChunkStatus::Written { lines, bytes }) =
                    report.mark_failed(index, failure)
                {
                    metrics.record_late_failure(bytes, lines);
                }
            }
            other => return Err(other),
        }
    }

    metrics.log_stats();
    report.stats = metrics.get_stats();
    report.elapsed = started.elapsed();

    info!(
        "Rebuild complete. Wrote {} lines from {} chunks ({} failed) in {:?}",
        report.lines_written(),
        report.outcomes.len(),
        report.failed_count(),
        report.elapsed
    );
    Ok(report)
}

/// Runs one worker per task on a pool of `tasks.len()` threads and waits for all of them
fn launch(
    tasks: &[ChunkTask],
    source: &dyn InputSource,
    sink: &dyn ChunkSink,
    worker: &ChunkWorker,
    launch_delay: Duration,
) -> ChunkResult<Vec<ChunkOutcome>> {
    if tasks.is_empty() {
        return Ok(Vec::new());
    }

    let pool = ThreadPoolBuilder::new()
        .num_threads(tasks.len())
        .thread_name(|i| format!("chunk-worker-{}", i))
        .build()?;

    let outcomes = Mutex::new(Vec::with_capacity(tasks.len()));
    pool.scope(|scope| {
        for (i, task) in tasks.iter().enumerate() {
            if i > 0 && !launch_delay.is_zero() {
                thread::sleep(launch_delay);
            }
            debug!("Launching chunk {}", task.index);
            let outcomes = &outcomes;
            scope.spawn(move |_| {
                let outcome = worker.process(task, source, sink);
                outcomes
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(outcome);
            });
        }
    });

    Ok(outcomes.into_inner().unwrap_or_else(PoisonError::into_inner))
}
