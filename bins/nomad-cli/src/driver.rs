//! Engine Driver (C8): the single top-level `run` operation, its state
//! machine, and the memory-pressure policy that gates it.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use nomad_core::{Config, NomadError, Workflow};
use nomad_io::{BatchSource, CsvOptions};
use nomad_tx::{build_plan, propagate_renames, BatchTransform, Deduplicator, MetadataStep, NestStep, NotEmptyFilter};
use sysinfo::System;
use tracing::{info, warn};

use crate::filename;

/// `Init → WorkflowLoaded → SourceOpened → Transformed → Written → Done`,
/// with every state able to transition to `Failed`. Transformed
/// covers the whole per-batch column/row/structure pipeline, since those
/// stages are driven per-batch rather than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Init,
    WorkflowLoaded,
    SourceOpened,
    Transformed,
    Written,
    Done,
}

pub struct RunOutcome {
    pub output_path: PathBuf,
    pub duration: Duration,
    pub rows: usize,
    pub warnings: Vec<String>,
}

pub struct RunRequest {
    pub input_path: PathBuf,
    pub workflow_path: PathBuf,
    pub output_path: Option<PathBuf>,
    pub chunk_size: usize,
    pub max_memory_pct: f64,
}

/// Samples resident-memory usage against the soft/hard thresholds in
/// `config`. Crossing the soft threshold is a warn-and-continue signal;
/// crossing the hard threshold aborts the run before the sink commits.
struct MemoryMonitor {
    system: System,
    soft_threshold: f64,
    hard_threshold: f64,
}

impl MemoryMonitor {
    fn new(soft_threshold: f64, hard_threshold: f64) -> Self {
        MemoryMonitor {
            system: System::new(),
            soft_threshold,
            hard_threshold,
        }
    }

    /// Returns `Err(MemoryExhausted)` once usage crosses the hard
    /// threshold; logs and continues past the soft threshold.
    fn check(&mut self) -> Result<(), NomadError> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return Ok(());
        }
        let used_ratio = self.system.used_memory() as f64 / total as f64;
        if used_ratio >= self.hard_threshold {
            return Err(NomadError::MemoryExhausted(format!(
                "resident memory at {:.1}% of total, hard threshold {:.1}%",
                used_ratio * 100.0,
                self.hard_threshold * 100.0
            )));
        }
        if used_ratio >= self.soft_threshold {
            warn!(used_pct = used_ratio * 100.0, "memory pressure above soft threshold, continuing");
        }
        Ok(())
    }
}

pub fn run(config: &Config, request: RunRequest) -> Result<RunOutcome, NomadError> {
    let started_at = Instant::now();
    let mut state = RunState::Init;
    let mut warnings = Vec::new();
    let mut memory = MemoryMonitor::new(config.soft_memory_threshold, request.max_memory_pct / 100.0);

    let workflow_json = std::fs::read_to_string(&request.workflow_path)
        .map_err(|e| NomadError::WorkflowInvalid(format!("{}: {e}", request.workflow_path.display())))?;
    let workflow = Workflow::parse(&workflow_json, config)?;
    state = RunState::WorkflowLoaded;
    info!(?state, "workflow loaded");

    let csv_options = (request.input_path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()).as_deref()
        != Some("parquet"))
    .then(CsvOptions::default);
    let mut source = nomad_io::open(&request.input_path, csv_options, config.analyze_rows, request.chunk_size)?;
    state = RunState::SourceOpened;
    info!(?state, "source opened");

    let (plan, renames, plan_warnings) = build_plan(source.schema().as_ref(), &workflow)?;
    warnings.extend(plan_warnings);
    let workflow = propagate_renames(&workflow, &renames);

    let not_empty = NotEmptyFilter::new(workflow.not_empty.columns.clone());
    let mut dedup = Deduplicator::new(workflow.dedup.unique_columns.clone());

    let plan_schema_names: Vec<String> = plan.schema().fields().iter().map(|f| f.name().clone()).collect();
    let nest_step = workflow.structure.as_ref().map(|s| NestStep::new(s, &plan_schema_names));
    let metadata_step = MetadataStep::new(workflow.year, workflow.country_code.clone());

    let mut final_schema = plan.schema().as_ref().clone();
    if let Some(nest) = &nest_step {
        final_schema = nest.output_schema(&final_schema)?;
    }
    final_schema = metadata_step.output_schema(&final_schema)?;
    let final_schema = std::sync::Arc::new(final_schema);

    let output_path = resolve_output_path(config, &workflow, &request)?;
    let mut sink = nomad_io::SinkWriter::create(&output_path, final_schema, workflow.export.parquet.compression)?;

    let mut rows = 0usize;
    let result: Result<(), NomadError> = (|| {
        while let Some(batch) = source.next_batch()? {
            memory.check()?;

            let batch = plan.apply(batch)?;
            let batch = not_empty.apply(&batch)?;
            let batch = dedup.dedup(&batch)?;
            let batch = match &nest_step {
                Some(nest) => nest.apply(&batch)?,
                None => batch,
            };
            let batch = metadata_step.apply(&batch)?;

            if batch.num_rows() > 0 {
                rows += batch.num_rows();
                sink.write(&batch)?;
            }

            memory.check()?;
        }
        Ok(())
    })();

    if let Err(e) = result {
        sink.abort();
        return Err(e);
    }
    state = RunState::Transformed;
    info!(?state, rows, "transform complete");

    let output_path = sink.finish()?;
    state = RunState::Written;
    info!(?state, path = %output_path.display(), "sink written");

    state = RunState::Done;
    info!(?state, duration_s = started_at.elapsed().as_secs_f64(), "run complete");

    Ok(RunOutcome {
        output_path,
        duration: started_at.elapsed(),
        rows,
        warnings,
    })
}

fn resolve_output_path(config: &Config, workflow: &Workflow, request: &RunRequest) -> Result<PathBuf, NomadError> {
    if let Some(explicit) = &request.output_path {
        return Ok(explicit.clone());
    }
    let basename = workflow
        .output_filename
        .clone()
        .unwrap_or_else(|| request.input_path.file_name().and_then(|n| n.to_str()).unwrap_or("data").to_string());
    let built = filename::build(config, &workflow.country_code, &basename, workflow.year, 1)?;
    Ok(Path::new(&built).to_path_buf())
}
