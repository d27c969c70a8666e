//! Parameter sweeps: one worker process per temperature.
//!
//! Each worker is a fresh `asi-sim worker` process, so it selects its own
//! backend and owns its own rayon pool. A failing worker is recorded in
//! `summary.json` and never stops its siblings.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::args::SweepArgs;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const LOG_TAIL_LINES: usize = 20;

struct Task {
    index: usize,
    temperature: f64,
    job: PathBuf,
    result: PathBuf,
    log: PathBuf,
}

impl Task {
    fn new(out_dir: &Path, index: usize, temperature: f64) -> Self {
        Self {
            index,
            temperature,
            job: out_dir.join(format!("job_{index:03}.json")),
            result: out_dir.join(format!("result_{index:03}.json")),
            log: out_dir.join(format!("worker_{index:03}.log")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Ok,
    Failed,
}

#[derive(Debug, Serialize)]
pub struct WorkerRecord {
    pub index: usize,
    pub temperature: f64,
    pub status: WorkerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub log_tail: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct SweepSummary {
    pub completed: usize,
    pub failed: usize,
    pub workers: Vec<WorkerRecord>,
}

/// Last `n` lines of a log file; empty if it cannot be read.
fn tail_lines(path: &Path, n: usize) -> Vec<String> {
    let Ok(text) = fs::read_to_string(path) else {
        return Vec::new();
    };
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..]
        .iter()
        .map(|l| l.to_string())
        .collect()
}

fn failed(task: &Task, exit_code: Option<i32>, error: String) -> WorkerRecord {
    WorkerRecord {
        index: task.index,
        temperature: task.temperature,
        status: WorkerStatus::Failed,
        exit_code,
        error: Some(error),
        log_tail: tail_lines(&task.log, LOG_TAIL_LINES),
        result: None,
    }
}

fn read_result(path: &Path) -> Result<serde_json::Value> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading result file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing result file {}", path.display()))
}

fn finish(task: &Task, status: ExitStatus) -> WorkerRecord {
    if !status.success() {
        warn!(worker = task.index, temperature = task.temperature, %status, "worker failed");
        return failed(task, status.code(), format!("worker exited with {status}"));
    }
    match read_result(&task.result) {
        Ok(result) => {
            debug!(worker = task.index, "worker finished");
            WorkerRecord {
                index: task.index,
                temperature: task.temperature,
                status: WorkerStatus::Ok,
                exit_code: status.code(),
                error: None,
                log_tail: Vec::new(),
                result: Some(result),
            }
        }
        Err(e) => failed(task, status.code(), format!("{e:#}")),
    }
}

fn spawn(exe: &Path, task: &Task, backend: Option<&str>, log_level: &str) -> Result<Child> {
    let log = File::create(&task.log)
        .with_context(|| format!("creating worker log {}", task.log.display()))?;
    let mut cmd = Command::new(exe);
    cmd.arg("--log-level").arg(log_level);
    if let Some(b) = backend {
        cmd.arg("--backend").arg(b);
    }
    cmd.arg("worker")
        .arg("--job")
        .arg(&task.job)
        .arg("--result")
        .arg(&task.result)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(log));
    cmd.spawn()
        .with_context(|| format!("spawning worker {}", task.index))
}

/// Write one job file per temperature, run the workers at most `args.jobs`
/// at a time and write `summary.json`. Returns the summary path.
pub fn launch(args: &SweepArgs, backend: Option<&str>, log_level: &str) -> Result<PathBuf> {
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;
    let exe = std::env::current_exe().context("locating the asi-sim executable")?;

    let mut queue = VecDeque::new();
    for (index, &temperature) in args.temperatures.iter().enumerate() {
        let task = Task::new(&args.out_dir, index, temperature);
        let seed = args.sim.seed.wrapping_add(index as u64);
        args.sim
            .to_job(&args.run, temperature, seed)?
            .save(&task.job)?;
        queue.push_back(task);
    }
    let limit = args.jobs.max(1);
    info!(workers = queue.len(), concurrent = limit, out_dir = %args.out_dir.display(), "starting sweep");

    let mut running: Vec<(Task, Child)> = Vec::new();
    let mut records = Vec::new();
    while !queue.is_empty() || !running.is_empty() {
        while running.len() < limit {
            let Some(task) = queue.pop_front() else {
                break;
            };
            match spawn(&exe, &task, backend, log_level) {
                Ok(child) => running.push((task, child)),
                Err(e) => records.push(failed(&task, None, format!("{e:#}"))),
            }
        }

        let mut i = 0;
        while i < running.len() {
            match running[i].1.try_wait() {
                Ok(Some(status)) => {
                    let (task, _) = running.swap_remove(i);
                    records.push(finish(&task, status));
                }
                Ok(None) => i += 1,
                Err(e) => {
                    let (task, mut child) = running.swap_remove(i);
                    let _ = child.kill();
                    records.push(failed(&task, None, format!("waiting on worker: {e}")));
                }
            }
        }
        if !running.is_empty() {
            thread::sleep(POLL_INTERVAL);
        }
    }

    records.sort_by_key(|r| r.index);
    let failed_count = records
        .iter()
        .filter(|r| r.status == WorkerStatus::Failed)
        .count();
    let summary = SweepSummary {
        completed: records.len() - failed_count,
        failed: failed_count,
        workers: records,
    };
    let path = args.out_dir.join("summary.json");
    fs::write(&path, serde_json::to_string_pretty(&summary)?)
        .with_context(|| format!("writing {}", path.display()))?;
    if failed_count > 0 {
        warn!(failed = failed_count, "some workers failed, see summary.json");
    }
    info!(completed = summary.completed, summary = %path.display(), "sweep finished");
    Ok(path)
}
