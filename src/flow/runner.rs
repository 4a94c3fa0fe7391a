//! # 本地顺序执行器
//!
//! 在当前进程中按依赖顺序执行作业流，用于测试、试运行与小规模工作站计算。
//!
//! ## 功能
//! - 每个作业一个工作目录（`create_folders`）
//! - 动态替换：作业返回的替换作业流立即执行，其输出记为该作业的第 2 次响应
//! - `ensure_success` 关闭时，失败作业的下游作业被跳过而非中止整个作业流
//!
//! ## 依赖关系
//! - 被 `commands/run.rs` 和各模块测试使用
//! - 使用 `flow/execute.rs`, `flow/calculator.rs`

use super::calculator::Calculators;
use super::execute::{execute, JobContext};
use super::graph::Flow;
use super::job::Job;
use super::reference::{OutputSpec, OutputStore};
use crate::error::{PhonfitError, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// 作业的一次响应记录
#[derive(Debug, Clone)]
pub struct Response {
    pub output: Value,
    pub replace: Option<Flow>,
}

/// 作业最终状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum JobState {
    Completed,
    Failed(String),
    Skipped,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Completed => write!(f, "completed"),
            JobState::Failed(_) => write!(f, "failed"),
            JobState::Skipped => write!(f, "skipped"),
        }
    }
}

/// 单个作业的执行摘要
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub uuid: Uuid,
    pub name: String,
    pub kind: String,
    #[serde(flatten)]
    pub state: JobState,
    pub dir: Option<PathBuf>,
    pub replaced: bool,
}

/// 全部作业的响应
#[derive(Debug, Default)]
pub struct Responses {
    history: HashMap<Uuid, Vec<Response>>,
    records: Vec<JobRecord>,
    store: OutputStore,
    next_seq: usize,
}

impl Responses {
    /// 第 `index` 次响应（从 1 开始）
    pub fn get(&self, uuid: &Uuid, index: usize) -> Option<&Response> {
        if index == 0 {
            return None;
        }
        self.history.get(uuid).and_then(|h| h.get(index - 1))
    }

    pub fn history(&self, uuid: &Uuid) -> &[Response] {
        self.history.get(uuid).map(|h| h.as_slice()).unwrap_or(&[])
    }

    /// 最新输出
    pub fn output(&self, uuid: &Uuid) -> Option<&Value> {
        self.store.get(uuid)
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    pub fn resolve(&self, spec: &OutputSpec) -> Result<Value> {
        spec.resolve(&self.store)
    }

    pub fn state(&self, uuid: &Uuid) -> Option<&JobState> {
        self.records.iter().find(|r| &r.uuid == uuid).map(|r| &r.state)
    }

    /// 按执行顺序排列的作业记录
    pub fn records(&self) -> &[JobRecord] {
        &self.records
    }

    pub fn count(&self, state: &JobState) -> usize {
        self.records
            .iter()
            .filter(|r| std::mem::discriminant(&r.state) == std::mem::discriminant(state))
            .count()
    }

    pub fn failed(&self) -> Vec<&JobRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.state, JobState::Failed(_)))
            .collect()
    }

    /// 工作目录序号，在作业开始时分配
    fn allocate_seq(&mut self) -> usize {
        self.next_seq += 1;
        self.next_seq
    }

    fn push(&mut self, uuid: Uuid, response: Response) {
        self.history.entry(uuid).or_default().push(response);
    }

    fn is_blocked(&self, uuid: &Uuid) -> bool {
        matches!(
            self.state(uuid),
            Some(JobState::Failed(_)) | Some(JobState::Skipped)
        )
    }
}

/// 本地执行器
pub struct LocalRunner {
    calculators: Calculators,
    root: PathBuf,
    create_folders: bool,
    ensure_success: bool,
}

impl LocalRunner {
    pub fn new(calculators: Calculators) -> Self {
        Self {
            calculators,
            root: PathBuf::from("."),
            create_folders: true,
            ensure_success: true,
        }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn create_folders(mut self, create: bool) -> Self {
        self.create_folders = create;
        self
    }

    pub fn ensure_success(mut self, ensure: bool) -> Self {
        self.ensure_success = ensure;
        self
    }

    /// 执行作业流
    pub fn run(&self, flow: &Flow) -> Result<Responses> {
        fs::create_dir_all(&self.root).map_err(|e| PhonfitError::write(&self.root, e))?;

        let mut responses = Responses::default();
        tracing::info!(flow = %flow.name, jobs = flow.jobs().len(), "Starting flow");
        let ok = self.run_flow(flow, &mut responses)?;

        if ok {
            tracing::info!(flow = %flow.name, "Flow completed");
        } else {
            tracing::warn!(
                flow = %flow.name,
                failed = responses.failed().len(),
                "Flow finished with failed jobs"
            );
        }
        Ok(responses)
    }

    fn job_dir(&self, job: &Job, seq: usize) -> Result<PathBuf> {
        if !self.create_folders {
            return Ok(self.root.clone());
        }
        let dir = self.root.join(format!("job_{:04}_{}", seq, sanitize(&job.name)));
        fs::create_dir_all(&dir).map_err(|e| PhonfitError::write(&dir, e))?;
        Ok(dir)
    }

    fn record(
        &self,
        responses: &mut Responses,
        job: &Job,
        state: JobState,
        dir: Option<PathBuf>,
    ) -> Result<()> {
        let replaced = responses
            .history(&job.uuid)
            .first()
            .map_or(false, |r| r.replace.is_some());

        if let JobState::Failed(reason) = &state {
            tracing::warn!(job = %job.name, %reason, "Job failed");
        }

        responses.records.push(JobRecord {
            uuid: job.uuid,
            name: job.name.clone(),
            kind: job.kind.label().to_string(),
            state: state.clone(),
            dir,
            replaced,
        });

        match state {
            JobState::Failed(reason) if self.ensure_success => Err(PhonfitError::JobFailed {
                name: job.name.clone(),
                reason,
            }),
            _ => Ok(()),
        }
    }

    /// 返回作业流内全部作业是否成功
    fn run_flow(&self, flow: &Flow, responses: &mut Responses) -> Result<bool> {
        let mut all_ok = true;

        for uuid in flow.execution_order()? {
            let job = flow
                .find_job(&uuid)
                .ok_or_else(|| PhonfitError::Other(format!("Job {} vanished from flow", uuid)))?;

            if job.dependencies().iter().any(|d| responses.is_blocked(d)) {
                tracing::info!(job = %job.name, "Skipping job with failed dependencies");
                self.record(responses, job, JobState::Skipped, None)?;
                all_ok = false;
                continue;
            }

            let seq = responses.allocate_seq();
            let dir = self.job_dir(job, seq)?;
            tracing::info!(job = %job.name, kind = job.kind.label(), "Running job");

            let ctx = JobContext {
                work_dir: &dir,
                calculators: &self.calculators,
            };
            let response = match execute(job, &ctx, &responses.store) {
                Ok(r) => r,
                Err(e) => {
                    self.record(responses, job, JobState::Failed(e.to_string()), Some(dir))?;
                    all_ok = false;
                    continue;
                }
            };

            let replace = response.replace.clone();
            if replace.is_none() {
                responses.store.insert(job.uuid, response.output.clone());
            }
            responses.push(
                job.uuid,
                Response {
                    output: response.output,
                    replace: response.replace,
                },
            );

            let Some(replacement) = replace else {
                self.record(responses, job, JobState::Completed, Some(dir))?;
                continue;
            };

            tracing::debug!(
                job = %job.name,
                replacement_jobs = ?replacement.job_names(),
                "Job replaced by new flow"
            );

            let sub_ok = self.run_flow(&replacement, responses)?;
            if !sub_ok {
                self.record(
                    responses,
                    job,
                    JobState::Failed("replacement flow has failed jobs".to_string()),
                    Some(dir),
                )?;
                all_ok = false;
                continue;
            }

            let output = match &replacement.output {
                Some(spec) => match spec.resolve(&responses.store) {
                    Ok(v) => v,
                    Err(e) => {
                        self.record(responses, job, JobState::Failed(e.to_string()), Some(dir))?;
                        all_ok = false;
                        continue;
                    }
                },
                None => Value::Null,
            };
            responses.store.insert(job.uuid, output.clone());
            responses.push(
                job.uuid,
                Response {
                    output,
                    replace: None,
                },
            );
            self.record(responses, job, JobState::Completed, Some(dir))?;
        }

        Ok(all_ok)
    }
}

/// 作业名转为目录名
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// 写出执行报告（作业状态与最新输出）
pub fn write_report(responses: &Responses, path: &Path) -> Result<()> {
    #[derive(Serialize)]
    struct Report<'a> {
        jobs: &'a [JobRecord],
        outputs: HashMap<String, &'a Value>,
    }

    let outputs = responses
        .records()
        .iter()
        .filter_map(|r| responses.output(&r.uuid).map(|v| (r.uuid.to_string(), v)))
        .collect();
    let report = Report {
        jobs: responses.records(),
        outputs,
    };
    let json = serde_json::to_string_pretty(&report)?;
    fs::write(path, json).map_err(|e| PhonfitError::write(path, e))
}
