//! # 批量执行器
//!
//! 并行执行批量处理任务。
//!
//! ## 功能
//! - 基于 rayon 的并行迭代
//! - 进度条显示
//! - 错误收集与汇总报告
//!
//! ## 依赖关系
//! - 被 `dataset.rs` 调用（并行解析 VASP 目录）
//! - 使用 `utils/progress.rs` 创建进度条
//! - 使用 `rayon` 进行并行计算

use crate::utils::progress;
use indicatif::ProgressDrawTarget;

use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 单个文件处理结果
#[derive(Debug, Clone)]
pub enum ProcessResult {
    /// 处理成功
    Success(String),
    /// 跳过
    Skipped(String),
    /// 处理失败
    Failed(String, String), // (文件路径, 错误信息)
}

/// 批量处理结果统计
#[derive(Debug, Default)]
pub struct BatchResult {
    /// 成功数量
    pub success: usize,
    /// 跳过数量
    pub skipped: usize,
    /// 失败数量
    pub failed: usize,
    /// 失败详情
    pub failures: Vec<(String, String)>,
}

impl BatchResult {
    /// 合并处理结果
    pub fn merge(&mut self, result: ProcessResult) {
        match result {
            ProcessResult::Success(_) => self.success += 1,
            ProcessResult::Skipped(_) => self.skipped += 1,
            ProcessResult::Failed(path, err) => {
                self.failed += 1;
                self.failures.push((path, err));
            }
        }
    }

    /// 总处理数量
    pub fn total(&self) -> usize {
        self.success + self.skipped + self.failed
    }
}

/// 批量执行器
pub struct BatchRunner {
    /// 并行作业数
    jobs: usize,
    /// 隐藏进度条
    quiet: bool,
}

impl BatchRunner {
    /// 创建新的批量执行器；`jobs == 0` 时使用全部 CPU
    pub fn new(jobs: usize) -> Self {
        let jobs = if jobs == 0 { num_cpus::get() } else { jobs };
        Self { jobs, quiet: false }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// 并行处理路径列表
    pub fn run<F>(&self, files: Vec<PathBuf>, processor: F) -> BatchResult
    where
        F: Fn(&PathBuf) -> ProcessResult + Sync + Send,
    {
        let total = files.len();
        let pb = progress::create_progress_bar(total as u64, "Processing");
        if self.quiet {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }

        let failed_count = AtomicUsize::new(0);

        let work = || -> Vec<ProcessResult> {
            files
                .par_iter()
                .map(|file| {
                    let result = processor(file);

                    if let ProcessResult::Failed(path, err) = &result {
                        let failed = failed_count.fetch_add(1, Ordering::Relaxed) + 1;
                        pb.set_message(format!("{} failed", failed));
                        tracing::debug!(%path, %err, "Batch item failed");
                    }

                    pb.inc(1);
                    result
                })
                .collect()
        };

        // 线程池创建失败时退回全局池
        let results = match rayon::ThreadPoolBuilder::new().num_threads(self.jobs).build() {
            Ok(pool) => pool.install(work),
            Err(e) => {
                tracing::warn!(error = %e, "Falling back to the global thread pool");
                work()
            }
        };

        pb.finish_and_clear();

        let mut batch_result = BatchResult::default();
        for result in results {
            batch_result.merge(result);
        }
        tracing::debug!(
            success = batch_result.success,
            skipped = batch_result.skipped,
            failed = batch_result.failed,
            "Batch finished"
        );

        batch_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_failures() {
        let paths: Vec<PathBuf> = (0..6).map(|i| PathBuf::from(format!("run_{}", i))).collect();
        let result = BatchRunner::new(2).quiet(true).run(paths, |p| {
            let name = p.display().to_string();
            match name.as_str() {
                "run_0" | "run_3" => ProcessResult::Failed(name, "no OUTCAR".to_string()),
                "run_5" => ProcessResult::Skipped(name),
                _ => ProcessResult::Success(name),
            }
        });
        assert_eq!(result.total(), 6);
        assert_eq!(result.success, 3);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.failed, 2);
        assert_eq!(result.failures.len(), 2);
    }

    #[test]
    fn test_zero_jobs_uses_all_cpus() {
        assert_eq!(BatchRunner::new(0).jobs(), num_cpus::get());
    }
}
