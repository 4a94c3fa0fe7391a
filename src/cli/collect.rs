//! # collect 子命令 CLI 定义
//!
//! 收集完成的 VASP 计算，写出 `vasp_ref.extxyz`
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/collect.rs`

use clap::Args;
use std::path::PathBuf;

/// collect 子命令参数
#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Root directory containing VASP calculation folders
    pub dft_dir: PathBuf,

    /// Directory that receives vasp_ref.extxyz
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Search for calculation folders recursively
    #[arg(short, long, default_value_t = false)]
    pub recursive: bool,

    /// Number of parallel jobs (0 = number of CPUs)
    #[arg(short, long, default_value_t = 0)]
    pub jobs: usize,

    /// Also write a per-directory CSV summary
    #[arg(long, value_name = "FILE")]
    pub summary: Option<PathBuf>,

    /// Existing extxyz datasets whose frames are added to the output (comma-separated)
    #[arg(long, value_delimiter = ',', value_name = "FILE")]
    pub merge: Vec<PathBuf>,
}
