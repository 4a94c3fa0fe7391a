//! # 子命令共用参数
//!
//! 结构文件输入、INCAR 覆盖、Slurm 导出参数，通过 `#[command(flatten)]` 复用。
//!
//! ## 依赖关系
//! - 被 `cli/` 各子命令使用
//! - 参数传递给 `commands/structures.rs`, `commands/export.rs`

use crate::batch::collector::STRUCTURE_PATTERNS;
use clap::Args;
use std::path::PathBuf;

/// 结构文件输入
#[derive(Args, Debug, Clone)]
pub struct StructureInputArgs {
    /// Structure files or directories (POSCAR, CONTCAR, *.vasp)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// File patterns used when an input is a directory (comma-separated)
    #[arg(short, long, default_value = STRUCTURE_PATTERNS)]
    pub pattern: String,

    /// Search directories recursively
    #[arg(short, long, default_value_t = false)]
    pub recursive: bool,
}

/// INCAR 覆盖
#[derive(Args, Debug, Clone, Default)]
pub struct IncarArgs {
    /// INCAR override KEY=VALUE (repeatable; KEY= removes the tag)
    #[arg(long = "incar", value_name = "KEY=VALUE")]
    pub incar: Vec<String>,

    /// Read INCAR overrides from an INCAR file (applied before --incar)
    #[arg(long, value_name = "FILE")]
    pub incar_file: Option<PathBuf>,
}

/// 导出为 Slurm 作业目录
#[derive(Args, Debug, Clone, Default)]
pub struct ExportArgs {
    /// Write one VASP job directory per calculation under DIR instead of only a flow file
    #[arg(long, value_name = "DIR")]
    pub export: Option<PathBuf>,

    /// VASP POTCAR library directory (<dir>/<El>/POTCAR)
    #[arg(long)]
    pub potcar_dir: Option<PathBuf>,

    /// Command placed in the sbatch script (defaults to [vasp].command)
    #[arg(long)]
    pub exec: Option<String>,

    /// Slurm partition
    #[arg(long)]
    pub partition: Option<String>,

    /// Slurm constraint
    #[arg(long)]
    pub constraint: Option<String>,

    /// Number of nodes
    #[arg(long)]
    pub nodes: Option<u32>,

    /// Number of tasks
    #[arg(long)]
    pub ntasks: Option<u32>,

    /// CPUs per task
    #[arg(long)]
    pub cpus_per_task: Option<u32>,

    /// Memory per CPU
    #[arg(long)]
    pub mem_per_cpu: Option<String>,

    /// Time limit (e.g., '24:00:00')
    #[arg(long)]
    pub time: Option<String>,

    /// Module list (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub modules: Vec<String>,

    /// Submit the exported jobs with sbatch
    #[arg(long, default_value_t = false, requires = "export")]
    pub submit: bool,
}
