//! # run 子命令 CLI 定义
//!
//! 本地执行作业流 JSON
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/run.rs`

use super::common::IncarArgs;
use clap::Args;
use std::path::PathBuf;

/// run 子命令参数
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Flow JSON file
    pub flow: PathBuf,

    /// Working directory for job folders
    #[arg(long, default_value = "runs")]
    pub root: PathBuf,

    /// Command that runs VASP inside a job folder (defaults to [vasp].command)
    #[arg(long)]
    pub vasp_cmd: Option<String>,

    /// VASP POTCAR library directory (defaults to [vasp].potcar-dir)
    #[arg(long)]
    pub potcar_dir: Option<PathBuf>,

    /// Command that runs the ML driver on task.json (defaults to [ml].command)
    #[arg(long)]
    pub ml_cmd: Option<String>,

    #[command(flatten)]
    pub incar: IncarArgs,

    /// Only apply --incar to makers or jobs whose name contains this text
    #[arg(long, requires = "incar")]
    pub filter: Option<String>,

    /// Use this potential file for every ML calculation in the flow
    #[arg(long)]
    pub potential_file: Option<PathBuf>,

    /// Keep running independent jobs after a failure
    #[arg(long, default_value_t = false)]
    pub keep_going: bool,

    /// Run every job in the root directory instead of one folder per job
    #[arg(long, default_value_t = false)]
    pub no_folders: bool,

    /// Report file (defaults to <root>/report.json)
    #[arg(long)]
    pub report: Option<PathBuf>,
}
