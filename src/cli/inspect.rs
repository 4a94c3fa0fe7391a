//! # inspect 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/inspect.rs`

use clap::Args;
use std::path::PathBuf;

/// inspect 子命令参数
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Flow JSON file
    pub flow: PathBuf,

    /// Print the INCAR of the first job whose name contains this text
    #[arg(long, value_name = "NAME")]
    pub incar: Option<String>,
}
