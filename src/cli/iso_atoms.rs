//! # iso-atoms 子命令 CLI 定义
//!
//! 孤立原子能量计算
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/iso_atoms.rs`

use super::common::{ExportArgs, IncarArgs};
use clap::Args;
use std::path::PathBuf;

/// iso-atoms 子命令参数
#[derive(Args, Debug)]
pub struct IsoAtomsArgs {
    /// Element symbols (e.g. Si O)
    #[arg(required_unless_present = "from")]
    pub species: Vec<String>,

    /// Take the elements from these structure files instead
    #[arg(long, value_delimiter = ',', conflicts_with = "species")]
    pub from: Option<Vec<PathBuf>>,

    /// Cubic-ish box edges A,B,C for the isolated atom (Angstrom)
    #[arg(long, value_delimiter = ',', value_name = "A,B,C")]
    pub cell: Option<Vec<f64>>,

    #[command(flatten)]
    pub incar: IncarArgs,

    #[command(flatten)]
    pub export: ExportArgs,

    /// Output flow file
    #[arg(short, long, default_value = "iso_atoms_flow.json")]
    pub output: PathBuf,
}
