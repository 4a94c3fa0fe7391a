//! # label 子命令 CLI 定义
//!
//! DFT 静态标注：体相结构 + 孤立原子 + 二聚体
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/label.rs`

use super::common::{ExportArgs, IncarArgs, StructureInputArgs};
use clap::Args;
use std::path::PathBuf;

/// label 子命令参数
#[derive(Args, Debug)]
pub struct LabelArgs {
    #[command(flatten)]
    pub structures: StructureInputArgs,

    /// Spin-polarized isolated-atom and dimer calculations (ISPIN = 2)
    #[arg(long, default_value_t = false)]
    pub e0_spin: bool,

    /// Do not add isolated-atom calculations
    #[arg(long, default_value_t = false)]
    pub no_isolated: bool,

    /// Do not add dimer calculations
    #[arg(long, default_value_t = false)]
    pub no_dimer: bool,

    /// Dimer bond length range MIN,MAX (Angstrom)
    #[arg(long, value_delimiter = ',', value_name = "MIN,MAX", default_value = "1.0,5.0")]
    pub dimer_range: Vec<f64>,

    /// Number of dimer bond lengths
    #[arg(long, default_value_t = 21)]
    pub dimer_num: usize,

    #[command(flatten)]
    pub incar: IncarArgs,

    #[command(flatten)]
    pub export: ExportArgs,

    /// Output flow file
    #[arg(short, long, default_value = "label_flow.json")]
    pub output: PathBuf,
}
