//! # phonon 子命令 CLI 定义
//!
//! 有限位移声子作业流（DFT 或机器学习势）
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/phonon.rs`

use super::common::IncarArgs;
use crate::makers::PotentialKind;
use clap::Args;
use std::path::PathBuf;

/// phonon 子命令参数
#[derive(Args, Debug)]
pub struct PhononArgs {
    /// Structure file (POSCAR / CONTCAR / *.vasp)
    pub structure: PathBuf,

    /// Use an ML potential instead of VASP (GAP, ACE, NequIP, M3GNet, MACE)
    #[arg(long, value_name = "POTENTIAL")]
    pub ml: Option<PotentialKind>,

    /// Potential file for --ml (defaults to [ml].potential-file)
    #[arg(long, requires = "ml")]
    pub potential_file: Option<PathBuf>,

    /// Wrap the ML phonon flow in one job that expands at run time (default relax and static settings)
    #[arg(long, requires = "ml", conflicts_with_all = ["no_relax", "no_static", "max_atoms"])]
    pub single_job: bool,

    /// Minimum supercell edge length (Angstrom)
    #[arg(long, default_value_t = 20.0)]
    pub min_length: f64,

    /// Upper bound on the supercell atom count
    #[arg(long)]
    pub max_atoms: Option<usize>,

    /// Displacement amplitude (Angstrom)
    #[arg(long, default_value_t = 0.01)]
    pub displacement: f64,

    /// Build one DFT phonon flow per amplitude (comma-separated)
    #[arg(long, value_delimiter = ',', conflicts_with = "ml")]
    pub displacements: Option<Vec<f64>>,

    /// Symmetry tolerance recorded with the phonon document
    #[arg(long, default_value_t = 1e-4)]
    pub symprec: f64,

    /// Skip the bulk relaxation
    #[arg(long, default_value_t = false)]
    pub no_relax: bool,

    /// Skip the static energy calculation
    #[arg(long, default_value_t = false)]
    pub no_static: bool,

    #[command(flatten)]
    pub incar: IncarArgs,

    /// Output flow file
    #[arg(short, long, default_value = "phonon_flow.json")]
    pub output: PathBuf,
}
