//! # datagen 子命令 CLI 定义
//!
//! 随机结构数据生成作业流；指定 `--test-potential` 时改为 MD 测试集作业流
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/datagen.rs`

use super::common::IncarArgs;
use crate::makers::PotentialKind;
use clap::Args;
use std::path::PathBuf;

/// datagen 子命令参数
#[derive(Args, Debug)]
pub struct DatagenArgs {
    /// Bulk structure file (POSCAR / CONTCAR / *.vasp)
    pub structure: PathBuf,

    /// Identifier used to name the flow and the generated structures (defaults to the file stem)
    #[arg(long)]
    pub mp_id: Option<String>,

    /// Distortion type: 0 volume, 1 angle, 2 volume then angle
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub distort_type: Option<u8>,

    /// Number of structures to generate (at least 10 unless custom volume factors are given)
    #[arg(short, long)]
    pub n_structures: Option<usize>,

    /// Volume scale factor range MIN,MAX
    #[arg(long, value_delimiter = ',', value_name = "MIN,MAX")]
    pub volume_range: Option<Vec<f64>>,

    /// Explicit volume scale factors (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub volume_factors: Option<Vec<f64>>,

    /// Diagonal supercell multipliers NA,NB,NC
    #[arg(long, value_delimiter = ',', value_name = "NA,NB,NC")]
    pub supercell: Option<Vec<i32>>,

    /// Standard deviation of the atomic rattle (Angstrom)
    #[arg(long)]
    pub rattle_std: Option<f64>,

    /// Base random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Use Monte-Carlo rattling with this many iterations
    #[arg(long, value_name = "N_ITER")]
    pub mc_rattle: Option<usize>,

    /// Minimum interatomic distance (Angstrom)
    #[arg(long)]
    pub min_distance: Option<f64>,

    /// Skip the bulk relaxation before randomizing
    #[arg(long, default_value_t = false)]
    pub no_relax: bool,

    #[command(flatten)]
    pub incar: IncarArgs,

    /// Write the generated structures as POSCAR files into DIR instead of building a flow
    #[arg(long, value_name = "DIR")]
    pub structures_only: Option<PathBuf>,

    /// Build an MD test-set flow with this potential (GAP, ACE, NequIP, M3GNet, MACE)
    #[arg(long, value_name = "POTENTIAL")]
    pub test_potential: Option<PotentialKind>,

    /// Potential file used by the MD test-set flow
    #[arg(long)]
    pub potential_file: Option<PathBuf>,

    /// Linear cell scale factors for the MD test set (comma-separated)
    #[arg(long, value_delimiter = ',', default_value = "0.975,1.0,1.025,1.05")]
    pub cell_factors: Vec<f64>,

    /// Frames sampled per MD trajectory
    #[arg(long, default_value_t = 50)]
    pub test_frames: usize,

    /// MD steps per trajectory
    #[arg(long, default_value_t = 1000)]
    pub md_steps: usize,

    /// Output flow file
    #[arg(short, long, default_value = "datagen_flow.json")]
    pub output: PathBuf,
}
