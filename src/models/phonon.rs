//! # 声子数据集模型
//!
//! 有限位移法的输入数据：位移结构与对应受力，交给外部声子后处理程序计算
//! 力常数、能带与态密度。
//!
//! ## 依赖关系
//! - 被 `makers/phonon.rs`, `flow/execute.rs` 使用
//! - 使用 `models/structure.rs`

use super::structure::{Crystal, SupercellMatrix};
use serde::{Deserialize, Serialize};

/// 单个位移及其受力
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplacementForces {
    /// 被移动原子在超胞中的序号
    pub atom_index: usize,

    /// 笛卡尔位移向量 (Å)
    pub displacement: [f64; 3],

    /// 超胞全部原子的受力 (eV/Å)
    pub forces: Vec<[f64; 3]>,
}

/// 含单个位移原子的超胞
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplacedSupercell {
    pub atom_index: usize,
    pub displacement: [f64; 3],
    pub structure: Crystal,
}

/// 声子计算数据集
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhononDocument {
    /// 弛豫后的原胞
    pub structure: Crystal,

    pub supercell_matrix: SupercellMatrix,

    /// 位移幅度 (Å)
    pub displacement: f64,

    /// 对称性容差，原样传给后处理
    pub symprec: f64,

    pub force_sets: Vec<DisplacementForces>,

    /// 原胞静态总能量 (eV)
    pub total_energy: Option<f64>,

    pub forcefield_name: Option<String>,
}

impl PhononDocument {
    pub fn num_displacements(&self) -> usize {
        self.force_sets.len()
    }
}
