//! # 计算结果数据模型
//!
//! 存储 VASP 与机器学习势计算的输出文档。
//!
//! ## 依赖关系
//! - 被 `parsers/outcar.rs`, `flow/`, `dataset.rs` 使用
//! - 使用 `models/structure.rs`

use super::structure::Crystal;
use serde::{Deserialize, Serialize};

/// 计算引擎类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Vasp,
    MlPotential,
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::Vasp => write!(f, "VASP"),
            EngineKind::MlPotential => write!(f, "ML potential"),
        }
    }
}

/// 轨迹中的单帧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub structure: Crystal,
    pub energy: f64,
    pub forces: Vec<[f64; 3]>,
}

/// 单个计算作业的输出文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDocument {
    /// 作业名称
    pub job_name: String,

    /// 使用的计算引擎
    pub engine: EngineKind,

    /// 机器学习势名称（如 "GAP"）
    pub forcefield_name: Option<String>,

    /// 最终结构
    pub structure: Crystal,

    /// 总能量 (eV)
    pub energy: f64,

    /// 每原子能量 (eV/atom)
    pub energy_per_atom: f64,

    /// 原子受力 (eV/Å)
    pub forces: Vec<[f64; 3]>,

    /// 计算目录
    pub dir_name: Option<String>,

    /// 分子动力学轨迹
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trajectory: Vec<Frame>,
}

/// 从 VASP 计算目录解析出的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DftResult {
    /// 结构名称
    pub structure_name: String,

    /// 计算是否完成
    pub is_finished: bool,

    /// 能量 (eV)，取 energy(sigma->0)
    pub energy_ev: Option<f64>,

    /// 最后一个离子步的受力
    pub forces: Vec<[f64; 3]>,

    /// 体积 (Å³)
    pub volume: Option<f64>,

    /// 原子数
    pub num_atoms: Option<usize>,

    /// 结构文件路径（CONTCAR 或 POSCAR）
    pub structure_file: Option<String>,
}

impl DftResult {
    pub fn new(structure_name: impl Into<String>) -> Self {
        DftResult {
            structure_name: structure_name.into(),
            is_finished: false,
            energy_ev: None,
            forces: Vec::new(),
            volume: None,
            num_atoms: None,
            structure_file: None,
        }
    }

    /// 计算每原子能量
    pub fn energy_per_atom(&self) -> Option<f64> {
        match (self.energy_ev, self.num_atoms) {
            (Some(e), Some(n)) if n > 0 => Some(e / n as f64),
            _ => None,
        }
    }
}
