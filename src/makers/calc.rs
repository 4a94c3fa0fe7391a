//! # 单点计算配方
//!
//! `CalcMaker` 描述一次弛豫 / 静态 / 分子动力学计算：名称、任务类型、
//! 计算引擎（VASP 参数或机器学习势）。预设与常用 VASP 工作流保持一致。
//!
//! ## 依赖关系
//! - 被 `flow/job.rs`, `flow/calculator.rs`, `flow/powerups.rs`, `makers/` 使用
//! - 使用 `models/incar.rs`

use crate::error::{PhonfitError, Result};
use crate::flow::{Input, Job, JobKind};
use crate::models::{Crystal, EngineKind, IncarSettings};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// 计算任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Relax,
    Static,
    MolecularDynamics,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::Relax => write!(f, "relax"),
            TaskType::Static => write!(f, "static"),
            TaskType::MolecularDynamics => write!(f, "md"),
        }
    }
}

/// VASP 输入参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaspSettings {
    pub incar: IncarSettings,

    /// Gamma 中心 k 点网格；为空时依赖 INCAR 中的 KSPACING
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kpoints: Option<[u32; 3]>,
}

/// 机器学习势类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PotentialKind {
    #[serde(rename = "GAP")]
    Gap,
    #[serde(rename = "ACE")]
    Ace,
    #[serde(rename = "NequIP")]
    Nequip,
    #[serde(rename = "M3GNet")]
    M3gnet,
    #[serde(rename = "MACE")]
    Mace,
}

impl fmt::Display for PotentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PotentialKind::Gap => "GAP",
            PotentialKind::Ace => "ACE",
            PotentialKind::Nequip => "NequIP",
            PotentialKind::M3gnet => "M3GNet",
            PotentialKind::Mace => "MACE",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for PotentialKind {
    type Err = PhonfitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gap" => Ok(PotentialKind::Gap),
            "ace" | "j-ace" => Ok(PotentialKind::Ace),
            "nequip" => Ok(PotentialKind::Nequip),
            "m3gnet" => Ok(PotentialKind::M3gnet),
            "mace" => Ok(PotentialKind::Mace),
            other => Err(PhonfitError::InvalidArgument(format!(
                "Unknown ML potential '{}' (expected GAP, ACE, NequIP, M3GNet or MACE)",
                other
            ))),
        }
    }
}

/// 机器学习势及其参数文件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlPotential {
    pub kind: PotentialKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potential_file: Option<PathBuf>,
}

impl MlPotential {
    pub fn new(kind: PotentialKind) -> Self {
        MlPotential {
            kind,
            potential_file: None,
        }
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.potential_file = Some(path.into());
        self
    }
}

/// 机器学习势计算参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlSettings {
    /// 弛豫时是否优化晶胞
    pub relax_cell: bool,
    /// 弛豫力收敛判据 (eV/Å)
    pub fmax: f64,
    /// 弛豫或 MD 最大步数
    pub steps: usize,
    /// MD 时间步长 (fs)
    pub timestep: f64,
    /// MD 温度 (K)
    pub temperature: f64,
}

impl Default for MlSettings {
    fn default() -> Self {
        MlSettings {
            relax_cell: true,
            fmax: 0.00001,
            steps: 500,
            timestep: 1.0,
            temperature: 300.0,
        }
    }
}

/// 计算引擎
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "engine")]
pub enum Engine {
    Vasp(VaspSettings),
    MlPotential {
        potential: MlPotential,
        settings: MlSettings,
    },
}

/// 单点计算配方
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalcMaker {
    pub name: String,
    pub task: TaskType,
    pub engine: Engine,
}

fn base_incar() -> IncarSettings {
    IncarSettings::new()
        .with("PREC", "Accurate")
        .with("ALGO", "Normal")
        .with("ENCUT", 700)
        .with("EDIFF", 1e-7)
        .with("ISMEAR", 0)
        .with("SIGMA", 0.05)
        .with("LREAL", false)
        .with("LWAVE", false)
        .with("LCHARG", false)
        .with("LASPH", true)
        .with("NELM", 200)
}

fn static_incar() -> IncarSettings {
    base_incar()
        .with("NSW", 0)
        .with("IBRION", -1)
        .with("KSPACING", 0.2)
}

impl CalcMaker {
    fn vasp(name: &str, task: TaskType, incar: IncarSettings, kpoints: Option<[u32; 3]>) -> Self {
        CalcMaker {
            name: name.to_string(),
            task,
            engine: Engine::Vasp(VaspSettings { incar, kpoints }),
        }
    }

    /// 严格弛豫（晶胞与坐标）
    pub fn tight_relax() -> Self {
        let incar = base_incar()
            .with("NSW", 99)
            .with("IBRION", 2)
            .with("ISIF", 3)
            .with("EDIFFG", -0.001)
            .with("KSPACING", 0.2);
        Self::vasp("tight relax", TaskType::Relax, incar, None)
    }

    /// 随机结构的 DFT 单点
    pub fn dft_static() -> Self {
        Self::vasp("dft static", TaskType::Static, static_incar(), None)
    }

    /// 通用 VASP 静态计算
    pub fn static_calc() -> Self {
        Self::vasp("static", TaskType::Static, static_incar(), None)
    }

    /// 声子位移单点
    pub fn phonon_static() -> Self {
        let incar = static_incar().with("ADDGRID", true);
        Self::vasp("phonon static", TaskType::Static, incar, None)
    }

    /// 孤立原子单点（Gamma 点）
    pub fn iso_atom_static() -> Self {
        let incar = base_incar()
            .with("NSW", 0)
            .with("IBRION", -1)
            .with("ISPIN", 1)
            .with("SIGMA", 0.01)
            .with("NELM", 500);
        Self::vasp("stat_iso_atom", TaskType::Static, incar, Some([1, 1, 1]))
    }

    fn ml(name: String, task: TaskType, potential: MlPotential, settings: MlSettings) -> Self {
        CalcMaker {
            name,
            task,
            engine: Engine::MlPotential {
                potential,
                settings,
            },
        }
    }

    /// 机器学习势弛豫（含晶胞）
    pub fn ml_relax(potential: MlPotential) -> Self {
        let name = format!("{} relax", potential.kind);
        Self::ml(name, TaskType::Relax, potential, MlSettings::default())
    }

    pub fn ml_static(potential: MlPotential) -> Self {
        let name = format!("{} static", potential.kind);
        Self::ml(name, TaskType::Static, potential, MlSettings::default())
    }

    pub fn ml_phonon_static(potential: MlPotential) -> Self {
        let name = format!("{} phonon static", potential.kind);
        Self::ml(name, TaskType::Static, potential, MlSettings::default())
    }

    /// 机器学习势分子动力学
    pub fn ml_md(potential: MlPotential, steps: usize) -> Self {
        let name = format!("{} md", potential.kind);
        let settings = MlSettings {
            steps,
            ..MlSettings::default()
        };
        Self::ml(name, TaskType::MolecularDynamics, potential, settings)
    }

    pub fn engine_kind(&self) -> EngineKind {
        match self.engine {
            Engine::Vasp(_) => EngineKind::Vasp,
            Engine::MlPotential { .. } => EngineKind::MlPotential,
        }
    }

    pub fn is_vasp(&self) -> bool {
        matches!(self.engine, Engine::Vasp(_))
    }

    pub fn incar(&self) -> Option<&IncarSettings> {
        match &self.engine {
            Engine::Vasp(v) => Some(&v.incar),
            Engine::MlPotential { .. } => None,
        }
    }

    pub fn incar_mut(&mut self) -> Option<&mut IncarSettings> {
        match &mut self.engine {
            Engine::Vasp(v) => Some(&mut v.incar),
            Engine::MlPotential { .. } => None,
        }
    }

    /// 机器学习势名称，VASP 返回 `None`
    pub fn forcefield_name(&self) -> Option<String> {
        match &self.engine {
            Engine::Vasp(_) => None,
            Engine::MlPotential { potential, .. } => Some(potential.kind.to_string()),
        }
    }

    /// 替换机器学习势参数文件
    pub fn set_potential_file(&mut self, path: impl Into<PathBuf>) {
        if let Engine::MlPotential { potential, .. } = &mut self.engine {
            potential.potential_file = Some(path.into());
        }
    }

    /// 以本配方名称创建计算作业
    pub fn make(&self, structure: Input<Crystal>) -> Job {
        self.make_named(self.name.clone(), structure)
    }

    /// 以指定名称创建计算作业
    pub fn make_named(&self, name: impl Into<String>, structure: Input<Crystal>) -> Job {
        Job::new(
            name,
            JobKind::Calculation {
                maker: self.clone(),
                structure,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IncarValue;

    #[test]
    fn test_presets() {
        let relax = CalcMaker::tight_relax();
        assert_eq!(relax.name, "tight relax");
        assert_eq!(relax.task, TaskType::Relax);
        assert_eq!(relax.incar().unwrap().get("ISIF"), Some(&IncarValue::Int(3)));

        let iso = CalcMaker::iso_atom_static();
        assert_eq!(iso.name, "stat_iso_atom");
        assert!(matches!(&iso.engine, Engine::Vasp(v) if v.kpoints == Some([1, 1, 1])));
        assert_eq!(iso.forcefield_name(), None);
    }

    #[test]
    fn test_ml_names_follow_potential() {
        let gap = MlPotential::new(PotentialKind::Gap).with_file("gap_file.xml");
        assert_eq!(CalcMaker::ml_relax(gap.clone()).name, "GAP relax");
        assert_eq!(CalcMaker::ml_static(gap.clone()).name, "GAP static");
        assert_eq!(CalcMaker::ml_phonon_static(gap.clone()).name, "GAP phonon static");

        let md = CalcMaker::ml_md(gap, 25);
        assert_eq!(md.task, TaskType::MolecularDynamics);
        assert_eq!(md.forcefield_name().as_deref(), Some("GAP"));
        assert_eq!(md.engine_kind(), EngineKind::MlPotential);
        assert!(md.incar().is_none());
    }

    #[test]
    fn test_potential_kind_parse() {
        assert_eq!("mace".parse::<PotentialKind>().unwrap(), PotentialKind::Mace);
        assert_eq!("NequIP".parse::<PotentialKind>().unwrap(), PotentialKind::Nequip);
        assert!("lj".parse::<PotentialKind>().is_err());
        assert_eq!(serde_json::to_string(&PotentialKind::M3gnet).unwrap(), "\"M3GNet\"");
    }

    #[test]
    fn test_make_job() {
        let maker = CalcMaker::dft_static();
        let crystal = Crystal::new("x", crate::models::Lattice::orthorhombic(3.0, 3.0, 3.0), vec![]);
        let job = maker.make_named("dft static 1/3", Input::Value(crystal));
        assert_eq!(job.name, "dft static 1/3");
        assert!(matches!(job.kind, JobKind::Calculation { .. }));
    }
}
