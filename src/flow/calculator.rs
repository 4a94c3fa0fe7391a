//! # 计算器接口
//!
//! `Calculator` 负责执行单个计算作业并返回 `TaskDocument`。
//! 提供两种基于外部命令的实现：
//! - `VaspCommandCalculator`: 写出 POSCAR / INCAR / KPOINTS / POTCAR，运行 VASP 命令，解析 OUTCAR 与 CONTCAR
//! - `MlCommandCalculator`: 写出 POSCAR 与 `ml_task.json`，运行势函数驱动命令，读取 `ml_result.json`
//!
//! ## 依赖关系
//! - 被 `flow/execute.rs`, `flow/runner.rs`, `commands/` 使用
//! - 使用 `parsers/poscar.rs`, `parsers/incar.rs`, `parsers/outcar.rs`

use crate::error::{PhonfitError, Result};
use crate::makers::calc::{CalcMaker, Engine, MlPotential, MlSettings, TaskType, VaspSettings};
use crate::models::{Crystal, EngineKind, Frame, TaskDocument};
use crate::parsers::{incar, outcar, poscar};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// 单个计算请求
pub struct CalcRequest<'a> {
    pub job_name: &'a str,
    pub maker: &'a CalcMaker,
    pub structure: &'a Crystal,
    pub work_dir: &'a Path,
}

/// 计算器
pub trait Calculator {
    fn run(&self, request: &CalcRequest<'_>) -> Result<TaskDocument>;
}

/// 计算器注册表：每种引擎一个
#[derive(Default)]
pub struct Calculators {
    vasp: Option<Box<dyn Calculator>>,
    ml: Option<Box<dyn Calculator>>,
}

impl Calculators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vasp(mut self, calculator: impl Calculator + 'static) -> Self {
        self.vasp = Some(Box::new(calculator));
        self
    }

    pub fn with_ml(mut self, calculator: impl Calculator + 'static) -> Self {
        self.ml = Some(Box::new(calculator));
        self
    }

    pub fn get(&self, engine: EngineKind) -> Result<&dyn Calculator> {
        let slot = match engine {
            EngineKind::Vasp => &self.vasp,
            EngineKind::MlPotential => &self.ml,
        };
        slot.as_deref().ok_or_else(|| PhonfitError::CalculatorUnavailable {
            engine: engine.to_string(),
        })
    }
}

/// 在工作目录中运行 shell 命令，标准输出写入 `run.log`
fn run_shell(command: &str, work_dir: &Path) -> Result<()> {
    tracing::debug!(command, dir = %work_dir.display(), "Running external command");

    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(work_dir)
        .output()
        .map_err(|e| PhonfitError::CommandFailed {
            command: command.to_string(),
            stderr: e.to_string(),
        })?;

    let log = work_dir.join("run.log");
    fs::write(&log, &output.stdout).map_err(|e| PhonfitError::write(&log, e))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(PhonfitError::CommandFailed {
            command: command.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Gamma 中心 KPOINTS 文件内容
pub fn kpoints_string(mesh: [u32; 3]) -> String {
    format!(
        "Automatic mesh\n0\nGamma\n{} {} {}\n0 0 0\n",
        mesh[0], mesh[1], mesh[2]
    )
}

/// 拼接 POTCAR（按 POSCAR 中的元素顺序）
pub fn write_potcar(structure: &Crystal, potcar_dir: &Path, path: &Path) -> Result<()> {
    let mut content = String::new();
    for element in structure.species() {
        let src = potcar_dir.join(&element).join("POTCAR");
        if !src.exists() {
            return Err(PhonfitError::FileNotFound {
                path: src.display().to_string(),
            });
        }
        content.push_str(&fs::read_to_string(&src).map_err(|e| PhonfitError::read(&src, e))?);
    }
    fs::write(path, content).map_err(|e| PhonfitError::write(path, e))
}

/// 写出 VASP 输入文件
pub fn write_vasp_inputs(
    settings: &VaspSettings,
    structure: &Crystal,
    dir: &Path,
    potcar_dir: Option<&Path>,
) -> Result<()> {
    poscar::write_poscar_file(structure, &dir.join("POSCAR"))?;
    incar::write_incar_file(&settings.incar, &dir.join("INCAR"))?;

    if let Some(mesh) = settings.kpoints {
        let path = dir.join("KPOINTS");
        fs::write(&path, kpoints_string(mesh)).map_err(|e| PhonfitError::write(&path, e))?;
    }

    if let Some(potcar_dir) = potcar_dir {
        write_potcar(structure, potcar_dir, &dir.join("POTCAR"))?;
    }

    Ok(())
}

/// 读取 VASP 输出，并把原子顺序还原为输入结构的顺序
pub fn read_vasp_outputs(dir: &Path, structure: &Crystal, job_name: &str) -> Result<TaskDocument> {
    let failed = |reason: &str| PhonfitError::JobFailed {
        name: job_name.to_string(),
        reason: reason.to_string(),
    };

    let outcar_path = dir.join("OUTCAR");
    if !outcar_path.exists() {
        return Err(failed("OUTCAR not found"));
    }
    let result = outcar::parse_outcar(&outcar_path, &structure.name)?;
    if !result.is_finished {
        return Err(failed("VASP run did not finish"));
    }
    let energy = result
        .energy_ev
        .ok_or_else(|| failed("no energy(sigma->0) in OUTCAR"))?;

    let order = poscar::write_order(structure);
    let n = structure.num_atoms();

    let mut forces = vec![[0.0; 3]; n];
    if result.forces.len() == n {
        for (k, &orig) in order.iter().enumerate() {
            forces[orig] = result.forces[k];
        }
    } else if !result.forces.is_empty() {
        return Err(failed(&format!(
            "OUTCAR has {} force rows for {} atoms",
            result.forces.len(),
            n
        )));
    }

    let mut final_structure = structure.clone();
    let contcar = dir.join("CONTCAR");
    if contcar.exists() && contcar.metadata().map(|m| m.len() > 0).unwrap_or(false) {
        let relaxed = poscar::parse_poscar_file(&contcar)?;
        if relaxed.num_atoms() == n {
            final_structure.lattice = relaxed.lattice;
            for (k, &orig) in order.iter().enumerate() {
                final_structure.atoms[orig].position = relaxed.atoms[k].position;
            }
        }
    }

    Ok(TaskDocument {
        job_name: job_name.to_string(),
        engine: EngineKind::Vasp,
        forcefield_name: None,
        structure: final_structure,
        energy,
        energy_per_atom: if n > 0 { energy / n as f64 } else { energy },
        forces,
        dir_name: Some(dir.display().to_string()),
        trajectory: Vec::new(),
    })
}

/// 调用外部 VASP 命令的计算器
pub struct VaspCommandCalculator {
    command: String,
    potcar_dir: Option<PathBuf>,
}

impl VaspCommandCalculator {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            potcar_dir: None,
        }
    }

    pub fn with_potcar_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.potcar_dir = dir;
        self
    }
}

impl Calculator for VaspCommandCalculator {
    fn run(&self, request: &CalcRequest<'_>) -> Result<TaskDocument> {
        let settings = match &request.maker.engine {
            Engine::Vasp(settings) => settings,
            Engine::MlPotential { .. } => {
                return Err(PhonfitError::InvalidArgument(format!(
                    "Job '{}' is not a VASP calculation",
                    request.job_name
                )))
            }
        };

        write_vasp_inputs(
            settings,
            request.structure,
            request.work_dir,
            self.potcar_dir.as_deref(),
        )?;
        run_shell(&self.command, request.work_dir)?;
        read_vasp_outputs(request.work_dir, request.structure, request.job_name)
    }
}

/// 写给势函数驱动程序的任务描述
#[derive(Debug, Serialize, Deserialize)]
pub struct MlTask {
    pub job_name: String,
    pub task: TaskType,
    pub potential: MlPotential,
    pub settings: MlSettings,
    pub structure: Crystal,
}

/// 势函数驱动程序返回的结果
#[derive(Debug, Serialize, Deserialize)]
pub struct MlResult {
    pub energy: f64,
    pub forces: Vec<[f64; 3]>,
    #[serde(default)]
    pub structure: Option<Crystal>,
    #[serde(default)]
    pub trajectory: Vec<Frame>,
}

pub const ML_TASK_FILE: &str = "ml_task.json";
pub const ML_RESULT_FILE: &str = "ml_result.json";

/// 调用外部机器学习势驱动命令的计算器
pub struct MlCommandCalculator {
    command: String,
}

impl MlCommandCalculator {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Calculator for MlCommandCalculator {
    fn run(&self, request: &CalcRequest<'_>) -> Result<TaskDocument> {
        let (potential, settings) = match &request.maker.engine {
            Engine::MlPotential {
                potential,
                settings,
            } => (potential, settings),
            Engine::Vasp(_) => {
                return Err(PhonfitError::InvalidArgument(format!(
                    "Job '{}' is not an ML potential calculation",
                    request.job_name
                )))
            }
        };

        let dir = request.work_dir;
        poscar::write_poscar_file(request.structure, &dir.join("POSCAR"))?;

        let task = MlTask {
            job_name: request.job_name.to_string(),
            task: request.maker.task,
            potential: potential.clone(),
            settings: settings.clone(),
            structure: request.structure.clone(),
        };
        let task_path = dir.join(ML_TASK_FILE);
        fs::write(&task_path, serde_json::to_string_pretty(&task)?)
            .map_err(|e| PhonfitError::write(&task_path, e))?;

        run_shell(&self.command, dir)?;

        let result_path = dir.join(ML_RESULT_FILE);
        let content = fs::read_to_string(&result_path).map_err(|e| PhonfitError::read(&result_path, e))?;
        let result: MlResult = serde_json::from_str(&content).map_err(|e| PhonfitError::ParseError {
            format: "ML result".to_string(),
            path: result_path.display().to_string(),
            reason: e.to_string(),
        })?;

        let structure = result.structure.unwrap_or_else(|| request.structure.clone());
        let n = structure.num_atoms();
        Ok(TaskDocument {
            job_name: request.job_name.to_string(),
            engine: EngineKind::MlPotential,
            forcefield_name: Some(potential.kind.to_string()),
            structure,
            energy: result.energy,
            energy_per_atom: if n > 0 { result.energy / n as f64 } else { result.energy },
            forces: result.forces,
            dir_name: Some(dir.display().to_string()),
            trajectory: result.trajectory,
        })
    }
}
