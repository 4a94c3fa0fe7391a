//! # 测试用计算器
//!
//! 代替 VASP / 机器学习势驱动程序：按作业名返回预设能量，
//! 记录每次调用的 INCAR，可指定失败的作业。

use super::calculator::{CalcRequest, Calculator};
use crate::error::{PhonfitError, Result};
use crate::makers::calc::{Engine, TaskType};
use crate::models::{EngineKind, Frame, IncarSettings, TaskDocument};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// 一次调用记录
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub job_name: String,
    pub incar: Option<IncarSettings>,
    pub num_atoms: usize,
}

#[derive(Clone)]
pub struct MockCalculator {
    engine: EngineKind,
    energy_per_atom: f64,
    energies: HashMap<String, f64>,
    failing: HashSet<String>,
    calls: Arc<Mutex<Vec<CallRecord>>>,
}

impl MockCalculator {
    pub fn vasp() -> Self {
        Self::new(EngineKind::Vasp)
    }

    pub fn ml() -> Self {
        Self::new(EngineKind::MlPotential)
    }

    fn new(engine: EngineKind) -> Self {
        Self {
            engine,
            energy_per_atom: -5.4,
            energies: HashMap::new(),
            failing: HashSet::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 指定作业的每原子能量
    pub fn with_energy(mut self, job_name: &str, energy_per_atom: f64) -> Self {
        self.energies.insert(job_name.to_string(), energy_per_atom);
        self
    }

    pub fn failing(mut self, job_name: &str) -> Self {
        self.failing.insert(job_name.to_string());
        self
    }

    /// 共享的调用记录
    pub fn calls(&self) -> Arc<Mutex<Vec<CallRecord>>> {
        Arc::clone(&self.calls)
    }
}

impl Calculator for MockCalculator {
    fn run(&self, request: &CalcRequest<'_>) -> Result<TaskDocument> {
        let structure = request.structure.clone();
        let n = structure.num_atoms();

        self.calls.lock().unwrap().push(CallRecord {
            job_name: request.job_name.to_string(),
            incar: request.maker.incar().cloned(),
            num_atoms: n,
        });

        if self.failing.contains(request.job_name) {
            return Err(PhonfitError::JobFailed {
                name: request.job_name.to_string(),
                reason: "mock failure".to_string(),
            });
        }

        let per_atom = self
            .energies
            .get(request.job_name)
            .copied()
            .unwrap_or(self.energy_per_atom);
        let energy = per_atom * n as f64;

        // 简单弹簧力：把原子拉回最近的格点
        let forces: Vec<[f64; 3]> = structure
            .atoms
            .iter()
            .map(|a| {
                let d = a.position.map(|x| x - (x * 4.0).round() / 4.0);
                structure.lattice.frac_to_cart(d).map(|v| -v)
            })
            .collect();

        let trajectory = match (request.maker.task, &request.maker.engine) {
            (TaskType::MolecularDynamics, Engine::MlPotential { settings, .. }) => (0..=settings.steps)
                .map(|step| Frame {
                    structure: structure.clone(),
                    energy: energy + 0.001 * step as f64,
                    forces: forces.clone(),
                })
                .collect(),
            _ => Vec::new(),
        };

        Ok(TaskDocument {
            job_name: request.job_name.to_string(),
            engine: self.engine,
            forcefield_name: request.maker.forcefield_name(),
            structure,
            energy,
            energy_per_atom: per_atom,
            forces,
            dir_name: Some(request.work_dir.display().to_string()),
            trajectory,
        })
    }
}
