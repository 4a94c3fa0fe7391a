//! # 声子作业流
//!
//! 有限位移法声子计算：弛豫 → 超胞尺寸 → 位移结构 → 位移单点 →
//! 原胞静态能量 → 汇总为 `PhononDocument`。力常数与能带 / 态密度
//! 由外部后处理程序完成。
//!
//! 同一流程可在 DFT 与机器学习势之间切换：`PhononMaker::with_potential`
//! 替换全部计算配方，流程结构保持不变。
//!
//! ## 依赖关系
//! - 被 `commands/phonon.rs`, `flow/execute.rs`, `flow/job.rs` 使用
//! - 使用 `makers/calc.rs`, `models/phonon.rs`

use super::calc::{CalcMaker, MlPotential};
use crate::error::{PhonfitError, Result};
use crate::flow::{Flow, Input, Job, JobKind, OutputSpec};
use crate::models::structure::diagonal_matrix;
use crate::models::{Crystal, DisplacedSupercell, DisplacementForces, PhononDocument, SupercellMatrix};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// 超胞尺寸参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupercellSettings {
    /// 超胞各方向最小垂直宽度 (Å)
    pub min_length: f64,
    /// 超胞原子数上限
    pub max_atoms: Option<usize>,
    /// 直接指定的超胞矩阵，优先于 `min_length`
    pub fixed: Option<SupercellMatrix>,
}

impl Default for SupercellSettings {
    fn default() -> Self {
        SupercellSettings {
            min_length: 20.0,
            max_atoms: None,
            fixed: None,
        }
    }
}

/// 由最小长度确定对角超胞矩阵
pub fn supercell_matrix(structure: &Crystal, settings: &SupercellSettings) -> Result<SupercellMatrix> {
    if let Some(fixed) = settings.fixed {
        return Ok(fixed);
    }

    let widths = structure.lattice.perpendicular_widths();
    if widths.iter().any(|&h| !h.is_finite() || h <= 0.0) {
        return Err(PhonfitError::InvalidStructure(format!(
            "Degenerate lattice for {} (perpendicular widths {:?})",
            structure.name, widths
        )));
    }

    let mut n = widths.map(|h| ((settings.min_length / h).ceil() as i32).max(1));

    if let Some(max_atoms) = settings.max_atoms {
        let atoms = |n: &[i32; 3]| structure.num_atoms() * (n[0] * n[1] * n[2]) as usize;
        while atoms(&n) > max_atoms {
            // 缩减当前最长的方向
            let Some(axis) = (0..3)
                .filter(|&k| n[k] > 1)
                .max_by(|&a, &b| {
                    (n[a] as f64 * widths[a]).total_cmp(&(n[b] as f64 * widths[b]))
                })
            else {
                break;
            };
            n[axis] -= 1;
        }
    }

    tracing::debug!(structure = %structure.name, matrix = ?n, "Supercell size");
    Ok(diagonal_matrix(n))
}

/// 每个原胞原子沿 x、y、z 正方向各一个位移
pub fn generate_displacements(
    structure: &Crystal,
    matrix: &SupercellMatrix,
    amplitude: f64,
) -> Result<Vec<DisplacedSupercell>> {
    if amplitude.is_nan() || amplitude <= 0.0 {
        return Err(PhonfitError::InvalidArgument(format!(
            "Displacement amplitude must be positive, got {}",
            amplitude
        )));
    }
    if structure.num_atoms() == 0 {
        return Err(PhonfitError::InvalidStructure(format!(
            "{} has no atoms",
            structure.name
        )));
    }

    let supercell = structure.make_supercell(matrix)?;
    let images = supercell.num_atoms() / structure.num_atoms();

    let mut cells = Vec::with_capacity(structure.num_atoms() * 3);
    for i in 0..structure.num_atoms() {
        // make_supercell 按原子连续排列其全部像
        let atom_index = i * images;
        for axis in 0..3 {
            let mut vector = [0.0; 3];
            vector[axis] = amplitude;

            let mut displaced = supercell.clone();
            displaced.displace_atom(atom_index, vector);
            displaced.name = format!("{}_disp_{}", structure.name, cells.len() + 1);
            cells.push(DisplacedSupercell {
                atom_index,
                displacement: vector,
                structure: displaced,
            });
        }
    }
    Ok(cells)
}

/// 每个位移结构一个静态计算；输出 `{"forces": [...], "dirs": [...]}`
pub fn run_displacements_flow(displacements: &[DisplacedSupercell], maker: &CalcMaker) -> Flow {
    let total = displacements.len();
    let jobs: Vec<Job> = displacements
        .iter()
        .enumerate()
        .map(|(i, d)| {
            maker.make_named(
                format!("{} {}/{}", maker.name, i + 1, total),
                Input::Value(d.structure.clone()),
            )
        })
        .collect();

    let refs = |key: &str| {
        OutputSpec::List(
            jobs.iter()
                .map(|j| OutputSpec::Ref(j.output().key(key)))
                .collect(),
        )
    };
    let mut output = BTreeMap::new();
    output.insert("forces".to_string(), refs("forces"));
    output.insert("dirs".to_string(), refs("dir_name"));

    Flow::from_jobs(format!("{} displacements", maker.name), jobs).with_output(OutputSpec::Map(output))
}

/// 汇总作业的全部输入
pub struct CollectInputs {
    pub structure: Crystal,
    pub supercell_matrix: SupercellMatrix,
    pub displacements: Vec<DisplacedSupercell>,
    pub forces: Vec<Vec<[f64; 3]>>,
    pub total_energy: Option<f64>,
    pub displacement: f64,
    pub symprec: f64,
    pub forcefield_name: Option<String>,
}

pub fn collect_phonon_document(inputs: CollectInputs) -> Result<PhononDocument> {
    if inputs.displacements.len() != inputs.forces.len() {
        return Err(PhonfitError::InvalidArgument(format!(
            "{} displacements but {} force sets",
            inputs.displacements.len(),
            inputs.forces.len()
        )));
    }

    let mut force_sets = Vec::with_capacity(inputs.forces.len());
    for (d, forces) in inputs.displacements.into_iter().zip(inputs.forces) {
        if forces.len() != d.structure.num_atoms() {
            return Err(PhonfitError::InvalidStructure(format!(
                "{}: {} forces for {} atoms",
                d.structure.name,
                forces.len(),
                d.structure.num_atoms()
            )));
        }
        force_sets.push(DisplacementForces {
            atom_index: d.atom_index,
            displacement: d.displacement,
            forces,
        });
    }

    let document = PhononDocument {
        structure: inputs.structure,
        supercell_matrix: inputs.supercell_matrix,
        displacement: inputs.displacement,
        symprec: inputs.symprec,
        force_sets,
        total_energy: inputs.total_energy,
        forcefield_name: inputs.forcefield_name,
    };
    tracing::info!(
        displacements = document.num_displacements(),
        forcefield = ?document.forcefield_name,
        "Collected phonon force sets"
    );
    Ok(document)
}

/// 声子作业流配方
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhononMaker {
    pub name: String,
    pub bulk_relax_maker: Option<CalcMaker>,
    /// 连续两次弛豫，作业名加 ` 1` / ` 2`
    pub use_double_relax: bool,
    pub static_energy_maker: Option<CalcMaker>,
    pub phonon_displacement_maker: CalcMaker,
    pub supercell: SupercellSettings,
    /// 位移幅度 (Å)
    pub displacement: f64,
    pub symprec: f64,
}

impl PhononMaker {
    /// VASP 声子流程
    pub fn dft() -> Self {
        PhononMaker {
            name: "dft phonon".to_string(),
            bulk_relax_maker: Some(CalcMaker::tight_relax()),
            use_double_relax: true,
            static_energy_maker: Some(CalcMaker::static_calc()),
            phonon_displacement_maker: CalcMaker::phonon_static(),
            supercell: SupercellSettings::default(),
            displacement: 0.01,
            symprec: 1e-4,
        }
    }

    /// 机器学习势声子流程
    pub fn ml(potential: MlPotential) -> Self {
        PhononMaker::dft().with_potential(potential)
    }

    /// 全部计算换成机器学习势，其余流程不变
    pub fn with_potential(mut self, potential: MlPotential) -> Self {
        self.name = "ml phonon".to_string();
        if self.bulk_relax_maker.is_some() {
            self.bulk_relax_maker = Some(CalcMaker::ml_relax(potential.clone()));
        }
        self.use_double_relax = false;
        if self.static_energy_maker.is_some() {
            self.static_energy_maker = Some(CalcMaker::ml_static(potential.clone()));
        }
        self.phonon_displacement_maker = CalcMaker::ml_phonon_static(potential);
        self
    }

    pub fn with_min_length(mut self, min_length: f64) -> Self {
        self.supercell.min_length = min_length;
        self
    }

    pub fn with_displacement(mut self, displacement: f64) -> Self {
        self.displacement = displacement;
        self
    }

    pub fn makers(&self) -> Vec<&CalcMaker> {
        let mut makers: Vec<&CalcMaker> = Vec::new();
        makers.extend(self.bulk_relax_maker.as_ref());
        makers.extend(self.static_energy_maker.as_ref());
        makers.push(&self.phonon_displacement_maker);
        makers
    }

    pub fn makers_mut(&mut self) -> Vec<&mut CalcMaker> {
        let mut makers: Vec<&mut CalcMaker> = Vec::new();
        makers.extend(self.bulk_relax_maker.as_mut());
        makers.extend(self.static_energy_maker.as_mut());
        makers.push(&mut self.phonon_displacement_maker);
        makers
    }

    /// 构建作业流；输出为 `PhononDocument`
    ///
    /// 作业顺序：弛豫、超胞、位移、位移计算、静态能量、汇总
    pub fn make(&self, structure: Input<Crystal>) -> Flow {
        let mut flow = Flow::new(self.name.clone());
        let mut current = structure;

        if let Some(maker) = &self.bulk_relax_maker {
            let rounds = if self.use_double_relax { 2 } else { 1 };
            for round in 1..=rounds {
                let name = if self.use_double_relax {
                    format!("{} {}", maker.name, round)
                } else {
                    maker.name.clone()
                };
                let relax = maker.make_named(name, current);
                current = Input::Ref(relax.output().key("structure"));
                flow.add_job(relax);
            }
        }

        let supercell = Job::new(
            "get_supercell_size",
            JobKind::SupercellMatrix {
                structure: current.clone(),
                settings: self.supercell.clone(),
            },
        );
        let displacements = Job::new(
            "generate_phonon_displacements",
            JobKind::PhononDisplacements {
                structure: current.clone(),
                supercell_matrix: Input::Ref(supercell.output()),
                displacement: self.displacement,
            },
        );
        let run = Job::new(
            "run_phonon_displacements",
            JobKind::RunDisplacements {
                displacements: Input::Ref(displacements.output()),
                maker: self.phonon_displacement_maker.clone(),
            },
        );
        let static_energy = self
            .static_energy_maker
            .as_ref()
            .map(|maker| maker.make(current.clone()));

        let collect = Job::new(
            "generate_frequencies_eigenvectors",
            JobKind::PhononCollect {
                structure: current,
                supercell_matrix: Input::Ref(supercell.output()),
                displacements: Input::Ref(displacements.output()),
                forces: Input::Ref(run.output().key("forces")),
                total_energy: static_energy
                    .as_ref()
                    .map(|j| Input::Ref(j.output().key("energy"))),
                displacement: self.displacement,
                symprec: self.symprec,
                forcefield_name: self.phonon_displacement_maker.forcefield_name(),
            },
        );
        let output = OutputSpec::Ref(collect.output());

        flow.add_job(supercell);
        flow.add_job(displacements);
        flow.add_job(run);
        if let Some(job) = static_energy {
            flow.add_job(job);
        }
        flow.add_job(collect);
        flow.with_output(output)
    }
}

/// 以机器学习势计算声子
#[derive(Debug, Clone)]
pub struct MlPhononMaker {
    pub potential: MlPotential,
    pub min_length: f64,
    pub displacement: f64,
    pub relax: bool,
    pub static_energy: bool,
    pub max_atoms: Option<usize>,
    pub symprec: f64,
}

impl MlPhononMaker {
    pub fn new(potential: MlPotential) -> Self {
        MlPhononMaker {
            potential,
            min_length: 20.0,
            displacement: 0.01,
            relax: true,
            static_energy: true,
            max_atoms: None,
            symprec: 1e-4,
        }
    }

    pub fn phonon_maker(&self) -> PhononMaker {
        let mut maker = PhononMaker::ml(self.potential.clone())
            .with_min_length(self.min_length)
            .with_displacement(self.displacement);
        if !self.relax {
            maker.bulk_relax_maker = None;
        }
        if !self.static_energy {
            maker.static_energy_maker = None;
        }
        maker.supercell.max_atoms = self.max_atoms;
        maker.symprec = self.symprec;
        maker
    }

    pub fn make(&self, structure: Input<Crystal>) -> Flow {
        self.phonon_maker().make(structure)
    }

    /// 使用拟合得到的势文件构建作业流
    pub fn make_from_ml_model(
        &self,
        structure: Input<Crystal>,
        potential_file: Option<&Path>,
        min_length: Option<f64>,
    ) -> Flow {
        let mut maker = self.clone();
        if let Some(path) = potential_file {
            maker.potential.potential_file = Some(path.to_path_buf());
        }
        if let Some(length) = min_length {
            maker.min_length = length;
        }
        maker.make(structure)
    }
}

/// 包装为单个动态作业；该作业第 2 次响应为 `PhononDocument`
pub fn phonon_ml_calculation_flow(
    potential: MlPotential,
    structure: Input<Crystal>,
    min_length: f64,
) -> Flow {
    let mut ml = MlPhononMaker::new(potential);
    ml.min_length = min_length;

    let job = Job::new(
        "phonon_ml_calculation",
        JobKind::PhononWorkflow {
            maker: ml.phonon_maker(),
            structure,
        },
    );
    let output = OutputSpec::Ref(job.output());
    Flow::from_jobs("phonon_ml_calculation", vec![job]).with_output(output)
}

/// 位移幅度作为输出键：去掉小数点，`0.01` → `"001"`
pub fn displacement_key(amplitude: f64) -> String {
    amplitude.to_string().replace('.', "")
}

/// 每个位移幅度一套 DFT 声子计算；输出 `{"data": {"001": PhononDocument, ...}}`
pub fn dft_phonopy_gen_data(
    structure: Input<Crystal>,
    displacements: &[f64],
    symprec: f64,
    displacement_maker: Option<CalcMaker>,
    min_length: f64,
) -> Flow {
    let mut flow = Flow::new("dft phonopy data");
    let mut data = BTreeMap::new();

    for &amplitude in displacements {
        let key = displacement_key(amplitude);
        if data.contains_key(&key) {
            tracing::warn!(amplitude, "Duplicate displacement amplitude ignored");
            continue;
        }
        let mut maker = PhononMaker::dft()
            .with_min_length(min_length)
            .with_displacement(amplitude);
        maker.symprec = symprec;
        if let Some(m) = &displacement_maker {
            maker.phonon_displacement_maker = m.clone();
        }
        maker.name = format!("dft phonon {}", key);

        let sub = maker.make(structure.clone());
        if let Some(output) = sub.output.clone() {
            data.insert(key, output);
        }
        flow.add_flow(sub);
    }

    let mut output = BTreeMap::new();
    output.insert("data".to_string(), OutputSpec::Map(data));
    flow.with_output(OutputSpec::Map(output))
}
