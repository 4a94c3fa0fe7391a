//! # 作业定义
//!
//! 每个作业有唯一 uuid、名称和 `JobKind`。`JobKind` 是本工具定义的
//! 全部作业函数的闭集合；作业的依赖即其输入中引用到的作业 uuid。
//!
//! ## 依赖关系
//! - 被 `flow/graph.rs`, `flow/execute.rs`, `flow/powerups.rs`, `makers/` 使用
//! - 使用 `flow/reference.rs`, `makers/`

use super::reference::{Input, OutputRef};
use crate::makers::calc::CalcMaker;
use crate::makers::labelling::DftStaticLabelling;
use crate::makers::phonon::{PhononMaker, SupercellSettings};
use crate::models::{Crystal, DisplacedSupercell, SupercellMatrix, TaskDocument};
use crate::perturb::RandomizeSettings;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 作业函数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    /// 单次 DFT / ML 计算，输出 `TaskDocument`
    Calculation {
        maker: CalcMaker,
        structure: Input<Crystal>,
    },

    /// 生成随机结构列表
    RandomizeStructures {
        structure: Input<Crystal>,
        settings: RandomizeSettings,
        mp_id: String,
    },

    /// 运行时替换为每个结构一个静态计算
    StaticBatch {
        structures: Input<Vec<Crystal>>,
        maker: CalcMaker,
    },

    /// 由最小长度确定超胞矩阵
    SupercellMatrix {
        structure: Input<Crystal>,
        settings: SupercellSettings,
    },

    /// 生成有限位移超胞
    PhononDisplacements {
        structure: Input<Crystal>,
        supercell_matrix: Input<SupercellMatrix>,
        displacement: f64,
    },

    /// 运行时替换为每个位移一个静态计算
    RunDisplacements {
        displacements: Input<Vec<DisplacedSupercell>>,
        maker: CalcMaker,
    },

    /// 汇总为 `PhononDocument`
    PhononCollect {
        structure: Input<Crystal>,
        supercell_matrix: Input<SupercellMatrix>,
        displacements: Input<Vec<DisplacedSupercell>>,
        forces: Input<Vec<Vec<[f64; 3]>>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_energy: Option<Input<f64>>,
        displacement: f64,
        symprec: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        forcefield_name: Option<String>,
    },

    /// 运行时替换为完整声子作业流
    PhononWorkflow {
        maker: PhononMaker,
        structure: Input<Crystal>,
    },

    /// 运行时收集元素并替换为孤立原子计算
    IsoAtomsFromStructures {
        structures: Input<Vec<Crystal>>,
        maker: CalcMaker,
    },

    /// 运行时替换为体相 / 孤立原子 / 二聚体静态计算
    StaticLabelling {
        structures: Input<Vec<Crystal>>,
        labelling: DftStaticLabelling,
    },

    /// 写出 `vasp_ref.extxyz` 并提取孤立原子能量
    CollectDftData {
        documents: Input<Vec<TaskDocument>>,
        config_types: Input<Vec<String>>,
    },

    /// 从 MD 轨迹均匀抽样写出测试集
    WriteTestData {
        documents: Vec<Input<TaskDocument>>,
        n_structures: usize,
    },
}

impl JobKind {
    /// 简短类型名
    pub fn label(&self) -> &'static str {
        match self {
            JobKind::Calculation { .. } => "calculation",
            JobKind::RandomizeStructures { .. } => "randomize_structures",
            JobKind::StaticBatch { .. } => "static_batch",
            JobKind::SupercellMatrix { .. } => "supercell_matrix",
            JobKind::PhononDisplacements { .. } => "phonon_displacements",
            JobKind::RunDisplacements { .. } => "run_displacements",
            JobKind::PhononCollect { .. } => "phonon_collect",
            JobKind::PhononWorkflow { .. } => "phonon_workflow",
            JobKind::IsoAtomsFromStructures { .. } => "iso_atoms_from_structures",
            JobKind::StaticLabelling { .. } => "static_labelling",
            JobKind::CollectDftData { .. } => "collect_dft_data",
            JobKind::WriteTestData { .. } => "write_test_data",
        }
    }

    /// 运行时是否会返回替换作业流
    pub fn is_dynamic(&self) -> bool {
        matches!(
            self,
            JobKind::StaticBatch { .. }
                | JobKind::RunDisplacements { .. }
                | JobKind::PhononWorkflow { .. }
                | JobKind::IsoAtomsFromStructures { .. }
                | JobKind::StaticLabelling { .. }
        )
    }

    /// 输入中的全部引用
    pub fn references(&self) -> Vec<&OutputRef> {
        let mut refs: Vec<Option<&OutputRef>> = Vec::new();
        match self {
            JobKind::Calculation { structure, .. }
            | JobKind::RandomizeStructures { structure, .. }
            | JobKind::SupercellMatrix { structure, .. }
            | JobKind::PhononWorkflow { structure, .. } => refs.push(structure.output_ref()),
            JobKind::StaticBatch { structures, .. }
            | JobKind::IsoAtomsFromStructures { structures, .. }
            | JobKind::StaticLabelling { structures, .. } => refs.push(structures.output_ref()),
            JobKind::PhononDisplacements {
                structure,
                supercell_matrix,
                ..
            } => {
                refs.push(structure.output_ref());
                refs.push(supercell_matrix.output_ref());
            }
            JobKind::RunDisplacements { displacements, .. } => {
                refs.push(displacements.output_ref())
            }
            JobKind::PhononCollect {
                structure,
                supercell_matrix,
                displacements,
                forces,
                total_energy,
                ..
            } => {
                refs.push(structure.output_ref());
                refs.push(supercell_matrix.output_ref());
                refs.push(displacements.output_ref());
                refs.push(forces.output_ref());
                refs.push(total_energy.as_ref().and_then(|e| e.output_ref()));
            }
            JobKind::CollectDftData {
                documents,
                config_types,
            } => {
                refs.push(documents.output_ref());
                refs.push(config_types.output_ref());
            }
            JobKind::WriteTestData { documents, .. } => {
                refs.extend(documents.iter().map(|d| d.output_ref()));
            }
        }
        refs.into_iter().flatten().collect()
    }

    /// 作业携带的全部计算配方（含动态作业运行时才展开的配方）
    pub fn makers(&self) -> Vec<&CalcMaker> {
        match self {
            JobKind::Calculation { maker, .. }
            | JobKind::StaticBatch { maker, .. }
            | JobKind::RunDisplacements { maker, .. }
            | JobKind::IsoAtomsFromStructures { maker, .. } => vec![maker],
            JobKind::PhononWorkflow { maker, .. } => maker.makers(),
            JobKind::StaticLabelling { labelling, .. } => vec![&labelling.static_maker],
            _ => Vec::new(),
        }
    }

    pub fn makers_mut(&mut self) -> Vec<&mut CalcMaker> {
        match self {
            JobKind::Calculation { maker, .. }
            | JobKind::StaticBatch { maker, .. }
            | JobKind::RunDisplacements { maker, .. }
            | JobKind::IsoAtomsFromStructures { maker, .. } => vec![maker],
            JobKind::PhononWorkflow { maker, .. } => maker.makers_mut(),
            JobKind::StaticLabelling { labelling, .. } => vec![&mut labelling.static_maker],
            _ => Vec::new(),
        }
    }
}

/// 作业
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub uuid: Uuid,
    pub name: String,
    pub kind: JobKind,
}

impl Job {
    pub fn new(name: impl Into<String>, kind: JobKind) -> Self {
        Job {
            uuid: Uuid::new_v4(),
            name: name.into(),
            kind,
        }
    }

    /// 本作业的完整输出
    pub fn output(&self) -> OutputRef {
        OutputRef::new(self.uuid)
    }

    /// 依赖的作业 uuid（去重，保持出现顺序）
    pub fn dependencies(&self) -> Vec<Uuid> {
        let mut deps: Vec<Uuid> = Vec::new();
        for r in self.kind.references() {
            if !deps.contains(&r.uuid) {
                deps.push(r.uuid);
            }
        }
        deps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Lattice;

    fn crystal() -> Crystal {
        Crystal::new("c", Lattice::orthorhombic(4.0, 4.0, 4.0), vec![])
    }

    #[test]
    fn test_dependencies_are_deduplicated() {
        let relax = CalcMaker::tight_relax().make(Input::Value(crystal()));
        let supercell = Job::new(
            "supercell",
            JobKind::SupercellMatrix {
                structure: Input::Ref(relax.output().key("structure")),
                settings: SupercellSettings::default(),
            },
        );
        let disp = Job::new(
            "displacements",
            JobKind::PhononDisplacements {
                structure: Input::Ref(relax.output().key("structure")),
                supercell_matrix: Input::Ref(supercell.output()),
                displacement: 0.01,
            },
        );
        assert!(relax.dependencies().is_empty());
        assert_eq!(disp.dependencies(), vec![relax.uuid, supercell.uuid]);
    }

    #[test]
    fn test_job_json_round_trip() {
        let job = CalcMaker::dft_static().make(Input::Value(crystal()));
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["kind"]["type"], "calculation");
        let back: Job = serde_json::from_value(json).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn test_dynamic_kinds_expose_makers() {
        let mut job = Job::new(
            "labelling",
            JobKind::StaticLabelling {
                structures: Input::Value(vec![crystal()]),
                labelling: DftStaticLabelling::default(),
            },
        );
        assert!(job.kind.is_dynamic());
        assert_eq!(job.kind.makers().len(), 1);
        assert_eq!(job.kind.makers_mut().len(), 1);
    }
}
