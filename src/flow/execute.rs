//! # 作业执行
//!
//! 解析作业输入、调用对应的作业函数，返回输出或替换作业流。
//!
//! ## 依赖关系
//! - 被 `flow/runner.rs` 使用
//! - 使用 `flow/calculator.rs`, `perturb/`, `makers/`

use super::calculator::{CalcRequest, Calculators};
use super::graph::Flow;
use super::job::{Job, JobKind};
use super::reference::{Input, OutputStore};
use crate::error::Result;
use crate::makers::{datagen, iso_atom, labelling, phonon, testing};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

/// 作业的一次响应
#[derive(Debug, Clone)]
pub struct JobResponse {
    pub output: Value,
    pub replace: Option<Flow>,
}

impl JobResponse {
    fn output<T: Serialize>(value: &T) -> Result<Self> {
        Ok(JobResponse {
            output: serde_json::to_value(value)?,
            replace: None,
        })
    }

    fn replace(flow: Flow) -> Self {
        JobResponse {
            output: Value::Null,
            replace: Some(flow),
        }
    }
}

/// 执行环境
pub struct JobContext<'a> {
    pub work_dir: &'a Path,
    pub calculators: &'a Calculators,
}

/// 执行单个作业
pub fn execute(job: &Job, ctx: &JobContext<'_>, store: &OutputStore) -> Result<JobResponse> {
    match &job.kind {
        JobKind::Calculation { maker, structure } => {
            let structure = structure.resolve(store)?;
            let calculator = ctx.calculators.get(maker.engine_kind())?;
            let doc = calculator.run(&CalcRequest {
                job_name: &job.name,
                maker,
                structure: &structure,
                work_dir: ctx.work_dir,
            })?;
            JobResponse::output(&doc)
        }

        JobKind::RandomizeStructures {
            structure,
            settings,
            mp_id,
        } => {
            let structure = structure.resolve(store)?;
            let structures = datagen::randomize(&structure, settings, mp_id)?;
            JobResponse::output(&structures)
        }

        JobKind::StaticBatch { structures, maker } => {
            let structures = structures.resolve(store)?;
            Ok(JobResponse::replace(datagen::static_batch_flow(&structures, maker)))
        }

        JobKind::SupercellMatrix {
            structure,
            settings,
        } => {
            let structure = structure.resolve(store)?;
            JobResponse::output(&phonon::supercell_matrix(&structure, settings)?)
        }

        JobKind::PhononDisplacements {
            structure,
            supercell_matrix,
            displacement,
        } => {
            let structure = structure.resolve(store)?;
            let matrix = supercell_matrix.resolve(store)?;
            let cells = phonon::generate_displacements(&structure, &matrix, *displacement)?;
            JobResponse::output(&cells)
        }

        JobKind::RunDisplacements {
            displacements,
            maker,
        } => {
            let displacements = displacements.resolve(store)?;
            Ok(JobResponse::replace(phonon::run_displacements_flow(
                &displacements,
                maker,
            )))
        }

        JobKind::PhononCollect {
            structure,
            supercell_matrix,
            displacements,
            forces,
            total_energy,
            displacement,
            symprec,
            forcefield_name,
        } => {
            let total_energy = match total_energy {
                Some(e) => Some(e.resolve(store)?),
                None => None,
            };
            let doc = phonon::collect_phonon_document(phonon::CollectInputs {
                structure: structure.resolve(store)?,
                supercell_matrix: supercell_matrix.resolve(store)?,
                displacements: displacements.resolve(store)?,
                forces: forces.resolve(store)?,
                total_energy,
                displacement: *displacement,
                symprec: *symprec,
                forcefield_name: forcefield_name.clone(),
            })?;
            JobResponse::output(&doc)
        }

        JobKind::PhononWorkflow { maker, structure } => {
            let structure = structure.resolve(store)?;
            Ok(JobResponse::replace(maker.make(Input::Value(structure))))
        }

        JobKind::IsoAtomsFromStructures { structures, maker } => {
            let structures = structures.resolve(store)?;
            let species = iso_atom::unique_species(&structures);
            let flow = iso_atom::IsoAtomMaker::new(maker.clone()).make(&species)?;
            Ok(JobResponse::replace(flow))
        }

        JobKind::StaticLabelling {
            structures,
            labelling,
        } => {
            let structures = structures.resolve(store)?;
            Ok(JobResponse::replace(labelling.expand(&structures)?))
        }

        JobKind::CollectDftData {
            documents,
            config_types,
        } => {
            let documents = documents.resolve(store)?;
            let config_types = config_types.resolve(store)?;
            let summary = labelling::write_dft_dataset(&documents, &config_types, ctx.work_dir)?;
            JobResponse::output(&summary)
        }

        JobKind::WriteTestData {
            documents,
            n_structures,
        } => {
            let documents = documents
                .iter()
                .map(|d| d.resolve(store))
                .collect::<Result<Vec<_>>>()?;
            let summary = testing::write_test_data(&documents, *n_structures, ctx.work_dir)?;
            JobResponse::output(&summary)
        }
    }
}
