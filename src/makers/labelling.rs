//! # DFT 静态标注
//!
//! 对体相结构、孤立原子与二聚体做 VASP 单点计算，生成训练数据集。
//!
//! ## 作业命名
//! - 体相: `static_bulk_{i}`
//! - 孤立原子: `static_isolated_{i}`
//! - 二聚体: `static_dimer_{i}`
//!
//! 孤立原子与二聚体使用 `KSPACING = 2.0`；`e0_spin` 时另设 `ISPIN = 2`。
//! `custom_incar` 作用于全部标注计算，团簇的上述设置最后写入。
//!
//! ## 依赖关系
//! - 被 `commands/label.rs`, `flow/execute.rs` 使用
//! - 使用 `perturb/clusters.rs`, `dataset.rs`

use super::calc::CalcMaker;
use super::iso_atom::unique_species;
use crate::dataset::{self, DatasetSummary, CONFIG_BULK, CONFIG_DIMER, CONFIG_ISOLATED};
use crate::error::{PhonfitError, Result};
use crate::flow::{Flow, Input, Job, JobKind, OutputRef, OutputSpec};
use crate::models::{Crystal, IncarUpdates, TaskDocument};
use crate::perturb::clusters::{dimers, isolated_atoms, DEFAULT_DIMER_BOX, DEFAULT_ISOLATED_BOX};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// 静态标注参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DftStaticLabelling {
    pub isolated_atom: bool,
    pub e0_spin: bool,
    pub isolatedatom_box: [f64; 3],
    pub dimer: bool,
    pub dimer_box: [f64; 3],
    /// 二聚体键长范围 (Å)
    pub dimer_range: [f64; 2],
    pub dimer_num: usize,
    pub custom_incar: IncarUpdates,
    pub static_maker: CalcMaker,
}

impl Default for DftStaticLabelling {
    fn default() -> Self {
        DftStaticLabelling {
            isolated_atom: true,
            e0_spin: false,
            isolatedatom_box: DEFAULT_ISOLATED_BOX,
            dimer: true,
            dimer_box: DEFAULT_DIMER_BOX,
            dimer_range: [1.0, 5.0],
            dimer_num: 21,
            custom_incar: IncarUpdates::new(),
            static_maker: CalcMaker::static_calc(),
        }
    }
}

impl DftStaticLabelling {
    /// 动态标注作业，运行时替换为全部单点计算
    pub fn make(&self, structures: Input<Vec<Crystal>>) -> Job {
        Job::new(
            "dft_static_labelling",
            JobKind::StaticLabelling {
                structures,
                labelling: self.clone(),
            },
        )
    }

    fn bulk_maker(&self) -> CalcMaker {
        let mut maker = self.static_maker.clone();
        if let Some(incar) = maker.incar_mut() {
            incar.apply(&self.custom_incar);
        }
        maker
    }

    fn cluster_maker(&self) -> CalcMaker {
        let mut maker = self.bulk_maker();
        if let Some(incar) = maker.incar_mut() {
            incar.set("KSPACING", 2.0);
            if self.e0_spin {
                incar.set("ISPIN", 2);
            }
        }
        maker
    }

    /// 展开为单点作业流；输出 `{"dirs_of_vasp", "config_type", "documents"}`
    pub fn expand(&self, structures: &[Crystal]) -> Result<Flow> {
        if structures.is_empty() {
            return Err(PhonfitError::InvalidArgument(
                "No structures to label".to_string(),
            ));
        }

        let mut jobs: Vec<Job> = Vec::new();
        let mut config_types: Vec<String> = Vec::new();

        let bulk = self.bulk_maker();
        for (i, s) in structures.iter().enumerate() {
            jobs.push(bulk.make_named(format!("static_bulk_{}", i), Input::Value(s.clone())));
            config_types.push(CONFIG_BULK.to_string());
        }

        let species = unique_species(structures);
        let cluster = self.cluster_maker();

        if self.isolated_atom {
            for (i, s) in isolated_atoms(&species, self.isolatedatom_box).into_iter().enumerate() {
                jobs.push(cluster.make_named(format!("static_isolated_{}", i), Input::Value(s)));
                config_types.push(CONFIG_ISOLATED.to_string());
            }
        }

        if self.dimer {
            let structures = dimers(&species, self.dimer_box, self.dimer_range, self.dimer_num);
            for (i, s) in structures.into_iter().enumerate() {
                jobs.push(cluster.make_named(format!("static_dimer_{}", i), Input::Value(s)));
                config_types.push(CONFIG_DIMER.to_string());
            }
        }

        tracing::debug!(
            bulk = structures.len(),
            total = jobs.len(),
            "Expanded static labelling"
        );

        let mut output = BTreeMap::new();
        output.insert(
            "dirs_of_vasp".to_string(),
            OutputSpec::List(
                jobs.iter()
                    .map(|j| OutputSpec::Ref(j.output().key("dir_name")))
                    .collect(),
            ),
        );
        output.insert(
            "config_type".to_string(),
            OutputSpec::Value(Value::from(config_types)),
        );
        output.insert(
            "documents".to_string(),
            OutputSpec::List(jobs.iter().map(|j| OutputSpec::Ref(j.output())).collect()),
        );

        Ok(Flow::from_jobs("static labelling", jobs).with_output(OutputSpec::Map(output)))
    }
}

/// 收集标注结果的作业
pub fn collect_dft_data(labelled: &OutputRef) -> Job {
    Job::new(
        "collect_dft_data",
        JobKind::CollectDftData {
            documents: Input::Ref(labelled.clone().key("documents")),
            config_types: Input::Ref(labelled.clone().key("config_type")),
        },
    )
}

/// 标注 + 收集；作业流输出为数据集摘要
pub fn labelling_flow(structures: Input<Vec<Crystal>>, labelling: &DftStaticLabelling) -> Flow {
    let label = labelling.make(structures);
    let collect = collect_dft_data(&label.output());
    let output = OutputSpec::Ref(collect.output());
    Flow::from_jobs("dft labelling", vec![label, collect]).with_output(output)
}

/// 写出 `vasp_ref.extxyz`
pub fn write_dft_dataset(
    documents: &[TaskDocument],
    config_types: &[String],
    work_dir: &Path,
) -> Result<DatasetSummary> {
    let frames = dataset::labelled_frames(documents, config_types)?;
    dataset::write_dataset(&frames, work_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::mock::MockCalculator;
    use crate::flow::{Calculators, LocalRunner};
    use crate::models::{Atom, IncarValue, Lattice};

    fn silicon() -> Crystal {
        Crystal::new(
            "Si",
            Lattice::from_vectors([[0.0, 2.73, 2.73], [2.73, 0.0, 2.73], [2.73, 2.73, 0.0]]),
            vec![
                Atom::new("Si", [0.0, 0.0, 0.0]),
                Atom::new("Si", [0.25, 0.25, 0.25]),
            ],
        )
    }

    fn labelling() -> DftStaticLabelling {
        DftStaticLabelling {
            e0_spin: true,
            dimer_range: [1.5, 3.0],
            dimer_num: 3,
            custom_incar: IncarUpdates::new()
                .set("ENCUT", 200)
                .set("ISPIN", 1)
                .unset("LASPH"),
            ..Default::default()
        }
    }

    #[test]
    fn test_expand_job_names() {
        let flow = labelling().expand(&[silicon(), silicon()]).unwrap();
        assert_eq!(
            flow.job_names(),
            vec![
                "static_bulk_0",
                "static_bulk_1",
                "static_isolated_0",
                "static_dimer_0",
                "static_dimer_1",
                "static_dimer_2",
            ]
        );
    }

    #[test]
    fn test_incar_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockCalculator::vasp();
        let calls = mock.calls();
        let flow = Flow::from_jobs("label", vec![labelling().make(Input::Value(vec![silicon()]))]);
        LocalRunner::new(Calculators::new().with_vasp(mock))
            .with_root(dir.path())
            .run(&flow)
            .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 5);

        let bulk = calls[0].incar.as_ref().unwrap();
        assert_eq!(calls[0].job_name, "static_bulk_0");
        assert_eq!(bulk.get("ENCUT"), Some(&IncarValue::Int(200)));
        assert_eq!(bulk.get("ISPIN"), Some(&IncarValue::Int(1)));
        assert!(!bulk.contains("LASPH"));

        for call in calls.iter().skip(1) {
            let incar = call.incar.as_ref().unwrap();
            assert_eq!(incar.get("ISPIN"), Some(&IncarValue::Int(2)));
            assert_eq!(incar.get("KSPACING"), Some(&IncarValue::Float(2.0)));
            assert_eq!(incar.get("ENCUT"), Some(&IncarValue::Int(200)));
        }
    }

    #[test]
    fn test_collect_dft_data() {
        let dir = tempfile::tempdir().unwrap();
        let flow = labelling_flow(Input::Value(vec![silicon()]), &labelling());
        let mock = MockCalculator::vasp().with_energy("static_isolated_0", -0.84696938);

        let responses = LocalRunner::new(Calculators::new().with_vasp(mock))
            .with_root(dir.path())
            .run(&flow)
            .unwrap();
        let output = responses.resolve(flow.output.as_ref().unwrap()).unwrap();
        let summary: DatasetSummary = serde_json::from_value(output).unwrap();

        assert!((summary.isolated_atom_energies["14"] - -0.84696938).abs() < 1e-8);
        assert_eq!(summary.config_type_counts["bulk"], 1);
        assert_eq!(summary.config_type_counts["IsolatedAtom"], 1);
        assert_eq!(summary.config_type_counts["dimer"], 3);
        assert!(Path::new(&summary.vasp_ref_dir).join("vasp_ref.extxyz").is_file());

        let label = flow.find_by_name("dft_static_labelling").unwrap();
        let dirs = &responses.get(&label.uuid, 2).unwrap().output["dirs_of_vasp"];
        assert_eq!(dirs.as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_clusters_can_be_disabled() {
        let settings = DftStaticLabelling {
            isolated_atom: false,
            dimer: false,
            ..Default::default()
        };
        let flow = settings.expand(&[silicon()]).unwrap();
        assert_eq!(flow.job_names(), vec!["static_bulk_0"]);
        assert!(settings.expand(&[]).is_err());
    }
}
