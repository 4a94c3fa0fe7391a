//! # 随机结构数据生成
//!
//! 弛豫 → 随机结构 → 每个结构一个 DFT 单点。单点作业在运行时才生成，
//! 数量等于随机结构数，名称为 `"dft static i/L"`。
//!
//! ## 依赖关系
//! - 被 `commands/datagen.rs`, `flow/execute.rs` 使用
//! - 使用 `perturb/`, `flow/`

use super::calc::CalcMaker;
use crate::error::Result;
use crate::flow::{Flow, Input, Job, JobKind, OutputSpec};
use crate::models::Crystal;
use crate::perturb::{generate_randomized_structures, DistortType, RandomizeSettings};
use std::collections::BTreeMap;

/// 随机结构 DFT 数据生成器
#[derive(Debug, Clone)]
pub struct RandomStructuresDataGenerator {
    pub bulk_relax_maker: Option<CalcMaker>,
    pub static_maker: CalcMaker,
    pub settings: RandomizeSettings,
}

impl Default for RandomStructuresDataGenerator {
    fn default() -> Self {
        Self {
            bulk_relax_maker: Some(CalcMaker::tight_relax()),
            static_maker: CalcMaker::dft_static(),
            settings: RandomizeSettings::default(),
        }
    }
}

impl RandomStructuresDataGenerator {
    pub fn new(settings: RandomizeSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn distort_type(mut self, distort_type: DistortType) -> Self {
        self.settings.distort_type = distort_type;
        self
    }

    pub fn n_structures(mut self, n: usize) -> Self {
        self.settings.n_structures = n;
        self
    }

    pub fn bulk_relax_maker(mut self, maker: Option<CalcMaker>) -> Self {
        self.bulk_relax_maker = maker;
        self
    }

    /// 构建作业流；输出为 `[static batch 输出]`
    pub fn make(
        &self,
        structure: &Crystal,
        mp_id: &str,
        volume_custom_scale_factors: Option<Vec<f64>>,
    ) -> Flow {
        let mut flow = Flow::new(format!("rand_struc_{}", mp_id));

        let source: Input<Crystal> = match &self.bulk_relax_maker {
            Some(maker) => {
                let relax = maker.make(Input::Value(structure.clone()));
                let out = relax.output().key("structure");
                flow.add_job(relax);
                Input::Ref(out)
            }
            None => Input::Value(structure.clone()),
        };

        let mut settings = self.settings.clone();
        if volume_custom_scale_factors.is_some() {
            settings.volume_custom_scale_factors = volume_custom_scale_factors;
        }

        let randomize = Job::new(
            "generate_randomized_structures",
            JobKind::RandomizeStructures {
                structure: source,
                settings,
                mp_id: mp_id.to_string(),
            },
        );
        let batch = Job::new(
            "static batch",
            JobKind::StaticBatch {
                structures: Input::Ref(randomize.output()),
                maker: self.static_maker.clone(),
            },
        );

        let output = OutputSpec::List(vec![OutputSpec::Ref(batch.output())]);
        flow.add_job(randomize);
        flow.add_job(batch);
        flow.with_output(output)
    }
}

/// 生成随机结构，名称以 `mp_id` 为前缀
pub fn randomize(
    structure: &Crystal,
    settings: &RandomizeSettings,
    mp_id: &str,
) -> Result<Vec<Crystal>> {
    let mut structures = generate_randomized_structures(structure, settings)?;
    if !mp_id.is_empty() {
        for (i, s) in structures.iter_mut().enumerate() {
            s.name = format!("{}_rand_{}", mp_id, i + 1);
        }
    }
    Ok(structures)
}

/// 每个结构一个静态计算；输出 `{"dirs": [...], "documents": [...]}`
pub fn static_batch_flow(structures: &[Crystal], maker: &CalcMaker) -> Flow {
    let total = structures.len();
    let jobs: Vec<Job> = structures
        .iter()
        .enumerate()
        .map(|(i, s)| {
            maker.make_named(
                format!("{} {}/{}", maker.name, i + 1, total),
                Input::Value(s.clone()),
            )
        })
        .collect();

    let mut output = BTreeMap::new();
    output.insert(
        "dirs".to_string(),
        OutputSpec::List(
            jobs.iter()
                .map(|j| OutputSpec::Ref(j.output().key("dir_name")))
                .collect(),
        ),
    );
    output.insert(
        "documents".to_string(),
        OutputSpec::List(jobs.iter().map(|j| OutputSpec::Ref(j.output())).collect()),
    );

    Flow::from_jobs(format!("{} batch", maker.name), jobs).with_output(OutputSpec::Map(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::mock::MockCalculator;
    use crate::flow::{update_user_incar_settings, Calculators, LocalRunner};
    use crate::models::{Atom, IncarUpdates, IncarValue, Lattice};
    use uuid::Uuid;

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

    fn batch_uuid(flow: &Flow) -> Uuid {
        flow.output
            .as_ref()
            .and_then(|o| o.item(0))
            .and_then(|o| o.as_ref_output())
            .map(|r| r.uuid)
            .unwrap()
    }

    /// 运行并返回 (替换作业名, dirs 数量, 调用记录)
    fn run(generator: RandomStructuresDataGenerator, factors: Option<Vec<f64>>) -> (Vec<String>, usize, Vec<crate::flow::mock::CallRecord>) {
        let dir = tempfile::tempdir().unwrap();
        let mut flow = generator.make(&silicon(), "mp-149", factors);
        let updates = IncarUpdates::new().set("ISMEAR", 0).set("NCORE", 4);
        update_user_incar_settings(&mut flow, &updates, None);

        let mock = MockCalculator::vasp();
        let calls = mock.calls();
        let responses = LocalRunner::new(Calculators::new().with_vasp(mock))
            .with_root(dir.path())
            .run(&flow)
            .unwrap();

        let uuid = batch_uuid(&flow);
        let names = responses.get(&uuid, 1).unwrap().replace.as_ref().unwrap().job_names()
            .into_iter()
            .map(String::from)
            .collect();
        let dirs = responses.get(&uuid, 2).unwrap().output["dirs"].as_array().unwrap().len();
        let calls = calls.lock().unwrap().clone();
        (names, dirs, calls)
    }

    #[test]
    fn test_distort_type_0_single_factor() {
        let (names, dirs, calls) = run(RandomStructuresDataGenerator::default(), Some(vec![1.0]));
        assert_eq!(dirs, 1);
        assert_eq!(names, vec!["dft static 1/1"]);
        assert_eq!(calls[0].job_name, "tight relax");
        assert_eq!(calls[1].num_atoms, 16);
    }

    #[test]
    fn test_distort_type_1_minimum_ten() {
        let generator = RandomStructuresDataGenerator::default()
            .distort_type(DistortType::Angle)
            .n_structures(3);
        let (names, dirs, _) = run(generator, Some(vec![1.0]));
        assert_eq!(dirs, 10);
        let expected: Vec<String> = (1..=10).map(|i| format!("dft static {}/10", i)).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_distort_type_2_one_per_factor() {
        let generator = RandomStructuresDataGenerator::default().distort_type(DistortType::VolumeAndAngle);
        let (names, dirs, _) = run(generator, Some(vec![1.0, 1.0]));
        assert_eq!(dirs, 2);
        assert_eq!(names, vec!["dft static 1/2", "dft static 2/2"]);
    }

    #[test]
    fn test_volume_factors_and_incar_powerup() {
        let (names, dirs, calls) =
            run(RandomStructuresDataGenerator::default(), Some(vec![0.975, 1.0, 1.025, 1.05]));
        assert_eq!(dirs, 4);
        assert_eq!(names[3], "dft static 4/4");

        for call in calls.iter().filter(|c| c.job_name.starts_with("dft static")) {
            let incar = call.incar.as_ref().unwrap();
            assert_eq!(incar.get("ISMEAR"), Some(&IncarValue::Int(0)));
            assert_eq!(incar.get("NCORE"), Some(&IncarValue::Int(4)));
            assert_eq!(incar.get("NSW"), Some(&IncarValue::Int(0)));
        }
    }

    #[test]
    fn test_without_relax() {
        let generator = RandomStructuresDataGenerator::default().bulk_relax_maker(None);
        let flow = generator.make(&silicon(), "mp-149", None);
        assert_eq!(flow.job_names(), vec!["generate_randomized_structures", "static batch"]);
    }

    #[test]
    fn test_randomize_names() {
        let settings = RandomizeSettings {
            volume_custom_scale_factors: Some(vec![0.95, 1.05]),
            ..Default::default()
        };
        let s = randomize(&silicon(), &settings, "mp-149").unwrap();
        assert_eq!(s[0].name, "mp-149_rand_1");
        assert_eq!(s[1].name, "mp-149_rand_2");
    }
}
