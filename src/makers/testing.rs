//! # 势函数测试集生成
//!
//! 对每个结构按晶格缩放序列做机器学习势 MD，再从轨迹中均匀抽样写出
//! `test_data.extxyz`。
//!
//! ## 依赖关系
//! - 被 `commands/datagen.rs`, `flow/execute.rs` 使用
//! - 使用 `parsers/extxyz.rs`

use super::calc::{CalcMaker, MlPotential};
use crate::error::{PhonfitError, Result};
use crate::flow::{Flow, Input, Job, JobKind, OutputSpec};
use crate::models::{Crystal, TaskDocument};
use crate::parsers::extxyz::{write_extxyz_file, LabelledFrame};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const TEST_DATA_FILE: &str = "test_data.extxyz";

/// MD 测试集生成器
#[derive(Debug, Clone)]
pub struct TestDataGenerator {
    pub potential: MlPotential,
    /// 线性晶格缩放因子
    pub cell_factor_sequence: Vec<f64>,
    /// 每条轨迹抽样帧数
    pub n_structures: usize,
    pub steps: usize,
}

impl TestDataGenerator {
    pub fn new(potential: MlPotential) -> Self {
        TestDataGenerator {
            potential,
            cell_factor_sequence: vec![0.975, 1.0, 1.025, 1.05],
            n_structures: 50,
            steps: 1000,
        }
    }

    pub fn make(&self, structures: &[Crystal]) -> Result<Flow> {
        if self.cell_factor_sequence.is_empty() {
            return Err(PhonfitError::InvalidArgument(
                "cell_factor_sequence is empty".to_string(),
            ));
        }

        let md = CalcMaker::ml_md(self.potential.clone(), self.steps);
        let total = structures.len() * self.cell_factor_sequence.len();
        let mut jobs = Vec::with_capacity(total + 1);

        for structure in structures {
            for &factor in &self.cell_factor_sequence {
                let mut scaled = structure.scale_lattice(factor)?;
                scaled.name = format!("{}_x{}", structure.name, factor);
                let name = format!("{} {}/{}", md.name, jobs.len() + 1, total);
                jobs.push(md.make_named(name, Input::Value(scaled)));
            }
        }

        let write = Job::new(
            "write_test_data",
            JobKind::WriteTestData {
                documents: jobs.iter().map(|j| Input::Ref(j.output())).collect(),
                n_structures: self.n_structures,
            },
        );
        let output = OutputSpec::Ref(write.output());
        jobs.push(write);

        Ok(Flow::from_jobs("test data", jobs).with_output(output))
    }
}

/// 写出测试集后的摘要
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDataSummary {
    pub path: String,
    pub num_frames: usize,
}

/// 在 `[0, len)` 中均匀选取 `n` 个下标（含首尾）
pub fn even_indices(len: usize, n: usize) -> Vec<usize> {
    if n == 0 || len == 0 {
        return Vec::new();
    }
    if n >= len {
        return (0..len).collect();
    }
    if n == 1 {
        return vec![len - 1];
    }
    (0..n)
        .map(|i| ((i * (len - 1)) as f64 / (n - 1) as f64).round() as usize)
        .collect()
}

pub fn write_test_data(
    documents: &[TaskDocument],
    n_structures: usize,
    work_dir: &Path,
) -> Result<TestDataSummary> {
    let mut frames = Vec::new();

    for doc in documents {
        if doc.trajectory.is_empty() {
            frames.push(LabelledFrame {
                structure: doc.structure.clone(),
                energy: doc.energy,
                forces: doc.forces.clone(),
                config_type: "test".to_string(),
            });
            continue;
        }
        for i in even_indices(doc.trajectory.len(), n_structures) {
            let frame = &doc.trajectory[i];
            frames.push(LabelledFrame {
                structure: frame.structure.clone(),
                energy: frame.energy,
                forces: frame.forces.clone(),
                config_type: "test".to_string(),
            });
        }
    }

    let path = work_dir.join(TEST_DATA_FILE);
    write_extxyz_file(&frames, &path)?;
    tracing::info!(frames = frames.len(), path = %path.display(), "Wrote test data");

    Ok(TestDataSummary {
        path: path.display().to_string(),
        num_frames: frames.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::mock::MockCalculator;
    use crate::flow::{Calculators, LocalRunner};
    use crate::makers::calc::PotentialKind;
    use crate::models::{Atom, Lattice};
    use crate::parsers::extxyz::parse_extxyz_file;

    fn silicon() -> Crystal {
        Crystal::new(
            "Si",
            Lattice::orthorhombic(5.43, 5.43, 5.43),
            vec![
                Atom::new("Si", [0.0, 0.0, 0.0]),
                Atom::new("Si", [0.25, 0.25, 0.25]),
            ],
        )
    }

    #[test]
    fn test_even_indices() {
        assert_eq!(even_indices(11, 3), vec![0, 5, 10]);
        assert_eq!(even_indices(2, 5), vec![0, 1]);
        assert_eq!(even_indices(5, 1), vec![4]);
        assert!(even_indices(5, 0).is_empty());
    }

    #[test]
    fn test_generate_training_data_for_testing() {
        let dir = tempfile::tempdir().unwrap();
        let generator = TestDataGenerator {
            potential: MlPotential::new(PotentialKind::Gap).with_file("gap_file.xml"),
            cell_factor_sequence: vec![0.95, 1.0, 1.05],
            n_structures: 1,
            steps: 1,
        };
        let flow = generator.make(&[silicon()]).unwrap();
        assert_eq!(flow.jobs().len(), 4);
        assert_eq!(flow.job_names()[0], "GAP md 1/3");

        let mock = MockCalculator::ml();
        let calls = mock.calls();
        let responses = LocalRunner::new(Calculators::new().with_ml(mock))
            .with_root(dir.path())
            .ensure_success(false)
            .run(&flow)
            .unwrap();

        let output = responses.resolve(flow.output.as_ref().unwrap()).unwrap();
        let summary: TestDataSummary = serde_json::from_value(output).unwrap();
        assert_eq!(summary.num_frames, 3);

        let frames = parse_extxyz_file(Path::new(&summary.path)).unwrap();
        assert_eq!(frames.len(), 3);
        assert!((frames[0].structure.lattice.lengths()[0] - 5.43 * 0.95).abs() < 1e-6);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|c| c.incar.is_none()));
    }

    #[test]
    fn test_empty_factor_sequence() {
        let mut generator = TestDataGenerator::new(MlPotential::new(PotentialKind::Mace));
        generator.cell_factor_sequence.clear();
        assert!(generator.make(&[silicon()]).is_err());
    }
}
