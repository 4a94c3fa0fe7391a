//! # 孤立原子能量
//!
//! 为每个元素在大盒子中做一次单点计算，得到 E0 参考能量。
//!
//! ## 依赖关系
//! - 被 `commands/iso_atoms.rs`, `flow/execute.rs` 使用
//! - 使用 `perturb/clusters.rs`, `models/element.rs`

use super::calc::CalcMaker;
use crate::error::{PhonfitError, Result};
use crate::flow::{Flow, Input, Job, JobKind, OutputSpec};
use crate::models::element::normalize_symbol;
use crate::models::Crystal;
use crate::perturb::clusters::DEFAULT_ISOLATED_BOX;
use serde_json::Value;
use std::collections::BTreeMap;

/// 孤立原子单点作业流生成器
#[derive(Debug, Clone)]
pub struct IsoAtomMaker {
    pub maker: CalcMaker,
    pub cell: [f64; 3],
}

impl Default for IsoAtomMaker {
    fn default() -> Self {
        Self::new(CalcMaker::iso_atom_static())
    }
}

impl IsoAtomMaker {
    pub fn new(maker: CalcMaker) -> Self {
        Self {
            maker,
            cell: DEFAULT_ISOLATED_BOX,
        }
    }

    /// 每个元素一个 `"{El}-stat_iso_atom"` 作业；
    /// 输出 `{"species": [...], "energies": [...]}`，能量为每原子能量
    pub fn make(&self, species: &[String]) -> Result<Flow> {
        let mut symbols: Vec<String> = Vec::with_capacity(species.len());
        for raw in species {
            let el = normalize_symbol(raw)?;
            if !symbols.contains(&el) {
                symbols.push(el);
            }
        }

        let jobs: Vec<Job> = symbols
            .iter()
            .map(|el| {
                self.maker.make_named(
                    format!("{}-{}", el, self.maker.name),
                    Input::Value(Crystal::isolated_atom(el, self.cell)),
                )
            })
            .collect();

        let mut output = BTreeMap::new();
        output.insert(
            "species".to_string(),
            OutputSpec::Value(Value::from(symbols.clone())),
        );
        output.insert(
            "energies".to_string(),
            OutputSpec::List(
                jobs.iter()
                    .map(|j| OutputSpec::Ref(j.output().key("energy_per_atom")))
                    .collect(),
            ),
        );

        Ok(Flow::from_jobs("iso_atom", jobs).with_output(OutputSpec::Map(output)))
    }
}

/// 全部结构中的元素，按首次出现顺序
pub fn unique_species(structures: &[Crystal]) -> Vec<String> {
    let mut species: Vec<String> = Vec::new();
    for s in structures {
        for el in s.species() {
            if !species.contains(&el) {
                species.push(el);
            }
        }
    }
    species
}

/// 运行时从结构列表收集元素再计算孤立原子；
/// 作业第 2 次响应为 `{"species", "energies"}`
pub fn get_iso_atom(structures: Input<Vec<Crystal>>, maker: Option<CalcMaker>) -> Flow {
    let job = Job::new(
        "get_iso_atom",
        JobKind::IsoAtomsFromStructures {
            structures,
            maker: maker.unwrap_or_else(CalcMaker::iso_atom_static),
        },
    );
    let output = OutputSpec::Ref(job.output());
    Flow::from_jobs("get_iso_atom", vec![job]).with_output(output)
}

/// 将 `{"species", "energies"}` 输出整理为 元素 → 能量
pub fn energies_from_output(output: &Value) -> Result<BTreeMap<String, f64>> {
    let malformed = || PhonfitError::Other(format!("Malformed iso-atom output: {}", output));

    let species = output["species"].as_array().ok_or_else(malformed)?;
    let energies = output["energies"].as_array().ok_or_else(malformed)?;
    if species.len() != energies.len() {
        return Err(malformed());
    }

    species
        .iter()
        .zip(energies)
        .map(|(s, e)| match (s.as_str(), e.as_f64()) {
            (Some(s), Some(e)) => Ok((s.to_string(), e)),
            _ => Err(malformed()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::mock::MockCalculator;
    use crate::flow::{Calculators, LocalRunner};
    use crate::models::{Atom, Lattice};

    fn lithium_chloride() -> Crystal {
        Crystal::new(
            "LiCl",
            Lattice::orthorhombic(5.1, 5.1, 5.1),
            vec![
                Atom::new("Li", [0.0, 0.0, 0.0]),
                Atom::new("Cl", [0.5, 0.5, 0.5]),
            ],
        )
    }

    fn mock() -> MockCalculator {
        MockCalculator::vasp()
            .with_energy("Li-stat_iso_atom", -0.28649227)
            .with_energy("Cl-stat_iso_atom", -0.25638457)
    }

    #[test]
    fn test_iso_atom_energies() {
        let dir = tempfile::tempdir().unwrap();
        let species = vec!["Li".to_string(), "Cl".to_string()];
        let flow = IsoAtomMaker::default().make(&species).unwrap();
        assert_eq!(flow.job_names(), vec!["Li-stat_iso_atom", "Cl-stat_iso_atom"]);

        let responses = LocalRunner::new(Calculators::new().with_vasp(mock()))
            .with_root(dir.path())
            .run(&flow)
            .unwrap();

        let li = flow.find_by_name("Li-stat_iso_atom").unwrap();
        let cl = flow.find_by_name("Cl-stat_iso_atom").unwrap();
        let li_e = responses.get(&li.uuid, 1).unwrap().output["energy_per_atom"].as_f64().unwrap();
        let cl_e = responses.get(&cl.uuid, 1).unwrap().output["energy_per_atom"].as_f64().unwrap();
        assert!((li_e - -0.28649227).abs() < 1e-8);
        assert!((cl_e - -0.25638457).abs() < 1e-8);

        let output = responses.resolve(flow.output.as_ref().unwrap()).unwrap();
        let energies = energies_from_output(&output).unwrap();
        assert_eq!(energies.len(), 2);
        assert!((energies["Cl"] - -0.25638457).abs() < 1e-8);
    }

    #[test]
    fn test_symbols_are_normalized_and_deduplicated() {
        let species = vec!["li".to_string(), "Cl-".to_string(), "Li".to_string()];
        let flow = IsoAtomMaker::default().make(&species).unwrap();
        assert_eq!(flow.job_names(), vec!["Li-stat_iso_atom", "Cl-stat_iso_atom"]);

        let bad = vec!["Xx".to_string()];
        assert!(IsoAtomMaker::default().make(&bad).is_err());
    }

    #[test]
    fn test_get_iso_atom_from_structures() {
        let dir = tempfile::tempdir().unwrap();
        let flow = get_iso_atom(Input::Value(vec![lithium_chloride(), lithium_chloride()]), None);
        let job_uuid = flow.job_uuids()[0];

        let responses = LocalRunner::new(Calculators::new().with_vasp(mock()))
            .with_root(dir.path())
            .run(&flow)
            .unwrap();

        let second = &responses.get(&job_uuid, 2).unwrap().output;
        assert_eq!(second["species"], serde_json::json!(["Li", "Cl"]));
        assert!((second["energies"][0].as_f64().unwrap() - -0.28649227).abs() < 1e-8);
    }

    #[test]
    fn test_unique_species_order() {
        let mut other = lithium_chloride();
        other.atoms.push(Atom::new("Na", [0.25, 0.25, 0.25]));
        assert_eq!(unique_species(&[other, lithium_chloride()]), vec!["Li", "Cl", "Na"]);
    }
}
