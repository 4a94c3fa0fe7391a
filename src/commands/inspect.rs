//! # inspect 命令实现
//!
//! 按执行顺序列出作业流中的作业、类型、计算配方与依赖数。
//!
//! ## 依赖关系
//! - 使用 `cli/inspect.rs` 定义的参数
//! - 使用 `flow/graph.rs`, `parsers/incar.rs`, `tabled`

use crate::cli::inspect::InspectArgs;
use crate::error::{PhonfitError, Result};
use crate::flow::{Flow, FlowItem};
use crate::parsers::incar::to_incar_string;
use crate::utils::output;
use tabled::{Table, Tabled};

#[derive(Debug, Clone, Tabled)]
struct JobRow {
    #[tabled(rename = "#")]
    seq: usize,
    #[tabled(rename = "Job")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Maker")]
    maker: String,
    #[tabled(rename = "Deps")]
    deps: usize,
    #[tabled(rename = "Dynamic")]
    dynamic: String,
}

fn job_rows(flow: &Flow) -> Result<Vec<JobRow>> {
    let order = flow.execution_order()?;
    order
        .iter()
        .enumerate()
        .map(|(i, uuid)| {
            let job = flow
                .find_job(uuid)
                .ok_or_else(|| PhonfitError::Other(format!("Job {} not in flow", uuid)))?;
            let makers: Vec<&str> = job.kind.makers().iter().map(|m| m.name.as_str()).collect();
            Ok(JobRow {
                seq: i + 1,
                name: job.name.clone(),
                kind: job.kind.label().to_string(),
                maker: if makers.is_empty() {
                    "-".to_string()
                } else {
                    makers.join(", ")
                },
                deps: job.dependencies().len(),
                dynamic: if job.kind.is_dynamic() { "yes" } else { "" }.to_string(),
            })
        })
        .collect()
}

/// 执行 inspect 命令
pub fn execute(args: InspectArgs) -> Result<()> {
    let flow = Flow::load(&args.flow)?;
    output::print_header(&format!("Flow '{}'", flow.name));

    let rows = job_rows(&flow)?;
    println!("{}", Table::new(&rows));
    output::print_info(&format!(
        "{} jobs, {} nested flows, {} replaced at run time",
        rows.len(),
        flow.items
            .iter()
            .filter(|i| matches!(i, FlowItem::Flow(_)))
            .count(),
        rows.iter().filter(|r| !r.dynamic.is_empty()).count()
    ));

    if let Some(pattern) = &args.incar {
        let job = flow
            .jobs()
            .into_iter()
            .find(|j| j.name.contains(pattern.as_str()))
            .ok_or_else(|| PhonfitError::InvalidArgument(format!("No job matching '{}'", pattern)))?;

        match job.kind.makers().iter().find_map(|m| m.incar()) {
            Some(incar) => {
                output::print_separator();
                output::print_info(&format!("INCAR of '{}'", job.name));
                print!("{}", to_incar_string(incar));
            }
            None => output::print_warning(&format!("'{}' has no VASP maker", job.name)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::Input;
    use crate::makers::PhononMaker;
    use crate::models::{Atom, Crystal, Lattice};

    #[test]
    fn test_rows_follow_execution_order() {
        let structure = Crystal::new(
            "Si",
            Lattice::orthorhombic(5.43, 5.43, 5.43),
            vec![Atom::new("Si", [0.0, 0.0, 0.0])],
        );
        let flow = PhononMaker::dft().make(Input::Value(structure));
        let rows = job_rows(&flow).unwrap();

        assert_eq!(rows.len(), 7);
        assert_eq!(rows[0].name, "tight relax 1");
        assert_eq!(rows[0].deps, 0);
        assert_eq!(rows[1].deps, 1);
        let run = rows
            .iter()
            .find(|r| r.name == "run_phonon_displacements")
            .unwrap();
        assert_eq!(run.dynamic, "yes");
        assert_eq!(run.maker, "phonon static");
        assert_eq!(rows.last().unwrap().name, "generate_frequencies_eigenvectors");
    }
}
