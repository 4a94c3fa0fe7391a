//! # 作业流参数批量修改
//!
//! 对作业流中所有 VASP 配方统一修改 INCAR 参数，动态作业携带的配方也会修改，
//! 因此运行时生成的作业同样继承这些参数。
//!
//! ## 依赖关系
//! - 被 `commands/`, `makers/` 使用
//! - 使用 `flow/graph.rs`, `models/incar.rs`

use super::graph::Flow;
use crate::makers::calc::CalcMaker;
use crate::models::IncarUpdates;

fn matches_filter(maker: &CalcMaker, job_name: &str, name_filter: Option<&str>) -> bool {
    match name_filter {
        None => true,
        Some(filter) => maker.name.contains(filter) || job_name.contains(filter),
    }
}

/// 更新 INCAR 参数，返回被修改的配方数量
///
/// `name_filter` 按子串匹配配方名或作业名；值为 `None` 的键会被删除。
pub fn update_user_incar_settings(
    flow: &mut Flow,
    updates: &IncarUpdates,
    name_filter: Option<&str>,
) -> usize {
    let mut count = 0;
    flow.for_each_job_mut(&mut |job| {
        let job_name = job.name.clone();
        for maker in job.kind.makers_mut() {
            if !maker.is_vasp() || !matches_filter(maker, &job_name, name_filter) {
                continue;
            }
            if let Some(incar) = maker.incar_mut() {
                incar.apply(updates);
                count += 1;
            }
        }
    });

    tracing::debug!(flow = %flow.name, updated = count, "Applied INCAR updates");
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{Input, Job, JobKind};
    use crate::models::{Crystal, IncarValue, Lattice};

    fn crystal() -> Crystal {
        Crystal::new("c", Lattice::orthorhombic(4.0, 4.0, 4.0), vec![])
    }

    fn flow() -> Flow {
        let relax = CalcMaker::tight_relax().make(Input::Value(crystal()));
        let batch = Job::new(
            "static batch",
            JobKind::StaticBatch {
                structures: Input::Value(vec![crystal()]),
                maker: CalcMaker::dft_static(),
            },
        );
        let ml = CalcMaker::ml_static(crate::makers::calc::MlPotential::new(
            crate::makers::calc::PotentialKind::Gap,
        ))
        .make(Input::Value(crystal()));
        Flow::from_jobs("f", vec![relax, batch, ml])
    }

    fn incar_of<'a>(flow: &'a Flow, name: &str) -> &'a crate::models::IncarSettings {
        let job = flow.find_by_name(name).unwrap();
        job.kind.makers()[0].incar().unwrap()
    }

    #[test]
    fn test_updates_reach_dynamic_jobs() {
        let mut f = flow();
        let updates = IncarUpdates::new().set("ISMEAR", 1).unset("LASPH");
        let n = update_user_incar_settings(&mut f, &updates, None);

        assert_eq!(n, 2);
        assert_eq!(incar_of(&f, "static batch").get("ISMEAR"), Some(&IncarValue::Int(1)));
        assert!(!incar_of(&f, "static batch").contains("LASPH"));
        assert_eq!(incar_of(&f, "tight relax").get("ISMEAR"), Some(&IncarValue::Int(1)));
    }

    #[test]
    fn test_name_filter() {
        let mut f = flow();
        let updates = IncarUpdates::new().set("NPAR", 4);
        let n = update_user_incar_settings(&mut f, &updates, Some("relax"));

        assert_eq!(n, 1);
        assert!(incar_of(&f, "tight relax").contains("NPAR"));
        assert!(!incar_of(&f, "static batch").contains("NPAR"));
    }
}
