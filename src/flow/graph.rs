//! # 作业流
//!
//! `Flow` 是作业与子作业流的有序集合，可带输出描述。
//! 执行顺序由引用关系决定：就绪作业中按插入顺序优先。
//!
//! ## 依赖关系
//! - 被 `flow/runner.rs`, `flow/powerups.rs`, `makers/`, `commands/` 使用
//! - 使用 `petgraph` 构建依赖图并检测环

use super::job::Job;
use super::reference::OutputSpec;
use crate::error::{PhonfitError, Result};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// 作业流中的一项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowItem {
    Job(Job),
    Flow(Flow),
}

/// 作业流
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub uuid: Uuid,
    pub name: String,
    pub items: Vec<FlowItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputSpec>,
}

impl Flow {
    pub fn new(name: impl Into<String>) -> Self {
        Flow {
            uuid: Uuid::new_v4(),
            name: name.into(),
            items: Vec::new(),
            output: None,
        }
    }

    /// 由作业列表构造
    pub fn from_jobs(name: impl Into<String>, jobs: Vec<Job>) -> Self {
        let mut flow = Flow::new(name);
        flow.items = jobs.into_iter().map(FlowItem::Job).collect();
        flow
    }

    pub fn with_output(mut self, output: impl Into<OutputSpec>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn add_job(&mut self, job: Job) {
        self.items.push(FlowItem::Job(job));
    }

    pub fn add_flow(&mut self, flow: Flow) {
        self.items.push(FlowItem::Flow(flow));
    }

    /// 深度优先展开的全部作业
    pub fn jobs(&self) -> Vec<&Job> {
        let mut jobs = Vec::new();
        for item in &self.items {
            match item {
                FlowItem::Job(job) => jobs.push(job),
                FlowItem::Flow(flow) => jobs.extend(flow.jobs()),
            }
        }
        jobs
    }

    #[cfg(test)]
    pub fn job_uuids(&self) -> Vec<Uuid> {
        self.jobs().iter().map(|j| j.uuid).collect()
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs().iter().map(|j| j.name.as_str()).collect()
    }

    pub fn find_job(&self, uuid: &Uuid) -> Option<&Job> {
        self.jobs().into_iter().find(|j| &j.uuid == uuid)
    }

    #[cfg(test)]
    pub fn find_by_name(&self, name: &str) -> Option<&Job> {
        self.jobs().into_iter().find(|j| j.name == name)
    }

    /// 对每个作业（含嵌套）执行修改
    pub fn for_each_job_mut<F: FnMut(&mut Job)>(&mut self, f: &mut F) {
        for item in &mut self.items {
            match item {
                FlowItem::Job(job) => f(job),
                FlowItem::Flow(flow) => flow.for_each_job_mut(f),
            }
        }
    }

    /// 本作业流内部的依赖图；引用外部作业的边被忽略
    pub fn dependency_graph(&self) -> (StableDiGraph<Uuid, ()>, HashMap<Uuid, NodeIndex>) {
        let mut graph = StableDiGraph::new();
        let mut index_map = HashMap::new();
        let jobs = self.jobs();

        for job in &jobs {
            let idx = graph.add_node(job.uuid);
            index_map.insert(job.uuid, idx);
        }

        for job in &jobs {
            let target = index_map[&job.uuid];
            for dep in job.dependencies() {
                if let Some(&source) = index_map.get(&dep) {
                    graph.add_edge(source, target, ());
                }
            }
        }

        (graph, index_map)
    }

    /// 确定性执行顺序
    pub fn execution_order(&self) -> Result<Vec<Uuid>> {
        let (graph, _) = self.dependency_graph();
        if petgraph::algo::is_cyclic_directed(&graph) {
            return Err(PhonfitError::CycleDetected {
                flow: self.name.clone(),
            });
        }

        let jobs = self.jobs();
        let internal: HashSet<Uuid> = jobs.iter().map(|j| j.uuid).collect();
        let deps: Vec<Vec<Uuid>> = jobs
            .iter()
            .map(|j| {
                j.dependencies()
                    .into_iter()
                    .filter(|d| internal.contains(d))
                    .collect()
            })
            .collect();

        let mut done: HashSet<Uuid> = HashSet::new();
        let mut order = Vec::with_capacity(jobs.len());
        while order.len() < jobs.len() {
            let next = jobs
                .iter()
                .zip(&deps)
                .find(|(job, d)| !done.contains(&job.uuid) && d.iter().all(|u| done.contains(u)))
                .map(|(job, _)| job.uuid);

            match next {
                Some(uuid) => {
                    done.insert(uuid);
                    order.push(uuid);
                }
                None => {
                    return Err(PhonfitError::CycleDetected {
                        flow: self.name.clone(),
                    })
                }
            }
        }

        Ok(order)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(content: &str) -> Result<Flow> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?).map_err(|e| PhonfitError::write(path, e))
    }

    pub fn load(path: &Path) -> Result<Flow> {
        if !path.exists() {
            return Err(PhonfitError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let content = fs::read_to_string(path).map_err(|e| PhonfitError::read(path, e))?;
        Flow::from_json(&content).map_err(|e| PhonfitError::ParseError {
            format: "flow JSON".to_string(),
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{Input, JobKind};
    use crate::makers::calc::CalcMaker;
    use crate::models::{Crystal, Lattice};

    fn crystal() -> Crystal {
        Crystal::new("c", Lattice::orthorhombic(4.0, 4.0, 4.0), vec![])
    }

    fn chain() -> (Flow, Vec<Uuid>) {
        let a = CalcMaker::tight_relax().make(Input::Value(crystal()));
        let b = CalcMaker::static_calc().make(Input::Ref(a.output().key("structure")));
        let c = CalcMaker::dft_static().make(Input::Value(crystal()));
        let ids = vec![a.uuid, b.uuid, c.uuid];
        // b 插入在 a 之前，但依赖 a
        let mut flow = Flow::from_jobs("chain", vec![b]);
        let mut inner = Flow::new("inner");
        inner.add_job(a);
        flow.add_flow(inner);
        flow.add_job(c);
        (flow, ids)
    }

    #[test]
    fn test_flattened_jobs() {
        let (flow, ids) = chain();
        assert_eq!(flow.jobs().len(), 3);
        assert_eq!(flow.job_uuids(), vec![ids[1], ids[0], ids[2]]);
        assert_eq!(flow.job_names(), vec!["static", "tight relax", "dft static"]);
    }

    #[test]
    fn test_execution_order_respects_dependencies() {
        let (flow, ids) = chain();
        assert_eq!(flow.execution_order().unwrap(), vec![ids[0], ids[1], ids[2]]);
    }

    #[test]
    fn test_cycle_is_detected() {
        let mut a = CalcMaker::static_calc().make(Input::Value(crystal()));
        let b = CalcMaker::static_calc().make(Input::Ref(a.output()));
        a.kind = JobKind::Calculation {
            maker: CalcMaker::static_calc(),
            structure: Input::Ref(b.output()),
        };
        let flow = Flow::from_jobs("loop", vec![a, b]);
        assert!(matches!(
            flow.execution_order(),
            Err(PhonfitError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_external_references_are_ignored() {
        let outside = CalcMaker::tight_relax().make(Input::Value(crystal()));
        let inside = CalcMaker::static_calc().make(Input::Ref(outside.output()));
        let flow = Flow::from_jobs("partial", vec![inside]);
        assert_eq!(flow.execution_order().unwrap().len(), 1);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.json");
        let (flow, _) = chain();
        flow.save(&path).unwrap();
        let loaded = Flow::load(&path).unwrap();
        assert_eq!(loaded, flow);
        assert!(Flow::load(&dir.path().join("missing.json")).is_err());
    }
}
