//! # 作业图模块
//!
//! 定义作业、作业流、输出引用，以及计算器接口与本地执行器。
//! 作业流可序列化为 JSON，交给本地执行器或外部工作流运行时。
//!
//! ## 依赖关系
//! - 被 `makers/`, `commands/` 使用
//! - 子模块: reference, job, graph, powerups, calculator, execute, runner
//! - 使用 `petgraph`, `uuid`, `serde_json`

pub mod calculator;
pub mod execute;
pub mod graph;
pub mod job;
#[cfg(test)]
pub mod mock;
pub mod powerups;
pub mod reference;
pub mod runner;

pub use calculator::{Calculator, Calculators, MlCommandCalculator, VaspCommandCalculator};
pub use graph::{Flow, FlowItem};
pub use job::{Job, JobKind};
pub use powerups::update_user_incar_settings;
pub use reference::{Input, OutputRef, OutputSpec, OutputStore};
pub use runner::{JobState, LocalRunner, Responses};
