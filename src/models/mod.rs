//! # 数据模型模块
//!
//! 定义晶体结构、计算参数与计算结果数据模型。
//!
//! ## 依赖关系
//! - 被 `parsers/`, `perturb/`, `flow/`, `makers/` 使用
//! - 子模块: structure, element, incar, calculation, phonon

pub mod calculation;
pub mod element;
pub mod incar;
pub mod phonon;
pub mod structure;

pub use calculation::{DftResult, EngineKind, Frame, TaskDocument};
pub use incar::{IncarSettings, IncarUpdates, IncarValue};
pub use phonon::{DisplacedSupercell, DisplacementForces, PhononDocument};
pub use structure::{Atom, Crystal, Lattice, SupercellMatrix};
