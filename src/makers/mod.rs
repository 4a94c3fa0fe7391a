//! # 作业流配方模块
//!
//! 将扰动结构与计算配方组装成作业流：随机结构数据生成、孤立原子能量、
//! DFT 静态标注、声子（DFT / 机器学习势）与 MD 测试集。
//!
//! ## 依赖关系
//! - 被 `commands/`, `flow/` 使用
//! - 子模块: calc, datagen, iso_atom, labelling, phonon, testing

pub mod calc;
pub mod datagen;
pub mod iso_atom;
pub mod labelling;
pub mod phonon;
pub mod testing;

pub use calc::{CalcMaker, MlPotential, PotentialKind};
pub use datagen::RandomStructuresDataGenerator;
pub use iso_atom::IsoAtomMaker;
pub use labelling::DftStaticLabelling;
pub use phonon::{MlPhononMaker, PhononMaker};
pub use testing::TestDataGenerator;
