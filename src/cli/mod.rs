//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `datagen`: 随机结构作业流 / MD 测试集作业流
//! - `label`: DFT 静态标注作业流（可导出为 Slurm 作业目录）
//! - `iso-atoms`: 孤立原子能量作业流
//! - `phonon`: DFT / 机器学习势声子作业流
//! - `run`: 本地执行作业流 JSON
//! - `inspect`: 查看作业流
//! - `collect`: 从 VASP 目录收集 `vasp_ref.extxyz`
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: common, datagen, label, iso_atoms, phonon, run, inspect, collect

pub mod collect;
pub mod common;
pub mod datagen;
pub mod inspect;
pub mod iso_atoms;
pub mod label;
pub mod phonon;
pub mod run;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// phonfit - DFT 参考数据生成与机器学习势声子工作流
#[derive(Parser)]
#[command(name = "phonfit")]
#[command(author = "Changjiang Wu")]
#[command(version)]
#[command(about = "DFT reference data generation and ML-potential phonon workflows", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Silence log output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Configuration file (defaults to ./phonfit.toml when present)
    #[arg(long, global = true, value_name = "FILE", env = "PHONFIT_CONFIG")]
    pub config: Option<PathBuf>,
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// Build a random-structure DFT data generation flow (or an ML MD test-set flow)
    Datagen(datagen::DatagenArgs),

    /// Build a DFT static labelling flow for bulk, isolated-atom and dimer structures
    Label(label::LabelArgs),

    /// Build isolated-atom energy calculations for a set of elements
    IsoAtoms(iso_atoms::IsoAtomsArgs),

    /// Build a DFT or ML-potential finite-displacement phonon flow
    Phonon(phonon::PhononArgs),

    /// Execute a flow JSON file locally
    Run(run::RunArgs),

    /// Show the jobs and execution order of a flow JSON file
    Inspect(inspect::InspectArgs),

    /// Collect finished VASP calculations into a vasp_ref.extxyz dataset
    Collect(collect::CollectArgs),
}
