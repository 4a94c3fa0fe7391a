//! # 命令执行模块
//!
//! 实现各子命令的业务逻辑。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `cli/`, `config.rs`, `makers/`, `flow/`, `dataset.rs`, `utils/`
//! - 子模块: datagen, label, iso_atoms, phonon, run, inspect, collect, structures, export

pub mod collect;
pub mod datagen;
pub mod export;
pub mod inspect;
pub mod iso_atoms;
pub mod label;
pub mod phonon;
pub mod run;
pub mod structures;

use crate::cli::Commands;
use crate::config::Config;
use crate::error::Result;

/// 执行命令
pub fn run(cmd: Commands, config: &Config, quiet: bool) -> Result<()> {
    match cmd {
        Commands::Datagen(args) => datagen::execute(args, config),
        Commands::Label(args) => label::execute(args, config),
        Commands::IsoAtoms(args) => iso_atoms::execute(args, config),
        Commands::Phonon(args) => phonon::execute(args, config),
        Commands::Run(args) => run::execute(args, config),
        Commands::Inspect(args) => inspect::execute(args),
        Commands::Collect(args) => collect::execute(args, quiet),
    }
}
