//! # phonfit - DFT 参考数据与机器学习势声子工作流
//!
//! 为机器学习势拟合生成 DFT 参考数据（随机结构、孤立原子、二聚体），
//! 并构建有限位移声子计算的作业流，本地执行或导出为 Slurm 作业。
//!
//! ## 子命令
//! - `datagen`   - 随机结构数据生成 / MD 测试集
//! - `label`     - DFT 静态标注
//! - `iso-atoms` - 孤立原子能量
//! - `phonon`    - DFT / 机器学习势声子
//! - `run`       - 本地执行作业流
//! - `inspect`   - 查看作业流
//! - `collect`   - 收集 VASP 结果为 `vasp_ref.extxyz`
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/        (命令行参数定义)
//!   ├── commands/   (命令执行逻辑)
//!   │     ├── makers/    (作业流配方)
//!   │     ├── flow/      (作业图、计算器与本地执行器)
//!   │     ├── perturb/   (结构扰动)
//!   │     ├── dataset.rs (训练数据集)
//!   │     ├── parsers/   (格式解析器)
//!   │     └── models/    (数据模型)
//!   ├── batch/      (并行批处理)
//!   ├── config.rs   (配置文件)
//!   ├── utils/      (工具函数)
//!   └── error.rs    (错误处理)
//! ```

mod batch;
mod cli;
mod commands;
mod config;
mod dataset;
mod error;
mod flow;
mod makers;
mod models;
mod parsers;
mod perturb;
mod utils;

use clap::Parser;
use cli::Cli;

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();

    if let Err(e) = utils::logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.clone()) {
        utils::output::print_error(&format!("{}", e));
        std::process::exit(1);
    }

    let config = match config::Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            utils::output::print_error(&format!("{}", e));
            std::process::exit(1);
        }
    };

    if let Err(e) = commands::run(cli.command, &config, cli.quiet) {
        tracing::debug!(error = ?e, "Command failed");
        utils::output::print_error(&format!("{}", e));
        std::process::exit(1);
    }
}
