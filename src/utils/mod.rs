//! # 工具函数模块
//!
//! 提供美化输出、进度条、日志初始化、Slurm 脚本生成等工具。
//!
//! ## 依赖关系
//! - 被 `commands/`, `batch/`, `main.rs` 使用
//! - 子模块: output, progress, logging, slurm

pub mod logging;
pub mod output;
pub mod progress;
pub mod slurm;
