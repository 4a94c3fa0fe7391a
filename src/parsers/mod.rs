//! # 解析器模块
//!
//! 提供 VASP 输入输出文件与训练数据格式的解析器。
//!
//! ## 依赖关系
//! - 被 `commands/`, `flow/`, `dataset.rs` 使用
//! - 使用 `models/` 数据模型
//! - 子模块: poscar, outcar, incar, extxyz

pub mod extxyz;
pub mod incar;
pub mod outcar;
pub mod poscar;

use crate::error::{PhonfitError, Result};
use crate::models::Crystal;
use std::path::Path;

/// 从文件路径推断格式并解析结构
pub fn parse_structure_file(path: &Path) -> Result<Crystal> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    if ext == "vasp" || ext == "poscar" {
        return poscar::parse_poscar_file(path);
    }

    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        if name.starts_with("POSCAR") || name.starts_with("CONTCAR") {
            return poscar::parse_poscar_file(path);
        }
    }

    Err(PhonfitError::UnsupportedFormat(format!(
        "Cannot determine format for: {}",
        path.display()
    )))
}
