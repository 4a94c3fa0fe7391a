//! # VASP OUTCAR 解析器
//!
//! 解析 VASP 计算输出文件 OUTCAR，提取能量、受力等信息。
//!
//! ## 依赖关系
//! - 被 `flow/calculator.rs`, `dataset.rs` 使用
//! - 使用 `models/calculation.rs`

use crate::error::{PhonfitError, Result};
use crate::models::DftResult;
use std::fs;
use std::path::Path;

/// 解析 VASP OUTCAR 文件
pub fn parse_outcar(path: &Path, structure_name: &str) -> Result<DftResult> {
    let content = fs::read_to_string(path).map_err(|e| PhonfitError::read(path, e))?;
    let mut result = parse_outcar_content(&content, structure_name);

    // 检查 CONTCAR 是否存在
    let contcar = path.parent().map(|p| p.join("CONTCAR"));
    if let Some(ref c) = contcar {
        if c.exists() && c.metadata().map(|m| m.len() > 0).unwrap_or(false) {
            result.structure_file = Some(c.display().to_string());
        }
    }

    Ok(result)
}

/// 从字符串内容解析 OUTCAR
pub fn parse_outcar_content(content: &str, structure_name: &str) -> DftResult {
    let mut result = DftResult::new(structure_name);

    let mut in_force_block = false;
    let mut block_rows: Vec<[f64; 3]> = Vec::new();
    let mut dash_lines = 0;

    for line in content.lines() {
        if in_force_block {
            if line.trim_start().starts_with("----") {
                dash_lines += 1;
                if dash_lines == 2 {
                    in_force_block = false;
                    result.forces = std::mem::take(&mut block_rows);
                }
                continue;
            }
            let values: Vec<f64> = line
                .split_whitespace()
                .filter_map(|s| s.parse().ok())
                .collect();
            if values.len() >= 6 {
                block_rows.push([values[3], values[4], values[5]]);
            }
            continue;
        }

        if line.contains("General timing and accounting informations for this job") {
            result.is_finished = true;
        }

        // "  POSITION                                       TOTAL-FORCE (eV/Angst)"
        if line.contains("TOTAL-FORCE") {
            in_force_block = true;
            dash_lines = 0;
            block_rows.clear();
            continue;
        }

        // "  energy  without entropy=     -123.456789  energy(sigma->0) =     -123.456789"
        if line.contains("energy  without entropy") {
            if let Some(pos) = line.find("energy(sigma->0)") {
                let rest = &line[pos..];
                if let Some(val) = extract_number_after(rest, "=") {
                    result.energy_ev = Some(val);
                }
            }
        }

        // "  volume of cell :      123.456789"
        if line.contains("volume of cell") {
            if let Some(val) = extract_last_number(line) {
                result.volume = Some(val);
            }
        }

        // "   NIONS =       8"
        if line.contains("NIONS =") {
            if let Some(val) = extract_last_number(line) {
                result.num_atoms = Some(val as usize);
            }
        }
    }

    result
}

/// 从字符串中提取指定标记之后的数字
fn extract_number_after(s: &str, marker: &str) -> Option<f64> {
    let pos = s.find(marker)?;
    let after = &s[pos + marker.len()..];
    after.split_whitespace().next()?.parse().ok()
}

/// 提取字符串中最后一个数字
fn extract_last_number(s: &str) -> Option<f64> {
    s.split_whitespace()
        .filter_map(|w| w.parse::<f64>().ok())
        .last()
}
