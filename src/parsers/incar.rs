//! # VASP INCAR 解析器
//!
//! 读写 INCAR 文件，以及解析命令行 `KEY=VALUE` 覆盖。
//!
//! ## 依赖关系
//! - 被 `flow/calculator.rs`, `cli/`, `commands/` 使用
//! - 使用 `models/incar.rs`

use crate::error::{PhonfitError, Result};
use crate::models::{IncarSettings, IncarUpdates, IncarValue};
use regex::Regex;
use std::fs;
use std::path::Path;

/// 解析 INCAR 文件
pub fn parse_incar_file(path: &Path) -> Result<IncarSettings> {
    let content = fs::read_to_string(path).map_err(|e| PhonfitError::read(path, e))?;
    parse_incar_content(&content, &path.display().to_string())
}

/// 从字符串内容解析 INCAR
pub fn parse_incar_content(content: &str, source: &str) -> Result<IncarSettings> {
    let pattern = Regex::new(r"^\s*([A-Za-z][A-Za-z0-9_]*)\s*=\s*(.*?)\s*$").map_err(|e| {
        PhonfitError::Other(format!("Invalid INCAR pattern: {}", e))
    })?;

    let mut settings = IncarSettings::new();

    for (lineno, line) in content.lines().enumerate() {
        let line = strip_comment(line);
        for statement in line.split(';') {
            if statement.trim().is_empty() {
                continue;
            }
            let caps = pattern
                .captures(statement)
                .ok_or_else(|| PhonfitError::ParseError {
                    format: "incar".to_string(),
                    path: source.to_string(),
                    reason: format!("Cannot parse line {}: '{}'", lineno + 1, statement.trim()),
                })?;
            settings.set(&caps[1], IncarValue::parse(&caps[2]));
        }
    }

    Ok(settings)
}

fn strip_comment(line: &str) -> &str {
    match line.find(['#', '!']) {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// 将参数集合写成 INCAR 文本
pub fn to_incar_string(settings: &IncarSettings) -> String {
    settings
        .iter()
        .map(|(key, value)| format!("{} = {}\n", key, value))
        .collect()
}

/// 写出 INCAR 文件
pub fn write_incar_file(settings: &IncarSettings, path: &Path) -> Result<()> {
    fs::write(path, to_incar_string(settings)).map_err(|e| PhonfitError::write(path, e))
}

/// 解析命令行覆盖 `KEY=VALUE`；`KEY=` 或 `KEY=None` 表示删除
pub fn parse_assignment(raw: &str) -> Result<(String, Option<IncarValue>)> {
    let (key, value) = raw.split_once('=').ok_or_else(|| {
        PhonfitError::InvalidArgument(format!("Expected KEY=VALUE, got '{}'", raw))
    })?;

    let key = key.trim();
    if key.is_empty() {
        return Err(PhonfitError::InvalidArgument(format!(
            "Empty INCAR key in '{}'",
            raw
        )));
    }

    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        Ok((key.to_uppercase(), None))
    } else {
        Ok((key.to_uppercase(), Some(IncarValue::parse(value))))
    }
}

/// 将多条 `KEY=VALUE` 合并为覆盖集合
pub fn parse_assignments(items: &[String]) -> Result<IncarUpdates> {
    let mut updates = IncarUpdates::new();
    for item in items {
        let (key, value) = parse_assignment(item)?;
        updates.insert(&key, value);
    }
    Ok(updates)
}
