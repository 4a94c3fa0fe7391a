//! # 扩展 XYZ 格式
//!
//! 写出（及读回）带能量、受力与 `config_type` 标签的训练数据帧。
//!
//! ## 格式说明
//! ```text
//! 2
//! Lattice="a1 a2 a3 b1 b2 b3 c1 c2 c3" Properties=species:S:1:pos:R:3:forces:R:3 energy=-10.8 config_type=bulk pbc="T T T"
//! Si  0.0 0.0 0.0  0.0 0.0 0.0
//! Si  1.3 1.3 1.3  0.0 0.0 0.0
//! ```
//!
//! ## 依赖关系
//! - 被 `dataset.rs`, `makers/testing.rs` 使用
//! - 使用 `models/structure.rs`

use crate::error::{PhonfitError, Result};
use crate::models::{Atom, Crystal, Lattice};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// 带标签的训练数据帧
#[derive(Debug, Clone, PartialEq)]
pub struct LabelledFrame {
    pub structure: Crystal,
    pub energy: f64,
    pub forces: Vec<[f64; 3]>,
    pub config_type: String,
}

impl LabelledFrame {
    /// 最大原子受力模长 (eV/Å)
    pub fn max_force(&self) -> f64 {
        self.forces
            .iter()
            .map(|f| (f[0] * f[0] + f[1] * f[1] + f[2] * f[2]).sqrt())
            .fold(0.0, f64::max)
    }
}

/// 将多帧写成扩展 XYZ 文本
pub fn to_extxyz_string(frames: &[LabelledFrame]) -> String {
    let mut out = String::new();

    for frame in frames {
        let s = &frame.structure;
        let m = s.lattice.matrix;
        out.push_str(&format!("{}\n", s.num_atoms()));
        out.push_str(&format!(
            "Lattice=\"{:.8} {:.8} {:.8} {:.8} {:.8} {:.8} {:.8} {:.8} {:.8}\" \
             Properties=species:S:1:pos:R:3:forces:R:3 energy={:.8} config_type={} pbc=\"T T T\"\n",
            m[0][0], m[0][1], m[0][2], m[1][0], m[1][1], m[1][2], m[2][0], m[2][1], m[2][2],
            frame.energy,
            frame.config_type,
        ));

        for (i, (atom, pos)) in s.atoms.iter().zip(s.cart_positions()).enumerate() {
            let f = frame.forces.get(i).copied().unwrap_or([0.0; 3]);
            out.push_str(&format!(
                "{:<3} {:14.8} {:14.8} {:14.8} {:14.8} {:14.8} {:14.8}\n",
                atom.element, pos[0], pos[1], pos[2], f[0], f[1], f[2]
            ));
        }
    }

    out
}

/// 写出扩展 XYZ 文件
pub fn write_extxyz_file(frames: &[LabelledFrame], path: &Path) -> Result<()> {
    fs::write(path, to_extxyz_string(frames)).map_err(|e| PhonfitError::write(path, e))
}

/// 读取扩展 XYZ 文件
pub fn parse_extxyz_file(path: &Path) -> Result<Vec<LabelledFrame>> {
    let content = fs::read_to_string(path).map_err(|e| PhonfitError::read(path, e))?;
    parse_extxyz_content(&content, &path.display().to_string())
}

/// 从字符串解析扩展 XYZ（只支持本模块写出的列布局）
pub fn parse_extxyz_content(content: &str, source: &str) -> Result<Vec<LabelledFrame>> {
    let err = |reason: String| PhonfitError::ParseError {
        format: "extxyz".to_string(),
        path: source.to_string(),
        reason,
    };

    let lines: Vec<&str> = content.lines().collect();
    let mut frames = Vec::new();
    let mut idx = 0;

    while idx < lines.len() {
        if lines[idx].trim().is_empty() {
            idx += 1;
            continue;
        }

        let n: usize = lines[idx]
            .trim()
            .parse()
            .map_err(|_| err(format!("Expected atom count at line {}", idx + 1)))?;
        let header = lines
            .get(idx + 1)
            .ok_or_else(|| err("Missing comment line".to_string()))?;
        let info = parse_info_line(header);

        let lattice_values: Vec<f64> = info
            .get("Lattice")
            .ok_or_else(|| err(format!("Missing Lattice at line {}", idx + 2)))?
            .split_whitespace()
            .filter_map(|v| v.parse().ok())
            .collect();
        if lattice_values.len() != 9 {
            return Err(err(format!("Malformed Lattice at line {}", idx + 2)));
        }
        let lattice = Lattice::from_vectors([
            [lattice_values[0], lattice_values[1], lattice_values[2]],
            [lattice_values[3], lattice_values[4], lattice_values[5]],
            [lattice_values[6], lattice_values[7], lattice_values[8]],
        ]);

        let energy = info
            .get("energy")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| err(format!("Missing energy at line {}", idx + 2)))?;
        let config_type = info.get("config_type").cloned().unwrap_or_default();

        let mut atoms = Vec::with_capacity(n);
        let mut forces = Vec::with_capacity(n);
        for k in 0..n {
            let row = lines
                .get(idx + 2 + k)
                .ok_or_else(|| err(format!("Frame truncated after {} atoms", k)))?;
            let parts: Vec<&str> = row.split_whitespace().collect();
            if parts.len() < 7 {
                return Err(err(format!("Malformed atom line {}", idx + 3 + k)));
            }
            let nums: Vec<f64> = parts[1..7].iter().filter_map(|v| v.parse().ok()).collect();
            if nums.len() != 6 {
                return Err(err(format!("Malformed atom line {}", idx + 3 + k)));
            }
            atoms.push(Atom::new(
                parts[0],
                lattice.cart_to_frac([nums[0], nums[1], nums[2]]),
            ));
            forces.push([nums[3], nums[4], nums[5]]);
        }

        frames.push(LabelledFrame {
            structure: Crystal::new(format!("frame-{}", frames.len()), lattice, atoms),
            energy,
            forces,
            config_type,
        });
        idx += n + 2;
    }

    Ok(frames)
}

/// 解析注释行中的 key=value / key="quoted value"
fn parse_info_line(line: &str) -> BTreeMap<String, String> {
    let mut info = BTreeMap::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.peek().map_or(false, |c| c.is_whitespace()) {
            chars.next();
        }
        let key: String = chars
            .by_ref()
            .take_while(|c| *c != '=')
            .collect();
        if key.is_empty() {
            break;
        }

        let value: String = if chars.peek() == Some(&'"') {
            chars.next();
            chars.by_ref().take_while(|c| *c != '"').collect()
        } else {
            chars.by_ref().take_while(|c| !c.is_whitespace()).collect()
        };

        info.insert(key.trim().to_string(), value);
    }

    info
}
