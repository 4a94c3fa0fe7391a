//! # VASP POSCAR 格式解析器
//!
//! 解析与写出 VASP POSCAR/CONTCAR 文件格式。
//!
//! ## POSCAR 格式说明
//! ```text
//! Comment line (structure name)
//! 1.0                    # scaling factor
//! a1 a2 a3               # lattice vector a
//! b1 b2 b3               # lattice vector b
//! c1 c2 c3               # lattice vector c
//! Element1 Element2 ...  # element symbols (VASP 5+)
//! n1 n2 ...              # number of atoms per element
//! Selective dynamics     # optional
//! Direct/Cartesian       # coordinate type
//! x1 y1 z1               # atom positions
//! ...
//! ```
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs`, `flow/calculator.rs`, `commands/` 使用
//! - 使用 `models/structure.rs`

use crate::error::{PhonfitError, Result};
use crate::models::structure::wrap_fractional;
use crate::models::{Atom, Crystal, Lattice};
use std::fs;
use std::path::Path;

/// 解析 POSCAR/CONTCAR 文件
pub fn parse_poscar_file(path: &Path) -> Result<Crystal> {
    let content = fs::read_to_string(path).map_err(|e| PhonfitError::read(path, e))?;

    parse_poscar_content(
        &content,
        path.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown"),
    )
}

/// 写出 POSCAR 文件
pub fn write_poscar_file(crystal: &Crystal, path: &Path) -> Result<()> {
    fs::write(path, to_poscar_string(crystal)).map_err(|e| PhonfitError::write(path, e))
}

fn parse_error(name: &str, reason: impl Into<String>) -> PhonfitError {
    PhonfitError::ParseError {
        format: "poscar".to_string(),
        path: name.to_string(),
        reason: reason.into(),
    }
}

/// 从字符串内容解析 POSCAR 格式
pub fn parse_poscar_content(content: &str, default_name: &str) -> Result<Crystal> {
    let lines: Vec<&str> = content.lines().collect();

    if lines.len() < 8 {
        return Err(parse_error(default_name, "File too short"));
    }

    // Line 0: Comment/name
    let name = lines[0].trim().to_string();
    let name = if name.is_empty() {
        default_name.to_string()
    } else {
        name
    };

    // Line 1: 缩放因子；负值表示目标体积
    let scale: f64 = lines[1]
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1.0);

    // Lines 2-4: Lattice vectors
    let mut matrix = [[0.0; 3]; 3];
    for i in 0..3 {
        let parts: Vec<f64> = lines[2 + i]
            .split_whitespace()
            .filter_map(|s| s.parse().ok())
            .collect();
        if parts.len() < 3 {
            return Err(parse_error(
                &name,
                format!("Invalid lattice vector at line {}", 3 + i),
            ));
        }
        matrix[i] = [parts[0], parts[1], parts[2]];
    }
    let raw_lattice = Lattice::from_vectors(matrix);
    let linear = if scale < 0.0 {
        (scale.abs() / raw_lattice.volume().abs()).cbrt()
    } else {
        scale
    };
    let lattice = raw_lattice.scaled(linear);

    // Line 5: Element symbols (VASP 5+) or atom counts (VASP 4)
    let line5_parts: Vec<&str> = lines[5].split_whitespace().collect();
    if line5_parts.is_empty() {
        return Err(parse_error(&name, "Missing species line"));
    }
    let (elements, counts, atom_line_start) = if line5_parts[0].parse::<i32>().is_ok() {
        // VASP 4: 尝试从注释行读取元素符号
        let counts: Vec<usize> = line5_parts.iter().filter_map(|s| s.parse().ok()).collect();
        let from_comment: Vec<String> = name
            .split_whitespace()
            .take(counts.len())
            .map(|s| s.to_string())
            .collect();
        let elements = if from_comment.len() == counts.len()
            && from_comment
                .iter()
                .all(|s| crate::models::element::atomic_number(s).is_some())
        {
            from_comment
        } else {
            (0..counts.len()).map(|i| format!("X{}", i + 1)).collect()
        };
        (elements, counts, 6)
    } else {
        let elements: Vec<String> = line5_parts
            .iter()
            .map(|s| s.split('/').next().unwrap_or(s).to_string())
            .collect();
        let counts: Vec<usize> = lines[6]
            .split_whitespace()
            .filter_map(|s| s.parse().ok())
            .collect();
        (elements, counts, 7)
    };

    if elements.len() != counts.len() {
        return Err(parse_error(
            &name,
            format!(
                "{} element symbols but {} atom counts",
                elements.len(),
                counts.len()
            ),
        ));
    }

    // Check for "Selective dynamics" line
    let mut coord_line = atom_line_start;
    if lines.len() > coord_line
        && lines[coord_line]
            .trim()
            .to_lowercase()
            .starts_with('s')
    {
        coord_line += 1;
    }

    if lines.len() <= coord_line {
        return Err(parse_error(&name, "Missing coordinate type line"));
    }

    let coord_type = lines[coord_line].trim().to_lowercase();
    let is_cartesian = coord_type.starts_with('c') || coord_type.starts_with('k');

    let mut atoms: Vec<Atom> = Vec::new();
    let mut line_idx = coord_line + 1;

    for (elem, &count) in elements.iter().zip(counts.iter()) {
        for _ in 0..count {
            if line_idx >= lines.len() {
                break;
            }
            let parts: Vec<f64> = lines[line_idx]
                .split_whitespace()
                .take(3)
                .filter_map(|s| s.parse().ok())
                .collect();

            if parts.len() >= 3 {
                let position = if is_cartesian {
                    lattice.cart_to_frac([parts[0] * linear, parts[1] * linear, parts[2] * linear])
                } else {
                    [parts[0], parts[1], parts[2]]
                };
                atoms.push(Atom::new(elem.clone(), wrap_fractional(position)));
            }
            line_idx += 1;
        }
    }

    let expected: usize = counts.iter().sum();
    if atoms.len() != expected {
        return Err(parse_error(
            &name,
            format!("Expected {} atoms, found {}", expected, atoms.len()),
        ));
    }

    let mut crystal = Crystal::new(name, lattice, atoms);
    crystal.source_format = Some("poscar".to_string());

    Ok(crystal)
}

/// POSCAR 写出时的原子顺序（同种元素连续，按首次出现排列）
///
/// 返回值第 k 项为写出的第 k 个原子在 `crystal.atoms` 中的序号。
pub fn write_order(crystal: &Crystal) -> Vec<usize> {
    let species = crystal.species();
    species
        .iter()
        .flat_map(|elem| {
            crystal
                .atoms
                .iter()
                .enumerate()
                .filter(move |(_, a)| &a.element == elem)
                .map(|(i, _)| i)
        })
        .collect()
}

/// 将 Crystal 转换为 POSCAR 格式字符串
///
/// 原子按 [`write_order`] 的顺序写出，与 POTCAR 拼接顺序一致。
pub fn to_poscar_string(crystal: &Crystal) -> String {
    let species = crystal.species();

    let mut result = String::new();

    result.push_str(&format!("{}\n", crystal.name));
    result.push_str("1.0\n");

    for row in &crystal.lattice.matrix {
        result.push_str(&format!(
            "  {:16.10}  {:16.10}  {:16.10}\n",
            row[0], row[1], row[2]
        ));
    }

    result.push_str(&format!("   {}\n", species.join("   ")));

    let counts: Vec<String> = species
        .iter()
        .map(|e| {
            crystal
                .atoms
                .iter()
                .filter(|a| &a.element == e)
                .count()
                .to_string()
        })
        .collect();
    result.push_str(&format!("   {}\n", counts.join("   ")));

    result.push_str("Direct\n");

    for idx in write_order(crystal) {
        let pos = crystal.atoms[idx].position;
        result.push_str(&format!(
            "  {:16.10}  {:16.10}  {:16.10}\n",
            pos[0], pos[1], pos[2]
        ));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_poscar_vasp5() {
        let content = r#"NaCl
1.0
5.64 0.0 0.0
0.0 5.64 0.0
0.0 0.0 5.64
Na Cl
4 4
Direct
0.0 0.0 0.0
0.5 0.5 0.0
0.5 0.0 0.5
0.0 0.5 0.5
0.5 0.0 0.0
0.0 0.5 0.0
0.0 0.0 0.5
0.5 0.5 0.5
"#;
        let crystal = parse_poscar_content(content, "NaCl").unwrap();
        assert_eq!(crystal.name, "NaCl");
        assert_eq!(crystal.atoms.len(), 8);

        let na_count = crystal.atoms.iter().filter(|a| a.element == "Na").count();
        let cl_count = crystal.atoms.iter().filter(|a| a.element == "Cl").count();
        assert_eq!(na_count, 4);
        assert_eq!(cl_count, 4);
    }

    #[test]
    fn test_parse_poscar_with_scale() {
        let content = r#"Si
2.0
2.0 0.0 0.0
0.0 2.0 0.0
0.0 0.0 2.0
Si
2
Direct
0.0 0.0 0.0
0.5 0.5 0.5
"#;
        let crystal = parse_poscar_content(content, "Si").unwrap();
        let (a, _, _, _, _, _) = crystal.lattice.parameters();

        assert!((a - 4.0).abs() < 0.01);
    }

    #[test]
    fn test_parse_poscar_cartesian_fcc() {
        let content = r#"Si fcc
1.0
0.0 2.73 2.73
2.73 0.0 2.73
2.73 2.73 0.0
Si
2
Cartesian
0.0 0.0 0.0
1.365 1.365 1.365
"#;
        let crystal = parse_poscar_content(content, "Si").unwrap();
        let pos = crystal.atoms[1].position;
        for v in pos {
            assert!((v - 0.25).abs() < 1e-9, "got {:?}", pos);
        }
    }

    #[test]
    fn test_parse_poscar_vasp4_symbols_from_comment() {
        let content = r#"Ga As
5.65
1.0 0.0 0.0
0.0 1.0 0.0
0.0 0.0 1.0
1 1
Direct
0.0 0.0 0.0
0.25 0.25 0.25
"#;
        let crystal = parse_poscar_content(content, "GaAs").unwrap();
        assert_eq!(crystal.species(), vec!["Ga".to_string(), "As".to_string()]);
    }

    #[test]
    fn test_parse_poscar_missing_atoms() {
        let content = r#"Si
1.0
5.0 0.0 0.0
0.0 5.0 0.0
0.0 0.0 5.0
Si
3
Direct
0.0 0.0 0.0
0.5 0.5 0.5
"#;
        assert!(parse_poscar_content(content, "Si").is_err());
    }

    #[test]
    fn test_poscar_round_trip_groups_species() {
        let lattice = Lattice::from_vectors([[4.0, 0.0, 0.0], [0.0, 4.0, 0.0], [0.0, 0.0, 4.0]]);
        let atoms = vec![
            Atom::new("Ti", [0.0, 0.0, 0.0]),
            Atom::new("O", [0.5, 0.5, 0.0]),
            Atom::new("Ti", [0.5, 0.5, 0.5]),
            Atom::new("O", [0.5, 0.0, 0.5]),
        ];
        let crystal = Crystal::new("TiO2", lattice, atoms);

        let poscar_str = to_poscar_string(&crystal);
        let parsed = parse_poscar_content(&poscar_str, "round_trip").unwrap();

        assert_eq!(parsed.species(), vec!["Ti".to_string(), "O".to_string()]);
        assert_eq!(parsed.atoms[1].element, "Ti");
        assert_eq!(parsed.atoms[1].position, [0.5, 0.5, 0.5]);
        assert_eq!(write_order(&crystal), vec![0, 2, 1, 3]);
    }

    #[test]
    fn test_parse_poscar_wraps_coordinates() {
        let content = r#"Si
1.0
5.43 0.0 0.0
0.0 5.43 0.0
0.0 0.0 5.43
Si
2
Direct
1.0 0.5 -0.25
0.25 0.25 1.25
"#;
        let crystal = parse_poscar_content(content, "Si").unwrap();
        let p0 = crystal.atoms[0].position;
        assert!(p0[0].abs() < 1e-12);
        assert!((p0[2] - 0.75).abs() < 1e-12);
        assert!((crystal.atoms[1].position[2] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_parse_poscar_selective_dynamics() {
        let content = r#"Fe with selective
1.0
2.87 0.0 0.0
0.0 2.87 0.0
0.0 0.0 2.87
Fe
2
Selective dynamics
Direct
0.0 0.0 0.0 T T T
0.5 0.5 0.5 F F F
"#;
        let crystal = parse_poscar_content(content, "Fe").unwrap();
        assert_eq!(crystal.atoms.len(), 2);
    }
}
