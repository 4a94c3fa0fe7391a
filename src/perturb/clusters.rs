//! # 孤立原子与二聚体
//!
//! 为 E0 参考能与短程排斥数据生成孤立原子和二聚体结构。
//!
//! ## 依赖关系
//! - 被 `makers/labelling.rs`, `makers/iso_atom.rs` 使用

use super::volume::linspace;
use crate::models::Crystal;

/// 默认孤立原子盒子（略微非立方，避免对称性退化）
pub const DEFAULT_ISOLATED_BOX: [f64; 3] = [20.0, 20.5, 21.0];

/// 默认二聚体盒子
pub const DEFAULT_DIMER_BOX: [f64; 3] = [15.0, 15.5, 16.0];

/// 每个元素一个孤立原子
pub fn isolated_atoms(species: &[String], cell: [f64; 3]) -> Vec<Crystal> {
    species
        .iter()
        .map(|el| Crystal::isolated_atom(el, cell))
        .collect()
}

/// 元素两两组合（含同种元素），按输入顺序
pub fn dimer_pairs(species: &[String]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for i in 0..species.len() {
        for j in i..species.len() {
            pairs.push((species[i].clone(), species[j].clone()));
        }
    }
    pairs
}

/// 二聚体：每个元素对在 `range` 内均匀取 `num` 个键长
pub fn dimers(species: &[String], cell: [f64; 3], range: [f64; 2], num: usize) -> Vec<Crystal> {
    let distances = linspace(range[0], range[1], num);
    dimer_pairs(species)
        .iter()
        .flat_map(|(a, b)| {
            distances
                .iter()
                .map(move |&d| Crystal::dimer(a, b, d, cell))
        })
        .collect()
}
