//! # 元素周期表
//!
//! 元素符号与原子序数的对应关系。
//!
//! ## 依赖关系
//! - 被 `models/structure.rs`, `dataset.rs`, `makers/` 使用
//! - 无外部模块依赖

use crate::error::{PhonfitError, Result};

const SYMBOLS: [&str; 118] = [
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S", "Cl",
    "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge", "As",
    "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In",
    "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd", "Tb",
    "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg", "Tl",
    "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm", "Bk",
    "Cf", "Es", "Fm", "Md", "No", "Lr", "Rf", "Db", "Sg", "Bh", "Hs", "Mt", "Ds", "Rg", "Cn", "Nh",
    "Fl", "Mc", "Lv", "Ts", "Og",
];

/// 元素符号对应的原子序数
pub fn atomic_number(symbol: &str) -> Option<u32> {
    SYMBOLS
        .iter()
        .position(|s| *s == symbol)
        .map(|idx| idx as u32 + 1)
}

/// 原子序数对应的元素符号
pub fn symbol_for(z: u32) -> Option<&'static str> {
    if z == 0 {
        return None;
    }
    SYMBOLS.get(z as usize - 1).copied()
}

/// 规范化元素符号
///
/// 去掉价态标记并修正大小写，例如 `"cl"`, `"Cl-"`, `"Fe2+"`。
pub fn normalize_symbol(raw: &str) -> Result<String> {
    let letters: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();

    let mut chars = letters.chars();
    let symbol = match chars.next() {
        Some(first) => {
            let mut s = first.to_ascii_uppercase().to_string();
            s.push_str(&chars.as_str().to_ascii_lowercase());
            s
        }
        None => return Err(PhonfitError::UnknownElement(raw.to_string())),
    };

    if atomic_number(&symbol).is_some() {
        Ok(symbol)
    } else {
        Err(PhonfitError::UnknownElement(raw.to_string()))
    }
}
