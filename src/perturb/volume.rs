//! # 体积缩放
//!
//! ## 依赖关系
//! - 被 `perturb/mod.rs` 使用

use crate::error::{PhonfitError, Result};
use crate::models::Crystal;

/// 体积缩放因子：给定自定义列表时原样使用，否则在区间内均匀取 `n` 个点（含端点）
pub fn volume_scale_factors(range: [f64; 2], n: usize, custom: Option<&[f64]>) -> Result<Vec<f64>> {
    if let Some(custom) = custom {
        if custom.is_empty() {
            return Err(PhonfitError::InvalidArgument(
                "volume_custom_scale_factors must not be empty".to_string(),
            ));
        }
        return Ok(custom.to_vec());
    }

    if range[0] > range[1] {
        return Err(PhonfitError::InvalidArgument(format!(
            "Invalid volume scale factor range [{}, {}]",
            range[0], range[1]
        )));
    }

    Ok(linspace(range[0], range[1], n))
}

/// 闭区间上的等间距序列
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// 按每个因子缩放晶胞体积
pub fn scale_cell(structure: &Crystal, factors: &[f64]) -> Result<Vec<Crystal>> {
    factors.iter().map(|&f| structure.scale_volume(f)).collect()
}
