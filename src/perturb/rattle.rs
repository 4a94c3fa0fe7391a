//! # 原子随机扰动 (rattle)
//!
//! - 高斯扰动：每个笛卡尔分量独立取 N(0, σ²)
//! - Monte-Carlo 扰动：逐原子尝试高斯位移，拒绝使最近距离小于 `min_distance` 的移动
//!
//! ## 依赖关系
//! - 被 `perturb/mod.rs` 使用
//! - 使用 `rand`

use crate::models::Crystal;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// 扰动方式
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RattleMode {
    Gaussian,
    MonteCarlo { n_iter: usize },
}

/// 扰动参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RattleSettings {
    pub mode: RattleMode,

    /// 位移标准差 (Å)
    pub std_dev: f64,

    /// 基础随机种子；第 i 个结构使用 seed + i（溢出时回绕）
    pub seed: u64,

    /// Monte-Carlo 模式下允许的最小原子间距 (Å)
    pub min_distance: f64,
}

impl Default for RattleSettings {
    fn default() -> Self {
        RattleSettings {
            mode: RattleMode::Gaussian,
            std_dev: 0.01,
            seed: 42,
            min_distance: 1.5,
        }
    }
}

/// 标准正态分布采样 (Box-Muller)
pub(crate) fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn gaussian_vector(rng: &mut impl Rng, std_dev: f64) -> [f64; 3] {
    [
        standard_normal(rng) * std_dev,
        standard_normal(rng) * std_dev,
        standard_normal(rng) * std_dev,
    ]
}

/// 对结构施加随机扰动
pub fn rattle(structure: &Crystal, settings: &RattleSettings, seed: u64) -> Crystal {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rattled = structure.clone();

    match settings.mode {
        RattleMode::Gaussian => {
            for i in 0..rattled.num_atoms() {
                let v = gaussian_vector(&mut rng, settings.std_dev);
                rattled.displace_atom(i, v);
            }
        }
        RattleMode::MonteCarlo { n_iter } => {
            let mut rejected = 0usize;
            for _ in 0..n_iter {
                for i in 0..rattled.num_atoms() {
                    let original = rattled.atoms[i].position;
                    let v = gaussian_vector(&mut rng, settings.std_dev);
                    rattled.displace_atom(i, v);

                    let too_close = rattled
                        .min_distance_from(i)
                        .map_or(false, |d| d < settings.min_distance);
                    if too_close {
                        rattled.atoms[i].position = original;
                        rejected += 1;
                    }
                }
            }
            tracing::trace!(rejected, n_iter, "Monte-Carlo rattle finished");
        }
    }

    rattled
}
