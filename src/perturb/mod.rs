//! # 结构扰动模块
//!
//! 为 DFT 标注生成随机结构：超胞 → 体积缩放 / 晶格角畸变 → 原子扰动。
//! 另提供孤立原子与二聚体结构。
//!
//! ## 依赖关系
//! - 被 `flow/execute.rs`, `makers/` 使用
//! - 子模块: volume, angle, rattle, clusters
//! - 使用 `rand`

pub mod angle;
pub mod clusters;
pub mod rattle;
pub mod volume;

pub use angle::{distort_angles, AngleDistortion};
pub use rattle::{rattle, RattleMode, RattleSettings};

use crate::error::{PhonfitError, Result};
use crate::models::structure::diagonal_matrix;
use crate::models::{Crystal, SupercellMatrix};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 由 `n_structures` 推导数量时的下限
pub const MIN_STRUCTURES: usize = 10;

/// 畸变方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DistortType {
    /// 体积缩放
    Volume,
    /// 晶格角畸变
    Angle,
    /// 体积缩放后对每个晶胞做一次角度畸变
    VolumeAndAngle,
}

impl TryFrom<u8> for DistortType {
    type Error = PhonfitError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(DistortType::Volume),
            1 => Ok(DistortType::Angle),
            2 => Ok(DistortType::VolumeAndAngle),
            other => Err(PhonfitError::InvalidArgument(format!(
                "distort_type must be 0, 1 or 2, got {}",
                other
            ))),
        }
    }
}

impl From<DistortType> for u8 {
    fn from(value: DistortType) -> u8 {
        match value {
            DistortType::Volume => 0,
            DistortType::Angle => 1,
            DistortType::VolumeAndAngle => 2,
        }
    }
}

impl fmt::Display for DistortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// 随机结构生成参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomizeSettings {
    pub supercell_matrix: SupercellMatrix,
    pub distort_type: DistortType,
    pub n_structures: usize,
    pub volume_scale_factor_range: [f64; 2],
    pub volume_custom_scale_factors: Option<Vec<f64>>,
    pub min_distance: f64,
    pub angle_percentage_scale: f64,
    pub angle_max_attempts: usize,
    pub w_angle: [f64; 3],
    pub rattle: RattleSettings,
}

impl Default for RandomizeSettings {
    fn default() -> Self {
        RandomizeSettings {
            supercell_matrix: diagonal_matrix([2, 2, 2]),
            distort_type: DistortType::Volume,
            n_structures: MIN_STRUCTURES,
            volume_scale_factor_range: [0.90, 1.10],
            volume_custom_scale_factors: None,
            min_distance: 1.5,
            angle_percentage_scale: 10.0,
            angle_max_attempts: 1000,
            w_angle: [1.0, 1.0, 1.0],
            rattle: RattleSettings::default(),
        }
    }
}

impl RandomizeSettings {
    /// 将生成的结构数
    pub fn expected_count(&self) -> usize {
        match (self.distort_type, &self.volume_custom_scale_factors) {
            (DistortType::Volume | DistortType::VolumeAndAngle, Some(custom)) => custom.len(),
            _ => self.n_structures.max(MIN_STRUCTURES),
        }
    }

    fn angle_params(&self) -> AngleDistortion {
        AngleDistortion {
            percentage_scale: self.angle_percentage_scale,
            weights: self.w_angle,
            max_attempts: self.angle_max_attempts,
            min_distance: self.min_distance,
        }
    }
}

/// 生成随机结构
pub fn generate_randomized_structures(
    structure: &Crystal,
    settings: &RandomizeSettings,
) -> Result<Vec<Crystal>> {
    let supercell = structure.make_supercell(&settings.supercell_matrix)?;
    let count = settings.expected_count();
    let mut rng = StdRng::seed_from_u64(settings.rattle.seed);

    let distorted = match settings.distort_type {
        DistortType::Volume | DistortType::VolumeAndAngle => {
            let factors = volume::volume_scale_factors(
                settings.volume_scale_factor_range,
                count,
                settings.volume_custom_scale_factors.as_deref(),
            )?;
            let scaled = volume::scale_cell(&supercell, &factors)?;
            if settings.distort_type == DistortType::Volume {
                scaled
            } else {
                let params = settings.angle_params();
                scaled
                    .iter()
                    .map(|cell| distort_angles(cell, &params, &mut rng))
                    .collect::<Result<Vec<_>>>()?
            }
        }
        DistortType::Angle => {
            let params = settings.angle_params();
            (0..count)
                .map(|_| distort_angles(&supercell, &params, &mut rng))
                .collect::<Result<Vec<_>>>()?
        }
    };

    let structures: Vec<Crystal> = distorted
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let seed = settings.rattle.seed.wrapping_add(i as u64);
            let mut rattled = rattle(cell, &settings.rattle, seed);
            rattled.name = format!("{}_rand_{}", structure.name, i + 1);
            rattled
        })
        .collect();

    tracing::debug!(
        structure = %structure.name,
        distort_type = %settings.distort_type,
        count = structures.len(),
        "Generated randomized structures"
    );

    Ok(structures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Atom, Lattice};

    fn silicon() -> Crystal {
        Crystal::new(
            "Si",
            Lattice::from_vectors([[0.0, 2.73, 2.73], [2.73, 0.0, 2.73], [2.73, 2.73, 0.0]]),
            vec![
                Atom::new("Si", [0.0, 0.0, 0.0]),
                Atom::new("Si", [0.25, 0.25, 0.25]),
            ],
        )
    }

    #[test]
    fn test_volume_custom_factors_one_per_factor() {
        let settings = RandomizeSettings {
            volume_custom_scale_factors: Some(vec![0.975, 1.0, 1.025, 1.05]),
            ..Default::default()
        };
        let s = generate_randomized_structures(&silicon(), &settings).unwrap();
        assert_eq!(s.len(), 4);
        assert_eq!(s[0].num_atoms(), 16);
        let base = silicon().volume() * 8.0;
        assert!((s[0].volume() - base * 0.975).abs() < 1e-6);
        assert!((s[3].volume() - base * 1.05).abs() < 1e-6);
    }

    #[test]
    fn test_angle_distortion_has_minimum_count() {
        let settings = RandomizeSettings {
            distort_type: DistortType::Angle,
            n_structures: 3,
            volume_custom_scale_factors: Some(vec![1.0]),
            ..Default::default()
        };
        assert_eq!(settings.expected_count(), 10);
        let s = generate_randomized_structures(&silicon(), &settings).unwrap();
        assert_eq!(s.len(), 10);
        assert!(s.iter().all(|c| c.min_distance().unwrap() >= 1.5 - 0.1));
    }

    #[test]
    fn test_volume_and_angle_with_custom_factors() {
        let settings = RandomizeSettings {
            distort_type: DistortType::VolumeAndAngle,
            volume_custom_scale_factors: Some(vec![1.0, 1.0]),
            ..Default::default()
        };
        let s = generate_randomized_structures(&silicon(), &settings).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s[1].name, "Si_rand_2");
    }

    #[test]
    fn test_range_uses_n_structures() {
        let settings = RandomizeSettings {
            n_structures: 12,
            ..Default::default()
        };
        assert_eq!(generate_randomized_structures(&silicon(), &settings).unwrap().len(), 12);
    }

    #[test]
    fn test_distort_type_conversion() {
        assert_eq!(DistortType::try_from(2).unwrap(), DistortType::VolumeAndAngle);
        assert!(DistortType::try_from(3).is_err());
        let json = serde_json::to_string(&DistortType::Angle).unwrap();
        assert_eq!(json, "1");
    }

    #[test]
    fn test_seed_near_max_wraps() {
        let mut settings = RandomizeSettings::default();
        settings.rattle.seed = u64::MAX - 2;
        assert_eq!(generate_randomized_structures(&silicon(), &settings).unwrap().len(), 10);
    }

    #[test]
    fn test_out_of_cell_coordinates() {
        let crystal = Crystal::new(
            "Si",
            Lattice::orthorhombic(5.43, 5.43, 5.43),
            vec![
                Atom::new("Si", [0.0, 0.0, 0.0]),
                Atom::new("Si", [1.0, 0.5, -0.25]),
            ],
        );
        let structures = generate_randomized_structures(&crystal, &RandomizeSettings::default()).unwrap();
        assert_eq!(structures.len(), 10);
        assert!(structures.iter().all(|s| s.num_atoms() == 16));
    }

    #[test]
    fn test_deterministic_for_same_seed() {
        let settings = RandomizeSettings::default();
        let a = generate_randomized_structures(&silicon(), &settings).unwrap();
        let b = generate_randomized_structures(&silicon(), &settings).unwrap();
        assert_eq!(a, b);
    }
}
