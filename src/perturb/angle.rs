//! # 晶格角随机畸变
//!
//! 保持晶格常数与分数坐标，按百分比随机改变 α, β, γ；
//! 只接受最小原子间距不小于 `min_distance` 的候选结构。
//!
//! ## 依赖关系
//! - 被 `perturb/mod.rs` 使用
//! - 使用 `rand`

use crate::error::{PhonfitError, Result};
use crate::models::{Crystal, Lattice};
use rand::Rng;

/// 角度畸变参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleDistortion {
    /// 最大改变百分比
    pub percentage_scale: f64,
    /// 每个角的权重
    pub weights: [f64; 3],
    pub max_attempts: usize,
    pub min_distance: f64,
}

/// 生成一个角度畸变后的结构
pub fn distort_angles(
    structure: &Crystal,
    params: &AngleDistortion,
    rng: &mut impl Rng,
) -> Result<Crystal> {
    let [a, b, c] = structure.lattice.lengths();
    let angles = structure.lattice.angles();

    for attempt in 0..params.max_attempts {
        let mut new_angles = [0.0; 3];
        for k in 0..3 {
            let u: f64 = rng.gen_range(-1.0..=1.0);
            new_angles[k] = angles[k] * (1.0 + params.weights[k] * u * params.percentage_scale / 100.0);
        }

        let lattice = Lattice::from_parameters(a, b, c, new_angles[0], new_angles[1], new_angles[2]);
        if lattice.matrix.iter().flatten().any(|v| !v.is_finite()) || lattice.volume() <= 1e-6 {
            continue;
        }

        let candidate = structure.with_lattice(lattice);
        let ok = candidate
            .min_distance()
            .map_or(true, |d| d >= params.min_distance);
        if ok {
            tracing::trace!(attempt, ?new_angles, "Accepted angle distortion");
            return Ok(candidate);
        }
    }

    Err(PhonfitError::DistortionFailed {
        attempts: params.max_attempts,
        min_distance: params.min_distance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Atom;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn params() -> AngleDistortion {
        AngleDistortion {
            percentage_scale: 10.0,
            weights: [1.0, 1.0, 1.0],
            max_attempts: 1000,
            min_distance: 1.5,
        }
    }

    fn bcc() -> Crystal {
        Crystal::new(
            "Fe",
            Lattice::orthorhombic(2.87, 2.87, 2.87),
            vec![
                Atom::new("Fe", [0.0, 0.0, 0.0]),
                Atom::new("Fe", [0.5, 0.5, 0.5]),
            ],
        )
    }

    #[test]
    fn test_angles_change_lengths_do_not() {
        let s = bcc();
        let mut rng = StdRng::seed_from_u64(5);
        let d = distort_angles(&s, &params(), &mut rng).unwrap();

        let before = s.lattice.lengths();
        let after = d.lattice.lengths();
        for k in 0..3 {
            assert!((before[k] - after[k]).abs() < 1e-9);
        }
        let angles = d.lattice.angles();
        assert!(angles.iter().any(|a| (a - 90.0).abs() > 1e-6));
        assert!(angles.iter().all(|a| (a - 90.0).abs() <= 9.0 + 1e-6));
        assert_eq!(d.atoms[1].position, s.atoms[1].position);
    }

    #[test]
    fn test_unreachable_min_distance_fails() {
        let s = bcc();
        let mut rng = StdRng::seed_from_u64(5);
        let p = AngleDistortion {
            min_distance: 10.0,
            max_attempts: 20,
            ..params()
        };
        match distort_angles(&s, &p, &mut rng) {
            Err(PhonfitError::DistortionFailed { attempts, .. }) => assert_eq!(attempts, 20),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
