//! # 晶体结构数据模型
//!
//! 定义统一的晶体结构表示，以及扰动生成所需的几何操作
//! （超胞、体积缩放、最小像距离、孤立原子与二聚体盒子）。
//!
//! ## 依赖关系
//! - 被 `parsers/`, `perturb/`, `makers/` 使用
//! - 使用 `models/element.rs`

use crate::error::{PhonfitError, Result};
use serde::{Deserialize, Serialize};

/// 整数超胞矩阵（行向量表示新晶格向量）
pub type SupercellMatrix = [[i32; 3]; 3];

/// 晶格参数表示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    /// 晶格向量矩阵 (3x3)，行向量表示 a, b, c
    /// [[a1, a2, a3], [b1, b2, b3], [c1, c2, c3]]
    pub matrix: [[f64; 3]; 3],
}

impl Lattice {
    /// 从晶格参数 (a, b, c, alpha, beta, gamma) 创建晶格
    /// 角度单位：度
    pub fn from_parameters(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        let alpha_rad = alpha.to_radians();
        let beta_rad = beta.to_radians();
        let gamma_rad = gamma.to_radians();

        let cos_alpha = alpha_rad.cos();
        let cos_beta = beta_rad.cos();
        let cos_gamma = gamma_rad.cos();
        let sin_gamma = gamma_rad.sin();

        let a_vec = [a, 0.0, 0.0];
        let b_vec = [b * cos_gamma, b * sin_gamma, 0.0];

        let c1 = c * cos_beta;
        let c2 = c * (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
        let c3 = (c * c - c1 * c1 - c2 * c2).sqrt();
        let c_vec = [c1, c2, c3];

        Lattice {
            matrix: [a_vec, b_vec, c_vec],
        }
    }

    /// 从晶格向量矩阵创建
    pub fn from_vectors(matrix: [[f64; 3]; 3]) -> Self {
        Lattice { matrix }
    }

    /// 正交盒子
    pub fn orthorhombic(a: f64, b: f64, c: f64) -> Self {
        Lattice::from_vectors([[a, 0.0, 0.0], [0.0, b, 0.0], [0.0, 0.0, c]])
    }

    /// 晶格常数 (a, b, c)
    pub fn lengths(&self) -> [f64; 3] {
        [
            norm(self.matrix[0]),
            norm(self.matrix[1]),
            norm(self.matrix[2]),
        ]
    }

    /// 晶格角 (alpha, beta, gamma)，单位：度
    pub fn angles(&self) -> [f64; 3] {
        let [a, b, c] = self.matrix;
        [
            angle_between(b, c),
            angle_between(a, c),
            angle_between(a, b),
        ]
    }

    /// 获取晶格参数 (a, b, c, alpha, beta, gamma)
    pub fn parameters(&self) -> (f64, f64, f64, f64, f64, f64) {
        let [a, b, c] = self.lengths();
        let [alpha, beta, gamma] = self.angles();
        (a, b, c, alpha, beta, gamma)
    }

    /// 计算晶格体积
    pub fn volume(&self) -> f64 {
        det3(&self.matrix)
    }

    /// 三个方向的面间距（垂直宽度）
    pub fn perpendicular_widths(&self) -> [f64; 3] {
        let [a, b, c] = self.matrix;
        let vol = self.volume().abs();
        [
            vol / norm(cross(b, c)),
            vol / norm(cross(a, c)),
            vol / norm(cross(a, b)),
        ]
    }

    /// 晶格矩阵的逆
    pub fn inverse(&self) -> Option<[[f64; 3]; 3]> {
        invert3(&self.matrix)
    }

    /// 按线性因子缩放晶格向量
    pub fn scaled(&self, factor: f64) -> Self {
        let mut matrix = self.matrix;
        for row in matrix.iter_mut() {
            for v in row.iter_mut() {
                *v *= factor;
            }
        }
        Lattice { matrix }
    }

    /// 分数坐标转笛卡尔坐标
    pub fn frac_to_cart(&self, frac: [f64; 3]) -> [f64; 3] {
        let m = self.matrix;
        [
            frac[0] * m[0][0] + frac[1] * m[1][0] + frac[2] * m[2][0],
            frac[0] * m[0][1] + frac[1] * m[1][1] + frac[2] * m[2][1],
            frac[0] * m[0][2] + frac[1] * m[1][2] + frac[2] * m[2][2],
        ]
    }

    /// 笛卡尔坐标转分数坐标
    pub fn cart_to_frac(&self, cart: [f64; 3]) -> [f64; 3] {
        match self.inverse() {
            Some(inv) => row_times(cart, &inv),
            None => cart,
        }
    }
}

/// 原子信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// 元素符号
    pub element: String,

    /// 分数坐标 [x, y, z]
    pub position: [f64; 3],
}

impl Atom {
    pub fn new(element: impl Into<String>, position: [f64; 3]) -> Self {
        Atom {
            element: element.into(),
            position,
        }
    }
}

/// 晶体结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crystal {
    /// 结构名称
    pub name: String,

    /// 晶格
    pub lattice: Lattice,

    /// 原子列表
    pub atoms: Vec<Atom>,

    /// 来源文件格式
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_format: Option<String>,
}

impl Crystal {
    pub fn new(name: impl Into<String>, lattice: Lattice, atoms: Vec<Atom>) -> Self {
        Crystal {
            name: name.into(),
            lattice,
            atoms,
            source_format: None,
        }
    }

    /// 孤立原子：正交盒子原点放置单个原子
    pub fn isolated_atom(element: &str, cell: [f64; 3]) -> Self {
        Crystal::new(
            format!("{}-isolated", element),
            Lattice::orthorhombic(cell[0], cell[1], cell[2]),
            vec![Atom::new(element, [0.0, 0.0, 0.0])],
        )
    }

    /// 二聚体：沿 x 方向放置两个原子，键长为 `distance` (Å)
    pub fn dimer(a: &str, b: &str, distance: f64, cell: [f64; 3]) -> Self {
        let lattice = Lattice::orthorhombic(cell[0], cell[1], cell[2]);
        let first = lattice.cart_to_frac([0.0, 0.0, 0.0]);
        let second = lattice.cart_to_frac([distance, 0.0, 0.0]);
        Crystal::new(
            format!("{}{}-dimer-{:.3}", a, b, distance),
            lattice,
            vec![Atom::new(a, first), Atom::new(b, second)],
        )
    }

    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn volume(&self) -> f64 {
        self.lattice.volume().abs()
    }

    /// 计算化学式
    pub fn formula(&self) -> String {
        use std::collections::BTreeMap;
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();

        for atom in &self.atoms {
            *counts.entry(atom.element.as_str()).or_insert(0) += 1;
        }

        counts
            .into_iter()
            .map(|(el, count)| {
                if count == 1 {
                    el.to_string()
                } else {
                    format!("{}{}", el, count)
                }
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// 按首次出现顺序列出元素
    pub fn species(&self) -> Vec<String> {
        let mut species: Vec<String> = Vec::new();
        for atom in &self.atoms {
            if !species.contains(&atom.element) {
                species.push(atom.element.clone());
            }
        }
        species
    }

    /// 所有原子的笛卡尔坐标
    pub fn cart_positions(&self) -> Vec<[f64; 3]> {
        self.atoms
            .iter()
            .map(|a| self.lattice.frac_to_cart(a.position))
            .collect()
    }

    /// 两原子之间的最小像距离
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        let fi = self.atoms[i].position;
        let fj = self.atoms[j].position;
        let mut d = [0.0; 3];
        for k in 0..3 {
            d[k] = fj[k] - fi[k];
            d[k] -= d[k].round();
        }

        // 斜晶胞中取整后的向量未必最短，检查相邻像
        let mut best = f64::MAX;
        for x in -1..=1 {
            for y in -1..=1 {
                for z in -1..=1 {
                    let shifted = [d[0] + x as f64, d[1] + y as f64, d[2] + z as f64];
                    let len = norm(self.lattice.frac_to_cart(shifted));
                    if len < best {
                        best = len;
                    }
                }
            }
        }
        best
    }

    /// 结构中的最小原子间距；少于两个原子时返回 `None`
    pub fn min_distance(&self) -> Option<f64> {
        let n = self.atoms.len();
        let mut best: Option<f64> = None;
        for i in 0..n {
            for j in (i + 1)..n {
                let d = self.distance(i, j);
                best = Some(best.map_or(d, |b: f64| b.min(d)));
            }
        }
        best
    }

    /// 原子 `index` 到其他原子的最小距离
    pub fn min_distance_from(&self, index: usize) -> Option<f64> {
        (0..self.atoms.len())
            .filter(|&j| j != index)
            .map(|j| self.distance(index, j))
            .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |b| b.min(d))))
    }

    /// 替换晶格，保持分数坐标不变
    pub fn with_lattice(&self, lattice: Lattice) -> Crystal {
        Crystal {
            name: self.name.clone(),
            lattice,
            atoms: self.atoms.clone(),
            source_format: self.source_format.clone(),
        }
    }

    /// 按体积因子缩放晶胞（晶格向量乘以 factor^(1/3)）
    pub fn scale_volume(&self, factor: f64) -> Result<Crystal> {
        if factor <= 0.0 || !factor.is_finite() {
            return Err(PhonfitError::InvalidArgument(format!(
                "Volume scale factor must be positive, got {}",
                factor
            )));
        }
        Ok(self.with_lattice(self.lattice.scaled(factor.cbrt())))
    }

    /// 按线性因子缩放晶格向量
    pub fn scale_lattice(&self, factor: f64) -> Result<Crystal> {
        if factor <= 0.0 || !factor.is_finite() {
            return Err(PhonfitError::InvalidArgument(format!(
                "Lattice scale factor must be positive, got {}",
                factor
            )));
        }
        Ok(self.with_lattice(self.lattice.scaled(factor)))
    }

    /// 沿笛卡尔向量移动单个原子
    pub fn displace_atom(&mut self, index: usize, vector: [f64; 3]) {
        let cart = self.lattice.frac_to_cart(self.atoms[index].position);
        let moved = [cart[0] + vector[0], cart[1] + vector[1], cart[2] + vector[2]];
        self.atoms[index].position = self.lattice.cart_to_frac(moved);
    }

    /// 构造整数矩阵超胞
    pub fn make_supercell(&self, matrix: &SupercellMatrix) -> Result<Crystal> {
        let mf = matrix.map(|row| row.map(|v| v as f64));
        let det = det3(&mf).round() as i64;
        if det == 0 {
            return Err(PhonfitError::InvalidStructure(format!(
                "Singular supercell matrix {:?}",
                matrix
            )));
        }
        let minv = invert3(&mf).ok_or_else(|| {
            PhonfitError::InvalidStructure(format!("Singular supercell matrix {:?}", matrix))
        })?;

        let old = self.lattice.matrix;
        let mut new_matrix = [[0.0; 3]; 3];
        for i in 0..3 {
            for k in 0..3 {
                new_matrix[i][k] = (0..3).map(|j| mf[i][j] * old[j][k]).sum();
            }
        }

        // 超胞角点在原胞分数坐标下的包围盒
        let mut lo = [0i32; 3];
        let mut hi = [0i32; 3];
        for corner in 0..8 {
            let s = [corner & 1, (corner >> 1) & 1, (corner >> 2) & 1];
            for k in 0..3 {
                let v: i32 = (0..3).map(|i| s[i] * matrix[i][k]).sum();
                lo[k] = lo[k].min(v);
                hi[k] = hi[k].max(v);
            }
        }

        const EPS: f64 = 1e-8;
        let mut atoms = Vec::with_capacity(self.atoms.len() * det.unsigned_abs() as usize);
        for atom in &self.atoms {
            let position = wrap_fractional(atom.position);
            for tx in lo[0]..=hi[0] {
                for ty in lo[1]..=hi[1] {
                    for tz in lo[2]..=hi[2] {
                        let shifted = [
                            position[0] + tx as f64,
                            position[1] + ty as f64,
                            position[2] + tz as f64,
                        ];
                        let f = row_times(shifted, &minv);
                        if f.iter().all(|&v| v >= -EPS && v < 1.0 - EPS) {
                            atoms.push(Atom::new(
                                atom.element.clone(),
                                f.map(|v| if v < 0.0 { 0.0 } else { v }),
                            ));
                        }
                    }
                }
            }
        }

        let expected = self.atoms.len() * det.unsigned_abs() as usize;
        if atoms.len() != expected {
            return Err(PhonfitError::InvalidStructure(format!(
                "Supercell generation produced {} atoms, expected {}",
                atoms.len(),
                expected
            )));
        }

        let mut crystal = Crystal::new(self.name.clone(), Lattice::from_vectors(new_matrix), atoms);
        crystal.source_format = self.source_format.clone();
        Ok(crystal)
    }
}

/// 分数坐标折回 [0, 1)
pub fn wrap_fractional(position: [f64; 3]) -> [f64; 3] {
    position.map(|v| {
        let w = v.rem_euclid(1.0);
        if w >= 1.0 - 1e-12 {
            0.0
        } else {
            w
        }
    })
}

/// 对角超胞矩阵
pub fn diagonal_matrix(n: [i32; 3]) -> SupercellMatrix {
    [[n[0], 0, 0], [0, n[1], 0], [0, 0, n[2]]]
}

fn norm(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn angle_between(a: [f64; 3], b: [f64; 3]) -> f64 {
    let cos = (dot(a, b) / (norm(a) * norm(b))).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

fn det3(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn invert3(m: &[[f64; 3]; 3]) -> Option<[[f64; 3]; 3]> {
    let det = det3(m);
    if det.abs() < 1e-10 {
        return None;
    }

    Some([
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) / det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) / det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) / det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) / det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) / det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) / det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) / det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) / det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) / det,
        ],
    ])
}

/// 行向量乘矩阵 v · M
fn row_times(v: [f64; 3], m: &[[f64; 3]; 3]) -> [f64; 3] {
    [
        v[0] * m[0][0] + v[1] * m[1][0] + v[2] * m[2][0],
        v[0] * m[0][1] + v[1] * m[1][1] + v[2] * m[2][1],
        v[0] * m[0][2] + v[1] * m[1][2] + v[2] * m[2][2],
    ]
}
