//! # 训练数据集收集
//!
//! 将 DFT 计算结果整理为带 `config_type` 标签的扩展 XYZ 数据集，
//! 提取孤立原子 E0 能量并统计各类构型数量。
//!
//! ## 功能
//! - 由作业输出文档构建数据帧（作业流中的 `collect_dft_data`）
//! - 扫描已有 VASP 计算目录并并行解析（`collect` 子命令）
//!
//! ## 依赖关系
//! - 被 `makers/labelling.rs`, `commands/collect.rs` 使用
//! - 使用 `parsers/`, `batch/`

use crate::batch::{BatchResult, BatchRunner, ProcessResult};
use crate::error::{PhonfitError, Result};
use crate::models::element::atomic_number;
use crate::models::TaskDocument;
use crate::parsers::extxyz::{write_extxyz_file, LabelledFrame};
use crate::parsers::outcar::parse_outcar;
use crate::parsers::poscar::parse_poscar_file;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use walkdir::WalkDir;

pub const CONFIG_BULK: &str = "bulk";
pub const CONFIG_ISOLATED: &str = "IsolatedAtom";
pub const CONFIG_DIMER: &str = "dimer";

/// 数据集文件名
pub const VASP_REF_FILE: &str = "vasp_ref.extxyz";

/// 写出数据集后的摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub vasp_ref_dir: String,

    /// 原子序数（字符串） → 孤立原子能量 (eV)
    pub isolated_atom_energies: BTreeMap<String, f64>,

    pub config_type_counts: BTreeMap<String, usize>,

    pub num_frames: usize,
}

/// 由计算文档与构型类型构建数据帧
pub fn labelled_frames(documents: &[TaskDocument], config_types: &[String]) -> Result<Vec<LabelledFrame>> {
    if documents.len() != config_types.len() {
        return Err(PhonfitError::InvalidArgument(format!(
            "{} documents but {} config types",
            documents.len(),
            config_types.len()
        )));
    }

    Ok(documents
        .iter()
        .zip(config_types)
        .map(|(doc, ct)| LabelledFrame {
            structure: doc.structure.clone(),
            energy: doc.energy,
            forces: doc.forces.clone(),
            config_type: ct.clone(),
        })
        .collect())
}

/// 孤立原子能量，以原子序数字符串为键
pub fn isolated_atom_energies(frames: &[LabelledFrame]) -> BTreeMap<String, f64> {
    let mut energies = BTreeMap::new();
    for frame in frames.iter().filter(|f| f.config_type == CONFIG_ISOLATED) {
        let Some(atom) = frame.structure.atoms.first() else {
            continue;
        };
        if let Some(z) = atomic_number(&atom.element) {
            energies.insert(z.to_string(), frame.energy);
        }
    }
    energies
}

pub fn config_type_counts(frames: &[LabelledFrame]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for frame in frames {
        *counts.entry(frame.config_type.clone()).or_insert(0) += 1;
    }
    counts
}

/// 在 `dir` 下写出 `vasp_ref.extxyz` 并返回摘要
pub fn write_dataset(frames: &[LabelledFrame], dir: &Path) -> Result<DatasetSummary> {
    std::fs::create_dir_all(dir).map_err(|e| PhonfitError::write(dir, e))?;
    write_extxyz_file(frames, &dir.join(VASP_REF_FILE))?;

    let summary = DatasetSummary {
        vasp_ref_dir: dir.display().to_string(),
        isolated_atom_energies: isolated_atom_energies(frames),
        config_type_counts: config_type_counts(frames),
        num_frames: frames.len(),
    };
    tracing::info!(
        frames = summary.num_frames,
        dir = %summary.vasp_ref_dir,
        "Wrote labelled dataset"
    );
    Ok(summary)
}

/// 由目录名判断构型类型
pub fn classify_config_type(dir: &Path) -> &'static str {
    let name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_lowercase();
    if name.contains("isolated") {
        CONFIG_ISOLATED
    } else if name.contains("dimer") {
        CONFIG_DIMER
    } else {
        CONFIG_BULK
    }
}

/// 查找包含 OUTCAR 的计算目录（排序后返回）
pub fn find_vasp_dirs(root: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(PhonfitError::DirectoryNotFound {
            path: root.display().to_string(),
        });
    }

    let max_depth = if recursive { usize::MAX } else { 2 };
    let mut dirs: Vec<PathBuf> = WalkDir::new(root)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == "OUTCAR")
        .filter_map(|e| e.path().parent().map(Path::to_path_buf))
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// 解析单个 VASP 目录为数据帧；计算未完成时返回 `None`
pub fn frame_from_dir(dir: &Path) -> Result<Option<LabelledFrame>> {
    let name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("calc")
        .to_string();
    let result = parse_outcar(&dir.join("OUTCAR"), &name)?;

    if !result.is_finished {
        tracing::debug!(dir = %dir.display(), "OUTCAR has no completion marker");
        return Ok(None);
    }
    let energy = result.energy_ev.ok_or_else(|| PhonfitError::JobFailed {
        name: name.clone(),
        reason: "no energy in OUTCAR".to_string(),
    })?;

    let structure_path = match &result.structure_file {
        Some(path) => PathBuf::from(path),
        None => dir.join("POSCAR"),
    };
    let mut structure = parse_poscar_file(&structure_path)?;
    structure.name = name;

    if result.forces.len() != structure.num_atoms() {
        return Err(PhonfitError::InvalidStructure(format!(
            "{}: {} forces for {} atoms",
            dir.display(),
            result.forces.len(),
            structure.num_atoms()
        )));
    }

    Ok(Some(LabelledFrame {
        structure,
        energy,
        forces: result.forces,
        config_type: classify_config_type(dir).to_string(),
    }))
}

type FrameBuffer = Mutex<Vec<(PathBuf, LabelledFrame)>>;

fn push_frame(frames: &FrameBuffer, dir: &Path, frame: LabelledFrame) -> ProcessResult {
    let label = dir.display().to_string();
    match frames.lock() {
        Ok(mut guard) => {
            guard.push((dir.to_path_buf(), frame));
            ProcessResult::Success(label)
        }
        Err(_) => ProcessResult::Failed(label, "frame buffer lock poisoned".to_string()),
    }
}

/// 并行解析多个目录；返回按目录顺序排列的成功帧与统计
pub fn collect_dirs(dirs: &[PathBuf], runner: &BatchRunner) -> (Vec<LabelledFrame>, BatchResult) {
    let frames: FrameBuffer = Mutex::new(Vec::new());

    let result = runner.run(dirs.to_vec(), |dir| match frame_from_dir(dir) {
        Ok(Some(frame)) => push_frame(&frames, dir, frame),
        Ok(None) => ProcessResult::Skipped(dir.display().to_string()),
        Err(e) => ProcessResult::Failed(dir.display().to_string(), e.to_string()),
    });

    let mut frames = frames.into_inner().unwrap_or_default();
    frames.sort_by(|a, b| a.0.cmp(&b.0));
    (frames.into_iter().map(|(_, f)| f).collect(), result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Atom, Crystal, EngineKind, Lattice};
    use crate::parsers::extxyz::parse_extxyz_file;
    use crate::parsers::poscar::write_poscar_file;
    use std::fs;

    fn doc(structure: Crystal, energy: f64) -> TaskDocument {
        let n = structure.num_atoms();
        TaskDocument {
            job_name: structure.name.clone(),
            engine: EngineKind::Vasp,
            forcefield_name: None,
            structure,
            energy,
            energy_per_atom: energy / n as f64,
            forces: vec![[0.0; 3]; n],
            dir_name: None,
            trajectory: Vec::new(),
        }
    }

    fn bulk() -> Crystal {
        Crystal::new(
            "bulk",
            Lattice::orthorhombic(5.43, 5.43, 5.43),
            vec![
                Atom::new("Si", [0.0, 0.0, 0.0]),
                Atom::new("Si", [0.25, 0.25, 0.25]),
            ],
        )
    }

    #[test]
    fn test_dataset_summary() {
        let dir = tempfile::tempdir().unwrap();
        let docs = vec![
            doc(bulk(), -10.8),
            doc(Crystal::isolated_atom("Si", [20.0, 20.5, 21.0]), -0.84696938),
            doc(Crystal::dimer("Si", "Si", 2.0, [15.0, 15.5, 16.0]), -3.1),
        ];
        let types: Vec<String> = ["bulk", "IsolatedAtom", "dimer"].iter().map(|s| s.to_string()).collect();

        let frames = labelled_frames(&docs, &types).unwrap();
        let summary = write_dataset(&frames, dir.path()).unwrap();
        assert_eq!(summary.isolated_atom_energies["14"], -0.84696938);
        assert_eq!(summary.config_type_counts["bulk"], 1);
        assert_eq!(summary.config_type_counts["dimer"], 1);
        assert_eq!(summary.num_frames, 3);

        let back = parse_extxyz_file(&dir.path().join(VASP_REF_FILE)).unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(back[1].config_type, "IsolatedAtom");
    }

    #[test]
    fn test_length_mismatch() {
        let err = labelled_frames(&[doc(bulk(), -1.0)], &[]).unwrap_err();
        assert!(matches!(err, PhonfitError::InvalidArgument(_)));
    }

    #[test]
    fn test_classify_config_type() {
        assert_eq!(classify_config_type(Path::new("run/job_0003_static_isolated_0")), "IsolatedAtom");
        assert_eq!(classify_config_type(Path::new("run/static_dimer_2")), "dimer");
        assert_eq!(classify_config_type(Path::new("run/static_bulk_0")), "bulk");
    }

    fn write_run(dir: &Path, finished: bool) {
        fs::create_dir_all(dir).unwrap();
        write_poscar_file(&bulk(), &dir.join("POSCAR")).unwrap();
        let mut outcar = String::from(
            "   NIONS =       2\n\
             \x20POSITION                                       TOTAL-FORCE (eV/Angst)\n\
             \x20-----------------------------------------------------------------------------------\n\
             \x20     0.00000      0.00000      0.00000         0.010000      0.000000      0.000000\n\
             \x20     1.35750      1.35750      1.35750        -0.010000      0.000000      0.000000\n\
             \x20-----------------------------------------------------------------------------------\n\
             \x20 energy  without entropy=      -10.80000000  energy(sigma->0) =      -10.80000000\n",
        );
        if finished {
            outcar.push_str(" General timing and accounting informations for this job:\n");
        }
        fs::write(dir.join("OUTCAR"), outcar).unwrap();
    }

    #[test]
    fn test_collect_dirs() {
        let root = tempfile::tempdir().unwrap();
        write_run(&root.path().join("static_bulk_0"), true);
        write_run(&root.path().join("static_dimer_0"), true);
        write_run(&root.path().join("static_bulk_1"), false);

        let dirs = find_vasp_dirs(root.path(), true).unwrap();
        assert_eq!(dirs.len(), 3);

        let (frames, result) = collect_dirs(&dirs, &BatchRunner::new(2).quiet(true));
        assert_eq!(result.success, 2);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.failed, 0);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].config_type, "bulk");
        assert_eq!(frames[1].config_type, "dimer");
        assert!((frames[0].energy - -10.8).abs() < 1e-9);
        assert_eq!(frames[0].forces.len(), 2);
    }

    #[test]
    fn test_poisoned_buffer_reports_failure() {
        let frames: FrameBuffer = Mutex::new(Vec::new());
        let _ = std::panic::catch_unwind(|| {
            let _guard = frames.lock().unwrap();
            panic!("poison");
        });
        assert!(frames.is_poisoned());

        let frame = LabelledFrame {
            structure: bulk(),
            energy: -10.8,
            forces: vec![[0.0; 3]; 2],
            config_type: "bulk".to_string(),
        };
        let result = push_frame(&frames, Path::new("static_bulk_0"), frame);
        assert!(matches!(result, ProcessResult::Failed(_, _)));
    }

    #[test]
    fn test_missing_root() {
        assert!(find_vasp_dirs(Path::new("/nonexistent/phonfit"), true).is_err());
    }
}
