//! # 命令公用的输入输出
//!
//! 读取结构文件、解析 INCAR 覆盖、保存作业流。
//!
//! ## 依赖关系
//! - 被 `commands/` 各子命令使用
//! - 使用 `batch/collector.rs`, `parsers/`, `utils/progress.rs`

use crate::batch::FileCollector;
use crate::cli::common::{IncarArgs, StructureInputArgs};
use crate::error::{PhonfitError, Result};
use crate::flow::Flow;
use crate::models::{Crystal, IncarUpdates};
use crate::parsers::incar::{parse_assignments, parse_incar_file};
use crate::parsers;
use crate::utils::{output, progress};
use std::path::Path;

/// 文件名本身不含信息时（POSCAR / CONTCAR）用所在目录名命名
fn structure_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    if stem.eq_ignore_ascii_case("poscar") || stem.eq_ignore_ascii_case("contcar") {
        let parent = path.parent()?.file_name()?.to_str()?;
        Some(parent.to_string())
    } else {
        Some(stem.to_string())
    }
}

/// 读取单个结构文件
pub fn load_structure(path: &Path) -> Result<Crystal> {
    if !path.is_file() {
        return Err(PhonfitError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    let mut crystal = parsers::parse_structure_file(path)?;
    if let Some(name) = structure_name(path) {
        crystal.name = name;
    }
    let (a, b, c, alpha, beta, gamma) = crystal.lattice.parameters();
    tracing::debug!(
        path = %path.display(),
        formula = %crystal.formula(),
        a, b, c, alpha, beta, gamma,
        "Loaded structure"
    );
    Ok(crystal)
}

/// 按输入参数收集并读取全部结构
pub fn load_structures(args: &StructureInputArgs) -> Result<Vec<Crystal>> {
    let mut files = Vec::new();
    for input in &args.inputs {
        let found = FileCollector::new(input.clone())
            .with_pattern(&args.pattern)
            .recursive(args.recursive)
            .collect()?;
        files.extend(found);
    }

    let pb = progress::create_progress_bar(files.len() as u64, "Reading structures");
    let mut structures = Vec::with_capacity(files.len());
    for file in &files {
        match load_structure(file) {
            Ok(crystal) => structures.push(crystal),
            Err(e) => pb.suspend(|| {
                output::print_warning(&format!("Skipping {}: {}", file.display(), e));
            }),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    if structures.is_empty() {
        return Err(PhonfitError::InvalidArgument(
            "no readable structures in the given inputs".to_string(),
        ));
    }
    output::print_info(&format!("Loaded {} structures", structures.len()));
    Ok(structures)
}

/// `--incar-file` 中的全部参数，再叠加 `--incar KEY=VALUE`
pub fn incar_updates(args: &IncarArgs) -> Result<IncarUpdates> {
    let mut updates = IncarUpdates::new();
    if let Some(path) = &args.incar_file {
        for (key, value) in parse_incar_file(path)?.iter() {
            updates.insert(key, Some(value.clone()));
        }
    }
    for (key, value) in parse_assignments(&args.incar)?.iter() {
        updates.insert(key, value.clone());
    }
    Ok(updates)
}

/// 保存作业流并打印摘要
pub fn save_flow(flow: &Flow, path: &Path) -> Result<()> {
    flow.execution_order()?;
    flow.save(path)?;
    output::print_done(&format!(
        "Wrote flow '{}' with {} jobs to '{}'",
        flow.name,
        flow.jobs().len(),
        path.display()
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IncarSettings, IncarValue};
    use std::fs;
    use std::path::PathBuf;

    const POSCAR: &str = "Si\n1.0\n5.43 0 0\n0 5.43 0\n0 0 5.43\nSi\n2\nDirect\n0 0 0\n0.25 0.25 0.25\n";

    #[test]
    fn test_structure_name() {
        assert_eq!(
            structure_name(Path::new("mp-149/POSCAR")).as_deref(),
            Some("mp-149")
        );
        assert_eq!(structure_name(Path::new("dir/Si.vasp")).as_deref(), Some("Si"));
    }

    #[test]
    fn test_load_structures_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("mp-149");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("POSCAR"), POSCAR).unwrap();
        fs::write(dir.path().join("Ge.vasp"), POSCAR.replace("Si", "Ge")).unwrap();

        let args = StructureInputArgs {
            inputs: vec![dir.path().to_path_buf()],
            pattern: "POSCAR*,*.vasp".to_string(),
            recursive: true,
        };
        let structures = load_structures(&args).unwrap();
        assert_eq!(structures.len(), 2);
        assert_eq!(structures[0].name, "Ge");
        assert_eq!(structures[1].name, "mp-149");
        assert_eq!(structures[1].num_atoms(), 2);
    }

    #[test]
    fn test_incar_file_then_assignments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("INCAR");
        fs::write(&path, "ENCUT = 400\nISPIN = 2\n").unwrap();

        let args = IncarArgs {
            incar: vec!["ENCUT=520".to_string(), "LREAL=".to_string()],
            incar_file: Some(path),
        };
        let updates = incar_updates(&args).unwrap();
        let mut incar = IncarSettings::new().with("LREAL", "Auto");
        incar.apply(&updates);
        assert_eq!(incar.get("ENCUT"), Some(&IncarValue::Int(520)));
        assert_eq!(incar.get("ISPIN"), Some(&IncarValue::Int(2)));
        assert!(!incar.contains("LREAL"));
    }

    #[test]
    fn test_missing_structure() {
        let err = load_structure(&PathBuf::from("/nonexistent/POSCAR")).unwrap_err();
        assert!(matches!(err, PhonfitError::FileNotFound { .. }));
    }
}
