//! # 导出 VASP 作业目录
//!
//! 把作业流中输入已确定的 VASP 计算写成独立目录（POSCAR / INCAR / KPOINTS /
//! POTCAR + sbatch 脚本），可选直接 `sbatch` 提交。另写出 `jobs.csv` 索引。
//!
//! ## 依赖关系
//! - 被 `commands/label.rs`, `commands/iso_atoms.rs` 使用
//! - 使用 `flow/calculator.rs`, `utils/slurm.rs`, `csv`

use crate::cli::common::ExportArgs;
use crate::config::Config;
use crate::error::{PhonfitError, Result};
use crate::flow::calculator::write_vasp_inputs;
use crate::flow::runner::sanitize;
use crate::flow::{Flow, Input, JobKind};
use crate::makers::calc::Engine;
use crate::utils::output;
use crate::utils::slurm::{write_sbatch_script, SlurmConfig, SBATCH_FILE};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// 作业索引文件名
pub const JOBS_INDEX_FILE: &str = "jobs.csv";

const DEFAULT_EXEC: &str = "mpirun vasp_std";

#[derive(Debug, Serialize)]
struct JobIndexRow {
    job: String,
    directory: String,
    formula: String,
    atoms: usize,
}

/// 命令行优先，其次配置文件，最后默认值
pub fn slurm_config(args: &ExportArgs, config: &Config) -> SlurmConfig {
    let mut slurm = SlurmConfig::default();
    config.slurm.apply(&mut slurm);

    if let Some(v) = &args.partition {
        slurm.partition = v.clone();
    }
    if let Some(v) = &args.constraint {
        slurm.constraint = Some(v.clone());
    }
    if let Some(v) = args.nodes {
        slurm.nodes = v;
    }
    if let Some(v) = args.ntasks {
        slurm.ntasks = v;
    }
    if let Some(v) = args.cpus_per_task {
        slurm.cpus_per_task = v;
    }
    if let Some(v) = &args.mem_per_cpu {
        slurm.mem_per_cpu = v.clone();
    }
    if let Some(v) = &args.time {
        slurm.time_limit = v.clone();
    }
    if !args.modules.is_empty() {
        slurm.modules = args.modules.clone();
    }
    slurm
}

/// 写出全部可导出的 VASP 作业目录
pub fn export_vasp_jobs(flow: &Flow, root: &Path, args: &ExportArgs, config: &Config) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(root).map_err(|e| PhonfitError::write(root, e))?;

    let base = slurm_config(args, config);
    let exec = args
        .exec
        .clone()
        .or_else(|| config.vasp.command.clone())
        .unwrap_or_else(|| DEFAULT_EXEC.to_string());
    let potcar_dir = args.potcar_dir.clone().or_else(|| config.vasp.potcar_dir.clone());
    if potcar_dir.is_none() {
        output::print_warning("No POTCAR directory given; POTCAR files will not be written");
    }

    let index_path = root.join(JOBS_INDEX_FILE);
    let mut index = csv::Writer::from_path(&index_path)?;
    let mut dirs = Vec::new();

    for job in flow.jobs() {
        let (settings, structure) = match &job.kind {
            JobKind::Calculation {
                maker,
                structure: Input::Value(structure),
            } => match &maker.engine {
                Engine::Vasp(settings) => (settings, structure),
                Engine::MlPotential { .. } => {
                    output::print_skip(&format!("{}: not a VASP calculation", job.name));
                    continue;
                }
            },
            _ => {
                output::print_skip(&format!("{}: input not known before running", job.name));
                continue;
            }
        };

        let dir_name = sanitize(&job.name);
        let dir = root.join(&dir_name);
        fs::create_dir_all(&dir).map_err(|e| PhonfitError::write(&dir, e))?;
        write_vasp_inputs(settings, structure, &dir, potcar_dir.as_deref())?;

        let slurm = SlurmConfig {
            job_name: dir_name.clone(),
            ..base.clone()
        };
        write_sbatch_script(&slurm, &dir, &exec)?;

        index.serialize(JobIndexRow {
            job: job.name.clone(),
            directory: dir_name,
            formula: structure.formula(),
            atoms: structure.num_atoms(),
        })?;
        dirs.push(dir);
    }
    index.flush().map_err(|e| PhonfitError::write(&index_path, e))?;

    tracing::info!(root = %root.display(), jobs = dirs.len(), "Exported VASP job directories");
    Ok(dirs)
}

/// 在每个目录中执行 `sbatch`
pub fn submit_jobs(dirs: &[PathBuf]) -> Result<usize> {
    let mut submitted = 0;
    for dir in dirs {
        let out = Command::new("sbatch")
            .arg(SBATCH_FILE)
            .current_dir(dir)
            .output()
            .map_err(|e| PhonfitError::CommandFailed {
                command: "sbatch".to_string(),
                stderr: e.to_string(),
            })?;

        if out.status.success() {
            let stdout = String::from_utf8_lossy(&out.stdout);
            output::print_success(&format!("{}: {}", dir.display(), stdout.trim()));
            submitted += 1;
        } else {
            output::print_error(&format!(
                "{}: {}",
                dir.display(),
                String::from_utf8_lossy(&out.stderr).trim()
            ));
        }
    }
    Ok(submitted)
}

/// 导出并按需提交
pub fn export_and_submit(flow: &Flow, args: &ExportArgs, config: &Config) -> Result<()> {
    let root = match &args.export {
        Some(root) => root,
        None => return Ok(()),
    };

    output::print_separator();
    let dirs = export_vasp_jobs(flow, root, args, config)?;
    output::print_done(&format!(
        "Exported {} VASP jobs to '{}'",
        dirs.len(),
        root.display()
    ));

    if args.submit {
        let submitted = submit_jobs(&dirs)?;
        output::print_info(&format!("Submitted {}/{} jobs", submitted, dirs.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::Job;
    use crate::makers::calc::{CalcMaker, MlPotential, PotentialKind};
    use crate::models::{Atom, Crystal, Lattice};

    fn crystal(name: &str) -> Crystal {
        Crystal::new(
            name,
            Lattice::orthorhombic(10.0, 10.0, 10.0),
            vec![Atom::new("Si", [0.0, 0.0, 0.0])],
        )
    }

    #[test]
    fn test_slurm_precedence() {
        let mut config = Config::default();
        config.slurm.partition = Some("gpu".to_string());
        config.slurm.ntasks = Some(64);
        let args = ExportArgs {
            ntasks: Some(16),
            ..Default::default()
        };
        let slurm = slurm_config(&args, &config);
        assert_eq!(slurm.partition, "gpu");
        assert_eq!(slurm.ntasks, 16);
        assert_eq!(slurm.time_limit, "24:00:00");
    }

    #[test]
    fn test_export_writes_inputs_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let static_job = CalcMaker::static_calc().make_named("static_isolated_0", Input::Value(crystal("Si")));
        let dependent = CalcMaker::static_calc().make(Input::Ref(static_job.output().key("structure")));
        let ml_job = CalcMaker::ml_static(MlPotential::new(PotentialKind::Gap)).make(Input::Value(crystal("Si")));
        let other = Job::new(
            "collect",
            JobKind::CollectDftData {
                documents: Input::Value(vec![]),
                config_types: Input::Value(vec![]),
            },
        );
        let flow = Flow::from_jobs("export", vec![static_job, dependent, ml_job, other]);

        let root = dir.path().join("jobs");
        let args = ExportArgs {
            export: Some(root.clone()),
            exec: Some("vasp_gam".to_string()),
            ..Default::default()
        };
        let dirs = export_vasp_jobs(&flow, &root, &args, &Config::default()).unwrap();
        assert_eq!(dirs.len(), 1);

        let job_dir = root.join("static_isolated_0");
        assert!(job_dir.join("POSCAR").is_file());
        assert!(job_dir.join("INCAR").is_file());
        assert!(!job_dir.join("POTCAR").exists());
        let script = fs::read_to_string(job_dir.join(SBATCH_FILE)).unwrap();
        assert!(script.contains("#SBATCH -J static_isolated_0"));
        assert!(script.contains("vasp_gam"));

        let mut reader = csv::Reader::from_path(root.join(JOBS_INDEX_FILE)).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], "static_isolated_0");
        assert_eq!(&rows[0][3], "1");
    }
}
