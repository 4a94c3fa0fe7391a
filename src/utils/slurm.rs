//! # Slurm 脚本生成工具
//!
//! 为导出的 VASP 计算目录生成 sbatch 提交脚本。
//!
//! ## 依赖关系
//! - 被 `commands/export.rs`, `config.rs` 使用
//! - 无外部模块依赖

use crate::error::{PhonfitError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// sbatch 脚本文件名
pub const SBATCH_FILE: &str = "submit.sbatch";

/// Slurm 作业配置
#[derive(Debug, Clone)]
pub struct SlurmConfig {
    pub job_name: String,
    pub partition: String,
    pub constraint: Option<String>,
    pub nodes: u32,
    pub ntasks: u32,
    pub cpus_per_task: u32,
    pub mem_per_cpu: String,
    pub time_limit: String,
    pub modules: Vec<String>,
}

impl Default for SlurmConfig {
    fn default() -> Self {
        SlurmConfig {
            job_name: "job".to_string(),
            partition: "cpu".to_string(),
            constraint: None,
            nodes: 1,
            ntasks: 32,
            cpus_per_task: 1,
            mem_per_cpu: "3G".to_string(),
            time_limit: "24:00:00".to_string(),
            modules: vec![],
        }
    }
}

/// 生成 sbatch 脚本内容
pub fn generate_sbatch_script(config: &SlurmConfig, workdir: &Path, exec_cmd: &str) -> String {
    let module_loads = config
        .modules
        .iter()
        .map(|m| format!("module load {}", m))
        .collect::<Vec<_>>()
        .join("\n");

    let constraint = config
        .constraint
        .as_ref()
        .map(|c| format!("#SBATCH --constraint \"{}\"\n", c))
        .unwrap_or_default();

    format!(
        r#"#!/bin/bash
{}#SBATCH --partition {}
#SBATCH --nodes={}
#SBATCH --mem-per-cpu {}
#SBATCH --time {}
#SBATCH -c {}
#SBATCH -n {}
#SBATCH -J {}
#SBATCH -o slurm_logs/%x.out
#SBATCH -e slurm_logs/%x.err

set -euo pipefail

module purge 2>&1
{}
echo "Loaded modules"

cd "{}"
echo "PWD=$(pwd)"
echo "Running: {}"
{}

echo "Timings:"
sacct -o JobID,Submit,Start,End,CPUTime,State -j $SLURM_JOBID
"#,
        constraint,
        config.partition,
        config.nodes,
        config.mem_per_cpu,
        config.time_limit,
        config.cpus_per_task,
        config.ntasks,
        config.job_name,
        module_loads,
        workdir.display(),
        exec_cmd,
        exec_cmd,
    )
}

/// 在作业目录中写出 sbatch 脚本并创建 `slurm_logs/`
pub fn write_sbatch_script(config: &SlurmConfig, job_dir: &Path, exec_cmd: &str) -> Result<PathBuf> {
    let logs = job_dir.join("slurm_logs");
    fs::create_dir_all(&logs).map_err(|e| PhonfitError::write(&logs, e))?;

    let path = job_dir.join(SBATCH_FILE);
    let content = generate_sbatch_script(config, job_dir, exec_cmd);
    fs::write(&path, content).map_err(|e| PhonfitError::write(&path, e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_contents() {
        let config = SlurmConfig {
            job_name: "static_bulk_0".to_string(),
            modules: vec!["vasp/6.4".to_string()],
            ..Default::default()
        };
        let script = generate_sbatch_script(&config, Path::new("/scratch/run"), "mpirun vasp_std");
        assert!(script.starts_with("#!/bin/bash\n#SBATCH --partition cpu"));
        assert!(script.contains("#SBATCH -J static_bulk_0"));
        assert!(script.contains("module load vasp/6.4"));
        assert!(script.contains("cd \"/scratch/run\""));
        assert!(!script.contains("--constraint"));

        let constrained = SlurmConfig {
            constraint: Some("icelake".to_string()),
            ..Default::default()
        };
        let script = generate_sbatch_script(&constrained, Path::new("."), "true");
        assert!(script.contains("#SBATCH --constraint \"icelake\""));
    }

    #[test]
    fn test_write_script() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sbatch_script(&SlurmConfig::default(), dir.path(), "true").unwrap();
        assert!(path.is_file());
        assert!(dir.path().join("slurm_logs").is_dir());
    }
}
