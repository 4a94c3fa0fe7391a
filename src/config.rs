//! # 配置文件
//!
//! 可选的 TOML 配置文件，命令行参数优先于配置文件。
//!
//! ```toml
//! [vasp]
//! command = "mpirun -np 32 vasp_std"
//! potcar-dir = "/opt/vasp/potpaw_PBE"
//!
//! [ml]
//! command = "python -m my_ml_driver"
//!
//! [slurm]
//! partition = "cpu"
//! ntasks = 64
//! modules = ["vasp/6.4"]
//!
//! [datagen]
//! n_structures = 20
//! distort_type = 2
//! ```
//!
//! ## 依赖关系
//! - 被 `commands/` 使用
//! - 使用 `toml`, `serde`

use crate::error::{PhonfitError, Result};
use crate::perturb::RandomizeSettings;
use crate::utils::slurm::SlurmConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 默认配置文件名（当前目录）
pub const DEFAULT_CONFIG_FILE: &str = "phonfit.toml";

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct VaspSection {
    pub command: Option<String>,
    pub potcar_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct MlSection {
    pub command: Option<String>,
    pub potential_file: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct SlurmSection {
    pub partition: Option<String>,
    pub constraint: Option<String>,
    pub nodes: Option<u32>,
    pub ntasks: Option<u32>,
    pub cpus_per_task: Option<u32>,
    pub mem_per_cpu: Option<String>,
    pub time: Option<String>,
    pub modules: Option<Vec<String>>,
}

impl SlurmSection {
    /// 以配置覆盖默认 Slurm 参数
    pub fn apply(&self, config: &mut SlurmConfig) {
        if let Some(v) = &self.partition {
            config.partition = v.clone();
        }
        if let Some(v) = &self.constraint {
            config.constraint = Some(v.clone());
        }
        if let Some(v) = self.nodes {
            config.nodes = v;
        }
        if let Some(v) = self.ntasks {
            config.ntasks = v;
        }
        if let Some(v) = self.cpus_per_task {
            config.cpus_per_task = v;
        }
        if let Some(v) = &self.mem_per_cpu {
            config.mem_per_cpu = v.clone();
        }
        if let Some(v) = &self.time {
            config.time_limit = v.clone();
        }
        if let Some(v) = &self.modules {
            config.modules = v.clone();
        }
    }
}

/// 完整配置
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub vasp: VaspSection,
    #[serde(default)]
    pub ml: MlSection,
    #[serde(default)]
    pub slurm: SlurmSection,
    /// 随机结构生成的默认参数
    #[serde(default)]
    pub datagen: RandomizeSettings,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let content = fs::read_to_string(path).map_err(|e| PhonfitError::read(path, e))?;
        Self::from_toml(&content, path)
    }

    fn from_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| PhonfitError::ConfigError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// 读取显式指定的配置；未指定时尝试当前目录下的 `phonfit.toml`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                if !p.is_file() {
                    return Err(PhonfitError::FileNotFound {
                        path: p.display().to_string(),
                    });
                }
                Self::from_file(p)
            }
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::from_file(default)
                } else {
                    Ok(Config::default())
                }
            }
        }
    }
}
