//! # 统一错误处理模块
//!
//! 定义 phonfit 的所有错误类型，使用 `thiserror` 派生。
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 无外部模块依赖

use thiserror::Error;

/// phonfit 统一错误类型
#[derive(Error, Debug)]
pub enum PhonfitError {
    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ─────────────────────────────────────────────────────────────
    // 解析错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to parse {format} file: {path}\nReason: {reason}")]
    ParseError {
        format: String,
        path: String,
        reason: String,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // 结构错误
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    #[error("Unknown element symbol: {0}")]
    UnknownElement(String),

    #[error("Angle distortion failed after {attempts} attempts (min distance {min_distance} Å)")]
    DistortionFailed { attempts: usize, min_distance: f64 },

    // ─────────────────────────────────────────────────────────────
    // 作业图错误
    // ─────────────────────────────────────────────────────────────
    #[error("Cannot resolve reference to job {uuid} at path '{path}'")]
    UnresolvedReference { uuid: String, path: String },

    #[error("Dependency cycle detected in flow '{flow}'")]
    CycleDetected { flow: String },

    #[error("Job '{name}' failed: {reason}")]
    JobFailed { name: String, reason: String },

    #[error("No calculator registered for {engine} jobs")]
    CalculatorUnavailable { engine: String },

    // ─────────────────────────────────────────────────────────────
    // 外部命令错误
    // ─────────────────────────────────────────────────────────────
    #[error("External command failed: {command}\n{stderr}")]
    CommandFailed { command: String, stderr: String },

    // ─────────────────────────────────────────────────────────────
    // 参数与配置错误
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid config file {path}: {reason}")]
    ConfigError { path: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // CSV 错误
    // ─────────────────────────────────────────────────────────────
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    // ─────────────────────────────────────────────────────────────
    // 其他
    // ─────────────────────────────────────────────────────────────
    #[error("No matching files found with pattern: {pattern}")]
    NoFilesFound { pattern: String },

    #[error("{0}")]
    Other(String),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, PhonfitError>;

impl PhonfitError {
    /// 构造文件读取错误
    pub fn read(path: &std::path::Path, source: std::io::Error) -> Self {
        PhonfitError::FileReadError {
            path: path.display().to_string(),
            source,
        }
    }

    /// 构造文件写入错误
    pub fn write(path: &std::path::Path, source: std::io::Error) -> Self {
        PhonfitError::FileWriteError {
            path: path.display().to_string(),
            source,
        }
    }
}
