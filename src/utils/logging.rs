//! # 日志初始化
//!
//! 根据 `-v` 次数与 `--quiet` 设置 `tracing` 日志级别；可选同时写入日志文件。
//! `--quiet` 只关闭终端输出，日志文件仍按 `-v` 级别记录。
//!
//! | `-v` | 级别 |
//! |------|------|
//! | 0    | WARN |
//! | 1    | INFO |
//! | 2    | DEBUG |
//! | ≥3   | TRACE |
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 使用 `tracing-subscriber`

use crate::error::{PhonfitError, Result};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*};

pub fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::OFF;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// 终端与日志文件各自的级别；`--quiet` 只关闭终端输出
pub fn layer_levels(verbosity: u8, quiet: bool) -> (LevelFilter, LevelFilter) {
    (level_filter(verbosity, quiet), level_filter(verbosity, false))
}

pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<PathBuf>) -> Result<()> {
    let (stderr_level, file_level) = layer_levels(verbosity, quiet);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .compact()
        .with_filter(stderr_level);

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(&path).map_err(|e| PhonfitError::write(&path, e))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_thread_ids(true)
                    .with_target(true)
                    .with_filter(file_level),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(level_filter(0, false), LevelFilter::WARN);
        assert_eq!(level_filter(1, false), LevelFilter::INFO);
        assert_eq!(level_filter(2, false), LevelFilter::DEBUG);
        assert_eq!(level_filter(5, false), LevelFilter::TRACE);
        assert_eq!(level_filter(3, true), LevelFilter::OFF);
    }

    #[test]
    fn test_quiet_keeps_file_level() {
        assert_eq!(layer_levels(1, true), (LevelFilter::OFF, LevelFilter::INFO));
        assert_eq!(layer_levels(2, false), (LevelFilter::DEBUG, LevelFilter::DEBUG));
    }

    #[test]
    fn test_file_layer_writes_events_when_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phonfit.log");
        let file = File::create(&path).unwrap();
        let (stderr_level, file_level) = layer_levels(1, true);
        let subscriber = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::sink)
                    .with_filter(stderr_level),
            )
            .with(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_thread_ids(true)
                    .with_filter(file_level),
            );

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(job = "static_bulk_0", "Running job");
            tracing::debug!("hidden at info level");
        });

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Running job"));
        assert!(content.contains("INFO"));
        assert!(!content.contains("hidden at info level"));
    }
}
