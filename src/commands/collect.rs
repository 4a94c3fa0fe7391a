//! # collect 命令实现
//!
//! 收集已完成的 VASP 计算并写出 `vasp_ref.extxyz`。
//!
//! ## 功能
//! - 扫描含 OUTCAR 的计算目录
//! - 并行解析能量、受力与结构（未完成的计算被跳过）
//! - 按目录名标注 `config_type`（IsolatedAtom / dimer / bulk）
//! - 可合并已有的 extxyz 数据集
//! - 打印构型数量与孤立原子能量，可选写出 CSV 明细
//!
//! ## 依赖关系
//! - 使用 `cli/collect.rs` 定义的参数
//! - 使用 `dataset.rs`, `batch/`
//! - 使用 `utils/output.rs`, `tabled`, `csv`

use crate::batch::BatchRunner;
use crate::cli::collect::CollectArgs;
use crate::dataset::{self, DatasetSummary};
use crate::error::{PhonfitError, Result};
use crate::models::element::symbol_for;
use crate::parsers::extxyz::{parse_extxyz_file, LabelledFrame};
use crate::utils::output;
use serde::Serialize;
use std::path::Path;
use tabled::{Table, Tabled};

#[derive(Debug, Clone, Tabled)]
struct CountRow {
    #[tabled(rename = "Config type")]
    config_type: String,
    #[tabled(rename = "Frames")]
    frames: usize,
}

#[derive(Debug, Clone, Tabled)]
struct E0Row {
    #[tabled(rename = "Z")]
    number: String,
    #[tabled(rename = "Element")]
    symbol: String,
    #[tabled(rename = "E0 (eV)")]
    energy: String,
}

#[derive(Debug, Serialize)]
struct FrameRow<'a> {
    name: &'a str,
    config_type: &'a str,
    formula: String,
    atoms: usize,
    energy: f64,
    energy_per_atom: f64,
    max_force: f64,
}

/// 写出每帧一行的 CSV 明细
pub fn write_summary_csv(frames: &[LabelledFrame], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for frame in frames {
        let atoms = frame.structure.num_atoms();
        writer.serialize(FrameRow {
            name: &frame.structure.name,
            config_type: &frame.config_type,
            formula: frame.structure.formula(),
            atoms,
            energy: frame.energy,
            energy_per_atom: frame.energy / atoms.max(1) as f64,
            max_force: frame.max_force(),
        })?;
    }
    writer.flush().map_err(|e| PhonfitError::write(path, e))
}

fn print_dataset(summary: &DatasetSummary) {
    let counts: Vec<CountRow> = summary
        .config_type_counts
        .iter()
        .map(|(k, v)| CountRow {
            config_type: k.clone(),
            frames: *v,
        })
        .collect();
    println!("{}", Table::new(&counts));

    if summary.isolated_atom_energies.is_empty() {
        output::print_warning("No isolated-atom calculations found; E0 values are missing");
        return;
    }
    let e0: Vec<E0Row> = summary
        .isolated_atom_energies
        .iter()
        .map(|(z, e)| E0Row {
            number: z.clone(),
            symbol: z
                .parse()
                .ok()
                .and_then(symbol_for)
                .unwrap_or("?")
                .to_string(),
            energy: format!("{:.6}", e),
        })
        .collect();
    println!("{}", Table::new(&e0));
}

/// 执行 collect 命令
pub fn execute(args: CollectArgs, quiet: bool) -> Result<()> {
    output::print_header("Collecting VASP Results");

    let dirs = dataset::find_vasp_dirs(&args.dft_dir, args.recursive)?;
    if dirs.is_empty() && args.merge.is_empty() {
        output::print_warning("No calculation directories with an OUTCAR found.");
        return Ok(());
    }

    let runner = BatchRunner::new(args.jobs).quiet(quiet);
    output::print_info(&format!(
        "Parsing {} directories with {} threads",
        dirs.len(),
        runner.jobs()
    ));

    let (mut frames, result) = dataset::collect_dirs(&dirs, &runner);
    for path in &args.merge {
        let merged = parse_extxyz_file(path)?;
        output::print_info(&format!("Merged {} frames from '{}'", merged.len(), path.display()));
        frames.extend(merged);
    }
    for (dir, reason) in &result.failures {
        output::print_skip(&format!("{}: {}", dir, reason));
    }
    if result.skipped > 0 {
        output::print_skip(&format!("{} unfinished calculations", result.skipped));
    }

    if frames.is_empty() {
        output::print_warning("No completed calculations found to collect.");
        return Ok(());
    }

    let summary = dataset::write_dataset(&frames, &args.output)?;
    print_dataset(&summary);

    if let Some(path) = &args.summary {
        write_summary_csv(&frames, path)?;
        output::print_success(&format!("Wrote per-frame summary to '{}'", path.display()));
    }

    output::print_done(&format!(
        "Collected {}/{} calculations into '{}'",
        summary.num_frames,
        result.total(),
        args.output.join(dataset::VASP_REF_FILE).display()
    ));
    Ok(())
}
