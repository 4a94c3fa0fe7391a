//! # run 命令实现
//!
//! 读取作业流 JSON，按依赖顺序在本地执行，结束后打印作业状态表并写出报告。
//!
//! ## 功能
//! - VASP / 机器学习势外部命令计算器
//! - 执行前按名称过滤批量修改 INCAR
//! - 执行前统一替换机器学习势参数文件
//! - `--keep-going` 时失败作业只阻塞其下游
//!
//! ## 依赖关系
//! - 使用 `cli/run.rs` 定义的参数
//! - 使用 `flow/runner.rs`, `flow/calculator.rs`, `flow/powerups.rs`
//! - 使用 `utils/output.rs`, `utils/progress.rs`, `tabled`

use super::structures::incar_updates;
use crate::cli::run::RunArgs;
use crate::config::Config;
use crate::error::Result;
use crate::flow::runner::write_report;
use crate::flow::{
    update_user_incar_settings, Calculators, Flow, JobState, LocalRunner, MlCommandCalculator,
    Responses, VaspCommandCalculator,
};
use crate::makers::iso_atom::energies_from_output;
use crate::utils::{output, progress};
use std::path::Path;
use tabled::{Table, Tabled};

/// 报告默认文件名
pub const REPORT_FILE: &str = "report.json";

#[derive(Debug, Clone, Tabled)]
struct JobRow {
    #[tabled(rename = "#")]
    seq: usize,
    #[tabled(rename = "Job")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Directory")]
    dir: String,
}

/// 由命令行和配置文件注册计算器
pub fn calculators(args: &RunArgs, config: &Config) -> Calculators {
    let mut calculators = Calculators::new();

    if let Some(cmd) = args.vasp_cmd.clone().or_else(|| config.vasp.command.clone()) {
        let potcar_dir = args.potcar_dir.clone().or_else(|| config.vasp.potcar_dir.clone());
        tracing::debug!(command = %cmd, "Registered VASP calculator");
        calculators = calculators.with_vasp(VaspCommandCalculator::new(cmd).with_potcar_dir(potcar_dir));
    }
    if let Some(cmd) = args.ml_cmd.clone().or_else(|| config.ml.command.clone()) {
        tracing::debug!(command = %cmd, "Registered ML calculator");
        calculators = calculators.with_ml(MlCommandCalculator::new(cmd));
    }
    calculators
}

/// 替换作业流中所有机器学习势的参数文件，返回修改的配方数
pub fn set_potential_file(flow: &mut Flow, path: &Path) -> usize {
    let mut n = 0;
    flow.for_each_job_mut(&mut |job| {
        for maker in job.kind.makers_mut() {
            if !maker.is_vasp() {
                maker.set_potential_file(path);
                n += 1;
            }
        }
    });
    n
}

/// 修改 INCAR 后执行作业流
pub fn run_flow(mut flow: Flow, args: &RunArgs, calculators: Calculators) -> Result<Responses> {
    let updates = incar_updates(&args.incar)?;
    if !updates.is_empty() {
        let n = update_user_incar_settings(&mut flow, &updates, args.filter.as_deref());
        output::print_info(&format!("Applied INCAR overrides to {} makers", n));
    }

    if let Some(path) = &args.potential_file {
        let n = set_potential_file(&mut flow, path);
        output::print_info(&format!("Potential file set for {} ML makers", n));
    }

    let runner = LocalRunner::new(calculators)
        .with_root(&args.root)
        .create_folders(!args.no_folders)
        .ensure_success(!args.keep_going);

    let spinner = progress::create_spinner(&format!("Running flow '{}'", flow.name));
    let result = runner.run(&flow);
    spinner.finish_and_clear();
    result
}

fn print_summary(responses: &Responses) {
    let rows: Vec<JobRow> = responses
        .records()
        .iter()
        .enumerate()
        .map(|(i, r)| JobRow {
            seq: i + 1,
            name: r.name.clone(),
            kind: r.kind.clone(),
            state: r.state.to_string(),
            dir: r
                .dir
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    println!("{}", Table::new(&rows));

    for record in responses.failed() {
        if let JobState::Failed(reason) = &record.state {
            output::print_error(&format!("{}: {}", record.name, reason));
        }
    }
}

/// 作业流输出为孤立原子能量时打印 E0
fn print_iso_atom_energies(value: &serde_json::Value) {
    let Ok(energies) = energies_from_output(value) else {
        return;
    };
    for (element, energy) in &energies {
        output::print_info(&format!("E0({}) = {:.6} eV", element, energy));
    }
}

/// 执行 run 命令
pub fn execute(args: RunArgs, config: &Config) -> Result<()> {
    output::print_header("Run Flow");

    let flow = Flow::load(&args.flow)?;
    output::print_info(&format!(
        "Loaded flow '{}' with {} jobs",
        flow.name,
        flow.jobs().len()
    ));

    let calculators = calculators(&args, config);
    let output_spec = flow.output.clone();
    let responses = run_flow(flow, &args, calculators)?;
    print_summary(&responses);
    if let Some(value) = output_spec.and_then(|spec| responses.resolve(&spec).ok()) {
        print_iso_atom_energies(&value);
    }

    let report = args
        .report
        .clone()
        .unwrap_or_else(|| args.root.join(REPORT_FILE));
    write_report(&responses, &report)?;

    let completed = responses.count(&JobState::Completed);
    let failed = responses.failed().len();
    let skipped = responses.count(&JobState::Skipped);
    output::print_separator();
    if failed == 0 && skipped == 0 {
        output::print_done(&format!(
            "{} jobs completed; report written to '{}'",
            completed,
            report.display()
        ));
    } else {
        output::print_warning(&format!(
            "{} completed, {} failed, {} skipped; report written to '{}'",
            completed,
            failed,
            skipped,
            report.display()
        ));
    }
    Ok(())
}
