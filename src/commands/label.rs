//! # label 命令实现
//!
//! 构建 DFT 静态标注作业流：体相结构、孤立原子与二聚体静态计算，
//! 结束后收集为 `vasp_ref.extxyz`。`--export` 时展开为 VASP 作业目录。
//!
//! ## 依赖关系
//! - 使用 `cli/label.rs` 定义的参数
//! - 使用 `makers/labelling.rs`, `commands/export.rs`
//! - 使用 `utils/output.rs`

use super::export::export_and_submit;
use super::structures::{incar_updates, load_structures, save_flow};
use crate::cli::label::LabelArgs;
use crate::config::Config;
use crate::error::{PhonfitError, Result};
use crate::flow::Input;
use crate::makers::labelling::labelling_flow;
use crate::makers::DftStaticLabelling;
use crate::utils::output;

/// 命令行参数转为标注配置
pub fn labelling_settings(args: &LabelArgs) -> Result<DftStaticLabelling> {
    let range = &args.dimer_range;
    if range.len() != 2 || range[0] <= 0.0 || range[0] > range[1] {
        return Err(PhonfitError::InvalidArgument(format!(
            "--dimer-range expects 0 < MIN <= MAX, got {:?}",
            range
        )));
    }

    Ok(DftStaticLabelling {
        isolated_atom: !args.no_isolated,
        e0_spin: args.e0_spin,
        dimer: !args.no_dimer,
        dimer_range: [range[0], range[1]],
        dimer_num: args.dimer_num,
        custom_incar: incar_updates(&args.incar)?,
        ..Default::default()
    })
}

/// 执行 label 命令
pub fn execute(args: LabelArgs, config: &Config) -> Result<()> {
    output::print_header("DFT Static Labelling");

    let structures = load_structures(&args.structures)?;
    let labelling = labelling_settings(&args)?;

    // 导出需要全部输入已知，直接展开
    let expanded = labelling.expand(&structures)?;
    output::print_info(&format!(
        "{} bulk structures -> {} static calculations",
        structures.len(),
        expanded.jobs().len()
    ));

    let flow = labelling_flow(Input::Value(structures), &labelling);
    save_flow(&flow, &args.output)?;

    export_and_submit(&expanded, &args.export, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use crate::flow::Flow;
    use crate::models::{IncarSettings, IncarValue};
    use clap::Parser;
    use std::fs;

    fn parse(argv: &[&str]) -> LabelArgs {
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Label(args) => args,
            _ => panic!("expected label"),
        }
    }

    #[test]
    fn test_settings_from_args() {
        let args = parse(&[
            "phonfit", "label", "structs", "--e0-spin", "--no-dimer", "--incar", "ENCUT=520",
        ]);
        let labelling = labelling_settings(&args).unwrap();
        assert!(labelling.e0_spin);
        assert!(labelling.isolated_atom);
        assert!(!labelling.dimer);
        assert_eq!(labelling.dimer_range, [1.0, 5.0]);
        assert_eq!(labelling.dimer_num, 21);

        let mut incar = IncarSettings::new();
        incar.apply(&labelling.custom_incar);
        assert_eq!(incar.get("ENCUT"), Some(&IncarValue::Int(520)));

        let custom = parse(&["phonfit", "label", "structs", "--dimer-range", "1.5,2.0"]);
        assert_eq!(labelling_settings(&custom).unwrap().dimer_range, [1.5, 2.0]);

        let bad = parse(&["phonfit", "label", "structs", "--dimer-range", "3.0,1.0"]);
        assert!(labelling_settings(&bad).is_err());
        let single = parse(&["phonfit", "label", "structs", "--dimer-range", "2.0"]);
        assert!(labelling_settings(&single).is_err());
    }

    #[test]
    fn test_label_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let poscar = dir.path().join("POSCAR_bulk");
        fs::write(
            &poscar,
            "SiO\n1.0\n5 0 0\n0 5 0\n0 0 5\nSi O\n1 1\nDirect\n0 0 0\n0.5 0.5 0.5\n",
        )
        .unwrap();
        let out = dir.path().join("label.json");
        let jobs = dir.path().join("jobs");

        let args = parse(&[
            "phonfit",
            "label",
            poscar.to_str().unwrap(),
            "--dimer-num",
            "2",
            "-o",
            out.to_str().unwrap(),
            "--export",
            jobs.to_str().unwrap(),
        ]);
        execute(args, &Config::default()).unwrap();

        let flow = Flow::load(&out).unwrap();
        assert_eq!(flow.job_names(), vec!["dft_static_labelling", "collect_dft_data"]);

        // 1 bulk + 2 isolated atoms + 3 pairs x 2 lengths
        let exported: Vec<_> = fs::read_dir(&jobs)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .collect();
        assert_eq!(exported.len(), 9);
        assert!(jobs.join("static_bulk_0").join("INCAR").is_file());
        assert!(jobs.join("static_isolated_1").join("POSCAR").is_file());
    }
}
