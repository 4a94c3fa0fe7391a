//! # phonon 命令实现
//!
//! 构建有限位移声子作业流：
//! - 默认 VASP（两次严格弛豫 → 超胞 → 位移 → 静态 → 汇总）
//! - `--ml` 换成机器学习势，流程不变；`--single-job` 时包装为单个动态作业
//! - `--displacements` 每个位移幅度一套 DFT 声子数据
//!
//! ## 依赖关系
//! - 使用 `cli/phonon.rs` 定义的参数
//! - 使用 `makers/phonon.rs`

use super::structures::{incar_updates, load_structure, save_flow};
use crate::cli::phonon::PhononArgs;
use crate::config::Config;
use crate::error::{PhonfitError, Result};
use crate::flow::{update_user_incar_settings, Flow, Input};
use crate::makers::phonon::{displacement_key, dft_phonopy_gen_data, phonon_ml_calculation_flow};
use crate::makers::{MlPhononMaker, MlPotential, PhononMaker};
use crate::models::Crystal;
use crate::utils::output;

fn check_amplitude(amplitude: f64) -> Result<()> {
    if amplitude.is_nan() || amplitude <= 0.0 {
        return Err(PhonfitError::InvalidArgument(format!(
            "displacement must be positive, got {}",
            amplitude
        )));
    }
    Ok(())
}

/// 按参数构建声子作业流
pub fn build_flow(args: &PhononArgs, config: &Config, structure: Crystal) -> Result<Flow> {
    if let Some(amplitudes) = &args.displacements {
        for &a in amplitudes {
            check_amplitude(a)?;
        }
        output::print_info(&format!(
            "DFT phonon data for displacements: {}",
            amplitudes
                .iter()
                .map(|&a| displacement_key(a))
                .collect::<Vec<_>>()
                .join(", ")
        ));
        return Ok(dft_phonopy_gen_data(
            Input::Value(structure),
            amplitudes,
            args.symprec,
            None,
            args.min_length,
        ));
    }

    check_amplitude(args.displacement)?;

    if let Some(kind) = args.ml {
        let potential_file = args
            .potential_file
            .clone()
            .or_else(|| config.ml.potential_file.clone());
        output::print_info(&format!("Using {} potential", kind));

        if args.single_job {
            let mut potential = MlPotential::new(kind);
            if let Some(path) = potential_file {
                potential = potential.with_file(path);
            }
            return Ok(phonon_ml_calculation_flow(
                potential,
                Input::Value(structure),
                args.min_length,
            ));
        }

        let mut ml = MlPhononMaker::new(MlPotential::new(kind));
        ml.displacement = args.displacement;
        ml.relax = !args.no_relax;
        ml.static_energy = !args.no_static;
        ml.max_atoms = args.max_atoms;
        ml.symprec = args.symprec;
        return Ok(ml.make_from_ml_model(
            Input::Value(structure),
            potential_file.as_deref(),
            Some(args.min_length),
        ));
    }

    let mut maker = PhononMaker::dft()
        .with_min_length(args.min_length)
        .with_displacement(args.displacement);
    if args.no_relax {
        maker.bulk_relax_maker = None;
    }
    maker.symprec = args.symprec;
    maker.supercell.max_atoms = args.max_atoms;
    if args.no_static {
        maker.static_energy_maker = None;
    }

    Ok(maker.make(Input::Value(structure)))
}

/// 执行 phonon 命令
pub fn execute(args: PhononArgs, config: &Config) -> Result<()> {
    output::print_header("Phonon Workflow");

    let structure = load_structure(&args.structure)?;
    output::print_info(&format!(
        "{} ({} atoms), min supercell length {} Å",
        structure.formula(),
        structure.num_atoms(),
        args.min_length
    ));

    let mut flow = build_flow(&args, config, structure)?;

    let updates = incar_updates(&args.incar)?;
    if !updates.is_empty() {
        let n = update_user_incar_settings(&mut flow, &updates, None);
        if n == 0 {
            output::print_warning("No VASP makers in this flow; --incar ignored");
        }
    }

    save_flow(&flow, &args.output)
}
