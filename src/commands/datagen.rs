//! # datagen 命令实现
//!
//! 构建随机结构数据生成作业流（体相弛豫 → 随机结构 → 静态计算），
//! 或仅写出随机结构；指定 `--test-potential` 时构建 MD 测试集作业流。
//!
//! ## 依赖关系
//! - 使用 `cli/datagen.rs` 定义的参数
//! - 使用 `makers/datagen.rs`, `makers/testing.rs`, `perturb/`
//! - 使用 `utils/output.rs`

use super::structures::{incar_updates, load_structure, save_flow};
use crate::cli::datagen::DatagenArgs;
use crate::config::Config;
use crate::error::{PhonfitError, Result};
use crate::flow::{update_user_incar_settings, Flow};
use crate::makers::datagen::randomize;
use crate::makers::{MlPotential, PotentialKind, RandomStructuresDataGenerator, TestDataGenerator};
use crate::models::structure::diagonal_matrix;
use crate::models::Crystal;
use crate::parsers::poscar::write_poscar_file;
use crate::perturb::{DistortType, RandomizeSettings, RattleMode};
use crate::utils::output;
use std::fs;

/// 配置文件默认值叠加命令行参数
pub fn randomize_settings(args: &DatagenArgs, config: &Config) -> Result<RandomizeSettings> {
    let mut settings = config.datagen.clone();

    if let Some(dt) = args.distort_type {
        settings.distort_type = DistortType::try_from(dt)?;
    }
    if let Some(n) = args.n_structures {
        settings.n_structures = n;
    }
    if let Some(range) = &args.volume_range {
        if range.len() != 2 || range[0] > range[1] {
            return Err(PhonfitError::InvalidArgument(format!(
                "--volume-range expects MIN,MAX, got {:?}",
                range
            )));
        }
        settings.volume_scale_factor_range = [range[0], range[1]];
    }
    if let Some(factors) = &args.volume_factors {
        settings.volume_custom_scale_factors = Some(factors.clone());
    }
    if let Some(sc) = &args.supercell {
        if sc.len() != 3 || sc.iter().any(|&n| n < 1) {
            return Err(PhonfitError::InvalidArgument(format!(
                "--supercell expects three positive integers, got {:?}",
                sc
            )));
        }
        settings.supercell_matrix = diagonal_matrix([sc[0], sc[1], sc[2]]);
    }
    if let Some(std_dev) = args.rattle_std {
        settings.rattle.std_dev = std_dev;
    }
    if let Some(seed) = args.seed {
        settings.rattle.seed = seed;
    }
    if let Some(n_iter) = args.mc_rattle {
        settings.rattle.mode = RattleMode::MonteCarlo { n_iter };
    }
    if let Some(d) = args.min_distance {
        settings.min_distance = d;
        settings.rattle.min_distance = d;
    }
    Ok(settings)
}

/// 执行 datagen 命令
pub fn execute(args: DatagenArgs, config: &Config) -> Result<()> {
    let structure = load_structure(&args.structure)?;
    let mp_id = args.mp_id.clone().unwrap_or_else(|| structure.name.clone());

    if let Some(kind) = args.test_potential {
        return build_test_data(&args, config, kind, &structure);
    }

    output::print_header("Random Structure Data Generation");
    let settings = randomize_settings(&args, config)?;
    output::print_info(&format!(
        "{} ({}), distort type {}, {} structures",
        mp_id,
        structure.formula(),
        settings.distort_type,
        settings.expected_count()
    ));

    if let Some(dir) = &args.structures_only {
        fs::create_dir_all(dir).map_err(|e| PhonfitError::write(dir, e))?;
        let structures = randomize(&structure, &settings, &mp_id)?;
        for s in &structures {
            write_poscar_file(s, &dir.join(format!("POSCAR_{}", s.name)))?;
        }
        output::print_done(&format!(
            "Wrote {} structures to '{}'",
            structures.len(),
            dir.display()
        ));
        return Ok(());
    }

    let mut generator = RandomStructuresDataGenerator::new(settings);
    if args.no_relax {
        generator = generator.bulk_relax_maker(None);
    }
    let mut flow = generator.make(&structure, &mp_id, None);
    apply_incar(&mut flow, &args)?;
    save_flow(&flow, &args.output)
}

fn apply_incar(flow: &mut Flow, args: &DatagenArgs) -> Result<()> {
    let updates = incar_updates(&args.incar)?;
    if !updates.is_empty() {
        let n = update_user_incar_settings(flow, &updates, None);
        output::print_info(&format!("Applied INCAR overrides to {} makers", n));
    }
    Ok(())
}

fn build_test_data(
    args: &DatagenArgs,
    config: &Config,
    kind: PotentialKind,
    structure: &Crystal,
) -> Result<()> {
    output::print_header("ML Test Data Generation");

    let mut potential = MlPotential::new(kind);
    if let Some(path) = args.potential_file.clone().or_else(|| config.ml.potential_file.clone()) {
        potential = potential.with_file(path);
    }

    let generator = TestDataGenerator {
        potential,
        cell_factor_sequence: args.cell_factors.clone(),
        n_structures: args.test_frames,
        steps: args.md_steps,
    };
    let flow = generator.make(std::slice::from_ref(structure))?;
    output::print_info(&format!(
        "{} MD runs of {} steps, {} frames each",
        args.cell_factors.len(),
        args.md_steps,
        args.test_frames
    ));
    save_flow(&flow, &args.output)
}
