//! # iso-atoms 命令实现
//!
//! 为给定元素（或结构文件中出现的元素）构建孤立原子静态计算。
//!
//! ## 依赖关系
//! - 使用 `cli/iso_atoms.rs` 定义的参数
//! - 使用 `makers/iso_atom.rs`, `commands/export.rs`

use super::export::export_and_submit;
use super::structures::{incar_updates, load_structure, save_flow};
use crate::cli::iso_atoms::IsoAtomsArgs;
use crate::config::Config;
use crate::error::{PhonfitError, Result};
use crate::flow::update_user_incar_settings;
use crate::makers::iso_atom::unique_species;
use crate::makers::IsoAtomMaker;
use crate::utils::output;

/// 元素列表：命令行直接给出，或从结构文件收集
pub fn resolve_species(args: &IsoAtomsArgs) -> Result<Vec<String>> {
    match &args.from {
        Some(files) => {
            let structures = files
                .iter()
                .map(|f| load_structure(f))
                .collect::<Result<Vec<_>>>()?;
            Ok(unique_species(&structures))
        }
        None => Ok(args.species.clone()),
    }
}

/// 命令行参数转为孤立原子配方
pub fn iso_atom_maker(args: &IsoAtomsArgs) -> Result<IsoAtomMaker> {
    let mut maker = IsoAtomMaker::default();
    if let Some(cell) = &args.cell {
        if cell.len() != 3 || cell.iter().any(|&v| v <= 0.0) {
            return Err(PhonfitError::InvalidArgument(format!(
                "--cell expects three positive lengths A,B,C, got {:?}",
                cell
            )));
        }
        maker.cell = [cell[0], cell[1], cell[2]];
    }
    Ok(maker)
}

/// 执行 iso-atoms 命令
pub fn execute(args: IsoAtomsArgs, config: &Config) -> Result<()> {
    output::print_header("Isolated Atom Energies");

    let species = resolve_species(&args)?;
    if species.is_empty() {
        return Err(PhonfitError::InvalidArgument("no elements given".to_string()));
    }

    let maker = iso_atom_maker(&args)?;
    let mut flow = maker.make(&species)?;
    output::print_info(&format!("Elements: {}", species.join(" ")));

    let updates = incar_updates(&args.incar)?;
    if !updates.is_empty() {
        update_user_incar_settings(&mut flow, &updates, None);
    }

    save_flow(&flow, &args.output)?;
    export_and_submit(&flow, &args.export, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use crate::flow::Flow;
    use crate::models::IncarValue;
    use clap::Parser;
    use std::fs;

    fn parse(argv: &[&str]) -> IsoAtomsArgs {
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::IsoAtoms(args) => args,
            _ => panic!("expected iso-atoms"),
        }
    }

    #[test]
    fn test_species_from_structures() {
        let dir = tempfile::tempdir().unwrap();
        let poscar = dir.path().join("sio2.vasp");
        fs::write(
            &poscar,
            "SiO2\n1.0\n5 0 0\n0 5 0\n0 0 5\nSi O\n1 2\nDirect\n0 0 0\n0.5 0.5 0.5\n0.2 0.2 0.2\n",
        )
        .unwrap();

        let args = parse(&["phonfit", "iso-atoms", "--from", poscar.to_str().unwrap()]);
        assert_eq!(resolve_species(&args).unwrap(), vec!["Si", "O"]);
    }

    #[test]
    fn test_execute_with_incar() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("iso.json");
        let args = parse(&[
            "phonfit",
            "iso-atoms",
            "si",
            "O",
            "Si",
            "--incar",
            "ENCUT=400",
            "-o",
            out.to_str().unwrap(),
        ]);
        execute(args, &Config::default()).unwrap();

        let flow = Flow::load(&out).unwrap();
        assert_eq!(flow.job_names(), vec!["Si-stat_iso_atom", "O-stat_iso_atom"]);
        let incar = flow.jobs()[0].kind.makers()[0].incar().unwrap().clone();
        assert_eq!(incar.get("ENCUT"), Some(&IncarValue::Int(400)));
    }

    #[test]
    fn test_cell_comma_list() {
        let args = parse(&["phonfit", "iso-atoms", "Si", "--cell", "15,15.5,16"]);
        assert_eq!(iso_atom_maker(&args).unwrap().cell, [15.0, 15.5, 16.0]);

        let short = parse(&["phonfit", "iso-atoms", "Si", "--cell", "15,16"]);
        assert!(iso_atom_maker(&short).is_err());
    }

    #[test]
    fn test_unknown_element() {
        let args = parse(&["phonfit", "iso-atoms", "Xx"]);
        assert!(execute(args, &Config::default()).is_err());
    }
}
