#![allow(missing_docs)]

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use bincode::Options;
use galev::cooling::{N_METALLICITIES, N_TEMPS};
use galev::halo::Halo;
use predicates::prelude::*;
use std::fmt::Write as _;

const COOLING_TABLE_NAMES: [&str; N_METALLICITIES] = [
    "stripped_mzero.cie",
    "stripped_m-30.cie",
    "stripped_m-20.cie",
    "stripped_m-15.cie",
    "stripped_m-10.cie",
    "stripped_m-05.cie",
    "stripped_m-00.cie",
    "stripped_m+05.cie",
];

#[test]
fn help_names_the_flags() {
    Command::cargo_bin("galev")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--overwrite")
                .and(predicate::str::contains("--verbose"))
                .and(predicate::str::contains("--quiet"))
                .and(predicate::str::contains("PARAMETER_FILE")),
        );
}

#[test]
fn no_arguments_shows_help_and_fails() {
    Command::cargo_bin("galev").unwrap().assert().code(2);
}

#[test]
fn missing_parameter_file_exits_with_the_missing_file_code() {
    Command::cargo_bin("galev")
        .unwrap()
        .arg("/nonexistent/run.par")
        .assert()
        .code(3);
}

#[test]
fn invalid_parameter_file_exits_with_the_config_code() {
    let dir = TempDir::new().unwrap();
    let par = dir.child("run.par");
    par.write_str("TreeType lhalo_binary\n").unwrap();

    Command::cargo_bin("galev")
        .unwrap()
        .arg(par.path())
        .assert()
        .code(2);
}

fn write_run_inputs(dir: &TempDir) -> std::path::PathBuf {
    // snapshot list: 64 evenly spaced scale factors
    let mut snaplist = String::new();
    for i in 1..=64 {
        let _ = write!(snaplist, "{:.6} ", f64::from(i) / 64.0);
    }
    dir.child("snaplist.txt").write_str(&snaplist).unwrap();

    // eight flat synthetic cooling tables
    for name in COOLING_TABLE_NAMES {
        let mut table = String::new();
        for t in 0..N_TEMPS {
            let log_t = 4.0 + 0.05 * t as f64;
            let _ = writeln!(table, "{log_t:.2} 1 1 1 -21.0 -40.0 0 0 0 0 0 0");
        }
        dir.child("cooling").child(name).write_str(&table).unwrap();
    }

    // one tree, one solitary halo at the final snapshot
    let halo = Halo {
        first_halo_in_fof_group: 0,
        len: 1000,
        mvir: 10.0,
        snap_num: 63,
        vmax: 220.0,
        spin: [0.005, 0.005, 0.005],
        ..Halo::default()
    };
    let options = bincode::options()
        .with_fixint_encoding()
        .allow_trailing_bytes();
    let mut bytes = options.serialize(&(1_i32, 1_i32, [1_i32])).unwrap();
    bytes.extend(options.serialize(&halo).unwrap());
    dir.child("trees").child("trees_063.0").write_binary(&bytes).unwrap();

    let par = dir.child("run.par");
    par.write_str(&format!(
        "FileNameGalaxies   model\n\
         OutputDir          {out}\n\
         SimulationDir      {trees}\n\
         TreeName           trees_063\n\
         TreeType           lhalo_binary\n\
         CoolFunctionsDir   {cooling}\n\
         FileWithSnapList   {snaplist}\n\
         FirstFile          0\n\
         LastFile           0\n\
         LastSnapShotNr     63\n\
         NumOutputs         1\n\
         -> 63\n\
         Omega              0.25\n\
         OmegaLambda        0.75\n\
         BaryonFrac         0.17\n\
         Hubble_h           0.73\n\
         PartMass           0.0861\n\
         UnitLength_in_cm   3.08568e+24\n\
         UnitMass_in_g      1.989e+43\n\
         UnitVelocity_in_cm_per_s 100000\n\
         ReionizationOn     0\n\
         SupernovaRecipeOn  1\n\
         DiskInstabilityOn  1\n\
         SFprescription     0\n\
         AGNrecipeOn        0\n\
         SfrEfficiency      0.05\n\
         FeedbackReheatingEpsilon 3.0\n\
         FeedbackEjectionEfficiency 0.3\n\
         RecycleFraction    0.43\n\
         Yield              0.025\n\
         FracZleaveDisk     0.0\n\
         ReIncorporationFactor 0.15\n\
         RadioModeEfficiency 0.08\n\
         QuasarModeEfficiency 0.005\n\
         BlackHoleGrowthRate 0.015\n\
         ThreshMajorMerger  0.3\n\
         ThresholdSatDisruption 1.0\n\
         Reionization_z0    8.0\n\
         Reionization_zr    7.0\n\
         EnergySN           1e51\n\
         EtaSN              5e-3\n",
        out = dir.child("output").path().display(),
        trees = dir.child("trees").path().display(),
        cooling = dir.child("cooling").path().display(),
        snaplist = dir.child("snaplist.txt").path().display(),
    ))
    .unwrap();
    par.path().to_path_buf()
}

#[test]
fn a_tiny_run_produces_a_catalogue() {
    let dir = TempDir::new().unwrap();
    let par = write_run_inputs(&dir);

    Command::cargo_bin("galev")
        .unwrap()
        .arg(&par)
        .assert()
        .success();

    let catalogue = dir.child("output").child("model_z0.000_0");
    catalogue.assert(predicate::path::exists());

    // header: 1 tree, 1 galaxy, TreeNgals = [1]
    let bytes = std::fs::read(catalogue.path()).unwrap();
    assert_eq!(i32::from_le_bytes(bytes[0..4].try_into().unwrap()), 1);
    assert_eq!(i32::from_le_bytes(bytes[4..8].try_into().unwrap()), 1);
    assert_eq!(i32::from_le_bytes(bytes[8..12].try_into().unwrap()), 1);

    // a second run without --overwrite must refuse to clobber
    Command::cargo_bin("galev")
        .unwrap()
        .arg(&par)
        .assert()
        .failure();

    Command::cargo_bin("galev")
        .unwrap()
        .arg("--overwrite")
        .arg(&par)
        .assert()
        .success();
}
