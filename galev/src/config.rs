//! Run configuration: the parameter file, the snapshot list, and the
//! quantities derived from both at startup.
//!
//! Everything here is immutable once [`Config::from_file`] returns; workers
//! share the value by reference.

use crate::cosmology::{Cosmology, Units};
use crate::error::{Error, Result};
use log::debug;
use rustc_hash::FxHashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Compile-time bound on the number of snapshots in the snapshot list.
pub const MAX_SNAPS: usize = 1000;

/// Default hard cap for the working galaxy array.
pub const DEFAULT_GALAXY_HARD_CAP: usize = 100_000_000;

/// Supported merger-tree input formats.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TreeType {
    /// Packed LHalo binary trees.
    LHaloBinary,
    /// Genesis HDF5 trees; recognized, but the codec is not linked into
    /// this build.
    GenesisLHaloHdf5,
}

impl FromStr for TreeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lhalo_binary" => Ok(Self::LHaloBinary),
            "genesis_lhalo_hdf5" => Ok(Self::GenesisLHaloHdf5),
            other => Err(Error::Config(format!("unknown TreeType `{other}`"))),
        }
    }
}

/// Radio-mode black-hole accretion recipe selector.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AgnRecipe {
    /// No radio-mode heating.
    Off,
    /// Empirical accretion rate scaled by `RadioModeEfficiency`.
    Empirical,
    /// Bondi–Hoyle accretion.
    BondiHoyle,
    /// Cold-cloud accretion with a trigger radius.
    ColdCloud,
}

impl AgnRecipe {
    fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::Off),
            1 => Ok(Self::Empirical),
            2 => Ok(Self::BondiHoyle),
            3 => Ok(Self::ColdCloud),
            other => Err(Error::Config(format!("AGNrecipeOn must be 0..=3, got {other}"))),
        }
    }
}

/// The complete, validated run configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory the output catalogues are written to.
    pub output_dir: PathBuf,
    /// File-name prefix of the output catalogues.
    pub file_name_galaxies: String,
    /// Directory holding the merger-tree files.
    pub simulation_dir: PathBuf,
    /// Base name of the tree files (numeric extension appended).
    pub tree_name: String,
    /// Input format of the tree files.
    pub tree_type: TreeType,
    /// Directory holding the eight cooling-function tables.
    pub cool_functions_dir: PathBuf,
    /// First tree file number (inclusive).
    pub first_file: i32,
    /// Last tree file number (inclusive).
    pub last_file: i32,
    /// Snapshot number of the final simulation output.
    pub last_snapshot: i32,

    /// Photoionisation suppression of infall on or off.
    pub reionization_on: bool,
    /// Supernova feedback on or off.
    pub supernova_recipe_on: bool,
    /// Disk-instability checks on or off.
    pub disk_instability_on: bool,
    /// Star-formation prescription selector (only 0 is compiled in).
    pub sf_prescription: i32,
    /// Radio-mode AGN recipe.
    pub agn_recipe: AgnRecipe,

    /// Star-formation efficiency per dynamical time.
    pub sfr_efficiency: f64,
    /// Cold gas reheated per unit stellar mass formed.
    pub feedback_reheating_epsilon: f64,
    /// Supernova energy coupling for halo ejection.
    pub feedback_ejection_efficiency: f64,
    /// Fraction of new stellar mass returned instantly.
    pub recycle_fraction: f64,
    /// Metal mass produced per unit stellar mass formed.
    pub metal_yield: f64,
    /// Fraction of new metals deposited directly in the hot phase.
    pub frac_z_leave_disk: f64,
    /// Reincorporation speed of the ejected reservoir.
    pub reincorporation_factor: f64,
    /// Radio-mode accretion efficiency.
    pub radio_mode_efficiency: f64,
    /// Quasar-mode wind coupling efficiency.
    pub quasar_mode_efficiency: f64,
    /// Black-hole growth rate in mergers.
    pub black_hole_growth_rate: f64,
    /// Mass ratio above which a merger counts as major.
    pub thresh_major_merger: f64,
    /// Halo-to-baryon ratio below which satellites are resolved.
    pub threshold_sat_disruption: f64,
    /// Redshift at which the UV background switches on.
    pub reionization_z0: f64,
    /// Redshift at which reionization completes.
    pub reionization_zr: f64,
    /// Supernova energy in erg.
    pub energy_sn: f64,
    /// Supernovae per solar mass of stars formed.
    pub eta_sn: f64,
    /// Gas clumping factor; parsed and carried, consumed by no compiled-in
    /// star-formation prescription.
    pub clumping_factor: f64,

    /// Hard cap on the working galaxy array.
    pub galaxy_hard_cap: usize,

    /// Cosmological parameters and derived unit constants.
    pub cosmo: Cosmology,

    /// Scale factor of every snapshot.
    pub aa: Vec<f64>,
    /// Redshift of every snapshot.
    pub zz: Vec<f64>,
    /// Time to present of every snapshot, code units.
    pub age: Vec<f64>,
    /// Snapshots selected for output, in file order.
    pub output_snaps: Vec<i32>,
}

impl Config {
    /// Parse a parameter file, read its snapshot list, and derive the unit
    /// system and snapshot times.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for missing, unknown, or malformed parameters,
    /// [`Error::MissingDataFile`] when the snapshot list cannot be read.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|err| Error::MissingDataFile {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        let (mut params, arrow) = ParamFile::parse(&text)?;

        let tree_type: TreeType = params.required::<String>("TreeType")?.parse()?;
        if tree_type == TreeType::GenesisLHaloHdf5 {
            return Err(Error::Config(
                "unsupported tree type `genesis_lhalo_hdf5`: the HDF5 codec is not part of this build"
                    .into(),
            ));
        }

        let units = Units::new(
            params.required("UnitLength_in_cm")?,
            params.required("UnitMass_in_g")?,
            params.required("UnitVelocity_in_cm_per_s")?,
            params.required("Hubble_h")?,
            params.required("EnergySN")?,
            params.required("EtaSN")?,
        );
        let cosmo = Cosmology {
            omega: params.required("Omega")?,
            omega_lambda: params.required("OmegaLambda")?,
            hubble_h: params.required("Hubble_h")?,
            baryon_frac: params.required("BaryonFrac")?,
            part_mass: params.required("PartMass")?,
            units,
        };

        let last_snapshot: i32 = params.required("LastSnapShotNr")?;
        let snap_list_path: PathBuf = params.required::<String>("FileWithSnapList")?.into();
        let aa = read_snapshot_list(&snap_list_path)?;
        if aa.len() <= last_snapshot.unsigned_abs() as usize {
            return Err(Error::Config(format!(
                "snapshot list holds {} entries but LastSnapShotNr is {last_snapshot}",
                aa.len()
            )));
        }

        let num_outputs: i64 = params.required("NumOutputs")?;
        let output_snaps = select_output_snaps(num_outputs, last_snapshot, arrow.as_deref())?;

        let mut config = Self {
            output_dir: params.required::<String>("OutputDir")?.into(),
            file_name_galaxies: params.required("FileNameGalaxies")?,
            simulation_dir: params.required::<String>("SimulationDir")?.into(),
            tree_name: params.required("TreeName")?,
            tree_type,
            cool_functions_dir: params.required::<String>("CoolFunctionsDir")?.into(),
            first_file: params.required("FirstFile")?,
            last_file: params.required("LastFile")?,
            last_snapshot,
            reionization_on: params.required::<i64>("ReionizationOn")? != 0,
            supernova_recipe_on: params.required::<i64>("SupernovaRecipeOn")? != 0,
            disk_instability_on: params.required::<i64>("DiskInstabilityOn")? != 0,
            sf_prescription: params.required("SFprescription")?,
            agn_recipe: AgnRecipe::from_code(params.required("AGNrecipeOn")?)?,
            sfr_efficiency: params.required("SfrEfficiency")?,
            feedback_reheating_epsilon: params.required("FeedbackReheatingEpsilon")?,
            feedback_ejection_efficiency: params.required("FeedbackEjectionEfficiency")?,
            recycle_fraction: params.required("RecycleFraction")?,
            metal_yield: params.required("Yield")?,
            frac_z_leave_disk: params.required("FracZleaveDisk")?,
            reincorporation_factor: params.required("ReIncorporationFactor")?,
            radio_mode_efficiency: params.required("RadioModeEfficiency")?,
            quasar_mode_efficiency: params.required("QuasarModeEfficiency")?,
            black_hole_growth_rate: params.required("BlackHoleGrowthRate")?,
            thresh_major_merger: params.required("ThreshMajorMerger")?,
            threshold_sat_disruption: params.required("ThresholdSatDisruption")?,
            reionization_z0: params.required("Reionization_z0")?,
            reionization_zr: params.required("Reionization_zr")?,
            energy_sn: params.required("EnergySN")?,
            eta_sn: params.required("EtaSN")?,
            clumping_factor: params.optional("ClumpingFactor")?.unwrap_or(1.0),
            galaxy_hard_cap: params
                .optional("GalaxyHardCap")?
                .unwrap_or(DEFAULT_GALAXY_HARD_CAP),
            cosmo,
            aa,
            zz: Vec::new(),
            age: Vec::new(),
            output_snaps,
        };
        params.finish()?;

        if config.sf_prescription != 0 {
            return Err(Error::Config(format!(
                "SFprescription {} is not compiled in (only 0)",
                config.sf_prescription
            )));
        }
        if config.first_file < 0 || config.last_file < config.first_file {
            return Err(Error::Config(format!(
                "invalid file range {}..={}",
                config.first_file, config.last_file
            )));
        }

        config.derive_times();
        Ok(config)
    }

    /// Compute the per-snapshot redshifts and ages from the scale-factor
    /// list. Called by [`Config::from_file`]; exposed for embedders that
    /// assemble a `Config` by hand.
    pub fn derive_times(&mut self) {
        self.zz = self.aa.iter().map(|a| 1.0 / a - 1.0).collect();
        self.age = self.zz.iter().map(|&z| self.cosmo.time_to_present(z)).collect();
    }

    /// Redshift of `snap`.
    #[must_use]
    pub fn z_at(&self, snap: i32) -> f64 {
        self.zz[snap.unsigned_abs() as usize]
    }

    /// Time to present of `snap`, code units.
    #[must_use]
    pub fn age_at(&self, snap: i32) -> f64 {
        self.age[snap.unsigned_abs() as usize]
    }

    /// Path of tree file `filenr`.
    #[must_use]
    pub fn tree_file_path(&self, filenr: i32) -> PathBuf {
        self.simulation_dir
            .join(format!("{}.{filenr}", self.tree_name))
    }

    /// Path of the output catalogue for `snap` and `filenr`.
    #[must_use]
    pub fn output_file_path(&self, snap: i32, filenr: i32) -> PathBuf {
        let mut name = self.file_name_galaxies.clone();
        let _ = write!(name, "_z{:.3}_{filenr}", self.z_at(snap));
        self.output_dir.join(name)
    }
}

fn read_snapshot_list(path: &Path) -> Result<Vec<f64>> {
    let text = fs::read_to_string(path).map_err(|err| Error::MissingDataFile {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    let mut aa = Vec::new();
    for field in text.split_whitespace() {
        let a: f64 = field.parse().map_err(|_| Error::Format {
            path: path.to_path_buf(),
            reason: format!("bad scale factor `{field}`"),
        })?;
        if !(a > 0.0 && a <= 1.0) {
            return Err(Error::Format {
                path: path.to_path_buf(),
                reason: format!("scale factor {a} outside (0, 1]"),
            });
        }
        aa.push(a);
        if aa.len() > MAX_SNAPS {
            return Err(Error::Format {
                path: path.to_path_buf(),
                reason: format!("more than {MAX_SNAPS} snapshots"),
            });
        }
    }
    Ok(aa)
}

fn select_output_snaps(
    num_outputs: i64,
    last_snapshot: i32,
    arrow: Option<&str>,
) -> Result<Vec<i32>> {
    if num_outputs == -1 {
        return Ok((0..=last_snapshot).collect());
    }
    let wanted = usize::try_from(num_outputs)
        .map_err(|_| Error::Config(format!("NumOutputs must be -1 or ≥ 0, got {num_outputs}")))?;
    let listed = arrow.ok_or_else(|| {
        Error::Config("NumOutputs > 0 requires an `->` line listing the snapshots".into())
    })?;

    let mut snaps = Vec::with_capacity(wanted);
    for field in listed.split_whitespace() {
        let snap: i32 = field
            .parse()
            .map_err(|_| Error::Config(format!("bad output snapshot `{field}`")))?;
        if snap < 0 || snap > last_snapshot {
            return Err(Error::Config(format!(
                "output snapshot {snap} outside 0..={last_snapshot}"
            )));
        }
        snaps.push(snap);
    }
    if snaps.len() != wanted {
        return Err(Error::Config(format!(
            "NumOutputs is {wanted} but the `->` line lists {} snapshots",
            snaps.len()
        )));
    }
    Ok(snaps)
}

/// Key–value view of a parameter file with typed extraction and
/// unknown-key detection.
struct ParamFile {
    values: FxHashMap<String, String>,
    consumed: FxHashMap<String, ()>,
}

impl ParamFile {
    /// Parse `text`, returning the map and the optional `->` output-snapshot
    /// line.
    fn parse(text: &str) -> Result<(Self, Option<String>)> {
        let mut values = FxHashMap::default();
        let mut arrow = None;

        for raw in text.lines() {
            let line = raw
                .split(['%', '#'])
                .next()
                .unwrap_or_default()
                .trim();
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix("->") {
                arrow = Some(rest.trim().to_owned());
                continue;
            }
            let mut fields = line.split_whitespace();
            let key = fields.next().unwrap_or_default();
            let value = fields.next().ok_or_else(|| {
                Error::Config(format!("parameter `{key}` has no value"))
            })?;
            if values.insert(key.to_owned(), value.to_owned()).is_some() {
                return Err(Error::Config(format!("parameter `{key}` given twice")));
            }
        }

        Ok((
            Self {
                values,
                consumed: FxHashMap::default(),
            },
            arrow,
        ))
    }

    fn required<T: FromStr>(&mut self, key: &str) -> Result<T> {
        self.optional(key)?
            .ok_or_else(|| Error::Config(format!("missing parameter `{key}`")))
    }

    fn optional<T: FromStr>(&mut self, key: &str) -> Result<Option<T>> {
        self.consumed.insert(key.to_owned(), ());
        match self.values.get(key) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                Error::Config(format!("parameter `{key}` has malformed value `{raw}`"))
            }),
        }
    }

    /// Reject keys nothing asked for; they are almost always typos.
    fn finish(self) -> Result<()> {
        let mut unknown: Vec<_> = self
            .values
            .keys()
            .filter(|key| !self.consumed.contains_key(*key))
            .cloned()
            .collect();
        if unknown.is_empty() {
            return Ok(());
        }
        unknown.sort();
        debug!("unknown parameters: {unknown:?}");
        Err(Error::Config(format!(
            "unknown parameter(s): {}",
            unknown.join(", ")
        )))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use std::io::Write;

    pub(crate) fn write_snap_list(dir: &Path, n: usize) -> PathBuf {
        let path = dir.join("snaplist.txt");
        let mut file = fs::File::create(&path).unwrap();
        for i in 0..n {
            write!(file, "{:.6} ", (i + 1) as f64 / n as f64).unwrap();
        }
        path
    }

    fn parameter_text(snap_list: &Path) -> String {
        format!(
            "% galev test parameter file\n\
             FileNameGalaxies   model\n\
             OutputDir          ./output\n\
             SimulationDir      ./trees\n\
             TreeName           trees_063\n\
             TreeType           lhalo_binary\n\
             CoolFunctionsDir   ./cooling\n\
             FileWithSnapList   {}\n\
             FirstFile          0\n\
             LastFile           0\n\
             LastSnapShotNr     63\n\
             NumOutputs         -1\n\
             Omega              0.25\n\
             OmegaLambda        0.75\n\
             BaryonFrac         0.17\n\
             Hubble_h           0.73\n\
             PartMass           0.0861\n\
             UnitLength_in_cm   3.08568e+24\n\
             UnitMass_in_g      1.989e+43\n\
             UnitVelocity_in_cm_per_s 100000\n\
             ReionizationOn     1\n\
             SupernovaRecipeOn  1\n\
             DiskInstabilityOn  1\n\
             SFprescription     0\n\
             AGNrecipeOn        2\n\
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
            snap_list.display()
        )
    }

    #[test]
    fn full_parameter_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let snap_list = write_snap_list(dir.path(), 64);
        let param_path = dir.path().join("run.par");
        fs::write(&param_path, parameter_text(&snap_list)).unwrap();

        let config = Config::from_file(&param_path).unwrap();
        assert_eq!(config.tree_type, TreeType::LHaloBinary);
        assert_eq!(config.agn_recipe, AgnRecipe::BondiHoyle);
        assert_eq!(config.output_snaps.len(), 64);
        assert_eq!(config.aa.len(), 64);
        assert_eq!(config.age.len(), 64);
        // redshift of the final snapshot (a = 1) is zero
        assert_approx_eq!(f64, config.z_at(63), 0.0, epsilon = 1e-12);
        // ages decrease towards the present
        assert!(config.age_at(0) > config.age_at(63));
        assert_eq!(
            config.tree_file_path(5),
            PathBuf::from("./trees/trees_063.5")
        );
        assert_eq!(
            config.output_file_path(63, 0),
            PathBuf::from("./output/model_z0.000_0")
        );
    }

    #[test]
    fn missing_parameter_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let snap_list = write_snap_list(dir.path(), 64);
        let text = parameter_text(&snap_list).replace("SfrEfficiency      0.05\n", "");
        let param_path = dir.path().join("run.par");
        fs::write(&param_path, text).unwrap();

        let err = Config::from_file(&param_path).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("SfrEfficiency")));
    }

    #[test]
    fn unknown_parameter_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let snap_list = write_snap_list(dir.path(), 64);
        let text = parameter_text(&snap_list) + "NotAKey 1\n";
        let param_path = dir.path().join("run.par");
        fs::write(&param_path, text).unwrap();

        let err = Config::from_file(&param_path).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("NotAKey")));
    }

    #[test]
    fn hdf5_tree_type_is_rejected_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let snap_list = write_snap_list(dir.path(), 64);
        let text =
            parameter_text(&snap_list).replace("lhalo_binary", "genesis_lhalo_hdf5");
        let param_path = dir.path().join("run.par");
        fs::write(&param_path, text).unwrap();

        let err = Config::from_file(&param_path).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("unsupported tree type")));
    }

    #[test]
    fn explicit_output_snapshots_need_matching_count() {
        let dir = tempfile::tempdir().unwrap();
        let snap_list = write_snap_list(dir.path(), 64);
        let text = parameter_text(&snap_list).replace(
            "NumOutputs         -1\n",
            "NumOutputs         3\n-> 63 40 20\n",
        );
        let param_path = dir.path().join("run.par");
        fs::write(&param_path, text).unwrap();

        let config = Config::from_file(&param_path).unwrap();
        assert_eq!(config.output_snaps, vec![63, 40, 20]);

        let text = parameter_text(&snap_list)
            .replace("NumOutputs         -1\n", "NumOutputs         3\n-> 63 40\n");
        fs::write(&param_path, text).unwrap();
        assert!(Config::from_file(&param_path).is_err());
    }

    #[test]
    fn short_snapshot_list_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let snap_list = write_snap_list(dir.path(), 10);
        let param_path = dir.path().join("run.par");
        fs::write(&param_path, parameter_text(&snap_list)).unwrap();

        assert!(Config::from_file(&param_path).is_err());
    }
}
