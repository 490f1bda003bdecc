//! The packed on-disk galaxy record and the per-snapshot catalogue writer.

use crate::error::{Error, Result};
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

fn codec() -> impl Options {
    bincode::options()
        .with_fixint_encoding()
        .with_little_endian()
        .allow_trailing_bytes()
}

/// One galaxy as written to the output catalogues.
///
/// Fix-int little-endian encoding with no padding; field order is part of
/// the format. SFRs and the outflow rate are in M☉/yr, cooling and heating
/// in log₁₀(erg/s), times in Myr.
#[allow(missing_docs)]
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GalaxyOutput {
    pub galaxy_type: i32,
    pub galaxy_index: i64,
    pub halo_index: i32,
    pub fof_halo_index: i32,
    pub tree_index: i32,
    pub snap_num: i32,
    /// Substep length in Myr.
    pub dt: f32,
    pub central_gal: i32,
    pub central_mvir: f32,
    pub merge_type: i32,
    pub merge_into_id: i32,
    pub merge_into_snap_num: i32,
    /// Full snapshot interval in Myr.
    pub dt_interval: f32,
    pub pos: [f32; 3],
    pub vel: [f32; 3],
    pub spin: [f32; 3],
    pub len: i32,
    pub mvir: f32,
    pub rvir: f32,
    pub vvir: f32,
    pub vmax: f32,
    pub vel_disp: f32,
    pub cold_gas: f32,
    pub stellar_mass: f32,
    pub classical_bulge_mass: f32,
    pub secular_bulge_mass: f32,
    pub hot_gas: f32,
    pub ejected_mass: f32,
    pub black_hole_mass: f32,
    pub ics: f32,
    pub metals_cold_gas: f32,
    pub metals_stellar_mass: f32,
    pub metals_bulge_mass: f32,
    pub metals_hot_gas: f32,
    pub metals_ejected_mass: f32,
    pub metals_ics: f32,
    pub sfr_disk: f32,
    pub sfr_bulge: f32,
    pub sfr_disk_z: f32,
    pub sfr_bulge_z: f32,
    pub disk_scale_radius: f32,
    pub cooling: f32,
    pub heating: f32,
    pub last_major_merger: f32,
    pub last_minor_merger: f32,
    pub outflow_rate: f32,
    pub infall_mvir: f32,
    pub infall_vvir: f32,
    pub infall_vmax: f32,
}

impl GalaxyOutput {
    /// Packed size of one record in bytes.
    pub const RECORD_SIZE: u64 = 224;
}

/// Writer for one `{prefix}_z{z}_{filenr}` catalogue.
///
/// A `(ntrees + 2)`-int32 header is reserved up front and rewritten by
/// [`SnapshotWriter::finalize`] once the per-tree galaxy counts are known.
#[derive(Debug)]
pub struct SnapshotWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    ntrees: usize,
    tree_ngals: Vec<i32>,
}

impl SnapshotWriter {
    /// Create the catalogue file and reserve its header.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when the file exists and `overwrite` is not set;
    /// I/O errors otherwise.
    pub fn create(path: &Path, ntrees: usize, overwrite: bool) -> Result<Self> {
        if !overwrite && path.exists() {
            return Err(Error::Config(format!(
                "output file `{}` exists; pass --overwrite to replace it",
                path.display()
            )));
        }

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&vec![0_u8; 4 * (ntrees + 2)])?;

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            ntrees,
            tree_ngals: Vec::with_capacity(ntrees),
        })
    }

    /// Append one tree's galaxies. Must be called in tree order; pass an
    /// empty slice for trees that produced nothing (or were skipped).
    ///
    /// # Errors
    ///
    /// I/O errors, or [`Error::Invariant`] when called more than `ntrees`
    /// times.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn write_tree(&mut self, records: &[GalaxyOutput]) -> Result<()> {
        if self.tree_ngals.len() == self.ntrees {
            return Err(Error::invariant(
                -1,
                self.ntrees as i32,
                "more trees written than the header was sized for",
            ));
        }
        for record in records {
            codec()
                .serialize_into(&mut self.writer, record)
                .map_err(|err| Error::Format {
                    path: self.path.clone(),
                    reason: err.to_string(),
                })?;
        }
        self.tree_ngals.push(records.len() as i32);
        Ok(())
    }

    /// Galaxies written so far.
    #[must_use]
    pub fn tot_galaxies(&self) -> i64 {
        self.tree_ngals.iter().map(|&n| i64::from(n)).sum()
    }

    /// Rewrite the header with the final counts. Trees never reached (for
    /// example after cancellation) are recorded as empty.
    ///
    /// # Errors
    ///
    /// I/O errors from the seek or writes.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn finalize(mut self) -> Result<()> {
        self.tree_ngals.resize(self.ntrees, 0);
        let tot = self.tree_ngals.iter().map(|&n| i64::from(n)).sum::<i64>() as i32;

        self.writer.flush()?;
        let file = self.writer.get_mut();
        file.seek(SeekFrom::Start(0))?;
        let mut header = BufWriter::new(file);
        header.write_all(&(self.ntrees as i32).to_le_bytes())?;
        header.write_all(&tot.to_le_bytes())?;
        for &n in &self.tree_ngals {
            header.write_all(&n.to_le_bytes())?;
        }
        header.flush()?;
        Ok(())
    }
}

/// Parsed catalogue, used by tests and downstream tooling.
pub struct Catalogue {
    /// Per-tree galaxy counts from the header.
    pub tree_ngals: Vec<i32>,
    /// All galaxy records in file order.
    pub galaxies: Vec<GalaxyOutput>,
}

impl Catalogue {
    /// Read a catalogue written by [`SnapshotWriter`].
    ///
    /// # Errors
    ///
    /// [`Error::MissingDataFile`] or [`Error::Format`].
    #[allow(clippy::cast_sign_loss)]
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|err| Error::MissingDataFile {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        let format = |reason: &str| Error::Format {
            path: path.to_path_buf(),
            reason: reason.into(),
        };

        if bytes.len() < 8 {
            return Err(format("missing header"));
        }
        let ntrees = i32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let tot = i32::from_le_bytes(bytes[4..8].try_into().unwrap());
        if ntrees < 0 || tot < 0 {
            return Err(format("negative counts in header"));
        }
        let header_len = 8 + 4 * ntrees as usize;
        if bytes.len() < header_len {
            return Err(format("short tree-count table"));
        }
        let tree_ngals: Vec<i32> = bytes[8..header_len]
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
            .collect();

        let body = &bytes[header_len..];
        if body.len() as u64 != GalaxyOutput::RECORD_SIZE * tot as u64 {
            return Err(format("record section length mismatch"));
        }
        let galaxies = body
            .chunks_exact(GalaxyOutput::RECORD_SIZE as usize)
            .map(|chunk| {
                codec().deserialize(chunk).map_err(|err| Error::Format {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                })
            })
            .collect::<Result<_>>()?;

        Ok(Self {
            tree_ngals,
            galaxies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(galaxy_index: i64) -> GalaxyOutput {
        GalaxyOutput {
            galaxy_type: 0,
            galaxy_index,
            halo_index: 0,
            fof_halo_index: 0,
            tree_index: 0,
            snap_num: 63,
            dt: 1.0,
            central_gal: 0,
            central_mvir: 10.0,
            merge_type: 0,
            merge_into_id: -1,
            merge_into_snap_num: -1,
            dt_interval: 10.0,
            pos: [1.0, 2.0, 3.0],
            vel: [0.0; 3],
            spin: [0.01; 3],
            len: 1000,
            mvir: 10.0,
            rvir: 0.2,
            vvir: 200.0,
            vmax: 220.0,
            vel_disp: 120.0,
            cold_gas: 0.1,
            stellar_mass: 0.5,
            classical_bulge_mass: 0.2,
            secular_bulge_mass: 0.05,
            hot_gas: 1.0,
            ejected_mass: 0.0,
            black_hole_mass: 0.001,
            ics: 0.0,
            metals_cold_gas: 0.002,
            metals_stellar_mass: 0.01,
            metals_bulge_mass: 0.004,
            metals_hot_gas: 0.02,
            metals_ejected_mass: 0.0,
            metals_ics: 0.0,
            sfr_disk: 1.5,
            sfr_bulge: 0.1,
            sfr_disk_z: 0.02,
            sfr_bulge_z: 0.01,
            disk_scale_radius: 0.005,
            cooling: 40.0,
            heating: 39.0,
            last_major_merger: 900.0,
            last_minor_merger: 300.0,
            outflow_rate: 0.7,
            infall_mvir: 0.0,
            infall_vvir: 0.0,
            infall_vmax: 0.0,
        }
    }

    #[test]
    fn record_is_exactly_packed() {
        let bytes = codec().serialize(&record(1)).unwrap();
        assert_eq!(bytes.len() as u64, GalaxyOutput::RECORD_SIZE);
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model_z0.000_0");

        let mut writer = SnapshotWriter::create(&path, 3, false).unwrap();
        writer.write_tree(&[record(1), record(2)]).unwrap();
        writer.write_tree(&[]).unwrap();
        writer.write_tree(&[record(3)]).unwrap();
        assert_eq!(writer.tot_galaxies(), 3);
        writer.finalize().unwrap();

        let catalogue = Catalogue::read(&path).unwrap();
        assert_eq!(catalogue.tree_ngals, vec![2, 0, 1]);
        assert_eq!(catalogue.galaxies.len(), 3);
        assert_eq!(catalogue.galaxies[0], record(1));
        assert_eq!(catalogue.galaxies[2].galaxy_index, 3);
    }

    #[test]
    fn empty_catalogue_is_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model_z0.000_0");

        let writer = SnapshotWriter::create(&path, 0, false).unwrap();
        writer.finalize().unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8);
        let catalogue = Catalogue::read(&path).unwrap();
        assert!(catalogue.tree_ngals.is_empty());
        assert!(catalogue.galaxies.is_empty());
    }

    #[test]
    fn unfinished_trees_are_padded_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model_z0.000_0");

        let mut writer = SnapshotWriter::create(&path, 4, false).unwrap();
        writer.write_tree(&[record(7)]).unwrap();
        writer.finalize().unwrap();

        let catalogue = Catalogue::read(&path).unwrap();
        assert_eq!(catalogue.tree_ngals, vec![1, 0, 0, 0]);
        assert_eq!(catalogue.galaxies.len(), 1);
    }

    #[test]
    fn existing_files_need_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model_z0.000_0");
        std::fs::write(&path, b"old").unwrap();

        let err = SnapshotWriter::create(&path, 1, false).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(SnapshotWriter::create(&path, 1, true).is_ok());
    }
}
