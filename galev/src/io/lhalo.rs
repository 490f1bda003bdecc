//! Reader for LHalo binary merger-tree files.
//!
//! Layout: `{ i32 ntrees; i32 tot_halos; i32 halos_per_tree[ntrees] }`
//! followed by the packed halo records of every tree in order. Files may
//! come from either endianness; the byte order is detected from the
//! header/file-length consistency check.

use crate::error::{Error, Result};
use crate::halo::Halo;
use bincode::Options;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Byte order of a tree file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Endian {
    /// Little-endian records.
    Little,
    /// Big-endian records.
    Big,
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8], endian: Endian) -> Result<T> {
    let options = bincode::options()
        .with_fixint_encoding()
        .allow_trailing_bytes();
    let value = match endian {
        Endian::Little => options.with_little_endian().deserialize(bytes),
        Endian::Big => options.with_big_endian().deserialize(bytes),
    };
    value.map_err(|err| Error::Format {
        path: PathBuf::new(),
        reason: err.to_string(),
    })
}

/// An open LHalo tree file, its table of contents, and the detected byte
/// order. Trees are read strictly in file order.
#[derive(Debug)]
pub struct LHaloTreeFile {
    path: PathBuf,
    reader: BufReader<File>,
    endian: Endian,
    halos_per_tree: Vec<i32>,
    tot_halos: i32,
    next_tree: usize,
}

impl LHaloTreeFile {
    /// Open `path`, read the tree table, and detect the endianness.
    ///
    /// # Errors
    ///
    /// [`Error::MissingDataFile`] when the file cannot be opened,
    /// [`Error::Format`] when the header is consistent in neither byte
    /// order.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|err| Error::MissingDataFile {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        let file_len = file
            .metadata()
            .map_err(|err| Error::MissingDataFile {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?
            .len();
        let mut reader = BufReader::new(file);

        let mut head = [0_u8; 8];
        reader.read_exact(&mut head).map_err(|_| Error::Format {
            path: path.to_path_buf(),
            reason: "file too short for the tree-table header".into(),
        })?;

        let endian = [Endian::Little, Endian::Big]
            .into_iter()
            .find(|&endian| {
                let (ntrees, tot_halos): (i32, i32) = match decode(&head, endian) {
                    Ok(pair) => pair,
                    Err(_) => return false,
                };
                ntrees >= 0
                    && tot_halos >= 0
                    && file_len
                        == 8 + 4 * u64::from(ntrees.unsigned_abs())
                            + Halo::RECORD_SIZE * u64::from(tot_halos.unsigned_abs())
            })
            .ok_or_else(|| Error::Format {
                path: path.to_path_buf(),
                reason: "tree-table header matches neither byte order".into(),
            })?;

        let (ntrees, tot_halos): (i32, i32) = decode(&head, endian)?;

        let mut table = vec![0_u8; 4 * ntrees.unsigned_abs() as usize];
        reader.read_exact(&mut table).map_err(|_| Error::Format {
            path: path.to_path_buf(),
            reason: "short tree table".into(),
        })?;
        let halos_per_tree: Vec<i32> = table
            .chunks_exact(4)
            .map(|chunk| decode(chunk, endian))
            .collect::<Result<_>>()?;

        if halos_per_tree.iter().any(|&n| n < 0)
            || halos_per_tree.iter().map(|&n| i64::from(n)).sum::<i64>()
                != i64::from(tot_halos)
        {
            return Err(Error::Format {
                path: path.to_path_buf(),
                reason: "tree table does not sum to the halo total".into(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            endian,
            halos_per_tree,
            tot_halos,
            next_tree: 0,
        })
    }

    /// Number of trees in the file.
    #[must_use]
    pub fn ntrees(&self) -> usize {
        self.halos_per_tree.len()
    }

    /// Total number of halos over all trees.
    #[must_use]
    pub fn tot_halos(&self) -> i32 {
        self.tot_halos
    }

    /// Detected byte order.
    #[must_use]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Read the next tree's halo records. Returns `None` after the last
    /// tree.
    ///
    /// # Errors
    ///
    /// [`Error::Format`] on a short or undecodable record.
    pub fn next_tree(&mut self) -> Result<Option<Vec<Halo>>> {
        let Some(&nhalos) = self.halos_per_tree.get(self.next_tree) else {
            return Ok(None);
        };
        self.next_tree += 1;

        let nhalos = nhalos.unsigned_abs() as usize;
        let mut bytes = vec![0_u8; nhalos * Halo::RECORD_SIZE as usize];
        self.reader.read_exact(&mut bytes).map_err(|_| Error::Format {
            path: self.path.clone(),
            reason: format!("short read in tree {}", self.next_tree - 1),
        })?;

        bytes
            .chunks_exact(Halo::RECORD_SIZE as usize)
            .map(|chunk| {
                decode(chunk, self.endian).map_err(|err| match err {
                    Error::Format { reason, .. } => Error::Format {
                        path: self.path.clone(),
                        reason,
                    },
                    other => other,
                })
            })
            .collect::<Result<_>>()
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_halos() -> Vec<Halo> {
        let mut fof = Halo::for_tests(63, 1000, 10.0);
        fof.descendant = -1;
        fof.most_bound_id = 4242;
        let mut sub = Halo::for_tests(63, 100, 1.0);
        sub.first_halo_in_fof_group = 0;
        vec![fof, sub]
    }

    fn write_file(path: &Path, halos: &[Halo], big_endian: bool) {
        let options = bincode::options()
            .with_fixint_encoding()
            .allow_trailing_bytes();
        let mut bytes = Vec::new();
        let header = (2_i32, halos.len() as i32, [1_i32, 1_i32]);
        if big_endian {
            let opts = options.with_big_endian();
            bytes.extend(opts.serialize(&header).unwrap());
            for halo in halos {
                bytes.extend(opts.serialize(halo).unwrap());
            }
        } else {
            let opts = options.with_little_endian();
            bytes.extend(opts.serialize(&header).unwrap());
            for halo in halos {
                bytes.extend(opts.serialize(halo).unwrap());
            }
        }
        let mut file = File::create(path).unwrap();
        file.write_all(&bytes).unwrap();
    }

    #[test]
    fn reads_little_endian_trees() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trees.0");
        write_file(&path, &sample_halos(), false);

        let mut file = LHaloTreeFile::open(&path).unwrap();
        assert_eq!(file.endian(), Endian::Little);
        assert_eq!(file.ntrees(), 2);
        assert_eq!(file.tot_halos(), 2);

        let tree0 = file.next_tree().unwrap().unwrap();
        assert_eq!(tree0.len(), 1);
        assert_eq!(tree0[0].most_bound_id, 4242);
        assert_eq!(tree0[0].len, 1000);

        let tree1 = file.next_tree().unwrap().unwrap();
        assert_eq!(tree1[0].len, 100);
        assert!(file.next_tree().unwrap().is_none());
    }

    #[test]
    fn detects_big_endian_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trees.0");
        write_file(&path, &sample_halos(), true);

        let mut file = LHaloTreeFile::open(&path).unwrap();
        assert_eq!(file.endian(), Endian::Big);
        let tree0 = file.next_tree().unwrap().unwrap();
        assert_eq!(tree0[0].most_bound_id, 4242);
        assert!((tree0[0].mvir - 10.0).abs() < 1e-6);
    }

    #[test]
    fn truncated_file_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trees.0");
        write_file(&path, &sample_halos(), false);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();

        let err = LHaloTreeFile::open(&path).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn missing_file_is_reported_as_such() {
        let err = LHaloTreeFile::open(Path::new("/nonexistent/trees.0")).unwrap_err();
        assert!(matches!(err, Error::MissingDataFile { .. }));
    }

    #[test]
    fn empty_tree_file_has_no_trees() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trees.0");
        let options = bincode::options()
            .with_fixint_encoding()
            .allow_trailing_bytes();
        std::fs::write(&path, options.serialize(&(0_i32, 0_i32)).unwrap()).unwrap();

        let mut file = LHaloTreeFile::open(&path).unwrap();
        assert_eq!(file.ntrees(), 0);
        assert!(file.next_tree().unwrap().is_none());
    }
}
