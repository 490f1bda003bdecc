//! Per-file orchestration: load trees, walk and evolve them, hand the
//! survivors to the recorder, and keep the output headers honest.
//!
//! Files are independent units of work and are distributed over a rayon
//! pool; everything within one file is strictly serial, so outputs are
//! bitwise reproducible.

use crate::config::Config;
use crate::cooling::CoolingTables;
use crate::error::{Error, Result};
use crate::io::lhalo::LHaloTreeFile;
use crate::io::output::SnapshotWriter;
use crate::recorder;
use crate::tree::{Tree, TreeId};
use crate::walker;
use log::{info, warn};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// What happened to one input file.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileSummary {
    /// Trees fully processed.
    pub trees_done: usize,
    /// Trees skipped after a per-tree failure.
    pub trees_skipped: usize,
    /// Galaxies written across all output snapshots.
    pub galaxies_written: i64,
}

/// Aggregate outcome of a run.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunSummary {
    /// Files that completed (possibly with skipped trees).
    pub files_done: usize,
    /// Files abandoned after a per-file failure.
    pub files_failed: usize,
    /// Trees fully processed across all files.
    pub trees_done: usize,
    /// Trees skipped across all files.
    pub trees_skipped: usize,
    /// Galaxies written across all files.
    pub galaxies_written: i64,
}

/// Process every file in the configured range, in parallel. Per-file
/// failures are logged and skipped; the run only fails as a whole when no
/// work could be attempted.
///
/// # Errors
///
/// Propagates nothing per-file; see [`RunSummary::files_failed`].
pub fn run(
    cfg: &Config,
    cooling: &CoolingTables,
    cancel: &AtomicBool,
    overwrite: bool,
) -> Result<RunSummary> {
    let files: Vec<i32> = (cfg.first_file..=cfg.last_file).collect();

    let summaries: Vec<(i32, Result<FileSummary>)> = files
        .par_iter()
        .map(|&filenr| {
            if cancel.load(Ordering::Relaxed) {
                return (filenr, Ok(FileSummary::default()));
            }
            (filenr, process_file(filenr, cfg, cooling, cancel, overwrite))
        })
        .collect();

    let mut summary = RunSummary::default();
    for (filenr, result) in summaries {
        match result {
            Ok(file) => {
                summary.files_done += 1;
                summary.trees_done += file.trees_done;
                summary.trees_skipped += file.trees_skipped;
                summary.galaxies_written += file.galaxies_written;
            }
            Err(err) => {
                warn!("file {filenr} failed: {err}");
                summary.files_failed += 1;
            }
        }
    }
    Ok(summary)
}

/// Process one tree file: open it, evolve each tree, record the outputs,
/// and finalize every snapshot catalogue's header — also on early exits,
/// so partial files stay self-describing.
///
/// # Errors
///
/// [`Error::MissingDataFile`] / [`Error::Format`] for problems with the
/// tree file itself, I/O errors from the writers. Per-tree invariant and
/// numeric failures are logged and skipped, not returned.
pub fn process_file(
    filenr: i32,
    cfg: &Config,
    cooling: &CoolingTables,
    cancel: &AtomicBool,
    overwrite: bool,
) -> Result<FileSummary> {
    let path = cfg.tree_file_path(filenr);
    let mut tree_file = LHaloTreeFile::open(&path)?;
    let ntrees = tree_file.ntrees();
    info!("file {filenr}: {ntrees} trees, {} halos", tree_file.tot_halos());

    let mut writers = cfg
        .output_snaps
        .iter()
        .map(|&snap| {
            SnapshotWriter::create(&cfg.output_file_path(snap, filenr), ntrees, overwrite)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut summary = FileSummary::default();
    let loop_result = (|| -> Result<()> {
        for treenr in 0..ntrees {
            if cancel.load(Ordering::Relaxed) {
                warn!("file {filenr}: cancelled after {treenr} trees");
                break;
            }

            let Some(halos) = tree_file.next_tree()? else {
                break;
            };
            let mut tree = Tree::new(
                TreeId {
                    filenr,
                    treenr: i32::try_from(treenr).unwrap_or(i32::MAX),
                },
                halos,
                cfg.galaxy_hard_cap,
            );

            let processed = walker::process_tree(&mut tree, cfg, cooling)
                .and_then(|()| recorder::prepare_tree_outputs(&tree, cfg));

            match processed {
                Ok(batches) => {
                    for (writer, batch) in writers.iter_mut().zip(&batches) {
                        summary.galaxies_written += batch.len() as i64;
                        writer.write_tree(batch)?;
                    }
                    summary.trees_done += 1;
                }
                Err(
                    err @ (Error::Invariant { .. }
                    | Error::Numeric(_)
                    | Error::ResourceExhaustion(_)),
                ) => {
                    warn!("file {filenr}, tree {treenr} skipped: {}", err.locate(filenr, i32::try_from(treenr).unwrap_or(i32::MAX)));
                    summary.trees_skipped += 1;
                    for writer in &mut writers {
                        writer.write_tree(&[])?;
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    })();

    // headers are rewritten even when the loop bailed out early
    for writer in writers {
        writer.finalize()?;
    }
    loop_result?;

    Ok(summary)
}
