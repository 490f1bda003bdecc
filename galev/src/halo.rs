//! Halo records as stored in LHalo merger-tree files, and the per-halo
//! scratch state used during one tree traversal.

use serde::{Deserialize, Serialize};

/// One halo of a merger tree.
///
/// The field order and widths reproduce the packed on-disk LHalo record
/// (104 bytes); the five link fields index the tree-local halo array, with
/// −1 denoting absence. Immutable once a tree is loaded.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Halo {
    /// Index of the descendant halo at a later snapshot.
    pub descendant: i32,
    /// Index of the first (main) progenitor.
    pub first_progenitor: i32,
    /// Next progenitor of this halo's descendant.
    pub next_progenitor: i32,
    /// First halo of the FOF group this halo belongs to.
    pub first_halo_in_fof_group: i32,
    /// Next halo in the same FOF group.
    pub next_halo_in_fof_group: i32,
    /// Number of simulation particles bound to the halo.
    pub len: i32,
    /// Mass within the mean-200 overdensity.
    pub m_mean200: f32,
    /// Mass within the critical-200 overdensity (the virial-mass estimator).
    pub mvir: f32,
    /// Mass within the top-hat overdensity.
    pub m_top_hat: f32,
    /// Comoving position.
    pub pos: [f32; 3],
    /// Peculiar velocity.
    pub vel: [f32; 3],
    /// Velocity dispersion.
    pub vel_disp: f32,
    /// Peak circular velocity.
    pub vmax: f32,
    /// Angular momentum vector.
    pub spin: [f32; 3],
    /// Identifier of the most bound particle.
    pub most_bound_id: i64,
    /// Snapshot index.
    pub snap_num: i32,
    /// Number of the file the halo was defined in.
    pub file_nr: i32,
    /// Subhalo index within its FOF group in the halo finder output.
    pub subhalo_index: i32,
    /// Half-mass value reported by the halo finder.
    pub sub_half_mass: f32,
}

impl Default for Halo {
    fn default() -> Self {
        Self {
            descendant: -1,
            first_progenitor: -1,
            next_progenitor: -1,
            first_halo_in_fof_group: -1,
            next_halo_in_fof_group: -1,
            len: 0,
            m_mean200: 0.0,
            mvir: 0.0,
            m_top_hat: 0.0,
            pos: [0.0; 3],
            vel: [0.0; 3],
            vel_disp: 0.0,
            vmax: 0.0,
            spin: [0.0; 3],
            most_bound_id: 0,
            snap_num: 0,
            file_nr: 0,
            subhalo_index: 0,
            sub_half_mass: 0.0,
        }
    }
}

impl Halo {
    /// Size of the packed on-disk record in bytes.
    pub const RECORD_SIZE: u64 = 104;

    /// Minimal self-hosting halo used by unit and scenario tests: the halo
    /// is its own FOF background at `snap_num` with the given size.
    #[must_use]
    pub fn for_tests(snap_num: i32, len: i32, mvir: f32) -> Self {
        Self {
            first_halo_in_fof_group: 0,
            len,
            mvir,
            snap_num,
            vmax: 200.0,
            spin: [0.01, 0.01, 0.01],
            ..Self::default()
        }
    }
}

/// Per-halo traversal state, reset for every tree.
#[derive(Clone, Copy, Debug, Default)]
pub struct HaloAux {
    /// Set when the depth-first walk has visited the halo.
    pub done: bool,
    /// FOF-group assembly phase: 0 untouched, 1 progenitors done,
    /// 2 evolved.
    pub fof_phase: u8,
    /// Start of this halo's window in the permanent galaxy array.
    pub first_galaxy: usize,
    /// Number of galaxies in that window.
    pub n_galaxies: usize,
}
