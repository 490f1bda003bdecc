//! Per-tree state: the halo array, the traversal scratch, and the working
//! and permanent galaxy arrays.
//!
//! Galaxy-to-galaxy and galaxy-to-halo relations are `(array, index)`
//! pairs throughout, matching the on-disk link semantics of the trees.

use crate::error::{Error, Result};
use crate::galaxy::Galaxy;
use crate::halo::{Halo, HaloAux};

/// Multiplier on the halo count for the initial working-array capacity.
const MAXGALFAC: usize = 1;
/// Lower bound on the initial working-array capacity.
const INITIAL_FLOOR: usize = 10_000;
/// Minimum number of slots added per growth step.
const MIN_GROWTH: usize = 1000;

/// Coordinates of a tree within the input, carried for diagnostics.
#[derive(Clone, Copy, Debug)]
pub struct TreeId {
    /// Input file number.
    pub filenr: i32,
    /// Tree index within the file.
    pub treenr: i32,
}

/// All mutable state of one tree while it is being processed.
#[derive(Debug)]
pub struct Tree {
    /// Where this tree came from.
    pub id: TreeId,
    /// Halo records, read-only after load.
    pub halos: Vec<Halo>,
    /// Traversal scratch, one entry per halo.
    pub aux: Vec<HaloAux>,
    /// Finalised galaxies, appended per FOF group; indexed by the windows
    /// in [`HaloAux`].
    pub galaxies: Vec<Galaxy>,
    working: Vec<Galaxy>,
    galaxy_counter: u64,
    hard_cap: usize,
}

impl Tree {
    /// Wrap a freshly loaded halo array.
    #[must_use]
    pub fn new(id: TreeId, halos: Vec<Halo>, hard_cap: usize) -> Self {
        let initial = (MAXGALFAC * halos.len()).max(INITIAL_FLOOR).min(hard_cap);
        let aux = vec![HaloAux::default(); halos.len()];
        Self {
            id,
            halos,
            aux,
            galaxies: Vec::new(),
            working: Vec::with_capacity(initial),
            galaxy_counter: 0,
            hard_cap,
        }
    }

    /// Number of halos in the tree.
    #[must_use]
    pub fn n_halos(&self) -> usize {
        self.halos.len()
    }

    /// Hand out the next per-tree galaxy sequence number.
    pub fn next_galaxy_nr(&mut self) -> u64 {
        let nr = self.galaxy_counter;
        self.galaxy_counter += 1;
        nr
    }

    /// The working galaxy set of the FOF group currently being assembled.
    #[must_use]
    pub fn working(&self) -> &[Galaxy] {
        &self.working
    }

    /// Mutable view of the working galaxy set.
    pub fn working_mut(&mut self) -> &mut [Galaxy] {
        &mut self.working
    }

    /// Append to the working set, growing by the ×1.25 (+1000 minimum)
    /// policy up to the hard cap.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceExhaustion`] once the hard cap is reached.
    pub fn push_working(&mut self, galaxy: Galaxy) -> Result<usize> {
        if self.working.len() == self.working.capacity() {
            let cap = self.working.capacity();
            if cap >= self.hard_cap {
                return Err(Error::ResourceExhaustion(format!(
                    "working galaxy array hit its hard cap of {} (file {}, tree {})",
                    self.hard_cap, self.id.filenr, self.id.treenr
                )));
            }
            let grown = (cap + (cap / 4).max(MIN_GROWTH)).min(self.hard_cap);
            self.working.reserve_exact(grown - self.working.len());
        }
        self.working.push(galaxy);
        Ok(self.working.len() - 1)
    }

    /// Drop the working set after a FOF group has been finalised. The
    /// capacity is kept for the next group.
    pub fn clear_working(&mut self) {
        self.working.clear();
    }
}

/// Distinct mutable references to two working-set galaxies.
///
/// # Panics
///
/// Panics if `i == j`.
pub fn pair_mut(galaxies: &mut [Galaxy], i: usize, j: usize) -> (&mut Galaxy, &mut Galaxy) {
    assert_ne!(i, j);
    if i < j {
        let (left, right) = galaxies.split_at_mut(j);
        (&mut left[i], &mut right[0])
    } else {
        let (left, right) = galaxies.split_at_mut(i);
        (&mut right[0], &mut left[j])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_cap(hard_cap: usize) -> Tree {
        Tree::new(
            TreeId {
                filenr: 0,
                treenr: 0,
            },
            vec![Halo::for_tests(0, 10, 1.0)],
            hard_cap,
        )
    }

    #[test]
    fn galaxy_numbers_are_sequential() {
        let mut tree = tree_with_cap(100);
        assert_eq!(tree.next_galaxy_nr(), 0);
        assert_eq!(tree.next_galaxy_nr(), 1);
        assert_eq!(tree.next_galaxy_nr(), 2);
    }

    #[test]
    fn working_array_grows_once_then_hits_the_cap() {
        let mut tree = tree_with_cap(12);
        // capacity starts at the hard cap here (floor is clamped by it)
        for _ in 0..12 {
            tree.push_working(Galaxy::new(0)).unwrap();
        }
        let err = tree.push_working(Galaxy::new(0)).unwrap_err();
        assert!(matches!(err, Error::ResourceExhaustion(_)));
    }

    #[test]
    fn growth_respects_the_additive_floor() {
        let mut tree = tree_with_cap(usize::MAX);
        let initial = tree.working.capacity();
        for _ in 0..=initial {
            tree.push_working(Galaxy::new(0)).unwrap();
        }
        // 10000 × 1.25 has grown past the additive floor
        assert!(tree.working.capacity() >= initial + MIN_GROWTH);
    }

    #[test]
    fn pair_mut_returns_disjoint_references() {
        let mut galaxies = vec![Galaxy::new(0), Galaxy::new(1), Galaxy::new(2)];
        let (a, b) = pair_mut(&mut galaxies, 2, 0);
        a.cold_gas = 1.0;
        b.hot_gas = 2.0;
        assert_eq!(galaxies[2].cold_gas, 1.0);
        assert_eq!(galaxies[0].hot_gas, 2.0);
    }
}
