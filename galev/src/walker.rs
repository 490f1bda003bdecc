//! Merger-tree traversal and galaxy assembly: walk each tree depth-first,
//! progenitors before descendants, and carry galaxy identities forward
//! through the halo links.

use crate::config::Config;
use crate::cooling::CoolingTables;
use crate::error::{Error, Result};
use crate::galaxy::{Galaxy, GalaxyType, MERGTIME_UNSET};
use crate::physics;
use crate::tree::Tree;

/// Process every halo of a tree in topological order, evolving each FOF
/// group one snapshot interval at a time as soon as its progenitors are
/// complete.
pub fn process_tree(tree: &mut Tree, cfg: &Config, cooling: &CoolingTables) -> Result<()> {
    for halonr in 0..tree.n_halos() {
        if !tree.aux[halonr].done {
            construct_galaxies(halonr, tree, cfg, cooling)?;
        }
    }
    Ok(())
}

#[allow(clippy::cast_sign_loss)]
fn construct_galaxies(
    halonr: usize,
    tree: &mut Tree,
    cfg: &Config,
    cooling: &CoolingTables,
) -> Result<()> {
    tree.aux[halonr].done = true;

    let mut prog = tree.halos[halonr].first_progenitor;
    while prog >= 0 {
        if !tree.aux[prog as usize].done {
            construct_galaxies(prog as usize, tree, cfg, cooling)?;
        }
        prog = tree.halos[prog as usize].next_progenitor;
    }

    let fof = tree.halos[halonr].first_halo_in_fof_group;
    if fof < 0 {
        return Err(Error::invariant(
            halonr as i32,
            -1,
            "halo has no FOF-background link",
        ));
    }
    let fof = fof as usize;

    // first pass over the group: make sure every member's progenitors are
    // done, so the whole group is chronologically consistent
    if tree.aux[fof].fof_phase == 0 {
        tree.aux[fof].fof_phase = 1;

        let mut member = fof as i32;
        while member >= 0 {
            let mut prog = tree.halos[member as usize].first_progenitor;
            while prog >= 0 {
                if !tree.aux[prog as usize].done {
                    construct_galaxies(prog as usize, tree, cfg, cooling)?;
                }
                prog = tree.halos[prog as usize].next_progenitor;
            }
            member = tree.halos[member as usize].next_halo_in_fof_group;
        }
    }

    // second pass: assemble the group's galaxies and evolve them over one
    // snapshot interval
    if tree.aux[fof].fof_phase == 1 {
        tree.aux[fof].fof_phase = 2;
        tree.clear_working();

        let mut ngal = 0;
        let mut member = fof as i32;
        while member >= 0 {
            ngal = join_galaxies_of_progenitors(member as usize, fof, ngal, tree, cfg)?;
            member = tree.halos[member as usize].next_halo_in_fof_group;
        }

        physics::evolve_galaxies(fof, tree, cfg, cooling)?;
        finalize_fof_group(tree)?;
    }

    Ok(())
}

/// Among a halo's progenitors, the one with the largest `Len` that hosts at
/// least one galaxy; `FirstProgenitor` when none does. This halo donates
/// the identity of the descendant's central galaxy.
#[allow(clippy::cast_sign_loss)]
fn most_massive_occupied_progenitor(halonr: usize, tree: &Tree) -> i32 {
    let mut first_occupied = tree.halos[halonr].first_progenitor;
    let mut len_occupied = -1_i64;

    let mut prog = tree.halos[halonr].first_progenitor;
    while prog >= 0 {
        let p = prog as usize;
        if tree.aux[p].n_galaxies > 0 && i64::from(tree.halos[p].len) > len_occupied {
            len_occupied = i64::from(tree.halos[p].len);
            first_occupied = prog;
        }
        prog = tree.halos[p].next_progenitor;
    }
    first_occupied
}

/// Copy the galaxies of every progenitor of `halonr` into the working set,
/// reclassifying them against the descendant halo. Returns the new working
/// count.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn join_galaxies_of_progenitors(
    halonr: usize,
    fof: usize,
    ngalstart: usize,
    tree: &mut Tree,
    cfg: &Config,
) -> Result<usize> {
    let first_occupied = most_massive_occupied_progenitor(halonr, tree);
    let z = cfg.z_at(tree.halos[halonr].snap_num);

    let mut ngal = ngalstart;
    let mut prog = tree.halos[halonr].first_progenitor;
    while prog >= 0 {
        let p = prog as usize;
        for i in 0..tree.aux[p].n_galaxies {
            let mut gal = tree.galaxies[tree.aux[p].first_galaxy + i].clone();
            gal.halonr = halonr;
            gal.dt = -1.0;

            if matches!(gal.galaxy_type, GalaxyType::Central | GalaxyType::Satellite) {
                let previous_mvir = gal.mvir;
                let previous_vvir = gal.vvir;
                let previous_vmax = gal.vmax;

                // fresh accumulators for the new snapshot interval
                gal.cooling_energy = 0.0;
                gal.heating_energy = 0.0;
                gal.outflow_rate = 0.0;
                gal.quasar_bh_accretion_mass = 0.0;
                gal.sfr_disk = [0.0; crate::STEPS];
                gal.sfr_bulge = [0.0; crate::STEPS];
                gal.sfr_disk_cold_gas = [0.0; crate::STEPS];
                gal.sfr_disk_cold_gas_metals = [0.0; crate::STEPS];
                gal.sfr_bulge_cold_gas = [0.0; crate::STEPS];
                gal.sfr_bulge_cold_gas_metals = [0.0; crate::STEPS];

                if prog == first_occupied {
                    // this progenitor donates the halo's central identity
                    let halo = &tree.halos[halonr];
                    gal.most_bound_id = halo.most_bound_id;
                    gal.pos = halo.pos;
                    gal.vel = halo.vel;
                    gal.len = halo.len;
                    gal.vmax = f64::from(halo.vmax);

                    let mvir = cfg.cosmo.virial_mass(&tree.halos, halonr);
                    gal.delta_mvir = mvir - gal.mvir;
                    if mvir > gal.mvir {
                        // a central's virial scale never shrinks
                        gal.rvir = cfg.cosmo.virial_radius(&tree.halos, halonr, z);
                        gal.vvir = cfg.cosmo.virial_velocity(&tree.halos, halonr, z);
                    }
                    gal.mvir = mvir;

                    if halonr == fof {
                        gal.merge_into_id = -1;
                        gal.merg_time = MERGTIME_UNSET;
                        gal.disk_scale_radius = disk_radius(tree, halonr, gal.vvir, gal.rvir);
                        gal.galaxy_type = GalaxyType::Central;
                    } else {
                        gal.merge_into_id = -1;
                        if gal.galaxy_type == GalaxyType::Central {
                            // entering a deeper potential: remember the
                            // properties the galaxy fell in with
                            gal.infall_mvir = previous_mvir;
                            gal.infall_vvir = previous_vvir;
                            gal.infall_vmax = previous_vmax;
                        }
                        if gal.galaxy_type == GalaxyType::Central || gal.merg_time_unset() {
                            gal.merg_time = physics::mergers::estimate_merging_time(
                                tree, halonr, fof, &gal, cfg,
                            );
                        }
                        gal.galaxy_type = GalaxyType::Satellite;
                    }
                } else {
                    // the subhalo was lost to another descendant: the
                    // galaxy is now an orphan and must be resolved soon
                    gal.delta_mvir = -gal.mvir;
                    gal.mvir = 0.0;

                    if gal.merg_time_unset() || gal.galaxy_type == GalaxyType::Central {
                        gal.merg_time = 0.0;
                        gal.infall_mvir = previous_mvir;
                        gal.infall_vvir = previous_vvir;
                        gal.infall_vmax = previous_vmax;
                    }
                    gal.galaxy_type = GalaxyType::Orphan;
                }
            }

            tree.push_working(gal)?;
            ngal += 1;
        }
        prog = tree.halos[p].next_progenitor;
    }

    // genesis: a FOF-background subhalo with no inherited galaxies hosts a
    // brand-new central
    if ngal == ngalstart && halonr == fof {
        let gal = init_galaxy(halonr, tree, cfg);
        tree.push_working(gal)?;
        ngal += 1;
    }

    // exactly one central or subhalo satellite may exist per (sub)halo
    let mut central = None;
    for i in ngalstart..ngal {
        if matches!(
            tree.working()[i].galaxy_type,
            GalaxyType::Central | GalaxyType::Satellite
        ) {
            if central.is_some() {
                return Err(Error::invariant(
                    halonr as i32,
                    i as i32,
                    "two central galaxies in one halo",
                ));
            }
            central = Some(i);
        }
    }
    if central.is_none() && ngal > ngalstart {
        return Err(Error::invariant(
            halonr as i32,
            ngalstart as i32,
            "halo hosts galaxies but no central",
        ));
    }
    for gal in &mut tree.working_mut()[ngalstart..ngal] {
        gal.central_gal = central;
    }

    Ok(ngal)
}

/// Create the first galaxy of a halo that has no progenitors carrying one.
#[allow(clippy::cast_sign_loss)]
fn init_galaxy(halonr: usize, tree: &mut Tree, cfg: &Config) -> Galaxy {
    let galaxy_nr = tree.next_galaxy_nr();
    let halo = &tree.halos[halonr];
    let z = cfg.z_at(halo.snap_num);

    let mut gal = Galaxy::new(galaxy_nr);
    gal.galaxy_type = GalaxyType::Central;
    gal.halonr = halonr;
    gal.most_bound_id = halo.most_bound_id;
    gal.snap_num = (halo.snap_num - 1).max(0);
    gal.pos = halo.pos;
    gal.vel = halo.vel;
    gal.len = halo.len;
    gal.vmax = f64::from(halo.vmax);
    gal.mvir = cfg.cosmo.virial_mass(&tree.halos, halonr);
    gal.rvir = cfg.cosmo.virial_radius(&tree.halos, halonr, z);
    gal.vvir = cfg.cosmo.virial_velocity(&tree.halos, halonr, z);
    gal.disk_scale_radius = disk_radius(tree, halonr, gal.vvir, gal.rvir);
    gal
}

/// Exponential disk scale radius from the halo spin (Mo, Mao & White 1998
/// with a Bullock-style spin parameter); a tenth of the virial radius for
/// spin-free halos.
fn disk_radius(tree: &Tree, halonr: usize, vvir: f64, rvir: f64) -> f64 {
    if vvir > 0.0 && rvir > 0.0 {
        let [sx, sy, sz] = tree.halos[halonr].spin.map(f64::from);
        let magnitude = sz.mul_add(sz, sx.mul_add(sx, sy * sy)).sqrt();
        let spin_parameter = magnitude / (std::f64::consts::SQRT_2 * vvir * rvir);
        (spin_parameter / std::f64::consts::SQRT_2) * rvir
    } else {
        0.1 * rvir
    }
}

/// Append the group's surviving galaxies to the permanent array, record
/// their windows in the halo aux entries, and write merger outcomes back
/// into the already-stored progenitor entries.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn finalize_fof_group(tree: &mut Tree) -> Result<()> {
    let group_start = tree.galaxies.len();
    let ngal = tree.working().len();

    // permanent position every surviving working galaxy will land at
    let mut perm_index = vec![None; ngal];
    let mut next = group_start;
    for (i, gal) in tree.working().iter().enumerate() {
        if !gal.is_retired() {
            perm_index[i] = Some(next);
            next += 1;
        }
    }

    let mut current_halo = usize::MAX;
    for p in 0..ngal {
        let halonr = tree.working()[p].halonr;
        if halonr != current_halo {
            current_halo = halonr;
            tree.aux[halonr].first_galaxy = tree.galaxies.len();
            tree.aux[halonr].n_galaxies = 0;
        }

        if tree.working()[p].is_retired() {
            // the galaxy merged this interval: find its entry from the
            // previous snapshot and record where it went
            let target = resolve_merge_target(tree.working(), p)?;
            let perm_target = perm_index[target].ok_or_else(|| {
                Error::invariant(
                    halonr as i32,
                    p as i32,
                    "merger destination did not survive the step",
                )
            })?;

            let galaxy_nr = tree.working()[p].galaxy_nr;
            let merge_kind = tree.working()[p].merge_kind;
            let snap = tree.halos[halonr].snap_num;
            let hist = tree.galaxies[..group_start]
                .iter()
                .rposition(|g| g.galaxy_nr == galaxy_nr)
                .ok_or_else(|| {
                    Error::invariant(halonr as i32, p as i32, "merged galaxy has no history entry")
                })?;
            tree.galaxies[hist].merge_kind = merge_kind;
            tree.galaxies[hist].merge_into_id = perm_target as i32;
            tree.galaxies[hist].merge_into_snap_num = snap;
        } else {
            let central = tree.working()[p].central_gal.ok_or_else(|| {
                Error::invariant(halonr as i32, p as i32, "surviving galaxy without a central")
            })?;
            let central = resolve_live_central(tree.working(), central);

            let mut gal = tree.working()[p].clone();
            gal.snap_num = tree.halos[halonr].snap_num;
            gal.central_gal = perm_index[central];
            tree.galaxies.push(gal);
            tree.aux[halonr].n_galaxies += 1;
        }
    }

    tree.clear_working();
    Ok(())
}

/// Follow merger links until a surviving galaxy is reached.
fn resolve_merge_target(working: &[Galaxy], p: usize) -> Result<usize> {
    let mut target = working[p].merge_into_id;
    let mut hops = 0;
    loop {
        if target < 0 || target as usize >= working.len() {
            return Err(Error::invariant(
                working[p].halonr as i32,
                p as i32,
                "merge target out of range",
            ));
        }
        if !working[target as usize].is_retired() {
            return Ok(target as usize);
        }
        target = working[target as usize].merge_into_id;
        hops += 1;
        if hops > working.len() {
            return Err(Error::invariant(
                working[p].halonr as i32,
                p as i32,
                "merge target cycle",
            ));
        }
    }
}

/// A galaxy's central may itself have merged during the interval; follow
/// the chain to the galaxy that absorbed it.
fn resolve_live_central(working: &[Galaxy], mut central: usize) -> usize {
    let mut hops = 0;
    while working[central].is_retired() && hops <= working.len() {
        let next = working[central].merge_into_id;
        if next < 0 || next as usize >= working.len() {
            break;
        }
        central = next as usize;
        hops += 1;
    }
    central
}
