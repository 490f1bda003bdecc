//! Translate finished trees into output records, one batch per requested
//! snapshot.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::galaxy::{Galaxy, GalaxyType};
use crate::io::output::GalaxyOutput;
use crate::numerics::metallicity;
use crate::tree::Tree;
use crate::STEPS;
use itertools::izip;
use rustc_hash::FxHashMap;

/// Multiplier separating the tree index inside a galaxy index.
const TREE_FACTOR: i64 = 1_000_000_000;
/// Multiplier separating the file number inside a galaxy index.
const FILE_FACTOR: i64 = 1_000_000_000_000;

/// Select every permanent galaxy whose snapshot is a requested output and
/// convert it to the on-disk record, remapping `mergeIntoID` and
/// `CentralGal` to positions within the output of their snapshot.
///
/// Returns one batch per entry of `cfg.output_snaps`, in the same order.
///
/// # Errors
///
/// [`Error::Invariant`] when an index does not fit the galaxy-index
/// packing or a merger reference is out of range.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn prepare_tree_outputs(tree: &Tree, cfg: &Config) -> Result<Vec<Vec<GalaxyOutput>>> {
    let filenr = tree.id.filenr;
    let treenr = tree.id.treenr;

    if i64::from(treenr) >= FILE_FACTOR / TREE_FACTOR || treenr < 0 {
        return Err(Error::invariant(
            -1,
            -1,
            format!("tree index {treenr} does not fit the galaxy-index packing"),
        ));
    }

    // first pass: position of every galaxy within its snapshot's output
    let slot_of_snap: FxHashMap<i32, usize> = cfg
        .output_snaps
        .iter()
        .enumerate()
        .map(|(slot, &snap)| (snap, slot))
        .collect();
    let mut counts = vec![0_i32; cfg.output_snaps.len()];
    let mut output_order = vec![-1_i32; tree.galaxies.len()];
    for (i, gal) in tree.galaxies.iter().enumerate() {
        if let Some(&slot) = slot_of_snap.get(&gal.snap_num) {
            output_order[i] = counts[slot];
            counts[slot] += 1;
        }
    }

    // second pass: build the records
    let mut batches: Vec<Vec<GalaxyOutput>> = counts
        .iter()
        .map(|&n| Vec::with_capacity(n.unsigned_abs() as usize))
        .collect();
    for gal in &tree.galaxies {
        let Some(&slot) = slot_of_snap.get(&gal.snap_num) else {
            continue;
        };
        batches[slot].push(convert(gal, tree, cfg, &output_order)?);
    }

    Ok(batches)
}

/// Lookback time of a merger in Myr, preserving the −1 "never merged"
/// sentinel.
#[allow(clippy::cast_possible_truncation)]
fn merger_time_myr(time: f64, time_myr: f64) -> f32 {
    if time < 0.0 {
        -1.0
    } else {
        (time * time_myr) as f32
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_precision_loss)]
fn convert(
    gal: &Galaxy,
    tree: &Tree,
    cfg: &Config,
    output_order: &[i32],
) -> Result<GalaxyOutput> {
    let units = &cfg.cosmo.units;
    let halo = &tree.halos[gal.halonr];
    let fof = halo.first_halo_in_fof_group;
    let z = cfg.z_at(halo.snap_num);

    if gal.galaxy_nr >= TREE_FACTOR as u64 {
        return Err(Error::invariant(
            gal.halonr as i32,
            -1,
            format!("galaxy number {} does not fit the galaxy-index packing", gal.galaxy_nr),
        ));
    }
    let galaxy_index = gal.galaxy_nr as i64
        + TREE_FACTOR * i64::from(tree.id.treenr)
        + FILE_FACTOR * i64::from(tree.id.filenr);

    let remap = |idx: i32| -> Result<i32> {
        if idx < 0 {
            return Ok(-1);
        }
        let idx = idx as usize;
        if idx >= output_order.len() {
            return Err(Error::invariant(
                gal.halonr as i32,
                -1,
                "mergeIntoID out of range",
            ));
        }
        Ok(output_order[idx])
    };

    let merge_into_id = remap(gal.merge_into_id)?;
    let central_gal = match gal.central_gal {
        Some(idx) => remap(idx as i32)?,
        None => -1,
    };

    // star-formation rates in M☉/yr, metallicities as step averages
    let rate_to_solar = units.mass_rate_to_solar_per_year();
    let mut sfr_disk = 0.0;
    let mut sfr_bulge = 0.0;
    let mut sfr_disk_z = 0.0;
    let mut sfr_bulge_z = 0.0;
    for (&rate, &cold, &metals) in izip!(
        &gal.sfr_disk,
        &gal.sfr_disk_cold_gas,
        &gal.sfr_disk_cold_gas_metals
    ) {
        sfr_disk += rate * rate_to_solar / STEPS as f64;
        if cold > 0.0 {
            sfr_disk_z += metallicity(cold, metals) / STEPS as f64;
        }
    }
    for (&rate, &cold, &metals) in izip!(
        &gal.sfr_bulge,
        &gal.sfr_bulge_cold_gas,
        &gal.sfr_bulge_cold_gas_metals
    ) {
        sfr_bulge += rate * rate_to_solar / STEPS as f64;
        if cold > 0.0 {
            sfr_bulge_z += metallicity(cold, metals) / STEPS as f64;
        }
    }

    let log_rate = |energy_rate: f64| -> f32 {
        if energy_rate > 0.0 {
            (energy_rate * units.energy_cgs / units.time_s).log10() as f32
        } else {
            0.0
        }
    };

    let (infall_mvir, infall_vvir, infall_vmax) = if gal.galaxy_type == GalaxyType::Central {
        (0.0, 0.0, 0.0)
    } else {
        (gal.infall_mvir, gal.infall_vvir, gal.infall_vmax)
    };

    Ok(GalaxyOutput {
        galaxy_type: gal.galaxy_type.as_i32(),
        galaxy_index,
        halo_index: gal.halonr as i32,
        fof_halo_index: fof,
        tree_index: tree.id.treenr,
        snap_num: gal.snap_num,
        dt: (gal.dt / STEPS as f64 * units.time_myr) as f32,
        central_gal,
        central_mvir: cfg
            .cosmo
            .virial_mass(&tree.halos, fof.unsigned_abs() as usize) as f32,
        merge_type: gal.merge_kind.as_i32(),
        merge_into_id,
        merge_into_snap_num: gal.merge_into_snap_num,
        dt_interval: (gal.dt * units.time_myr) as f32,
        pos: gal.pos,
        vel: gal.vel,
        spin: halo.spin,
        len: gal.len,
        mvir: gal.mvir as f32,
        // the actual virial scale of the halo, not the sticky maximum
        rvir: cfg.cosmo.virial_radius(&tree.halos, gal.halonr, z) as f32,
        vvir: cfg.cosmo.virial_velocity(&tree.halos, gal.halonr, z) as f32,
        vmax: gal.vmax as f32,
        vel_disp: halo.vel_disp,
        cold_gas: gal.cold_gas as f32,
        stellar_mass: gal.stellar_mass as f32,
        classical_bulge_mass: gal.classical_bulge_mass as f32,
        secular_bulge_mass: (gal.bulge_mass - gal.classical_bulge_mass).max(0.0) as f32,
        hot_gas: gal.hot_gas as f32,
        ejected_mass: gal.ejected_mass as f32,
        black_hole_mass: gal.black_hole_mass as f32,
        ics: gal.ics as f32,
        metals_cold_gas: gal.metals_cold_gas as f32,
        metals_stellar_mass: gal.metals_stellar_mass as f32,
        metals_bulge_mass: gal.metals_bulge_mass as f32,
        metals_hot_gas: gal.metals_hot_gas as f32,
        metals_ejected_mass: gal.metals_ejected_mass as f32,
        metals_ics: gal.metals_ics as f32,
        sfr_disk: sfr_disk as f32,
        sfr_bulge: sfr_bulge as f32,
        sfr_disk_z: sfr_disk_z as f32,
        sfr_bulge_z: sfr_bulge_z as f32,
        disk_scale_radius: gal.disk_scale_radius as f32,
        cooling: log_rate(gal.cooling_energy),
        heating: log_rate(gal.heating_energy),
        last_major_merger: merger_time_myr(gal.time_of_last_major_merger, units.time_myr),
        last_minor_merger: merger_time_myr(gal.time_of_last_minor_merger, units.time_myr),
        outflow_rate: (gal.outflow_rate * rate_to_solar) as f32,
        infall_mvir: infall_mvir as f32,
        infall_vvir: infall_vvir as f32,
        infall_vmax: infall_vmax as f32,
    })
}
