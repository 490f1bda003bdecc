//! The per-substep baryonic physics pipeline.
//!
//! For one FOF group and one snapshot interval, [`evolve_galaxies`] runs
//! [`crate::STEPS`] substeps. Within a substep every active galaxy passes
//! through infall or stripping, cooling with radio-mode heating, star
//! formation with feedback and instability checks; a second sweep then
//! resolves satellite mergers and disruptions.

pub mod cooling_heating;
pub mod disk_instability;
pub mod infall;
pub mod mergers;
pub mod reincorporation;
pub mod starformation;

use crate::config::Config;
use crate::cooling::CoolingTables;
use crate::error::{Error, Result};
use crate::galaxy::GalaxyType;
use crate::tree::Tree;
use crate::STEPS;

/// Evolve the working galaxy set of one FOF group over one snapshot
/// interval.
///
/// # Errors
///
/// [`Error::Invariant`] when the group has no valid central or a satellite
/// is missing its merger clock; [`Error::Numeric`] when a NaN survives the
/// clamping rules.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_precision_loss)]
pub fn evolve_galaxies(
    fof_halo: usize,
    tree: &mut Tree,
    cfg: &Config,
    cooling: &CoolingTables,
) -> Result<()> {
    let ngal = tree.working().len();
    if ngal == 0 {
        return Ok(());
    }

    let centralgal = tree.working()[0]
        .central_gal
        .ok_or_else(|| Error::invariant(fof_halo as i32, 0, "FOF group without a central"))?;
    {
        let central = &tree.working()[centralgal];
        if central.galaxy_type != GalaxyType::Central || central.halonr != fof_halo {
            return Err(Error::invariant(
                fof_halo as i32,
                centralgal as i32,
                "group central is not the background halo's Type 0 galaxy",
            ));
        }
    }

    let halo_snap = tree.halos[fof_halo].snap_num;
    let halo_age = cfg.age_at(halo_snap);
    let z_curr = cfg.z_at(halo_snap);

    // the infall budget is fixed once per interval, before the first substep
    let infalling_gas = infall::infall_recipe(tree.working_mut(), centralgal, z_curr, cfg);

    let working = tree.working_mut();
    for step in 0..STEPS {
        for p in 0..ngal {
            if working[p].is_retired() {
                continue;
            }

            let delta_t = cfg.age_at(working[p].snap_num) - halo_age;
            let dt = delta_t / STEPS as f64;
            if working[p].dt < 0.0 {
                working[p].dt = delta_t;
            }

            if p == centralgal {
                infall::add_infall_to_hot(&mut working[p], infalling_gas / STEPS as f64);
                if cfg.reincorporation_factor > 0.0 {
                    reincorporation::reincorporate_gas(&mut working[p], dt, cfg);
                }
            } else if working[p].galaxy_type == GalaxyType::Satellite
                && working[p].hot_gas > 0.0
            {
                infall::strip_from_satellite(working, centralgal, p, z_curr, cfg);
            }

            let cooling_gas =
                cooling_heating::cooling_recipe(working, p, centralgal, dt, cfg, cooling);
            cooling_heating::cool_gas_onto_galaxy(&mut working[p], cooling_gas);

            starformation::starformation_and_feedback(working, p, centralgal, dt, step, cfg);
        }

        // satellite resolution sweep
        for p in 0..ngal {
            if working[p].is_retired()
                || !matches!(
                    working[p].galaxy_type,
                    GalaxyType::Satellite | GalaxyType::Orphan
                )
            {
                continue;
            }
            if working[p].merg_time_unset() {
                return Err(Error::invariant(
                    working[p].halonr as i32,
                    p as i32,
                    "satellite without a merger clock",
                ));
            }

            let delta_t = cfg.age_at(working[p].snap_num) - halo_age;
            let dt = delta_t / STEPS as f64;
            let time = cfg.age_at(working[p].snap_num) - (step as f64 + 0.5) * dt;
            working[p].merg_time -= dt;

            // halo mass interpolated across the interval; galaxies whose
            // halos dissolve see it run down to zero
            let current_mvir = working[p].mvir
                - working[p].delta_mvir * (1.0 - (step as f64 + 1.0) / STEPS as f64);
            let galaxy_baryons = working[p].stellar_mass + working[p].cold_gas;

            if galaxy_baryons <= 0.0
                || current_mvir / galaxy_baryons <= cfg.threshold_sat_disruption
            {
                mergers::disrupt_satellite_to_ics(working, centralgal, p);
            } else if working[p].merg_time <= 0.0 {
                let merger_central = resolve_merger_central(working, p)?;
                mergers::deal_with_galaxy_merger(
                    working,
                    p,
                    merger_central,
                    centralgal,
                    time,
                    dt,
                    step,
                    cfg,
                );
            }
        }

        for gal in working.iter_mut().filter(|g| !g.is_retired()) {
            gal.enforce_floors()?;
        }
    }

    // turn the energy and outflow accumulators into interval rates
    for gal in working.iter_mut().filter(|g| !g.is_retired()) {
        if gal.dt > 0.0 {
            gal.cooling_energy /= gal.dt;
            gal.heating_energy /= gal.dt;
            gal.outflow_rate /= gal.dt;
        }
    }

    Ok(())
}

/// The galaxy a merging satellite falls onto: its subhalo's central,
/// following the merger chain if that central has itself been absorbed.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn resolve_merger_central(
    working: &[crate::galaxy::Galaxy],
    p: usize,
) -> Result<usize> {
    let mut central = working[p].central_gal.ok_or_else(|| {
        Error::invariant(working[p].halonr as i32, p as i32, "satellite without a central")
    })?;
    let mut hops = 0;
    while working[central].is_retired() {
        let next = working[central].merge_into_id;
        if next < 0 || next as usize >= working.len() || hops > working.len() {
            return Err(Error::invariant(
                working[p].halonr as i32,
                p as i32,
                "merger central chain is broken",
            ));
        }
        central = next as usize;
        hops += 1;
    }
    if central == p {
        return Err(Error::invariant(
            working[p].halonr as i32,
            p as i32,
            "galaxy would merge with itself",
        ));
    }
    Ok(central)
}
