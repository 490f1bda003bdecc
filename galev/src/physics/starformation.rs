//! Quiescent star formation in the cold disk and the supernova feedback it
//! drives.

use crate::config::Config;
use crate::galaxy::Galaxy;
use crate::numerics::metallicity;
use crate::physics::disk_instability;
use crate::tree::pair_mut;

/// Form stars in the cold disk of `working[p]` over one substep and apply
/// supernova feedback, metal production, and (if enabled) the disk
/// stability check.
pub fn starformation_and_feedback(
    working: &mut [Galaxy],
    p: usize,
    centralgal: usize,
    dt: f64,
    step: usize,
    cfg: &Config,
) {
    // the star-forming region spans three disk scale lengths
    let gal = &working[p];
    let reff = 3.0 * gal.disk_scale_radius;
    let tdyn = if gal.vvir > 0.0 { reff / gal.vvir } else { 0.0 };

    // Kauffmann (1996) critical surface density expressed as a mass
    let cold_crit = 0.19 * gal.vvir * reff;
    let strdot = if gal.cold_gas > cold_crit && tdyn > 0.0 {
        cfg.sfr_efficiency * (gal.cold_gas - cold_crit) / tdyn
    } else {
        0.0
    };

    let mut stars = (strdot * dt).max(0.0);
    let mut reheated = if cfg.supernova_recipe_on {
        cfg.feedback_reheating_epsilon * stars
    } else {
        0.0
    };

    // never consume more cold gas than the disk holds
    if stars + reheated > working[p].cold_gas && stars + reheated > 0.0 {
        let fac = working[p].cold_gas / (stars + reheated);
        stars *= fac;
        reheated *= fac;
    }

    let ejected = if cfg.supernova_recipe_on && working[centralgal].vvir > 0.0 {
        ((cfg.feedback_ejection_efficiency
            * (cfg.cosmo.units.eta_sn_code * cfg.cosmo.units.energy_sn_code)
            / (working[centralgal].vvir * working[centralgal].vvir)
            - cfg.feedback_reheating_epsilon)
            * stars)
            .max(0.0)
    } else {
        0.0
    };

    if dt > 0.0 {
        let (cold, cold_metals) = (working[p].cold_gas, working[p].metals_cold_gas);
        working[p].record_sfr(step, stars / dt, cold, cold_metals, false);
    }

    let z_cold = metallicity(working[p].cold_gas, working[p].metals_cold_gas);
    update_from_star_formation(&mut working[p], stars, z_cold, cfg);

    // the cold phase was diluted by the locked-up stars
    let z_cold = metallicity(working[p].cold_gas, working[p].metals_cold_gas);
    update_from_feedback(working, p, centralgal, reheated, ejected, z_cold, cfg);

    if cfg.disk_instability_on {
        disk_instability::check_disk_instability(working, p, centralgal, dt, step, cfg);
    }

    produce_metals(working, p, centralgal, stars, cfg);
}

/// Lock `(1 − RecycleFraction)·stars` of cold gas into the stellar disk.
pub fn update_from_star_formation(gal: &mut Galaxy, stars: f64, z_cold: f64, cfg: &Config) {
    let locked = (1.0 - cfg.recycle_fraction) * stars;
    gal.cold_gas -= locked;
    gal.metals_cold_gas -= z_cold * locked;
    gal.stellar_mass += locked;
    gal.metals_stellar_mass += z_cold * locked;
}

/// Reheat cold disk gas into the central's hot halo and eject hot gas into
/// the central's ejected reservoir.
pub fn update_from_feedback(
    working: &mut [Galaxy],
    p: usize,
    centralgal: usize,
    reheated: f64,
    mut ejected: f64,
    z_cold: f64,
    cfg: &Config,
) {
    if !cfg.supernova_recipe_on {
        return;
    }
    debug_assert!(reheated <= working[p].cold_gas || reheated <= 0.0);

    if p == centralgal {
        let gal = &mut working[p];
        gal.cold_gas -= reheated;
        gal.metals_cold_gas -= z_cold * reheated;
        gal.hot_gas += reheated;
        gal.metals_hot_gas += z_cold * reheated;

        ejected = ejected.min(gal.hot_gas);
        let z_hot = metallicity(gal.hot_gas, gal.metals_hot_gas);
        gal.hot_gas -= ejected;
        gal.metals_hot_gas -= z_hot * ejected;
        gal.ejected_mass += ejected;
        gal.metals_ejected_mass += z_hot * ejected;

        gal.outflow_rate += reheated;
    } else {
        let (gal, central) = pair_mut(working, p, centralgal);
        gal.cold_gas -= reheated;
        gal.metals_cold_gas -= z_cold * reheated;
        central.hot_gas += reheated;
        central.metals_hot_gas += z_cold * reheated;

        ejected = ejected.min(central.hot_gas);
        let z_hot = metallicity(central.hot_gas, central.metals_hot_gas);
        central.hot_gas -= ejected;
        central.metals_hot_gas -= z_hot * ejected;
        central.ejected_mass += ejected;
        central.metals_ejected_mass += z_hot * ejected;

        gal.outflow_rate += reheated;
    }
}

/// Instantaneous-recycling metal production by type-II supernovae. A
/// mass-dependent fraction of the fresh metals bypasses the disk straight
/// into the central's hot halo (Krumholz & Dekel 2011).
pub fn produce_metals(
    working: &mut [Galaxy],
    p: usize,
    centralgal: usize,
    stars: f64,
    cfg: &Config,
) {
    if working[p].cold_gas > 1.0e-8 {
        let leave =
            cfg.frac_z_leave_disk * (-working[centralgal].mvir / 30.0).exp();
        working[p].metals_cold_gas += cfg.metal_yield * (1.0 - leave) * stars;
        working[centralgal].metals_hot_gas += cfg.metal_yield * leave * stars;
    } else {
        working[centralgal].metals_hot_gas += cfg.metal_yield * stars;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests_support::test_config;
    use crate::STEPS;
    use float_cmp::assert_approx_eq;

    fn disk_galaxy() -> Galaxy {
        let mut gal = Galaxy::new(0);
        gal.galaxy_type = crate::galaxy::GalaxyType::Central;
        gal.central_gal = Some(0);
        gal.cold_gas = 1.0;
        gal.metals_cold_gas = 0.02;
        gal.vvir = 200.0;
        gal.rvir = 0.2;
        gal.mvir = 10.0;
        gal.disk_scale_radius = 0.005;
        gal
    }

    #[test]
    fn no_stars_below_the_critical_surface_density() {
        let mut cfg = test_config();
        cfg.disk_instability_on = false;
        let mut gal = disk_galaxy();
        gal.cold_gas = 0.1; // cold_crit = 0.19·200·0.015 = 0.57
        let mut working = vec![gal];

        starformation_and_feedback(&mut working, 0, 0, 1e-3, 0, &cfg);
        assert_approx_eq!(f64, working[0].stellar_mass, 0.0);
        assert_approx_eq!(f64, working[0].cold_gas, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn star_formation_moves_gas_to_stars_and_hot() {
        let mut cfg = test_config();
        cfg.disk_instability_on = false;
        let mut working = vec![disk_galaxy()];
        let dt = 1e-4;

        let cold_crit = 0.19 * 200.0 * 0.015;
        let tdyn = 0.015 / 200.0;
        let stars = cfg.sfr_efficiency * (1.0 - cold_crit) / tdyn * dt;
        let reheated = cfg.feedback_reheating_epsilon * stars;

        starformation_and_feedback(&mut working, 0, 0, dt, 0, &cfg);

        let gal = &working[0];
        assert_approx_eq!(
            f64,
            gal.stellar_mass,
            (1.0 - cfg.recycle_fraction) * stars,
            epsilon = 1e-12
        );
        assert_approx_eq!(f64, gal.hot_gas, reheated, epsilon = 1e-12);
        assert!(gal.ejected_mass >= 0.0);
        assert_approx_eq!(f64, gal.outflow_rate, reheated, epsilon = 1e-12);
        assert!(gal.sfr_disk[0] > 0.0);
        assert_approx_eq!(f64, gal.sfr_disk[0], stars / dt, epsilon = 1e-9);
    }

    #[test]
    fn feedback_is_scaled_back_when_cold_gas_runs_out() {
        let mut cfg = test_config();
        cfg.disk_instability_on = false;
        cfg.sfr_efficiency = 1e6; // force stars + reheated > cold
        let mut working = vec![disk_galaxy()];

        starformation_and_feedback(&mut working, 0, 0, 1.0, 0, &cfg);

        let gal = &working[0];
        assert!(gal.cold_gas >= -1e-12);
        // everything that left the disk is accounted for
        let moved = gal.stellar_mass / (1.0 - cfg.recycle_fraction);
        let consumed = (1.0 - cfg.recycle_fraction) * moved + cfg.feedback_reheating_epsilon * moved;
        assert_approx_eq!(f64, 1.0 - gal.cold_gas, consumed, epsilon = 1e-9);
    }

    #[test]
    fn new_metals_enrich_the_cold_phase() {
        let mut cfg = test_config();
        cfg.disk_instability_on = false;
        cfg.metal_yield = 0.03;
        cfg.frac_z_leave_disk = 0.0;
        let mut working = vec![disk_galaxy()];
        let before = working[0].metals_cold_gas;

        starformation_and_feedback(&mut working, 0, 0, 1e-4, 0, &cfg);

        let gal = &working[0];
        let stars_locked = gal.stellar_mass / (1.0 - cfg.recycle_fraction);
        // metals: lost to stars and reheating, gained from the yield
        assert!(gal.metals_cold_gas < before + cfg.metal_yield * stars_locked);
        assert!(gal.metals_cold_gas > 0.0);
    }

    #[test]
    fn satellite_feedback_heats_the_central() {
        let mut cfg = test_config();
        cfg.disk_instability_on = false;
        let central = disk_galaxy();
        let mut sat = disk_galaxy();
        sat.galaxy_nr = 1;
        sat.galaxy_type = crate::galaxy::GalaxyType::Satellite;

        let mut working = vec![central, sat];
        working[1].central_gal = Some(0);
        let hot_before = working[0].hot_gas;

        starformation_and_feedback(&mut working, 1, 0, 1e-4, 3, &cfg);

        assert!(working[0].hot_gas > hot_before);
        assert!(working[1].sfr_disk[3] > 0.0);
        assert_approx_eq!(f64, working[1].hot_gas, 0.0);
    }

    #[test]
    fn sfr_history_lands_in_the_requested_step() {
        let mut cfg = test_config();
        cfg.disk_instability_on = false;
        let mut working = vec![disk_galaxy()];
        starformation_and_feedback(&mut working, 0, 0, 1e-4, STEPS - 1, &cfg);
        assert!(working[0].sfr_disk[STEPS - 1] > 0.0);
        assert!(working[0].sfr_disk[..STEPS - 1].iter().all(|&r| r == 0.0));
    }
}
