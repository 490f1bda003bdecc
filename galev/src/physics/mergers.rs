//! Satellite mergers and disruptions: the dynamical-friction clock,
//! merger-driven black-hole growth and quasar winds, collisional
//! starbursts, and the bookkeeping of retired galaxies.

use crate::config::{AgnRecipe, Config};
use crate::cosmology::SPEED_OF_LIGHT;
use crate::galaxy::{Galaxy, MergeKind, MERGTIME_UNSET};
use crate::numerics::metallicity;
use crate::physics::starformation;
use crate::tree::{pair_mut, Tree};
use crate::STEPS;

/// What triggered a collisional starburst; the burst fraction differs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BurstMode {
    /// Galaxy merger: `0.56 · ratio^0.7` of the cold gas burns.
    Merger,
    /// Disk instability: the unstable gas fraction burns directly.
    Instability,
}

/// Dynamical-friction merger timescale of a satellite entering
/// `mother_halo` (Binney & Tremaine style). Degenerate geometries (host
/// and satellite in the same halo, non-positive Coulomb logarithm or
/// satellite mass) have no timescale and return the
/// [`MERGTIME_UNSET`] sentinel; a satellite carrying it into the
/// resolution sweep aborts the tree.
#[allow(clippy::cast_possible_wrap)]
pub fn estimate_merging_time(
    tree: &Tree,
    sat_halo: usize,
    mother_halo: usize,
    gal: &Galaxy,
    cfg: &Config,
) -> f64 {
    if sat_halo == mother_halo {
        return MERGTIME_UNSET;
    }

    let coulomb = (f64::from(tree.halos[mother_halo].len)
        / f64::from(tree.halos[sat_halo].len.max(1))
        + 1.0)
        .ln();

    let satellite_mass =
        cfg.cosmo.virial_mass(&tree.halos, sat_halo) + gal.stellar_mass + gal.cold_gas;
    let z = cfg.z_at(tree.halos[mother_halo].snap_num);
    let satellite_radius = cfg.cosmo.virial_radius(&tree.halos, mother_halo, z);

    if satellite_mass > 0.0 && coulomb > 0.0 {
        2.0 * 1.17 * satellite_radius * satellite_radius
            * cfg.cosmo.virial_velocity(&tree.halos, mother_halo, z)
            / (coulomb * cfg.cosmo.units.g * satellite_mass)
    } else {
        MERGTIME_UNSET
    }
}

/// Complete the merger of `working[p]` onto `working[merger_central]`:
/// combine the reservoirs, grow the black hole with a quasar wind, run the
/// merger starburst, and retire the satellite.
#[allow(clippy::too_many_arguments, clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn deal_with_galaxy_merger(
    working: &mut [Galaxy],
    p: usize,
    merger_central: usize,
    centralgal: usize,
    time: f64,
    dt: f64,
    step: usize,
    cfg: &Config,
) {
    let sat_baryons = working[p].stellar_mass + working[p].cold_gas;
    let central_baryons =
        working[merger_central].stellar_mass + working[merger_central].cold_gas;
    let (mi, ma) = if sat_baryons < central_baryons {
        (sat_baryons, central_baryons)
    } else {
        (central_baryons, sat_baryons)
    };
    let mass_ratio = if ma > 0.0 { mi / ma } else { 1.0 };

    add_galaxies_together(working, merger_central, p);

    if cfg.agn_recipe != AgnRecipe::Off {
        grow_black_hole(&mut working[merger_central], mass_ratio, cfg);
    }

    collisional_starburst_recipe(
        working,
        mass_ratio,
        merger_central,
        centralgal,
        dt,
        step,
        BurstMode::Merger,
        cfg,
    );

    if mass_ratio > 0.1 {
        working[merger_central].time_of_last_minor_merger = time;
    }

    if mass_ratio > cfg.thresh_major_merger {
        make_bulge_from_burst(&mut working[merger_central]);
        working[merger_central].time_of_last_major_merger = time;
        working[p].retire(MergeKind::Major);
    } else {
        working[p].retire(MergeKind::Minor);
    }
    working[p].merge_into_id = merger_central as i32;
}

/// Fold every reservoir of the satellite into the merger central; the
/// satellite's stars land in the central's (classical) bulge.
fn add_galaxies_together(working: &mut [Galaxy], t: usize, p: usize) {
    let (central, sat) = pair_mut(working, t, p);

    central.cold_gas += sat.cold_gas;
    central.metals_cold_gas += sat.metals_cold_gas;
    central.stellar_mass += sat.stellar_mass;
    central.metals_stellar_mass += sat.metals_stellar_mass;
    central.hot_gas += sat.hot_gas;
    central.metals_hot_gas += sat.metals_hot_gas;
    central.ejected_mass += sat.ejected_mass;
    central.metals_ejected_mass += sat.metals_ejected_mass;
    central.ics += sat.ics;
    central.metals_ics += sat.metals_ics;
    central.black_hole_mass += sat.black_hole_mass;

    central.bulge_mass += sat.stellar_mass;
    central.metals_bulge_mass += sat.metals_stellar_mass;
    central.classical_bulge_mass += sat.stellar_mass;

    for step in 0..STEPS {
        central.sfr_bulge[step] += sat.sfr_disk[step] + sat.sfr_bulge[step];
        central.sfr_bulge_cold_gas[step] +=
            sat.sfr_disk_cold_gas[step] + sat.sfr_bulge_cold_gas[step];
        central.sfr_bulge_cold_gas_metals[step] +=
            sat.sfr_disk_cold_gas_metals[step] + sat.sfr_bulge_cold_gas_metals[step];
    }
}

/// Kauffmann & Haehnelt style black-hole growth from the cold disk during
/// mergers and instabilities, followed by the quasar wind it powers.
pub fn grow_black_hole(gal: &mut Galaxy, mass_ratio: f64, cfg: &Config) {
    if gal.cold_gas <= 0.0 || gal.vvir <= 0.0 {
        return;
    }

    let accreted = (cfg.black_hole_growth_rate * mass_ratio
        / (1.0 + (280.0 / gal.vvir).powi(2))
        * gal.cold_gas)
        .min(gal.cold_gas);

    let z = metallicity(gal.cold_gas, gal.metals_cold_gas);
    gal.black_hole_mass += accreted;
    gal.cold_gas -= accreted;
    gal.metals_cold_gas -= z * accreted;
    gal.quasar_bh_accretion_mass += accreted;

    quasar_mode_wind(gal, accreted, cfg);
}

/// Energy-driven quasar wind: if the wind energy exceeds the binding
/// energy of the cold gas, the cold disk is blown into the ejected
/// reservoir; if it also exceeds the combined cold + hot binding energy,
/// the hot halo follows.
pub fn quasar_mode_wind(gal: &mut Galaxy, accreted: f64, cfg: &Config) {
    let c_code = SPEED_OF_LIGHT / cfg.cosmo.units.velocity_cm_s;
    let quasar_energy = cfg.quasar_mode_efficiency * 0.1 * accreted * c_code * c_code;
    let cold_energy = 0.5 * gal.cold_gas * gal.vvir * gal.vvir;
    let hot_energy = 0.5 * gal.hot_gas * gal.vvir * gal.vvir;

    if quasar_energy > cold_energy {
        gal.ejected_mass += gal.cold_gas;
        gal.metals_ejected_mass += gal.metals_cold_gas;
        gal.cold_gas = 0.0;
        gal.metals_cold_gas = 0.0;
    }

    if quasar_energy > cold_energy + hot_energy {
        gal.ejected_mass += gal.hot_gas;
        gal.metals_ejected_mass += gal.metals_hot_gas;
        gal.hot_gas = 0.0;
        gal.metals_hot_gas = 0.0;
    }
}

/// Somerville et al. collisional starburst: a merger- or
/// instability-determined fraction of the central's cold gas forms bulge
/// stars, with the usual supernova feedback.
#[allow(clippy::too_many_arguments)]
pub fn collisional_starburst_recipe(
    working: &mut [Galaxy],
    mass_ratio: f64,
    merger_central: usize,
    centralgal: usize,
    dt: f64,
    step: usize,
    mode: BurstMode,
    cfg: &Config,
) {
    // burst coefficients from the hydrodynamic merger surveys
    let eburst = match mode {
        BurstMode::Instability => mass_ratio,
        BurstMode::Merger => 0.56 * mass_ratio.powf(0.7),
    };

    let mut stars = (eburst * working[merger_central].cold_gas).max(0.0);
    let mut reheated = if cfg.supernova_recipe_on {
        cfg.feedback_reheating_epsilon * stars
    } else {
        0.0
    };

    if stars + reheated > working[merger_central].cold_gas && stars + reheated > 0.0 {
        let fac = working[merger_central].cold_gas / (stars + reheated);
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
        let (cold, cold_metals) = (
            working[merger_central].cold_gas,
            working[merger_central].metals_cold_gas,
        );
        working[merger_central].record_sfr(step, stars / dt, cold, cold_metals, true);
    }

    let z_cold = metallicity(
        working[merger_central].cold_gas,
        working[merger_central].metals_cold_gas,
    );
    starformation::update_from_star_formation(&mut working[merger_central], stars, z_cold, cfg);

    // burst stars belong to the bulge
    let locked = (1.0 - cfg.recycle_fraction) * stars;
    working[merger_central].bulge_mass += locked;
    working[merger_central].metals_bulge_mass += z_cold * locked;
    if mode == BurstMode::Merger {
        working[merger_central].classical_bulge_mass += locked;
    }

    let z_cold = metallicity(
        working[merger_central].cold_gas,
        working[merger_central].metals_cold_gas,
    );
    starformation::update_from_feedback(
        working,
        merger_central,
        centralgal,
        reheated,
        ejected,
        z_cold,
        cfg,
    );

    // fresh metals; a remnant stripped of cold gas enriches the hot halo
    if working[merger_central].cold_gas > 1.0e-8 && mass_ratio < cfg.thresh_major_merger {
        let leave = cfg.frac_z_leave_disk * (-working[centralgal].mvir / 30.0).exp();
        working[merger_central].metals_cold_gas += cfg.metal_yield * (1.0 - leave) * stars;
        working[centralgal].metals_hot_gas += cfg.metal_yield * leave * stars;
    } else {
        working[centralgal].metals_hot_gas += cfg.metal_yield * stars;
    }
}

/// A major-merger remnant is a pure bulge: move the whole disk, its
/// metals, and its star-formation history into the bulge.
fn make_bulge_from_burst(gal: &mut Galaxy) {
    gal.bulge_mass = gal.stellar_mass;
    gal.metals_bulge_mass = gal.metals_stellar_mass;
    gal.classical_bulge_mass = gal.bulge_mass;

    for step in 0..STEPS {
        gal.sfr_bulge[step] += gal.sfr_disk[step];
        gal.sfr_bulge_cold_gas[step] += gal.sfr_disk_cold_gas[step];
        gal.sfr_bulge_cold_gas_metals[step] += gal.sfr_disk_cold_gas_metals[step];
        gal.sfr_disk[step] = 0.0;
        gal.sfr_disk_cold_gas[step] = 0.0;
        gal.sfr_disk_cold_gas_metals[step] = 0.0;
    }
}

/// Tidal disruption of a satellite: its gas joins the central's hot halo,
/// its stars the intracluster light.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn disrupt_satellite_to_ics(working: &mut [Galaxy], centralgal: usize, p: usize) {
    let (central, sat) = pair_mut(working, centralgal, p);

    central.hot_gas += sat.cold_gas + sat.hot_gas;
    central.metals_hot_gas += sat.metals_cold_gas + sat.metals_hot_gas;

    central.ejected_mass += sat.ejected_mass;
    central.metals_ejected_mass += sat.metals_ejected_mass;

    central.ics += sat.ics + sat.stellar_mass;
    central.metals_ics += sat.metals_ics + sat.metals_stellar_mass;

    // the satellite's black hole is left adrift with the remnant

    sat.retire(MergeKind::Disrupted);
    sat.merge_into_id = centralgal as i32;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests_support::test_config;
    use crate::galaxy::GalaxyType;
    use crate::halo::Halo;
    use crate::tree::{Tree, TreeId};
    use float_cmp::assert_approx_eq;

    fn central() -> Galaxy {
        let mut gal = Galaxy::new(0);
        gal.galaxy_type = GalaxyType::Central;
        gal.central_gal = Some(0);
        gal.vvir = 200.0;
        gal.rvir = 0.2;
        gal.mvir = 10.0;
        gal.stellar_mass = 1.0;
        gal.metals_stellar_mass = 0.02;
        gal.cold_gas = 0.5;
        gal.metals_cold_gas = 0.01;
        gal.hot_gas = 1.0;
        gal.metals_hot_gas = 0.02;
        gal
    }

    fn satellite(stellar: f64) -> Galaxy {
        let mut gal = Galaxy::new(1);
        gal.galaxy_type = GalaxyType::Orphan;
        gal.central_gal = Some(0);
        gal.stellar_mass = stellar;
        gal.metals_stellar_mass = 0.02 * stellar;
        gal.cold_gas = 0.1 * stellar;
        gal.vvir = 100.0;
        gal
    }

    #[test]
    fn merging_time_scales_with_host_radius() {
        let cfg = test_config();
        let mut host = Halo::for_tests(63, 10_000, 100.0);
        host.next_halo_in_fof_group = 1;
        let mut sub = Halo::for_tests(63, 100, 1.0);
        sub.first_halo_in_fof_group = 0;
        let tree = Tree::new(TreeId { filenr: 0, treenr: 0 }, vec![host, sub], 1000);

        let mut gal = Galaxy::new(0);
        gal.stellar_mass = 0.01;

        let t = estimate_merging_time(&tree, 1, 0, &gal, &cfg);
        assert!(t > 0.0);
        assert!(t < 999.0);

        // same halo for satellite and host has no timescale: the unset
        // sentinel comes back and trips the merger-clock invariant later
        assert_approx_eq!(
            f64,
            estimate_merging_time(&tree, 0, 0, &gal, &cfg),
            MERGTIME_UNSET
        );
    }

    #[test]
    fn minor_merger_moves_satellite_stars_into_the_bulge() {
        let mut cfg = test_config();
        cfg.supernova_recipe_on = false;
        let sat = satellite(0.05);
        let sat_stars = sat.stellar_mass;
        let mut working = vec![central(), sat];

        deal_with_galaxy_merger(&mut working, 1, 0, 0, 1.0, 1e-4, 0, &cfg);

        let c = &working[0];
        // satellite stars plus the merger starburst, all merger-driven
        assert!(c.bulge_mass > sat_stars);
        assert_approx_eq!(f64, c.classical_bulge_mass, c.bulge_mass, epsilon = 1e-12);
        assert!(c.stellar_mass > 1.0);
        assert_eq!(working[1].merge_kind, MergeKind::Minor);
        assert_eq!(working[1].galaxy_type, GalaxyType::Merged);
        assert_eq!(working[1].merge_into_id, 0);
        // a 5 percent merger stamps no merger times
        assert_approx_eq!(f64, c.time_of_last_major_merger, -1.0);
        assert_approx_eq!(f64, c.time_of_last_minor_merger, -1.0);
    }

    #[test]
    fn major_merger_transforms_the_disk_into_a_bulge() {
        let mut cfg = test_config();
        cfg.supernova_recipe_on = false;
        cfg.agn_recipe = AgnRecipe::Off;
        let sat = satellite(0.6); // ratio well above 0.3
        let mut working = vec![central(), sat];

        deal_with_galaxy_merger(&mut working, 1, 0, 0, 2.5, 1e-4, 0, &cfg);

        let c = &working[0];
        assert_approx_eq!(f64, c.bulge_mass, c.stellar_mass, epsilon = 1e-12);
        assert_approx_eq!(f64, c.classical_bulge_mass, c.bulge_mass, epsilon = 1e-12);
        assert_approx_eq!(f64, c.time_of_last_major_merger, 2.5);
        assert_approx_eq!(f64, c.time_of_last_minor_merger, 2.5);
        assert_eq!(working[1].merge_kind, MergeKind::Major);
    }

    #[test]
    fn merger_conserves_total_baryons() {
        let mut cfg = test_config();
        cfg.metal_yield = 0.0; // no fresh metals, strict conservation
        let sat = satellite(0.2);
        let before: f64 = central().baryonic_mass() + sat.baryonic_mass();
        let mut working = vec![central(), sat];

        deal_with_galaxy_merger(&mut working, 1, 0, 0, 1.0, 1e-4, 0, &cfg);

        let after = working[0].baryonic_mass();
        assert_approx_eq!(f64, after, before, epsilon = 1e-9);
    }

    #[test]
    fn black_hole_growth_is_throttled_by_halo_depth() {
        let mut cfg = test_config();
        cfg.quasar_mode_efficiency = 0.0;
        let mut shallow = central();
        shallow.vvir = 50.0;
        let mut deep = central();
        deep.vvir = 500.0;

        grow_black_hole(&mut shallow, 0.3, &cfg);
        grow_black_hole(&mut deep, 0.3, &cfg);
        assert!(deep.black_hole_mass > shallow.black_hole_mass);
        assert!(shallow.black_hole_mass > 0.0);
        assert_approx_eq!(f64, deep.quasar_bh_accretion_mass, deep.black_hole_mass);
    }

    #[test]
    fn strong_quasar_wind_empties_cold_then_hot() {
        let mut cfg = test_config();
        cfg.quasar_mode_efficiency = 1.0;
        let mut gal = central();

        // an enormous accretion event unbinds everything
        quasar_mode_wind(&mut gal, 1.0, &cfg);
        assert_approx_eq!(f64, gal.cold_gas, 0.0);
        assert_approx_eq!(f64, gal.hot_gas, 0.0);
        assert_approx_eq!(f64, gal.ejected_mass, 1.5, epsilon = 1e-12);
        assert_approx_eq!(f64, gal.metals_ejected_mass, 0.03, epsilon = 1e-12);
    }

    #[test]
    fn weak_quasar_wind_leaves_the_gas_alone() {
        let mut cfg = test_config();
        cfg.quasar_mode_efficiency = 1e-12;
        let mut gal = central();
        quasar_mode_wind(&mut gal, 1e-8, &cfg);
        assert_approx_eq!(f64, gal.cold_gas, 0.5);
        assert_approx_eq!(f64, gal.hot_gas, 1.0);
    }

    #[test]
    fn disruption_sends_stars_to_ics_and_gas_to_hot() {
        let cfg = test_config();
        let _ = &cfg;
        let mut sat = satellite(0.2);
        sat.hot_gas = 0.05;
        sat.metals_hot_gas = 0.001;
        sat.ejected_mass = 0.01;
        let mut working = vec![central(), sat];

        disrupt_satellite_to_ics(&mut working, 0, 1);

        let c = &working[0];
        assert_approx_eq!(f64, c.ics, 0.2, epsilon = 1e-12);
        assert_approx_eq!(f64, c.metals_ics, 0.004, epsilon = 1e-12);
        assert_approx_eq!(f64, c.hot_gas, 1.0 + 0.02 + 0.05, epsilon = 1e-12);
        assert_approx_eq!(f64, c.ejected_mass, 0.01, epsilon = 1e-12);
        assert_eq!(working[1].merge_kind, MergeKind::Disrupted);
        assert_eq!(working[1].merge_into_id, 0);
    }
}
