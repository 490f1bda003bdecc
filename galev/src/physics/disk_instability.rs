//! Mo, Mao & White disk stability: overloaded disks shed stars to the
//! bulge and burn their excess gas in a starburst.

use crate::config::{AgnRecipe, Config};
use crate::galaxy::Galaxy;
use crate::numerics::metallicity;
use crate::physics::mergers;

/// Check the combined gas and stellar disk of `working[p]` against the
/// Mo–Mao–White criterion and move any excess off the disk: stars to the
/// bulge, gas through a collisional starburst that also feeds the black
/// hole.
pub fn check_disk_instability(
    working: &mut [Galaxy],
    p: usize,
    centralgal: usize,
    dt: f64,
    step: usize,
    cfg: &Config,
) {
    let gal = &working[p];
    let diskmass = gal.cold_gas + (gal.stellar_mass - gal.bulge_mass);
    if diskmass <= 0.0 {
        return;
    }

    let mcrit = (gal.vmax * gal.vmax * (3.0 * gal.disk_scale_radius) / cfg.cosmo.units.g)
        .min(diskmass);

    let gas_fraction = gal.cold_gas / diskmass;
    let unstable_gas = gas_fraction * (diskmass - mcrit);
    let unstable_stars = (1.0 - gas_fraction) * (diskmass - mcrit);

    if unstable_stars > 0.0 {
        // secular bulge growth at the disk metallicity
        let gal = &mut working[p];
        let z_disk = metallicity(
            gal.stellar_mass - gal.bulge_mass,
            gal.metals_stellar_mass - gal.metals_bulge_mass,
        );
        gal.bulge_mass += unstable_stars;
        gal.metals_bulge_mass += z_disk * unstable_stars;
    }

    if unstable_gas > 0.0 && working[p].cold_gas > 0.0 {
        let unstable_fraction = (unstable_gas / working[p].cold_gas).min(1.0);
        if cfg.agn_recipe != AgnRecipe::Off {
            mergers::grow_black_hole(&mut working[p], unstable_fraction, cfg);
        }
        mergers::collisional_starburst_recipe(
            working,
            unstable_fraction,
            p,
            centralgal,
            dt,
            step,
            mergers::BurstMode::Instability,
            cfg,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests_support::test_config;
    use float_cmp::assert_approx_eq;

    fn heavy_disk() -> Galaxy {
        let mut gal = Galaxy::new(0);
        gal.galaxy_type = crate::galaxy::GalaxyType::Central;
        gal.central_gal = Some(0);
        gal.vmax = 100.0;
        gal.vvir = 100.0;
        gal.rvir = 0.1;
        gal.mvir = 5.0;
        gal.disk_scale_radius = 0.001;
        gal.stellar_mass = 2.0;
        gal.metals_stellar_mass = 0.04;
        gal.cold_gas = 1.0;
        gal.metals_cold_gas = 0.02;
        gal
    }

    #[test]
    fn stable_disks_are_left_alone() {
        let cfg = test_config();
        let mut gal = heavy_disk();
        // a large disk is comfortably below the critical mass
        gal.disk_scale_radius = 10.0;
        let mut working = vec![gal];

        check_disk_instability(&mut working, 0, 0, 1e-4, 0, &cfg);
        assert_approx_eq!(f64, working[0].bulge_mass, 0.0);
        assert_approx_eq!(f64, working[0].sfr_bulge[0], 0.0);
    }

    #[test]
    fn unstable_stars_feed_the_bulge() {
        let mut cfg = test_config();
        cfg.supernova_recipe_on = false; // keep the starburst path simple
        let mut gal = heavy_disk();
        // a gas-free disk isolates the stellar transfer
        gal.cold_gas = 0.0;
        gal.metals_cold_gas = 0.0;
        let mut working = vec![gal];

        let diskmass = 2.0;
        let mcrit = 100.0_f64 * 100.0 * (3.0 * 0.001) / cfg.cosmo.units.g;
        let excess = diskmass - mcrit;

        check_disk_instability(&mut working, 0, 0, 1e-4, 0, &cfg);

        let gal = &working[0];
        assert_approx_eq!(f64, gal.bulge_mass, excess, epsilon = 1e-9);
        // secular growth only: the classical bulge is untouched
        assert_approx_eq!(f64, gal.classical_bulge_mass, 0.0);
        // the bulge inherits the disk metallicity
        assert_approx_eq!(f64, gal.metals_bulge_mass, 0.02 * excess, epsilon = 1e-9);
    }

    #[test]
    fn unstable_gas_bursts_into_bulge_stars() {
        let mut cfg = test_config();
        cfg.supernova_recipe_on = false;
        let mut working = vec![heavy_disk()];

        check_disk_instability(&mut working, 0, 0, 1e-4, 2, &cfg);

        let gal = &working[0];
        assert!(gal.sfr_bulge[2] > 0.0);
        assert!(gal.cold_gas < 1.0);
        // burst stars land in the bulge as well
        assert!(gal.stellar_mass > 2.0);
    }

    #[test]
    fn instability_can_feed_the_black_hole() {
        let mut cfg = test_config();
        cfg.supernova_recipe_on = false;
        cfg.agn_recipe = AgnRecipe::Empirical;
        cfg.quasar_mode_efficiency = 0.0; // no wind, just growth
        let mut working = vec![heavy_disk()];

        check_disk_instability(&mut working, 0, 0, 1e-4, 0, &cfg);
        assert!(working[0].black_hole_mass > 0.0);
    }
}
