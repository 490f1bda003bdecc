//! Hot-gas cooling onto the cold disk, moderated by radio-mode black-hole
//! heating.

use crate::config::{AgnRecipe, Config};
use crate::cooling::CoolingTables;
use crate::cosmology::{BOLTZMANN, PROTONMASS, SEC_PER_YEAR, SOLAR_MASS};
use crate::galaxy::Galaxy;
use crate::numerics::metallicity;

/// Cold-phase density coefficient of the isothermal profile at the cooling
/// radius (3/2·µ over π-normalisation of the profile).
const RHO_RCOOL_COEFF: f64 = 0.28086;

/// Gas that cools out of the hot halo of `working[p]` during one substep.
///
/// An isothermal hot-gas profile is assumed; the cooling radius follows
/// from equating the local cooling time to the halo dynamical time. Halos
/// whose cooling radius exceeds the virial radius accrete in the rapid
/// infall regime instead. For the group central the rate is then reduced
/// by radio-mode heating.
pub fn cooling_recipe(
    working: &mut [Galaxy],
    p: usize,
    centralgal: usize,
    dt: f64,
    cfg: &Config,
    tables: &CoolingTables,
) -> f64 {
    let gal = &working[p];
    if gal.hot_gas <= 0.0 || gal.vvir <= 0.0 {
        return 0.0;
    }

    let tcool = gal.rvir / gal.vvir;
    // virial temperature in Kelvin, virial velocity in km/s
    let temp = 35.9 * gal.vvir * gal.vvir;

    let log_z = if gal.metals_hot_gas > 0.0 {
        (gal.metals_hot_gas / gal.hot_gas).log10()
    } else {
        -10.0
    };

    let lambda = tables.rate(temp.log10(), log_z);
    // sec g/cm^3 in cgs, then to code units
    let x = PROTONMASS * BOLTZMANN * temp / lambda
        / (cfg.cosmo.units.density_cgs * cfg.cosmo.units.time_s);
    let rho_rcool = x / (RHO_RCOOL_COEFF * tcool);
    let rho0 = gal.hot_gas / (4.0 * std::f64::consts::PI * gal.rvir);
    let rcool = (rho0 / rho_rcool).sqrt();

    let mut cooling_gas = if rcool > gal.rvir {
        // infall-dominated regime
        gal.hot_gas / (gal.rvir / gal.vvir) * dt
    } else {
        // hot-halo regime
        (gal.hot_gas / gal.rvir) * (rcool / tcool) * dt
    };
    cooling_gas = cooling_gas.max(0.0).min(gal.hot_gas);

    if cfg.agn_recipe != AgnRecipe::Off && cooling_gas > 0.0 && p == centralgal {
        cooling_gas = do_agn_heating(&mut working[p], cooling_gas, dt, x, rcool, cfg);
    }

    if cooling_gas > 0.0 {
        let gal = &mut working[p];
        gal.cooling_energy += 0.5 * cooling_gas * gal.vvir * gal.vvir;
    }
    cooling_gas
}

/// Reduce `cooling_gas` by the black hole's radio-mode heating and grow the
/// black hole by the accreted mass. Returns the surviving cooling rate.
fn do_agn_heating(
    gal: &mut Galaxy,
    mut cooling_gas: f64,
    dt: f64,
    x: f64,
    rcool: f64,
    cfg: &Config,
) -> f64 {
    // past heating episodes keep the inner halo hot
    if gal.r_heat < rcool {
        cooling_gas *= 1.0 - gal.r_heat / rcool;
    } else {
        cooling_gas = 0.0;
    }

    if gal.hot_gas <= 0.0 {
        return cooling_gas;
    }

    let agn_rate = match cfg.agn_recipe {
        AgnRecipe::Off => return cooling_gas,
        AgnRecipe::BondiHoyle => {
            2.5 * std::f64::consts::PI * cfg.cosmo.units.g
                * (0.375 * 0.6 * x)
                * gal.black_hole_mass
                * cfg.radio_mode_efficiency
        }
        AgnRecipe::ColdCloud => {
            if gal.black_hole_mass > 0.0001 * gal.mvir * (rcool / gal.rvir).powi(3) {
                0.0001 * cooling_gas / dt
            } else {
                0.0
            }
        }
        AgnRecipe::Empirical => {
            let rate = cfg.radio_mode_efficiency
                / (cfg.cosmo.units.mass_g / cfg.cosmo.units.time_s * SEC_PER_YEAR / SOLAR_MASS)
                * (gal.black_hole_mass / 0.01)
                * (gal.vvir / 200.0).powi(3);
            if gal.mvir > 0.0 {
                rate * (gal.hot_gas / gal.mvir) / 0.1
            } else {
                rate
            }
        }
    };

    // accretion is always Eddington-limited
    let edd_rate = 1.3e38 * gal.black_hole_mass * 1e10 / cfg.cosmo.hubble_h
        / (cfg.cosmo.units.energy_cgs / cfg.cosmo.units.time_s)
        / (0.1 * 9e10);
    let agn_rate = agn_rate.min(edd_rate);

    let mut accreted = (agn_rate * dt).min(gal.hot_gas);

    // coefficient to heat the accreted mass back to the virial
    // temperature; 1.34e5 = sqrt(2·0.1)·c in km/s
    let coeff = (1.34e5 / gal.vvir).powi(2);
    let mut heating = coeff * accreted;
    if heating > cooling_gas {
        accreted = cooling_gas / coeff;
        heating = cooling_gas;
    }

    let z = metallicity(gal.hot_gas, gal.metals_hot_gas);
    gal.black_hole_mass += accreted;
    gal.hot_gas -= accreted;
    gal.metals_hot_gas -= z * accreted;

    if gal.r_heat < rcool && cooling_gas > 0.0 {
        let r_heat_new = (heating / cooling_gas) * rcool;
        if r_heat_new > gal.r_heat {
            gal.r_heat = r_heat_new;
        }
    }

    if heating > 0.0 {
        gal.heating_energy += 0.5 * heating * gal.vvir * gal.vvir;
    }

    cooling_gas - heating
}

/// Move the cooled gas from the hot halo onto the cold disk, metals in
/// proportion.
pub fn cool_gas_onto_galaxy(gal: &mut Galaxy, cooling_gas: f64) {
    if cooling_gas <= 0.0 {
        return;
    }
    if cooling_gas < gal.hot_gas {
        let z = metallicity(gal.hot_gas, gal.metals_hot_gas);
        gal.cold_gas += cooling_gas;
        gal.metals_cold_gas += z * cooling_gas;
        gal.hot_gas -= cooling_gas;
        gal.metals_hot_gas -= z * cooling_gas;
    } else {
        gal.cold_gas += gal.hot_gas;
        gal.metals_cold_gas += gal.metals_hot_gas;
        gal.hot_gas = 0.0;
        gal.metals_hot_gas = 0.0;
    }
}
