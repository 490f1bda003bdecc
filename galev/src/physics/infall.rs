//! Cosmological gas infall, reionization suppression, and hot-gas
//! stripping of satellites.

use crate::config::Config;
use crate::galaxy::Galaxy;
use crate::numerics::metallicity;
use crate::tree::pair_mut;
use crate::STEPS;

/// Gas the FOF group is owed this snapshot interval: the expected baryon
/// budget of the central halo minus everything the group already holds.
/// Satellite ejecta and intracluster stars are consolidated onto the
/// central here, before the budget is struck.
pub fn infall_recipe(working: &mut [Galaxy], centralgal: usize, z: f64, cfg: &Config) -> f64 {
    let mut tot_stellar = 0.0;
    let mut tot_bh = 0.0;
    let mut tot_cold = 0.0;
    let mut tot_hot = 0.0;
    let mut tot_ejected = 0.0;
    let mut tot_ejected_metals = 0.0;
    let mut tot_ics = 0.0;
    let mut tot_ics_metals = 0.0;

    for (i, gal) in working.iter_mut().enumerate() {
        tot_stellar += gal.stellar_mass;
        tot_bh += gal.black_hole_mass;
        tot_cold += gal.cold_gas;
        tot_hot += gal.hot_gas;
        tot_ejected += gal.ejected_mass;
        tot_ejected_metals += gal.metals_ejected_mass;
        tot_ics += gal.ics;
        tot_ics_metals += gal.metals_ics;

        if i != centralgal {
            // ejected gas and intracluster stars live with the central
            gal.ejected_mass = 0.0;
            gal.metals_ejected_mass = 0.0;
            gal.ics = 0.0;
            gal.metals_ics = 0.0;
        }
    }

    let central = &mut working[centralgal];
    central.ejected_mass = tot_ejected.max(0.0);
    central.metals_ejected_mass = tot_ejected_metals.max(0.0).min(central.ejected_mass);
    central.ics = tot_ics.max(0.0);
    central.metals_ics = tot_ics_metals.max(0.0).min(central.ics);

    let modifier = if cfg.reionization_on {
        reionization_modifier(central.mvir, z, cfg)
    } else {
        1.0
    };

    modifier * cfg.cosmo.baryon_frac * central.mvir
        - (tot_stellar + tot_cold + tot_hot + tot_ejected + tot_bh + tot_ics)
}

/// Suppression of infall onto small halos after reionization: the Gnedin
/// filtering-mass recipe in the Kravtsov et al. fitting form.
#[must_use]
pub fn reionization_modifier(mvir: f64, z: f64, cfg: &Config) -> f64 {
    // alpha gives the best fit to the Gnedin data
    let alpha = 6.0;
    let tvir = 1e4;

    let a = 1.0 / (1.0 + z);
    let a0 = 1.0 / (1.0 + cfg.reionization_z0);
    let ar = 1.0 / (1.0 + cfg.reionization_zr);
    let a_on_a0 = a / a0;
    let a_on_ar = a / ar;

    let f_of_a = if a <= a0 {
        3.0 * a / ((2.0 + alpha) * (5.0 + 2.0 * alpha)) * a_on_a0.powf(alpha)
    } else if a < ar {
        (3.0 / a)
            * a0
            * a0
            * (1.0 / (2.0 + alpha) - 2.0 * a_on_a0.powf(-0.5) / (5.0 + 2.0 * alpha))
            + a * a / 10.0
            - (a0 * a0 / 10.0) * (5.0 - 4.0 * a_on_a0.powf(-0.5))
    } else {
        (3.0 / a)
            * (a0 * a0 * (1.0 / (2.0 + alpha) - 2.0 * a_on_a0.powf(-0.5) / (5.0 + 2.0 * alpha))
                + (ar * ar / 10.0) * (5.0 - 4.0 * a_on_ar.powf(-0.5))
                - (a0 * a0 / 10.0) * (5.0 - 4.0 * a_on_a0.powf(-0.5))
                + a * ar / 3.0
                - (ar * ar / 3.0) * (3.0 - 2.0 * a_on_ar.powf(-0.5)))
    };

    // filtering mass in 10^10 M☉/h; mu = 0.59 gives the 2.21
    let m_jeans = 25.0 * cfg.cosmo.omega.powf(-0.5) * 2.21;
    let m_filtering = m_jeans * f_of_a.powf(1.5);

    // characteristic mass of a halo at the atomic-cooling temperature
    let v_char = (tvir / 36.0_f64).sqrt();
    let zplus1 = 1.0 + z;
    let omega_z = cfg.cosmo.omega * zplus1.powi(3)
        / (cfg.cosmo.omega * zplus1.powi(3) + cfg.cosmo.omega_lambda);
    let x_z = omega_z - 1.0;
    let delta_crit_z = 18.0 * std::f64::consts::PI.powi(2) + 82.0 * x_z - 39.0 * x_z * x_z;
    let hubble_z = cfg.cosmo.hubble_z(z);

    let m_char =
        v_char.powi(3) / (cfg.cosmo.units.g * hubble_z * (0.5 * delta_crit_z).sqrt());

    let mass_to_use = m_filtering.max(m_char);
    1.0 / (1.0 + 0.26 * (mass_to_use / mvir)).powi(3)
}

/// Deposit one substep's share of the infall budget in the central's hot
/// reservoir. A negative budget drains the ejected reservoir first, then
/// the hot metals, then the hot gas, never below zero.
pub fn add_infall_to_hot(central: &mut Galaxy, mut infalling_gas: f64) {
    if infalling_gas < 0.0 && central.ejected_mass > 0.0 {
        let z = metallicity(central.ejected_mass, central.metals_ejected_mass);
        central.metals_ejected_mass = (central.metals_ejected_mass + infalling_gas * z).max(0.0);

        central.ejected_mass += infalling_gas;
        if central.ejected_mass < 0.0 {
            infalling_gas = central.ejected_mass;
            central.ejected_mass = 0.0;
            central.metals_ejected_mass = 0.0;
        } else {
            infalling_gas = 0.0;
        }
    }

    if infalling_gas < 0.0 && central.metals_hot_gas > 0.0 {
        let z = metallicity(central.hot_gas, central.metals_hot_gas);
        central.metals_hot_gas = (central.metals_hot_gas + infalling_gas * z).max(0.0);
    }

    central.hot_gas += infalling_gas;
    if central.hot_gas < 0.0 {
        central.hot_gas = 0.0;
        central.metals_hot_gas = 0.0;
    }
}

/// Strip one substep's share of a satellite's missing baryon budget from
/// its hot gas into the central's, metals in proportion.
#[allow(clippy::cast_precision_loss)]
pub fn strip_from_satellite(
    working: &mut [Galaxy],
    centralgal: usize,
    p: usize,
    z: f64,
    cfg: &Config,
) {
    let (central, sat) = pair_mut(working, centralgal, p);

    let modifier = if cfg.reionization_on {
        reionization_modifier(sat.mvir, z, cfg)
    } else {
        1.0
    };

    let stripped = -(modifier * cfg.cosmo.baryon_frac * sat.mvir - sat.baryonic_mass())
        / STEPS as f64;
    if stripped <= 0.0 {
        return;
    }

    let z_hot = metallicity(sat.hot_gas, sat.metals_hot_gas);
    let stripped = stripped.min(sat.hot_gas);
    let stripped_metals = (stripped * z_hot).min(sat.metals_hot_gas);

    sat.hot_gas -= stripped;
    sat.metals_hot_gas -= stripped_metals;
    central.hot_gas += stripped;
    central.metals_hot_gas += stripped * z_hot;
}
