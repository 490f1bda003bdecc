//! Return of ejected gas to the hot halo.

use crate::config::Config;
use crate::galaxy::Galaxy;
use crate::numerics::metallicity;

/// Halo circular velocity at which the escape velocity matches the 630 km/s
/// ejecta speed of supernovae (`V_SN/√2`).
const V_SN_OVER_SQRT2: f64 = 445.48;

/// Move ejected gas back into the central's hot reservoir. Only halos
/// whose virial velocity exceeds `445.48 · ReIncorporationFactor` retain
/// their ejecta; the return rate grows with the excess over that
/// threshold.
pub fn reincorporate_gas(central: &mut Galaxy, dt: f64, cfg: &Config) {
    let v_crit = V_SN_OVER_SQRT2 * cfg.reincorporation_factor;
    if central.vvir <= v_crit {
        return;
    }

    let reincorporated = ((central.vvir / v_crit - 1.0) * central.ejected_mass
        / (central.rvir / central.vvir)
        * dt)
        .min(central.ejected_mass);

    let z = metallicity(central.ejected_mass, central.metals_ejected_mass);
    central.ejected_mass -= reincorporated;
    central.metals_ejected_mass -= z * reincorporated;
    central.hot_gas += reincorporated;
    central.metals_hot_gas += z * reincorporated;
}
