//! Metal-dependent cooling functions: eight tabulated curves in
//! log₁₀(T/K), linearly interpolated in temperature and metallicity.

use crate::error::{Error, Result};
use ndarray::Array2;
use std::fs;
use std::path::Path;

/// Number of tabulated metallicities.
pub const N_METALLICITIES: usize = 8;
/// Number of temperature samples per curve.
pub const N_TEMPS: usize = 91;

const LOG_T_MIN: f64 = 4.0;
const LOG_T_MAX: f64 = 8.5;
const LOG_T_STEP: f64 = 0.05;

/// Solar metal mass fraction used to shift [Fe/H] to absolute metallicity.
const Z_SUN: f64 = 0.02;

/// Table file names, ordered from primordial composition upwards.
const TABLE_NAMES: [&str; N_METALLICITIES] = [
    "stripped_mzero.cie",
    "stripped_m-30.cie",
    "stripped_m-20.cie",
    "stripped_m-15.cie",
    "stripped_m-10.cie",
    "stripped_m-05.cie",
    "stripped_m-00.cie",
    "stripped_m+05.cie",
];

/// [Fe/H] of each table; the first row stands in for a primordial mix.
const FE_H: [f64; N_METALLICITIES] = [-5.0, -3.0, -2.0, -1.5, -1.0, -0.5, 0.0, 0.5];

/// Column of the `.cie` files holding log₁₀ of the normalised cooling rate.
const LAMBDA_NORM_COLUMN: usize = 5;

/// The pre-loaded cooling curves. Read-only after construction and safe to
/// share across workers.
#[derive(Clone, Debug)]
pub struct CoolingTables {
    /// Absolute log₁₀ metallicity of each row.
    log_z: [f64; N_METALLICITIES],
    /// log₁₀(Λ_norm) samples, `N_METALLICITIES × N_TEMPS`.
    rates: Array2<f64>,
}

impl CoolingTables {
    /// Load the eight cooling curves from `dir`.
    ///
    /// # Errors
    ///
    /// [`Error::MissingDataFile`] when a table file cannot be read,
    /// [`Error::Format`] when a file does not hold 91 valid rows.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut rates = Array2::zeros((N_METALLICITIES, N_TEMPS));

        for (row, name) in TABLE_NAMES.iter().enumerate() {
            let path = dir.join(name);
            let text = fs::read_to_string(&path).map_err(|err| Error::MissingDataFile {
                path: path.clone(),
                reason: err.to_string(),
            })?;

            let mut samples = 0;
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let value: f64 = line
                    .split_whitespace()
                    .nth(LAMBDA_NORM_COLUMN)
                    .and_then(|field| field.parse().ok())
                    .ok_or_else(|| Error::Format {
                        path: path.clone(),
                        reason: format!("unparsable cooling-table row: `{line}`"),
                    })?;
                if samples >= N_TEMPS {
                    return Err(Error::Format {
                        path,
                        reason: format!("more than {N_TEMPS} samples"),
                    });
                }
                rates[[row, samples]] = value;
                samples += 1;
            }

            if samples != N_TEMPS {
                return Err(Error::Format {
                    path,
                    reason: format!("expected {N_TEMPS} samples, found {samples}"),
                });
            }
        }

        Ok(Self::from_rates(rates))
    }

    /// Build tables directly from a `N_METALLICITIES × N_TEMPS` sample
    /// array (used by tests and embedders).
    ///
    /// # Panics
    ///
    /// Panics if `rates` does not have the expected shape.
    #[must_use]
    pub fn from_rates(rates: Array2<f64>) -> Self {
        assert_eq!(rates.shape(), [N_METALLICITIES, N_TEMPS]);

        let mut log_z = FE_H;
        // shift [Fe/H] to absolute metallicity; the primordial row keeps
        // its placeholder value
        for z in log_z.iter_mut().skip(1) {
            *z += Z_SUN.log10();
        }

        Self { log_z, rates }
    }

    /// Interpolated cooling rate Λ in cgs units at `log_temp` =
    /// log₁₀(T/K) and `log_z` = log₁₀(Z). Both coordinates are clamped to
    /// the table extrema; there is no extrapolation.
    #[must_use]
    pub fn rate(&self, log_temp: f64, log_z: f64) -> f64 {
        let log_z = log_z.clamp(self.log_z[0], self.log_z[N_METALLICITIES - 1]);

        let mut i = 0;
        while i < N_METALLICITIES - 2 && log_z > self.log_z[i + 1] {
            i += 1;
        }

        let rate1 = self.sample_row(i, log_temp);
        let rate2 = self.sample_row(i + 1, log_temp);
        let rate = rate1
            + (rate2 - rate1) / (self.log_z[i + 1] - self.log_z[i]) * (log_z - self.log_z[i]);

        10.0_f64.powf(rate)
    }

    fn sample_row(&self, row: usize, log_temp: f64) -> f64 {
        let log_temp = log_temp.clamp(LOG_T_MIN, LOG_T_MAX);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let bin = (((log_temp - LOG_T_MIN) / LOG_T_STEP) as usize).min(N_TEMPS - 2);
        let bin_temp = (bin as f64).mul_add(LOG_T_STEP, LOG_T_MIN);

        let rate1 = self.rates[[row, bin]];
        let rate2 = self.rates[[row, bin + 1]];
        rate1 + (rate2 - rate1) / LOG_T_STEP * (log_temp - bin_temp)
    }
}
