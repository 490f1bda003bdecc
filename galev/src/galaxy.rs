//! The galaxy entity: reservoirs, metals, star-formation history, and
//! merger bookkeeping.

use crate::numerics::metallicity;
use crate::STEPS;
use log::debug;

/// `MergTime` value marking a galaxy whose merger clock has not been set.
pub const MERGTIME_UNSET: f64 = 999.9;

/// Classification of a galaxy within its FOF group.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GalaxyType {
    /// Central galaxy of the FOF-background subhalo.
    Central,
    /// Satellite still hosted by a resolved subhalo.
    Satellite,
    /// Satellite whose subhalo has been disrupted.
    Orphan,
    /// Merged or disrupted away; inert from then on.
    Merged,
}

impl GalaxyType {
    /// Output encoding (0 central, 1 satellite, 2 orphan, 3 merged).
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Central => 0,
            Self::Satellite => 1,
            Self::Orphan => 2,
            Self::Merged => 3,
        }
    }
}

/// How a galaxy left the active population.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MergeKind {
    /// Still active.
    None,
    /// Minor merger onto a central.
    Minor,
    /// Major merger onto a central.
    Major,
    /// Disk-instability mass transfer marker.
    InstabilityTransfer,
    /// Disrupted into the intracluster stars.
    Disrupted,
}

impl MergeKind {
    /// Output encoding (0 none, 1 minor, 2 major, 3 instability, 4
    /// disrupted).
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Minor => 1,
            Self::Major => 2,
            Self::InstabilityTransfer => 3,
            Self::Disrupted => 4,
        }
    }
}

/// Named mass reservoirs of a galaxy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Reservoir {
    /// Cold disk gas.
    ColdGas,
    /// Hot halo gas.
    HotGas,
    /// Total stellar mass.
    Stellar,
    /// Bulge stars (a subset of [`Reservoir::Stellar`]).
    Bulge,
    /// Gas ejected from the halo by feedback.
    Ejected,
    /// Intracluster stars.
    Ics,
    /// Central black hole (no metal counterpart is tracked).
    BlackHole,
}

/// One galaxy. All masses are in code units; `metals_*` fields hold
/// absolute metal mass, not a fraction.
#[derive(Clone, Debug)]
pub struct Galaxy {
    /// Unique per-tree sequence number.
    pub galaxy_nr: u64,
    /// Classification within the FOF group.
    pub galaxy_type: GalaxyType,
    /// Index of the host halo in the tree-local halo array.
    pub halonr: usize,
    /// Snapshot the galaxy state corresponds to.
    pub snap_num: i32,
    /// Most bound particle id inherited from the host halo.
    pub most_bound_id: i64,
    /// Working-array index of this (sub)halo's central galaxy.
    pub central_gal: Option<usize>,

    /// Comoving position, taken from the host halo.
    pub pos: [f32; 3],
    /// Peculiar velocity, taken from the host halo.
    pub vel: [f32; 3],
    /// Particle count of the host halo.
    pub len: i32,
    /// Virial mass.
    pub mvir: f64,
    /// Change of `mvir` over the current snapshot interval.
    pub delta_mvir: f64,
    /// Virial radius (sticky maximum for centrals).
    pub rvir: f64,
    /// Virial velocity (sticky maximum for centrals).
    pub vvir: f64,
    /// Peak circular velocity of the host halo.
    pub vmax: f64,
    /// Exponential disk scale radius, set from halo spin.
    pub disk_scale_radius: f64,

    /// Cold disk gas.
    pub cold_gas: f64,
    /// Metals in the cold gas.
    pub metals_cold_gas: f64,
    /// Total stellar mass (disk + bulge).
    pub stellar_mass: f64,
    /// Metals locked in stars.
    pub metals_stellar_mass: f64,
    /// Bulge stellar mass.
    pub bulge_mass: f64,
    /// Metals in the bulge.
    pub metals_bulge_mass: f64,
    /// Merger-built part of the bulge; the remainder is
    /// instability-driven.
    pub classical_bulge_mass: f64,
    /// Hot halo gas.
    pub hot_gas: f64,
    /// Metals in the hot gas.
    pub metals_hot_gas: f64,
    /// Feedback-ejected gas reservoir.
    pub ejected_mass: f64,
    /// Metals in the ejected reservoir.
    pub metals_ejected_mass: f64,
    /// Central black hole mass.
    pub black_hole_mass: f64,
    /// Intracluster stars.
    pub ics: f64,
    /// Metals in the intracluster stars.
    pub metals_ics: f64,

    /// Disk star-formation rate per substep.
    pub sfr_disk: [f64; STEPS],
    /// Bulge (starburst) star-formation rate per substep.
    pub sfr_bulge: [f64; STEPS],
    /// Cold gas present at each disk star-formation event.
    pub sfr_disk_cold_gas: [f64; STEPS],
    /// Cold metals present at each disk star-formation event.
    pub sfr_disk_cold_gas_metals: [f64; STEPS],
    /// Cold gas present at each starburst.
    pub sfr_bulge_cold_gas: [f64; STEPS],
    /// Cold metals present at each starburst.
    pub sfr_bulge_cold_gas_metals: [f64; STEPS],

    /// Dynamical-friction countdown; [`MERGTIME_UNSET`] when unknown.
    pub merg_time: f64,
    /// How the galaxy retired, if it did.
    pub merge_kind: MergeKind,
    /// Destination galaxy of the merger; working index at merge time,
    /// rewritten to the permanent index at FOF finalisation and to the
    /// per-snapshot output order by the recorder. −1 when none.
    pub merge_into_id: i32,
    /// Snapshot at which the merger completed.
    pub merge_into_snap_num: i32,
    /// Lookback time of the last major merger.
    pub time_of_last_major_merger: f64,
    /// Lookback time of the last minor merger.
    pub time_of_last_minor_merger: f64,

    /// Black-hole mass accreted in quasar mode.
    pub quasar_bh_accretion_mass: f64,
    /// Thermal energy of gas cooled this interval.
    pub cooling_energy: f64,
    /// Thermal energy returned by radio-mode heating this interval.
    pub heating_energy: f64,
    /// Cold gas reheated by supernovae this interval.
    pub outflow_rate: f64,
    /// Radius out to which past radio-mode heating is remembered.
    pub r_heat: f64,

    /// Virial mass when the galaxy last became a satellite.
    pub infall_mvir: f64,
    /// Virial velocity at infall.
    pub infall_vvir: f64,
    /// Peak circular velocity at infall.
    pub infall_vmax: f64,

    /// Length of the snapshot interval being integrated; negative until
    /// the pipeline first touches the galaxy.
    pub dt: f64,
}

impl Galaxy {
    /// A blank galaxy carrying only its identity; the walker fills in the
    /// halo-derived state.
    #[must_use]
    pub fn new(galaxy_nr: u64) -> Self {
        Self {
            galaxy_nr,
            galaxy_type: GalaxyType::Central,
            halonr: 0,
            snap_num: 0,
            most_bound_id: 0,
            central_gal: None,
            pos: [0.0; 3],
            vel: [0.0; 3],
            len: 0,
            mvir: 0.0,
            delta_mvir: 0.0,
            rvir: 0.0,
            vvir: 0.0,
            vmax: 0.0,
            disk_scale_radius: 0.0,
            cold_gas: 0.0,
            metals_cold_gas: 0.0,
            stellar_mass: 0.0,
            metals_stellar_mass: 0.0,
            bulge_mass: 0.0,
            metals_bulge_mass: 0.0,
            classical_bulge_mass: 0.0,
            hot_gas: 0.0,
            metals_hot_gas: 0.0,
            ejected_mass: 0.0,
            metals_ejected_mass: 0.0,
            black_hole_mass: 0.0,
            ics: 0.0,
            metals_ics: 0.0,
            sfr_disk: [0.0; STEPS],
            sfr_bulge: [0.0; STEPS],
            sfr_disk_cold_gas: [0.0; STEPS],
            sfr_disk_cold_gas_metals: [0.0; STEPS],
            sfr_bulge_cold_gas: [0.0; STEPS],
            sfr_bulge_cold_gas_metals: [0.0; STEPS],
            merg_time: MERGTIME_UNSET,
            merge_kind: MergeKind::None,
            merge_into_id: -1,
            merge_into_snap_num: -1,
            time_of_last_major_merger: -1.0,
            time_of_last_minor_merger: -1.0,
            quasar_bh_accretion_mass: 0.0,
            cooling_energy: 0.0,
            heating_energy: 0.0,
            outflow_rate: 0.0,
            r_heat: 0.0,
            infall_mvir: -1.0,
            infall_vvir: -1.0,
            infall_vmax: -1.0,
            dt: -1.0,
        }
    }

    /// True once the galaxy has merged or been disrupted.
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.merge_kind != MergeKind::None || self.galaxy_type == GalaxyType::Merged
    }

    /// Whether the merger clock still carries the unset sentinel.
    #[must_use]
    pub fn merg_time_unset(&self) -> bool {
        self.merg_time > 999.0
    }

    /// Sum of every baryonic reservoir bound to this galaxy.
    #[must_use]
    pub fn baryonic_mass(&self) -> f64 {
        self.stellar_mass
            + self.cold_gas
            + self.hot_gas
            + self.ejected_mass
            + self.black_hole_mass
            + self.ics
    }

    /// Mass held in `r`.
    #[must_use]
    pub fn reservoir_mass(&self, r: Reservoir) -> f64 {
        match r {
            Reservoir::ColdGas => self.cold_gas,
            Reservoir::HotGas => self.hot_gas,
            Reservoir::Stellar => self.stellar_mass,
            Reservoir::Bulge => self.bulge_mass,
            Reservoir::Ejected => self.ejected_mass,
            Reservoir::Ics => self.ics,
            Reservoir::BlackHole => self.black_hole_mass,
        }
    }

    /// Metal mass held in `r`, zero for the black hole.
    #[must_use]
    pub fn reservoir_metals(&self, r: Reservoir) -> f64 {
        match r {
            Reservoir::ColdGas => self.metals_cold_gas,
            Reservoir::HotGas => self.metals_hot_gas,
            Reservoir::Stellar => self.metals_stellar_mass,
            Reservoir::Bulge => self.metals_bulge_mass,
            Reservoir::Ejected => self.metals_ejected_mass,
            Reservoir::Ics => self.metals_ics,
            Reservoir::BlackHole => 0.0,
        }
    }

    fn slots(&mut self, r: Reservoir) -> (&mut f64, Option<&mut f64>) {
        match r {
            Reservoir::ColdGas => (&mut self.cold_gas, Some(&mut self.metals_cold_gas)),
            Reservoir::HotGas => (&mut self.hot_gas, Some(&mut self.metals_hot_gas)),
            Reservoir::Stellar => (&mut self.stellar_mass, Some(&mut self.metals_stellar_mass)),
            Reservoir::Bulge => (&mut self.bulge_mass, Some(&mut self.metals_bulge_mass)),
            Reservoir::Ejected => (&mut self.ejected_mass, Some(&mut self.metals_ejected_mass)),
            Reservoir::Ics => (&mut self.ics, Some(&mut self.metals_ics)),
            Reservoir::BlackHole => (&mut self.black_hole_mass, None),
        }
    }

    /// Add pristine (metal-free) gas to the hot reservoir.
    pub fn add_to_hot(&mut self, mass: f64) {
        self.hot_gas += mass;
    }

    /// Remove `mass` of hot gas at the current hot metallicity, clamped to
    /// what is available. Returns the metal mass removed alongside.
    pub fn remove_from_hot(&mut self, mass: f64) -> f64 {
        let mass = mass.max(0.0).min(self.hot_gas);
        let metals = metallicity(self.hot_gas, self.metals_hot_gas) * mass;
        self.hot_gas -= mass;
        self.metals_hot_gas = (self.metals_hot_gas - metals).max(0.0);
        metals
    }

    /// Move `mass` from `src` to `dst` within this galaxy, metals
    /// following proportionally. The amount is clamped to the source
    /// content; moves into the black hole drop the metals.
    pub fn transfer(&mut self, src: Reservoir, dst: Reservoir, mass: f64) {
        let (src_mass, src_metals) = self.slots(src);
        let mass = mass.max(0.0).min(*src_mass);
        let z = metallicity(*src_mass, src_metals.as_ref().map_or(0.0, |m| **m));
        *src_mass -= mass;
        if let Some(m) = src_metals {
            *m = (*m - z * mass).max(0.0);
        }

        let (dst_mass, dst_metals) = self.slots(dst);
        *dst_mass += mass;
        if let Some(m) = dst_metals {
            *m += z * mass;
        }

        debug_assert!(self.reservoir_mass(src) >= 0.0);
    }

    /// Clear the mass and metals of `r`.
    pub fn zero_reservoir(&mut self, r: Reservoir) {
        let (mass, metals) = self.slots(r);
        *mass = 0.0;
        if let Some(m) = metals {
            *m = 0.0;
        }
    }

    /// Accumulate a star-formation event into the history arrays. Disk
    /// events snapshot the cold-gas state of the substep; bulge
    /// (starburst) events accumulate it.
    ///
    /// # Panics
    ///
    /// Panics if `step` is outside the substep range.
    pub fn record_sfr(
        &mut self,
        step: usize,
        rate: f64,
        cold_gas: f64,
        cold_metals: f64,
        bulge: bool,
    ) {
        assert!(step < STEPS);
        if bulge {
            self.sfr_bulge[step] += rate;
            self.sfr_bulge_cold_gas[step] += cold_gas;
            self.sfr_bulge_cold_gas_metals[step] += cold_metals;
        } else {
            self.sfr_disk[step] += rate;
            self.sfr_disk_cold_gas[step] = cold_gas;
            self.sfr_disk_cold_gas_metals[step] = cold_metals;
        }
    }

    /// Retire the galaxy after a merger or disruption.
    pub fn retire(&mut self, kind: MergeKind) {
        debug_assert!(!self.is_retired());
        debug_assert!(kind != MergeKind::None);
        self.merge_kind = kind;
        self.galaxy_type = GalaxyType::Merged;
    }

    /// Snap floating-point debris to the legal range: tiny negative masses
    /// become zero and metals are capped by their reservoir. Returns an
    /// error if a NaN has crept in.
    pub fn enforce_floors(&mut self) -> crate::Result<()> {
        fn fix(galaxy_nr: u64, name: &str, value: &mut f64) -> crate::Result<()> {
            if value.is_nan() {
                return Err(crate::Error::Numeric(format!(
                    "galaxy {galaxy_nr} reservoir {name} is NaN"
                )));
            }
            if *value < 0.0 {
                debug!("galaxy {galaxy_nr}: snapping negative {name} = {value:e} to zero");
                *value = 0.0;
            }
            Ok(())
        }

        let nr = self.galaxy_nr;
        fix(nr, "ColdGas", &mut self.cold_gas)?;
        fix(nr, "MetalsColdGas", &mut self.metals_cold_gas)?;
        fix(nr, "StellarMass", &mut self.stellar_mass)?;
        fix(nr, "MetalsStellarMass", &mut self.metals_stellar_mass)?;
        fix(nr, "BulgeMass", &mut self.bulge_mass)?;
        fix(nr, "MetalsBulgeMass", &mut self.metals_bulge_mass)?;
        fix(nr, "ClassicalBulgeMass", &mut self.classical_bulge_mass)?;
        fix(nr, "HotGas", &mut self.hot_gas)?;
        fix(nr, "MetalsHotGas", &mut self.metals_hot_gas)?;
        fix(nr, "EjectedMass", &mut self.ejected_mass)?;
        fix(nr, "MetalsEjectedMass", &mut self.metals_ejected_mass)?;
        fix(nr, "BlackHoleMass", &mut self.black_hole_mass)?;
        fix(nr, "ICS", &mut self.ics)?;
        fix(nr, "MetalsICS", &mut self.metals_ics)?;

        self.metals_cold_gas = self.metals_cold_gas.min(self.cold_gas);
        self.metals_stellar_mass = self.metals_stellar_mass.min(self.stellar_mass);
        self.metals_bulge_mass = self.metals_bulge_mass.min(self.bulge_mass);
        self.metals_hot_gas = self.metals_hot_gas.min(self.hot_gas);
        self.metals_ejected_mass = self.metals_ejected_mass.min(self.ejected_mass);
        self.metals_ics = self.metals_ics.min(self.ics);
        self.bulge_mass = self.bulge_mass.min(self.stellar_mass);
        self.classical_bulge_mass = self.classical_bulge_mass.min(self.bulge_mass);
        Ok(())
    }
}
