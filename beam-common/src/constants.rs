//! Physical constants in SI base units.

/// Elementary charge [C].
pub const ELEMENTARY_CHARGE: f64 = 1.602_176_634e-19;
/// eV <-> Joule conversion factor.
pub const EV_TO_J: f64 = ELEMENTARY_CHARGE;
/// Boltzmann's constant [J/K].
pub const K_BOLTZMANN: f64 = 1.380_649e-23;
/// Avogadro's number [1/mol].
pub const AVOGADRO: f64 = 6.022_140_76e23;
/// Permittivity of free space [F/m].
pub const EPSILON_0: f64 = 8.854_187_812_8e-12;
