//! Physical constants shared by the coupler and the component models.

/// Gravitational acceleration
/// unit: m / s^2
pub const GRAV: f64 = 9.81;

/// Gas constant for dry air
/// unit: J / kg / K
pub const R_D: f64 = 287.0;

/// Gas constant for water vapour
/// unit: J / kg / K
pub const R_V: f64 = 461.5;

/// Isobaric specific heat of dry air
/// unit: J / kg / K
pub const CP_D: f64 = 1004.5;

/// Isochoric specific heat of dry air
/// unit: J / kg / K
pub const CV_D: f64 = CP_D - R_D;

/// Latent heat of vaporisation at the reference temperature
/// unit: J / kg
pub const LH_V0: f64 = 2.5008e6;

/// Latent heat of fusion
/// unit: J / kg
pub const LH_F0: f64 = 3.34e5;

/// Latent heat of sublimation
/// unit: J / kg
pub const LH_S0: f64 = LH_V0 + LH_F0;

/// Density of liquid water
/// unit: kg / m^3
pub const RHO_LIQ: f64 = 1000.0;

/// Density of sea ice
/// unit: kg / m^3
pub const RHO_ICE: f64 = 917.0;

/// Melting point of fresh water
/// unit: K
pub const T_FREEZE: f64 = 273.15;

/// Freezing point of sea water
/// unit: K
pub const T_FREEZE_SEAWATER: f64 = 271.2;

/// Stefan-Boltzmann constant
/// unit: W / m^2 / K^4
pub const STEFAN_BOLTZMANN: f64 = 5.670374419e-8;

/// Von Karman constant
pub const VON_KARMAN: f64 = 0.4;

/// Saturation vapour pressure at the melting point
/// unit: Pa
pub const E_SAT_0: f64 = 611.213;

/// Mean radius of the Earth
/// unit: m
pub const EARTH_RADIUS: f64 = 6.371e6;

pub const SECONDS_PER_DAY: f64 = 86400.0;
