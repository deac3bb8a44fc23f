pub mod energy;
pub mod potentials;

/// Boltzmann constant in kcal/(mol·K).
pub const BOLTZMANN_KCAL_MOL_K: f64 = 0.001987204259;
