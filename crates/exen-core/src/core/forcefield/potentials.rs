const COULOMB_CONSTANT: f64 = 332.0637; // In kcal·Å/(mol·e²)

/// Soft-core overlap parameter; controls how strongly the Lennard-Jones
/// singularity is smoothed at intermediate coupling.
const SOFT_CORE_ALPHA: f64 = 0.5;

#[inline]
pub fn harmonic(x: f64, force_constant: f64, equilibrium: f64) -> f64 {
    let delta = x - equilibrium;
    0.5 * force_constant * delta * delta
}

#[inline]
pub fn periodic_torsion(phi: f64, barrier: f64, periodicity: i32, phase: f64) -> f64 {
    barrier * (1.0 + (periodicity as f64 * phi - phase).cos())
}

#[inline]
pub fn lennard_jones_12_6(dist: f64, r_min: f64, well_depth: f64) -> f64 {
    if dist < 1e-6 {
        return 1e10;
    }
    let rho = r_min / dist;
    let rho6 = rho.powi(6);
    let rho12 = rho6 * rho6;
    well_depth * (rho12 - 2.0 * rho6)
}

/// Lennard-Jones 12-6 with a Beutler-style soft core, scaled by `lambda`.
///
/// At `lambda = 1` this reduces exactly to [`lennard_jones_12_6`]; at
/// `lambda = 0` it vanishes. For `0 < lambda < 1` the potential stays finite
/// down to zero separation, which keeps nonequilibrium switching free of the
/// endpoint singularity when atoms are created or destroyed.
#[inline]
pub fn soft_core_lennard_jones(dist: f64, r_min: f64, well_depth: f64, lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return 0.0;
    }
    if r_min < 1e-6 {
        return 0.0;
    }
    let s6 = (dist / r_min).powi(6);
    let denom = SOFT_CORE_ALPHA * (1.0 - lambda) + s6;
    if denom < 1e-12 {
        return 1e10;
    }
    lambda * well_depth * (1.0 / (denom * denom) - 2.0 / denom)
}

#[inline]
pub fn coulomb(dist: f64, q1: f64, q2: f64, dielectric: f64) -> f64 {
    if dist < 1e-6 {
        return q1.signum() * q2.signum() * 1e10;
    }
    COULOMB_CONSTANT * q1 * q2 / (dielectric * dist)
}
