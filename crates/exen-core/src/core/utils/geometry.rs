use nalgebra::{Point3, Unit, Vector3};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// One atom's sampled internal coordinates relative to three reference atoms:
/// a bond length to the anchor, the bend angle at the anchor, and a torsion
/// about the anchor-to-second-reference axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InternalCoordinate {
    /// Bond length in Angstroms.
    pub bond_length: f64,
    /// Bend angle in radians, in (0, pi).
    pub bond_angle: f64,
    /// Torsion in radians, in [-pi, pi).
    pub torsion: f64,
}

/// The local orthogonal frame defined by three reference positions `a`
/// (anchor), `b` (angle reference), and `c` (torsion reference).
///
/// Returns `None` when the references are degenerate (coincident or
/// collinear), in which case no torsion is defined.
fn reference_frame(
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Option<(Vector3<f64>, Vector3<f64>, Vector3<f64>)> {
    let ba = a - b;
    if ba.norm() < 1e-9 {
        return None;
    }
    let e1 = ba.normalize();
    let cb = b - c;
    let normal = cb.cross(&e1);
    if normal.norm() < 1e-9 {
        return None;
    }
    let e3 = normal.normalize();
    let e2 = e1.cross(&e3);
    Some((e1, e2, e3))
}

/// Places a new atom at the given internal coordinates relative to references
/// `a` (bonded anchor), `b` (angle reference), and `c` (torsion reference).
///
/// This is the exact inverse of [`internal_from_positions`]: placing and then
/// measuring recovers the internals to numerical precision, which is what
/// keeps the Jacobian bookkeeping of dimension-changing moves consistent.
pub fn position_from_internal(
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    internal: &InternalCoordinate,
) -> Option<Point3<f64>> {
    let (e1, e2, e3) = reference_frame(a, b, c)?;
    let r = internal.bond_length;
    let (sin_theta, cos_theta) = internal.bond_angle.sin_cos();
    let (sin_phi, cos_phi) = internal.torsion.sin_cos();
    Some(a + e1 * (-r * cos_theta) + e2 * (r * sin_theta * cos_phi) + e3 * (r * sin_theta * sin_phi))
}

/// Measures the internal coordinates of `d` relative to references `a`, `b`,
/// and `c` (the inverse of [`position_from_internal`]).
pub fn internal_from_positions(
    d: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Option<InternalCoordinate> {
    let (e1, e2, e3) = reference_frame(a, b, c)?;
    let u = d - a;
    let r = u.norm();
    if r < 1e-9 {
        return None;
    }
    let x = u.dot(&e1);
    let y = u.dot(&e2);
    let z = u.dot(&e3);
    let bond_angle = (-x / r).clamp(-1.0, 1.0).acos();
    let torsion = z.atan2(y);
    Some(InternalCoordinate {
        bond_length: r,
        bond_angle,
        torsion,
    })
}

/// Log determinant of the Jacobian of the spherical-to-Cartesian map for one
/// placement: `ln(r^2 sin(theta))`.
pub fn log_jacobian_spherical(bond_length: f64, bond_angle: f64) -> f64 {
    2.0 * bond_length.ln() + bond_angle.sin().ln()
}

/// Bend angle at `b` formed by `a-b-c`, in radians.
pub fn bend_angle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let ba = (a - b).normalize();
    let bc = (c - b).normalize();
    ba.dot(&bc).clamp(-1.0, 1.0).acos()
}

/// Signed dihedral angle of the chain `p1-p2-p3-p4`, in radians.
pub fn dihedral_angle(
    p1: &Point3<f64>,
    p2: &Point3<f64>,
    p3: &Point3<f64>,
    p4: &Point3<f64>,
) -> f64 {
    let b1 = p2 - p1;
    let b2 = p3 - p2;
    let b3 = p4 - p3;
    let n1 = b1.cross(&b2);
    let n2 = b2.cross(&b3);
    let m1 = n1.cross(&Unit::new_normalize(b2).into_inner());
    let x = n1.dot(&n2);
    let y = m1.dot(&n2);
    y.atan2(x)
}

/// A direction drawn uniformly from the unit sphere.
pub fn uniform_unit_vector(rng: &mut (impl Rng + ?Sized)) -> Vector3<f64> {
    loop {
        let v: Vector3<f64> = Vector3::new(
            StandardNormal.sample(rng),
            StandardNormal.sample(rng),
            StandardNormal.sample(rng),
        );
        let norm = v.norm();
        if norm > 1e-9 {
            return v / norm;
        }
    }
}

/// A deterministic point completing `a`, `b` to a non-collinear reference
/// triple, used as a virtual torsion reference when only two real atoms have
/// been placed.
pub fn virtual_torsion_reference(a: &Point3<f64>, b: &Point3<f64>) -> Point3<f64> {
    let ab = b - a;
    let axis = if ab.x.abs() < 0.9 * ab.norm() {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let perpendicular = ab.cross(&axis).normalize();
    b + perpendicular
}
