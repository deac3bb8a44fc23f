use std::str::FromStr;

/// Atomic masses in g/mol, keyed by element symbol.
static ELEMENT_MASSES: phf::Map<&'static str, f64> = phf::phf_map! {
    "H" => 1.008,
    "C" => 12.011,
    "N" => 14.007,
    "O" => 15.999,
    "P" => 30.974,
    "S" => 32.06,
};

/// The chemical element of an atom.
///
/// Only the elements that occur in the identities this library samples over
/// are enumerated; anything else is collapsed into [`Element::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Element {
    Hydrogen,
    #[default]
    Carbon,
    Nitrogen,
    Oxygen,
    Phosphorus,
    Sulfur,
    /// An element without tabulated parameters.
    Other,
}

impl Element {
    pub fn symbol(&self) -> &'static str {
        match self {
            Element::Hydrogen => "H",
            Element::Carbon => "C",
            Element::Nitrogen => "N",
            Element::Oxygen => "O",
            Element::Phosphorus => "P",
            Element::Sulfur => "S",
            Element::Other => "X",
        }
    }

    /// Returns the atomic mass in g/mol, or 0.0 for untabulated elements.
    pub fn mass(&self) -> f64 {
        ELEMENT_MASSES.get(self.symbol()).copied().unwrap_or(0.0)
    }
}

impl FromStr for Element {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "H" => Ok(Element::Hydrogen),
            "C" => Ok(Element::Carbon),
            "N" => Ok(Element::Nitrogen),
            "O" => Ok(Element::Oxygen),
            "P" => Ok(Element::Phosphorus),
            "S" => Ok(Element::Sulfur),
            "X" => Ok(Element::Other),
            _ => Err(()),
        }
    }
}

/// Represents an atom in a chemical identity's topology.
///
/// Atoms live in a plain `Vec` inside a [`Topology`](super::topology::Topology)
/// and are addressed everywhere by their index into that array. This keeps the
/// atom map of a dimension-changing proposal an explicit partial bijection
/// over integer indices rather than a pointer-like structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// The name of the atom within its identity (e.g., "C1").
    pub name: String,
    /// The chemical element.
    pub element: Element,
    /// The atomic mass in g/mol.
    pub mass: f64,
    /// The partial atomic charge in elementary charge units.
    pub partial_charge: f64,
    /// The Lennard-Jones minimum-energy distance in Angstroms.
    pub lj_r_min: f64,
    /// The Lennard-Jones well depth in kcal/mol.
    pub lj_well_depth: f64,
}

impl Atom {
    /// Creates a new `Atom` with zeroed nonbonded parameters.
    ///
    /// The mass is taken from the element table; charge and Lennard-Jones
    /// parameters default to zero and are filled in by the identity provider
    /// during parameterization.
    pub fn new(name: &str, element: Element) -> Self {
        Self {
            name: name.to_string(),
            element,
            mass: element.mass(),
            partial_charge: 0.0,
            lj_r_min: 0.0,
            lj_well_depth: 0.0,
        }
    }
}
