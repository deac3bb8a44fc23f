use super::atom::Atom;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("Bond ({0}, {1}) references an atom index out of range")]
    BondIndexOutOfRange(usize, usize),
    #[error("Atom {0} is bonded to itself")]
    SelfBond(usize),
    #[error("Duplicate bond ({0}, {1})")]
    DuplicateBond(usize, usize),
}

/// The covalent connectivity of one chemical identity.
///
/// Atoms are addressed by index into the atom array; bonds are unordered index
/// pairs. Angle triples and torsion quadruples are enumerated on demand from
/// the bond graph rather than stored, so the topology stays the single source
/// of truth for connectivity.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    atoms: Vec<Atom>,
    bonds: Vec<(usize, usize)>,
    adjacency: Vec<Vec<usize>>,
}

impl Topology {
    pub fn new(atoms: Vec<Atom>, bonds: Vec<(usize, usize)>) -> Result<Self, TopologyError> {
        let n = atoms.len();
        let mut adjacency = vec![Vec::new(); n];
        let mut seen = HashSet::new();
        for &(i, j) in &bonds {
            if i >= n || j >= n {
                return Err(TopologyError::BondIndexOutOfRange(i, j));
            }
            if i == j {
                return Err(TopologyError::SelfBond(i));
            }
            let key = (i.min(j), i.max(j));
            if !seen.insert(key) {
                return Err(TopologyError::DuplicateBond(key.0, key.1));
            }
            adjacency[i].push(j);
            adjacency[j].push(i);
        }
        for neighbors in &mut adjacency {
            neighbors.sort_unstable();
        }
        Ok(Self {
            atoms,
            bonds,
            adjacency,
        })
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atom(&self, index: usize) -> Option<&Atom> {
        self.atoms.get(index)
    }

    pub fn bonds(&self) -> &[(usize, usize)] {
        &self.bonds
    }

    /// Neighbor indices of `index`, sorted ascending.
    pub fn bonded_neighbors(&self, index: usize) -> &[usize] {
        self.adjacency
            .get(index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Enumerates all angle triples (i, j, k) with j the central atom and i < k.
    pub fn angles(&self) -> Vec<(usize, usize, usize)> {
        let mut angles = Vec::new();
        for j in 0..self.atoms.len() {
            let neighbors = &self.adjacency[j];
            for a in 0..neighbors.len() {
                for b in (a + 1)..neighbors.len() {
                    angles.push((neighbors[a], j, neighbors[b]));
                }
            }
        }
        angles
    }

    /// Enumerates all proper torsion quadruples (i, j, k, l) around each bond (j, k).
    pub fn torsions(&self) -> Vec<(usize, usize, usize, usize)> {
        let mut torsions = Vec::new();
        for &(j, k) in &self.bonds {
            for &i in &self.adjacency[j] {
                if i == k {
                    continue;
                }
                for &l in &self.adjacency[k] {
                    if l == j || l == i {
                        continue;
                    }
                    torsions.push((i, j, k, l));
                }
            }
        }
        torsions
    }

    /// Pairs (i, j) with i < j separated by one or two bonds, excluded from
    /// nonbonded evaluation.
    pub fn nonbonded_exclusions(&self) -> HashSet<(usize, usize)> {
        let mut exclusions = HashSet::new();
        for &(i, j) in &self.bonds {
            exclusions.insert((i.min(j), i.max(j)));
        }
        for (i, _, k) in self.angles() {
            exclusions.insert((i.min(k), i.max(k)));
        }
        exclusions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::Element;

    fn chain_atoms(n: usize) -> Vec<Atom> {
        (0..n)
            .map(|i| Atom::new(&format!("C{}", i + 1), Element::Carbon))
            .collect()
    }

    fn chain_bonds(n: usize) -> Vec<(usize, usize)> {
        (0..n.saturating_sub(1)).map(|i| (i, i + 1)).collect()
    }

    #[test]
    fn new_rejects_out_of_range_bond() {
        let result = Topology::new(chain_atoms(2), vec![(0, 5)]);
        assert_eq!(result.unwrap_err(), TopologyError::BondIndexOutOfRange(0, 5));
    }

    #[test]
    fn new_rejects_self_bond() {
        let result = Topology::new(chain_atoms(2), vec![(1, 1)]);
        assert_eq!(result.unwrap_err(), TopologyError::SelfBond(1));
    }

    #[test]
    fn new_rejects_duplicate_bond_in_either_orientation() {
        let result = Topology::new(chain_atoms(3), vec![(0, 1), (1, 0)]);
        assert_eq!(result.unwrap_err(), TopologyError::DuplicateBond(0, 1));
    }

    #[test]
    fn bonded_neighbors_are_sorted() {
        let topology = Topology::new(chain_atoms(4), vec![(1, 3), (1, 0), (1, 2)]).unwrap();
        assert_eq!(topology.bonded_neighbors(1), &[0, 2, 3]);
        assert_eq!(topology.bonded_neighbors(0), &[1]);
    }

    #[test]
    fn angles_enumerated_around_central_atoms() {
        let topology = Topology::new(chain_atoms(4), chain_bonds(4)).unwrap();
        assert_eq!(topology.angles(), vec![(0, 1, 2), (1, 2, 3)]);
    }

    #[test]
    fn torsions_enumerated_around_central_bonds() {
        let topology = Topology::new(chain_atoms(4), chain_bonds(4)).unwrap();
        assert_eq!(topology.torsions(), vec![(0, 1, 2, 3)]);
    }

    #[test]
    fn exclusions_cover_one_two_and_one_three_pairs() {
        let topology = Topology::new(chain_atoms(4), chain_bonds(4)).unwrap();
        let exclusions = topology.nonbonded_exclusions();
        assert!(exclusions.contains(&(0, 1)));
        assert!(exclusions.contains(&(0, 2)));
        assert!(!exclusions.contains(&(0, 3)));
        assert_eq!(exclusions.len(), 5);
    }

    #[test]
    fn single_atom_topology_has_no_connectivity() {
        let topology = Topology::new(chain_atoms(1), vec![]).unwrap();
        assert_eq!(topology.atom_count(), 1);
        assert!(topology.angles().is_empty());
        assert!(topology.torsions().is_empty());
        assert!(topology.nonbonded_exclusions().is_empty());
    }
}
