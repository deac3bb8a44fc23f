//! # EXEN Core Library
//!
//! A library for expanded-ensemble sampling over a discrete space of chemical
//! identities (molecules, mutants, or other discretely-varying systems) using
//! reversible-jump Monte Carlo combined with nonequilibrium candidate
//! generation (NCMC) switching.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to ensure a
//! clear separation of concerns, making it modular, testable, and extensible.
//!
//! - **[`core`]: The Foundation.** Contains stateless data models
//!   (`ChemicalSystem`, `PhysicalState`), pure mathematical representations of
//!   the forcefield (`potentials`, `energy`), and internal-coordinate geometry
//!   utilities.
//!
//! - **[`engine`]: The Logic Core.** This stateful layer holds the sampling
//!   machinery: the topology proposal engine, the alchemical system builder,
//!   the NCMC switching engine, the geometry completion engine, and the
//!   expanded-ensemble bias table.
//!
//! - **[`workflows`]: The Public API.** This is the highest-level, user-facing
//!   layer. It ties the `engine` and `core` together to run complete
//!   expanded-ensemble Markov chains and provides the per-iteration driver.

pub mod core;
pub mod engine;
pub mod workflows;
