//! `aquad` is an adaptive Gaussian quadrature library for parameter-dependent
//! integrands.
//!
//! An [`AdaptiveTree`](tree::AdaptiveTree) bisects an interval until a
//! dual-order Gauss–Legendre estimate meets its tolerance, switching to a
//! Gauss–Laguerre change of variable at declared endpoint singularities. A
//! [`TreeBatch`](batch::TreeBatch) sweeps such trees over a grid of named
//! parameter values and persists, reloads and merges the results as JSON.

pub mod batch;
pub mod changelog;
pub mod combinator;
pub mod error;
pub mod integrand;
pub mod params;
pub mod rule;
pub mod tree;
pub mod weights;

pub mod benchmark {
    pub mod integrands;
}

mod proptests;

pub use batch::{MergeReport, TreeBatch};
pub use error::{QuadError, Result};
pub use integrand::{Integrand, SharedIntegrand};
pub use params::{ParamCollection, ParamMap, ParamValue, ParamValues};
pub use tree::{AdaptiveTree, BuildOptions, Provenance, TreeConfig};
pub use weights::{QuadratureMethod, QuadratureTables, WeightsTable};
