//! The `Integrand` trait, which defines the function to be integrated.

use crate::params::ParamMap;

/// A real-valued function of one variable, parameterized by a [`ParamMap`].
///
/// Implementations must be pure: the same `(params, t)` always yields the same
/// value and evaluation has no side effects. Any `Fn(&ParamMap, f64) -> f64`
/// closure is an integrand.
pub trait Integrand {
    /// Evaluates the function at `t` for one parameter combination.
    ///
    /// # Arguments
    ///
    /// * `params`: The parameter values of the current run. Never mutated.
    /// * `t`: The abscissa.
    fn eval(&self, params: &ParamMap, t: f64) -> f64;
}

impl<F> Integrand for F
where
    F: Fn(&ParamMap, f64) -> f64,
{
    fn eval(&self, params: &ParamMap, t: f64) -> f64 {
        self(params, t)
    }
}

/// A shareable integrand, as stored by trees and batches.
pub type SharedIntegrand = std::sync::Arc<dyn Integrand + Send + Sync>;
