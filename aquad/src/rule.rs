//! Dual-order Gaussian quadrature rules.
//!
//! A [`QuadratureRule`] evaluates the same weighted sum at two orders. The
//! lower order is the estimate and the absolute difference between the two is
//! the error proxy used by the adaptive tree.

use wide::f64x4;

use crate::error::{QuadError, Result};
use crate::integrand::Integrand;
use crate::params::ParamMap;
use crate::weights::{QuadratureMethod, WeightsTable};

/// Which bound of the interval carries the singularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Lower,
    Upper,
}

/// The closed set of rule shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuleKind {
    /// Canonical nodes on `[-1, 1]` mapped linearly into `[lower, upper]`.
    Standard { lower: f64, upper: f64 },
    /// Nodes on `[0, ∞)` used as is. With `weighted`, each term is multiplied
    /// by `e^t`, cancelling the Laguerre weight so the rule integrates `f`
    /// itself rather than `f e^{-t}`.
    HalfInfinite { weighted: bool },
    /// Maps `[0, ∞)` onto `[lower, upper]` with
    /// `x(t) = s + (o - s) e^{-t/(1-α)}` (`s` the singular bound, `o` the
    /// other one) and compensates with `|x - s|^α (upper - lower)^{1-α} / (1 - α)`.
    /// Integrands behaving like `|x - s|^{-α}` near `s` become smooth in `t`.
    SingularEndpoint {
        lower: f64,
        upper: f64,
        side: Endpoint,
        alpha: f64,
    },
}

/// The pair produced by one rule evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleEstimate {
    /// Estimate at the first order.
    pub result: f64,
    /// `|I(order1) - I(order2)|`.
    pub error: f64,
}

/// A quadrature rule bound to one table and two orders.
#[derive(Debug, Clone, Copy)]
pub struct QuadratureRule<'a> {
    kind: RuleKind,
    table: &'a WeightsTable,
    order1: usize,
    order2: usize,
}

impl<'a> QuadratureRule<'a> {
    /// Creates a rule after checking that `table` carries both orders.
    ///
    /// # Arguments
    ///
    /// * `kind`: The shape of the rule.
    /// * `table`: Nodes and weights; Legendre for [`RuleKind::Standard`],
    ///   Laguerre for the other two shapes.
    /// * `order1`: The order of the reported estimate.
    /// * `order2`: The order compared against for the error.
    pub fn new(kind: RuleKind, table: &'a WeightsTable, order1: usize, order2: usize) -> Result<Self> {
        let expected = match kind {
            RuleKind::Standard { .. } => QuadratureMethod::GaussLegendre,
            RuleKind::HalfInfinite { .. } | RuleKind::SingularEndpoint { .. } => {
                QuadratureMethod::GaussLaguerre
            }
        };
        if table.method() != expected {
            return Err(QuadError::config(format!(
                "rule needs a {expected} table, got {}",
                table.method()
            )));
        }
        if let RuleKind::SingularEndpoint { alpha, .. } = kind {
            if !(0.0..1.0).contains(&alpha) {
                return Err(QuadError::config(format!(
                    "singular exponent must lie in [0, 1), got {alpha}"
                )));
            }
        }
        for order in [order1, order2] {
            if !table.has_order(order) {
                return Err(QuadError::OrderNotFound {
                    method: table.method(),
                    order,
                });
            }
        }
        Ok(QuadratureRule {
            kind,
            table,
            order1,
            order2,
        })
    }

    pub fn standard(
        table: &'a WeightsTable,
        order1: usize,
        order2: usize,
        lower: f64,
        upper: f64,
    ) -> Result<Self> {
        Self::new(RuleKind::Standard { lower, upper }, table, order1, order2)
    }

    pub fn half_infinite(
        table: &'a WeightsTable,
        order1: usize,
        order2: usize,
        weighted: bool,
    ) -> Result<Self> {
        Self::new(RuleKind::HalfInfinite { weighted }, table, order1, order2)
    }

    pub fn singular(
        table: &'a WeightsTable,
        order1: usize,
        order2: usize,
        lower: f64,
        upper: f64,
        side: Endpoint,
        alpha: f64,
    ) -> Result<Self> {
        Self::new(
            RuleKind::SingularEndpoint {
                lower,
                upper,
                side,
                alpha,
            },
            table,
            order1,
            order2,
        )
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn method(&self) -> QuadratureMethod {
        self.table.method()
    }

    /// Maps a canonical node to `(x, factor)`: the abscissa handed to the
    /// integrand and the multiplier applied to its weight.
    pub fn transform(&self, t: f64) -> (f64, f64) {
        match self.kind {
            RuleKind::Standard { lower, upper } => {
                let half = 0.5 * (upper - lower);
                (lower + half * (t + 1.0), half)
            }
            RuleKind::HalfInfinite { weighted } => (t, if weighted { t.exp() } else { 1.0 }),
            RuleKind::SingularEndpoint {
                lower,
                upper,
                side,
                alpha,
            } => {
                let (singular, other, sign) = match side {
                    Endpoint::Lower => (lower, upper, 1.0),
                    Endpoint::Upper => (upper, lower, -1.0),
                };
                let beta = 1.0 - alpha;
                let z = (-t / beta).exp();
                // z e^t = z^α, the mapped Jacobian with the Laguerre weight divided out
                let z_alpha = (-t * alpha / beta).exp();
                (
                    singular + (other - singular) * z,
                    sign * (other - singular) * z_alpha / beta,
                )
            }
        }
    }

    fn sum(&self, integrand: &dyn Integrand, params: &ParamMap, order: usize) -> Result<f64> {
        let (nodes, weights) = self.table.rule(order)?;
        let mut values = Vec::with_capacity(nodes.len());
        let mut coeffs = Vec::with_capacity(nodes.len());
        for (&t, &w) in nodes.iter().zip(weights) {
            let (x, factor) = self.transform(t);
            let coeff = w * factor;
            // a zero coefficient must not meet an infinite integrand value
            if coeff == 0.0 {
                continue;
            }
            values.push(integrand.eval(params, x));
            coeffs.push(coeff);
        }
        Ok(dot(&values, &coeffs))
    }

    /// Evaluates the integrand at both orders.
    pub fn integrate(&self, integrand: &dyn Integrand, params: &ParamMap) -> Result<RuleEstimate> {
        let first = self.sum(integrand, params, self.order1)?;
        let second = self.sum(integrand, params, self.order2)?;
        Ok(RuleEstimate {
            result: first,
            error: (first - second).abs(),
        })
    }
}

/// Weighted sum, four lanes at a time.
fn dot(values: &[f64], coeffs: &[f64]) -> f64 {
    let mut acc = f64x4::splat(0.0);
    let mut v_chunks = values.chunks_exact(4);
    let mut c_chunks = coeffs.chunks_exact(4);
    for (v, c) in (&mut v_chunks).zip(&mut c_chunks) {
        let v = f64x4::from([v[0], v[1], v[2], v[3]]);
        let c = f64x4::from([c[0], c[1], c[2], c[3]]);
        acc += v * c;
    }
    let tail: f64 = v_chunks
        .remainder()
        .iter()
        .zip(c_chunks.remainder())
        .map(|(v, c)| v * c)
        .sum();
    acc.reduce_add() + tail
}
