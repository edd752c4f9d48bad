//! Adaptive bisection trees.
//!
//! An [`AdaptiveTree`] integrates one integrand, for one parameter
//! combination, over `[lower, upper]`. Every node evaluates a dual-order rule
//! on its sub-interval and splits at the midpoint while its error estimate is
//! at or above its share of the tolerance. The integral and error of the tree
//! are the sums over its leaves.

use std::fmt;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::changelog::{system_clock, ChangeLog, SharedClock};
use crate::error::{QuadError, Result};
use crate::integrand::{Integrand, SharedIntegrand};
use crate::params::ParamMap;
use crate::rule::{Endpoint, QuadratureRule};
use crate::weights::{QuadratureMethod, QuadratureTables};

/// Initial change-log message of a freshly built tree.
pub const INITIAL_TREE_MESSAGE: &str = "Initial Train";

/// One interval of the subdivision.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub lower: f64,
    pub upper: f64,
    pub depth: usize,
    /// The share of the global tolerance assigned to this interval.
    pub tolerance: f64,
    /// Error estimate of this interval. Only meaningful for leaves once the
    /// tree is built.
    pub error: f64,
    /// Estimate of this interval. Only meaningful for leaves once the tree is
    /// built.
    pub result: f64,
    pub order1: usize,
    pub order2: usize,
    pub method: QuadratureMethod,
    pub left: Option<Box<Node>>,
    pub right: Option<Box<Node>>,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    pub fn children(&self) -> impl Iterator<Item = &Node> {
        self.left.iter().chain(self.right.iter()).map(|child| &**child)
    }

    /// Sums `(result, error)` over the leaves below this node.
    pub fn integral_and_error(&self) -> (f64, f64) {
        if self.is_leaf() {
            return (self.result, self.error);
        }
        self.children()
            .map(Node::integral_and_error)
            .fold((0.0, 0.0), |(i, e), (ci, ce)| (i + ci, e + ce))
    }

    pub fn node_count(&self) -> usize {
        1 + self.children().map(Node::node_count).sum::<usize>()
    }

    pub fn leaf_count(&self) -> usize {
        if self.is_leaf() {
            1
        } else {
            self.children().map(Node::leaf_count).sum()
        }
    }

    /// Leaves in left-to-right order.
    pub fn leaves(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Node>) {
        if self.is_leaf() {
            out.push(self);
        }
        for child in self.children() {
            child.collect_leaves(out);
        }
    }

    fn to_document(&self, full: bool) -> NodeDocument {
        let child = |c: &Option<Box<Node>>| {
            c.as_deref()
                .filter(|_| full)
                .map(|n| Box::new(n.to_document(true)))
        };
        NodeDocument {
            a: self.lower,
            b: self.upper,
            depth: self.depth,
            tol: self.tolerance,
            error: self.error,
            integral: self.result,
            method: self.method,
            left: child(&self.left),
            right: child(&self.right),
        }
    }

    fn from_document(doc: &NodeDocument, order1: usize, order2: usize) -> Node {
        let child = |c: &Option<Box<NodeDocument>>| {
            c.as_deref()
                .map(|d| Box::new(Node::from_document(d, order1, order2)))
        };
        Node {
            lower: doc.a,
            upper: doc.b,
            depth: doc.depth,
            tolerance: doc.tol,
            error: doc.error,
            result: doc.integral,
            order1,
            order2,
            method: doc.method,
            left: child(&doc.left),
            right: child(&doc.right),
        }
    }
}

/// Scalar configuration of a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    pub lower: f64,
    pub upper: f64,
    pub tolerance: f64,
    pub min_depth: usize,
    pub max_depth: usize,
    /// Order of the reported estimate.
    pub order1: usize,
    /// Order of the comparison estimate.
    pub order2: usize,
    pub lower_singular: bool,
    pub upper_singular: bool,
    /// Exponent `α` of an `|x - lower|^{-α}` singularity.
    pub alpha_lower: f64,
    /// Exponent `α` of an `|upper - x|^{-α}` singularity.
    pub alpha_upper: f64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig {
            lower: 0.0,
            upper: 1.0,
            tolerance: 1e-6,
            min_depth: 2,
            max_depth: 10,
            order1: 5,
            order2: 10,
            lower_singular: false,
            upper_singular: false,
            alpha_lower: 0.0,
            alpha_upper: 0.0,
        }
    }
}

impl TreeConfig {
    pub fn new(lower: f64, upper: f64, tolerance: f64) -> Self {
        TreeConfig {
            lower,
            upper,
            tolerance,
            ..Self::default()
        }
    }

    pub fn with_depths(mut self, min_depth: usize, max_depth: usize) -> Self {
        self.min_depth = min_depth;
        self.max_depth = max_depth;
        self
    }

    pub fn with_orders(mut self, order1: usize, order2: usize) -> Self {
        self.order1 = order1;
        self.order2 = order2;
        self
    }

    /// Declares an `|x - lower|^{-alpha}` singularity.
    pub fn singular_lower(mut self, alpha: f64) -> Self {
        self.lower_singular = true;
        self.alpha_lower = alpha;
        self
    }

    /// Declares an `|upper - x|^{-alpha}` singularity.
    pub fn singular_upper(mut self, alpha: f64) -> Self {
        self.upper_singular = true;
        self.alpha_upper = alpha;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.lower.is_finite() && self.upper.is_finite() && self.lower < self.upper) {
            return Err(QuadError::config(format!(
                "interval [{}, {}] is not a finite, non-empty range",
                self.lower, self.upper
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(QuadError::config(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.min_depth > self.max_depth {
            return Err(QuadError::config(format!(
                "min_depth {} exceeds max_depth {}",
                self.min_depth, self.max_depth
            )));
        }
        if self.order1 == 0 || self.order2 == 0 {
            return Err(QuadError::config("quadrature orders must be positive"));
        }
        for (flag, alpha) in [
            (self.lower_singular, self.alpha_lower),
            (self.upper_singular, self.alpha_upper),
        ] {
            if flag && !(0.0..1.0).contains(&alpha) {
                return Err(QuadError::config(format!(
                    "singular exponent must lie in [0, 1), got {alpha}"
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn any_singular(&self) -> bool {
        self.lower_singular || self.upper_singular
    }

    /// Fails unless `tables` carries every order this configuration uses.
    pub fn check_tables(&self, tables: &QuadratureTables) -> Result<()> {
        tables.require(QuadratureMethod::GaussLegendre, self.order1, self.order2)?;
        if self.any_singular() {
            tables.require(QuadratureMethod::GaussLaguerre, self.order1, self.order2)?;
        }
        Ok(())
    }
}

/// Free-form metadata recorded in every document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub name: String,
    pub author: String,
    pub description: String,
    pub reference: String,
    pub version: String,
}

impl Default for Provenance {
    fn default() -> Self {
        Provenance {
            name: "Project".to_string(),
            author: "Author".to_string(),
            description: "project description".to_string(),
            reference: "references".to_string(),
            version: "1.0".to_string(),
        }
    }
}

/// Settings that do not influence the numbers: metadata, the first log
/// message and the clock stamping log entries.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub provenance: Provenance,
    /// Replaces the default first log message when set.
    pub message: Option<String>,
    pub clock: SharedClock,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            provenance: Provenance::default(),
            message: None,
            clock: system_clock(),
        }
    }
}

impl BuildOptions {
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }
}

/// Persisted node shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDocument {
    pub a: f64,
    pub b: f64,
    pub depth: usize,
    pub tol: f64,
    pub error: f64,
    pub integral: f64,
    pub method: QuadratureMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<Box<NodeDocument>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<Box<NodeDocument>>,
}

/// Persisted tree: header, change log and node shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeDocument {
    pub name: String,
    pub author: String,
    pub description: String,
    pub reference: String,
    pub version: String,
    pub tolerance: f64,
    pub min_depth: usize,
    pub max_depth: usize,
    pub n1: usize,
    pub n2: usize,
    #[serde(default)]
    pub lower: f64,
    #[serde(default = "default_upper")]
    pub upper: f64,
    #[serde(default)]
    pub a_singular: bool,
    #[serde(default)]
    pub b_singular: bool,
    #[serde(default)]
    pub alpha_a: f64,
    #[serde(default)]
    pub alpha_b: f64,
    pub update_log: ChangeLog,
    pub tree: NodeDocument,
}

fn default_upper() -> f64 {
    1.0
}

impl TreeDocument {
    fn config(&self) -> TreeConfig {
        TreeConfig {
            lower: self.lower,
            upper: self.upper,
            tolerance: self.tolerance,
            min_depth: self.min_depth,
            max_depth: self.max_depth,
            order1: self.n1,
            order2: self.n2,
            lower_singular: self.a_singular,
            upper_singular: self.b_singular,
            alpha_lower: self.alpha_a,
            alpha_upper: self.alpha_b,
        }
    }

    fn provenance(&self) -> Provenance {
        Provenance {
            name: self.name.clone(),
            author: self.author.clone(),
            description: self.description.clone(),
            reference: self.reference.clone(),
            version: self.version.clone(),
        }
    }
}

/// Borrowed inputs of one recursive build.
struct Builder<'a> {
    config: &'a TreeConfig,
    tables: &'a QuadratureTables,
    integrand: &'a dyn Integrand,
    params: &'a ParamMap,
}

impl Builder<'_> {
    fn rule(&self, lower: f64, upper: f64) -> Result<QuadratureRule<'_>> {
        let c = self.config;
        let (o1, o2) = (c.order1, c.order2);
        let laguerre = self.tables.table(QuadratureMethod::GaussLaguerre);
        if c.lower_singular && lower == c.lower {
            QuadratureRule::singular(laguerre, o1, o2, lower, upper, Endpoint::Lower, c.alpha_lower)
        } else if c.upper_singular && upper == c.upper {
            QuadratureRule::singular(laguerre, o1, o2, lower, upper, Endpoint::Upper, c.alpha_upper)
        } else {
            let legendre = self.tables.table(QuadratureMethod::GaussLegendre);
            QuadratureRule::standard(legendre, o1, o2, lower, upper)
        }
    }

    fn node(&self, lower: f64, upper: f64, depth: usize, tolerance: f64) -> Result<Node> {
        let rule = self.rule(lower, upper)?;
        let estimate = rule.integrate(self.integrand, self.params)?;
        let mut node = Node {
            lower,
            upper,
            depth,
            tolerance,
            error: estimate.error,
            result: estimate.result,
            order1: self.config.order1,
            order2: self.config.order2,
            method: rule.method(),
            left: None,
            right: None,
        };

        let above = estimate.error >= tolerance;
        if depth < self.config.min_depth || (above && depth < self.config.max_depth) {
            let mid = lower + 0.5 * (upper - lower);
            let half = 0.5 * tolerance;
            node.left = Some(Box::new(self.node(lower, mid, depth + 1, half)?));
            node.right = Some(Box::new(self.node(mid, upper, depth + 1, half)?));
        } else if above {
            debug!(
                lower,
                upper,
                error = estimate.error,
                tolerance,
                "leaf accepted at max depth above tolerance"
            );
        }
        Ok(node)
    }

    fn root(&self) -> Result<Node> {
        self.node(
            self.config.lower,
            self.config.upper,
            0,
            self.config.tolerance,
        )
    }
}

/// A built (or reloaded) adaptive quadrature tree.
///
/// Cloning copies the node structure; the integrand, the weights tables and
/// the clock are shared.
#[derive(Clone)]
pub struct AdaptiveTree {
    root: Node,
    config: TreeConfig,
    tables: QuadratureTables,
    provenance: Provenance,
    log: ChangeLog,
    params: ParamMap,
    integrand: SharedIntegrand,
    clock: SharedClock,
}

impl AdaptiveTree {
    /// Builds a tree with default provenance and the system clock.
    ///
    /// # Arguments
    ///
    /// * `config`: Interval, tolerance, depth bounds, orders and singularities.
    /// * `tables`: Must carry `order1` and `order2` for Gauss–Legendre, and
    ///   for Gauss–Laguerre too when an endpoint is singular.
    /// * `integrand`: The function to integrate.
    /// * `params`: Passed unchanged to every integrand evaluation.
    pub fn new(
        config: TreeConfig,
        tables: QuadratureTables,
        integrand: SharedIntegrand,
        params: ParamMap,
    ) -> Result<Self> {
        Self::with_options(config, tables, integrand, params, BuildOptions::default())
    }

    pub fn with_options(
        config: TreeConfig,
        tables: QuadratureTables,
        integrand: SharedIntegrand,
        params: ParamMap,
        options: BuildOptions,
    ) -> Result<Self> {
        let mut log = ChangeLog::new();
        let message = options.message.as_deref().unwrap_or(INITIAL_TREE_MESSAGE);
        log.record(options.clock.as_ref(), message);
        Self::build(config, tables, integrand, params, options.provenance, log, options.clock)
    }

    /// Builds with a ready-made change log.
    pub(crate) fn build(
        config: TreeConfig,
        tables: QuadratureTables,
        integrand: SharedIntegrand,
        params: ParamMap,
        provenance: Provenance,
        log: ChangeLog,
        clock: SharedClock,
    ) -> Result<Self> {
        config.validate()?;
        config.check_tables(&tables)?;
        let root = Builder {
            config: &config,
            tables: &tables,
            integrand: integrand.as_ref(),
            params: &params,
        }
        .root()?;

        let tree = AdaptiveTree {
            root,
            config,
            tables,
            provenance,
            log,
            params,
            integrand,
            clock,
        };
        let (integral, error) = tree.integral_and_error();
        debug!(
            params = %tree.params,
            nodes = tree.node_count(),
            leaves = tree.leaf_count(),
            integral,
            error,
            "built adaptive tree"
        );
        Ok(tree)
    }

    /// Retrains with the stored integrand, parameters and configuration and
    /// appends `message` to the change log.
    pub fn rebuild(&mut self, message: impl Into<String>) -> Result<()> {
        self.config.validate()?;
        self.config.check_tables(&self.tables)?;
        self.root = Builder {
            config: &self.config,
            tables: &self.tables,
            integrand: self.integrand.as_ref(),
            params: &self.params,
        }
        .root()?;
        self.add_log(message);
        Ok(())
    }

    /// Changes the global tolerance and retrains.
    pub fn set_tolerance(&mut self, tolerance: f64) -> Result<()> {
        let previous = self.config.tolerance;
        self.config.tolerance = tolerance;
        if let Err(err) = self.config.validate() {
            self.config.tolerance = previous;
            return Err(err);
        }
        self.rebuild(format!("Tolerance changed from {previous} to {tolerance}"))
    }

    /// Appends a timestamped entry to the change log.
    pub fn add_log(&mut self, message: impl Into<String>) {
        self.log.record(self.clock.as_ref(), message);
    }

    /// `(integral, error)` summed over the leaves.
    pub fn integral_and_error(&self) -> (f64, f64) {
        self.root.integral_and_error()
    }

    pub fn integral(&self) -> f64 {
        self.integral_and_error().0
    }

    pub fn error(&self) -> f64 {
        self.integral_and_error().1
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Node {
        &mut self.root
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn change_log(&self) -> &ChangeLog {
        &self.log
    }

    pub fn params(&self) -> &ParamMap {
        &self.params
    }

    pub fn tables(&self) -> &QuadratureTables {
        &self.tables
    }

    pub fn integrand(&self) -> &SharedIntegrand {
        &self.integrand
    }

    pub fn node_count(&self) -> usize {
        self.root.node_count()
    }

    pub fn leaf_count(&self) -> usize {
        self.root.leaf_count()
    }

    pub fn leaves(&self) -> Vec<&Node> {
        self.root.leaves()
    }

    pub fn max_leaf_depth(&self) -> usize {
        self.leaves().iter().map(|n| n.depth).max().unwrap_or(0)
    }

    pub fn min_leaf_depth(&self) -> usize {
        self.leaves().iter().map(|n| n.depth).min().unwrap_or(0)
    }

    /// The node shape alone. Without `full`, only the root's own fields are
    /// written; such a document reloads as a single leaf.
    pub fn node_document(&self, full: bool) -> NodeDocument {
        self.root.to_document(full)
    }

    pub fn to_document(&self, full: bool) -> TreeDocument {
        let c = &self.config;
        let p = &self.provenance;
        TreeDocument {
            name: p.name.clone(),
            author: p.author.clone(),
            description: p.description.clone(),
            reference: p.reference.clone(),
            version: p.version.clone(),
            tolerance: c.tolerance,
            min_depth: c.min_depth,
            max_depth: c.max_depth,
            n1: c.order1,
            n2: c.order2,
            lower: c.lower,
            upper: c.upper,
            a_singular: c.lower_singular,
            b_singular: c.upper_singular,
            alpha_a: c.alpha_lower,
            alpha_b: c.alpha_upper,
            update_log: self.log.clone(),
            tree: self.node_document(full),
        }
    }

    pub fn to_json_string(&self, full: bool) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_document(full))?)
    }

    pub fn to_writer<W: Write>(&self, writer: W, full: bool) -> Result<()> {
        serde_json::to_writer_pretty(writer, &self.to_document(full))?;
        Ok(())
    }

    /// Reconstructs a tree without re-evaluating the integrand.
    pub fn from_document(
        doc: &TreeDocument,
        integrand: SharedIntegrand,
        tables: QuadratureTables,
        params: ParamMap,
    ) -> Result<Self> {
        Self::from_parts(
            doc.config(),
            doc.provenance(),
            doc.update_log.clone(),
            &doc.tree,
            integrand,
            tables,
            params,
        )
    }

    pub(crate) fn from_parts(
        config: TreeConfig,
        provenance: Provenance,
        log: ChangeLog,
        tree: &NodeDocument,
        integrand: SharedIntegrand,
        tables: QuadratureTables,
        params: ParamMap,
    ) -> Result<Self> {
        config.validate()?;
        config.check_tables(&tables)?;
        let root = Node::from_document(tree, config.order1, config.order2);
        Ok(AdaptiveTree {
            root,
            config,
            tables,
            provenance,
            log,
            params,
            integrand,
            clock: system_clock(),
        })
    }

    pub fn from_json_str(
        json: &str,
        integrand: SharedIntegrand,
        tables: QuadratureTables,
        params: ParamMap,
    ) -> Result<Self> {
        let doc: TreeDocument = serde_json::from_str(json).map_err(QuadError::from_decode)?;
        Self::from_document(&doc, integrand, tables, params)
    }

    pub fn from_reader<R: Read>(
        reader: R,
        integrand: SharedIntegrand,
        tables: QuadratureTables,
        params: ParamMap,
    ) -> Result<Self> {
        let doc: TreeDocument = serde_json::from_reader(reader).map_err(QuadError::from_decode)?;
        Self::from_document(&doc, integrand, tables, params)
    }

    /// Replaces the clock used for later log entries.
    pub fn set_clock(&mut self, clock: SharedClock) {
        self.clock = clock;
    }
}

impl fmt::Debug for AdaptiveTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveTree")
            .field("config", &self.config)
            .field("params", &self.params)
            .field("provenance", &self.provenance)
            .field("log", &self.log)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for AdaptiveTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (integral, error) = self.integral_and_error();
        write!(f, "( integral: {integral}, error: {error} )")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changelog::FixedClock;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    const ANALYTICAL_RESULT: f64 = -4.0;

    fn log_over_sqrt() -> SharedIntegrand {
        Arc::new(|_: &ParamMap, t: f64| t.ln() / t.sqrt())
    }

    fn options() -> BuildOptions {
        BuildOptions::default().with_clock(Arc::new(FixedClock::new("2024-05-01 12:00:00")))
    }

    fn singular_tree() -> AdaptiveTree {
        let config = TreeConfig::new(0.0, 1.0, 1e-6)
            .with_depths(2, 10)
            .with_orders(10, 20)
            .singular_lower(0.5);
        let tables = QuadratureTables::generated(&[10, 20]);
        AdaptiveTree::with_options(config, tables, log_over_sqrt(), ParamMap::new(), options())
            .unwrap()
    }

    #[test]
    fn log_over_sqrt_converges_with_singular_lower_bound() {
        let tree = singular_tree();
        let (integral, error) = tree.integral_and_error();
        assert!(
            (integral - ANALYTICAL_RESULT).abs() < 1e-6,
            "Analytical={} vs Tree={} +/- {}",
            ANALYTICAL_RESULT,
            integral,
            error
        );
        assert!(error >= 0.0 && error < 1e-6);

        for node in tree.leaves() {
            let expected = if node.lower == 0.0 {
                QuadratureMethod::GaussLaguerre
            } else {
                QuadratureMethod::GaussLegendre
            };
            assert_eq!(node.method, expected, "leaf [{}, {}]", node.lower, node.upper);
        }
        assert_eq!(tree.root().method, QuadratureMethod::GaussLaguerre);
        assert_eq!(tree.change_log().entries()[0].message, INITIAL_TREE_MESSAGE);
    }

    #[test]
    fn smooth_integrand_on_plain_interval() {
        let integrand: SharedIntegrand =
            Arc::new(|p: &ParamMap, t: f64| (p.get_f64("k").unwrap_or(1.0) * t).cos());
        let tables = QuadratureTables::generated(&[5, 10]);
        let config = TreeConfig::new(0.0, 2.0, 1e-9);
        let params = ParamMap::new().with("k", 3.0);
        let tree = AdaptiveTree::with_options(config, tables, integrand, params, options()).unwrap();
        assert_relative_eq!(tree.integral(), (6.0f64).sin() / 3.0, epsilon = 1e-9);
        assert!(tree.leaves().iter().all(|n| n.method == QuadratureMethod::GaussLegendre));
    }

    #[test]
    fn min_depth_forces_subdivision() {
        let tables = QuadratureTables::generated(&[5, 10]);
        let integrand: SharedIntegrand = Arc::new(|_: &ParamMap, t: f64| 3.0 * t * t);
        // exact at the root already, so only min_depth drives the split
        let config = TreeConfig::new(0.0, 1.0, 1e-3).with_depths(4, 10);
        let tree = AdaptiveTree::with_options(config, tables, integrand, ParamMap::new(), options())
            .unwrap();
        assert_eq!(tree.min_leaf_depth(), 4);
        assert_eq!(tree.max_leaf_depth(), 4);
        assert_eq!(tree.leaf_count(), 16);
        assert_eq!(tree.node_count(), 31);
        assert!(tree.leaves().iter().all(|n| n.tolerance == 1e-3 / 16.0));
        assert_relative_eq!(tree.integral(), 1.0, epsilon = 1e-13);
    }

    #[test]
    fn non_convergence_at_max_depth_is_silent() {
        let tables = QuadratureTables::generated(&[2, 3]);
        // a jump inside every interval that is not split at it
        let integrand: SharedIntegrand =
            Arc::new(|_: &ParamMap, t: f64| if t < 1.0 / 3.0 { 0.0 } else { 1.0 });
        let config = TreeConfig::new(0.0, 1.0, 1e-12)
            .with_depths(0, 3)
            .with_orders(2, 3);
        let tree = AdaptiveTree::with_options(config, tables, integrand, ParamMap::new(), options())
            .unwrap();
        assert_eq!(tree.max_leaf_depth(), 3);
        assert!(tree.error() > 1e-12);
    }

    #[test]
    fn internal_nodes_are_not_counted() {
        let mut tree = singular_tree();
        let before = tree.integral_and_error();
        let root = tree.root_mut();
        assert!(!root.is_leaf());
        root.result = 1e6;
        root.error = 1e6;
        if let Some(left) = root.left.as_deref_mut() {
            if !left.is_leaf() {
                left.result = -1e6;
            }
        }
        assert_eq!(tree.integral_and_error(), before);
    }

    #[test]
    fn json_round_trip_is_exact() {
        let tree = singular_tree();
        let json = tree.to_json_string(true).unwrap();
        let loaded = AdaptiveTree::from_json_str(
            &json,
            log_over_sqrt(),
            tree.tables().clone(),
            ParamMap::new(),
        )
        .unwrap();
        assert_eq!(loaded.integral_and_error(), tree.integral_and_error());
        assert_eq!(loaded.node_count(), tree.node_count());
        assert_eq!(loaded.root(), tree.root());
        assert_eq!(loaded.config(), tree.config());
        assert_eq!(loaded.change_log(), tree.change_log());
        assert_eq!(loaded.to_document(true), tree.to_document(true));
    }

    #[test]
    fn leaf_summary_keeps_only_the_root() {
        let tree = singular_tree();
        let doc = tree.to_document(false);
        assert!(doc.tree.left.is_none() && doc.tree.right.is_none());
        assert_eq!(doc.tree.integral, tree.root().result);

        let value = serde_json::to_value(&doc).unwrap();
        assert!(value["tree"].get("left").is_none());
    }

    #[test]
    fn missing_children_load_as_leaves() {
        let json = r#"{
            "name": "n", "author": "a", "description": "d", "reference": "r", "version": "1.0",
            "tolerance": 0.001, "min_depth": 0, "max_depth": 4, "n1": 5, "n2": 10,
            "update_log": [{"timestamp": "t", "message": "m"}],
            "tree": {"a": 0.0, "b": 1.0, "depth": 0, "tol": 0.001, "error": 0.5,
                     "integral": 2.5, "method": "Gauss-Legendre", "left": null}
        }"#;
        let tables = QuadratureTables::generated(&[5, 10]);
        let tree = AdaptiveTree::from_json_str(json, log_over_sqrt(), tables, ParamMap::new())
            .unwrap();
        assert!(tree.root().is_leaf());
        assert_eq!(tree.integral_and_error(), (2.5, 0.5));
        assert_eq!(tree.config().upper, 1.0);
    }

    #[test]
    fn missing_required_fields_are_malformed() {
        let tree = singular_tree();
        let tables = tree.tables().clone();
        for field in ["update_log", "tree", "n1"] {
            let mut value = serde_json::to_value(tree.to_document(true)).unwrap();
            value.as_object_mut().unwrap().remove(field);
            let err = AdaptiveTree::from_json_str(
                &value.to_string(),
                log_over_sqrt(),
                tables.clone(),
                ParamMap::new(),
            )
            .unwrap_err();
            assert!(matches!(err, QuadError::MalformedDocument(_)), "{field}: {err}");
        }

        let mut value = serde_json::to_value(tree.to_document(true)).unwrap();
        value["update_log"] = serde_json::Value::Null;
        assert!(matches!(
            AdaptiveTree::from_json_str(&value.to_string(), log_over_sqrt(), tables, ParamMap::new()),
            Err(QuadError::MalformedDocument(_))
        ));
    }

    #[test]
    fn clone_is_independent() {
        let tree = singular_tree();
        let mut copy = tree.clone();
        copy.root_mut().left = None;
        copy.root_mut().right = None;
        copy.add_log("pruned");
        assert_ne!(copy.node_count(), tree.node_count());
        assert_eq!(tree.change_log().len(), 1);
        assert!(Arc::ptr_eq(copy.integrand(), tree.integrand()));
    }

    #[test]
    fn builds_are_deterministic() {
        let a = singular_tree();
        let b = singular_tree();
        assert_eq!(a.integral_and_error(), b.integral_and_error());
        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn rebuild_and_tolerance_change_extend_the_log() {
        let mut tree = singular_tree();
        let nodes = tree.node_count();
        tree.set_clock(Arc::new(FixedClock::new("2024-05-02 08:00:00")));
        tree.set_tolerance(1e-3).unwrap();
        assert!(tree.node_count() <= nodes);
        assert_eq!(tree.change_log().len(), 2);
        assert_eq!(
            tree.change_log().last().map(|e| e.timestamp.as_str()),
            Some("2024-05-02 08:00:00")
        );

        assert!(tree.set_tolerance(-1.0).is_err());
        assert_eq!(tree.config().tolerance, 1e-3);
    }

    #[test]
    fn configuration_errors() {
        let tables = QuadratureTables::generated(&[5, 10]);
        let bad_orders = TreeConfig::default().with_orders(5, 12);
        assert!(matches!(
            AdaptiveTree::new(bad_orders, tables.clone(), log_over_sqrt(), ParamMap::new()),
            Err(QuadError::OrderNotFound { order: 12, .. })
        ));
        let inverted = TreeConfig::new(1.0, 0.0, 1e-6);
        assert!(matches!(inverted.validate(), Err(QuadError::InvalidConfig(_))));
        let depths = TreeConfig::default().with_depths(5, 2);
        assert!(depths.validate().is_err());
        let alpha = TreeConfig::default().singular_upper(1.0);
        assert!(alpha.validate().is_err());
    }

    #[test]
    fn display_shows_integral_and_error() {
        let tree = singular_tree();
        let (i, e) = tree.integral_and_error();
        assert_eq!(tree.to_string(), format!("( integral: {i}, error: {e} )"));
    }
}
