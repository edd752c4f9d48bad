//! Quadrature node/weight tables.
//!
//! A [`WeightsTable`] holds the abscissas and weights of one quadrature family
//! for any number of orders. Tables are read-only once built and are shared
//! between trees through [`QuadratureTables`].

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

use gauss_quad::{GaussLaguerre, GaussLegendre};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{QuadError, Result};

/// The two quadrature families used by the adaptive tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuadratureMethod {
    #[serde(rename = "Gauss-Legendre", alias = "Legendre")]
    GaussLegendre,
    #[serde(rename = "Gauss-Laguerre", alias = "Laguerre")]
    GaussLaguerre,
}

impl QuadratureMethod {
    /// The label recorded on tree nodes.
    pub fn label(&self) -> &'static str {
        match self {
            QuadratureMethod::GaussLegendre => "Gauss-Legendre",
            QuadratureMethod::GaussLaguerre => "Gauss-Laguerre",
        }
    }

    /// Lower-case family prefix of the root fields in batch documents.
    pub(crate) fn field_prefix(&self) -> &'static str {
        match self {
            QuadratureMethod::GaussLegendre => "legendre",
            QuadratureMethod::GaussLaguerre => "laguerre",
        }
    }
}

impl fmt::Display for QuadratureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OrderEntry {
    #[serde(rename = "0")]
    nodes: Vec<f64>,
    #[serde(rename = "1")]
    weights: Vec<f64>,
}

/// The standalone table document: `{"method", "n_max", "n": {"<order>": {"0": nodes, "1": weights}}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightsDocument {
    method: QuadratureMethod,
    n_max: usize,
    n: BTreeMap<usize, OrderEntry>,
}

/// Nodes and weights of one quadrature family, keyed by order.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightsTable {
    method: QuadratureMethod,
    orders: BTreeMap<usize, OrderEntry>,
}

impl WeightsTable {
    /// An empty table.
    pub fn new(method: QuadratureMethod) -> Self {
        WeightsTable {
            method,
            orders: BTreeMap::new(),
        }
    }

    /// Computes the rules for every requested order.
    ///
    /// Legendre rules live on `[-1, 1]`, Laguerre rules carry the plain
    /// `e^{-t}` weight. Nodes are stored in ascending order. Orders the
    /// generator rejects (below 2) are left out and surface later as
    /// [`QuadError::OrderNotFound`].
    pub fn generated(method: QuadratureMethod, orders: impl IntoIterator<Item = usize>) -> Self {
        let mut table = WeightsTable::new(method);
        for n in orders {
            let pairs = match method {
                QuadratureMethod::GaussLegendre => GaussLegendre::new(n)
                    .map(GaussLegendre::into_node_weight_pairs)
                    .map_err(|e| format!("{e:?}")),
                QuadratureMethod::GaussLaguerre => GaussLaguerre::new(n, 0.0)
                    .map(GaussLaguerre::into_node_weight_pairs)
                    .map_err(|e| format!("{e:?}")),
            };
            let mut pairs = match pairs {
                Ok(pairs) => pairs,
                Err(reason) => {
                    warn!(method = %method, order = n, %reason, "cannot generate quadrature rule");
                    continue;
                }
            };
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
            let (nodes, weights) = pairs.into_iter().unzip();
            table.orders.insert(n, OrderEntry { nodes, weights });
        }
        table
    }

    /// Adds or replaces the rule of order `n`.
    pub fn insert(&mut self, n: usize, nodes: Vec<f64>, weights: Vec<f64>) -> Result<()> {
        if nodes.len() != weights.len() {
            return Err(QuadError::config(format!(
                "order {n}: {} nodes but {} weights",
                nodes.len(),
                weights.len()
            )));
        }
        self.orders.insert(n, OrderEntry { nodes, weights });
        Ok(())
    }

    pub fn method(&self) -> QuadratureMethod {
        self.method
    }

    pub fn has_order(&self, n: usize) -> bool {
        self.orders.contains_key(&n)
    }

    /// Orders present in the table, ascending.
    pub fn orders(&self) -> impl Iterator<Item = usize> + '_ {
        self.orders.keys().copied()
    }

    pub fn n_max(&self) -> Option<usize> {
        self.orders.keys().next_back().copied()
    }

    fn entry(&self, n: usize) -> Result<&OrderEntry> {
        self.orders.get(&n).ok_or(QuadError::OrderNotFound {
            method: self.method,
            order: n,
        })
    }

    pub fn nodes(&self, n: usize) -> Result<&[f64]> {
        self.entry(n).map(|e| e.nodes.as_slice())
    }

    pub fn weights(&self, n: usize) -> Result<&[f64]> {
        self.entry(n).map(|e| e.weights.as_slice())
    }

    /// Nodes and weights of order `n` together.
    pub fn rule(&self, n: usize) -> Result<(&[f64], &[f64])> {
        self.entry(n).map(|e| (e.nodes.as_slice(), e.weights.as_slice()))
    }

    /// Copies every order of `other` into this table. Both must describe the
    /// same family.
    pub fn extend(&mut self, other: &WeightsTable) -> Result<()> {
        if other.method != self.method {
            return Err(QuadError::config(format!(
                "cannot merge a {} table into a {} table",
                other.method, self.method
            )));
        }
        self.orders
            .extend(other.orders.iter().map(|(n, e)| (*n, e.clone())));
        Ok(())
    }

    pub fn from_document(doc: WeightsDocument) -> Result<Self> {
        let mut table = WeightsTable::new(doc.method);
        for (n, entry) in doc.n {
            if entry.nodes.len() != entry.weights.len() {
                return Err(QuadError::malformed(format!(
                    "order {n}: {} nodes but {} weights",
                    entry.nodes.len(),
                    entry.weights.len()
                )));
            }
            table.orders.insert(n, entry);
        }
        Ok(table)
    }

    pub fn to_document(&self) -> WeightsDocument {
        WeightsDocument {
            method: self.method,
            n_max: self.n_max().unwrap_or(0),
            n: self.orders.clone(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let doc = serde_json::from_str(json).map_err(QuadError::from_decode)?;
        Self::from_document(doc)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let doc = serde_json::from_reader(reader).map_err(QuadError::from_decode)?;
        Self::from_document(doc)
    }

    /// Reads the single rule embedded in a batch document.
    ///
    /// `key` names the `[nodes, weights]` pair (e.g. `legendre_roots_n1`) and
    /// `n_key` the field holding its order (e.g. `n1`).
    pub fn from_fragment(
        doc: &Value,
        key: &str,
        method: QuadratureMethod,
        n_key: &str,
    ) -> Result<Self> {
        let n = doc
            .get(n_key)
            .and_then(Value::as_u64)
            .ok_or_else(|| QuadError::malformed(format!("missing order field `{n_key}`")))?;
        let fragment = doc
            .get(key)
            .ok_or_else(|| QuadError::malformed(format!("missing `{key}`")))?;
        let [nodes, weights]: [Vec<f64>; 2] =
            serde_json::from_value(fragment.clone()).map_err(|e| {
                QuadError::malformed(format!("`{key}` is not a [nodes, weights] pair: {e}"))
            })?;
        if nodes.len() != weights.len() {
            return Err(QuadError::malformed(format!(
                "`{key}`: {} nodes but {} weights",
                nodes.len(),
                weights.len()
            )));
        }
        let mut table = WeightsTable::new(method);
        table.orders.insert(n as usize, OrderEntry { nodes, weights });
        Ok(table)
    }

    /// The `[nodes, weights]` pair written into batch documents.
    pub fn fragment(&self, n: usize) -> Result<[Vec<f64>; 2]> {
        let entry = self.entry(n)?;
        Ok([entry.nodes.clone(), entry.weights.clone()])
    }
}

/// One Legendre and one Laguerre table, shared by every tree that uses them.
#[derive(Debug, Clone)]
pub struct QuadratureTables {
    legendre: Arc<WeightsTable>,
    laguerre: Arc<WeightsTable>,
}

impl QuadratureTables {
    pub fn new(legendre: WeightsTable, laguerre: WeightsTable) -> Result<Self> {
        Self::from_shared(Arc::new(legendre), Arc::new(laguerre))
    }

    pub fn from_shared(legendre: Arc<WeightsTable>, laguerre: Arc<WeightsTable>) -> Result<Self> {
        if legendre.method() != QuadratureMethod::GaussLegendre {
            return Err(QuadError::config("first table must be Gauss-Legendre"));
        }
        if laguerre.method() != QuadratureMethod::GaussLaguerre {
            return Err(QuadError::config("second table must be Gauss-Laguerre"));
        }
        Ok(QuadratureTables { legendre, laguerre })
    }

    /// Computes both families for the given orders.
    pub fn generated(orders: &[usize]) -> Self {
        QuadratureTables {
            legendre: Arc::new(WeightsTable::generated(
                QuadratureMethod::GaussLegendre,
                orders.iter().copied(),
            )),
            laguerre: Arc::new(WeightsTable::generated(
                QuadratureMethod::GaussLaguerre,
                orders.iter().copied(),
            )),
        }
    }

    pub fn table(&self, method: QuadratureMethod) -> &WeightsTable {
        match method {
            QuadratureMethod::GaussLegendre => &self.legendre,
            QuadratureMethod::GaussLaguerre => &self.laguerre,
        }
    }

    pub fn legendre(&self) -> &Arc<WeightsTable> {
        &self.legendre
    }

    pub fn laguerre(&self) -> &Arc<WeightsTable> {
        &self.laguerre
    }

    /// Fails with [`QuadError::OrderNotFound`] unless `method` carries both orders.
    pub fn require(&self, method: QuadratureMethod, order1: usize, order2: usize) -> Result<()> {
        let table = self.table(method);
        for n in [order1, order2] {
            if !table.has_order(n) {
                return Err(QuadError::OrderNotFound { method, order: n });
            }
        }
        Ok(())
    }

    /// Field holding the `[nodes, weights]` pair of one family at the order
    /// stored under `n_key`.
    pub(crate) fn root_field(method: QuadratureMethod, n_key: &str) -> String {
        format!("{}_roots_{n_key}", method.field_prefix())
    }

    /// Rebuilds the tables embedded in a batch document
    /// (`legendre_roots_n1`, `legendre_roots_n2`, `laguerre_roots_n1`,
    /// `laguerre_roots_n2`). Returns `Ok(None)` when the document carries no
    /// roots at all. Absent fragments leave their order out of the table.
    pub fn from_batch_document(doc: &Value) -> Result<Option<Self>> {
        let methods = [QuadratureMethod::GaussLegendre, QuadratureMethod::GaussLaguerre];
        let present = methods.iter().any(|&m| {
            ["n1", "n2"]
                .iter()
                .any(|n| doc.get(Self::root_field(m, n)).is_some())
        });
        if !present {
            return Ok(None);
        }

        let load = |method: QuadratureMethod| -> Result<WeightsTable> {
            let mut table = WeightsTable::new(method);
            for n_key in ["n1", "n2"] {
                let key = Self::root_field(method, n_key);
                if doc.get(&key).is_some() {
                    table.extend(&WeightsTable::from_fragment(doc, &key, method, n_key)?)?;
                }
            }
            Ok(table)
        };
        let legendre = load(QuadratureMethod::GaussLegendre)?;
        let laguerre = load(QuadratureMethod::GaussLaguerre)?;
        Self::new(legendre, laguerre).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    #[test]
    fn legendre_integrates_polynomials_exactly() {
        let table = WeightsTable::generated(QuadratureMethod::GaussLegendre, [2, 5, 10, 20]);
        for n in [2, 5, 10, 20] {
            let (x, w) = table.rule(n).unwrap();
            assert_relative_eq!(w.iter().sum::<f64>(), 2.0, epsilon = 1e-13);
            assert!(x.windows(2).all(|p| p[0] < p[1]));
            // x^{2n-2} is the highest even monomial the rule integrates exactly.
            let k = 2 * n as i32 - 2;
            let quad: f64 = x.iter().zip(w).map(|(x, w)| w * x.powi(k)).sum();
            assert_relative_eq!(quad, 2.0 / (k + 1) as f64, epsilon = 1e-12);
        }

        let (x, w) = table.rule(5).unwrap();
        assert_relative_eq!(x[4], 0.906_179_845_938_664, epsilon = 1e-14);
        assert_relative_eq!(x[2], 0.0, epsilon = 1e-15);
        assert_relative_eq!(w[2], 128.0 / 225.0, epsilon = 1e-14);
    }

    #[test]
    fn laguerre_integrates_moments_exactly() {
        let table = WeightsTable::generated(QuadratureMethod::GaussLaguerre, [2, 3, 6, 12]);
        for n in [2, 3, 6, 12] {
            let (t, w) = table.rule(n).unwrap();
            assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-10);
            assert!(t.windows(2).all(|p| p[0] < p[1]));
            // ∫ t^k e^{-t} dt = k!
            let k = (2 * n - 1).min(9) as i32;
            let quad: f64 = t.iter().zip(w).map(|(t, w)| w * t.powi(k)).sum();
            let factorial: f64 = (1..=k).map(f64::from).product();
            assert_relative_eq!(quad, factorial, max_relative = 1e-8);
        }

        let (t, w) = table.rule(2).unwrap();
        let sqrt2 = 2f64.sqrt();
        assert_relative_eq!(t[0], 2.0 - sqrt2, epsilon = 1e-12);
        assert_relative_eq!(t[1], 2.0 + sqrt2, epsilon = 1e-12);
        assert_relative_eq!(w[0], (2.0 + sqrt2) / 4.0, epsilon = 1e-12);
    }

    #[test]
    fn orders_below_two_are_not_generated() {
        let table = WeightsTable::generated(QuadratureMethod::GaussLaguerre, [0, 1, 4]);
        assert_eq!(table.orders().collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn missing_order_is_reported() {
        let table = WeightsTable::generated(QuadratureMethod::GaussLegendre, [4, 8]);
        assert!(table.has_order(4));
        assert!(!table.has_order(5));
        assert!(matches!(
            table.nodes(5),
            Err(QuadError::OrderNotFound { order: 5, .. })
        ));
        assert_eq!(table.n_max(), Some(8));
    }

    #[test]
    fn reads_standalone_document() {
        let doc = json!({
            "method": "Legendre",
            "n_max": 2,
            "n": {
                "1": {"0": [0.0], "1": [2.0]},
                "2": {"0": [-0.5773502691896257, 0.5773502691896257], "1": [1.0, 1.0]}
            }
        });
        let table = WeightsTable::from_json_str(&doc.to_string()).unwrap();
        assert_eq!(table.method(), QuadratureMethod::GaussLegendre);
        assert_eq!(table.orders().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(table.weights(2).unwrap(), &[1.0, 1.0]);

        let written = serde_json::to_string(&table.to_document()).unwrap();
        assert_eq!(WeightsTable::from_json_str(&written).unwrap(), table);
    }

    #[test]
    fn rejects_ragged_rules() {
        let doc = r#"{"method": "Laguerre", "n_max": 1, "n": {"1": {"0": [1.0], "1": []}}}"#;
        assert!(matches!(
            WeightsTable::from_json_str(doc),
            Err(QuadError::MalformedDocument(_))
        ));

        let mut table = WeightsTable::new(QuadratureMethod::GaussLaguerre);
        assert!(table.insert(3, vec![1.0, 2.0], vec![0.5]).is_err());
    }

    #[test]
    fn batch_fragments_combine_into_one_table_per_family() {
        let tables = QuadratureTables::generated(&[3, 6]);
        let mut doc = json!({"n1": 3, "n2": 6});
        for method in [QuadratureMethod::GaussLegendre, QuadratureMethod::GaussLaguerre] {
            for (n_key, n) in [("n1", 3), ("n2", 6)] {
                let key = QuadratureTables::root_field(method, n_key);
                doc[key] = json!(tables.table(method).fragment(n).unwrap());
            }
        }

        let restored = QuadratureTables::from_batch_document(&doc).unwrap().unwrap();
        restored.require(QuadratureMethod::GaussLegendre, 3, 6).unwrap();
        restored.require(QuadratureMethod::GaussLaguerre, 3, 6).unwrap();
        assert_eq!(
            restored.laguerre().rule(6).unwrap(),
            tables.laguerre().rule(6).unwrap()
        );

        assert!(QuadratureTables::from_batch_document(&json!({"n1": 3}))
            .unwrap()
            .is_none());

        let legendre_only = json!({
            "n1": 3,
            "n2": 6,
            "legendre_roots_n1": tables.legendre().fragment(3).unwrap(),
            "legendre_roots_n2": tables.legendre().fragment(6).unwrap(),
        });
        let restored = QuadratureTables::from_batch_document(&legendre_only)
            .unwrap()
            .unwrap();
        restored.require(QuadratureMethod::GaussLegendre, 3, 6).unwrap();
        assert!(matches!(
            restored.require(QuadratureMethod::GaussLaguerre, 3, 6),
            Err(QuadError::OrderNotFound { order: 3, .. })
        ));
    }

    #[test]
    fn tables_must_match_their_slot() {
        let legendre = WeightsTable::new(QuadratureMethod::GaussLegendre);
        let laguerre = WeightsTable::new(QuadratureMethod::GaussLaguerre);
        assert!(QuadratureTables::new(laguerre.clone(), legendre.clone()).is_err());
        assert!(QuadratureTables::new(legendre, laguerre).is_ok());
    }
}
