//! Parameter sweeps: one adaptive tree per combination of a parameter grid.
//!
//! A [`TreeBatch`] expands a [`ParamCollection`] into every combination,
//! sorts them with [`ParamMap::cmp_by_keys`] and builds one [`AdaptiveTree`]
//! per combination. Batches persist as a JSON document whose `parameters`
//! field nests parameter names and stringified values, one pair of levels per
//! key, down to a `"tree"` entry:
//!
//! ```text
//! "parameters": { "s": { "2": { "z": { "0.1": { "tree": { ... } } } } } }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::io::{Read, Write};
use std::ops::{Add, AddAssign};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::changelog::{system_clock, ChangeLog, SharedClock};
use crate::combinator::{sort_combinations, sorted_combinations};
use crate::error::{QuadError, Result};
use crate::integrand::SharedIntegrand;
use crate::params::{ParamCollection, ParamKind, ParamMap, ParamValue, ParamValues};
use crate::tree::{AdaptiveTree, BuildOptions, NodeDocument, Provenance, TreeConfig};
use crate::weights::{QuadratureMethod, QuadratureTables};

/// Initial change-log message of a freshly built batch.
pub const INITIAL_BATCH_MESSAGE: &str = "Initial Batch Creation";

/// The entry holding a serialized tree at the end of each parameter path.
pub const TREE_FIELD: &str = "tree";

const PARAMETERS_FIELD: &str = "parameters";

/// Scalar header of a batch document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BatchHeader {
    name: String,
    author: String,
    description: String,
    reference: String,
    version: String,
    tol: f64,
    min_depth: usize,
    max_depth: usize,
    n1: usize,
    n2: usize,
    a_singular: bool,
    b_singular: bool,
    #[serde(default = "default_true")]
    write_trees: bool,
    #[serde(default)]
    lower: f64,
    #[serde(default = "default_upper")]
    upper: f64,
    #[serde(default)]
    alpha_a: f64,
    #[serde(default)]
    alpha_b: f64,
    update_log: ChangeLog,
}

fn default_true() -> bool {
    true
}

fn default_upper() -> f64 {
    1.0
}

impl BatchHeader {
    fn new(batch: &TreeBatch, write_trees: bool) -> Self {
        let c = &batch.config;
        let p = &batch.provenance;
        BatchHeader {
            name: p.name.clone(),
            author: p.author.clone(),
            description: p.description.clone(),
            reference: p.reference.clone(),
            version: p.version.clone(),
            tol: c.tolerance,
            min_depth: c.min_depth,
            max_depth: c.max_depth,
            n1: c.order1,
            n2: c.order2,
            a_singular: c.lower_singular,
            b_singular: c.upper_singular,
            write_trees,
            lower: c.lower,
            upper: c.upper,
            alpha_a: c.alpha_lower,
            alpha_b: c.alpha_upper,
            update_log: batch.log.clone(),
        }
    }

    fn config(&self) -> TreeConfig {
        TreeConfig {
            lower: self.lower,
            upper: self.upper,
            tolerance: self.tol,
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

/// What [`TreeBatch::merge`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    /// Combinations copied in from the other batch.
    pub added: Vec<ParamMap>,
    /// Combinations present in both batches; the existing tree was kept.
    pub duplicates: Vec<ParamMap>,
    /// Parameters whose value sets have different tags in the two batches;
    /// the existing set was kept.
    pub conflicting_parameters: Vec<String>,
}

impl MergeReport {
    pub fn has_duplicates(&self) -> bool {
        !self.duplicates.is_empty()
    }
}

/// One row of [`TreeBatch::summary`].
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub params: ParamMap,
    pub integral: f64,
    pub error: f64,
}

/// One adaptive tree per parameter combination.
///
/// Cloning copies every tree; the integrand, the tables and the clock are
/// shared.
#[derive(Clone)]
pub struct TreeBatch {
    collection: HashMap<ParamMap, AdaptiveTree>,
    parameters: ParamCollection,
    keys: Vec<String>,
    results: Vec<ParamMap>,
    config: TreeConfig,
    provenance: Provenance,
    log: ChangeLog,
    tables: QuadratureTables,
    integrand: SharedIntegrand,
    clock: SharedClock,
}

impl TreeBatch {
    /// Builds a batch with default provenance and the system clock.
    ///
    /// # Arguments
    ///
    /// * `config`: Shared by every tree of the batch.
    /// * `tables`: Must carry the orders `config` asks for.
    /// * `integrand`: Evaluated with each combination as its parameters.
    /// * `parameters`: The grid. A parameter may not be named `tree`.
    pub fn new(
        config: TreeConfig,
        tables: QuadratureTables,
        integrand: SharedIntegrand,
        parameters: ParamCollection,
    ) -> Result<Self> {
        Self::with_options(config, tables, integrand, parameters, BuildOptions::default())
    }

    pub fn with_options(
        config: TreeConfig,
        tables: QuadratureTables,
        integrand: SharedIntegrand,
        parameters: ParamCollection,
        options: BuildOptions,
    ) -> Result<Self> {
        if parameters.get(TREE_FIELD).is_some() {
            return Err(QuadError::config(format!(
                "`{TREE_FIELD}` is reserved and cannot name a parameter"
            )));
        }
        for (name, values) in parameters.iter() {
            let ParamValues::Text(words) = values else {
                continue;
            };
            if let Some(word) = words
                .iter()
                .find(|word| ParamValue::from_key_str(word).kind() != ParamKind::Text)
            {
                return Err(QuadError::config(format!(
                    "text value `{word}` of `{name}` would reload as a number"
                )));
            }
        }
        config.validate()?;
        config.check_tables(&tables)?;

        let mut log = ChangeLog::new();
        let message = options.message.as_deref().unwrap_or(INITIAL_BATCH_MESSAGE);
        log.record(options.clock.as_ref(), message);

        let keys = parameters.names();
        let results = sorted_combinations(&parameters)?;
        let collection = results
            .par_iter()
            .map(|combo| {
                AdaptiveTree::build(
                    config.clone(),
                    tables.clone(),
                    integrand.clone(),
                    combo.clone(),
                    options.provenance.clone(),
                    log.clone(),
                    options.clock.clone(),
                )
                .map(|tree| (combo.clone(), tree))
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .collect::<HashMap<_, _>>();

        info!(
            combinations = collection.len(),
            keys = ?keys,
            "built tree batch"
        );
        Ok(TreeBatch {
            collection,
            parameters,
            keys,
            results,
            config,
            provenance: options.provenance,
            log,
            tables,
            integrand,
            clock: options.clock,
        })
    }

    pub fn collection(&self) -> &HashMap<ParamMap, AdaptiveTree> {
        &self.collection
    }

    pub fn get(&self, params: &ParamMap) -> Option<&AdaptiveTree> {
        self.collection.get(params)
    }

    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    /// Combinations in build order, followed by those appended by merges.
    /// May contain repeats after a merge.
    pub fn results(&self) -> &[ParamMap] {
        &self.results
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn parameters(&self) -> &ParamCollection {
        &self.parameters
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

    pub fn tables(&self) -> &QuadratureTables {
        &self.tables
    }

    pub fn add_log(&mut self, message: impl Into<String>) {
        self.log.record(self.clock.as_ref(), message);
    }

    /// Stored combinations, each once, in sorted order.
    pub fn combinations(&self) -> Vec<ParamMap> {
        let mut combos: Vec<ParamMap> = self.collection.keys().cloned().collect();
        sort_combinations(&self.keys, &mut combos);
        combos
    }

    /// `(combination, integral, error)` for every stored tree, in sorted order.
    pub fn summary(&self) -> Vec<SummaryRow> {
        self.combinations()
            .into_iter()
            .filter_map(|params| {
                let (integral, error) = self.collection.get(&params)?.integral_and_error();
                Some(SummaryRow {
                    params,
                    integral,
                    error,
                })
            })
            .collect()
    }

    /// Copies in every tree of `other` whose combination is not stored yet.
    ///
    /// Existing trees win over duplicates. `other`'s results are appended,
    /// its keys and parameter values are unioned in, and one log entry is
    /// recorded.
    pub fn merge(&mut self, other: &TreeBatch) -> MergeReport {
        let mut report = MergeReport::default();

        let mut seen = HashSet::new();
        for combo in &other.results {
            if !seen.insert(combo) {
                continue;
            }
            let Some(tree) = other.collection.get(combo) else {
                continue;
            };
            if self.collection.contains_key(combo) {
                report.duplicates.push(combo.clone());
            } else {
                self.collection.insert(combo.clone(), tree.clone());
                report.added.push(combo.clone());
            }
        }
        self.results.extend(other.results.iter().cloned());

        let keys: BTreeSet<String> = self.keys.iter().chain(&other.keys).cloned().collect();
        self.keys = keys.into_iter().collect();

        for (name, values) in other.parameters.iter() {
            match self.parameters.get_mut(name) {
                Some(existing) => {
                    if !existing.union_with(values) {
                        warn!(
                            parameter = %name,
                            existing = %existing.kind(),
                            incoming = %values.kind(),
                            "parameter value types differ, keeping existing values"
                        );
                        report.conflicting_parameters.push(name.clone());
                    }
                }
                None => {
                    self.parameters.insert(name.clone(), values.clone());
                }
            }
        }

        if report.has_duplicates() {
            warn!(
                duplicates = report.duplicates.len(),
                "merged batch repeats stored combinations, keeping existing trees"
            );
        }
        self.add_log(format!(
            "Merged batch {} ({} added, {} duplicate)",
            other.provenance.name,
            report.added.len(),
            report.duplicates.len()
        ));
        report
    }

    /// Serializes the batch.
    ///
    /// # Arguments
    ///
    /// * `write_roots`: Embed the node/weight arrays of both orders.
    /// * `write_trees`: Write full trees. Otherwise each `"tree"` entry holds
    ///   only its root's fields, which reloads as a single-leaf tree.
    pub fn to_document(&self, write_roots: bool, write_trees: bool) -> Result<Value> {
        let Value::Object(mut doc) = serde_json::to_value(BatchHeader::new(self, write_trees))?
        else {
            return Err(QuadError::malformed("batch header did not serialize to an object"));
        };

        if write_roots {
            for method in [QuadratureMethod::GaussLegendre, QuadratureMethod::GaussLaguerre] {
                let table = self.tables.table(method);
                for (n_key, n) in [("n1", self.config.order1), ("n2", self.config.order2)] {
                    if table.has_order(n) {
                        doc.insert(
                            QuadratureTables::root_field(method, n_key),
                            serde_json::to_value(table.fragment(n)?)?,
                        );
                    }
                }
            }
        }

        let mut parameters = Map::new();
        for combo in self.combinations() {
            let Some(tree) = self.collection.get(&combo) else {
                continue;
            };
            let mut level = &mut parameters;
            for key in &self.keys {
                let Some(value) = combo.get(key) else {
                    continue;
                };
                level = descend(level, key.clone())?;
                level = descend(level, value.to_key_string())?;
            }
            level.insert(
                TREE_FIELD.to_string(),
                serde_json::to_value(tree.node_document(write_trees))?,
            );
        }
        doc.insert(PARAMETERS_FIELD.to_string(), Value::Object(parameters));
        Ok(Value::Object(doc))
    }

    /// The pruned export: header plus one root summary per combination.
    pub fn leaf_summary_document(&self) -> Result<Value> {
        self.to_document(false, false)
    }

    pub fn to_json_string(&self, write_roots: bool, write_trees: bool) -> Result<String> {
        Ok(serde_json::to_string_pretty(
            &self.to_document(write_roots, write_trees)?,
        )?)
    }

    pub fn to_writer<W: Write>(&self, writer: W, write_roots: bool, write_trees: bool) -> Result<()> {
        serde_json::to_writer_pretty(writer, &self.to_document(write_roots, write_trees)?)?;
        Ok(())
    }

    /// Reconstructs a batch without re-evaluating the integrand.
    ///
    /// Embedded roots take precedence over `tables`; one of the two must be
    /// available.
    pub fn from_document(
        doc: &Value,
        integrand: SharedIntegrand,
        tables: Option<QuadratureTables>,
    ) -> Result<Self> {
        let header = BatchHeader::deserialize(doc).map_err(QuadError::from_decode)?;
        let tables = match QuadratureTables::from_batch_document(doc)? {
            Some(embedded) => embedded,
            None => tables.ok_or_else(|| {
                QuadError::config("document embeds no quadrature roots and no tables were given")
            })?,
        };
        let config = header.config();
        config.validate()?;
        config.check_tables(&tables)?;
        if !header.write_trees {
            warn!("batch document holds root summaries only, trees reload as single leaves");
        }

        let nested = doc
            .get(PARAMETERS_FIELD)
            .filter(|v| v.is_object())
            .ok_or_else(|| QuadError::malformed("missing `parameters` object"))?;
        let parameters = recover_parameters(nested)?;
        let keys = parameters.names();
        let results = sorted_combinations(&parameters)?;
        let stored = count_trees(nested);
        if stored != results.len() {
            return Err(QuadError::malformed(format!(
                "document holds {stored} trees but its parameter values span {} combinations",
                results.len()
            )));
        }

        let provenance = header.provenance();
        let mut collection = HashMap::with_capacity(results.len());
        for combo in &results {
            let node = NodeDocument::deserialize(locate(nested, &keys, combo)?)
                .map_err(QuadError::from_decode)?;
            let tree = AdaptiveTree::from_parts(
                config.clone(),
                provenance.clone(),
                header.update_log.clone(),
                &node,
                integrand.clone(),
                tables.clone(),
                combo.clone(),
            )?;
            collection.insert(combo.clone(), tree);
        }

        info!(combinations = collection.len(), keys = ?keys, "loaded tree batch");
        Ok(TreeBatch {
            collection,
            parameters,
            keys,
            results,
            config,
            provenance,
            log: header.update_log,
            tables,
            integrand,
            clock: system_clock(),
        })
    }

    pub fn from_json_str(
        json: &str,
        integrand: SharedIntegrand,
        tables: Option<QuadratureTables>,
    ) -> Result<Self> {
        let doc: Value = serde_json::from_str(json).map_err(QuadError::from_decode)?;
        Self::from_document(&doc, integrand, tables)
    }

    pub fn from_reader<R: Read>(
        reader: R,
        integrand: SharedIntegrand,
        tables: Option<QuadratureTables>,
    ) -> Result<Self> {
        let doc: Value = serde_json::from_reader(reader).map_err(QuadError::from_decode)?;
        Self::from_document(&doc, integrand, tables)
    }

    /// Replaces the clock used for later log entries.
    pub fn set_clock(&mut self, clock: SharedClock) {
        self.clock = clock;
    }
}

/// Returns the object stored under `field`, creating it when absent.
fn descend(level: &mut Map<String, Value>, field: String) -> Result<&mut Map<String, Value>> {
    let entry = level
        .entry(field.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    entry
        .as_object_mut()
        .ok_or_else(|| QuadError::config(format!("`{field}` clashes with a tree entry")))
}

/// Walks the name/value levels, collecting every value seen per name.
fn collect_values(level: &Value, seen: &mut BTreeMap<String, BTreeSet<ParamValue>>) -> Result<()> {
    let Some(names) = level.as_object() else {
        return Err(QuadError::malformed("parameter level is not an object"));
    };
    for (name, values) in names {
        if name == TREE_FIELD {
            continue;
        }
        let Some(values) = values.as_object() else {
            return Err(QuadError::malformed(format!(
                "values of `{name}` are not an object"
            )));
        };
        for (key, next) in values {
            seen.entry(name.clone())
                .or_default()
                .insert(ParamValue::from_key_str(key));
            collect_values(next, seen)?;
        }
    }
    Ok(())
}

/// Number of `"tree"` entries anywhere below `level`.
fn count_trees(level: &Value) -> usize {
    let Some(fields) = level.as_object() else {
        return 0;
    };
    fields
        .iter()
        .map(|(name, next)| match name.as_str() {
            TREE_FIELD => 1,
            _ => next
                .as_object()
                .map_or(0, |values| values.values().map(count_trees).sum()),
        })
        .sum()
}

fn recover_parameters(nested: &Value) -> Result<ParamCollection> {
    let mut seen = BTreeMap::new();
    collect_values(nested, &mut seen)?;
    seen.into_iter()
        .map(|(name, values)| {
            ParamValues::from_values(values.into_iter().collect())
                .map_err(|e| QuadError::malformed(format!("parameter `{name}`: {e}")))
                .map(|values| (name, values))
        })
        .collect()
}

/// Finds the `"tree"` entry of one combination.
fn locate<'a>(nested: &'a Value, keys: &[String], combo: &ParamMap) -> Result<&'a Value> {
    let mut level = nested;
    for key in keys {
        let Some(value) = combo.get(key) else {
            continue;
        };
        level = level
            .get(key)
            .and_then(Value::as_object)
            .and_then(|values| {
                values
                    .iter()
                    .find(|(k, _)| ParamValue::from_key_str(k) == *value)
                    .map(|(_, next)| next)
            })
            .ok_or_else(|| {
                QuadError::malformed(format!("no entry for {key} = {value} in {combo}"))
            })?;
    }
    level
        .get(TREE_FIELD)
        .ok_or_else(|| QuadError::malformed(format!("missing `{TREE_FIELD}` for {combo}")))
}

impl Add<&TreeBatch> for &TreeBatch {
    type Output = TreeBatch;

    fn add(self, rhs: &TreeBatch) -> TreeBatch {
        let mut out = self.clone();
        out.merge(rhs);
        out
    }
}

impl AddAssign<&TreeBatch> for TreeBatch {
    fn add_assign(&mut self, rhs: &TreeBatch) {
        self.merge(rhs);
    }
}

impl fmt::Debug for TreeBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeBatch")
            .field("keys", &self.keys)
            .field("parameters", &self.parameters)
            .field("config", &self.config)
            .field("provenance", &self.provenance)
            .field("log", &self.log)
            .field("trees", &self.collection.len())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for TreeBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for combo in self.combinations() {
            if let Some(tree) = self.collection.get(&combo) {
                writeln!(f, "{combo} {tree}")?;
            }
        }
        Ok(())
    }
}
