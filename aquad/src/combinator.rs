//! Cartesian expansion of a parameter grid.

use crate::error::{QuadError, Result};
use crate::params::{ParamCollection, ParamMap, ParamValue};

/// Expands `params` into every combination of one value per name in `keys`.
///
/// The last name in `keys` varies fastest. An empty `keys` yields a single
/// empty combination; a parameter with no values yields no combinations.
pub fn combinations(keys: &[String], params: &ParamCollection) -> Result<Vec<ParamMap>> {
    let columns = keys
        .iter()
        .map(|key| {
            params
                .get(key)
                .map(|values| values.values())
                .ok_or_else(|| QuadError::config(format!("parameter `{key}` is not in the grid")))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut out = Vec::with_capacity(columns.iter().map(Vec::len).product());
    let mut current = ParamMap::new();
    expand(keys, &columns, 0, &mut current, &mut out);
    Ok(out)
}

fn expand(
    keys: &[String],
    columns: &[Vec<ParamValue>],
    depth: usize,
    current: &mut ParamMap,
    out: &mut Vec<ParamMap>,
) {
    if depth == keys.len() {
        out.push(current.clone());
        return;
    }
    for value in &columns[depth] {
        current.insert(keys[depth].clone(), value.clone());
        expand(keys, columns, depth + 1, current, out);
    }
}

/// Sorts combinations with [`ParamMap::cmp_by_keys`]. The sort is stable, so
/// maps that compare equal keep their relative order.
pub fn sort_combinations(keys: &[String], combos: &mut [ParamMap]) {
    combos.sort_by(|a, b| a.cmp_by_keys(b, keys));
}

/// Expands and sorts in one step, using the grid's canonical name order.
pub fn sorted_combinations(params: &ParamCollection) -> Result<Vec<ParamMap>> {
    let keys = params.names();
    let mut combos = combinations(&keys, params)?;
    sort_combinations(&keys, &mut combos);
    Ok(combos)
}
