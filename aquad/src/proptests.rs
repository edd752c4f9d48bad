//! Property-based tests for parameter values, grids and quadrature.

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::sync::Arc;

    use proptest::prelude::*;

    use crate::combinator::{combinations, sorted_combinations};
    use crate::params::{ParamCollection, ParamMap, ParamValue};
    use crate::tree::{AdaptiveTree, BuildOptions, TreeConfig};
    use crate::weights::QuadratureTables;

    // Strategy for generating values of every tag
    fn param_value() -> impl Strategy<Value = ParamValue> {
        prop_oneof![
            any::<i64>().prop_map(ParamValue::Int),
            (-1e6f64..1e6f64).prop_map(ParamValue::Real),
            "[a-z]{0,6}".prop_map(ParamValue::Text),
        ]
    }

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    proptest! {
        // Key strings

        #[test]
        fn integer_keys_round_trip(v in any::<i64>()) {
            let value = ParamValue::Int(v);
            prop_assert_eq!(ParamValue::from_key_str(&value.to_key_string()), value);
        }

        #[test]
        fn real_keys_round_trip_bit_exactly(v in any::<f64>().prop_filter("finite", |v| v.is_finite())) {
            let key = ParamValue::Real(v).to_key_string();
            match ParamValue::from_key_str(&key) {
                ParamValue::Real(back) => prop_assert_eq!(back.to_bits(), v.to_bits()),
                other => prop_assert!(false, "{} classified as {:?}", key, other),
            }
        }

        #[test]
        fn words_stay_text(s in "[a-z][a-z0-9_]{0,8}") {
            prop_assert_eq!(ParamValue::from_key_str(&s), ParamValue::Text(s.clone()));
        }

        // Ordering and hashing

        #[test]
        fn ordering_is_antisymmetric(a in param_value(), b in param_value()) {
            prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
            prop_assert_eq!(a == b, a.cmp(&b) == Ordering::Equal);
        }

        #[test]
        fn ordering_is_transitive(a in param_value(), b in param_value(), c in param_value()) {
            let mut sorted = [a, b, c];
            sorted.sort();
            prop_assert!(sorted[0] <= sorted[1] && sorted[1] <= sorted[2] && sorted[0] <= sorted[2]);
        }

        #[test]
        fn maps_ignore_insertion_order(
            entries in proptest::collection::btree_map("[a-e]", param_value(), 0..5)
        ) {
            let forward: ParamMap = entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let backward: ParamMap = entries.iter().rev().map(|(k, v)| (k.clone(), v.clone())).collect();
            prop_assert_eq!(&forward, &backward);
            prop_assert_eq!(hash_of(&forward), hash_of(&backward));
        }

        // Grids

        #[test]
        fn grid_expands_to_full_product(
            s in proptest::collection::btree_set(-20i64..20, 0..4),
            z in proptest::collection::btree_set(0u32..50, 0..4),
        ) {
            let z: Vec<f64> = z.into_iter().map(|v| f64::from(v) / 10.0).collect();
            let grid = ParamCollection::new()
                .with("s", s.iter().rev().copied().collect::<Vec<_>>())
                .with("z", z.clone());
            let keys = grid.names();

            let combos = combinations(&keys, &grid).unwrap();
            prop_assert_eq!(combos.len(), s.len() * z.len());
            prop_assert_eq!(combos.len(), grid.combination_count());

            let sorted = sorted_combinations(&grid).unwrap();
            prop_assert!(sorted.windows(2).all(|w| w[0].cmp_by_keys(&w[1], &keys) == Ordering::Less));
        }

        // Quadrature

        #[test]
        fn cubics_integrate_exactly(
            c in proptest::array::uniform4(-10.0f64..10.0),
            lower in -5.0f64..5.0,
            width in 0.1f64..5.0,
        ) {
            let upper = lower + width;
            let integrand = Arc::new(move |_: &ParamMap, t: f64| {
                c[0] + c[1] * t + c[2] * t * t + c[3] * t * t * t
            });
            let antiderivative = |t: f64| {
                c[0] * t + c[1] * t * t / 2.0 + c[2] * t.powi(3) / 3.0 + c[3] * t.powi(4) / 4.0
            };
            let exact = antiderivative(upper) - antiderivative(lower);

            let config = TreeConfig::new(lower, upper, 1e-6).with_depths(1, 6).with_orders(2, 4);
            let tables = QuadratureTables::generated(&[2, 4]);
            let tree = AdaptiveTree::with_options(
                config,
                tables,
                integrand,
                ParamMap::new(),
                BuildOptions::default(),
            )
            .unwrap();
            let (integral, error) = tree.integral_and_error();
            prop_assert!(error >= 0.0);
            prop_assert!((integral - exact).abs() <= 1e-9 * (1.0 + exact.abs()),
                "Analytical={} vs Tree={}", exact, integral);
            prop_assert_eq!(tree.leaf_count(), 2);
        }
    }
}
