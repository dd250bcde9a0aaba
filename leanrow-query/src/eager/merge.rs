//! The merge engine: matching fetched child rows back onto their parents.
//!
//! Everything here is synchronous and allocation-bounded. Matching builds a
//! hash index over one side and probes it with the other, so a merge costs
//! O(parents + children) regardless of how keys are distributed.
//!
//! Rules:
//! - A parent whose key is null gets the empty result without a lookup.
//! - [`Cardinality::Single`] takes the first match in child (database) order.
//! - [`Cardinality::Collection`] takes every match in child order.
//! - Keys compare strictly (see [`Value`]).

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexSet;

use crate::error::{QueryError, QueryResult};
use crate::row::{AssociationResult, Cardinality, RowRef, RowRecord};
use crate::value::Value;

/// Counters describing one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Parent rows in the batch.
    pub parents: usize,
    /// Child rows fetched for the batch.
    pub children: usize,
    /// Parents that received at least one row.
    pub matched: usize,
    /// Single-cardinality parents that had more than one candidate.
    pub ambiguous: usize,
}

/// Position of `column` in the rows' shared shape.
///
/// An empty batch has no shape to check and yields `None`.
fn key_position(rows: &[RowRef], column: &str) -> QueryResult<Option<usize>> {
    let Some(first) = rows.first() else {
        return Ok(None);
    };
    first.shape().column_index(column).map(Some).ok_or_else(|| {
        QueryError::configuration(format!(
            "key column '{}' is not present in the rows being merged",
            column
        ))
        .with_column(column)
    })
}

/// Read a key column from a row whose shape may differ from its batch mates.
fn key_of<'r>(row: &'r RowRecord, column: &str) -> QueryResult<&'r Value> {
    row.get(column).ok_or_else(|| {
        QueryError::configuration(format!(
            "key column '{}' is not present in the rows being merged",
            column
        ))
        .with_column(column)
    })
}

/// Distinct non-null values of `column`, in first-seen order.
pub fn collect_keys(rows: &[RowRef], column: &str) -> QueryResult<Vec<Value>> {
    key_position(rows, column)?;
    let mut keys = IndexSet::new();
    for row in rows {
        let key = key_of(row, column)?;
        if !key.is_null() {
            keys.insert(key.clone());
        }
    }
    Ok(keys.into_iter().collect())
}

/// Index rows by `column`: key to row positions, in row order. Null keys are skipped.
pub fn index_by(rows: &[RowRef], column: &str) -> QueryResult<HashMap<Value, Vec<usize>>> {
    key_position(rows, column)?;
    let mut index: HashMap<Value, Vec<usize>> = HashMap::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let key = key_of(row, column)?;
        if !key.is_null() {
            index.entry(key.clone()).or_default().push(i);
        }
    }
    Ok(index)
}

/// Match children to parents by `parent.parent_key == child.child_key`.
///
/// Returns one result per parent, aligned with `parents`.
pub fn associate(
    parents: &[RowRef],
    children: &[RowRef],
    parent_key: &str,
    child_key: &str,
    cardinality: Cardinality,
) -> QueryResult<(Vec<AssociationResult>, MergeStats)> {
    key_position(parents, parent_key)?;
    let index = index_by(children, child_key)?;

    let mut stats = MergeStats {
        parents: parents.len(),
        children: children.len(),
        ..MergeStats::default()
    };

    let mut results = Vec::with_capacity(parents.len());
    for parent in parents {
        let key = key_of(parent, parent_key)?;
        let matches = if key.is_null() {
            None
        } else {
            index.get(key)
        };

        let result = match (cardinality, matches) {
            (_, None) => cardinality.empty(),
            (Cardinality::Single, Some(positions)) => {
                if positions.len() > 1 {
                    stats.ambiguous += 1;
                }
                AssociationResult::Single(positions.first().map(|&i| Arc::clone(&children[i])))
            }
            (Cardinality::Collection, Some(positions)) => AssociationResult::Collection(
                positions.iter().map(|&i| Arc::clone(&children[i])).collect(),
            ),
        };
        if !result.is_empty() {
            stats.matched += 1;
        }
        results.push(result);
    }

    Ok((results, stats))
}

/// Match children to parents through explicit links.
///
/// `links` maps a child key to the positions of the parents linked to it.
/// Children are visited in their own order, so every parent receives its
/// rows in child order. A parent linked twice to the same key receives the
/// row once.
pub fn associate_linked(
    parent_count: usize,
    children: &[RowRef],
    child_key: &str,
    links: &HashMap<Value, IndexSet<usize>>,
    cardinality: Cardinality,
) -> QueryResult<(Vec<AssociationResult>, MergeStats)> {
    key_position(children, child_key)?;

    let mut buckets: Vec<Vec<RowRef>> = vec![Vec::new(); parent_count];
    for child in children {
        let key = key_of(child, child_key)?;
        if let Some(parents) = links.get(key) {
            for &p in parents {
                if let Some(bucket) = buckets.get_mut(p) {
                    bucket.push(Arc::clone(child));
                }
            }
        }
    }

    Ok(finish(buckets, children.len(), cardinality))
}

/// Compose two hops: parents reach intermediates through `first`, and each
/// intermediate (aligned with `intermediates`) reaches targets through `second`.
///
/// Intermediates are matched by identity. Targets reached through different
/// intermediates are all kept, in intermediate order.
pub fn compose(
    first: &[AssociationResult],
    intermediates: &[RowRef],
    second: &[AssociationResult],
    cardinality: Cardinality,
) -> (Vec<AssociationResult>, MergeStats) {
    let position: HashMap<*const RowRecord, usize> = intermediates
        .iter()
        .enumerate()
        .map(|(i, row)| (Arc::as_ptr(row), i))
        .collect();

    let buckets: Vec<Vec<RowRef>> = first
        .iter()
        .map(|hop| {
            hop.rows()
                .iter()
                .filter_map(|mid| position.get(&Arc::as_ptr(mid)))
                .filter_map(|&i| second.get(i))
                .flat_map(|targets| targets.rows().iter().cloned())
                .collect()
        })
        .collect();

    let children = second.iter().map(|r| r.rows().len()).sum();
    finish(buckets, children, cardinality)
}

fn finish(
    buckets: Vec<Vec<RowRef>>,
    children: usize,
    cardinality: Cardinality,
) -> (Vec<AssociationResult>, MergeStats) {
    let mut stats = MergeStats {
        parents: buckets.len(),
        children,
        ..MergeStats::default()
    };

    let results = buckets
        .into_iter()
        .map(|rows| {
            if !rows.is_empty() {
                stats.matched += 1;
            }
            match cardinality {
                Cardinality::Single => {
                    if rows.len() > 1 {
                        stats.ambiguous += 1;
                    }
                    AssociationResult::Single(rows.into_iter().next())
                }
                Cardinality::Collection => AssociationResult::Collection(rows),
            }
        })
        .collect();

    (results, stats)
}

/// Write per-parent results into the parents' `slot`.
pub fn attach(
    parents: &[RowRef],
    slot: &str,
    results: Vec<AssociationResult>,
) -> QueryResult<()> {
    if parents.len() != results.len() {
        return Err(QueryError::internal(format!(
            "{} results computed for {} parents of '{}'",
            results.len(),
            parents.len(),
            slot
        )));
    }
    for (parent, result) in parents.iter().zip(results) {
        parent.attach(slot, result)?;
    }
    Ok(())
}

/// Match and attach in one step.
pub fn merge(
    parents: &[RowRef],
    children: &[RowRef],
    parent_key: &str,
    child_key: &str,
    cardinality: Cardinality,
    slot: &str,
) -> QueryResult<MergeStats> {
    let (results, stats) = associate(parents, children, parent_key, child_key, cardinality)?;
    attach(parents, slot, results)?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::RowShape;
    use pretty_assertions::assert_eq;

    fn rows(columns: &[&str], slots: &[&str], data: Vec<Vec<Value>>) -> Vec<RowRef> {
        let shape = Arc::new(RowShape::new(
            columns.iter().map(|c| c.to_string()).collect(),
            Vec::new(),
            slots.iter().map(|s| s.to_string()).collect(),
        ));
        shape.materialize(data).unwrap()
    }

    fn ids(result: &AssociationResult) -> Vec<i64> {
        result
            .rows()
            .iter()
            .filter_map(|r| r.get_i64("id"))
            .collect()
    }

    #[test]
    fn test_collect_keys_dedups_and_skips_nulls() {
        let parents = rows(
            &["id", "cat_id"],
            &[],
            vec![
                vec![Value::Int(1), Value::Int(5)],
                vec![Value::Int(2), Value::Null],
                vec![Value::Int(3), Value::Int(5)],
                vec![Value::Int(4), Value::Int(6)],
            ],
        );
        let keys = collect_keys(&parents, "cat_id").unwrap();
        assert_eq!(keys, vec![Value::Int(5), Value::Int(6)]);
    }

    #[test]
    fn test_missing_key_column_is_configuration_error() {
        let parents = rows(&["id"], &[], vec![vec![Value::Int(1)]]);
        assert!(
            collect_keys(&parents, "cat_id")
                .unwrap_err()
                .is_configuration_error()
        );
        assert!(collect_keys(&[], "cat_id").unwrap().is_empty());
    }

    #[test]
    fn test_belongs_to_shape_merge() {
        let parents = rows(
            &["id", "cat_id"],
            &["category"],
            vec![
                vec![Value::Int(1), Value::Int(5)],
                vec![Value::Int(2), Value::Null],
                vec![Value::Int(3), Value::Int(5)],
            ],
        );
        let children = rows(&["id", "name"], &[], vec![vec![Value::Int(5), Value::from("A")]]);

        let stats = merge(&parents, &children, "cat_id", "id", Cardinality::Single, "category")
            .unwrap();
        assert_eq!(
            stats,
            MergeStats {
                parents: 3,
                children: 1,
                matched: 2,
                ambiguous: 0
            }
        );

        assert_eq!(parents[0].one("category").unwrap().get_str("name"), Some("A"));
        assert_eq!(
            parents[1].association("category"),
            Some(&AssociationResult::Single(None))
        );
        assert!(Arc::ptr_eq(
            parents[0].one("category").unwrap(),
            parents[2].one("category").unwrap()
        ));
    }

    #[test]
    fn test_collection_keeps_child_order() {
        let parents = rows(&["id"], &[], vec![vec![Value::Int(1)]]);
        let children = rows(
            &["id", "parent_id", "seq"],
            &[],
            vec![
                vec![Value::Int(10), Value::Int(1), Value::Int(2)],
                vec![Value::Int(11), Value::Int(1), Value::Int(1)],
            ],
        );
        let (results, _) =
            associate(&parents, &children, "id", "parent_id", Cardinality::Collection).unwrap();
        assert_eq!(ids(&results[0]), vec![10, 11]);
    }

    #[test]
    fn test_single_takes_first_match() {
        let parents = rows(&["id"], &[], vec![vec![Value::Int(1)]]);
        let children = rows(
            &["id", "owner_id"],
            &[],
            vec![
                vec![Value::Int(20), Value::Int(1)],
                vec![Value::Int(21), Value::Int(1)],
            ],
        );
        let (results, stats) =
            associate(&parents, &children, "id", "owner_id", Cardinality::Single).unwrap();
        assert_eq!(ids(&results[0]), vec![20]);
        assert_eq!(stats.ambiguous, 1);
    }

    #[test]
    fn test_no_cross_contamination() {
        let parents = rows(
            &["id"],
            &[],
            vec![vec![Value::Int(1)], vec![Value::Int(2)], vec![Value::Int(3)]],
        );
        let children = rows(
            &["id", "parent_id"],
            &[],
            vec![
                vec![Value::Int(10), Value::Int(2)],
                vec![Value::Int(11), Value::Int(1)],
                vec![Value::Int(12), Value::Int(2)],
            ],
        );
        let (results, stats) =
            associate(&parents, &children, "id", "parent_id", Cardinality::Collection).unwrap();
        assert_eq!(ids(&results[0]), vec![11]);
        assert_eq!(ids(&results[1]), vec![10, 12]);
        assert_eq!(results[2], AssociationResult::Collection(vec![]));
        assert_eq!(stats.matched, 2);
    }

    #[test]
    fn test_strict_key_types() {
        let parents = rows(&["id", "cat_id"], &[], vec![vec![Value::Int(1), Value::from("5")]]);
        let children = rows(&["id"], &[], vec![vec![Value::Int(5)]]);
        let (results, _) =
            associate(&parents, &children, "cat_id", "id", Cardinality::Single).unwrap();
        assert!(results[0].is_empty());
    }

    #[test]
    fn test_associate_linked_follows_child_order_and_dedups() {
        let targets = rows(
            &["id"],
            &[],
            vec![vec![Value::Int(7)], vec![Value::Int(8)], vec![Value::Int(9)]],
        );
        let mut links: HashMap<Value, IndexSet<usize>> = HashMap::new();
        links.entry(Value::Int(9)).or_default().insert(0);
        links.entry(Value::Int(7)).or_default().insert(0);
        links.entry(Value::Int(7)).or_default().insert(0);
        links.entry(Value::Int(8)).or_default().insert(1);

        let (results, stats) =
            associate_linked(3, &targets, "id", &links, Cardinality::Collection).unwrap();
        assert_eq!(ids(&results[0]), vec![7, 9]);
        assert_eq!(ids(&results[1]), vec![8]);
        assert!(results[2].is_empty());
        assert_eq!(stats.matched, 2);
    }

    #[test]
    fn test_compose_two_hops() {
        let mids = rows(&["id"], &[], vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
        let targets = rows(
            &["id"],
            &[],
            vec![vec![Value::Int(100)], vec![Value::Int(200)], vec![Value::Int(201)]],
        );

        let first = vec![
            AssociationResult::Collection(vec![Arc::clone(&mids[1]), Arc::clone(&mids[0])]),
            AssociationResult::Collection(vec![]),
        ];
        let second = vec![
            AssociationResult::Single(Some(Arc::clone(&targets[0]))),
            AssociationResult::Collection(vec![Arc::clone(&targets[1]), Arc::clone(&targets[2])]),
        ];

        let (results, stats) = compose(&first, &mids, &second, Cardinality::Collection);
        assert_eq!(ids(&results[0]), vec![200, 201, 100]);
        assert!(results[1].is_empty());
        assert_eq!(stats.matched, 1);
    }

    #[test]
    fn test_attach_length_mismatch() {
        let parents = rows(&["id"], &["x"], vec![vec![Value::Int(1)]]);
        assert!(attach(&parents, "x", vec![]).is_err());
    }
}
