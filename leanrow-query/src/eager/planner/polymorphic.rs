use futures::future::try_join_all;
use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use super::{AssociationPlanner, ChildGroup, KeyedLookup, Loaded};
use crate::eager::loader::EagerLoader;
use crate::eager::merge::{self, MergeStats};
use crate::error::{QueryError, QueryResult};
use crate::row::{AssociationResult, Cardinality, RowRef};
use crate::runner::BoxFuture;
use crate::schema::{AssociationKind, AssociationRef, Scope};
use crate::value::Value;

/// Belongs-to whose target model is named per row by a type column.
///
/// Targets are resolved at load time, one lookup per distinct type. Rows
/// whose type or key is null get the absent result.
#[derive(Debug, Clone)]
pub struct PolymorphicBelongsTo {
    name: String,
    foreign_key: String,
    foreign_type: String,
    primary_key: Option<String>,
    scope: Scope,
    slots: Vec<String>,
}

impl PolymorphicBelongsTo {
    pub(crate) fn resolve(
        association: &AssociationRef,
        scope: Scope,
        slots: Vec<String>,
    ) -> QueryResult<Self> {
        let foreign_key = association.require_foreign_key()?.to_string();
        let foreign_type = association.foreign_type.clone().ok_or_else(|| {
            QueryError::configuration(format!(
                "polymorphic association '{}' declares no type column",
                association.name
            ))
            .with_association(&association.name)
        })?;

        Ok(Self {
            name: association.name.clone(),
            foreign_key,
            foreign_type,
            primary_key: association.primary_key.clone(),
            scope,
            slots,
        })
    }

    /// Distinct keys per type, in first-seen order.
    fn keys_by_type(&self, parents: &[RowRef]) -> QueryResult<IndexMap<String, IndexSet<Value>>> {
        let mut by_type: IndexMap<String, IndexSet<Value>> = IndexMap::new();
        for parent in parents {
            let Some((model, key)) = self.target_of(parent)? else {
                continue;
            };
            by_type
                .entry(model.to_string())
                .or_default()
                .insert(key.clone());
        }
        Ok(by_type)
    }

    /// The `(type, key)` a parent points at, or `None` when either is null.
    fn target_of<'r>(&self, parent: &'r RowRef) -> QueryResult<Option<(&'r str, &'r Value)>> {
        let column = |name: &str| {
            parent.get(name).ok_or_else(|| {
                QueryError::configuration(format!(
                    "key column '{}' is not present in the rows being merged",
                    name
                ))
                .with_association(&self.name)
                .with_column(name)
            })
        };
        let model = column(&self.foreign_type)?;
        let key = column(&self.foreign_key)?;

        match (model, key) {
            (Value::Null, _) | (_, Value::Null) => Ok(None),
            (Value::String(model), key) => Ok(Some((model.as_str(), key))),
            (other, _) => Err(QueryError::invalid_data(format!(
                "type column '{}' of '{}' holds {} instead of a model name",
                self.foreign_type, self.name, other
            ))),
        }
    }

    fn lookup_for(&self, loader: &EagerLoader<'_>, model: &str) -> QueryResult<KeyedLookup> {
        let schema = loader.schema()?;
        let key_column = match &self.primary_key {
            Some(column) => column.clone(),
            None => schema.primary_key(model)?,
        };
        Ok(KeyedLookup {
            association: self.name.clone(),
            table: schema.table_name(model)?,
            key_column,
            scope: self.scope.clone(),
            slots: self.slots.clone(),
        })
    }

    async fn run(&self, loader: &EagerLoader<'_>, parents: &[RowRef]) -> QueryResult<Loaded> {
        let by_type = self.keys_by_type(parents)?;
        debug!(
            association = %self.name,
            kind = %AssociationKind::PolymorphicBelongsTo,
            types = by_type.len(),
            "Planning association lookup"
        );

        let lookups = by_type
            .keys()
            .map(|model| self.lookup_for(loader, model))
            .collect::<QueryResult<Vec<_>>>()?;
        let keys: Vec<Vec<Value>> = by_type
            .values()
            .map(|set| set.iter().cloned().collect())
            .collect();

        let fetched = try_join_all(
            lookups
                .iter()
                .zip(keys.iter())
                .map(|(lookup, keys)| lookup.fetch(loader, keys)),
        )
        .await?;

        // Per type: its rows and an index over its key column.
        let mut groups = Vec::with_capacity(fetched.len());
        let mut indexes = Vec::with_capacity(fetched.len());
        for ((model, lookup), rows) in by_type.keys().zip(&lookups).zip(fetched) {
            indexes.push(merge::index_by(&rows, &lookup.key_column)?);
            groups.push(ChildGroup {
                model: Some(model.clone()),
                rows,
            });
        }

        let mut stats = MergeStats {
            parents: parents.len(),
            children: groups.iter().map(|g| g.rows.len()).sum(),
            ..MergeStats::default()
        };
        let mut results = Vec::with_capacity(parents.len());
        for parent in parents {
            let found = match self.target_of(parent)? {
                Some((model, key)) => by_type.get_index_of(model).and_then(|t| {
                    let positions = indexes[t].get(key)?;
                    if positions.len() > 1 {
                        stats.ambiguous += 1;
                    }
                    positions.first().map(|&i| groups[t].rows[i].clone())
                }),
                None => None,
            };
            if found.is_some() {
                stats.matched += 1;
            }
            results.push(AssociationResult::Single(found));
        }

        Ok(Loaded {
            results,
            groups,
            stats,
        })
    }
}

impl AssociationPlanner for PolymorphicBelongsTo {
    fn kind(&self) -> AssociationKind {
        AssociationKind::PolymorphicBelongsTo
    }

    fn cardinality(&self) -> Cardinality {
        Cardinality::Single
    }

    fn target_model(&self) -> Option<&str> {
        None
    }

    fn load<'a>(
        &'a self,
        loader: &'a EagerLoader<'_>,
        parents: &'a [RowRef],
    ) -> BoxFuture<'a, QueryResult<Loaded>> {
        Box::pin(self.run(loader, parents))
    }
}
