use std::collections::HashMap;

use indexmap::IndexSet;
use tracing::{debug, trace};

use super::{AssociationPlanner, KeyedLookup, Loaded, primary_key_for};
use crate::eager::loader::EagerLoader;
use crate::eager::merge;
use crate::error::{QueryError, QueryResult};
use crate::row::{Cardinality, RowRef};
use crate::runner::BoxFuture;
use crate::schema::{AssociationKind, AssociationRef, JoinTable, SchemaMetadata, Scope};
use crate::sql::SqlBuilder;
use crate::value::Value;

/// Many-to-many through a join table.
///
/// Two statements per load: the join rows for the parents' keys, then the
/// targets for the distinct target keys they name. Each parent receives its
/// targets in target query order; a pair repeated in the join table counts
/// once.
#[derive(Debug, Clone)]
pub struct HasAndBelongsToMany {
    target_model: String,
    owner_key: String,
    join_table: JoinTable,
    target: KeyedLookup,
}

impl HasAndBelongsToMany {
    pub(crate) fn resolve(
        schema: &dyn SchemaMetadata,
        owner: &str,
        association: &AssociationRef,
        scope: Scope,
        slots: Vec<String>,
    ) -> QueryResult<Self> {
        let target_model = association.require_target()?.to_string();
        let join_table = association.join_table.clone().ok_or_else(|| {
            QueryError::configuration(format!(
                "association '{}' declares no join table",
                association.name
            ))
            .with_association(&association.name)
        })?;
        let owner_key = schema
            .primary_key(owner)
            .map_err(|e| e.with_association(&association.name))?;
        let target_key = primary_key_for(schema, association, &target_model)?;
        let table = schema.table_name(&target_model)?;

        Ok(Self {
            target_model,
            owner_key,
            join_table,
            target: KeyedLookup {
                association: association.name.clone(),
                table,
                key_column: target_key,
                scope,
                slots,
            },
        })
    }

    fn join_statement(&self, builder: &mut SqlBuilder, keys: &[Value]) {
        let jt = &self.join_table;
        builder
            .push("SELECT ")
            .push_identifiers(&[jt.owner_column.as_str(), jt.target_column.as_str()])
            .push(" FROM ")
            .push_identifier(&jt.table)
            .push(" WHERE ")
            .push_identifier(&jt.owner_column)
            .push(" IN (")
            .push_list(keys.iter().cloned())
            .push(")");
    }

    async fn run(&self, loader: &EagerLoader<'_>, parents: &[RowRef]) -> QueryResult<Loaded> {
        let keys = merge::collect_keys(parents, &self.owner_key)?;
        debug!(
            association = %self.target.association,
            kind = %AssociationKind::HasAndBelongsToMany,
            keys = keys.len(),
            "Planning association lookup"
        );
        if keys.is_empty() {
            trace!(association = %self.target.association, reason = "all keys null", "Skipping lookup");
            return Ok(Loaded::empty(parents.len(), Cardinality::Collection));
        }

        let mut builder = SqlBuilder::new(loader.database_type());
        self.join_statement(&mut builder, &keys);
        let (sql, params) = builder.build();
        let join_rows = loader.fetch_rows(&sql, &params, &[]).await?;

        // target key -> linked parent positions
        let owners = merge::index_by(parents, &self.owner_key)?;
        let mut links: HashMap<Value, IndexSet<usize>> = HashMap::new();
        let mut target_keys: IndexSet<Value> = IndexSet::new();
        for row in &join_rows {
            let (Some(owner), Some(target)) = (
                row.get(&self.join_table.owner_column),
                row.get(&self.join_table.target_column),
            ) else {
                continue;
            };
            if target.is_null() {
                continue;
            }
            if let Some(positions) = owners.get(owner) {
                links
                    .entry(target.clone())
                    .or_default()
                    .extend(positions.iter().copied());
                target_keys.insert(target.clone());
            }
        }

        let target_keys: Vec<Value> = target_keys.into_iter().collect();
        let targets = self.target.fetch(loader, &target_keys).await?;
        let (results, stats) = merge::associate_linked(
            parents.len(),
            &targets,
            &self.target.key_column,
            &links,
            Cardinality::Collection,
        )?;

        Ok(Loaded::single_group(
            results,
            Some(self.target_model.clone()),
            targets,
            stats,
        ))
    }
}

impl AssociationPlanner for HasAndBelongsToMany {
    fn kind(&self) -> AssociationKind {
        AssociationKind::HasAndBelongsToMany
    }

    fn cardinality(&self) -> Cardinality {
        Cardinality::Collection
    }

    fn target_model(&self) -> Option<&str> {
        Some(&self.target_model)
    }

    fn load<'a>(
        &'a self,
        loader: &'a EagerLoader<'_>,
        parents: &'a [RowRef],
    ) -> BoxFuture<'a, QueryResult<Loaded>> {
        Box::pin(self.run(loader, parents))
    }
}
