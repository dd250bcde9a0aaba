use super::{AssociationPlanner, KeyedLookup, Loaded, load_keyed, primary_key_for};
use crate::eager::loader::EagerLoader;
use crate::error::QueryResult;
use crate::row::{Cardinality, RowRef};
use crate::runner::BoxFuture;
use crate::schema::{AssociationKind, AssociationRef, SchemaMetadata, Scope};

/// `parent.primary_key` matches `target.foreign_key`; every target is kept
/// in database order.
#[derive(Debug, Clone)]
pub struct HasMany {
    target_model: String,
    primary_key: String,
    lookup: KeyedLookup,
}

impl HasMany {
    pub(crate) fn resolve(
        schema: &dyn SchemaMetadata,
        owner: &str,
        association: &AssociationRef,
        scope: Scope,
        slots: Vec<String>,
    ) -> QueryResult<Self> {
        let target_model = association.require_target()?.to_string();
        let foreign_key = association.require_foreign_key()?.to_string();
        let primary_key = primary_key_for(schema, association, owner)?;
        let table = schema.table_name(&target_model)?;

        Ok(Self {
            target_model,
            primary_key,
            lookup: KeyedLookup {
                association: association.name.clone(),
                table,
                key_column: foreign_key,
                scope,
                slots,
            },
        })
    }
}

impl AssociationPlanner for HasMany {
    fn kind(&self) -> AssociationKind {
        AssociationKind::HasMany
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
        Box::pin(load_keyed(
            loader,
            self.kind(),
            &self.lookup,
            parents,
            &self.primary_key,
            Cardinality::Collection,
            &self.target_model,
        ))
    }
}
