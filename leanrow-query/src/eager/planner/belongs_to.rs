use super::{KeyedLookup, Loaded, AssociationPlanner, load_keyed, primary_key_for};
use crate::eager::loader::EagerLoader;
use crate::error::QueryResult;
use crate::row::{Cardinality, RowRef};
use crate::runner::BoxFuture;
use crate::schema::{AssociationKind, AssociationRef, SchemaMetadata, Scope};

/// Forward reference: `parent.foreign_key` matches `target.primary_key`.
#[derive(Debug, Clone)]
pub struct BelongsTo {
    target_model: String,
    foreign_key: String,
    lookup: KeyedLookup,
}

impl BelongsTo {
    pub(crate) fn resolve(
        schema: &dyn SchemaMetadata,
        _owner: &str,
        association: &AssociationRef,
        scope: Scope,
        slots: Vec<String>,
    ) -> QueryResult<Self> {
        let target_model = association.require_target()?.to_string();
        let foreign_key = association.require_foreign_key()?.to_string();
        let primary_key = primary_key_for(schema, association, &target_model)?;
        let table = schema.table_name(&target_model)?;

        Ok(Self {
            target_model,
            foreign_key,
            lookup: KeyedLookup {
                association: association.name.clone(),
                table,
                key_column: primary_key,
                scope,
                slots,
            },
        })
    }
}

impl AssociationPlanner for BelongsTo {
    fn kind(&self) -> AssociationKind {
        AssociationKind::BelongsTo
    }

    fn cardinality(&self) -> Cardinality {
        Cardinality::Single
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
            &self.foreign_key,
            Cardinality::Single,
            &self.target_model,
        ))
    }
}
