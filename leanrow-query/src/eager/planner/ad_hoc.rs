use tracing::{debug, trace};

use super::{AssociationPlanner, Loaded};
use crate::eager::include::AdHocSpec;
use crate::eager::loader::EagerLoader;
use crate::eager::merge;
use crate::error::{QueryError, QueryResult};
use crate::row::{Cardinality, RowRef};
use crate::runner::BoxFuture;
use crate::schema::AssociationKind;
use crate::sql::{DatabaseType, SqlBuilder};
use crate::value::Value;

/// The bind the collected parent keys are supplied under.
pub const IDS_BIND: &str = "ids";

/// Caller supplied SQL with `%{ids}`, matched by an explicit column pair.
///
/// Reports its kind as the direct kind of the same cardinality.
#[derive(Debug, Clone)]
pub struct AdHoc {
    slot: String,
    spec: AdHocSpec,
    slots: Vec<String>,
}

impl AdHoc {
    /// Fails when the caller bound `%{ids}` itself; that name carries the
    /// parent keys.
    pub(crate) fn resolve(slot: &str, spec: AdHocSpec, slots: Vec<String>) -> QueryResult<Self> {
        if spec.binds.contains_key(IDS_BIND) {
            return Err(QueryError::configuration(format!(
                "ad-hoc load '{}' binds '{}', which is reserved for the parent keys",
                slot, IDS_BIND
            ))
            .with_association(slot));
        }
        Ok(Self {
            slot: slot.to_string(),
            spec,
            slots,
        })
    }

    fn statement(&self, db_type: DatabaseType, keys: Vec<Value>) -> QueryResult<(String, Vec<Value>)> {
        let mut binds = self.spec.binds.clone();
        binds.insert(IDS_BIND.to_string(), Value::List(keys));

        let mut builder = SqlBuilder::new(db_type);
        builder.push_template(&self.spec.sql, &binds)?;
        Ok(builder.build())
    }

    async fn run(&self, loader: &EagerLoader<'_>, parents: &[RowRef]) -> QueryResult<Loaded> {
        let keys = merge::collect_keys(parents, &self.spec.parent_column)?;
        debug!(
            association = %self.slot,
            kind = "ad_hoc",
            keys = keys.len(),
            "Planning association lookup"
        );
        if keys.is_empty() {
            trace!(association = %self.slot, reason = "all keys null", "Skipping lookup");
            return Ok(Loaded::empty(parents.len(), self.spec.cardinality));
        }

        let (sql, params) = self.statement(loader.database_type(), keys)?;
        let children = loader.fetch_rows(&sql, &params, &self.slots).await?;
        let (results, stats) = merge::associate(
            parents,
            &children,
            &self.spec.parent_column,
            &self.spec.child_column,
            self.spec.cardinality,
        )?;

        Ok(Loaded::single_group(
            results,
            self.spec.model.clone(),
            children,
            stats,
        ))
    }
}

impl AssociationPlanner for AdHoc {
    fn kind(&self) -> AssociationKind {
        match self.spec.cardinality {
            Cardinality::Single => AssociationKind::HasOne,
            Cardinality::Collection => AssociationKind::HasMany,
        }
    }

    fn cardinality(&self) -> Cardinality {
        self.spec.cardinality
    }

    fn target_model(&self) -> Option<&str> {
        self.spec.model.as_deref()
    }

    fn load<'a>(
        &'a self,
        loader: &'a EagerLoader<'_>,
        parents: &'a [RowRef],
    ) -> BoxFuture<'a, QueryResult<Loaded>> {
        Box::pin(self.run(loader, parents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_statement_binds_ids_and_extras() {
        let mut spec = AdHocSpec::new(
            "SELECT * FROM notes WHERE part_id IN (%{ids}) AND kind = %{kind}",
            Cardinality::Collection,
            "id",
            "part_id",
        );
        spec.binds.insert("kind".into(), Value::from("memo"));
        let planner = AdHoc::resolve("notes", spec, vec![]).unwrap();

        let (sql, params) = planner
            .statement(DatabaseType::PostgreSQL, vec![Value::Int(3), Value::Int(4)])
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM notes WHERE part_id IN ($1, $2) AND kind = $3"
        );
        assert_eq!(
            params,
            vec![Value::Int(3), Value::Int(4), Value::from("memo")]
        );
    }

    #[test]
    fn test_kind_follows_cardinality() {
        let one = AdHoc::resolve(
            "latest",
            AdHocSpec::new("SELECT 1", Cardinality::Single, "id", "x"),
            vec![],
        )
        .unwrap();
        assert_eq!(one.kind(), AssociationKind::HasOne);
        assert_eq!(one.target_model(), None);
    }

    #[test]
    fn test_reserved_ids_bind_is_rejected() {
        let mut spec = AdHocSpec::new(
            "SELECT * FROM notes WHERE part_id IN (%{ids})",
            Cardinality::Collection,
            "id",
            "part_id",
        );
        spec.binds.insert(IDS_BIND.into(), Value::from(vec![1, 2]));

        let err = AdHoc::resolve("notes", spec, vec![]).unwrap_err();
        assert!(err.is_configuration_error());
        assert_eq!(err.context.association.as_deref(), Some("notes"));
    }
}
