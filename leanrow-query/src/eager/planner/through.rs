use tracing::debug;

use super::{AssociationPlanner, Loaded, for_association};
use crate::eager::loader::EagerLoader;
use crate::eager::merge;
use crate::error::{QueryError, QueryResult};
use crate::row::{Cardinality, RowRef};
use crate::runner::BoxFuture;
use crate::schema::{AssociationKind, AssociationRef, SchemaMetadata, Scope};

/// Two associations composed: owner to intermediate through `through`,
/// then intermediate to target through `source`.
///
/// The result is a collection when either hop is one. A target reached via
/// several intermediate rows appears once per path.
pub struct Through {
    name: String,
    first: Box<dyn AssociationPlanner>,
    second: Box<dyn AssociationPlanner>,
    cardinality: Cardinality,
}

impl std::fmt::Debug for Through {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Through")
            .field("name", &self.name)
            .field("first", &self.first.kind())
            .field("second", &self.second.kind())
            .field("cardinality", &self.cardinality)
            .finish()
    }
}

/// A missing hop is a broken declaration, not a bad request.
fn resolve_hop(
    schema: &dyn SchemaMetadata,
    model: &str,
    hop: &str,
    through: &AssociationRef,
) -> QueryResult<AssociationRef> {
    schema.resolve_association(model, hop).map_err(|e| {
        if e.is_unknown_association() {
            QueryError::configuration(format!(
                "'{}' goes through '{}' on {}, which is not declared",
                through.name, hop, model
            ))
            .with_model(model)
            .with_association(&through.name)
        } else {
            e
        }
    })
}

impl Through {
    pub(crate) fn resolve(
        schema: &dyn SchemaMetadata,
        owner: &str,
        association: &AssociationRef,
        refinement: &Scope,
        slots: Vec<String>,
    ) -> QueryResult<Self> {
        let missing = |what: &str| {
            QueryError::configuration(format!(
                "through association '{}' declares no {}",
                association.name, what
            ))
            .with_association(&association.name)
        };
        let through_name = association.through.as_deref().ok_or_else(|| missing("through"))?;
        let source_name = association
            .source
            .as_deref()
            .unwrap_or(association.name.as_str());

        let through = resolve_hop(schema, owner, through_name, association)?;
        let first = for_association(schema, owner, &through, &Scope::default(), Vec::new())?;

        let intermediate = first.target_model().ok_or_else(|| {
            QueryError::configuration(format!(
                "'{}' cannot go through polymorphic '{}'",
                association.name, through_name
            ))
            .with_association(&association.name)
        })?;
        let source = resolve_hop(schema, intermediate, source_name, association)?;
        let second = for_association(
            schema,
            intermediate,
            &source,
            &association.scope.refine(refinement),
            slots,
        )?;

        let cardinality = match (first.cardinality(), second.cardinality()) {
            (Cardinality::Single, Cardinality::Single) => Cardinality::Single,
            _ => Cardinality::Collection,
        };

        Ok(Self {
            name: association.name.clone(),
            first,
            second,
            cardinality,
        })
    }

    async fn run(&self, loader: &EagerLoader<'_>, parents: &[RowRef]) -> QueryResult<Loaded> {
        debug!(
            association = %self.name,
            kind = %AssociationKind::Through,
            first = %self.first.kind(),
            second = %self.second.kind(),
            "Planning association lookup"
        );

        let first = self.first.load(loader, parents).await?;
        let intermediates: Vec<RowRef> = first
            .groups
            .into_iter()
            .flat_map(|group| group.rows)
            .collect();

        let second = self.second.load(loader, &intermediates).await?;
        let (results, stats) = merge::compose(
            &first.results,
            &intermediates,
            &second.results,
            self.cardinality,
        );

        Ok(Loaded {
            results,
            groups: second.groups,
            stats,
        })
    }
}

impl AssociationPlanner for Through {
    fn kind(&self) -> AssociationKind {
        AssociationKind::Through
    }

    fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    fn target_model(&self) -> Option<&str> {
        self.second.target_model()
    }

    fn load<'a>(
        &'a self,
        loader: &'a EagerLoader<'_>,
        parents: &'a [RowRef],
    ) -> BoxFuture<'a, QueryResult<Loaded>> {
        Box::pin(self.run(loader, parents))
    }
}
