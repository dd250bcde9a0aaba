//! SQL text generation: identifier quoting, placeholders and named-bind templates.

use indexmap::IndexMap;

use crate::error::{QueryError, QueryResult};
use crate::value::Value;

/// The SQL dialect a statement is generated for.
///
/// Controls the parameter placeholder style and identifier quoting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DatabaseType {
    /// PostgreSQL uses $1, $2, etc.
    #[default]
    PostgreSQL,
    /// MySQL uses ?, ?, etc.
    MySQL,
    /// SQLite uses ?, ?, etc.
    SQLite,
}

impl DatabaseType {
    /// Get the parameter placeholder for this database type.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::PostgreSQL => format!("${}", index),
            Self::MySQL | Self::SQLite => "?".to_string(),
        }
    }

    /// Quote an identifier for this dialect.
    ///
    /// `*` passes through unchanged. Embedded quote characters are doubled.
    pub fn quote(&self, name: &str) -> String {
        if name == "*" {
            return name.to_string();
        }
        match self {
            Self::MySQL => format!("`{}`", name.replace('`', "``")),
            Self::PostgreSQL | Self::SQLite => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }
}

/// A SQL builder that keeps text and bound parameters in step.
#[derive(Debug, Clone)]
pub struct SqlBuilder {
    db_type: DatabaseType,
    sql: String,
    params: Vec<Value>,
}

impl SqlBuilder {
    /// Create a new SQL builder.
    pub fn new(db_type: DatabaseType) -> Self {
        Self {
            db_type,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Create a PostgreSQL SQL builder.
    pub fn postgres() -> Self {
        Self::new(DatabaseType::PostgreSQL)
    }

    /// Create a MySQL SQL builder.
    pub fn mysql() -> Self {
        Self::new(DatabaseType::MySQL)
    }

    /// Create a SQLite SQL builder.
    pub fn sqlite() -> Self {
        Self::new(DatabaseType::SQLite)
    }

    /// The dialect this builder generates.
    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    /// Push a literal SQL string.
    pub fn push(&mut self, sql: impl AsRef<str>) -> &mut Self {
        self.sql.push_str(sql.as_ref());
        self
    }

    /// Push a placeholder and bind its value.
    pub fn push_param(&mut self, value: impl Into<Value>) -> &mut Self {
        let index = self.params.len() + 1;
        let placeholder = self.db_type.placeholder(index);
        self.sql.push_str(&placeholder);
        self.params.push(value.into());
        self
    }

    /// Push a comma separated placeholder list, one per value.
    ///
    /// An empty list renders as `NULL` so `x IN (NULL)` stays valid SQL and
    /// matches nothing.
    pub fn push_list<I>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let mut first = true;
        for value in values {
            if !first {
                self.sql.push_str(", ");
            }
            first = false;
            self.push_param(value);
        }
        if first {
            self.sql.push_str("NULL");
        }
        self
    }

    /// Push a quoted identifier.
    pub fn push_identifier(&mut self, name: &str) -> &mut Self {
        let quoted = self.db_type.quote(name);
        self.sql.push_str(&quoted);
        self
    }

    /// Push a comma separated list of quoted identifiers.
    pub fn push_identifiers<S: AsRef<str>>(&mut self, names: &[S]) -> &mut Self {
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.push_identifier(name.as_ref());
        }
        self
    }

    /// Push a SQL fragment with `%{name}` binds resolved against `binds`.
    ///
    /// Each `%{name}` becomes a placeholder and its value is appended to the
    /// parameters in order of appearance. A name used twice is bound twice.
    /// A [`Value::List`] expands to a placeholder list. `%%` is a literal `%`;
    /// any other `%` is copied unchanged.
    pub fn push_template(
        &mut self,
        template: &str,
        binds: &IndexMap<String, Value>,
    ) -> QueryResult<&mut Self> {
        let mut rest = template;

        while let Some(pos) = rest.find('%') {
            self.sql.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];

            if let Some(tail) = after.strip_prefix('%') {
                self.sql.push('%');
                rest = tail;
            } else if let Some(tail) = after.strip_prefix('{') {
                let end = tail.find('}').ok_or_else(|| {
                    QueryError::invalid_template("unterminated %{ in SQL", template)
                })?;
                let name = tail[..end].trim();
                if name.is_empty() {
                    return Err(QueryError::invalid_template("empty bind name", template));
                }
                match binds.get(name) {
                    Some(Value::List(values)) => {
                        self.push_list(values.iter().cloned());
                    }
                    Some(value) => {
                        self.push_param(value.clone());
                    }
                    None => return Err(QueryError::missing_bind(name).with_sql(template)),
                }
                rest = &tail[end + 1..];
            } else {
                self.sql.push('%');
                rest = after;
            }
        }

        self.sql.push_str(rest);
        Ok(self)
    }

    /// Build the final SQL string and parameters.
    pub fn build(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }

    /// Get the current SQL string.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Get the current parameters.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Get the next parameter index.
    pub fn next_param_index(&self) -> usize {
        self.params.len() + 1
    }
}

impl Default for SqlBuilder {
    fn default() -> Self {
        Self::postgres()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn binds(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(DatabaseType::PostgreSQL.placeholder(3), "$3");
        assert_eq!(DatabaseType::SQLite.placeholder(3), "?");
        assert_eq!(DatabaseType::MySQL.placeholder(1), "?");
    }

    #[test]
    fn test_quote() {
        assert_eq!(DatabaseType::PostgreSQL.quote("user"), "\"user\"");
        assert_eq!(DatabaseType::SQLite.quote("a\"b"), "\"a\"\"b\"");
        assert_eq!(DatabaseType::MySQL.quote("order"), "`order`");
        assert_eq!(DatabaseType::MySQL.quote("*"), "*");
    }

    #[test]
    fn test_push_param_numbering() {
        let mut b = SqlBuilder::postgres();
        b.push("SELECT * FROM ")
            .push_identifier("widgets")
            .push(" WHERE ")
            .push_identifier("id")
            .push(" = ")
            .push_param(1)
            .push(" AND ")
            .push_identifier("name")
            .push(" = ")
            .push_param("a");
        let (sql, params) = b.build();
        assert_eq!(
            sql,
            "SELECT * FROM \"widgets\" WHERE \"id\" = $1 AND \"name\" = $2"
        );
        assert_eq!(params, vec![Value::Int(1), Value::from("a")]);
    }

    #[test]
    fn test_push_list() {
        let mut b = SqlBuilder::sqlite();
        b.push("id IN (").push_list(vec![1, 2, 3]).push(")");
        assert_eq!(b.sql(), "id IN (?, ?, ?)");
        assert_eq!(b.params().len(), 3);

        let mut empty = SqlBuilder::sqlite();
        empty.push("id IN (").push_list(Vec::<i64>::new()).push(")");
        assert_eq!(empty.sql(), "id IN (NULL)");
        assert!(empty.params().is_empty());
    }

    #[test]
    fn test_template_binds_in_order() {
        let mut b = SqlBuilder::postgres();
        b.push_template(
            "SELECT * FROM widgets WHERE cat_id = %{cat} AND (owner = %{who} OR editor = %{who})",
            &binds(&[("cat", Value::Int(5)), ("who", Value::from("ann"))]),
        )
        .unwrap();
        let (sql, params) = b.build();
        assert_eq!(
            sql,
            "SELECT * FROM widgets WHERE cat_id = $1 AND (owner = $2 OR editor = $3)"
        );
        assert_eq!(
            params,
            vec![Value::Int(5), Value::from("ann"), Value::from("ann")]
        );
    }

    #[test]
    fn test_template_list_expansion() {
        let mut b = SqlBuilder::sqlite();
        b.push_template(
            "SELECT * FROM widgets WHERE id IN (%{ids})",
            &binds(&[("ids", Value::from(vec![4, 9]))]),
        )
        .unwrap();
        assert_eq!(b.sql(), "SELECT * FROM widgets WHERE id IN (?, ?)");
        assert_eq!(b.params(), &[Value::Int(4), Value::Int(9)]);
    }

    #[test]
    fn test_template_percent_escapes() {
        let mut b = SqlBuilder::sqlite();
        b.push_template(
            "SELECT * FROM w WHERE name LIKE 'a%%' AND code LIKE '%x' AND id = %{id}",
            &binds(&[("id", Value::Int(1))]),
        )
        .unwrap();
        assert_eq!(
            b.sql(),
            "SELECT * FROM w WHERE name LIKE 'a%' AND code LIKE '%x' AND id = ?"
        );
    }

    #[test]
    fn test_template_missing_bind() {
        let mut b = SqlBuilder::sqlite();
        let err = b
            .push_template("SELECT * FROM w WHERE id = %{id}", &IndexMap::new())
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::MissingBind);
    }

    #[test]
    fn test_template_unterminated() {
        let mut b = SqlBuilder::sqlite();
        let err = b
            .push_template("SELECT * FROM w WHERE id = %{id", &IndexMap::new())
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidTemplate);
    }
}
