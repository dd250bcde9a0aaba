//! An in-memory [`QueryRunner`] for tests.
//!
//! [`MockRunner`] answers statements from named tables. It understands just
//! enough SQL to serve the statements this crate generates:
//!
//! - `SELECT <cols> FROM <table>` picks the table and projects columns
//! - `<col> IN (<placeholders>)` keeps rows whose column is among the bound values
//! - `ORDER BY <col> [ASC|DESC], ..` sorts the result
//!
//! Other conditions are ignored. Every statement is recorded with its params.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{QueryError, QueryResult};
use crate::runner::{BoxFuture, QueryRunner, TabularResult};
use crate::sql::DatabaseType;
use crate::value::Value;

/// One recorded statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// A scripted, in-memory query runner.
#[derive(Debug, Clone)]
pub struct MockRunner {
    tables: HashMap<String, TabularResult>,
    database_type: DatabaseType,
    failures: Vec<String>,
    statements: Arc<Mutex<Vec<Statement>>>,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self {
            tables: HashMap::new(),
            database_type: DatabaseType::SQLite,
            failures: Vec::new(),
            statements: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `result` for statements reading from `table`.
    pub fn with_table(mut self, table: impl Into<String>, result: TabularResult) -> Self {
        self.tables.insert(table.into(), result);
        self
    }

    pub fn with_database_type(mut self, database_type: DatabaseType) -> Self {
        self.database_type = database_type;
        self
    }

    /// Fail every statement containing `fragment`.
    pub fn fail_on(mut self, fragment: impl Into<String>) -> Self {
        self.failures.push(fragment.into());
        self
    }

    /// Statements executed so far, in order.
    pub fn statements(&self) -> Vec<Statement> {
        self.statements.lock().clone()
    }

    pub fn statement_count(&self) -> usize {
        self.statements.lock().len()
    }

    /// Statements that read from `table`.
    pub fn statements_for(&self, table: &str) -> Vec<Statement> {
        self.statements
            .lock()
            .iter()
            .filter(|s| table_name(&s.sql).as_deref() == Some(table))
            .cloned()
            .collect()
    }

    fn answer(&self, sql: &str, params: &[Value]) -> QueryResult<TabularResult> {
        if let Some(fragment) = self.failures.iter().find(|f| sql.contains(f.as_str())) {
            return Err(QueryError::execution_message(format!(
                "scripted failure on '{}'",
                fragment
            ))
            .with_sql(sql));
        }

        let Some(table) = table_name(sql) else {
            return Ok(TabularResult::default());
        };
        let Some(source) = self.tables.get(&table) else {
            return Ok(TabularResult::default());
        };

        let mut rows = source.rows.clone();
        if let Some((column, values)) = in_filter(sql, params) {
            if let Some(index) = source.column_index(&column) {
                rows.retain(|row| row.get(index).is_some_and(|v| values.contains(v)));
            }
        }
        for (column, descending) in order_by(sql).into_iter().rev() {
            if let Some(index) = source.column_index(&column) {
                rows.sort_by(|a, b| {
                    let ordering = match (a.get(index), b.get(index)) {
                        (Some(a), Some(b)) => compare(a, b),
                        (a, b) => a.is_some().cmp(&b.is_some()),
                    };
                    if descending { ordering.reverse() } else { ordering }
                });
            }
        }

        Ok(project(source, rows, &projection(sql)))
    }
}

impl QueryRunner for MockRunner {
    fn execute<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, QueryResult<TabularResult>> {
        Box::pin(async move {
            self.statements.lock().push(Statement {
                sql: sql.to_string(),
                params: params.to_vec(),
            });
            self.answer(sql, params)
        })
    }

    fn database_type(&self) -> DatabaseType {
        self.database_type
    }
}

fn unquote(name: &str) -> String {
    name.trim()
        .trim_matches(|c| c == '"' || c == '`')
        .to_string()
}

fn table_name(sql: &str) -> Option<String> {
    let start = sql.find(" FROM ")? + " FROM ".len();
    let table = sql[start..].split_whitespace().next()?;
    Some(unquote(table))
}

fn projection(sql: &str) -> Vec<String> {
    let Some(rest) = sql.strip_prefix("SELECT ") else {
        return Vec::new();
    };
    let Some(end) = rest.find(" FROM ") else {
        return Vec::new();
    };
    let list = rest[..end].trim();
    if list == "*" {
        return Vec::new();
    }
    list.split(',').map(unquote).collect()
}

fn project(source: &TabularResult, rows: Vec<Vec<Value>>, columns: &[String]) -> TabularResult {
    let indices: Vec<usize> = columns
        .iter()
        .filter_map(|c| source.column_index(c))
        .collect();
    if indices.is_empty() || indices.len() != columns.len() {
        return TabularResult {
            columns: source.columns.clone(),
            column_types: source.column_types.clone(),
            rows,
        };
    }

    TabularResult {
        columns: indices.iter().map(|&i| source.columns[i].clone()).collect(),
        column_types: indices
            .iter()
            .filter_map(|&i| source.column_types.get(i).copied())
            .collect(),
        rows: rows
            .into_iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|&i| row.get(i).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect(),
    }
}

fn count_placeholders(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut count = 0;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'?' => count += 1,
            b'$' if bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => count += 1,
            _ => {}
        }
    }
    count
}

fn in_filter(sql: &str, params: &[Value]) -> Option<(String, Vec<Value>)> {
    let where_at = sql.find(" WHERE ")?;
    let in_at = where_at + sql[where_at..].find(" IN (")?;
    let column = sql[..in_at].rsplit(|c: char| c == ' ' || c == '(').next().map(unquote)?;

    let list_start = in_at + " IN (".len();
    let list_end = list_start + sql[list_start..].find(')')?;
    let before = count_placeholders(&sql[..list_start]);
    let count = count_placeholders(&sql[list_start..list_end]);

    let values = params.get(before..before + count)?.to_vec();
    Some((column, values))
}

fn order_by(sql: &str) -> Vec<(String, bool)> {
    let Some(at) = sql.find(" ORDER BY ") else {
        return Vec::new();
    };
    let rest = &sql[at + " ORDER BY ".len()..];
    let rest = rest.split(" LIMIT ").next().unwrap_or(rest);
    rest.split(',')
        .filter_map(|key| {
            let mut parts = key.split_whitespace();
            let column = unquote(parts.next()?);
            let descending = parts.next().is_some_and(|d| d.eq_ignore_ascii_case("DESC"));
            Some((column, descending))
        })
        .collect()
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    }
}
