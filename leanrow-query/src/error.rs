//! Error types for query execution and eager loading.
//!
//! Every failure surfaces as a [`QueryError`] carrying:
//! - An [`ErrorCode`] for programmatic handling
//! - Context about what was being loaded when it failed
//! - Suggestions for fixing the problem
//!
//! # Error Codes
//!
//! Error codes follow a pattern: L{category}{number}
//! - 1xxx: Request errors (unknown association, unknown column, missing bind)
//! - 5xxx: Execution errors (the data source failed)
//! - 6xxx: Data errors (shape mismatches, slot rewrites)
//! - 7xxx: Configuration errors (unresolvable association metadata)
//! - 9xxx: Internal errors
//!
//! ```rust
//! use leanrow_query::{ErrorCode, QueryError};
//!
//! let err = QueryError::unknown_association("Widget", "categroy");
//! assert_eq!(err.code, ErrorCode::UnknownAssociation);
//! assert!(err.is_unknown_association());
//! assert!(err.to_string().contains("categroy"));
//! ```
//!
//! Driver failures keep the underlying error as the `source`:
//!
//! ```rust
//! use leanrow_query::QueryError;
//!
//! let io = std::io::Error::new(std::io::ErrorKind::Other, "socket closed");
//! let err = QueryError::execution("SELECT 1", io);
//! assert!(err.is_execution_error());
//! assert!(std::error::Error::source(&err).is_some());
//! ```

use std::fmt;
use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Request errors (1xxx)
    /// The requested association is not declared on the model (L1001).
    UnknownAssociation = 1001,
    /// A column was read that the row does not carry (L1002).
    UnknownColumn = 1002,
    /// A raw SQL template references a bind that was not supplied (L1003).
    MissingBind = 1003,
    /// A raw SQL template is malformed (L1004).
    InvalidTemplate = 1004,

    // Execution errors (5xxx)
    /// The data source failed to execute a statement (L5001).
    QueryExecution = 5001,

    // Data errors (6xxx)
    /// A result row does not match its declared shape (L6001).
    InvalidDataType = 6001,
    /// An association slot was written twice in one load pass (L6002).
    AssociationAlreadyLoaded = 6002,

    // Configuration errors (7xxx)
    /// Association or key metadata cannot be resolved (L7001).
    InvalidConfiguration = 7001,

    // Internal errors (9xxx)
    /// Internal error (L9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "L1001").
    pub fn code(&self) -> String {
        format!("L{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::UnknownAssociation => "Unknown association",
            Self::UnknownColumn => "Unknown column",
            Self::MissingBind => "Missing bind value",
            Self::InvalidTemplate => "Invalid SQL template",
            Self::QueryExecution => "Query execution failed",
            Self::InvalidDataType => "Invalid data type",
            Self::AssociationAlreadyLoaded => "Association already loaded",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation that was being performed.
    pub operation: Option<String>,
    /// The model involved.
    pub model: Option<String>,
    /// The association involved.
    pub association: Option<String>,
    /// The column involved.
    pub column: Option<String>,
    /// The SQL statement (if available).
    pub sql: Option<String>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<String>,
    /// Help text.
    pub help: Option<String>,
}

/// Errors that can occur while running queries and loading associations.
#[derive(Error, Debug)]
pub struct QueryError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl QueryError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add context about the operation.
    pub fn with_context(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Add a suggestion for fixing the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestions.push(suggestion.into());
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.context.help = Some(help.into());
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.context.model = Some(model.into());
        self
    }

    /// Set the association.
    pub fn with_association(mut self, association: impl Into<String>) -> Self {
        self.context.association = Some(association.into());
        self
    }

    /// Set the column.
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.context.column = Some(column.into());
        self
    }

    /// Set the SQL statement.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.context.sql = Some(sql.into());
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// Create a configuration error (unresolvable association or key metadata).
    pub fn configuration(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            ErrorCode::InvalidConfiguration,
            format!("Configuration error: {}", message),
        )
        .with_help("Declare the missing model, key or association in the schema metadata")
    }

    /// Create an unknown association error.
    pub fn unknown_association(model: impl Into<String>, name: impl Into<String>) -> Self {
        let model = model.into();
        let name = name.into();
        Self::new(
            ErrorCode::UnknownAssociation,
            format!("Model {} has no association named '{}'", model, name),
        )
        .with_model(&model)
        .with_association(&name)
        .with_suggestion(format!("Check the spelling of '{}'", name))
        .with_suggestion(format!("Declare '{}' on {} before eager loading it", name, model))
    }

    /// Create an unknown column error.
    pub fn unknown_column(column: impl Into<String>) -> Self {
        let column = column.into();
        Self::new(
            ErrorCode::UnknownColumn,
            format!("Column '{}' is not present in the result", column),
        )
        .with_column(&column)
        .with_suggestion("Add the column to the SELECT list")
    }

    /// Create a missing bind error.
    pub fn missing_bind(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::MissingBind,
            format!("No value bound for %{{{}}}", name),
        )
        .with_suggestion(format!("Call .bind(\"{}\", value) before running the query", name))
    }

    /// Create an invalid template error.
    pub fn invalid_template(message: impl Into<String>, sql: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            ErrorCode::InvalidTemplate,
            format!("Invalid SQL template: {}", message),
        )
        .with_sql(sql)
    }

    /// Create a query execution error wrapping the driver's error.
    pub fn execution<E: std::error::Error + Send + Sync + 'static>(
        sql: impl Into<String>,
        source: E,
    ) -> Self {
        Self::new(
            ErrorCode::QueryExecution,
            format!("Query execution failed: {}", source),
        )
        .with_sql(sql)
        .with_source(source)
    }

    /// Create a query execution error from a message (no driver error available).
    pub fn execution_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            ErrorCode::QueryExecution,
            format!("Query execution failed: {}", message),
        )
    }

    /// Create an invalid data type error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidDataType, message.into())
    }

    /// Create an error for a second write into an association slot.
    pub fn already_loaded(association: impl Into<String>) -> Self {
        let association = association.into();
        Self::new(
            ErrorCode::AssociationAlreadyLoaded,
            format!("Association '{}' was already loaded on this row", association),
        )
        .with_association(&association)
        .with_help("Each association may appear only once per level of an eager load tree")
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::Internal, format!("Internal error: {}", message))
    }

    // ============== Error Checks ==============

    /// Check if this is a configuration error.
    pub fn is_configuration_error(&self) -> bool {
        self.code == ErrorCode::InvalidConfiguration
    }

    /// Check if this is an unknown association error.
    pub fn is_unknown_association(&self) -> bool {
        self.code == ErrorCode::UnknownAssociation
    }

    /// Check if this error came from the data source.
    pub fn is_execution_error(&self) -> bool {
        self.code == ErrorCode::QueryExecution
    }

    // ============== Display Functions ==============

    /// Display the full error with all context and suggestions.
    pub fn display_full(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Error [{}]: {}\n", self.code.code(), self.message));

        if let Some(ref op) = self.context.operation {
            output.push_str(&format!("  → While: {}\n", op));
        }
        if let Some(ref model) = self.context.model {
            output.push_str(&format!("  → Model: {}\n", model));
        }
        if let Some(ref association) = self.context.association {
            output.push_str(&format!("  → Association: {}\n", association));
        }
        if let Some(ref column) = self.context.column {
            output.push_str(&format!("  → Column: {}\n", column));
        }

        // SQL (truncated if too long)
        if let Some(ref sql) = self.context.sql {
            let sql_display = if sql.chars().count() > 200 {
                format!("{}...", sql.chars().take(200).collect::<String>())
            } else {
                sql.clone()
            };
            output.push_str(&format!("  → SQL: {}\n", sql_display));
        }

        if !self.context.suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for (i, suggestion) in self.context.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        if let Some(ref help) = self.context.help {
            output.push_str(&format!("\nHelp: {}\n", help));
        }

        output
    }
}
