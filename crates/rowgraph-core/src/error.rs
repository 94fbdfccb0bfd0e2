//! Error types for hydration.
//!
//! Structural errors (missing columns, unresolvable parents, unbound
//! identifiers) abort the run; data-shape anomalies (rows without a
//! decodable identity, duplicate index keys) are absorbed locally and
//! reported as warnings by the engine.

use std::fmt;

/// The primary error type for hydration operations.
#[derive(Debug)]
pub enum HydrationError {
    /// A row lacks a column the mapping declares. The mapping promised a
    /// shape the cursor did not deliver; this is a programming error.
    MissingColumn {
        /// The declared column that was absent.
        column: String,
        /// The alias (or scalar output) the column belongs to.
        alias: String,
        /// Zero-based ordinal of the offending row.
        row: usize,
    },
    /// A non-root alias's declared parent produced no bundle for the
    /// current row. Indicates a corrupt mapping.
    UnresolvedParent {
        /// The child alias.
        alias: String,
        /// The parent alias that was never registered.
        parent: String,
        /// Zero-based ordinal of the offending row.
        row: usize,
    },
    /// The mapping binds no identifier column for an entity alias and
    /// partial-load mode is off, so instances could never be deduplicated.
    MissingIdentifier {
        /// The alias whose identifier could not be decoded.
        alias: String,
        /// Zero-based ordinal of the offending row.
        row: usize,
    },
    /// Result mapping construction failed (dangling parent alias,
    /// duplicate alias, unknown entity type or relation).
    Mapping(String),
    /// Metadata lookup failed during decoding or assembly.
    Metadata(String),
    /// Cursor-level failure while pulling rows.
    Cursor(String),
}

impl HydrationError {
    /// Is this a structural error that indicates a mapping bug rather
    /// than a data condition?
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            HydrationError::MissingColumn { .. }
                | HydrationError::UnresolvedParent { .. }
                | HydrationError::MissingIdentifier { .. }
                | HydrationError::Mapping(_)
        )
    }
}

impl fmt::Display for HydrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HydrationError::MissingColumn { column, alias, row } => write!(
                f,
                "row {row}: column '{column}' declared for alias '{alias}' is missing from the result set"
            ),
            HydrationError::UnresolvedParent { alias, parent, row } => write!(
                f,
                "row {row}: alias '{alias}' declares parent '{parent}' which was never resolved"
            ),
            HydrationError::MissingIdentifier { alias, row } => write!(
                f,
                "row {row}: alias '{alias}' has no identifier columns bound in the mapping"
            ),
            HydrationError::Mapping(msg) => write!(f, "invalid result mapping: {msg}"),
            HydrationError::Metadata(msg) => write!(f, "metadata error: {msg}"),
            HydrationError::Cursor(msg) => write!(f, "cursor error: {msg}"),
        }
    }
}

impl std::error::Error for HydrationError {}

/// Result type alias for hydration operations.
pub type Result<T> = std::result::Result<T, HydrationError>;
