//! Utility specification model.
//!
//! A specification is an ordered list of terms. Each term pairs an
//! expression with one coefficient per coefficient column. With a single
//! coefficient column the coefficient is shared by every alternative; with
//! several, each column names a dataset column (usually an alternative
//! indicator) and the evaluator emits one design column per
//! (expression, coefficient column) pair.
//!
//! Reading the tabular file is left to the caller; `Description` text is
//! carried for diagnostics only.

use serde::{Deserialize, Serialize};

use crate::error::{ChoiceError, Result};

/// Prefix marking a raw-scope expression.
pub const RAW_SCOPE_MARKER: char = '@';

/// A single specification row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecTerm {
    /// Free-form description (ignored by the engine).
    pub description: String,
    /// Expression text, optionally prefixed with `@`.
    pub expression: String,
    /// One coefficient per coefficient column.
    pub coefficients: Vec<f64>,
}

impl SpecTerm {
    /// Creates a term with a single shared coefficient.
    pub fn new(expression: impl Into<String>, coefficient: f64) -> Self {
        Self {
            description: String::new(),
            expression: expression.into(),
            coefficients: vec![coefficient],
        }
    }

    /// Creates a term with one coefficient per coefficient column.
    pub fn with_coefficients(expression: impl Into<String>, coefficients: Vec<f64>) -> Self {
        Self {
            description: String::new(),
            expression: expression.into(),
            coefficients,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Whether this is a raw-scope (`@`) expression.
    pub fn is_raw_scope(&self) -> bool {
        self.expression.trim_start().starts_with(RAW_SCOPE_MARKER)
    }

    /// Expression text without the raw-scope marker.
    pub fn body(&self) -> &str {
        let trimmed = self.expression.trim_start();
        trimmed.strip_prefix(RAW_SCOPE_MARKER).unwrap_or(trimmed)
    }
}

/// An ordered utility specification.
///
/// # Examples
///
/// ```
/// use u_choice::models::{SpecTerm, UtilitySpec};
///
/// let spec = UtilitySpec::new(vec!["coefficient".into()])
///     .with_term(SpecTerm::new("duration", -0.1))
///     .with_term(SpecTerm::new("@(start < 6) * income_k", 0.02));
/// assert_eq!(spec.len(), 2);
/// assert!(spec.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilitySpec {
    /// Coefficient column names.
    pub coefficient_columns: Vec<String>,
    /// Terms in evaluation order.
    pub terms: Vec<SpecTerm>,
}

impl UtilitySpec {
    /// Creates an empty specification with the given coefficient columns.
    pub fn new(coefficient_columns: Vec<String>) -> Self {
        Self {
            coefficient_columns,
            terms: Vec::new(),
        }
    }

    /// Creates an empty specification with one shared coefficient column.
    pub fn shared() -> Self {
        Self::new(vec!["coefficient".into()])
    }

    /// Appends a term.
    pub fn with_term(mut self, term: SpecTerm) -> Self {
        self.terms.push(term);
        self
    }

    /// Number of terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Whether the specification has no terms.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Whether coefficients are shared (single coefficient column).
    pub fn is_shared(&self) -> bool {
        self.coefficient_columns.len() == 1
    }

    /// Checks structural integrity.
    ///
    /// Every term must have a non-empty expression and exactly one
    /// coefficient per coefficient column; coefficients must be finite.
    pub fn validate(&self) -> Result<()> {
        if self.coefficient_columns.is_empty() {
            return Err(ChoiceError::specification(
                "utility specification has no coefficient columns",
            ));
        }
        if self.terms.is_empty() {
            return Err(ChoiceError::specification(
                "utility specification has no terms",
            ));
        }
        for term in &self.terms {
            if term.body().trim().is_empty() {
                return Err(ChoiceError::specification(format!(
                    "empty expression in term '{}'",
                    term.description
                )));
            }
            if term.coefficients.len() != self.coefficient_columns.len() {
                return Err(ChoiceError::specification(format!(
                    "expression `{}` has {} coefficients, expected {} ({})",
                    term.expression,
                    term.coefficients.len(),
                    self.coefficient_columns.len(),
                    self.coefficient_columns.join(", ")
                )));
            }
            if let Some(c) = term.coefficients.iter().find(|c| !c.is_finite()) {
                return Err(ChoiceError::specification(format!(
                    "expression `{}` has non-finite coefficient {c}",
                    term.expression
                )));
            }
        }
        Ok(())
    }
}
