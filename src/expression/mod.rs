//! Utility expression language.
//!
//! Specification terms are small vectorized expressions over a table:
//! arithmetic, comparisons, boolean logic, and a whitelist of numeric
//! functions. A leading `@` selects raw scope, which additionally exposes
//! `df.<column>` access and the configured named constants. Nothing outside
//! the grammar is reachable, so specifications cannot execute arbitrary
//! code.
//!
//! # Submodules
//!
//! - **`parser`**: Tokenizer and recursive-descent parser
//! - **`eval`**: Column-at-a-time evaluation with scalar broadcasting
//! - **`evaluator`**: Specification → design matrix, zero-variance
//!   diagnostic, chooser preprocessor
//!
//! # Reference
//! Train (2009), "Discrete Choice Methods with Simulation", Ch. 2
//! (linear-in-parameters utility)

mod eval;
mod evaluator;
mod parser;

pub use evaluator::{assign_columns, check_variability, CompiledExpr, DesignMatrix, UtilityEvaluator};
pub use parser::{parse, BinaryOp, Expr, Func, ParseError, UnaryOp};
