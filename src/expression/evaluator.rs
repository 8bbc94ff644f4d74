//! Utility specification evaluation.
//!
//! # Algorithm
//!
//! 1. Compile every term once (syntax errors are specification errors).
//! 2. Evaluate each term over the whole dataset, raw-scope terms with the
//!    configured constants and row expressions with dataset columns only.
//! 3. With alternative-specific coefficients, multiply each result by the
//!    dataset column named after each coefficient column, one design column
//!    per (term, coefficient column).
//! 4. Cast to `f64` and lay out as a row-major design matrix.

use rand::seq::index;
use rand::Rng;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::eval::Scope;
use super::parser::{parse, Expr};
use crate::config::ChoiceConfig;
use crate::error::{ChoiceError, EvalStage, Result};
use crate::models::{Column, SpecTerm, Table, UtilitySpec, RAW_SCOPE_MARKER};

/// An expression compiled for repeated evaluation.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    source: String,
    stage: EvalStage,
    expr: Expr,
}

impl CompiledExpr {
    /// Compiles an expression; a leading `@` selects raw scope.
    pub fn compile(source: &str) -> Result<Self> {
        let trimmed = source.trim_start();
        let (stage, body) = match trimmed.strip_prefix(RAW_SCOPE_MARKER) {
            Some(body) => (EvalStage::RawScope, body),
            None => (EvalStage::RowExpression, trimmed),
        };
        let expr = parse(body).map_err(|e| {
            ChoiceError::specification(format!("cannot parse `{source}`: {e}"))
        })?;
        Ok(Self {
            source: source.to_string(),
            stage,
            expr,
        })
    }

    /// The expression text as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluation stage.
    pub fn stage(&self) -> EvalStage {
        self.stage
    }

    fn scope<'a>(&self, table: &'a Table, constants: &'a BTreeMap<String, f64>) -> Scope<'a> {
        match self.stage {
            EvalStage::RawScope => Scope::raw(table, constants),
            EvalStage::RowExpression => Scope::rows(table),
        }
    }

    fn error(&self, reason: String) -> ChoiceError {
        ChoiceError::ExpressionEvaluation {
            expression: self.source.clone(),
            stage: self.stage,
            reason,
        }
    }

    /// Evaluates to one float per table row.
    pub fn evaluate_f64(&self, table: &Table, constants: &BTreeMap<String, f64>) -> Result<Vec<f64>> {
        self.scope(table, constants)
            .eval(&self.expr)
            .and_then(|v| v.into_f64(table.len()))
            .map_err(|reason| self.error(reason))
    }

    /// Evaluates to a typed column.
    pub fn evaluate_column(&self, table: &Table, constants: &BTreeMap<String, f64>) -> Result<Column> {
        self.scope(table, constants)
            .eval(&self.expr)
            .map(|v| v.into_column(table.len()))
            .map_err(|reason| self.error(reason))
    }
}

/// Numeric design matrix: one row per interaction row, one column per
/// (term, coefficient column) pair actually in use.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignMatrix {
    names: Vec<String>,
    coefficients: Vec<f64>,
    values: Vec<f64>,
    rows: usize,
}

impl DesignMatrix {
    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.names.len()
    }

    /// Column names (expression text, or `(expr) * alt` when alternative
    /// specific).
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Coefficient per column.
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Value at (row, col).
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.names.len() + col]
    }

    /// One row of the matrix.
    pub fn row(&self, row: usize) -> &[f64] {
        let k = self.names.len();
        &self.values[row * k..(row + 1) * k]
    }

    /// Values of one column.
    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.rows).map(|r| self.get(r, col)).collect()
    }

    /// Appends the rows of another matrix with the same columns.
    pub(crate) fn append(&mut self, other: DesignMatrix) {
        debug_assert_eq!(self.names, other.names);
        self.values.extend(other.values);
        self.rows += other.rows;
    }

    /// Utility per row: the row's dot product with the coefficients.
    pub fn utilities(&self) -> Vec<f64> {
        (0..self.rows)
            .map(|r| {
                self.row(r)
                    .iter()
                    .zip(&self.coefficients)
                    .map(|(x, b)| x * b)
                    .sum()
            })
            .collect()
    }
}

/// Evaluates a utility specification against interaction datasets.
///
/// # Examples
///
/// ```
/// use u_choice::expression::UtilityEvaluator;
/// use u_choice::models::{SpecTerm, Table, UtilitySpec};
/// use u_choice::ChoiceConfig;
///
/// let spec = UtilitySpec::shared()
///     .with_term(SpecTerm::new("duration", -0.5))
///     .with_term(SpecTerm::new("@(start < k) * 1.0", 2.0));
/// let config = ChoiceConfig::default().with_constant("k", 3.0);
/// let evaluator = UtilityEvaluator::new(&spec, &config).unwrap();
///
/// let rows = Table::new("tdd", vec![0, 1])
///     .unwrap()
///     .with_column("start", vec![2.0, 5.0])
///     .unwrap()
///     .with_column("duration", vec![4.0, 1.0])
///     .unwrap();
/// let design = evaluator.evaluate(&rows).unwrap();
/// assert_eq!(design.utilities(), vec![0.0, -0.5]);
/// ```
#[derive(Debug, Clone)]
pub struct UtilityEvaluator {
    terms: Vec<(CompiledExpr, Vec<f64>)>,
    coefficient_columns: Vec<String>,
    alt_specific: bool,
    constants: BTreeMap<String, f64>,
}

impl UtilityEvaluator {
    /// Validates and compiles a specification.
    pub fn new(spec: &UtilitySpec, config: &ChoiceConfig) -> Result<Self> {
        spec.validate()?;
        if !config.alt_specific_coefficients && !spec.is_shared() {
            return Err(ChoiceError::specification(format!(
                "{} coefficient columns ({}) require alt_specific_coefficients",
                spec.coefficient_columns.len(),
                spec.coefficient_columns.join(", ")
            )));
        }
        let terms = spec
            .terms
            .iter()
            .map(|t: &SpecTerm| -> Result<(CompiledExpr, Vec<f64>)> {
                Ok((CompiledExpr::compile(&t.expression)?, t.coefficients.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            terms,
            coefficient_columns: spec.coefficient_columns.clone(),
            alt_specific: config.alt_specific_coefficients,
            constants: config.constants.clone(),
        })
    }

    /// Number of design columns this evaluator produces.
    pub fn design_width(&self) -> usize {
        if self.alt_specific {
            self.terms.len() * self.coefficient_columns.len()
        } else {
            self.terms.len()
        }
    }

    /// Builds the design matrix for a dataset.
    pub fn evaluate(&self, dataset: &Table) -> Result<DesignMatrix> {
        let rows = dataset.len();
        let width = self.design_width();
        let mut names = Vec::with_capacity(width);
        let mut coefficients = Vec::with_capacity(width);
        let mut columns: Vec<Vec<f64>> = Vec::with_capacity(width);

        for (expr, coeffs) in &self.terms {
            let values = expr.evaluate_f64(dataset, &self.constants)?;
            if !self.alt_specific {
                names.push(expr.source().to_string());
                coefficients.push(coeffs[0]);
                columns.push(values);
                continue;
            }
            for (alt, &coeff) in self.coefficient_columns.iter().zip(coeffs) {
                let indicator = dataset
                    .column(alt)
                    .and_then(Column::to_f64)
                    .ok_or_else(|| ChoiceError::ExpressionEvaluation {
                        expression: expr.source().to_string(),
                        stage: expr.stage(),
                        reason: format!("no numeric alternative column '{alt}'"),
                    })?;
                names.push(format!("({}) * {alt}", expr.source()));
                coefficients.push(coeff);
                columns.push(values.iter().zip(&indicator).map(|(v, w)| v * w).collect());
            }
        }

        let mut values = vec![0.0; rows * width];
        for (c, col) in columns.iter().enumerate() {
            for (r, v) in col.iter().enumerate() {
                values[r * width + c] = *v;
            }
        }

        debug!(rows, cols = width, "built design matrix");
        Ok(DesignMatrix {
            names,
            coefficients,
            values,
            rows,
        })
    }
}

/// Flags design columns with no variability.
///
/// Samples up to `cap` rows without replacement and returns the names of
/// columns whose sampled values are all equal. Advisory only: each hit is
/// logged at `warn` and simulation proceeds. Fewer than two rows are never
/// flagged.
pub fn check_variability<R: Rng + ?Sized>(
    design: &DesignMatrix,
    cap: usize,
    rng: &mut R,
) -> Vec<String> {
    let n = design.rows();
    if n < 2 || cap < 2 {
        return Vec::new();
    }
    let sample = index::sample(rng, n, cap.min(n)).into_vec();

    let mut constant = Vec::new();
    for col in 0..design.cols() {
        let first = design.get(sample[0], col);
        let same = sample.iter().all(|&r| {
            let v = design.get(r, col);
            v == first || (v.is_nan() && first.is_nan())
        });
        if same {
            let name = &design.names()[col];
            warn!(column = %name, value = first, "design column has no variability");
            constant.push(name.clone());
        }
    }
    constant
}

/// Annotates a table by evaluating `(target, expression)` pairs in order.
///
/// Each result is written into `table` before the next expression runs,
/// so later expressions may use earlier targets. Raw-scope (`@`)
/// expressions also see `constants`.
pub fn assign_columns(
    table: &mut Table,
    assignments: &[(String, String)],
    constants: &BTreeMap<String, f64>,
) -> Result<()> {
    for (target, source) in assignments {
        let expr = CompiledExpr::compile(source)?;
        let column = expr.evaluate_column(table, constants)?;
        table.insert_column(target.clone(), column)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn dataset() -> Table {
        Table::new("alt", vec![1, 2, 3, 1, 2, 3])
            .unwrap()
            .with_column("income", vec![10.0, 10.0, 10.0, 50.0, 50.0, 50.0])
            .unwrap()
            .with_column("cost", vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0])
            .unwrap()
            .with_column("car", vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0])
            .unwrap()
            .with_column("walk", vec![0.0, 1.0, 0.0, 0.0, 1.0, 0.0])
            .unwrap()
            .with_column("mode", vec!["car", "walk", "bus", "car", "walk", "bus"])
            .unwrap()
    }

    #[test]
    fn test_shared_coefficients() {
        let spec = UtilitySpec::shared()
            .with_term(SpecTerm::new("cost", -1.0))
            .with_term(SpecTerm::new("@df.income / scale", 0.5));
        let config = ChoiceConfig::default().with_constant("scale", 10.0);
        let design = UtilityEvaluator::new(&spec, &config)
            .unwrap()
            .evaluate(&dataset())
            .unwrap();

        assert_eq!(design.rows(), 6);
        assert_eq!(design.cols(), 2);
        assert_eq!(design.names()[1], "@df.income / scale");
        assert_eq!(design.row(3), &[1.0, 5.0]);
        let u = design.utilities();
        assert!((u[0] - (-1.0 + 0.5)).abs() < 1e-12);
        assert!((u[5] - (-3.0 + 2.5)).abs() < 1e-12);
    }

    #[test]
    fn test_alt_specific_coefficients() {
        let spec = UtilitySpec::new(vec!["car".into(), "walk".into()])
            .with_term(SpecTerm::with_coefficients("income", vec![0.1, -0.1]));
        let config = ChoiceConfig::default().with_alt_specific_coefficients(true);
        let evaluator = UtilityEvaluator::new(&spec, &config).unwrap();
        assert_eq!(evaluator.design_width(), 2);

        let design = evaluator.evaluate(&dataset()).unwrap();
        assert_eq!(design.names(), &["(income) * car", "(income) * walk"]);
        assert_eq!(design.column(0), vec![10.0, 0.0, 0.0, 50.0, 0.0, 0.0]);
        let u = design.utilities();
        assert!((u[1] + 1.0).abs() < 1e-12);
        assert_eq!(u[2], 0.0);
    }

    #[test]
    fn test_multi_column_requires_flag() {
        let spec = UtilitySpec::new(vec!["car".into(), "walk".into()])
            .with_term(SpecTerm::with_coefficients("income", vec![0.1, -0.1]));
        let err = UtilityEvaluator::new(&spec, &ChoiceConfig::default()).unwrap_err();
        assert!(matches!(err, ChoiceError::Specification(_)));
    }

    #[test]
    fn test_missing_alt_column() {
        let spec = UtilitySpec::new(vec!["car".into(), "bike".into()])
            .with_term(SpecTerm::with_coefficients("income", vec![0.1, -0.1]));
        let config = ChoiceConfig::default().with_alt_specific_coefficients(true);
        let err = UtilityEvaluator::new(&spec, &config)
            .unwrap()
            .evaluate(&dataset())
            .unwrap_err();
        assert!(err.to_string().contains("bike"));
    }

    #[test]
    fn test_evaluation_error_reports_stage_and_text() {
        let spec = UtilitySpec::shared().with_term(SpecTerm::new("cost * missing", 1.0));
        let err = UtilityEvaluator::new(&spec, &ChoiceConfig::default())
            .unwrap()
            .evaluate(&dataset())
            .unwrap_err();
        match err {
            ChoiceError::ExpressionEvaluation {
                expression, stage, ..
            } => {
                assert_eq!(expression, "cost * missing");
                assert_eq!(stage, EvalStage::RowExpression);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_string_term_is_type_error() {
        let spec = UtilitySpec::shared().with_term(SpecTerm::new("@df.mode", 1.0));
        let err = UtilityEvaluator::new(&spec, &ChoiceConfig::default())
            .unwrap()
            .evaluate(&dataset())
            .unwrap_err();
        assert!(matches!(
            err,
            ChoiceError::ExpressionEvaluation {
                stage: EvalStage::RawScope,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_error_is_specification_error() {
        let spec = UtilitySpec::shared().with_term(SpecTerm::new("cost +", 1.0));
        let err = UtilityEvaluator::new(&spec, &ChoiceConfig::default()).unwrap_err();
        assert!(matches!(err, ChoiceError::Specification(_)));
    }

    #[test]
    fn test_check_variability() {
        let spec = UtilitySpec::shared()
            .with_term(SpecTerm::new("cost", 1.0))
            .with_term(SpecTerm::new("cost * 0", 1.0));
        let design = UtilityEvaluator::new(&spec, &ChoiceConfig::default())
            .unwrap()
            .evaluate(&dataset())
            .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(check_variability(&design, 100, &mut rng), vec!["cost * 0"]);
    }

    #[test]
    fn test_assign_columns_chains() {
        let mut t = dataset();
        let mut constants = BTreeMap::new();
        constants.insert("threshold".to_string(), 20.0);
        let assignments = vec![
            ("high_income".to_string(), "@df.income > threshold".to_string()),
            ("cost_if_high".to_string(), "where(high_income, cost, 0)".to_string()),
        ];
        assign_columns(&mut t, &assignments, &constants).unwrap();
        assert_eq!(
            t.column("high_income"),
            Some(&Column::Bool(vec![false, false, false, true, true, true]))
        );
        assert_eq!(
            t.column("cost_if_high"),
            Some(&Column::Num(vec![0.0, 0.0, 0.0, 1.0, 2.0, 3.0]))
        );
    }
}
