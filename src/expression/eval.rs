//! Vectorized evaluation of expression trees over a table.
//!
//! Every node evaluates to a whole column at once. Literals and constants
//! stay scalar until combined with a column, then broadcast. Column values
//! are borrowed from the table, not copied, until an operator produces new
//! values.

use std::borrow::Cow;
use std::collections::BTreeMap;

use super::parser::{BinaryOp, Expr, Func, UnaryOp};
use crate::models::{Column, Table};

/// A scalar or a full column of `T`.
#[derive(Debug, Clone)]
pub(crate) enum Vals<'a, T: Clone> {
    Scalar(T),
    Vector(Cow<'a, [T]>),
}

impl<T: Clone> Vals<'_, T> {
    #[inline]
    fn at(&self, i: usize) -> &T {
        match self {
            Vals::Scalar(v) => v,
            Vals::Vector(v) => &v[i],
        }
    }

    fn is_scalar(&self) -> bool {
        matches!(self, Vals::Scalar(_))
    }

    fn broadcast(self, n: usize) -> Vec<T> {
        match self {
            Vals::Scalar(v) => vec![v; n],
            Vals::Vector(v) => v.into_owned(),
        }
    }
}

fn map1<A: Clone, R: Clone>(a: &Vals<'_, A>, n: usize, f: impl Fn(&A) -> R) -> Vals<'static, R> {
    match a {
        Vals::Scalar(x) => Vals::Scalar(f(x)),
        Vals::Vector(v) => Vals::Vector(Cow::Owned(v.iter().take(n).map(f).collect())),
    }
}

fn map2<A: Clone, B: Clone, R: Clone>(
    a: &Vals<'_, A>,
    b: &Vals<'_, B>,
    n: usize,
    f: impl Fn(&A, &B) -> R,
) -> Vals<'static, R> {
    if a.is_scalar() && b.is_scalar() {
        return Vals::Scalar(f(a.at(0), b.at(0)));
    }
    Vals::Vector(Cow::Owned((0..n).map(|i| f(a.at(i), b.at(i))).collect()))
}

/// A typed intermediate result.
#[derive(Debug, Clone)]
pub(crate) enum Value<'a> {
    Num(Vals<'a, f64>),
    Bool(Vals<'a, bool>),
    Str(Vals<'a, String>),
}

impl<'a> Value<'a> {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Num(_) => "numeric",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
        }
    }

    /// Numeric view; booleans coerce to 0/1.
    fn into_num(self, n: usize) -> Option<Vals<'a, f64>> {
        match self {
            Value::Num(v) => Some(v),
            Value::Bool(v) => Some(map1(&v, n, |&b| if b { 1.0 } else { 0.0 })),
            Value::Str(_) => None,
        }
    }

    /// Broadcasts to `n` floats. Strings are a type error.
    pub(crate) fn into_f64(self, n: usize) -> Result<Vec<f64>, String> {
        let kind = self.type_name();
        self.into_num(n)
            .map(|v| v.broadcast(n))
            .ok_or_else(|| format!("{kind} result cannot be cast to a number"))
    }

    /// Broadcasts to a typed column of length `n`.
    pub(crate) fn into_column(self, n: usize) -> Column {
        match self {
            Value::Num(v) => Column::Num(v.broadcast(n)),
            Value::Bool(v) => Column::Bool(v.broadcast(n)),
            Value::Str(v) => Column::Str(v.broadcast(n)),
        }
    }
}

fn column_value(column: &Column) -> Value<'_> {
    match column {
        Column::Num(v) => Value::Num(Vals::Vector(Cow::Borrowed(v))),
        Column::Bool(v) => Value::Bool(Vals::Vector(Cow::Borrowed(v))),
        Column::Str(v) => Value::Str(Vals::Vector(Cow::Borrowed(v))),
    }
}

/// Names visible to an expression.
pub(crate) struct Scope<'a> {
    pub table: &'a Table,
    /// Raw-scope constants. `None` for row expressions, which also
    /// disables `df.` access.
    pub constants: Option<&'a BTreeMap<String, f64>>,
}

impl<'a> Scope<'a> {
    pub fn rows(table: &'a Table) -> Self {
        Self {
            table,
            constants: None,
        }
    }

    pub fn raw(table: &'a Table, constants: &'a BTreeMap<String, f64>) -> Self {
        Self {
            table,
            constants: Some(constants),
        }
    }

    fn n(&self) -> usize {
        self.table.len()
    }

    /// Evaluates an expression tree. Errors carry a reason only; the caller
    /// attaches the expression text and stage.
    pub fn eval(&self, expr: &Expr) -> Result<Value<'a>, String> {
        let n = self.n();
        match expr {
            Expr::Num(v) => Ok(Value::Num(Vals::Scalar(*v))),
            Expr::Bool(b) => Ok(Value::Bool(Vals::Scalar(*b))),
            Expr::Str(s) => Ok(Value::Str(Vals::Scalar(s.clone()))),
            Expr::Ident(name) => {
                if let Some(column) = self.table.column(name) {
                    return Ok(column_value(column));
                }
                match self.constants.and_then(|c| c.get(name)) {
                    Some(&v) => Ok(Value::Num(Vals::Scalar(v))),
                    None => Err(format!("unknown identifier '{name}'")),
                }
            }
            Expr::Column(name) => {
                if self.constants.is_none() {
                    return Err(format!("unknown identifier 'df' (in 'df.{name}')"));
                }
                self.table
                    .column(name)
                    .map(column_value)
                    .ok_or_else(|| format!("unknown column '{name}'"))
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Neg | UnaryOp::Plus => {
                        let kind = value.type_name();
                        let v = value
                            .into_num(n)
                            .ok_or_else(|| format!("cannot negate a {kind} value"))?;
                        Ok(match op {
                            UnaryOp::Neg => Value::Num(map1(&v, n, |x| -x)),
                            _ => Value::Num(v),
                        })
                    }
                    UnaryOp::Not => match value {
                        Value::Bool(v) => Ok(Value::Bool(map1(&v, n, |b| !b))),
                        other => Err(format!("cannot apply 'not' to a {} value", other.type_name())),
                    },
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let a = self.eval(lhs)?;
                let b = self.eval(rhs)?;
                binary(*op, a, b, n)
            }
            Expr::Call(func, args) => {
                let values = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<Result<Vec<_>, _>>()?;
                call(*func, values, n)
            }
        }
    }
}

fn binary<'a>(op: BinaryOp, a: Value<'a>, b: Value<'a>, n: usize) -> Result<Value<'a>, String> {
    let mismatch = |a: &Value, b: &Value| {
        format!(
            "cannot apply '{}' to {} and {} values",
            op.symbol(),
            a.type_name(),
            b.type_name()
        )
    };

    match op {
        BinaryOp::And | BinaryOp::Or => match (&a, &b) {
            (Value::Bool(x), Value::Bool(y)) => Ok(Value::Bool(if op == BinaryOp::And {
                map2(x, y, n, |p, q| *p && *q)
            } else {
                map2(x, y, n, |p, q| *p || *q)
            })),
            _ => Err(mismatch(&a, &b)),
        },
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            if let (Value::Str(x), Value::Str(y)) = (&a, &b) {
                return match op {
                    BinaryOp::Eq => Ok(Value::Bool(map2(x, y, n, |p, q| p == q))),
                    BinaryOp::Ne => Ok(Value::Bool(map2(x, y, n, |p, q| p != q))),
                    _ => Err(mismatch(&a, &b)),
                };
            }
            let msg = mismatch(&a, &b);
            let x = a.into_num(n).ok_or_else(|| msg.clone())?;
            let y = b.into_num(n).ok_or(msg)?;
            let cmp: fn(&f64, &f64) -> bool = match op {
                BinaryOp::Eq => |p, q| p == q,
                BinaryOp::Ne => |p, q| p != q,
                BinaryOp::Lt => |p, q| p < q,
                BinaryOp::Le => |p, q| p <= q,
                BinaryOp::Gt => |p, q| p > q,
                _ => |p, q| p >= q,
            };
            Ok(Value::Bool(map2(&x, &y, n, cmp)))
        }
        _ => {
            let msg = mismatch(&a, &b);
            let x = a.into_num(n).ok_or_else(|| msg.clone())?;
            let y = b.into_num(n).ok_or(msg)?;
            let f: fn(&f64, &f64) -> f64 = match op {
                BinaryOp::Add => |p, q| p + q,
                BinaryOp::Sub => |p, q| p - q,
                BinaryOp::Mul => |p, q| p * q,
                BinaryOp::Div => |p, q| p / q,
                BinaryOp::FloorDiv => |p, q| (p / q).floor(),
                BinaryOp::Mod => |p, q| p - q * (p / q).floor(),
                _ => |p, q| p.powf(*q),
            };
            Ok(Value::Num(map2(&x, &y, n, f)))
        }
    }
}

fn call<'a>(func: Func, args: Vec<Value<'a>>, n: usize) -> Result<Value<'a>, String> {
    if args.len() != func.arity() {
        return Err(format!(
            "{}() takes {} argument(s), got {}",
            func.name(),
            func.arity(),
            args.len()
        ));
    }

    if func == Func::Where {
        let mut it = args.into_iter();
        let (cond, a, b) = match (it.next(), it.next(), it.next()) {
            (Some(c), Some(a), Some(b)) => (c, a, b),
            _ => return Err("where() takes 3 arguments".into()),
        };
        let cond = match cond {
            Value::Bool(c) => c,
            other => {
                return Err(format!(
                    "where() condition must be boolean, got {}",
                    other.type_name()
                ))
            }
        };
        return match (a, b) {
            (Value::Str(x), Value::Str(y)) => Ok(Value::Str(Vals::Vector(Cow::Owned(
                (0..n)
                    .map(|i| if *cond.at(i) { x.at(i).clone() } else { y.at(i).clone() })
                    .collect(),
            )))),
            (x, y) => {
                let msg = format!(
                    "where() branches must both be numeric or both strings, got {} and {}",
                    x.type_name(),
                    y.type_name()
                );
                let x = x.into_num(n).ok_or_else(|| msg.clone())?;
                let y = y.into_num(n).ok_or(msg)?;
                Ok(Value::Num(Vals::Vector(Cow::Owned(
                    (0..n)
                        .map(|i| if *cond.at(i) { *x.at(i) } else { *y.at(i) })
                        .collect(),
                ))))
            }
        };
    }

    let mut nums = Vec::with_capacity(args.len());
    for arg in args {
        let kind = arg.type_name();
        nums.push(
            arg.into_num(n)
                .ok_or_else(|| format!("{}() expects numeric arguments, got {kind}", func.name()))?,
        );
    }

    let out = match func {
        Func::Exp => map1(&nums[0], n, |x| x.exp()),
        Func::Log => map1(&nums[0], n, |x| x.ln()),
        Func::Log1p => map1(&nums[0], n, |x| x.ln_1p()),
        Func::Sqrt => map1(&nums[0], n, |x| x.sqrt()),
        Func::Abs => map1(&nums[0], n, |x| x.abs()),
        Func::Min => map2(&nums[0], &nums[1], n, |a, b| a.min(*b)),
        Func::Max => map2(&nums[0], &nums[1], n, |a, b| a.max(*b)),
        Func::Clip => {
            let lo_hi = map2(&nums[1], &nums[2], n, |lo, hi| (*lo, *hi));
            map2(&nums[0], &lo_hi, n, |x, (lo, hi)| x.max(*lo).min(*hi))
        }
        Func::Where => return Err("where() needs a boolean condition".into()),
    };
    Ok(Value::Num(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::parser::parse;

    fn table() -> Table {
        Table::new("id", vec![1, 2, 3])
            .unwrap()
            .with_column("x", vec![1.0, 2.0, 3.0])
            .unwrap()
            .with_column("flag", vec![true, false, true])
            .unwrap()
            .with_column("kind", vec!["a", "b", "a"])
            .unwrap()
    }

    fn eval_rows(src: &str, t: &Table) -> Result<Vec<f64>, String> {
        Scope::rows(t).eval(&parse(src).unwrap())?.into_f64(t.len())
    }

    #[test]
    fn test_arithmetic_broadcast() {
        let t = table();
        assert_eq!(eval_rows("x * 2 + 1", &t).unwrap(), vec![3.0, 5.0, 7.0]);
        assert_eq!(eval_rows("7 // 2", &t).unwrap(), vec![3.0; 3]);
        assert_eq!(eval_rows("-7 % 3", &t).unwrap(), vec![2.0; 3]);
        assert_eq!(eval_rows("x ** 2", &t).unwrap(), vec![1.0, 4.0, 9.0]);
    }

    #[test]
    fn test_bool_coercion_and_strings() {
        let t = table();
        assert_eq!(eval_rows("flag * 10", &t).unwrap(), vec![10.0, 0.0, 10.0]);
        assert_eq!(eval_rows("kind == 'a'", &t).unwrap(), vec![1.0, 0.0, 1.0]);
        assert_eq!(
            eval_rows("(kind != 'a') | (x > 2)", &t).unwrap(),
            vec![0.0, 1.0, 1.0]
        );
        assert_eq!(eval_rows("~flag", &t).unwrap(), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_functions() {
        let t = table();
        assert_eq!(eval_rows("max(x, 2)", &t).unwrap(), vec![2.0, 2.0, 3.0]);
        assert_eq!(eval_rows("clip(x, 1.5, 2.5)", &t).unwrap(), vec![1.5, 2.0, 2.5]);
        assert_eq!(
            eval_rows("where(flag, x, -x)", &t).unwrap(),
            vec![1.0, -2.0, 3.0]
        );
        let logs = eval_rows("log(exp(x))", &t).unwrap();
        assert!((logs[2] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_type_errors() {
        let t = table();
        assert!(eval_rows("kind + 1", &t).unwrap_err().contains("'+'"));
        assert!(eval_rows("kind < 'b'", &t).is_err());
        assert!(eval_rows("x & flag", &t).is_err());
        assert!(eval_rows("not x", &t).is_err());
        assert!(eval_rows("kind", &t).unwrap_err().contains("string"));
        assert!(eval_rows("where(x, 1, 0)", &t).is_err());
    }

    #[test]
    fn test_scopes() {
        let t = table();
        let mut constants = BTreeMap::new();
        constants.insert("k".to_string(), 10.0);

        // Row expressions see columns only.
        assert!(eval_rows("x * k", &t).unwrap_err().contains("unknown identifier 'k'"));
        assert!(eval_rows("df.x", &t).is_err());

        let raw = Scope::raw(&t, &constants);
        let v = raw
            .eval(&parse("df.x * k").unwrap())
            .unwrap()
            .into_f64(3)
            .unwrap();
        assert_eq!(v, vec![10.0, 20.0, 30.0]);
        assert!(raw.eval(&parse("df.missing").unwrap()).is_err());
    }

    #[test]
    fn test_into_column_keeps_type() {
        let t = table();
        let col = Scope::rows(&t)
            .eval(&parse("where(flag, kind, 'z')").unwrap())
            .unwrap()
            .into_column(3);
        assert_eq!(col, Column::Str(vec!["a".into(), "z".into(), "a".into()]));
    }
}
