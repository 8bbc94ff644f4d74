//! Tokenizer and recursive-descent parser for utility expressions.
//!
//! # Grammar
//!
//! ```text
//! or_expr    := and_expr (("|" | "or") and_expr)*
//! and_expr   := not_expr (("&" | "and") not_expr)*
//! not_expr   := "not" not_expr | comparison
//! comparison := additive (("==" | "!=" | "<" | "<=" | ">" | ">=") additive)?
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/" | "//" | "%") unary)*
//! unary      := ("-" | "+" | "~") unary | power
//! power      := primary ("**" unary)?
//! primary    := number | string | "True" | "False"
//!             | ident | ["np" "."] ident "(" args ")" | "df" "." ident
//!             | "(" or_expr ")"
//! ```
//!
//! Only the functions in [`Func`] may be called. Nothing else is reachable
//! from an expression.

use std::fmt;

/// A parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Str(String),
    Bool(bool),
    /// Bare name: a column, or a constant in raw scope.
    Ident(String),
    /// Explicit `df.name` column access.
    Column(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
        }
    }
}

/// Whitelisted functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Exp,
    Log,
    Log1p,
    Sqrt,
    Abs,
    Min,
    Max,
    Clip,
    Where,
}

impl Func {
    fn lookup(name: &str) -> Option<Func> {
        Some(match name {
            "exp" => Func::Exp,
            "log" => Func::Log,
            "log1p" => Func::Log1p,
            "sqrt" => Func::Sqrt,
            "abs" => Func::Abs,
            "min" | "minimum" => Func::Min,
            "max" | "maximum" => Func::Max,
            "clip" => Func::Clip,
            "where" => Func::Where,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Func::Exp => "exp",
            Func::Log => "log",
            Func::Log1p => "log1p",
            Func::Sqrt => "sqrt",
            Func::Abs => "abs",
            Func::Min => "min",
            Func::Max => "max",
            Func::Clip => "clip",
            Func::Where => "where",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Func::Exp | Func::Log | Func::Log1p | Func::Sqrt | Func::Abs => 1,
            Func::Min | Func::Max => 2,
            Func::Clip | Func::Where => 3,
        }
    }
}

/// A syntax error with the byte offset where it was detected.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.message, self.offset)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
    Dot,
}

const OPERATORS: [&str; 16] = [
    "**", "//", "==", "!=", "<=", ">=", "+", "-", "*", "/", "%", "<", ">", "&", "|", "~",
];

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, ParseError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;

        if c.is_ascii_digit() || (c == '.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) {
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                let mut j = i + 1;
                if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                    j += 1;
                }
                if j < bytes.len() && bytes[j].is_ascii_digit() {
                    i = j;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text = &src[start..i];
            let value = text.parse::<f64>().map_err(|_| ParseError {
                offset: start,
                message: format!("invalid number '{text}'"),
            })?;
            tokens.push((start, Token::Num(value)));
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push((start, Token::Ident(src[start..i].to_string())));
            continue;
        }

        if c == '\'' || c == '"' {
            i += 1;
            while i < bytes.len() && bytes[i] as char != c {
                i += 1;
            }
            if i >= bytes.len() {
                return Err(ParseError {
                    offset: start,
                    message: "unterminated string".into(),
                });
            }
            tokens.push((start, Token::Str(src[start + 1..i].to_string())));
            i += 1;
            continue;
        }

        match c {
            '(' => tokens.push((start, Token::LParen)),
            ')' => tokens.push((start, Token::RParen)),
            ',' => tokens.push((start, Token::Comma)),
            '.' => tokens.push((start, Token::Dot)),
            _ => {
                let rest = &src[i..];
                let op = OPERATORS
                    .iter()
                    .copied()
                    .find(|op| rest.starts_with(op))
                    .ok_or_else(|| ParseError {
                        offset: start,
                        message: format!("unexpected character '{c}'"),
                    })?;
                tokens.push((start, Token::Op(op)));
                i += op.len();
                continue;
            }
        }
        i += 1;
    }

    Ok(tokens)
}

/// Parses an expression (without the `@` marker).
pub fn parse(src: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        len: src.len(),
    };
    let expr = parser.or_expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(o, _)| *o).unwrap_or(self.len)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            offset: self.offset(),
            message: message.into(),
        }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(o)) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(w)) if w == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), ParseError> {
        if self.peek() == Some(&token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.and_expr()?;
        while self.eat_op("|") || self.eat_keyword("or") {
            let rhs = self.and_expr()?;
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.not_expr()?;
        while self.eat_op("&") || self.eat_keyword("and") {
            let rhs = self.not_expr()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr, ParseError> {
        if self.eat_keyword("not") {
            let operand = self.not_expr()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison_op(&mut self) -> Option<BinaryOp> {
        let op = match self.peek() {
            Some(Token::Op("==")) => BinaryOp::Eq,
            Some(Token::Op("!=")) => BinaryOp::Ne,
            Some(Token::Op("<")) => BinaryOp::Lt,
            Some(Token::Op("<=")) => BinaryOp::Le,
            Some(Token::Op(">")) => BinaryOp::Gt,
            Some(Token::Op(">=")) => BinaryOp::Ge,
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.additive()?;
        let Some(op) = self.comparison_op() else {
            return Ok(lhs);
        };
        let rhs = self.additive()?;
        if self.comparison_op().is_some() {
            return Err(self.error("chained comparisons are not supported"));
        }
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.term()?;
        loop {
            let op = if self.eat_op("+") {
                BinaryOp::Add
            } else if self.eat_op("-") {
                BinaryOp::Sub
            } else {
                return Ok(lhs);
            };
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        loop {
            let op = if self.eat_op("*") {
                BinaryOp::Mul
            } else if self.eat_op("//") {
                BinaryOp::FloorDiv
            } else if self.eat_op("/") {
                BinaryOp::Div
            } else if self.eat_op("%") {
                BinaryOp::Mod
            } else {
                return Ok(lhs);
            };
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = if self.eat_op("-") {
            UnaryOp::Neg
        } else if self.eat_op("+") {
            UnaryOp::Plus
        } else if self.eat_op("~") {
            UnaryOp::Not
        } else {
            return self.power();
        };
        let operand = self.unary()?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.primary()?;
        if self.eat_op("**") {
            let exponent = self.unary()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        match self.next() {
            Some(Token::Num(v)) => Ok(Expr::Num(v)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if name == "True" || name == "true" {
                    return Ok(Expr::Bool(true));
                }
                if name == "False" || name == "false" {
                    return Ok(Expr::Bool(false));
                }
                if self.peek() == Some(&Token::LParen) {
                    return self.call(&name, offset);
                }
                if (name == "df" || name == "np") && self.peek() == Some(&Token::Dot) {
                    self.pos += 1;
                    let Some(Token::Ident(member)) = self.next() else {
                        return Err(ParseError {
                            offset,
                            message: format!("expected name after '{name}.'"),
                        });
                    };
                    if name == "np" {
                        return self.call(&member, offset);
                    }
                    return Ok(Expr::Column(member));
                }
                Ok(Expr::Ident(name))
            }
            Some(other) => Err(ParseError {
                offset,
                message: format!("unexpected token {other:?}"),
            }),
            None => Err(ParseError {
                offset,
                message: "unexpected end of expression".into(),
            }),
        }
    }

    fn call(&mut self, name: &str, offset: usize) -> Result<Expr, ParseError> {
        let func = Func::lookup(name).ok_or_else(|| ParseError {
            offset,
            message: format!("function '{name}' is not allowed"),
        })?;
        self.expect(Token::LParen, "'('")?;
        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.or_expr()?);
                if self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen, "')'")?;
        if args.len() != func.arity() {
            return Err(ParseError {
                offset,
                message: format!(
                    "{}() takes {} argument(s), got {}",
                    func.name(),
                    func.arity(),
                    args.len()
                ),
            });
        }
        Ok(Expr::Call(func, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(op: BinaryOp, l: Expr, r: Expr) -> Expr {
        Expr::Binary(op, Box::new(l), Box::new(r))
    }

    fn ident(s: &str) -> Expr {
        Expr::Ident(s.into())
    }

    #[test]
    fn test_precedence() {
        // a + b * c ** 2
        let e = parse("a + b * c ** 2").unwrap();
        assert_eq!(
            e,
            bin(
                BinaryOp::Add,
                ident("a"),
                bin(
                    BinaryOp::Mul,
                    ident("b"),
                    bin(BinaryOp::Pow, ident("c"), Expr::Num(2.0))
                )
            )
        );
    }

    #[test]
    fn test_negative_power_binds_like_python() {
        // -2 ** 2 == -(2 ** 2)
        let e = parse("-2 ** 2").unwrap();
        assert_eq!(
            e,
            Expr::Unary(
                UnaryOp::Neg,
                Box::new(bin(BinaryOp::Pow, Expr::Num(2.0), Expr::Num(2.0)))
            )
        );
    }

    #[test]
    fn test_logical_and_comparison() {
        let e = parse("(start >= 8) & (tour_type == 'shopping') or not is_worker").unwrap();
        let Expr::Binary(BinaryOp::Or, lhs, rhs) = e else {
            panic!("expected or at top level");
        };
        assert!(matches!(*lhs, Expr::Binary(BinaryOp::And, _, _)));
        assert_eq!(*rhs, Expr::Unary(UnaryOp::Not, Box::new(ident("is_worker"))));
    }

    #[test]
    fn test_df_column_and_functions() {
        let e = parse("log(df.income + 1) * where(x > 0, 1, 0)").unwrap();
        let Expr::Binary(BinaryOp::Mul, lhs, rhs) = e else {
            panic!("expected product");
        };
        assert!(matches!(*lhs, Expr::Call(Func::Log, _)));
        assert!(matches!(*rhs, Expr::Call(Func::Where, ref args) if args.len() == 3));
    }

    #[test]
    fn test_np_prefix() {
        assert_eq!(
            parse("np.exp(x)").unwrap(),
            Expr::Call(Func::Exp, vec![ident("x")])
        );
        assert!(parse("np.x").is_err());
    }

    #[test]
    fn test_numbers() {
        assert_eq!(parse("1.5e3").unwrap(), Expr::Num(1500.0));
        assert_eq!(parse(".25").unwrap(), Expr::Num(0.25));
        assert_eq!(parse("True").unwrap(), Expr::Bool(true));
    }

    #[test]
    fn test_rejects_unknown_function() {
        let err = parse("system('rm')").unwrap_err();
        assert!(err.message.contains("not allowed"));
    }

    #[test]
    fn test_rejects_bad_arity() {
        assert!(parse("exp(1, 2)").is_err());
        assert!(parse("where(a, b)").is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse("a +").is_err());
        assert!(parse("(a").is_err());
        assert!(parse("a b").is_err());
        assert!(parse("'open").is_err());
        assert!(parse("a $ b").is_err());
        assert!(parse("1 < a < 3").is_err());
    }
}
