//! Condition expression parser and evaluator.
//!
//! Grammar:
//! ```text
//! Expr     ::= Or
//! Or       ::= And ( '||' And )*
//! And      ::= Unary ( '&&' Unary )*
//! Unary    ::= '!' Unary | Cmp
//! Cmp      ::= Term ( ('==' | '!=' | '<=' | '>=' | '<' | '>') Term )?
//! Term     ::= Literal | VarPath | '(' Expr ')'
//! Literal  ::= QuotedString | Number | 'true' | 'false' | 'null'
//! VarPath  ::= identifier ( '.' identifier )*
//! ```

use serde_json::Value;

use crate::errors::ExprError;
use crate::Resolver;

/// A parsed condition expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CmpOp {
    fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtEq => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtEq => ">=",
        }
    }
}

/// Parse a condition string. Empty input parses to a constant-true
/// expression.
pub fn parse(input: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Ok(Expr::Literal(Value::Bool(true)));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(ExprError::Parse(format!(
            "unexpected trailing input at token {}",
            parser.pos
        )));
    }
    Ok(expr)
}

/// Parse and evaluate a condition to a boolean using truthiness rules.
pub fn eval_bool(input: &str, resolve: Resolver<'_>) -> Result<bool, ExprError> {
    let expr = parse(input)?;
    Ok(truthy(&expr.eval(resolve)?))
}

/// Truthiness: `false`, `null`, `0`, `""`, empty arrays and objects are
/// false; everything else is true.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

impl Expr {
    /// Evaluate against the variable store. Unknown variables resolve to
    /// `null`.
    pub fn eval(&self, resolve: Resolver<'_>) -> Result<Value, ExprError> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Var(path) => Ok(resolve(path).unwrap_or(Value::Null)),
            Expr::Not(inner) => Ok(Value::Bool(!truthy(&inner.eval(resolve)?))),
            Expr::And(lhs, rhs) => {
                let ok = truthy(&lhs.eval(resolve)?) && truthy(&rhs.eval(resolve)?);
                Ok(Value::Bool(ok))
            }
            Expr::Or(lhs, rhs) => {
                let ok = truthy(&lhs.eval(resolve)?) || truthy(&rhs.eval(resolve)?);
                Ok(Value::Bool(ok))
            }
            Expr::Cmp { op, lhs, rhs } => {
                let lhs = lhs.eval(resolve)?;
                let rhs = rhs.eval(resolve)?;
                Ok(Value::Bool(compare(*op, &lhs, &rhs)?))
            }
        }
    }
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> Result<bool, ExprError> {
    match op {
        CmpOp::Eq => Ok(loose_eq(lhs, rhs)),
        CmpOp::NotEq => Ok(!loose_eq(lhs, rhs)),
        CmpOp::Lt | CmpOp::LtEq | CmpOp::Gt | CmpOp::GtEq => {
            let ordering = if let (Some(a), Some(b)) = (as_f64(lhs), as_f64(rhs)) {
                a.partial_cmp(&b)
            } else if let (Value::String(a), Value::String(b)) = (lhs, rhs) {
                Some(a.cmp(b))
            } else {
                None
            };

            let ordering = ordering.ok_or_else(|| ExprError::Incomparable {
                op: op.symbol(),
                lhs: type_name(lhs).to_string(),
                rhs: type_name(rhs).to_string(),
            })?;

            Ok(match op {
                CmpOp::Lt => ordering.is_lt(),
                CmpOp::LtEq => ordering.is_le(),
                CmpOp::Gt => ordering.is_gt(),
                CmpOp::GtEq => ordering.is_ge(),
                _ => unreachable!(),
            })
        }
    }
}

/// Equality with number coercion: `1 == 1.0` and `"5" == 5` hold, matching
/// how recorded flows compare extracted text against numbers.
fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    if lhs == rhs {
        return true;
    }
    match (as_f64(lhs), as_f64(rhs)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Op(CmpOp),
    AndAnd,
    OrOr,
    Not,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b' ' | b'\t' | b'\r' | b'\n' => i += 1,
            b'(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            b')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            b'&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    tokens.push(Token::AndAnd);
                    i += 2;
                } else {
                    return Err(ExprError::Parse("single '&' is not an operator".into()));
                }
            }
            b'|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    tokens.push(Token::OrOr);
                    i += 2;
                } else {
                    return Err(ExprError::Parse("single '|' is not an operator".into()));
                }
            }
            b'=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Op(CmpOp::Eq));
                    i += 2;
                } else {
                    // Recorded conditions sometimes use a single '='.
                    tokens.push(Token::Op(CmpOp::Eq));
                    i += 1;
                }
            }
            b'!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Op(CmpOp::NotEq));
                    i += 2;
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            b'<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Op(CmpOp::LtEq));
                    i += 2;
                } else {
                    tokens.push(Token::Op(CmpOp::Lt));
                    i += 1;
                }
            }
            b'>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Op(CmpOp::GtEq));
                    i += 2;
                } else {
                    tokens.push(Token::Op(CmpOp::Gt));
                    i += 1;
                }
            }
            b'"' | b'\'' => {
                let quote = bytes[i];
                let start = i + 1;
                let mut j = start;
                while j < bytes.len() && bytes[j] != quote {
                    j += 1;
                }
                if j >= bytes.len() {
                    return Err(ExprError::Parse("unterminated string literal".into()));
                }
                tokens.push(Token::Str(input[start..j].to_string()));
                i = j + 1;
            }
            c if c.is_ascii_digit() || (c == b'-' && starts_number(bytes, i)) => {
                let start = i;
                i += 1;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                let text = &input[start..i];
                let num = text
                    .parse::<f64>()
                    .map_err(|_| ExprError::Parse(format!("bad number '{}'", text)))?;
                tokens.push(Token::Num(num));
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let start = i;
                i += 1;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(input[start..i].to_string()));
            }
            other => {
                return Err(ExprError::Parse(format!(
                    "unexpected character '{}'",
                    other as char
                )));
            }
        }
    }

    Ok(tokens)
}

fn starts_number(bytes: &[u8], i: usize) -> bool {
    bytes
        .get(i + 1)
        .map(|b| b.is_ascii_digit())
        .unwrap_or(false)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::OrOr) {
            self.bump();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        while self.peek() == Some(&Token::AndAnd) {
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.peek() == Some(&Token::Not) {
            self.bump();
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Expr, ExprError> {
        let lhs = self.parse_term()?;
        if let Some(Token::Op(op)) = self.peek().cloned() {
            self.bump();
            let rhs = self.parse_term()?;
            return Ok(Expr::Cmp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, ExprError> {
        match self.bump() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.bump() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(ExprError::Parse("missing closing parenthesis".into())),
                }
            }
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Num(n)) => Ok(Expr::Literal(serde_json::json!(n))),
            Some(Token::Ident(ident)) => match ident.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ => Ok(Expr::Var(ident)),
            },
            other => Err(ExprError::Parse(format!("unexpected token {:?}", other))),
        }
    }
}
