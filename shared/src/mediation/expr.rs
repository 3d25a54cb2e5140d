//! Sandboxed transform expressions for parameter mediation.
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := '-' unary | postfix
//! postfix := IDENT '(' [expr (',' expr)*] ')' | primary
//! primary := NUMBER | STRING | IDENT | '$' DIGITS | '(' expr ')'
//! ```
//!
//! Identifiers name source parameters, `$n` is the n-th source parameter.
//! Only arithmetic and string operations exist; nothing reaches the host.

use serde_json::{Number, Value};

use crate::mediation::error::MediationError;

/// Source parameters in declaration order
pub type Scope = [(String, Value)];

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Position(usize),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {}", n),
            Token::Str(s) => format!("string \"{}\"", s),
            Token::Ident(name) => format!("identifier {}", name),
            Token::Position(index) => format!("${}", index),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::Percent => "'%'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Comma => "','".to_string(),
        }
    }
}

/// Deepest nesting of parentheses, calls and negations a transform may use
pub const MAX_NESTING: usize = 64;
/// Longest transform accepted, in tokens
pub const MAX_TOKENS: usize = 1024;

fn tokenize(expression: &str) -> Result<Vec<Token>, MediationError> {
    let chars: Vec<char> = expression.chars().collect();
    let mut tokens = Vec::new();
    let mut index = 0;

    while index < chars.len() {
        let c = chars[index];
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                index += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                index += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                index += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                index += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                index += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                index += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                index += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                index += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                index += 1;
            }
            '"' | '\'' => {
                let quote = c;
                let mut text = String::new();
                index += 1;
                loop {
                    let Some(&next) = chars.get(index) else {
                        return Err(MediationError::UnterminatedString {
                            expression: expression.to_string(),
                        });
                    };
                    index += 1;
                    if next == quote {
                        break;
                    }
                    if next == '\\' {
                        let Some(&escaped) = chars.get(index) else {
                            return Err(MediationError::UnterminatedString {
                                expression: expression.to_string(),
                            });
                        };
                        index += 1;
                        text.push(escaped);
                    } else {
                        text.push(next);
                    }
                }
                tokens.push(Token::Str(text));
            }
            '$' => {
                let start = index + 1;
                let mut end = start;
                while end < chars.len() && chars[end].is_ascii_digit() {
                    end += 1;
                }
                if end == start {
                    return Err(MediationError::UnexpectedCharacter {
                        found: c,
                        offset: index,
                        expression: expression.to_string(),
                    });
                }
                let digits: String = chars[start..end].iter().collect();
                let position = digits.parse::<usize>().map_err(|_| {
                    MediationError::UnexpectedToken {
                        found: format!("${}", digits),
                        expression: expression.to_string(),
                    }
                })?;
                tokens.push(Token::Position(position));
                index = end;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = index;
                while index < chars.len() && (chars[index].is_ascii_digit() || chars[index] == '.') {
                    index += 1;
                }
                let literal: String = chars[start..index].iter().collect();
                let number = literal.parse::<f64>().map_err(|_| MediationError::UnexpectedToken {
                    found: literal.clone(),
                    expression: expression.to_string(),
                })?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = index;
                while index < chars.len() && (chars[index].is_alphanumeric() || chars[index] == '_') {
                    index += 1;
                }
                tokens.push(Token::Ident(chars[start..index].iter().collect()));
            }
            other => {
                return Err(MediationError::UnexpectedCharacter {
                    found: other,
                    offset: index,
                    expression: expression.to_string(),
                });
            }
        }
    }

    Ok(tokens)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Function {
    Upper,
    Lower,
    Trim,
    Len,
    Concat,
    Str,
    Num,
    Round,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "upper" => Some(Function::Upper),
            "lower" => Some(Function::Lower),
            "trim" => Some(Function::Trim),
            "len" => Some(Function::Len),
            "concat" => Some(Function::Concat),
            "str" => Some(Function::Str),
            "num" => Some(Function::Num),
            "round" => Some(Function::Round),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Function::Upper => "upper",
            Function::Lower => "lower",
            Function::Trim => "trim",
            Function::Len => "len",
            Function::Concat => "concat",
            Function::Str => "str",
            Function::Num => "num",
            Function::Round => "round",
        }
    }

    /// `None` means variadic
    fn arity(self) -> Option<usize> {
        match self {
            Function::Concat => None,
            _ => Some(1),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Param(String),
    Position(usize),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
}

struct Parser<'a> {
    expression: &'a str,
    tokens: Vec<Token>,
    index: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn next(&mut self) -> Result<Token, MediationError> {
        let token = self
            .tokens
            .get(self.index)
            .cloned()
            .ok_or_else(|| MediationError::UnexpectedEnd {
                expression: self.expression.to_string(),
            })?;
        self.index += 1;
        Ok(token)
    }

    fn unexpected(&self, token: &Token) -> MediationError {
        MediationError::UnexpectedToken {
            found: token.describe(),
            expression: self.expression.to_string(),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), MediationError> {
        let token = self.next()?;
        if token != expected {
            return Err(self.unexpected(&token));
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, MediationError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.index += 1;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn term(&mut self) -> Result<Expr, MediationError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.index += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, MediationError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(MediationError::TooDeep {
                limit: MAX_NESTING,
                expression: self.expression.to_string(),
            });
        }
        let result = if let Some(Token::Minus) = self.peek() {
            self.index += 1;
            self.unary().map(|inner| Expr::Neg(Box::new(inner)))
        } else {
            self.primary()
        };
        self.depth -= 1;
        result
    }

    fn primary(&mut self) -> Result<Expr, MediationError> {
        let token = self.next()?;
        match token {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::Position(index) => Ok(Expr::Position(index)),
            Token::LParen => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if let Some(Token::LParen) = self.peek() {
                    self.index += 1;
                    let function = Function::from_name(&name)
                        .ok_or(MediationError::UnknownFunction { name })?;
                    let args = self.arguments()?;
                    if let Some(expected) = function.arity() {
                        if args.len() != expected {
                            return Err(MediationError::WrongArity {
                                function: function.name(),
                                expected,
                                found: args.len(),
                            });
                        }
                    }
                    Ok(Expr::Call(function, args))
                } else {
                    Ok(Expr::Param(name))
                }
            }
            other => Err(self.unexpected(&other)),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, MediationError> {
        let mut args = Vec::new();
        if let Some(Token::RParen) = self.peek() {
            self.index += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            match self.next()? {
                Token::Comma => continue,
                Token::RParen => return Ok(args),
                other => return Err(self.unexpected(&other)),
            }
        }
    }
}

fn type_name(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

fn as_number(value: &Value, operation: &'static str) -> Result<f64, MediationError> {
    value.as_f64().ok_or_else(|| MediationError::TypeMismatch {
        operation,
        found: type_name(value),
    })
}

fn number_value(n: f64) -> Result<Value, MediationError> {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        return Ok(Value::from(n as i64));
    }
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or(MediationError::NonFiniteNumber)
}

impl Expr {
    pub fn parse(expression: &str) -> Result<Expr, MediationError> {
        let tokens = tokenize(expression)?;
        if tokens.len() > MAX_TOKENS {
            return Err(MediationError::TooLong {
                limit: MAX_TOKENS,
                found: tokens.len(),
            });
        }
        let mut parser = Parser {
            expression,
            tokens,
            index: 0,
            depth: 0,
        };
        let expr = parser.expr()?;
        if let Some(extra) = parser.peek() {
            return Err(parser.unexpected(&extra.clone()));
        }
        Ok(expr)
    }

    pub fn evaluate(&self, scope: &Scope) -> Result<Value, MediationError> {
        match self {
            Expr::Number(n) => number_value(*n),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Param(name) => scope
                .iter()
                .find(|(param, _)| param == name)
                .map(|(_, value)| value.clone())
                .ok_or_else(|| MediationError::UnknownParameter { name: name.clone() }),
            Expr::Position(index) => scope
                .get(*index)
                .map(|(_, value)| value.clone())
                .ok_or(MediationError::PositionOutOfRange {
                    index: *index,
                    len: scope.len(),
                }),
            Expr::Neg(inner) => {
                let value = inner.evaluate(scope)?;
                number_value(-as_number(&value, "negation")?)
            }
            Expr::Binary(op, left, right) => {
                let left = left.evaluate(scope)?;
                let right = right.evaluate(scope)?;
                Self::apply_binary(*op, &left, &right)
            }
            Expr::Call(function, args) => {
                let values = args
                    .iter()
                    .map(|arg| arg.evaluate(scope))
                    .collect::<Result<Vec<Value>, MediationError>>()?;
                Self::apply_function(*function, &values)
            }
        }
    }

    fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, MediationError> {
        if op == BinaryOp::Add && (left.is_string() || right.is_string()) {
            return Ok(Value::String(format!("{}{}", as_text(left), as_text(right))));
        }
        let (operation, l, r) = match op {
            BinaryOp::Add => ("addition", left, right),
            BinaryOp::Sub => ("subtraction", left, right),
            BinaryOp::Mul => ("multiplication", left, right),
            BinaryOp::Div => ("division", left, right),
            BinaryOp::Rem => ("remainder", left, right),
        };
        let l = as_number(l, operation)?;
        let r = as_number(r, operation)?;
        let result = match op {
            BinaryOp::Add => l + r,
            BinaryOp::Sub => l - r,
            BinaryOp::Mul => l * r,
            BinaryOp::Div | BinaryOp::Rem if r == 0.0 => {
                return Err(MediationError::DivisionByZero);
            }
            BinaryOp::Div => l / r,
            BinaryOp::Rem => l % r,
        };
        number_value(result)
    }

    fn apply_function(function: Function, args: &[Value]) -> Result<Value, MediationError> {
        let text_arg = |operation: &'static str| -> Result<&str, MediationError> {
            args[0].as_str().ok_or_else(|| MediationError::TypeMismatch {
                operation,
                found: type_name(&args[0]),
            })
        };
        match function {
            Function::Upper => Ok(Value::String(text_arg("upper()")?.to_uppercase())),
            Function::Lower => Ok(Value::String(text_arg("lower()")?.to_lowercase())),
            Function::Trim => Ok(Value::String(text_arg("trim()")?.trim().to_string())),
            Function::Len => match &args[0] {
                Value::String(s) => Ok(Value::from(s.chars().count() as u64)),
                Value::Array(items) => Ok(Value::from(items.len() as u64)),
                other => Err(MediationError::TypeMismatch {
                    operation: "len()",
                    found: type_name(other),
                }),
            },
            Function::Concat => Ok(Value::String(args.iter().map(as_text).collect())),
            Function::Str => Ok(Value::String(as_text(&args[0]))),
            Function::Num => match &args[0] {
                Value::Number(_) => Ok(args[0].clone()),
                Value::String(s) => {
                    let parsed = s.trim().parse::<f64>().map_err(|_| MediationError::TypeMismatch {
                        operation: "num()",
                        found: format!("string \"{}\"", s),
                    })?;
                    number_value(parsed)
                }
                other => Err(MediationError::TypeMismatch {
                    operation: "num()",
                    found: type_name(other),
                }),
            },
            Function::Round => number_value(as_number(&args[0], "round()")?.round()),
        }
    }
}
