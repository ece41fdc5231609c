//! Condition language for decision rules.
//!
//! A condition is a short boolean expression over a single input value (the
//! package score or one assessment metric). Three spellings are accepted:
//!
//! - a partial comparison with the input implied on the left: `> 0.8`, `== FALSE`
//! - a full expression over `x`, `.x` or `value`: `x >= 0.2 && x < 0.5`
//! - a formula or lambda prefix: `~ .x > 0.5`, `function(v) v > 0.5`
//!
//! Conditions are compiled once into an [`Expr`] tree and evaluated against a
//! [`Budget`] owned by the caller, so evaluation is re-entrant and bounded.

use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::CharIndices;

use thiserror::Error;

use crate::packages::MetricValue;

use super::evaluator::{Budget, EvaluationFailure};

const MAX_NESTING: usize = 64;
const MAX_OPERATORS: usize = 512;
const DEFAULT_VARIABLES: [&str; 3] = ["x", ".x", "value"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("condition is empty")]
    Empty,
    #[error("unexpected character '{found}' at offset {position}")]
    UnexpectedChar { position: usize, found: char },
    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("expected {expected} at offset {position}, found '{found}'")]
    UnexpectedToken {
        position: usize,
        found: String,
        expected: &'static str,
    },
    #[error("condition ended early, expected {0}")]
    UnexpectedEnd(&'static str),
    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("{function} takes {expected} argument(s), got {found}")]
    WrongArity {
        function: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("condition nests deeper than {MAX_NESTING} levels")]
    TooDeep,
    #[error("condition has more than {MAX_OPERATORS} operators")]
    TooLarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }

    fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Abs,
    IsNa,
    Min,
    Max,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "abs" => Some(Self::Abs),
            "is_na" | "is.na" => Some(Self::IsNa),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Function::Abs => "abs",
            Function::IsNa => "is_na",
            Function::Min => "min",
            Function::Max => "max",
        }
    }

    fn arity(self) -> usize {
        match self {
            Function::Abs | Function::IsNa => 1,
            Function::Min | Function::Max => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(MetricValue),
    Input,
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
}

/// A condition compiled from its source text. Immutable and shareable
/// across threads.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCondition {
    source: String,
    expr: Expr,
}

impl CompiledCondition {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluate against `input`, charging every visited node to `budget`.
    pub fn evaluate(
        &self,
        input: &MetricValue,
        budget: &mut Budget,
    ) -> Result<bool, EvaluationFailure> {
        match eval(&self.expr, input, budget)? {
            MetricValue::Bool(result) => Ok(result),
            MetricValue::Missing => Err(EvaluationFailure::MissingResult),
            other => Err(EvaluationFailure::NonBoolean(kind_name(&other))),
        }
    }
}

pub fn compile(source: &str) -> Result<CompiledCondition, CompileError> {
    if source.trim().is_empty() {
        return Err(CompileError::Empty);
    }

    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_condition()?;

    Ok(CompiledCondition {
        source: source.to_string(),
        expr,
    })
}

// ---------------------------------------------------------------------------
// Lexing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    Comma,
    Tilde,
    Backslash,
    Op(OpToken),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpToken {
    Binary(BinaryOp),
    And,
    Or,
    Not,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => n.to_string(),
            Token::Str(s) => format!("{s:?}"),
            Token::Ident(name) => name.clone(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Comma => ",".into(),
            Token::Tilde => "~".into(),
            Token::Backslash => "\\".into(),
            Token::Op(OpToken::Binary(op)) => op.symbol().into(),
            Token::Op(OpToken::And) => "&&".into(),
            Token::Op(OpToken::Or) => "||".into(),
            Token::Op(OpToken::Not) => "!".into(),
        }
    }

    /// Operator tokens, including the word forms `and`, `or` and `not`.
    fn op(&self) -> Option<OpToken> {
        match self {
            Token::Op(op) => Some(*op),
            Token::Ident(word) => match word.as_str() {
                "and" => Some(OpToken::And),
                "or" => Some(OpToken::Or),
                "not" => Some(OpToken::Not),
                _ => None,
            },
            _ => None,
        }
    }
}

struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, CompileError> {
    let mut lexer = Lexer {
        source,
        chars: source.char_indices().peekable(),
    };
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

impl Lexer<'_> {
    fn next_token(&mut self) -> Result<Option<(Token, usize)>, CompileError> {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}

        let Some((start, c)) = self.chars.next() else {
            return Ok(None);
        };

        let token = match c {
            '0'..='9' => self.number(start)?,
            '.' if self.peek_is(|next| next.is_ascii_digit()) => self.number(start)?,
            c if c.is_alphabetic() || c == '_' || c == '.' => self.identifier(start),
            '"' | '\'' => self.string(start, c)?,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            '~' => Token::Tilde,
            '\\' => Token::Backslash,
            '+' => Token::Op(OpToken::Binary(BinaryOp::Add)),
            '-' => Token::Op(OpToken::Binary(BinaryOp::Sub)),
            '*' => Token::Op(OpToken::Binary(BinaryOp::Mul)),
            '/' => Token::Op(OpToken::Binary(BinaryOp::Div)),
            '%' => Token::Op(OpToken::Binary(BinaryOp::Rem)),
            '=' if self.eat('=') => Token::Op(OpToken::Binary(BinaryOp::Eq)),
            '!' if self.eat('=') => Token::Op(OpToken::Binary(BinaryOp::Ne)),
            '!' => Token::Op(OpToken::Not),
            '<' if self.eat('=') => Token::Op(OpToken::Binary(BinaryOp::Le)),
            '<' => Token::Op(OpToken::Binary(BinaryOp::Lt)),
            '>' if self.eat('=') => Token::Op(OpToken::Binary(BinaryOp::Ge)),
            '>' => Token::Op(OpToken::Binary(BinaryOp::Gt)),
            '&' => {
                self.eat('&');
                Token::Op(OpToken::And)
            }
            '|' => {
                self.eat('|');
                Token::Op(OpToken::Or)
            }
            found => {
                return Err(CompileError::UnexpectedChar {
                    position: start,
                    found,
                });
            }
        };

        Ok(Some((token, start)))
    }

    fn peek_is(&mut self, predicate: impl Fn(char) -> bool) -> bool {
        self.chars.peek().is_some_and(|(_, c)| predicate(*c))
    }

    fn eat(&mut self, expected: char) -> bool {
        self.chars.next_if(|(_, c)| *c == expected).is_some()
    }

    fn end_offset(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(offset, _)| *offset)
            .unwrap_or(self.source.len())
    }

    fn number(&mut self, start: usize) -> Result<Token, CompileError> {
        while self
            .chars
            .next_if(|(_, c)| c.is_ascii_digit() || *c == '.')
            .is_some()
        {}
        if self.eat('e') || self.eat('E') {
            self.chars.next_if(|(_, c)| *c == '+' || *c == '-');
            while self.chars.next_if(|(_, c)| c.is_ascii_digit()).is_some() {}
        }

        let text = &self.source[start..self.end_offset()];
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| CompileError::InvalidNumber(text.to_string()))
    }

    fn identifier(&mut self, start: usize) -> Token {
        while self
            .chars
            .next_if(|(_, c)| c.is_alphanumeric() || *c == '_' || *c == '.')
            .is_some()
        {}
        Token::Ident(self.source[start..self.end_offset()].to_string())
    }

    fn string(&mut self, start: usize, quote: char) -> Result<Token, CompileError> {
        let mut value = String::new();
        loop {
            match self.chars.next() {
                None => return Err(CompileError::UnterminatedString(start)),
                Some((_, c)) if c == quote => return Ok(Token::Str(value)),
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, escaped)) => value.push(escaped),
                    None => return Err(CompileError::UnterminatedString(start)),
                },
                Some((_, c)) => value.push(c),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<(Token, usize)>,
    cursor: usize,
    depth: usize,
    operators: usize,
    variable: Option<String>,
}

impl Parser {
    fn new(tokens: Vec<(Token, usize)>) -> Self {
        Self {
            tokens,
            cursor: 0,
            depth: 0,
            operators: 0,
            variable: None,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|(token, _)| token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.cursor + offset).map(|(token, _)| token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).map(|(token, _)| token.clone());
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn unexpected(&self, expected: &'static str) -> CompileError {
        match self.tokens.get(self.cursor) {
            Some((token, position)) => CompileError::UnexpectedToken {
                position: *position,
                found: token.describe(),
                expected,
            },
            None => CompileError::UnexpectedEnd(expected),
        }
    }

    fn expect(&mut self, expected: Token, description: &'static str) -> Result<(), CompileError> {
        if self.peek() == Some(&expected) {
            self.cursor += 1;
            Ok(())
        } else {
            Err(self.unexpected(description))
        }
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(CompileError::TooDeep);
        }
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn count_operator(&mut self) -> Result<(), CompileError> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(CompileError::TooLarge);
        }
        Ok(())
    }

    fn parse_condition(&mut self) -> Result<Expr, CompileError> {
        self.parse_prefix()?;

        let expr = match self.peek().and_then(Token::op) {
            Some(OpToken::Binary(op)) if op.is_comparison() => {
                self.cursor += 1;
                self.count_operator()?;
                let rhs = self.parse_sum()?;
                let partial = Expr::Binary(op, Box::new(Expr::Input), Box::new(rhs));
                let conjunction = self.parse_and_rest(partial)?;
                self.parse_or_rest(conjunction)?
            }
            _ => self.parse_or()?,
        };

        if self.peek().is_some() {
            return Err(self.unexpected("end of condition"));
        }
        Ok(expr)
    }

    /// Strip `~` and `function(v)` / `\(v)` prefixes, binding `v` if given.
    fn parse_prefix(&mut self) -> Result<(), CompileError> {
        if self.peek() == Some(&Token::Tilde) {
            self.cursor += 1;
            return Ok(());
        }

        let is_lambda = match self.peek() {
            Some(Token::Ident(word)) if word == "function" => true,
            Some(Token::Backslash) => true,
            _ => false,
        };
        if !is_lambda || self.peek_at(1) != Some(&Token::LParen) {
            return Ok(());
        }

        self.cursor += 2;
        let name = match self.peek() {
            Some(Token::Ident(name)) => name.clone(),
            _ => return Err(self.unexpected("parameter name")),
        };
        self.cursor += 1;
        self.variable = Some(name);
        self.expect(Token::RParen, "')' after parameter")
    }

    fn parse_or(&mut self) -> Result<Expr, CompileError> {
        let first = self.parse_and()?;
        self.parse_or_rest(first)
    }

    fn parse_or_rest(&mut self, mut lhs: Expr) -> Result<Expr, CompileError> {
        while self.peek().and_then(Token::op) == Some(OpToken::Or) {
            self.cursor += 1;
            self.count_operator()?;
            let rhs = self.parse_and()?;
            lhs = Expr::Logical(LogicalOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, CompileError> {
        let first = self.parse_not()?;
        self.parse_and_rest(first)
    }

    fn parse_and_rest(&mut self, mut lhs: Expr) -> Result<Expr, CompileError> {
        while self.peek().and_then(Token::op) == Some(OpToken::And) {
            self.cursor += 1;
            self.count_operator()?;
            let rhs = self.parse_not()?;
            lhs = Expr::Logical(LogicalOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, CompileError> {
        if self.peek().and_then(Token::op) == Some(OpToken::Not) {
            self.cursor += 1;
            self.count_operator()?;
            let operand = self.nested(Self::parse_not)?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, CompileError> {
        let lhs = self.parse_sum()?;
        match self.peek().and_then(Token::op) {
            Some(OpToken::Binary(op)) if op.is_comparison() => {
                self.cursor += 1;
                self.count_operator()?;
                let rhs = self.parse_sum()?;
                Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
            }
            _ => Ok(lhs),
        }
    }

    fn parse_sum(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_term()?;
        while let Some(OpToken::Binary(op @ (BinaryOp::Add | BinaryOp::Sub))) =
            self.peek().and_then(Token::op)
        {
            self.cursor += 1;
            self.count_operator()?;
            let rhs = self.parse_term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_unary()?;
        while let Some(OpToken::Binary(op @ (BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem))) =
            self.peek().and_then(Token::op)
        {
            self.cursor += 1;
            self.count_operator()?;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        match self.peek().and_then(Token::op) {
            Some(OpToken::Binary(BinaryOp::Sub)) => {
                self.cursor += 1;
                self.count_operator()?;
                let operand = self.nested(Self::parse_unary)?;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)))
            }
            Some(OpToken::Binary(BinaryOp::Add)) => {
                self.cursor += 1;
                self.nested(Self::parse_unary)
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let Some(token) = self.advance() else {
            return Err(CompileError::UnexpectedEnd("a value"));
        };

        match token {
            Token::Number(n) => Ok(Expr::Literal(MetricValue::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(MetricValue::Text(s))),
            Token::LParen => {
                let inner = self.nested(Self::parse_or)?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::Ident(name) if self.peek() == Some(&Token::LParen) => self.parse_call(name),
            Token::Ident(name) => self.resolve_identifier(name),
            _ => {
                self.cursor -= 1;
                Err(self.unexpected("a value"))
            }
        }
    }

    fn parse_call(&mut self, name: String) -> Result<Expr, CompileError> {
        let function = Function::lookup(&name).ok_or(CompileError::UnknownFunction(name))?;
        self.expect(Token::LParen, "'('")?;

        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.nested(Self::parse_or)?);
                if self.peek() == Some(&Token::Comma) {
                    self.cursor += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen, "')' to close call")?;

        if args.len() != function.arity() {
            return Err(CompileError::WrongArity {
                function: function.name(),
                expected: function.arity(),
                found: args.len(),
            });
        }
        Ok(Expr::Call(function, args))
    }

    fn resolve_identifier(&self, name: String) -> Result<Expr, CompileError> {
        match name.as_str() {
            "TRUE" | "true" => return Ok(Expr::Literal(MetricValue::Bool(true))),
            "FALSE" | "false" => return Ok(Expr::Literal(MetricValue::Bool(false))),
            "NA" | "null" => return Ok(Expr::Literal(MetricValue::Missing)),
            _ => {}
        }

        let is_input = match &self.variable {
            Some(bound) => *bound == name,
            None => DEFAULT_VARIABLES.contains(&name.as_str()),
        };
        if is_input {
            Ok(Expr::Input)
        } else {
            Err(CompileError::UnknownIdentifier(name))
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

pub(crate) fn kind_name(value: &MetricValue) -> &'static str {
    match value {
        MetricValue::Number(_) => "number",
        MetricValue::Bool(_) => "logical",
        MetricValue::Text(_) => "text",
        MetricValue::Missing => "NA",
    }
}

fn eval(
    expr: &Expr,
    input: &MetricValue,
    budget: &mut Budget,
) -> Result<MetricValue, EvaluationFailure> {
    budget.charge()?;

    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Input => Ok(input.clone()),
        Expr::Unary(UnaryOp::Neg, operand) => {
            let value = eval(operand, input, budget)?;
            Ok(numeric(&value, "-")?
                .map(|n| MetricValue::Number(-n))
                .unwrap_or_default())
        }
        Expr::Unary(UnaryOp::Not, operand) => {
            let value = eval(operand, input, budget)?;
            Ok(truth(&value, "!")?
                .map(|b| MetricValue::Bool(!b))
                .unwrap_or_default())
        }
        Expr::Binary(op, lhs, rhs) => {
            let lhs = eval(lhs, input, budget)?;
            let rhs = eval(rhs, input, budget)?;
            apply_binary(*op, &lhs, &rhs)
        }
        Expr::Logical(op, lhs, rhs) => {
            let symbol = match op {
                LogicalOp::And => "&&",
                LogicalOp::Or => "||",
            };
            let short_circuit = matches!(op, LogicalOp::Or);
            let left = truth(&eval(lhs, input, budget)?, symbol)?;
            if left == Some(short_circuit) {
                return Ok(MetricValue::Bool(short_circuit));
            }
            let right = truth(&eval(rhs, input, budget)?, symbol)?;
            Ok(match (left, right) {
                (_, Some(value)) if value == short_circuit => MetricValue::Bool(short_circuit),
                (Some(_), Some(_)) => MetricValue::Bool(!short_circuit),
                _ => MetricValue::Missing,
            })
        }
        Expr::Call(function, args) => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, input, budget)?);
            }
            apply_function(*function, &values)
        }
    }
}

/// Numeric view of a value: logicals coerce to 1/0, NA stays `None`.
fn numeric(value: &MetricValue, operation: &'static str) -> Result<Option<f64>, EvaluationFailure> {
    match value {
        MetricValue::Number(n) => Ok(Some(*n)),
        MetricValue::Bool(b) => Ok(Some(if *b { 1.0 } else { 0.0 })),
        MetricValue::Missing => Ok(None),
        MetricValue::Text(_) => Err(EvaluationFailure::TypeMismatch {
            operation,
            operand: "text",
        }),
    }
}

/// Logical view of a value: numbers are true when non-zero, NA stays `None`.
fn truth(value: &MetricValue, operation: &'static str) -> Result<Option<bool>, EvaluationFailure> {
    match value {
        MetricValue::Bool(b) => Ok(Some(*b)),
        MetricValue::Number(n) if n.is_nan() => Ok(None),
        MetricValue::Number(n) => Ok(Some(*n != 0.0)),
        MetricValue::Missing => Ok(None),
        MetricValue::Text(_) => Err(EvaluationFailure::TypeMismatch {
            operation,
            operand: "text",
        }),
    }
}

fn apply_binary(
    op: BinaryOp,
    lhs: &MetricValue,
    rhs: &MetricValue,
) -> Result<MetricValue, EvaluationFailure> {
    if op.is_comparison() {
        return compare(op, lhs, rhs);
    }

    let (Some(a), Some(b)) = (numeric(lhs, op.symbol())?, numeric(rhs, op.symbol())?) else {
        return Ok(MetricValue::Missing);
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Rem if b == 0.0 => {
            return Err(EvaluationFailure::DivisionByZero);
        }
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        _ => unreachable!("comparison operators handled above"),
    };
    Ok(MetricValue::Number(result))
}

fn compare(
    op: BinaryOp,
    lhs: &MetricValue,
    rhs: &MetricValue,
) -> Result<MetricValue, EvaluationFailure> {
    let ordering = match (lhs, rhs) {
        (MetricValue::Missing, _) | (_, MetricValue::Missing) => return Ok(MetricValue::Missing),
        (MetricValue::Text(a), MetricValue::Text(b)) => Some(a.cmp(b)),
        (MetricValue::Text(_), _) | (_, MetricValue::Text(_)) => {
            return Err(EvaluationFailure::TypeMismatch {
                operation: op.symbol(),
                operand: "text and non-text",
            });
        }
        _ => {
            let a = numeric(lhs, op.symbol())?.unwrap_or(f64::NAN);
            let b = numeric(rhs, op.symbol())?.unwrap_or(f64::NAN);
            a.partial_cmp(&b)
        }
    };

    let Some(ordering) = ordering else {
        return Ok(MetricValue::Missing);
    };
    let result = match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::Ne => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        _ => unreachable!("arithmetic operators handled by apply_binary"),
    };
    Ok(MetricValue::Bool(result))
}

fn apply_function(
    function: Function,
    args: &[MetricValue],
) -> Result<MetricValue, EvaluationFailure> {
    match (function, args) {
        (Function::IsNa, [value]) => Ok(MetricValue::Bool(
            value.is_missing() || matches!(value, MetricValue::Number(n) if n.is_nan()),
        )),
        (Function::Abs, [value]) => Ok(numeric(value, "abs")?
            .map(|n| MetricValue::Number(n.abs()))
            .unwrap_or_default()),
        (Function::Min | Function::Max, [a, b]) => {
            let name = function.name();
            let (Some(a), Some(b)) = (numeric(a, name)?, numeric(b, name)?) else {
                return Ok(MetricValue::Missing);
            };
            let result = if function == Function::Min {
                a.min(b)
            } else {
                a.max(b)
            };
            Ok(MetricValue::Number(result))
        }
        _ => unreachable!("arity is checked at compile time"),
    }
}
