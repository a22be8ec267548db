//! Tokenizer and parser for letter and numeric formulas.
//!
//! # Design
//! - One grammar serves both dialects: `expr := term ("or" term)*`,
//!   `term := factor ("and" factor)*`, `factor := operand | "(" expr ")"`.
//! - Operands keep their byte spans so rewrite passes can substitute them in
//!   place and leave whitespace and parentheses untouched.

use std::fmt;
use std::ops::Range;

use rowsync_model::RowId;

use crate::error::{FormulaError, FormulaResult};

/// Formula operand.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operand {
    /// Client-facing letter label such as `A` or `AB`.
    Letter(String),
    /// Stored condition reference written as `{id}`.
    Id(RowId),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Letter(letter) => f.write_str(letter),
            Self::Id(id) => write!(f, "{{{id}}}"),
        }
    }
}

/// Occurrence of an operand in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constant {
    /// Operand value.
    pub operand: Operand,
    /// Byte span in the source.
    pub span: Range<usize>,
}

/// Parsed boolean expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Single operand.
    Operand(Operand),
    /// Conjunction of two or more terms.
    And(Vec<Self>),
    /// Disjunction of two or more terms.
    Or(Vec<Self>),
}

/// Parsed formula with its source text and operand occurrences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formula {
    source: String,
    expr: Expr,
    constants: Vec<Constant>,
}

impl Formula {
    /// Source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Expression tree.
    #[must_use]
    pub const fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Every operand occurrence in source order.
    #[must_use]
    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    /// Distinct operands in order of first appearance.
    #[must_use]
    pub fn distinct_operands(&self) -> Vec<&Operand> {
        let mut seen = Vec::new();
        for constant in &self.constants {
            if !seen.contains(&&constant.operand) {
                seen.push(&constant.operand);
            }
        }
        seen
    }

    /// Distinct letters in order of first appearance.
    #[must_use]
    pub fn letters(&self) -> Vec<&str> {
        self.distinct_operands()
            .into_iter()
            .filter_map(|operand| match operand {
                Operand::Letter(letter) => Some(letter.as_str()),
                Operand::Id(_) => None,
            })
            .collect()
    }

    /// Distinct identifiers in order of first appearance.
    #[must_use]
    pub fn ids(&self) -> Vec<RowId> {
        self.distinct_operands()
            .into_iter()
            .filter_map(|operand| match operand {
                Operand::Id(id) => Some(*id),
                Operand::Letter(_) => None,
            })
            .collect()
    }

    /// Copy of the source with every operand replaced by `substitute`.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `substitute`.
    pub fn substitute(
        &self,
        mut substitute: impl FnMut(&Operand) -> FormulaResult<String>,
    ) -> FormulaResult<String> {
        let mut out = String::with_capacity(self.source.len());
        let mut cursor = 0;
        for constant in &self.constants {
            out.push_str(&self.source[cursor..constant.span.start]);
            out.push_str(&substitute(&constant.operand)?);
            cursor = constant.span.end;
        }
        out.push_str(&self.source[cursor..]);
        Ok(out)
    }
}

/// Parse a letter formula such as `A and (B or C)`.
///
/// # Errors
///
/// Returns [`FormulaError::EmptyFormula`] for blank input and
/// [`FormulaError::MalformedFormula`] for anything else that does not parse,
/// including `{id}` references.
pub fn parse(source: &str) -> FormulaResult<Formula> {
    parse_dialect(source, Dialect::Letters)
}

/// Parse a stored formula such as `{12} and ({13} or {14})`.
///
/// # Errors
///
/// Returns [`FormulaError::EmptyFormula`] for blank input and
/// [`FormulaError::MalformedFormula`] for anything else that does not parse,
/// including letter operands.
pub fn parse_numeric(source: &str) -> FormulaResult<Formula> {
    parse_dialect(source, Dialect::Ids)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Letters,
    Ids,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Operand(Operand),
    And,
    Or,
    Open,
    Close,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    span: Range<usize>,
}

fn parse_dialect(source: &str, dialect: Dialect) -> FormulaResult<Formula> {
    if source.trim().is_empty() {
        return Err(FormulaError::EmptyFormula);
    }
    let tokens = tokenize(source, dialect)?;
    let mut parser = Parser {
        source,
        tokens,
        cursor: 0,
        constants: Vec::new(),
    };
    let expr = parser.expr()?;
    if parser.cursor < parser.tokens.len() {
        return Err(parser.error_here());
    }
    Ok(Formula {
        source: source.to_owned(),
        expr,
        constants: parser.constants,
    })
}

fn tokenize(source: &str, dialect: Dialect) -> FormulaResult<Vec<Token>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut index = 0;
    while index < bytes.len() {
        let start = index;
        let kind = match bytes[index] {
            b' ' | b'\t' | b'\n' | b'\r' => {
                index += 1;
                continue;
            }
            b'(' => {
                index += 1;
                TokenKind::Open
            }
            b')' => {
                index += 1;
                TokenKind::Close
            }
            b'{' if dialect == Dialect::Ids => {
                index += 1;
                while index < bytes.len() && bytes[index].is_ascii_digit() {
                    index += 1;
                }
                if index == start + 1 || index >= bytes.len() || bytes[index] != b'}' {
                    return Err(malformed(source, start));
                }
                let id = source[start + 1..index]
                    .parse::<i64>()
                    .map_err(|_| malformed(source, start))?;
                index += 1;
                TokenKind::Operand(Operand::Id(RowId::new(id)))
            }
            byte if byte.is_ascii_alphabetic() => {
                while index < bytes.len() && bytes[index].is_ascii_alphabetic() {
                    index += 1;
                }
                match &source[start..index] {
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    word if dialect == Dialect::Letters
                        && word.bytes().all(|b| b.is_ascii_uppercase()) =>
                    {
                        TokenKind::Operand(Operand::Letter(word.to_owned()))
                    }
                    _ => return Err(malformed(source, start)),
                }
            }
            _ => return Err(malformed(source, start)),
        };
        tokens.push(Token {
            kind,
            span: start..index,
        });
    }
    Ok(tokens)
}

fn malformed(source: &str, position: usize) -> FormulaError {
    FormulaError::MalformedFormula {
        position,
        near: source.get(position..).unwrap_or_default().to_owned(),
    }
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    cursor: usize,
    constants: Vec<Constant>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.cursor).map(|token| &token.kind)
    }

    fn error_here(&self) -> FormulaError {
        let position = self
            .tokens
            .get(self.cursor)
            .map_or(self.source.len(), |token| token.span.start);
        malformed(self.source, position)
    }

    fn expr(&mut self) -> FormulaResult<Expr> {
        let mut terms = vec![self.term()?];
        while self.peek() == Some(&TokenKind::Or) {
            self.cursor += 1;
            terms.push(self.term()?);
        }
        Ok(collapse(terms, Expr::Or))
    }

    fn term(&mut self) -> FormulaResult<Expr> {
        let mut factors = vec![self.factor()?];
        while self.peek() == Some(&TokenKind::And) {
            self.cursor += 1;
            factors.push(self.factor()?);
        }
        Ok(collapse(factors, Expr::And))
    }

    fn factor(&mut self) -> FormulaResult<Expr> {
        let Some(token) = self.tokens.get(self.cursor).cloned() else {
            return Err(self.error_here());
        };
        match token.kind {
            TokenKind::Operand(operand) => {
                self.cursor += 1;
                self.constants.push(Constant {
                    operand: operand.clone(),
                    span: token.span,
                });
                Ok(Expr::Operand(operand))
            }
            TokenKind::Open => {
                self.cursor += 1;
                let inner = self.expr()?;
                if self.peek() != Some(&TokenKind::Close) {
                    return Err(self.error_here());
                }
                self.cursor += 1;
                Ok(inner)
            }
            TokenKind::And | TokenKind::Or | TokenKind::Close => Err(self.error_here()),
        }
    }
}

fn collapse(mut items: Vec<Expr>, join: fn(Vec<Expr>) -> Expr) -> Expr {
    if items.len() == 1 {
        items.remove(0)
    } else {
        join(items)
    }
}
