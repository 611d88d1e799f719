//! Minimal boolean condition evaluation.
//!
//! Loop conditions are authored as small boolean expressions over loop
//! variables and form state (`values.shouldContinue === false`,
//! `{{index}} < 10 && {{hasMore}}`). The evaluator is deliberately not a
//! general-purpose expression language: literals, dotted identifier paths,
//! equality and ordering comparisons, `&& || !` and parentheses. It is
//! sandboxed (no host eval) and every failure is an `Err` that the resolver
//! downgrades to `false`.

use serde_json::Value;

use crate::error::{FormloopError, Result};

/// Name resolution for condition expressions. Implemented by the execution
/// context; tests supply table-backed implementations.
pub trait VariableBindings {
    /// Resolve a (possibly dotted) identifier path to a value.
    fn resolve(&self, path: &str) -> Option<Value>;
}

/// Pluggable condition-evaluator capability.
pub trait ConditionEvaluator: Send + Sync {
    /// Evaluate `expression` to a boolean against `bindings`.
    fn evaluate(&self, expression: &str, bindings: &dyn VariableBindings) -> Result<bool>;
}

/// Default evaluator: tokenizer plus recursive-descent parser, evaluating
/// as it parses.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicConditionEvaluator;

impl ConditionEvaluator for BasicConditionEvaluator {
    fn evaluate(&self, expression: &str, bindings: &dyn VariableBindings) -> Result<bool> {
        let tokens = tokenize(expression)?;
        let mut parser = Parser {
            tokens,
            position: 0,
            bindings,
        };
        let value = parser.parse_or()?;
        parser.expect_end()?;
        Ok(truthy(&value))
    }
}

/// JavaScript-style truthiness, matching how authors read conditions.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    True,
    False,
    Null,
    LParen,
    RParen,
    Not,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn err(message: impl Into<String>) -> FormloopError {
    FormloopError::Condition(message.into())
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::And);
                    i += 2;
                } else {
                    return Err(err("expected '&&'"));
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::Or);
                    i += 2;
                } else {
                    return Err(err("expected '||'"));
                }
            }
            '=' => {
                // Accepts both the strict and loose spellings; they
                // evaluate identically here.
                if chars.get(i + 1) != Some(&'=') {
                    return Err(err("expected '==' or '==='"));
                }
                i += 2;
                if chars.get(i) == Some(&'=') {
                    i += 1;
                }
                tokens.push(Token::Eq);
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    i += 2;
                    if chars.get(i) == Some(&'=') {
                        i += 1;
                    }
                    tokens.push(Token::Ne);
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&'\\') => {
                            match chars.get(i + 1) {
                                Some(&escaped) => {
                                    s.push(escaped);
                                    i += 2;
                                }
                                None => return Err(err("unterminated escape")),
                            }
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                        None => return Err(err("unterminated string literal")),
                    }
                }
                tokens.push(Token::Str(s));
            }
            '-' | '0'..='9' => {
                let start = i;
                i += 1;
                while chars.get(i).is_some_and(|ch| ch.is_ascii_digit() || *ch == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n: f64 = text.parse().map_err(|_| err(format!("bad number: {}", text)))?;
                tokens.push(Token::Number(n));
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                i += 1;
                while chars
                    .get(i)
                    .is_some_and(|ch| ch.is_ascii_alphanumeric() || *ch == '_' || *ch == '.')
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(match text.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" | "undefined" => Token::Null,
                    _ => Token::Ident(text),
                });
            }
            _ => return Err(err(format!("unexpected character: {:?}", c))),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    position: usize,
    bindings: &'a dyn VariableBindings,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn expect_end(&self) -> Result<()> {
        if self.position == self.tokens.len() {
            Ok(())
        } else {
            Err(err("trailing tokens after expression"))
        }
    }

    fn parse_or(&mut self) -> Result<Value> {
        let mut value = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let rhs = self.parse_and()?;
            value = Value::Bool(truthy(&value) || truthy(&rhs));
        }
        Ok(value)
    }

    fn parse_and(&mut self) -> Result<Value> {
        let mut value = self.parse_comparison()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let rhs = self.parse_comparison()?;
            value = Value::Bool(truthy(&value) && truthy(&rhs));
        }
        Ok(value)
    }

    fn parse_comparison(&mut self) -> Result<Value> {
        let lhs = self.parse_unary()?;
        let op = match self.peek() {
            Some(Token::Eq) => Token::Eq,
            Some(Token::Ne) => Token::Ne,
            Some(Token::Lt) => Token::Lt,
            Some(Token::Le) => Token::Le,
            Some(Token::Gt) => Token::Gt,
            Some(Token::Ge) => Token::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_unary()?;
        let result = match op {
            Token::Eq => values_equal(&lhs, &rhs),
            Token::Ne => !values_equal(&lhs, &rhs),
            Token::Lt => compare(&lhs, &rhs)?.is_lt(),
            Token::Le => compare(&lhs, &rhs)?.is_le(),
            Token::Gt => compare(&lhs, &rhs)?.is_gt(),
            Token::Ge => compare(&lhs, &rhs)?.is_ge(),
            _ => unreachable!(),
        };
        Ok(Value::Bool(result))
    }

    fn parse_unary(&mut self) -> Result<Value> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let value = self.parse_unary()?;
            return Ok(Value::Bool(!truthy(&value)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Value> {
        match self.advance() {
            Some(Token::True) => Ok(Value::Bool(true)),
            Some(Token::False) => Ok(Value::Bool(false)),
            Some(Token::Null) => Ok(Value::Null),
            Some(Token::Number(n)) => {
                serde_json::Number::from_f64(n)
                    .map(Value::Number)
                    .ok_or_else(|| err("non-finite number"))
            }
            Some(Token::Str(s)) => Ok(Value::String(s)),
            // An unresolved name evaluates to null, so conditions over
            // not-yet-set variables read false instead of failing.
            Some(Token::Ident(path)) => Ok(self.bindings.resolve(&path).unwrap_or(Value::Null)),
            Some(Token::LParen) => {
                let value = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(err("expected ')'")),
                }
            }
            other => Err(err(format!("unexpected token: {:?}", other))),
        }
    }
}

/// Equality with numeric coercion: `1` and `1.0` are equal.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Ordering for numbers and strings; anything else is an evaluation error.
fn compare(a: &Value, b: &Value) -> Result<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => {
            let (x, y) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            x.partial_cmp(&y).ok_or_else(|| err("incomparable numbers"))
        }
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        _ => Err(err(format!("cannot order {:?} and {:?}", a, b))),
    }
}
