//! Condition Evaluator (§4.2): a minimal predicate language over dotted
//! paths into the serialized `PipelineState` tree. No function calls, no
//! arithmetic — recognizer + recursive-descent parser + tree-walking
//! evaluator, kept deliberately small rather than pulling in a general
//! expression-parser crate, matching the narrow-grammar style of the
//! teacher's own hand-rolled parsers in `internal/pack` and `protocol`.

use serde_json::Value;

use crate::error::ConditionError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    LParen,
    RParen,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    src: &'a str,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.char_indices().peekable(),
            src,
        }
    }

    fn tokenize(mut self) -> Result<Vec<(usize, Token)>, ConditionError> {
        let mut tokens = Vec::new();
        while let Some(&(pos, ch)) = self.chars.peek() {
            if ch.is_whitespace() {
                self.chars.next();
                continue;
            }
            match ch {
                '(' => {
                    self.chars.next();
                    tokens.push((pos, Token::LParen));
                }
                ')' => {
                    self.chars.next();
                    tokens.push((pos, Token::RParen));
                }
                '!' => {
                    self.chars.next();
                    if let Some(&(_, '=')) = self.chars.peek() {
                        self.chars.next();
                        tokens.push((pos, Token::Ne));
                    } else {
                        tokens.push((pos, Token::Not));
                    }
                }
                '=' => {
                    self.chars.next();
                    match self.chars.next() {
                        Some((_, '=')) => tokens.push((pos, Token::Eq)),
                        _ => {
                            return Err(ConditionError::Syntax {
                                position: pos,
                                message: "expected `==`".to_string(),
                            });
                        }
                    }
                }
                '<' => {
                    self.chars.next();
                    if let Some(&(_, '=')) = self.chars.peek() {
                        self.chars.next();
                        tokens.push((pos, Token::Le));
                    } else {
                        tokens.push((pos, Token::Lt));
                    }
                }
                '>' => {
                    self.chars.next();
                    if let Some(&(_, '=')) = self.chars.peek() {
                        self.chars.next();
                        tokens.push((pos, Token::Ge));
                    } else {
                        tokens.push((pos, Token::Gt));
                    }
                }
                '&' => {
                    self.chars.next();
                    match self.chars.next() {
                        Some((_, '&')) => tokens.push((pos, Token::And)),
                        _ => {
                            return Err(ConditionError::Syntax {
                                position: pos,
                                message: "expected `&&`".to_string(),
                            });
                        }
                    }
                }
                '|' => {
                    self.chars.next();
                    match self.chars.next() {
                        Some((_, '|')) => tokens.push((pos, Token::Or)),
                        _ => {
                            return Err(ConditionError::Syntax {
                                position: pos,
                                message: "expected `||`".to_string(),
                            });
                        }
                    }
                }
                '\'' | '"' => {
                    let quote = ch;
                    self.chars.next();
                    let mut s = String::new();
                    loop {
                        match self.chars.next() {
                            Some((_, c)) if c == quote => break,
                            Some((_, c)) => s.push(c),
                            None => {
                                return Err(ConditionError::Syntax {
                                    position: pos,
                                    message: "unterminated string literal".to_string(),
                                });
                            }
                        }
                    }
                    tokens.push((pos, Token::Str(s)));
                }
                c if c.is_ascii_digit() || (c == '-' && self.peek_is_digit_after_minus()) => {
                    let start = pos;
                    let mut end = pos + c.len_utf8();
                    self.chars.next();
                    while let Some(&(p, c)) = self.chars.peek() {
                        if c.is_ascii_digit() || c == '.' {
                            end = p + c.len_utf8();
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    let text = &self.src[start..end];
                    let num: f64 = text.parse().map_err(|_| ConditionError::Syntax {
                        position: start,
                        message: format!("invalid number literal `{text}`"),
                    })?;
                    tokens.push((start, Token::Num(num)));
                }
                c if c.is_alphabetic() || c == '_' => {
                    let start = pos;
                    let mut end = pos + c.len_utf8();
                    self.chars.next();
                    while let Some(&(p, c)) = self.chars.peek() {
                        if c.is_alphanumeric() || c == '_' || c == '.' {
                            end = p + c.len_utf8();
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    let word = &self.src[start..end];
                    let tok = match word {
                        "true" => Token::Bool(true),
                        "false" => Token::Bool(false),
                        "null" => Token::Null,
                        _ => Token::Ident(word.to_string()),
                    };
                    tokens.push((start, tok));
                }
                other => {
                    return Err(ConditionError::Syntax {
                        position: pos,
                        message: format!("unexpected character `{other}`"),
                    });
                }
            }
        }
        Ok(tokens)
    }

    fn peek_is_digit_after_minus(&mut self) -> bool {
        // Lookahead past the '-' itself: only treat it as a numeric sign
        // when immediately followed by a digit; otherwise it's unexpected.
        let mut clone = self.chars.clone();
        clone.next();
        matches!(clone.peek(), Some((_, c)) if c.is_ascii_digit())
    }
}

/// Parsed condition AST, pinned by §4.2's precedence table:
/// parens > unary `!` > non-associative relational > `&&` > `||`.
#[derive(Debug, Clone)]
enum Expr {
    Path(Vec<String>),
    Lit(Value),
    Not(Box<Expr>),
    Rel(Box<Expr>, RelOp, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy)]
enum RelOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<(usize, Token)>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn peek_position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(p, _)| *p)
            .unwrap_or_else(|| self.tokens.last().map(|(p, _)| *p + 1).unwrap_or(0))
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ConditionError> {
        match self.advance() {
            Some(t) if &t == expected => Ok(()),
            _ => Err(ConditionError::Syntax {
                position: self.peek_position(),
                message: format!("expected {expected:?}"),
            }),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ConditionError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_relational()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    /// Relational operators are non-associative: chaining them
    /// (`a == b == c`) is a parse error (§4.2 precedence note).
    fn parse_relational(&mut self) -> Result<Expr, ConditionError> {
        let left = self.parse_unary()?;
        let op = match self.peek() {
            Some(Token::Eq) => Some(RelOp::Eq),
            Some(Token::Ne) => Some(RelOp::Ne),
            Some(Token::Lt) => Some(RelOp::Lt),
            Some(Token::Le) => Some(RelOp::Le),
            Some(Token::Gt) => Some(RelOp::Gt),
            Some(Token::Ge) => Some(RelOp::Ge),
            _ => None,
        };
        let Some(op) = op else { return Ok(left) };
        self.advance();
        let right = self.parse_unary()?;
        if matches!(
            self.peek(),
            Some(Token::Eq | Token::Ne | Token::Lt | Token::Le | Token::Gt | Token::Ge)
        ) {
            return Err(ConditionError::ChainedRelational(
                "relational operators do not chain".to_string(),
            ));
        }
        Ok(Expr::Rel(Box::new(left), op, Box::new(right)))
    }

    fn parse_unary(&mut self) -> Result<Expr, ConditionError> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ConditionError> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                Ok(Expr::Path(name.split('.').map(String::from).collect()))
            }
            Some(Token::Str(s)) => Ok(Expr::Lit(Value::String(s))),
            Some(Token::Num(n)) => Ok(Expr::Lit(
                serde_json::Number::from_f64(n)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            )),
            Some(Token::Bool(b)) => Ok(Expr::Lit(Value::Bool(b))),
            Some(Token::Null) => Ok(Expr::Lit(Value::Null)),
            other => Err(ConditionError::Syntax {
                position: self.peek_position(),
                message: format!("unexpected token {other:?}"),
            }),
        }
    }
}

fn parse(expr: &str) -> Result<Expr, ConditionError> {
    let tokens = Lexer::new(expr).tokenize()?;
    let mut parser = Parser::new(tokens);
    let ast = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(ConditionError::Syntax {
            position: parser.peek_position(),
            message: "trailing tokens after expression".to_string(),
        });
    }
    Ok(ast)
}

/// Resolve a dotted path through the state tree. A path through a `null`
/// or absent key yields `null` (§4.2) — callers that need the "stage not
/// yet reached" hard-error distinction check that separately via
/// [`known_stage_names`] before calling this.
fn resolve_path<'a>(root: &'a Value, path: &[String]) -> &'a Value {
    let mut cursor = root;
    for segment in path {
        cursor = match cursor {
            Value::Object(map) => map.get(segment).unwrap_or(&Value::Null),
            // `stages` serializes as a JSON array (`PipelineState::stages:
            // Vec<StageExecution>`, §7 wire format), so a path segment right
            // after it names a `stageName`, not an array index.
            Value::Array(items) => items
                .iter()
                .find(|item| item.get("stageName").and_then(Value::as_str) == Some(segment.as_str()))
                .unwrap_or(&Value::Null),
            _ => return &Value::Null,
        };
    }
    cursor
}

fn eval_expr(expr: &Expr, state: &Value, known_stages: &[String]) -> Result<Value, ConditionError> {
    match expr {
        Expr::Lit(v) => Ok(v.clone()),
        Expr::Path(segments) => {
            // "Undefined identifiers for yet-unrun stages evaluate to null,
            // otherwise a hard ConditionEvalError" (§4.2): the only case
            // that earns the hard error is `stages.<name>.*` where `<name>`
            // is not among the stages this one may assume already ran.
            if segments.first().map(String::as_str) == Some("stages")
                && let Some(stage_name) = segments.get(1)
                && !known_stages.iter().any(|n| n == stage_name)
            {
                return Err(ConditionError::Eval {
                    path: segments.join("."),
                });
            }
            Ok(resolve_path(state, segments).clone())
        }
        Expr::Not(inner) => {
            let v = eval_expr(inner, state, known_stages)?;
            Ok(Value::Bool(!truthy(&v)))
        }
        Expr::And(l, r) => {
            let lv = eval_expr(l, state, known_stages)?;
            if !truthy(&lv) {
                return Ok(Value::Bool(false));
            }
            let rv = eval_expr(r, state, known_stages)?;
            Ok(Value::Bool(truthy(&rv)))
        }
        Expr::Or(l, r) => {
            let lv = eval_expr(l, state, known_stages)?;
            if truthy(&lv) {
                return Ok(Value::Bool(true));
            }
            let rv = eval_expr(r, state, known_stages)?;
            Ok(Value::Bool(truthy(&rv)))
        }
        Expr::Rel(l, op, r) => {
            let lv = eval_expr(l, state, known_stages)?;
            let rv = eval_expr(r, state, known_stages)?;
            Ok(Value::Bool(compare(&lv, *op, &rv)))
        }
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn compare(lhs: &Value, op: RelOp, rhs: &Value) -> bool {
    match op {
        RelOp::Eq => lhs == rhs,
        RelOp::Ne => lhs != rhs,
        _ => {
            let (Some(l), Some(r)) = (as_f64(lhs), as_f64(rhs)) else {
                return false;
            };
            match op {
                RelOp::Lt => l < r,
                RelOp::Le => l <= r,
                RelOp::Gt => l > r,
                RelOp::Ge => l >= r,
                RelOp::Eq | RelOp::Ne => unreachable!(),
            }
        }
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Evaluate a condition expression against the given state tree (§4.2
/// `evaluate(expr, state) -> boolean`). `known_stages` lists the stages
/// this condition's owning stage may assume have already executed (its
/// transitive `dependsOn` closure, per §5 "ordering guarantees") — a path
/// into any other stage is a hard [`ConditionError::Eval`].
pub fn evaluate(
    expr: &str,
    state: &Value,
    known_stages: &[String],
) -> Result<bool, ConditionError> {
    let ast = parse(expr)?;
    let result = eval_expr(&ast, state, known_stages)?;
    Ok(truthy(&result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> Value {
        json!({
            "stages": [
                { "stageName": "a", "status": "success", "extractedData": { "score": 0.82 } },
                { "stageName": "b", "status": "skipped" }
            ],
            "trigger": { "kind": "manual" },
            "artifacts": { "changedFiles": ["x.rs"] }
        })
    }

    #[test]
    fn resolves_dotted_path_and_compares_numbers() {
        let s = state();
        assert!(
            evaluate(
                "stages.a.extractedData.score > 0.5",
                &s,
                &["a".to_string()]
            )
            .unwrap()
        );
        assert!(
            !evaluate(
                "stages.a.extractedData.score > 0.9",
                &s,
                &["a".to_string()]
            )
            .unwrap()
        );
    }

    #[test]
    fn string_equality_and_boolean_ops() {
        let s = state();
        assert!(
            evaluate(
                "stages.a.status == 'success' && stages.b.status == 'skipped'",
                &s,
                &["a".to_string(), "b".to_string()]
            )
            .unwrap()
        );
    }

    #[test]
    fn negation_and_parens() {
        let s = state();
        assert!(
            evaluate(
                "!(stages.a.status == 'failed')",
                &s,
                &["a".to_string()]
            )
            .unwrap()
        );
    }

    #[test]
    fn missing_path_through_null_resolves_to_null_not_error() {
        let s = state();
        assert!(
            !evaluate(
                "stages.a.extractedData.missing_key == 'x'",
                &s,
                &["a".to_string()]
            )
            .unwrap()
        );
    }

    #[test]
    fn unreached_stage_is_a_hard_eval_error() {
        let s = state();
        let err = evaluate("stages.never_ran.status == 'success'", &s, &["a".to_string()])
            .unwrap_err();
        assert!(matches!(err, ConditionError::Eval { .. }));
    }

    #[test]
    fn chained_relational_operators_are_a_parse_error() {
        let s = state();
        let err = evaluate("1 == 1 == 1", &s, &[]).unwrap_err();
        assert!(matches!(err, ConditionError::ChainedRelational(_)));
    }

    #[test]
    fn syntax_error_on_malformed_expression() {
        let s = state();
        let err = evaluate("stages.a.status ===", &s, &["a".to_string()]).unwrap_err();
        assert!(matches!(err, ConditionError::Syntax { .. }));
    }

    #[test]
    fn precedence_and_binds_tighter_than_or() {
        // false || (true && false) == false
        let s = json!({});
        assert!(!evaluate("false || (true && false)", &s, &[]).unwrap());
        assert!(evaluate("false || true && true", &s, &[]).unwrap());
    }
}
