//! Recursive-descent parser for the mapping expression language

use crate::ast::{BinaryOp, Expr};
use crate::lexer::{Token, TokenKind, tokenize};
use crate::{Error, Result};
use serde_json::{Number, Value};

/// Nesting limit guarding the evaluator's recursion
pub const MAX_DEPTH: usize = 128;

/// Parse expression source into an expression tree
///
/// # Errors
///
/// Returns [`Error::Syntax`] with the byte offset of the offending token.
pub fn parse(source: &str) -> Result<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        end: source.len(),
    };

    if parser.tokens.is_empty() {
        return Err(Error::syntax(0, "empty expression"));
    }

    let expr = parser.expression()?;
    if let Some(token) = parser.peek() {
        return Err(Error::syntax(
            token.span.start,
            format!("unexpected token {:?} after end of expression", token.kind),
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn offset(&self) -> usize {
        self.peek().map_or(self.end, |t| t.span.start)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(Error::syntax(self.offset(), format!("expected {what}")))
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(Error::syntax(self.offset(), "expression nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn expression(&mut self) -> Result<Expr> {
        self.enter()?;
        let condition = self.binary(0)?;
        let expr = if self.eat(&TokenKind::Question) {
            let then = self.expression()?;
            let otherwise = if self.eat(&TokenKind::Colon) {
                Some(Box::new(self.expression()?))
            } else {
                None
            };
            Expr::Condition {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise,
            }
        } else {
            condition
        };
        self.leave();
        Ok(expr)
    }

    fn binary_op(&self) -> Option<BinaryOp> {
        let op = match self.peek_kind()? {
            TokenKind::Amp => BinaryOp::Concat,
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Subtract,
            TokenKind::Star => BinaryOp::Multiply,
            TokenKind::Slash => BinaryOp::Divide,
            TokenKind::Percent => BinaryOp::Modulo,
            TokenKind::Eq => BinaryOp::Equal,
            TokenKind::NotEq => BinaryOp::NotEqual,
            TokenKind::Lt => BinaryOp::Less,
            TokenKind::LtEq => BinaryOp::LessEqual,
            TokenKind::Gt => BinaryOp::Greater,
            TokenKind::GtEq => BinaryOp::GreaterEqual,
            TokenKind::Name(name) if name == "and" => BinaryOp::And,
            TokenKind::Name(name) if name == "or" => BinaryOp::Or,
            _ => return None,
        };
        Some(op)
    }

    /// Precedence climbing over left-associative binary operators
    fn binary(&mut self, min_precedence: u8) -> Result<Expr> {
        let mut lhs = self.unary()?;
        // each operator deepens the left spine of the tree
        let mut chained = 0;

        while let Some(op) = self.binary_op() {
            let precedence = op.precedence();
            if precedence <= min_precedence {
                break;
            }
            self.pos += 1;
            self.enter()?;
            chained += 1;
            let rhs = self.binary(precedence)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }

        self.depth -= chained;
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&TokenKind::Minus) {
            self.enter()?;
            let operand = self.unary()?;
            self.leave();
            return Ok(match operand {
                Expr::Literal(Value::Number(n)) => {
                    let negated = -n.as_f64().unwrap_or_default();
                    Expr::Literal(number_value(negated))
                }
                other => Expr::Negate(Box::new(other)),
            });
        }
        self.path()
    }

    /// `step ( '.' step )*`, where each step may carry `[predicate]` suffixes
    fn path(&mut self) -> Result<Expr> {
        let mut steps = vec![self.postfix()?];
        while self.eat(&TokenKind::Dot) {
            steps.push(self.postfix()?);
        }

        if steps.len() == 1 {
            Ok(steps.remove(0))
        } else {
            Ok(Expr::Path(steps))
        }
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        while self.eat(&TokenKind::LBracket) {
            let predicate = self.expression()?;
            self.expect(&TokenKind::RBracket, "']' to close predicate")?;
            expr = Expr::Filter {
                base: Box::new(expr),
                predicate: Box::new(predicate),
            };
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr> {
        let offset = self.offset();
        let Some(token) = self.advance() else {
            return Err(Error::syntax(offset, "unexpected end of expression"));
        };

        match token.kind {
            TokenKind::Str(s) => Ok(Expr::Literal(Value::String(s))),
            TokenKind::Number(n) => Ok(Expr::Literal(number_value(n))),
            TokenKind::Name(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                "and" | "or" => Err(Error::syntax(
                    offset,
                    format!("operator '{name}' is missing its left operand"),
                )),
                _ => Ok(Expr::Field(name)),
            },
            TokenKind::QuotedName(name) => Ok(Expr::Field(name)),
            TokenKind::Variable(name) => self.variable(name, offset),
            TokenKind::LParen => self.block(),
            TokenKind::LBrace => self.object(),
            TokenKind::LBracket => self.array(),
            other => Err(Error::syntax(offset, format!("unexpected token {other:?}"))),
        }
    }

    fn variable(&mut self, name: String, offset: usize) -> Result<Expr> {
        if self.eat(&TokenKind::LParen) {
            if name.is_empty() || name == "$" {
                return Err(Error::syntax(offset, "function name expected after '$'"));
            }
            let args = self.delimited(&TokenKind::RParen, "')' to close argument list")?;
            return Ok(Expr::Call { name, args });
        }

        match name.as_str() {
            "" => Ok(Expr::Context),
            "$" => Ok(Expr::Root),
            other => Err(Error::syntax(
                offset,
                format!("unbound variable ${other}; only $ and $$ may be referenced"),
            )),
        }
    }

    fn block(&mut self) -> Result<Expr> {
        let mut exprs = Vec::new();
        loop {
            exprs.push(self.expression()?);
            if !self.eat(&TokenKind::Semicolon) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "')' to close group")?;
        if exprs.len() == 1 {
            Ok(exprs.remove(0))
        } else {
            Ok(Expr::Block(exprs))
        }
    }

    fn object(&mut self) -> Result<Expr> {
        self.enter()?;
        let mut pairs = Vec::new();
        if !self.eat(&TokenKind::RBrace) {
            loop {
                let key = self.expression()?;
                self.expect(&TokenKind::Colon, "':' after object key")?;
                let value = self.expression()?;
                pairs.push((key, value));

                if self.eat(&TokenKind::Comma) {
                    // trailing comma before the closing brace
                    if self.eat(&TokenKind::RBrace) {
                        break;
                    }
                    continue;
                }
                self.expect(&TokenKind::RBrace, "',' or '}' in object constructor")?;
                break;
            }
        }
        self.leave();
        Ok(Expr::Object(pairs))
    }

    fn array(&mut self) -> Result<Expr> {
        self.enter()?;
        let items = self.delimited(&TokenKind::RBracket, "']' to close array")?;
        self.leave();
        Ok(Expr::Array(items))
    }

    fn delimited(&mut self, close: &TokenKind, what: &str) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(self.expression()?);
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            self.expect(close, what)?;
            return Ok(items);
        }
    }
}

/// Convert a float to a JSON number, keeping integral values as integers
pub(crate) fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        #[allow(clippy::cast_possible_truncation)]
        return Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map_or(Value::Null, Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_object_constructor() {
        let expr = parse(r#"{ "displayName": name, "content": $htmlToMarkdown(html) }"#).unwrap();
        match expr {
            Expr::Object(pairs) => {
                assert_eq!(pairs.len(), 2);
                assert_eq!(pairs[0].0, Expr::Literal(json!("displayName")));
                assert_eq!(pairs[0].1, Expr::Field("name".to_string()));
                assert_eq!(
                    pairs[1].1,
                    Expr::Call {
                        name: "htmlToMarkdown".to_string(),
                        args: vec![Expr::Field("html".to_string())],
                    }
                );
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_path_with_predicate() {
        let expr = parse("payload.headers[name = 'Subject'].value").unwrap();
        match expr {
            Expr::Path(steps) => {
                assert_eq!(steps.len(), 3);
                assert!(matches!(steps[1], Expr::Filter { .. }));
            }
            other => panic!("expected path, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        let expr = parse("a + b * c = d and e").unwrap();
        match expr {
            Expr::Binary { op, lhs, .. } => {
                assert_eq!(op, BinaryOp::And);
                match *lhs {
                    Expr::Binary { op, lhs, .. } => {
                        assert_eq!(op, BinaryOp::Equal);
                        assert!(matches!(*lhs, Expr::Binary { op: BinaryOp::Add, .. }));
                    }
                    other => panic!("unexpected {other:?}"),
                }
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_negative_literal_folds() {
        assert_eq!(parse("-3").unwrap(), Expr::Literal(json!(-3)));
        assert_eq!(parse("2.5").unwrap(), Expr::Literal(json!(2.5)));
    }

    #[test]
    fn test_conditional_and_trailing_comma() {
        assert!(matches!(
            parse("flag ? 'yes' : 'no'").unwrap(),
            Expr::Condition { otherwise: Some(_), .. }
        ));
        assert!(matches!(parse("{ 'a': 1, }").unwrap(), Expr::Object(_)));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("").is_err());
        assert!(parse("{ 'a' 1 }").is_err());
        assert!(parse("$foo").is_err());
        assert!(parse("(a").is_err());
        assert!(parse("a b").is_err());

        match parse("{ 'a': }").unwrap_err() {
            Error::Syntax { offset, .. } => assert_eq!(offset, 7),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}1{}", "(".repeat(MAX_DEPTH + 10), ")".repeat(MAX_DEPTH + 10));
        assert!(parse(&deep).is_err());
    }

    #[test]
    fn test_called_functions() {
        let expr = parse("{ 'a': $upper(x), 'b': $upper($trim(y)) }").unwrap();
        assert_eq!(expr.called_functions(), vec!["upper", "trim"]);
    }
}
