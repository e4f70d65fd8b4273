//! Tokenizer and recursive-descent parser for the expression grammar.

use serde_json::{Number, Value};

use super::{CompareOp, ExpressionError, Node};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Number),
    Str(String),
    Ident(String),
    Dot,
    LParen,
    RParen,
    Bang,
    AndAnd,
    OrOr,
    Op(CompareOp),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => n.to_string(),
            Token::Str(s) => format!("'{s}'"),
            Token::Ident(name) => name.clone(),
            Token::Dot => ".".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Bang => "!".into(),
            Token::AndAnd => "&&".into(),
            Token::OrOr => "||".into(),
            Token::Op(op) => match op {
                CompareOp::Eq => "==",
                CompareOp::Ne => "!=",
                CompareOp::Lt => "<",
                CompareOp::Le => "<=",
                CompareOp::Gt => ">",
                CompareOp::Ge => ">=",
            }
            .into(),
        }
    }
}

type Spanned = (Token, usize);

// ============================================================================
// Tokenizer
// ============================================================================

fn tokenize(source: &str) -> Result<Vec<Spanned>, ExpressionError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let peek = |i: usize| chars.get(i).map(|&(_, c)| c);
    let offset_at = |i: usize| chars.get(i).map_or(source.len(), |&(o, _)| o);

    let mut tokens = Vec::new();
    let mut i = 0;

    while let Some(&(offset, ch)) = chars.get(i) {
        let token = match ch {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '.' => {
                i += 1;
                Token::Dot
            }
            '(' => {
                i += 1;
                Token::LParen
            }
            ')' => {
                i += 1;
                Token::RParen
            }
            '!' if peek(i + 1) == Some('=') => {
                i += 2;
                Token::Op(CompareOp::Ne)
            }
            '!' => {
                i += 1;
                Token::Bang
            }
            '=' if peek(i + 1) == Some('=') => {
                i += 2;
                Token::Op(CompareOp::Eq)
            }
            '<' | '>' => {
                let inclusive = peek(i + 1) == Some('=');
                i += if inclusive { 2 } else { 1 };
                Token::Op(match (ch, inclusive) {
                    ('<', false) => CompareOp::Lt,
                    ('<', true) => CompareOp::Le,
                    (_, false) => CompareOp::Gt,
                    (_, true) => CompareOp::Ge,
                })
            }
            '&' if peek(i + 1) == Some('&') => {
                i += 2;
                Token::AndAnd
            }
            '|' if peek(i + 1) == Some('|') => {
                i += 2;
                Token::OrOr
            }
            '\'' | '"' => {
                let mut text = String::new();
                i += 1;
                loop {
                    match peek(i) {
                        None => {
                            return Err(ExpressionError::Unterminated {
                                what: "string",
                                offset,
                            });
                        }
                        Some('\\') if peek(i + 1).is_some() => {
                            text.extend(peek(i + 1));
                            i += 2;
                        }
                        Some(c) if c == ch => {
                            i += 1;
                            break;
                        }
                        Some(c) => {
                            text.push(c);
                            i += 1;
                        }
                    }
                }
                Token::Str(text)
            }
            c if c.is_ascii_digit()
                || (c == '-' && peek(i + 1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while peek(i).is_some_and(|c| c.is_ascii_digit()) {
                    i += 1;
                }
                // After a dot the digits are an index segment, never a float.
                let after_dot = matches!(tokens.last(), Some((Token::Dot, _)));
                let fractional = !after_dot
                    && peek(i) == Some('.')
                    && peek(i + 1).is_some_and(|c| c.is_ascii_digit());
                if fractional {
                    i += 1;
                    while peek(i).is_some_and(|c| c.is_ascii_digit()) {
                        i += 1;
                    }
                }
                let text = &source[offset_at(start)..offset_at(i)];
                Token::Number(parse_number(text, fractional)?)
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while peek(i).is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$') {
                    i += 1;
                }
                Token::Ident(source[offset_at(start)..offset_at(i)].to_owned())
            }
            _ => return Err(ExpressionError::UnexpectedChar { ch, offset }),
        };
        tokens.push((token, offset));
    }

    Ok(tokens)
}

fn parse_number(text: &str, fractional: bool) -> Result<Number, ExpressionError> {
    let invalid = || ExpressionError::InvalidNumber(text.to_owned());
    if fractional {
        let value: f64 = text.parse().map_err(|_| invalid())?;
        Number::from_f64(value).ok_or_else(invalid)
    } else {
        text.parse::<i64>().map(Number::from).map_err(|_| invalid())
    }
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn next(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or(&mut self) -> Result<Node, ExpressionError> {
        let mut lhs = self.and()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.and()?;
            lhs = Node::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Node, ExpressionError> {
        let mut lhs = self.unary()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.unary()?;
            lhs = Node::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Node, ExpressionError> {
        if self.eat(&Token::Bang) {
            return Ok(Node::Not(Box::new(self.unary()?)));
        }
        self.compare()
    }

    fn compare(&mut self) -> Result<Node, ExpressionError> {
        let lhs = self.primary()?;
        if let Some(&Token::Op(op)) = self.peek() {
            self.pos += 1;
            let rhs = self.primary()?;
            return Ok(Node::Compare(op, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn primary(&mut self) -> Result<Node, ExpressionError> {
        let (token, offset) = self.next().ok_or(ExpressionError::UnexpectedEnd)?;
        match token {
            Token::Number(n) => Ok(Node::Literal(Value::Number(n))),
            Token::Str(s) => Ok(Node::Literal(Value::String(s))),
            Token::LParen => {
                let inner = self.or()?;
                match self.next() {
                    Some((Token::RParen, _)) => Ok(inner),
                    Some((other, offset)) => Err(unexpected(&other, offset)),
                    None => Err(ExpressionError::UnexpectedEnd),
                }
            }
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Node::Literal(Value::Bool(true))),
                "false" => Ok(Node::Literal(Value::Bool(false))),
                "null" => Ok(Node::Literal(Value::Null)),
                "headers" | "body" => self.path(name),
                _ => Err(ExpressionError::UnknownIdentifier(name)),
            },
            other => Err(unexpected(&other, offset)),
        }
    }

    fn path(&mut self, root: String) -> Result<Node, ExpressionError> {
        let mut segments = vec![root];
        while self.eat(&Token::Dot) {
            match self.next() {
                Some((Token::Ident(name), _)) => segments.push(name),
                Some((Token::Number(n), _)) if n.is_u64() => segments.push(n.to_string()),
                Some((other, offset)) => return Err(unexpected(&other, offset)),
                None => return Err(ExpressionError::UnexpectedEnd),
            }
        }
        Ok(Node::Path(segments))
    }
}

fn unexpected(token: &Token, offset: usize) -> ExpressionError {
    ExpressionError::UnexpectedToken {
        found: token.describe(),
        offset,
    }
}

/// Parses a complete expression; trailing tokens are an error.
pub(super) fn parse(source: &str) -> Result<Node, ExpressionError> {
    let mut parser = Parser {
        tokens: tokenize(source)?,
        pos: 0,
    };
    let node = parser.or()?;
    match parser.next() {
        Some((token, offset)) => Err(unexpected(&token, offset)),
        None => Ok(node),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_path_with_index() {
        let node = parse("body.items.0.id").unwrap();
        assert_eq!(
            node,
            Node::Path(vec!["body".into(), "items".into(), "0".into(), "id".into()])
        );
    }

    #[test]
    fn test_parse_nested_index() {
        let node = parse("body.items.0.1").unwrap();
        assert_eq!(
            node,
            Node::Path(vec!["body".into(), "items".into(), "0".into(), "1".into()])
        );
        assert_eq!(parse("0.1").unwrap(), Node::Literal(Value::from(0.1)));
    }

    #[test]
    fn test_precedence() {
        // && binds tighter than ||
        let node = parse("true || false && false").unwrap();
        assert!(matches!(node, Node::Or(_, _)));
    }

    #[test]
    fn test_negative_and_fractional_numbers() {
        assert_eq!(parse("-3").unwrap(), Node::Literal(Value::from(-3)));
        assert_eq!(parse("2.5").unwrap(), Node::Literal(Value::from(2.5)));
    }

    #[test]
    fn test_escaped_quote() {
        assert_eq!(
            parse(r#"'it\'s'"#).unwrap(),
            Node::Literal(Value::String("it's".into()))
        );
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        assert!(matches!(
            parse("body.a body.b"),
            Err(ExpressionError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse("(body.a"),
            Err(ExpressionError::UnexpectedEnd)
        ));
    }
}
