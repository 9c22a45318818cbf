use crate::{
    db::domain::{
        DomainError,
        lexer::{Lexer, Token},
        node::DomainNode,
        operator::{DomainOperator, Operator},
    },
    value::Value,
};
use tracing::warn;

/// Default bound on bracket nesting.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Parse a domain string with the default nesting bound.
pub fn parse(text: &str) -> Result<DomainNode, DomainError> {
    parse_with_depth(text, DEFAULT_MAX_DEPTH)
}

///
/// Parse a domain string in either bracket/tuple Polish notation or infix
/// `and` / `or` form.
///
/// Nesting problems (a missing or stray closer) do not fail the parse: the
/// best-effort tree is returned and a warning is logged. Normalization is
/// the authoritative arity check. Exceeding `max_depth` is a hard error.
///
/// A domain made of a single leaf parses to that leaf.
///
pub fn parse_with_depth(text: &str, max_depth: usize) -> Result<DomainNode, DomainError> {
    let tokens = Lexer::new(text).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        max_depth,
    };

    let mut root = parser.parse_level(0, None)?;
    if root.len() == 1 && root.item(0).is_some_and(DomainNode::is_leaf) {
        if let Some(leaf) = root.pop() {
            return Ok(leaf);
        }
    }

    Ok(root)
}

///
/// Closer
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Closer {
    Paren,
    Bracket,
}

///
/// Parser
///

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    max_depth: usize,
}

impl Parser {
    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_word(&self) -> Option<&str> {
        match self.tokens.get(self.pos) {
            Some(Token::Word(w)) => Some(w),
            _ => None,
        }
    }

    // One nesting level. `result` is the level's term list; `pending`
    // accumulates the leaf currently being read.
    fn parse_level(
        &mut self,
        depth: usize,
        closer: Option<Closer>,
    ) -> Result<DomainNode, DomainError> {
        let mut result = DomainNode::new();
        let mut pending: Vec<DomainNode> = Vec::new();

        loop {
            let Some(token) = self.next() else {
                if closer.is_some() {
                    warn!(depth, "domain ended inside an open group");
                }
                break;
            };

            match token {
                Token::LParen | Token::LBracket => {
                    if depth + 1 > self.max_depth {
                        return Err(DomainError::TooDeep {
                            max: self.max_depth,
                        });
                    }
                    let kind = if token == Token::LParen {
                        Closer::Paren
                    } else {
                        Closer::Bracket
                    };
                    let group = self.parse_level(depth + 1, Some(kind))?;

                    if pending.len() == 2 {
                        // `(field, op` is waiting for its operand list
                        pending.push(group);
                    } else {
                        flush(&mut result, &mut pending);
                        for child in group.into_items() {
                            result.push(child);
                        }
                    }
                }

                Token::RParen | Token::RBracket => {
                    let kind = if token == Token::RParen {
                        Closer::Paren
                    } else {
                        Closer::Bracket
                    };
                    match closer {
                        Some(expected) if expected == kind => break,
                        Some(_) => {
                            warn!(depth, "mismatched closing bracket in domain");
                            break;
                        }
                        None => warn!("stray closing bracket in domain ignored"),
                    }
                }

                Token::Comma => {
                    if is_leaf_shaped(&pending) {
                        flush(&mut result, &mut pending);
                    }
                }

                Token::Word(word) => self.word(word, &mut result, &mut pending),

                Token::Op(op) => {
                    if let Ok(domain_op) = op.parse::<DomainOperator>() {
                        flush(&mut result, &mut pending);
                        result.push(DomainNode::op(domain_op));
                    } else {
                        pending.push(DomainNode::value(op));
                    }
                }

                Token::Str(s) => {
                    if pending.is_empty() && s.parse::<DomainOperator>().is_ok() {
                        result.push(DomainNode::value(s));
                    } else {
                        push_operand(&mut result, &mut pending, Value::Text(s));
                    }
                }

                Token::Int(i) => push_operand(&mut result, &mut pending, Value::Int(i)),
                Token::Float(f) => push_operand(&mut result, &mut pending, Value::Float(f)),
                Token::Placeholder => push_operand(&mut result, &mut pending, Value::Placeholder),
            }
        }

        flush(&mut result, &mut pending);

        Ok(result)
    }

    fn word(&mut self, word: String, result: &mut DomainNode, pending: &mut Vec<DomainNode>) {
        match word.to_ascii_lowercase().as_str() {
            "and" | "or" => {
                flush(result, pending);
                let op = if word.eq_ignore_ascii_case("and") {
                    DomainOperator::And
                } else {
                    DomainOperator::Or
                };
                result.insert(0, DomainNode::op(op));
            }

            "not" => {
                let negated = self
                    .peek_word()
                    .map(str::to_ascii_lowercase)
                    .filter(|next| matches!(next.as_str(), "in" | "like" | "ilike"));

                match negated {
                    Some(next) if pending.len() == 1 => {
                        self.pos += 1;
                        pending.push(DomainNode::value(format!("not {next}")));
                    }
                    _ => {
                        flush(result, pending);
                        result.push(DomainNode::op(DomainOperator::Not));
                    }
                }
            }

            "true" => push_operand(result, pending, Value::Bool(true)),
            "false" => push_operand(result, pending, Value::Bool(false)),
            "none" | "null" => push_operand(result, pending, Value::Null),

            lowered if pending.len() == 1 && lowered.parse::<Operator>().is_ok() => {
                pending.push(DomainNode::value(lowered.to_string()));
            }

            _ => push_operand(result, pending, Value::Text(word)),
        }
    }
}

fn push_operand(result: &mut DomainNode, pending: &mut Vec<DomainNode>, value: Value) {
    if is_leaf_shaped(pending) {
        flush(result, pending);
    }
    pending.push(DomainNode::value(value));
}

fn is_leaf_shaped(pending: &[DomainNode]) -> bool {
    pending.len() == 3 && pending[0].is_value() && pending[1].is_term_operator()
}

// A complete leaf is pushed as one term; anything else is spliced item by item.
fn flush(result: &mut DomainNode, pending: &mut Vec<DomainNode>) {
    if pending.is_empty() {
        return;
    }

    if is_leaf_shaped(pending) {
        result.push(DomainNode::list(pending.drain(..)));
    } else {
        for node in pending.drain(..) {
            result.push(node);
        }
    }
}
