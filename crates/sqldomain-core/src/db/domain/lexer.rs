use crate::db::domain::DomainError;
use std::{iter::Peekable, str::CharIndices};
use tracing::warn;

///
/// Token
///

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Token {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Placeholder,
    Str(String),
    Int(i64),
    Float(f64),

    /// Bare identifier or keyword (`name`, `partner_id.name`, `and`, `True`).
    Word(String),

    /// Symbolic operator (`=`, `!=`, `<=`, `=?`, `=like`, `&`, `|`, `!`).
    Op(String),
}

///
/// Lexer
///

pub(crate) struct Lexer<'a> {
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(src: &'a str) -> Self {
        Self {
            chars: src.char_indices().peekable(),
        }
    }

    pub(crate) fn tokenize(mut self) -> Result<Vec<Token>, DomainError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Option<Token>, DomainError> {
        self.skip_whitespace();

        let Some(&(pos, ch)) = self.chars.peek() else {
            return Ok(None);
        };

        let token = match ch {
            '(' => self.single(Token::LParen),
            ')' => self.single(Token::RParen),
            '[' => self.single(Token::LBracket),
            ']' => self.single(Token::RBracket),
            ',' => self.single(Token::Comma),
            '?' => self.single(Token::Placeholder),
            '&' | '|' => self.single(Token::Op(ch.to_string())),
            '\'' | '"' => self.read_string(ch),
            '=' | '!' | '<' | '>' => self.read_operator(),
            '-' => {
                self.chars.next();
                match self.chars.peek() {
                    Some(&(_, next)) if next.is_ascii_digit() => self.read_number(pos, true)?,
                    _ => return Err(DomainError::UnexpectedChar { ch, pos }),
                }
            }
            c if c.is_ascii_digit() => self.read_number(pos, false)?,
            c if is_word_start(c) => Token::Word(self.read_word()),
            _ => return Err(DomainError::UnexpectedChar { ch, pos }),
        };

        Ok(Some(token))
    }

    fn single(&mut self, token: Token) -> Token {
        self.chars.next();
        token
    }

    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
    }

    fn read_word(&mut self) -> String {
        let mut word = String::new();
        while let Some((_, c)) = self.chars.next_if(|&(_, c)| is_word_char(c)) {
            word.push(c);
        }

        word
    }

    // Operator runs are built from `= ! < >`; `=?`, `=like` and `=ilike`
    // are recognised as single operators.
    fn read_operator(&mut self) -> Token {
        let mut op = String::new();
        while let Some((_, c)) = self
            .chars
            .next_if(|&(_, c)| matches!(c, '=' | '!' | '<' | '>'))
        {
            op.push(c);
        }

        if op == "=" {
            if self.chars.next_if(|&(_, c)| c == '?').is_some() {
                return Token::Op("=?".to_string());
            }

            let mut lookahead = self.chars.clone();
            let mut word = String::new();
            while let Some((_, c)) = lookahead.next_if(|&(_, c)| c.is_ascii_alphabetic()) {
                word.push(c);
            }
            if word.eq_ignore_ascii_case("like") || word.eq_ignore_ascii_case("ilike") {
                self.chars = lookahead;
                return Token::Op(format!("={}", word.to_ascii_lowercase()));
            }
        }

        Token::Op(op)
    }

    fn read_number(&mut self, pos: usize, negative: bool) -> Result<Token, DomainError> {
        let mut text = String::new();
        if negative {
            text.push('-');
        }

        let mut is_float = false;
        let mut has_exponent = false;
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                text.push(c);
            } else if c == '.' && !is_float {
                is_float = true;
                text.push(c);
            } else if matches!(c, 'e' | 'E') && !has_exponent && self.exponent_follows() {
                is_float = true;
                has_exponent = true;
                text.push(c);
                self.chars.next();
                if let Some(&(_, sign @ ('+' | '-'))) = self.chars.peek() {
                    text.push(sign);
                } else {
                    continue;
                }
            } else {
                break;
            }
            self.chars.next();
        }

        let token = if is_float {
            text.parse().map(Token::Float).ok()
        } else {
            text.parse().map(Token::Int).ok()
        };

        token.ok_or(DomainError::InvalidNumber { text, pos })
    }

    // `e` followed by digits, optionally signed; otherwise the `e` starts a
    // word.
    fn exponent_follows(&self) -> bool {
        let mut ahead = self.chars.clone();
        ahead.next();

        match ahead.next() {
            Some((_, '+' | '-')) => ahead.next().is_some_and(|(_, c)| c.is_ascii_digit()),
            Some((_, c)) => c.is_ascii_digit(),
            None => false,
        }
    }

    // Strings run to the matching quote; backslash escapes the next char.
    // An unterminated string keeps whatever was read.
    fn read_string(&mut self, quote: char) -> Token {
        let Some((start, _)) = self.chars.next() else {
            return Token::Str(String::new());
        };

        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some((_, c)) if c == quote => return Token::Str(out),
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, c)) => out.push(c),
                    None => break,
                },
                Some((_, c)) => out.push(c),
                None => break,
            }
        }

        warn!(pos = start, "unterminated string literal in domain");
        Token::Str(out)
    }
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}
