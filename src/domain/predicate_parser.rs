//! Bundle precondition parser.
//!
//! Recursive descent over the precondition grammar:
//!
//! ```text
//! predicate := ALWAYS
//!            | AT_LEAST(operand, operand) | AT_MOST(operand, operand)
//!            | AND(predicate, predicate, ...) | OR(predicate, predicate, ...)
//!            | NOT(predicate)
//! operand   := @key | unsigned integer (decimal or 0x hex)
//! ```

use crate::domain::bundle::{Operand, Predicate};
use crate::domain::error::ParseError;
use alloy_primitives::U256;
use std::str::FromStr;

/// Deepest nesting of `AND`/`OR`/`NOT` accepted.
pub const MAX_NESTING: usize = 32;

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(ParseError {
                message: format!("expected '{}', found '{}'", expected, ch),
                position: self.pos,
            }),
            None => Err(ParseError {
                message: format!("expected '{}', found end of input", expected),
                position: self.pos,
            }),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        let remaining = self.remaining();
        remaining.starts_with(keyword)
            && !remaining[keyword.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.peek_keyword(keyword) {
            self.pos += keyword.len();
            Ok(())
        } else {
            Err(ParseError {
                message: format!("expected '{}', found '{}'", keyword, self.peek_word()),
                position: self.pos,
            })
        }
    }

    fn peek_word(&self) -> String {
        let word: String = self
            .remaining()
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if word.is_empty() {
            self.peek()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "end of input".to_string())
        } else {
            word
        }
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        self.skip_whitespace();
        let start = self.pos;

        if self.peek() == Some('@') {
            self.advance();
            let key: String = self
                .remaining()
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if key.is_empty() {
                return Err(ParseError {
                    message: "expected snapshot key after '@'".to_string(),
                    position: self.pos,
                });
            }
            self.pos += key.len();
            return Ok(Operand::Snapshot(key));
        }

        if self.peek().is_some_and(|c| c.is_ascii_digit()) {
            let literal: String = self
                .remaining()
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric())
                .collect();
            self.pos += literal.len();
            return U256::from_str(&literal)
                .map(Operand::Literal)
                .map_err(|_| ParseError {
                    message: format!("invalid integer: {}", literal),
                    position: start,
                });
        }

        Err(ParseError {
            message: format!("expected '@key' or integer, found '{}'", self.peek_word()),
            position: start,
        })
    }

    fn parse_comparison(&mut self, keyword: &str) -> Result<Predicate, ParseError> {
        self.expect_keyword(keyword)?;
        self.expect_char('(')?;
        let left = self.parse_operand()?;
        self.expect_char(',')?;
        let right = self.parse_operand()?;
        self.expect_char(')')?;

        Ok(if keyword == "AT_LEAST" {
            Predicate::AtLeast(left, right)
        } else {
            Predicate::AtMost(left, right)
        })
    }

    fn parse_list(&mut self, keyword: &str) -> Result<Vec<Predicate>, ParseError> {
        self.expect_keyword(keyword)?;
        self.expect_char('(')?;

        let mut items = vec![self.parse_predicate()?];
        loop {
            self.skip_whitespace();
            if self.peek() == Some(')') {
                self.advance();
                break;
            }
            self.expect_char(',')?;
            items.push(self.parse_predicate()?);
        }

        if items.len() < 2 {
            return Err(ParseError {
                message: format!("{} requires at least 2 predicates", keyword),
                position: self.pos,
            });
        }
        Ok(items)
    }

    fn parse_predicate(&mut self) -> Result<Predicate, ParseError> {
        self.skip_whitespace();
        if self.depth >= MAX_NESTING {
            return Err(ParseError {
                message: format!("predicates nest deeper than {MAX_NESTING} levels"),
                position: self.pos,
            });
        }
        self.depth += 1;
        let predicate = self.parse_term();
        self.depth -= 1;
        predicate
    }

    fn parse_term(&mut self) -> Result<Predicate, ParseError> {
        if self.peek_keyword("ALWAYS") {
            self.pos += "ALWAYS".len();
            return Ok(Predicate::Always);
        }
        if self.peek_keyword("AT_LEAST") {
            return self.parse_comparison("AT_LEAST");
        }
        if self.peek_keyword("AT_MOST") {
            return self.parse_comparison("AT_MOST");
        }
        if self.peek_keyword("AND") {
            return Ok(Predicate::And(self.parse_list("AND")?));
        }
        if self.peek_keyword("OR") {
            return Ok(Predicate::Or(self.parse_list("OR")?));
        }
        if self.peek_keyword("NOT") {
            self.expect_keyword("NOT")?;
            self.expect_char('(')?;
            let inner = self.parse_predicate()?;
            self.expect_char(')')?;
            return Ok(Predicate::Not(Box::new(inner)));
        }

        Err(ParseError {
            message: format!("expected predicate, found '{}'", self.peek_word()),
            position: self.pos,
        })
    }

    fn parse(&mut self) -> Result<Predicate, ParseError> {
        let predicate = self.parse_predicate()?;
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(ParseError {
                message: format!("unexpected input after predicate: '{}'", self.remaining()),
                position: self.pos,
            });
        }
        Ok(predicate)
    }
}

pub fn parse(input: &str) -> Result<Predicate, ParseError> {
    Parser::new(input).parse()
}
