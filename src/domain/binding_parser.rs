//! Parameter binding parser.
//!
//! Parses the comma-separated parameter lists written in strategy files:
//!
//! ```text
//! &vaultId, %withdrawAmount, $2, 0x6B175474E89094C44Da98b954EedeAC495271d0F, 1
//! ```
//!
//! `$n` pipes the return value of action `n`, `&name` reads a sub-slot,
//! `%name` is a keeper-supplied variable, anything else is a literal typed
//! by the parameter it lands in.

use crate::domain::binding::Binding;
use crate::domain::error::ParseError;
use crate::domain::registry::ParamSpec;
use crate::domain::value::{AbiValue, SlotType};

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
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

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn parse_identifier(&mut self, sigil: char) -> Result<String, ParseError> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        if start == self.pos {
            return Err(ParseError {
                message: format!("expected a name after '{sigil}'"),
                position: start,
            });
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_index(&mut self) -> Result<usize, ParseError> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }
        let digits = &self.input[start..self.pos];
        if digits.is_empty() {
            return Err(ParseError {
                message: "expected an action index after '$'".to_string(),
                position: start,
            });
        }
        digits.parse::<usize>().map_err(|_| ParseError {
            message: format!("invalid action index: {digits}"),
            position: start,
        })
    }

    fn parse_literal(&mut self, ty: SlotType) -> Result<Binding, ParseError> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch == ',' {
                break;
            }
            self.advance();
        }
        let text = self.input[start..self.pos].trim();
        if text.is_empty() {
            return Err(ParseError {
                message: "expected a parameter binding".to_string(),
                position: start,
            });
        }
        AbiValue::parse(ty, text)
            .map(Binding::Constant)
            .map_err(|message| ParseError {
                message,
                position: start,
            })
    }

    fn parse_binding(&mut self, ty: SlotType) -> Result<Binding, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some('$') => {
                self.advance();
                Ok(Binding::Piped(self.parse_index()?))
            }
            Some('&') => {
                self.advance();
                Ok(Binding::SubSlot(self.parse_identifier('&')?))
            }
            Some('%') => {
                self.advance();
                Ok(Binding::Variable(self.parse_identifier('%')?))
            }
            _ => self.parse_literal(ty),
        }
    }

    fn expect_separator(&mut self) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            None => Ok(()),
            Some(',') => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(ParseError {
                message: format!("expected ',' or end of input, found '{ch}'"),
                position: self.pos,
            }),
        }
    }
}

/// Parse the bindings for an operation with the given parameters.
///
/// The number of bindings must match the parameter count; literals are
/// parsed as the type of the parameter at their position.
pub fn parse_bindings(input: &str, params: &[ParamSpec]) -> Result<Vec<Binding>, ParseError> {
    let mut parser = Parser::new(input);
    let mut bindings = Vec::with_capacity(params.len());

    parser.skip_whitespace();
    if parser.at_end() {
        if params.is_empty() {
            return Ok(bindings);
        }
        return Err(ParseError {
            message: format!("expected {} parameters, found none", params.len()),
            position: parser.pos,
        });
    }

    loop {
        parser.skip_whitespace();
        let Some(param) = params.get(bindings.len()) else {
            return Err(ParseError {
                message: format!("too many parameters: expected {}", params.len()),
                position: parser.pos,
            });
        };
        bindings.push(parser.parse_binding(param.ty)?);
        parser.expect_separator()?;
        if parser.at_end() {
            break;
        }
    }

    if bindings.len() != params.len() {
        return Err(ParseError {
            message: format!(
                "expected {} parameters, found {}",
                params.len(),
                bindings.len()
            ),
            position: parser.pos,
        });
    }
    Ok(bindings)
}
