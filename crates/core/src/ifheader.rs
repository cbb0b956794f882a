//! The WebDAV `If` request header: model, parser, and evaluator.
//!
//! Per RFC 4918 §10.4 the header is a disjunction of condition lists, each
//! list optionally tagged with a resource. A condition is
//! `["Not"] ( "<" state-token ">" | "[" entity-tag "]" )`. A list matches iff
//! every condition in it holds (AND); the header matches iff any list does
//! (OR).

use std::collections::HashSet;

use crate::error::LockError;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// The subject of a single condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IfOperand {
    /// A coded URL naming a lock token, e.g. `opaquelocktoken:…`.
    StateToken(String),
    /// An entity tag, kept verbatim including quotes and any `W/` prefix.
    EntityTag(String),
}

/// One `[Not] (token | [etag])` condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfCondition {
    pub negate: bool,
    pub operand: IfOperand,
}

impl IfCondition {
    /// Evaluate against the state of one resource.
    fn holds(&self, entity_tag: Option<&str>, tokens: &HashSet<String>) -> bool {
        let matched = match &self.operand {
            IfOperand::StateToken(token) => tokens.contains(token),
            IfOperand::EntityTag(tag) => entity_tag == Some(tag.as_str()),
        };
        matched != self.negate
    }
}

/// A parenthesized condition list, optionally tagged with a resource href.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfList {
    /// The raw `Resource-Tag` href, verbatim as the client sent it.
    /// `None` for untagged lists, which apply to the request URI.
    pub resource: Option<String>,
    pub conditions: Vec<IfCondition>,
}

impl IfList {
    /// `true` iff every condition holds (logical AND).
    pub fn matches(&self, entity_tag: Option<&str>, tokens: &HashSet<String>) -> bool {
        self.conditions
            .iter()
            .all(|c| c.holds(entity_tag, tokens))
    }

    /// At least one non-negated state-token condition.
    ///
    /// A list carrying only negated token conditions asserts the *absence* of
    /// tokens and therefore does not require one.
    pub fn requires_state_token(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| !c.negate && matches!(c.operand, IfOperand::StateToken(_)))
    }

    /// At least one entity-tag condition, negated or not.
    pub fn requires_entity_tag(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| matches!(c.operand, IfOperand::EntityTag(_)))
    }

    /// Tokens named by non-negated token conditions, in list order.
    pub fn state_tokens(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().filter_map(|c| match &c.operand {
            IfOperand::StateToken(token) if !c.negate => Some(token.as_str()),
            _ => None,
        })
    }
}

/// A parsed `If` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IfHeader {
    pub lists: Vec<IfList>,
}

impl IfHeader {
    /// An empty header carries no conditions; the lock manager treats it
    /// exactly like an absent header.
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// `true` iff any list matches (logical OR).
    pub fn matches(&self, entity_tag: Option<&str>, tokens: &HashSet<String>) -> bool {
        self.lists.iter().any(|l| l.matches(entity_tag, tokens))
    }

    /// Tag every untagged list with `request_href`.
    ///
    /// Untagged lists apply to the request URI; callers that evaluate lists
    /// purely by their tag (refresh, most prominently) resolve them up front
    /// with this.
    pub fn resolve_untagged(&self, request_href: &str) -> Self {
        Self {
            lists: self
                .lists
                .iter()
                .map(|list| IfList {
                    resource: list
                        .resource
                        .clone()
                        .or_else(|| Some(request_href.to_string())),
                    conditions: list.conditions.clone(),
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse an `If` header value.
///
/// Accepts both forms of the grammar (`1*No-tag-list` and `1*Tagged-list`),
/// where a resource tag applies to every list that follows it up to the next
/// tag. Empty input yields an empty header.
pub fn parse_if_header(input: &str) -> Result<IfHeader, LockError> {
    let mut parser = Parser::new(input);
    let mut lists = Vec::new();
    let mut current_tag: Option<String> = None;

    loop {
        parser.skip_whitespace();
        match parser.peek() {
            None => break,
            Some('<') => {
                let tag = parser.take_delimited('<', '>')?;
                parser.skip_whitespace();
                if parser.peek() != Some('(') {
                    return Err(protocol_error(
                        "resource tag must be followed by a condition list",
                    ));
                }
                current_tag = Some(tag);
            }
            Some('(') => {
                let conditions = parse_list(&mut parser)?;
                lists.push(IfList {
                    resource: current_tag.clone(),
                    conditions,
                });
            }
            Some(other) => {
                return Err(protocol_error(format!(
                    "unexpected character {other:?} at top level"
                )));
            }
        }
    }

    Ok(IfHeader { lists })
}

fn parse_list(parser: &mut Parser<'_>) -> Result<Vec<IfCondition>, LockError> {
    parser.expect('(')?;
    let mut conditions = Vec::new();

    loop {
        parser.skip_whitespace();
        match parser.peek() {
            None => return Err(protocol_error("unterminated condition list")),
            Some(')') => {
                parser.advance();
                break;
            }
            _ => {
                let negate = parser.take_keyword_not();
                parser.skip_whitespace();
                let operand = match parser.peek() {
                    Some('<') => IfOperand::StateToken(parser.take_delimited('<', '>')?),
                    Some('[') => IfOperand::EntityTag(parser.take_delimited('[', ']')?),
                    Some(other) => {
                        return Err(protocol_error(format!(
                            "expected <state-token> or [entity-tag], found {other:?}"
                        )))
                    }
                    None => return Err(protocol_error("unterminated condition")),
                };
                conditions.push(IfCondition { negate, operand });
            }
        }
    }

    if conditions.is_empty() {
        return Err(protocol_error("condition list must not be empty"));
    }
    Ok(conditions)
}

fn protocol_error(detail: impl std::fmt::Display) -> LockError {
    LockError::Protocol(format!("Malformed If header: {detail}"))
}

/// Minimal cursor over the header characters.
struct Parser<'a> {
    rest: &'a str,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            rest: input.trim(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.rest.chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.rest = &self.rest[c.len_utf8()..];
        }
    }

    fn skip_whitespace(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn expect(&mut self, expected: char) -> Result<(), LockError> {
        if self.peek() == Some(expected) {
            self.advance();
            Ok(())
        } else {
            Err(protocol_error(format!("expected {expected:?}")))
        }
    }

    /// Consume `open … close` and return the inner text.
    fn take_delimited(&mut self, open: char, close: char) -> Result<String, LockError> {
        self.expect(open)?;
        match self.rest.find(close) {
            Some(idx) => {
                let inner = self.rest[..idx].to_string();
                self.rest = &self.rest[idx + close.len_utf8()..];
                if inner.is_empty() {
                    return Err(protocol_error(format!("empty {open}{close} value")));
                }
                Ok(inner)
            }
            None => Err(protocol_error(format!("missing closing {close:?}"))),
        }
    }

    /// Consume a leading `Not` keyword if present.
    fn take_keyword_not(&mut self) -> bool {
        let Some(prefix) = self.rest.get(..3) else {
            return false;
        };
        if !prefix.eq_ignore_ascii_case("not") {
            return false;
        }
        let boundary = self
            .rest
            .as_bytes()
            .get(3)
            .map(|b| b.is_ascii_whitespace() || *b == b'<' || *b == b'[')
            .unwrap_or(false);
        if boundary {
            self.rest = &self.rest[3..];
        }
        boundary
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
