//! Frontend route expressions
//!
//! A route is one or more matchers joined by `&&`:
//!
//! ```text
//! Host("example.com") && PathRegexp("/api/.*") && Header("X-Env", "prod")
//! ```
//!
//! Arguments are double-quoted (with `\"` and `\\` escapes) or
//! backtick-quoted raw strings. `*Regexp` matchers must carry a valid
//! regular expression.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

use crate::errors::{Error, Result};

lazy_static! {
    static ref MATCHER_REGEX: Regex =
        Regex::new(r#"^\s*([A-Za-z]+)\s*\(((?:\s*(?:"(?:[^"\\]|\\.)*"|`[^`]*`)\s*,?)*)\)\s*"#)
            .expect("MATCHER_REGEX should be a valid regex pattern");
    static ref ARGUMENT_REGEX: Regex = Regex::new(r#""((?:[^"\\]|\\.)*)"|`([^`]*)`"#)
        .expect("ARGUMENT_REGEX should be a valid regex pattern");
}

/// Matcher kinds understood by the proxy router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherKind {
    Host,
    HostRegexp,
    Path,
    PathRegexp,
    Method,
    MethodRegexp,
    Header,
    HeaderRegexp,
}

impl MatcherKind {
    fn parse(name: &str) -> Option<Self> {
        let kind = match name {
            "Host" => MatcherKind::Host,
            "HostRegexp" => MatcherKind::HostRegexp,
            "Path" => MatcherKind::Path,
            "PathRegexp" => MatcherKind::PathRegexp,
            "Method" => MatcherKind::Method,
            "MethodRegexp" => MatcherKind::MethodRegexp,
            "Header" => MatcherKind::Header,
            "HeaderRegexp" => MatcherKind::HeaderRegexp,
            _ => return None,
        };
        Some(kind)
    }

    fn arity(self) -> usize {
        match self {
            MatcherKind::Header | MatcherKind::HeaderRegexp => 2,
            _ => 1,
        }
    }

    fn is_regexp(self) -> bool {
        matches!(
            self,
            MatcherKind::HostRegexp
                | MatcherKind::PathRegexp
                | MatcherKind::MethodRegexp
                | MatcherKind::HeaderRegexp
        )
    }
}

impl fmt::Display for MatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matcher {
    pub kind: MatcherKind,
    pub args: Vec<String>,
}

/// Parsed route expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub matchers: Vec<Matcher>,
}

/// Validates route expressions before frontends are accepted
#[derive(Debug, Clone, Default)]
pub struct RouteParser;

impl RouteParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, expression: &str) -> Result<Route> {
        if expression.trim().is_empty() {
            return Err(Error::invalid_format("route expression can not be empty"));
        }

        let mut matchers = Vec::new();
        let mut rest = expression;
        loop {
            let captures = MATCHER_REGEX.captures(rest).ok_or_else(|| {
                Error::invalid_format(format!(
                    "route '{}': expected a matcher at '{}'",
                    expression,
                    rest.trim()
                ))
            })?;
            let whole = captures.get(0).map_or(0, |m| m.end());
            let name = captures.get(1).map_or("", |m| m.as_str());
            let raw_args = captures.get(2).map_or("", |m| m.as_str());

            matchers.push(parse_matcher(expression, name, raw_args)?);

            rest = &rest[whole..];
            if rest.is_empty() {
                break;
            }
            rest = rest.strip_prefix("&&").ok_or_else(|| {
                Error::invalid_format(format!(
                    "route '{}': expected '&&' at '{}'",
                    expression, rest
                ))
            })?;
        }

        Ok(Route { matchers })
    }

    pub fn validate(&self, expression: &str) -> Result<()> {
        self.parse(expression).map(|_| ())
    }
}

fn parse_matcher(expression: &str, name: &str, raw_args: &str) -> Result<Matcher> {
    let kind = MatcherKind::parse(name).ok_or_else(|| {
        Error::invalid_format(format!("route '{}': unknown matcher '{}'", expression, name))
    })?;

    let args: Vec<String> = ARGUMENT_REGEX
        .captures_iter(raw_args)
        .map(|c| match (c.get(1), c.get(2)) {
            (Some(quoted), _) => unescape(quoted.as_str()),
            (None, Some(raw)) => raw.as_str().to_string(),
            (None, None) => String::new(),
        })
        .collect();

    if args.len() != kind.arity() {
        return Err(Error::invalid_format(format!(
            "route '{}': {} takes {} argument(s), got {}",
            expression,
            kind,
            kind.arity(),
            args.len()
        )));
    }

    if kind.is_regexp() {
        if let Some(pattern) = args.last() {
            Regex::new(pattern).map_err(|e| {
                Error::invalid_format(format!("route '{}': {} pattern: {}", expression, kind, e))
            })?;
        }
    }

    Ok(Matcher { kind, args })
}

fn unescape(quoted: &str) -> String {
    let mut out = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
