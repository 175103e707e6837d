// Copyright 2017 Lyndon Brown
//
// This file is part of the `keelson` command-line argument parsing library.
//
// Licensed under the MIT license or the Apache license (version 2.0), at your option. You may not
// copy, modify, or distribute this file except in compliance with said license. You can find copies
// of these licenses either in the LICENSE-MIT and LICENSE-APACHE files, or alternatively at
// <http://opensource.org/licenses/MIT> and <http://www.apache.org/licenses/LICENSE-2.0>
// respectively.

//! Option description components
//!
//! This module contains components to do with describing the *options* available within a given
//! context — both parsing the compact format-string grammar consumers write them in, and the
//! resulting [`OptionDef`] structure the [`parser`](crate::parser) matches input tokens against.
//!
//! # Format string grammar
//!
//! ```text
//! format  := token ( /[ ,|]+/ token )*
//! token   := ("--no-"? longName) | ("-" shortChar)
//! value   := "<" name ">" | "[" name "]"
//! ```
//!
//! A `value` marker may appear once, anywhere in the format string, attached to any token by
//! whitespace (e.g. `"-c, --count <n>"`); its presence makes the option value-bearing (required with
//! `<...>`, optional with `[...]`), its absence makes it a boolean flag. At most one canonical long
//! and one canonical short name may be given; any further long/short tokens become aliases. A long
//! name prefixed with `no-` marks the option *negated*: its default is `true` and its presence on
//! the command line sets it to `false`.

use crate::error::Error;
use crate::value::{TypeTag, Validator, Value};
use heck::ToLowerCamelCase;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed, pinned future, as returned by option callbacks and command actions
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Whether, and how, an option takes a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueArity {
    /// A boolean flag; no value
    None,
    /// A value is required (`<name>` in the format string)
    Required,
    /// A value is optional (`[name]` in the format string), but if given must be in the same
    /// argument (`--foo=bar`, never `--foo bar`)
    Optional,
}

impl Default for ValueArity {
    fn default() -> Self {
        ValueArity::None
    }
}

/// The arguments an option callback is invoked with
pub struct CallbackArgs {
    /// The value just assigned to this option (after coercion), if any
    pub value: Option<Value>,
    /// The value previously held for this option's key, if any (e.g. from an earlier occurrence
    /// on the same command line, or a seeded default)
    pub previous: Option<Value>,
}

/// What an option callback asks the parser to do next
pub enum CallbackOutcome {
    /// Continue parsing normally
    Continue,
    /// Stop immediately; the command's dispatch should resolve to `result` without further argv
    /// mutation (e.g. `--version`, `--help`)
    ShortCircuit(crate::commands::ActionResult),
}

/// An option callback
pub type Callback =
    Arc<dyn Fn(CallbackArgs) -> BoxFuture<'static, Result<CallbackOutcome, Error>> + Send + Sync>;

/// Description of one declared option
#[derive(Clone)]
pub struct OptionDef {
    /// Canonical long name, excluding the `--` prefix and any `no-` negation prefix
    pub long: Option<String>,
    /// Canonical short character
    pub short: Option<char>,
    /// Whether this option was declared in `--no-` form
    pub negated: bool,
    /// Value arity
    pub value: ValueArity,
    /// Declared type tag, governing coercion of a supplied value
    pub type_tag: TypeTag,
    /// Default value
    pub default: Option<Value>,
    /// Whether this option is hidden from help output
    pub hidden: bool,
    /// Description text
    pub desc: Option<String>,
    /// Option group, for organizing help output (default: empty string)
    pub group: String,
    /// Visible long aliases: `(name, visible)`
    pub alias_long: Vec<(String, bool)>,
    /// Visible short aliases: `(char, visible)`
    pub alias_short: Vec<(char, bool)>,
    /// Optional callback, invoked when this option is recognized
    pub callback: Option<Callback>,
    /// Optional post-coercion validator
    pub validator: Option<Validator>,
}

impl std::fmt::Debug for OptionDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionDef")
            .field("long", &self.long)
            .field("short", &self.short)
            .field("negated", &self.negated)
            .field("value", &self.value)
            .field("hidden", &self.hidden)
            .finish()
    }
}

impl OptionDef {
    /// The canonical name used as this option's `argv` key: the camelCased long name, or the short
    /// character (as a one-character string) if there is no long name
    pub fn canonical_name(&self) -> String {
        match &self.long {
            Some(long) => long.to_lower_camel_case(),
            None => self.short.map(|c| c.to_string()).unwrap_or_default(),
        }
    }

    /// Every name this option answers to: canonical long/short plus visible aliases
    pub fn all_long_names(&self) -> impl Iterator<Item = &str> {
        self.long
            .iter()
            .map(String::as_str)
            .chain(self.alias_long.iter().map(|(n, _)| n.as_str()))
    }

    /// Every long spelling this option actually matches on the command line
    ///
    /// For a negated option the stored `long`/`alias_long` names exclude the `no-` prefix (so
    /// [`canonical_name`](OptionDef::canonical_name) reads naturally), but the token the user types
    /// always carries it — `--no-color` and its alias `--no-colors` both need the prefix reapplied
    /// here, or the parser would never recognize either.
    pub fn all_long_lookup_keys(&self) -> impl Iterator<Item = String> + '_ {
        let negated = self.negated;
        self.all_long_names().map(move |n| if negated { format!("no-{}", n) } else { n.to_string() })
    }

    /// Every short character this option answers to: canonical short plus visible aliases
    pub fn all_short_chars(&self) -> impl Iterator<Item = char> + '_ {
        self.short.into_iter().chain(self.alias_short.iter().map(|(c, _)| *c))
    }
}

/// A parsed option format string, prior to being turned into a full [`OptionDef`]
#[derive(Debug, Default)]
struct ParsedFormat {
    long: Option<String>,
    short: Option<char>,
    alias_long: Vec<String>,
    alias_short: Vec<char>,
    negated: bool,
    value: ValueArity,
}

/// Parse an option format string per the grammar documented at the [module level](self)
///
/// Fails with [`Error::InvalidOptionFormat`] on a malformed format.
pub fn parse_format(format: &str) -> Result<ParsedOption, Error> {
    let malformed = |message: &str| Error::InvalidOptionFormat {
        format: format.to_string(),
        message: message.to_string(),
    };

    let mut remainder = format.to_string();
    let mut value = ValueArity::None;

    if let (Some(start), Some(end)) = (remainder.find('<'), remainder.find('>')) {
        if end > start {
            value = ValueArity::Required;
            remainder.replace_range(start..=end, "");
        }
    }
    if value == ValueArity::None {
        if let (Some(start), Some(end)) = (remainder.find('['), remainder.find(']')) {
            if end > start {
                value = ValueArity::Optional;
                remainder.replace_range(start..=end, "");
            }
        }
    }

    let mut parsed = ParsedFormat { value, ..Default::default() };

    for token in remainder.split(|c: char| c == ',' || c == '|' || c.is_whitespace()) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if let Some(rest) = token.strip_prefix("--") {
            if rest.is_empty() {
                return Err(malformed("long option name must not be empty"));
            }
            let (name, negated) = match rest.strip_prefix("no-") {
                Some(n) if !n.is_empty() => (n.to_string(), true),
                _ => (rest.to_string(), false),
            };
            if negated {
                // A second `--no-` token names an alternate spelling of the same negated option
                // (e.g. `--no-color, --no-colors`), not a second canonical name; it still lands in
                // `alias_long` below like any other extra token.
                parsed.negated = true;
            }
            if parsed.long.is_none() {
                parsed.long = Some(name);
            } else {
                parsed.alias_long.push(name);
            }
        } else if let Some(rest) = token.strip_prefix('-') {
            let mut chars = rest.chars();
            let ch = chars.next().ok_or_else(|| malformed("short option must name a character"))?;
            if chars.next().is_some() {
                return Err(malformed("short option token must be exactly one character"));
            }
            if parsed.short.is_none() {
                parsed.short = Some(ch);
            } else {
                parsed.alias_short.push(ch);
            }
        } else {
            return Err(malformed(&format!("unrecognized token {:?}", token)));
        }
    }

    if parsed.long.is_none() && parsed.short.is_none() {
        return Err(malformed("at least one long or short name is required"));
    }
    if parsed.negated && parsed.value != ValueArity::None {
        return Err(malformed("a `--no-` option cannot also take a value"));
    }

    Ok(ParsedOption(parsed))
}

/// The result of [`parse_format`]; fed into [`OptionDef::from_parsed`] along with the remaining,
/// non-format parameters (type tag, default, description, …)
#[derive(Debug)]
pub struct ParsedOption(ParsedFormat);

impl OptionDef {
    /// Build a full [`OptionDef`] from a parsed format plus the remaining parameters
    pub fn from_parsed(parsed: ParsedOption, group: impl Into<String>) -> Self {
        let p = parsed.0;
        OptionDef {
            long: p.long,
            short: p.short,
            negated: p.negated,
            value: p.value,
            type_tag: if p.negated { TypeTag::Bool } else { TypeTag::Str },
            default: if p.negated { Some(Value::Bool(true)) } else { None },
            hidden: false,
            desc: None,
            group: group.into(),
            alias_long: p.alias_long.into_iter().map(|n| (n, true)).collect(),
            alias_short: p.alias_short.into_iter().map(|c| (c, true)).collect(),
            callback: None,
            validator: None,
        }
    }

    /// Parse `format` and build an [`OptionDef`] from it in one step
    pub fn new(format: &str, group: impl Into<String>) -> Result<Self, Error> {
        Ok(Self::from_parsed(parse_format(format)?, group))
    }

    /// Set the description text
    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }

    /// Set the declared type tag (ignored for negated options, which are always `bool`)
    pub fn type_tag(mut self, tag: TypeTag) -> Self {
        if !self.negated {
            self.type_tag = tag;
        }
        self
    }

    /// Set a default value
    pub fn default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Hide this option from help output
    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Attach a callback, invoked when this option is recognized during parsing
    pub fn callback(mut self, callback: Callback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Attach a post-coercion validator
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }
}

/// The set of [`OptionDef`]s declared directly on a single
/// [`Context`](crate::context::Context), keyed by group
#[derive(Debug, Clone, Default)]
pub struct OptionTable {
    groups: Vec<(String, Vec<Arc<OptionDef>>)>,
}

impl OptionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an option to the named group (creating the group if needed)
    pub fn push(&mut self, group: impl Into<String>, option: Arc<OptionDef>) {
        let group = group.into();
        if let Some((_, list)) = self.groups.iter_mut().find(|(g, _)| *g == group) {
            list.push(option);
        } else {
            self.groups.push((group, vec![option]));
        }
    }

    /// Iterate over `(group, options)` pairs in declaration order
    pub fn groups(&self) -> impl Iterator<Item = (&str, &[Arc<OptionDef>])> {
        self.groups.iter().map(|(g, list)| (g.as_str(), list.as_slice()))
    }

    /// Iterate over every declared option, regardless of group, in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<OptionDef>> {
        self.groups.iter().flat_map(|(_, list)| list.iter())
    }

    /// Whether no options have been declared
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|(_, list)| list.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_long_and_short_with_required_value() {
        let def = OptionDef::new("-c, --count <n>", "").unwrap();
        assert_eq!(def.long.as_deref(), Some("count"));
        assert_eq!(def.short, Some('c'));
        assert_eq!(def.value, ValueArity::Required);
        assert_eq!(def.canonical_name(), "count");
    }

    #[test]
    fn parses_optional_value() {
        let def = OptionDef::new("--tag [name]", "").unwrap();
        assert_eq!(def.value, ValueArity::Optional);
    }

    #[test]
    fn parses_negated_form() {
        let def = OptionDef::new("--no-banner", "").unwrap();
        assert!(def.negated);
        assert_eq!(def.long.as_deref(), Some("banner"));
        assert_eq!(def.default, Some(Value::Bool(true)));
    }

    #[test]
    fn rejects_negated_with_value() {
        assert!(OptionDef::new("--no-count <n>", "").is_err());
    }

    #[test]
    fn rejects_empty_format() {
        assert!(OptionDef::new("", "").is_err());
    }

    #[test]
    fn rejects_multi_char_short() {
        assert!(OptionDef::new("-abc", "").is_err());
    }

    #[test]
    fn aliases_collect_in_order() {
        let def = OptionDef::new("-v, -V, --version, --vers", "").unwrap();
        assert_eq!(def.short, Some('v'));
        assert_eq!(def.alias_short, vec![('V', true)]);
        assert_eq!(def.long.as_deref(), Some("version"));
        assert_eq!(def.alias_long, vec![("vers".to_string(), true)]);
    }

    #[test]
    fn canonical_name_camel_cases() {
        let def = OptionDef::new("--dry-run", "").unwrap();
        assert_eq!(def.canonical_name(), "dryRun");
    }

    #[test]
    fn short_only_canonical_name() {
        let def = OptionDef::new("-x", "").unwrap();
        assert_eq!(def.canonical_name(), "x");
    }

    #[test]
    fn negated_option_lookup_keys_carry_the_prefix() {
        let def = OptionDef::new("--no-color, --no-colors", "").unwrap();
        let keys: Vec<String> = def.all_long_lookup_keys().collect();
        assert_eq!(keys, vec!["no-color".to_string(), "no-colors".to_string()]);
        assert_eq!(def.canonical_name(), "color");
    }
}
