// Copyright 2019 Lyndon Brown
//
// This file is part of the `keelson` command-line argument parsing library.
//
// Licensed under the MIT license or the Apache license (version 2.0), at your option. You may not
// copy, modify, or distribute this file except in compliance with said license. You can find copies
// of these licenses either in the LICENSE-MIT and LICENSE-APACHE files, or alternatively at
// <http://opensource.org/licenses/MIT> and <http://www.apache.org/licenses/LICENSE-2.0>
// respectively.

//! Value coercion components
//!
//! Every declared [`Argument`](crate::arguments::Argument) and [`Option`](crate::options::OptionDef)
//! carries a [`TypeTag`] describing how its raw token(s) should be coerced into a [`Value`] once
//! matched by the parser. Coercion is the last thing that happens to a value before it lands in a
//! [`ParseResult`](crate::parser::ParseResult)'s `argv` map; a declared [`Validator`] may still
//! reject the coerced value afterwards.

use crate::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Type tag declared for an [`Argument`](crate::arguments::Argument) or
/// [`Option`](crate::options::OptionDef)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    /// Passed through unchanged
    Str,
    /// Parsed as a number (`f64`, covers both integral and fractional input)
    Number,
    /// Parsed as a boolean (`true`/`false`/`yes`/`no`/`1`/`0`, case-insensitive)
    Bool,
    /// Wrapped as a path; existence is not checked here
    File,
    /// Parsed as a `YYYY-MM-DD` date
    Date,
    /// Like [`Bool`](TypeTag::Bool), but rejects the numeric forms to keep the surface human-facing
    YesNo,
    /// Parsed as arbitrary JSON
    Json,
}

impl TypeTag {
    /// The name used in error messages and in the option format grammar
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Str => "string",
            TypeTag::Number => "number",
            TypeTag::Bool => "bool",
            TypeTag::File => "file",
            TypeTag::Date => "date",
            TypeTag::YesNo => "yesno",
            TypeTag::Json => "json",
        }
    }
}

impl Default for TypeTag {
    fn default() -> Self {
        TypeTag::Str
    }
}

/// A coerced value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A boolean flag or coerced `bool`/`yesno` value
    Bool(bool),
    /// A coerced `string` value
    Str(String),
    /// A coerced `number` value
    Number(f64),
    /// A coerced `file` value
    Path(PathBuf),
    /// A coerced `date` value
    Date(chrono::NaiveDate),
    /// A coerced `json` value
    Json(serde_json::Value),
    /// The accumulated values of a `multiple` argument, or a repeated option
    List(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "{}", s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Path(p) => write!(f, "{}", p.display()),
            Value::Date(d) => write!(f, "{}", d),
            Value::Json(j) => write!(f, "{}", j),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// A user-supplied post-coercion check
///
/// Runs after a raw token has been successfully coerced per its [`TypeTag`]; may still reject the
/// value (e.g. a `number` out of an accepted range) with
/// [`Error::RangeError`] or [`Error::InvalidValue`].
pub type Validator = Arc<dyn Fn(&Value) -> Result<(), Error> + Send + Sync>;

/// Coerce a raw token according to a declared type tag
///
/// `name` is used only to attribute the name/argument in a resulting error.
pub fn coerce(tag: TypeTag, name: &str, raw: &str) -> Result<Value, Error> {
    match tag {
        TypeTag::Str => Ok(Value::Str(raw.to_string())),
        TypeTag::Number => raw
            .parse::<f64>()
            .map(Value::Number)
            .map_err(|_| Error::InvalidNumber { name: name.to_string(), value: raw.to_string() }),
        TypeTag::Bool => coerce_bool(name, raw, true),
        TypeTag::YesNo => coerce_bool(name, raw, false).map_err(|_| Error::NotYesNo {
            name: name.to_string(),
            value: raw.to_string(),
        }),
        TypeTag::File => Ok(Value::Path(PathBuf::from(raw))),
        TypeTag::Date => chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Value::Date)
            .map_err(|_| Error::InvalidDate { name: name.to_string(), value: raw.to_string() }),
        TypeTag::Json => serde_json::from_str(raw)
            .map(Value::Json)
            .map_err(|source| Error::InvalidJson { name: name.to_string(), source }),
    }
}

fn coerce_bool(name: &str, raw: &str, allow_numeric: bool) -> Result<Value, Error> {
    let lower = raw.to_ascii_lowercase();
    match lower.as_str() {
        "true" | "yes" => Ok(Value::Bool(true)),
        "false" | "no" => Ok(Value::Bool(false)),
        "1" if allow_numeric => Ok(Value::Bool(true)),
        "0" if allow_numeric => Ok(Value::Bool(false)),
        _ => Err(Error::InvalidValue { name: name.to_string(), value: raw.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_number() {
        assert_eq!(coerce(TypeTag::Number, "n", "5").unwrap(), Value::Number(5.0));
        assert!(coerce(TypeTag::Number, "n", "x").is_err());
    }

    #[test]
    fn coerces_bool_forms() {
        assert_eq!(coerce(TypeTag::Bool, "b", "yes").unwrap(), Value::Bool(true));
        assert_eq!(coerce(TypeTag::Bool, "b", "0").unwrap(), Value::Bool(false));
    }

    #[test]
    fn yesno_rejects_numeric() {
        assert!(coerce(TypeTag::YesNo, "b", "1").is_err());
        assert_eq!(coerce(TypeTag::YesNo, "b", "no").unwrap(), Value::Bool(false));
    }

    #[test]
    fn coerces_date() {
        let v = coerce(TypeTag::Date, "d", "2020-01-02").unwrap();
        assert_eq!(v, Value::Date(chrono::NaiveDate::from_ymd_opt(2020, 1, 2).unwrap()));
        assert!(coerce(TypeTag::Date, "d", "not-a-date").is_err());
    }

    #[test]
    fn coerces_json() {
        let v = coerce(TypeTag::Json, "c", r#"{"retries":3}"#).unwrap();
        assert_eq!(v, Value::Json(serde_json::json!({"retries": 3})));
    }
}
