// Copyright 2019 Lyndon Brown
//
// This file is part of the `keelson` command-line argument parsing library.
//
// Licensed under the MIT license or the Apache license (version 2.0), at your option. You may not
// copy, modify, or distribute this file except in compliance with said license. You can find copies
// of these licenses either in the LICENSE-MIT and LICENSE-APACHE files, or alternatively at
// <http://opensource.org/licenses/MIT> and <http://www.apache.org/licenses/LICENSE-2.0>
// respectively.

//! Positional argument description components
//!
//! An [`Argument`] describes one positional parameter of a [`Context`](crate::context::Context); an
//! [`ArgumentList`] is the ordered set of them declared directly on a context, enforcing the
//! ordering invariant described below as each is appended.

use crate::error::Error;
use crate::value::{TypeTag, Validator, Value};
use heck::ToLowerCamelCase;

/// Description of one positional parameter
#[derive(Clone)]
pub struct Argument {
    /// Argument name, as shown in help and used as its `argv` key
    pub name: String,
    /// Description text
    pub desc: Option<String>,
    /// Whether this argument must be supplied
    pub required: bool,
    /// Whether this argument absorbs all remaining positionals (must be the last in its list)
    pub multiple: bool,
    /// Declared type tag, governing coercion
    pub type_tag: TypeTag,
    /// Default value, applied when absent and not required
    pub default: Option<Value>,
    /// Optional post-coercion validator
    pub validator: Option<Validator>,
}

impl std::fmt::Debug for Argument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Argument")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("multiple", &self.multiple)
            .field("type_tag", &self.type_tag)
            .finish()
    }
}

impl Argument {
    /// Create a new, optional, string-typed argument with the given name
    ///
    /// Fails with [`Error::InvalidArgument`] if `name` is empty.
    pub fn new(name: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::invalid_argument("argument name must not be empty"));
        }
        Ok(Self {
            name,
            desc: None,
            required: false,
            multiple: false,
            type_tag: TypeTag::Str,
            default: None,
            validator: None,
        })
    }

    /// Set the description text
    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }

    /// Mark this argument as required
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Mark this argument as absorbing all remaining positionals
    pub fn multiple(mut self, multiple: bool) -> Self {
        self.multiple = multiple;
        self
    }

    /// Set the declared type tag
    pub fn type_tag(mut self, tag: TypeTag) -> Self {
        self.type_tag = tag;
        self
    }

    /// Set a default value, applied when the argument is absent and not required
    pub fn default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Attach a post-coercion validator
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// The camelCased form of [`name`](Argument::name), used when a consumer wants a language-style
    /// identifier rather than the user-facing display name
    pub fn camel_case_name(&self) -> String {
        self.name.to_lower_camel_case()
    }
}

/// The ordered set of [`Argument`]s declared directly on a single
/// [`Context`](crate::context::Context)
#[derive(Debug, Clone, Default)]
pub struct ArgumentList {
    items: Vec<Argument>,
}

impl ArgumentList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an argument, enforcing the ordering invariants:
    ///
    /// - no non-required argument may precede a required one
    /// - at most one `multiple` argument may exist, and it must be the last
    pub fn push(&mut self, arg: Argument) -> Result<(), Error> {
        if let Some(last) = self.items.last() {
            if last.multiple {
                return Err(Error::invalid_argument(format!(
                    "argument {:?} cannot follow the `multiple` argument {:?}, which must be last",
                    arg.name, last.name,
                )));
            }
        }
        if arg.required {
            if let Some(prior_optional) = self.items.iter().find(|a| !a.required) {
                return Err(Error::invalid_argument(format!(
                    "required argument {:?} cannot follow non-required argument {:?}",
                    arg.name, prior_optional.name,
                )));
            }
        }
        self.items.push(arg);
        Ok(())
    }

    /// Iterate the declared arguments in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Argument> {
        self.items.iter()
    }

    /// Number of declared arguments
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no arguments have been declared
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The declared argument at `index`, if any
    pub fn get(&self, index: usize) -> Option<&Argument> {
        self.items.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_name() {
        assert!(Argument::new("").is_err());
    }

    #[test]
    fn rejects_required_after_optional() {
        let mut list = ArgumentList::new();
        list.push(Argument::new("a").unwrap().required(false)).unwrap();
        let err = list.push(Argument::new("b").unwrap().required(true)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn rejects_anything_after_multiple() {
        let mut list = ArgumentList::new();
        list.push(Argument::new("rest").unwrap().multiple(true)).unwrap();
        let err = list.push(Argument::new("more").unwrap()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn accepts_well_ordered_list() {
        let mut list = ArgumentList::new();
        list.push(Argument::new("r1").unwrap().required(true)).unwrap();
        list.push(Argument::new("r2").unwrap().required(true)).unwrap();
        list.push(Argument::new("opt3").unwrap()).unwrap();
        list.push(Argument::new("rest").unwrap().multiple(true)).unwrap();
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn camel_cases_name() {
        let arg = Argument::new("output-file").unwrap();
        assert_eq!(arg.camel_case_name(), "outputFile");
    }
}
