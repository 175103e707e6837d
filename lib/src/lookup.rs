// Copyright 2018 Lyndon Brown
//
// This file is part of the `keelson` command-line argument parsing library.
//
// Licensed under the MIT license or the Apache license (version 2.0), at your option. You may not
// copy, modify, or distribute this file except in compliance with said license. You can find copies
// of these licenses either in the LICENSE-MIT and LICENSE-APACHE files, or alternatively at
// <http://opensource.org/licenses/MIT> and <http://www.apache.org/licenses/LICENSE-2.0>
// respectively.

//! The per-context lookup table
//!
//! A [`Lookup`] is the three keyed maps a [`Context`](crate::context::Context) maintains alongside
//! its option and command lists: `long` and `short` map option identifiers to the
//! [`OptionDef`](crate::options::OptionDef) that owns them (including every visible alias, not just
//! the canonical name), and `commands` maps a command (or visible command alias) name to the child
//! [`Context`](crate::context::Context) it resolves to.
//!
//! Unlike options, which the [parser](crate::parser) resolves by walking outward through parent
//! contexts, `commands` is consulted only in the *current* context — commands do not inherit
//! across scope.

use crate::context::Context;
use crate::options::OptionDef;
use std::collections::HashMap;
use std::sync::Arc;

/// The three keyed maps owned by a single [`Context`](crate::context::Context)
#[derive(Default)]
pub struct Lookup {
    /// Long option name (or visible alias) → owning option
    pub long: HashMap<String, Arc<OptionDef>>,
    /// Short option character (or visible alias) → owning option
    pub short: HashMap<char, Arc<OptionDef>>,
    /// Command name (or visible alias) → child context
    pub commands: HashMap<String, Context>,
}

impl Lookup {
    /// Create an empty lookup
    pub fn new() -> Self {
        Self::default()
    }
}
