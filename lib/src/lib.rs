// Copyright 2017 Lyndon Brown
//
// This file is part of the `keelson` command-line argument parsing library.
//
// Licensed under the MIT license or the Apache license (version 2.0), at your option. You may not
// copy, modify, or distribute this file except in compliance with said license. You can find copies
// of these licenses either in the LICENSE-MIT and LICENSE-APACHE files, or alternatively at
// <http://opensource.org/licenses/MIT> and <http://www.apache.org/licenses/LICENSE-2.0>
// respectively.

//! A declarative, tree-structured command-line argument parser, with pluggable extension loading
//! and an async execution model for option callbacks and command actions.
//!
//! Licensed under the MIT license or the Apache license, Version 2.0, at your option.
//!
//! # Documentation
//!
//! Most of this crate's documentation is found within its submodules: [`context`] for the
//! declarative tree, [`options`] for the option format grammar, [`parser`] for the argument-vector
//! walk, [`extension`] for loading external subtrees, and [`cli`] for tying all of the above
//! together into a runnable program entry point.

#![doc(html_logo_url = "https://github.com/jnqnfe/gong/raw/master/logo.png",
       html_favicon_url = "https://github.com/jnqnfe/gong/raw/master/favicon.ico")]

#![deny(bare_trait_objects)]

#[cfg(feature = "suggestions")]
extern crate strsim;

pub mod arguments;
pub mod cli;
pub mod commands;
pub mod context;
pub mod error;
pub mod extension;
pub mod lookup;
pub mod options;
pub mod parser;
pub mod value;

pub use arguments::Argument;
pub use cli::{Cli, CliOutcome, CliParams};
pub use context::Context;
pub use error::Error;
pub use extension::{Loader, LoadOutcome};
pub use options::OptionDef;
pub use parser::ParseResult;
pub use value::{TypeTag, Value};
