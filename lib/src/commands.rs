// Copyright 2018 Lyndon Brown
//
// This file is part of the `keelson` command-line argument parsing library.
//
// Licensed under the MIT license or the Apache license (version 2.0), at your option. You may not
// copy, modify, or distribute this file except in compliance with said license. You can find copies
// of these licenses either in the LICENSE-MIT and LICENSE-APACHE files, or alternatively at
// <http://opensource.org/licenses/MIT> and <http://www.apache.org/licenses/LICENSE-2.0>
// respectively.

//! Command dispatch components
//!
//! A command is not a distinct type from a [`Context`](crate::context::Context) — it's a context
//! with a name, with visible aliases registered in its parent's lookup, and (usually) an
//! [`ActionFn`] attached. This module supplies the pieces that live around that: the shape an
//! action is invoked with, and what it may hand back.

use crate::cli::OutputWriter;
use crate::error::Error;
use crate::options::BoxFuture;
use crate::parser::ParseResult;
use std::sync::Arc;

/// A thunk that renders help text for the command an action was invoked as, via the configured
/// [`HelpRenderer`](crate::cli::HelpRenderer)
pub type HelpFn = Arc<dyn Fn() -> String + Send + Sync>;

/// What a command action is invoked with
///
/// Carries the [`ParseResult`] for the completed parse, every warning accumulated while building
/// the tree (principally from extension loading), a `console` handle for the action's own output
/// (so it shares the root [`Cli`](crate::cli::Cli)'s output sink rather than writing to the
/// process's real streams directly), and a `help` thunk that renders this command's help text on
/// demand.
pub struct ActionInput {
    /// The completed parse result
    pub result: ParseResult,
    /// Load-time warnings accumulated up to this point (extension resolution falling back to a
    /// stub, elided duplicate aliases, …)
    pub warnings: Vec<Arc<Error>>,
    /// The output sink this action should write through
    pub console: Arc<dyn OutputWriter>,
    /// Render this command's help text via the configured
    /// [`HelpRenderer`](crate::cli::HelpRenderer)
    pub help: HelpFn,
}

/// What a command action hands back
#[derive(Debug, Clone)]
pub enum ActionResult {
    /// No particular payload; the action ran for its side effects
    Unit,
    /// The action wants dispatch to conclude with this process exit code (used by the built-in
    /// help/version actions)
    Exit(i32),
    /// An arbitrary structured payload
    Value(serde_json::Value),
}

/// A command action
///
/// Always asynchronous — see the crate's async execution model — so an action that needs to do
/// I/O (including an extension's subprocess spawn) never blocks the dispatch loop.
pub type ActionFn = Arc<dyn Fn(ActionInput) -> BoxFuture<'static, Result<ActionResult, Error>> + Send + Sync>;
