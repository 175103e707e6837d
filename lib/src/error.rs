// Copyright 2017 Lyndon Brown
//
// This file is part of the `keelson` command-line argument parsing library.
//
// Licensed under the MIT license or the Apache license (version 2.0), at your option. You may not
// copy, modify, or distribute this file except in compliance with said license. You can find copies
// of these licenses either in the LICENSE-MIT and LICENSE-APACHE files, or alternatively at
// <http://opensource.org/licenses/MIT> and <http://www.apache.org/licenses/LICENSE-2.0>
// respectively.

//! The error taxonomy
//!
//! Every fallible operation in this crate — declarative tree construction, option-format parsing,
//! value coercion, parsing, and extension loading — reports failure through a single [`Error`]
//! enum. Each variant carries the fields relevant to diagnosing it (the option or argument name, the
//! offending value, the expected kind) rather than a loose string bag, so callers can match on
//! `Error` without re-parsing a message.
//!
//! Every fallible entry point in this crate returns `Result<T, Error>`, not a loosely-typed
//! `anyhow::Result` — a consumer (such as the `bin` crate's `main`) is free to layer `anyhow` on
//! top of that at its own boundary, but the library itself never reaches for it.

use std::path::PathBuf;

/// The full error taxonomy for this crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A declarative call received a value of the wrong shape or type
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem
        message: String,
    },

    /// An `Option` description itself was invalid (not its format string — see
    /// [`InvalidOptionFormat`](Error::InvalidOptionFormat))
    #[error("invalid option {name:?}: {message}")]
    InvalidOption {
        /// The option's best-known name
        name: String,
        /// Description of the problem
        message: String,
    },

    /// An option format string did not match the grammar described in the [`options`](crate::options) module
    #[error("invalid option format {format:?}: {message}")]
    InvalidOptionFormat {
        /// The offending format string
        format: String,
        /// Description of the problem
        message: String,
    },

    /// An alias was empty or otherwise ill-formed
    #[error("invalid alias {alias:?}: {message}")]
    InvalidAlias {
        /// The offending alias text
        alias: String,
        /// Description of the problem
        message: String,
    },

    /// A value could not be coerced to the type tag declared for an option or argument
    #[error("invalid data for {name:?}: expected a value of type {expected}")]
    InvalidDataType {
        /// The option or argument name
        name: String,
        /// The expected type tag, as text (`"number"`, `"date"`, …)
        expected: &'static str,
    },

    /// A value was rejected by a declared validator, or otherwise deemed semantically invalid
    #[error("invalid value {value:?} for {name:?}")]
    InvalidValue {
        /// The option or argument name
        name: String,
        /// The raw, as-typed value
        value: String,
    },

    /// A value could not be parsed as a number
    #[error("invalid number {value:?} for {name:?}")]
    InvalidNumber {
        /// The option or argument name
        name: String,
        /// The raw, as-typed value
        value: String,
    },

    /// A value could not be parsed as a date (expected `YYYY-MM-DD`)
    #[error("invalid date {value:?} for {name:?}: expected YYYY-MM-DD")]
    InvalidDate {
        /// The option or argument name
        name: String,
        /// The raw, as-typed value
        value: String,
    },

    /// A value declared with the `json` type tag did not parse as JSON
    #[error("invalid JSON for {name:?}: {source}")]
    InvalidJson {
        /// The option or argument name
        name: String,
        /// The underlying parse error
        #[source]
        source: serde_json::Error,
    },

    /// A value declared with the `yesno` type tag was neither a yes- nor no-form
    #[error("{name:?} must be one of yes/no, got {value:?}")]
    NotYesNo {
        /// The option or argument name
        name: String,
        /// The raw, as-typed value
        value: String,
    },

    /// A coerced value was rejected by a declared validator as out of range
    #[error("value {value:?} for {name:?} out of range: {message}")]
    RangeError {
        /// The option or argument name
        name: String,
        /// The raw, as-typed value
        value: String,
        /// Description of the problem
        message: String,
    },

    /// A required positional [`Argument`](crate::arguments::Argument) had no matching input token
    #[error("missing required argument {name:?}")]
    MissingRequiredArgument {
        /// The argument's name
        name: String,
    },

    /// A required-value option was given with no value
    #[error("missing required value for option {name:?}")]
    MissingRequiredOption {
        /// The option's canonical name
        name: String,
    },

    /// A command or option name collided with an existing declaration in the same [`Context`](crate::context::Context)
    #[error("{kind} {name:?} already exists in this context")]
    AlreadyExists {
        /// `"command"` or `"option"`
        kind: &'static str,
        /// The colliding name
        name: String,
    },

    /// Two mutually exclusive parameters were both provided
    #[error("conflicting parameters: {message}")]
    Conflict {
        /// Description of the conflict
        message: String,
    },

    /// A declared `default_command` named no registered command
    #[error("default command {name:?} not found")]
    DefaultCommandNotFound {
        /// The undiscoverable command name
        name: String,
    },

    /// A referenced filesystem resource did not exist
    #[error("file not found: {}", path.display())]
    FileNotFound {
        /// The path that was looked up
        path: PathBuf,
    },

    /// A named help template did not exist (surfaced by the external help renderer; the core only
    /// propagates it)
    #[error("template not found: {name}")]
    TemplateNotFound {
        /// The template's name
        name: String,
    },

    /// An extension could not be loaded or resolved to an executable
    #[error("invalid extension {name:?}: {message}")]
    InvalidExtension {
        /// The extension's reference (path or name)
        name: String,
        /// Description of the problem
        message: String,
    },

    /// An extension's package manifest was present but malformed
    #[error("invalid package manifest at {}: {message}", path.display())]
    InvalidPackageJson {
        /// The manifest's path
        path: PathBuf,
        /// Description of the problem
        message: String,
    },

    /// No executable could be resolved for an extension reference
    #[error("no executable found for extension {name:?}")]
    NoExecutable {
        /// The extension's reference
        name: String,
    },

    /// The runtime-version preflight failed: the build does not meet a caller-declared minimum
    #[error("runtime version requirement not met: need at least {required}, this build supports {actual}")]
    InvalidRuntimeVersion {
        /// The caller-declared minimum
        required: String,
        /// What this build actually supports
        actual: String,
    },

    /// A sentinel thrown by an option that exists only to suppress an inherited option (e.g. a
    /// non-keelson extension's hidden `--version`)
    #[error("{name:?} is not an option on this command")]
    NotAnOption {
        /// The suppressed option's name
        name: String,
    },
}

impl Error {
    /// Construct an [`InvalidArgument`](Error::InvalidArgument) with a formatted message
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument { message: message.into() }
    }
}
