// Copyright 2021 Lyndon Brown
//
// This file is part of the `keelson` command-line argument parsing library.
//
// Licensed under the MIT license or the Apache license (version 2.0), at your option. You may not
// copy, modify, or distribute this file except in compliance with said license. You can find copies
// of these licenses either in the LICENSE-MIT and LICENSE-APACHE files, or alternatively at
// <http://opensource.org/licenses/MIT> and <http://www.apache.org/licenses/LICENSE-2.0>
// respectively.

//! The CLI entry point
//!
//! [`Cli`] is the root [`Context`] plus everything that context alone can't own: the auto-wired
//! `--help`/`--version`/`--no-banner`/`--no-color` options, the two output streams, the
//! [extension loader](crate::extension), and the [`exec`](Cli::exec) dispatch loop that turns a
//! completed parse into a selected command and its result.
//!
//! Help rendering itself — the template engine that turns a context chain into displayable text —
//! is explicitly out of this crate's scope; [`HelpRenderer`] is the seam a consumer plugs their own
//! renderer into.

use crate::arguments::Argument;
use crate::commands::{ActionFn, ActionInput, ActionResult};
use crate::context::Context;
use crate::error::Error;
use crate::extension::{self, ExtensionOptions, Loader, NullLoader};
use crate::options::{BoxFuture, CallbackOutcome, OptionDef};
use crate::parser::{self, ParseResult};
use crate::value::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A sink a [`Cli`] writes rendered output to
///
/// The default construction wires [`StdoutWriter`]/[`StderrWriter`], which write straight to the
/// process's real standard streams; a consumer that wants to capture output (tests, a GUI host)
/// supplies its own implementation.
pub trait OutputWriter: Send + Sync {
    /// Write `text` to this sink
    fn write(&self, text: &str);
}

/// The default stdout sink: writes straight to the process's real standard output
pub struct StdoutWriter;

impl OutputWriter for StdoutWriter {
    fn write(&self, text: &str) {
        use std::io::Write;
        print!("{}", text);
        let _ = std::io::stdout().flush();
    }
}

/// The default stderr sink: writes straight to the process's real standard error
pub struct StderrWriter;

impl OutputWriter for StderrWriter {
    fn write(&self, text: &str) {
        use std::io::Write;
        eprint!("{}", text);
        let _ = std::io::stderr().flush();
    }
}

/// The external collaborator that turns a traversed context chain (and, on the error path, the
/// triggering [`Error`]) into displayable help text
///
/// This crate only consumes the interface; the template engine and markdown/colorization behind it
/// are out of scope (§1 of the design document).
pub trait HelpRenderer: Send + Sync {
    /// Render help text for the given context chain (terminal-first, as in
    /// [`ParseResult::contexts`])
    fn render(&self, contexts: &[Context], err: Option<&Error>, render_opts: &serde_json::Value) -> String;
}

/// A [`HelpRenderer`] that emits a minimal one-line usage summary
///
/// Used when no renderer is configured; real programs are expected to supply their own.
pub struct PlaintextHelpRenderer;

impl HelpRenderer for PlaintextHelpRenderer {
    fn render(&self, contexts: &[Context], err: Option<&Error>, _render_opts: &serde_json::Value) -> String {
        let path: Vec<String> = contexts.iter().rev().filter_map(Context::name).collect();
        let prog = if path.is_empty() { "<cli>".to_string() } else { path.join(" ") };
        match err {
            Some(e) => format!("error: {}\n\nusage: {} [options] [arguments]\n", e, prog),
            None => format!("usage: {} [options] [arguments]\n", prog),
        }
    }
}

/// Declarative construction parameters for a [`Cli`]
///
/// Mirrors the `CLI::new(params)` object surface described in the design document as an explicit,
/// typed struct rather than an untyped map — the host language has no structural-literal type that
/// could be confused for it.
pub struct CliParams {
    /// Program name, used in help/version output and as the default banner title
    pub name: Option<String>,
    /// Display title, if different from `name`
    pub title: Option<String>,
    /// Program description
    pub desc: Option<String>,
    /// Version string; when set, wires up `-v, --version` unless already taken
    pub version: Option<String>,
    /// Banner text, emitted at most once on first write to either output stream
    pub banner: Option<String>,
    /// Minimum required version the caller declares it needs this build to support, compared
    /// against this crate's own supported minimum at [`exec`](Cli::exec) time (see `DESIGN.md`)
    pub runtime_version: Option<String>,
    /// Whether to wire up `--no-color`/`--no-colors` (default `true`)
    pub colors: bool,
    /// Suppress the auto `--no-color` option even when `colors` is set
    pub hide_no_color_option: bool,
    /// Suppress the auto `--no-banner` option even when `banner` is set
    pub hide_no_banner_option: bool,
    /// Register the built-in `help` command and `-h, --help` option (default `false`)
    pub help: bool,
    /// Process exit code the help command's action reports (default `0` if help is enabled)
    pub help_exit_code: Option<i32>,
    /// Whether a parse error triggers the help command instead of propagating (default `true`)
    pub show_help_on_error: bool,
    /// Name of the command run when no command is selected on the command line
    pub default_command: Option<String>,
    /// Whether an unrecognized command token is an error (default `true`; currently only advisory
    /// — unrecognized plain tokens are always classified as positional per §4.3, this flag governs
    /// whether [`Cli::exec`]'s caller should treat a command-shaped leftover positional as fatal)
    pub error_if_unknown_command: bool,
    /// Seeds the root context's `treatUnknownOptionsAsArguments` property
    pub treat_unknown_options_as_arguments: bool,
    /// Seeds the root context's camelCasing of option canonical names (default `true`)
    pub camel_case: bool,
    /// Show a non-keelson extension's banner override (default `false`: suppressed)
    pub show_banner_for_external_clis: bool,
    /// Tolerate a missing extension reference as an invalid stub instead of failing construction
    pub ignore_missing_extensions: bool,
    /// Tolerate an unloadable/incompatible extension as an invalid stub instead of failing
    /// construction
    pub ignore_invalid_extensions: bool,
    /// Root-level extensions to load after the auto options are wired: `(reference, name)`: `name`
    /// defaults to the reference's file stem when absent
    pub extensions: Vec<(String, Option<String>)>,
    /// Override the stdout sink (default: the process's real stdout)
    pub stdout: Option<Arc<dyn OutputWriter>>,
    /// Override the stderr sink (default: the process's real stderr)
    pub stderr: Option<Arc<dyn OutputWriter>>,
    /// Opaque options passed through to the [`HelpRenderer`]
    pub render_opts: serde_json::Value,
    /// The extension [`Loader`] used to resolve in-process extensions (default: [`NullLoader`],
    /// which reports every extension as not keelson-compatible)
    pub loader: Option<Arc<dyn Loader>>,
    /// The [`HelpRenderer`] used for `--help`/the `help` command (default:
    /// [`PlaintextHelpRenderer`])
    pub help_renderer: Option<Arc<dyn HelpRenderer>>,
}

impl Default for CliParams {
    fn default() -> Self {
        CliParams {
            name: None,
            title: None,
            desc: None,
            version: None,
            banner: None,
            runtime_version: None,
            colors: true,
            hide_no_color_option: false,
            hide_no_banner_option: false,
            help: false,
            help_exit_code: None,
            show_help_on_error: true,
            default_command: None,
            error_if_unknown_command: true,
            treat_unknown_options_as_arguments: false,
            camel_case: true,
            show_banner_for_external_clis: false,
            ignore_missing_extensions: false,
            ignore_invalid_extensions: false,
            extensions: Vec::new(),
            stdout: None,
            stderr: None,
            render_opts: serde_json::Value::Null,
            loader: None,
            help_renderer: None,
        }
    }
}

macro_rules! builder_field {
    ($name:ident: $ty:ty) => {
        /// Set the
        #[doc = stringify!($name)]
        /// parameter
        pub fn $name(mut self, $name: $ty) -> Self {
            self.$name = $name;
            self
        }
    };
}

impl CliParams {
    /// Start from the defaults described on each field
    pub fn new() -> Self {
        Self::default()
    }

    builder_field!(colors: bool);
    builder_field!(hide_no_color_option: bool);
    builder_field!(hide_no_banner_option: bool);
    builder_field!(help: bool);
    builder_field!(show_help_on_error: bool);
    builder_field!(error_if_unknown_command: bool);
    builder_field!(treat_unknown_options_as_arguments: bool);
    builder_field!(camel_case: bool);
    builder_field!(show_banner_for_external_clis: bool);
    builder_field!(ignore_missing_extensions: bool);
    builder_field!(ignore_invalid_extensions: bool);
    builder_field!(render_opts: serde_json::Value);

    /// Set the program name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the display title
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the program description
    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }

    /// Set the version string
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the banner text
    pub fn banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = Some(banner.into());
        self
    }

    /// Set the caller's minimum required runtime version
    pub fn runtime_version(mut self, version: impl Into<String>) -> Self {
        self.runtime_version = Some(version.into());
        self
    }

    /// Set the help command's process exit code
    pub fn help_exit_code(mut self, code: i32) -> Self {
        self.help_exit_code = Some(code);
        self
    }

    /// Set the default command's name
    pub fn default_command(mut self, name: impl Into<String>) -> Self {
        self.default_command = Some(name.into());
        self
    }

    /// Add a root-level extension reference, optionally under an explicit name
    pub fn extension(mut self, reference: impl Into<String>, name: Option<&str>) -> Self {
        self.extensions.push((reference.into(), name.map(str::to_string)));
        self
    }

    /// Override the stdout sink
    pub fn stdout(mut self, writer: Arc<dyn OutputWriter>) -> Self {
        self.stdout = Some(writer);
        self
    }

    /// Override the stderr sink
    pub fn stderr(mut self, writer: Arc<dyn OutputWriter>) -> Self {
        self.stderr = Some(writer);
        self
    }

    /// Set the extension loader
    pub fn loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Set the help renderer
    pub fn help_renderer(mut self, renderer: Arc<dyn HelpRenderer>) -> Self {
        self.help_renderer = Some(renderer);
        self
    }
}

/// Shared output-stream state: the two sinks, plus the "emit the banner at most once, first writer
/// wins" bookkeeping described in the design document's open questions
struct Streams {
    stdout: Arc<dyn OutputWriter>,
    stderr: Arc<dyn OutputWriter>,
    banner_emitted: AtomicBool,
    banner_suppressed: AtomicBool,
}

impl Streams {
    fn suppress_banner(&self) {
        self.banner_suppressed.store(true, Ordering::SeqCst);
    }

    fn emit_banner(&self, banner: Option<&str>) {
        if self.banner_suppressed.load(Ordering::SeqCst) {
            return;
        }
        if let Some(text) = banner {
            if !self.banner_emitted.swap(true, Ordering::SeqCst) {
                self.stdout.write(text);
                self.stdout.write("\n");
            }
        }
    }

    fn write_stdout(&self, banner: Option<&str>, text: &str) {
        self.emit_banner(banner);
        self.stdout.write(text);
    }

    /// Flush both streams; a no-op for the default print!/eprint! sinks, but the hook a consumer's
    /// own buffered [`OutputWriter`] would act on. Stands in for the source tool's process-wide
    /// exit hook (see the "Global process-exit hook" design note) — the crate never registers a
    /// process-level hook itself; the consumer calls [`Cli::shutdown`] (directly, or implicitly via
    /// [`Cli::exec`]) at a point of its own choosing.
    fn flush(&self) {
        self.stdout.write("");
        self.stderr.write("");
    }
}

/// The minimum Rust toolchain version this build was compiled against, consulted by the
/// runtime-version preflight (§6.1 of the design document)
const SUPPORTED_RUNTIME_VERSION: (u32, u32, u32) = (1, 70, 0);

fn parse_version(s: &str) -> Option<(u32, u32, u32)> {
    let mut parts = s.trim().split('.').map(|p| p.parse::<u32>().ok());
    let major = parts.next()??;
    let minor = parts.next().flatten().unwrap_or(0);
    let patch = parts.next().flatten().unwrap_or(0);
    Some((major, minor, patch))
}

/// What [`Cli::exec`] hands back: either a raw parse result (no command was selected) or the
/// outcome of running one (explicit, defaulted, or help-redirected)
pub enum CliOutcome {
    /// Parsing completed but no command — explicit, default, or help — was selected
    Parsed(ParseResult),
    /// A command ran (or a callback short-circuited) and produced this
    Action(ActionResult),
}

/// The root context plus the auto-wired options, output streams, and dispatch loop
pub struct Cli {
    root: Context,
    streams: Arc<Streams>,
    loader: Arc<dyn Loader>,
    help_renderer: Arc<dyn HelpRenderer>,
    help_enabled: bool,
    help_exit_code: i32,
    show_help_on_error: bool,
    show_banner_for_external_clis: bool,
    ignore_missing_extensions: bool,
    ignore_invalid_extensions: bool,
    runtime_version: Option<String>,
    render_opts: serde_json::Value,
    warnings: Mutex<Vec<Arc<Error>>>,
}

impl Cli {
    /// Build a new `Cli` from `params`
    ///
    /// Wires the auto-generated options in the order the design document specifies (help, then
    /// banner, then color, then version), registers the built-in `help` command if enabled, then
    /// loads every root-level extension — in that order, so extension-injected options can see the
    /// auto options and vice versa.
    pub async fn new(params: CliParams) -> Result<Self, Error> {
        if let Some(code) = params.help_exit_code {
            if code < 0 {
                return Err(Error::invalid_argument("help_exit_code must not be negative"));
            }
        }

        let root = Context::new_root();
        root.set_camel_case(params.camel_case);
        if let Some(name) = &params.name {
            root.set_property("name", serde_json::json!(name));
        }
        if let Some(title) = &params.title {
            root.set_title(title.clone());
        }
        if let Some(desc) = &params.desc {
            root.set_desc(desc.clone());
        }
        if let Some(banner) = &params.banner {
            root.set_banner(banner.clone());
        }
        root.set_property("treatUnknownOptionsAsArguments", serde_json::json!(params.treat_unknown_options_as_arguments));
        root.set_property("errorIfUnknownCommand", serde_json::json!(params.error_if_unknown_command));
        root.set_property("showBannerForExternalClis", serde_json::json!(params.show_banner_for_external_clis));
        if let Some(default_command) = &params.default_command {
            root.set_property("defaultCommand", serde_json::json!(default_command));
        }

        let stdout: Arc<dyn OutputWriter> = params.stdout.clone().unwrap_or_else(|| Arc::new(StdoutWriter));
        let stderr: Arc<dyn OutputWriter> = params.stderr.clone().unwrap_or_else(|| Arc::new(StderrWriter));
        let streams = Arc::new(Streams {
            stdout: stdout.clone(),
            stderr,
            banner_emitted: AtomicBool::new(false),
            banner_suppressed: AtomicBool::new(false),
        });

        let help_exit_code = params.help_exit_code.unwrap_or(0);

        if params.help {
            root.argument(Argument::new("command")?.desc("the command to show help for"))?;
            root.option(OptionDef::new("-h, --help", "").unwrap().desc("show help"))?;
            if root.get("defaultCommand").is_none() {
                root.set_property("defaultCommand", serde_json::json!("help"));
            }

            let renderer = params.help_renderer.clone().unwrap_or_else(|| Arc::new(PlaintextHelpRenderer) as Arc<dyn HelpRenderer>);
            let render_opts = params.render_opts.clone();
            let exit_code = help_exit_code;
            let action: ActionFn = Arc::new(move |input: ActionInput| {
                let renderer = renderer.clone();
                let render_opts = render_opts.clone();
                Box::pin(async move {
                    let text = if input.result.positional.is_empty() {
                        (input.help)()
                    } else {
                        let target = &input.result.positional[0];
                        let contexts = match input.result.contexts.last().and_then(|root| root.lookup_command(target)) {
                            Some(cmd) => vec![cmd, input.result.contexts.last().cloned().unwrap()],
                            None => input.result.contexts.clone(),
                        };
                        renderer.render(&contexts, None, &render_opts)
                    };
                    input.console.write(&text);
                    Ok(ActionResult::Exit(exit_code))
                }) as BoxFuture<'static, Result<ActionResult, Error>>
            });
            let help_ctx = root.command("help", Vec::new())?;
            help_ctx.set_action(action);
        }

        if params.banner.is_some() && !params.hide_no_banner_option {
            root.option(OptionDef::new("--no-banner", "").unwrap().desc("suppress the banner"))?;
        }

        if params.colors && !params.hide_no_color_option {
            root.option(OptionDef::new("--no-color, --no-colors", "").unwrap().desc("disable colored output"))?;
        }

        if let Some(version) = &params.version {
            if root.lookup_long("version").is_none() && root.lookup_short('v').is_none() {
                let version_text = version.clone();
                let writer = stdout.clone();
                let def = OptionDef::new("-v, --version", "").unwrap().desc("show version number").callback(Arc::new(
                    move |_args| {
                        let version_text = version_text.clone();
                        let writer = writer.clone();
                        Box::pin(async move {
                            writer.write(&version_text);
                            writer.write("\n");
                            Ok(CallbackOutcome::ShortCircuit(ActionResult::Exit(0)))
                        }) as BoxFuture<'static, Result<CallbackOutcome, Error>>
                    },
                ));
                root.option(def)?;
            }
        }

        let loader: Arc<dyn Loader> = params.loader.clone().unwrap_or_else(|| Arc::new(NullLoader));
        let ext_opts = ExtensionOptions {
            ignore_missing_extensions: params.ignore_missing_extensions,
            ignore_invalid_extensions: params.ignore_invalid_extensions,
        };

        let warnings = Mutex::new(Vec::new());
        for (reference, name) in &params.extensions {
            let name = name.clone().unwrap_or_else(|| stem_name(reference));
            match extension::resolve(&root, reference, &name, loader.as_ref(), ext_opts).await {
                Ok(ctx) => {
                    if let Some(state) = ctx.extension_state() {
                        if let crate::extension::ExtensionVariant::Invalid { message } = &*state.variant {
                            warnings.lock().unwrap().push(Arc::new(Error::InvalidExtension {
                                name: reference.clone(),
                                message: message.clone(),
                            }));
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Cli {
            root,
            streams,
            loader,
            help_renderer: params.help_renderer.clone().unwrap_or_else(|| Arc::new(PlaintextHelpRenderer) as Arc<dyn HelpRenderer>),
            help_enabled: params.help,
            help_exit_code,
            show_help_on_error: params.show_help_on_error,
            show_banner_for_external_clis: params.show_banner_for_external_clis,
            ignore_missing_extensions: params.ignore_missing_extensions,
            ignore_invalid_extensions: params.ignore_invalid_extensions,
            runtime_version: params.runtime_version.clone(),
            render_opts: params.render_opts,
            warnings,
        })
    }

    /// The root context, for declaring commands/options/arguments directly
    pub fn root(&self) -> &Context {
        &self.root
    }

    /// Declare a child command on the root context
    pub fn command(&self, name: &str, aliases: Vec<String>) -> Result<Context, Error> {
        self.root.command(name, aliases)
    }

    /// Declare an option on the root context
    pub fn option(&self, def: OptionDef) -> Result<Arc<OptionDef>, Error> {
        self.root.option(def)
    }

    /// Declare a positional argument on the root context
    pub fn argument(&self, arg: Argument) -> Result<(), Error> {
        self.root.argument(arg)
    }

    /// Load and graft an extension onto the root context after construction
    ///
    /// An extension-load failure tolerated by `ignore_missing_extensions`/
    /// `ignore_invalid_extensions` is recorded in [`Cli::warnings`] rather than returned.
    pub async fn extension(&self, reference: &str, name: Option<&str>) -> Result<Context, Error> {
        let name = name.map(str::to_string).unwrap_or_else(|| stem_name(reference));
        let opts = ExtensionOptions {
            ignore_missing_extensions: self.ignore_missing_extensions,
            ignore_invalid_extensions: self.ignore_invalid_extensions,
        };
        let ctx = extension::resolve(&self.root, reference, &name, self.loader.as_ref(), opts).await?;
        if let Some(state) = ctx.extension_state() {
            if let crate::extension::ExtensionVariant::Invalid { message } = &*state.variant {
                self.warnings.lock().unwrap().push(Arc::new(Error::InvalidExtension {
                    name: reference.to_string(),
                    message: message.clone(),
                }));
            }
        }
        Ok(ctx)
    }

    /// Load commands declared on the filesystem (§4.7): `path` may be a single manifest file or a
    /// directory of them (scanned one level deep, non-recursively). Each manifest is a small JSON
    /// declaration of a command's name/description/aliases — this crate cannot deserialize a
    /// handler function out of a file, so the actual [`ActionFn`] for each discovered name is
    /// looked up in `actions`; a name with no matching action is registered with a no-op action.
    ///
    /// This is a compile-time-safe reinterpretation of the source tool's "every file becomes a
    /// command" behavior, which relied on a dynamic `require()` the host language doesn't have; see
    /// `DESIGN.md`.
    pub fn load_filesystem_commands(
        &self,
        path: &Path,
        actions: &std::collections::HashMap<String, ActionFn>,
    ) -> Result<(), Error> {
        let files: Vec<PathBuf> = if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
                .map_err(|_| Error::FileNotFound { path: path.to_path_buf() })?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file() && p.extension().map(|e| e == "json").unwrap_or(false))
                .collect();
            entries.sort();
            entries
        } else {
            vec![path.to_path_buf()]
        };

        for file in files {
            let stem = file
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| Error::invalid_argument(format!("cannot derive a command name from {}", file.display())))?
                .to_string();
            if stem.chars().any(char::is_whitespace) {
                return Err(Error::invalid_argument(format!("command name {:?} contains whitespace", stem)));
            }

            let text = std::fs::read_to_string(&file).map_err(|_| Error::FileNotFound { path: file.clone() })?;
            let spec: CommandSpec = serde_json::from_str(&text).map_err(|e| Error::InvalidArgument {
                message: format!("malformed command declaration at {}: {}", file.display(), e),
            })?;

            let name = spec.name.unwrap_or(stem);
            let ctx = self.root.command(&name, spec.aliases)?;
            if let Some(desc) = spec.desc {
                ctx.set_desc(desc);
            }
            let action = actions.get(&name).cloned().unwrap_or_else(|| {
                Arc::new(|_input: ActionInput| {
                    Box::pin(async move { Ok(ActionResult::Unit) }) as BoxFuture<'static, Result<ActionResult, Error>>
                })
            });
            ctx.set_action(action);
        }

        Ok(())
    }

    /// Load-time warnings accumulated so far (extension resolution falling back to a stub)
    pub fn warnings(&self) -> Vec<Arc<Error>> {
        self.warnings.lock().unwrap().clone()
    }

    /// Flush both output streams
    ///
    /// [`exec`](Cli::exec) calls this on every exit path; exposed directly for a consumer that
    /// wants to flush without going through `exec` (e.g. after a callback short-circuits outside
    /// the dispatch loop).
    pub fn shutdown(&self) {
        self.streams.flush();
    }

    /// Parse `args` (default: `std::env::args().skip(1)`) against the context tree and dispatch to
    /// the selected command
    pub async fn exec(&self, args: Option<Vec<String>>) -> Result<CliOutcome, Error> {
        let outcome = self.exec_inner(args).await;
        self.shutdown();
        outcome
    }

    async fn exec_inner(&self, args: Option<Vec<String>>) -> Result<CliOutcome, Error> {
        self.preflight()?;

        let tokens = args.unwrap_or_else(|| std::env::args().skip(1).collect());

        let parsed = match parser::parse(&self.root, &tokens).await {
            Ok(result) => result,
            Err(e) => return self.handle_error(e, vec![self.root.clone()]).await,
        };

        if matches!(parsed.argv.get("banner"), Some(Value::Bool(false))) {
            self.streams.suppress_banner();
        }

        if let Some(result) = parsed.short_circuit.clone() {
            return Ok(CliOutcome::Action(result));
        }

        // Settle the banner now, once the terminal command (and hence any per-command override)
        // is known — regardless of whether a command action actually runs — so `console`, handed
        // to an action below, never has to race the banner for "first write" itself.
        let banner = self.effective_banner(&parsed.contexts);
        self.streams.emit_banner(banner.as_deref());

        let terminal = parsed.terminal().clone();
        let is_opaque_extension = terminal.is_extension()
            && terminal.extension_state().map(|s| s.is_executable()).unwrap_or(false);

        let wants_help = self.help_enabled
            && !is_opaque_extension
            && matches!(parsed.argv.get("help"), Some(Value::Bool(true)));

        if wants_help {
            return self.run_help(parsed, None).await;
        }

        if is_opaque_extension {
            return self.run_extension(&terminal, &parsed).await;
        }

        if let Some(action) = terminal.action() {
            return self.run_action(action, parsed).await;
        }

        // No explicit command reached: try the declared default.
        if parsed.contexts.len() == 1 {
            if let Some(serde_json::Value::String(name)) = self.root.get("defaultCommand") {
                let default_ctx = self
                    .root
                    .lookup_command(&name)
                    .ok_or_else(|| Error::DefaultCommandNotFound { name: name.clone() })?;
                if let Some(action) = default_ctx.action() {
                    let contexts = vec![default_ctx, self.root.clone()];
                    let result = ParseResult { contexts, ..parsed };
                    return self.run_action(action, result).await;
                }
            }
        }

        Ok(CliOutcome::Parsed(parsed))
    }

    async fn run_action(&self, action: ActionFn, result: ParseResult) -> Result<CliOutcome, Error> {
        let console = self.streams.stdout.clone();
        let help = self.build_help_thunk(result.contexts.clone());
        let warnings = self.warnings();
        let input = ActionInput { result, warnings, console, help };
        match action(input).await {
            Ok(outcome) => Ok(CliOutcome::Action(outcome)),
            Err(e) => self.handle_error(e, vec![self.root.clone()]).await,
        }
    }

    /// Build the `help` thunk handed to an action via [`ActionInput`]: a closure over this
    /// command's own context chain, so calling it renders the same text the built-in `help`
    /// command or `-h`/`--help` would for this command.
    fn build_help_thunk(&self, contexts: Vec<Context>) -> crate::commands::HelpFn {
        let renderer = self.help_renderer.clone();
        let render_opts = self.render_opts.clone();
        Arc::new(move || renderer.render(&contexts, None, &render_opts))
    }

    async fn run_help(&self, result: ParseResult, err: Option<&Error>) -> Result<CliOutcome, Error> {
        let contexts = result.contexts.clone();
        let banner = self.effective_banner(&contexts);
        let text = self.help_renderer.render(&contexts, err, &self.render_opts);
        self.streams.write_stdout(banner.as_deref(), &text);
        Ok(CliOutcome::Action(ActionResult::Exit(self.help_exit_code)))
    }

    async fn run_extension(&self, terminal: &Context, result: &ParseResult) -> Result<CliOutcome, Error> {
        let state = terminal.extension_state().expect("is_opaque_extension implies extension_state");
        match &*state.variant {
            crate::extension::ExtensionVariant::Executable { executable, exec_args } => {
                let code = extension::exec(executable, exec_args, &result.positional, true).await?;
                Ok(CliOutcome::Action(ActionResult::Exit(code.unwrap_or(0))))
            }
            crate::extension::ExtensionVariant::Invalid { message } => {
                self.streams.stderr.write(&format!("{}\n", message));
                Ok(CliOutcome::Action(ActionResult::Exit(1)))
            }
            crate::extension::ExtensionVariant::CliKit => {
                unreachable!("cli-kit extensions graft their own action-bearing commands")
            }
        }
    }

    async fn handle_error(&self, err: Error, fallback_contexts: Vec<Context>) -> Result<CliOutcome, Error> {
        if self.help_enabled && self.show_help_on_error {
            let result = ParseResult {
                positional: Vec::new(),
                argv: Default::default(),
                contexts: fallback_contexts,
                unknown: Default::default(),
                short_circuit: None,
            };
            return self.run_help(result, Some(&err)).await;
        }
        Err(err)
    }

    fn effective_banner(&self, contexts: &[Context]) -> Option<String> {
        let terminal = contexts.first()?;
        if let Some(banner) = terminal.banner() {
            if terminal.is_extension() && !self.show_banner_for_external_clis {
                return None;
            }
            return Some(banner);
        }
        self.root.banner()
    }

    fn preflight(&self) -> Result<(), Error> {
        if let Some(required) = &self.runtime_version {
            if let Some(required_v) = parse_version(required) {
                if required_v > SUPPORTED_RUNTIME_VERSION {
                    return Err(Error::InvalidRuntimeVersion {
                        required: required.clone(),
                        actual: format!(
                            "{}.{}.{}",
                            SUPPORTED_RUNTIME_VERSION.0, SUPPORTED_RUNTIME_VERSION.1, SUPPORTED_RUNTIME_VERSION.2
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A filesystem-declared command's metadata (§4.7): name/description/aliases only — the action
/// itself is resolved from the caller-supplied registry in
/// [`Cli::load_filesystem_commands`].
#[derive(Debug, serde::Deserialize)]
struct CommandSpec {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
}

fn stem_name(reference: &str) -> String {
    Path::new(reference)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(reference)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::ActionInput;

    #[tokio::test]
    async fn default_command_runs_when_no_command_given() {
        let cli = Cli::new(CliParams::new().default_command("greet")).await.unwrap();
        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = called.clone();
        let ctx = cli.command("greet", vec![]).unwrap();
        ctx.set_action(Arc::new(move |_input: ActionInput| {
            let flag = flag.clone();
            Box::pin(async move {
                flag.store(true, Ordering::SeqCst);
                Ok(ActionResult::Unit)
            }) as BoxFuture<'static, Result<ActionResult, Error>>
        }));

        let outcome = cli.exec(Some(vec![])).await.unwrap();
        assert!(called.load(Ordering::SeqCst));
        assert!(matches!(outcome, CliOutcome::Action(ActionResult::Unit)));
    }

    #[tokio::test]
    async fn explicit_command_overrides_default() {
        let cli = Cli::new(CliParams::new().default_command("a")).await.unwrap();
        let ctx_a = cli.command("a", vec![]).unwrap();
        ctx_a.set_action(Arc::new(|_: ActionInput| {
            Box::pin(async { Ok(ActionResult::Value(serde_json::json!("a"))) }) as BoxFuture<'static, Result<ActionResult, Error>>
        }));
        let ctx_b = cli.command("b", vec![]).unwrap();
        ctx_b.set_action(Arc::new(|_: ActionInput| {
            Box::pin(async { Ok(ActionResult::Value(serde_json::json!("b"))) }) as BoxFuture<'static, Result<ActionResult, Error>>
        }));

        let outcome = cli.exec(Some(vec!["b".to_string()])).await.unwrap();
        match outcome {
            CliOutcome::Action(ActionResult::Value(v)) => assert_eq!(v, serde_json::json!("b")),
            _ => panic!("expected action result"),
        }
    }

    #[tokio::test]
    async fn version_flag_short_circuits() {
        let cli = Cli::new(CliParams::new().version("1.2.3")).await.unwrap();
        let outcome = cli.exec(Some(vec!["--version".to_string()])).await.unwrap();
        assert!(matches!(outcome, CliOutcome::Action(ActionResult::Exit(0))));
    }

    #[tokio::test]
    async fn no_command_with_no_default_returns_parsed() {
        let cli = Cli::new(CliParams::new()).await.unwrap();
        let outcome = cli.exec(Some(vec![])).await.unwrap();
        assert!(matches!(outcome, CliOutcome::Parsed(_)));
    }

    #[tokio::test]
    async fn help_flag_renders_and_exits() {
        let cli = Cli::new(CliParams::new().help(true)).await.unwrap();
        cli.command("build", vec![]).unwrap();
        let outcome = cli.exec(Some(vec!["--help".to_string()])).await.unwrap();
        assert!(matches!(outcome, CliOutcome::Action(ActionResult::Exit(0))));
    }

    #[tokio::test]
    async fn preflight_rejects_unsatisfiable_runtime_requirement() {
        let cli = Cli::new(CliParams::new().runtime_version("999.0.0")).await.unwrap();
        let err = cli.exec(Some(vec![])).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRuntimeVersion { .. }));
    }

    #[tokio::test]
    async fn negated_color_alias_shares_canonical_name() {
        let cli = Cli::new(CliParams::new()).await.unwrap();
        let outcome = cli.exec(Some(vec!["--no-colors".to_string()])).await.unwrap();
        match outcome {
            CliOutcome::Parsed(result) => assert_eq!(result.argv.get("color"), Some(&Value::Bool(false))),
            _ => panic!("expected parsed result"),
        }
    }
}
