// Copyright 2021 Lyndon Brown
//
// This file is part of the `keelson` command-line argument parsing library.
//
// Licensed under the MIT license or the Apache license (version 2.0), at your option. You may not
// copy, modify, or distribute this file except in compliance with said license. You can find copies
// of these licenses either in the LICENSE-MIT and LICENSE-APACHE files, or alternatively at
// <http://opensource.org/licenses/MIT> and <http://www.apache.org/licenses/LICENSE-2.0>
// respectively.

//! Extension resolution and execution
//!
//! An extension grafts a subtree supplied from *outside* the declaring program's own source onto
//! the command tree: either an in-process command tree loaded through a [`Loader`], or an opaque
//! executable that gets spawned as a child process and awaited. [`resolve`] implements the
//! three-way decision tree described at the module's call site in `cli.rs`; [`exec`] implements
//! the resulting executable variant's invocation.
//!
//! The original tool resolves this in-process case with a `require()` call and reflects on the
//! loaded module's shape (`__esModule`, etc.) to decide whether it's cli-kit-compatible. A
//! dynamically loaded Rust crate cannot be introspected that way, and sharing an `Rc<RefCell<_>>`
//! context graph across a `dlopen`'d compilation unit is unsound regardless of ABI stability
//! games. Loading is therefore pushed behind a [`Loader`] trait the consumer implements however
//! they see fit (a static plugin registry, a `libloading` dylib with a stable FFI boundary that
//! hands back owned data instead of a `Context`, …); the core only consumes the three possible
//! outcomes.

use crate::context::Context;
use crate::error::Error;
use crate::options::BoxFuture;
use serde::Deserialize;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

/// The manifest consulted when an extension reference resolves to an on-disk path: a JSON file
/// named `keelson.json` living alongside (or above) the referenced path, mirroring the role a
/// `package.json` plays for the source tool.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    /// The extension's declared name
    pub name: String,
    /// Entry point, relative to the manifest, for a keelson-compatible extension
    #[serde(default)]
    pub main: Option<String>,
    /// Human-readable description, copied onto the grafted command if it has none of its own
    #[serde(default)]
    pub description: Option<String>,
    /// Declared aliases, in addition to any sibling `bin` entries that share this extension's
    /// target
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Named executables this package provides, name → relative path
    #[serde(default)]
    pub bin: HashMap<String, String>,
    /// keelson-compatibility declaration
    #[serde(default)]
    pub keelson: Option<KeelsonMetadata>,
}

/// The keelson-compatibility block of a [`Manifest`]
#[derive(Debug, Clone, Deserialize)]
pub struct KeelsonMetadata {
    /// Whether this extension's `main` entry point yields a keelson [`Context`] tree
    #[serde(default)]
    pub compatible: bool,
}

/// What a [`Loader`] found at an extension's resolved entry point
pub enum LoadOutcome {
    /// The entry point yielded a compatible context tree, ready to be mixed in
    Compatible(Context),
    /// The entry point loaded but was not keelson-compatible
    Incompatible,
}

/// A pluggable loader for in-process, keelson-compatible extensions
///
/// The core never loads code itself; it asks the configured loader to resolve a manifest's `main`
/// entry point and hands back one of [`LoadOutcome::Compatible`], [`LoadOutcome::Incompatible`], or
/// an error. The default [`NullLoader`] always reports [`LoadOutcome::Incompatible`], which is the
/// conservative, always-sound choice for a consumer that hasn't wired up its own plugin mechanism.
pub trait Loader: Send + Sync {
    /// Attempt to load the entry point named by `manifest.main`, resolved relative to
    /// `manifest_dir`
    fn load<'a>(
        &'a self,
        manifest_dir: &'a Path,
        manifest: &'a Manifest,
    ) -> BoxFuture<'a, Result<LoadOutcome, Error>>;
}

/// The default [`Loader`]: reports every extension as incompatible
///
/// Consumers that want in-process extensions supply their own [`Loader`] (e.g. one backed by a
/// static plugin registry keyed on the manifest name).
pub struct NullLoader;

impl Loader for NullLoader {
    fn load<'a>(
        &'a self,
        _manifest_dir: &'a Path,
        _manifest: &'a Manifest,
    ) -> BoxFuture<'a, Result<LoadOutcome, Error>> {
        Box::pin(async move { Ok(LoadOutcome::Incompatible) })
    }
}

/// The terminal state an [`Extension`](crate::context::ContextKind::Extension) context settles
/// into once [`resolve`] has run
#[derive(Clone)]
pub enum ExtensionVariant {
    /// The manifest's entry point yielded a compatible context tree, already mixed into this
    /// extension's context
    CliKit,
    /// An opaque executable to spawn; either an OS executable resolved on `PATH`, or a script run
    /// under the platform shell (the closest idiomatic analogue of "the current language
    /// runtime" for a compiled target — see `DESIGN.md`)
    Executable {
        /// The program to spawn
        executable: PathBuf,
        /// Arguments to prepend before any command-line passthrough
        exec_args: Vec<String>,
    },
    /// Could not be loaded, but `ignore_missing_extensions`/`ignore_invalid_extensions` allowed
    /// construction to continue; `exec` only emits a diagnostic
    Invalid {
        /// Why resolution failed
        message: String,
    },
}

/// Extension-specific state attached to a [`Context`] of kind
/// [`Extension`](crate::context::ContextKind::Extension)
#[derive(Clone)]
pub struct ExtensionState {
    /// The reference the extension was declared with (path or bare executable name)
    pub reference: String,
    /// The resolved variant
    pub variant: Arc<ExtensionVariant>,
}

impl ExtensionState {
    /// Whether this extension resolved to a keelson-compatible in-process subtree
    pub fn is_cli_kit_extension(&self) -> bool {
        matches!(&*self.variant, ExtensionVariant::CliKit)
    }

    /// Whether this extension is an opaque, out-of-process executable
    pub fn is_executable(&self) -> bool {
        matches!(&*self.variant, ExtensionVariant::Executable { .. })
    }
}

/// Flags governing how missing/invalid extensions are tolerated at construction time
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionOptions {
    /// An extension reference that resolves to nothing on disk or `PATH` becomes an invalid stub
    /// instead of a construction-time error
    pub ignore_missing_extensions: bool,
    /// A reference that resolves to something unusable (bad manifest, load error, incompatible
    /// entry point) becomes an invalid stub instead of a construction-time error
    pub ignore_invalid_extensions: bool,
}

const MANIFEST_FILE_NAME: &str = "keelson.json";

/// The outcome of resolving an extension reference, prior to grafting it into the tree
enum Resolution {
    /// A compatible in-process context tree, already produced by the [`Loader`]
    CliKit(Context),
    /// An opaque executable to spawn
    Executable { executable: PathBuf, exec_args: Vec<String> },
    /// Could not be loaded, tolerated by an `ignore_*` flag
    Invalid { message: String },
}

/// Aliases and description synthesized from an on-disk manifest, carried back alongside a
/// [`Resolution`] so the caller can graft them onto the new child regardless of which variant the
/// extension resolved to.
#[derive(Default)]
struct ResolvedMeta {
    aliases: Vec<String>,
    description: Option<String>,
}

/// Resolve `reference` into its terminal variant per the three-branch algorithm described in the
/// crate's design documentation, grafting it into `parent` under `name` and returning the new
/// child [`Context`].
pub async fn resolve(
    parent: &Context,
    reference: &str,
    name: &str,
    loader: &dyn Loader,
    opts: ExtensionOptions,
) -> Result<Context, Error> {
    let (resolution, meta) = resolve_reference(reference, loader, opts).await?;
    let meta = meta.unwrap_or_default();

    let child = parent.command(name, meta.aliases)?;
    child.mark_as_extension();

    if let Some(description) = meta.description {
        if child.desc().is_none() {
            child.set_desc(description);
        }
    }

    let variant = match resolution {
        Resolution::CliKit(tree) => {
            child.mix_from(&tree, false)?;
            ExtensionVariant::CliKit
        }
        Resolution::Executable { executable, exec_args } => ExtensionVariant::Executable { executable, exec_args },
        Resolution::Invalid { message } => ExtensionVariant::Invalid { message },
    };

    let is_cli_kit = matches!(variant, ExtensionVariant::CliKit);
    child.set_extension_state(ExtensionState { reference: reference.to_string(), variant: Arc::new(variant) });

    if !is_cli_kit {
        install_version_suppressor(&child)?;
    }

    Ok(child)
}

/// Install the hidden `-v, --version` suppressor described in §4.5: a non-cli-kit extension's
/// child process owns its own `--version` semantics, so the parent's `--version` callback must
/// never fire while this extension is the current context.
fn install_version_suppressor(ctx: &Context) -> Result<(), Error> {
    use crate::options::{CallbackOutcome, OptionDef};

    let def = OptionDef::new("-v, --version", "")
        .unwrap()
        .hidden(true)
        .callback(Arc::new(|_args| {
            Box::pin(async move {
                Err(Error::NotAnOption { name: "version".to_string() })
            }) as BoxFuture<'static, Result<CallbackOutcome, Error>>
        }));
    match ctx.option(def) {
        Ok(_) | Err(Error::AlreadyExists { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}

async fn resolve_reference(
    reference: &str,
    loader: &dyn Loader,
    opts: ExtensionOptions,
) -> Result<(Resolution, Option<ResolvedMeta>), Error> {
    // 1. a resolvable OS executable on PATH
    if let Ok(path) = which::which(reference) {
        log::debug!(target: "keelson::extension", "resolved {:?} as an executable on PATH: {}", reference, path.display());
        return Ok((Resolution::Executable { executable: path, exec_args: Vec::new() }, None));
    }

    let path = Path::new(reference);
    if path.exists() {
        return resolve_on_disk(reference, path, loader, opts).await;
    }

    if opts.ignore_missing_extensions {
        log::warn!(target: "keelson::extension", "extension {:?} not found, falling back to stub", reference);
        return Ok((Resolution::Invalid { message: format!("extension {:?} not found", reference) }, None));
    }
    Err(Error::InvalidExtension { name: reference.to_string(), message: "not found on PATH or disk".to_string() })
}

async fn resolve_on_disk(
    reference: &str,
    path: &Path,
    loader: &dyn Loader,
    opts: ExtensionOptions,
) -> Result<(Resolution, Option<ResolvedMeta>), Error> {
    let manifest_dir = if path.is_dir() { Some(path.to_path_buf()) } else { find_manifest_dir(path) };

    let manifest = match &manifest_dir {
        Some(dir) => read_manifest(dir).ok(),
        None => None,
    };

    let meta = manifest.as_ref().map(|m| ResolvedMeta {
        aliases: synthesize_aliases(m, None),
        description: m.description.clone(),
    });

    match manifest {
        Some(manifest) if manifest.keelson.as_ref().map(|m| m.compatible).unwrap_or(false) => {
            let dir = manifest_dir.unwrap();
            match loader.load(&dir, &manifest).await {
                Ok(LoadOutcome::Compatible(tree)) => Ok((Resolution::CliKit(tree), meta)),
                Ok(LoadOutcome::Incompatible) if opts.ignore_invalid_extensions => {
                    log::warn!(target: "keelson::extension", "extension {:?} is not keelson-compatible, falling back to stub", reference);
                    Ok((Resolution::Invalid { message: format!("extension {:?} is not keelson-compatible", reference) }, meta))
                }
                Ok(LoadOutcome::Incompatible) => {
                    Err(Error::InvalidExtension { name: reference.to_string(), message: "not keelson-compatible".to_string() })
                }
                Err(e) if opts.ignore_invalid_extensions => {
                    log::warn!(target: "keelson::extension", "extension {:?} failed to load ({}), falling back to stub", reference, e);
                    Ok((Resolution::Invalid { message: format!("extension {:?} failed to load: {}", reference, e) }, meta))
                }
                Err(e) => Err(Error::InvalidExtension { name: reference.to_string(), message: e.to_string() }),
            }
        }
        _ => {
            // No keelson metadata (or no manifest at all): treat the file as a script run under
            // the platform shell.
            let shell = platform_shell();
            Ok((Resolution::Executable { executable: shell, exec_args: vec![path.display().to_string()] }, meta))
        }
    }
}

/// Walk upward from `path` looking for a sibling [`MANIFEST_FILE_NAME`]
fn find_manifest_dir(path: &Path) -> Option<PathBuf> {
    let mut dir = path.parent();
    while let Some(d) = dir {
        if d.join(MANIFEST_FILE_NAME).is_file() {
            return Some(d.to_path_buf());
        }
        dir = d.parent();
    }
    None
}

fn read_manifest(dir: &Path) -> Result<Manifest, Error> {
    let manifest_path = dir.join(MANIFEST_FILE_NAME);
    let text = std::fs::read_to_string(&manifest_path)
        .map_err(|_| Error::FileNotFound { path: manifest_path.clone() })?;
    serde_json::from_str(&text).map_err(|e| Error::InvalidPackageJson {
        path: manifest_path,
        message: e.to_string(),
    })
}

#[cfg(windows)]
fn platform_shell() -> PathBuf {
    PathBuf::from("cmd")
}

#[cfg(not(windows))]
fn platform_shell() -> PathBuf {
    PathBuf::from("sh")
}

/// Collect the aliases an extension should be registered under: the manifest's declared `aliases`
/// plus every `bin` entry that points at the same target as `main`/the reference itself.
pub fn synthesize_aliases(manifest: &Manifest, main_target: Option<&str>) -> Vec<String> {
    let mut aliases = manifest.aliases.clone();
    if let Some(target) = main_target.or(manifest.main.as_deref()) {
        for (bin_name, bin_target) in &manifest.bin {
            if bin_target == target && !aliases.contains(bin_name) {
                aliases.push(bin_name.clone());
            }
        }
    }
    aliases
}

/// Spawn an extension's resolved executable and wait for it to exit
///
/// `passthrough` is every token on the original command line following the extension's own name.
/// Resolves with the child's exit code (or `None` if the process was killed by a signal); it never
/// rejects on a non-zero exit — that's left for the caller to inspect.
pub async fn exec(
    executable: &Path,
    exec_args: &[String],
    passthrough: &[String],
    inherit_stdio: bool,
) -> Result<Option<i32>, Error> {
    let mut cmd = tokio::process::Command::new(executable);
    cmd.args(exec_args.iter().map(OsStr::new));
    cmd.args(passthrough.iter().map(OsStr::new));

    if inherit_stdio {
        cmd.stdin(Stdio::inherit()).stdout(Stdio::inherit()).stderr(Stdio::inherit());
    } else {
        cmd.stdin(Stdio::inherit()).stdout(Stdio::piped()).stderr(Stdio::piped());
    }

    log::debug!(target: "keelson::extension", "spawning {:?} {:?}", executable, exec_args);

    let status = if inherit_stdio {
        cmd.status().await.map_err(|e| Error::InvalidExtension {
            name: executable.display().to_string(),
            message: format!("failed to spawn: {}", e),
        })?
    } else {
        let output = cmd.output().await.map_err(|e| Error::InvalidExtension {
            name: executable.display().to_string(),
            message: format!("failed to spawn: {}", e),
        })?;
        print!("{}", String::from_utf8_lossy(&output.stdout));
        eprint!("{}", String::from_utf8_lossy(&output.stderr));
        output.status
    };

    Ok(status.code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesizes_sibling_bin_aliases() {
        let mut bin = HashMap::new();
        bin.insert("myext".to_string(), "./index.js".to_string());
        bin.insert("myext-alias".to_string(), "./index.js".to_string());
        bin.insert("other".to_string(), "./other.js".to_string());
        let manifest = Manifest {
            name: "myext".to_string(),
            main: Some("./index.js".to_string()),
            description: None,
            aliases: vec!["legacy-name".to_string()],
            bin,
            keelson: None,
        };
        let mut aliases = synthesize_aliases(&manifest, None);
        aliases.sort();
        assert_eq!(aliases, vec!["legacy-name".to_string(), "myext".to_string(), "myext-alias".to_string()]);
    }

    #[tokio::test]
    async fn missing_reference_without_ignore_flag_fails() {
        let err = resolve_reference(
            "/no/such/path/keelson-test-ghost",
            &NullLoader,
            ExtensionOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidExtension { .. }));
    }

    #[tokio::test]
    async fn missing_reference_with_ignore_flag_becomes_stub() {
        let (resolution, _meta) = resolve_reference(
            "/no/such/path/keelson-test-ghost",
            &NullLoader,
            ExtensionOptions { ignore_missing_extensions: true, ..Default::default() },
        )
        .await
        .unwrap();
        assert!(matches!(resolution, Resolution::Invalid { .. }));
    }

    #[tokio::test]
    async fn true_binary_resolves_as_executable() {
        if which::which("true").is_err() {
            return;
        }
        let (resolution, _meta) = resolve_reference("true", &NullLoader, ExtensionOptions::default()).await.unwrap();
        assert!(matches!(resolution, Resolution::Executable { .. }));
    }

    #[tokio::test]
    async fn resolve_grafts_executable_extension_and_spawns_it() {
        if which::which("true").is_err() {
            return;
        }
        let root = Context::new_root();
        let child = resolve(&root, "true", "myext", &NullLoader, ExtensionOptions::default()).await.unwrap();
        assert!(child.is_extension());
        let state = child.extension_state().unwrap();
        assert!(state.is_executable());
        assert!(!state.is_cli_kit_extension());
        // the hidden version suppressor got installed
        assert!(child.lookup_long("version").is_some());

        if let ExtensionVariant::Executable { executable, exec_args } = &*state.variant {
            let code = exec(executable, exec_args, &[], true).await.unwrap();
            assert_eq!(code, Some(0));
        } else {
            panic!("expected executable variant");
        }
    }

    #[tokio::test]
    async fn resolve_grafts_manifest_aliases_and_description() {
        let dir = std::env::temp_dir().join(format!("keelson-ext-test-{}-{}", std::process::id(), "aliases"));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.sh"), "#!/bin/sh\ntrue\n").unwrap();
        std::fs::write(
            dir.join(MANIFEST_FILE_NAME),
            r#"{
                "name": "myext",
                "main": "./index.sh",
                "description": "does extension things",
                "aliases": ["legacy-name"],
                "bin": { "myext": "./index.sh", "myext-alias": "./index.sh" }
            }"#,
        )
        .unwrap();

        let root = Context::new_root();
        let script = dir.join("index.sh").display().to_string();
        let child = resolve(&root, &script, "myext", &NullLoader, ExtensionOptions::default()).await.unwrap();

        assert_eq!(child.desc().as_deref(), Some("does extension things"));
        assert!(root.lookup_command("legacy-name").is_some());
        assert!(root.lookup_command("myext-alias").is_some());

        std::fs::remove_dir_all(&dir).ok();
    }
}
