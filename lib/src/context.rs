// Copyright 2018 Lyndon Brown
//
// This file is part of the `keelson` command-line argument parsing library.
//
// Licensed under the MIT license or the Apache license (version 2.0), at your option. You may not
// copy, modify, or distribute this file except in compliance with said license. You can find copies
// of these licenses either in the LICENSE-MIT and LICENSE-APACHE files, or alternatively at
// <http://opensource.org/licenses/MIT> and <http://www.apache.org/licenses/LICENSE-2.0>
// respectively.

//! The context tree
//!
//! A [`Context`] is a node in the command tree: it owns a list of declared
//! [`Argument`](crate::arguments::Argument)s, a grouped [`OptionTable`], a list of child command
//! contexts, and a [`Lookup`] indexing all of the above for the [parser](crate::parser). Contexts
//! form a single-parent tree; commands and [extensions](crate::extension) are contexts with extra
//! dispatch-time state (an action, aliases, an optional banner override, and — for extensions — an
//! [`ExtensionState`]) rather than separate types, since Rust has no prototype-style mixin to reach
//! for. See `DESIGN.md` for the reasoning.
//!
//! # Scoped property reads
//!
//! [`get`](Context::get) and [`prop`](Context::prop) both walk from a context out to the root,
//! differing only in which end of that walk wins when more than one context in the chain has the
//! named property set: `get` keeps the *topmost* (closest to root) value, `prop` keeps the
//! *bottom-most* (closest to the context asked) value.

use crate::arguments::{Argument, ArgumentList};
use crate::commands::ActionFn;
use crate::error::Error;
use crate::extension::ExtensionState;
use crate::lookup::Lookup;
use crate::options::{OptionDef, OptionTable};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

/// What kind of node a [`Context`] is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// The root of the tree, owned by the [`Cli`](crate::cli::Cli)
    Root,
    /// An ordinary declared command
    Command,
    /// A command grafted in from an [`Extension`](crate::extension::Extension)
    Extension,
}

/// Shared, mutable context state
pub(crate) struct ContextInner {
    pub(crate) kind: ContextKind,
    pub(crate) name: Option<String>,
    pub(crate) aliases: Vec<(String, bool)>,
    pub(crate) title: Option<String>,
    pub(crate) desc: Option<String>,
    pub(crate) camel_case: bool,
    pub(crate) args: ArgumentList,
    pub(crate) options: OptionTable,
    pub(crate) commands: Vec<Context>,
    pub(crate) lookup: Lookup,
    pub(crate) parent: Option<Weak<Mutex<ContextInner>>>,
    pub(crate) action: Option<ActionFn>,
    pub(crate) banner: Option<String>,
    pub(crate) properties: HashMap<String, serde_json::Value>,
    pub(crate) extension: Option<ExtensionState>,
}

/// A node in the command tree
///
/// Cheap to clone (an `Arc` bump); clones refer to the same underlying node. Built on `Arc<Mutex<_>>`
/// rather than `Rc<RefCell<_>>` so a `Context` can be captured by the `Send` futures the crate's
/// async action/callback model (see `DESIGN.md`) requires.
#[derive(Clone)]
pub struct Context(pub(crate) Arc<Mutex<ContextInner>>);

impl Context {
    /// Create a new, empty root context
    pub fn new_root() -> Self {
        Context(Arc::new(Mutex::new(ContextInner {
            kind: ContextKind::Root,
            name: None,
            aliases: Vec::new(),
            title: None,
            desc: None,
            camel_case: true,
            args: ArgumentList::new(),
            options: OptionTable::new(),
            commands: Vec::new(),
            lookup: Lookup::new(),
            parent: None,
            action: None,
            banner: None,
            properties: HashMap::new(),
            extension: None,
        })))
    }

    fn new_child(kind: ContextKind, name: Option<String>, parent: &Context) -> Self {
        let camel_case = parent.camel_case();
        Context(Arc::new(Mutex::new(ContextInner {
            kind,
            name,
            aliases: Vec::new(),
            title: None,
            desc: None,
            camel_case,
            args: ArgumentList::new(),
            options: OptionTable::new(),
            commands: Vec::new(),
            lookup: Lookup::new(),
            parent: Some(Arc::downgrade(&parent.0)),
            action: None,
            banner: None,
            properties: HashMap::new(),
            extension: None,
        })))
    }

    /// Whether two handles refer to the same underlying node
    pub fn is_same(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// This context's kind
    pub fn kind(&self) -> ContextKind {
        self.0.lock().unwrap().kind
    }

    /// Whether this is the root context
    pub fn is_root(&self) -> bool {
        self.kind() == ContextKind::Root
    }

    /// Whether this context was grafted in from an extension
    pub fn is_extension(&self) -> bool {
        self.kind() == ContextKind::Extension
    }

    /// Re-tag this context as an [`Extension`](ContextKind::Extension)
    ///
    /// Used by the extension loader right after constructing the child via
    /// [`command`](Context::command), since `Command` and `Extension` share the same underlying
    /// node shape and differ only in kind plus the extra state in
    /// [`extension_state`](Context::extension_state).
    pub(crate) fn mark_as_extension(&self) {
        self.0.lock().unwrap().kind = ContextKind::Extension;
    }

    /// This context's declared name (`None` for the root)
    pub fn name(&self) -> Option<String> {
        self.0.lock().unwrap().name.clone()
    }

    /// Visible aliases declared for this command/extension
    pub fn aliases(&self) -> Vec<String> {
        self.0.lock().unwrap().aliases.iter().filter(|(_, visible)| *visible).map(|(n, _)| n.clone()).collect()
    }

    /// This context's title, if set
    pub fn title(&self) -> Option<String> {
        self.0.lock().unwrap().title.clone()
    }

    /// Set this context's title
    pub fn set_title(&self, title: impl Into<String>) {
        self.0.lock().unwrap().title = Some(title.into());
    }

    /// This context's description, if set
    pub fn desc(&self) -> Option<String> {
        self.0.lock().unwrap().desc.clone()
    }

    /// Set this context's description
    pub fn set_desc(&self, desc: impl Into<String>) {
        self.0.lock().unwrap().desc = Some(desc.into());
    }

    /// Whether option canonical names are camelCased (inherited from parent at creation time,
    /// overridable per-context)
    pub fn camel_case(&self) -> bool {
        self.0.lock().unwrap().camel_case
    }

    /// Override camelCasing for this context
    pub fn set_camel_case(&self, camel_case: bool) {
        self.0.lock().unwrap().camel_case = camel_case;
    }

    /// This command's banner override, if any
    pub fn banner(&self) -> Option<String> {
        self.0.lock().unwrap().banner.clone()
    }

    /// Set this command's banner override
    pub fn set_banner(&self, banner: impl Into<String>) {
        self.0.lock().unwrap().banner = Some(banner.into());
    }

    /// This command's action, if any
    pub fn action(&self) -> Option<ActionFn> {
        self.0.lock().unwrap().action.clone()
    }

    /// Set this command's action
    pub fn set_action(&self, action: ActionFn) {
        self.0.lock().unwrap().action = Some(action);
    }

    /// Extension-specific state, if this context was grafted in from an extension
    pub fn extension_state(&self) -> Option<ExtensionState> {
        self.0.lock().unwrap().extension.clone()
    }

    pub(crate) fn set_extension_state(&self, state: ExtensionState) {
        self.0.lock().unwrap().extension = Some(state);
    }

    /// The parent context, if any (`None` for the root)
    pub fn parent(&self) -> Option<Context> {
        self.0.lock().unwrap().parent.as_ref().and_then(|weak| weak.upgrade()).map(Context)
    }

    /// The chain of contexts from `self` to the root, inclusive, in that order
    pub fn chain(&self) -> Vec<Context> {
        let mut chain = vec![self.clone()];
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            chain.push(parent.clone());
            current = parent;
        }
        chain
    }

    /// Declare a positional argument on this context
    ///
    /// See [`ArgumentList::push`] for the enforced ordering invariants.
    pub fn argument(&self, arg: Argument) -> Result<(), Error> {
        self.0.lock().unwrap().args.push(arg)
    }

    /// A clone of this context's declared argument list
    pub fn arguments(&self) -> ArgumentList {
        self.0.lock().unwrap().args.clone()
    }

    /// Declare an option on this context
    ///
    /// Fails with [`Error::AlreadyExists`] if any of the option's canonical names or visible
    /// aliases collide with one already declared directly on this context (duplicates between a
    /// parent and a child are allowed — the child shadows the parent at lookup time).
    pub fn option(&self, def: OptionDef) -> Result<Arc<OptionDef>, Error> {
        let mut inner = self.0.lock().unwrap();
        for name in def.all_long_lookup_keys() {
            if inner.lookup.long.contains_key(&name) {
                return Err(Error::AlreadyExists { kind: "option", name });
            }
        }
        for ch in def.all_short_chars() {
            if inner.lookup.short.contains_key(&ch) {
                return Err(Error::AlreadyExists { kind: "option", name: ch.to_string() });
            }
        }
        let def = Arc::new(def);
        for name in def.all_long_lookup_keys() {
            inner.lookup.long.insert(name, def.clone());
        }
        for ch in def.all_short_chars() {
            inner.lookup.short.insert(ch, def.clone());
        }
        let group = def.group.clone();
        inner.options.push(group, def.clone());
        log::debug!(target: "keelson::context", "declared option {:?} on {:?}", def.canonical_name(), inner.name);
        Ok(def)
    }

    /// A clone of this context's declared option table
    pub fn options(&self) -> OptionTable {
        self.0.lock().unwrap().options.clone()
    }

    /// Declare a child command on this context
    ///
    /// `aliases` that collide with an already-registered command name in this context are silently
    /// dropped (a warning is logged); a collision on `name` itself fails with
    /// [`Error::AlreadyExists`].
    pub fn command(&self, name: &str, aliases: Vec<String>) -> Result<Context, Error> {
        {
            let inner = self.0.lock().unwrap();
            if inner.lookup.commands.contains_key(name) {
                return Err(Error::AlreadyExists { kind: "command", name: name.to_string() });
            }
        }
        let child = Context::new_child(ContextKind::Command, Some(name.to_string()), self);
        self.adopt_child(child.clone(), name, aliases)?;
        Ok(child)
    }

    /// Register an already-constructed child context (used by [`command`](Context::command) and
    /// by the [extension loader](crate::extension)) into this context's command lookup, silently
    /// dropping colliding aliases
    pub(crate) fn adopt_child(&self, child: Context, name: &str, aliases: Vec<String>) -> Result<(), Error> {
        let mut inner = self.0.lock().unwrap();
        inner.lookup.commands.insert(name.to_string(), child.clone());
        let mut visible_aliases = Vec::with_capacity(aliases.len());
        for alias in aliases {
            if inner.lookup.commands.contains_key(&alias) {
                log::warn!(target: "keelson::context", "alias {:?} for command {:?} collides with an existing command, dropping", alias, name);
                continue;
            }
            inner.lookup.commands.insert(alias.clone(), child.clone());
            visible_aliases.push((alias, true));
        }
        child.0.lock().unwrap().aliases = visible_aliases;
        inner.commands.push(child);
        Ok(())
    }

    /// Child commands declared directly on this context, in declaration order
    pub fn commands(&self) -> Vec<Context> {
        self.0.lock().unwrap().commands.clone()
    }

    /// Set an arbitrary named property on this context
    pub fn set_property(&self, name: impl Into<String>, value: serde_json::Value) {
        self.0.lock().unwrap().properties.insert(name.into(), value);
    }

    /// The property named `name` read directly off this context, without walking the chain
    pub fn local_property(&self, name: &str) -> Option<serde_json::Value> {
        self.0.lock().unwrap().properties.get(name).cloned()
    }

    /// Scoped property read: walk from this context to the root, keeping the **topmost**
    /// (closest-to-root) non-absent value — "what did the user declare globally?"
    pub fn get(&self, name: &str) -> Option<serde_json::Value> {
        let mut found = None;
        for ctx in self.chain().into_iter().rev() {
            if let Some(v) = ctx.local_property(name) {
                found = Some(v);
            }
        }
        found
    }

    /// Scoped property read: walk from this context to the root, keeping the **bottom-most**
    /// (closest-to-here) non-absent value — "what is the effective setting for this command?"
    pub fn prop(&self, name: &str) -> Option<serde_json::Value> {
        for ctx in self.chain() {
            if let Some(v) = ctx.local_property(name) {
                return Some(v);
            }
        }
        None
    }

    /// Resolve a long option name, walking outward through parent contexts until found
    ///
    /// The nearest (most local) declaring context wins, so a child's redeclaration of a name
    /// shadows its parent's.
    pub fn lookup_long(&self, name: &str) -> Option<Arc<OptionDef>> {
        for ctx in self.chain() {
            if let Some(def) = ctx.0.lock().unwrap().lookup.long.get(name) {
                return Some(def.clone());
            }
        }
        None
    }

    /// Resolve a short option character, walking outward through parent contexts until found
    pub fn lookup_short(&self, ch: char) -> Option<Arc<OptionDef>> {
        for ctx in self.chain() {
            if let Some(def) = ctx.0.lock().unwrap().lookup.short.get(&ch) {
                return Some(def.clone());
            }
        }
        None
    }

    /// Resolve a command name *in this context only* (commands do not inherit across scope)
    pub fn lookup_command(&self, name: &str) -> Option<Context> {
        self.0.lock().unwrap().lookup.commands.get(name).cloned()
    }

    /// Every option visible from this context (its own, plus every ancestor's, nearest first,
    /// already deduplicated by canonical name so a child's option shadows a parent's of the same
    /// name) — used by the parser to seed `argv` defaults on descent
    pub fn visible_options(&self) -> Vec<Arc<OptionDef>> {
        let mut seen = std::collections::HashSet::new();
        let mut result = Vec::new();
        for ctx in self.chain() {
            for def in ctx.0.lock().unwrap().options.iter() {
                let key = def.canonical_name();
                if seen.insert(key) {
                    result.push(def.clone());
                }
            }
        }
        result
    }

    /// Mix another context's declarations into this one
    ///
    /// Copies title/description/properties, re-adds every option (so it reindexes into this
    /// context's lookup), and adopts every child command. When `skip_ancestor_options` is set (the
    /// "mixing from a root CLI" case), an option already visible from one of this context's
    /// ancestors is skipped — except a canonical `version` option, which is always copied so an
    /// extension can override the parent's version behavior.
    pub fn mix_from(&self, source: &Context, skip_ancestor_options: bool) -> Result<(), Error> {
        {
            let src = source.0.lock().unwrap();
            let mut dst = self.0.lock().unwrap();
            if dst.title.is_none() {
                dst.title = src.title.clone();
            }
            if dst.desc.is_none() {
                dst.desc = src.desc.clone();
            }
            for (k, v) in src.properties.iter() {
                dst.properties.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }

        let ancestor_visible: std::collections::HashSet<String> = if skip_ancestor_options {
            self.parent().map(|p| p.visible_options().iter().map(|o| o.canonical_name()).collect()).unwrap_or_default()
        } else {
            Default::default()
        };

        for def in source.options().iter() {
            let canonical = def.canonical_name();
            if skip_ancestor_options && canonical != "version" && ancestor_visible.contains(&canonical) {
                continue;
            }
            // Re-add via `option()` so it reindexes into this context's lookup; a definition
            // already present locally (e.g. re-mixing) is tolerated.
            let cloned = (**def).clone();
            match self.option(cloned) {
                Ok(_) | Err(Error::AlreadyExists { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        for child in source.commands() {
            let name = child.name().unwrap_or_default();
            let aliases = child.aliases();
            if self.lookup_command(&name).is_none() {
                self.adopt_child(child, &name, aliases)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionDef;

    #[test]
    fn child_sees_parent_option_until_shadowed() {
        let root = Context::new_root();
        root.option(OptionDef::new("--verbose", "").unwrap()).unwrap();
        let child = root.command("run", vec![]).unwrap();
        assert!(child.lookup_long("verbose").is_some());

        let grandchild = child.command("now", vec![]).unwrap();
        grandchild.option(OptionDef::new("--verbose", "").unwrap()).unwrap();
        assert!(grandchild.lookup_long("verbose").is_some());
        assert!(!Arc::ptr_eq(
            &grandchild.lookup_long("verbose").unwrap(),
            &root.lookup_long("verbose").unwrap()
        ));
    }

    #[test]
    fn duplicate_option_in_same_context_fails() {
        let root = Context::new_root();
        root.option(OptionDef::new("--verbose", "").unwrap()).unwrap();
        let err = root.option(OptionDef::new("--verbose", "").unwrap()).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[test]
    fn duplicate_command_name_fails() {
        let root = Context::new_root();
        root.command("run", vec![]).unwrap();
        let err = root.command("run", vec![]).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[test]
    fn colliding_alias_is_dropped_not_overwritten() {
        let root = Context::new_root();
        root.command("run", vec![]).unwrap();
        let built = root.command("build", vec!["run".to_string(), "b".to_string()]).unwrap();
        assert_eq!(built.aliases(), vec!["b".to_string()]);
        // "run" alias collided and was dropped, so it still points at the original command
        assert!(root.lookup_command("run").unwrap().is_same(&root.commands()[0]));
    }

    #[test]
    fn get_prefers_root_prop_prefers_local() {
        let root = Context::new_root();
        root.set_property("scope", serde_json::json!("root"));
        let child = root.command("run", vec![]).unwrap();
        child.set_property("scope", serde_json::json!("child"));

        assert_eq!(child.get("scope"), Some(serde_json::json!("root")));
        assert_eq!(child.prop("scope"), Some(serde_json::json!("child")));
    }
}
