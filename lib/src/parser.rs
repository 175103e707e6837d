// Copyright 2017 Lyndon Brown
//
// This file is part of the `keelson` command-line argument parsing library.
//
// Licensed under the MIT license or the Apache license (version 2.0), at your option. You may not
// copy, modify, or distribute this file except in compliance with said license. You can find copies
// of these licenses either in the LICENSE-MIT and LICENSE-APACHE files, or alternatively at
// <http://opensource.org/licenses/MIT> and <http://www.apache.org/licenses/LICENSE-2.0>
// respectively.

//! The argument-vector parser
//!
//! [`parse`] walks a token sequence against a [`Context`] tree, descending into matched commands,
//! recognizing options (long, short, clustered, negated), classifying everything else as
//! positional or unknown, and coercing matched values according to their declared
//! [`TypeTag`](crate::value::TypeTag). It does not decide *what to do* with the result — that's
//! the [`cli`](crate::cli) module's job.

use crate::context::Context;
use crate::error::Error;
use crate::options::{Callback, CallbackArgs, CallbackOutcome, OptionDef, ValueArity};
use crate::value::{coerce, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// The outcome of a completed parse
pub struct ParseResult {
    /// Positional tokens not bound to a declared [`Argument`](crate::arguments::Argument)
    pub positional: Vec<String>,
    /// Coerced values, keyed by canonical option/argument name
    pub argv: HashMap<String, Value>,
    /// Every context traversed, terminal-first (so `contexts[0]` is the selected command)
    pub contexts: Vec<Context>,
    /// Tokens that looked like options but matched nothing, keyed by the raw name as typed
    pub unknown: HashMap<String, String>,
    /// A callback short-circuited parsing (e.g. `--help`, `--version`); this carries its outcome
    pub short_circuit: Option<crate::commands::ActionResult>,
}

impl ParseResult {
    /// The terminal (most deeply nested) context reached
    pub fn terminal(&self) -> &Context {
        &self.contexts[0]
    }
}

struct State {
    argv: HashMap<String, Value>,
    /// Canonical names set by an actual recognized token, as opposed to a seeded default — a
    /// descent into a deeper context may re-seed a shadowing option's default over an outer one's,
    /// but must never clobber something the command line itself set.
    explicit: std::collections::HashSet<String>,
    positional: Vec<String>,
    unknown: HashMap<String, String>,
    contexts: Vec<Context>,
}

/// Seed `argv` with the default of every option visible from `ctx`, recomputed from scratch so a
/// nearer context's option (and its default) takes over from a shadowed outer one.
fn seed_defaults(ctx: &Context, state: &mut State) {
    for def in ctx.visible_options() {
        let name = def.canonical_name();
        if state.explicit.contains(&name) {
            continue;
        }
        if let Some(default) = &def.default {
            state.argv.insert(name, default.clone());
        }
    }
}

/// Parse `tokens` against `root`, returning a [`ParseResult`] or the first error encountered
///
/// Declarative errors (a callback rejecting a value, a required option missing its value, a
/// required argument absent at the end) abort the parse immediately; unrecognized tokens never
/// abort it — they're classified into `unknown`/`positional` instead, per
/// `treat_unknown_options_as_arguments`.
pub async fn parse(root: &Context, tokens: &[String]) -> Result<ParseResult, Error> {
    let mut ctx = root.clone();
    let mut state = State {
        argv: HashMap::new(),
        explicit: std::collections::HashSet::new(),
        positional: Vec::new(),
        unknown: HashMap::new(),
        contexts: vec![root.clone()],
    };
    seed_defaults(&ctx, &mut state);

    let mut short_circuit = None;
    let mut end_of_options = false;
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];

        if !end_of_options && token == "--" {
            end_of_options = true;
            i += 1;
            continue;
        }

        if end_of_options {
            state.positional.push(token.clone());
            i += 1;
            continue;
        }

        if let Some(rest) = token.strip_prefix("--") {
            if !rest.is_empty() {
                i = handle_long(&ctx, rest, tokens, i, &mut state, &mut short_circuit).await?;
                if short_circuit.is_some() {
                    break;
                }
                continue;
            }
        }

        if token.starts_with('-') && token.len() > 1 {
            i = handle_short_cluster(&ctx, &token[1..], tokens, i, &mut state, &mut short_circuit).await?;
            if short_circuit.is_some() {
                break;
            }
            continue;
        }

        if let Some(child) = ctx.lookup_command(token) {
            log::debug!(target: "keelson::parser", "descending into command {:?}", token);
            ctx = child;
            state.contexts.insert(0, ctx.clone());
            seed_defaults(&ctx, &mut state);
            i += 1;
            continue;
        }

        log::trace!(target: "keelson::parser", "classifying {:?} as positional", token);
        state.positional.push(token.clone());
        i += 1;
    }

    if short_circuit.is_none() {
        bind_positionals(&ctx, &mut state)?;
    }

    Ok(ParseResult {
        positional: state.positional,
        argv: state.argv,
        contexts: state.contexts,
        unknown: state.unknown,
        short_circuit,
    })
}

async fn invoke_callback(
    callback: &Callback,
    value: Option<Value>,
    previous: Option<Value>,
) -> Result<CallbackOutcome, Error> {
    callback(CallbackArgs { value, previous }).await
}

async fn handle_long(
    ctx: &Context,
    rest: &str,
    tokens: &[String],
    i: usize,
    state: &mut State,
    short_circuit: &mut Option<crate::commands::ActionResult>,
) -> Result<usize, Error> {
    let (name, inline_value) = match rest.split_once('=') {
        Some((n, v)) => (n, Some(v.to_string())),
        None => (rest, None),
    };

    let def = match ctx.lookup_long(name) {
        Some(def) => def,
        None => {
            log::warn!(target: "keelson::parser", "unrecognized option {:?}", name);
            state.unknown.insert(name.to_string(), tokens[i].clone());
            if treat_unknown_as_arguments(ctx) {
                state.positional.push(tokens[i].clone());
            }
            return Ok(i + 1);
        }
    };

    let mut next_i = i + 1;
    let canonical = def.canonical_name();
    let previous = state.argv.get(&canonical).cloned();

    let value = if def.negated {
        Some(Value::Bool(false))
    } else {
        match def.value {
            ValueArity::None => Some(Value::Bool(true)),
            ValueArity::Required => {
                let raw = if let Some(v) = inline_value {
                    v
                } else if let Some(v) = tokens.get(next_i) {
                    next_i += 1;
                    v.clone()
                } else {
                    return Err(Error::MissingRequiredOption { name: canonical });
                };
                Some(coerce_and_validate(&def, &canonical, &raw)?)
            }
            ValueArity::Optional => match inline_value {
                Some(v) => Some(coerce_and_validate(&def, &canonical, &v)?),
                None => None,
            },
        }
    };

    if let Some(v) = value.clone() {
        state.argv.insert(canonical.clone(), v);
        state.explicit.insert(canonical.clone());
    }

    if let Some(callback) = &def.callback {
        match invoke_callback(callback, value, previous).await? {
            CallbackOutcome::Continue => {}
            CallbackOutcome::ShortCircuit(result) => {
                *short_circuit = Some(result);
            }
        }
    }

    Ok(next_i)
}

async fn handle_short_cluster(
    ctx: &Context,
    cluster: &str,
    tokens: &[String],
    i: usize,
    state: &mut State,
    short_circuit: &mut Option<crate::commands::ActionResult>,
) -> Result<usize, Error> {
    let mut chars = cluster.char_indices().peekable();
    let mut next_i = i + 1;

    while let Some((pos, ch)) = chars.next() {
        let def = match ctx.lookup_short(ch) {
            Some(def) => def,
            None => {
                log::warn!(target: "keelson::parser", "unrecognized option -{}", ch);
                state.unknown.insert(ch.to_string(), tokens[i].clone());
                if treat_unknown_as_arguments(ctx) {
                    state.positional.push(tokens[i].clone());
                }
                continue;
            }
        };

        let canonical = def.canonical_name();
        let previous = state.argv.get(&canonical).cloned();

        let value = if def.negated {
            Some(Value::Bool(false))
        } else {
            match def.value {
                ValueArity::None => Some(Value::Bool(true)),
                ValueArity::Required | ValueArity::Optional => {
                    let remainder = &cluster[pos + ch.len_utf8()..];
                    let remainder = remainder.strip_prefix('=').unwrap_or(remainder);
                    if !remainder.is_empty() {
                        let v = coerce_and_validate(&def, &canonical, remainder)?;
                        while chars.next().is_some() {}
                        Some(v)
                    } else if def.value == ValueArity::Required {
                        if let Some(v) = tokens.get(next_i) {
                            next_i += 1;
                            Some(coerce_and_validate(&def, &canonical, v)?)
                        } else {
                            return Err(Error::MissingRequiredOption { name: canonical });
                        }
                    } else {
                        None
                    }
                }
            }
        };

        if let Some(v) = value.clone() {
            state.argv.insert(canonical.clone(), v);
            state.explicit.insert(canonical.clone());
        }

        if let Some(callback) = &def.callback {
            match invoke_callback(callback, value, previous).await? {
                CallbackOutcome::Continue => {}
                CallbackOutcome::ShortCircuit(result) => {
                    *short_circuit = Some(result);
                    return Ok(next_i);
                }
            }
        }
    }

    Ok(next_i)
}

fn coerce_and_validate(def: &Arc<OptionDef>, name: &str, raw: &str) -> Result<Value, Error> {
    let value = coerce(def.type_tag, name, raw)?;
    if let Some(validator) = &def.validator {
        validator(&value)?;
    }
    Ok(value)
}

fn treat_unknown_as_arguments(ctx: &Context) -> bool {
    matches!(ctx.prop("treatUnknownOptionsAsArguments"), Some(serde_json::Value::Bool(true)))
}

fn bind_positionals(ctx: &Context, state: &mut State) -> Result<(), Error> {
    let args = ctx.arguments();
    let mut tokens = state.positional.drain(..).collect::<Vec<_>>();
    let mut index = 0;

    for (arg_index, arg) in args.iter().enumerate() {
        if arg.multiple {
            let rest: Vec<Value> = tokens[index..]
                .iter()
                .map(|raw| coerce(arg.type_tag, &arg.name, raw))
                .collect::<Result<_, _>>()?;
            if rest.is_empty() {
                if arg.required {
                    return Err(Error::MissingRequiredArgument { name: arg.name.clone() });
                }
                if let Some(default) = &arg.default {
                    state.argv.insert(arg.camel_case_name(), default.clone());
                }
            } else {
                state.argv.insert(arg.camel_case_name(), Value::List(rest));
            }
            index = tokens.len();
            continue;
        }

        if index < tokens.len() {
            let value = coerce(arg.type_tag, &arg.name, &tokens[index])?;
            let value = if let Some(validator) = &arg.validator {
                validator(&value)?;
                value
            } else {
                value
            };
            state.argv.insert(arg.camel_case_name(), value);
            index += 1;
        } else if arg.required {
            return Err(Error::MissingRequiredArgument { name: arg.name.clone() });
        } else if let Some(default) = &arg.default {
            state.argv.insert(arg.camel_case_name(), default.clone());
        }

        let _ = arg_index;
    }

    state.positional = tokens.split_off(index.min(tokens.len()));
    Ok(())
}

#[cfg(feature = "suggestions")]
/// Suggest the closest declared long option name to an unrecognized one, for use in diagnostics
pub fn suggest_long(ctx: &Context, unknown: &str) -> Option<String> {
    use strsim::jaro_winkler;
    ctx.visible_options()
        .into_iter()
        .filter_map(|def| def.long.clone())
        .max_by(|a, b| {
            jaro_winkler(unknown, a).partial_cmp(&jaro_winkler(unknown, b)).unwrap_or(std::cmp::Ordering::Equal)
        })
        .filter(|candidate| jaro_winkler(unknown, candidate) > 0.7)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arguments::Argument;
    use crate::options::OptionDef;
    use crate::value::TypeTag;

    fn tokens(strs: &[&str]) -> Vec<String> {
        strs.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn long_flag_with_value_through_command() {
        let root = Context::new_root();
        root.option(OptionDef::new("--count <n>", "").unwrap().type_tag(TypeTag::Number).default(Value::Number(1.0))).unwrap();
        root.command("run", vec![]).unwrap();

        let result = parse(&root, &tokens(&["run", "--count", "5"])).await.unwrap();
        assert_eq!(result.argv.get("count"), Some(&Value::Number(5.0)));
        assert_eq!(result.terminal().name().as_deref(), Some("run"));
    }

    #[tokio::test]
    async fn short_cluster_expands() {
        let root = Context::new_root();
        root.option(OptionDef::new("-a", "").unwrap()).unwrap();
        root.option(OptionDef::new("-b", "").unwrap()).unwrap();
        root.option(OptionDef::new("-c <v>", "").unwrap()).unwrap();

        let result = parse(&root, &tokens(&["-abc", "hello"])).await.unwrap();
        assert_eq!(result.argv.get("a"), Some(&Value::Bool(true)));
        assert_eq!(result.argv.get("b"), Some(&Value::Bool(true)));
        assert_eq!(result.argv.get("c"), Some(&Value::Str("hello".to_string())));
    }

    #[tokio::test]
    async fn end_of_options_marker_stops_recognition() {
        let root = Context::new_root();
        root.option(OptionDef::new("--foo", "").unwrap()).unwrap();

        let result = parse(&root, &tokens(&["--foo", "--", "--bar"])).await.unwrap();
        assert_eq!(result.argv.get("foo"), Some(&Value::Bool(true)));
        assert_eq!(result.positional, vec!["--bar".to_string()]);
    }

    #[tokio::test]
    async fn negated_form_sets_false() {
        let root = Context::new_root();
        root.option(OptionDef::new("--no-banner", "").unwrap()).unwrap();

        let result = parse(&root, &tokens(&["--no-banner"])).await.unwrap();
        assert_eq!(result.argv.get("banner"), Some(&Value::Bool(false)));
    }

    #[tokio::test]
    async fn positional_saturation_fills_required_then_optional_then_rest() {
        let root = Context::new_root();
        root.argument(Argument::new("r1").unwrap().required(true)).unwrap();
        root.argument(Argument::new("r2").unwrap().required(true)).unwrap();
        root.argument(Argument::new("opt3").unwrap()).unwrap();
        root.argument(Argument::new("rest").unwrap().multiple(true)).unwrap();

        let result = parse(&root, &tokens(&["a", "b", "c", "d", "e"])).await.unwrap();
        assert_eq!(result.argv.get("r1"), Some(&Value::Str("a".to_string())));
        assert_eq!(result.argv.get("r2"), Some(&Value::Str("b".to_string())));
        assert_eq!(result.argv.get("opt3"), Some(&Value::Str("c".to_string())));
        assert_eq!(result.argv.get("rest"), Some(&Value::List(vec![Value::Str("d".to_string()), Value::Str("e".to_string())])));
    }

    #[tokio::test]
    async fn missing_required_argument_fails() {
        let root = Context::new_root();
        root.argument(Argument::new("r1").unwrap().required(true)).unwrap();
        root.argument(Argument::new("r2").unwrap().required(true)).unwrap();

        let err = parse(&root, &tokens(&["only-one"])).await.unwrap_err();
        assert!(matches!(err, Error::MissingRequiredArgument { .. }));
    }

    #[tokio::test]
    async fn unknown_option_recorded_and_optionally_kept_positional() {
        let root = Context::new_root();
        root.set_property("treatUnknownOptionsAsArguments", serde_json::json!(true));

        let result = parse(&root, &tokens(&["--mystery"])).await.unwrap();
        assert!(result.unknown.contains_key("mystery"));
        assert_eq!(result.positional, vec!["--mystery".to_string()]);
    }

    #[tokio::test]
    async fn option_shadowing_prefers_nearest_scope() {
        let root = Context::new_root();
        root.option(OptionDef::new("--mode <m>", "").unwrap().default(Value::Str("root".to_string()))).unwrap();
        let child = root.command("run", vec![]).unwrap();
        child.option(OptionDef::new("--mode <m>", "").unwrap().default(Value::Str("child".to_string()))).unwrap();

        let result = parse(&root, &tokens(&["run"])).await.unwrap();
        assert_eq!(result.argv.get("mode"), Some(&Value::Str("child".to_string())));
    }
}
