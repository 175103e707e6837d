//! Playground program for the `keelson` library
//!
//! Declares a small tree of example commands, options and arguments, runs it against whatever
//! arguments the user supplies, and prints a description of what the parser and dispatch loop
//! decided. See the `README.md` file for instructions.

// Copyright 2021 Lyndon Brown
//
// Licensed under the MIT license or the Apache license (Version 2.0), at your option. You may not
// copy, modify, or distribute this file except in compliance with said license. You can find copies
// of these licenses either in the LICENSE-MIT and LICENSE-APACHE files, or alternatively at
// <http://opensource.org/licenses/MIT> and <http://www.apache.org/licenses/LICENSE-2.0>
// respectively.

mod console;

use console as con;
use keelson::cli::{Cli, CliOutcome, CliParams};
use keelson::commands::{ActionInput, ActionResult};
use keelson::options::{BoxFuture, CallbackOutcome, OptionDef};
use keelson::value::TypeTag;
use keelson::{Argument, Error};
use std::sync::Arc;

fn build_cli_params() -> CliParams {
    CliParams::new()
        .name("keelson-playground")
        .title("Keelson Playground")
        .desc("exercises the keelson context tree, parser and dispatch loop against arbitrary input")
        .version(env!("CARGO_PKG_VERSION"))
        .banner("keelson playground\n-------------------")
        .help(true)
        .default_command("greet")
}

fn greet_action(input: ActionInput) -> BoxFuture<'static, Result<ActionResult, Error>> {
    Box::pin(async move {
        let name = match input.result.argv.get("name") {
            Some(v) => v.to_string(),
            None => "world".to_string(),
        };
        Ok(ActionResult::Value(serde_json::json!({ "greeted": name })))
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let color = con::color_supported();
    let col_header = con::MAGENTA_B;
    macro_rules! c {
        ( $e:expr ) => { if color { $e } else { "" } };
    }

    println!("\n[ {}Setup{} ]\n", c!(col_header), c!(con::RESET));

    let cli = Cli::new(build_cli_params()).await?;

    cli.option(OptionDef::new("-f, --foo", "")?.desc("a boolean flag"))?;
    cli.option(
        OptionDef::new("--foobar <value>", "")?
            .type_tag(TypeTag::Str)
            .desc("a flag taking a string value"),
    )?;
    cli.option(
        OptionDef::new("-n, --count <value>", "")?
            .type_tag(TypeTag::Number)
            .desc("a flag taking a numeric value"),
    )?;
    cli.option(
        OptionDef::new("-x", "")?.desc("a short-only boolean flag").callback(Arc::new(|_args| {
            Box::pin(async move { Ok(CallbackOutcome::Continue) }) as BoxFuture<'static, Result<CallbackOutcome, Error>>
        })),
    )?;

    let greet = cli.command("greet", vec!["hi".to_string()])?;
    greet.set_desc("print a greeting");
    greet.argument(Argument::new("name")?.desc("who to greet"))?;
    greet.set_action(Arc::new(greet_action));

    let farewell = cli.command("bye", vec!["goodbye".to_string()])?;
    farewell.set_desc("print a farewell");
    farewell.set_action(Arc::new(|_input: ActionInput| {
        Box::pin(async move { Ok(ActionResult::Value(serde_json::json!({ "farewell": true }))) })
            as BoxFuture<'static, Result<ActionResult, Error>>
    }));

    println!("{}Registered commands{}: greet (aliases: hi), bye (aliases: goodbye)\n", c!(con::ITALIC), c!(con::RESET));
    println!(
        "Standard options: -f/--foo, --foobar <value>, -n/--count <value>, -x, -h/--help, \
         --no-color, -v/--version\n"
    );

    let args: Vec<String> = std::env::args().skip(1).collect();

    println!("[ {}Your input arguments{} ]\n", c!(col_header), c!(con::RESET));
    if args.is_empty() {
        println!("None!");
    } else {
        for (i, arg) in args.iter().enumerate() {
            println!("[{}]: {}", i, arg);
        }
    }

    log::info!("dispatching {} argument(s)", args.len());

    println!("\n[ {}Result{} ]\n", c!(col_header), c!(con::RESET));

    match cli.exec(Some(args)).await {
        Ok(CliOutcome::Parsed(result)) => {
            println!("{}Parsed{} (no command action ran)\n", c!(con::GREEN), c!(con::RESET));
            println!("Positional: {:?}", result.positional);
            println!("Argv:");
            let mut keys: Vec<&String> = result.argv.keys().collect();
            keys.sort();
            for key in keys {
                println!("    {} = {}", key, result.argv[key]);
            }
            if !result.unknown.is_empty() {
                println!("{}Unknown tokens{}:", c!(con::YELLOW), c!(con::RESET));
                for (name, raw) in &result.unknown {
                    println!("    {} (as typed: {})", name, raw);
                }
            }
        }
        Ok(CliOutcome::Action(ActionResult::Exit(code))) => {
            println!("{}Action exited{} with code {}", c!(con::BLUE), c!(con::RESET), code);
            if code != 0 {
                std::process::exit(code);
            }
        }
        Ok(CliOutcome::Action(ActionResult::Unit)) => {
            println!("{}Action ran{} with no payload", c!(con::GREEN), c!(con::RESET));
        }
        Ok(CliOutcome::Action(ActionResult::Value(value))) => {
            println!("{}Action ran{}, returned:", c!(con::GREEN), c!(con::RESET));
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()));
        }
        Err(e) => {
            println!("{}Error{}: {}", c!(con::RED), c!(con::RESET), e);
            std::process::exit(1);
        }
    }

    println!();
    Ok(())
}
