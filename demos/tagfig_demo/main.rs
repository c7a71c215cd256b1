//! # tagfig demo application
//!
//! A sample CLI that wires a config struct through every tagfig stage:
//! TOML file, defaults, environment, command-tree flags and tests. It exists
//! to demonstrate and manually verify the crate.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example tagfig_demo -- serve
//! cargo run --example tagfig_demo -- --color red serve --port 9000
//! TAGFIG_DEMO_PORT=80 cargo run --example tagfig_demo -- check
//! RUST_LOG=tagfig=debug cargo run --example tagfig_demo -- serve
//! ```
//!
//! `serve` prints the resolved configuration and fails on the first test
//! that does not hold. `check` downgrades every failing test to a warning
//! and reports them all.

mod config;

use std::cell::RefCell;
use std::path::PathBuf;

use clap::Command;
use tracing_subscriber::EnvFilter;

use tagfig::{CommandTree, FlagStrategy, ProcessOptions, Stage, Tagfig, TagfigError, TestOptions};

use config::DemoConfig;

const COLORS: &[&str] = &["red", "green", "yellow", "blue", "magenta", "cyan"];

fn command_tree() -> Result<CommandTree, TagfigError> {
    let mut tree = CommandTree::new(
        Command::new("tagfig-demo")
            .about("tagfig demo, a sample CLI app for showcasing tagfig")
            .subcommand_required(true),
    );
    tree.register_subcommand(
        "tagfig-demo",
        Command::new("serve").about("Print the resolved configuration"),
    )?
    .register_subcommand(
        "tagfig-demo",
        Command::new("check").about("Report every failing test as a warning"),
    )?;
    Ok(tree)
}

fn config_path() -> PathBuf {
    std::env::var_os("TAGFIG_DEMO_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tagfig-demo.toml"))
}

fn print_config(config: &DemoConfig) {
    println!("{}", config.name);
    println!("  verbose         = {}", config.verbose);
    println!("  server.host     = {}", config.server.host);
    println!("  server.port     = {}", config.server.port);
    println!("  server.origins  = {}", config.server.origins.join(","));
    println!("  display.color   = {}", config.display.color);
    println!("  display.format  = {}", config.display.format);
}

fn run() -> Result<(), TagfigError> {
    let mut config: DemoConfig = tagfig::file::load_or_default(&config_path())?;

    let mut engine = Tagfig::new();
    engine.register_test_func("known_color", |value, _| {
        value.as_str().is_some_and(|c| COLORS.contains(&c))
    });

    let mut tree = command_tree()?;
    engine.register_flags(&mut config, &mut tree, FlagStrategy::CommandTree)?;

    // `check` is only known after parsing, so run everything but the tests
    // first and decide how strict to be once the command is known.
    let report = engine.process(
        &mut config,
        ProcessOptions::new().command_tree(&mut tree).skip(Stage::Test),
    )?;
    let checking = tree.invoked().contains(&"check");

    let warnings = RefCell::new(Vec::new());
    let record = |err: &TagfigError| warnings.borrow_mut().push(err.to_string());
    let tests = engine.run_tests(
        &mut config,
        &TestOptions {
            warn_only: checking,
            on_warning: Some(&record),
        },
    )?;

    if config.verbose {
        for stage in report.stages() {
            eprintln!("{stage}: {}", report.touched(stage).join(", "));
        }
        eprintln!("test: {}", tests.join(", "));
    }

    if checking {
        let warnings = warnings.into_inner();
        if warnings.is_empty() {
            println!("all tests passed");
        }
        for warning in warnings {
            println!("warning: {warning}");
        }
    } else {
        print_config(&config);
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        match err {
            TagfigError::FlagParse(e) => e.exit(),
            other => {
                eprintln!("error: {other}");
                std::process::exit(1);
            }
        }
    }
}
