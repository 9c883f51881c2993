//! modelkit CLI - module resolution and package management for domain models

use std::io::IsTerminal;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{CacheCommands, Cli, Commands};
use modelkit::util::diagnostic;
use modelkit::GlobalContext;

fn main() {
    let cli = Cli::parse();
    let color = !cli.no_color && std::io::stderr().is_terminal();

    if let Err(e) = run(cli, color) {
        match e.downcast_ref::<modelkit::Error>() {
            Some(err) => diagnostic::emit(&err.to_diagnostic(), color),
            None => eprintln!("error: {:#}", e),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli, color: bool) -> Result<()> {
    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("modelkit=debug")
    } else {
        EnvFilter::new("modelkit=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let mut ctx = GlobalContext::new()?;
    ctx.set_verbose(cli.verbose);
    ctx.set_color(color);

    // Execute command
    match cli.command {
        Commands::Init(args) => commands::init::execute(args, &ctx),
        Commands::Install(args) => commands::install::execute(args, &ctx),
        Commands::Update(args) => commands::update::execute(args, &ctx),
        Commands::Add(args) => commands::add::execute(args, &ctx),
        Commands::Remove(args) => commands::remove::execute(args, &ctx),
        Commands::List => commands::list::execute(&ctx),
        Commands::Status => commands::status::execute(&ctx),
        Commands::Tree(args) => commands::tree::execute(args, &ctx),
        Commands::Why(args) => commands::why::execute(args, &ctx),
        Commands::Validate => commands::validate::execute(&ctx),
        Commands::Audit => commands::audit::execute(&ctx),
        Commands::Compliance => commands::compliance::execute(&ctx),
        Commands::Cache(args) => match args.command {
            CacheCommands::List => commands::cache::list(&ctx),
            CacheCommands::Clear(clear) => commands::cache::clear(clear, &ctx),
            CacheCommands::Path => commands::cache::path(&ctx),
        },
    }
}
