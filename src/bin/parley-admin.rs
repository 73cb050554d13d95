//! parley-admin - CLI for inspecting and editing the game config
//!
//! Usage:
//!   parley-admin show
//!   parley-admin set-base-url <url>
//!   parley-admin characters
//!   parley-admin check

use anyhow::{Context, Result};
use std::env;

use pirate_parley::config::GameConfig;
use pirate_parley::paths;
use pirate_parley::service::{ConversationService, HttpConversationClient};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pirate_parley=warn".parse()?),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    match args[1].as_str() {
        "show" => cmd_show()?,
        "set-base-url" => cmd_set_base_url(&args[2..])?,
        "characters" => cmd_characters()?,
        "check" => cmd_check().await?,
        "help" | "--help" | "-h" => print_usage(),
        cmd => {
            eprintln!("Unknown command: {}", cmd);
            print_usage();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn print_usage() {
    eprintln!(
        r#"parley-admin - Manage the pirate-parley config

Usage:
  parley-admin show
  parley-admin set-base-url <url>
  parley-admin characters
  parley-admin check

Environment:
  PARLEY_CONFIG     Override config file path
  PARLEY_BASE_URL   Override conversation service URL

Paths:
  Config: {config}

Examples:
  parley-admin set-base-url http://localhost:8000
  parley-admin check
"#,
        config = paths::config_path().display(),
    );
}

fn cmd_show() -> Result<()> {
    let path = paths::config_path();
    let config = GameConfig::load(&path)?;
    let rendered = toml::to_string_pretty(&config).context("failed to render config")?;

    println!("# {}", path.display());
    print!("{}", rendered);
    Ok(())
}

fn cmd_set_base_url(args: &[String]) -> Result<()> {
    if args.is_empty() {
        anyhow::bail!("Usage: parley-admin set-base-url <url>");
    }

    let path = paths::config_path();
    // Edit the file as written so env overrides are not persisted.
    let mut config = GameConfig::from_file(&path)?;
    config.service.base_url = args[0].trim().to_string();
    config.validate()?;
    config.save(&path)?;

    println!("Base URL set to {}", config.service.base_url);
    println!("  Saved: {}", path.display());
    Ok(())
}

fn cmd_characters() -> Result<()> {
    let config = GameConfig::load(paths::config_path())?;

    println!("{} guardians:", config.characters.len());
    for character in &config.characters {
        println!(
            "  {:<12} {:<20} {}",
            character.id,
            character.name,
            character.difficulty.as_str()
        );
        if !character.blurb.is_empty() {
            println!("               {}", character.blurb);
        }
    }
    Ok(())
}

async fn cmd_check() -> Result<()> {
    let config = GameConfig::load(paths::config_path())?;
    let client = HttpConversationClient::new(&config.service)?;

    match client.health().await {
        Ok(true) => {
            println!("{} is up", client.base_url());
            Ok(())
        }
        Ok(false) => anyhow::bail!("{} reports unhealthy", client.base_url()),
        Err(e) => anyhow::bail!("{} unreachable: {}", client.base_url(), e),
    }
}
