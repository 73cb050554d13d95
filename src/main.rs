//! parley - talk a pirate guardian out of his treasure map
//!
//! A terminal front end for the game engine. Pick a guardian, then type
//! to persuade him; /restart, /leave and /quit control the session.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use pirate_parley::audio::{AudioSink, CommandSink};
use pirate_parley::config::{Character, GameConfig};
use pirate_parley::display;
use pirate_parley::events::{GameEvent, GameEventReceiver};
use pirate_parley::paths;
use pirate_parley::service::{ConversationService, HttpConversationClient};
use pirate_parley::session::{GameSession, Rejection, SendOutcome, TurnSummary};
use pirate_parley::transcript::Speaker;

/// How often to check for an abandoned session
const INACTIVITY_CHECK: Duration = Duration::from_secs(5);

const SCREEN_WIDTH: u16 = 48;

struct Args {
    base_url: Option<String>,
    character: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pirate_parley=warn".parse()?),
        )
        .init();

    let Some(args) = parse_args()? else {
        print_usage();
        return Ok(());
    };

    let config_path = paths::config_path();
    let mut config = GameConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    if let Some(url) = args.base_url {
        config.service.base_url = url;
        config.validate()?;
    }

    let client = HttpConversationClient::new(&config.service).context("failed to create service client")?;
    match client.health().await {
        Ok(true) => info!(url = %client.base_url(), "conversation service is up"),
        Ok(false) => warn!(url = %client.base_url(), "conversation service reports unhealthy"),
        Err(e) => warn!(url = %client.base_url(), error = %e, "conversation service unreachable"),
    }

    let sink = CommandSink::from_command(&config.audio.player).map(|s| Arc::new(s) as Arc<dyn AudioSink>);
    if sink.is_none() {
        info!("no audio player configured, narration is text only");
    }

    let session = GameSession::new(config.clone(), Arc::new(client), sink);
    let printer = tokio::spawn(print_events(session.clone(), session.subscribe()));

    let result = run(&session, &config, args.character).await;

    session.leave().await;
    printer.abort();
    result
}

fn parse_args() -> Result<Option<Args>> {
    let mut args = Args {
        base_url: None,
        character: None,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--base-url" => {
                args.base_url = Some(iter.next().context("--base-url requires a URL")?);
            }
            "--character" | "-c" => {
                args.character = Some(iter.next().context("--character requires an id")?);
            }
            "help" | "--help" | "-h" => return Ok(None),
            other => anyhow::bail!("unknown argument: {}", other),
        }
    }
    Ok(Some(args))
}

fn print_usage() {
    eprintln!(
        r#"parley - Persuade a pirate to hand over his treasure map

Usage:
  parley [--base-url <url>] [--character <id>]

In game:
  /restart   start over with the same guardian
  /leave     back to the guardian menu
  /quit      leave the game

Environment:
  PARLEY_CONFIG     Override config file path
  PARLEY_BASE_URL   Override conversation service URL
  RUST_LOG          Log filter (logs go to stderr)

Config: {config}
"#,
        config = paths::config_path().display(),
    );
}

/// What the player asked for at the prompt
enum Command {
    Say(String),
    Restart,
    Leave,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Self {
        match line.trim() {
            "/restart" => Command::Restart,
            "/leave" | "/menu" => Command::Leave,
            "/quit" | "/exit" | "/q" => Command::Quit,
            text => Command::Say(text.to_string()),
        }
    }
}

async fn run(session: &GameSession, config: &GameConfig, mut preselected: Option<String>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let character = match preselected.take() {
            Some(id) => id,
            None => {
                print_menu(&config.characters);
                match lines.next_line().await? {
                    Some(choice) => match pick_character(&config.characters, &choice) {
                        Some(id) => id,
                        None if choice.trim() == "/quit" => return Ok(()),
                        None => {
                            println!("{}", display::error("No such guardian."));
                            continue;
                        }
                    },
                    None => return Ok(()),
                }
            }
        };

        if let Err(e) = session.start(&character).await {
            println!("{}", display::error(&format!("Could not reach the ship: {}", e)));
            continue;
        }

        match play(session, &mut lines).await? {
            Command::Quit => return Ok(()),
            _ => continue,
        }
    }
}

/// Play one session until the player leaves, quits or goes idle.
async fn play<R>(session: &GameSession, lines: &mut tokio::io::Lines<R>) -> Result<Command>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut check = tokio::time::interval(INACTIVITY_CHECK);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = check.tick() => {
                if session.expire_if_inactive().await {
                    println!("{}", display::system("The guardian lost interest and wandered off."));
                    return Ok(Command::Leave);
                }
                continue;
            }
            _ = tokio::signal::ctrl_c() => return Ok(Command::Quit),
        };

        let Some(line) = line else {
            return Ok(Command::Quit);
        };

        match Command::parse(&line) {
            Command::Say(text) => match session.send_message(&text).await? {
                SendOutcome::Rejected(Rejection::EmptyInput) => {}
                SendOutcome::Rejected(Rejection::TurnInFlight) => {
                    println!("{}", display::dim("(he's still thinking)"));
                }
                SendOutcome::Rejected(Rejection::GameFinished) => {
                    println!("{}", display::dim("The game is over. /restart, /leave or /quit."));
                }
                SendOutcome::Continue(summary) => print_penalties(&summary),
                SendOutcome::Finished(summary) => {
                    print_penalties(&summary);
                    println!("{}", display::dim("/restart, /leave or /quit."));
                }
                SendOutcome::Recovered(e) => tracing::debug!(error = %e, "turn recovered"),
                SendOutcome::Discarded => {}
            },
            Command::Restart => {
                if let Err(e) = session.restart().await {
                    println!("{}", display::error(&format!("Could not restart: {}", e)));
                    return Ok(Command::Leave);
                }
            }
            command => {
                session.leave().await;
                return Ok(command);
            }
        }
    }
}

fn print_penalties(summary: &TurnSummary) {
    if summary.win_phrase_detected {
        println!("{}", display::dim("(the magic words were spoken)"));
    }
    for (category, points) in &summary.penalties {
        if *points < 0 {
            let label = category.replace('_', " ");
            println!("{}", display::error(&format!("  {} {}", points, label)));
        }
    }
}

fn print_menu(characters: &[Character]) {
    println!();
    println!("{}", display::boxed_header("PIRATE PARLEY", SCREEN_WIDTH));
    for (i, character) in characters.iter().enumerate() {
        println!(
            "  {}. {} ({})",
            i + 1,
            display::guardian(&character.name),
            character.difficulty.as_str()
        );
        if !character.blurb.is_empty() {
            println!("     {}", display::dim(&character.blurb));
        }
    }
    print!("{} ", display::prompt("Choose yer guardian:"));
    use std::io::Write;
    let _ = std::io::stdout().flush();
}

/// Accepts a menu number or a character id.
fn pick_character(characters: &[Character], choice: &str) -> Option<String> {
    let choice = choice.trim();
    if let Ok(n) = choice.parse::<usize>() {
        return characters.get(n.checked_sub(1)?).map(|c| c.id.clone());
    }
    characters
        .iter()
        .find(|c| c.id.eq_ignore_ascii_case(choice))
        .map(|c| c.id.clone())
}

async fn print_events(session: GameSession, mut events: GameEventReceiver) {
    while let Some(event) = events.recv().await {
        match event {
            GameEvent::PhaseChanged { session_id: Some(id), phase } => {
                tracing::debug!(session.id = %id, phase = phase.as_str(), "phase");
            }
            GameEvent::PhaseChanged { .. } => {}
            GameEvent::Transcript(line) => {
                if line.speaker == Speaker::Player {
                    continue;
                }
                let guardian = guardian_name(&session).await;
                println!("{}", display::transcript_line(&line, &guardian));
            }
            GameEvent::Thinking(true) => {
                let guardian = guardian_name(&session).await;
                println!("{}", display::dim(&format!("{} is thinking...", guardian)));
            }
            GameEvent::Thinking(false) => {}
            GameEvent::ScoreChanged { percent, emotion, .. } => {
                println!("{}", display::persuasion(percent, emotion));
            }
            GameEvent::Victory(stats) => {
                println!("{}", display::final_screen(true, &stats, SCREEN_WIDTH));
            }
            GameEvent::GameOver(stats) => {
                println!("{}", display::final_screen(false, &stats, SCREEN_WIDTH));
            }
        }
    }
}

async fn guardian_name(session: &GameSession) -> String {
    session
        .character()
        .await
        .map(|c| c.name)
        .unwrap_or_else(|| "Guardian".to_string())
}
