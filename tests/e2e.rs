//! End-to-end tests for pirate-parley
//!
//! Drives a real `GameSession` over HTTP against a mock conversation
//! service, with a hand-cranked audio sink standing in for the speaker.

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use pirate_parley::audio::{AudioSink, Playback, PlaybackControl, Presented};
use pirate_parley::config::GameConfig;
use pirate_parley::emotion::Emotion;
use pirate_parley::events::{GameEvent, GameEventReceiver};
use pirate_parley::service::{ConversationService, HttpConversationClient};
use pirate_parley::session::{GameSession, Outcome, Phase, Rejection, SendOutcome};
use pirate_parley::transcript::{Speaker, FALLBACK_LINE};
use pirate_parley::GameError;

// ============================================================================
// Mock conversation service
// ============================================================================

/// One scripted answer to a conversation request
enum Scripted {
    Reply(Value),
    Status(u16),
    Slow(Duration, Value),
}

#[derive(Default)]
struct ShipState {
    script: VecDeque<Scripted>,
    turn_requests: Vec<Value>,
    start_requests: Vec<Value>,
    fail_start: bool,
}

#[derive(Clone, Default)]
struct MockShip {
    state: Arc<Mutex<ShipState>>,
}

impl MockShip {
    fn new(script: Vec<Scripted>) -> Self {
        let ship = Self::default();
        ship.state.lock().unwrap().script = script.into();
        ship
    }

    fn failing_start() -> Self {
        let ship = Self::default();
        ship.state.lock().unwrap().fail_start = true;
        ship
    }

    fn turn_requests(&self) -> Vec<Value> {
        self.state.lock().unwrap().turn_requests.clone()
    }

    fn start_requests(&self) -> Vec<Value> {
        self.state.lock().unwrap().start_requests.clone()
    }
}

async fn start_game(State(ship): State<MockShip>, Json(body): Json<Value>) -> Response {
    let mut state = ship.state.lock().unwrap();
    if state.fail_start {
        return (StatusCode::SERVICE_UNAVAILABLE, "ship is sinking").into_response();
    }
    state.start_requests.push(body);
    let n = state.start_requests.len();
    Json(json!({
        "game_id": format!("game-{}", n),
        "message": "[NEUTRAL] Who dares approach me ship? *spits*"
    }))
    .into_response()
}

async fn conversation(State(ship): State<MockShip>, Json(body): Json<Value>) -> Response {
    let next = {
        let mut state = ship.state.lock().unwrap();
        state.turn_requests.push(body);
        state.script.pop_front()
    };

    match next {
        Some(Scripted::Reply(value)) => Json(value).into_response(),
        Some(Scripted::Slow(delay, value)) => {
            tokio::time::sleep(delay).await;
            Json(value).into_response()
        }
        Some(Scripted::Status(code)) => StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "script exhausted").into_response(),
    }
}

async fn health() -> &'static str {
    "ok"
}

/// Start the mock service on a random port, returns the base URL
async fn start_test_ship(ship: MockShip) -> Result<(String, tokio::task::JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let url = format!("http://127.0.0.1:{}", port);

    let router = axum::Router::new()
        .route("/api/game/start", post(start_game))
        .route("/api/game/conversation", post(conversation))
        .route("/health", get(health))
        .with_state(ship);

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok((url, handle))
}

// ============================================================================
// Manual audio sink
// ============================================================================

/// Records every playback request; the test decides when it starts and ends.
#[derive(Default)]
struct ManualSink {
    plays: Mutex<Vec<(String, PlaybackControl)>>,
}

impl AudioSink for ManualSink {
    fn play(&self, url: &str) -> Playback {
        let (control, playback) = Playback::channel();
        self.plays.lock().unwrap().push((url.to_string(), control));
        playback
    }
}

impl ManualSink {
    async fn wait_for_play(&self) -> (String, PlaybackControl) {
        for _ in 0..500 {
            if let Some(play) = self.plays.lock().unwrap().last().cloned() {
                return play;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no playback was requested");
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

fn test_config(base_url: &str) -> GameConfig {
    let mut config = GameConfig::default();
    config.service.base_url = base_url.to_string();
    config.service.request_timeout_ms = 2_000;
    config.audio.start_timeout_ms = 2_000;
    config.audio.grace_ms = 100;
    config.audio.reading_ms_per_char = 1;
    config.audio.reading_min_ms = 50;
    config.audio.reading_max_ms = 200;
    config
}

fn new_session(base_url: &str, sink: Option<Arc<ManualSink>>) -> Result<GameSession> {
    let config = test_config(base_url);
    let client = HttpConversationClient::new(&config.service)?;
    let sink = sink.map(|s| s as Arc<dyn AudioSink>);
    Ok(GameSession::new(config, Arc::new(client), sink))
}

fn turn(text: &str, merit: i32) -> Value {
    json!({
        "pirate_response": text,
        "merit_score": merit,
        "is_won": false,
        "is_lost": false,
        "audio_url": null,
        "win_phrase_detected": false,
        "negative_categories": {}
    })
}

async fn wait_for_line(session: &GameSession, text: &str) {
    for _ in 0..500 {
        if session.view().await.transcript.iter().any(|l| l.text == text) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("line {:?} never appeared", text);
}

fn terminal_events(events: &mut GameEventReceiver) -> Vec<GameEvent> {
    events.drain().into_iter().filter(|e| e.is_terminal()).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_health_check() -> Result<()> {
    let (url, _handle) = start_test_ship(MockShip::default()).await?;
    let client = HttpConversationClient::new(&test_config(&url).service)?;
    assert!(client.health().await?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_start_sends_character() -> Result<()> {
    let ship = MockShip::default();
    let (url, _handle) = start_test_ship(ship.clone()).await?;
    let session = new_session(&url, None)?;

    let view = session.start("corsair").await?;
    assert_eq!(view.session_id.as_deref(), Some("game-1"));
    assert_eq!(view.phase, Phase::Ready);
    assert_eq!(view.display_percent, 50);
    assert_eq!(view.transcript[0].speaker, Speaker::Guardian);
    assert_eq!(view.transcript[0].text, "Who dares approach me ship?");

    let requests = ship.start_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["difficulty"], "medium");
    assert_eq!(requests[0]["pirate_name"], "Corsair Code");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_start_failure() -> Result<()> {
    let (url, _handle) = start_test_ship(MockShip::failing_start()).await?;
    let session = new_session(&url, None)?;

    let err = session.start("greenhorn").await.unwrap_err();
    assert!(matches!(err, GameError::StartFailed(_)), "got {:?}", err);
    assert_eq!(session.phase().await, Phase::Idle);
    assert!(matches!(
        session.send_message("ahoy").await,
        Err(GameError::NoActiveSession)
    ));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scored_turn() -> Result<()> {
    let ship = MockShip::new(vec![Scripted::Reply(turn("[HAPPY] Flattery will get ye far, lad.", 65))]);
    let (url, _handle) = start_test_ship(ship.clone()).await?;
    let session = new_session(&url, None)?;
    session.start("greenhorn").await?;

    let outcome = session.send_message("What a fine beard ye have").await?;
    let SendOutcome::Continue(summary) = outcome else {
        panic!("expected Continue, got {:?}", outcome);
    };
    assert_eq!(summary.percent, 83);
    assert_eq!(summary.reply, "Flattery will get ye far, lad.");

    let view = session.view().await;
    assert_eq!(view.display_percent, 83);
    assert_eq!(view.outcome, Outcome::Undecided);
    assert_eq!(view.turn_count, 1);

    let requests = ship.turn_requests();
    assert_eq!(requests[0]["game_id"], "game-1");
    assert_eq!(requests[0]["message"], "What a fine beard ye have");
    assert_eq!(requests[0]["include_audio"], true);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_victory_waits_for_narration() -> Result<()> {
    let mut winning = turn("[HAPPY] Arr, the map be yours.", 90);
    winning["is_won"] = json!(true);
    winning["win_phrase_detected"] = json!(true);
    winning["audio_url"] = json!("/audio/line-1.mp3");

    let ship = MockShip::new(vec![Scripted::Reply(winning)]);
    let (url, _handle) = start_test_ship(ship).await?;
    let sink = Arc::new(ManualSink::default());
    let session = new_session(&url, Some(sink.clone()))?;
    let mut events = session.subscribe();
    session.start("greenhorn").await?;

    let runner = session.clone();
    let pending = tokio::spawn(async move { runner.send_message("I saved yer parrot").await });

    let (audio_url, control) = sink.wait_for_play().await;
    assert_eq!(audio_url, format!("{}/audio/line-1.mp3", url));

    // text waits for the voice
    let view = session.view().await;
    assert_eq!(view.phase, Phase::Committing);
    assert!(!view.transcript.iter().any(|l| l.text == "Arr, the map be yours."));

    control.started();
    wait_for_line(&session, "Arr, the map be yours.").await;

    // shown, but the win is held until the voice ends
    tokio::time::sleep(Duration::from_millis(100)).await;
    let view = session.view().await;
    assert_eq!(view.outcome, Outcome::Undecided);
    assert!(!view.is_terminal());
    assert!(terminal_events(&mut events).is_empty());

    control.ended();
    let outcome = pending.await??;
    let SendOutcome::Finished(summary) = outcome else {
        panic!("expected Finished, got {:?}", outcome);
    };
    assert_eq!(summary.outcome, Outcome::Won);
    assert_eq!(summary.presented, Presented::OnPlaybackStart);
    assert!(summary.win_phrase_detected);

    let view = session.view().await;
    assert_eq!(view.outcome, Outcome::Won);
    assert_eq!(view.stats.map(|s| s.technique), Some(95));

    let terminal = terminal_events(&mut events);
    assert_eq!(terminal.len(), 1);
    assert!(matches!(terminal[0], GameEvent::Victory(_)));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_playback_failure_falls_back_to_text() -> Result<()> {
    let mut losing = turn("[ANGRY] Overboard with ye!", -90);
    losing["is_lost"] = json!(true);
    losing["audio_url"] = json!("https://cdn.example/lost.mp3");

    let ship = MockShip::new(vec![Scripted::Reply(losing)]);
    let (url, _handle) = start_test_ship(ship).await?;
    let sink = Arc::new(ManualSink::default());
    let session = new_session(&url, Some(sink.clone()))?;
    let mut events = session.subscribe();
    session.start("ghost").await?;

    let runner = session.clone();
    let pending = tokio::spawn(async move { runner.send_message("Give it or else").await });

    let (_, control) = sink.wait_for_play().await;
    control.failed("no audio device");

    let outcome = pending.await??;
    let SendOutcome::Finished(summary) = outcome else {
        panic!("expected Finished, got {:?}", outcome);
    };
    assert_eq!(summary.outcome, Outcome::Lost);
    assert!(matches!(summary.presented, Presented::Fallback(_)));
    assert!(session
        .view()
        .await
        .transcript
        .iter()
        .any(|l| l.text == "Overboard with ye!"));

    let terminal = terminal_events(&mut events);
    assert_eq!(terminal.len(), 1);
    assert!(matches!(terminal[0], GameEvent::GameOver(_)));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_finished_game_rejects_input() -> Result<()> {
    let mut winning = turn("Fine, take it.", 40);
    winning["is_won"] = json!(true);

    let ship = MockShip::new(vec![Scripted::Reply(winning), Scripted::Reply(turn("unused", 0))]);
    let (url, _handle) = start_test_ship(ship.clone()).await?;
    let session = new_session(&url, None)?;
    session.start("greenhorn").await?;

    assert!(matches!(session.send_message("please").await?, SendOutcome::Finished(_)));
    assert!(matches!(
        session.send_message("another").await?,
        SendOutcome::Rejected(Rejection::GameFinished)
    ));
    assert_eq!(ship.turn_requests().len(), 1);
    assert_eq!(session.phase().await, Phase::Finished(Outcome::Won));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_server_error_recovers() -> Result<()> {
    let ship = MockShip::new(vec![
        Scripted::Status(500),
        Scripted::Reply(turn("[NEUTRAL] Speak up.", 10)),
    ]);
    let (url, _handle) = start_test_ship(ship.clone()).await?;
    let session = new_session(&url, None)?;
    session.start("greenhorn").await?;

    let outcome = session.send_message("hello?").await?;
    assert!(
        matches!(outcome, SendOutcome::Recovered(GameError::Http { status: 500 })),
        "got {:?}",
        outcome
    );

    let view = session.view().await;
    assert_eq!(view.phase, Phase::Ready);
    assert_eq!(view.turn_count, 1);
    assert_eq!(view.display_percent, 50);
    let last = view.transcript.last().unwrap();
    assert_eq!(last.speaker, Speaker::System);
    assert_eq!(last.text, FALLBACK_LINE);

    let outcome = session.send_message("HELLO?").await?;
    assert!(matches!(outcome, SendOutcome::Continue(ref s) if s.percent == 55));
    assert_eq!(session.view().await.turn_count, 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_malformed_reply_recovers() -> Result<()> {
    let ship = MockShip::new(vec![Scripted::Reply(json!({"pirate_response": "Arr"}))]);
    let (url, _handle) = start_test_ship(ship).await?;
    let session = new_session(&url, None)?;
    session.start("greenhorn").await?;

    let outcome = session.send_message("hello").await?;
    assert!(
        matches!(outcome, SendOutcome::Recovered(GameError::MalformedReply(_))),
        "got {:?}",
        outcome
    );
    assert_eq!(session.view().await.display_percent, 50);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_one_request_in_flight() -> Result<()> {
    let ship = MockShip::new(vec![Scripted::Slow(
        Duration::from_millis(300),
        turn("[THINKING] Hmm.", 0),
    )]);
    let (url, _handle) = start_test_ship(ship.clone()).await?;
    let session = new_session(&url, None)?;
    session.start("greenhorn").await?;

    let runner = session.clone();
    let first = tokio::spawn(async move { runner.send_message("first").await });

    // wait until the first turn is on the wire
    for _ in 0..100 {
        if session.view().await.thinking {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let second = session.send_message("second").await?;
    assert!(matches!(second, SendOutcome::Rejected(Rejection::TurnInFlight)));

    assert!(matches!(first.await??, SendOutcome::Continue(_)));
    assert_eq!(ship.turn_requests().len(), 1);
    let view = session.view().await;
    assert_eq!(view.turn_count, 1);
    assert!(!view.thinking);
    assert_eq!(view.emotion, Emotion::Idle);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_restart_discards_late_reply() -> Result<()> {
    let ship = MockShip::new(vec![Scripted::Slow(
        Duration::from_millis(300),
        turn("[HAPPY] Too late, matey.", 100),
    )]);
    let (url, _handle) = start_test_ship(ship).await?;
    let session = new_session(&url, None)?;
    session.start("greenhorn").await?;

    let runner = session.clone();
    let stale = tokio::spawn(async move { runner.send_message("remember me?").await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let view = session.restart().await?;
    assert_eq!(view.session_id.as_deref(), Some("game-2"));

    assert!(matches!(stale.await??, SendOutcome::Discarded));
    tokio::time::sleep(Duration::from_millis(400)).await;

    let view = session.view().await;
    assert_eq!(view.session_id.as_deref(), Some("game-2"));
    assert_eq!(view.turn_count, 0);
    assert_eq!(view.display_percent, 50);
    assert!(!view.transcript.iter().any(|l| l.text.contains("Too late")));
    Ok(())
}
