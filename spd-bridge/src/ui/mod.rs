//! Terminal user interface
//!
//! The UI task is the sole consumer of the bridge event stream and the sole
//! owner of display state, so no locking is needed anywhere in the render
//! path. It multiplexes three sources: bridge events, terminal input, and
//! replies to locally submitted queries.
//!
//! The local command path is independent of client sessions: it keeps
//! working across client connect/disconnect cycles and transport errors.

pub mod input;
pub mod screen;

use std::time::Duration;

use anyhow::Context;
use crossterm::event::{Event, EventStream, KeyCode, KeyModifiers};
use futures_util::StreamExt;
use spd_protocol::is_query;
use spd_relay::{BridgeEvent, GatewayCommand, Origin, SubmitReply};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use input::{map_key, InputAction, InputState};
use screen::{DisplayState, RenderMode, Row, StatusScreen};

/// Extra wait beyond the gateway's own reply bound, so the gateway's
/// timeout result arrives before the local one fires
const REPLY_GRACE: Duration = Duration::from_millis(500);

/// Run the terminal UI until the operator quits or the gateway stops
pub async fn run_ui(
    gateway_tx: mpsc::Sender<GatewayCommand>,
    event_rx: mpsc::Receiver<BridgeEvent>,
    transport_desc: String,
    telemetry_desc: String,
    reply_timeout: Duration,
) -> anyhow::Result<()> {
    let mut state = DisplayState::new(transport_desc, telemetry_desc);
    let mut screen = StatusScreen::new();

    let result = if screen.activate()? {
        run_panel(
            &mut screen,
            &mut state,
            gateway_tx.clone(),
            event_rx,
            reply_timeout,
        )
        .await
    } else {
        run_plain(event_rx).await
    };

    screen.deactivate()?;
    let _ = gateway_tx.send(GatewayCommand::Shutdown).await;
    result
}

/// Interactive panel mode: partial redraws keyed by what changed
async fn run_panel(
    screen: &mut StatusScreen,
    state: &mut DisplayState,
    gateway_tx: mpsc::Sender<GatewayCommand>,
    mut event_rx: mpsc::Receiver<BridgeEvent>,
    reply_timeout: Duration,
) -> anyhow::Result<()> {
    let mut input = InputState::new();
    let mut term_events = EventStream::new();
    let (eph_tx, mut eph_rx) = mpsc::channel::<String>(8);

    screen.full_redraw(state, input.buffer())?;

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                apply_bridge_event(screen, state, &event, input.buffer())?;
            }

            reply = eph_rx.recv() => {
                if let Some(text) = reply {
                    state.ephemeral = Some(text);
                    screen.redraw_row(Row::Updated, state, input.buffer())?;
                }
            }

            term = term_events.next() => {
                match term {
                    Some(Ok(Event::Key(key))) => {
                        if key.code == KeyCode::Char('c')
                            && key.modifiers.contains(KeyModifiers::CONTROL)
                        {
                            debug!("Operator quit");
                            break;
                        }
                        let Some(ev) = map_key(&key) else { continue };
                        match input.apply(ev) {
                            InputAction::Unchanged => {}
                            InputAction::Redraw => {
                                screen.redraw_row(Row::Input, state, input.buffer())?;
                            }
                            InputAction::Submit(command) => {
                                state.ephemeral = None;
                                submit_local(&gateway_tx, &eph_tx, command, reply_timeout)
                                    .await?;
                                screen.redraw_row(Row::Updated, state, input.buffer())?;
                                screen.redraw_row(Row::Input, state, input.buffer())?;
                            }
                        }
                    }
                    Some(Ok(Event::Resize(w, h))) => {
                        screen.resize(w, h, state, input.buffer())?;
                        if screen.mode() == RenderMode::Inactive {
                            // Too small to keep the panel; drop to plain mode
                            return run_plain(event_rx).await;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Terminal event error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    Ok(())
}

/// Apply one bridge event to display state and repaint the affected rows
fn apply_bridge_event(
    screen: &mut StatusScreen,
    state: &mut DisplayState,
    event: &BridgeEvent,
    input: &str,
) -> anyhow::Result<()> {
    match event {
        BridgeEvent::Measurement { field, value } => {
            state.record_measurement(*field, *value);
            screen.redraw_row(Row::Values, state, input)?;
            screen.redraw_row(Row::Updated, state, input)?;
        }
        BridgeEvent::SampleFlushed { total } => {
            state.samples = *total;
            screen.redraw_row(Row::Telemetry, state, input)?;
        }
        BridgeEvent::ClientConnected { peer } => {
            state.peer = Some(peer.clone());
            screen.redraw_row(Row::Link, state, input)?;
        }
        BridgeEvent::ClientDisconnected { peer } => {
            if state.peer.as_deref() == Some(peer.as_str()) {
                state.peer = None;
            }
            screen.redraw_row(Row::Link, state, input)?;
        }
        BridgeEvent::Error { source, message } => {
            state.ephemeral = Some(format!("{source} error: {message}"));
            screen.redraw_row(Row::Updated, state, input)?;
        }
        BridgeEvent::CommandSent { .. } => {}
    }
    Ok(())
}

/// Dispatch a locally entered command through the gateway
///
/// Query replies arrive asynchronously on `eph_tx` so the UI loop never
/// stalls waiting for the instrument.
async fn submit_local(
    gateway_tx: &mpsc::Sender<GatewayCommand>,
    eph_tx: &mpsc::Sender<String>,
    command: String,
    reply_timeout: Duration,
) -> anyhow::Result<()> {
    if !is_query(&command) {
        gateway_tx
            .send(GatewayCommand::Submit {
                command,
                origin: Origin::Local,
                reply: None,
            })
            .await
            .context("gateway closed")?;
        return Ok(());
    }

    let (tx, rx) = oneshot::channel();
    gateway_tx
        .send(GatewayCommand::Submit {
            command,
            origin: Origin::Local,
            reply: Some(tx),
        })
        .await
        .context("gateway closed")?;

    let eph_tx = eph_tx.clone();
    tokio::spawn(async move {
        let text = match tokio::time::timeout(reply_timeout + REPLY_GRACE, rx).await {
            Ok(Ok(SubmitReply::Line(line))) => format!("> {line}"),
            Ok(Ok(SubmitReply::TimedOut)) => "(no reply)".to_string(),
            Ok(Ok(SubmitReply::Failed(message))) => format!("error: {message}"),
            Ok(Err(_)) | Err(_) => "(no reply)".to_string(),
        };
        let _ = eph_tx.send(text).await;
    });

    Ok(())
}

/// Plain sequential status lines for non-interactive environments
async fn run_plain(mut event_rx: mpsc::Receiver<BridgeEvent>) -> anyhow::Result<()> {
    println!("status display unavailable; falling back to plain output");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                print_event(&event);
            }
            _ = &mut ctrl_c => {
                println!("interrupted, shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn print_event(event: &BridgeEvent) {
    match event {
        BridgeEvent::Measurement { field, value } => {
            println!("measure {field} = {value:.3} {}", field.unit());
        }
        BridgeEvent::SampleFlushed { total } => {
            println!("telemetry sample #{total}");
        }
        BridgeEvent::ClientConnected { peer } => {
            println!("client connected: {peer}");
        }
        BridgeEvent::ClientDisconnected { peer } => {
            println!("client disconnected: {peer}");
        }
        BridgeEvent::CommandSent { origin, command } => {
            println!("sent ({origin}): {command}");
        }
        BridgeEvent::Error { source, message } => {
            println!("{source} error: {message}");
        }
    }
}
