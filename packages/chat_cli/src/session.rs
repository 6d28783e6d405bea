//! Terminal rendering of a chat session.
//!
//! The transport never says when a reply is finished, so a turn here is
//! settled after a stretch of inbound silence. Ctrl-C abandons the turn.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chat_stream::{ChatClient, ChatSnapshot, ConnectionState, TurnInput};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{Instant, sleep_until};
use tracing::debug;

use crate::config::StreamConfig;
use crate::repl::{self, ReplCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Settled,
    Abandoned,
    Disconnected,
    NotSent,
}

/// Interactive prompt until `/quit`, EOF, Ctrl-C at the prompt, or the
/// connection closing.
pub async fn interactive(client: ChatClient, stream: &StreamConfig) -> Result<()> {
    if !wait_connected(&client).await {
        client.close().await;
        return Ok(());
    }
    eprintln!(
        "[chat: connected, mode {}; /help for commands]",
        client.mode()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt()?;
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let cmd = match repl::parse(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(msg) => {
                eprintln!("{msg}");
                continue;
            }
        };

        match cmd {
            ReplCommand::Quit => break,
            ReplCommand::Help => eprintln!("{}", repl::HELP),
            ReplCommand::Status => eprintln!("{}", format_status(&client.snapshot())),
            ReplCommand::Reset => {
                client.reset().await?;
                eprintln!("[chat: reset]");
            }
            ReplCommand::Mode(mode) => {
                client.change_mode(mode).await?;
                eprintln!("[chat: mode {mode}]");
            }
            other => {
                let Some(input) = other.into_input(client.mode()) else {
                    continue;
                };
                match run_turn(&client, input, stream.idle_settle).await {
                    Ok(TurnOutcome::Disconnected) => break,
                    Ok(_) => {}
                    Err(e) => eprintln!("error: {e:#}"),
                }
            }
        }
    }

    client.close().await;
    Ok(())
}

/// Send one turn, print the reply, and exit.
pub async fn ask(client: ChatClient, input: TurnInput, stream: &StreamConfig) -> Result<()> {
    if !wait_connected(&client).await {
        client.close().await;
        bail!("Could not connect to chat endpoint");
    }
    let outcome = run_turn(&client, input, stream.idle_settle).await;
    client.close().await;

    match outcome? {
        TurnOutcome::Settled | TurnOutcome::Abandoned => Ok(()),
        TurnOutcome::Disconnected => bail!("Connection closed before the reply settled"),
        TurnOutcome::NotSent => bail!("Message was not sent"),
    }
}

async fn wait_connected(client: &ChatClient) -> bool {
    let mut updates = client.subscribe();
    let state = tokio::select! {
        state = updates.wait_for(|s| s.connection != ConnectionState::Connecting) => {
            state.map(|s| s.connection).ok()
        }
        _ = tokio::signal::ctrl_c() => None,
    };
    if state == Some(ConnectionState::Open) {
        true
    } else {
        eprintln!("[chat: could not connect]");
        false
    }
}

async fn run_turn(
    client: &ChatClient,
    input: TurnInput,
    idle_settle: Duration,
) -> Result<TurnOutcome> {
    let mut updates = client.subscribe();
    client.submit(input).await?;
    if !client.is_loading() {
        eprintln!("[chat: not connected, message not sent]");
        return Ok(TurnOutcome::NotSent);
    }
    let _ = updates.borrow_and_update();

    let mut stdout = std::io::stdout();
    let mut printed = 0;
    let mut last_fragment: Option<Instant> = None;

    loop {
        let settle_at = last_fragment.map(|t| t + idle_settle);
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    return Ok(TurnOutcome::Disconnected);
                }
                let (fresh, connected) = {
                    let snapshot = updates.borrow_and_update();
                    let fresh = snapshot.reply.get(printed..).unwrap_or_default().to_string();
                    (fresh, snapshot.is_connected())
                };
                if !fresh.is_empty() {
                    write!(stdout, "{fresh}")?;
                    stdout.flush()?;
                    printed += fresh.len();
                    last_fragment = Some(Instant::now());
                }
                if !connected {
                    println!();
                    eprintln!("[chat: connection closed]");
                    return Ok(TurnOutcome::Disconnected);
                }
            }
            _ = sleep_until(settle_at.unwrap_or_else(Instant::now)), if settle_at.is_some() => {
                client.settle().await?;
                println!();
                eprintln!("[{:.1}s]", client.elapsed_seconds());
                debug!(bytes = printed, "turn settled after silence");
                return Ok(TurnOutcome::Settled);
            }
            _ = tokio::signal::ctrl_c() => {
                client.reset().await?;
                println!();
                eprintln!("[chat: turn abandoned]");
                return Ok(TurnOutcome::Abandoned);
            }
        }
    }
}

fn prompt() -> Result<()> {
    let mut stderr = std::io::stderr();
    write!(stderr, "> ")?;
    stderr.flush()?;
    Ok(())
}

pub fn format_status(s: &ChatSnapshot) -> String {
    format!(
        "connection: {:?}\nmode:       {}\nturn:       {:?}\nelapsed:    {:.1}s\nmessages:   {}",
        s.connection,
        s.mode,
        s.phase,
        s.elapsed_seconds,
        s.transcript.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_stream::{Mode, TurnPhase};

    #[test]
    fn status_lists_state() {
        let snapshot = ChatSnapshot {
            connection: ConnectionState::Open,
            phase: TurnPhase::Receiving,
            turn_id: None,
            reply: "Hel".into(),
            elapsed_seconds: 1.25,
            mode: Mode::DocumentProcessing,
            transcript: Vec::new(),
        };
        let status = format_status(&snapshot);
        assert!(status.contains("connection: Open"));
        assert!(status.contains("mode:       document_processing"));
        assert!(status.contains("turn:       Receiving"));
        assert!(status.contains("elapsed:    1.2s") || status.contains("elapsed:    1.3s"));
        assert!(status.contains("messages:   0"));
    }
}
