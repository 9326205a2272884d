// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Plain-text console collaborator.
//!
//! Consumes the agent's notification stream, renders it to stdout, answers
//! confirmations from stdin, and acknowledges every rendered event so the
//! agent can proceed. Runs as its own task for the lifetime of the agent.

use std::io::Write;

use tern_core::{NotifyData, StreamStatus, UiEndpoint, UserDecision};

/// Drive the UI endpoint until the agent closes the channel.
pub async fn run(mut endpoint: UiEndpoint) {
    let mut last_ended_with_newline = true;

    while let Some(notify) = endpoint.notify_rx.recv().await {
        match notify.status {
            StreamStatus::Data => match notify.data {
                Some(NotifyData::Text(chunk)) => {
                    last_ended_with_newline = chunk.ends_with('\n');
                    print!("{chunk}");
                    let _ = std::io::stdout().flush();
                }
                Some(NotifyData::Reasoning(chunk)) => {
                    // Reasoning is rendered dimmed-out of band; keep it on
                    // stderr so piped output stays clean.
                    eprint!("{chunk}");
                    let _ = std::io::stderr().flush();
                }
                Some(NotifyData::Message(text)) => {
                    if !last_ended_with_newline {
                        println!();
                        last_ended_with_newline = true;
                    }
                    println!("\n{text}");
                }
                Some(NotifyData::Usage(u)) => {
                    eprintln!(
                        "[tokens: {} in / {} out, {} cached]",
                        u.prompt_tokens, u.completion_tokens, u.cached_prompt_tokens
                    );
                }
                _ => {}
            },
            StreamStatus::Reasoning => eprintln!("· thinking…"),
            StreamStatus::ReasoningOver => eprintln!(),
            StreamStatus::FunctionCalling => {
                if let Some(NotifyData::FunctionCall { function, args }) = &notify.data {
                    eprintln!("→ {function}({args})");
                }
            }
            StreamStatus::Searching => {
                if let Some(NotifyData::FunctionCall { function, args }) = &notify.data {
                    eprintln!("🔎 {function}({args})");
                }
            }
            StreamStatus::DiffConfirm => {
                if let Some(NotifyData::Diff(preview)) = &notify.data {
                    println!("\n--- confirmation required ---");
                    println!("{preview}");
                    println!("-----------------------------");
                }
                let decision = ask_decision().await;
                let _ = endpoint.decision_tx.send(decision).await;
            }
            StreamStatus::Finished => {
                if !last_ended_with_newline {
                    println!();
                    last_ended_with_newline = true;
                }
            }
            StreamStatus::Error => {
                if let Some(NotifyData::Message(text)) = &notify.data {
                    eprintln!("error: {text}");
                }
            }
            StreamStatus::Warn => {
                if let Some(NotifyData::Message(text)) = &notify.data {
                    eprintln!("warning: {text}");
                }
            }
            _ => {}
        }

        if !notify.status.is_fire_and_forget()
            && endpoint.proceed_tx.send(true).await.is_err()
        {
            break;
        }
    }
}

/// Prompt on stdout and read one y/N answer from stdin.
async fn ask_decision() -> UserDecision {
    print!("Apply this operation? [y/N]: ");
    let _ = std::io::stdout().flush();
    match read_line().await {
        Some(line) => {
            let answer = line.trim().to_ascii_lowercase();
            if answer == "y" || answer == "yes" {
                UserDecision::Approve
            } else {
                UserDecision::Deny
            }
        }
        None => UserDecision::Timeout,
    }
}

/// Read one line from stdin without blocking the runtime.
pub async fn read_line() -> Option<String> {
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line),
            Err(_) => None,
        }
    })
    .await
    .ok()
    .flatten()
}
