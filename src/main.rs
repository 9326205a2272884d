// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;
mod console;

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use tern_config::Config;
use tern_core::{as_switch_agent, bootstrap, is_user_cancel, Agent, ConversationStore, JsonlStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = tern_config::load(cli.config.as_deref())?;
    apply_model_override(&mut config, cli.model.as_deref());
    if cli.yes {
        config.agent.auto_approve = true;
    }

    if let Some(cmd) = &cli.command {
        return run_subcommand(cmd, &config);
    }

    let store: Option<Arc<dyn ConversationStore>> = cli
        .conversation
        .as_ref()
        .map(|p| Arc::new(JsonlStore::new(p)) as Arc<dyn ConversationStore>);

    let (mut agent, endpoint) = bootstrap::build_main_agent(&config, store.clone())?;
    if let Some(store) = &store {
        let history = store.load()?;
        if !history.is_empty() {
            agent.seed_history(history);
        }
    }

    let ui = tokio::spawn(console::run(endpoint));

    let attachments = cli::load_attachments(&cli)?;
    if let Some(prompt) = &cli.prompt {
        let result = agent.run_turn(prompt, attachments).await;
        report_turn_result(result.map(|_| ()));
        drop(agent);
        let _ = ui.await;
        return Ok(());
    }

    // Interactive loop: one prompt per turn, switch-agent handled by
    // rebuilding the agent from the named profile.
    let mut attachments = Some(attachments);
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = console::read_line().await else {
            break;
        };
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if prompt == "/quit" || prompt == "/exit" {
            break;
        }

        let parts = attachments.take().unwrap_or_default();
        match agent.run_turn(prompt, parts).await {
            Ok(_) => {}
            Err(e) => {
                if let Some(tern_core::AgentError::SwitchAgent {
                    target,
                    instruction,
                }) = as_switch_agent(&e).cloned()
                {
                    println!("(switching to agent '{target}')");
                    agent = switch_agent(agent, &config, &target, store.clone())?;
                    if let Some(instruction) = instruction {
                        report_turn_result(
                            agent.run_turn(&instruction, Vec::new()).await.map(|_| ()),
                        );
                    }
                } else {
                    report_turn_result(Err(e));
                }
            }
        }
    }

    drop(agent);
    let _ = ui.await;
    Ok(())
}

fn report_turn_result(result: anyhow::Result<()>) {
    if let Err(e) = result {
        if is_user_cancel(&e) {
            eprintln!("(cancelled)");
        } else {
            eprintln!("error: {e:#}");
        }
    }
}

/// Rebuild the main agent using the named profile's overrides, carrying the
/// conversation history over.
fn switch_agent(
    old: Agent,
    config: &Config,
    target: &str,
    store: Option<Arc<dyn ConversationStore>>,
) -> anyhow::Result<Agent> {
    let profile = config
        .agents
        .get(target)
        .ok_or_else(|| anyhow::anyhow!("unknown agent profile '{target}'"))?;

    let mut switched = config.clone();
    if let Some(model) = &profile.model {
        switched.model = model.clone();
    }
    if let Some(thinking) = profile.thinking {
        switched.agent.thinking = thinking;
    }
    if let Some(prompt) = &profile.system_prompt {
        switched.agent.system_prompt = Some(prompt.clone());
    }

    let history = old.session().messages.clone();
    drop(old);

    let (mut agent, endpoint) = bootstrap::build_main_agent(&switched, store)?;
    agent.seed_history(history);
    tokio::spawn(console::run(endpoint));
    Ok(agent)
}

fn apply_model_override(config: &mut Config, flag: Option<&str>) {
    let Some(flag) = flag else { return };
    match flag.split_once('/') {
        Some((provider, name)) => {
            config.model.provider = provider.to_string();
            config.model.name = name.to_string();
        }
        None => config.model.name = flag.to_string(),
    }
}

fn run_subcommand(cmd: &Commands, config: &Config) -> anyhow::Result<()> {
    match cmd {
        Commands::ShowConfig => {
            println!("{}", serde_yaml::to_string(config)?);
        }
        Commands::ListTools => {
            let state = Arc::new(tern_tools::SharedState::new());
            let citations = Arc::new(std::sync::Mutex::new(tern_tools::CitationLog::default()));
            let registry = bootstrap::build_registry(
                &config.tools,
                &tern_core::profile_entries(&config.agents),
                state,
                "main",
                citations,
                None,
            );
            for schema in registry.schemas() {
                let first_line = schema.description.lines().next().unwrap_or("");
                println!("{:<22} {first_line}", schema.name);
            }
        }
        Commands::ListAgents => {
            if config.agents.is_empty() {
                println!("no agent profiles configured");
            } else {
                let mut names: Vec<_> = config.agents.iter().collect();
                names.sort_by(|a, b| a.0.cmp(b.0));
                for (name, profile) in names {
                    println!("{name:<20} {}", profile.description);
                }
            }
        }
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "debug" } else { "warn" })
    });

    if let Ok(path) = std::env::var("TERN_LOG_FILE") {
        use std::sync::Mutex;
        if let Ok(file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
        {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .try_init();
            return;
        }
    }
    if verbose {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init();
    }
}
