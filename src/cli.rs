// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use anyhow::Context;
use base64::Engine;
use clap::{Parser, Subcommand};

use tern_model::ContentPart;

#[derive(Debug, Parser)]
#[command(
    name = "tern",
    about = "A CLI agentic assistant driving LLMs through streaming tool-call loops",
    version
)]
pub struct Cli {
    /// Explicit config file (merged over the discovered layers)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging to stderr (or set TERN_LOG_FILE for a file)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run a single prompt and exit instead of starting the REPL
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Model override, as "<name>" or "<provider>/<name>"
    #[arg(short, long)]
    pub model: Option<String>,

    /// Attach an image file to the prompt (repeatable)
    #[arg(long)]
    pub image: Vec<PathBuf>,

    /// Attach a video file to the prompt (repeatable)
    #[arg(long)]
    pub video: Vec<PathBuf>,

    /// Conversation log to resume from and persist to
    #[arg(long)]
    pub conversation: Option<PathBuf>,

    /// Approve all tool confirmations automatically
    #[arg(long)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the merged configuration
    ShowConfig,
    /// List the registered tools and their descriptions
    ListTools,
    /// List the configured agent profiles
    ListAgents,
}

/// Load the attachment files named on the command line as inline data-URL
/// content parts.
pub fn load_attachments(cli: &Cli) -> anyhow::Result<Vec<ContentPart>> {
    let mut parts = Vec::new();
    for path in &cli.image {
        parts.push(ContentPart::image(data_url(path)?));
    }
    for path in &cli.video {
        parts.push(ContentPart::video(data_url(path)?));
    }
    Ok(parts)
}

fn data_url(path: &PathBuf) -> anyhow::Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading attachment {}", path.display()))?;
    let mime = mime_for(path);
    let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{mime};base64,{b64}"))
}

fn mime_for(path: &PathBuf) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_detection_by_extension() {
        assert_eq!(mime_for(&PathBuf::from("a.PNG")), "image/png");
        assert_eq!(mime_for(&PathBuf::from("b.jpeg")), "image/jpeg");
        assert_eq!(mime_for(&PathBuf::from("c.mp4")), "video/mp4");
        assert_eq!(mime_for(&PathBuf::from("d.bin")), "application/octet-stream");
    }

    #[test]
    fn data_url_encodes_file_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.png");
        std::fs::write(&path, [0x89, 0x50]).unwrap();
        let url = data_url(&path).unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn cli_parses_one_shot_prompt() {
        let cli = Cli::parse_from(["tern", "-p", "hello", "--yes"]);
        assert_eq!(cli.prompt.as_deref(), Some("hello"));
        assert!(cli.yes);
    }
}
