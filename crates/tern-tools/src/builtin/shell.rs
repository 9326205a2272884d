// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
#[cfg(unix)]
use libc;
use serde_json::{json, Value};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::builtin::require_str;
use crate::tool::{need_confirm_arg, Tool, ToolCall, ToolOutput};

/// Hard byte ceiling for combined stdout + stderr returned to the model.
const OUTPUT_LIMIT_BYTES: usize = 20_000;

/// Lines kept from the head of oversized output.
const HEAD_LINES: usize = 100;

/// Lines kept from the tail of oversized output. Errors and summaries land
/// at the end of build/test output, so the tail matters at least as much as
/// the head.
const TAIL_LINES: usize = 100;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Built-in tool that runs a shell command through the default shell.
pub struct ShellTool {
    pub timeout_secs: u64,
}

impl Default for ShellTool {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return combined stdout and stderr with \
         the exit status appended. 'purpose' is a one-line explanation shown \
         to the user during confirmation. Output is capped at ~20 KB; when \
         larger, the first and last 100 lines are preserved with an omission \
         marker in the middle. Prefer non-interactive commands; the process \
         is killed at timeout_s."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The complete shell one-liner to execute"
                },
                "purpose": {
                    "type": "string",
                    "description": "One-line explanation of why this command is needed"
                },
                "need_confirm": {
                    "type": "boolean",
                    "description": "Ask the user before running (default true)",
                    "default": true
                },
                "timeout_s": {
                    "type": "integer",
                    "description": "Execution timeout in seconds (default 60)",
                    "default": 60
                }
            },
            "required": ["command", "purpose"]
        })
    }

    fn needs_confirmation(&self, args: &Value) -> bool {
        need_confirm_arg(args)
    }

    async fn confirm_preview(&self, args: &Value) -> String {
        let command = args.get("command").and_then(|v| v.as_str()).unwrap_or("?");
        let purpose = args.get("purpose").and_then(|v| v.as_str()).unwrap_or("");
        if purpose.is_empty() {
            format!("$ {command}")
        } else {
            format!("$ {command}\npurpose: {purpose}")
        }
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let command = match require_str(&call.args, "command") {
            Ok(c) => c.to_string(),
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        let timeout = call
            .args
            .get("timeout_s")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.timeout_secs);

        debug!(cmd = %command, timeout, "executing shell tool");

        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(&command);
        // Isolate the subprocess from the controlling terminal: stdin from
        // /dev/null so isatty(0) is false, and kill_on_drop so the timeout
        // path sends SIGKILL before the handle is released.
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        // setsid() detaches the child from the controlling terminal so it
        // cannot open /dev/tty and corrupt terminal state.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let result =
            tokio::time::timeout(std::time::Duration::from_secs(timeout), cmd.output()).await;

        match result {
            Ok(Ok(output)) => {
                let mut content = String::new();
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);

                if !stdout.is_empty() {
                    content.push_str(&head_tail_truncate(&stdout));
                }
                if !stderr.is_empty() {
                    if !content.is_empty() {
                        content.push('\n');
                    }
                    content.push_str("[stderr]\n");
                    content.push_str(&head_tail_truncate(&stderr));
                }

                let code = output.status.code().unwrap_or(-1);
                if !content.is_empty() {
                    content.push('\n');
                }
                content.push_str(&format!("[exit {code}]"));

                if code == 0 || code == 1 {
                    // Exit code 1 is the Unix convention for "no matches"
                    // (grep) and "condition false" (test); flagging it as an
                    // error misleads the model into believing the command
                    // itself failed.
                    ToolOutput::ok(&call.id, content)
                } else {
                    ToolOutput::err(&call.id, content)
                }
            }
            Ok(Err(e)) => ToolOutput::err(&call.id, format!("spawn error: {e}")),
            Err(_) => ToolOutput::err(&call.id, format!("timeout after {timeout}s")),
        }
    }
}

/// Truncate `s` to fit within `OUTPUT_LIMIT_BYTES`.
///
/// When truncation is needed the first `HEAD_LINES` and last `TAIL_LINES`
/// are kept verbatim, with an omission marker in the middle showing how much
/// was dropped.
pub(crate) fn head_tail_truncate(s: &str) -> String {
    if s.len() <= OUTPUT_LIMIT_BYTES {
        return s.to_string();
    }

    let lines: Vec<&str> = s.lines().collect();
    let total = lines.len();

    if total <= HEAD_LINES + TAIL_LINES {
        // Byte budget exceeded by very long lines; fall back to byte-level
        // head and tail windows.
        let tail_start = s.len().saturating_sub(OUTPUT_LIMIT_BYTES / 2);
        let mut tail_start = tail_start;
        while !s.is_char_boundary(tail_start) {
            tail_start += 1;
        }
        let mut head_end = (OUTPUT_LIMIT_BYTES / 2).min(s.len());
        while !s.is_char_boundary(head_end) {
            head_end -= 1;
        }
        let head_str = &s[..head_end];
        let tail_str = &s[tail_start..];
        let omitted = s.len() - head_str.len() - tail_str.len();
        return format!("{head_str}\n...[{omitted} bytes omitted]...\n{tail_str}");
    }

    let head = lines[..HEAD_LINES].join("\n");
    let tail = lines[total - TAIL_LINES..].join("\n");
    let omitted_lines = total - HEAD_LINES - TAIL_LINES;
    let omitted_bytes = s.len().saturating_sub(head.len() + tail.len());

    format!("{head}\n...[{omitted_lines} lines / ~{omitted_bytes} bytes omitted]...\n{tail}")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn call(args: Value) -> ToolCall {
        ToolCall {
            id: "sh1".into(),
            name: "shell".into(),
            args,
        }
    }

    #[tokio::test]
    async fn echo_returns_stdout_and_exit_status() {
        let out = ShellTool::default()
            .execute(&call(json!({"command": "echo hello", "purpose": "test"})))
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("hello"));
        assert!(out.content.contains("[exit 0]"));
    }

    #[tokio::test]
    async fn stderr_is_captured_with_marker() {
        let out = ShellTool::default()
            .execute(&call(json!({
                "command": "echo out && echo err >&2",
                "purpose": "test"
            })))
            .await;
        assert!(out.content.contains("out"));
        assert!(out.content.contains("[stderr]"));
        assert!(out.content.contains("err"));
    }

    #[tokio::test]
    async fn exit_one_is_not_an_error() {
        let out = ShellTool::default()
            .execute(&call(json!({"command": "exit 1", "purpose": "test"})))
            .await;
        assert!(!out.is_error);
        assert!(out.content.contains("[exit 1]"));
    }

    #[tokio::test]
    async fn exit_two_is_an_error() {
        let out = ShellTool::default()
            .execute(&call(json!({"command": "exit 2", "purpose": "test"})))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("[exit 2]"));
    }

    #[tokio::test]
    async fn timeout_kills_the_process() {
        let out = ShellTool { timeout_secs: 1 }
            .execute(&call(json!({
                "command": "sleep 30",
                "purpose": "test",
                "timeout_s": 1
            })))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("timeout"));
    }

    #[tokio::test]
    async fn missing_command_is_error() {
        let out = ShellTool::default()
            .execute(&call(json!({"purpose": "test"})))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("'command'"));
    }

    #[tokio::test]
    async fn preview_shows_command_and_purpose() {
        let p = ShellTool::default()
            .confirm_preview(&json!({"command": "ls /tmp", "purpose": "inspect"}))
            .await;
        assert!(p.contains("$ ls /tmp"));
        assert!(p.contains("purpose: inspect"));
    }

    #[test]
    fn short_output_passes_through_unchanged() {
        let s = "hello\nworld\n";
        assert_eq!(head_tail_truncate(s), s);
    }

    #[test]
    fn large_output_keeps_head_and_tail() {
        let mut lines: Vec<String> = vec!["FIRST LINE".to_string()];
        for i in 0..800 {
            lines.push(format!("middle {i} padding padding padding padding padding"));
        }
        lines.push("LAST LINE".to_string());
        let content = lines.join("\n");

        let result = head_tail_truncate(&content);
        assert!(result.contains("FIRST LINE"));
        assert!(result.contains("LAST LINE"));
        assert!(result.contains("omitted"));
        assert!(result.len() < content.len());
    }
}
