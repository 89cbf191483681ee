//! C1 — Agent Invoker.
//!
//! Spawns the external LLM agent (`claude -p --output-format stream-json`)
//! as a fresh subprocess per request, feeds it the assembled envelope on
//! stdin, and parses its NDJSON stdout stream line-by-line.
//!
//! Grounded on `skynet-agent/src/claude_cli.rs` for the spawn/tempfile/stdin
//! shape (reworked here from single-shot JSON to true streaming) and on
//! `skynet-terminal/src/manager.rs`'s timeout-race-then-SIGKILL pattern for
//! the deadline/cancellation handling.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use sk_core::config::AgentConfig;

use crate::error::{AgentError, Result};
use crate::types::{AgentInvocation, FinalStatus, InvokeRequest};

/// Minimum spacing between interim notices for *any* tool, per §4.1: "no
/// more than one notice fires within any 3-second window".
const INTERIM_THROTTLE: Duration = Duration::from_secs(3);

pub struct Invoker {
    binary_path: String,
    workdir: Option<std::path::PathBuf>,
    max_timeout_secs: u64,
    grace: Duration,
    oversize_bytes: usize,
}

impl Invoker {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            binary_path: config.binary_path.clone(),
            workdir: config.workdir.as_ref().map(std::path::PathBuf::from),
            max_timeout_secs: config.max_timeout_secs,
            grace: Duration::from_secs(config.grace_secs),
            oversize_bytes: config.oversize_bytes,
        }
    }

    /// Run one invocation end to end. Returns the final text plus the
    /// lifecycle record, or an [`AgentError`] carrying the taxonomy tag.
    pub async fn invoke(&self, req: InvokeRequest) -> Result<(String, AgentInvocation)> {
        let deadline_secs = req.deadline_secs.min(self.max_timeout_secs).max(1);
        let deadline = Duration::from_secs(deadline_secs);

        let mut cmd = Command::new(&self.binary_path);
        cmd.arg("-p")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose")
            .arg("--model")
            .arg(&req.model)
            .arg("--dangerously-skip-permissions")
            .arg("--no-session-persistence")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        // Make the child its own process-group leader so a cancelled or
        // timed-out invocation can be group-killed without taking down
        // unrelated processes sharing our group.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setpgid(0, 0);
                Ok(())
            });
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| AgentError::Spawn(format!("{}: {e}", self.binary_path)))?;
        let pid = child.id();

        let input_bytes = req.envelope.len();
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(req.envelope.as_bytes()).await;
            drop(stdin);
        }

        let stderr_buf = Arc::new(Mutex::new(String::new()));
        if let Some(stderr) = child.stderr.take() {
            let buf = Arc::clone(&stderr_buf);
            tokio::spawn(collect_stderr(stderr, buf));
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Spawn("child had no stdout".to_string()))?;

        let mut invocation = AgentInvocation {
            request_id: req.request_id,
            started_at: Utc::now(),
            pid,
            input_bytes,
            streamed_events: 0,
            result_text: String::new(),
            final_status: FinalStatus::Ok,
            interim_notices_posted: Vec::new(),
        };

        let read_fut = read_ndjson_stream(
            stdout,
            self.oversize_bytes,
            req.on_interim.clone(),
            &mut invocation,
        );

        let outcome = tokio::select! {
            biased;
            _ = req.cancel.cancelled() => {
                warn!(request_id = %req.request_id, "agent invocation cancelled");
                self.terminate(&mut child, pid, true).await;
                invocation.final_status = FinalStatus::Killed;
                return Err(AgentError::Killed);
            }
            res = tokio::time::timeout(deadline, read_fut) => res,
        };

        let loop_outcome = match outcome {
            Ok(loop_outcome) => loop_outcome,
            Err(_elapsed) => {
                warn!(request_id = %req.request_id, ms = deadline.as_millis() as u64, "agent invocation timed out");
                self.terminate(&mut child, pid, false).await;
                invocation.final_status = FinalStatus::Timeout;
                return Err(AgentError::Timeout { ms: deadline.as_millis() as u64 });
            }
        };

        match loop_outcome {
            LoopOutcome::Oversize => {
                self.terminate(&mut child, pid, false).await;
                invocation.final_status = FinalStatus::Oversize;
                return Err(AgentError::Oversize { cap_bytes: self.oversize_bytes });
            }
            LoopOutcome::Result(text) => {
                invocation.result_text = text.clone();
                invocation.final_status = FinalStatus::Ok;
                // The terminal record already closed the logical stream;
                // reap the child without blocking the pipeline on it.
                let _ = tokio::time::timeout(self.grace, child.wait()).await;
                info!(request_id = %req.request_id, bytes = text.len(), "agent invocation complete");
                Ok((text, invocation))
            }
            LoopOutcome::Eof { assistant_text } => {
                let status = child.wait().await.map_err(AgentError::Io)?;
                if status.success() {
                    if assistant_text.is_empty() {
                        invocation.final_status = FinalStatus::ParseError;
                        Err(AgentError::ParseError)
                    } else {
                        invocation.result_text = assistant_text.clone();
                        invocation.final_status = FinalStatus::Ok;
                        Ok((assistant_text, invocation))
                    }
                } else {
                    let excerpt = tail(&stderr_buf.lock().unwrap(), 500);
                    invocation.final_status = FinalStatus::NonzeroExit;
                    Err(AgentError::NonzeroExit {
                        code: status.code().unwrap_or(-1),
                        stderr_excerpt: excerpt,
                    })
                }
            }
        }
    }

    /// SIGTERM the process group, wait `self.grace`, then SIGKILL if it's
    /// still alive. `immediate` skips straight to SIGKILL (used on explicit
    /// cancellation, where the caller has already given up on the result).
    async fn terminate(&self, child: &mut Child, pid: Option<u32>, immediate: bool) {
        let Some(pid) = pid else {
            let _ = child.start_kill();
            let _ = child.wait().await;
            return;
        };

        #[cfg(unix)]
        {
            if !immediate {
                unsafe {
                    libc::kill(-(pid as i32), libc::SIGTERM);
                }
                if tokio::time::timeout(self.grace, child.wait()).await.is_ok() {
                    return;
                }
            }
            unsafe {
                libc::kill(-(pid as i32), libc::SIGKILL);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
        }
        let _ = child.wait().await;
    }
}

enum LoopOutcome {
    Result(String),
    Eof { assistant_text: String },
    Oversize,
}

/// Reads `stdout` line by line, dispatching each NDJSON record on its `type`
/// discriminator per §4.1. Returns once a `result` record arrives, the
/// stream closes, or the oversize cap is hit.
async fn read_ndjson_stream(
    stdout: tokio::process::ChildStdout,
    oversize_bytes: usize,
    on_interim: crate::types::InterimNotifier,
    invocation: &mut AgentInvocation,
) -> LoopOutcome {
    let mut reader = BufReader::new(stdout).lines();
    let mut assistant_text = String::new();
    let mut notified: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut last_notice: Option<Instant> = None;
    let mut total_bytes = 0usize;

    loop {
        let line = match reader.next_line().await {
            Ok(Some(l)) => l,
            Ok(None) => return LoopOutcome::Eof { assistant_text },
            Err(e) => {
                warn!(error = %e, "error reading agent stdout");
                return LoopOutcome::Eof { assistant_text };
            }
        };

        total_bytes += line.len() + 1;
        if total_bytes > oversize_bytes {
            return LoopOutcome::Oversize;
        }
        if line.trim().is_empty() {
            continue;
        }

        invocation.streamed_events += 1;

        let value: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "skipping malformed NDJSON line");
                continue;
            }
        };

        let Some(kind) = value.get("type").and_then(Value::as_str) else {
            continue;
        };

        match kind {
            "system" | "system/init" => {
                debug!("agent stream: system/init");
            }
            "assistant" => {
                if let Some(blocks) = value.pointer("/message/content").or_else(|| value.get("content")).and_then(Value::as_array) {
                    for block in blocks {
                        match block.get("type").and_then(Value::as_str) {
                            Some("text") => {
                                if let Some(text) = block.get("text").and_then(Value::as_str) {
                                    assistant_text.push_str(text);
                                }
                            }
                            Some("tool_use") => {
                                let Some(name) = block.get("name").and_then(Value::as_str) else {
                                    continue;
                                };
                                if notified.contains(name) {
                                    continue;
                                }
                                notified.insert(name.to_string());
                                let due = last_notice
                                    .map(|t| t.elapsed() >= INTERIM_THROTTLE)
                                    .unwrap_or(true);
                                if due {
                                    last_notice = Some(Instant::now());
                                    invocation.interim_notices_posted.push(name.to_string());
                                    on_interim(interim_message(name));
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
            "result" => {
                let text = value
                    .get("result")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                return LoopOutcome::Result(text);
            }
            _ => {
                // unrecognised discriminator — skipped without error.
            }
        }
    }
}

fn interim_message(tool_name: &str) -> String {
    match tool_name {
        "web_search" | "brave_web_search" => "🔍 Searching…".to_string(),
        "fetch" | "web_fetch" => "🌐 Fetching…".to_string(),
        other => format!("⚙ Using {other}…"),
    }
}

async fn collect_stderr(stderr: tokio::process::ChildStderr, buf: Arc<Mutex<String>>) {
    const CAP: usize = 8 * 1024;
    let mut reader = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = reader.next_line().await {
        let mut b = buf.lock().unwrap();
        if b.len() < CAP {
            b.push_str(&line);
            b.push('\n');
        }
    }
}

fn tail(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s[s.len() - max..].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InvokeRequest;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    fn test_config(script: &str) -> AgentConfig {
        AgentConfig {
            binary_path: script.to_string(),
            model: "test-model".to_string(),
            timeout_secs: 5,
            max_timeout_secs: 5,
            workdir: None,
            grace_secs: 1,
            oversize_bytes: 1024 * 1024,
        }
    }

    fn write_script(dir: &tempfile::TempDir, body: &str) -> String {
        let path = dir.path().join("fake_agent.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path.to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn result_record_becomes_final_text() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, r#"cat >/dev/null; echo '{"type":"result","result":"hello there"}'"#);
        let invoker = Invoker::new(&test_config(&script));

        let (text, invocation) = invoker
            .invoke(InvokeRequest {
                request_id: Uuid::new_v4(),
                envelope: "hi".to_string(),
                model: "m".to_string(),
                deadline_secs: 5,
                cancel: CancellationToken::new(),
                on_interim: Arc::new(|_| {}),
            })
            .await
            .unwrap();

        assert_eq!(text, "hello there");
        assert_eq!(invocation.final_status, FinalStatus::Ok);
    }

    #[tokio::test]
    async fn missing_result_falls_back_to_assistant_text_concatenation() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            &dir,
            r#"cat >/dev/null
echo '{"type":"assistant","content":[{"type":"text","text":"partial one. "}]}'
echo '{"type":"assistant","content":[{"type":"text","text":"partial two."}]}'
"#,
        );
        let invoker = Invoker::new(&test_config(&script));

        let (text, invocation) = invoker
            .invoke(InvokeRequest {
                request_id: Uuid::new_v4(),
                envelope: "hi".to_string(),
                model: "m".to_string(),
                deadline_secs: 5,
                cancel: CancellationToken::new(),
                on_interim: Arc::new(|_| {}),
            })
            .await
            .unwrap();

        assert_eq!(text, "partial one. partial two.");
        assert_eq!(invocation.final_status, FinalStatus::Ok);
    }

    #[tokio::test]
    async fn tool_use_triggers_at_most_one_interim_notice_per_tool() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            &dir,
            r#"cat >/dev/null
echo '{"type":"assistant","content":[{"type":"tool_use","name":"web_search","id":"1"}]}'
echo '{"type":"assistant","content":[{"type":"tool_use","name":"web_search","id":"2"}]}'
echo '{"type":"result","result":"done"}'
"#,
        );
        let invoker = Invoker::new(&test_config(&script));
        let notices = Arc::new(Mutex::new(Vec::new()));
        let notices2 = Arc::clone(&notices);

        let (_, invocation) = invoker
            .invoke(InvokeRequest {
                request_id: Uuid::new_v4(),
                envelope: "hi".to_string(),
                model: "m".to_string(),
                deadline_secs: 5,
                cancel: CancellationToken::new(),
                on_interim: Arc::new(move |msg| notices2.lock().unwrap().push(msg)),
            })
            .await
            .unwrap();

        assert_eq!(notices.lock().unwrap().len(), 1);
        assert_eq!(invocation.interim_notices_posted, vec!["web_search".to_string()]);
    }

    #[tokio::test]
    async fn nonzero_exit_without_result_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, r#"cat >/dev/null; echo "boom" >&2; exit 3"#);
        let invoker = Invoker::new(&test_config(&script));

        let err = invoker
            .invoke(InvokeRequest {
                request_id: Uuid::new_v4(),
                envelope: "hi".to_string(),
                model: "m".to_string(),
                deadline_secs: 5,
                cancel: CancellationToken::new(),
                on_interim: Arc::new(|_| {}),
            })
            .await
            .unwrap_err();

        match err {
            AgentError::NonzeroExit { code, stderr_excerpt } => {
                assert_eq!(code, 3);
                assert!(stderr_excerpt.contains("boom"));
            }
            other => panic!("expected NonzeroExit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn deadline_expiry_yields_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, r#"cat >/dev/null; sleep 5"#);
        let mut cfg = test_config(&script);
        cfg.timeout_secs = 1;
        cfg.max_timeout_secs = 1;
        let invoker = Invoker::new(&cfg);

        let err = invoker
            .invoke(InvokeRequest {
                request_id: Uuid::new_v4(),
                envelope: "hi".to_string(),
                model: "m".to_string(),
                deadline_secs: 1,
                cancel: CancellationToken::new(),
                on_interim: Arc::new(|_| {}),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Timeout { .. }));
    }

    #[tokio::test]
    async fn cancellation_kills_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, r#"cat >/dev/null; sleep 30"#);
        let invoker = Invoker::new(&test_config(&script));
        let cancel = CancellationToken::new();
        let cancel2 = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel2.cancel();
        });

        let err = invoker
            .invoke(InvokeRequest {
                request_id: Uuid::new_v4(),
                envelope: "hi".to_string(),
                model: "m".to_string(),
                deadline_secs: 30,
                cancel,
                on_interim: Arc::new(|_| {}),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Killed));
    }
}
