// src/core/scanner/tool_invoker.rs

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::models::{OutcomeKind, ToolOutcome};

/// Copies everything `reader` produces into `tx`, chunk by chunk, until EOF.
fn forward<R>(mut reader: R, tx: mpsc::UnboundedSender<Vec<u8>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; 8192];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

/// Runs `tool` with `target` as its only argument and captures its output.
///
/// Standard output and standard error are merged in arrival order. The exit
/// code is logged but does not affect the outcome: whatever the tool printed is
/// the result. A tool still running after `timeout` is killed and its partial
/// output dropped.
pub async fn invoke(tool: &str, target: &str, timeout: Duration) -> ToolOutcome {
    let started = Instant::now();
    let outcome = |output: String, kind: OutcomeKind| ToolOutcome {
        tool: tool.to_string(),
        output,
        kind,
        elapsed: started.elapsed(),
    };

    debug!(tool, target, timeout_secs = timeout.as_secs(), "Spawning tool.");
    let mut child = match Command::new(tool)
        .arg(target)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(tool, "Tool not found on PATH.");
            return outcome(String::new(), OutcomeKind::NotFound);
        }
        Err(e) => {
            warn!(tool, error = %e, "Tool could not be started.");
            return outcome(String::new(), OutcomeKind::Failed(e.to_string()));
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        forward(stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        forward(stderr, tx.clone());
    }
    drop(tx);

    let run = async {
        let mut merged = Vec::new();
        while let Some(chunk) = rx.recv().await {
            merged.extend_from_slice(&chunk);
        }
        let status = child.wait().await?;
        Ok::<_, std::io::Error>((merged, status))
    };
    let finished = tokio::time::timeout(timeout, run).await;

    match finished {
        Ok(Ok((merged, status))) => {
            info!(
                tool,
                exit_code = ?status.code(),
                bytes = merged.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Tool finished."
            );
            outcome(String::from_utf8_lossy(&merged).into_owned(), OutcomeKind::Success)
        }
        Ok(Err(e)) => {
            warn!(tool, error = %e, "Waiting on tool failed.");
            outcome(String::new(), OutcomeKind::Failed(e.to_string()))
        }
        Err(_) => {
            warn!(tool, timeout_secs = timeout.as_secs(), "Tool timed out, killing it.");
            if let Err(e) = child.kill().await {
                debug!(tool, error = %e, "Kill after timeout failed.");
            }
            outcome(String::new(), OutcomeKind::TimedOut)
        }
    }
}
