use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use supportdesk_core::error::Result;

use crate::context::{Directive, ToolInvocation};
use crate::orchestrator::RunResult;

/// JSONL trace writer.
///
/// Writes one JSON object per turn followed by a summary line to
/// `{trace_dir}/{run_id}.jsonl`. Each line is flushed as written so a
/// crashed process still leaves the turns it finished.
#[derive(Debug, Clone)]
pub struct TraceWriter {
    dir: PathBuf,
}

#[derive(Serialize)]
struct TurnEntry<'a> {
    record: &'static str,
    run_id: &'a str,
    step: usize,
    agent: &'a str,
    text: &'a str,
    directive: &'a Directive,
    tool_invocations: &'a [ToolInvocation],
    at: String,
}

#[derive(Serialize)]
struct SummaryEntry<'a> {
    record: &'static str,
    run_id: &'a str,
    question: &'a str,
    steps: usize,
    elapsed_ms: u64,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    written_at: String,
}

impl TraceWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the trace of a finished run and return the file path.
    pub async fn write(&self, result: &RunResult) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{}.jsonl", result.run_id));
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let mut writer = tokio::io::BufWriter::new(file);
        let run_id = result.run_id.0.as_str();

        for turn in &result.turns {
            let entry = TurnEntry {
                record: "turn",
                run_id,
                step: turn.step,
                agent: &turn.agent,
                text: &turn.text,
                directive: &turn.directive,
                tool_invocations: &turn.tool_invocations,
                at: turn.at.to_rfc3339(),
            };
            write_line(&mut writer, &entry).await?;
        }

        let (status, output, error_kind, error) = match &result.outcome {
            Ok(text) => ("success", Some(text.as_str()), None, None),
            Err(e) => ("error", None, Some(e.kind()), Some(e.to_string())),
        };
        let summary = SummaryEntry {
            record: "summary",
            run_id,
            question: &result.question,
            steps: result.steps,
            elapsed_ms: result.elapsed_ms,
            status,
            output,
            error_kind,
            error,
            written_at: Utc::now().to_rfc3339(),
        };
        write_line(&mut writer, &summary).await?;

        debug!(path = %path.display(), turns = result.turns.len(), "Trace written");
        Ok(path)
    }
}

async fn write_line<W, T>(writer: &mut W, entry: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
