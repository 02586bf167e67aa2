//! Transcript replay: plays caller lines through one call and prints both sides.
//!
//! A transcript is plain text, one caller utterance per line. Blank lines and
//! lines starting with `#` are skipped. A line may start with a bracketed
//! confidence, `[0.2] mm grr`, to simulate poor recognition.

use std::path::Path;
use std::time::Duration;

use tenantline_core::error::TenantlineError;
use tenantline_dialogue::{CallManager, CallSummary, DialogueError, TicketStatus};

/// Confidence for lines without an explicit one.
const DEFAULT_CONFIDENCE: f32 = 1.0;

const TICKET_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptLine {
    pub text: String,
    pub confidence: f32,
}

/// Parse transcript text into caller lines.
pub fn parse_transcript(content: &str) -> Vec<ScriptLine> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> ScriptLine {
    if let Some(rest) = line.strip_prefix('[') {
        if let Some((value, text)) = rest.split_once(']') {
            if let Ok(confidence) = value.trim().parse::<f32>() {
                return ScriptLine {
                    text: text.trim().to_string(),
                    confidence: confidence.clamp(0.0, 1.0),
                };
            }
        }
    }
    ScriptLine {
        text: line.to_string(),
        confidence: DEFAULT_CONFIDENCE,
    }
}

pub fn load_transcript(path: &Path) -> Result<Vec<ScriptLine>, TenantlineError> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_transcript(&content))
}

/// Play `lines` through a new call, printing the exchange, then hang up.
///
/// Waits up to `settle` for a requested ticket before hanging up so the
/// summary carries the ticket number.
pub async fn run(
    manager: &CallManager,
    lines: &[ScriptLine],
    caller_id: Option<String>,
    settle: Duration,
) -> Result<CallSummary, DialogueError> {
    let (call_id, greeting) = manager.start_call(caller_id)?;
    println!("agent:  {}", greeting.reply);

    for line in lines {
        println!("caller: {}", line.text);
        match manager
            .handle_utterance(call_id, &line.text, line.confidence)
            .await
        {
            Ok(outcome) => println!("agent:  {}   [{}]", outcome.reply, outcome.state),
            Err(DialogueError::UtteranceTooLong(max)) => {
                tracing::warn!(max, "Transcript line too long, skipped");
            }
            Err(e) => return Err(e),
        }
    }

    let deadline = tokio::time::Instant::now() + settle;
    while manager.get_call(call_id).await?.ticket == TicketStatus::Pending
        && tokio::time::Instant::now() < deadline
    {
        tokio::time::sleep(TICKET_POLL_INTERVAL).await;
    }

    manager.end_call(call_id).await
}
