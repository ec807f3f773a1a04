use anyhow::Result;
use console::style;
use serde::Serialize;
use std::fmt::Write as _;

use crate::api::{FetchResponse, HealthReport, HealthStatus, SearchResponse, StoreResponse, TranscriptLine};
use crate::cli::OutputFormat;
use crate::store::TranscriptRecord;
use crate::transcript::TranscriptSegment;
use crate::utils::{format_clock, format_duration, format_srt_timestamp, preview};

/// Anything the CLI prints
pub trait Render: Serialize {
    fn text(&self) -> String;

    /// Subtitle rendering for payloads that carry timed segments
    fn srt(&self) -> Option<String> {
        None
    }
}

/// Plain acknowledgement for commands without a richer payload
#[derive(Debug, Serialize)]
pub struct Message {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Message {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

pub fn render<T: Render>(value: &T, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Text => value.text(),
        OutputFormat::Srt => value.srt().unwrap_or_else(|| value.text()),
    })
}

/// Print to stdout; logs and progress stay on stderr
pub fn emit<T: Render>(value: &T, format: OutputFormat) -> Result<()> {
    println!("{}", render(value, format)?);
    Ok(())
}

fn error_text(error: Option<&str>) -> String {
    format!("{} {}", style("error:").red().bold(), error.unwrap_or("unknown error"))
}

fn srt<'a>(cues: impl Iterator<Item = (&'a str, f64, f64)>) -> String {
    let mut out = String::new();
    for (i, (text, start, duration)) in cues.enumerate() {
        let _ = writeln!(
            out,
            "{}\n{} --> {}\n{}\n",
            i + 1,
            format_srt_timestamp(start),
            format_srt_timestamp(start + duration),
            text
        );
    }
    out.trim_end().to_string()
}

impl Render for Message {
    fn text(&self) -> String {
        match (self.success, &self.message) {
            (true, Some(message)) => message.clone(),
            (true, None) => "ok".to_string(),
            (false, _) => error_text(self.error.as_deref()),
        }
    }
}

impl Render for FetchResponse {
    fn text(&self) -> String {
        if !self.success {
            return error_text(self.error.as_deref());
        }

        let mut out = String::new();
        if let Some(info) = &self.video_info {
            let _ = writeln!(out, "{} ({})", style(&info.title).bold(), info.channel);
            let _ = writeln!(out, "Video: {}", info.video_id);
            if let Some(duration) = info.duration {
                let _ = writeln!(out, "Duration: {}", format_duration(duration));
            }
            out.push('\n');
        }
        for line in self.transcript.iter().flatten() {
            let _ = writeln!(out, "[{}] {}", format_clock(line.start), line.text);
        }
        out.trim_end().to_string()
    }

    fn srt(&self) -> Option<String> {
        let lines = self.transcript.as_ref()?;
        Some(srt(lines.iter().map(|l: &TranscriptLine| (l.text.as_str(), l.start, l.duration))))
    }
}

impl Render for StoreResponse {
    fn text(&self) -> String {
        match (&self.outcome, self.success) {
            (Some(outcome), true) => {
                let mut out = format!(
                    "{} (record {}, {} characters)\n{} - {}",
                    outcome.message, outcome.record_id, outcome.transcript_length, outcome.video_id, outcome.title
                );
                if let Some(warning) = &outcome.warning {
                    let _ = write!(out, "\n{} {}", style("warning:").yellow().bold(), warning);
                }
                out
            }
            _ => error_text(self.error.as_deref()),
        }
    }
}

impl Render for SearchResponse {
    fn text(&self) -> String {
        if !self.success {
            return error_text(self.error.as_deref());
        }
        if self.results.is_empty() {
            return "No matches".to_string();
        }

        let mut out = String::new();
        for hit in &self.results {
            let snippet = hit.snippet.replace("<mark>", "[").replace("</mark>", "]");
            let _ = writeln!(
                out,
                "#{} {} - {} ({})\n    {}",
                hit.entry.id,
                style(&hit.entry.title).bold(),
                hit.entry.channel,
                hit.entry.video_id,
                snippet
            );
        }
        out.trim_end().to_string()
    }
}

impl Render for HealthReport {
    fn text(&self) -> String {
        let status = match self.status {
            HealthStatus::Healthy => style(self.status.to_string()).green(),
            HealthStatus::Degraded => style(self.status.to_string()).yellow(),
            HealthStatus::Unhealthy => style(self.status.to_string()).red(),
        };

        let mut out = format!("Status: {}\n", status.bold());
        for entry in &self.strategies {
            let mark = if entry.healthy { style("ok").green() } else { style("failed").red() };
            let _ = writeln!(out, "  {:<28} {:<6} {}", entry.strategy.display_name(), mark, entry.message);
        }
        out.trim_end().to_string()
    }
}

impl Render for TranscriptRecord {
    fn text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} ({})", style(&self.title).bold(), self.channel);
        let _ = writeln!(out, "Record: {}  Video: {}", self.id, self.video_id);
        if let Some(duration) = self.duration {
            let _ = writeln!(out, "Duration: {}", format_duration(duration));
        }
        if let Some(strategy) = self.source_strategy {
            let language = self.language_code.as_deref().unwrap_or("unknown language");
            let kind = if self.is_auto_generated { "auto-generated" } else { "manual" };
            let _ = writeln!(out, "Source: {} ({}, {})", strategy.display_name(), language, kind);
        }
        let _ = writeln!(out, "Stored: {}  Updated: {}", self.created_at, self.updated_at);
        out.push('\n');

        if self.segments.is_empty() {
            out.push_str(&self.transcript);
        } else {
            for segment in &self.segments {
                let _ = writeln!(out, "[{}] {}", format_clock(segment.start_seconds), segment.text);
            }
        }
        out.trim_end().to_string()
    }

    fn srt(&self) -> Option<String> {
        if self.segments.is_empty() {
            return None;
        }
        Some(srt(self
            .segments
            .iter()
            .map(|s: &TranscriptSegment| (s.text.as_str(), s.start_seconds, s.duration_seconds))))
    }
}

impl Render for Vec<TranscriptRecord> {
    fn text(&self) -> String {
        if self.is_empty() {
            return "No stored transcripts".to_string();
        }

        let mut out = String::new();
        for record in self {
            let duration = record.duration.map(format_clock).unwrap_or_else(|| "--:--".to_string());
            let _ = writeln!(
                out,
                "{:>5}  {}  {:>8}  {} - {}",
                record.id,
                record.video_id,
                duration,
                preview(&record.title, 60),
                record.channel
            );
        }
        out.trim_end().to_string()
    }
}
