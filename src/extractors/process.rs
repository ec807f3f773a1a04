use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use super::{RawTranscript, StrategyError, PROBE_VIDEO_ID};
use crate::config::ProcessConfig;
use crate::transcript::normalize::raw_segments_from_json;
use crate::transcript::VideoId;

/// Delegates to an external transcript fetcher that prints one JSON envelope
/// on stdout:
///
/// ```json
/// {"success": true, "transcript": [{"text": "...", "start": 0.0, "duration": 1.5}],
///  "metadata": {"language": "English", "language_code": "en", "is_generated": false}}
/// ```
///
/// or `{"success": false, "error": "..."}`.
pub struct ProcessStrategy {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    languages: Vec<String>,
    working_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    transcript: Option<Value>,
    #[serde(default)]
    metadata: Option<EnvelopeMetadata>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EnvelopeMetadata {
    #[serde(default, alias = "languageCode")]
    language_code: Option<String>,
    #[serde(default, alias = "isGenerated")]
    is_generated: Option<bool>,
}

impl ProcessStrategy {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            languages: Vec::new(),
            working_dir: None,
        }
    }

    pub fn from_config(config: &ProcessConfig) -> Self {
        let mut strategy = Self::new(config.program.clone(), config.args.clone(), config.timeout());
        strategy.languages = config.languages.clone();
        strategy.working_dir = config.working_dir.clone();
        strategy
    }

    pub fn with_languages(mut self, languages: Vec<String>) -> Self {
        self.languages = languages;
        self
    }

    pub async fn fetch(&self, video_id: &VideoId) -> Result<RawTranscript, StrategyError> {
        tracing::debug!("Running {} for {}", self.program, video_id);

        let stdout = self.run(video_id).await?;
        parse_envelope(&stdout)
    }

    /// A full fetch of a known-good video
    pub async fn probe(&self) -> Result<String, StrategyError> {
        let video_id = VideoId::parse(PROBE_VIDEO_ID).map_err(|e| StrategyError::Unavailable(e.to_string()))?;
        let transcript = self.fetch(&video_id).await?;
        Ok(format!("fetched {} segments", transcript.segments.len()))
    }

    /// Spawn the fetcher and collect stdout, killing it if the deadline passes
    async fn run(&self, video_id: &VideoId) -> Result<Vec<u8>, StrategyError> {
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(video_id.as_str());
        if !self.languages.is_empty() {
            command.arg("--languages").args(&self.languages);
        }
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        let completion = async {
            let mut out = Vec::new();
            let mut err = Vec::new();
            let read_out = async {
                match stdout.as_mut() {
                    Some(pipe) => pipe.read_to_end(&mut out).await.map(|_| ()),
                    None => Ok(()),
                }
            };
            let read_err = async {
                match stderr.as_mut() {
                    Some(pipe) => pipe.read_to_end(&mut err).await.map(|_| ()),
                    None => Ok(()),
                }
            };
            tokio::try_join!(read_out, read_err)?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, out, err))
        };

        let outcome = tokio::time::timeout(self.timeout, completion).await;
        let (status, out, err) = match outcome {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!("{} exceeded {:?} for {}; killing it", self.program, self.timeout, video_id);
                if let Err(e) = child.kill().await {
                    tracing::debug!("Failed to kill timed out process: {}", e);
                }
                return Err(StrategyError::Timeout(self.timeout));
            }
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&err).trim().to_string();
            let stderr = if stderr.is_empty() {
                // Some fetchers report failures as an envelope even when exiting non-zero
                serde_json::from_slice::<Envelope>(&out)
                    .ok()
                    .and_then(|e| e.error)
                    .unwrap_or_default()
            } else {
                stderr
            };
            return Err(StrategyError::ProcessExit {
                status: status.to_string(),
                stderr,
            });
        }

        Ok(out)
    }
}

fn parse_envelope(stdout: &[u8]) -> Result<RawTranscript, StrategyError> {
    let text = String::from_utf8_lossy(stdout);
    let envelope: Envelope = serde_json::from_str(text.trim()).map_err(|e| {
        let preview: String = text.trim().chars().take(80).collect();
        StrategyError::Parse(format!("invalid JSON envelope ({}): {:?}", e, preview))
    })?;

    if !envelope.success {
        let message = envelope.error.unwrap_or_else(|| "fetcher reported failure".to_string());
        return Err(match envelope.error_type.as_deref() {
            Some(kind) => StrategyError::Unavailable(format!("{} ({})", message, kind)),
            None => StrategyError::Unavailable(message),
        });
    }

    let transcript = envelope
        .transcript
        .ok_or_else(|| StrategyError::Parse("envelope has no transcript".to_string()))?;
    let segments = raw_segments_from_json(&transcript)?;
    let metadata = envelope.metadata.unwrap_or_default();

    Ok(RawTranscript::new(segments).with_language(metadata.language_code, metadata.is_generated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::transcript::{normalize, RawSegment};
    use std::time::Instant;

    fn shell(script: &str, timeout: Duration) -> ProcessStrategy {
        ProcessStrategy::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "fetcher".to_string()],
            timeout,
        )
    }

    fn video() -> VideoId {
        VideoId::parse("dQw4w9WgXcQ").unwrap()
    }

    #[tokio::test]
    async fn test_successful_envelope_is_normalized() {
        let strategy = shell(
            r#"printf '%s\n' '{"success":true,"transcript":[{"text":"Hello\nworld","start":0.0,"duration":2.0}],"metadata":{"language":"English","language_code":"en","is_generated":true}}'"#,
            Duration::from_secs(5),
        );

        let raw = strategy.fetch(&video()).await.unwrap();
        assert_eq!(raw.language_code.as_deref(), Some("en"));
        assert_eq!(raw.is_auto_generated, Some(true));

        let segments = normalize(raw.segments);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "Hello world");
        assert_eq!(segments[0].start_seconds, 0.0);
        assert_eq!(segments[0].duration_seconds, 2.0);
    }

    #[tokio::test]
    async fn test_passes_video_id_and_languages() {
        let strategy = shell(
            r#"printf '{"success":true,"transcript":[{"text":"%s %s %s","start":1}]}' "$1" "$2" "$3""#,
            Duration::from_secs(5),
        )
        .with_languages(vec!["en".to_string()]);

        let raw = strategy.fetch(&video()).await.unwrap();
        assert_eq!(raw.segments, vec![RawSegment::new("dQw4w9WgXcQ --languages en", 1.0, None)]);
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let strategy = shell("sleep 30", Duration::from_millis(200));

        let started = Instant::now();
        let err = strategy.fetch(&video()).await.unwrap_err();

        assert!(matches!(err, StrategyError::Timeout(_)), "got {:?}", err);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_non_zero_exit() {
        let strategy = shell("echo boom >&2; exit 3", Duration::from_secs(5));

        match strategy.fetch(&video()).await.unwrap_err() {
            StrategyError::ProcessExit { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_zero_exit_with_envelope() {
        let strategy = shell(
            r#"echo '{"success":false,"error":"youtube-transcript-api not installed"}'; exit 1"#,
            Duration::from_secs(5),
        );

        match strategy.fetch(&video()).await.unwrap_err() {
            StrategyError::ProcessExit { stderr, .. } => assert!(stderr.contains("not installed")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_stdout() {
        let strategy = shell("echo 'Traceback (most recent call last):'", Duration::from_secs(5));
        let err = strategy.fetch(&video()).await.unwrap_err();
        assert!(err.is_parse(), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_reported_failure() {
        let strategy = shell(
            r#"echo '{"success":false,"error":"Transcripts are disabled for this video","error_type":"transcripts_disabled"}'"#,
            Duration::from_secs(5),
        );

        match strategy.fetch(&video()).await.unwrap_err() {
            StrategyError::Unavailable(message) => {
                assert!(message.contains("disabled"));
                assert!(message.contains("transcripts_disabled"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_transcript_is_success() {
        let strategy = shell(r#"echo '{"success":true,"transcript":[]}'"#, Duration::from_secs(5));
        assert!(strategy.fetch(&video()).await.unwrap().segments.is_empty());
    }

    #[tokio::test]
    async fn test_missing_program() {
        let strategy = ProcessStrategy::new("/nonexistent/fetcher", vec![], Duration::from_secs(1));
        assert!(matches!(strategy.fetch(&video()).await, Err(StrategyError::Io(_))));
    }
}
