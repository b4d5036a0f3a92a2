//! Speech-to-text tool backed by a Whisper-compatible HTTP API.

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use serde_json::{json, Value};

use super::download::fetch_into;
use super::{is_url, required_str, truncate_for_log, Tool, ToolContext, ToolOutput};

const AUDIO_EXTENSIONS: &[&str] = &[".mp3", ".mp4", ".mpeg", ".mpga", ".m4a", ".wav", ".webm"];

const FALLBACK_AUDIO_NAME: &str = "audio.m4a";

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcribe an audio file from a URL or a local path.
pub struct TranscribeAudio;

#[async_trait]
impl Tool for TranscribeAudio {
    fn name(&self) -> &str {
        "transcribe_audio"
    }

    fn description(&self) -> &str {
        "Transcribe spoken audio to text. Accepts a URL (the file is downloaded to data/audio/ first) or a local path such as data/downloads/clip.mp3. Supported formats: mp3, mp4, mpeg, mpga, m4a, wav, webm."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "audio_source": {
                    "type": "string",
                    "description": "URL or local file path of the audio"
                },
                "language": {
                    "type": "string",
                    "description": "Optional ISO-639-1 language code (e.g. 'en') to improve accuracy"
                }
            },
            "required": ["audio_source"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutput {
        match transcribe(&args, ctx).await {
            Ok(text) => ToolOutput::Text(text),
            Err(e) => {
                let msg = format!("Error transcribing audio: {:#}", e);
                tracing::error!("{}", msg);
                ToolOutput::Text(msg)
            }
        }
    }
}

async fn transcribe(args: &Value, ctx: &ToolContext) -> anyhow::Result<String> {
    let source = required_str(args, "audio_source")?;
    let language = args["language"].as_str().filter(|l| !l.trim().is_empty());

    let api_key = ctx
        .settings
        .transcription_api_key
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("GROQ_API_KEY is not set; audio transcription is unavailable"))?;

    tracing::info!("Transcribing audio from: {}", source);

    let path = locate_audio(source, ctx).await?;
    let bytes = tokio::fs::read(&path).await?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| FALLBACK_AUDIO_NAME.to_string());
    tracing::info!("Sending {} ({} bytes) to {}", filename, bytes.len(), ctx.settings.transcription_url);

    let mut form = multipart::Form::new()
        .part("file", multipart::Part::bytes(bytes).file_name(filename))
        .text("model", ctx.settings.transcription_model.clone())
        .text("temperature", "0")
        .text("response_format", "verbose_json");
    if let Some(language) = language {
        form = form.text("language", language.to_string());
    }

    let response = ctx
        .http
        .post(&ctx.settings.transcription_url)
        .bearer_auth(api_key)
        .multipart(form)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            anyhow::bail!("transcription service rejected the API key ({})", status);
        }
        anyhow::bail!("transcription service returned {}: {}", status, body.trim());
    }

    let parsed: TranscriptionResponse = response.json().await?;
    let text = parsed.text.trim().to_string();
    tracing::info!("Transcription complete ({} characters)", text.len());
    tracing::info!("Transcript: {}", truncate_for_log(&text, 200));
    Ok(text)
}

async fn locate_audio(source: &str, ctx: &ToolContext) -> anyhow::Result<PathBuf> {
    if is_url(source) {
        tracing::info!("Downloading audio from URL...");
        return fetch_into(
            &ctx.http,
            source,
            &ctx.dirs.audio,
            AUDIO_EXTENSIONS,
            FALLBACK_AUDIO_NAME,
        )
        .await;
    }

    let path = ctx.dirs.resolve(source);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        anyhow::bail!("Audio file not found at {}", path.display());
    }
    Ok(path)
}
