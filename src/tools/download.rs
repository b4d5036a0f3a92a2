//! File download tool and the shared "fetch to a fixed directory" helper.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;

use super::{required_str, Tool, ToolContext, ToolOutput};

/// Download a file into the downloads directory.
pub struct DownloadFile;

#[async_trait]
impl Tool for DownloadFile {
    fn name(&self) -> &str {
        "download_file"
    }

    fn description(&self) -> &str {
        "Download a file from a URL and save it under the given filename in data/downloads/. Returns the path relative to the project root (e.g. data/downloads/demo.csv). Use this for direct file links (csv, pdf, zip, images, audio), then read the local file in run_code."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Direct URL to the file"
                },
                "filename": {
                    "type": "string",
                    "description": "Filename to save the content as"
                }
            },
            "required": ["url", "filename"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutput {
        match download(&args, ctx).await {
            Ok(path) => ToolOutput::Text(path),
            Err(e) => {
                let msg = format!("Error downloading file: {:#}", e);
                tracing::error!("{}", msg);
                ToolOutput::Text(msg)
            }
        }
    }
}

async fn download(args: &Value, ctx: &ToolContext) -> anyhow::Result<String> {
    let url = required_str(args, "url")?;
    let filename = required_str(args, "filename")?;

    tracing::info!("Downloading file from URL: {}", url);
    tracing::info!("Target filename: {}", filename);

    // Only the final component is honoured so writes stay inside downloads/.
    let name = Path::new(filename)
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Invalid filename: {}", filename))?;
    let filepath = ctx.dirs.downloads.join(name);

    let total = stream_to_file(&ctx.http, url, &filepath).await?;

    tracing::info!("Download complete: {} ({} bytes)", filename, total);
    tracing::info!("Saved to: {}", filepath.display());

    Ok(ctx.dirs.relative(&filepath).to_string_lossy().to_string())
}

/// Stream the body of `url` to `path` chunk by chunk, replacing any
/// existing file. Returns the number of bytes written.
pub(crate) async fn stream_to_file(
    http: &reqwest::Client,
    url: &str,
    path: &Path,
) -> anyhow::Result<u64> {
    let response = http.get(url).send().await?.error_for_status()?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut total = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        total += chunk.len() as u64;
    }
    file.flush().await?;

    Ok(total)
}

/// Download `url` into `dir`, naming the file after the URL tail.
///
/// Used by tools that accept "local path or URL" sources.
pub(crate) async fn fetch_into(
    http: &reqwest::Client,
    url: &str,
    dir: &Path,
    extensions: &[&str],
    fallback: &str,
) -> anyhow::Result<PathBuf> {
    let filename = filename_from_url(url, extensions, fallback);
    let path = dir.join(&filename);
    let total = stream_to_file(http, url, &path).await?;
    tracing::info!("Downloaded: {} ({} bytes)", filename, total);
    tracing::info!("Saved to: {}", path.display());
    Ok(path)
}

/// Last path segment of `url` without query string or fragment, or
/// `fallback` when that segment has none of the recognized `extensions`.
pub fn filename_from_url(url: &str, extensions: &[&str], fallback: &str) -> String {
    let tail = match url::Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .unwrap_or_default(),
        Err(_) => url
            .rsplit('/')
            .next()
            .unwrap_or("")
            .split(['?', '#'])
            .next()
            .unwrap_or("")
            .to_string(),
    };

    let lower = tail.to_ascii_lowercase();
    if !tail.is_empty() && extensions.iter().any(|ext| lower.ends_with(ext)) {
        tail
    } else {
        fallback.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DataDirs, ToolSettings};
    use axum::{extract::Path as AxumPath, routing::get, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const AUDIO: &[&str] = &[".mp3", ".m4a", ".wav"];

    #[test]
    fn filename_strips_query_and_keeps_known_extension() {
        assert_eq!(
            filename_from_url("https://quiz.test/files/clip.mp3?token=abc", AUDIO, "audio.m4a"),
            "clip.mp3"
        );
        assert_eq!(
            filename_from_url("https://quiz.test/files/clip.WAV#t=3", AUDIO, "audio.m4a"),
            "clip.WAV"
        );
    }

    #[test]
    fn filename_falls_back_without_extension() {
        assert_eq!(
            filename_from_url("https://quiz.test/stream?id=1", AUDIO, "audio.m4a"),
            "audio.m4a"
        );
        assert_eq!(filename_from_url("https://quiz.test/", AUDIO, "audio.m4a"), "audio.m4a");
        assert_eq!(filename_from_url("not a url/x.mp3?q", AUDIO, "audio.m4a"), "x.mp3");
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn downloading_twice_overwrites_same_path() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/files/:name",
            get(move |AxumPath(name): AxumPath<String>| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move { format!("{name} v{n}") }
            }),
        );
        let base = serve(app).await;

        let tmp = tempfile::TempDir::new().unwrap();
        let dirs = DataDirs::under(tmp.path());
        dirs.ensure().unwrap();
        let ctx = ToolContext::new(dirs.clone(), ToolSettings::default());

        let args = json!({"url": format!("{base}/files/demo.csv"), "filename": "demo.csv"});
        let first = DownloadFile.execute(args.clone(), &ctx).await;
        let second = DownloadFile.execute(args, &ctx).await;

        assert_eq!(first, ToolOutput::text("data/downloads/demo.csv"));
        assert_eq!(first, second);
        let content = std::fs::read_to_string(dirs.downloads.join("demo.csv")).unwrap();
        assert_eq!(content, "demo.csv v1");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn http_error_is_reported_not_raised() {
        let app = Router::new();
        let base = serve(app).await;

        let tmp = tempfile::TempDir::new().unwrap();
        let dirs = DataDirs::under(tmp.path());
        dirs.ensure().unwrap();
        let ctx = ToolContext::new(dirs, ToolSettings::default());

        let out = DownloadFile
            .execute(json!({"url": format!("{base}/missing.csv"), "filename": "m.csv"}), &ctx)
            .await
            .into_content();
        assert!(out.starts_with("Error downloading file:"), "{out}");
        assert!(out.contains("404"), "{out}");
    }

    #[tokio::test]
    async fn filename_cannot_escape_downloads() {
        let app = Router::new().route("/f", get(|| async { "x" }));
        let base = serve(app).await;

        let tmp = tempfile::TempDir::new().unwrap();
        let dirs = DataDirs::under(tmp.path());
        dirs.ensure().unwrap();
        let ctx = ToolContext::new(dirs.clone(), ToolSettings::default());

        let out = DownloadFile
            .execute(json!({"url": format!("{base}/f"), "filename": "../../evil.txt"}), &ctx)
            .await;
        assert_eq!(out, ToolOutput::text("data/downloads/evil.txt"));
        assert!(dirs.downloads.join("evil.txt").exists());
    }

    #[tokio::test]
    async fn missing_arguments_are_reported() {
        let ctx = ToolContext::new(DataDirs::under("/nonexistent"), ToolSettings::default());
        let out = DownloadFile.execute(json!({"url": "http://x"}), &ctx).await.into_content();
        assert!(out.contains("Missing 'filename' argument"), "{out}");
    }
}
