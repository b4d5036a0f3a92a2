//! Image analysis tool: OCR through tesseract, metadata and a short
//! description through the `image` crate.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::{ColorType, DynamicImage, GenericImageView, ImageFormat};
use serde_json::{json, Value};
use tokio::process::Command;

use super::download::fetch_into;
use super::{is_url, required_str, truncate_for_log, Tool, ToolContext, ToolOutput};

const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".bmp", ".tiff", ".webp"];

const FALLBACK_IMAGE_NAME: &str = "image.png";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Ocr,
    Metadata,
    Describe,
}

impl Operation {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ocr" => Some(Self::Ocr),
            "metadata" => Some(Self::Metadata),
            "describe" => Some(Self::Describe),
            _ => None,
        }
    }
}

/// Facts read from a decoded image.
#[derive(Debug, Clone, PartialEq)]
struct ImageFacts {
    format: String,
    mode: &'static str,
    width: u32,
    height: u32,
    file_size: u64,
    has_exif: bool,
    average_rgb: [u8; 3],
}

/// OCR, metadata or description of an image.
pub struct AnalyzeImage;

#[async_trait]
impl Tool for AnalyzeImage {
    fn name(&self) -> &str {
        "analyze_image"
    }

    fn description(&self) -> &str {
        "Analyze an image from a URL or a local path. Operations: 'ocr' extracts text (tesseract), 'metadata' reports format, mode, size and file size, 'describe' gives a short summary with aspect ratio and average color."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "image_source": {
                    "type": "string",
                    "description": "URL or local file path of the image"
                },
                "operation": {
                    "type": "string",
                    "enum": ["ocr", "metadata", "describe"],
                    "description": "What to do with the image (default: ocr)"
                },
                "language": {
                    "type": "string",
                    "description": "Tesseract language code for OCR (default: eng)"
                }
            },
            "required": ["image_source"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutput {
        let op_name = args["operation"].as_str().unwrap_or("ocr");
        let Some(operation) = Operation::parse(op_name) else {
            return ToolOutput::text(format!(
                "Error: Unknown operation: {}. Use 'ocr', 'metadata', or 'describe'",
                op_name
            ));
        };

        match analyze(&args, operation, ctx).await {
            Ok(text) => ToolOutput::Text(text),
            Err(e) => {
                let msg = format!("Error analyzing image: {:#}", e);
                tracing::error!("{}", msg);
                ToolOutput::Text(msg)
            }
        }
    }
}

async fn analyze(args: &Value, operation: Operation, ctx: &ToolContext) -> anyhow::Result<String> {
    let source = required_str(args, "image_source")?;
    tracing::info!("Analyzing image ({:?}) from: {}", operation, source);

    let path = locate_image(source, ctx).await?;

    match operation {
        Operation::Ocr => {
            let language = args["language"]
                .as_str()
                .filter(|l| !l.trim().is_empty())
                .unwrap_or("eng");
            ocr(&ctx.settings.tesseract_bin, &path, language).await
        }
        Operation::Metadata => Ok(format_metadata(&inspect(path).await?)),
        Operation::Describe => Ok(format_description(&inspect(path).await?)),
    }
}

async fn locate_image(source: &str, ctx: &ToolContext) -> anyhow::Result<PathBuf> {
    if is_url(source) {
        tracing::info!("Downloading image from URL...");
        return fetch_into(
            &ctx.http,
            source,
            &ctx.dirs.downloads,
            IMAGE_EXTENSIONS,
            FALLBACK_IMAGE_NAME,
        )
        .await;
    }

    let path = ctx.dirs.resolve(source);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        anyhow::bail!("Image file not found at {}", path.display());
    }
    Ok(path)
}

async fn ocr(tesseract: &str, path: &Path, language: &str) -> anyhow::Result<String> {
    tracing::info!("Running OCR with language '{}'", language);
    let output = Command::new(tesseract)
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(language)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "OCR requires the tesseract binary ('{}') on PATH: {}",
                tesseract,
                e
            )
        })?;

    if !output.status.success() {
        anyhow::bail!(
            "tesseract exited with {}: {}",
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    tracing::info!("OCR complete ({} characters)", text.len());
    tracing::info!("OCR text: {}", truncate_for_log(&text, 200));
    Ok(text)
}

/// Decode off the async runtime; images can be large.
async fn inspect(path: PathBuf) -> anyhow::Result<ImageFacts> {
    tokio::task::spawn_blocking(move || inspect_file(&path)).await?
}

fn inspect_file(path: &Path) -> anyhow::Result<ImageFacts> {
    let bytes = std::fs::read(path)?;
    let format = image::guess_format(&bytes)?;
    let img = image::load_from_memory(&bytes)?;
    let (width, height) = img.dimensions();

    Ok(ImageFacts {
        format: format_name(format),
        mode: color_mode(img.color()),
        width,
        height,
        file_size: bytes.len() as u64,
        has_exif: has_exif(format, &bytes),
        average_rgb: average_rgb(&img),
    })
}

/// Whether the container carries an EXIF block: a JPEG APP1 `Exif`
/// segment, a PNG `eXIf` chunk or a WebP `EXIF` chunk.
fn has_exif(format: ImageFormat, bytes: &[u8]) -> bool {
    let marker: &[u8] = match format {
        ImageFormat::Jpeg => b"Exif\0\0",
        ImageFormat::Png => b"eXIf",
        ImageFormat::WebP => b"EXIF",
        _ => return false,
    };
    bytes.windows(marker.len()).any(|w| w == marker)
}

fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Png => "PNG".to_string(),
        ImageFormat::Jpeg => "JPEG".to_string(),
        ImageFormat::Gif => "GIF".to_string(),
        ImageFormat::WebP => "WEBP".to_string(),
        ImageFormat::Bmp => "BMP".to_string(),
        ImageFormat::Tiff => "TIFF".to_string(),
        other => format!("{:?}", other).to_uppercase(),
    }
}

/// Pillow-style mode names.
fn color_mode(color: ColorType) -> &'static str {
    match color {
        ColorType::L8 => "L",
        ColorType::La8 => "LA",
        ColorType::Rgb8 => "RGB",
        ColorType::Rgba8 => "RGBA",
        ColorType::L16 => "I;16",
        ColorType::La16 => "LA",
        ColorType::Rgb16 | ColorType::Rgb32F => "RGB",
        ColorType::Rgba16 | ColorType::Rgba32F => "RGBA",
        _ => "unknown",
    }
}

fn average_rgb(img: &DynamicImage) -> [u8; 3] {
    let rgb = img.to_rgb8();
    let count = u64::from(rgb.width()) * u64::from(rgb.height());
    if count == 0 {
        return [0, 0, 0];
    }
    let mut sums = [0u64; 3];
    for pixel in rgb.pixels() {
        for (sum, channel) in sums.iter_mut().zip(pixel.0) {
            *sum += u64::from(channel);
        }
    }
    sums.map(|s| (s / count) as u8)
}

fn format_metadata(facts: &ImageFacts) -> String {
    let mut lines = vec![
        format!("format: {}", facts.format),
        format!("mode: {}", facts.mode),
        format!("size: {}x{}", facts.width, facts.height),
        format!("width: {}", facts.width),
        format!("height: {}", facts.height),
        format!("file_size: {}", facts.file_size),
    ];
    if facts.has_exif {
        lines.push("has_exif: True".to_string());
    }
    lines.join("\n")
}

fn format_description(facts: &ImageFacts) -> String {
    let aspect = if facts.height == 0 {
        0.0
    } else {
        f64::from(facts.width) / f64::from(facts.height)
    };
    let [r, g, b] = facts.average_rgb;
    format!(
        "Image Description:\n\
         - Format: {}\n\
         - Size: {}x{} pixels\n\
         - Mode: {}\n\
         - File Size: {} bytes\n\
         - Aspect Ratio: {:.2}\n\
         - Average Color: rgb({}, {}, {})",
        facts.format, facts.width, facts.height, facts.mode, facts.file_size, aspect, r, g, b
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DataDirs, ToolSettings};
    use image::{ImageBuffer, Rgb};

    fn ctx_with_png() -> (tempfile::TempDir, ToolContext) {
        let tmp = tempfile::TempDir::new().unwrap();
        let dirs = DataDirs::under(tmp.path());
        dirs.ensure().unwrap();
        let img = ImageBuffer::from_pixel(4, 2, Rgb([10u8, 20, 30]));
        img.save(dirs.downloads.join("chart.png")).unwrap();
        let settings = ToolSettings {
            tesseract_bin: "quiz-agent-no-such-tesseract".to_string(),
            ..ToolSettings::default()
        };
        (tmp, ToolContext::new(dirs, settings))
    }

    #[tokio::test]
    async fn unknown_operation_is_rejected() {
        let (_tmp, ctx) = ctx_with_png();
        let out = AnalyzeImage
            .execute(
                json!({"image_source": "data/downloads/chart.png", "operation": "resize"}),
                &ctx,
            )
            .await
            .into_content();
        assert_eq!(
            out,
            "Error: Unknown operation: resize. Use 'ocr', 'metadata', or 'describe'"
        );
    }

    #[tokio::test]
    async fn metadata_of_local_png() {
        let (_tmp, ctx) = ctx_with_png();
        let out = AnalyzeImage
            .execute(
                json!({"image_source": "data/downloads/chart.png", "operation": "metadata"}),
                &ctx,
            )
            .await
            .into_content();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(&lines[..5], &["format: PNG", "mode: RGB", "size: 4x2", "width: 4", "height: 2"]);
        assert!(lines[5].starts_with("file_size: "), "{out}");
        assert_eq!(lines.len(), 6, "{out}");
    }

    #[tokio::test]
    async fn describe_reports_aspect_ratio_and_average_color() {
        let (_tmp, ctx) = ctx_with_png();
        let out = AnalyzeImage
            .execute(
                json!({"image_source": "data/downloads/chart.png", "operation": "describe"}),
                &ctx,
            )
            .await
            .into_content();
        assert!(out.starts_with("Image Description:\n- Format: PNG"), "{out}");
        assert!(out.contains("- Size: 4x2 pixels"), "{out}");
        assert!(out.contains("- Aspect Ratio: 2.00"), "{out}");
        assert!(out.contains("- Average Color: rgb(10, 20, 30)"), "{out}");
    }

    #[tokio::test]
    async fn ocr_without_tesseract_is_reported() {
        let (_tmp, ctx) = ctx_with_png();
        let out = AnalyzeImage
            .execute(json!({"image_source": "data/downloads/chart.png"}), &ctx)
            .await
            .into_content();
        assert!(out.starts_with("Error analyzing image:"), "{out}");
        assert!(out.contains("tesseract"), "{out}");
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let (_tmp, ctx) = ctx_with_png();
        let out = AnalyzeImage
            .execute(json!({"image_source": "nope.png", "operation": "metadata"}), &ctx)
            .await
            .into_content();
        assert!(out.contains("Image file not found at"), "{out}");
    }

    #[test]
    fn modes_follow_pillow_names() {
        assert_eq!(color_mode(ColorType::L8), "L");
        assert_eq!(color_mode(ColorType::Rgba8), "RGBA");
    }

    fn encode(format: ImageFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(3, 3, Rgb([200u8, 100, 50])));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[tokio::test]
    async fn metadata_flags_exif_segment() {
        let jpeg = encode(ImageFormat::Jpeg);
        // SOI, then an APP1 segment holding a bare big-endian TIFF header.
        let mut with_exif = jpeg[..2].to_vec();
        with_exif.extend_from_slice(&[0xFF, 0xE1, 0x00, 0x10]);
        with_exif.extend_from_slice(b"Exif\0\0MM\0*\0\0\0\x08");
        with_exif.extend_from_slice(&jpeg[2..]);

        let (tmp, ctx) = ctx_with_png();
        std::fs::write(tmp.path().join("photo.jpg"), &with_exif).unwrap();
        let out = AnalyzeImage
            .execute(json!({"image_source": "photo.jpg", "operation": "metadata"}), &ctx)
            .await
            .into_content();
        assert!(out.starts_with("format: JPEG\nmode: RGB\nsize: 3x3"), "{out}");
        assert!(out.ends_with("\nhas_exif: True"), "{out}");

        assert!(!has_exif(ImageFormat::Jpeg, &jpeg));
    }

    #[tokio::test]
    async fn url_without_extension_lands_at_fallback_name() {
        let png = encode(ImageFormat::Png);
        let app = axum::Router::new().route(
            "/img",
            axum::routing::get(move || {
                let png = png.clone();
                async move { png }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let (_tmp, ctx) = ctx_with_png();
        let out = AnalyzeImage
            .execute(
                json!({"image_source": format!("http://{addr}/img?x=1"), "operation": "metadata"}),
                &ctx,
            )
            .await
            .into_content();
        assert!(out.starts_with("format: PNG\nmode: RGB\nsize: 3x3"), "{out}");
        assert!(ctx.dirs.downloads.join("image.png").is_file());
    }
}
