use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::{MediaResolver, ResolvedMedia};
use crate::error::ResolveError;

/// Resolver que usa yt-dlp para extraer la URL de audio y los metadatos
pub struct YtDlpResolver {
    binary: String,
    timeout: Duration,
}

/// Subset of `yt-dlp --dump-single-json` output we care about.
#[derive(Debug, Deserialize)]
struct VideoInfo {
    title: Option<String>,
    duration: Option<f64>,
    url: Option<String>,
    #[serde(default)]
    formats: Vec<FormatInfo>,
}

#[derive(Debug, Deserialize)]
struct FormatInfo {
    url: Option<String>,
    acodec: Option<String>,
    vcodec: Option<String>,
    abr: Option<f64>,
}

impl FormatInfo {
    fn is_audio_only(&self) -> bool {
        let has_audio = self.acodec.as_deref().is_some_and(|c| c != "none");
        let no_video = self.vcodec.as_deref().map_or(true, |c| c == "none");
        has_audio && no_video
    }
}

impl YtDlpResolver {
    pub fn new(timeout: Duration) -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            timeout,
        }
    }

    /// Verifica que yt-dlp y ffmpeg estén disponibles
    pub async fn verify_dependencies(&self) -> anyhow::Result<()> {
        let ytdlp = async_process::Command::new(&self.binary)
            .arg("--version")
            .output()
            .await;

        match ytdlp {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!("✅ yt-dlp versión: {}", version.trim());
            }
            _ => {
                error!("❌ yt-dlp no encontrado. Instala con: pip install yt-dlp");
                anyhow::bail!("yt-dlp no disponible");
            }
        }

        let ffmpeg = async_process::Command::new("ffmpeg")
            .arg("-version")
            .output()
            .await;

        match ffmpeg {
            Ok(output) if output.status.success() => {
                info!("✅ ffmpeg disponible");
            }
            _ => {
                error!("❌ ffmpeg no encontrado. Instala con: sudo apt install ffmpeg");
                anyhow::bail!("ffmpeg no disponible");
            }
        }

        Ok(())
    }

    /// Only absolute http(s) links are handed to the extractor.
    fn validate_link(link: &str) -> Result<(), ResolveError> {
        let parsed =
            url::Url::parse(link).map_err(|e| ResolveError::InvalidLink(format!("{link}: {e}")))?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(ResolveError::InvalidLink(format!(
                "{link}: unsupported scheme {other}"
            ))),
        }
    }

    async fn run_extractor(&self, link: &str) -> Result<Vec<u8>, ResolveError> {
        let output = tokio::process::Command::new(&self.binary)
            .args([
                "--dump-single-json",
                "--no-playlist",
                "--no-warnings",
                "--socket-timeout",
                "30",
                "--format",
                "bestaudio/best",
            ])
            .arg(link)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ResolveError::Extractor(stderr.trim().to_string()));
        }

        Ok(output.stdout)
    }
}

/// Parses extractor JSON into a [`ResolvedMedia`].
///
/// Prefers the top level `url` (set when `--format` picked a single stream)
/// and falls back to the highest bitrate audio-only format.
pub(crate) fn parse_video_info(raw: &[u8]) -> Result<ResolvedMedia, ResolveError> {
    let info: VideoInfo = serde_json::from_slice(raw)?;

    let stream_url = match info.url {
        Some(url) => url,
        None => info
            .formats
            .iter()
            .filter(|f| f.is_audio_only() && f.url.is_some())
            .max_by(|a, b| {
                a.abr
                    .unwrap_or_default()
                    .total_cmp(&b.abr.unwrap_or_default())
            })
            .and_then(|f| f.url.clone())
            .ok_or_else(|| ResolveError::Extractor("no audio stream available".to_string()))?,
    };

    Ok(ResolvedMedia {
        stream_url,
        title: info.title.unwrap_or_else(|| "Unknown".to_string()),
        duration: info
            .duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(Duration::from_secs_f64),
    })
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(&self, link: &str) -> Result<ResolvedMedia, ResolveError> {
        Self::validate_link(link)?;
        debug!("🔍 Resolviendo enlace: {}", link);

        let raw = match timeout(self.timeout, self.run_extractor(link)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("⏰ Timeout resolviendo {}", link);
                return Err(ResolveError::Timeout(self.timeout));
            }
        };

        let media = parse_video_info(&raw)?;
        info!("🎵 Resuelto: {} ({:?})", media.title, media.duration);
        Ok(media)
    }

    fn source_name(&self) -> &'static str {
        "yt-dlp"
    }
}
