//! Post-processing of downloaded theme files through an external encoder.
//!
//! A download lands in a `.part` file. Depending on the output kind, the
//! source container and the requested volume it is either renamed into
//! place or re-encoded. Any encoder failure falls back to the rename.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};
use url::Url;

use crate::error::SyncError;

/// What to do with a finished download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostProcess {
    /// The part file is already in the target format.
    Rename,
    /// Encoder arguments placed between input and output.
    Encode(Vec<String>),
}

/// How a file ended up at its target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalized {
    Renamed,
    Encoded,
    /// Encoding was wanted but failed; the raw download was moved into place.
    RawFallback,
}

/// Lowercased file extension of a URL's last path segment.
pub fn source_extension(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.last()?;
    let (_, ext) = last.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// Decide how a download becomes its target file.
///
/// `volume` is a percentage; 100 or more keeps the original level.
pub fn post_process(is_video: bool, source_ext: Option<&str>, volume: u8) -> PostProcess {
    let full_volume = volume >= 100;
    let volume_filter = || format!("volume={:.2}", f32::from(volume) / 100.0);

    if is_video {
        if source_ext == Some("webm") && full_volume {
            return PostProcess::Rename;
        }
        let mut args = vec!["-c:v".to_string(), "copy".to_string()];
        if volume == 0 {
            args.push("-an".into());
        } else if !full_volume {
            args.extend(["-af".into(), volume_filter(), "-c:a".into(), "libopus".into()]);
        } else {
            args.extend(["-c:a".into(), "copy".into()]);
        }
        PostProcess::Encode(args)
    } else {
        if source_ext == Some("mp3") && full_volume {
            return PostProcess::Rename;
        }
        let mut args = vec!["-vn".to_string()];
        if !full_volume {
            args.extend(["-af".into(), volume_filter()]);
        }
        args.extend(["-c:a".into(), "libmp3lame".into()]);
        PostProcess::Encode(args)
    }
}

/// Runs the configured encoder binary, if any.
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    program: Option<PathBuf>,
}

impl Encoder {
    pub fn new(program: Option<PathBuf>) -> Self {
        Self { program }
    }

    pub fn is_configured(&self) -> bool {
        self.program.is_some()
    }

    /// Move `part` to `target`, encoding on the way when needed.
    ///
    /// `part` never survives a successful return.
    pub async fn finalize(
        &self,
        part: &Path,
        target: &Path,
        is_video: bool,
        source_url: &str,
        volume: u8,
    ) -> Result<Finalized, SyncError> {
        let ext = source_extension(source_url);
        let args = match post_process(is_video, ext.as_deref(), volume) {
            PostProcess::Rename => {
                tokio::fs::rename(part, target).await?;
                return Ok(Finalized::Renamed);
            }
            PostProcess::Encode(args) => args,
        };

        match self.encode(part, target, &args).await {
            Ok(()) => {
                let _ = tokio::fs::remove_file(part).await;
                Ok(Finalized::Encoded)
            }
            Err(e) => {
                warn!(
                    target = %target.display(),
                    error = %e,
                    "Encoding failed, keeping the raw download"
                );
                tokio::fs::rename(part, target).await?;
                Ok(Finalized::RawFallback)
            }
        }
    }

    async fn encode(&self, input: &Path, target: &Path, args: &[String]) -> Result<(), SyncError> {
        let program = self
            .program
            .as_deref()
            .ok_or_else(|| SyncError::Encoder("no encoder configured".into()))?;

        let scratch = scratch_path(target);
        let result = self.run(program, input, &scratch, args).await;
        let result = match result {
            Ok(()) => tokio::fs::rename(&scratch, target).await.map_err(SyncError::from),
            Err(e) => Err(e),
        };
        if result.is_err() {
            let _ = tokio::fs::remove_file(&scratch).await;
        }
        result
    }

    async fn run(
        &self,
        program: &Path,
        input: &Path,
        output: &Path,
        args: &[String],
    ) -> Result<(), SyncError> {
        debug!(program = %program.display(), ?args, output = %output.display(), "Encoding");

        let out = Command::new(program)
            .args(["-y", "-hide_banner", "-loglevel", "error", "-i"])
            .arg(input)
            .args(args)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                SyncError::Encoder(format!("failed to start {}: {e}", program.display()))
            })?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let detail = stderr.lines().last().unwrap_or_default().trim().to_string();
            return Err(SyncError::Encoder(format!("{}: {detail}", out.status)));
        }
        if tokio::fs::metadata(output).await.is_err() {
            return Err(SyncError::Encoder("encoder produced no output".into()));
        }
        Ok(())
    }
}

/// Encoder output path next to the target, keeping its extension so the
/// encoder picks the right container.
fn scratch_path(target: &Path) -> PathBuf {
    let ext = target
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    target.with_extension(format!("encoding.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> PostProcess {
        PostProcess::Encode(list.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_source_extension() {
        assert_eq!(
            source_extension("https://v.animethemes.moe/Frieren-OP1.webm").as_deref(),
            Some("webm")
        );
        assert_eq!(
            source_extension("https://a.animethemes.moe/Frieren-OP1.OGG?x=1").as_deref(),
            Some("ogg")
        );
        assert_eq!(source_extension("https://example.com/stream"), None);
        assert_eq!(source_extension("not a url"), None);
    }

    #[test]
    fn test_video_decisions() {
        assert_eq!(post_process(true, Some("webm"), 100), PostProcess::Rename);
        assert_eq!(
            post_process(true, Some("webm"), 0),
            args(&["-c:v", "copy", "-an"])
        );
        assert_eq!(
            post_process(true, Some("webm"), 50),
            args(&["-c:v", "copy", "-af", "volume=0.50", "-c:a", "libopus"])
        );
        assert_eq!(
            post_process(true, Some("mp4"), 100),
            args(&["-c:v", "copy", "-c:a", "copy"])
        );
    }

    #[test]
    fn test_audio_decisions() {
        assert_eq!(post_process(false, Some("mp3"), 100), PostProcess::Rename);
        assert_eq!(
            post_process(false, Some("ogg"), 100),
            args(&["-vn", "-c:a", "libmp3lame"])
        );
        assert_eq!(
            post_process(false, Some("mp3"), 25),
            args(&["-vn", "-af", "volume=0.25", "-c:a", "libmp3lame"])
        );
        assert_eq!(
            post_process(false, None, 100),
            args(&["-vn", "-c:a", "libmp3lame"])
        );
    }

    #[test]
    fn test_scratch_path_keeps_extension() {
        assert_eq!(
            scratch_path(Path::new("/lib/theme-music/OP1.mp3")),
            PathBuf::from("/lib/theme-music/OP1.encoding.mp3")
        );
    }

    #[tokio::test]
    async fn test_rename_without_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("OP1-video.webm.part");
        let target = dir.path().join("OP1-video.webm");
        tokio::fs::write(&part, b"webm").await.unwrap();

        let done = Encoder::default()
            .finalize(&part, &target, true, "https://v.animethemes.moe/X-OP1.webm", 100)
            .await
            .unwrap();

        assert_eq!(done, Finalized::Renamed);
        assert!(!part.exists());
        assert_eq!(std::fs::read(&target).unwrap(), b"webm");
    }

    #[tokio::test]
    async fn test_missing_encoder_falls_back_to_raw() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("OP1.mp3.part");
        let target = dir.path().join("OP1.mp3");
        tokio::fs::write(&part, b"ogg").await.unwrap();

        let done = Encoder::default()
            .finalize(&part, &target, false, "https://a.animethemes.moe/X-OP1.ogg", 100)
            .await
            .unwrap();

        assert_eq!(done, Finalized::RawFallback);
        assert!(!part.exists());
        assert_eq!(std::fs::read(&target).unwrap(), b"ogg");
    }

    #[tokio::test]
    async fn test_unspawnable_encoder_falls_back_to_raw() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("ED1.mp3.part");
        let target = dir.path().join("ED1.mp3");
        tokio::fs::write(&part, b"ogg").await.unwrap();

        let encoder = Encoder::new(Some(dir.path().join("no-such-encoder")));
        assert!(encoder.is_configured());
        let done = encoder
            .finalize(&part, &target, false, "https://a.animethemes.moe/X-ED1.ogg", 40)
            .await
            .unwrap();

        assert_eq!(done, Finalized::RawFallback);
        assert!(target.exists());
        assert!(!scratch_path(&target).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_encoder_falls_back_to_raw() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("OP2.mp3.part");
        let target = dir.path().join("OP2.mp3");
        tokio::fs::write(&part, b"ogg").await.unwrap();

        let done = Encoder::new(Some(PathBuf::from("/bin/false")))
            .finalize(&part, &target, false, "https://a.animethemes.moe/X-OP2.ogg", 100)
            .await
            .unwrap();

        assert_eq!(done, Finalized::RawFallback);
        assert!(!part.exists());
        assert!(!scratch_path(&target).exists());
        assert_eq!(std::fs::read(&target).unwrap(), b"ogg");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_encoded_output_replaces_download() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        // Writes a marker to its last argument, the output path.
        let script = dir.path().join("fake-encoder.sh");
        std::fs::write(&script, "#!/bin/sh\nfor out; do :; done\nprintf encoded > \"$out\"\n")
            .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let part = dir.path().join("ED1.mp3.part");
        let target = dir.path().join("ED1.mp3");
        tokio::fs::write(&part, b"ogg").await.unwrap();

        let done = Encoder::new(Some(script))
            .finalize(&part, &target, false, "https://a.animethemes.moe/X-ED1.ogg", 100)
            .await
            .unwrap();

        assert_eq!(done, Finalized::Encoded);
        assert!(!part.exists());
        assert!(!scratch_path(&target).exists());
        assert_eq!(std::fs::read(&target).unwrap(), b"encoded");
    }
}
