//! Input capture: text box normalisation and image attachments.
//!
//! Every source ends up as one [`OutboundPayload`]. Image files are read on
//! a background task and delivered as a [`CaptureEvent`].

use std::path::{Path, PathBuf};

use base64::Engine;
use tokio::sync::mpsc;

use crate::error::{ChatError, Result};
use crate::voice::VoiceEvent;

/// What gets posted to the backend, exactly one field per request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundPayload {
    Text(String),
    /// `data:<mime>;base64,<bytes>`
    Image(String),
}

impl OutboundPayload {
    pub fn is_image(&self) -> bool {
        matches!(self, OutboundPayload::Image(_))
    }
}

/// Events produced off the main loop by capture sources
#[derive(Debug)]
pub enum CaptureEvent {
    /// An image file finished reading
    ImageReady { file_name: String, data_uri: String },
    /// Reading an accepted image failed
    ImageFailed { file_name: String, error: ChatError },
    Voice(VoiceEvent),
}

/// Trim text box contents; `None` means there is nothing to send.
pub fn normalize_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// MIME type guessed from the file extension
pub fn guess_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" | "jfif" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "tif" | "tiff" => "image/tiff",
        "ico" => "image/x-icon",
        "heic" => "image/heic",
        "avif" => "image/avif",
        "txt" | "md" => "text/plain",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        _ => return None,
    };
    Some(mime)
}

/// Only `image/*` files may be attached
pub fn is_image(path: &Path) -> bool {
    guess_mime(path).is_some_and(|m| m.starts_with("image/"))
}

pub fn to_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Read an image into a data URI.
pub async fn read_image(path: &Path) -> Result<String> {
    let mime = guess_mime(path)
        .filter(|m| m.starts_with("image/"))
        .ok_or_else(|| ChatError::UnsupportedInput(path.display().to_string()))?;
    let bytes = tokio::fs::read(path).await?;
    Ok(to_data_uri(mime, &bytes))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Start reading an attachment in the background.
///
/// Returns `false` without spawning anything when the file is not an image;
/// that case is dropped silently. Otherwise exactly one [`CaptureEvent`]
/// follows on `tx`.
pub fn spawn_image_read(path: PathBuf, tx: mpsc::UnboundedSender<CaptureEvent>) -> bool {
    if !is_image(&path) {
        tracing::debug!(path = %path.display(), "ignoring non-image attachment");
        return false;
    }

    tokio::spawn(async move {
        let file_name = display_name(&path);
        let event = match read_image(&path).await {
            Ok(data_uri) => CaptureEvent::ImageReady { file_name, data_uri },
            Err(error) => CaptureEvent::ImageFailed { file_name, error },
        };
        let _ = tx.send(event);
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  squat form?  "), Some("squat form?".to_string()));
        assert_eq!(normalize_text(""), None);
        assert_eq!(normalize_text(" \t\n "), None);
    }

    #[test]
    fn test_image_predicate() {
        assert!(is_image(Path::new("meal.PNG")));
        assert!(is_image(Path::new("/tmp/form.jpeg")));
        assert!(!is_image(Path::new("notes.txt")));
        assert!(!is_image(Path::new("plan.pdf")));
        assert!(!is_image(Path::new("no_extension")));
    }

    #[test]
    fn test_data_uri_shape() {
        assert_eq!(to_data_uri("image/png", b"abc"), "data:image/png;base64,YWJj");
    }

    #[tokio::test]
    async fn test_image_read_delivers_one_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plate.jpg");
        std::fs::write(&path, [0xff, 0xd8, 0xff]).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(spawn_image_read(path, tx));

        match rx.recv().await {
            Some(CaptureEvent::ImageReady { file_name, data_uri }) => {
                assert_eq!(file_name, "plate.jpg");
                assert_eq!(data_uri, "data:image/jpeg;base64,/9j/");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_non_image_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, "hello").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(!spawn_image_read(path, tx));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_image_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(spawn_image_read(dir.path().join("gone.png"), tx));
        assert!(matches!(
            rx.recv().await,
            Some(CaptureEvent::ImageFailed { error: ChatError::Io(_), .. })
        ));
    }
}
