//! Audio conversion to Telegram's voice format (OGG/Opus).
//!
//! Shells out to `ffmpeg`, piping the input through stdin and reading the
//! converted clip from stdout. The input container/codec is whatever the
//! user uploaded; ffmpeg probes it.

use log::debug;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Errors produced by the audio converter.
#[derive(Debug)]
pub enum ConvertError {
    /// ffmpeg could not be spawned or piped to.
    Io(std::io::Error),
    /// ffmpeg exited with a failure status.
    Ffmpeg(String),
}

impl std::fmt::Display for ConvertError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConvertError::Io(e) => write!(f, "failed to run ffmpeg: {e}"),
            ConvertError::Ffmpeg(msg) => write!(f, "ffmpeg conversion failed: {msg}"),
        }
    }
}

impl std::error::Error for ConvertError {}

impl From<std::io::Error> for ConvertError {
    fn from(err: std::io::Error) -> Self {
        ConvertError::Io(err)
    }
}

/// Convert an arbitrary audio byte stream into an OGG/Opus voice clip.
pub async fn convert_to_ogg(input: &[u8]) -> Result<Vec<u8>, ConvertError> {
    debug!("Converting {} bytes of audio to OGG/Opus", input.len());

    let mut child = Command::new("ffmpeg")
        .args([
            "-hide_banner",
            "-loglevel", "error",
            "-i", "pipe:0",
            "-vn",
            "-c:a", "libopus",
            "-b:a", "64k",
            "-f", "ogg",
            "pipe:1",
        ])
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()?;

    // Feed stdin from a separate task so a full stdout pipe cannot deadlock
    // the child while we are still writing.
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| ConvertError::Ffmpeg("ffmpeg stdin unavailable".to_string()))?;
    let input = input.to_vec();
    let writer = tokio::spawn(async move {
        stdin.write_all(&input).await?;
        stdin.shutdown().await
    });

    let output = child.wait_with_output().await?;

    // A write error usually just means ffmpeg rejected the input early and
    // closed its end; the exit status below is the authoritative signal.
    if let Ok(Err(e)) = writer.await {
        debug!("ffmpeg stdin write ended early: {e}");
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(ConvertError::Ffmpeg(if stderr.is_empty() {
            format!("exit status {}", output.status)
        } else {
            stderr
        }));
    }

    if output.stdout.is_empty() {
        return Err(ConvertError::Ffmpeg("empty output stream".to_string()));
    }

    debug!("Conversion produced {} bytes", output.stdout.len());
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_error_display() {
        let io_err = ConvertError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no such file",
        ));
        assert!(format!("{io_err}").contains("failed to run ffmpeg"));

        let ffmpeg_err = ConvertError::Ffmpeg("invalid data found".to_string());
        assert_eq!(
            format!("{ffmpeg_err}"),
            "ffmpeg conversion failed: invalid data found"
        );
    }

    #[tokio::test]
    async fn test_convert_rejects_garbage_input() {
        // Not audio in any container ffmpeg knows.
        let result = convert_to_ogg(b"definitely not audio data").await;
        assert!(result.is_err());
    }
}
