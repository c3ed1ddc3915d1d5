use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ffmpeg not found")]
    FfmpegNotFound,
    #[error("ffmpeg failed: {0}")]
    FfmpegFailed(String),
    #[error("source has no usable frame rate")]
    BadFrameRate,
}

/// Supplier of decoded raw pictures. One picture per call, None at end of
/// stream; `rewind` restarts from the first frame.
pub trait FrameSource {
    fn next_frame(&mut self) -> Option<Vec<u8>>;
    /// Returns false if the source could not be reopened.
    fn rewind(&mut self) -> bool;
    fn native_fps(&self) -> f64;
}

/// Decodes a video file to raw BGR24 frames at the encoder's geometry by
/// piping it through an ffmpeg child process. Rewinding respawns the child
/// from the start of the file.
pub struct FfmpegFrameSource {
    path: String,
    width: u32,
    height: u32,
    frame_size: usize,
    native_fps: f64,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
}

impl FfmpegFrameSource {
    pub fn open(path: &str, width: u32, height: u32) -> Result<Self, FrameError> {
        let (native_fps, frame_count) = probe(path)?;

        let mut source = Self {
            path: path.to_string(),
            width,
            height,
            frame_size: (width * height * 3) as usize,
            native_fps,
            child: None,
            stdout: None,
        };
        source.spawn_decoder()?;

        tracing::info!(
            path = %path,
            native_fps = format!("{:.2}", native_fps),
            frames = frame_count,
            "opened video source"
        );

        Ok(source)
    }

    fn spawn_decoder(&mut self) -> Result<(), FrameError> {
        let mut child = Command::new("ffmpeg")
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                &self.path,
                "-vf",
                &format!("scale={}:{}", self.width, self.height),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "bgr24",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    FrameError::FfmpegNotFound
                } else {
                    FrameError::Io(e)
                }
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FrameError::FfmpegFailed("failed to capture stdout".to_string()))?;

        self.child = Some(child);
        self.stdout = Some(stdout);
        Ok(())
    }

    fn kill_child(&mut self) {
        self.stdout.take();
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl FrameSource for FfmpegFrameSource {
    fn next_frame(&mut self) -> Option<Vec<u8>> {
        let stdout = self.stdout.as_mut()?;
        let mut buf = vec![0u8; self.frame_size];
        match stdout.read_exact(&mut buf) {
            Ok(()) => Some(buf),
            Err(_) => None, // EOF or a short trailing read
        }
    }

    fn rewind(&mut self) -> bool {
        self.kill_child();
        match self.spawn_decoder() {
            Ok(()) => {
                tracing::debug!(path = %self.path, "source rewound");
                true
            }
            Err(e) => {
                tracing::warn!(path = %self.path, error = %e, "failed to reopen source");
                false
            }
        }
    }

    fn native_fps(&self) -> f64 {
        self.native_fps
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        self.kill_child();
    }
}

fn probe(path: &str) -> Result<(f64, Option<u64>), FrameError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=r_frame_rate,nb_frames",
            "-of",
            "csv=p=0",
            path,
        ])
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FrameError::FfmpegNotFound
            } else {
                FrameError::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(FrameError::FfmpegFailed(stderr));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout
        .lines()
        .next()
        .ok_or_else(|| FrameError::FfmpegFailed("empty probe output".to_string()))?;

    let mut fields = line.trim().split(',');
    let fps = fields
        .next()
        .and_then(parse_rate)
        .ok_or(FrameError::BadFrameRate)?;
    let frame_count = fields.next().and_then(|s| s.trim().parse().ok());

    Ok((fps, frame_count))
}

// r_frame_rate comes back as a rational like "30000/1001"
fn parse_rate(s: &str) -> Option<f64> {
    let s = s.trim();
    let rate = match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den > 0.0 {
                num / den
            } else {
                return None;
            }
        }
        None => s.parse().ok()?,
    };
    (rate > 0.0).then_some(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("25/1"), Some(25.0));
        assert_eq!(parse_rate("30000/1001").map(|r| r.round()), Some(30.0));
        assert_eq!(parse_rate(" 24 "), Some(24.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("0"), None);
        assert_eq!(parse_rate("garbage"), None);
    }
}
