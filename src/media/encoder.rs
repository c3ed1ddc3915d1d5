use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

use crate::config::EncoderConfig;
use crate::nal::START_CODE;

// Short: unit completeness comes from the pending buffer, the timeout only
// bounds how long one tick waits for fresh output. Must stay well under the
// frame interval at the default rate.
const ENCODE_READ_TIMEOUT: Duration = Duration::from_millis(20);
const READ_CHUNK: usize = 64 * 1024;
const GOP_SIZE: u32 = 30;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ffmpeg not found")]
    FfmpegNotFound,
    #[error("encoder process exited")]
    ProcessDied,
}

/// Raw picture in, zero or more complete Annex-B access units out. An empty
/// result means the encoder is still buffering, not an error.
pub trait Encoder {
    fn encode(&mut self, frame: &[u8]) -> Result<Vec<u8>, EncodeError>;
    fn is_alive(&mut self) -> bool;
}

/// Accumulates raw encoder output, which arrives on arbitrary pipe-read
/// boundaries, and releases bytes only up to the last start code. The tail
/// is held back until the next start code proves it complete, so callers
/// never see a NAL unit cut mid-stream.
#[derive(Debug, Default)]
struct UnitBuffer {
    pending: Vec<u8>,
}

impl UnitBuffer {
    fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    fn take_complete(&mut self) -> Vec<u8> {
        match last_start_code(&self.pending) {
            // Everything buffered belongs to a possibly-unfinished unit
            Some(0) | None => Vec::new(),
            Some(pos) => {
                let tail = self.pending.split_off(pos);
                std::mem::replace(&mut self.pending, tail)
            }
        }
    }
}

fn last_start_code(buf: &[u8]) -> Option<usize> {
    buf.windows(START_CODE.len()).rposition(|w| w == START_CODE)
}

/// H.264 encoder backed by an ffmpeg child process: BGR24 pictures go in on
/// stdin through a writer thread, Annex-B bytes come back from stdout
/// through a reader thread. Fixed GOP, no B-frames, so every access unit is
/// emittable as soon as it appears; output is released on unit boundaries
/// via the pending buffer.
pub struct FfmpegEncoder {
    frame_tx: Option<SyncSender<Vec<u8>>>,
    encoded_rx: Receiver<Vec<u8>>,
    units: UnitBuffer,
    child: Option<Child>,
    _writer_handle: JoinHandle<()>,
    _reader_handle: JoinHandle<()>,
}

impl FfmpegEncoder {
    pub fn spawn(config: &EncoderConfig) -> Result<Self, EncodeError> {
        let size = format!("{}x{}", config.width, config.height);
        let fps = config.fps.to_string();
        let gop = GOP_SIZE.to_string();

        let mut args: Vec<&str> = vec![
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "bgr24",
            "-s",
            &size,
            "-r",
            &fps,
            "-i",
            "pipe:0",
            "-c:v",
            &config.codec,
        ];
        if config.codec == "libx264" {
            args.extend(["-preset", "ultrafast", "-tune", "zerolatency"]);
        }
        args.extend(["-g", &gop, "-bf", "0", "-f", "h264", "pipe:1"]);

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EncodeError::FfmpegNotFound
                } else {
                    EncodeError::Io(e)
                }
            })?;

        let stdin = child.stdin.take().ok_or(EncodeError::ProcessDied)?;
        let stdout = child.stdout.take().ok_or(EncodeError::ProcessDied)?;

        let (frame_tx, frame_rx) = mpsc::sync_channel::<Vec<u8>>(16);
        let (encoded_tx, encoded_rx) = mpsc::sync_channel::<Vec<u8>>(64);

        let writer_handle = thread::spawn(move || {
            let mut stdin = stdin;
            while let Ok(frame) = frame_rx.recv() {
                if stdin.write_all(&frame).is_err() {
                    break;
                }
                if stdin.flush().is_err() {
                    break;
                }
            }
        });

        let reader_handle = thread::spawn(move || {
            let mut stdout = stdout;
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if encoded_tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        tracing::debug!(
            codec = %config.codec,
            width = config.width,
            height = config.height,
            fps = config.fps,
            "encoder started"
        );

        Ok(Self {
            frame_tx: Some(frame_tx),
            encoded_rx,
            units: UnitBuffer::default(),
            child: Some(child),
            _writer_handle: writer_handle,
            _reader_handle: reader_handle,
        })
    }
}

impl Encoder for FfmpegEncoder {
    fn encode(&mut self, frame: &[u8]) -> Result<Vec<u8>, EncodeError> {
        let tx = self.frame_tx.as_ref().ok_or(EncodeError::ProcessDied)?;
        tx.send(frame.to_vec())
            .map_err(|_| EncodeError::ProcessDied)?;

        // Output may lag behind the input while the encoder warms up; an
        // empty return lets the caller retry with the next frame.
        if let Ok(chunk) = self.encoded_rx.recv_timeout(ENCODE_READ_TIMEOUT) {
            self.units.push(&chunk);
            while let Ok(chunk) = self.encoded_rx.try_recv() {
                self.units.push(&chunk);
            }
        }

        Ok(self.units.take_complete())
    }

    fn is_alive(&mut self) -> bool {
        self.child
            .as_mut()
            .map(|c| c.try_wait().ok().flatten().is_none())
            .unwrap_or(false)
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        // Close the frame channel so the writer thread exits
        self.frame_tx.take();
        // Kill ffmpeg so the reader thread exits
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nal::{NalScanner, NalUnitType};

    fn unit(ty: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = START_CODE.to_vec();
        buf.push(ty);
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn test_complete_units_released_tail_held_back() {
        let sps = unit(0x67, &[0xAA, 0xBB]);
        let partial_idr = unit(0x65, &[0xDD]); // more payload still to come

        let mut units = UnitBuffer::default();
        units.push(&sps);
        units.push(&partial_idr);

        assert_eq!(units.take_complete(), sps);
        // The held-back tail comes out once the next unit begins
        units.push(&unit(0x41, &[0x01]));
        assert_eq!(units.take_complete(), partial_idr);
    }

    #[test]
    fn test_chunk_split_mid_unit_never_releases_partial_sps() {
        // A pipe read can end anywhere, including inside an SPS payload
        let sps = unit(0x67, &[0xAA, 0xBB, 0xCC]);
        let (head, rest) = sps.split_at(7);

        let mut units = UnitBuffer::default();
        units.push(head);
        assert!(units.take_complete().is_empty());

        units.push(rest);
        units.push(&unit(0x65, &[0xDD]));
        let out = units.take_complete();
        assert_eq!(out, sps);

        // Whatever comes out scans as whole units with full payloads
        let scanned: Vec<_> = NalScanner::new(&out).collect();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].ty, Some(NalUnitType::Sps));
        assert_eq!(&out[scanned[0].start..scanned[0].end], &[0x67, 0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn test_single_unfinished_unit_returns_nothing() {
        let mut units = UnitBuffer::default();
        units.push(&unit(0x67, &[0xAA]));
        assert!(units.take_complete().is_empty());
        // Buffer keeps the bytes rather than dropping them
        units.push(&unit(0x68, &[0xBB]));
        assert_eq!(units.take_complete(), unit(0x67, &[0xAA]));
    }

    #[test]
    fn test_chunk_without_start_code_just_buffers() {
        let mut units = UnitBuffer::default();
        units.push(&[0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(units.take_complete().is_empty());
    }

    #[test]
    fn test_multiple_complete_units_released_together() {
        let sps = unit(0x67, &[0xAA]);
        let pps = unit(0x68, &[0xBB]);
        let idr = unit(0x65, &[0xCC]);

        let mut units = UnitBuffer::default();
        units.push(&sps);
        units.push(&pps);
        units.push(&idr);

        let mut expected = sps;
        expected.extend_from_slice(&pps);
        assert_eq!(units.take_complete(), expected);
    }

    #[test]
    fn test_read_timeout_stays_under_default_frame_interval() {
        // One warm-up wait must not eat a whole 30 fps tick
        assert!(ENCODE_READ_TIMEOUT < Duration::from_micros(33_333));
    }
}
