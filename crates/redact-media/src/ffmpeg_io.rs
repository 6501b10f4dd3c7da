//! Raw RGB frame I/O over FFmpeg pipes.
//!
//! The frame loop is synchronous, so these use `std::process` and are meant
//! to run on a blocking thread.

use image::RgbImage;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tracing::debug;

use crate::command::check_ffmpeg;
use crate::error::{MediaError, MediaResult};
use crate::pipeline::{FrameSink, FrameSource};

/// Decodes a video into RGB24 frames.
///
/// FFmpeg applies the stream's display rotation while decoding, so `width`
/// and `height` must be the rotated size [`crate::probe_video`] reports.
pub struct FfmpegFrameReader {
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    frame_bytes: usize,
    finished: bool,
}

impl FfmpegFrameReader {
    pub fn open(input: &Path, width: u32, height: u32) -> MediaResult<Self> {
        check_ffmpeg()?;
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }

        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(input)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("decoder stdout not captured"))?;

        debug!("Opened frame reader for {} ({}x{})", input.display(), width, height);

        Ok(Self {
            child,
            stdout,
            width,
            height,
            frame_bytes: width as usize * height as usize * 3,
            finished: false,
        })
    }

    /// Fill `buf` completely; `Ok(false)` on a clean end of stream.
    fn read_frame_bytes(&mut self, buf: &mut [u8]) -> MediaResult<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => {
                    return Err(MediaError::source_unreadable(format!(
                        "stream ended mid-frame ({filled} of {} bytes)",
                        buf.len()
                    )))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(MediaError::source_unreadable(e.to_string())),
            }
        }
        Ok(true)
    }
}

impl FrameSource for FfmpegFrameReader {
    fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.frame_bytes];
        if self.read_frame_bytes(&mut buf)? {
            return RgbImage::from_raw(self.width, self.height, buf)
                .map(Some)
                .ok_or_else(|| MediaError::internal("frame buffer size mismatch"));
        }

        self.finished = true;
        let status = self.child.wait()?;
        if status.success() {
            Ok(None)
        } else {
            Err(MediaError::source_unreadable(format!(
                "decoder exited with {status}"
            )))
        }
    }
}

impl Drop for FfmpegFrameReader {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Encodes RGB24 frames into an H.264 file.
pub struct FfmpegFrameWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    width: u32,
    height: u32,
}

impl FfmpegFrameWriter {
    pub fn create(output: &Path, width: u32, height: u32, fps: f64) -> MediaResult<Self> {
        check_ffmpeg()?;

        let mut child = Command::new("ffmpeg")
            .args(["-y", "-v", "error", "-f", "rawvideo", "-pix_fmt", "rgb24", "-s"])
            .arg(format!("{width}x{height}"))
            .arg("-r")
            .arg(format!("{fps:.3}"))
            .args(["-i", "pipe:0", "-an"])
            // libx264 with yuv420p needs even dimensions.
            .args(["-vf", "scale=trunc(iw/2)*2:trunc(ih/2)*2"])
            .args(["-c:v", "libx264", "-preset", "veryfast", "-crf", "18"])
            .args(["-pix_fmt", "yuv420p"])
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::internal("encoder stdin not captured"))?;

        Ok(Self {
            child,
            stdin: Some(stdin),
            width,
            height,
        })
    }
}

impl FrameSink for FfmpegFrameWriter {
    fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(MediaError::sink_unwritable(format!(
                "frame is {:?}, encoder expects {}x{}",
                frame.dimensions(),
                self.width,
                self.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::sink_unwritable("encoder already closed"))?;
        stdin
            .write_all(frame.as_raw())
            .map_err(|e| MediaError::sink_unwritable(e.to_string()))
    }

    fn finish(&mut self) -> MediaResult<()> {
        // Closing stdin signals end of stream.
        drop(self.stdin.take());
        let status = self.child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(MediaError::sink_unwritable(format!(
                "encoder exited with {status}"
            )))
        }
    }

    fn abort(&mut self) {
        drop(self.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for FfmpegFrameWriter {
    fn drop(&mut self) {
        if self.stdin.is_some() {
            self.abort();
        }
    }
}
