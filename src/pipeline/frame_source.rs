// FOVEA Frame Source - External Media Decode
// Copyright (c) 2026 The FOVEA Project
//
// Realizes the decode contract (open / read_frame / release) over an ffmpeg
// subprocess emitting raw rgb24 frames on stdout. Stream dimensions are
// discovered up front via ffprobe, so a frame is always exactly
// width * height * 3 bytes.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::debug;

use super::Frame;

/// Query a video's pixel dimensions with ffprobe.
pub async fn probe_dimensions(path: &Path) -> Result<(u32, u32)> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=p=0",
        ])
        .arg(path)
        .output()
        .await
        .context("spawning ffprobe")?;

    if !output.status.success() {
        bail!(
            "ffprobe failed for {:?}: {}",
            path,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    parse_probe_line(&String::from_utf8_lossy(&output.stdout))
        .with_context(|| format!("parsing ffprobe output for {:?}", path))
}

fn parse_probe_line(raw: &str) -> Result<(u32, u32)> {
    let line = raw.lines().next().unwrap_or("").trim();
    let mut fields = line.split(',').filter(|f| !f.is_empty());
    let width: u32 = fields
        .next()
        .context("missing width field")?
        .trim()
        .parse()
        .context("width is not an integer")?;
    let height: u32 = fields
        .next()
        .context("missing height field")?
        .trim()
        .parse()
        .context("height is not an integer")?;
    if width == 0 || height == 0 {
        bail!("stream reports a zero dimension ({}x{})", width, height);
    }
    Ok((width, height))
}

/// A handle on one decoding subprocess.
pub struct FrameSource {
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    path: PathBuf,
}

impl FrameSource {
    /// Open a video for sequential frame reads. Fails if the file cannot be
    /// probed or the decoder cannot be spawned.
    pub async fn open(path: &Path) -> Result<Self> {
        let (width, height) = probe_dimensions(path).await?;

        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning ffmpeg decoder for {:?}", path))?;

        let stdout = child
            .stdout
            .take()
            .context("decoder stdout was not captured")?;

        debug!("[DECODE] Opened {:?} ({}x{})", path, width, height);
        Ok(Self {
            child,
            stdout,
            width,
            height,
            path: path.to_path_buf(),
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Read the next frame, or None at end of stream. A truncated trailing
    /// frame counts as end of stream, not an error.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        let len = self.width as usize * self.height as usize * 3;
        let mut buf = vec![0u8; len];
        match self.stdout.read_exact(&mut buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("reading frame from {:?}", self.path))
            }
        }
        Frame::from_raw(self.width, self.height, buf)
            .context("raw frame buffer did not match probed dimensions")
            .map(Some)
    }

    /// Tear the decoder down. Dropping the handle also kills the subprocess;
    /// this just makes the release explicit at shutdown points.
    pub async fn release(mut self) {
        let _ = self.child.kill().await;
    }
}
