// FOVEA Segment Writer - External Encode
// Copyright (c) 2026 The FOVEA Project
//
// Hands a sealed frame run to the ffmpeg binary (raw rgb24 on stdin, H.264
// out) and publishes the result atomically: the encoder writes to a hidden
// temp name in the destination directory and the final filename only appears
// via rename once the file is complete. "Filename present" is the only
// synchronization barrier between producer and consumer.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::info;

use crate::config::{LayerId, StreamConfig};

use super::segment_buffer::SealedSegment;
use super::Frame;

pub fn segment_file_name(layer: LayerId, index: u64) -> String {
    format!("{}_segment{:04}.mp4", layer.name(), index)
}

pub fn combined_file_name(index: u64) -> String {
    format!("segment_{:04}.mp4", index)
}

/// Encode a frame run into `dir/file_name`. Returns only once the file is
/// fully written, closed, and renamed into place.
pub async fn write_frames(
    frames: &[Frame],
    fps: u32,
    dir: &Path,
    file_name: &str,
) -> Result<PathBuf> {
    if frames.is_empty() {
        bail!("no frames to encode for {}", file_name);
    }
    let (width, height) = frames[0].dimensions();
    if let Some(odd) = frames.iter().find(|f| f.dimensions() != (width, height)) {
        bail!(
            "frame run for {} mixes dimensions: {}x{} vs {:?}",
            file_name,
            width,
            height,
            odd.dimensions()
        );
    }

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating segment directory {:?}", dir))?;

    // Hidden temp name: excluded from manifest scans and the file server
    // until the rename publishes it.
    let temp_path = dir.join(format!(".tmp_{}", file_name));
    let final_path = dir.join(file_name);

    let threads = num_cpus::get().to_string();
    let mut child = Command::new("ffmpeg")
        .args([
            "-y",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
            &format!("{}x{}", width, height),
            "-r",
            &fps.to_string(),
            "-i",
            "-",
            "-an",
            "-c:v",
            "libx264",
            "-preset",
            "ultrafast",
            "-tune",
            "zerolatency",
            "-pix_fmt",
            "yuv420p",
            "-threads",
            &threads,
        ])
        .arg(&temp_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .context("spawning ffmpeg encoder")?;

    let mut stdin = child.stdin.take().context("encoder stdin was not captured")?;
    for frame in frames {
        stdin
            .write_all(frame.as_raw())
            .await
            .with_context(|| format!("piping raw frames for {}", file_name))?;
    }
    drop(stdin);

    let output = child.wait_with_output().await.context("waiting on ffmpeg")?;
    if !output.status.success() {
        let _ = tokio::fs::remove_file(&temp_path).await;
        bail!(
            "ffmpeg encode failed for {}: {}",
            file_name,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    tokio::fs::rename(&temp_path, &final_path)
        .await
        .with_context(|| format!("publishing {:?}", final_path))?;

    info!("[ENCODE] Segment saved: {:?}", final_path);
    Ok(final_path)
}

/// Encode one sealed layer segment into the layer directory.
pub async fn write_segment(sealed: &SealedSegment, fps: u32, dir: &Path) -> Result<PathBuf> {
    write_frames(
        &sealed.frames,
        fps,
        dir,
        &segment_file_name(sealed.layer, sealed.index),
    )
    .await
}

/// Precompress the master input into the three per-layer H.264 renditions
/// the producer streams from. Any failure here is fatal at startup.
pub async fn prepare_layer_inputs(cfg: &StreamConfig) -> Result<Vec<PathBuf>> {
    if !cfg.input_video.exists() {
        bail!("master input {:?} does not exist", cfg.input_video);
    }
    tokio::fs::create_dir_all(&cfg.renditions_dir)
        .await
        .with_context(|| format!("creating {:?}", cfg.renditions_dir))?;

    let mut produced = Vec::with_capacity(cfg.layers.len());
    for layer in &cfg.layers {
        let out = cfg.rendition_path(layer.id);
        info!(
            "[PREPARE] Rendition {} -> {}x{} (crf {})",
            layer.id.name(),
            layer.width,
            layer.height,
            layer.crf
        );

        let output = Command::new("ffmpeg")
            .args(["-y", "-v", "error", "-i"])
            .arg(&cfg.input_video)
            .args([
                "-vf",
                &format!("scale={}:{}", layer.width, layer.height),
                "-c:v",
                "libx264",
                "-crf",
                &layer.crf.to_string(),
                "-preset",
                "ultrafast",
                "-tune",
                "zerolatency",
                "-an",
            ])
            .arg(&out)
            .output()
            .await
            .context("spawning ffmpeg for layer preparation")?;

        if !output.status.success() {
            bail!(
                "layer preparation failed for {}: {}",
                layer.id.name(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        produced.push(out);
    }
    Ok(produced)
}
