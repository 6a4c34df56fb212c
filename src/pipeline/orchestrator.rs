// FOVEA Pipeline Orchestrator
// Copyright (c) 2026 The FOVEA Project
//
// Owns the producer's per-frame loop and the consumer's periodic
// discovery-and-combine loop. The two never share memory; every artifact
// crosses over through the segment tree, published atomically. Shutdown is a
// watch channel flipped once by the binary's signal handler.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::{LayerId, StreamConfig};
use crate::state::StreamState;

use super::combiner;
use super::encoder;
use super::frame_source::FrameSource;
use super::gaze::GazeSource;
use super::gaze_log;
use super::manifest::{write_manifest, ManifestBuilder};
use super::mask;
use super::segment_buffer::{SealedSegment, SegmentBuffer};

/// Monotonic refresh ticker, decoupled from frame-processing cadence and
/// testable without wall-clock sleeps. `due` reports at most once per period
/// and catches up past missed periods instead of bursting.
pub struct Ticker {
    period: Duration,
    next_due: Instant,
}

impl Ticker {
    pub fn new(period: Duration, now: Instant) -> Self {
        Self {
            period,
            next_due: now + period,
        }
    }

    pub fn due(&mut self, now: Instant) -> bool {
        if now < self.next_due {
            return false;
        }
        while self.next_due <= now {
            self.next_due += self.period;
        }
        true
    }
}

/// The producer: three lockstep frame sources, gaze-contingent masking,
/// per-layer segment buffers, and the layer-manifest refresh ticker.
pub async fn run_producer(
    cfg: Arc<StreamConfig>,
    state: Arc<StreamState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let layer_dir = cfg.layer_segment_dir();
    tokio::fs::create_dir_all(&layer_dir)
        .await
        .with_context(|| format!("creating {:?}", layer_dir))?;

    // Opening any rendition is a fatal startup error; mid-run exhaustion is not.
    let mut low_src = FrameSource::open(&cfg.rendition_path(LayerId::Low)).await?;
    let mut med_src = FrameSource::open(&cfg.rendition_path(LayerId::Med)).await?;
    let mut high_src = FrameSource::open(&cfg.rendition_path(LayerId::High)).await?;

    let high_dims = high_src.dimensions();
    let med_dims = med_src.dimensions();
    info!(
        "[STREAM] Video resolution: {}x{}",
        high_dims.0, high_dims.1
    );

    let mut gaze = GazeSource::new(high_dims, cfg.gaze_max_step, cfg.gaze_seed);
    let med_radius = mask::scale_radius(cfg.fovea_radius_med, high_dims, med_dims);

    let capacity = cfg.frames_per_segment();
    let mut low_buf = SegmentBuffer::new(LayerId::Low, capacity);
    let mut med_buf = SegmentBuffer::new(LayerId::Med, capacity);
    let mut high_buf = SegmentBuffer::new(LayerId::High, capacity);

    let mut trace: Vec<(u32, u32)> = Vec::with_capacity(capacity);
    let builder = ManifestBuilder::new();
    let period = Duration::from_secs(cfg.segment_duration_secs as u64);
    let mut ticker = Ticker::new(period, Instant::now());

    while !*shutdown.borrow() {
        // Lockstep read: one frame per layer per iteration, no overlap
        // between this frame's processing and the next read.
        let frames = (
            low_src.read_frame().await?,
            med_src.read_frame().await?,
            high_src.read_frame().await?,
        );
        let (Some(low_frame), Some(med_frame), Some(high_frame)) = frames else {
            warn!("[STREAM] Capture reached end of stream or stalled; pausing");
            tokio::select! {
                _ = shutdown.changed() => {}
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
            continue;
        };

        let gaze_pt = gaze.next();
        state.set_gaze(gaze_pt);
        trace.push(gaze_pt);

        // Low stays whole; med and high carry only their foveal disc.
        let masked_high = mask::apply_circular_mask(&high_frame, gaze_pt, cfg.fovea_radius_high)?;
        let med_center = mask::scale_center(gaze_pt, high_dims, med_dims);
        let masked_med = mask::apply_circular_mask(&med_frame, med_center, med_radius)?;

        let sealed_low = low_buf.append(low_frame);
        let sealed_med = med_buf.append(masked_med);
        let sealed_high = high_buf.append(masked_high);
        let seal_index = sealed_high.as_ref().map(|s| s.index);

        for sealed in [sealed_low, sealed_med, sealed_high].into_iter().flatten() {
            publish_segment(&sealed, cfg.fps, &layer_dir, &state).await;
        }

        // All three buffers share a capacity, so they seal on the same
        // iteration and the trace covers exactly one segment.
        if let Some(index) = seal_index {
            if cfg.gaze_log_enabled {
                if let Err(e) = gaze_log::write_gaze_log(&cfg.gaze_log_dir(), index, &trace) {
                    error!("[GAZE] Trace write failed: {:#}", e);
                }
            }
            trace.clear();
        }

        if ticker.due(Instant::now()) {
            refresh_layer_manifest(&builder, &cfg, &layer_dir);
        }
    }

    info!("[STREAM] Shutdown requested");
    if cfg.flush_partial_on_shutdown {
        for buffer in [&mut low_buf, &mut med_buf, &mut high_buf] {
            if let Some(sealed) = buffer.take_partial() {
                info!(
                    "[STREAM] Flushing partial {} segment {:04} ({} frames)",
                    sealed.layer.name(),
                    sealed.index,
                    sealed.frames.len()
                );
                publish_segment(&sealed, cfg.fps, &layer_dir, &state).await;
            }
        }
        refresh_layer_manifest(&builder, &cfg, &layer_dir);
    }

    low_src.release().await;
    med_src.release().await;
    high_src.release().await;
    Ok(())
}

/// Encoder failure skips this segment, never halts the pipeline.
async fn publish_segment(sealed: &SealedSegment, fps: u32, layer_dir: &Path, state: &StreamState) {
    match encoder::write_segment(sealed, fps, layer_dir).await {
        Ok(_) => state.record_published(sealed.layer),
        Err(e) => error!(
            "[ENCODE] {} segment {:04} failed, skipping: {:#}",
            sealed.layer.name(),
            sealed.index,
            e
        ),
    }
}

/// A manifest failure halts this refresh cycle only.
fn refresh_layer_manifest(builder: &ManifestBuilder, cfg: &StreamConfig, layer_dir: &Path) {
    let refreshed = builder
        .build_layer_manifest(layer_dir, &cfg.layers, cfg.fps, cfg.segment_duration_secs)
        .and_then(|doc| write_manifest(&doc, &cfg.layer_manifest_path()));
    match refreshed {
        Ok(path) => info!("[MANIFEST] Layer manifest refreshed: {:?}", path),
        Err(e) => error!("[MANIFEST] Refresh failed: {:#}", e),
    }
}

/// The consumer: wakes every segment duration, combines whatever triplets
/// became complete, and republishes the combined manifest.
pub async fn run_consumer(
    cfg: Arc<StreamConfig>,
    state: Arc<StreamState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let layer_dir = cfg.layer_segment_dir();
    let output_dir = cfg.combined_segment_dir();
    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("creating {:?}", output_dir))?;

    let target_dims = cfg.layer(LayerId::Low).dimensions();
    let builder = ManifestBuilder::new();
    let mut last_combined: i64 = -1;
    let mut interval =
        tokio::time::interval(Duration::from_secs(cfg.segment_duration_secs as u64));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {}
        }
        if *shutdown.borrow() {
            break;
        }

        match combiner::combine_available(&layer_dir, &output_dir, target_dims, cfg.fps, last_combined)
            .await
        {
            Ok(next) => {
                last_combined = next;
                state.set_combined((next + 1).max(0) as u64);
            }
            Err(e) => error!("[COMBINE] Pass failed: {:#}", e),
        }

        let republished = builder
            .build_combined_manifest(
                &output_dir,
                cfg.layer(LayerId::Low),
                cfg.fps,
                cfg.segment_duration_secs,
            )
            .and_then(|doc| write_manifest(&doc, &cfg.combined_manifest_path()));
        if let Err(e) = republished {
            error!("[MANIFEST] Combined refresh failed: {:#}", e);
        }
    }

    info!("[PLAYBACK] Shutdown requested");
    Ok(())
}
