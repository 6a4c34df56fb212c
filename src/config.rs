// FOVEA Stream Configuration
// Copyright (c) 2026 The FOVEA Project
//
// Every constant the reference experiment hard-coded (layer geometry, fovea
// radii, segment cadence, directory layout) lives here as owned, validated
// state so independent pipeline instances never share globals.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The three fixed output resolutions produced per input frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerId {
    Low,
    Med,
    High,
}

impl LayerId {
    pub const ALL: [LayerId; 3] = [LayerId::Low, LayerId::Med, LayerId::High];

    /// Short name used in segment file naming and manifest representation ids.
    pub fn name(self) -> &'static str {
        match self {
            LayerId::Low => "low",
            LayerId::Med => "med",
            LayerId::High => "high",
        }
    }
}

/// Static stream-representation metadata for one resolution layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerConfig {
    pub id: LayerId,
    pub width: u32,
    pub height: u32,
    /// Advertised bandwidth, e.g. "1500k". Also used as the encoder target.
    pub bitrate: String,
    /// Constant rate factor for the precompression pass.
    pub crf: u8,
}

impl LayerConfig {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Top-level configuration for both the producer and the consumer side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Master input video the three layer renditions are derived from.
    pub input_video: PathBuf,
    /// Root of the shared producer/consumer directory tree.
    pub segments_root: PathBuf,
    /// Where the precompressed per-layer renditions land.
    pub renditions_dir: PathBuf,
    pub fps: u32,
    pub segment_duration_secs: u32,
    /// Maximum per-axis gaze step between consecutive frames (pixels, high layer).
    pub gaze_max_step: i32,
    /// Fovea radius of the high-detail region, in high-layer pixels.
    pub fovea_radius_high: u32,
    /// Fovea radius of the medium-detail region, in high-layer pixels.
    /// Must be >= `fovea_radius_high` so the high region nests inside it.
    pub fovea_radius_med: u32,
    /// Publish a final undersized segment when the pipeline is torn down.
    pub flush_partial_on_shutdown: bool,
    /// Write per-segment gaze traces under `segments/logs/gaze_logs/`.
    pub gaze_log_enabled: bool,
    pub server_port: u16,
    pub launch_viewer: bool,
    /// Seed for the gaze random walk; None draws from entropy.
    pub gaze_seed: Option<u64>,
    pub layers: [LayerConfig; 3],
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            input_video: PathBuf::from("Assets/Snow.mp4"),
            segments_root: PathBuf::from("segments"),
            renditions_dir: PathBuf::from("h264_outputs"),
            fps: 30,
            segment_duration_secs: 2,
            gaze_max_step: 15,
            fovea_radius_high: 100,
            fovea_radius_med: 200,
            flush_partial_on_shutdown: false,
            gaze_log_enabled: true,
            server_port: 8080,
            launch_viewer: false,
            gaze_seed: None,
            layers: [
                LayerConfig {
                    id: LayerId::Low,
                    width: 480,
                    height: 270,
                    bitrate: "500k".to_string(),
                    crf: 50,
                },
                LayerConfig {
                    id: LayerId::Med,
                    width: 640,
                    height: 360,
                    bitrate: "1500k".to_string(),
                    crf: 30,
                },
                LayerConfig {
                    id: LayerId::High,
                    width: 1920,
                    height: 1080,
                    bitrate: "3000k".to_string(),
                    crf: 1,
                },
            ],
        }
    }
}

impl StreamConfig {
    /// Load a JSON config file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {:?}", path))?;
        let cfg: StreamConfig =
            serde_json::from_str(&raw).with_context(|| format!("parsing config {:?}", path))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 || self.segment_duration_secs == 0 {
            bail!("fps and segment_duration_secs must be non-zero");
        }
        for layer in &self.layers {
            if layer.width == 0 || layer.height == 0 {
                bail!("layer {} has a zero dimension", layer.id.name());
            }
        }
        for (slot, id) in LayerId::ALL.iter().enumerate() {
            if self.layers[slot].id != *id {
                bail!("layers must be ordered low, med, high");
            }
        }
        // Concentric foveation: the high-detail disc must never extend beyond
        // the medium disc it is nested within.
        if self.fovea_radius_high > self.fovea_radius_med {
            bail!(
                "fovea_radius_high ({}) exceeds fovea_radius_med ({})",
                self.fovea_radius_high,
                self.fovea_radius_med
            );
        }
        Ok(())
    }

    pub fn layer(&self, id: LayerId) -> &LayerConfig {
        match id {
            LayerId::Low => &self.layers[0],
            LayerId::Med => &self.layers[1],
            LayerId::High => &self.layers[2],
        }
    }

    /// Segment capacity in frames. Index assignment happens only when a
    /// buffer reaches exactly this many frames.
    pub fn frames_per_segment(&self) -> usize {
        (self.fps * self.segment_duration_secs) as usize
    }

    // Directory contract shared with the static file server and the player.

    pub fn layer_segment_dir(&self) -> PathBuf {
        self.segments_root.join("segmented_video_layer")
    }

    pub fn combined_segment_dir(&self) -> PathBuf {
        self.segments_root.join("segmented_video")
    }

    pub fn gaze_log_dir(&self) -> PathBuf {
        self.segments_root.join("logs").join("gaze_logs")
    }

    pub fn layer_manifest_path(&self) -> PathBuf {
        self.segments_root.join("manifest_layer.mpd")
    }

    pub fn combined_manifest_path(&self) -> PathBuf {
        self.segments_root.join("manifest.mpd")
    }

    pub fn rendition_path(&self, id: LayerId) -> PathBuf {
        self.renditions_dir.join(format!("{}_res.mp4", id.name()))
    }
}
