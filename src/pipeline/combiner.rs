// FOVEA Segment Combiner
// Copyright (c) 2026 The FOVEA Project
//
// Consumer side: discovers complete segment triplets in the layer directory,
// aligns all three resolutions to the low layer's dimensions, composites by
// resolution priority, and publishes the result as a combined segment. A
// missing sibling file is "not yet produced", never an error; because the
// producer publishes atomically, a visible filename is always fully readable.

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::config::LayerId;

use super::encoder::{self, combined_file_name, segment_file_name};
use super::frame_source::FrameSource;
use super::manifest::list_segment_files;
use super::mask::composite_priority;
use super::Frame;

/// Number of indices present in all three layers: the minimum per-layer
/// segment count.
pub fn count_complete_triplets(layer_dir: &Path) -> u64 {
    LayerId::ALL
        .iter()
        .map(|id| list_segment_files(layer_dir, &format!("{}_segment", id.name())).len() as u64)
        .min()
        .unwrap_or(0)
}

/// The three per-layer paths for one segment index, low/med/high order.
pub fn triplet_paths(layer_dir: &Path, index: u64) -> [PathBuf; 3] {
    [
        layer_dir.join(segment_file_name(LayerId::Low, index)),
        layer_dir.join(segment_file_name(LayerId::Med, index)),
        layer_dir.join(segment_file_name(LayerId::High, index)),
    ]
}

/// One discovery-and-combine pass. Combines every index in
/// `(last_combined_index, available)` whose output is not already present,
/// and returns the new last combined index. Stops early, without error, at
/// the first index whose triplet is incomplete; an error while combining one
/// segment ends the pass and the index is retried on the next cycle.
pub async fn combine_available(
    layer_dir: &Path,
    output_dir: &Path,
    target_dims: (u32, u32),
    fps: u32,
    last_combined_index: i64,
) -> Result<i64> {
    let available = count_complete_triplets(layer_dir) as i64;
    let mut last = last_combined_index;

    for index in (last_combined_index + 1)..available {
        let index_u = index as u64;
        let out_path = output_dir.join(combined_file_name(index_u));
        if out_path.exists() {
            // Combined segments are immutable once written.
            last = index;
            continue;
        }

        let paths = triplet_paths(layer_dir, index_u);
        if let Some(missing) = paths.iter().find(|p| !p.exists()) {
            info!(
                "[COMBINE] Segment {:04} not yet produced ({:?} missing); deferring",
                index_u,
                missing.file_name().unwrap_or_default()
            );
            break;
        }

        info!("[COMBINE] Combining segment {:04}...", index_u);
        match combine_segment(&paths, target_dims, fps, output_dir, index_u).await {
            Ok(path) => {
                info!("[COMBINE] Segment saved: {:?}", path);
                last = index;
            }
            Err(e) => {
                error!("[COMBINE] Segment {:04} failed: {:#}", index_u, e);
                break;
            }
        }
    }

    Ok(last)
}

/// Decode one triplet in lockstep, align to the target dimensions, composite
/// by priority, and encode the result atomically.
async fn combine_segment(
    paths: &[PathBuf; 3],
    target_dims: (u32, u32),
    fps: u32,
    output_dir: &Path,
    index: u64,
) -> Result<PathBuf> {
    let mut low = FrameSource::open(&paths[0]).await?;
    let mut med = FrameSource::open(&paths[1]).await?;
    let mut high = FrameSource::open(&paths[2]).await?;

    let mut triples: Vec<(Frame, Frame, Frame)> = Vec::new();
    loop {
        let l = low.read_frame().await?;
        let m = med.read_frame().await?;
        let h = high.read_frame().await?;
        match (l, m, h) {
            (Some(l), Some(m), Some(h)) => triples.push((l, m, h)),
            // The shortest stream bounds the combined segment.
            _ => break,
        }
    }
    low.release().await;
    med.release().await;
    high.release().await;

    let (width, height) = target_dims;
    let frames = triples
        .into_par_iter()
        .map(|(l, m, h)| {
            let l = align(l, width, height);
            let m = align(m, width, height);
            let h = align(h, width, height);
            composite_priority(&l, &m, &h)
        })
        .collect::<Result<Vec<Frame>>>()
        .with_context(|| format!("compositing segment {:04}", index))?;

    encoder::write_frames(&frames, fps, output_dir, &combined_file_name(index)).await
}

fn align(frame: Frame, width: u32, height: u32) -> Frame {
    if frame.dimensions() == (width, height) {
        frame
    } else {
        imageops::resize(&frame, width, height, FilterType::Triangle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(tag: &str) -> (PathBuf, PathBuf) {
        let root = std::env::temp_dir().join(format!("fovea_combiner_{}", tag));
        let _ = std::fs::remove_dir_all(&root);
        let layer_dir = root.join("segmented_video_layer");
        let output_dir = root.join("segmented_video");
        std::fs::create_dir_all(&layer_dir).unwrap();
        std::fs::create_dir_all(&output_dir).unwrap();
        (layer_dir, output_dir)
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    fn touch_triplet(layer_dir: &Path, index: u64) {
        for layer in LayerId::ALL {
            touch(layer_dir, &segment_file_name(layer, index));
        }
    }

    #[test]
    fn triplet_count_is_the_minimum_over_layers() {
        let (layer_dir, _) = scratch("count");
        touch_triplet(&layer_dir, 0);
        touch_triplet(&layer_dir, 1);
        touch(&layer_dir, &segment_file_name(LayerId::Low, 2));
        touch(&layer_dir, &segment_file_name(LayerId::Med, 2));
        // high_segment0002.mp4 absent
        assert_eq!(count_complete_triplets(&layer_dir), 2);
    }

    #[tokio::test]
    async fn already_combined_indices_are_skipped_untouched() {
        let (layer_dir, output_dir) = scratch("skip");
        for index in 0..3 {
            touch_triplet(&layer_dir, index);
            touch(&output_dir, &combined_file_name(index));
        }
        let before: Vec<_> = list_segment_files(&output_dir, "segment_");

        let last = combine_available(&layer_dir, &output_dir, (480, 270), 30, -1)
            .await
            .unwrap();

        assert_eq!(last, 2);
        assert_eq!(list_segment_files(&output_dir, "segment_"), before);
    }

    #[tokio::test]
    async fn missing_sibling_defers_without_error() {
        let (layer_dir, output_dir) = scratch("defer");
        for index in 0..5 {
            touch_triplet(&layer_dir, index);
            touch(&output_dir, &combined_file_name(index));
        }
        // Index 5 exists for low and med only; the count says 5 triplets, so
        // index 5 is out of range and nothing new is attempted.
        touch(&layer_dir, &segment_file_name(LayerId::Low, 5));
        touch(&layer_dir, &segment_file_name(LayerId::Med, 5));

        let last = combine_available(&layer_dir, &output_dir, (480, 270), 30, 4)
            .await
            .unwrap();

        assert_eq!(last, 4);
        assert!(!output_dir.join(combined_file_name(5)).exists());
    }

    #[tokio::test]
    async fn gap_in_one_layer_stops_the_pass_at_the_gap() {
        let (layer_dir, output_dir) = scratch("gap");
        touch_triplet(&layer_dir, 0);
        touch(&output_dir, &combined_file_name(0));
        // Counts say two triplets, but the high layer's second file is index
        // 2, leaving index 1 incomplete.
        touch(&layer_dir, &segment_file_name(LayerId::Low, 1));
        touch(&layer_dir, &segment_file_name(LayerId::Med, 1));
        touch(&layer_dir, &segment_file_name(LayerId::High, 2));

        let last = combine_available(&layer_dir, &output_dir, (480, 270), 30, -1)
            .await
            .unwrap();

        assert_eq!(last, 0);
        assert!(!output_dir.join(combined_file_name(1)).exists());
    }

    #[tokio::test]
    async fn empty_layer_directory_is_a_no_op() {
        let (layer_dir, output_dir) = scratch("empty");
        let last = combine_available(&layer_dir, &output_dir, (480, 270), 30, -1)
            .await
            .unwrap();
        assert_eq!(last, -1);
        assert!(list_segment_files(&output_dir, "segment_").is_empty());
    }
}
