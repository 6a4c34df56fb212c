// Filesystem-contract checks: the directory layout, manifest documents, and
// gaze traces a playback surface depends on, exercised through the public
// API without needing ffmpeg.

use chrono::{TimeZone, Utc};
use fovea_core::config::{LayerId, StreamConfig};
use fovea_core::pipeline::encoder::segment_file_name;
use fovea_core::pipeline::gaze_log;
use fovea_core::pipeline::manifest::{write_manifest, ManifestBuilder};
use std::path::Path;

fn scratch_config(tag: &str) -> StreamConfig {
    let root = std::env::temp_dir().join(format!("fovea_contract_{}", tag));
    let _ = std::fs::remove_dir_all(&root);
    StreamConfig {
        segments_root: root.join("segments"),
        renditions_dir: root.join("h264_outputs"),
        ..StreamConfig::default()
    }
}

fn touch(dir: &Path, name: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(name), b"").unwrap();
}

#[test]
fn manifests_land_at_the_advertised_paths() {
    let cfg = scratch_config("paths");
    let layer_dir = cfg.layer_segment_dir();
    for layer in LayerId::ALL {
        touch(&layer_dir, &segment_file_name(layer, 0));
        touch(&layer_dir, &segment_file_name(layer, 1));
    }

    let builder = ManifestBuilder::at(Utc.with_ymd_and_hms(2026, 8, 5, 9, 0, 0).unwrap());
    let doc = builder
        .build_layer_manifest(&layer_dir, &cfg.layers, cfg.fps, cfg.segment_duration_secs)
        .unwrap();
    write_manifest(&doc, &cfg.layer_manifest_path()).unwrap();

    let published = cfg.segments_root.join("manifest_layer.mpd");
    assert!(published.exists());
    let body = std::fs::read_to_string(&published).unwrap();
    // URLs are relative to the segment root, ordered by index.
    let first = body.find("segmented_video_layer/low_segment0000.mp4").unwrap();
    let second = body.find("segmented_video_layer/low_segment0001.mp4").unwrap();
    assert!(first < second);
    assert!(body.contains("type=\"dynamic\""));
}

#[test]
fn combined_manifest_advertises_the_low_resolution() {
    let cfg = scratch_config("combined");
    let combined_dir = cfg.combined_segment_dir();
    touch(&combined_dir, "segment_0000.mp4");

    let builder = ManifestBuilder::at(Utc.with_ymd_and_hms(2026, 8, 5, 9, 0, 0).unwrap());
    let doc = builder
        .build_combined_manifest(
            &combined_dir,
            cfg.layer(LayerId::Low),
            cfg.fps,
            cfg.segment_duration_secs,
        )
        .unwrap();
    write_manifest(&doc, &cfg.combined_manifest_path()).unwrap();

    let body = std::fs::read_to_string(cfg.segments_root.join("manifest.mpd")).unwrap();
    let low = cfg.layer(LayerId::Low);
    assert!(body.contains(&format!("width=\"{}\" height=\"{}\"", low.width, low.height)));
    assert!(body.contains("media=\"segmented_video/segment_0000.mp4\""));
}

#[test]
fn gaze_traces_live_under_the_segment_logs() {
    let cfg = scratch_config("gaze");
    let positions: Vec<(u32, u32)> = (0..cfg.frames_per_segment())
        .map(|i| (i as u32, i as u32 * 2))
        .collect();

    let path = gaze_log::write_gaze_log(&cfg.gaze_log_dir(), 7, &positions).unwrap();
    assert_eq!(
        path,
        cfg.segments_root
            .join("logs")
            .join("gaze_logs")
            .join("segment_0007.txt")
    );

    let loaded =
        gaze_log::read_gaze_log(&cfg.gaze_log_dir(), 7, cfg.fps, cfg.segment_duration_secs)
            .unwrap();
    assert_eq!(loaded, positions);
}
