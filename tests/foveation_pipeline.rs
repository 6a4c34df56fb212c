// End-to-end pipeline checks against a real ffmpeg binary. Skipped (with a
// note) when ffmpeg/ffprobe are not installed.

use fovea_core::config::LayerId;
use fovea_core::pipeline::combiner;
use fovea_core::pipeline::encoder;
use fovea_core::pipeline::frame_source::{probe_dimensions, FrameSource};
use fovea_core::pipeline::manifest::list_segment_files;
use fovea_core::pipeline::mask;
use fovea_core::pipeline::segment_buffer::SegmentBuffer;
use fovea_core::pipeline::Frame;
use image::Rgb;
use std::path::PathBuf;
use std::process::Command;

// Scaled-down layer geometry (same 16:9 shape, 1/10 of the reference
// resolutions) keeps the encode fast without changing any ratios.
const LOW: (u32, u32) = (64, 36);
const MED: (u32, u32) = (96, 54);
const HIGH: (u32, u32) = (192, 108);
const FPS: u32 = 30;
const CAPACITY: usize = 60; // fps * 2s

fn ffmpeg_available() -> bool {
    let ok = |cmd: &str| {
        Command::new(cmd)
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    };
    ok("ffmpeg") && ok("ffprobe")
}

fn scratch(tag: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!("fovea_e2e_{}", tag));
    let _ = std::fs::remove_dir_all(&root);
    std::fs::create_dir_all(&root).unwrap();
    root
}

fn solid(dims: (u32, u32), rgb: [u8; 3]) -> Frame {
    Frame::from_pixel(dims.0, dims.1, Rgb(rgb))
}

/// One iteration of producer-side frame synthesis: low stays whole, med and
/// high carry their foveal disc around a fixed gaze point.
fn layer_frames(gaze: (u32, u32)) -> (Frame, Frame, Frame) {
    let high_radius = 30;
    let med_radius = mask::scale_radius(60, HIGH, MED);

    let low = solid(LOW, [10, 10, 220]);
    let med = mask::apply_circular_mask(
        &solid(MED, [180, 180, 20]),
        mask::scale_center(gaze, HIGH, MED),
        med_radius,
    )
    .unwrap();
    let high = mask::apply_circular_mask(&solid(HIGH, [220, 30, 30]), gaze, high_radius).unwrap();
    (low, med, high)
}

#[tokio::test]
async fn sixty_frames_yield_one_triplet_and_one_combined_segment() {
    if !ffmpeg_available() {
        eprintln!("ffmpeg/ffprobe not installed; skipping");
        return;
    }
    let root = scratch("triplet");
    let layer_dir = root.join("segmented_video_layer");
    let output_dir = root.join("segmented_video");

    let mut low_buf = SegmentBuffer::new(LayerId::Low, CAPACITY);
    let mut med_buf = SegmentBuffer::new(LayerId::Med, CAPACITY);
    let mut high_buf = SegmentBuffer::new(LayerId::High, CAPACITY);
    let gaze = (HIGH.0 / 2, HIGH.1 / 2);

    let mut sealed = Vec::new();
    for _ in 0..CAPACITY {
        let (low, med, high) = layer_frames(gaze);
        for seg in [
            low_buf.append(low),
            med_buf.append(med),
            high_buf.append(high),
        ]
        .into_iter()
        .flatten()
        {
            sealed.push(seg);
        }
    }
    assert_eq!(sealed.len(), 3, "each buffer seals exactly once");

    for seg in &sealed {
        encoder::write_segment(seg, FPS, &layer_dir).await.unwrap();
    }
    for layer in LayerId::ALL {
        assert_eq!(
            list_segment_files(&layer_dir, &format!("{}_segment", layer.name())),
            vec![format!("{}_segment0000.mp4", layer.name())],
            "exactly one index-0000 segment for {}",
            layer.name()
        );
    }

    let last = combiner::combine_available(&layer_dir, &output_dir, LOW, FPS, -1)
        .await
        .unwrap();
    assert_eq!(last, 0);

    let combined = output_dir.join("segment_0000.mp4");
    assert!(combined.exists());
    assert_eq!(probe_dimensions(&combined).await.unwrap(), LOW);

    // Priority compositing survives the encode: the gaze center comes from
    // the high (red) layer, the far corner from the unmasked low (blue) one.
    let mut src = FrameSource::open(&combined).await.unwrap();
    let frame = src.read_frame().await.unwrap().expect("combined frame");
    src.release().await;

    let center = frame.get_pixel(LOW.0 / 2, LOW.1 / 2);
    assert!(
        center[0] > 120 && center[2] < 100,
        "gaze center should be high-layer red, got {:?}",
        center
    );
    let corner = frame.get_pixel(2, 2);
    assert!(
        corner[2] > 120 && corner[0] < 100,
        "corner should be low-layer blue, got {:?}",
        corner
    );
}

#[tokio::test]
async fn recombination_is_idempotent_and_defers_on_missing_siblings() {
    if !ffmpeg_available() {
        eprintln!("ffmpeg/ffprobe not installed; skipping");
        return;
    }
    let root = scratch("idempotent");
    let layer_dir = root.join("segmented_video_layer");
    let output_dir = root.join("segmented_video");

    let gaze = (HIGH.0 / 2, HIGH.1 / 2);
    for layer in LayerId::ALL {
        let frames: Vec<Frame> = (0..10)
            .map(|_| {
                let (low, med, high) = layer_frames(gaze);
                match layer {
                    LayerId::Low => low,
                    LayerId::Med => med,
                    LayerId::High => high,
                }
            })
            .collect();
        encoder::write_frames(
            &frames,
            FPS,
            &layer_dir,
            &encoder::segment_file_name(layer, 0),
        )
        .await
        .unwrap();
    }

    let last = combiner::combine_available(&layer_dir, &output_dir, LOW, FPS, -1)
        .await
        .unwrap();
    assert_eq!(last, 0);
    let combined = output_dir.join("segment_0000.mp4");
    let mtime = std::fs::metadata(&combined).unwrap().modified().unwrap();

    // Re-running over the same complete set rewrites nothing.
    let again = combiner::combine_available(&layer_dir, &output_dir, LOW, FPS, -1)
        .await
        .unwrap();
    assert_eq!(again, 0);
    assert_eq!(
        std::fs::metadata(&combined).unwrap().modified().unwrap(),
        mtime
    );

    // Index 1 exists for low and med only: no segment_0001, index unchanged.
    for layer in [LayerId::Low, LayerId::Med] {
        let frames: Vec<Frame> = (0..10)
            .map(|_| {
                let (low, med, _) = layer_frames(gaze);
                match layer {
                    LayerId::Med => med,
                    _ => low,
                }
            })
            .collect();
        encoder::write_frames(
            &frames,
            FPS,
            &layer_dir,
            &encoder::segment_file_name(layer, 1),
        )
        .await
        .unwrap();
    }
    let deferred = combiner::combine_available(&layer_dir, &output_dir, LOW, FPS, 0)
        .await
        .unwrap();
    assert_eq!(deferred, 0);
    assert!(!output_dir.join("segment_0001.mp4").exists());
}
