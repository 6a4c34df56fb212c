// FOVEA Gaze Trace Logs
// Copyright (c) 2026 The FOVEA Project
//
// Optional per-segment record of the simulated gaze trajectory. One file per
// segment index, a header line, then `frame_index, x, y` per frame. Readers
// must reject a file whose line count does not match fps * segment_duration.

use anyhow::{bail, Context, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

pub fn gaze_log_file_name(segment_index: u64) -> String {
    format!("segment_{:04}.txt", segment_index)
}

/// Write the trace for one segment. Published atomically like every other
/// artifact in the segment tree, so a reader never sees a short file mid-write.
pub fn write_gaze_log(
    log_dir: &Path,
    segment_index: u64,
    positions: &[(u32, u32)],
) -> Result<PathBuf> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating gaze log directory {:?}", log_dir))?;

    let mut body = String::from("Frame, Gaze_X, Gaze_Y\n");
    for (frame_index, (x, y)) in positions.iter().enumerate() {
        let _ = writeln!(body, "{}, {}, {}", frame_index, x, y);
    }

    let file_name = gaze_log_file_name(segment_index);
    let temp_path = log_dir.join(format!(".tmp_{}", file_name));
    let final_path = log_dir.join(&file_name);
    std::fs::write(&temp_path, &body)
        .with_context(|| format!("writing gaze log {:?}", temp_path))?;
    std::fs::rename(&temp_path, &final_path)
        .with_context(|| format!("publishing gaze log {:?}", final_path))?;

    info!("[GAZE] Trace saved: {:?}", final_path);
    Ok(final_path)
}

/// Load and validate the trace for one segment. Any shortfall, overrun, or
/// malformed line is a hard error for this read; the feature is auxiliary
/// and the caller may simply not ask.
pub fn read_gaze_log(
    log_dir: &Path,
    segment_index: u64,
    fps: u32,
    segment_duration_secs: u32,
) -> Result<Vec<(u32, u32)>> {
    let path = log_dir.join(gaze_log_file_name(segment_index));
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("gaze log {:?} not readable", path))?;

    let mut positions = Vec::new();
    for (line_no, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("Frame") {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 3 {
            bail!("gaze log {:?} line {} is malformed: {:?}", path, line_no + 1, line);
        }
        let x: u32 = fields[1]
            .parse()
            .with_context(|| format!("gaze log {:?} line {}: bad x", path, line_no + 1))?;
        let y: u32 = fields[2]
            .parse()
            .with_context(|| format!("gaze log {:?} line {}: bad y", path, line_no + 1))?;
        positions.push((x, y));
    }

    let expected = (fps * segment_duration_secs) as usize;
    if positions.len() != expected {
        bail!(
            "gaze log {:?} is incomplete: expected {} frames, found {}",
            path,
            expected,
            positions.len()
        );
    }
    Ok(positions)
}
