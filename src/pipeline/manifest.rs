// FOVEA Manifest Builder
// Copyright (c) 2026 The FOVEA Project
//
// Serializes the DASH MPD snapshot a playback surface polls. The document is
// a replaceable snapshot: every build lists the segment directory from
// scratch, because a consumer may prune files between cycles. Timestamps are
// captured once per builder, so rebuilding over an unchanged tree yields a
// byte-identical document.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::LayerConfig;

/// True for exactly `{prefix}NNNN.mp4` with a zero-padded width-4 index.
/// Hidden temp files (`.tmp_*`) never match.
fn matches_segment(name: &str, prefix: &str) -> bool {
    let Some(rest) = name.strip_prefix(prefix) else {
        return false;
    };
    let Some(digits) = rest.strip_suffix(".mp4") else {
        return false;
    };
    digits.len() == 4 && digits.bytes().all(|b| b.is_ascii_digit())
}

/// List segment files under `dir` matching `prefix`, sorted lexicographically
/// (equivalent to numeric order given the fixed-width indices). A directory
/// that does not exist yet simply has no segments.
pub fn list_segment_files(dir: &Path, prefix: &str) -> Vec<String> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let mut names: Vec<String> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| matches_segment(name, prefix))
        .collect();
    names.sort();
    names
}

pub struct ManifestBuilder {
    availability_start: DateTime<Utc>,
}

impl Default for ManifestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Pin the availability/publish timestamps, mainly for tests.
    pub fn at(availability_start: DateTime<Utc>) -> Self {
        Self { availability_start }
    }

    /// One adaptation set + representation per layer, each with its own
    /// segment list scanned from `segment_dir`.
    pub fn build_layer_manifest(
        &self,
        segment_dir: &Path,
        layers: &[LayerConfig],
        fps: u32,
        segment_duration_secs: u32,
    ) -> Result<String> {
        let url_base = dir_url_base(segment_dir)?;
        let mut doc = self.open_document();
        for layer in layers {
            let files = list_segment_files(segment_dir, &format!("{}_segment", layer.id.name()));
            self.push_representation(
                &mut doc,
                layer.id.name(),
                layer,
                fps,
                segment_duration_secs,
                &url_base,
                &files,
            );
        }
        self.close_document(&mut doc);
        Ok(doc)
    }

    /// Single representation at the combined output's resolution.
    pub fn build_combined_manifest(
        &self,
        segment_dir: &Path,
        output_layer: &LayerConfig,
        fps: u32,
        segment_duration_secs: u32,
    ) -> Result<String> {
        let url_base = dir_url_base(segment_dir)?;
        let files = list_segment_files(segment_dir, "segment_");
        let mut doc = self.open_document();
        self.push_representation(
            &mut doc,
            "1",
            output_layer,
            fps,
            segment_duration_secs,
            &url_base,
            &files,
        );
        self.close_document(&mut doc);
        Ok(doc)
    }

    fn open_document(&self) -> String {
        let ts = self
            .availability_start
            .to_rfc3339_opts(SecondsFormat::Micros, true);
        let mut doc = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        let _ = writeln!(
            doc,
            "<MPD xmlns=\"urn:mpeg:dash:schema:mpd:2011\" \
             profiles=\"urn:mpeg:dash:profile:isoff-on-demand:2011\" \
             type=\"dynamic\" minBufferTime=\"PT1.5S\" \
             availabilityStartTime=\"{ts}\" publishTime=\"{ts}\">"
        );
        doc.push_str("  <Period id=\"1\" start=\"PT0S\">\n");
        doc
    }

    #[allow(clippy::too_many_arguments)]
    fn push_representation(
        &self,
        doc: &mut String,
        id: &str,
        layer: &LayerConfig,
        fps: u32,
        segment_duration_secs: u32,
        url_base: &str,
        files: &[String],
    ) {
        let _ = writeln!(
            doc,
            "    <AdaptationSet mimeType=\"video/mp4\" codecs=\"avc1.42E01E\" \
             width=\"{w}\" height=\"{h}\" frameRate=\"{fps}\" bandwidth=\"{bw}\">",
            w = layer.width,
            h = layer.height,
            bw = layer.bitrate,
        );
        let _ = writeln!(
            doc,
            "      <Representation id=\"{id}\" bandwidth=\"{bw}\" width=\"{w}\" \
             height=\"{h}\" frameRate=\"{fps}\">",
            bw = layer.bitrate,
            w = layer.width,
            h = layer.height,
        );
        let _ = writeln!(
            doc,
            "        <SegmentList timescale=\"{fps}\" duration=\"{}\">",
            fps * segment_duration_secs
        );
        for file in files {
            let _ = writeln!(
                doc,
                "          <SegmentURL media=\"{url_base}/{file}\"/>"
            );
        }
        doc.push_str("        </SegmentList>\n");
        doc.push_str("      </Representation>\n");
        doc.push_str("    </AdaptationSet>\n");
    }

    fn close_document(&self, doc: &mut String) {
        doc.push_str("  </Period>\n");
        doc.push_str("</MPD>\n");
    }
}

/// Segment URLs are relative to the segment root, prefixed with the
/// directory's own name (`segmented_video_layer/...`).
fn dir_url_base(segment_dir: &Path) -> Result<String> {
    segment_dir
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("segment directory {:?} has no usable name", segment_dir))
}

/// Atomic manifest publication: temp file in the same directory, then rename.
pub fn write_manifest(content: &str, path: &Path) -> Result<PathBuf> {
    let dir = path
        .parent()
        .with_context(|| format!("manifest path {:?} has no parent", path))?;
    std::fs::create_dir_all(dir).with_context(|| format!("creating {:?}", dir))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("manifest path {:?} has no file name", path))?;
    let temp_path = dir.join(format!(".tmp_{}", file_name));
    std::fs::write(&temp_path, content)
        .with_context(|| format!("writing manifest {:?}", temp_path))?;
    std::fs::rename(&temp_path, path)
        .with_context(|| format!("publishing manifest {:?}", path))?;
    Ok(path.to_path_buf())
}
