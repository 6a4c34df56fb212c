// FOVEA Viewer Launcher
// Copyright (c) 2026 The FOVEA Project
//
// One-shot external browser launch against the player URL. The viewer's only
// contract with the core is reading the manifest and segment files over the
// playback server; teardown happens exactly once no matter how many callers
// race the shutdown path.

use anyhow::{Context, Result};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::info;

pub struct Viewer {
    child: Mutex<Option<Child>>,
}

/// `$BROWSER` wins; otherwise fall back to the platform's URL opener.
fn browser_command() -> String {
    std::env::var("BROWSER").unwrap_or_else(|_| {
        if cfg!(target_os = "macos") {
            "open".to_string()
        } else if cfg!(target_os = "windows") {
            "explorer".to_string()
        } else {
            "xdg-open".to_string()
        }
    })
}

impl Viewer {
    pub fn launch(url: &str) -> Result<Self> {
        let command = browser_command();
        let child = Command::new(&command)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("launching viewer via '{}'", command))?;

        info!("[VIEWER] Launched '{}' -> {}", command, url);
        Ok(Self {
            child: Mutex::new(Some(child)),
        })
    }

    /// Idempotent: the first caller tears the process down, later callers
    /// find nothing left to do.
    pub async fn close(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.kill().await;
            info!("[VIEWER] Closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_browser_command_is_always_available() {
        assert!(!browser_command().is_empty());
    }
}
