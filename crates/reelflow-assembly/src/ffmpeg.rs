// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Locating and invoking the external concatenation tool.

use std::path::{Path, PathBuf};

use tracing::warn;

#[cfg(windows)]
const BINARY_NAME: &str = "ffmpeg.exe";
#[cfg(not(windows))]
const BINARY_NAME: &str = "ffmpeg";

/// Resolves the ffmpeg binary: `FFMPEG_PATH` environment override, then the
/// configured explicit path, then a bundled copy under the tools directory.
#[derive(Debug, Clone)]
pub struct FfmpegLocator {
    explicit: Option<PathBuf>,
    tools_dir: PathBuf,
}

impl FfmpegLocator {
    pub fn new(explicit: Option<PathBuf>, tools_dir: PathBuf) -> Self {
        Self { explicit, tools_dir }
    }

    /// The binary to invoke, or `None` when no copy is present and merges
    /// must degrade to the first-clip fallback.
    pub fn locate(&self) -> Option<PathBuf> {
        if let Some(from_env) = std::env::var_os("FFMPEG_PATH") {
            let path = PathBuf::from(from_env);
            if path.exists() {
                return Some(path);
            }
        }
        if let Some(explicit) = &self.explicit {
            if explicit.exists() {
                return Some(explicit.clone());
            }
        }
        let bundled = self.tools_dir.join(BINARY_NAME);
        if bundled.exists() {
            return Some(bundled);
        }
        None
    }
}

/// Render a concat-demuxer manifest. Paths are single-quoted with embedded
/// quotes escaped, and backslashes normalized, so arbitrary filenames survive.
pub(crate) fn build_manifest(inputs: &[PathBuf]) -> String {
    let mut manifest = String::new();
    for input in inputs {
        let normalized = input.to_string_lossy().replace('\\', "/");
        let escaped = normalized.replace('\'', "'\\''");
        manifest.push_str(&format!("file '{escaped}'\n"));
    }
    manifest
}

/// Invoke `ffmpeg -f concat -safe 0 -i <list> -c copy -y <output>`.
///
/// Returns `false` on any failure (spawn error, nonzero exit, manifest I/O);
/// the caller degrades to the fallback. The manifest file is removed
/// regardless of outcome.
pub(crate) async fn run_concat(binary: &Path, inputs: &[PathBuf], output: &Path) -> bool {
    let list_dir = output.parent().unwrap_or_else(|| Path::new("."));
    let entropy = uuid::Uuid::new_v4().simple().to_string();
    let list_path = list_dir.join(format!("concat_list_{}.txt", &entropy[..8]));

    if let Err(e) = tokio::fs::write(&list_path, build_manifest(inputs)).await {
        warn!(error = %e, "merge: cannot write concat manifest");
        return false;
    }

    let result = tokio::process::Command::new(binary)
        .arg("-f")
        .arg("concat")
        .arg("-safe")
        .arg("0")
        .arg("-i")
        .arg(&list_path)
        .arg("-c")
        .arg("copy")
        .arg("-y")
        .arg(output)
        .output()
        .await;

    let _ = tokio::fs::remove_file(&list_path).await;

    match result {
        Ok(out) if out.status.success() => true,
        Ok(out) => {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let tail: String = stderr
                .chars()
                .rev()
                .take(500)
                .collect::<String>()
                .chars()
                .rev()
                .collect();
            warn!(stderr = %tail, "merge: ffmpeg exited with failure");
            false
        }
        Err(e) => {
            warn!(error = %e, "merge: ffmpeg spawn error");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn manifest_quotes_and_escapes_paths() {
        let inputs = vec![
            PathBuf::from("/tmp/plain.mp4"),
            PathBuf::from("/tmp/with space.mp4"),
            PathBuf::from("/tmp/it's.mp4"),
        ];
        let manifest = build_manifest(&inputs);
        let lines: Vec<&str> = manifest.lines().collect();
        assert_eq!(lines[0], "file '/tmp/plain.mp4'");
        assert_eq!(lines[1], "file '/tmp/with space.mp4'");
        assert_eq!(lines[2], r"file '/tmp/it'\''s.mp4'");
    }

    #[test]
    fn locator_prefers_explicit_then_bundled() {
        let dir = tempdir().unwrap();
        let tools = dir.path().join("tools/ffmpeg");
        std::fs::create_dir_all(&tools).unwrap();

        // Nothing present: no binary.
        let locator = FfmpegLocator::new(None, tools.clone());
        if std::env::var_os("FFMPEG_PATH").is_none() {
            assert!(locator.locate().is_none());
        }

        // A bundled copy is found.
        let bundled = tools.join(BINARY_NAME);
        std::fs::write(&bundled, b"stub").unwrap();
        assert_eq!(locator.locate(), Some(bundled.clone()));

        // An existing explicit path wins over the bundled copy.
        let explicit = dir.path().join("custom-ffmpeg");
        std::fs::write(&explicit, b"stub").unwrap();
        let locator = FfmpegLocator::new(Some(explicit.clone()), tools.clone());
        assert_eq!(locator.locate(), Some(explicit));

        // A missing explicit path falls through to the bundled copy.
        let locator = FfmpegLocator::new(Some(dir.path().join("missing")), tools);
        assert_eq!(locator.locate(), Some(bundled));
    }

    #[tokio::test]
    async fn run_concat_fails_cleanly_on_bad_binary() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let inputs = vec![dir.path().join("a.mp4")];
        let bogus = dir.path().join("not-a-binary");
        assert!(!run_concat(&bogus, &inputs, &output).await);
        // Manifest was cleaned up.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("concat_list_"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
