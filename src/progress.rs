//! Progress extraction from the status files written by the wrapped tool.
//!
//! Jobs report progress through two append-only text files. The search
//! stage file yields whole-percentage steps (`percent (step/total)`), the
//! synthesis stage file a plain percentage that is scaled down to the
//! fraction of one search step. The last matching line wins, so pollers
//! always see the most recent figure.

use std::path::Path;

use regex::Regex;
use serde::Deserialize;

/// How a job's progress files are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressMode {
    /// Search stage plus a scaled synthesis remainder (frequency search flows).
    #[default]
    FmaxSearch,
    /// Single progress file, plain percentage (simulation flows).
    Single,
}

/// Caller-supplied line patterns for the two stages.
#[derive(Debug, Clone)]
pub struct ProgressPatterns {
    /// Matches search-stage lines: captures percent, step, total steps.
    pub search: Regex,
    /// Matches synthesis-stage lines: captures percent.
    pub synth: Regex,
}

impl Default for ProgressPatterns {
    fn default() -> Self {
        Self {
            // Unwraps are on literals checked by the pattern tests below.
            search: Regex::new(r"(.*): ([0-9]+)% \(([0-9]+)/([0-9]+)\)(.*)").unwrap(),
            synth: Regex::new(r"(.*): ([0-9]+)%(.*)").unwrap(),
        }
    }
}

impl ProgressPatterns {
    /// Compute a job's progress in percent, clamped to [0, 100].
    ///
    /// A missing file or a file with no matching line contributes 0.
    pub fn progress(&self, mode: ProgressMode, status_file: &Path, progress_file: &Path) -> f64 {
        let progress = match mode {
            ProgressMode::Single => last_synth_percent(&self.synth, progress_file),
            ProgressMode::FmaxSearch => {
                let (search_percent, total_steps) = last_search_match(&self.search, status_file);
                let synth_percent = last_synth_percent(&self.synth, progress_file);
                if total_steps != 0 {
                    search_percent + synth_percent / total_steps as f64
                } else {
                    synth_percent
                }
            }
        };
        progress.clamp(0.0, 100.0)
    }
}

/// Last matching `(percent, total_steps)` in the search-stage file, or `(0, 1)`.
fn last_search_match(pattern: &Regex, path: &Path) -> (f64, u64) {
    let mut percent = 0.0;
    let mut total_steps = 1;
    if let Ok(content) = std::fs::read_to_string(path) {
        for line in content.lines() {
            if let Some(caps) = pattern.captures(line) {
                if caps.len() >= 5 {
                    if let (Some(p), Some(t)) = (caps.get(2), caps.get(4)) {
                        percent = p.as_str().parse().unwrap_or(0.0);
                        total_steps = t.as_str().parse().unwrap_or(1);
                    }
                }
            }
        }
    }
    (percent, total_steps)
}

/// Last matching percentage in the synthesis-stage file, or 0.
fn last_synth_percent(pattern: &Regex, path: &Path) -> f64 {
    let mut percent = 0.0;
    if let Ok(content) = std::fs::read_to_string(path) {
        for line in content.lines() {
            if let Some(caps) = pattern.captures(line) {
                if let Some(p) = caps.get(2) {
                    percent = p.as_str().parse().unwrap_or(0.0);
                }
            }
        }
    }
    percent
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn missing_files_yield_zero() {
        let patterns = ProgressPatterns::default();
        let progress = patterns.progress(
            ProgressMode::FmaxSearch,
            Path::new("/nonexistent/status.log"),
            Path::new("/nonexistent/progress.log"),
        );
        assert_eq!(progress, 0.0);
    }

    #[test]
    fn no_matching_line_yields_zero() {
        let dir = tempfile::tempdir().unwrap();
        let progress_file = write_file(&dir, "progress.log", "tool banner\nno percentages here\n");
        let patterns = ProgressPatterns::default();
        let progress =
            patterns.progress(ProgressMode::Single, Path::new("/nonexistent"), &progress_file);
        assert_eq!(progress, 0.0);
    }

    #[test]
    fn single_mode_takes_last_match() {
        let dir = tempfile::tempdir().unwrap();
        let progress_file = write_file(
            &dir,
            "progress.log",
            "sim: 10%\nsim: 25%\nsim: 80%\n",
        );
        let patterns = ProgressPatterns::default();
        let progress =
            patterns.progress(ProgressMode::Single, Path::new("/nonexistent"), &progress_file);
        assert_eq!(progress, 80.0);
    }

    #[test]
    fn fmax_mode_combines_both_stages() {
        let dir = tempfile::tempdir().unwrap();
        let status_file = write_file(&dir, "status.log", "search: 40% (2/5)\n");
        let progress_file = write_file(&dir, "progress.log", "synth: 50%\n");
        let patterns = ProgressPatterns::default();
        let progress = patterns.progress(ProgressMode::FmaxSearch, &status_file, &progress_file);
        // 40 whole points plus 50% of one of 5 steps
        assert_eq!(progress, 50.0);
    }

    #[test]
    fn progress_is_clamped_to_100() {
        let dir = tempfile::tempdir().unwrap();
        let status_file = write_file(&dir, "status.log", "search: 99% (9/2)\n");
        let progress_file = write_file(&dir, "progress.log", "synth: 90%\n");
        let patterns = ProgressPatterns::default();
        let progress = patterns.progress(ProgressMode::FmaxSearch, &status_file, &progress_file);
        assert_eq!(progress, 100.0);
    }

    #[test]
    fn zero_total_steps_falls_back_to_synth_percent() {
        let dir = tempfile::tempdir().unwrap();
        let status_file = write_file(&dir, "status.log", "search: 10% (0/0)\n");
        let progress_file = write_file(&dir, "progress.log", "synth: 30%\n");
        let patterns = ProgressPatterns::default();
        let progress = patterns.progress(ProgressMode::FmaxSearch, &status_file, &progress_file);
        assert_eq!(progress, 30.0);
    }
}
