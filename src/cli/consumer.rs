//! Capture consumer
//!
//! Host side of the event channel: rebuilds the image from pixel-run batches,
//! writes each completed page as PNG, and records operator messages.

use crate::core::events::CaptureEvent;
use crate::core::logger::{OperatorLog, Severity};
use crate::core::raster::{Palette, Raster, DEFAULT_PALETTE};
use chrono::{DateTime, Local};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Turns [`CaptureEvent`]s into saved images
#[derive(Debug)]
pub struct CaptureConsumer {
    raster: Raster,
    palette: Palette,
    output_dir: PathBuf,
    prefix: String,
    log: OperatorLog,
    saved: Vec<PathBuf>,
    page_open: bool,
    last_status: String,
    bell: bool,
    echo: bool,
}

impl CaptureConsumer {
    /// Write pages into `output_dir` as `<prefix>-<timestamp>.png`
    pub fn new(output_dir: impl Into<PathBuf>, prefix: &str) -> Self {
        Self {
            raster: Raster::scope(),
            palette: DEFAULT_PALETTE,
            output_dir: output_dir.into(),
            prefix: prefix.to_string(),
            log: OperatorLog::new(),
            saved: Vec::new(),
            page_open: false,
            last_status: String::new(),
            bell: false,
            echo: false,
        }
    }

    /// Ring the terminal bell on capture errors
    #[must_use]
    pub fn with_bell(mut self, bell: bool) -> Self {
        self.bell = bell;
        self
    }

    /// Print operator messages to stderr as they arrive
    #[must_use]
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Operator log, for mirroring to a file
    pub fn log_mut(&mut self) -> &mut OperatorLog {
        &mut self.log
    }

    /// Operator log
    pub fn log(&self) -> &OperatorLog {
        &self.log
    }

    /// Surface being assembled
    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    /// Files written so far
    pub fn saved(&self) -> &[PathBuf] {
        &self.saved
    }

    /// Most recent status text
    pub fn last_status(&self) -> &str {
        &self.last_status
    }

    /// Process one event. Returns the path of a page written by this event.
    pub fn handle(&mut self, event: CaptureEvent) -> image::ImageResult<Option<PathBuf>> {
        match event {
            CaptureEvent::Status(text) => {
                debug!(status = %text);
                self.last_status = text;
            }
            CaptureEvent::Log(text) => self.record(Severity::Info, &text),
            CaptureEvent::Warning(text) => self.record(Severity::Warning, &text),
            CaptureEvent::Error(text) => {
                self.record(Severity::Error, &text);
                if self.bell {
                    eprint!("\x07");
                    let _ = std::io::stderr().flush();
                }
            }
            CaptureEvent::NewPage => {
                self.raster.new_page();
                self.page_open = true;
            }
            CaptureEvent::PixelRuns(runs) => {
                self.raster.apply_runs(&runs);
                if self.page_open && self.raster.is_complete() {
                    self.page_open = false;
                    return self.save_page().map(Some);
                }
            }
        }
        Ok(None)
    }

    fn record(&mut self, severity: Severity, text: &str) {
        if self.echo {
            eprintln!("{}{}", severity.prefix(), text);
        }
        self.log.record(severity, text);
    }

    fn save_page(&mut self) -> image::ImageResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = unique_path(&self.output_dir, &capture_file_name(&self.prefix, Local::now()));
        self.raster.save_png(&path, &self.palette)?;
        info!(path = %path.display(), "capture saved");
        self.saved.push(path.clone());
        Ok(path)
    }
}

/// `<prefix>-YYYYmmdd-HHMMSS.png`
pub fn capture_file_name(prefix: &str, at: DateTime<Local>) -> String {
    format!("{}-{}.png", prefix, at.format("%Y%m%d-%H%M%S"))
}

/// Avoid overwriting a capture taken within the same second
fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let stem = name.trim_end_matches(".png");
    let mut n = 2;
    loop {
        let candidate = dir.join(format!("{stem}-{n}.png"));
        if !candidate.exists() {
            return candidate;
        }
        if n == u32::MAX {
            warn!("no free capture file name; overwriting");
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::PixelRun;
    use crate::core::simulator::{ScopeSimulator, TestPattern};
    use chrono::TimeZone;

    #[test]
    fn test_file_name() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(capture_file_name("csa", at), "csa-20240309-140507.png");
    }

    #[test]
    fn test_complete_page_is_saved() {
        let dir = tempfile::tempdir().unwrap();
        let mut consumer = CaptureConsumer::new(dir.path(), "scope");
        let runs = ScopeSimulator::runs(&TestPattern::Checker.render(552, 704));

        assert_eq!(consumer.handle(CaptureEvent::NewPage).unwrap(), None);
        let mut written = Vec::new();
        for batch in runs.chunks(25) {
            if let Some(path) = consumer.handle(CaptureEvent::PixelRuns(batch.to_vec())).unwrap() {
                written.push(path);
            }
        }

        assert_eq!(written.len(), 1);
        assert_eq!(consumer.saved(), written.as_slice());
        let image = image::open(&written[0]).unwrap().to_rgb8();
        assert_eq!(image.dimensions(), (552, 704));
        assert_eq!(image.get_pixel(8, 0).0, [255, 255, 255]);
    }

    #[test]
    fn test_runs_without_page_are_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let mut consumer = CaptureConsumer::new(dir.path(), "scope");
        let runs = vec![PixelRun::new(1, 1, 1000); 200];
        assert_eq!(consumer.handle(CaptureEvent::PixelRuns(runs)).unwrap(), None);
        assert!(consumer.saved().is_empty());
    }

    #[test]
    fn test_messages_are_logged() {
        let dir = tempfile::tempdir().unwrap();
        let mut consumer = CaptureConsumer::new(dir.path(), "scope");
        consumer.handle(CaptureEvent::Status("Waiting for header...".into())).unwrap();
        consumer.handle(CaptureEvent::Log("Beginning screen capture.".into())).unwrap();
        consumer.handle(CaptureEvent::Error("Invalid data received; capture aborted.".into())).unwrap();

        assert_eq!(consumer.last_status(), "Waiting for header...");
        assert_eq!(
            consumer.log().text(),
            "Beginning screen capture.\nERROR: Invalid data received; capture aborted.\n"
        );
    }

    #[test]
    fn test_same_second_names_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"").unwrap();
        std::fs::write(dir.path().join("a-2.png"), b"").unwrap();
        assert_eq!(unique_path(dir.path(), "a.png"), dir.path().join("a-3.png"));
    }
}
