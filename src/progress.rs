//! Shared progress and logging helpers to keep progress bars pinned.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

static MULTI_PROGRESS: OnceLock<MultiProgress> = OnceLock::new();

fn multi_progress() -> &'static MultiProgress {
    MULTI_PROGRESS.get_or_init(|| {
        let mp = MultiProgress::new();
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        mp
    })
}

pub fn add_progress_bar(len: u64) -> ProgressBar {
    multi_progress().add(ProgressBar::new(len))
}

/// Start a styled bar for `len` units of work, or nothing when there is no work
pub fn start_progress_bar(len: usize, message: &str) -> Option<ProgressBar> {
    if len == 0 {
        return None;
    }

    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    let pb = add_progress_bar(len as u64);
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

pub fn advance_progress(pb: &Option<ProgressBar>, delta: u64) {
    if let Some(pb) = pb {
        pb.inc(delta);
    }
}

pub fn finish_progress(pb: Option<ProgressBar>, message: &str) {
    if let Some(pb) = pb {
        pb.finish_with_message(message.to_string());
    }
}

#[derive(Default, Clone)]
pub struct LogWriterFactory;

pub struct LogWriter {
    buffer: String,
}

impl LogWriter {
    fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    fn print_line(line: &str) {
        let _ = multi_progress().println(line.trim_end_matches('\r').to_string());
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.push_str(&String::from_utf8_lossy(buf));

        while let Some(idx) = self.buffer.find('\n') {
            Self::print_line(&self.buffer[..idx]);
            self.buffer.drain(..idx + 1);
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            Self::print_line(self.buffer.trim_end_matches('\n'));
            self.buffer.clear();
        }
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl<'a> MakeWriter<'a> for LogWriterFactory {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter::new()
    }
}
