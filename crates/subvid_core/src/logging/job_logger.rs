//! Per-job logger with file and callback output.
//!
//! Each assembly job gets its own logger that writes to a dedicated
//! log file, forwards lines to an optional callback, keeps a tail
//! buffer for error diagnosis, and accumulates warnings so the final
//! report can list everything that went sideways in one place.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LogCallback, LogConfig, LogLevel, MessagePrefix};

/// Per-job logger with dual output (file + callback).
pub struct JobLogger {
    job_name: String,
    log_path: PathBuf,
    file_writer: Mutex<Option<BufWriter<File>>>,
    callback: Mutex<Option<LogCallback>>,
    config: LogConfig,
    /// Recent lines, shown after an error.
    tail_buffer: Mutex<VecDeque<String>>,
    /// Every warning raised during the job, in order.
    warnings: Mutex<Vec<String>>,
    last_progress: Mutex<u32>,
}

impl JobLogger {
    /// Create a logger writing to `<log_dir>/<job_name>.log`.
    pub fn new(
        job_name: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
        callback: Option<LogCallback>,
    ) -> std::io::Result<Self> {
        let job_name = job_name.into();
        let log_dir = log_dir.as_ref();

        fs::create_dir_all(log_dir)?;
        let log_path = log_dir.join(format!("{}.log", sanitize_filename(&job_name)));
        let file = File::create(&log_path)?;

        Ok(Self {
            job_name,
            log_path,
            file_writer: Mutex::new(Some(BufWriter::new(file))),
            callback: Mutex::new(callback),
            config,
            tail_buffer: Mutex::new(VecDeque::with_capacity(100)),
            warnings: Mutex::new(Vec::new()),
            last_progress: Mutex::new(0),
        })
    }

    /// Logger that only feeds the callback, without a file.
    pub fn memory_only(job_name: impl Into<String>, callback: Option<LogCallback>) -> Self {
        Self {
            job_name: job_name.into(),
            log_path: PathBuf::new(),
            file_writer: Mutex::new(None),
            callback: Mutex::new(callback),
            config: LogConfig::default(),
            tail_buffer: Mutex::new(VecDeque::with_capacity(100)),
            warnings: Mutex::new(Vec::new()),
            last_progress: Mutex::new(0),
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Log a message at the specified level.
    pub fn log(&self, level: LogLevel, message: &str) {
        if level < self.config.level {
            return;
        }
        let formatted = self.format_message(message);
        self.output(&formatted);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    /// Log a warning and record it for the end-of-job report.
    pub fn warn(&self, message: &str) {
        self.warnings.lock().push(message.to_string());
        let msg = MessagePrefix::Warning.format(message);
        self.log(LogLevel::Warn, &msg);
    }

    pub fn error(&self, message: &str) {
        let msg = MessagePrefix::Error.format(message);
        self.log(LogLevel::Error, &msg);
    }

    /// Log a command being executed.
    pub fn command(&self, command: &str) {
        let msg = MessagePrefix::Command.format(command);
        self.log(LogLevel::Info, &msg);
    }

    /// Log a phase marker.
    pub fn phase(&self, phase_name: &str) {
        let msg = MessagePrefix::Phase.format(phase_name);
        self.log(LogLevel::Info, &msg);
    }

    pub fn success(&self, message: &str) {
        let msg = MessagePrefix::Success.format(message);
        self.log(LogLevel::Info, &msg);
    }

    /// Log a progress update, filtered to `progress_step` intervals.
    ///
    /// Returns true if the update was logged.
    pub fn progress(&self, percent: u32) -> bool {
        let mut last = self.last_progress.lock();
        let step = self.config.progress_step.max(1);

        let current_step = (percent / step) * step;
        let last_step = (*last / step) * step;
        if current_step <= last_step && percent < 100 && percent != 0 {
            return false;
        }
        *last = percent;
        drop(last);

        self.log(LogLevel::Info, &format!("Progress: {}%", percent));
        true
    }

    /// Record an external tool output line in the tail buffer.
    pub fn output_line(&self, line: &str, is_stderr: bool) {
        let mut buffer = self.tail_buffer.lock();
        if buffer.len() >= self.config.tail_lines {
            buffer.pop_front();
        }
        let prefix = if is_stderr { "[stderr] " } else { "" };
        buffer.push_back(format!("{}{}", prefix, line));
    }

    /// Dump the tail buffer, typically after an error.
    pub fn show_tail(&self, header: &str) {
        let buffer = self.tail_buffer.lock();
        if buffer.is_empty() {
            return;
        }
        self.output(&self.format_message(&format!("[{}/tail]", header)));
        for line in buffer.iter() {
            self.output(&self.format_message(line));
        }
    }

    /// All warnings raised so far, in order.
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }

    /// Flush the log file.
    pub fn flush(&self) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writer.flush();
        }
    }

    /// Close the logger and release the file handle.
    pub fn close(&self) {
        self.flush();
        *self.file_writer.lock() = None;
    }

    fn format_message(&self, message: &str) -> String {
        if self.config.show_timestamps {
            let timestamp = Local::now().format("%H:%M:%S");
            format!("[{}] {}", timestamp, message)
        } else {
            message.to_string()
        }
    }

    fn output(&self, formatted: &str) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writeln!(writer, "{}", formatted);
        }
        if let Some(ref callback) = *self.callback.lock() {
            callback(formatted);
        }
    }
}

impl Drop for JobLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Strip characters that are unsafe in filenames.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn writes_to_log_file() {
        let dir = TempDir::new().unwrap();
        let logger = JobLogger::new("job1", dir.path(), LogConfig::default(), None).unwrap();

        logger.info("hello");
        logger.phase("Render");
        logger.close();

        let content = fs::read_to_string(logger.log_path()).unwrap();
        assert!(content.contains("hello"));
        assert!(content.contains("=== Render ==="));
    }

    #[test]
    fn callback_receives_lines() {
        let count = Arc::new(AtomicUsize::new(0));
        let counted = count.clone();
        let logger = JobLogger::memory_only(
            "job",
            Some(Box::new(move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
            })),
        );

        logger.info("one");
        logger.warn("two");

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn warnings_accumulate_for_the_report() {
        let logger = JobLogger::memory_only("job", None);
        logger.warn("clip 3 overflows");
        logger.warn("segment drift");
        logger.info("not a warning");

        assert_eq!(
            logger.warnings(),
            vec!["clip 3 overflows".to_string(), "segment drift".to_string()]
        );
    }

    #[test]
    fn levels_below_threshold_are_dropped() {
        let dir = TempDir::new().unwrap();
        let logger = JobLogger::new("job", dir.path(), LogConfig::default(), None).unwrap();

        logger.debug("invisible");
        logger.info("visible");
        logger.close();

        let content = fs::read_to_string(logger.log_path()).unwrap();
        assert!(!content.contains("invisible"));
        assert!(content.contains("visible"));
    }

    #[test]
    fn progress_is_filtered_to_steps() {
        let logger = JobLogger::memory_only("job", None);

        assert!(logger.progress(0));
        assert!(!logger.progress(3));
        assert!(logger.progress(12));
        assert!(!logger.progress(14));
        assert!(logger.progress(100));
    }

    #[test]
    fn tail_buffer_keeps_only_recent_lines() {
        let logger = JobLogger::memory_only("job", None);
        for i in 0..150 {
            logger.output_line(&format!("line {i}"), false);
        }

        let buffer = logger.tail_buffer.lock();
        assert_eq!(buffer.len(), 100);
        assert_eq!(buffer.front().unwrap(), "line 50");
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(sanitize_filename("a/b:c"), "a_b_c");
        assert_eq!(sanitize_filename("plain"), "plain");
    }
}
