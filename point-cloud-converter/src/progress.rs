/// Terminal progress bars for store operations.
use indicatif::{ProgressBar, ProgressStyle};
use point_cloud_store::ProgressSink;

/// Progress sink drawing an indicatif bar. Never cancels.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    /// Bar counting `unit` (e.g. "bytes", "points") with a message.
    pub fn new(unit: &str, message: &str) -> Self {
        let bar = ProgressBar::new(0);
        let template = format!("[{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} ({{percent}}%) {{msg}}", unit);
        if let Ok(style) = ProgressStyle::default_bar().template(&template) {
            bar.set_style(style.progress_chars("▉▊▋▌▍▎▏ "));
        }
        bar.set_message(message.to_string());
        Self { bar }
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl ProgressSink for BarProgress {
    fn report(&mut self, done: u64, total: u64) -> bool {
        if self.bar.length() != Some(total) {
            self.bar.set_length(total);
        }
        self.bar.set_position(done);
        true
    }
}
