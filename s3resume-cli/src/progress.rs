use indicatif::{ProgressBar, ProgressStyle};
use s3resume_core::event::{PartProgress, ProgressSink};

/// Progress bar over the parts of the current download.
pub struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{elapsed_precise}] {wide_bar} {pos}/{len} parts")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        CliProgress { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for CliProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for CliProgress {
    fn on_part_complete(&self, progress: &PartProgress) {
        self.bar.set_length(progress.total_parts);
        // Parts may complete out of order when fetched concurrently.
        self.bar.inc(1);
        self.bar.suspend(|| {
            tracing::debug!(
                "downloaded part {} of {}",
                progress.part,
                progress.total_parts
            )
        });
    }
}
