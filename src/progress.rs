//! progress reporting functionality

use indicatif::{ProgressBar, ProgressStyle};

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:.cyan/blue}] {pos}/{len} items ({eta})";

pub struct Progress {
    bar: Option<ProgressBar>,
}

impl Progress {
    /// create new progress reporter, only shows progress if enabled
    pub fn new(enabled: bool, total_items: u64) -> Self {
        let bar = enabled.then(|| {
            let pb = ProgressBar::new(total_items);
            if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_TEMPLATE) {
                pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
            }
            pb
        });

        Self { bar }
    }

    /// update progress with the number of items read so far
    pub fn update(&self, processed_items: u64) {
        if let Some(bar) = &self.bar {
            bar.set_position(processed_items);
        }
    }

    /// finish progress and clear
    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_disabled() {
        let progress = Progress::new(false, 1000);

        // no-ops when disabled
        progress.update(500);
        progress.finish();

        assert!(progress.bar.is_none());
    }

    #[test]
    fn test_progress_enabled() {
        let progress = Progress::new(true, 1000);
        assert!(progress.bar.is_some());

        progress.update(500);
        progress.update(750);
        progress.finish();
    }

    #[test]
    fn test_progress_zero_total() {
        let progress = Progress::new(true, 0);
        progress.update(0);
        progress.finish();
    }

    #[test]
    fn test_progress_update_beyond_total() {
        let progress = Progress::new(true, 100);
        progress.update(150);
        progress.finish();
    }
}
