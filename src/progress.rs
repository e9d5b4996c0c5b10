use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Observer for the pipeline drivers. Every hook defaults to a no-op.
pub trait Progress {
    /// A phase is starting over `groups` groups holding `items` people in total.
    fn begin(&mut self, _phase: &str, _groups: usize, _items: usize) {}

    /// Entering a group of `size` people.
    fn group(&mut self, _name: &str, _size: usize) {}

    /// One person finished (reused, fetched, generated or skipped).
    fn item_done(&mut self, _name: &str) {}

    /// Called at the end of a phase, successful or not.
    fn finish(&mut self) {}
}

#[cfg(test)]
pub struct NullProgress;
#[cfg(test)]
impl Progress for NullProgress {}

/// Two stacked terminal bars: groups on top, people in the current group below.
pub struct BarProgress {
    multi: MultiProgress,
    groups: Option<ProgressBar>,
    items: Option<ProgressBar>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            groups: None,
            items: None,
        }
    }

    /// Drop the current group's bar; true if there was one.
    fn clear_items(&mut self) -> bool {
        match self.items.take() {
            Some(pb) => {
                pb.finish_and_clear();
                self.multi.remove(&pb);
                true
            }
            None => false,
        }
    }

    fn group_done(&mut self) {
        if self.clear_items() {
            if let Some(groups) = &self.groups {
                groups.inc(1);
            }
        }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for BarProgress {
    fn begin(&mut self, phase: &str, groups: usize, _items: usize) {
        let pb = self.multi.add(ProgressBar::new(groups as u64));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:>8} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_prefix(phase.to_string());
        self.groups = Some(pb);
    }

    fn group(&mut self, name: &str, size: usize) {
        self.group_done();
        if let Some(groups) = &self.groups {
            groups.set_message(name.to_string());
        }
        let pb = self.multi.add(ProgressBar::new(size as u64));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:30}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        self.items = Some(pb);
    }

    fn item_done(&mut self, name: &str) {
        if let Some(pb) = &self.items {
            pb.set_message(name.to_string());
            pb.inc(1);
        }
    }

    fn finish(&mut self) {
        self.group_done();
        if let Some(pb) = self.groups.take() {
            pb.finish_and_clear();
        }
    }
}
