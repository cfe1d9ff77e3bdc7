//! Terminal progress bars for the check and transfer phases.

use std::sync::Arc;

use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use repomirror::{Phase, Progress, ProgressCallback};

const TEMPLATE: &str = "{prefix:>10.bold} [{wide_bar:.cyan/blue}] {pos}/{len} {msg}";

/// Shows one bar per phase, replacing it when the phase changes.
#[derive(Default)]
struct PhaseBars {
    current: Mutex<Option<(Phase, ProgressBar)>>,
}

impl PhaseBars {
    fn update(&self, progress: Progress) {
        let mut current = self.current.lock();

        let bar = match current.as_ref() {
            Some((phase, bar)) if *phase == progress.phase => bar.clone(),
            _ => {
                if let Some((_, previous)) = current.take() {
                    previous.finish();
                }
                let bar = new_bar(&progress);
                *current = Some((progress.phase, bar.clone()));
                bar
            }
        };

        bar.set_position(progress.completed as u64);
        if progress.phase == Phase::Transferring {
            bar.set_message(HumanBytes(progress.bytes).to_string());
        }
        if progress.completed >= progress.total && !bar.is_finished() {
            bar.finish();
        }
    }
}

fn new_bar(progress: &Progress) -> ProgressBar {
    let style = ProgressStyle::with_template(TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");

    ProgressBar::new(progress.total as u64)
        .with_style(style)
        .with_prefix(progress.phase.name())
}

/// Progress callback drawing bars on stderr, or `None` when `quiet`.
pub fn progress_callback(quiet: bool) -> Option<Arc<ProgressCallback>> {
    if quiet {
        return None;
    }

    let bars = PhaseBars::default();
    let callback: ProgressCallback = Box::new(move |progress: Progress| bars.update(progress));
    Some(Arc::new(callback))
}
