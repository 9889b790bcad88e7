//! Terminal progress display for retrieval runs.

use std::sync::{Arc, Mutex};

use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use ssfetch::retrieval::{ProgressCallback, RetrievalEvent};

const BAR_TEMPLATE: &str = "{prefix:.bold} [{bar:30.cyan/blue}] {pos}/{len} parts {msg}";

/// Shows one bar per file while parts complete.
///
/// Bars are drawn to stderr only when a user is watching it.
pub struct ProgressReporter {
    bar: Arc<Mutex<Option<ProgressBar>>>,
    visible: bool,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self {
            bar: Arc::new(Mutex::new(None)),
            visible: console::user_attended_stderr(),
        }
    }

    /// Callback to hand to the retriever.
    pub fn callback(&self) -> ProgressCallback {
        let slot = Arc::clone(&self.bar);
        let visible = self.visible;
        Arc::new(move |event: &RetrievalEvent<'_>| {
            let Ok(mut current) = slot.lock() else {
                return;
            };
            handle_event(&mut current, event, visible);
        })
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn new_bar(len: u64, name: &str, visible: bool) -> ProgressBar {
    let bar = if visible {
        ProgressBar::with_draw_target(Some(len), ProgressDrawTarget::stderr())
    } else {
        ProgressBar::hidden()
    };
    if let Ok(bar_style) = ProgressStyle::with_template(BAR_TEMPLATE) {
        bar.set_style(bar_style.progress_chars("=> "));
    }
    bar.set_length(len);
    bar.set_prefix(name.to_string());
    bar
}

fn handle_event(current: &mut Option<ProgressBar>, event: &RetrievalEvent<'_>, visible: bool) {
    match event {
        RetrievalEvent::PackageStarted { link, files } => {
            let line = format!("{} {} ({} files)", style("Package").bold(), link, files);
            match current.as_ref() {
                Some(bar) => bar.println(line),
                None if visible => eprintln!("{line}"),
                None => {}
            }
        }
        RetrievalEvent::FileStarted { file } => {
            if let Some(old) = current.take() {
                old.abandon();
            }
            *current = Some(new_bar(u64::from(file.parts), &file.file_name, visible));
        }
        RetrievalEvent::PartCompleted { .. } => {
            if let Some(bar) = current.as_ref() {
                bar.inc(1);
            }
        }
        RetrievalEvent::PartFailed { part, .. } => {
            if let Some(bar) = current.as_ref() {
                bar.inc(1);
                bar.set_message(format!("{}", style(format!("part {part} failed")).red()));
            }
        }
        RetrievalEvent::FileAssembled { path, .. } => {
            if let Some(bar) = current.take() {
                bar.finish_with_message(format!("-> {}", path.display()));
            }
        }
        RetrievalEvent::FileFailed { .. } => {
            if let Some(bar) = current.take() {
                bar.abandon_with_message(format!("{}", style("failed").red()));
            }
        }
    }
}
