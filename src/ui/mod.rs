//! Terminal UI for a running batch, rendered via `indicatif` progress bars.
//!
//! One spinner line per resume plus an overall percentage bar at the
//! bottom. The renderer is a pure function of the latest
//! [`BatchSnapshot`]: feed every snapshot to [`BatchUI::render`] and the
//! bars converge on the session's state, whatever order updates land in.

use crate::batch::session::{BatchSnapshot, ItemSnapshot, SessionState};
use crate::item::ItemStatus;
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

pub struct BatchUI {
    multi: MultiProgress,
    file_bars: HashMap<Uuid, ProgressBar>,
    overall: ProgressBar,
}

impl BatchUI {
    /// Create the UI from the initial (all-queued) snapshot. One bar per
    /// file, in submission order, with the overall bar last.
    pub fn new(snapshot: &BatchSnapshot) -> Self {
        let multi = MultiProgress::new();

        let file_style = ProgressStyle::default_spinner()
            .template("{spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let mut file_bars = HashMap::new();
        for item in &snapshot.items {
            let bar = multi.add(ProgressBar::new_spinner());
            bar.set_style(file_style.clone());
            bar.set_message(Self::item_line(item));
            bar.enable_steady_tick(Duration::from_millis(100));
            file_bars.insert(item.id, bar);
        }

        let overall_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}% {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let overall = multi.add(ProgressBar::new(100));
        overall.set_style(overall_style);
        overall.set_prefix("Batch");

        Self {
            multi,
            file_bars,
            overall,
        }
    }

    /// Redraw every bar from the given snapshot. Terminal items get
    /// their spinner finished so the line stops animating.
    pub fn render(&self, snapshot: &BatchSnapshot) {
        for item in &snapshot.items {
            let Some(bar) = self.file_bars.get(&item.id) else {
                continue;
            };
            if item.status.is_terminal() {
                if !bar.is_finished() {
                    bar.finish_with_message(Self::item_line(item));
                }
            } else {
                bar.set_message(Self::item_line(item));
            }
        }

        self.overall.set_position(snapshot.overall_percent as u64);
        if !snapshot.state.is_open() {
            self.overall
                .finish_with_message(Self::state_label(snapshot.state));
        }
    }

    /// Stop every bar, leaving the final lines on screen.
    pub fn finish(&self) {
        for bar in self.file_bars.values() {
            if !bar.is_finished() {
                bar.finish();
            }
        }
        if !self.overall.is_finished() {
            self.overall.finish();
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if
    /// the rich UI fails. Keeps warnings visible on dumb terminals.
    pub fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    fn item_line(item: &ItemSnapshot) -> String {
        let status = match item.status {
            ItemStatus::Queued => style(item.status).dim(),
            ItemStatus::Processing | ItemStatus::Analyzing | ItemStatus::Generating => {
                style(item.status).cyan()
            }
            ItemStatus::Settled => style(item.status).green(),
            ItemStatus::Failed => style(item.status).red(),
        };
        let mut line = format!("{} {}", style(&item.filename).bold(), status);
        if let Some(score) = item.score {
            line.push_str(&format!(" {}", style(format!("({score:.1})")).yellow()));
        }
        if let Some(error) = &item.error {
            line.push_str(&format!(" {}", style(error).red().dim()));
        }
        line
    }

    fn state_label(state: SessionState) -> String {
        match state {
            SessionState::Open => String::new(),
            SessionState::Completed => style("complete").green().to_string(),
            SessionState::TimedOut => style("timed out").red().to_string(),
            SessionState::Cancelled => style("cancelled").yellow().to_string(),
            SessionState::Faulted => style("failed").red().to_string(),
        }
    }
}
