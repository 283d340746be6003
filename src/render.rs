//! Terminal rendering of job progress and search results.

use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use mediathek_core::api::SearchResult;
use mediathek_core::{
    ProgressSnapshot, ProgressUpdate, SearchStatus, SearchUpdate, StreamEvent, TaskSummary,
};
use tokio::sync::mpsc::UnboundedReceiver;
use url::Url;

const BAR_TEMPLATE: &str = "{prefix:>8} [{bar:30}] {pos:>3}% {msg}";

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Percent in `0..=100` as a bar position.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn position(percent: f64) -> u64 {
    percent.clamp(0.0, 100.0).round() as u64
}

/// Overall and current-item bars for one job.
struct JobBars {
    multi: MultiProgress,
    overall: ProgressBar,
    item: ProgressBar,
}

impl JobBars {
    fn new(visible: bool) -> Self {
        let target = if visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let multi = MultiProgress::with_draw_target(target);
        let overall = multi.add(ProgressBar::new(100));
        overall.set_style(bar_style());
        overall.set_prefix("overall");
        let item = multi.add(ProgressBar::new(100));
        item.set_style(bar_style());
        item.set_prefix("file");
        Self {
            multi,
            overall,
            item,
        }
    }

    fn apply(&self, snapshot: &ProgressSnapshot) {
        self.overall.set_position(position(snapshot.overall_progress));
        let message = match (snapshot.current_file, snapshot.total_files) {
            (Some(current), Some(total)) => {
                format!("[{current}/{total}] {}", snapshot.overall_message)
            }
            _ => snapshot.overall_message.clone(),
        };
        self.overall.set_message(message);

        // Absent item fields keep what the bar shows.
        if let Some(item) = &snapshot.current_item {
            if let Some(progress) = item.progress {
                self.item.set_position(position(progress));
            }
            if let Some(message) = &item.message {
                self.item.set_message(message.clone());
            }
        }
    }

    fn reset_item(&self) {
        self.item.set_position(0);
        self.item.set_message(String::new());
    }

    fn println(&self, line: &str) {
        let _ = self.multi.println(line);
    }

    fn finish(&self) {
        self.item.finish_and_clear();
        self.overall.finish_and_clear();
    }
}

/// Line printed when a job completes.
pub(crate) fn summary_line(summary: &TaskSummary) -> String {
    let mut line = if summary.failed_count() == 0 {
        format!("Task {} complete", summary.handle)
    } else {
        format!(
            "Task {} complete with {} failed item(s)",
            summary.handle,
            summary.failed_count()
        )
    };
    if !summary.message.is_empty() {
        line.push_str(": ");
        line.push_str(&summary.message);
    }
    line
}

/// Absolute archive link; the backend reports it relative to its own root.
pub(crate) fn archive_link(base: &Url, download_url: &str) -> String {
    base.join(download_url.trim_start_matches('/'))
        .map_or_else(|_| download_url.to_string(), String::from)
}

/// Renders job updates until the sender side is dropped.
pub(crate) async fn render_job(
    mut updates: UnboundedReceiver<ProgressUpdate>,
    visible: bool,
    base: Url,
) {
    let bars = JobBars::new(visible);
    while let Some(update) = updates.recv().await {
        match update {
            ProgressUpdate::Started { handle, message } => {
                bars.overall.set_message(format!("{message} ({handle})"));
            }
            ProgressUpdate::Progress(snapshot) => bars.apply(&snapshot),
            ProgressUpdate::Finished(summary) => {
                bars.reset_item();
                bars.overall.set_position(100);
                bars.finish();
                println!("{}", summary_line(&summary));
                for failed in &summary.failed_items {
                    println!("  failed: {failed}");
                }
                if let Some(url) = &summary.download_url {
                    println!("  archive: {}", archive_link(&base, url));
                }
            }
            ProgressUpdate::Failed { message } => {
                bars.reset_item();
                bars.println(&format!("Failed: {message}"));
                bars.finish();
            }
        }
    }
    bars.finish();
}

/// One search result as printed on stdout.
pub(crate) fn result_line(index: usize, result: &SearchResult) -> String {
    let mut line = format!("{index:>3}. {}", result.title);
    if !result.duration.is_empty() {
        line.push_str(&format!(" [{}]", result.duration));
    }
    if !result.url.is_empty() {
        line.push_str("\n     ");
        line.push_str(&result.url);
    }
    line
}

/// Prints results as they arrive; status goes to a spinner on stderr.
pub(crate) async fn render_search(mut updates: UnboundedReceiver<SearchUpdate>, visible: bool) {
    let spinner = if visible {
        ProgressBar::new_spinner()
    } else {
        ProgressBar::hidden()
    };
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message("Searching...");

    let mut printed = 0;
    while let Some(update) = updates.recv().await {
        match update {
            SearchUpdate::Event(StreamEvent::Result(result)) => {
                printed += 1;
                spinner.suspend(|| println!("{}", result_line(printed, &result)));
            }
            SearchUpdate::Event(StreamEvent::Done | StreamEvent::Error { .. }) => {}
            SearchUpdate::Status(SearchStatus::Searching { found }) => {
                spinner.set_message(format!("Searching... {found} found"));
            }
            SearchUpdate::Status(SearchStatus::Finished { found }) => {
                spinner.finish_and_clear();
                if visible {
                    eprintln!("{found} result(s)");
                }
            }
            SearchUpdate::Status(SearchStatus::Failed { message }) => {
                spinner.finish_and_clear();
                eprintln!("Search failed: {message}");
            }
        }
    }
    spinner.finish_and_clear();
}
