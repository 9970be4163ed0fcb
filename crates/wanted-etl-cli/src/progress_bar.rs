//! Terminal progress bar fed by fetch events.

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::error::RecvError;

use wanted_etl::progress::{FetchEventKind, ProgressReceiver};

const TEMPLATE: &str = "{spinner} [{bar:30}] {pos}/{len} pages {msg}";

/// Draw events until every sender is dropped.
pub async fn render(mut rx: ProgressReceiver, max_pages: u32) {
    let bar = ProgressBar::new(u64::from(max_pages));
    if let Ok(style) = ProgressStyle::with_template(TEMPLATE) {
        bar.set_style(style.progress_chars("=> "));
    }

    loop {
        match rx.recv().await {
            Ok(event) => {
                if let FetchEventKind::PageFetched { page, .. } = event.event {
                    bar.set_position(u64::from(page));
                }
                if let Some(msg) = describe(&event.event) {
                    bar.set_message(msg);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "progress renderer lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
    bar.finish_and_clear();
}

/// Status line for an event, if it changes what the bar shows.
fn describe(event: &FetchEventKind) -> Option<String> {
    match event {
        FetchEventKind::AttemptStarted { attempt, next_page } => {
            Some(format!("attempt {attempt}, from page {next_page}"))
        }
        FetchEventKind::PageFetched { items, session, .. } => {
            Some(format!("session {session}, {items} items"))
        }
        FetchEventKind::PageFailed { page, message, .. } => {
            Some(format!("page {page} failed: {message}"))
        }
        FetchEventKind::SessionRotated { to, .. } => Some(format!("session {to}")),
        FetchEventKind::SessionOpened { .. } | FetchEventKind::FetchFinished { .. } => None,
    }
}
