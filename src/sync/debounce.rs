//! Search input debouncing.
//!
//! Keystrokes arrive on a channel; a value is forwarded only once `delay`
//! has passed with no newer value. Closing the input flushes the last
//! pending value.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default quiet period before a search is issued.
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Forward the last value of every quiet period from `input` to `output`.
///
/// Returns when the input closes or the output is dropped.
pub async fn debounce<T: Send>(mut input: mpsc::Receiver<T>, output: mpsc::Sender<T>, delay: Duration) {
    let mut pending: Option<T> = None;

    loop {
        if pending.is_none() {
            match input.recv().await {
                Some(value) => pending = Some(value),
                None => return,
            }
            continue;
        }

        tokio::select! {
            received = input.recv() => match received {
                Some(value) => pending = Some(value),
                None => {
                    if let Some(value) = pending.take() {
                        let _ = output.send(value).await;
                    }
                    return;
                }
            },
            () = tokio::time::sleep(delay) => {
                if let Some(value) = pending.take() {
                    if output.send(value).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Spawn a debouncer for search terms, returning its input and output ends.
#[must_use]
pub fn spawn_search_debouncer(delay: Duration) -> (mpsc::Sender<String>, mpsc::Receiver<String>, JoinHandle<()>) {
    let (input_tx, input_rx) = mpsc::channel(64);
    let (output_tx, output_rx) = mpsc::channel(8);
    let handle = tokio::spawn(debounce(input_rx, output_tx, delay));
    (input_tx, output_rx, handle)
}
