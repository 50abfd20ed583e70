//! Live task page.
//!
//! Renders one page and re-renders it whenever a change notification for
//! the owner arrives, either from this process or (via `data_version`
//! polling) from another `td`. Lines typed on stdin become the search term,
//! debounced; an empty line clears the search.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::task::build_request;
use super::{Target, block_on, print_task_rows};
use crate::cli::WatchArgs;
use crate::config::SyncSettings;
use crate::error::Result;
use crate::storage::{Backend, SqliteStorage};
use crate::sync::view::Fingerprint;
use crate::sync::{RealtimeListener, Reload, TaskListView, ViewReloader, spawn_search_debouncer};

/// Reloads the view and prints it when its content changed.
struct Renderer {
    inner: ViewReloader<SqliteStorage>,
    view: Arc<Mutex<TaskListView>>,
    shown: Mutex<Option<Fingerprint>>,
    json: bool,
}

impl Renderer {
    fn force_next(&self) {
        *self.shown.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn render(&self) -> Result<()> {
        let view = self.view.lock().unwrap_or_else(PoisonError::into_inner);
        let fingerprint = view.fingerprint();
        {
            let mut shown = self.shown.lock().unwrap_or_else(PoisonError::into_inner);
            if fingerprint.is_some() && *shown == fingerprint {
                return Ok(());
            }
            *shown = fingerprint;
        }

        let Some(page) = view.confirmed() else {
            return Ok(());
        };
        let rows = view.rows();

        if self.json {
            println!("{}", serde_json::to_string(page)?);
            return Ok(());
        }

        // Clear screen, cursor home
        print!("\x1b[2J\x1b[H");
        let request = view.request();
        let heading = match request.search_term() {
            Some(term) => format!("Tasks matching \"{term}\""),
            None => "Tasks".to_string(),
        };
        println!(
            "{} {}",
            heading.bold(),
            format!(
                "(page {} of {}, {} total)",
                page.page,
                page.total_pages().max(1),
                page.total
            )
            .dimmed()
        );
        print_task_rows(&rows);
        println!();
        println!("{}", "Type to search, empty line clears, Ctrl-C quits".dimmed());
        Ok(())
    }
}

impl Reload for Renderer {
    async fn reload(&self) -> Result<()> {
        self.inner.reload().await?;
        self.render()
    }
}

impl Reload for Arc<Renderer> {
    async fn reload(&self) -> Result<()> {
        self.as_ref().reload().await
    }
}

/// Execute the watch command until Ctrl-C.
///
/// # Errors
///
/// Returns `NotInitialized`, `InvalidArgument` for bad list flags, or the
/// error of the initial load.
pub fn execute(args: &WatchArgs, target: Target<'_>, json: bool) -> Result<()> {
    let ws = target.open()?;
    let settings = SyncSettings::from_env();

    block_on(async {
        let request = build_request(&ws, &args.list, args.search.as_deref()).await?;
        let view = Arc::new(Mutex::new(TaskListView::new(request, settings.pending_edit_window)));
        let storage = ws.backend().clone();

        let renderer = Arc::new(Renderer {
            inner: ViewReloader::new(storage.clone(), ws.cache().clone(), Arc::clone(&view)),
            view: Arc::clone(&view),
            shown: Mutex::new(None),
            json,
        });
        renderer.reload().await?;

        let listener = RealtimeListener::new(ws.owner(), storage.subscribe(), Arc::clone(&renderer))
            .with_name_cache(ws.cache().clone())
            .spawn();
        let poller = storage.spawn_external_watch(ws.owner(), Duration::from_millis(args.poll_ms.max(50)));

        let (search_tx, mut search_rx, debouncer) = spawn_search_debouncer(settings.search_debounce);
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if search_tx.send(line).await.is_err() {
                    break;
                }
            }
        });

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);
        let mut searching = true;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                term = search_rx.recv(), if searching => match term {
                    Some(term) => {
                        {
                            let mut view = view.lock().unwrap_or_else(PoisonError::into_inner);
                            let mut request = view.request().clone();
                            request.search = Some(term);
                            request.page = 1;
                            view.set_request(request);
                        }
                        renderer.force_next();
                        if let Err(e) = renderer.reload().await {
                            tracing::warn!(error = %e, "search reload failed");
                        }
                    }
                    None => searching = false,
                },
            }
        }

        for handle in [listener.abort_handle(), poller.abort_handle(), debouncer.abort_handle(), reader.abort_handle()] {
            handle.abort();
        }
        Ok(())
    })
}
