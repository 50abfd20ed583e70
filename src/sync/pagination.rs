//! Paged list and search reads.
//!
//! List mode is two-phase: a count under the filter, then a windowed,
//! sorted data read under the same filter. Priority has no backend column
//! ordering, so a priority sort materializes the filtered set in due-date
//! order and refines it client-side before slicing. Search mode always
//! materializes the match set and slices it in memory.

use std::cmp::Ordering;

use serde::Serialize;
use tracing::debug;

use super::batch::BatchLoader;
use super::name_cache::NameCache;
use crate::error::Result;
use crate::model::{Task, TaskRow};
use crate::storage::{Backend, SortColumn, SortDirection, StatusFilter, TaskQuery, TextMatch, Window};

/// Default rows per page.
pub const DEFAULT_PAGE_SIZE: usize = 25;

/// User-facing sort fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    DueDate,
    Title,
    Responsible,
    TaskType,
    Environment,
    Sequence,
    Priority,
}

impl SortField {
    /// Backend column for declaratively sortable fields.
    #[must_use]
    pub const fn column(self) -> Option<SortColumn> {
        match self {
            Self::DueDate => Some(SortColumn::DueDate),
            Self::Title => Some(SortColumn::Title),
            Self::Responsible => Some(SortColumn::Responsible),
            Self::TaskType => Some(SortColumn::TaskType),
            Self::Environment => Some(SortColumn::Environment),
            Self::Sequence => Some(SortColumn::Sequence),
            Self::Priority => None,
        }
    }
}

/// Everything that determines a page. Two responses belong to the same view
/// context exactly when their requests compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub owner_id: String,
    pub filter: StatusFilter,
    pub project_id: Option<String>,
    /// Non-blank switches to search mode.
    pub search: Option<String>,
    pub sort: SortField,
    pub direction: SortDirection,
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
}

impl ListRequest {
    #[must_use]
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            filter: StatusFilter::default(),
            project_id: None,
            search: None,
            sort: SortField::default(),
            direction: SortDirection::default(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// The search term, if it is not blank.
    #[must_use]
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    #[must_use]
    pub fn window(&self) -> Window {
        let limit = self.page_size.max(1);
        Window {
            offset: (self.page.max(1) - 1).saturating_mul(limit),
            limit,
        }
    }

    fn query(&self) -> TaskQuery {
        let (order, direction) = match self.sort.column() {
            Some(column) => (column, self.direction),
            None => (SortColumn::DueDate, SortDirection::Asc),
        };
        TaskQuery {
            owner_id: self.owner_id.clone(),
            filter: self.filter,
            project_id: self.project_id.clone(),
            text: None,
            order,
            direction,
        }
    }
}

/// One page of results plus the totals needed for page math.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

impl<T> Page<T> {
    #[must_use]
    pub fn total_pages(&self) -> usize {
        self.total.div_ceil(self.page_size.max(1))
    }
}

/// Stable priority refinement of due-date order.
///
/// Due date stays the primary key (nulls last); rank breaks ties in the
/// requested direction. Rows already in due-date order keep their relative
/// order on full ties.
pub fn sort_by_priority(rows: &mut [TaskRow], direction: SortDirection) {
    rows.sort_by(|a, b| {
        let by_date = match (a.due_date, b.due_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        let by_rank = a.priority.rank().cmp(&b.priority.rank());
        by_date.then(match direction {
            SortDirection::Asc => by_rank,
            SortDirection::Desc => by_rank.reverse(),
        })
    });
}

fn slice_window(rows: Vec<TaskRow>, window: Window) -> Vec<TaskRow> {
    rows.into_iter().skip(window.offset).take(window.limit).collect()
}

pub struct PageController<'a, B> {
    backend: &'a B,
    loader: BatchLoader<'a, B>,
}

impl<'a, B: Backend> PageController<'a, B> {
    #[must_use]
    pub fn new(backend: &'a B, cache: &'a NameCache) -> Self {
        Self {
            backend,
            loader: BatchLoader::new(backend, cache),
        }
    }

    /// List or search, depending on the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the count or data read fails.
    pub async fn fetch(&self, request: &ListRequest) -> Result<Page<Task>> {
        match request.search_term() {
            Some(term) => self.search(request, term).await,
            None => self.list(request).await,
        }
    }

    /// Two-phase list read.
    ///
    /// # Errors
    ///
    /// Returns an error if the count or data read fails.
    pub async fn list(&self, request: &ListRequest) -> Result<Page<Task>> {
        let query = request.query();
        let window = request.window();

        let total = self.backend.count_tasks(&query).await?;
        let rows = if request.sort == SortField::Priority {
            let mut all = self.backend.fetch_tasks(&query, None).await?;
            sort_by_priority(&mut all, request.direction);
            slice_window(all, window)
        } else {
            self.backend.fetch_tasks(&query, Some(window)).await?
        };

        debug!(total, page = request.page, rows = rows.len(), "list page read");
        Ok(self.page(request, rows, total).await)
    }

    /// Search read over the whole match set.
    ///
    /// Matches title, description or responsible, or any task with a
    /// follow-up containing the term.
    ///
    /// # Errors
    ///
    /// Returns an error if either backend read fails.
    pub async fn search(&self, request: &ListRequest, term: &str) -> Result<Page<Task>> {
        let task_numbers = self
            .backend
            .task_numbers_with_follow_up_text(&request.owner_id, term)
            .await?;

        let mut query = request.query();
        query.text = Some(TextMatch {
            term: term.to_string(),
            task_numbers,
        });

        let mut all = self.backend.fetch_tasks(&query, None).await?;
        if request.sort == SortField::Priority {
            sort_by_priority(&mut all, request.direction);
        }
        let total = all.len();
        let rows = slice_window(all, request.window());

        debug!(term, total, page = request.page, "search page read");
        Ok(self.page(request, rows, total).await)
    }

    async fn page(&self, request: &ListRequest, rows: Vec<TaskRow>, total: usize) -> Page<Task> {
        debug_assert!(
            rows.iter().all(|r| request.filter.admits(r.status, r.priority)),
            "backend returned rows outside {:?}",
            request.filter
        );
        Page {
            items: self.loader.hydrate(rows).await,
            total,
            page: request.page.max(1),
            page_size: request.window().limit,
        }
    }
}
