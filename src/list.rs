//! Paginated list controller.
//!
//! Owns page, page size, total count, the current rows and the refresh
//! signal. Fetches are sequenced: every fetch gets a [`FetchTicket`], and a
//! completion carrying an older ticket than the newest issued one is dropped
//! so a slow earlier response can never overwrite a later one.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;

use crate::api::EntityApi;
use crate::cascade::options_from_rows;
use crate::entity::EntitySpec;
use crate::envelope::{self, ApiReply};
use crate::error::ApiError;
use crate::fields::{map_row, Lookups, ViewRow};

pub const DEFAULT_PAGE_SIZE: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Success,
    /// Last fetch failed; rows still hold the previous page.
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListRow {
    pub raw: Value,
    pub view: ViewRow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub seq: u64,
    pub page: u64,
    pub page_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied { rows: usize, total: u64 },
    /// A newer fetch was issued after this one; the result was discarded.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Deactivate, keeping the row.
    Soft,
    Hard,
}

/// Cloneable sender side of a list's refresh signal.
///
/// Requests coalesce: however many arrive between two polls of the list,
/// exactly one refetch follows.
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    tx: Arc<watch::Sender<u64>>,
}

impl RefreshHandle {
    pub fn request(&self) {
        self.tx.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    pub fn generation(&self) -> u64 {
        *self.tx.borrow()
    }
}

pub struct PaginatedListController {
    spec: EntitySpec,
    page: u64,
    page_size: u64,
    total_count: u64,
    rows: Vec<ListRow>,
    lookups: Lookups,
    state: LoadState,
    refresh: RefreshHandle,
    refresh_rx: watch::Receiver<u64>,
    viewport_changed: bool,
    last_issued: u64,
}

impl PaginatedListController {
    /// A freshly mounted list; the first poll yields the initial fetch.
    pub fn new(spec: EntitySpec, page_size: u64) -> Self {
        let (tx, refresh_rx) = watch::channel(0u64);
        Self {
            spec,
            page: 0,
            page_size: page_size.max(1),
            total_count: 0,
            rows: Vec::new(),
            lookups: Lookups::new(),
            state: LoadState::Idle,
            refresh: RefreshHandle { tx: Arc::new(tx) },
            refresh_rx,
            viewport_changed: true,
            last_issued: 0,
        }
    }

    pub fn spec(&self) -> &EntitySpec {
        &self.spec
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn page_count(&self) -> u64 {
        self.total_count.div_ceil(self.page_size)
    }

    pub fn rows(&self) -> &[ListRow] {
        &self.rows
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn lookups(&self) -> &Lookups {
        &self.lookups
    }

    pub fn refresh_handle(&self) -> RefreshHandle {
        self.refresh.clone()
    }

    pub fn refresh_generation(&self) -> u64 {
        self.refresh.generation()
    }

    /// Moves to page `n`. Pages past the end are allowed; the server decides
    /// what they contain.
    pub fn set_page(&mut self, page: u64) {
        if page != self.page {
            self.page = page;
            self.viewport_changed = true;
        }
    }

    /// Changes the page size and returns to the first page.
    pub fn set_page_size(&mut self, page_size: u64) {
        let page_size = page_size.max(1);
        if page_size != self.page_size || self.page != 0 {
            self.viewport_changed = true;
        }
        self.page_size = page_size;
        self.page = 0;
    }

    pub fn request_refresh(&self) {
        self.refresh.request();
    }

    /// The fetch to run now, if page, size or the refresh signal changed
    /// since the last one was issued.
    pub fn pending_fetch(&mut self) -> Option<FetchTicket> {
        let refreshed = self.refresh_rx.has_changed().unwrap_or(false);
        if !self.viewport_changed && !refreshed {
            return None;
        }
        Some(self.begin_fetch())
    }

    /// Issues a ticket for the current viewport unconditionally.
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.refresh_rx.borrow_and_update();
        self.viewport_changed = false;
        self.last_issued += 1;
        self.state = LoadState::Loading;
        FetchTicket {
            seq: self.last_issued,
            page: self.page,
            page_size: self.page_size,
        }
    }

    /// Applies the result of the fetch identified by `ticket`.
    ///
    /// On error the previous rows are kept and the error is returned.
    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<Value, ApiError>,
    ) -> Result<FetchOutcome, ApiError> {
        if ticket.seq < self.last_issued {
            tracing::debug!(
                entity = %self.spec.name,
                seq = ticket.seq,
                newest = self.last_issued,
                "discarding stale list response"
            );
            return Ok(FetchOutcome::Stale);
        }

        let raw = match result {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(entity = %self.spec.name, error = %err, "list fetch failed");
                self.state = LoadState::Error(err.user_message());
                return Err(err);
            }
        };

        let page = envelope::normalize(&raw, &self.spec.plural_keys);
        // an empty page past the end without an explicit count says nothing
        // about the total
        let keep_total = !page.explicit_total && page.rows.is_empty() && ticket.page > 0;
        if !keep_total {
            self.total_count = page.total;
        }
        self.rows = page
            .rows
            .into_iter()
            .map(|raw| {
                let view = map_row(&raw, &self.spec, &self.lookups);
                ListRow { raw, view }
            })
            .collect();
        self.state = LoadState::Success;

        Ok(FetchOutcome::Applied {
            rows: self.rows.len(),
            total: self.total_count,
        })
    }

    /// Fetches the current viewport.
    pub async fn fetch_page<A: EntityApi>(&mut self, api: &A) -> Result<FetchOutcome, ApiError> {
        let ticket = self.begin_fetch();
        let result = api.list(ticket.page, ticket.page_size).await;
        self.complete_fetch(ticket, result)
    }

    /// Fetches only if something changed since the last fetch.
    pub async fn sync<A: EntityApi>(&mut self, api: &A) -> Result<Option<FetchOutcome>, ApiError> {
        let Some(ticket) = self.pending_fetch() else {
            return Ok(None);
        };
        let result = api.list(ticket.page, ticket.page_size).await;
        self.complete_fetch(ticket, result).map(Some)
    }

    /// Installs an `id -> name` table and re-renders the current rows.
    pub fn set_lookup<I>(&mut self, entity: &str, entries: I)
    where
        I: IntoIterator<Item = (i64, String)>,
    {
        self.lookups.insert(entity, entries);
        for row in &mut self.rows {
            row.view = map_row(&row.raw, &self.spec, &self.lookups);
        }
    }

    /// Loads the full listing of `lookup` and installs it as a lookup table.
    pub async fn load_lookup<A: EntityApi>(
        &mut self,
        lookup: &EntitySpec,
        api: &A,
    ) -> Result<usize, ApiError> {
        let raw = api.all().await?;
        let page = envelope::normalize(&raw, &lookup.plural_keys);
        let options = options_from_rows(&page.rows, &lookup.id_field, &lookup.name_field, None);
        let count = options.len();
        self.set_lookup(&lookup.name, options.into_iter().map(|o| (o.id, o.name)));
        Ok(count)
    }

    /// Soft (deactivate) or hard delete, then refresh.
    pub async fn remove<A: EntityApi>(
        &mut self,
        api: &A,
        id: i64,
        mode: DeleteMode,
    ) -> Result<ApiReply, ApiError> {
        let reply = match mode {
            DeleteMode::Soft => api.deactivate(id).await?,
            DeleteMode::Hard => api.delete(id).await?,
        };
        tracing::info!(entity = %self.spec.name, id, ?mode, "record removed");
        self.request_refresh();
        Ok(reply)
    }

    pub async fn set_active<A: EntityApi>(
        &mut self,
        api: &A,
        id: i64,
        active: bool,
    ) -> Result<ApiReply, ApiError> {
        let reply = if active {
            api.activate(id).await?
        } else {
            api.deactivate(id).await?
        };
        self.request_refresh();
        Ok(reply)
    }
}
