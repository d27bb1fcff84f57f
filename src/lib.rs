//! Controllers behind the reference-data admin console: envelope and field
//! normalization, paginated lists, add/edit dialogs and cascading selects,
//! all driven through the [`api::EntityApi`] seam.

pub mod api;
pub mod cascade;
pub mod config;
pub mod dialog;
pub mod entity;
pub mod envelope;
pub mod error;
pub mod fields;
pub mod list;
pub mod session;

pub use api::{Backend, EntityApi, HttpEntityClient};
pub use dialog::{DialogMode, FormDialogController, SubmitOutcome};
pub use entity::{EntityRegistry, EntitySpec};
pub use error::{ApiError, FieldErrors, SubmitError};
pub use list::{DeleteMode, FetchOutcome, FetchTicket, LoadState, PaginatedListController, RefreshHandle};
pub use session::AuthService;
