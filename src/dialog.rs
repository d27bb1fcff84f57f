//! Add/edit dialog controller.

use serde_json::{Map, Value};

use crate::api::EntityApi;
use crate::cascade::{options_from_rows, CascadeSelection, SelectOption};
use crate::entity::{value_as_id, CascadeSpec, EntitySpec, FieldKind, FieldSpec, Rule};
use crate::envelope::{self, ApiReply};
use crate::error::{ApiError, FieldErrors, SubmitError};
use crate::fields::coerce_flag;
use crate::list::RefreshHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogMode {
    Closed,
    Add,
    /// Visible, waiting for the record to arrive.
    EditLoading(i64),
    EditReady(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Created(ApiReply),
    Updated { id: i64, reply: ApiReply },
}

pub struct FormDialogController {
    spec: EntitySpec,
    mode: DialogMode,
    record: Map<String, Value>,
    errors: FieldErrors,
    feedback: Option<String>,
    cascades: Vec<(CascadeSpec, CascadeSelection)>,
    refresh: RefreshHandle,
}

impl FormDialogController {
    /// `refresh` is signalled after every successful submit.
    pub fn new(spec: EntitySpec, refresh: RefreshHandle) -> Self {
        let cascades = spec
            .cascades
            .iter()
            .cloned()
            .map(|cascade| (cascade, CascadeSelection::new()))
            .collect();
        let record = spec.blank_record();
        Self {
            spec,
            mode: DialogMode::Closed,
            record,
            errors: FieldErrors::new(),
            feedback: None,
            cascades,
            refresh,
        }
    }

    pub fn mode(&self) -> DialogMode {
        self.mode
    }

    pub fn is_open(&self) -> bool {
        self.mode != DialogMode::Closed
    }

    pub fn record(&self) -> &Map<String, Value> {
        &self.record
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    /// Alert text from the last failed submit.
    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    pub fn editing_id(&self) -> Option<i64> {
        match self.mode {
            DialogMode::EditLoading(id) | DialogMode::EditReady(id) => Some(id),
            _ => None,
        }
    }

    pub fn open_add(&mut self) {
        self.reset();
        self.mode = DialogMode::Add;
    }

    /// Shows the dialog in its loading state. Nothing from a previous
    /// session is kept.
    pub fn begin_edit(&mut self, id: i64) {
        self.reset();
        self.record.clear();
        self.mode = DialogMode::EditLoading(id);
    }

    /// Completes an edit-load. Failure closes the dialog: there is no safe
    /// partial-edit state. A completion for a dialog that is no longer
    /// loading `id` is ignored.
    pub fn finish_edit(&mut self, id: i64, result: Result<Value, ApiError>) -> Result<(), ApiError> {
        if self.mode != DialogMode::EditLoading(id) {
            tracing::debug!(entity = %self.spec.name, id, "ignoring edit-load for inactive dialog");
            return Ok(());
        }

        let loaded = result.and_then(|raw| {
            envelope::unwrap_record(&raw, &self.spec.singular_key, &self.spec.id_field)
                .ok_or(ApiError::NotFound { id })
        });
        let record = match loaded {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(entity = %self.spec.name, id, error = %err, "edit-load failed");
                self.close();
                return Err(err);
            }
        };

        for (cascade, selection) in &mut self.cascades {
            let parent = record.get(&cascade.parent_field).and_then(value_as_id);
            let child = record.get(&cascade.child_field).and_then(value_as_id);
            selection.seed(parent, child);
        }
        self.record = record;
        self.mode = DialogMode::EditReady(id);
        Ok(())
    }

    pub async fn open_edit<A: EntityApi>(&mut self, api: &A, id: i64) -> Result<(), ApiError> {
        self.begin_edit(id);
        let result = api.get(id).await;
        self.finish_edit(id, result)
    }

    /// Updates one field and clears that field's error only. Changing a
    /// cascade parent clears its child, and the child's children.
    pub fn set_field(&mut self, name: &str, value: Value) -> bool {
        if !matches!(self.mode, DialogMode::Add | DialogMode::EditReady(_)) {
            return false;
        }
        self.record.insert(name.to_string(), value);
        self.errors.remove(name);

        let mut changed = vec![name.to_string()];
        while let Some(field) = changed.pop() {
            let value_id = self.record.get(&field).and_then(value_as_id);
            for (cascade, selection) in &mut self.cascades {
                if cascade.parent_field == field {
                    selection.select_parent(value_id);
                    self.record.insert(cascade.child_field.clone(), Value::Null);
                    changed.push(cascade.child_field.clone());
                }
                if cascade.child_field == field {
                    selection.select_child(value_id);
                }
            }
        }
        true
    }

    /// Like [`set_field`](Self::set_field) but converts text input according
    /// to the field's kind.
    pub fn set_field_text(&mut self, name: &str, text: &str) -> bool {
        let value = match self.spec.field_spec(name) {
            Some(field) => coerce_input(field, text),
            None => Value::String(text.to_string()),
        };
        self.set_field(name, value)
    }

    /// Installs dropdown options for a form field.
    pub fn set_options(&mut self, field: &str, options: Vec<SelectOption>) {
        for (cascade, selection) in &mut self.cascades {
            if cascade.parent_field == field {
                selection.set_parent_options(options.clone());
            }
            if cascade.child_field == field {
                selection.set_child_options(options.clone());
            }
        }
    }

    /// Options currently offered for `field`; children are filtered by the
    /// selected parent.
    pub fn options_for(&self, field: &str) -> Vec<SelectOption> {
        for (cascade, selection) in &self.cascades {
            if cascade.child_field == field {
                return selection.filtered_children().to_vec();
            }
        }
        for (cascade, selection) in &self.cascades {
            if cascade.parent_field == field {
                return selection.parents().to_vec();
            }
        }
        Vec::new()
    }

    /// Loads `/all` for the entity behind `field` and installs it.
    pub async fn load_options<A: EntityApi>(
        &mut self,
        field: &str,
        entity: &EntitySpec,
        api: &A,
    ) -> Result<usize, ApiError> {
        let parent_field = self
            .cascades
            .iter()
            .find(|(cascade, _)| cascade.child_field == field)
            .map(|(cascade, _)| cascade.parent_field.clone());
        let raw = api.all().await?;
        let page = envelope::normalize(&raw, &entity.plural_keys);
        let options = options_from_rows(
            &page.rows,
            &entity.id_field,
            &entity.name_field,
            parent_field.as_deref(),
        );
        let count = options.len();
        self.set_options(field, options);
        Ok(count)
    }

    pub fn validate(&self) -> FieldErrors {
        validate(&self.spec, &self.record)
    }

    /// Validates, then creates (add) or updates (edit). Success closes the
    /// dialog and signals the list; failure keeps everything entered.
    pub async fn submit<A: EntityApi>(&mut self, api: &A) -> Result<SubmitOutcome, SubmitError> {
        let editing = match self.mode {
            DialogMode::Add => None,
            DialogMode::EditReady(id) => Some(id),
            DialogMode::Closed | DialogMode::EditLoading(_) => return Err(SubmitError::NotOpen),
        };

        let errors = self.validate();
        if !errors.is_empty() {
            self.errors = errors.clone();
            return Err(SubmitError::Invalid(errors));
        }
        self.feedback = None;

        let mut body = self.record.clone();
        let result = match editing {
            None => {
                body.remove(&self.spec.id_field);
                api.create(&Value::Object(body)).await
            }
            Some(id) => {
                body.insert(self.spec.id_field.clone(), Value::from(id));
                api.update(id, &Value::Object(body)).await
            }
        };
        let result = result.and_then(|reply| {
            if reply.is_success() {
                Ok(reply)
            } else {
                Err(ApiError::Rejected {
                    code: reply.code.unwrap_or_default(),
                    message: reply.failure_message(),
                })
            }
        });

        match result {
            Ok(reply) => {
                tracing::info!(entity = %self.spec.name, ?editing, "record saved");
                self.close();
                self.refresh.request();
                Ok(match editing {
                    None => SubmitOutcome::Created(reply),
                    Some(id) => SubmitOutcome::Updated { id, reply },
                })
            }
            Err(err) => {
                self.feedback = Some(err.user_message());
                Err(SubmitError::Api(err))
            }
        }
    }

    pub fn close(&mut self) {
        self.reset();
        self.mode = DialogMode::Closed;
    }

    fn reset(&mut self) {
        self.record = self.spec.blank_record();
        self.errors.clear();
        self.feedback = None;
        for (_, selection) in &mut self.cascades {
            selection.clear();
        }
    }
}

/// Converts raw text for a field: ids become numbers, flags booleans.
pub fn coerce_input(field: &FieldSpec, text: &str) -> Value {
    let trimmed = text.trim();
    match field.kind {
        FieldKind::Reference { .. } => trimmed
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or(Value::Null),
        FieldKind::Flag => coerce_flag(&Value::String(trimmed.to_string()))
            .map(Value::Bool)
            .unwrap_or(Value::Bool(true)),
        FieldKind::Text | FieldKind::Date => Value::String(text.to_string()),
    }
}

/// Applies the entity's field rules. An empty result allows submit.
pub fn validate(spec: &EntitySpec, record: &Map<String, Value>) -> FieldErrors {
    let mut errors = FieldErrors::new();
    for field in &spec.fields {
        let value = record.get(&field.name).unwrap_or(&Value::Null);
        let text = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => String::new(),
        };
        for rule in &field.rules {
            let message = match rule {
                Rule::Required if text.is_empty() => format!("{} is required", field.label),
                Rule::Selected if value_as_id(value).is_none() => {
                    format!("Please select a {}", field.label.to_lowercase())
                }
                Rule::UppercaseCode(len)
                    if !text.is_empty()
                        && (text.chars().count() != *len
                            || !text.chars().all(|c| c.is_ascii_uppercase())) =>
                {
                    format!("{} must be {} uppercase letters", field.label, len)
                }
                Rule::MaxLength(max) if text.chars().count() > *max => {
                    format!("{} must be at most {} characters", field.label, max)
                }
                Rule::Url if !text.is_empty() && !is_http_url(&text) => {
                    format!("{} must be an http(s) URL", field.label)
                }
                _ => continue,
            };
            errors.insert(field.name.clone(), message);
        }
    }
    errors
}

fn is_http_url(text: &str) -> bool {
    ["http://", "https://"].iter().any(|scheme| {
        text.strip_prefix(scheme)
            .map_or(false, |rest| !rest.is_empty() && !rest.contains(char::is_whitespace))
    })
}
