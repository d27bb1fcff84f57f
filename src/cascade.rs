//! Dependent dropdowns: country -> state -> city, course -> module -> topic.

use serde_json::Value;

use crate::entity::value_as_id;
use crate::fields::lookup_path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
}

/// Builds options from raw rows. Rows without a usable id are skipped.
pub fn options_from_rows(
    rows: &[Value],
    id_field: &str,
    name_field: &str,
    parent_field: Option<&str>,
) -> Vec<SelectOption> {
    rows.iter()
        .filter_map(|row| {
            let id = row.get(id_field).and_then(value_as_id)?;
            let name = lookup_path(row, name_field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let parent_id = parent_field.and_then(|field| parent_of(row, field));
            Some(SelectOption {
                id,
                name,
                parent_id,
            })
        })
        .collect()
}

/// Reads `countryId`, falling back to an embedded `country.countryId`.
fn parent_of(row: &Value, field: &str) -> Option<i64> {
    if let Some(id) = row.get(field).and_then(value_as_id) {
        return Some(id);
    }
    let object_key = field.strip_suffix("Id")?;
    row.get(object_key)
        .and_then(|parent| parent.get(field))
        .and_then(value_as_id)
}

/// Children whose parent key equals `parent_id`. No parent, no children.
pub fn filter_children(children: &[SelectOption], parent_id: Option<i64>) -> Vec<SelectOption> {
    let Some(parent_id) = parent_id else {
        return Vec::new();
    };
    children
        .iter()
        .filter(|child| child.parent_id == Some(parent_id))
        .cloned()
        .collect()
}

/// Parent selection, both option lists, and the derived filtered children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeSelection {
    parent_id: Option<i64>,
    parents: Vec<SelectOption>,
    children: Vec<SelectOption>,
    filtered: Vec<SelectOption>,
    selected_child: Option<i64>,
}

impl CascadeSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_parent_options(&mut self, parents: Vec<SelectOption>) {
        self.parents = parents;
    }

    pub fn set_child_options(&mut self, children: Vec<SelectOption>) {
        self.children = children;
        self.recompute();
    }

    /// User picked a parent. The child is cleared unconditionally, even when
    /// the previous child would still pass the new filter.
    pub fn select_parent(&mut self, parent_id: Option<i64>) {
        self.parent_id = parent_id;
        self.selected_child = None;
        self.recompute();
    }

    /// Edit-mode seeding from a loaded record: no clearing.
    pub fn seed(&mut self, parent_id: Option<i64>, child_id: Option<i64>) {
        self.parent_id = parent_id;
        self.selected_child = child_id;
        self.recompute();
    }

    pub fn select_child(&mut self, child_id: Option<i64>) {
        self.selected_child = child_id;
    }

    pub fn clear(&mut self) {
        self.parent_id = None;
        self.selected_child = None;
        self.filtered.clear();
    }

    pub fn parent_id(&self) -> Option<i64> {
        self.parent_id
    }

    pub fn selected_child(&self) -> Option<i64> {
        self.selected_child
    }

    pub fn parents(&self) -> &[SelectOption] {
        &self.parents
    }

    pub fn filtered_children(&self) -> &[SelectOption] {
        &self.filtered
    }

    fn recompute(&mut self) {
        self.filtered = filter_children(&self.children, self.parent_id);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn states() -> Vec<SelectOption> {
        options_from_rows(
            &[
                json!({"stateId": 1, "stateName": "Kerala", "countryId": 10}),
                json!({"stateId": 2, "stateName": "Goa", "countryId": 10}),
                json!({"stateId": 3, "stateName": "Ohio", "country": {"countryId": 20}}),
                json!({"stateName": "Orphan", "countryId": 10}),
            ],
            "stateId",
            "stateName",
            Some("countryId"),
        )
    }

    #[test]
    fn options_read_embedded_parent_and_skip_missing_ids() {
        let options = states();
        assert_eq!(options.len(), 3);
        assert_eq!(options[2].parent_id, Some(20));
        assert_eq!(options[0].name, "Kerala");
    }

    #[test]
    fn filter_by_parent() {
        let filtered = filter_children(&states(), Some(10));
        let ids: Vec<i64> = filtered.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(filter_children(&states(), None).is_empty());
        assert!(filter_children(&states(), Some(99)).is_empty());
    }

    #[test]
    fn parent_change_always_clears_child() {
        let mut cascade = CascadeSelection::new();
        cascade.set_child_options(states());
        cascade.select_parent(Some(10));
        cascade.select_child(Some(2));

        // same parent again still clears
        cascade.select_parent(Some(10));
        assert_eq!(cascade.selected_child(), None);

        cascade.select_child(Some(1));
        cascade.select_parent(Some(20));
        assert_eq!(cascade.selected_child(), None);
        assert_eq!(cascade.filtered_children().len(), 1);
    }

    #[test]
    fn seeding_keeps_child_and_filters_immediately() {
        let mut cascade = CascadeSelection::new();
        cascade.seed(Some(10), Some(2));
        cascade.set_child_options(states());
        assert_eq!(cascade.selected_child(), Some(2));
        assert_eq!(cascade.filtered_children().len(), 2);
    }
}
