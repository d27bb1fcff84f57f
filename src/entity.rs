//! Per-entity configuration: identifiers, columns, form fields and cascades.
//!
//! Every reference-data screen is the same controller parameterized by an
//! [`EntitySpec`]. The built-in registry covers the entities the console
//! administers; endpoint paths can be overridden from the config file.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// How a display column derives its text from a raw record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    /// Plain text at a (possibly dotted) path.
    Text { path: String },
    /// Timestamp at a path, rendered with the fixed date format.
    Date { path: String },
    /// The resolved activity flag, rendered "Active" / "Inactive".
    Active,
    /// Foreign key resolved through a lookup table, falling back to an
    /// embedded denormalized name.
    Lookup {
        key: String,
        lookup: String,
        embedded: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub label: String,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub fn text(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: ColumnKind::Text {
                path: name.to_string(),
            },
        }
    }

    pub fn path(name: &str, label: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: ColumnKind::Text {
                path: path.to_string(),
            },
        }
    }

    pub fn date(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: ColumnKind::Date {
                path: name.to_string(),
            },
        }
    }

    pub fn active() -> Self {
        Self {
            name: "status".to_string(),
            label: "Status".to_string(),
            kind: ColumnKind::Active,
        }
    }

    pub fn lookup(name: &str, label: &str, key: &str, lookup: &str, embedded: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: ColumnKind::Lookup {
                key: key.to_string(),
                lookup: lookup.to_string(),
                embedded: embedded.iter().map(|s| s.to_string()).collect(),
            },
        }
    }
}

/// A validation rule applied to one form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Non-empty after trimming.
    Required,
    /// A parent id must be chosen (positive integer).
    Selected,
    /// Exactly `len` ASCII uppercase letters.
    UppercaseCode(usize),
    MaxLength(usize),
    /// `http://` or `https://` followed by something.
    Url,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// Reference to another entity's id; value is numeric.
    Reference { entity: String },
    Flag,
    Date,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub rules: Vec<Rule>,
}

impl FieldSpec {
    pub fn text(name: &str, label: &str, rules: &[Rule]) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::Text,
            rules: rules.to_vec(),
        }
    }

    pub fn reference(name: &str, label: &str, entity: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::Reference {
                entity: entity.to_string(),
            },
            rules: vec![Rule::Selected],
        }
    }

    pub fn date(name: &str, label: &str, rules: &[Rule]) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::Date,
            rules: rules.to_vec(),
        }
    }

    pub fn flag(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::Flag,
            rules: Vec::new(),
        }
    }

    /// Value a blank add-form starts with.
    pub fn blank_value(&self) -> Value {
        match self.kind {
            FieldKind::Flag => Value::Bool(true),
            FieldKind::Reference { .. } => Value::Null,
            FieldKind::Text | FieldKind::Date => Value::String(String::new()),
        }
    }
}

/// A dependent selection inside a form: choosing `parent_field` filters the
/// options of `child_field`, whose options carry `parent_field` as their
/// parent key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeSpec {
    pub parent_field: String,
    pub parent_entity: String,
    pub child_field: String,
    pub child_entity: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySpec {
    /// Registry key, e.g. `"country"`.
    pub name: String,
    /// Human label, e.g. `"Country"`.
    pub label: String,
    /// Identifier field, e.g. `"countryId"`.
    pub id_field: String,
    /// Field used as the option label in dropdowns.
    pub name_field: String,
    /// Key a row may be wrapped under (`{ "state": { ... } }`).
    pub singular_key: String,
    /// Candidate plural array keys in list envelopes.
    pub plural_keys: Vec<String>,
    /// REST base path, e.g. `"/country"`.
    pub base_path: String,
    pub columns: Vec<ColumnSpec>,
    pub fields: Vec<FieldSpec>,
    pub cascades: Vec<CascadeSpec>,
}

impl EntitySpec {
    fn new(name: &str, label: &str, singular: &str, plurals: &[&str], base_path: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            id_field: format!("{}Id", singular),
            name_field: format!("{}Name", singular),
            singular_key: singular.to_string(),
            plural_keys: plurals.iter().map(|s| s.to_string()).collect(),
            base_path: base_path.to_string(),
            columns: Vec::new(),
            fields: Vec::new(),
            cascades: Vec::new(),
        }
    }

    fn labelled_by(mut self, field: &str) -> Self {
        self.name_field = field.to_string();
        self
    }

    fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    fn cascade(mut self, parent_field: &str, parent_entity: &str, child_field: &str, child_entity: &str) -> Self {
        self.cascades.push(CascadeSpec {
            parent_field: parent_field.to_string(),
            parent_entity: parent_entity.to_string(),
            child_field: child_field.to_string(),
            child_entity: child_entity.to_string(),
        });
        self
    }

    /// Adds the audit columns every listing shows.
    fn audited(self) -> Self {
        self.column(ColumnSpec::active())
            .column(ColumnSpec::date("insertedDate", "Created"))
            .column(ColumnSpec::path("insertedBy", "Created By", "insertedBy.userName"))
            .column(ColumnSpec::date("updatedDate", "Updated"))
            .column(ColumnSpec::path("updatedBy", "Updated By", "updatedBy.userName"))
    }

    pub fn field_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Entities whose `/v1/all` listing feeds a lookup column.
    pub fn lookup_entities(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for column in &self.columns {
            if let ColumnKind::Lookup { lookup, .. } = &column.kind {
                if !out.contains(&lookup.as_str()) {
                    out.push(lookup);
                }
            }
        }
        out
    }

    /// Blank template for the add dialog: strings empty, active, no parents.
    pub fn blank_record(&self) -> Map<String, Value> {
        let mut record = Map::new();
        for field in &self.fields {
            record.insert(field.name.clone(), field.blank_value());
        }
        record
            .entry("isActive".to_string())
            .or_insert(Value::Bool(true));
        record
    }

    /// Reads the record identifier, accepting numbers and numeric strings.
    pub fn record_id(&self, record: &Value) -> Option<i64> {
        record.get(&self.id_field).and_then(value_as_id)
    }
}

/// Coerces an id-ish JSON value into a positive integer.
pub fn value_as_id(value: &Value) -> Option<i64> {
    let id = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    (id > 0).then_some(id)
}

/// Built-in entity configurations keyed by name.
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    entities: BTreeMap<String, EntitySpec>,
}

impl EntityRegistry {
    pub fn builtin() -> Self {
        let mut entities = BTreeMap::new();
        for spec in builtin_specs() {
            entities.insert(spec.name.clone(), spec);
        }
        Self { entities }
    }

    pub fn get(&self, name: &str) -> Option<&EntitySpec> {
        self.entities.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntitySpec> {
        self.entities.values()
    }

    /// Replaces the REST base path of an entity. Returns false for unknown names.
    pub fn override_path(&mut self, name: &str, path: &str) -> bool {
        match self.entities.get_mut(name) {
            Some(spec) => {
                spec.base_path = normalize_base_path(path);
                true
            }
            None => false,
        }
    }
}

fn normalize_base_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn simple(name: &str, label: &str, singular: &str, plurals: &[&str], base_path: &str) -> EntitySpec {
    let spec = EntitySpec::new(name, label, singular, plurals, base_path);
    let name_field = spec.name_field.clone();
    let id_field = spec.id_field.clone();
    spec.column(ColumnSpec::text(&id_field, "ID"))
        .column(ColumnSpec::text(&name_field, label))
        .field(FieldSpec::text(
            &name_field,
            &format!("{} name", label),
            &[Rule::Required, Rule::MaxLength(100)],
        ))
        .audited()
}

fn builtin_specs() -> Vec<EntitySpec> {
    vec![
        EntitySpec::new("country", "Country", "country", &["countries", "countryList"], "/country")
            .column(ColumnSpec::text("countryId", "ID"))
            .column(ColumnSpec::text("countryName", "Country"))
            .column(ColumnSpec::text("countryCode", "Code"))
            .field(FieldSpec::text(
                "countryName",
                "Country name",
                &[Rule::Required, Rule::MaxLength(100)],
            ))
            .field(FieldSpec::text(
                "countryCode",
                "Country code",
                &[Rule::Required, Rule::UppercaseCode(2)],
            ))
            .audited(),
        EntitySpec::new("state", "State", "state", &["states", "stateList"], "/state")
            .column(ColumnSpec::text("stateId", "ID"))
            .column(ColumnSpec::text("stateName", "State"))
            .column(ColumnSpec::lookup(
                "country",
                "Country",
                "countryId",
                "country",
                &["countryName", "country.countryName"],
            ))
            .field(FieldSpec::reference("countryId", "Country", "country"))
            .field(FieldSpec::text(
                "stateName",
                "State name",
                &[Rule::Required, Rule::MaxLength(100)],
            ))
            .audited(),
        EntitySpec::new("city", "City", "city", &["cities", "cityList"], "/city")
            .column(ColumnSpec::text("cityId", "ID"))
            .column(ColumnSpec::text("cityName", "City"))
            .column(ColumnSpec::lookup(
                "state",
                "State",
                "stateId",
                "state",
                &["stateName", "state.stateName"],
            ))
            .column(ColumnSpec::lookup(
                "country",
                "Country",
                "countryId",
                "country",
                &["countryName", "country.countryName", "state.country.countryName"],
            ))
            .field(FieldSpec::reference("countryId", "Country", "country"))
            .field(FieldSpec::reference("stateId", "State", "state"))
            .field(FieldSpec::text(
                "cityName",
                "City name",
                &[Rule::Required, Rule::MaxLength(100)],
            ))
            .cascade("countryId", "country", "stateId", "state")
            .audited(),
        simple("skill", "Skill", "skill", &["skills", "skillList"], "/skill"),
        simple("eye-color", "Eye Color", "eyeColor", &["eyeColors", "eyeColorList"], "/eye-color"),
        simple("skin-color", "Skin Color", "skinColor", &["skinColors", "skinColorList"], "/skin-color"),
        simple(
            "qualification",
            "Qualification",
            "qualification",
            &["qualifications", "qualificationList"],
            "/qualification",
        ),
        EntitySpec::new("language", "Language", "language", &["languages", "languageList"], "/language")
            .column(ColumnSpec::text("languageId", "ID"))
            .column(ColumnSpec::text("languageName", "Language"))
            .column(ColumnSpec::text("languageCode", "Code"))
            .field(FieldSpec::text(
                "languageName",
                "Language name",
                &[Rule::Required, Rule::MaxLength(100)],
            ))
            .field(FieldSpec::text(
                "languageCode",
                "Language code",
                &[Rule::Required, Rule::UppercaseCode(2)],
            ))
            .audited(),
        EntitySpec::new("course", "Course", "course", &["courses", "courseList"], "/course")
            .column(ColumnSpec::text("courseId", "ID"))
            .column(ColumnSpec::text("courseName", "Course"))
            .column(ColumnSpec::text("description", "Description"))
            .field(FieldSpec::text(
                "courseName",
                "Course name",
                &[Rule::Required, Rule::MaxLength(150)],
            ))
            .field(FieldSpec::text("description", "Description", &[Rule::MaxLength(500)]))
            .audited(),
        EntitySpec::new("module", "Module", "module", &["modules", "moduleList"], "/module")
            .column(ColumnSpec::text("moduleId", "ID"))
            .column(ColumnSpec::text("moduleName", "Module"))
            .column(ColumnSpec::lookup(
                "course",
                "Course",
                "courseId",
                "course",
                &["courseName", "course.courseName"],
            ))
            .field(FieldSpec::reference("courseId", "Course", "course"))
            .field(FieldSpec::text(
                "moduleName",
                "Module name",
                &[Rule::Required, Rule::MaxLength(150)],
            ))
            .field(FieldSpec::text("description", "Description", &[Rule::MaxLength(500)]))
            .audited(),
        EntitySpec::new("topic", "Topic", "topic", &["topics", "topicList"], "/topic")
            .column(ColumnSpec::text("topicId", "ID"))
            .column(ColumnSpec::text("topicName", "Topic"))
            .column(ColumnSpec::lookup(
                "module",
                "Module",
                "moduleId",
                "module",
                &["moduleName", "module.moduleName"],
            ))
            .column(ColumnSpec::lookup(
                "course",
                "Course",
                "courseId",
                "course",
                &["courseName", "course.courseName", "module.course.courseName"],
            ))
            .field(FieldSpec::reference("courseId", "Course", "course"))
            .field(FieldSpec::reference("moduleId", "Module", "module"))
            .field(FieldSpec::text(
                "topicName",
                "Topic name",
                &[Rule::Required, Rule::MaxLength(150)],
            ))
            .cascade("courseId", "course", "moduleId", "module")
            .audited(),
        EntitySpec::new("banner-ad", "Banner Ad", "bannerAd", &["bannerAds", "bannerAdList", "banners"], "/banner-ad")
            .labelled_by("title")
            .column(ColumnSpec::text("bannerAdId", "ID"))
            .column(ColumnSpec::text("title", "Title"))
            .column(ColumnSpec::text("redirectUrl", "Link"))
            .column(ColumnSpec::date("startDate", "Starts"))
            .column(ColumnSpec::date("endDate", "Ends"))
            .field(FieldSpec::text("title", "Title", &[Rule::Required, Rule::MaxLength(120)]))
            .field(FieldSpec::text("imageUrl", "Image URL", &[Rule::Required, Rule::Url]))
            .field(FieldSpec::text("redirectUrl", "Link", &[Rule::Url]))
            .field(FieldSpec::date("startDate", "Start date", &[Rule::Required]))
            .field(FieldSpec::date("endDate", "End date", &[]))
            .field(FieldSpec::flag("isActive", "Active"))
            .audited(),
    ]
}
