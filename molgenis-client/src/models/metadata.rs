use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata of an entity as served by `<entity>/meta`.
///
/// Attribute entries only carry a `href` unless the server expanded them, so every
/// [`AttributeMetadata`] field is optional. Use the column metadata endpoint for the
/// authoritative description of a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub id_attribute: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_attribute: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writable: Option<bool>,
}

impl EntityMetadata {
    pub fn new(id_attribute: impl Into<String>) -> Self {
        Self {
            href: None,
            name: None,
            label: None,
            description: None,
            id_attribute: id_attribute.into(),
            label_attribute: None,
            attributes: BTreeMap::new(),
            writable: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_attribute(
        mut self,
        column: impl Into<String>,
        attribute: AttributeMetadata,
    ) -> Self {
        self.attributes.insert(column.into(), attribute);
        self
    }

    pub fn column_names(&self) -> Vec<String> {
        self.attributes.keys().cloned().collect()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.attributes.contains_key(column)
    }
}

/// Metadata of a single column, served by `<entity>/meta/<column>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,
    #[serde(default)]
    pub auto: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nillable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_entity: Option<serde_json::Value>,
}

impl AttributeMetadata {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type: Some(field_type),
            ..Default::default()
        }
    }

    /// An `ENUM` column restricted to `options`.
    pub fn enumeration<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field_type: Some(FieldType::Enum),
            enum_options: options.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_auto(mut self, auto: bool) -> Self {
        self.auto = auto;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    Bool,
    Categorical,
    CategoricalMref,
    Compound,
    Date,
    DateTime,
    Decimal,
    Email,
    Enum,
    File,
    Html,
    Hyperlink,
    Int,
    Long,
    Mref,
    OneToMany,
    Script,
    String,
    Text,
    Xref,
    /// A type this client does not know about yet.
    #[serde(other)]
    Unknown,
}
