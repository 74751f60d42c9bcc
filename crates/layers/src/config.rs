//! Layer entries as written in a portal's `config.json`.

use catalog::{OneOrMany, ScaleValue, lenient};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::style::StyleEntry;

/// One configured layer reference.
///
/// `id` is either a single catalog id or a list of ids. Fields the engine does
/// not interpret are kept in `extra` and copied onto the resolved layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerConfigEntry {
    pub id: OneOrMany,
    #[serde(
        default,
        deserialize_with = "lenient::bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub visibility: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::scale",
        skip_serializing_if = "Option::is_none"
    )]
    pub min_scale: Option<ScaleValue>,
    #[serde(
        default,
        deserialize_with = "lenient::scale",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_scale: Option<ScaleValue>,
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub style_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub typ: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ChildConfig>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A configured child of a group layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildConfig {
    pub id: String,
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub style_id: Option<String>,
    /// Appended to the child id as `<id>.<suffix>`.
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub suffix: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChildConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            style_id: None,
            suffix: None,
            extra: Map::new(),
        }
    }

    /// Id the resolved child carries.
    pub fn resolved_id(&self) -> String {
        match self.suffix.as_deref() {
            Some(suffix) if !suffix.is_empty() => format!("{}.{suffix}", self.id),
            _ => self.id.clone(),
        }
    }
}

/// Shape of a configured entry, classified once before resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerRef {
    /// A single catalog id.
    Single(String),
    /// Several catalog ids combined into one renderable layer.
    MergeGroup(Vec<String>),
    /// A `GROUP` layer composed of independently resolved children.
    ExplicitGroup {
        id: Option<String>,
        children: Vec<ChildConfig>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedEntry {
    EmptyId,
    EmptyIdList,
    EmptyGroup,
}

impl std::fmt::Display for MalformedEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MalformedEntry::EmptyId => write!(f, "layer entry has an empty id"),
            MalformedEntry::EmptyIdList => write!(f, "layer entry has an empty id list"),
            MalformedEntry::EmptyGroup => write!(f, "group layer entry has no children"),
        }
    }
}

impl std::error::Error for MalformedEntry {}

pub const GROUP_TYP: &str = "GROUP";

impl LayerConfigEntry {
    pub fn new(id: impl Into<OneOrMany>) -> Self {
        Self {
            id: id.into(),
            visibility: None,
            name: None,
            min_scale: None,
            max_scale: None,
            style_id: None,
            typ: None,
            children: None,
            extra: Map::new(),
        }
    }

    pub fn is_group(&self) -> bool {
        self.typ
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(GROUP_TYP))
    }

    pub fn layer_ref(&self) -> Result<LayerRef, MalformedEntry> {
        let configured_children = self.children.as_ref().filter(|c| !c.is_empty());

        if self.is_group() {
            if let Some(children) = configured_children {
                let id = match &self.id {
                    OneOrMany::One(id) if !id.is_empty() => Some(id.clone()),
                    _ => None,
                };
                return Ok(LayerRef::ExplicitGroup {
                    id,
                    children: children.clone(),
                });
            }
            if let OneOrMany::Many(ids) = &self.id {
                let ids = non_empty_ids(ids).ok_or(MalformedEntry::EmptyGroup)?;
                return Ok(LayerRef::ExplicitGroup {
                    id: None,
                    children: ids.into_iter().map(ChildConfig::new).collect(),
                });
            }
        }

        match &self.id {
            OneOrMany::One(id) if id.is_empty() => Err(MalformedEntry::EmptyId),
            OneOrMany::One(id) => Ok(LayerRef::Single(id.clone())),
            OneOrMany::Many(ids) => non_empty_ids(ids)
                .map(LayerRef::MergeGroup)
                .ok_or(MalformedEntry::EmptyIdList),
        }
    }

    /// Configured fields that overwrite the resolved layer's fields.
    ///
    /// `id` and `children` are left out: the resolver decides both.
    pub fn overrides(&self) -> Map<String, Value> {
        let mut map = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        map.remove("id");
        map.remove("children");
        map
    }

    /// Human readable id for log messages.
    pub fn display_id(&self) -> String {
        self.id.as_slice().join(",")
    }
}

fn non_empty_ids(ids: &[String]) -> Option<Vec<String>> {
    if ids.is_empty() || ids.iter().any(String::is_empty) {
        return None;
    }
    Some(ids.to_vec())
}

/// String list that degrades to empty when the value has the wrong shape.
pub fn string_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

/// Like [`string_list`], but keeps "not configured" distinct from empty.
pub fn optional_string_list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<String>>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    if !value.is_array() {
        return Ok(None);
    }
    string_list(value).map(Some).map_err(serde::de::Error::custom)
}

/// Style entries; malformed items are dropped.
pub fn style_entries<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<StyleEntry>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect(),
        _ => Vec::new(),
    })
}
