//! Raw layer records as they appear in a portal's `services.json`.
//!
//! Only the fields the engine reads or writes are typed. Everything else is
//! kept in `extra` so records round-trip without losing information.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Scale bound, written either as a JSON number or a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScaleValue {
    Number(Number),
    Text(String),
}

impl ScaleValue {
    pub fn from_f64(value: f64) -> Self {
        if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            return ScaleValue::Number(Number::from(value as i64));
        }
        match Number::from_f64(value) {
            Some(n) => ScaleValue::Number(n),
            None => ScaleValue::Text(value.to_string()),
        }
    }

    /// Numeric value, or `None` when the text is not a finite number.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            ScaleValue::Number(n) => n.as_f64()?,
            ScaleValue::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for ScaleValue {
    fn from(value: f64) -> Self {
        ScaleValue::from_f64(value)
    }
}

/// A string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn as_slice(&self) -> &[String] {
        match self {
            OneOrMany::One(s) => std::slice::from_ref(s),
            OneOrMany::Many(v) => v,
        }
    }

    pub fn is_many(&self) -> bool {
        matches!(self, OneOrMany::Many(_))
    }

    /// Positional access. A scalar applies to every index.
    pub fn get(&self, index: usize) -> Option<&str> {
        match self {
            OneOrMany::One(s) => Some(s),
            OneOrMany::Many(v) => v.get(index).map(String::as_str),
        }
    }
}

impl From<&str> for OneOrMany {
    fn from(value: &str) -> Self {
        OneOrMany::One(value.to_string())
    }
}

impl From<Vec<&str>> for OneOrMany {
    fn from(values: Vec<&str>) -> Self {
        OneOrMany::Many(values.into_iter().map(str::to_string).collect())
    }
}

/// Metadata record attached to a layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub md_id: String,
    #[serde(default)]
    pub md_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kategorie_opendata: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kategorie_inspire: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kategorie_organisation: Option<OneOrMany>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Dataset {
    pub fn new(md_id: impl Into<String>, md_name: impl Into<String>) -> Self {
        Self {
            md_id: md_id.into(),
            md_name: md_name.into(),
            ..Self::default()
        }
    }

    /// Non-empty classification values stored under `key`.
    ///
    /// Missing keys, empty strings and empty lists all yield an empty vec.
    pub fn classification(&self, key: &str) -> Vec<String> {
        let typed = match key {
            "kategorie_opendata" => Some(&self.kategorie_opendata),
            "kategorie_inspire" => Some(&self.kategorie_inspire),
            "kategorie_organisation" => Some(&self.kategorie_organisation),
            _ => None,
        };
        let values = match typed {
            Some(field) => field
                .as_ref()
                .map(|v| v.as_slice().to_vec())
                .unwrap_or_default(),
            None => self.extra.get(key).map(strings_of).unwrap_or_default(),
        };
        values
            .into_iter()
            .filter(|v| !v.trim().is_empty())
            .collect()
    }
}

fn strings_of(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// One catalog layer definition, also used for resolved layers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLayer {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    /// Tree node type, `"layer"` once resolved.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layers: Option<String>,
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styles: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_id: Option<String>,
    #[serde(rename = "legendURL", default, skip_serializing_if = "Option::is_none")]
    pub legend_url: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gfi_attributes: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datasets: Vec<Dataset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<RawLayer>>,
    #[serde(
        default,
        deserialize_with = "lenient::bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub visibility: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient::bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub show_in_layer_tree: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient::u64",
        skip_serializing_if = "Option::is_none"
    )]
    pub z_index: Option<u64>,
    #[serde(rename = "is3DLayer", default, skip_serializing_if = "Option::is_none")]
    pub is_3d_layer: Option<bool>,
    /// Id of the enclosing folder, set by the tree builder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Id of the catalog record this one was split from, per dataset.
    #[serde(skip)]
    pub split_from: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub const PLACEHOLDER_NAME_PREFIX: &str = "WARN: Layer with id ";

impl RawLayer {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Stand-in for an id the catalog does not know.
    pub fn placeholder(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: format!(
                "{PLACEHOLDER_NAME_PREFIX}{id} was not found in services.json and has no name! "
            ),
            id,
            node_type: Some("layer".to_string()),
            is_3d_layer: Some(false),
            ..Self::default()
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.name.starts_with(PLACEHOLDER_NAME_PREFIX)
    }

    /// Case-insensitive comparison of the service type.
    pub fn has_typ(&self, typ: &str) -> bool {
        self.typ
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(typ))
    }

    /// The layer's primary dataset.
    pub fn dataset(&self) -> Option<&Dataset> {
        self.datasets.first()
    }

    pub fn md_id(&self) -> Option<&str> {
        self.dataset().map(|d| d.md_id.as_str())
    }

    pub fn md_name(&self) -> Option<&str> {
        self.dataset()
            .map(|d| d.md_name.as_str())
            .filter(|n| !n.is_empty())
    }

    pub fn min_scale_f64(&self) -> Option<f64> {
        self.min_scale.as_ref().and_then(ScaleValue::as_f64)
    }

    pub fn max_scale_f64(&self) -> Option<f64> {
        self.max_scale.as_ref().and_then(ScaleValue::as_f64)
    }
}

/// Deserializers that turn wrongly typed optional values into `None`.
pub mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::ScaleValue;

    pub fn bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
        Ok(Value::deserialize(deserializer)?.as_bool())
    }

    pub fn u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        Ok(Value::deserialize(deserializer)?.as_u64())
    }

    /// Numbers and strings are kept as written; anything else is absent.
    pub fn scale<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<ScaleValue>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => Some(ScaleValue::Number(n)),
            Value::String(s) => Some(ScaleValue::Text(s)),
            _ => None,
        })
    }

    pub fn string<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Some(s),
            _ => None,
        })
    }
}
