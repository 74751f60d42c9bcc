use std::collections::HashMap;
use std::fs;
use std::path::Path;

use foundation::{Diagnostics, WarningKind};
use serde_json::{Map, Value};
use tracing::debug;

use crate::CatalogError;
use crate::model::RawLayer;

/// Attribute-set query: a record matches when every attribute is equal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerQuery {
    attributes: Map<String, Value>,
}

impl LayerQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self::new().with("id", Value::String(id.into()))
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// The id, if the query asks for nothing else.
    fn only_id(&self) -> Option<&str> {
        if self.attributes.len() != 1 {
            return None;
        }
        self.attributes.get("id").and_then(Value::as_str)
    }

    fn matches(&self, record: &Value) -> bool {
        self.attributes
            .iter()
            .all(|(k, v)| record.get(k) == Some(v))
    }
}

/// Read-only view of the layer catalog.
///
/// Implementations hand out owned copies; callers may mutate what they get
/// without affecting the catalog.
pub trait CatalogLookup {
    /// Every known layer, in catalog order.
    fn layer_list(&self) -> Vec<RawLayer>;

    /// First layer in catalog order whose attributes match `query`.
    fn layer_where(&self, query: &LayerQuery) -> Option<RawLayer>;

    fn layer_by_id(&self, id: &str) -> Option<RawLayer> {
        self.layer_where(&LayerQuery::id(id))
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryCatalog {
    layers: Vec<RawLayer>,
    by_id: HashMap<String, usize>,
}

impl InMemoryCatalog {
    pub fn new(layers: Vec<RawLayer>) -> Self {
        let mut by_id = HashMap::with_capacity(layers.len());
        for (idx, layer) in layers.iter().enumerate() {
            // First occurrence wins, like a linear scan would.
            by_id.entry(layer.id.clone()).or_insert(idx);
        }
        Self { layers, by_id }
    }

    /// Parses a `services.json` payload.
    ///
    /// The payload must be a JSON array. Entries that are not valid layer
    /// records are skipped and reported through `diagnostics`.
    pub fn from_json_str(
        payload: &str,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self, CatalogError> {
        let value: Value = serde_json::from_str(payload).map_err(CatalogError::Parse)?;
        let Value::Array(entries) = value else {
            return Err(CatalogError::NotAnArray);
        };

        let mut layers = Vec::with_capacity(entries.len());
        for (idx, entry) in entries.into_iter().enumerate() {
            match serde_json::from_value::<RawLayer>(entry) {
                Ok(layer) if !layer.id.is_empty() => layers.push(layer),
                Ok(_) => diagnostics.warn(
                    WarningKind::MalformedRecord,
                    format!("catalog entry #{idx} has no id and was skipped"),
                ),
                Err(e) => diagnostics.warn(
                    WarningKind::MalformedRecord,
                    format!("catalog entry #{idx} was skipped: {e}"),
                ),
            }
        }

        debug!("loaded {} catalog layers", layers.len());
        Ok(Self::new(layers))
    }

    pub fn load(path: impl AsRef<Path>, diagnostics: &mut Diagnostics) -> Result<Self, CatalogError> {
        let payload = fs::read_to_string(path.as_ref()).map_err(CatalogError::Io)?;
        Self::from_json_str(&payload, diagnostics)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl CatalogLookup for InMemoryCatalog {
    fn layer_list(&self) -> Vec<RawLayer> {
        self.layers.clone()
    }

    fn layer_where(&self, query: &LayerQuery) -> Option<RawLayer> {
        if let Some(id) = query.only_id() {
            return self.by_id.get(id).map(|&idx| self.layers[idx].clone());
        }
        self.layers
            .iter()
            .find(|layer| {
                serde_json::to_value(layer)
                    .map(|record| query.matches(&record))
                    .unwrap_or(false)
            })
            .cloned()
    }
}
