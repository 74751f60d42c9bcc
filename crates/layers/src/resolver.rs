use catalog::{CatalogLookup, RawLayer, ScaleValue};
use foundation::{Diagnostics, Sequence, WarningKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{ChildConfig, LayerConfigEntry, LayerRef};
use crate::style::{StyleEntry, expand_style_variants};

pub const DEFAULT_LAYER_TYPES_3D: [&str; 3] = ["TERRAIN3D", "TILESET3D", "OBLIQUE"];

/// Portal-wide switches that affect every resolved layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverSettings {
    /// Show every layer in the tree regardless of its own flags.
    #[serde(default)]
    pub show_all_layer_in_tree: bool,
    /// Service types rendered by the 3D engine, upper case.
    #[serde(default = "default_layer_types_3d")]
    pub layer_types_3d: Vec<String>,
}

fn default_layer_types_3d() -> Vec<String> {
    DEFAULT_LAYER_TYPES_3D.iter().map(|t| t.to_string()).collect()
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            show_all_layer_in_tree: false,
            layer_types_3d: default_layer_types_3d(),
        }
    }
}

impl ResolverSettings {
    pub fn is_3d_typ(&self, typ: Option<&str>) -> bool {
        let Some(typ) = typ else {
            return false;
        };
        self.layer_types_3d
            .iter()
            .any(|t| t.eq_ignore_ascii_case(typ))
    }
}

/// Marks `layer` as a tree layer and fills in display flags.
///
/// A z-index is drawn from `z_index` only when the layer has none yet, so
/// re-running on an already processed layer keeps its position.
pub fn add_additional(layer: &mut RawLayer, settings: &ResolverSettings, z_index: &mut Sequence) {
    layer.node_type = Some("layer".to_string());
    if settings.show_all_layer_in_tree {
        layer.show_in_layer_tree = Some(true);
    } else if layer.show_in_layer_tree.is_none() {
        layer.show_in_layer_tree = Some(layer.visibility == Some(true));
    }
    if layer.z_index.is_none() {
        layer.z_index = Some(z_index.next_value());
    }
    layer.is_3d_layer = Some(settings.is_3d_typ(layer.typ.as_deref()));
}

/// Resolves configured layer entries against the catalog.
pub struct LayerResolver<'a, C: CatalogLookup + ?Sized> {
    catalog: &'a C,
    settings: &'a ResolverSettings,
    z_index: &'a mut Sequence,
    diagnostics: &'a mut Diagnostics,
}

impl<'a, C: CatalogLookup + ?Sized> LayerResolver<'a, C> {
    pub fn new(
        catalog: &'a C,
        settings: &'a ResolverSettings,
        z_index: &'a mut Sequence,
        diagnostics: &'a mut Diagnostics,
    ) -> Self {
        Self {
            catalog,
            settings,
            z_index,
            diagnostics,
        }
    }

    /// Resolves a top-level entry. Unknown ids yield a placeholder layer.
    pub fn resolve(&mut self, entry: &LayerConfigEntry, styles: &[StyleEntry]) -> Vec<RawLayer> {
        self.resolve_entry(entry, styles, false)
    }

    /// Resolves an entry nested in a group. Unknown ids yield nothing.
    pub fn resolve_child(
        &mut self,
        entry: &LayerConfigEntry,
        styles: &[StyleEntry],
    ) -> Vec<RawLayer> {
        self.resolve_entry(entry, styles, true)
    }

    fn resolve_entry(
        &mut self,
        entry: &LayerConfigEntry,
        styles: &[StyleEntry],
        is_child_element: bool,
    ) -> Vec<RawLayer> {
        let layer_ref = match entry.layer_ref() {
            Ok(layer_ref) => layer_ref,
            Err(e) => {
                self.diagnostics.warn(
                    WarningKind::MalformedConfigEntry,
                    format!("skipping layer entry [{}]: {e}", entry.display_id()),
                );
                return Vec::new();
            }
        };

        let Some(layer) = self.raw_layer(entry, &layer_ref, is_child_element) else {
            return Vec::new();
        };

        let mut out = expand_style_variants(layer, styles);
        for layer in &mut out {
            add_additional(layer, self.settings, self.z_index);
        }
        out
    }

    fn raw_layer(
        &mut self,
        entry: &LayerConfigEntry,
        layer_ref: &LayerRef,
        is_child_element: bool,
    ) -> Option<RawLayer> {
        let layer = match layer_ref {
            LayerRef::Single(id) => match self.lookup(id) {
                Some(layer) => layer,
                None if is_child_element => return None,
                None => RawLayer::placeholder(id.as_str()),
            },
            LayerRef::MergeGroup(ids) => match self.merge_by_ids(ids) {
                Some(layer) => layer,
                None if is_child_element => return None,
                None => RawLayer::placeholder(ids.join("-")),
            },
            LayerRef::ExplicitGroup { id, children } => {
                match self.group_layer(id.as_deref(), children) {
                    Some(layer) => layer,
                    None if is_child_element => return None,
                    None => RawLayer::placeholder(group_id(id.as_deref(), children)),
                }
            }
        };
        Some(self.apply_overrides(layer, &entry.overrides()))
    }

    fn lookup(&mut self, id: &str) -> Option<RawLayer> {
        let layer = self.catalog.layer_by_id(id);
        if layer.is_none() {
            self.diagnostics.warn(
                WarningKind::LookupMiss,
                format!("layer with id {id} was not found in services.json"),
            );
        }
        layer
    }

    /// Combines several catalog layers into one, based on the first member.
    fn merge_by_ids(&mut self, ids: &[String]) -> Option<RawLayer> {
        let members: Vec<RawLayer> = ids.iter().filter_map(|id| self.lookup(id)).collect();
        let first = members.first()?;

        let mut merged = first.clone();
        merged.id = ids.join("-");
        merged.layers = joined_layers(&members);
        merged.min_scale = min_scale(&members).map(ScaleValue::from_f64);
        merged.max_scale = max_scale(&members).map(ScaleValue::from_f64);
        Some(merged)
    }

    fn group_layer(&mut self, id: Option<&str>, children: &[ChildConfig]) -> Option<RawLayer> {
        let mut resolved = Vec::with_capacity(children.len());
        for child in children {
            let Some(layer) = self.lookup(&child.id) else {
                continue;
            };
            let mut overrides = child.extra.clone();
            if let Some(style_id) = &child.style_id {
                overrides.insert("styleId".to_string(), Value::String(style_id.clone()));
            }
            let mut layer = self.apply_overrides(layer, &overrides);
            layer.id = child.resolved_id();
            resolved.push(layer);
        }
        let first = resolved.first()?;

        let mut group = RawLayer::new(
            group_id(id, children),
            resolved
                .iter()
                .map(|l| l.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        );
        group.typ = Some(crate::config::GROUP_TYP.to_string());
        group.datasets = first.datasets.clone();
        group.min_scale = min_scale(&resolved).map(ScaleValue::from_f64);
        group.max_scale = max_scale(&resolved).map(ScaleValue::from_f64);
        group.children = Some(resolved);
        Some(group)
    }

    /// Writes configured fields over `layer`, like a shallow object merge.
    ///
    /// A configured field that does not fit the record is dropped with a
    /// warning; the remaining fields still apply.
    fn apply_overrides(&mut self, layer: RawLayer, overrides: &Map<String, Value>) -> RawLayer {
        if overrides.is_empty() {
            return layer;
        }
        let Ok(Value::Object(base)) = serde_json::to_value(&layer) else {
            return layer;
        };

        let mut merged = base.clone();
        merged.extend(overrides.clone());
        if let Ok(layer) = serde_json::from_value(Value::Object(merged)) {
            return layer;
        }

        let mut merged = base;
        for (key, value) in overrides {
            let mut candidate = merged.clone();
            candidate.insert(key.clone(), value.clone());
            match serde_json::from_value::<RawLayer>(Value::Object(candidate.clone())) {
                Ok(_) => merged = candidate,
                Err(e) => self.diagnostics.warn(
                    WarningKind::MalformedConfigEntry,
                    format!("ignoring configured field {key} for layer {}: {e}", layer.id),
                ),
            }
        }
        serde_json::from_value(Value::Object(merged)).unwrap_or(layer)
    }
}

fn group_id(id: Option<&str>, children: &[ChildConfig]) -> String {
    match id {
        Some(id) => id.to_string(),
        None => children
            .iter()
            .map(ChildConfig::resolved_id)
            .collect::<Vec<_>>()
            .join("-"),
    }
}

pub(crate) fn joined_layers(members: &[RawLayer]) -> Option<String> {
    let parts: Vec<&str> = members
        .iter()
        .filter_map(|m| m.layers.as_deref())
        .filter(|l| !l.is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join(","))
}

pub(crate) fn min_scale(members: &[RawLayer]) -> Option<f64> {
    members
        .iter()
        .filter_map(RawLayer::min_scale_f64)
        .reduce(f64::min)
}

pub(crate) fn max_scale(members: &[RawLayer]) -> Option<f64> {
    members
        .iter()
        .filter_map(RawLayer::max_scale_f64)
        .reduce(f64::max)
}
