use std::collections::HashSet;

use catalog::{CatalogLookup, RawLayer, ScaleValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{optional_string_list, string_list, style_entries};
use crate::resolver::{joined_layers, max_scale, min_scale};
use crate::style::{StyleEntry, expand_all};

/// Catalog slice settings for the automatically built subject tree.
///
/// Wrongly typed lists are treated as not configured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoTreeConfig {
    #[serde(
        default,
        deserialize_with = "optional_string_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub valid_layer_types_auto_tree: Option<Vec<String>>,
    #[serde(rename = "layerIDsToIgnore", default, deserialize_with = "string_list")]
    pub layer_ids_to_ignore: Vec<String>,
    #[serde(rename = "metaIDsToIgnore", default, deserialize_with = "string_list")]
    pub meta_ids_to_ignore: Vec<String>,
    #[serde(rename = "metaIDsToMerge", default, deserialize_with = "string_list")]
    pub meta_ids_to_merge: Vec<String>,
    #[serde(rename = "layerIDsToStyle", default, deserialize_with = "style_entries")]
    pub layer_ids_to_style: Vec<StyleEntry>,
}

/// Only WMS layers are merged by metadata id.
const MERGEABLE_TYP: &str = "WMS";

/// Derives the flat, one-dataset-per-layer list the auto tree is built from.
pub struct CatalogFilter<'a, C: CatalogLookup + ?Sized> {
    catalog: &'a C,
}

impl<'a, C: CatalogLookup + ?Sized> CatalogFilter<'a, C> {
    pub fn new(catalog: &'a C) -> Self {
        Self { catalog }
    }

    pub fn filter(&self, config: &AutoTreeConfig, respect_dataset_splitting: bool) -> Vec<RawLayer> {
        let all = self.catalog.layer_list();
        let total = all.len();

        let eligible: Vec<RawLayer> = all
            .into_iter()
            .filter(|layer| is_valid_typ(layer, config.valid_layer_types_auto_tree.as_deref()))
            .filter(|layer| !layer.datasets.is_empty())
            .collect();

        let mut layers = split_datasets(eligible, respect_dataset_splitting);

        let ignored_ids: HashSet<&str> =
            config.layer_ids_to_ignore.iter().map(String::as_str).collect();
        let ignored_meta: HashSet<&str> =
            config.meta_ids_to_ignore.iter().map(String::as_str).collect();
        layers.retain(|layer| {
            !ignored_ids.contains(layer.id.as_str())
                && !layer.md_id().is_some_and(|md| ignored_meta.contains(md))
        });

        let layers = merge_by_meta_ids(layers, &config.meta_ids_to_merge);
        let layers = expand_all(layers, &config.layer_ids_to_style);

        debug!("auto tree slice: {} of {total} catalog layers", layers.len());
        layers
    }
}

fn is_valid_typ(layer: &RawLayer, valid: Option<&[String]>) -> bool {
    match valid {
        Some(valid) => valid.iter().any(|t| layer.has_typ(t)),
        None => true,
    }
}

/// One record per dataset, ids suffixed `_<index>`.
///
/// Layers with a single dataset pass through untouched, so running this on
/// its own output changes nothing. Without splitting, only the first dataset
/// is kept.
pub fn split_datasets(layers: Vec<RawLayer>, respect_dataset_splitting: bool) -> Vec<RawLayer> {
    let mut out = Vec::with_capacity(layers.len());
    for mut layer in layers {
        if layer.datasets.len() <= 1 {
            out.push(layer);
            continue;
        }
        if !respect_dataset_splitting {
            layer.datasets.truncate(1);
            out.push(layer);
            continue;
        }

        let datasets = std::mem::take(&mut layer.datasets);
        for (index, dataset) in datasets.into_iter().enumerate() {
            let mut part = layer.clone();
            part.id = format!("{}_{index}", layer.id);
            part.split_from = Some(layer.id.clone());
            part.datasets = vec![dataset];
            out.push(part);
        }
    }
    out
}

/// Collapses WMS layers sharing a listed metadata id into one layer.
///
/// The merged layer takes the position of the first member and is named after
/// the dataset. `gfiAttributes` come from the first member defining them.
pub fn merge_by_meta_ids(layers: Vec<RawLayer>, meta_ids: &[String]) -> Vec<RawLayer> {
    if meta_ids.is_empty() {
        return layers;
    }

    let mut groups: IndexMap<String, Vec<usize>> = IndexMap::new();
    for (idx, layer) in layers.iter().enumerate() {
        if !layer.has_typ(MERGEABLE_TYP) {
            continue;
        }
        if let Some(md_id) = layer.md_id()
            && meta_ids.iter().any(|m| m == md_id)
        {
            groups.entry(md_id.to_string()).or_default().push(idx);
        }
    }
    if groups.is_empty() {
        return layers;
    }

    let mut merged_at: IndexMap<usize, RawLayer> = IndexMap::new();
    let mut absorbed: HashSet<usize> = HashSet::new();
    for members in groups.values() {
        let group: Vec<RawLayer> = members.iter().map(|&i| layers[i].clone()).collect();
        merged_at.insert(members[0], merge_group(&group));
        absorbed.extend(members.iter().skip(1).copied());
    }

    layers
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| !absorbed.contains(idx))
        .map(|(idx, layer)| merged_at.swap_remove(&idx).unwrap_or(layer))
        .collect()
}

fn merge_group(group: &[RawLayer]) -> RawLayer {
    let mut merged = group[0].clone();
    if let Some(dataset) = group[0].dataset() {
        merged.id = dataset.md_id.clone();
        merged.name = dataset.md_name.clone();
    }
    merged.layers = joined_layers(group);
    merged.min_scale = min_scale(group).map(ScaleValue::from_f64);
    merged.max_scale = max_scale(group).map(ScaleValue::from_f64);
    merged.gfi_attributes = group.iter().find_map(|l| l.gfi_attributes.clone());
    merged
}

#[cfg(test)]
mod tests {
    use super::{AutoTreeConfig, CatalogFilter, merge_by_meta_ids, split_datasets};
    use catalog::{Dataset, InMemoryCatalog, RawLayer, ScaleValue};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn layer(id: &str, typ: &str, md: &[(&str, &str)]) -> RawLayer {
        let mut l = RawLayer::new(id, format!("Layer {id}"));
        l.typ = Some(typ.to_string());
        l.layers = Some(format!("l{id}"));
        l.datasets = md.iter().map(|(id, name)| Dataset::new(*id, *name)).collect();
        l
    }

    fn ids(layers: &[RawLayer]) -> Vec<&str> {
        layers.iter().map(|l| l.id.as_str()).collect()
    }

    #[test]
    fn drops_layers_without_datasets_or_invalid_typ() {
        let catalog = InMemoryCatalog::new(vec![
            layer("1", "WMS", &[("m1", "A")]),
            layer("2", "WMS", &[]),
            layer("3", "GeoJSON", &[("m3", "C")]),
            layer("4", "wfs", &[("m4", "D")]),
        ]);
        let config = AutoTreeConfig {
            valid_layer_types_auto_tree: Some(vec!["WMS".to_string(), "WFS".to_string()]),
            ..AutoTreeConfig::default()
        };
        let out = CatalogFilter::new(&catalog).filter(&config, true);
        assert_eq!(ids(&out), vec!["1", "4"]);
    }

    #[test]
    fn splits_multi_dataset_layers() {
        let out = split_datasets(vec![layer("7", "WMS", &[("a", "A"), ("b", "B")])], true);
        assert_eq!(ids(&out), vec!["7_0", "7_1"]);
        assert_eq!(out[0].datasets.len(), 1);
        assert_eq!(out[1].md_id(), Some("b"));
        assert_eq!(out[1].split_from.as_deref(), Some("7"));

        let again = split_datasets(out.clone(), true);
        assert_eq!(again, out);
    }

    #[test]
    fn filtering_filtered_output_changes_nothing() {
        let mut merged_a = layer("1", "WMS", &[("meta", "Noise")]);
        merged_a.min_scale = Some(ScaleValue::Text("100".to_string()));
        let merged_b = layer("2", "WMS", &[("meta", "Noise")]);
        let catalog = InMemoryCatalog::new(vec![
            layer("7", "WMS", &[("a", "A"), ("b", "B")]),
            merged_a,
            merged_b,
            layer("9", "WFS", &[("m9", "I")]),
        ]);
        let config: AutoTreeConfig = serde_json::from_value(json!({
            "metaIDsToMerge": ["meta"],
            "layerIDsToStyle": [{"id": "9", "styles": ["x", "y"]}]
        }))
        .unwrap();

        let once = CatalogFilter::new(&catalog).filter(&config, true);
        assert_eq!(ids(&once), vec!["7_0", "7_1", "meta", "9x", "9y"]);

        let again = CatalogFilter::new(&InMemoryCatalog::new(once.clone())).filter(&config, true);
        assert_eq!(ids(&again), ids(&once));
        assert_eq!(again, once);
    }

    #[test]
    fn keeps_first_dataset_without_splitting() {
        let out = split_datasets(vec![layer("7", "WMS", &[("a", "A"), ("b", "B")])], false);
        assert_eq!(ids(&out), vec!["7"]);
        assert_eq!(out[0].md_id(), Some("a"));
    }

    #[test]
    fn ignore_lists_exclude_layers() {
        let catalog = InMemoryCatalog::new(vec![
            layer("1", "WMS", &[("m1", "A")]),
            layer("2", "WMS", &[("m2", "B")]),
            layer("3", "WMS", &[("m3", "C")]),
            layer("4", "WMS", &[("x", "X"), ("m4", "D")]),
        ]);
        let config = AutoTreeConfig {
            layer_ids_to_ignore: vec!["1".to_string(), "4_1".to_string()],
            meta_ids_to_ignore: vec!["m3".to_string()],
            ..AutoTreeConfig::default()
        };
        let out = CatalogFilter::new(&catalog).filter(&config, true);
        assert_eq!(ids(&out), vec!["2", "4_0"]);
    }

    #[test]
    fn merges_wms_layers_by_meta_id() {
        let mut a = layer("1", "WMS", &[("meta", "Noise")]);
        a.min_scale = Some(ScaleValue::Text("100".to_string()));
        a.max_scale = Some(ScaleValue::Text("5000".to_string()));
        let mut b = layer("2", "WMS", &[("meta", "Noise")]);
        b.min_scale = Some(ScaleValue::from_f64(50.0));
        b.max_scale = Some(ScaleValue::from_f64(9000.0));
        b.gfi_attributes = Some(json!({"level": "Level"}));
        let mut c = layer("3", "WMS", &[("meta", "Noise")]);
        c.gfi_attributes = Some(json!({"other": "Other"}));
        let wfs = layer("4", "WFS", &[("meta", "Noise")]);
        let other = layer("5", "WMS", &[("m5", "E")]);

        let out = merge_by_meta_ids(vec![other, a, wfs, b, c], &["meta".to_string()]);
        assert_eq!(ids(&out), vec!["5", "meta", "4"]);

        let merged = &out[1];
        assert_eq!(merged.name, "Noise");
        assert_eq!(merged.layers.as_deref(), Some("l1,l2,l3"));
        assert_eq!(merged.min_scale_f64(), Some(50.0));
        assert_eq!(merged.max_scale_f64(), Some(9000.0));
        assert_eq!(merged.gfi_attributes, Some(json!({"level": "Level"})));
    }

    #[test]
    fn applies_style_variants_to_slice() {
        let catalog = InMemoryCatalog::new(vec![layer("1", "WMS", &[("m1", "A")])]);
        let config: AutoTreeConfig = serde_json::from_value(json!({
            "layerIDsToStyle": [
                {"id": "1", "styles": ["x", "y"], "name": ["X", "Y"]},
                "garbage"
            ]
        }))
        .unwrap();
        let out = CatalogFilter::new(&catalog).filter(&config, true);
        assert_eq!(ids(&out), vec!["1x", "1y"]);
        assert_eq!(out[1].name, "Y");
    }

    #[test]
    fn malformed_lists_are_treated_as_absent() {
        let config: AutoTreeConfig = serde_json::from_value(json!({
            "validLayerTypesAutoTree": "WMS",
            "layerIDsToIgnore": {"id": "1"}
        }))
        .unwrap();
        assert_eq!(config.valid_layer_types_auto_tree, None);
        assert!(config.layer_ids_to_ignore.is_empty());
    }
}
