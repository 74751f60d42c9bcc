use catalog::{OneOrMany, RawLayer};
use serde::{Deserialize, Serialize};

/// `layerIDsToStyle` entry: parallel style, name and legend lists for one id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleEntry {
    pub id: String,
    pub styles: OneOrMany,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<OneOrMany>,
    #[serde(rename = "legendURL", default, skip_serializing_if = "Option::is_none")]
    pub legend_url: Option<OneOrMany>,
}

/// Splits `layer` into one record per configured style.
///
/// A style list yields one clone per entry with id `<id><style>`. A single
/// style is applied in place and keeps the id. Layers without an entry are
/// returned unchanged.
pub fn expand_style_variants(layer: RawLayer, entries: &[StyleEntry]) -> Vec<RawLayer> {
    let Some(entry) = entries.iter().find(|e| e.id == layer.id) else {
        return vec![layer];
    };

    match &entry.styles {
        OneOrMany::One(style) => {
            let mut layer = layer;
            apply_variant(&mut layer, entry, 0, style);
            vec![layer]
        }
        OneOrMany::Many(styles) if styles.is_empty() => vec![layer],
        OneOrMany::Many(styles) => styles
            .iter()
            .enumerate()
            .map(|(index, style)| {
                let mut variant = layer.clone();
                variant.id = format!("{}{style}", layer.id);
                apply_variant(&mut variant, entry, index, style);
                variant
            })
            .collect(),
    }
}

pub fn expand_all(layers: Vec<RawLayer>, entries: &[StyleEntry]) -> Vec<RawLayer> {
    if entries.is_empty() {
        return layers;
    }
    layers
        .into_iter()
        .flat_map(|layer| expand_style_variants(layer, entries))
        .collect()
}

fn apply_variant(layer: &mut RawLayer, entry: &StyleEntry, index: usize, style: &str) {
    layer.style = Some(style.to_string());
    layer.styles = Some(OneOrMany::One(style.to_string()));
    if let Some(name) = entry.name.as_ref().and_then(|n| n.get(index)) {
        layer.name = name.to_string();
    }
    if let Some(legend) = entry.legend_url.as_ref().and_then(|l| l.get(index)) {
        layer.legend_url = Some(OneOrMany::One(legend.to_string()));
    }
}
