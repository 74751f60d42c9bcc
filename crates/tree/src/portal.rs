//! Assembles the baselayer and subjectlayer trees of one portal.

use std::fmt;
use std::fs;
use std::path::Path;

use catalog::{CatalogLookup, RawLayer, lenient};
use foundation::{Diagnostics, Sequence, WarningKind};
use layers::{AutoTreeConfig, CatalogFilter, LayerConfigEntry, LayerResolver, ResolverSettings};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::builder::{BuildOptions, Category, NO_CATEGORY, TreeBuilder, TreeSource, set_ids_at_folders};
use crate::node::{Folder, Tree, TreeNode};

pub const AUTO_TREE_TYPE: &str = "auto";

/// The parts of a portal's `config.json` the layer tree depends on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalConfig {
    #[serde(default)]
    pub portal_config: PortalSettings,
    #[serde(default)]
    pub layer_config: LayerConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortalSettings {
    #[serde(default)]
    pub tree: TreeConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeConfig {
    /// `"auto"` builds the subject tree from the catalog.
    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub tree_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::bool")]
    pub show_all_layer_in_tree: Option<bool>,
    #[serde(
        rename = "layerTypes3d",
        default,
        deserialize_with = "layers::config::optional_string_list"
    )]
    pub layer_types_3d: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub no_category_label: Option<String>,
    #[serde(default, deserialize_with = "lenient::bool")]
    pub sort_by_name: Option<bool>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(flatten)]
    pub auto_tree: AutoTreeConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    #[serde(default)]
    pub baselayer: Section,
    #[serde(default)]
    pub subjectlayer: Section,
}

/// Raw element list of one section; elements are parsed one by one so a bad
/// entry only affects itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub elements: Vec<Value>,
}

#[derive(Debug)]
pub enum PortalConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for PortalConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortalConfigError::Io(err) => write!(f, "I/O error: {err}"),
            PortalConfigError::Parse(err) => write!(f, "Config parse error: {err}"),
        }
    }
}

impl std::error::Error for PortalConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PortalConfigError::Io(err) => Some(err),
            PortalConfigError::Parse(err) => Some(err),
        }
    }
}

impl PortalConfig {
    pub fn from_json_str(payload: &str) -> Result<Self, PortalConfigError> {
        serde_json::from_str(payload).map_err(PortalConfigError::Parse)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PortalConfigError> {
        let payload = fs::read_to_string(path.as_ref()).map_err(PortalConfigError::Io)?;
        Self::from_json_str(&payload)
    }

    pub fn tree(&self) -> &TreeConfig {
        &self.portal_config.tree
    }

    pub fn is_auto_tree(&self) -> bool {
        self.tree()
            .tree_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(AUTO_TREE_TYPE))
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        let tree = self.tree();
        let mut settings = ResolverSettings {
            show_all_layer_in_tree: tree.show_all_layer_in_tree.unwrap_or(false),
            ..ResolverSettings::default()
        };
        if let Some(types) = &tree.layer_types_3d {
            settings.layer_types_3d = types.clone();
        }
        settings
    }

    pub fn build_options(&self) -> BuildOptions {
        let tree = self.tree();
        BuildOptions {
            no_category_label: tree
                .no_category_label
                .clone()
                .unwrap_or_else(|| NO_CATEGORY.to_string()),
            sort_by_name: tree.sort_by_name.unwrap_or(false),
        }
    }

    pub fn active_category(&self) -> Category {
        Category::active(&self.tree().categories)
            .cloned()
            .unwrap_or_default()
    }

    /// Makes the category with `key` the active one, adding it if unknown.
    pub fn activate_category(&mut self, key: &str) {
        let categories = &mut self.portal_config.tree.categories;
        if !categories.iter().any(|c| c.key == key) {
            categories.push(Category::new(key, key));
        }
        for category in categories.iter_mut() {
            category.active = Some(category.key == key);
        }
    }
}

/// A configured element: a folder literal or a layer entry.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigElement {
    Folder {
        name: String,
        elements: Vec<ConfigElement>,
        extra: Map<String, Value>,
    },
    Layer(LayerConfigEntry),
}

/// Parses configured elements, skipping the ones that cannot be read.
pub fn parse_elements(values: &[Value], diagnostics: &mut Diagnostics) -> Vec<ConfigElement> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        if value.get("type").and_then(Value::as_str) == Some("folder") {
            let mut extra = value.as_object().cloned().unwrap_or_default();
            extra.remove("type");
            let name = match extra.remove("name") {
                Some(Value::String(name)) => name,
                _ => String::new(),
            };
            let children = match extra.remove("elements") {
                Some(Value::Array(children)) => children,
                _ => Vec::new(),
            };
            out.push(ConfigElement::Folder {
                name,
                elements: parse_elements(&children, diagnostics),
                extra,
            });
            continue;
        }

        match serde_json::from_value::<LayerConfigEntry>(value.clone()) {
            Ok(entry) => out.push(ConfigElement::Layer(entry)),
            Err(e) => diagnostics.warn(
                WarningKind::MalformedConfigEntry,
                format!("skipping configured element {value}: {e}"),
            ),
        }
    }
    out
}

/// Counters shared by every tree of a portal.
#[derive(Debug, Default)]
pub struct Sequences {
    pub z_index: Sequence,
    pub folder_ids: Sequence,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortalLayers {
    pub baselayer: Tree,
    pub subjectlayer: Tree,
}

/// Builds both layer trees of a portal.
pub fn build_portal_layers<C: CatalogLookup + ?Sized>(
    catalog: &C,
    config: &PortalConfig,
    sequences: &mut Sequences,
    diagnostics: &mut Diagnostics,
) -> PortalLayers {
    let settings = config.resolver_settings();
    let options = config.build_options();
    let styles = &config.tree().auto_tree.layer_ids_to_style;

    let base_elements = parse_elements(&config.layer_config.baselayer.elements, diagnostics);
    let subject_elements = parse_elements(&config.layer_config.subjectlayer.elements, diagnostics);

    let (base_nodes, subject_nodes) = {
        let mut resolver =
            LayerResolver::new(catalog, &settings, &mut sequences.z_index, diagnostics);
        let base = resolve_elements(&mut resolver, &base_elements, styles);
        let subject = resolve_elements(&mut resolver, &subject_elements, styles);
        (base, subject)
    };

    let mut baselayer = Tree::new(base_nodes);
    set_ids_at_folders(&mut baselayer.elements, &mut sequences.folder_ids);

    let subjectlayer = if config.is_auto_tree() {
        let configured = flatten_layers(subject_nodes);
        let layers = CatalogFilter::new(catalog).filter(&config.tree().auto_tree, true);
        debug!(
            "auto subject tree: {} catalog layers, {} configured",
            layers.len(),
            configured.len()
        );
        let category = config.active_category();
        TreeBuilder::new(
            &settings,
            &options,
            &mut sequences.z_index,
            &mut sequences.folder_ids,
        )
        .build(TreeSource::Categorized { layers, category }, &configured)
    } else {
        let mut tree = Tree::new(subject_nodes);
        set_ids_at_folders(&mut tree.elements, &mut sequences.folder_ids);
        tree
    };

    PortalLayers {
        baselayer,
        subjectlayer,
    }
}

fn resolve_elements<C: CatalogLookup + ?Sized>(
    resolver: &mut LayerResolver<'_, C>,
    elements: &[ConfigElement],
    styles: &[layers::StyleEntry],
) -> Vec<TreeNode> {
    let mut out = Vec::with_capacity(elements.len());
    for element in elements {
        match element {
            ConfigElement::Folder {
                name,
                elements,
                extra,
            } => {
                let mut folder = Folder::new(name.clone(), resolve_elements(resolver, elements, styles));
                folder.extra = extra.clone();
                out.push(TreeNode::Folder(folder));
            }
            ConfigElement::Layer(entry) => {
                out.extend(resolver.resolve(entry, styles).into_iter().map(TreeNode::Layer));
            }
        }
    }
    out
}

fn flatten_layers(nodes: Vec<TreeNode>) -> Vec<RawLayer> {
    let mut out = Vec::new();
    for node in nodes {
        match node {
            TreeNode::Folder(folder) => out.extend(flatten_layers(folder.elements)),
            TreeNode::Layer(layer) => out.push(layer),
        }
    }
    out
}
