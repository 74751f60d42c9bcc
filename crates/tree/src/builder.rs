//! Category driven tree building.
//!
//! The flat layer list produced by the catalog filter is grouped into one
//! folder per classification value of the active category. Inside a bucket,
//! layers sharing a dataset name are nested into a folder of that name.

use std::collections::{HashMap, HashSet};

use catalog::{RawLayer, lenient};
use foundation::Sequence;
use indexmap::IndexMap;
use layers::{ResolverSettings, add_additional};
use serde::{Deserialize, Serialize};

use crate::node::{Folder, Tree, TreeNode};

pub const NO_CATEGORY: &str = "noCategory";
pub const FOLDER_ID_PREFIX: &str = "folder-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(
        default,
        deserialize_with = "lenient::bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub active: Option<bool>,
}

impl Category {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            active: None,
        }
    }

    /// The category flagged active, else the first one.
    pub fn active(categories: &[Category]) -> Option<&Category> {
        categories
            .iter()
            .find(|c| c.active == Some(true))
            .or_else(|| categories.first())
    }
}

impl Default for Category {
    fn default() -> Self {
        Self::new("kategorie_opendata", "Opendata")
    }
}

/// What to build a tree from.
#[derive(Debug, Clone)]
pub enum TreeSource {
    /// Manually curated menu, returned as is.
    Structured(Vec<TreeNode>),
    /// Flat catalog slice grouped by the given category.
    Categorized {
        layers: Vec<RawLayer>,
        category: Category,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Bucket label for layers without a classification value.
    pub no_category_label: String,
    /// Sort buckets and their elements by name.
    pub sort_by_name: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            no_category_label: NO_CATEGORY.to_string(),
            sort_by_name: false,
        }
    }
}

pub struct TreeBuilder<'a> {
    settings: &'a ResolverSettings,
    options: &'a BuildOptions,
    z_index: &'a mut Sequence,
    folder_ids: &'a mut Sequence,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(
        settings: &'a ResolverSettings,
        options: &'a BuildOptions,
        z_index: &'a mut Sequence,
        folder_ids: &'a mut Sequence,
    ) -> Self {
        Self {
            settings,
            options,
            z_index,
            folder_ids,
        }
    }

    /// Builds the tree for `source`.
    ///
    /// `configured` holds already resolved subject layers. A flat layer with
    /// the same id is replaced by its configured counterpart, which keeps its
    /// own display settings and ordering. For a record split per dataset, the
    /// first part is replaced and the other parts are dropped.
    pub fn build(&mut self, source: TreeSource, configured: &[RawLayer]) -> Tree {
        let (layers, category) = match source {
            TreeSource::Structured(elements) => return Tree::new(elements),
            TreeSource::Categorized { layers, category } => (layers, category),
        };

        let mut elements = self.categorize(layers, &category, configured);
        if self.options.sort_by_name {
            sort_by_name(&mut elements);
        }
        set_ids_at_folders(&mut elements, self.folder_ids);
        Tree::new(elements)
    }

    fn categorize(
        &mut self,
        layers: Vec<RawLayer>,
        category: &Category,
        configured: &[RawLayer],
    ) -> Vec<TreeNode> {
        let mut buckets: IndexMap<String, Vec<RawLayer>> = IndexMap::new();
        let mut used: HashSet<&str> = HashSet::new();

        for raw in layers {
            let origin = raw.split_from.as_deref().unwrap_or(raw.id.as_str());
            let found = configured
                .iter()
                .find(|c| c.id == raw.id || c.id == origin);
            let layer = match found {
                // Further dataset parts of an already placed configured layer.
                Some(conf) if used.contains(conf.id.as_str()) => continue,
                Some(conf) => {
                    used.insert(conf.id.as_str());
                    let mut layer = conf.clone();
                    if layer.datasets.is_empty() {
                        layer.datasets = raw.datasets;
                    }
                    layer
                }
                None => {
                    let mut layer = raw;
                    add_additional(&mut layer, self.settings, self.z_index);
                    layer
                }
            };
            self.place(&mut buckets, layer, &category.key);
        }

        for conf in configured {
            if !used.contains(conf.id.as_str()) {
                self.place(&mut buckets, conf.clone(), &category.key);
            }
        }

        buckets
            .into_iter()
            .map(|(label, layers)| TreeNode::Folder(Folder::new(label, group_by_dataset_name(layers))))
            .collect()
    }

    /// Puts `layer` into every bucket its classification names.
    fn place(&self, buckets: &mut IndexMap<String, Vec<RawLayer>>, layer: RawLayer, key: &str) {
        let mut values = layer
            .dataset()
            .map(|d| d.classification(key))
            .unwrap_or_default();
        let mut seen = HashSet::new();
        values.retain(|v| seen.insert(v.clone()));

        let Some((last, rest)) = values.split_last() else {
            buckets
                .entry(self.options.no_category_label.clone())
                .or_default()
                .push(layer);
            return;
        };
        for value in rest {
            buckets.entry(value.clone()).or_default().push(layer.clone());
        }
        buckets.entry(last.clone()).or_default().push(layer);
    }
}

/// Nests layers sharing a dataset name into a folder of that name.
///
/// The folder takes the position of the first such layer. Layers with a
/// unique or missing dataset name stay where they are.
pub fn group_by_dataset_name(layers: Vec<RawLayer>) -> Vec<TreeNode> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for layer in &layers {
        if let Some(name) = layer.md_name() {
            *counts.entry(name.to_string()).or_insert(0) += 1;
        }
    }

    let mut out: Vec<TreeNode> = Vec::with_capacity(layers.len());
    let mut folder_at: HashMap<String, usize> = HashMap::new();
    for layer in layers {
        let shared = layer
            .md_name()
            .filter(|name| counts.get(*name).copied().unwrap_or(0) >= 2)
            .map(str::to_string);
        let Some(name) = shared else {
            out.push(TreeNode::Layer(layer));
            continue;
        };

        match folder_at.get(&name) {
            Some(&idx) => {
                if let TreeNode::Folder(folder) = &mut out[idx] {
                    folder.elements.push(TreeNode::Layer(layer));
                }
            }
            None => {
                folder_at.insert(name.clone(), out.len());
                out.push(TreeNode::Folder(Folder::new(name, vec![TreeNode::Layer(layer)])));
            }
        }
    }
    out
}

/// Sorts nodes case-insensitively by name, recursing into folders.
pub fn sort_by_name(nodes: &mut [TreeNode]) {
    nodes.sort_by_key(|node| node.name().to_lowercase());
    for node in nodes {
        if let TreeNode::Folder(folder) = node {
            sort_by_name(&mut folder.elements);
        }
    }
}

/// Assigns `folder-<n>` ids, depth first, one sequence value per folder.
///
/// Every node below a folder gets that folder's id as `parentId`. Root level
/// nodes get none.
pub fn set_ids_at_folders(nodes: &mut [TreeNode], sequence: &mut Sequence) {
    assign_ids(nodes, None, sequence);
}

fn assign_ids(nodes: &mut [TreeNode], parent: Option<&str>, sequence: &mut Sequence) {
    for node in nodes {
        match node {
            TreeNode::Folder(folder) => {
                let id = sequence.next(FOLDER_ID_PREFIX);
                folder.parent_id = parent.map(str::to_string);
                assign_ids(&mut folder.elements, Some(&id), sequence);
                folder.id = Some(id);
            }
            TreeNode::Layer(layer) => {
                layer.parent_id = parent.map(str::to_string);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BuildOptions, Category, NO_CATEGORY, TreeBuilder, TreeSource, group_by_dataset_name,
        set_ids_at_folders, sort_by_name,
    };
    use crate::node::{Folder, TreeNode};
    use catalog::{Dataset, OneOrMany, RawLayer};
    use foundation::Sequence;
    use layers::ResolverSettings;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn layer(id: &str, md_name: &str, opendata: Option<OneOrMany>) -> RawLayer {
        let mut ds = Dataset::new(format!("md-{id}"), md_name);
        ds.kategorie_opendata = opendata;
        let mut l = RawLayer::new(id, format!("Layer {id}"));
        l.datasets = vec![ds];
        l
    }

    fn names(nodes: &[TreeNode]) -> Vec<&str> {
        nodes.iter().map(TreeNode::name).collect()
    }

    struct Harness {
        settings: ResolverSettings,
        options: BuildOptions,
        z_index: Sequence,
        folder_ids: Sequence,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                settings: ResolverSettings::default(),
                options: BuildOptions::default(),
                z_index: Sequence::new(),
                folder_ids: Sequence::new(),
            }
        }

        fn build(&mut self, source: TreeSource, configured: &[RawLayer]) -> crate::Tree {
            TreeBuilder::new(
                &self.settings,
                &self.options,
                &mut self.z_index,
                &mut self.folder_ids,
            )
            .build(source, configured)
        }

        fn categorized(&mut self, layers: Vec<RawLayer>) -> crate::Tree {
            self.build(
                TreeSource::Categorized {
                    layers,
                    category: Category::default(),
                },
                &[],
            )
        }
    }

    #[test]
    fn end_to_end_two_layers_share_a_dataset_name() {
        let mut h = Harness::new();
        let tree = h.categorized(vec![
            layer("A", "Foo", Some(vec!["Cat1"].into())),
            layer("B", "Foo", Some(vec!["Cat1"].into())),
        ]);

        assert_eq!(names(&tree.elements), vec!["Cat1"]);
        let bucket = tree.elements[0].as_folder().unwrap();
        assert_eq!(names(&bucket.elements), vec!["Foo"]);
        let foo = bucket.elements[0].as_folder().unwrap();
        let ids: Vec<&str> = foo
            .elements
            .iter()
            .map(|n| n.as_layer().unwrap().id.as_str())
            .collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(foo.parent_id, bucket.id);
        assert_eq!(foo.elements[0].as_layer().unwrap().parent_id, foo.id);
    }

    #[test]
    fn list_classification_fans_out() {
        let mut h = Harness::new();
        let tree = h.categorized(vec![layer("A", "Foo", Some(vec!["X", "Y"].into()))]);

        assert_eq!(names(&tree.elements), vec!["X", "Y"]);
        for bucket in &tree.elements {
            let folder = bucket.as_folder().unwrap();
            assert_eq!(folder.elements.len(), 1);
            assert_eq!(folder.elements[0].as_layer().unwrap().id, "A");
        }
    }

    #[test]
    fn empty_or_missing_classification_goes_to_no_category() {
        let mut h = Harness::new();
        let tree = h.categorized(vec![
            layer("A", "a", Some(OneOrMany::Many(Vec::new()))),
            layer("B", "b", Some(OneOrMany::One(String::new()))),
            layer("C", "c", None),
            layer("D", "d", Some("Cat".into())),
        ]);

        assert_eq!(names(&tree.elements), vec![NO_CATEGORY, "Cat"]);
        assert_eq!(tree.elements[0].as_folder().unwrap().elements.len(), 3);
    }

    #[test]
    fn folder_ids_use_one_sequence_value_per_folder() {
        let mut h = Harness::new();
        h.folder_ids = Sequence::starting_at(40);
        let before = h.folder_ids.peek();
        let tree = h.categorized(vec![
            layer("A", "Foo", Some(vec!["Cat1", "Cat2"].into())),
            layer("B", "Foo", Some(vec!["Cat1"].into())),
            layer("C", "Bar", Some(vec!["Cat2"].into())),
        ]);

        // Cat1, Cat1/Foo, Cat2
        assert_eq!(tree.folder_count(), 3);
        assert_eq!(h.folder_ids.peek() - before, 3);
        let cat1 = tree.elements[0].as_folder().unwrap();
        assert_eq!(cat1.id.as_deref(), Some("folder-40"));
        assert_eq!(cat1.parent_id, None);
        assert_eq!(
            cat1.elements[0].as_folder().unwrap().id.as_deref(),
            Some("folder-41")
        );
        assert_eq!(
            tree.elements[1].as_folder().unwrap().id.as_deref(),
            Some("folder-42")
        );
    }

    #[test]
    fn set_ids_skips_layers() {
        let mut seq = Sequence::new();
        let mut nodes = vec![
            TreeNode::Layer(RawLayer::new("1", "root layer")),
            TreeNode::Folder(Folder::new(
                "outer",
                vec![TreeNode::Folder(Folder::new("inner", Vec::new()))],
            )),
        ];
        set_ids_at_folders(&mut nodes, &mut seq);

        assert_eq!(seq.peek(), 2);
        let root_layer = nodes[0].as_layer().unwrap();
        assert_eq!(root_layer.id, "1");
        assert_eq!(root_layer.parent_id, None);
        let outer = nodes[1].as_folder().unwrap();
        let inner = outer.elements[0].as_folder().unwrap();
        assert_eq!(inner.parent_id.as_deref(), Some("folder-0"));
        assert_eq!(inner.id.as_deref(), Some("folder-1"));
    }

    #[test]
    fn structured_input_is_returned_unchanged() {
        let mut h = Harness::new();
        let nodes = vec![TreeNode::Folder(Folder::new(
            "Manual",
            vec![TreeNode::Layer(RawLayer::new("1", "One"))],
        ))];
        let tree = h.build(TreeSource::Structured(nodes.clone()), &[]);
        assert_eq!(tree.elements, nodes);
        assert_eq!(h.folder_ids.peek(), 0);
    }

    #[test]
    fn configured_layers_are_used_verbatim() {
        let mut h = Harness::new();
        let mut configured = RawLayer::new("A", "Configured A");
        configured.show_in_layer_tree = Some(true);
        configured.z_index = Some(99);
        configured
            .extra
            .insert("gfiTheme".to_string(), json!("table"));
        let extra = layer("E", "Extra", Some("Other".into()));

        let tree = h.build(
            TreeSource::Categorized {
                layers: vec![
                    layer("A", "Foo", Some("Cat1".into())),
                    layer("B", "Bar", Some("Cat1".into())),
                ],
                category: Category::default(),
            },
            &[configured, extra],
        );

        assert_eq!(names(&tree.elements), vec!["Cat1", "Other"]);
        let cat1 = tree.elements[0].as_folder().unwrap();
        let a = cat1.elements[0].as_layer().unwrap();
        assert_eq!(a.name, "Configured A");
        assert_eq!(a.z_index, Some(99));
        assert_eq!(a.extra.get("gfiTheme"), Some(&json!("table")));
        assert_eq!(a.md_name(), Some("Foo"));

        let b = cat1.elements[1].as_layer().unwrap();
        assert_eq!(b.node_type.as_deref(), Some("layer"));
        assert_eq!(b.show_in_layer_tree, Some(false));
        assert_eq!(b.z_index, Some(0));
    }

    #[test]
    fn configured_layer_replaces_all_dataset_parts() {
        let mut h = Harness::new();
        let mut first = layer("A_0", "Foo", Some("Cat1".into()));
        first.split_from = Some("A".to_string());
        let mut second = layer("A_1", "Bar", Some("Cat2".into()));
        second.split_from = Some("A".to_string());
        let configured = RawLayer::new("A", "Configured A");

        let tree = h.build(
            TreeSource::Categorized {
                layers: vec![first, second, layer("B", "Baz", Some("Cat2".into()))],
                category: Category::default(),
            },
            &[configured],
        );

        let ids: Vec<&str> = tree.layers().iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(names(&tree.elements), vec!["Cat1", "Cat2"]);
        let a = tree.elements[0].as_folder().unwrap().elements[0].as_layer().unwrap();
        assert_eq!(a.md_name(), Some("Foo"));
    }

    #[test]
    fn buckets_keep_first_appearance_order_unless_sorted() {
        let layers = vec![
            layer("A", "a", Some("beta".into())),
            layer("B", "b", Some("Alpha".into())),
            layer("C", "c", Some("beta".into())),
        ];

        let mut h = Harness::new();
        let tree = h.categorized(layers.clone());
        assert_eq!(names(&tree.elements), vec!["beta", "Alpha"]);

        let mut h = Harness::new();
        h.options.sort_by_name = true;
        let tree = h.categorized(layers);
        assert_eq!(names(&tree.elements), vec!["Alpha", "beta"]);
    }

    #[test]
    fn unique_dataset_names_stay_flat() {
        let nodes = group_by_dataset_name(vec![
            layer("A", "Foo", None),
            layer("B", "Bar", None),
            layer("C", "Foo", None),
        ]);
        assert_eq!(names(&nodes), vec!["Foo", "Layer B"]);
        assert_eq!(nodes[0].as_folder().unwrap().elements.len(), 2);
    }

    #[test]
    fn sort_recurses_into_folders() {
        let mut nodes = vec![
            TreeNode::Folder(Folder::new(
                "b",
                vec![
                    TreeNode::Layer(RawLayer::new("2", "Zeta")),
                    TreeNode::Layer(RawLayer::new("1", "alpha")),
                ],
            )),
            TreeNode::Layer(RawLayer::new("3", "A")),
        ];
        sort_by_name(&mut nodes);
        assert_eq!(names(&nodes), vec!["A", "b"]);
        assert_eq!(
            names(&nodes[1].as_folder().unwrap().elements),
            vec!["alpha", "Zeta"]
        );
    }

    #[test]
    fn active_category_prefers_flag() {
        let mut second = Category::new("kategorie_inspire", "Inspire");
        second.active = Some(true);
        let categories = vec![Category::default(), second];
        assert_eq!(
            Category::active(&categories).unwrap().key,
            "kategorie_inspire"
        );
        assert_eq!(
            Category::active(&categories[..1]).unwrap().key,
            "kategorie_opendata"
        );
        assert!(Category::active(&[]).is_none());
    }
}
