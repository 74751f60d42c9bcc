use catalog::RawLayer;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// The `"type": "folder"` marker of a folder node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FolderTag;

impl Serialize for FolderTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("folder")
    }
}

impl<'de> Deserialize<'de> for FolderTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        if tag == "folder" {
            Ok(FolderTag)
        } else {
            Err(D::Error::custom(format!("expected folder type, got {tag:?}")))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(rename = "type")]
    tag: FolderTag,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub elements: Vec<TreeNode>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Folder {
    pub fn new(name: impl Into<String>, elements: Vec<TreeNode>) -> Self {
        Self {
            id: None,
            parent_id: None,
            tag: FolderTag,
            name: name.into(),
            elements,
            extra: Map::new(),
        }
    }
}

/// A folder or a layer in the layer tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TreeNode {
    Folder(Folder),
    Layer(RawLayer),
}

impl<'de> Deserialize<'de> for TreeNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.get("type").and_then(Value::as_str) == Some("folder") {
            serde_json::from_value(value)
                .map(TreeNode::Folder)
                .map_err(D::Error::custom)
        } else {
            serde_json::from_value(value)
                .map(TreeNode::Layer)
                .map_err(D::Error::custom)
        }
    }
}

impl TreeNode {
    pub fn name(&self) -> &str {
        match self {
            TreeNode::Folder(f) => &f.name,
            TreeNode::Layer(l) => &l.name,
        }
    }

    pub fn as_folder(&self) -> Option<&Folder> {
        match self {
            TreeNode::Folder(f) => Some(f),
            TreeNode::Layer(_) => None,
        }
    }

    pub fn as_layer(&self) -> Option<&RawLayer> {
        match self {
            TreeNode::Layer(l) => Some(l),
            TreeNode::Folder(_) => None,
        }
    }
}

/// Root of a layer tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    #[serde(default)]
    pub elements: Vec<TreeNode>,
}

impl Tree {
    pub fn new(elements: Vec<TreeNode>) -> Self {
        Self { elements }
    }

    /// Folder count at every depth.
    pub fn folder_count(&self) -> usize {
        fn count(nodes: &[TreeNode]) -> usize {
            nodes
                .iter()
                .filter_map(TreeNode::as_folder)
                .map(|f| 1 + count(&f.elements))
                .sum()
        }
        count(&self.elements)
    }

    /// Every layer in depth-first order.
    pub fn layers(&self) -> Vec<&RawLayer> {
        fn collect<'t>(nodes: &'t [TreeNode], out: &mut Vec<&'t RawLayer>) {
            for node in nodes {
                match node {
                    TreeNode::Folder(f) => collect(&f.elements, out),
                    TreeNode::Layer(l) => out.push(l),
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.elements, &mut out);
        out
    }
}
