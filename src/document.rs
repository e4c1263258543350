//! Document loading
//!
//! Raw SAR markup is parsed defensively with `roxmltree` and copied into an
//! owned arena ([`ParsedTree`]) whose tag and attribute names carry local names
//! only, so rules can match `FilerInformation` whatever namespace the filer
//! declared. Nodes refer to their children by [`NodeId`]; no parent pointers
//! are stored (see [`crate::location`] for the side-table used to walk upward).
//!
//! Parse failures never escape as Rust errors. They come back as a single
//! [`ValidationError`] located at `"/"`, which the validator turns into an
//! ordinary (invalid) [`crate::ValidationResult`].

use std::fmt;
use std::path::{Path, PathBuf};

use roxmltree::{Document, ParsingOptions};

use crate::validator::{ErrorKind, ValidationError};

/// Location reported for failures that concern the document as a whole.
pub const DOCUMENT_LOCATION: &str = "/";

/// Identity of the document a payload was read from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceId {
    /// Document read from disk
    Path(PathBuf),
    /// Document submitted as part of a correlated request
    Correlation(String),
    /// Document supplied directly by the caller
    Inline,
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Path(path) => write!(f, "{}", path.display()),
            SourceId::Correlation(id) => write!(f, "request {}", id),
            SourceId::Inline => write!(f, "<inline>"),
        }
    }
}

/// Text payload plus where it came from. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    source: SourceId,
    text: String,
}

impl RawDocument {
    pub fn new(source: SourceId, text: impl Into<String>) -> Self {
        Self {
            source,
            text: text.into(),
        }
    }

    pub fn inline(text: impl Into<String>) -> Self {
        Self::new(SourceId::Inline, text)
    }

    /// Read a document from disk. Content that is not UTF-8 is reported as
    /// `InvalidData`.
    pub async fn read(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let text = String::from_utf8(bytes)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        Ok(Self::new(SourceId::Path(path.to_path_buf()), text))
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parse(&self) -> Result<ParsedTree, ValidationError> {
        ParsedTree::parse(&self.text)
    }
}

/// Index of an element inside a [`ParsedTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A namespace-stripped element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    tag: String,
    attributes: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<NodeId>,
}

impl Element {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Concatenated direct text content, untrimmed
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Owned, namespace-free element tree. The root element is always `NodeId(0)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTree {
    nodes: Vec<Element>,
}

impl ParsedTree {
    /// Parse raw markup, failing closed on DTDs and entity declarations.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        if text.trim().is_empty() {
            return Err(ValidationError::error(
                ErrorKind::MalformedInput,
                "SAR document is empty.",
                Some(DOCUMENT_LOCATION.to_string()),
            ));
        }

        let options = ParsingOptions {
            allow_dtd: false,
            ..ParsingOptions::default()
        };

        match Document::parse_with_options(text, options) {
            Ok(document) => Ok(Self::from_document(&document)),
            Err(roxmltree::Error::DtdDetected) => Err(security_policy_error()),
            Err(err) => Err(ValidationError::error(
                ErrorKind::MalformedInput,
                format!("Malformed XML: {}.", err),
                Some(DOCUMENT_LOCATION.to_string()),
            )),
        }
    }

    /// Parse raw bytes; anything that is not UTF-8 is malformed input.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, ValidationError> {
        match std::str::from_utf8(bytes) {
            Ok(text) => Self::parse(text),
            Err(err) => Err(ValidationError::error(
                ErrorKind::MalformedInput,
                format!("Malformed XML: document is not valid UTF-8 ({}).", err),
                Some(DOCUMENT_LOCATION.to_string()),
            )),
        }
    }

    // Preorder copy with an explicit stack so deeply nested input cannot
    // exhaust the call stack.
    fn from_document(document: &Document<'_>) -> Self {
        let mut nodes: Vec<Element> = Vec::new();
        let mut pending = vec![(document.root_element(), None::<NodeId>)];

        while let Some((node, parent)) = pending.pop() {
            let id = NodeId(nodes.len());
            nodes.push(Element {
                tag: node.tag_name().name().to_string(),
                attributes: node
                    .attributes()
                    .map(|attr| (attr.name().to_string(), attr.value().to_string()))
                    .collect(),
                text: direct_text(node),
                children: Vec::new(),
            });

            if let Some(parent) = parent {
                nodes[parent.0].children.push(id);
            }

            let children: Vec<_> = node.children().filter(|child| child.is_element()).collect();
            for child in children.into_iter().rev() {
                pending.push((child, Some(id)));
            }
        }

        Self { nodes }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up an element. `id` must come from this tree.
    pub fn element(&self, id: NodeId) -> &Element {
        &self.nodes[id.0]
    }

    pub fn tag(&self, id: NodeId) -> &str {
        self.element(id).tag()
    }

    /// First direct child with the given local name
    pub fn child(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        self.children_named(id, tag).next()
    }

    /// Direct children with the given local name, in document order
    pub fn children_named<'a>(
        &'a self,
        id: NodeId,
        tag: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.element(id)
            .children()
            .iter()
            .copied()
            .filter(move |child| self.tag(*child) == tag)
    }

    /// All element ids in document order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }
}

fn direct_text(node: roxmltree::Node<'_, '_>) -> Option<String> {
    let mut text: Option<String> = None;
    for chunk in node
        .children()
        .filter(|child| child.is_text())
        .filter_map(|child| child.text())
    {
        text.get_or_insert_with(String::new).push_str(chunk);
    }
    text
}

fn security_policy_error() -> ValidationError {
    ValidationError::error(
        ErrorKind::SecurityPolicy,
        "XML input blocked by security policy: DTD processing and entity declarations are disabled.",
        Some(DOCUMENT_LOCATION.to_string()),
    )
}
