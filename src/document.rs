// WHY: In-memory stand-in for the host editor tree the core rewrites
// Nodes live in an arena keyed by stable NodeKeys; writes only happen inside update()

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::ops::Deref;
use tracing::debug;

use crate::error::SessionError;
use crate::state::SentenceId;

/// Stable identity of a node; never reused within a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey(u64);

impl NodeKey {
    /// Adopt an identity minted by the host
    pub const fn from_raw(raw: u64) -> Self {
        NodeKey(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Node kinds a document can be configured to hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Root,
    Paragraph,
    Heading,
    Quote,
    Link,
    Text,
    Marker,
}

impl NodeKind {
    pub const ALL: [NodeKind; 7] = [
        NodeKind::Root,
        NodeKind::Paragraph,
        NodeKind::Heading,
        NodeKind::Quote,
        NodeKind::Link,
        NodeKind::Text,
        NodeKind::Marker,
    ];
}

/// Structural element kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Root,
    Paragraph,
    Heading,
    Quote,
    Link,
}

impl From<ElementKind> for NodeKind {
    fn from(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Root => NodeKind::Root,
            ElementKind::Paragraph => NodeKind::Paragraph,
            ElementKind::Heading => NodeKind::Heading,
            ElementKind::Quote => NodeKind::Quote,
            ElementKind::Link => NodeKind::Link,
        }
    }
}

/// Plain text, optionally tagged with the sentence it was last processed under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub text: String,
    pub sentence: Option<SentenceId>,
}

impl TextSpan {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sentence: None,
        }
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A surfaced, clickable dictionary match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSpan {
    pub original_word: String,
    pub replacement: String,
    pub sentence: SentenceId,
}

impl MarkerSpan {
    pub fn char_len(&self) -> usize {
        self.original_word.chars().count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSpan {
    pub kind: ElementKind,
    pub children: Vec<NodeKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanNode {
    Text(TextSpan),
    Marker(MarkerSpan),
    Element(ElementSpan),
}

impl SpanNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            SpanNode::Text(_) => NodeKind::Text,
            SpanNode::Marker(_) => NodeKind::Marker,
            SpanNode::Element(element) => element.kind.into(),
        }
    }

    /// Character length for text-bearing spans, `None` for elements
    pub fn text_len(&self) -> Option<usize> {
        match self {
            SpanNode::Text(text) => Some(text.char_len()),
            SpanNode::Marker(marker) => Some(marker.char_len()),
            SpanNode::Element(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeKey>,
    span: SpanNode,
}

/// Caret position: a text-bearing node and a character offset inside it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionPoint {
    pub key: NodeKey,
    pub offset: usize,
}

impl SelectionPoint {
    pub fn new(key: NodeKey, offset: usize) -> Self {
        Self { key, offset }
    }
}

/// A text-bearing span located inside a block, with block-relative offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveSpan {
    pub key: NodeKey,
    pub start: usize,
    pub end: usize,
    pub is_marker: bool,
}

impl LiveSpan {
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

/// Read-only view of a marker for listing UIs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerView {
    pub key: NodeKey,
    pub block: NodeKey,
    pub original_word: String,
    pub replacement: String,
    pub sentence_identity: SentenceId,
}

/// Emitted after each committed transaction that changed content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChange {
    pub revision: u64,
    pub dirty_blocks: Vec<NodeKey>,
}

/// Consistent copy of every block's text at one revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    pub revision: u64,
    pub blocks: Vec<BlockSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSnapshot {
    pub key: NodeKey,
    pub text: String,
}

impl DocumentSnapshot {
    /// Block texts joined with newlines
    pub fn full_text(&self) -> String {
        self.blocks
            .iter()
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

type ChangeListener = Box<dyn FnMut(&DocumentChange)>;

pub struct Document {
    nodes: HashMap<NodeKey, Node>,
    root: NodeKey,
    next_key: u64,
    registered: HashSet<NodeKind>,
    selection: Option<SelectionPoint>,
    revision: u64,
    listeners: Vec<ChangeListener>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.nodes.len())
            .field("revision", &self.revision)
            .field("selection", &self.selection)
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Empty document accepting every node kind
    pub fn new() -> Self {
        Self::with_registered_kinds(NodeKind::ALL)
    }

    /// Empty document accepting only the given kinds (the root is always accepted)
    pub fn with_registered_kinds(kinds: impl IntoIterator<Item = NodeKind>) -> Self {
        let root = NodeKey(0);
        let mut registered: HashSet<NodeKind> = kinds.into_iter().collect();
        registered.insert(NodeKind::Root);

        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            Node {
                parent: None,
                span: SpanNode::Element(ElementSpan {
                    kind: ElementKind::Root,
                    children: Vec::new(),
                }),
            },
        );

        Self {
            nodes,
            root,
            next_key: 1,
            registered,
            selection: None,
            revision: 0,
            listeners: Vec::new(),
        }
    }

    /// Document with one paragraph (single text span) per input line
    pub fn from_paragraphs<'a>(paragraphs: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut doc = Self::new();
        doc.update(|tx| -> Result<()> {
            for paragraph in paragraphs {
                let block = tx.append_block(ElementKind::Paragraph)?;
                if !paragraph.is_empty() {
                    tx.append_text(block, paragraph)?;
                }
            }
            Ok(())
        })?;
        Ok(doc)
    }

    pub fn root(&self) -> NodeKey {
        self.root
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn selection(&self) -> Option<SelectionPoint> {
        self.selection
    }

    pub fn has_kind(&self, kind: NodeKind) -> bool {
        self.registered.contains(&kind)
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(&key)
    }

    pub fn node(&self, key: NodeKey) -> Option<&SpanNode> {
        self.nodes.get(&key).map(|node| &node.span)
    }

    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes.get(&key).and_then(|node| node.parent)
    }

    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        match self.node(key) {
            Some(SpanNode::Element(element)) => &element.children,
            _ => &[],
        }
    }

    /// Top-level elements, in order
    pub fn blocks(&self) -> Vec<NodeKey> {
        self.children(self.root).to_vec()
    }

    /// The top-level element that contains `key`
    pub fn block_of(&self, key: NodeKey) -> Option<NodeKey> {
        let mut current = key;
        loop {
            let parent = self.parent(current)?;
            if parent == self.root {
                return Some(current);
            }
            current = parent;
        }
    }

    pub fn marker(&self, key: NodeKey) -> Option<&MarkerSpan> {
        match self.node(key) {
            Some(SpanNode::Marker(marker)) => Some(marker),
            _ => None,
        }
    }

    pub fn text_span(&self, key: NodeKey) -> Option<&TextSpan> {
        match self.node(key) {
            Some(SpanNode::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Concatenated text of a node and its descendants
    pub fn text_content(&self, key: NodeKey) -> String {
        let mut out = String::new();
        self.push_text(key, &mut out);
        out
    }

    fn push_text(&self, key: NodeKey, out: &mut String) {
        match self.node(key) {
            Some(SpanNode::Text(text)) => out.push_str(&text.text),
            Some(SpanNode::Marker(marker)) => out.push_str(&marker.original_word),
            Some(SpanNode::Element(element)) => {
                for child in &element.children {
                    self.push_text(*child, out);
                }
            }
            None => {}
        }
    }

    /// Every block's text, newline-separated
    pub fn full_text(&self) -> String {
        self.snapshot().full_text()
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            revision: self.revision,
            blocks: self
                .blocks()
                .into_iter()
                .map(|key| BlockSnapshot {
                    key,
                    text: self.text_content(key),
                })
                .collect(),
        }
    }

    /// Text-bearing spans of `block` that overlap `[start, end)`
    pub fn text_spans_in_range(&self, block: NodeKey, start: usize, end: usize) -> Vec<LiveSpan> {
        self.text_spans(block)
            .into_iter()
            .filter(|span| span.end > start && span.start < end)
            .collect()
    }

    /// Every text-bearing span of `block`, in document order
    pub fn text_spans(&self, block: NodeKey) -> Vec<LiveSpan> {
        let mut spans = Vec::new();
        let mut offset = 0;
        self.collect_spans(block, &mut offset, &mut spans);
        spans
    }

    fn collect_spans(&self, key: NodeKey, offset: &mut usize, out: &mut Vec<LiveSpan>) {
        let Some(span) = self.node(key) else {
            return;
        };
        match span {
            SpanNode::Element(element) => {
                for child in &element.children {
                    self.collect_spans(*child, offset, out);
                }
            }
            SpanNode::Text(_) | SpanNode::Marker(_) => {
                let len = span.text_len().unwrap_or(0);
                out.push(LiveSpan {
                    key,
                    start: *offset,
                    end: *offset + len,
                    is_marker: matches!(span, SpanNode::Marker(_)),
                });
                *offset += len;
            }
        }
    }

    /// Live markers in document order
    pub fn markers(&self) -> Vec<MarkerView> {
        let mut views = Vec::new();
        for block in self.blocks() {
            for span in self.text_spans(block).into_iter().filter(|span| span.is_marker) {
                if let Some(marker) = self.marker(span.key) {
                    views.push(MarkerView {
                        key: span.key,
                        block,
                        original_word: marker.original_word.clone(),
                        replacement: marker.replacement.clone(),
                        sentence_identity: marker.sentence,
                    });
                }
            }
        }
        views
    }

    /// Register a listener called after every committed content change
    pub fn subscribe(&mut self, listener: impl FnMut(&DocumentChange) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Run `f` as one exclusive transaction; listeners see only the committed result
    pub fn update<R>(&mut self, f: impl FnOnce(&mut Transaction<'_>) -> R) -> R {
        let (result, dirty) = {
            let mut tx = Transaction {
                doc: self,
                dirty: BTreeSet::new(),
            };
            let result = f(&mut tx);
            (result, tx.dirty)
        };

        if !dirty.is_empty() {
            self.revision += 1;
            let change = DocumentChange {
                revision: self.revision,
                dirty_blocks: dirty.into_iter().filter(|key| self.nodes.contains_key(key)).collect(),
            };
            debug!(revision = change.revision, blocks = change.dirty_blocks.len(), "Document transaction committed");
            for listener in &mut self.listeners {
                listener(&change);
            }
        }

        result
    }

    fn alloc(&mut self, parent: Option<NodeKey>, span: SpanNode) -> NodeKey {
        let key = NodeKey(self.next_key);
        self.next_key += 1;
        self.nodes.insert(key, Node { parent, span });
        key
    }

    fn remove_subtree(&mut self, key: NodeKey) {
        if let Some(node) = self.nodes.remove(&key) {
            if let SpanNode::Element(element) = node.span {
                for child in element.children {
                    self.remove_subtree(child);
                }
            }
        }
    }
}

/// Exclusive write access to a document; reads go through `Deref`
pub struct Transaction<'a> {
    doc: &'a mut Document,
    dirty: BTreeSet<NodeKey>,
}

impl Deref for Transaction<'_> {
    type Target = Document;

    fn deref(&self) -> &Document {
        self.doc
    }
}

impl Transaction<'_> {
    fn touch(&mut self, key: NodeKey) {
        if let Some(block) = self.doc.block_of(key) {
            self.dirty.insert(block);
        }
    }

    fn ensure_kind(&self, kind: NodeKind) -> Result<()> {
        if self.doc.has_kind(kind) {
            Ok(())
        } else if kind == NodeKind::Marker {
            Err(SessionError::MarkerKindNotRegistered(kind).into())
        } else {
            anyhow::bail!("node kind {kind:?} is not registered with the document")
        }
    }

    fn node_mut(&mut self, key: NodeKey) -> Result<&mut Node> {
        self.doc
            .nodes
            .get_mut(&key)
            .ok_or_else(|| SessionError::UnknownNode(key).into())
    }

    fn text_mut(&mut self, key: NodeKey) -> Result<&mut TextSpan> {
        match &mut self.node_mut(key)?.span {
            SpanNode::Text(text) => Ok(text),
            _ => Err(SessionError::NotAText(key).into()),
        }
    }

    fn children_mut(&mut self, key: NodeKey) -> Result<&mut Vec<NodeKey>> {
        match &mut self.node_mut(key)?.span {
            SpanNode::Element(element) => Ok(&mut element.children),
            _ => anyhow::bail!("node {key} cannot hold children"),
        }
    }

    /// Append a top-level block
    pub fn append_block(&mut self, kind: ElementKind) -> Result<NodeKey> {
        let root = self.doc.root;
        self.append_element(root, kind)
    }

    pub fn append_element(&mut self, parent: NodeKey, kind: ElementKind) -> Result<NodeKey> {
        self.ensure_kind(kind.into())?;
        self.children_mut(parent)?;
        let key = self.doc.alloc(
            Some(parent),
            SpanNode::Element(ElementSpan {
                kind,
                children: Vec::new(),
            }),
        );
        self.children_mut(parent)?.push(key);
        self.touch(key);
        Ok(key)
    }

    pub fn append_text(&mut self, parent: NodeKey, text: &str) -> Result<NodeKey> {
        self.ensure_kind(NodeKind::Text)?;
        self.children_mut(parent)?;
        let key = self.doc.alloc(Some(parent), SpanNode::Text(TextSpan::new(text)));
        self.children_mut(parent)?.push(key);
        self.touch(key);
        Ok(key)
    }

    pub fn set_text(&mut self, key: NodeKey, text: &str) -> Result<()> {
        let span = self.text_mut(key)?;
        span.text = text.to_string();
        let len = span.char_len();
        if let Some(selection) = self.doc.selection.as_mut() {
            if selection.key == key {
                selection.offset = selection.offset.min(len);
            }
        }
        self.touch(key);
        Ok(())
    }

    /// Insert `text` at a character offset of a text span (a keystroke)
    pub fn insert_text(&mut self, key: NodeKey, offset: usize, text: &str) -> Result<()> {
        let span = self.text_mut(key)?;
        let len = span.char_len();
        if offset > len {
            return Err(SessionError::SplitOutOfRange { key, offset, len }.into());
        }
        let byte = byte_index(&span.text, offset);
        span.text.insert_str(byte, text);
        self.touch(key);
        Ok(())
    }

    /// Split a text span at a character offset strictly inside it
    ///
    /// The original key keeps the head; the tail gets a new key placed right after it.
    /// Both halves keep the sentence tag. A caret in the tail follows it.
    pub fn split_text(&mut self, key: NodeKey, offset: usize) -> Result<(NodeKey, NodeKey)> {
        let span = self.text_mut(key)?;
        let len = span.char_len();
        if offset == 0 || offset >= len {
            return Err(SessionError::SplitOutOfRange { key, offset, len }.into());
        }

        let byte = byte_index(&span.text, offset);
        let tail = TextSpan {
            text: span.text.split_off(byte),
            sentence: span.sentence,
        };

        let parent = self.doc.parent(key).ok_or(SessionError::UnknownNode(key))?;
        let tail_key = self.doc.alloc(Some(parent), SpanNode::Text(tail));
        let siblings = self.children_mut(parent)?;
        let position = siblings.iter().position(|k| *k == key).map_or(siblings.len(), |p| p + 1);
        siblings.insert(position, tail_key);

        if let Some(selection) = self.doc.selection.as_mut() {
            if selection.key == key && selection.offset > offset {
                *selection = SelectionPoint::new(tail_key, selection.offset - offset);
            }
        }

        self.touch(key);
        Ok((key, tail_key))
    }

    /// Swap a node for a new one at the same position; returns the new key
    pub fn replace(&mut self, key: NodeKey, span: SpanNode) -> Result<NodeKey> {
        self.ensure_kind(span.kind())?;
        if key == self.doc.root {
            anyhow::bail!("cannot replace the root node");
        }
        let parent = self.doc.parent(key).ok_or(SessionError::UnknownNode(key))?;
        self.touch(key);

        let new_len = span.text_len().unwrap_or(0);
        let new_key = self.doc.alloc(Some(parent), span);
        if let Some(slot) = self.children_mut(parent)?.iter_mut().find(|k| **k == key) {
            *slot = new_key;
        }
        self.doc.remove_subtree(key);

        if let Some(selection) = self.doc.selection.as_mut() {
            if selection.key == key {
                *selection = SelectionPoint::new(new_key, selection.offset.min(new_len));
            }
        }

        Ok(new_key)
    }

    /// Delete a node and its descendants
    pub fn remove(&mut self, key: NodeKey) -> Result<()> {
        if key == self.doc.root {
            anyhow::bail!("cannot remove the root node");
        }
        let parent = self.doc.parent(key).ok_or(SessionError::UnknownNode(key))?;
        self.touch(key);
        self.children_mut(parent)?.retain(|k| *k != key);
        self.doc.remove_subtree(key);

        if self.doc.selection.is_some_and(|selection| !self.doc.nodes.contains_key(&selection.key)) {
            self.doc.selection = None;
        }
        Ok(())
    }

    /// Record which sentence a text span was processed under
    pub fn tag_sentence(&mut self, key: NodeKey, sentence: SentenceId) -> Result<()> {
        self.text_mut(key)?.sentence = Some(sentence);
        Ok(())
    }

    pub fn set_selection(&mut self, selection: Option<SelectionPoint>) {
        self.doc.selection = selection;
    }
}

fn byte_index(text: &str, char_offset: usize) -> usize {
    text.char_indices()
        .nth(char_offset)
        .map_or(text.len(), |(byte, _)| byte)
}
