//! Structural diff and merge of entities documents.
//!
//! [`export`] compares a vanilla tree with a modded one and records what
//! changed as a [`DiffDocument`]; [`import`] replays such a document onto a
//! live [`Document`]. Entities are matched by key rather than position, so a
//! diff can be applied to a file that has drifted from its baseline.
//! Inconsistencies found while importing are logged and skipped.
//!
//! # Keys
//!
//! An entity's key is its entityDef name, prefixed with `<marker>/` when
//! the entity belongs to a named submap. Inside an object a child's key is
//! its name, or its value text when it has no name. A key that repeats gets
//! `#1`, `#2`, ... on its second and later occurrences.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{DiffConfig, DocumentConfig};
use crate::document::Document;
use crate::error::Result;
use crate::node::{NodeFlags, NodeId, NodeKind};
use crate::parser::{self, GrammarContext};
use crate::token::Tokenizer;
use crate::tree::{deep_eq, Tree};
use crate::value;

// ============================================================================
// Diff document
// ============================================================================

/// Everything that differs between two documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffDocument {
    /// Keys of entities only in the vanilla document.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted: Vec<String>,
    /// Entities only in the modded document, in modded order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<AddedEntity>,
    /// Entities in both documents whose contents differ.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edited: Vec<EditedEntity>,
}

/// A new entity and where it goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedEntity {
    pub key: String,
    /// Submap prefix of the key, empty for the default submap.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prefix: String,
    /// Serialized entity.
    pub text: String,
    /// Key of the entity it followed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    /// Key of the entity it preceded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditedEntity {
    pub key: String,
    pub diff: ObjectDiff,
}

/// Changes to the children of one object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDiff {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<AddedProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edited: Vec<EditedProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<NestedDiff>,
}

impl ObjectDiff {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.added.is_empty() && self.edited.is_empty() && self.nested.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedProperty {
    pub key: String,
    /// Key of the sibling it follows; `None` for the first child.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    pub text: String,
    /// Written on the line of the sibling before it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub inline: bool,
}

/// A leaf whose value changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditedProperty {
    pub key: String,
    pub value: String,
}

/// Changes inside a child object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedDiff {
    pub key: String,
    pub diff: ObjectDiff,
}

impl DiffDocument {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.added.is_empty() && self.edited.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ============================================================================
// Keys
// ============================================================================

/// Entities of a document by key.
#[derive(Debug, Clone, Default)]
pub struct EntityIndex {
    entries: Vec<IndexEntry>,
    by_key: HashMap<String, usize>,
    prefixes: HashMap<i64, String>,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    key: String,
    prefix: String,
    node: NodeId,
}

impl EntityIndex {
    pub fn build(tree: &Tree, config: &DiffConfig) -> Self {
        let root = tree.root_id();
        let entities: Vec<NodeId> =
            tree.children(root).iter().copied().filter(|&c| tree.kind(c) == NodeKind::Entity).collect();

        let mut prefixes = HashMap::new();
        for &entity in &entities {
            let submap = submap_of(tree, entity, config);
            if submap == 0 {
                continue;
            }
            let Some(def) = entity_def(tree, entity) else {
                continue;
            };
            let class = tree.find_child_value(def, b"class").map(value::unquote);
            if class == Some(config.marker_class.as_bytes()) {
                let prefix = format!("{}/", String::from_utf8_lossy(tree.def_name(def)));
                prefixes.entry(submap).or_insert(prefix);
            }
        }

        let mut index = EntityIndex { entries: Vec::new(), by_key: HashMap::new(), prefixes };
        let mut seen = HashMap::new();
        for entity in entities {
            let prefix = index.prefixes.get(&submap_of(tree, entity, config)).cloned().unwrap_or_default();
            let base = match entity_def(tree, entity) {
                Some(def) => format!("{prefix}{}", String::from_utf8_lossy(tree.def_name(def))),
                None => String::from_utf8_lossy(&tree.node_text(entity)).into_owned(),
            };
            let key = dedup(&mut seen, base);
            index.by_key.insert(key.clone(), index.entries.len());
            index.entries.push(IndexEntry { key, prefix, node: entity });
        }
        index
    }

    pub fn get(&self, key: &str) -> Option<NodeId> {
        self.by_key.get(key).map(|&i| self.entries[i].node)
    }

    /// Keys in document order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|e| e.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Submap index whose marker establishes `prefix`.
    pub fn submap_for_prefix(&self, prefix: &str) -> Option<i64> {
        self.prefixes.iter().find(|(_, p)| p.as_str() == prefix).map(|(&n, _)| n)
    }
}

fn entity_def(tree: &Tree, entity: NodeId) -> Option<NodeId> {
    tree.children(entity).iter().copied().find(|&c| tree.kind(c) == NodeKind::EntityDef)
}

fn submap_of(tree: &Tree, entity: NodeId, config: &DiffConfig) -> i64 {
    tree.find_child_value(entity, config.submap_field.as_bytes())
        .map(|v| value::int_or_zero(value::unquote(v)))
        .unwrap_or(0)
}

fn dedup(seen: &mut HashMap<String, usize>, base: String) -> String {
    let n = seen.entry(base.clone()).or_insert(0);
    let key = if *n == 0 { base } else { format!("{base}#{n}") };
    *n += 1;
    key
}

/// Keys of the children of `parent`, in order.
fn child_keys(tree: &Tree, parent: NodeId) -> Vec<(String, NodeId)> {
    let mut seen = HashMap::new();
    tree.children(parent)
        .iter()
        .map(|&c| {
            let name = tree.name(c);
            let base = if name.is_empty() { tree.value(c) } else { name };
            (dedup(&mut seen, String::from_utf8_lossy(base).into_owned()), c)
        })
        .collect()
}

fn lossy(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

// ============================================================================
// Export
// ============================================================================

/// Diff `modded` against `vanilla`.
pub fn export(vanilla: &Tree, modded: &Tree, config: &DiffConfig) -> DiffDocument {
    let old = EntityIndex::build(vanilla, config);
    let new = EntityIndex::build(modded, config);
    let mut diff = DiffDocument::default();

    for entry in &old.entries {
        if new.get(&entry.key).is_none() {
            diff.deleted.push(entry.key.clone());
        }
    }

    for (i, entry) in new.entries.iter().enumerate() {
        match old.get(&entry.key) {
            None => diff.added.push(AddedEntity {
                key: entry.key.clone(),
                prefix: entry.prefix.clone(),
                text: lossy(modded.node_text(entry.node)),
                after: i.checked_sub(1).map(|p| new.entries[p].key.clone()),
                before: new.entries.get(i + 1).map(|e| e.key.clone()),
            }),
            Some(node) => {
                if deep_eq(vanilla, node, modded, entry.node) {
                    continue;
                }
                let changes = diff_object(vanilla, node, modded, entry.node);
                if !changes.is_empty() {
                    diff.edited.push(EditedEntity { key: entry.key.clone(), diff: changes });
                }
            }
        }
    }

    debug!(
        deleted = diff.deleted.len(),
        added = diff.added.len(),
        edited = diff.edited.len(),
        "exported diff"
    );
    diff
}

fn diff_object(a_tree: &Tree, a: NodeId, b_tree: &Tree, b: NodeId) -> ObjectDiff {
    let a_keys = child_keys(a_tree, a);
    let b_keys = child_keys(b_tree, b);
    let a_map: HashMap<&str, NodeId> = a_keys.iter().map(|(k, n)| (k.as_str(), *n)).collect();
    let b_set: HashSet<&str> = b_keys.iter().map(|(k, _)| k.as_str()).collect();

    let mut diff = ObjectDiff::default();
    for (key, _) in &a_keys {
        if !b_set.contains(key.as_str()) {
            diff.deleted.push(key.clone());
        }
    }

    for (i, (key, bn)) in b_keys.iter().enumerate() {
        let bn = *bn;
        let added = || AddedProperty {
            key: key.clone(),
            after: i.checked_sub(1).map(|p| b_keys[p].0.clone()),
            text: lossy(b_tree.node_text(bn)),
            inline: b_tree.flags(bn).contains(NodeFlags::NO_INDENT),
        };

        let Some(&an) = a_map.get(key.as_str()) else {
            diff.added.push(added());
            continue;
        };
        let kind = b_tree.kind(bn);
        if a_tree.kind(an) != kind || a_tree.flags(an) != b_tree.flags(bn) {
            diff.deleted.push(key.clone());
            diff.added.push(added());
        } else if kind.is_container() {
            let nested = diff_object(a_tree, an, b_tree, bn);
            if !nested.is_empty() {
                diff.nested.push(NestedDiff { key: key.clone(), diff: nested });
            }
        } else if a_tree.value(an) != b_tree.value(bn) {
            diff.edited.push(EditedProperty { key: key.clone(), value: lossy(b_tree.value(bn).to_vec()) });
        }
    }
    diff
}

// ============================================================================
// Import
// ============================================================================

/// What an [`import`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub deleted: usize,
    pub added: usize,
    pub edited: usize,
    /// Inconsistencies logged and skipped.
    pub warnings: usize,
}

/// Apply `diff` to `doc` as a single undo step.
///
/// Deletions are applied first, then additions, then edits. Every edited
/// entity has its list numbering repaired afterwards.
pub fn import(doc: &mut Document, diff: &DiffDocument, config: &DiffConfig) -> ImportSummary {
    doc.push_group_command();
    let entities = EntityIndex::build(doc.tree(), config);
    let root = doc.tree().root_id();
    let mut live: Vec<(String, NodeId)> = entities.entries.iter().map(|e| (e.key.clone(), e.node)).collect();
    let mut summary = ImportSummary::default();

    for key in &diff.deleted {
        let Some(pos) = position(&live, key) else {
            warn!(key = %key, "entity already deleted");
            summary.warnings += 1;
            continue;
        };
        let (_, node) = live.remove(pos);
        if remove_child(doc, root, node) {
            summary.deleted += 1;
        }
    }

    for entity in &diff.added {
        if position(&live, &entity.key).is_some() {
            warn!(key = %entity.key, "entity already exists");
            summary.warnings += 1;
            continue;
        }
        if fragment_kinds(&entity.text, GrammarContext::File).is_some_and(|kinds| kinds != [NodeKind::Entity]) {
            warn!(key = %entity.key, "added entity text is not a single entity");
            summary.warnings += 1;
            continue;
        }

        let tree = doc.tree();
        let after = entity.after.as_deref().and_then(|k| position(&live, k));
        let before = entity.before.as_deref().and_then(|k| position(&live, k));
        let (slot, index) = match (after, before) {
            (Some(p), _) => (p + 1, tree_index(tree, live[p].1) + 1),
            (None, _) if entity.after.is_none() => {
                let first = live.first().map_or(tree.child_count(root), |(_, n)| tree_index(tree, *n));
                (0, first)
            }
            (None, Some(p)) => (p, tree_index(tree, live[p].1)),
            (None, None) => {
                warn!(key = %entity.key, "anchor not found, appending entity");
                summary.warnings += 1;
                (live.len(), tree.child_count(root))
            }
        };

        if let Err(e) = doc.insert_fragment(entity.text.as_bytes(), root, index, 0, false, false) {
            warn!(key = %entity.key, error = %e, "added entity does not parse");
            summary.warnings += 1;
            continue;
        }
        let Some(node) = doc.tree().child(root, index) else {
            continue;
        };
        if !entity.prefix.is_empty() {
            summary.warnings += set_submap(doc, node, index_prefix(&entities, &entity.prefix, &entity.key), config);
        }
        live.insert(slot, (entity.key.clone(), node));
        summary.added += 1;
    }

    for entity in &diff.edited {
        let Some(pos) = position(&live, &entity.key) else {
            warn!(key = %entity.key, "edited entity not found");
            summary.warnings += 1;
            continue;
        };
        let node = live[pos].1;
        summary.warnings += apply_object(doc, node, &entity.diff, &entity.key);
        doc.fix_list_numberings(node, true, false);
        summary.edited += 1;
    }

    doc.push_group_command();
    debug!(
        deleted = summary.deleted,
        added = summary.added,
        edited = summary.edited,
        warnings = summary.warnings,
        "imported diff"
    );
    summary
}

/// Kinds of the top-level nodes `text` parses to under `context`, or `None`
/// when it does not parse.
fn fragment_kinds(text: &str, context: GrammarContext) -> Option<Vec<NodeKind>> {
    let config = DocumentConfig {
        text_buffer_size: text.len().max(16),
        node_buffer_size: 64,
        child_buffer_size: 64,
        ..DocumentConfig::default()
    };
    let mut scratch = Tree::new(&config);
    let nodes = parser::parse_fragment(&mut scratch, context, text.as_bytes(), 0, false).ok()?;
    Some(nodes.iter().map(|&n| scratch.kind(n)).collect())
}

/// Whether `text` is exactly one value token.
fn is_single_value(text: &str) -> bool {
    match Tokenizer::new(text.as_bytes()).next_token() {
        Ok(tok) => tok.kind.is_value() && tok.start == 0 && tok.end == text.len(),
        Err(_) => false,
    }
}

fn position(list: &[(String, NodeId)], key: &str) -> Option<usize> {
    list.iter().position(|(k, _)| k == key)
}

fn tree_index(tree: &Tree, node: NodeId) -> usize {
    tree.index_of(node).unwrap_or_else(|| tree.child_count(tree.root_id()))
}

fn remove_child(doc: &mut Document, parent: NodeId, node: NodeId) -> bool {
    let Some(index) = doc.tree().index_of(node) else {
        return false;
    };
    doc.insert_fragment(b"", parent, index, 1, false, false).is_ok()
}

/// Submap index for an added entity's prefix, warning when the target
/// document has no marker for it.
fn index_prefix(index: &EntityIndex, prefix: &str, key: &str) -> Option<i64> {
    let submap = index.submap_for_prefix(prefix);
    if submap.is_none() {
        warn!(key = %key, prefix = %prefix, "submap prefix not found, keeping entity's submap");
    }
    submap
}

/// Point an entity's submap field at `submap`. Returns the warning count.
fn set_submap(doc: &mut Document, entity: NodeId, submap: Option<i64>, config: &DiffConfig) -> usize {
    let Some(submap) = submap else {
        return 1;
    };
    let tree = doc.tree();
    let Some(field) = tree.find_child(entity, config.submap_field.as_bytes()) else {
        return 0;
    };
    let current = tree.value(field);
    if value::int_or_zero(value::unquote(current)) == submap {
        return 0;
    }
    let quoted = current.first() == Some(&b'"');
    let mut text = tree.name(field).to_vec();
    let name_len = text.len();
    if quoted {
        text.extend_from_slice(format!("\"{submap}\"").as_bytes());
    } else {
        text.extend_from_slice(submap.to_string().as_bytes());
    }
    doc.edit_text(&text, field, name_len, false);
    0
}

/// Apply an object diff under `parent`. Returns the warning count.
fn apply_object(doc: &mut Document, parent: NodeId, diff: &ObjectDiff, path: &str) -> usize {
    let mut warnings = 0;
    let mut live = child_keys(doc.tree(), parent);

    for key in &diff.deleted {
        match position(&live, key) {
            Some(pos) => {
                let (_, node) = live.remove(pos);
                remove_child(doc, parent, node);
            }
            None => {
                warn!(path = %path, key = %key, "deleted property no longer exists");
                warnings += 1;
            }
        }
    }

    for property in &diff.added {
        if position(&live, &property.key).is_some() {
            warn!(path = %path, key = %property.key, "added property already exists");
            warnings += 1;
            continue;
        }
        let shape = doc.tree().context_of(parent).and_then(|cx| fragment_kinds(&property.text, cx));
        if shape.is_some_and(|kinds| kinds.len() != 1) {
            warn!(path = %path, key = %property.key, "added property text is not a single node");
            warnings += 1;
            continue;
        }
        let (slot, index) = match property.after.as_deref() {
            None => (0, 0),
            Some(anchor) => match position(&live, anchor) {
                Some(p) => (p + 1, doc.tree().index_of(live[p].1).map_or(0, |i| i + 1)),
                None => {
                    warn!(path = %path, key = %property.key, anchor = %anchor, "anchor not found, appending property");
                    warnings += 1;
                    (live.len(), doc.tree().child_count(parent))
                }
            },
        };
        if let Err(e) = doc.insert_fragment(property.text.as_bytes(), parent, index, 0, property.inline, false) {
            warn!(path = %path, key = %property.key, error = %e, "added property does not parse");
            warnings += 1;
            continue;
        }
        if let Some(node) = doc.tree().child(parent, index) {
            live.insert(slot, (property.key.clone(), node));
        }
    }

    for property in &diff.edited {
        let Some(pos) = position(&live, &property.key) else {
            warn!(path = %path, key = %property.key, "edited property no longer exists");
            warnings += 1;
            continue;
        };
        let node = live[pos].1;
        let tree = doc.tree();
        if tree.kind(node).is_container() {
            warn!(path = %path, key = %property.key, "edited property is now an object");
            warnings += 1;
            continue;
        }
        if !is_single_value(&property.value) {
            warn!(path = %path, key = %property.key, value = %property.value, "edited value is not a single value");
            warnings += 1;
            continue;
        }
        let mut text = tree.name(node).to_vec();
        let name_len = text.len();
        text.extend_from_slice(property.value.as_bytes());
        doc.edit_text(&text, node, name_len, false);
    }

    for nested in &diff.nested {
        let child = position(&live, &nested.key).map(|p| live[p].1);
        match child {
            Some(node) if doc.tree().kind(node).is_container() => {
                let path = format!("{path}/{}", nested.key);
                warnings += apply_object(doc, node, &nested.diff, &path);
            }
            _ => {
                warn!(path = %path, key = %nested.key, "nested object no longer exists");
                warnings += 1;
            }
        }
    }
    warnings
}
