//! Property-based tests for entities-core
//!
//! These tests verify invariants that must hold for ANY allocation sequence,
//! document or edit sequence, not just carefully crafted examples. Documents
//! come from the seeded generator in `common`, driven by a proptest seed so
//! failures shrink to a reproducible seed.

mod common;

use common::{mutate, render, Gen};
use entities_core::{
    deep_eq, export, import, Block, BlockAllocator, DiffConfig, DiffDocument, Document, GrammarContext, HistoryState,
    NodeId, NodeKind, Tree,
};
use proptest::prelude::*;
use rand::Rng;

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: 128,
        max_shrink_iters: 100,
        ..ProptestConfig::default()
    }
}

// =============================================================================
// Test Helpers
// =============================================================================

/// Every node reachable from the root, preorder.
fn all_nodes(tree: &Tree) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![tree.root_id()];
    while let Some(n) = stack.pop() {
        out.push(n);
        stack.extend(tree.children(n).iter().rev());
    }
    out
}

/// Nodes whose bodies parse as definitions.
fn definition_bodies(tree: &Tree) -> Vec<NodeId> {
    all_nodes(tree)
        .into_iter()
        .filter(|&n| tree.context_of(n) == Some(GrammarContext::Definition))
        .collect()
}

fn pick<T: Copy>(gen: &mut Gen, items: &[T]) -> Option<T> {
    if items.is_empty() {
        None
    } else {
        Some(items[gen.rng.gen_range(0..items.len())])
    }
}

/// Apply one random successful edit and commit it. Returns false when the
/// document offered nothing to edit.
fn random_edit(gen: &mut Gen, doc: &mut Document) -> bool {
    let bodies = definition_bodies(doc.tree());
    let Some(body) = pick(gen, &bodies) else {
        return false;
    };
    let count = doc.tree().child_count(body);

    match gen.rng.gen_range(0..4) {
        0 => {
            let text = format!("{} = {};\n", gen.unique_name(), gen.value());
            let index = gen.rng.gen_range(0..=count);
            doc.edit_tree(text.as_bytes(), body, index, 0, false, false).unwrap();
        }
        1 if count > 0 => {
            let index = gen.rng.gen_range(0..count);
            doc.edit_tree(b"", body, index, 1, false, false).unwrap();
        }
        2 => {
            let leaves: Vec<NodeId> = all_nodes(doc.tree())
                .into_iter()
                .filter(|&n| doc.tree().kind(n) == NodeKind::Leaf)
                .collect();
            let Some(leaf) = pick(gen, &leaves) else {
                return false;
            };
            let mut text = doc.tree().name(leaf).to_vec();
            let name_len = text.len();
            text.extend_from_slice(gen.value().as_bytes());
            doc.edit_text(&text, leaf, name_len, false);
        }
        3 if count > 1 => {
            let from = gen.rng.gen_range(0..count);
            let to = gen.rng.gen_range(0..count);
            if from == to {
                return false;
            }
            doc.edit_position(body, from, to, false);
        }
        _ => return false,
    }
    doc.push_group_command();
    true
}

// =============================================================================
// Property: Allocator Accounting
// =============================================================================

#[derive(Debug, Clone)]
enum AllocOp {
    Reserve(usize),
    Free(usize),
    NewBuffer(usize),
}

fn alloc_op() -> impl Strategy<Value = AllocOp> {
    prop_oneof![
        4 => (0usize..48).prop_map(AllocOp::Reserve),
        3 => any::<usize>().prop_map(AllocOp::Free),
        1 => (1usize..64).prop_map(AllocOp::NewBuffer),
    ]
}

proptest! {
    #![proptest_config(config())]

    /// Free lists stay sorted and disjoint, used + free equals capacity,
    /// and live blocks never overlap.
    #[test]
    fn allocator_accounting(ops in prop::collection::vec(alloc_op(), 0..200)) {
        let mut alloc: BlockAllocator<u32> = BlockAllocator::new(32);
        let mut live: Vec<(Block, u32)> = Vec::new();
        let mut tag = 0u32;

        for op in ops {
            match op {
                AllocOp::Reserve(n) => match alloc.reserve_block(n) {
                    None => prop_assert_eq!(n, 0),
                    Some(block) => {
                        prop_assert_eq!(block.len(), n);
                        tag += 1;
                        alloc.get_mut(block).fill(tag);
                        live.push((block, tag));
                    }
                },
                AllocOp::Free(i) => {
                    if !live.is_empty() {
                        let (block, _) = live.swap_remove(i % live.len());
                        alloc.free_block(block);
                    }
                }
                AllocOp::NewBuffer(capacity) => alloc.set_active_buffer(capacity),
            }

            let stats = alloc.stats();
            prop_assert_eq!(stats.used + stats.free, stats.capacity);
            prop_assert_eq!(stats.used, live.iter().map(|(b, _)| b.len()).sum::<usize>());

            let free: Vec<Block> = alloc.free_blocks().collect();
            for pair in free.windows(2) {
                let end = (pair[0].buffer, pair[0].start + pair[0].len);
                prop_assert!(end < (pair[1].buffer, pair[1].start), "free blocks touch: {:?}", pair);
            }
            for (block, tag) in &live {
                prop_assert!(alloc.get(*block).iter().all(|v| v == tag), "block {:?} was overwritten", block);
            }
        }
    }
}

// =============================================================================
// Property: Parsing
// =============================================================================

proptest! {
    #![proptest_config(config())]

    /// The parser never panics, whatever the input.
    #[test]
    fn parser_never_panics(input in prop::collection::vec(any::<u8>(), 0..1000)) {
        let _ = Document::parse(&input);
    }

    /// Input that looks like entities text but is likely broken.
    #[test]
    fn parser_never_panics_ascii(input in "[a-z0-9_\\[\\]\\n \\t\"{}=;/.-]{0,500}") {
        let _ = Document::parse(input.as_bytes());
    }

    /// Canonical documents serialize back byte for byte.
    #[test]
    fn canonical_round_trip(seed in any::<u64>()) {
        let mut gen = Gen::new(seed);
        let text = gen.document();
        let doc = Document::parse(&text).unwrap();
        prop_assert_eq!(doc.to_text(), text);
    }
}

// =============================================================================
// Property: Editing
// =============================================================================

const BAD_FRAGMENTS: &[&[u8]] = &[
    b"x = ;\n",
    b"= 1;\n",
    b"x = {\n\ty = 1;\n",
    b"x = \"open\n",
    b"}\n",
    b"a = 1;\nb 2;\n",
    b"item[] = 3;\n",
];

proptest! {
    #![proptest_config(config())]

    /// A fragment that does not parse changes nothing.
    #[test]
    fn invalid_edit_is_atomic(seed in any::<u64>(), fragment in 0..BAD_FRAGMENTS.len()) {
        let mut gen = Gen::new(seed);
        let text = gen.document();
        let mut doc = Document::parse(&text).unwrap();
        let bodies = definition_bodies(doc.tree());
        let body = pick(&mut gen, &bodies).unwrap();
        let count = doc.tree().child_count(body);
        let index = gen.rng.gen_range(0..=count);
        let remove = gen.rng.gen_range(0..=count - index);
        let before = doc.tree().stats();
        let nodes = all_nodes(doc.tree()).len();

        prop_assert!(doc.edit_tree(BAD_FRAGMENTS[fragment], body, index, remove, true, false).is_err());

        let after = doc.tree().stats();
        prop_assert_eq!(doc.to_text(), text);
        prop_assert_eq!(all_nodes(doc.tree()).len(), nodes);
        prop_assert_eq!(after.nodes.used, before.nodes.used);
        prop_assert_eq!(after.text.used, before.text.used);
        prop_assert_eq!(after.refs.used, before.refs.used);
        prop_assert_eq!(doc.history_state(), HistoryState::Clean);
    }

    /// n undos return to the original text, n redos to the edited one,
    /// passing through every intermediate state.
    #[test]
    fn undo_redo_symmetry(seed in any::<u64>(), steps in 1usize..10) {
        let mut gen = Gen::new(seed);
        let mut doc = Document::parse(&gen.document()).unwrap();
        let mut states = vec![doc.to_text()];
        for _ in 0..steps {
            if random_edit(&mut gen, &mut doc) {
                states.push(doc.to_text());
            }
        }

        for expected in states.iter().rev().skip(1) {
            prop_assert!(doc.undo());
            prop_assert_eq!(&doc.to_text(), expected);
        }
        prop_assert!(!doc.undo());

        for expected in states.iter().skip(1) {
            prop_assert!(doc.redo());
            prop_assert_eq!(&doc.to_text(), expected);
        }
        prop_assert!(!doc.redo());
    }

    /// Renumbering twice is the same as renumbering once, and leaves every
    /// list dense.
    #[test]
    fn renumbering_is_idempotent(seed in any::<u64>()) {
        let mut gen = Gen::new(seed);
        let mut doc = Document::parse(&gen.document()).unwrap();
        let root = doc.tree().root_id();
        doc.fix_list_numberings(root, true, false);
        doc.push_group_command();
        let once = doc.to_text();
        doc.fix_list_numberings(root, true, false);
        prop_assert_eq!(doc.to_text(), once);
        prop_assert_eq!(doc.history_state(), HistoryState::Clean);

        let tree = doc.tree();
        for body in definition_bodies(tree) {
            let indices: Vec<usize> = tree
                .children(body)
                .iter()
                .filter_map(|&c| entities_core::value::list_index(tree.name(c)))
                .collect();
            prop_assert_eq!(&indices, &(0..indices.len()).collect::<Vec<_>>());
            if !indices.is_empty() {
                let num = tree.find_child_value(body, b"num").map(|v| v.to_vec());
                prop_assert_eq!(num, Some(indices.len().to_string().into_bytes()));
            }
        }
    }
}

// =============================================================================
// Property: Diff Round Trip
// =============================================================================

proptest! {
    #![proptest_config(config())]

    /// Importing export(A, B) into a copy of A yields B.
    #[test]
    fn diff_round_trip(seed in any::<u64>()) {
        let mut gen = Gen::new(seed);
        let vanilla_model = gen.entities();
        let modded_model = mutate(&mut gen, &vanilla_model);
        let vanilla_text = render(&vanilla_model);
        let vanilla = Document::parse(&vanilla_text).unwrap();
        let modded = Document::parse(&render(&modded_model)).unwrap();

        let config = DiffConfig::default();
        let diff = export(vanilla.tree(), modded.tree(), &config);
        let diff = DiffDocument::from_json(&diff.to_json().unwrap()).unwrap();

        let mut target = Document::parse(&vanilla_text).unwrap();
        let summary = import(&mut target, &diff, &config);
        prop_assert_eq!(summary.warnings, 0);
        prop_assert!(deep_eq(target.tree(), target.tree().root_id(), modded.tree(), modded.tree().root_id()));
        prop_assert_eq!(target.to_text(), modded.to_text());
    }
}
