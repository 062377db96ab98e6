//! Flattening the engine's navigation tree into document symbols.

use tsbridge_lsp_core::model::{NavigationTree, ScriptElementKind};

/// Kinds reported as document symbols: top-level declarations and members.
pub const RELEVANT_DOCUMENT_SYMBOLS: &[ScriptElementKind] = &[
    ScriptElementKind::Class,
    ScriptElementKind::Interface,
    ScriptElementKind::Function,
    ScriptElementKind::Method,
    ScriptElementKind::Getter,
    ScriptElementKind::Setter,
    ScriptElementKind::Property,
];

pub fn is_relevant(kind: &ScriptElementKind) -> bool {
    RELEVANT_DOCUMENT_SYMBOLS.contains(kind)
}

/// Whether children of a node of this kind are named after it.
fn names_container(kind: &ScriptElementKind) -> bool {
    matches!(kind, ScriptElementKind::Class | ScriptElementKind::Interface)
}

/// Depth-first, pre-order walk over a navigation tree yielding each node with
/// the dotted name of its enclosing classes and interfaces.
///
/// The walk keeps an explicit stack, so arbitrarily deep trees are fine.
pub struct FlattenedTree<'a> {
    stack: Vec<(&'a NavigationTree, Option<String>)>,
}

impl<'a> FlattenedTree<'a> {
    pub fn new(root: &'a NavigationTree) -> Self {
        Self {
            stack: vec![(root, None)],
        }
    }
}

impl<'a> Iterator for FlattenedTree<'a> {
    type Item = (&'a NavigationTree, Option<String>);

    fn next(&mut self) -> Option<Self::Item> {
        let (node, container) = self.stack.pop()?;

        let child_container = if names_container(&node.kind) {
            Some(match &container {
                Some(outer) => format!("{outer}.{}", node.text),
                None => node.text.clone(),
            })
        } else {
            container.clone()
        };

        // Reversed so the first child is popped first.
        for child in node.child_items.iter().rev() {
            self.stack.push((child, child_container.clone()));
        }

        Some((node, container))
    }
}

/// Every node of `root` whose kind is relevant, with its container name.
pub fn relevant_symbols(root: &NavigationTree) -> impl Iterator<Item = (&NavigationTree, Option<String>)> {
    FlattenedTree::new(root).filter(|(node, _)| is_relevant(&node.kind))
}
