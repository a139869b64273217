//! Whole-tree distance metrics for regression-style UI comparisons

use super::{NodeId, ViewTree};

/// Canonical one-line form of a node used by the distance metrics: class,
/// unique id and text, position-free so that two dumps of the same screen
/// compare equal.
fn signature(tree: &ViewTree, id: NodeId) -> String {
    format!(
        "{} {} {}",
        tree.class_name(id).unwrap_or(""),
        tree.node(id).unique_id(),
        tree.text(id).unwrap_or("")
    )
}

/// Document-order node signatures of a tree.
pub fn flatten(tree: &ViewTree) -> Vec<String> {
    tree.ids().map(|id| signature(tree, id)).collect()
}

/// Hamming distance between two trees: pairwise differing positions plus
/// the length difference.
pub fn hamming_distance(a: &ViewTree, b: &ViewTree) -> usize {
    let left = flatten(a);
    let right = flatten(b);
    let paired = left
        .iter()
        .zip(right.iter())
        .filter(|(l, r)| l != r)
        .count();
    paired + left.len().abs_diff(right.len())
}

/// Levenshtein edit distance between two trees, one node signature per
/// symbol.
pub fn levenshtein_distance(a: &ViewTree, b: &ViewTree) -> usize {
    let left = flatten(a);
    let right = flatten(b);
    if left.is_empty() {
        return right.len();
    }
    if right.is_empty() {
        return left.len();
    }
    let mut previous: Vec<usize> = (0..=right.len()).collect();
    let mut current = vec![0usize; right.len() + 1];
    for (i, l) in left.iter().enumerate() {
        current[0] = i + 1;
        for (j, r) in right.iter().enumerate() {
            let substitution = previous[j] + usize::from(l != r);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[right.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Era;
    use crate::tree::{Backend, TreeBuilder};
    use std::collections::HashMap;

    fn tree_of(texts: &[&str]) -> ViewTree {
        let mut builder = TreeBuilder::new(Backend::ViewServer, Era::IceCreamSandwich);
        let mut parent = None;
        for text in texts {
            let mut attrs = HashMap::new();
            attrs.insert("class".to_string(), "android.widget.TextView".to_string());
            attrs.insert("text:mText".to_string(), text.to_string());
            parent = Some(builder.push_node(parent, attrs, None).unwrap());
        }
        builder.finish().unwrap()
    }

    #[test]
    fn test_identical_trees_have_zero_distance() {
        let a = tree_of(&["home", "settings"]);
        let b = tree_of(&["home", "settings"]);
        assert_eq!(hamming_distance(&a, &b), 0);
        assert_eq!(levenshtein_distance(&a, &b), 0);
    }

    #[test]
    fn test_hamming_counts_changed_and_extra_nodes() {
        let a = tree_of(&["home", "settings"]);
        let b = tree_of(&["home", "about"]);
        assert_eq!(hamming_distance(&a, &b), 1);

        let c = tree_of(&["home", "settings", "extra"]);
        assert_eq!(hamming_distance(&a, &c), 1);
    }

    #[test]
    fn test_levenshtein_insertion() {
        let a = tree_of(&["home", "settings"]);
        let b = tree_of(&["home", "banner", "settings"]);
        assert_eq!(levenshtein_distance(&a, &b), 1);
    }

    #[test]
    fn test_levenshtein_substitution() {
        let a = tree_of(&["home", "settings", "done"]);
        let b = tree_of(&["home", "about", "done"]);
        assert_eq!(levenshtein_distance(&a, &b), 1);
    }
}
