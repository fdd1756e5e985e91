//! Selector matching algorithm.
//!
//! Matching walks a selector from right to left, testing each compound part
//! against the element and then against ancestors or preceding siblings as
//! the combinators demand. The whole document is in scope: a query rooted at
//! some element still lets the left-hand parts match above that element.

use super::types::{Combinator, PseudoClass, Selector, SelectorList, SelectorPart, TypeSelector};
use crate::node::{NodeId, Tree};

/// Check whether `node` matches any selector in the list.
pub(crate) fn matches_list(tree: &Tree, node: NodeId, list: &SelectorList) -> bool {
    list.selectors()
        .iter()
        .any(|selector| matches_selector(tree, node, selector))
}

/// Check whether `node` matches a complex selector.
pub(crate) fn matches_selector(tree: &Tree, node: NodeId, selector: &Selector) -> bool {
    match selector.parts.len() {
        0 => false,
        len => matches_from(tree, node, selector, len - 1),
    }
}

/// Match `selector.parts[..=index]` with `node` as the element for `index`.
fn matches_from(tree: &Tree, node: NodeId, selector: &Selector, index: usize) -> bool {
    if !part_matches(tree, node, &selector.parts[index]) {
        return false;
    }
    if index == 0 {
        return true;
    }

    let next = index - 1;
    match selector.combinators[next] {
        Combinator::Child => tree
            .parent(node)
            .is_some_and(|parent| matches_from(tree, parent, selector, next)),
        Combinator::Descendant => {
            let mut current = tree.parent(node);
            while let Some(ancestor) = current {
                if matches_from(tree, ancestor, selector, next) {
                    return true;
                }
                current = tree.parent(ancestor);
            }
            false
        }
        Combinator::AdjacentSibling => tree
            .previous_siblings(node)
            .first()
            .is_some_and(|&sibling| matches_from(tree, sibling, selector, next)),
        Combinator::GeneralSibling => tree
            .previous_siblings(node)
            .into_iter()
            .any(|sibling| matches_from(tree, sibling, selector, next)),
    }
}

/// Check a single compound part against one element.
fn part_matches(tree: &Tree, node: NodeId, part: &SelectorPart) -> bool {
    let Ok(data) = tree.get(node) else {
        return false;
    };

    if let Some(TypeSelector::Tag(tag)) = &part.type_selector {
        if *tag != data.tag {
            return false;
        }
    }

    if let Some(id) = &part.id {
        if data.attribute("id") != Some(id.as_str()) {
            return false;
        }
    }

    // All classes must match
    if !part.classes.iter().all(|class| data.has_class(class)) {
        return false;
    }

    if !part
        .attributes
        .iter()
        .all(|attribute| attribute.matches_value(data.attribute(&attribute.name)))
    {
        return false;
    }

    part.pseudo_classes.iter().all(|pseudo| match pseudo {
        PseudoClass::FirstChild => tree.sibling_position(node).0 == 0,
        PseudoClass::LastChild => {
            let (index, count) = tree.sibling_position(node);
            index + 1 == count
        }
        PseudoClass::OnlyChild => tree.sibling_position(node).1 == 1,
        PseudoClass::NthChild(expr) => expr.matches(tree.sibling_position(node).0),
        PseudoClass::Empty => data.children.is_empty(),
        PseudoClass::Not(inner) => !part_matches(tree, node, inner),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeData;
    use crate::selector::parse_selector_list;

    struct Fixture {
        tree: Tree,
        table: NodeId,
        cols: Vec<NodeId>,
        other_col: NodeId,
    }

    fn element(tree: &mut Tree, parent: Option<NodeId>, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let mut data = NodeData::new(tag);
        for (name, value) in attrs {
            data.set_attribute(name, value.to_string());
        }
        data.parent = parent;
        let id = tree.insert(data);
        if let Some(parent) = parent {
            tree.get_mut(parent).unwrap().children.push(id);
        }
        id
    }

    // div.Cp > table.cf > colgroup > col*3, plus a loose colgroup > col
    fn fixture() -> Fixture {
        let mut tree = Tree::new();
        let section = element(&mut tree, None, "div", &[("class", "Cp")]);
        let table = element(&mut tree, Some(section), "table", &[("class", "cf zt")]);
        let colgroup = element(&mut tree, Some(table), "colgroup", &[]);
        let cols = (0..3)
            .map(|i| {
                let class = format!("c{}", i);
                element(&mut tree, Some(colgroup), "col", &[("class", &class)])
            })
            .collect();
        let loose = element(&mut tree, Some(section), "colgroup", &[]);
        let other_col = element(&mut tree, Some(loose), "col", &[("gh", "mtb")]);
        Fixture {
            tree,
            table,
            cols,
            other_col,
        }
    }

    fn check(f: &Fixture, selector: &str, node: NodeId) -> bool {
        let list = parse_selector_list(selector).unwrap();
        matches_list(&f.tree, node, &list)
    }

    #[test]
    fn child_chain() {
        let f = fixture();
        assert!(check(&f, "table.cf > colgroup > col", f.cols[0]));
        assert!(!check(&f, "table.cf > colgroup > col", f.other_col));
        assert!(check(&f, "table.cf > colgroup > .c2", f.cols[2]));
    }

    #[test]
    fn descendant_and_siblings() {
        let f = fixture();
        assert!(check(&f, "div.Cp col", f.other_col));
        assert!(check(&f, "div col", f.cols[1]));
        assert!(check(&f, ".c0 + col", f.cols[1]));
        assert!(!check(&f, ".c0 + col", f.cols[2]));
        assert!(check(&f, ".c0 ~ col", f.cols[2]));
        assert!(!check(&f, "table ~ col", f.other_col));
    }

    #[test]
    fn attributes_and_pseudo_classes() {
        let f = fixture();
        assert!(check(&f, "[gh=mtb]", f.other_col));
        assert!(check(&f, "col:only-child", f.other_col));
        assert!(check(&f, "col:first-child", f.cols[0]));
        assert!(check(&f, "col:last-child", f.cols[2]));
        assert!(check(&f, "col:nth-child(2)", f.cols[1]));
        assert!(check(&f, "col:empty", f.cols[1]));
        assert!(!check(&f, "table:empty", f.table));
        assert!(check(&f, "col:not(.c1)", f.cols[0]));
        assert!(!check(&f, "col:not(.c1)", f.cols[1]));
        assert!(check(&f, "table.zt.cf", f.table));
    }

    #[test]
    fn selector_list_matches_any() {
        let f = fixture();
        assert!(check(&f, "span, table", f.table));
        assert!(!check(&f, "span, em", f.table));
    }
}
