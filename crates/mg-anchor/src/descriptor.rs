//! Per-node selector candidates.

use mg_dom::Document;
use mg_dom::NodeId;
use mg_selector::escape_ident;
use std::collections::HashSet;

/// Candidate fragments addressing `node` alone: `tag`, `tag#id`, each
/// crossed with every subset of the (optimized) class list.
///
/// `class_count` reports how many elements in the document carry a class.
/// Nodes other than elements yield their node name only.
pub fn descriptors<F>(doc: &Document, node: NodeId, max_classes: usize, class_count: F) -> Vec<String>
where
    F: FnMut(&str) -> usize,
{
    let Some(element) = doc.element(node) else {
        return vec![doc.node_name(node).to_owned()];
    };

    let tag = escape_ident(&element.tag);
    let mut bases = vec![tag.clone()];
    if let Some(id) = element.id() {
        bases.push(format!("{tag}#{}", escape_ident(id)));
    }

    let classes = optimize_classes(element.classes(), max_classes, class_count);
    let suffixes = class_combinations(&classes);

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(bases.len() * suffixes.len());
    for base in &bases {
        for suffix in &suffixes {
            let candidate = format!("{base}{suffix}");
            if seen.insert(candidate.clone()) {
                out.push(candidate);
            }
        }
    }
    out
}

/// Deduplicates and escapes `classes`; when more than `max_classes` remain,
/// keeps the rarest ones (ties broken by shorter, then lexicographically
/// smaller escaped name) in their original order.
pub fn optimize_classes<F>(classes: &[String], max_classes: usize, mut class_count: F) -> Vec<String>
where
    F: FnMut(&str) -> usize,
{
    let mut unique: Vec<(&str, String)> = Vec::new();
    for class in classes {
        if unique.iter().any(|(raw, _)| *raw == class.as_str()) {
            continue;
        }
        unique.push((class.as_str(), escape_ident(class)));
    }

    if unique.len() <= max_classes {
        return unique.into_iter().map(|(_, escaped)| escaped).collect();
    }

    let mut ranked = unique
        .iter()
        .enumerate()
        .map(|(index, (raw, escaped))| (class_count(*raw), escaped.len(), escaped.as_str(), index))
        .collect::<Vec<_>>();
    ranked.sort();

    let mut keep = ranked
        .into_iter()
        .take(max_classes)
        .map(|(_, _, _, index)| index)
        .collect::<Vec<_>>();
    keep.sort_unstable();

    keep.into_iter()
        .map(|index| unique[index].1.clone())
        .collect()
}

/// Every subset of `classes` rendered as `.c1.c2` in list order, the empty
/// subset first. Identical renderings are emitted once.
pub fn class_combinations(classes: &[String]) -> Vec<String> {
    let mut subsets = vec![String::new()];
    for class in classes {
        let extended = subsets
            .iter()
            .map(|prefix| format!("{prefix}.{class}"))
            .collect::<Vec<_>>();
        subsets.extend(extended);
    }

    let mut seen = HashSet::new();
    subsets.retain(|subset| seen.insert(subset.clone()));
    subsets
}

#[cfg(test)]
mod tests {
    use super::class_combinations;
    use super::descriptors;
    use super::optimize_classes;
    use mg_dom::Document;
    use std::collections::HashMap;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|name| (*name).to_owned()).collect()
    }

    #[test]
    fn combinations_cover_all_subsets() {
        for k in 0..=5 {
            let classes = (0..k).map(|index| format!("c{index}")).collect::<Vec<_>>();
            let combos = class_combinations(&classes);
            assert_eq!(combos.len(), 1 << k);
            assert!(combos.contains(&String::new()));
        }
    }

    #[test]
    fn combinations_keep_list_order() {
        let combos = class_combinations(&names(&["b", "a"]));
        assert_eq!(combos, names(&["", ".b", ".a", ".b.a"]));
    }

    #[test]
    fn optimizer_dedupes_and_escapes_without_ranking_small_lists() {
        let kept = optimize_classes(&names(&["x", "md:flex", "x"]), 4, |_| 0);
        assert_eq!(kept, names(&["x", "md\\3a flex"]));
    }

    #[test]
    fn optimizer_keeps_rarest_classes_in_original_order() {
        let counts = HashMap::from([
            ("common", 50),
            ("rare", 1),
            ("mid", 5),
            ("zz", 2),
            ("aa", 2),
            ("longer", 2),
        ]);
        let classes = names(&["common", "rare", "mid", "zz", "aa", "longer"]);
        let kept = optimize_classes(&classes, 4, |class| counts.get(class).copied().unwrap_or(0));
        // rare(1), then aa/zz (count 2, length 2, lexicographic), then longer (count 2, length 6).
        assert_eq!(kept, names(&["rare", "zz", "aa", "longer"]));
    }

    #[test]
    fn descriptors_cross_tag_and_id_with_class_subsets() {
        let mut doc = Document::new();
        let root = doc.root();
        let html = doc
            .append_element(root, "html", Vec::new())
            .unwrap_or_else(|_| unreachable!());
        let p = doc
            .append_element(
                html,
                "p",
                vec![
                    ("id".to_owned(), "intro".to_owned()),
                    ("class".to_owned(), "a b a".to_owned()),
                ],
            )
            .unwrap_or_else(|_| unreachable!());
        let text = doc.append_text(p, "x").unwrap_or_else(|_| unreachable!());

        let list = descriptors(&doc, p, 4, |class| doc.class_count(class));
        assert_eq!(
            list,
            names(&[
                "p",
                "p.a",
                "p.b",
                "p.a.b",
                "p#intro",
                "p#intro.a",
                "p#intro.b",
                "p#intro.a.b",
            ])
        );
        assert_eq!(descriptors(&doc, text, 4, |_| 0), names(&["#text"]));
    }
}
