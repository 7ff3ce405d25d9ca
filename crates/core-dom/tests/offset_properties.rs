//! Property-based tests for offset mapping over generated markup.

use core_dom::{Affinity, Document, OffsetMap};
use proptest::prelude::*;

/// Random inline markup: text runs interleaved with nested wrappers.
fn markup() -> impl Strategy<Value = String> {
    let leaf = "[a-zé ]{0,4}";
    leaf.prop_recursive(4, 24, 4, |inner| {
        (prop::sample::select(vec!["b", "i", "span", "p"]), prop::collection::vec(inner, 0..4))
            .prop_map(|(tag, kids)| format!("<{tag}>{}</{tag}>", kids.concat()))
    })
}

proptest! {
    #[test]
    fn locate_and_offset_of_are_inverse(body in prop::collection::vec(markup(), 1..4)) {
        let html = format!("<div id=\"r\">{}</div>", body.concat());
        let doc = Document::from_html(&html).unwrap();
        let root = doc.element_by_id("r").unwrap();
        let map = OffsetMap::build(&doc, root);
        prop_assert_eq!(map.total_len(), doc.text_content(root).chars().count());
        for abs in 0..=map.total_len() {
            for aff in [Affinity::Forward, Affinity::Backward] {
                if let Some(p) = map.locate(abs, aff) {
                    prop_assert!(doc.is_text(p.node));
                    prop_assert_eq!(map.offset_of(&doc, p), Some(abs));
                } else {
                    prop_assert_eq!(map.total_len(), 0);
                }
            }
        }
    }

    #[test]
    fn container_points_are_monotonic(body in prop::collection::vec(markup(), 1..4)) {
        let html = format!("<div id=\"r\">{}</div>", body.concat());
        let doc = Document::from_html(&html).unwrap();
        let root = doc.element_by_id("r").unwrap();
        let map = OffsetMap::build(&doc, root);
        let mut last = 0usize;
        for i in 0..=doc.children(root).len() {
            let off = map.offset_of(&doc, core_dom::Point::new(root, i)).unwrap();
            prop_assert!(off >= last);
            last = off;
        }
        prop_assert_eq!(last, map.total_len());
    }
}
