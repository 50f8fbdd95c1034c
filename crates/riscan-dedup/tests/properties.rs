use std::collections::BTreeMap;

use proptest::prelude::*;
use riscan_core::{KeywordMatch, SemanticMatch, Span};
use riscan_dedup::{connects, deduplicate, overlap, rededuplicate};

fn arb_span() -> impl Strategy<Value = Span> {
    (0usize..400, 1usize..120).prop_map(|(start, len)| Span {
        start,
        end: start + len,
    })
}

fn arb_inputs() -> impl Strategy<Value = (Vec<KeywordMatch>, Vec<SemanticMatch>)> {
    (
        prop::collection::vec((arb_span(), 0usize..3), 0..12),
        prop::collection::vec((arb_span(), 0usize..3, 0u32..100), 0..12),
    )
        .prop_map(|(kws, sems)| {
            let keyword = kws
                .into_iter()
                .enumerate()
                .map(|(i, (span, sector))| KeywordMatch {
                    id: format!("kw-{i:04}"),
                    span,
                    keyword: format!("keyword{sector}"),
                    sector: format!("sector{sector}"),
                    context: format!("context {i}"),
                })
                .collect();
            let semantic = sems
                .into_iter()
                .enumerate()
                .map(|(i, (span, q, score))| SemanticMatch {
                    id: format!("sem-{i:04}"),
                    span,
                    query: format!("query{q}"),
                    sector: format!("query_sector{q}"),
                    score: f64::from(score) / 100.0,
                    text: format!("chunk {i}"),
                })
                .collect();
            (keyword, semantic)
        })
}

proptest! {
    #[test]
    fn overlap_is_symmetric(a in arb_span(), b in arb_span()) {
        prop_assert_eq!(overlap(&a, &b), overlap(&b, &a));
        prop_assert_eq!(connects(&a, &b, 0.5), connects(&b, &a, 0.5));
        let r = overlap(&a, &b);
        prop_assert!((0.0..=1.0).contains(&r));
    }

    #[test]
    fn deduplication_is_idempotent(
        (keyword, semantic) in arb_inputs(),
        threshold in prop::sample::select(vec![0.0, 0.25, 0.5, 0.75, 1.0]),
    ) {
        let once = deduplicate(&keyword, &semantic, threshold).unwrap();
        let twice = rededuplicate(&once, threshold).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn no_output_pair_connects(
        (keyword, semantic) in arb_inputs(),
        threshold in prop::sample::select(vec![0.0, 0.5, 1.0]),
    ) {
        let out = deduplicate(&keyword, &semantic, threshold).unwrap();
        for (i, a) in out.iter().enumerate() {
            for b in &out[i + 1..] {
                prop_assert!(!connects(&a.span, &b.span, threshold));
            }
        }
        for pair in out.windows(2) {
            prop_assert!(pair[0].span <= pair[1].span);
        }
    }

    #[test]
    fn every_input_lands_in_exactly_one_output((keyword, semantic) in arb_inputs()) {
        let out = deduplicate(&keyword, &semantic, 0.5).unwrap();

        let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
        for m in &out {
            prop_assert!(!m.sources.is_empty());
            for member in &m.members {
                *seen.entry(member.as_str()).or_insert(0) += 1;
            }
        }
        for k in &keyword {
            prop_assert_eq!(seen.get(k.id.as_str()), Some(&1));
        }
        for s in &semantic {
            prop_assert_eq!(seen.get(s.id.as_str()), Some(&1));
        }
        prop_assert_eq!(seen.len(), keyword.len() + semantic.len());
    }

    #[test]
    fn output_spans_cover_their_inputs((keyword, semantic) in arb_inputs()) {
        let out = deduplicate(&keyword, &semantic, 0.5).unwrap();
        let spans: BTreeMap<&str, Span> = keyword
            .iter()
            .map(|k| (k.id.as_str(), k.span))
            .chain(semantic.iter().map(|s| (s.id.as_str(), s.span)))
            .collect();
        for m in &out {
            for member in &m.members {
                let span = spans[member.as_str()];
                prop_assert!(m.span.start <= span.start && span.end <= m.span.end);
            }
        }
    }
}

#[test]
fn ratio_exactly_at_threshold_merges() {
    let keyword = [KeywordMatch {
        id: "kw-0000".into(),
        span: Span { start: 0, end: 4 },
        keyword: "dam".into(),
        sector: "energy".into(),
        context: "Dam".into(),
    }];
    let semantic = [SemanticMatch {
        id: "sem-0000".into(),
        span: Span { start: 3, end: 503 },
        query: "q".into(),
        sector: "s".into(),
        score: 0.3,
        text: "chunk".into(),
    }];
    // Intersection 1, shorter span 4: ratio 0.25.
    assert_eq!(deduplicate(&keyword, &semantic, 0.25).unwrap().len(), 1);
    assert_eq!(deduplicate(&keyword, &semantic, 0.26).unwrap().len(), 2);
}
