use riscan_core::{FoundBy, RiConfig};
use riscan_pipeline::artifacts::{pair_by_document, read_json, write_json};
use riscan_pipeline::{load_documents, CombinedResults, KeywordResults, Pipeline, SemanticResults};

const PAD_ONE: &str = "Project Appraisal Document.\n\n\
The project finances elevated substations and flood barriers along the river. \
Backup generators and battery storage keep pumping stations running during storms. \
An early warning system will alert communities before floods.\n\n\
Annex 3 lists the procurement schedule.";

const PAD_TWO: &str = "Financial annex. Disbursement tables and audit arrangements \
follow the standard template. No further technical content.";

fn corpus() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("pad-001.txt"), PAD_ONE).unwrap();
    std::fs::write(dir.path().join("pad-002.md"), PAD_TWO).unwrap();
    dir
}

#[test]
fn staged_run_matches_single_pass() {
    let dir = corpus();
    let docs = load_documents(dir.path()).unwrap();
    assert_eq!(docs.len(), 2);

    let pipeline = Pipeline::new(RiConfig::builtin().unwrap()).unwrap();
    let out = dir.path().join("results");

    let keyword: Vec<KeywordResults> = docs
        .iter()
        .map(|d| pipeline.keywords(&d.document).unwrap())
        .collect();
    let semantic: Vec<SemanticResults> = docs
        .iter()
        .map(|d| pipeline.semantic(&d.document).unwrap())
        .collect();
    write_json(&out.join("keyword_results.json"), &keyword).unwrap();
    write_json(&out.join("semantic_results.json"), &semantic).unwrap();

    let keyword: Vec<KeywordResults> = read_json(&out.join("keyword_results.json")).unwrap();
    let semantic: Vec<SemanticResults> = read_json(&out.join("semantic_results.json")).unwrap();
    let combined: Vec<CombinedResults> = pair_by_document(keyword, semantic)
        .iter()
        .map(|(k, s)| pipeline.combine(k, s).unwrap())
        .collect();

    for (doc, staged) in docs.iter().zip(&combined) {
        let single = pipeline.run(&doc.document).unwrap().combined;
        assert_eq!(single.stats, staged.stats);
        let shape = |r: &CombinedResults| {
            r.matches
                .iter()
                .map(|m| (m.span, m.found_by, m.sources.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(shape(&single), shape(staged));
    }
}

#[test]
fn resilience_passages_are_found_by_both_methods() {
    let dir = corpus();
    let docs = load_documents(dir.path()).unwrap();
    let pipeline = Pipeline::new(RiConfig::builtin().unwrap()).unwrap();

    let report = pipeline.run(&docs[0].document).unwrap();
    assert!(report.keywords.keyword_counts.contains_key("elevated substation"));
    assert!(report.keywords.keyword_counts.contains_key("early warning system"));
    assert!(report.combined.stats.total > 0);
    assert!(report
        .combined
        .matches
        .iter()
        .any(|m| m.found_by == FoundBy::Both));

    let quiet = pipeline.run(&docs[1].document).unwrap();
    assert_eq!(quiet.keywords.total_matches, 0);
    assert!(quiet
        .combined
        .matches
        .iter()
        .all(|m| m.found_by == FoundBy::SemanticOnly));
}

#[tokio::test]
async fn remote_provider_without_key_fails_before_any_request() {
    let mut config = RiConfig::builtin().unwrap();
    config.embedding.provider = "voyage".into();
    config.embedding.api_key = None;
    std::env::remove_var("VOYAGE_API_KEY");

    let err = riscan_semantic::EmbeddingClient::with_config(&config.embedding).unwrap_err();
    assert!(err.to_string().contains("VOYAGE_API_KEY"));
}
