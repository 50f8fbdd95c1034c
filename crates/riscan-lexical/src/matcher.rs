//! Taxonomy keyword matching over lemmatized tokens.
//!
//! Every taxonomy entry is tokenized and lemmatized once. Document tokens
//! are lemmatized (memoized per distinct word) and each entry matches
//! wherever its lemma sequence appears on consecutive tokens. The span of a
//! match covers the matched tokens; the surrounding sentences become its
//! context.

use std::collections::{BTreeMap, HashMap, HashSet};

use riscan_core::{CharIndex, KeywordMatch, RiError, SearchConfig, Span, Taxonomy};

use crate::lemma::Lemmatizer;
use crate::tokenize::{is_phrase_gap, sentences, word_tokens, Sentence, Token};

/// Parameters for context extraction.
///
/// # Examples
///
/// ```
/// use riscan_core::SearchConfig;
/// use riscan_lexical::MatchParams;
///
/// let params = MatchParams::from(&SearchConfig::default());
/// assert_eq!(params.context_sentences, 3);
/// assert_eq!(params.max_context_chars, Some(1000));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchParams {
    /// Sentences kept before and after the sentence containing the match.
    pub context_sentences: usize,
    /// Cap on context length, centred on the match. A match longer than the
    /// cap is kept whole.
    pub max_context_chars: Option<usize>,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for MatchParams {
    fn from(config: &SearchConfig) -> Self {
        Self {
            context_sentences: config.context_sentences,
            max_context_chars: config.max_context_chars,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    keyword: String,
    sector: String,
    lemmas: Vec<String>,
}

/// A taxonomy lemmatized once, owning no lemmatizer.
///
/// Compile once per corpus and scan every document with it. Scans must use
/// the lemmatizer that compiled it.
///
/// # Examples
///
/// ```
/// use riscan_core::Taxonomy;
/// use riscan_lexical::{CompiledTaxonomy, MatchParams};
/// use riscan_lexical::lemma::SnowballLemmatizer;
///
/// let mut taxonomy = Taxonomy::new();
/// taxonomy.insert("water".into(), vec!["levee".into()]);
///
/// let lemmatizer = SnowballLemmatizer::new();
/// let compiled = CompiledTaxonomy::new(&taxonomy, &lemmatizer).unwrap();
/// for text in ["Levees were raised.", "The levee held."] {
///     let matches = compiled.find(text, &lemmatizer, MatchParams::default()).unwrap();
///     assert_eq!(matches.len(), 1);
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct CompiledTaxonomy {
    entries: Vec<Entry>,
    // First lemma → indices into `entries`.
    by_first_lemma: HashMap<String, Vec<usize>>,
}

impl CompiledTaxonomy {
    /// Compile `taxonomy`, lemmatizing every keyword.
    ///
    /// Entries within one sector that reduce to the same lemma sequence
    /// (`"flood"`, `"flooding"`) collapse onto the first spelling; the same
    /// keyword listed under two sectors stays two entries.
    ///
    /// # Errors
    ///
    /// Propagates lemmatizer failures.
    pub fn new<L: Lemmatizer + ?Sized>(
        taxonomy: &Taxonomy,
        lemmatizer: &L,
    ) -> Result<Self, RiError> {
        let mut entries = Vec::new();
        let mut seen: HashSet<(String, Vec<String>)> = HashSet::new();

        for (sector, keywords) in taxonomy {
            for keyword in keywords {
                let index = CharIndex::new(keyword);
                let lemmas = word_tokens(keyword, &index)
                    .iter()
                    .map(|t| lemmatizer.lemmatize(&t.lower))
                    .collect::<Result<Vec<_>, _>>()?;

                if lemmas.is_empty() {
                    tracing::warn!(sector = %sector, keyword = %keyword, "keyword has no word tokens, skipping");
                    continue;
                }
                if !seen.insert((sector.clone(), lemmas.clone())) {
                    tracing::debug!(sector = %sector, keyword = %keyword, "lemma-equivalent keyword already present");
                    continue;
                }
                entries.push(Entry {
                    keyword: keyword.clone(),
                    sector: sector.clone(),
                    lemmas,
                });
            }
        }

        let mut by_first_lemma: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            by_first_lemma
                .entry(entry.lemmas[0].clone())
                .or_default()
                .push(i);
        }

        Ok(Self {
            entries,
            by_first_lemma,
        })
    }

    /// Number of compiled taxonomy entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when the taxonomy compiled to nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find every keyword occurrence in `text`.
    ///
    /// Results are ordered by span, then sector, then keyword, and carry ids
    /// `kw-0000`, `kw-0001`, ... in that order.
    ///
    /// # Errors
    ///
    /// Propagates lemmatizer failures; no partial result is returned.
    pub fn find<L: Lemmatizer + ?Sized>(
        &self,
        text: &str,
        lemmatizer: &L,
        params: MatchParams,
    ) -> Result<Vec<KeywordMatch>, RiError> {
        if text.is_empty() || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let index = CharIndex::new(text);
        let tokens = word_tokens(text, &index);
        let lemmas = lemmatize_tokens(&tokens, lemmatizer)?;
        let sents = sentences(text, &index);

        let mut hits: Vec<(Span, usize)> = Vec::new();
        for start in 0..tokens.len() {
            let Some(candidates) = self.by_first_lemma.get(&lemmas[start]) else {
                continue;
            };
            for &entry_idx in candidates {
                let entry = &self.entries[entry_idx];
                if let Some(span) = match_at(text, &tokens, &lemmas, start, &entry.lemmas) {
                    hits.push((span, entry_idx));
                }
            }
        }

        hits.sort_by(|(a_span, a_idx), (b_span, b_idx)| {
            let (a, b) = (&self.entries[*a_idx], &self.entries[*b_idx]);
            a_span
                .cmp(b_span)
                .then_with(|| a.sector.cmp(&b.sector))
                .then_with(|| a.keyword.cmp(&b.keyword))
        });

        let matches: Vec<KeywordMatch> = hits
            .into_iter()
            .enumerate()
            .map(|(i, (span, entry_idx))| {
                let entry = &self.entries[entry_idx];
                KeywordMatch {
                    id: format!("kw-{i:04}"),
                    span,
                    keyword: entry.keyword.clone(),
                    sector: entry.sector.clone(),
                    context: extract_context(text, &index, &sents, span, params),
                }
            })
            .collect();

        tracing::debug!(
            tokens = tokens.len(),
            sentences = sents.len(),
            matches = matches.len(),
            "keyword scan complete"
        );
        Ok(matches)
    }
}

/// A [`CompiledTaxonomy`] bound to its lemmatizer and context parameters.
///
/// # Examples
///
/// ```
/// use riscan_core::Taxonomy;
/// use riscan_lexical::{KeywordMatcher, MatchParams};
/// use riscan_lexical::lemma::SnowballLemmatizer;
///
/// let mut taxonomy = Taxonomy::new();
/// taxonomy.insert("hazards".into(), vec!["storm surge".into()]);
///
/// let lemmatizer = SnowballLemmatizer::new();
/// let matcher = KeywordMatcher::new(&taxonomy, &lemmatizer, MatchParams::default()).unwrap();
/// let matches = matcher.find("Storm surges overtopped the seawall.").unwrap();
/// assert_eq!(matches.len(), 1);
/// assert_eq!(matches[0].keyword, "storm surge");
/// assert_eq!((matches[0].span.start, matches[0].span.end), (0, 12));
/// ```
pub struct KeywordMatcher<'a, L: Lemmatizer + ?Sized> {
    compiled: CompiledTaxonomy,
    lemmatizer: &'a L,
    params: MatchParams,
}

impl<L: Lemmatizer + ?Sized> std::fmt::Debug for KeywordMatcher<'_, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordMatcher")
            .field("entries", &self.compiled.len())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl<'a, L: Lemmatizer + ?Sized> KeywordMatcher<'a, L> {
    /// Compile `taxonomy` with `lemmatizer`; see [`CompiledTaxonomy::new`].
    ///
    /// # Errors
    ///
    /// Propagates lemmatizer failures.
    pub fn new(taxonomy: &Taxonomy, lemmatizer: &'a L, params: MatchParams) -> Result<Self, RiError> {
        Ok(Self {
            compiled: CompiledTaxonomy::new(taxonomy, lemmatizer)?,
            lemmatizer,
            params,
        })
    }

    /// Number of compiled taxonomy entries.
    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    /// `true` when the taxonomy compiled to nothing.
    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    /// Find every keyword occurrence in `text`; see [`CompiledTaxonomy::find`].
    ///
    /// # Errors
    ///
    /// Propagates lemmatizer failures.
    pub fn find(&self, text: &str) -> Result<Vec<KeywordMatch>, RiError> {
        self.compiled.find(text, self.lemmatizer, self.params)
    }
}

fn lemmatize_tokens<L: Lemmatizer + ?Sized>(
    tokens: &[Token],
    lemmatizer: &L,
) -> Result<Vec<String>, RiError> {
    let mut memo: HashMap<&str, String> = HashMap::new();
    let mut lemmas = Vec::with_capacity(tokens.len());
    for token in tokens {
        let lemma = match memo.get(token.lower.as_str()) {
            Some(lemma) => lemma.clone(),
            None => {
                let lemma = lemmatizer.lemmatize(&token.lower)?;
                memo.insert(token.lower.as_str(), lemma.clone());
                lemma
            }
        };
        lemmas.push(lemma);
    }
    Ok(lemmas)
}

/// Find all keyword matches of `taxonomy` in `text`.
///
/// Convenience wrapper compiling a [`KeywordMatcher`] for a single call.
/// Empty text or an empty taxonomy yields an empty result.
///
/// # Errors
///
/// Propagates lemmatizer failures.
///
/// # Examples
///
/// ```
/// use riscan_core::Taxonomy;
/// use riscan_lexical::{find_keyword_matches, MatchParams};
/// use riscan_lexical::lemma::SnowballLemmatizer;
///
/// let mut taxonomy = Taxonomy::new();
/// taxonomy.insert("disaster".into(), vec!["flood".into()]);
///
/// let matches = find_keyword_matches(
///     "Flooding damaged the flood defenses",
///     &taxonomy,
///     MatchParams::default(),
///     &SnowballLemmatizer::new(),
/// )
/// .unwrap();
/// assert_eq!(matches.len(), 2);
/// ```
pub fn find_keyword_matches<L: Lemmatizer + ?Sized>(
    text: &str,
    taxonomy: &Taxonomy,
    params: MatchParams,
    lemmatizer: &L,
) -> Result<Vec<KeywordMatch>, RiError> {
    KeywordMatcher::new(taxonomy, lemmatizer, params)?.find(text)
}

/// Count matches per keyword.
///
/// # Examples
///
/// ```
/// use riscan_core::{KeywordMatch, Span};
/// use riscan_lexical::keyword_counts;
///
/// let m = |kw: &str| KeywordMatch {
///     id: String::new(),
///     span: Span { start: 0, end: 1 },
///     keyword: kw.into(),
///     sector: "hazards".into(),
///     context: String::new(),
/// };
/// let counts = keyword_counts(&[m("flood"), m("flood"), m("drought")]);
/// assert_eq!(counts["flood"], 2);
/// assert_eq!(counts["drought"], 1);
/// ```
pub fn keyword_counts(matches: &[KeywordMatch]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for m in matches {
        *counts.entry(m.keyword.clone()).or_insert(0) += 1;
    }
    counts
}

fn match_at(
    text: &str,
    tokens: &[Token],
    lemmas: &[String],
    start: usize,
    pattern: &[String],
) -> Option<Span> {
    let end = start + pattern.len();
    if end > tokens.len() {
        return None;
    }
    if lemmas[start..end] != *pattern {
        return None;
    }
    for pair in tokens[start..end].windows(2) {
        if !is_phrase_gap(&text[pair[0].bytes.end..pair[1].bytes.start]) {
            return None;
        }
    }
    Some(Span {
        start: tokens[start].span.start,
        end: tokens[end - 1].span.end,
    })
}

fn extract_context(
    text: &str,
    index: &CharIndex,
    sents: &[Sentence],
    span: Span,
    params: MatchParams,
) -> String {
    let containing = sents
        .partition_point(|s| s.span.start <= span.start)
        .saturating_sub(1);
    let first = containing.saturating_sub(params.context_sentences);
    let last = (containing + params.context_sentences).min(sents.len().saturating_sub(1));

    let mut window = match (sents.get(first), sents.get(last)) {
        (Some(a), Some(b)) => Span {
            start: a.span.start,
            end: b.span.end.max(span.end),
        },
        _ => span,
    };

    if let Some(cap) = params.max_context_chars {
        let cap = cap.max(span.len());
        if window.len() > cap {
            let centre = span.start + span.len() / 2;
            let start = centre
                .saturating_sub(cap / 2)
                .max(window.start)
                .min(span.start);
            let end = (start + cap).min(window.end);
            let start = end.saturating_sub(cap).max(window.start).min(span.start);
            window = Span { start, end };
        }
    }

    index.slice(text, window).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lemma::SnowballLemmatizer;

    fn taxonomy(entries: &[(&str, &[&str])]) -> Taxonomy {
        entries
            .iter()
            .map(|(sector, kws)| {
                (
                    sector.to_string(),
                    kws.iter().map(|k| k.to_string()).collect(),
                )
            })
            .collect()
    }

    fn find(text: &str, tax: &Taxonomy, params: MatchParams) -> Vec<KeywordMatch> {
        find_keyword_matches(text, tax, params, &SnowballLemmatizer::new()).unwrap()
    }

    #[test]
    fn inflected_forms_match_canonical_keyword() {
        let tax = taxonomy(&[("disaster", &["flood"])]);
        let matches = find("Flooding damaged the flood defenses", &tax, MatchParams::default());
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].span, Span { start: 0, end: 8 });
        assert_eq!(matches[1].span, Span { start: 21, end: 26 });
        assert!(matches.iter().all(|m| m.keyword == "flood"));
        assert_eq!(matches[0].id, "kw-0000");
        assert_eq!(matches[1].id, "kw-0001");
    }

    #[test]
    fn plural_form_matches() {
        let tax = taxonomy(&[("disaster", &["flood"])]);
        let matches = find("Seasonal floods are frequent.", &tax, MatchParams::default());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].span, Span { start: 9, end: 15 });
    }

    #[test]
    fn empty_text_yields_nothing() {
        let tax = taxonomy(&[("disaster", &["flood"])]);
        assert!(find("", &tax, MatchParams::default()).is_empty());
    }

    #[test]
    fn empty_taxonomy_yields_nothing() {
        assert!(find("Flood risk.", &Taxonomy::new(), MatchParams::default()).is_empty());
    }

    #[test]
    fn phrase_requires_contiguous_tokens() {
        let tax = taxonomy(&[("activities", &["early warning system"])]);
        let text = "An early warning system was built. Early, warning systems were not.";
        let matches = find(text, &tax, MatchParams::default());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].span, Span { start: 3, end: 23 });
    }

    #[test]
    fn phrase_matches_inflected_last_word() {
        let tax = taxonomy(&[("activities", &["early warning system"])]);
        let matches = find("Early warning systems save lives.", &tax, MatchParams::default());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].span, Span { start: 0, end: 21 });
    }

    #[test]
    fn hyphenated_keyword_matches_spaced_and_hyphenated_text() {
        let tax = taxonomy(&[("core", &["climate-proof"])]);
        let matches = find(
            "Climate-proof roads and climate proof bridges.",
            &tax,
            MatchParams::default(),
        );
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn same_keyword_in_two_sectors_yields_two_matches() {
        let tax = taxonomy(&[("energy", &["reservoir"]), ("water", &["reservoir"])]);
        let matches = find("The reservoir was expanded.", &tax, MatchParams::default());
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].span, matches[1].span);
        assert_eq!(matches[0].sector, "energy");
        assert_eq!(matches[1].sector, "water");
    }

    #[test]
    fn overlapping_general_and_specific_keywords_both_match() {
        let tax = taxonomy(&[("energy", &["substation", "elevated substation"])]);
        let matches = find("An elevated substation was built.", &tax, MatchParams::default());
        assert_eq!(matches.len(), 2);
        let keywords: Vec<&str> = matches.iter().map(|m| m.keyword.as_str()).collect();
        assert!(keywords.contains(&"substation"));
        assert!(keywords.contains(&"elevated substation"));
    }

    #[test]
    fn lemma_equivalent_entries_in_one_sector_collapse() {
        let tax = taxonomy(&[("hazards", &["flood", "flooding"])]);
        let matches = find("Flooding again.", &tax, MatchParams::default());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].keyword, "flood");
    }

    #[test]
    fn context_spans_neighbouring_sentences() {
        let tax = taxonomy(&[("hazards", &["drought"])]);
        let text = "One. Two. Three. Drought hit. Five. Six. Seven.";
        let params = MatchParams {
            context_sentences: 1,
            max_context_chars: None,
        };
        let matches = find(text, &tax, params);
        assert_eq!(matches[0].context, "Three. Drought hit. Five.");

        let params = MatchParams {
            context_sentences: 0,
            max_context_chars: None,
        };
        let matches = find(text, &tax, params);
        assert_eq!(matches[0].context, "Drought hit.");
    }

    #[test]
    fn context_is_clamped_at_document_edges() {
        let tax = taxonomy(&[("hazards", &["drought"])]);
        let matches = find("Drought hit. Two.", &tax, MatchParams::default());
        assert_eq!(matches[0].context, "Drought hit. Two.");
    }

    #[test]
    fn context_cap_keeps_the_match() {
        let tax = taxonomy(&[("hazards", &["drought"])]);
        let text = format!("{} drought {}", "a".repeat(300), "b".repeat(300));
        let params = MatchParams {
            context_sentences: 3,
            max_context_chars: Some(50),
        };
        let matches = find(&text, &tax, params);
        assert!(matches[0].context.chars().count() <= 50);
        assert!(matches[0].context.contains("drought"));
    }

    #[test]
    fn default_params_bound_context_of_unpunctuated_text() {
        let tax = taxonomy(&[("hazards", &["flood"])]);
        let text = format!("{}flood{}", "word ".repeat(4000), " word".repeat(4000));
        let matches = find(&text, &tax, MatchParams::default());
        assert_eq!(matches.len(), 1);
        let context = &matches[0].context;
        assert!(context.chars().count() <= 1000, "context has {} chars", context.chars().count());
        assert!(context.contains("flood"));
    }

    #[test]
    fn cap_shorter_than_the_match_keeps_the_match_whole() {
        let tax = taxonomy(&[("activities", &["early warning system"])]);
        let text = "The project funds an early warning system for the delta.";
        let params = MatchParams {
            context_sentences: 3,
            max_context_chars: Some(8),
        };
        let matches = find(text, &tax, params);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].context, "early warning system");
    }

    #[test]
    fn capped_context_at_document_start_contains_the_match() {
        let tax = taxonomy(&[("hazards", &["drought"])]);
        let text = format!("Drought {}", "b".repeat(300));
        let params = MatchParams {
            context_sentences: 3,
            max_context_chars: Some(40),
        };
        let matches = find(&text, &tax, params);
        assert!(matches[0].context.starts_with("Drought"));
        assert!(matches[0].context.chars().count() <= 40);
    }

    #[test]
    fn lemmatizer_failure_propagates() {
        let tax = taxonomy(&[("hazards", &["flood"])]);
        let failing = |w: &str| -> Result<String, RiError> {
            if w == "broken" {
                Err(RiError::external("lemmatizer", "unknown token"))
            } else {
                Ok(w.to_string())
            }
        };
        let err = find_keyword_matches("flood broken", &tax, MatchParams::default(), &failing)
            .unwrap_err();
        assert_eq!(err.kind(), riscan_core::ErrorKind::ExternalDependency);
    }

    #[test]
    fn matcher_is_reusable_across_documents() {
        let tax = taxonomy(&[("hazards", &["landslide"])]);
        let lemmatizer = SnowballLemmatizer::new();
        let matcher = KeywordMatcher::new(&tax, &lemmatizer, MatchParams::default()).unwrap();
        assert_eq!(matcher.len(), 1);
        assert_eq!(matcher.find("Landslides blocked the road.").unwrap().len(), 1);
        assert!(matcher.find("Nothing here.").unwrap().is_empty());
    }
}
