//! Case-folded redaction of matched spans.
//!
//! Keyword hits are located on a Unicode-lowercased shadow of the content
//! with a byte map back to the original, so `ApiKey`, `APIKEY`, and `apikey`
//! all redact correctly even when case folding changes byte lengths. Regex
//! hits are located on the original content (patterns carry their own `(?i)`
//! flags when they want case-insensitivity). Overlapping spans are merged
//! before replacement.

use std::ops::Range;

use crate::ruleset::CompiledRule;

/// The literal marker substituted for every matched span.
pub const REDACTION_TOKEN: &str = "[REDACTED]";

// ── Case-folded search ─────────────────────────────────────────────────

/// Lowercase `s`, returning the folded string plus, for each folded byte,
/// the byte range of the original character it came from.
pub(crate) fn fold_with_spans(s: &str) -> (String, Vec<Range<usize>>) {
    let mut folded = String::with_capacity(s.len());
    let mut spans = Vec::with_capacity(s.len());
    for (start, ch) in s.char_indices() {
        let end = start + ch.len_utf8();
        for lc in ch.to_lowercase() {
            let before = folded.len();
            folded.push(lc);
            for _ in before..folded.len() {
                spans.push(start..end);
            }
        }
    }
    (folded, spans)
}

/// Find every occurrence of an already-folded `term` in `content`,
/// returning byte ranges into the original content. A hit that starts or
/// ends inside a multi-byte fold expansion widens to whole characters.
pub fn find_term_spans(content: &str, term: &str) -> Vec<Range<usize>> {
    if term.is_empty() {
        return Vec::new();
    }
    let (folded, spans) = fold_with_spans(content);
    let mut out = Vec::new();
    let mut from = 0;
    while let Some(rel) = folded[from..].find(term) {
        let start = from + rel;
        let end = start + term.len();
        out.push(spans[start].start..spans[end - 1].end);
        from = start + term.len().max(1);
    }
    out
}

/// `true` when the folded `term` occurs anywhere in `content`.
pub fn contains_term(content: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    let (folded, _) = fold_with_spans(content);
    folded.contains(term)
}

// ── Redaction ──────────────────────────────────────────────────────────

fn merge_spans(mut spans: Vec<Range<usize>>) -> Vec<Range<usize>> {
    spans.sort_by_key(|r| (r.start, r.end));
    let mut merged: Vec<Range<usize>> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }
    merged
}

/// Replace every keyword and regex hit of the given rules with
/// [`REDACTION_TOKEN`]. The input is never mutated; rules that fired with
/// different actions still contribute their matched spans, so a `sanitize`
/// verdict scrubs everything the evaluation saw.
#[must_use]
pub fn sanitize<'a, I>(content: &str, rules: I) -> String
where
    I: IntoIterator<Item = &'a CompiledRule>,
{
    let mut spans = Vec::new();
    for compiled in rules {
        for term in &compiled.keyword_terms {
            spans.extend(find_term_spans(content, term));
        }
        for (_, re) in &compiled.patterns {
            for m in re.find_iter(content) {
                if !m.is_empty() {
                    spans.push(m.start()..m.end());
                }
            }
        }
    }
    let merged = merge_spans(spans);
    if merged.is_empty() {
        return content.to_string();
    }

    let mut out = String::with_capacity(content.len());
    let mut cursor = 0;
    for span in merged {
        out.push_str(&content[cursor..span.start]);
        out.push_str(REDACTION_TOKEN);
        cursor = span.end;
    }
    out.push_str(&content[cursor..]);
    out
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{GuardrailRule, RuleAction, RuleCategory, Severity};
    use crate::ruleset::CompiledRuleSet;
    use rustc_hash::FxHashMap;

    fn compiled(keywords: &[&str], patterns: &[(&str, &str)]) -> CompiledRuleSet {
        CompiledRuleSet::compile(vec![GuardrailRule {
            rule_id: "r".into(),
            category: RuleCategory::Compliance,
            severity: Severity::High,
            action: RuleAction::Sanitize,
            patterns: patterns
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<FxHashMap<_, _>>(),
            keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
            whitelist: vec![],
            enabled: true,
        }])
        .unwrap()
    }

    #[test]
    fn keyword_redaction_is_case_insensitive() {
        let set = compiled(&["apikey"], &[]);
        let out = sanitize("my APIKEY and my ApiKey", set.rules());
        assert_eq!(out, "my [REDACTED] and my [REDACTED]");
    }

    #[test]
    fn regex_hits_redacted() {
        let set = compiled(&[], &[("ssn", r"\d{3}-\d{2}-\d{4}")]);
        let out = sanitize("ssn is 123-45-6789 ok", set.rules());
        assert_eq!(out, "ssn is [REDACTED] ok");
    }

    #[test]
    fn overlapping_spans_merge() {
        let set = compiled(&["secret key"], &[("tail", r"key material")]);
        let out = sanitize("the secret key material leaked", set.rules());
        assert_eq!(out, "the [REDACTED] leaked");
    }

    #[test]
    fn unicode_case_folding() {
        let set = compiled(&["straße"], &[]);
        let out = sanitize("die STRASSE ist lang", set.rules());
        // "STRASSE" folds to "strasse" which does not equal "straße"; the
        // folded form of the configured keyword is what must be matched.
        assert_eq!(out, "die STRASSE ist lang");
        let out = sanitize("die Straße ist lang", set.rules());
        assert_eq!(out, "die [REDACTED] ist lang");
    }

    #[test]
    fn no_match_returns_input_verbatim() {
        let set = compiled(&["absent"], &[]);
        assert_eq!(sanitize("clean text", set.rules()), "clean text");
    }

    #[test]
    fn contains_term_folds_content() {
        assert!(contains_term("Das ist GROSS", "gross"));
        assert!(!contains_term("small", "gross"));
    }
}
