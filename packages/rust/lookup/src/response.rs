//! Extract per-name schools from free-text model answers.
//!
//! Answers are expected as `Name | School` lines but arrive with bullets,
//! numbering, bold markers, markdown table pipes, stray citations, and
//! names spelled with different case or spacing than requested.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::LookupOutcome;

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// Matches a leading `- `, `* `, `• `, `1. ` or `1) `.
static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-*•]|\d+[.)])\s+").expect("bullet regex"));

/// Matches `【…】`, `[1]`, `[^1]` citation markers.
static CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"【[^】]*】|\[\^?\d+\]").expect("citation regex")
});

/// Answers meaning "no school", as written by people and models alike.
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:unknown\b.*|not\s*(?:found|available)\b.*|n/?a|none|-+)$")
        .expect("placeholder regex")
});

/// Markdown table separator rows like `---|:---:`.
static SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\s|:-]+$").expect("separator regex"));

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Whether a trimmed school field is a stand-in for "could not determine"
/// (`unknown`, `not found`, `N/A`, `none`, dashes).
pub fn is_placeholder(school: &str) -> bool {
    PLACEHOLDER_RE.is_match(school)
}

/// Map a model answer back onto the requested names, in request order.
///
/// Names the answer omits, and placeholder answers such as `unknown` or
/// `not found`, come back as [`LookupOutcome::Unknown`].
pub fn parse_response(text: &str, names: &[String]) -> Vec<(String, LookupOutcome)> {
    let exact: HashMap<&str, usize> = names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i))
        .collect();
    let loose: HashMap<String, usize> = names
        .iter()
        .enumerate()
        .map(|(i, n)| (loose_key(n), i))
        .collect();

    let mut answers: Vec<Option<LookupOutcome>> = vec![None; names.len()];

    for line in text.lines() {
        let Some((name, school)) = split_answer(line) else {
            continue;
        };

        let idx = exact
            .get(name.as_str())
            .copied()
            .or_else(|| loose.get(&loose_key(&name)).copied());

        let Some(idx) = idx else {
            debug!(%name, "answer for a name that was not requested");
            continue;
        };

        // First answer per name wins.
        if answers[idx].is_some() {
            continue;
        }

        answers[idx] = Some(if school.is_empty() || is_placeholder(&school) {
            LookupOutcome::Unknown
        } else {
            LookupOutcome::Resolved(school)
        });
    }

    names
        .iter()
        .zip(answers)
        .map(|(name, answer)| (name.clone(), answer.unwrap_or(LookupOutcome::Unknown)))
        .collect()
}

/// Split one answer line into cleaned `(name, school)`.
///
/// Only the first two columns count. Extra table columns are dropped and
/// the school never contains a `|`.
fn split_answer(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if !trimmed.contains('|') || SEPARATOR_RE.is_match(trimmed) {
        return None;
    }

    let unpiped = trimmed.trim_matches('|').trim();
    let unbulleted = BULLET_RE.replace(unpiped, "");
    let mut columns = unbulleted.split('|');
    let name = clean_field(columns.next()?);
    let school = clean_field(&CITATION_RE.replace_all(columns.next()?, ""));

    // Header row of a markdown table.
    if name.eq_ignore_ascii_case("name") {
        return None;
    }
    if name.is_empty() {
        return None;
    }

    Some((name, school))
}

fn clean_field(field: &str) -> String {
    let unbolded = field.replace("**", "");
    unbolded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn loose_key(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn plain_answer_lines() {
        let text = "Alice | MIT\nBob | unknown\n";
        let out = parse_response(text, &names(&["Alice", "Bob"]));
        assert_eq!(
            out,
            vec![
                ("Alice".into(), LookupOutcome::Resolved("MIT".into())),
                ("Bob".into(), LookupOutcome::Unknown),
            ]
        );
    }

    #[test]
    fn omitted_names_are_unknown_and_order_follows_request() {
        let text = "Carol | Yale\n";
        let out = parse_response(text, &names(&["Alice", "Carol"]));
        assert_eq!(out[0], ("Alice".into(), LookupOutcome::Unknown));
        assert_eq!(out[1], ("Carol".into(), LookupOutcome::Resolved("Yale".into())));
    }

    #[test]
    fn decorations_are_stripped() {
        let text = "Here are the results:\n\n\
                    1. **Alice Smith** | Carnegie Mellon University 【3†source】\n\
                    - bob  jones | University of California, Berkeley [2]\n";
        let out = parse_response(text, &names(&["Alice Smith", "Bob Jones"]));
        assert_eq!(
            out[0].1,
            LookupOutcome::Resolved("Carnegie Mellon University".into())
        );
        assert_eq!(
            out[1].1,
            LookupOutcome::Resolved("University of California, Berkeley".into())
        );
    }

    #[test]
    fn markdown_tables_are_understood() {
        let text = "| Name | School |\n|---|---|\n| Alice | Rice University |\n";
        let out = parse_response(text, &names(&["Alice"]));
        assert_eq!(out[0].1, LookupOutcome::Resolved("Rice University".into()));
    }

    #[test]
    fn extra_table_columns_are_dropped() {
        let text = "| Name | School | Degree |\n|---|---|---|\n\
                    | Alice | Rice University | BS 2019 |\n\
                    Bob | Yale | BA | cum laude\n";
        let out = parse_response(text, &names(&["Alice", "Bob"]));
        assert_eq!(out[0].1, LookupOutcome::Resolved("Rice University".into()));
        assert_eq!(out[1].1, LookupOutcome::Resolved("Yale".into()));
    }

    #[test]
    fn placeholders() {
        for answer in ["unknown", "Unknown institution", "Not found", "N/A", "none", "--"] {
            assert!(is_placeholder(answer), "{answer}");
        }
        for answer in ["MIT", "University of Notre Dame", "Nanyang Technological University"] {
            assert!(!is_placeholder(answer), "{answer}");
        }
    }

    #[test]
    fn placeholder_answers_are_unknown() {
        let text = "A | Not found\nB | N/A\nC | ---\nD | Unknown institution\n";
        let out = parse_response(text, &names(&["A", "B", "C", "D"]));
        assert!(out.iter().all(|(_, o)| *o == LookupOutcome::Unknown));
    }

    #[test]
    fn first_answer_for_a_name_wins() {
        let text = "Alice | MIT\nAlice | Harvard\n";
        let out = parse_response(text, &names(&["Alice"]));
        assert_eq!(out[0].1, LookupOutcome::Resolved("MIT".into()));
    }

    #[test]
    fn unrequested_names_are_ignored() {
        let text = "Mallory | Oxford\n";
        let out = parse_response(text, &names(&["Alice"]));
        assert_eq!(out, vec![("Alice".into(), LookupOutcome::Unknown)]);
    }
}
