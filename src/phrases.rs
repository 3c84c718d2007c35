use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::Path;
use tracing::{info, warn};

/// Load removal phrases, one per line. Blank lines are skipped.
///
/// A missing file is not fatal: the relay simply runs without phrase removal.
pub fn load_phrases(path: &Path) -> Result<Vec<String>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(
                "Common phrases file '{}' not found, no phrases will be removed",
                path.display()
            );
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(e).with_context(|| {
                format!("Failed to read common phrases file: {}", path.display())
            })
        }
    };

    let phrases: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    info!("Loaded {} common phrases from {}", phrases.len(), path.display());
    Ok(phrases)
}

/// Remove every literal occurrence of each phrase from `text`.
///
/// Phrases are applied in order and the passes repeat until none of them
/// occurs any more, so a removal that splices a new occurrence together is
/// removed as well. The text is otherwise untouched (no trimming).
pub fn filter(text: &str, phrases: &[String]) -> String {
    let mut result = text.to_string();
    loop {
        let mut changed = false;
        for phrase in phrases.iter().filter(|p| !p.is_empty()) {
            if result.contains(phrase.as_str()) {
                result = result.replace(phrase.as_str(), "");
                changed = true;
            }
        }
        if !changed {
            return result;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn phrases(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_empty_list_returns_input_exactly() {
        let text = "  Bonjour le monde.\n";
        assert_eq!(filter(text, &[]), text);
    }

    #[test]
    fn test_no_match_returns_input_exactly() {
        let text = "Bonjour le monde. ";
        assert_eq!(filter(text, &phrases(&["[ad]"])), text);
    }

    #[test]
    fn test_removes_all_occurrences() {
        let result = filter(
            "Subscribe! news Subscribe! more",
            &phrases(&["Subscribe!"]),
        );
        assert_eq!(result, " news  more");
    }

    #[test]
    fn test_literal_not_pattern() {
        let result = filter("a.b axb", &phrases(&["a.b"]));
        assert_eq!(result, " axb");
    }

    #[test]
    fn test_phrases_applied_in_order() {
        assert_eq!(filter("abc", &phrases(&["bc", "abc"])), "a");
        assert_eq!(filter("abc", &phrases(&["abc", "bc"])), "");
    }

    #[test]
    fn test_spliced_occurrence_is_removed() {
        let list = phrases(&["ab"]);
        let result = filter("aabb", &list);
        assert_eq!(result, "");
        for phrase in &list {
            assert!(!result.contains(phrase.as_str()));
        }
    }

    #[test]
    fn test_output_contains_no_phrase() {
        let list = phrases(&["[ad-signature]", "🔔 Follow us", "xyx"]);
        let inputs = [
            "Bonjour le monde. [ad-signature]",
            "🔔 Follow us 🔔 Follow us text",
            "xyxyx yxyxy",
            "[ad-[ad-signature]signature]",
        ];
        for input in inputs {
            let result = filter(input, &list);
            for phrase in &list {
                assert!(
                    !result.contains(phrase.as_str()),
                    "{:?} still contains {:?}",
                    result,
                    phrase
                );
            }
        }
    }

    #[test]
    fn test_empty_phrase_ignored() {
        assert_eq!(filter("text", &phrases(&[""])), "text");
    }

    #[test]
    fn test_load_phrases_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  [ad-signature]  ").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "Subscribe to our channel").unwrap();

        let loaded = load_phrases(file.path()).unwrap();
        assert_eq!(loaded, vec!["[ad-signature]", "Subscribe to our channel"]);
    }

    #[test]
    fn test_load_phrases_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_phrases(&dir.path().join("missing.txt")).unwrap();
        assert!(loaded.is_empty());
    }
}
