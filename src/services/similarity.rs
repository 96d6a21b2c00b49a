//! Near-duplicate detection for free-text answers.

/// Leading articles dropped before comparison, stripped one after the other.
const ARTICLES: [&str; 3] = ["the ", "a ", "an "];

/// Maximum edit distance, relative to the longer answer, still counted as "the same answer".
const DISTANCE_RATIO: f64 = 0.2;

/// Lowercase, drop leading articles and punctuation, collapse whitespace.
pub fn normalize(text: &str) -> String {
    let mut lowered = text.trim_start().to_lowercase();
    for article in ARTICLES {
        if let Some(rest) = lowered.strip_prefix(article) {
            lowered = rest.to_string();
        }
    }

    let stripped: String = lowered
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether a human would read both answers as the same one.
///
/// True when the normalized forms are equal, when one contains the other, or when
/// their character edit distance is under a fifth of the longer one's length.
pub fn is_similar(a: &str, b: &str) -> bool {
    let left = normalize(a);
    let right = normalize(b);

    if left == right || left.contains(&right) || right.contains(&left) {
        return true;
    }

    let longest = left.chars().count().max(right.chars().count());
    let distance = levenshtein(&left, &right);
    (distance as f64) / (longest as f64) < DISTANCE_RATIO
}

/// Character-level Levenshtein distance, two-row variant.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, left) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, right) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(left != right);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_articles_punctuation_and_spacing() {
        assert_eq!(normalize("The  Godfather!"), "godfather");
        assert_eq!(normalize("  A Beautiful   Mind."), "beautiful mind");
        assert_eq!(normalize("An Officer, and a Gentleman"), "officer and a gentleman");
        assert_eq!(normalize("Christopher Nolan"), "christopher nolan");
    }

    #[test]
    fn articles_are_stripped_in_sequence() {
        assert_eq!(normalize("the a an x"), "x");
        assert_eq!(normalize("a the x"), "the x");
    }

    #[test]
    fn levenshtein_counts_edits() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("nolan", "nolan"), 0);
        assert_eq!(levenshtein("café", "cafe"), 1);
    }

    #[test]
    fn every_answer_is_similar_to_itself() {
        for text in ["", "Christopher Nolan", "The Matrix", "...", "Ünïcödé"] {
            assert!(is_similar(text, text), "{text:?} should match itself");
        }
    }

    #[test]
    fn similarity_is_symmetric() {
        let samples = [
            "Christopher Nolan",
            "christopher nolan",
            "Denis Villeneuve",
            "Steven Spielberg",
            "Stephen Spielberg",
            "Nolan",
            "Ridley Scott",
        ];
        for a in samples {
            for b in samples {
                assert_eq!(is_similar(a, b), is_similar(b, a), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn case_and_spacing_variants_are_rejected() {
        assert!(is_similar("Christopher Nolan", "christopher  nolan"));
        assert!(is_similar("Christopher Nolan", "Nolan"));
        assert!(is_similar("Steven Spielberg", "Stephen Spielberg"));
    }

    #[test]
    fn distinct_answers_pass() {
        assert!(!is_similar("Christopher Nolan", "Denis Villeneuve"));
        assert!(!is_similar("Ridley Scott", "James Cameron"));
    }
}
