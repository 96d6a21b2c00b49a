//! Server-written decoys used to pad an answer pool.

use rand::seq::IndexedRandom;

/// Pluggable generator of decoy answers.
pub trait FillerStrategy: Send + Sync {
    /// Produce one candidate decoy for a question of `category`.
    ///
    /// Candidates may collide with existing answers; callers filter them.
    fn synthesize(&self, category: &str, question: &str) -> String;
}

/// Words ignored when picking a keyword out of a question.
const STOPWORDS: [&str; 20] = [
    "the", "a", "an", "in", "on", "at", "to", "for", "with", "by", "what", "who", "where", "when",
    "why", "how", "is", "are", "was", "were",
];

const MOVIE_TEMPLATES: [&str; 4] = [
    "A classic film about {}",
    "The story of {}",
    "A movie featuring {}",
    "A film starring {}",
];
const MUSIC_TEMPLATES: [&str; 4] = [
    "A song by {}",
    "A hit from {}",
    "A track featuring {}",
    "A collaboration with {}",
];
const BOOK_TEMPLATES: [&str; 4] = [
    "A novel about {}",
    "A story featuring {}",
    "A book by {}",
    "A tale of {}",
];
const GENERAL_TEMPLATES: [&str; 4] = [
    "Something related to {}",
    "A thing about {}",
    "An item connected to {}",
    "A concept involving {}",
];

/// Category-keyed templates filled with a keyword taken from the question.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateFillers;

impl TemplateFillers {
    fn templates(category: &str) -> &'static [&'static str] {
        match category {
            "movies" => &MOVIE_TEMPLATES,
            "music" => &MUSIC_TEMPLATES,
            "books" => &BOOK_TEMPLATES,
            _ => &GENERAL_TEMPLATES,
        }
    }
}

impl FillerStrategy for TemplateFillers {
    fn synthesize(&self, category: &str, question: &str) -> String {
        let terms = key_terms(question);
        let mut rng = rand::rng();
        let term = terms
            .choose(&mut rng)
            .map(String::as_str)
            .unwrap_or(category);
        let template = Self::templates(category)
            .choose(&mut rng)
            .copied()
            .unwrap_or(GENERAL_TEMPLATES[0]);
        template.replacen("{}", term, 1)
    }
}

/// Lowercased words of `question` longer than two characters, stopwords removed.
pub fn key_terms(question: &str) -> Vec<String> {
    question
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|word| word.chars().count() > 2 && !STOPWORDS.contains(&word.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_terms_drop_stopwords_and_short_words() {
        assert_eq!(
            key_terms("Who directed Inception?"),
            vec!["directed".to_string(), "inception?".to_string()]
        );
        assert!(key_terms("Who is it").is_empty());
    }

    #[test]
    fn synthesis_uses_category_templates() {
        let fillers = TemplateFillers;
        for _ in 0..20 {
            let text = fillers.synthesize("music", "Who sang Thriller?");
            assert!(
                MUSIC_TEMPLATES
                    .iter()
                    .any(|template| text.starts_with(template.trim_end_matches("{}"))),
                "{text}"
            );
        }
    }

    #[test]
    fn unknown_category_falls_back_to_general_and_category_keyword() {
        let text = TemplateFillers.synthesize("sports", "Who is he");
        assert!(text.ends_with("sports"), "{text}");
        assert!(
            GENERAL_TEMPLATES
                .iter()
                .any(|template| text.starts_with(template.trim_end_matches("{}")))
        );
    }
}
