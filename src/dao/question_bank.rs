//! Question bank collaborator and a JSON-file backed implementation.

use std::{
    collections::BTreeSet,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::future::BoxFuture;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::dao::storage::StorageResult;

/// A trivia question and the decoys shipped with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Stable question identifier.
    pub id: String,
    /// Category the question belongs to.
    pub category: String,
    /// Question text shown to players.
    pub text: String,
    /// The correct answer.
    pub answer: String,
    /// Decoys used to pad the answer pool.
    #[serde(default)]
    pub filler_answers: Vec<String>,
}

/// Read-only access to the questions games are played with.
pub trait QuestionBank: Send + Sync {
    /// One question of `category`, drawn uniformly. `None` when the category is empty.
    fn random_question(&self, category: String)
    -> BoxFuture<'static, StorageResult<Option<Question>>>;
    fn find_question(&self, id: String) -> BoxFuture<'static, StorageResult<Option<Question>>>;
    /// Every category holding at least one question.
    fn categories(&self) -> BoxFuture<'static, StorageResult<Vec<String>>>;
}

/// Failure to load a question file.
#[derive(Debug, Error)]
pub enum QuestionBankError {
    #[error("failed to read question file `{path}`")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse question file `{path}`")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl QuestionBankError {
    /// Whether the file simply does not exist.
    pub fn is_missing(&self) -> bool {
        matches!(self, QuestionBankError::Read { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Fixed set of questions held in memory.
#[derive(Clone, Default)]
pub struct StaticQuestionBank {
    questions: Arc<Vec<Question>>,
}

impl StaticQuestionBank {
    pub fn new(questions: Vec<Question>) -> Self {
        Self {
            questions: Arc::new(questions),
        }
    }

    /// Load a JSON array of questions.
    pub fn load(path: &Path) -> Result<Self, QuestionBankError> {
        let contents = fs::read_to_string(path).map_err(|source| QuestionBankError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let questions: Vec<Question> =
            serde_json::from_str(&contents).map_err(|source| QuestionBankError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        info!(path = %path.display(), count = questions.len(), "loaded question bank");
        Ok(Self::new(questions))
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

impl QuestionBank for StaticQuestionBank {
    fn random_question(
        &self,
        category: String,
    ) -> BoxFuture<'static, StorageResult<Option<Question>>> {
        let questions = self.questions.clone();
        Box::pin(async move {
            let candidates: Vec<&Question> = questions
                .iter()
                .filter(|question| question.category == category)
                .collect();
            Ok(candidates.choose(&mut rand::rng()).map(|q| (*q).clone()))
        })
    }

    fn find_question(&self, id: String) -> BoxFuture<'static, StorageResult<Option<Question>>> {
        let questions = self.questions.clone();
        Box::pin(async move { Ok(questions.iter().find(|q| q.id == id).cloned()) })
    }

    fn categories(&self) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let questions = self.questions.clone();
        Box::pin(async move {
            let categories: BTreeSet<&str> =
                questions.iter().map(|q| q.category.as_str()).collect();
            Ok(categories.into_iter().map(str::to_string).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, category: &str) -> Question {
        Question {
            id: id.into(),
            category: category.into(),
            text: format!("Question {id}?"),
            answer: format!("Answer {id}"),
            filler_answers: Vec::new(),
        }
    }

    #[tokio::test]
    async fn random_question_stays_in_category() {
        let bank = StaticQuestionBank::new(vec![
            question("1", "movies"),
            question("2", "movies"),
            question("3", "music"),
        ]);

        for _ in 0..20 {
            let drawn = bank.random_question("movies".into()).await.unwrap().unwrap();
            assert_eq!(drawn.category, "movies");
        }
        assert!(bank.random_question("books".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn categories_are_distinct_and_sorted() {
        let bank = StaticQuestionBank::new(vec![
            question("1", "music"),
            question("2", "movies"),
            question("3", "music"),
        ]);
        assert_eq!(bank.categories().await.unwrap(), vec!["movies", "music"]);
        assert_eq!(
            bank.find_question("3".into()).await.unwrap().map(|q| q.category),
            Some("music".to_string())
        );
    }

    #[test]
    fn missing_file_is_reported_as_missing() {
        let err = StaticQuestionBank::load(Path::new("does/not/exist.json")).err().unwrap();
        assert!(err.is_missing());
    }

    #[test]
    fn filler_answers_default_to_empty() {
        let parsed: Vec<Question> = serde_json::from_str(
            r#"[{"id": "q1", "category": "movies", "text": "Who directed Inception?", "answer": "Christopher Nolan"}]"#,
        )
        .unwrap();
        assert!(parsed[0].filler_answers.is_empty());
    }
}
