use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use utoipa::ToSchema;

use crate::error::{Error, Result};

pub const OPTION_COUNT: usize = 4;

/// One multiple choice question attached to a book chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    /// The question text
    pub question: String,
    /// Exactly four answer options
    pub options: Vec<String>,
    /// Index of the correct option, 0-3
    pub correct_answer: usize,
    /// Why the correct option is correct
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl QuizQuestion {
    fn validate(&self, index: usize) -> Result<()> {
        if self.question.trim().is_empty() {
            return Err(Error::Validation(format!("question {index} has no text")));
        }
        if self.options.len() != OPTION_COUNT {
            return Err(Error::Validation(format!(
                "question {index} must have {OPTION_COUNT} options, found {}",
                self.options.len()
            )));
        }
        if self.options.iter().any(|o| o.trim().is_empty()) {
            return Err(Error::Validation(format!(
                "question {index} has an empty option"
            )));
        }
        if self.correct_answer >= OPTION_COUNT {
            return Err(Error::Validation(format!(
                "question {index} has correctAnswer {} out of range 0-3",
                self.correct_answer
            )));
        }
        Ok(())
    }
}

/// A validated quiz. The empty quiz means "no quiz".
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(transparent)]
pub struct Quiz(Vec<QuizQuestion>);

impl Quiz {
    pub fn new(questions: Vec<QuizQuestion>) -> Result<Self> {
        for (i, q) in questions.iter().enumerate() {
            q.validate(i)?;
        }
        Ok(Self(questions))
    }

    /// Read the persisted blob. Anything that does not validate is logged and read as no quiz.
    pub fn parse_stored(unit_id: i64, stored: Option<&str>) -> Self {
        let Some(stored) = stored.filter(|s| !s.trim().is_empty()) else {
            return Self::default();
        };
        let parsed = serde_json::from_str::<Vec<QuizQuestion>>(stored)
            .map_err(|e| Error::Validation(e.to_string()))
            .and_then(Self::new);
        match parsed {
            Ok(quiz) => quiz,
            Err(e) => {
                warn!("unit {unit_id} has an invalid stored quiz, ignoring it: {e}");
                Self::default()
            }
        }
    }

    /// Validate an incoming payload. `null` and `[]` clear the quiz.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Array(_) => {
                let questions = serde_json::from_value::<Vec<QuizQuestion>>(value)
                    .map_err(|e| Error::Validation(format!("invalid quiz: {e}")))?;
                Self::new(questions)
            }
            _ => Err(Error::Validation("quiz must be a JSON array".to_string())),
        }
    }

    pub fn to_stored(&self) -> Result<Option<String>> {
        if self.0.is_empty() {
            return Ok(None);
        }
        let json = serde_json::to_string(&self.0).map_err(anyhow::Error::from)?;
        Ok(Some(json))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn questions(&self) -> &[QuizQuestion] {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum QuizState {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

/// Quiz state of one learner for one chapter view. Held in the HTTP session, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuizSession {
    pub state: QuizState,
    pub current_question: usize,
    pub score: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerFeedback {
    pub is_correct: bool,
    pub correct_answer: usize,
    pub explanation: Option<String>,
    pub score: usize,
    pub total: usize,
    pub session: QuizSession,
}

impl QuizSession {
    /// Session key, scoped to the chapter being viewed.
    pub fn key(unit_id: i64) -> String {
        format!("quiz_session:{unit_id}")
    }

    pub fn answer(&mut self, quiz: &Quiz, choice: usize) -> Result<AnswerFeedback> {
        if quiz.is_empty() {
            return Err(Error::Validation("this chapter has no quiz".to_string()));
        }
        if self.state == QuizState::Completed {
            return Err(Error::Validation(
                "quiz already completed, reset it to try again".to_string(),
            ));
        }
        if choice >= OPTION_COUNT {
            return Err(Error::Validation(format!("choice {choice} out of range 0-3")));
        }
        // the quiz may have shrunk since the session started
        let Some(question) = quiz.questions().get(self.current_question) else {
            self.reset();
            return Err(Error::Validation(
                "quiz changed since it was started, start again".to_string(),
            ));
        };
        let is_correct = choice == question.correct_answer;
        if is_correct {
            self.score += 1;
        }
        self.current_question += 1;
        self.state = if self.current_question >= quiz.len() {
            QuizState::Completed
        } else {
            QuizState::InProgress
        };
        Ok(AnswerFeedback {
            is_correct,
            correct_answer: question.correct_answer,
            explanation: question.explanation.clone(),
            score: self.score,
            total: quiz.len(),
            session: self.clone(),
        })
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_completed(&self) -> bool {
        self.state == QuizState::Completed
    }
}

/// Whether the learner may set the chapter's completion flag to `requested`.
/// Un-marking is always allowed; marking needs a finished quiz when the chapter has one.
pub fn mark_as_read_allowed(quiz: &Quiz, session: Option<&QuizSession>, requested: bool) -> bool {
    if !requested || quiz.is_empty() {
        return true;
    }
    session.is_some_and(QuizSession::is_completed)
}
