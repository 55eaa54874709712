//! Question records and the question-bank adapters that produce them.
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::constants::{CSV_MIN_COLUMNS, QUESTIONS_PER_TIER};

/// Incorrect option indices gathered without heap allocation for 4-option questions.
pub type OptionIndexSet = SmallVec<[usize; 4]>;

/// Difficulty tier a question belongs to. Drives the ladder progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Intermediate,
    Hard,
    #[serde(rename = "Very Hard")]
    VeryHard,
    Expert,
}

impl Difficulty {
    pub const ALL: [Self; 5] = [
        Self::Easy,
        Self::Intermediate,
        Self::Hard,
        Self::VeryHard,
        Self::Expert,
    ];

    /// Label used by the question bank and persisted records.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Easy => "Easy",
            Self::Intermediate => "Intermediate",
            Self::Hard => "Hard",
            Self::VeryHard => "Very Hard",
            Self::Expert => "Expert",
        }
    }

    /// Sort rank, 1 for the easiest tier.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Easy => 1,
            Self::Intermediate => 2,
            Self::Hard => 3,
            Self::VeryHard => 4,
            Self::Expert => 5,
        }
    }

    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|tier| tier.label().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single multiple-choice question. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: u32,
    #[serde(rename = "question")]
    pub text: String,
    pub options: Vec<String>,
    /// Index into `options` of the right answer.
    pub correct_answer: usize,
    pub difficulty: Difficulty,
}

impl Question {
    #[must_use]
    pub fn option_count(&self) -> usize {
        self.options.len()
    }

    #[must_use]
    pub const fn is_correct(&self, option_index: usize) -> bool {
        option_index == self.correct_answer
    }

    /// Every option index except the correct one, in original order.
    #[must_use]
    pub fn incorrect_indices(&self) -> OptionIndexSet {
        (0..self.options.len())
            .filter(|idx| *idx != self.correct_answer)
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum QuestionSourceError {
    #[error("failed to read question bank {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("question bank {0} produced no usable questions")]
    Empty(String),
}

/// Produces the question records a session draws from.
pub trait QuestionSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load every usable question.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying bank cannot be read.
    fn load_questions(&self) -> Result<Vec<Question>, Self::Error>;
}

/// Question bank backed by an in-memory CSV document.
#[derive(Debug, Clone)]
pub struct CsvQuestionSource {
    label: String,
    data: String,
}

impl CsvQuestionSource {
    #[must_use]
    pub fn from_text(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }

    /// Read a CSV bank from disk.
    ///
    /// # Errors
    ///
    /// Returns [`QuestionSourceError::Io`] if the file cannot be read.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, QuestionSourceError> {
        let path = path.into();
        let data = std::fs::read_to_string(&path).map_err(|source| QuestionSourceError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            label: path.display().to_string(),
            data,
        })
    }
}

impl QuestionSource for CsvQuestionSource {
    type Error = QuestionSourceError;

    fn load_questions(&self) -> Result<Vec<Question>, Self::Error> {
        let questions = parse_question_csv(&self.data);
        if questions.is_empty() {
            return Err(QuestionSourceError::Empty(self.label.clone()));
        }
        Ok(questions)
    }
}

impl QuestionSource for Vec<Question> {
    type Error = std::convert::Infallible;

    fn load_questions(&self) -> Result<Vec<Question>, Self::Error> {
        Ok(self.clone())
    }
}

/// Parse a question bank in `id,question,A,B,C,D,answer,difficulty` form.
///
/// The first non-blank line is a header. Rows that are too short, carry a
/// non-numeric id, an answer letter outside `A..=D`, or an unknown difficulty
/// are dropped.
#[must_use]
pub fn parse_question_csv(data: &str) -> Vec<Question> {
    data.lines()
        .filter(|line| !line.trim().is_empty())
        .skip(1)
        .filter_map(parse_question_row)
        .collect()
}

const ANSWER_LETTERS: &str = "ABCD";

fn parse_question_row(line: &str) -> Option<Question> {
    let values = split_csv_line(line);
    if values.len() < CSV_MIN_COLUMNS {
        return None;
    }
    let id = values[0].parse::<u32>().ok()?;
    let letter = values[6].trim().chars().next()?;
    let correct_answer = ANSWER_LETTERS.find(letter)?;
    let difficulty = Difficulty::parse(&values[7])?;
    Some(Question {
        id,
        text: values[1].clone(),
        options: values[2..6].to_vec(),
        correct_answer,
        difficulty,
    })
}

fn split_csv_line(line: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                values.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    values.push(current.trim().to_string());
    values
}

/// Stable sort from easiest to hardest tier.
pub fn sort_by_difficulty(questions: &mut [Question]) {
    questions.sort_by_key(|q| q.difficulty.rank());
}

/// Draw three questions per tier, easiest first, without repeating an id.
///
/// Tiers with a short pool contribute what they have.
pub fn select_with_progression(questions: &[Question], rng: &mut impl Rng) -> Vec<Question> {
    let mut used: HashSet<u32> = HashSet::new();
    let mut selected = Vec::with_capacity(Difficulty::ALL.len() * QUESTIONS_PER_TIER);

    for tier in Difficulty::ALL {
        let mut pool: Vec<&Question> = questions
            .iter()
            .filter(|q| q.difficulty == tier && !used.contains(&q.id))
            .collect();
        pool.shuffle(rng);
        let picks = pool
            .into_iter()
            .filter(|q| used.insert(q.id))
            .take(QUESTIONS_PER_TIER);
        selected.extend(picks.cloned());
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    const SAMPLE_CSV: &str = "\
id,question,optionA,optionB,optionC,optionD,correctAnswer,difficulty
1,What is 2 + 2?,3,4,5,6,B,Easy
2,\"Which city, of these, is in France?\",Berlin,Paris,Rome,Madrid,B,Intermediate
3,Missing columns,a,b
x,Bad id,a,b,c,d,A,Easy
4,Bad letter,a,b,c,d,E,Hard
5,Bad tier,a,b,c,d,A,Impossible
6,Festival of lights?,Holi,Diwali,Eid,Onam,B,Very Hard
";

    fn question(id: u32, difficulty: Difficulty) -> Question {
        Question {
            id,
            text: format!("Question {id}"),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_answer: 0,
            difficulty,
        }
    }

    #[test]
    fn csv_parser_keeps_valid_rows_only() {
        let questions = parse_question_csv(SAMPLE_CSV);
        let ids: Vec<u32> = questions.iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![1, 2, 6]);
        assert_eq!(questions[0].correct_answer, 1);
        assert_eq!(questions[1].text, "Which city, of these, is in France?");
        assert_eq!(questions[2].difficulty, Difficulty::VeryHard);
    }

    #[test]
    fn csv_source_rejects_empty_banks() {
        let source = CsvQuestionSource::from_text("empty", "id,question\n");
        assert!(matches!(
            source.load_questions(),
            Err(QuestionSourceError::Empty(_))
        ));
    }

    #[test]
    fn missing_file_reports_io_error() {
        let err = CsvQuestionSource::from_path("/definitely/not/here.csv").unwrap_err();
        assert!(err.to_string().contains("not/here.csv"));
    }

    #[test]
    fn difficulty_labels_round_trip() {
        for tier in Difficulty::ALL {
            assert_eq!(Difficulty::parse(tier.label()), Some(tier));
        }
        assert_eq!(Difficulty::parse(" very hard "), Some(Difficulty::VeryHard));
        assert_eq!(
            serde_json::to_string(&Difficulty::VeryHard).unwrap(),
            "\"Very Hard\""
        );
    }

    #[test]
    fn sort_orders_by_rank() {
        let mut questions = vec![
            question(1, Difficulty::Expert),
            question(2, Difficulty::Easy),
            question(3, Difficulty::Hard),
        ];
        sort_by_difficulty(&mut questions);
        let ids: Vec<u32> = questions.iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn progression_picks_three_per_tier_in_order() {
        let mut bank = Vec::new();
        let mut id = 0;
        for tier in Difficulty::ALL {
            for _ in 0..5 {
                id += 1;
                bank.push(question(id, tier));
            }
        }
        let mut rng = SmallRng::seed_from_u64(11);
        let selected = select_with_progression(&bank, &mut rng);
        assert_eq!(selected.len(), 15);
        for (tier, chunk) in Difficulty::ALL.iter().zip(selected.chunks(3)) {
            assert!(chunk.iter().all(|q| q.difficulty == *tier));
        }
        let unique: HashSet<u32> = selected.iter().map(|q| q.id).collect();
        assert_eq!(unique.len(), 15);
    }

    #[test]
    fn progression_tolerates_short_pools() {
        let bank = vec![
            question(1, Difficulty::Easy),
            question(2, Difficulty::Hard),
            question(3, Difficulty::Hard),
        ];
        let mut rng = SmallRng::seed_from_u64(2);
        let selected = select_with_progression(&bank, &mut rng);
        assert_eq!(selected.len(), 3);
        assert_eq!(selected[0].id, 1);
    }

    #[test]
    fn incorrect_indices_skip_the_answer() {
        let mut q = question(1, Difficulty::Easy);
        q.correct_answer = 2;
        assert_eq!(q.incorrect_indices().as_slice(), &[0, 1, 3]);
        assert!(q.is_correct(2));
    }
}
