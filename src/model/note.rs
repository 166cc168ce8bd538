use crate::schema::notes;
use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 20.0;

/// Kind of evaluation a note was given for. Stored by name in `notes.type_evaluation`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationKind {
    Test1,
    Test2,
    Exam,
}

impl EvaluationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationKind::Test1 => "test1",
            EvaluationKind::Test2 => "test2",
            EvaluationKind::Exam => "exam",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EvaluationKind::Test1 => "Test 1",
            EvaluationKind::Test2 => "Test 2",
            EvaluationKind::Exam => "Examen",
        }
    }
}

impl fmt::Display for EvaluationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvaluationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "test1" => Ok(EvaluationKind::Test1),
            "test2" => Ok(EvaluationKind::Test2),
            "exam" => Ok(EvaluationKind::Exam),
            other => Err(format!("Unknown evaluation type '{}'", other)),
        }
    }
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = notes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Note {
    pub id: i64,
    pub stagiaire_id: i64,
    pub module_id: i64,
    pub enseignant_id: i64,
    pub valeur: BigDecimal,
    pub type_evaluation: String,
    pub informations_supplementaires: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = notes)]
pub struct NewNote {
    pub stagiaire_id: i64,
    pub module_id: i64,
    pub enseignant_id: i64,
    pub valeur: BigDecimal,
    pub type_evaluation: String,
    pub informations_supplementaires: JsonValue,
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = notes)]
pub struct NoteChangeset {
    pub valeur: Option<BigDecimal>,
    pub type_evaluation: Option<String>,
    pub informations_supplementaires: Option<JsonValue>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NoteResponse {
    pub id: i64,
    pub stagiaire_id: i64,
    pub module_id: i64,
    pub enseignant_id: i64,
    pub valeur: f64,
    pub type_evaluation: EvaluationKind,
    pub informations_supplementaires: JsonValue,
    pub module_nom: Option<String>,
    pub stagiaire_nom: Option<String>,
    pub enseignant_nom: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NoteResponse {
    /// Evaluation names were validated on the way in; an unknown stored value falls back to `exam`.
    pub fn from_note(note: Note) -> Self {
        NoteResponse {
            id: note.id,
            stagiaire_id: note.stagiaire_id,
            module_id: note.module_id,
            enseignant_id: note.enseignant_id,
            valeur: note.valeur.to_f64().unwrap_or_default(),
            type_evaluation: note.type_evaluation.parse().unwrap_or(EvaluationKind::Exam),
            informations_supplementaires: note.informations_supplementaires,
            module_nom: None,
            stagiaire_nom: None,
            enseignant_nom: None,
            created_at: note.created_at,
            updated_at: note.updated_at,
        }
    }
}
