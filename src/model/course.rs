use crate::schema::{cours, cours_fichiers};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Queryable, Selectable, Identifiable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = cours)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Course {
    pub id: i64,
    pub module_id: i64,
    pub enseignant_id: i64,
    pub titre: String,
    pub description: String,
    // legacy single-file columns, read but never written
    pub fichier_url: Option<String>,
    pub fichier_public_id: Option<String>,
    pub fichier_type: Option<String>,
    pub informations_supplementaires: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = cours)]
pub struct NewCourse {
    pub module_id: i64,
    pub enseignant_id: i64,
    pub titre: String,
    pub description: String,
    pub informations_supplementaires: JsonValue,
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = cours)]
pub struct CourseChangeset {
    pub titre: Option<String>,
    pub description: Option<String>,
    pub informations_supplementaires: Option<JsonValue>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(
    Queryable, Selectable, Identifiable, Associations, Serialize, Deserialize, Debug, Clone, PartialEq,
)]
#[diesel(belongs_to(Course, foreign_key = cours_id))]
#[diesel(table_name = cours_fichiers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CourseFile {
    pub id: i64,
    pub cours_id: i64,
    pub url: String,
    pub public_id: String,
    pub type_fichier: String,
    pub nom: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = cours_fichiers)]
pub struct NewCourseFile {
    pub cours_id: i64,
    pub url: String,
    pub public_id: String,
    pub type_fichier: String,
    pub nom: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CourseResponse {
    #[serde(flatten)]
    pub course: Course,
    pub module_nom: Option<String>,
    pub fichiers: Vec<CourseFile>,
}
