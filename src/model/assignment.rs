use crate::schema::{user_groupes, user_modules};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Queryable, Selectable, Identifiable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = user_groupes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TraineeGroupAssignment {
    pub id: i64,
    pub user_id: i64,
    pub groupe_id: i64,
    pub informations_supplementaires: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = user_groupes)]
pub struct NewTraineeGroupAssignment {
    pub user_id: i64,
    pub groupe_id: i64,
    pub informations_supplementaires: JsonValue,
}

/// Enrollment row joined with the trainee and group names.
#[derive(Queryable, Serialize, Deserialize, Debug, Clone)]
pub struct TraineeGroupView {
    pub id: i64,
    pub user_id: i64,
    pub groupe_id: i64,
    pub informations_supplementaires: JsonValue,
    pub created_at: DateTime<Utc>,
    pub stagiaire_nom: String,
    pub stagiaire_email: String,
    pub groupe_nom: String,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = user_modules)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TeacherModuleAssignment {
    pub id: i64,
    pub user_id: i64,
    pub module_id: i64,
    pub groupe_id: i64,
    pub informations_supplementaires: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = user_modules)]
pub struct NewTeacherModuleAssignment {
    pub user_id: i64,
    pub module_id: i64,
    pub groupe_id: i64,
    pub informations_supplementaires: JsonValue,
}

/// Teacher-module-group row joined with the three display names.
#[derive(Queryable, Serialize, Deserialize, Debug, Clone)]
pub struct TeacherModuleView {
    pub id: i64,
    pub user_id: i64,
    pub module_id: i64,
    pub groupe_id: i64,
    pub informations_supplementaires: JsonValue,
    pub created_at: DateTime<Utc>,
    pub enseignant_nom: String,
    pub module_nom: String,
    pub groupe_nom: String,
}

/// One trainee entitled to a module through one of their groups.
#[derive(Queryable, Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ModuleStudent {
    pub id: i64,
    pub nom: String,
    pub email: String,
}
