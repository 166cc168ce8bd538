use crate::schema::groupes;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Queryable, Selectable, Identifiable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = groupes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Group {
    pub id: i64,
    pub nom: String,
    pub capacite: Option<i32>,
    pub statut: Option<String>,
    pub informations_supplementaires: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = groupes)]
pub struct NewGroup {
    pub nom: String,
    pub capacite: Option<i32>,
    pub statut: Option<String>,
    pub informations_supplementaires: JsonValue,
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = groupes)]
pub struct GroupChangeset {
    pub nom: Option<String>,
    pub capacite: Option<Option<i32>>,
    pub statut: Option<String>,
    pub informations_supplementaires: Option<JsonValue>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A group together with the number of trainees currently enrolled.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GroupResponse {
    #[serde(flatten)]
    pub group: Group,
    pub effectif: i64,
}
