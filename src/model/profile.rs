use crate::schema::profils;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Queryable, Selectable, Identifiable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = profils)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub photo_url: Option<String>,
    pub photo_public_id: Option<String>,
    pub specialite: Option<String>,
    pub numero_identite: Option<String>,
    pub informations_supplementaires: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Default)]
#[diesel(table_name = profils)]
pub struct NewProfile {
    pub user_id: i64,
    pub photo_url: Option<String>,
    pub photo_public_id: Option<String>,
    pub specialite: Option<String>,
    pub numero_identite: Option<String>,
    pub informations_supplementaires: JsonValue,
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = profils)]
pub struct ProfileChangeset {
    pub specialite: Option<String>,
    pub numero_identite: Option<String>,
    pub informations_supplementaires: Option<JsonValue>,
    pub updated_at: Option<DateTime<Utc>>,
}
