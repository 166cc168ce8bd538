use crate::schema::modules;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Queryable, Selectable, Identifiable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = modules)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Module {
    pub id: i64,
    pub nom: String,
    pub informations_supplementaires: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = modules)]
pub struct NewModule {
    pub nom: String,
    pub informations_supplementaires: JsonValue,
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = modules)]
pub struct ModuleChangeset {
    pub nom: Option<String>,
    pub informations_supplementaires: Option<JsonValue>,
    pub updated_at: Option<DateTime<Utc>>,
}
