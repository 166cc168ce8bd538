use crate::schema::notifications;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Queryable, Selectable, Identifiable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub type_: String,
    pub titre: String,
    pub message: String,
    pub lu: bool,
    pub informations_supplementaires: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub user_id: i64,
    pub type_: String,
    pub titre: String,
    pub message: String,
    pub informations_supplementaires: JsonValue,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UnreadCountResponse {
    pub count: i64,
}
