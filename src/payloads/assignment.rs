use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AssignTraineePayload {
    pub user_id: i64,
    pub groupe_id: i64,
    pub informations_supplementaires: Option<JsonValue>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AssignTeacherPayload {
    pub user_id: i64,
    pub module_id: i64,
    pub groupe_id: i64,
    pub informations_supplementaires: Option<JsonValue>,
}
