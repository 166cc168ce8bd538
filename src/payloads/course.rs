use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct UpdateCoursePayload {
    pub titre: Option<String>,
    pub description: Option<String>,
    pub informations_supplementaires: Option<JsonValue>,
}
