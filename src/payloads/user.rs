use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct UpdateUserPayload {
    pub nom: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub informations_supplementaires: Option<JsonValue>,
    /// Replaces the whole role set when present.
    pub roles: Option<Vec<String>>,
}
