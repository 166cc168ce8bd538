use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Serialize, Deserialize, Debug)]
pub struct CreateModulePayload {
    pub nom: String,
    pub informations_supplementaires: Option<JsonValue>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct UpdateModulePayload {
    pub nom: Option<String>,
    pub informations_supplementaires: Option<JsonValue>,
}
