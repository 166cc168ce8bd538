use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ProfilePayload {
    pub specialite: Option<String>,
    pub numero_identite: Option<String>,
    pub informations_supplementaires: Option<JsonValue>,
}
