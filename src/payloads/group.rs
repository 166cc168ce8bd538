use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use serde_with::rust::double_option;

#[derive(Serialize, Deserialize, Debug)]
pub struct CreateGroupPayload {
    pub nom: String,
    pub capacite: Option<i32>,
    pub statut: Option<String>,
    pub informations_supplementaires: Option<JsonValue>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct UpdateGroupPayload {
    pub nom: Option<String>,
    /// None = no change, Some(None) = unlimited, Some(n) = set
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub capacite: Option<Option<i32>>,
    pub statut: Option<String>,
    pub informations_supplementaires: Option<JsonValue>,
}
