use crate::model::note::EvaluationKind;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Serialize, Deserialize, Debug)]
pub struct CreateNotePayload {
    pub stagiaire_id: i64,
    pub module_id: i64,
    pub valeur: f64,
    pub type_evaluation: EvaluationKind,
    pub informations_supplementaires: Option<JsonValue>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct UpdateNotePayload {
    pub valeur: Option<f64>,
    pub type_evaluation: Option<EvaluationKind>,
    pub informations_supplementaires: Option<JsonValue>,
}
