use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct AdminStats {
    pub stagiaires: i64,
    pub enseignants: i64,
    pub admins: i64,
    pub groupes: i64,
    pub modules: i64,
    pub cours: i64,
    pub inscriptions: i64,
    pub affectations: i64,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct TeacherStats {
    pub modules: i64,
    pub groupes: i64,
    pub cours: i64,
    pub notes_donnees: i64,
    pub stagiaires: i64,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct TraineeStats {
    pub groupes: i64,
    pub modules: i64,
    pub notes: i64,
    pub moyenne: Option<f64>,
    pub notifications_non_lues: i64,
}

/// One section per role the caller holds; sections for other roles are absent.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct DashboardResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<AdminStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enseignant: Option<TeacherStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stagiaire: Option<TraineeStats>,
}
