use crate::model::user::Role;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Serialize, Deserialize, Debug)]
pub struct SignupPayload {
    pub nom: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub informations_supplementaires: Option<JsonValue>,
}

#[derive(Serialize, Deserialize)]
pub struct SigninPayload {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for SigninPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigninPayload")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Role names as typed, or 400 on the first unknown one. Empty means `[stagiaire]`.
pub fn parse_roles(names: &[String]) -> Result<Vec<Role>, String> {
    if names.is_empty() {
        return Ok(vec![Role::Stagiaire]);
    }
    let mut roles = Vec::with_capacity(names.len());
    for name in names {
        let role = name.parse::<Role>()?;
        if !roles.contains(&role) {
            roles.push(role);
        }
    }
    Ok(roles)
}
