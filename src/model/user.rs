use crate::schema::{roles, user_roles, users};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// The closed set of roles a user can hold. Stored by name in `roles.nom`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Stagiaire,
    Enseignant,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Stagiaire, Role::Enseignant, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Stagiaire => "stagiaire",
            Role::Enseignant => "enseignant",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stagiaire" => Ok(Role::Stagiaire),
            "enseignant" => Ok(Role::Enseignant),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Unknown role '{}'", other)),
        }
    }
}

/// Parses stored role names, dropping any the application does not know.
pub fn role_set_from_names<I, S>(names: I) -> BTreeSet<Role>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter_map(|name| name.as_ref().parse().ok())
        .collect()
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: i64,
    pub nom: String,
    pub email: String,
    pub password: String,
    pub informations_supplementaires: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub nom: String,
    pub email: String,
    pub password: String,
    pub informations_supplementaires: JsonValue,
    // created_at, updated_at have DB defaults
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = users)]
pub struct UserChangeset {
    pub nom: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub informations_supplementaires: Option<JsonValue>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = roles)]
pub struct NewRole<'a> {
    pub nom: &'a str,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = user_roles)]
pub struct NewUserRole {
    pub user_id: i64,
    pub role_id: i32,
    pub informations_supplementaires: JsonValue,
}

/// A user as exposed over the API: never carries the password hash.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserResponse {
    pub id: i64,
    pub nom: String,
    pub email: String,
    pub informations_supplementaires: JsonValue,
    pub roles: BTreeSet<Role>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserResponse {
    pub fn from_user(user: User, roles: BTreeSet<Role>) -> Self {
        UserResponse {
            id: user.id,
            nom: user.nom,
            email: user.email,
            informations_supplementaires: user.informations_supplementaires,
            roles,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SigninResponse {
    pub id: i64,
    pub nom: String,
    pub email: String,
    pub roles: BTreeSet<Role>,
    #[serde(rename = "accessToken")]
    pub access_token: String,
}
