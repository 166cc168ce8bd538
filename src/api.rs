pub(crate) mod helper;

pub mod auth;
pub mod courses;
pub mod dashboard;
pub mod groups;
pub mod modules;
pub mod notes;
pub mod notifications;
pub mod profiles;
pub mod teacher_modules;
pub mod trainee_groups;
pub mod users;
