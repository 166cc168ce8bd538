pub mod assignment;
pub mod auth;
pub mod course;
pub mod group;
pub mod module;
pub mod note;
pub mod notification;
pub mod profile;
pub mod user;
