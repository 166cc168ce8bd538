use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct CreateNotificationPayload {
    pub user_id: i64,
    #[serde(rename = "type", default = "default_notification_type")]
    pub type_: String,
    pub titre: String,
    pub message: String,
}

fn default_notification_type() -> String {
    "info".to_string()
}
