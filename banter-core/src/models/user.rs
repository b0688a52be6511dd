use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: String,
    pub tenant_id: String,
    pub display_name: String,
    pub deleted: bool,
}
