//! Domain inputs that flow through validation
//!
//! Nullable columns are plain `Option<T>` here; the driver's NULL handling
//! stays inside the repositories that decode rows.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const USER_ROLES: &[&str] = &["admin", "author", "user"];
pub const ARTICLE_STATUSES: &[&str] = &["draft", "published", "archived"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub role: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewArticle {
    pub title: String,
    pub slug: String,
    pub content: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    pub author_id: Uuid,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewComment {
    pub content: String,
    pub article_id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
}
