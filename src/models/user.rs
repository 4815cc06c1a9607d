use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    Contributor,
    Viewer,
    Guest,
}

/// Capability checked by the permission gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    View,
    Upload,
    Edit,
    Delete,
    Manage,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::View => "view",
            Capability::Upload => "upload",
            Capability::Edit => "edit",
            Capability::Delete => "delete",
            Capability::Manage => "manage",
        }
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::Contributor => "contributor",
            Role::Viewer => "viewer",
            Role::Guest => "guest",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "admin" => Role::Admin,
            "editor" => Role::Editor,
            "contributor" => Role::Contributor,
            "viewer" => Role::Viewer,
            _ => Role::Guest,
        }
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        use Capability::*;
        match self {
            Role::Admin | Role::Editor => &[View, Upload, Edit, Delete, Manage],
            // Contributors hold edit/delete, limited to their own items by the
            // ownership rule in the permission gate.
            Role::Contributor => &[View, Upload, Edit, Delete],
            Role::Viewer => &[View],
            Role::Guest => &[],
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

/// User profile row, also carries the quota record
#[derive(Debug, Clone, FromRow)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub role: String,
    pub quota_bytes: i64,
    pub used_bytes: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl UserProfile {
    pub fn get_role(&self) -> Role {
        Role::from_str(&self.role)
    }
}

/// Current authenticated user (resolved by the identity middleware)
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub role: Role,
}

impl CurrentUser {
    pub fn can(&self, capability: Capability) -> bool {
        self.role.has(capability)
    }
}
