#![allow(dead_code)]

use rowlayer::{
    bson::DateTime,
    chrono::{TimeZone, Utc},
    prelude::*,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub workspace: String,
    pub owner_id: Option<String>,
    pub deleted_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewTask {
    pub id: String,
    pub title: String,
    pub workspace: String,
    pub owner_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl NewTask {
    pub fn new(id: &str, title: &str, workspace: &str) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            workspace: workspace.into(),
            owner_id: None,
            created_at: None,
        }
    }

    pub fn owned_by(mut self, owner: &str) -> Self {
        self.owner_id = Some(owner.into());
        self
    }

    /// Pins the creation time to `second` seconds past a fixed epoch.
    pub fn created_at(mut self, second: u32) -> Self {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, second).unwrap();
        self.created_at = Some(DateTime::from_chrono(at));
        self
    }
}

impl Entity for Task {
    type Insert = NewTask;

    fn table_name() -> &'static str {
        "tasks"
    }

    fn columns() -> Vec<Column> {
        vec![
            Column::text("id"),
            Column::text("title"),
            Column::text("workspace"),
            Column::text("owner_id"),
            Column::timestamp("deleted_at"),
            Column::timestamp("created_at"),
            Column::timestamp("updated_at"),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub id: String,
    pub name: String,
}

impl Entity for User {
    type Insert = NewUser;

    fn table_name() -> &'static str {
        "users"
    }

    fn columns() -> Vec<Column> {
        vec![
            Column::text("id"),
            Column::text("name"),
            Column::timestamp("created_at"),
            Column::timestamp("updated_at"),
        ]
    }
}

/// An entity keyed by an integer identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub subject: String,
    pub deleted_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewTicket {
    pub id: i64,
    pub subject: String,
}

impl NewTicket {
    pub fn new(id: i64, subject: &str) -> Self {
        Self {
            id,
            subject: subject.into(),
        }
    }
}

impl Entity for Ticket {
    type Insert = NewTicket;

    fn table_name() -> &'static str {
        "tickets"
    }

    fn columns() -> Vec<Column> {
        vec![
            Column::integer("id"),
            Column::text("subject"),
            Column::timestamp("deleted_at"),
            Column::timestamp("created_at"),
            Column::timestamp("updated_at"),
        ]
    }
}

/// Service configuration with a timestamp soft-delete marker on `deleted_at`.
pub fn soft_config() -> ServiceConfig {
    ServiceConfig::builder()
        .soft(SoftDeleteConfig::timestamp("deleted_at"))
        .build()
}

pub fn ids(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(|task| task.id.as_str()).collect()
}

pub fn error_indexes(batch: &BatchInfo) -> Vec<usize> {
    batch.errors.iter().map(|error| error.index).collect()
}
