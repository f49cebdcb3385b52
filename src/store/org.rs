use sqlx::SqlitePool;
use uuid::Uuid;

use crate::store::{StoreError, now_str, parse_uuid};
use crate::types::{Org, Project};

pub async fn create_org(pool: &SqlitePool, name: &str) -> Result<Org, StoreError> {
    let id = Uuid::new_v4();
    let created_at = now_str();

    sqlx::query("INSERT INTO orgs (id, name, created_at) VALUES (?, ?, ?)")
        .bind(id.to_string())
        .bind(name)
        .bind(&created_at)
        .execute(pool)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Conflict("org name already exists".to_string())
            }
            other => StoreError::Db(other),
        })?;

    Ok(Org {
        id,
        name: name.to_string(),
        created_at,
    })
}

pub async fn get_org(pool: &SqlitePool, org_id: Uuid) -> Result<Option<Org>, StoreError> {
    let row = sqlx::query_as::<_, OrgRow>("SELECT id, name, created_at FROM orgs WHERE id = ?")
        .bind(org_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(OrgRow::try_into).transpose()
}

pub async fn create_project(
    pool: &SqlitePool,
    org_id: Uuid,
    name: &str,
) -> Result<Project, StoreError> {
    let id = Uuid::new_v4();
    let created_at = now_str();

    sqlx::query("INSERT INTO projects (id, org_id, name, created_at) VALUES (?, ?, ?, ?)")
        .bind(id.to_string())
        .bind(org_id.to_string())
        .bind(name)
        .bind(&created_at)
        .execute(pool)
        .await?;

    Ok(Project {
        id,
        org_id,
        name: name.to_string(),
        created_at,
    })
}

pub async fn get_project(
    pool: &SqlitePool,
    project_id: Uuid,
) -> Result<Option<Project>, StoreError> {
    let row = sqlx::query_as::<_, ProjectRow>(
        "SELECT id, org_id, name, created_at FROM projects WHERE id = ?",
    )
    .bind(project_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(ProjectRow::try_into).transpose()
}

#[derive(sqlx::FromRow)]
struct OrgRow {
    id: String,
    name: String,
    created_at: String,
}

impl TryFrom<OrgRow> for Org {
    type Error = StoreError;

    fn try_from(row: OrgRow) -> Result<Self, Self::Error> {
        Ok(Org {
            id: parse_uuid("org id", &row.id)?,
            name: row.name,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: String,
    org_id: String,
    name: String,
    created_at: String,
}

impl TryFrom<ProjectRow> for Project {
    type Error = StoreError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        Ok(Project {
            id: parse_uuid("project id", &row.id)?,
            org_id: parse_uuid("org id", &row.org_id)?,
            name: row.name,
            created_at: row.created_at,
        })
    }
}
