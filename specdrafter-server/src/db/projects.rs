//! Project and conversation log operations

use serde_json::{Map, Value};
use specdrafter_common::models::ProjectUpdate;
use specdrafter_common::phase::{self, PhaseAdvance};
use specdrafter_common::{time, ConversationEntry, Error, Phase, Project, Result, Role};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;

fn encode_json<T: serde::Serialize>(value: &T, what: &str) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::Internal(format!("Failed to serialize {}: {}", what, e)))
}

fn decode_json<T: serde::de::DeserializeOwned>(value: &str, what: &str) -> Result<T> {
    serde_json::from_str(value)
        .map_err(|e| Error::Internal(format!("Failed to deserialize {}: {}", what, e)))
}

async fn insert_entry(
    conn: &mut SqliteConnection,
    project_id: &str,
    entry: &ConversationEntry,
) -> Result<()> {
    let data = entry
        .data
        .as_ref()
        .map(|d| encode_json(d, "entry data"))
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO conversation_entries (project_id, role, content, data, timestamp)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(project_id)
    .bind(entry.role.as_str())
    .bind(&entry.content)
    .bind(data)
    .bind(time::to_storage(&entry.timestamp))
    .execute(conn)
    .await?;

    Ok(())
}

fn entry_from_row(row: &SqliteRow) -> Result<ConversationEntry> {
    let role: String = row.get("role");
    let data: Option<String> = row.get("data");
    let timestamp: String = row.get("timestamp");

    Ok(ConversationEntry {
        role: role.parse::<Role>()?,
        content: row.get("content"),
        data: data.map(|d| decode_json(&d, "entry data")).transpose()?,
        timestamp: time::from_storage(&timestamp)?,
    })
}

fn project_from_row(row: &SqliteRow, history: Vec<ConversationEntry>) -> Result<Project> {
    let phase: String = row.get("current_phase");
    let requirements: String = row.get("requirements");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Project {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        conversation_history: history,
        current_phase: phase
            .parse::<Phase>()
            .map_err(|e| Error::Internal(e.to_string()))?,
        requirements: decode_json::<Map<String, Value>>(&requirements, "requirements")?,
        created_at: time::from_storage(&created_at)?,
        updated_at: time::from_storage(&updated_at)?,
    })
}

async fn load_history(pool: &SqlitePool, project_id: &str) -> Result<Vec<ConversationEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT role, content, data, timestamp
        FROM conversation_entries
        WHERE project_id = ?
        ORDER BY seq
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(entry_from_row).collect()
}

/// Insert a new project together with any entries it already carries
pub async fn create_project(pool: &SqlitePool, project: &Project) -> Result<()> {
    let requirements = encode_json(&project.requirements, "requirements")?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO projects (id, name, description, current_phase, requirements, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&project.id)
    .bind(&project.name)
    .bind(&project.description)
    .bind(project.current_phase.as_str())
    .bind(&requirements)
    .bind(time::to_storage(&project.created_at))
    .bind(time::to_storage(&project.updated_at))
    .execute(&mut *tx)
    .await?;

    for entry in &project.conversation_history {
        insert_entry(&mut tx, &project.id, entry).await?;
    }

    tx.commit().await?;

    tracing::info!(project_id = %project.id, "Created project");
    Ok(())
}

/// Load a project with its full conversation log
pub async fn get_project(pool: &SqlitePool, project_id: &str) -> Result<Option<Project>> {
    let row = sqlx::query(
        r#"
        SELECT id, name, description, current_phase, requirements, created_at, updated_at
        FROM projects
        WHERE id = ?
        "#,
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let history = load_history(pool, project_id).await?;
            Ok(Some(project_from_row(&row, history)?))
        }
        None => Ok(None),
    }
}

/// All projects, most recently updated first
pub async fn list_projects(pool: &SqlitePool) -> Result<Vec<Project>> {
    let rows = sqlx::query(
        r#"
        SELECT id, name, description, current_phase, requirements, created_at, updated_at
        FROM projects
        ORDER BY updated_at DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let entry_rows = sqlx::query(
        "SELECT project_id, role, content, data, timestamp FROM conversation_entries ORDER BY seq",
    )
    .fetch_all(pool)
    .await?;

    let mut histories: HashMap<String, Vec<ConversationEntry>> = HashMap::new();
    for row in &entry_rows {
        let project_id: String = row.get("project_id");
        histories
            .entry(project_id)
            .or_default()
            .push(entry_from_row(row)?);
    }

    rows.iter()
        .map(|row| {
            let id: String = row.get("id");
            let history = histories.remove(&id).unwrap_or_default();
            project_from_row(row, history)
        })
        .collect()
}

/// Apply a partial update; `None` when the project does not exist
///
/// Phase is not updatable here; it only moves through [`advance_phase`].
/// A blank name is rejected before anything is written.
pub async fn update_project(
    pool: &SqlitePool,
    project_id: &str,
    update: &ProjectUpdate,
) -> Result<Option<Project>> {
    if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(Error::InvalidInput("Project name cannot be empty".to_string()));
    }

    let requirements = update
        .requirements
        .as_ref()
        .map(|r| encode_json(r, "requirements"))
        .transpose()?;

    let result = sqlx::query(
        r#"
        UPDATE projects SET
            name = COALESCE(?, name),
            description = COALESCE(?, description),
            requirements = COALESCE(?, requirements),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&update.name)
    .bind(&update.description)
    .bind(requirements)
    .bind(time::to_storage(&time::now()))
    .bind(project_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    get_project(pool, project_id).await
}

pub async fn rename_project(
    pool: &SqlitePool,
    project_id: &str,
    name: &str,
) -> Result<Option<Project>> {
    let update = ProjectUpdate {
        name: Some(name.to_string()),
        ..Default::default()
    };
    update_project(pool, project_id, &update).await
}

/// Delete a project and its log; returns whether a row was removed
pub async fn delete_project(pool: &SqlitePool, project_id: &str) -> Result<bool> {
    let mut tx = pool.begin().await?;

    // Explicit so the cascade does not depend on the foreign_keys pragma
    sqlx::query("DELETE FROM conversation_entries WHERE project_id = ?")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(result.rows_affected() > 0)
}

/// Append one entry to a project's log and touch `updated_at`
pub async fn append_entry(
    pool: &SqlitePool,
    project_id: &str,
    entry: &ConversationEntry,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query("UPDATE projects SET updated_at = ? WHERE id = ?")
        .bind(time::to_storage(&time::now()))
        .bind(project_id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Project {}", project_id)));
    }

    insert_entry(&mut tx, project_id, entry).await?;
    tx.commit().await?;

    tracing::debug!(project_id, role = entry.role.as_str(), "Appended conversation entry");
    Ok(())
}

/// Advance the stored phase by one step
///
/// The update is conditional on the phase read, so a racing advance cannot
/// move the project more than one step per call or backwards.
pub async fn advance_phase(pool: &SqlitePool, project_id: &str) -> Result<PhaseAdvance> {
    let current: Option<String> =
        sqlx::query_scalar("SELECT current_phase FROM projects WHERE id = ?")
            .bind(project_id)
            .fetch_optional(pool)
            .await?;

    let current = current.ok_or_else(|| Error::NotFound(format!("Project {}", project_id)))?;

    let outcome = phase::advance(&current);
    if let PhaseAdvance::Advanced { from, to } = &outcome {
        let result = sqlx::query(
            "UPDATE projects SET current_phase = ?, updated_at = ? WHERE id = ? AND current_phase = ?",
        )
        .bind(to.as_str())
        .bind(time::to_storage(&time::now()))
        .bind(project_id)
        .bind(from.as_str())
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::warn!(project_id, from = %from, "Phase changed concurrently; advance skipped");
        } else {
            tracing::info!(project_id, from = %from, to = %to, "Advanced project phase");
        }
    }

    Ok(outcome)
}
