// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message template catalog.

use chrono::Utc;
use indica_core::{IndicaError, MessageTemplate, NewTemplate, TemplateStatus};
use rusqlite::{OptionalExtension, Row, params};

use crate::codec::{enum_col, format_ts, json_col, to_json, ts_col};
use crate::database::{CallError, Database, map_call_err, map_tr_err};

const TEMPLATE_COLUMNS: &str = "id, tenant_id, name, content, status, created_at, updated_at";

fn row_to_template(row: &Row<'_>) -> rusqlite::Result<MessageTemplate> {
    Ok(MessageTemplate {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        content: json_col(row, 3)?,
        status: enum_col(row, 4)?,
        created_at: ts_col(row, 5)?,
        updated_at: ts_col(row, 6)?,
    })
}

fn fetch_template(
    conn: &rusqlite::Connection,
    id: &str,
) -> rusqlite::Result<Option<MessageTemplate>> {
    conn.query_row(
        &format!("SELECT {TEMPLATE_COLUMNS} FROM message_templates WHERE id = ?1"),
        params![id],
        row_to_template,
    )
    .optional()
}

pub async fn create_template(
    db: &Database,
    template: NewTemplate,
) -> Result<MessageTemplate, IndicaError> {
    if template.name.trim().is_empty() {
        return Err(IndicaError::Validation(
            "template name must not be empty".into(),
        ));
    }
    if template.content.body.trim().is_empty() {
        return Err(IndicaError::Validation(
            "template body must not be empty".into(),
        ));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = format_ts(Utc::now());
    let content = to_json(&template.content)?;
    db.connection()
        .call(move |conn| -> Result<MessageTemplate, CallError> {
            conn.execute(
                "INSERT INTO message_templates
                    (id, tenant_id, name, content, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    id,
                    template.tenant_id,
                    template.name,
                    content,
                    template.status.to_string(),
                    now
                ],
            )?;
            fetch_template(conn, &id)?
                .ok_or_else(|| IndicaError::not_found("template", &id).into())
        })
        .await
        .map_err(map_call_err)
}

pub async fn get_template(db: &Database, id: &str) -> Result<Option<MessageTemplate>, IndicaError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<MessageTemplate>, rusqlite::Error> {
            fetch_template(conn, &id)
        })
        .await
        .map_err(map_tr_err)
}

/// Templates visible to a tenant (its own plus platform-wide), or every
/// template when no tenant is given.
pub async fn list_templates(
    db: &Database,
    tenant_id: Option<&str>,
) -> Result<Vec<MessageTemplate>, IndicaError> {
    let tenant_id = tenant_id.map(str::to_string);
    db.connection()
        .call(move |conn| -> Result<Vec<MessageTemplate>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TEMPLATE_COLUMNS} FROM message_templates
                 WHERE ?1 IS NULL OR tenant_id = ?1 OR tenant_id IS NULL
                 ORDER BY name ASC, created_at ASC"
            ))?;
            let rows = stmt.query_map(params![tenant_id], row_to_template)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_template_status(
    db: &Database,
    id: &str,
    status: TemplateStatus,
) -> Result<MessageTemplate, IndicaError> {
    let id = id.to_string();
    let now = format_ts(Utc::now());
    db.connection()
        .call(move |conn| -> Result<MessageTemplate, CallError> {
            let changed = conn.execute(
                "UPDATE message_templates SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status.to_string(), now],
            )?;
            if changed == 0 {
                return Err(IndicaError::not_found("template", &id).into());
            }
            fetch_template(conn, &id)?
                .ok_or_else(|| IndicaError::not_found("template", &id).into())
        })
        .await
        .map_err(map_call_err)
}

/// Looks a template up by id, visible only within the tenant's own scope or
/// the platform scope.
pub async fn resolve_template(
    db: &Database,
    tenant_id: &str,
    template_id: &str,
) -> Result<Option<MessageTemplate>, IndicaError> {
    let tenant_id = tenant_id.to_string();
    let template_id = template_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<MessageTemplate>, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "SELECT {TEMPLATE_COLUMNS} FROM message_templates
                     WHERE id = ?1 AND (tenant_id = ?2 OR tenant_id IS NULL)"
                ),
                params![template_id, tenant_id],
                row_to_template,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indica_core::MessageContent;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn template(tenant: Option<&str>, name: &str) -> NewTemplate {
        NewTemplate {
            tenant_id: tenant.map(str::to_string),
            name: name.into(),
            content: MessageContent {
                body: "Olá {name}!".into(),
                header: Some("Bem-vindo".into()),
                ..Default::default()
            },
            status: TemplateStatus::Approved,
        }
    }

    #[tokio::test]
    async fn tenant_scope_includes_platform_templates() {
        let (db, _dir) = setup_db().await;

        let platform = create_template(&db, template(None, "platform")).await.unwrap();
        let own = create_template(&db, template(Some("t1"), "own")).await.unwrap();
        let foreign = create_template(&db, template(Some("t2"), "foreign")).await.unwrap();

        let visible = list_templates(&db, Some("t1")).await.unwrap();
        let names: Vec<&str> = visible.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["own", "platform"]);
        assert_eq!(list_templates(&db, None).await.unwrap().len(), 3);

        assert!(resolve_template(&db, "t1", &platform.id).await.unwrap().is_some());
        assert!(resolve_template(&db, "t1", &own.id).await.unwrap().is_some());
        assert!(resolve_template(&db, "t1", &foreign.id).await.unwrap().is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn content_round_trips_and_status_changes() {
        let (db, _dir) = setup_db().await;

        let mut new = template(Some("t1"), "welcome");
        new.status = TemplateStatus::Pending;
        let created = create_template(&db, new.clone()).await.unwrap();
        assert_eq!(created.content, new.content);
        assert_eq!(created.status, TemplateStatus::Pending);

        let approved = set_template_status(&db, &created.id, TemplateStatus::Approved)
            .await
            .unwrap();
        assert_eq!(approved.status, TemplateStatus::Approved);
        assert_eq!(
            get_template(&db, &created.id).await.unwrap().unwrap().status,
            TemplateStatus::Approved
        );

        let err = set_template_status(&db, "missing", TemplateStatus::Rejected)
            .await
            .unwrap_err();
        assert!(matches!(err, IndicaError::NotFound { .. }));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn empty_body_is_rejected() {
        let (db, _dir) = setup_db().await;
        let mut new = template(None, "blank");
        new.content.body = "  ".into();
        let err = create_template(&db, new).await.unwrap_err();
        assert!(matches!(err, IndicaError::Validation(_)));
        db.close().await.unwrap();
    }
}
