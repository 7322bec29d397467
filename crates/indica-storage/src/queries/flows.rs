// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flow definition CRUD, lifecycle and statistics.

use chrono::Utc;
use indica_core::{
    DeliveryOutcome, FlowDefinition, FlowStatistics, FlowStatus, FlowUpdate, IndicaError, NewFlow,
    validate_flow_shape,
};
use rusqlite::{OptionalExtension, Row, params};
use tracing::debug;

use crate::codec::{enum_col, format_ts, json_col, to_json, ts_col};
use crate::database::{CallError, Database, map_call_err, map_tr_err};

const FLOW_COLUMNS: &str = "id, tenant_id, name, audience_tag, triggers, steps, status, \
     sent_count, delivered_count, failed_count, created_at, updated_at";

fn row_to_flow(row: &Row<'_>) -> rusqlite::Result<FlowDefinition> {
    Ok(FlowDefinition {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        audience_tag: row.get(3)?,
        triggers: json_col(row, 4)?,
        steps: json_col(row, 5)?,
        status: enum_col(row, 6)?,
        statistics: FlowStatistics {
            sent: row.get::<_, i64>(7)? as u64,
            delivered: row.get::<_, i64>(8)? as u64,
            failed: row.get::<_, i64>(9)? as u64,
        },
        created_at: ts_col(row, 10)?,
        updated_at: ts_col(row, 11)?,
    })
}

fn fetch_flow(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<FlowDefinition>> {
    conn.query_row(
        &format!("SELECT {FLOW_COLUMNS} FROM flow_definitions WHERE id = ?1"),
        params![id],
        row_to_flow,
    )
    .optional()
}

fn require_flow(conn: &rusqlite::Connection, id: &str) -> Result<FlowDefinition, CallError> {
    fetch_flow(conn, id)?.ok_or_else(|| IndicaError::not_found("flow", id).into())
}

/// Creates a flow in `draft`.
pub async fn create_flow(db: &Database, flow: NewFlow) -> Result<FlowDefinition, IndicaError> {
    if flow.tenant_id.trim().is_empty() {
        return Err(IndicaError::Validation("tenant_id must not be empty".into()));
    }
    if flow.name.trim().is_empty() {
        return Err(IndicaError::Validation("flow name must not be empty".into()));
    }
    validate_flow_shape(&flow.triggers, &flow.steps)?;

    let id = uuid::Uuid::new_v4().to_string();
    let now = format_ts(Utc::now());
    let triggers = to_json(&flow.triggers)?;
    let steps = to_json(&flow.steps)?;

    db.connection()
        .call(move |conn| -> Result<FlowDefinition, CallError> {
            conn.execute(
                "INSERT INTO flow_definitions
                    (id, tenant_id, name, audience_tag, triggers, steps, status,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'draft', ?7, ?7)",
                params![
                    id,
                    flow.tenant_id,
                    flow.name,
                    flow.audience_tag,
                    triggers,
                    steps,
                    now
                ],
            )?;
            require_flow(conn, &id)
        })
        .await
        .map_err(map_call_err)
}

pub async fn get_flow(db: &Database, id: &str) -> Result<Option<FlowDefinition>, IndicaError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<FlowDefinition>, rusqlite::Error> {
            fetch_flow(conn, &id)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_flows(db: &Database, tenant_id: &str) -> Result<Vec<FlowDefinition>, IndicaError> {
    let tenant_id = tenant_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<FlowDefinition>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FLOW_COLUMNS} FROM flow_definitions
                 WHERE tenant_id = ?1 ORDER BY created_at ASC"
            ))?;
            let rows = stmt.query_map(params![tenant_id], row_to_flow)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Applies a partial update. The merged triggers and steps are revalidated;
/// archived flows are read-only.
pub async fn update_flow(
    db: &Database,
    id: &str,
    update: FlowUpdate,
) -> Result<FlowDefinition, IndicaError> {
    let id = id.to_string();
    let now = format_ts(Utc::now());
    db.connection()
        .call(move |conn| -> Result<FlowDefinition, CallError> {
            let tx = conn.transaction()?;
            let mut flow = require_flow(&tx, &id)?;
            if flow.status == FlowStatus::Archived {
                return Err(IndicaError::Conflict(format!("flow {id} is archived")).into());
            }

            if let Some(name) = update.name {
                if name.trim().is_empty() {
                    return Err(
                        IndicaError::Validation("flow name must not be empty".into()).into(),
                    );
                }
                flow.name = name;
            }
            if update.audience_tag.is_some() {
                flow.audience_tag = update.audience_tag;
            }
            if let Some(triggers) = update.triggers {
                flow.triggers = triggers;
            }
            if let Some(steps) = update.steps {
                flow.steps = steps;
            }
            validate_flow_shape(&flow.triggers, &flow.steps)?;

            tx.execute(
                "UPDATE flow_definitions
                 SET name = ?2, audience_tag = ?3, triggers = ?4, steps = ?5, updated_at = ?6
                 WHERE id = ?1",
                params![
                    id,
                    flow.name,
                    flow.audience_tag,
                    to_json(&flow.triggers)?,
                    to_json(&flow.steps)?,
                    now
                ],
            )?;
            let updated = require_flow(&tx, &id)?;
            tx.commit()?;
            Ok(updated)
        })
        .await
        .map_err(map_call_err)
}

/// Moves a flow through its lifecycle, rejecting moves the lifecycle forbids.
pub async fn set_flow_status(
    db: &Database,
    id: &str,
    status: FlowStatus,
) -> Result<FlowDefinition, IndicaError> {
    let id = id.to_string();
    let now = format_ts(Utc::now());
    db.connection()
        .call(move |conn| -> Result<FlowDefinition, CallError> {
            let tx = conn.transaction()?;
            let flow = require_flow(&tx, &id)?;
            if !flow.status.can_transition_to(status) {
                return Err(IndicaError::Conflict(format!(
                    "flow {id} cannot move from {} to {status}",
                    flow.status
                ))
                .into());
            }
            tx.execute(
                "UPDATE flow_definitions SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status.to_string(), now],
            )?;
            let updated = require_flow(&tx, &id)?;
            tx.commit()?;
            Ok(updated)
        })
        .await
        .map_err(map_call_err)
}

/// Deletes a flow that is not active. Queue entries keep their `flow_id`.
pub async fn delete_flow(db: &Database, id: &str) -> Result<(), IndicaError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<(), CallError> {
            let flow = require_flow(conn, &id)?;
            if flow.status == FlowStatus::Active {
                return Err(IndicaError::Conflict(format!(
                    "flow {id} is active; pause or archive it first"
                ))
                .into());
            }
            conn.execute("DELETE FROM flow_definitions WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
        .map_err(map_call_err)
}

/// Active flows of `tenant_id` subscribed to `trigger`.
pub async fn active_flows_for_trigger(
    db: &Database,
    tenant_id: &str,
    trigger: &str,
) -> Result<Vec<FlowDefinition>, IndicaError> {
    let tenant_id = tenant_id.to_string();
    let trigger = trigger.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<FlowDefinition>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FLOW_COLUMNS} FROM flow_definitions
                 WHERE tenant_id = ?1 AND status = 'active'
                   AND EXISTS (SELECT 1 FROM json_each(flow_definitions.triggers)
                               WHERE json_each.value = ?2)
                 ORDER BY created_at ASC"
            ))?;
            let rows = stmt.query_map(params![tenant_id, trigger], row_to_flow)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Bumps one statistics counter. Unknown flows are ignored: the flow may
/// have been deleted after its entries were queued.
pub async fn record_delivery_outcome(
    db: &Database,
    flow_id: &str,
    outcome: DeliveryOutcome,
) -> Result<(), IndicaError> {
    let column = match outcome {
        DeliveryOutcome::Sent => "sent_count",
        DeliveryOutcome::Delivered => "delivered_count",
        DeliveryOutcome::Failed => "failed_count",
    };
    let id = flow_id.to_string();
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                &format!("UPDATE flow_definitions SET {column} = {column} + 1 WHERE id = ?1"),
                params![id],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        debug!(flow_id, %outcome, "statistics update for unknown flow skipped");
    }
    Ok(())
}
