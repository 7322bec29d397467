// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue operations: enqueue, eligibility, state transitions and
//! administrative maintenance.

use chrono::{DateTime, TimeDelta, Utc};
use indica_core::{
    BackoffSchedule, EntryMetadata, IndicaError, NewQueueEntry, Page, PageRequest, Priority,
    PriorityCounts, QueueEntry, QueueFilter, QueueOverview, QueueStatus, ResetSelector,
    StatusCounts, TenantQueueStats, Transition, contact,
};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};

use crate::codec::{enum_col, format_ts, json_col, opt_ts_col, to_json, ts_col};
use crate::database::{CallError, Database, map_call_err, map_tr_err};

const ENTRY_COLUMNS: &str = "id, tenant_id, flow_id, template_id, recipient, sender, content, \
     variables, priority_band, status, trigger_type, trigger_data, retry_count, max_retries, \
     next_retry_at, last_attempt_at, processed_at, attempts_count, queue_position, \
     message_order, scheduled_for, campaign_id, tags, provider_message_id, error_message, \
     created_at, updated_at";

/// Statuses that hold a recipient's place in a flow.
const LIVE_STATUSES: &str = "('pending', 'processing', 'retry')";

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<QueueEntry> {
    let band: i64 = row.get(8)?;
    let priority =
        Priority::from_band(band).ok_or(rusqlite::Error::IntegralValueOutOfRange(8, band))?;
    Ok(QueueEntry {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        flow_id: row.get(2)?,
        template_id: row.get(3)?,
        to: row.get(4)?,
        from: row.get(5)?,
        content: json_col(row, 6)?,
        variables: json_col(row, 7)?,
        priority,
        status: enum_col(row, 9)?,
        trigger: row.get(10)?,
        trigger_data: json_col(row, 11)?,
        retry_count: row.get(12)?,
        max_retries: row.get(13)?,
        next_retry_at: opt_ts_col(row, 14)?,
        last_attempt_at: opt_ts_col(row, 15)?,
        processed_at: opt_ts_col(row, 16)?,
        attempts_count: row.get(17)?,
        queue_position: row.get(18)?,
        metadata: EntryMetadata {
            tags: json_col(row, 22)?,
            message_order: row.get(19)?,
            scheduled_for: opt_ts_col(row, 20)?,
            campaign_id: row.get(21)?,
        },
        provider_message_id: row.get(23)?,
        error_message: row.get(24)?,
        created_at: ts_col(row, 25)?,
        updated_at: ts_col(row, 26)?,
    })
}

fn fetch_entry(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<QueueEntry>> {
    conn.query_row(
        &format!("SELECT {ENTRY_COLUMNS} FROM queue_entries WHERE id = ?1"),
        params![id],
        row_to_entry,
    )
    .optional()
}

fn require_entry(conn: &rusqlite::Connection, id: &str) -> Result<QueueEntry, CallError> {
    fetch_entry(conn, id)?.ok_or_else(|| IndicaError::not_found("queue entry", id).into())
}

fn status_counts(
    conn: &rusqlite::Connection,
    tenant_id: Option<&str>,
) -> rusqlite::Result<StatusCounts> {
    let mut counts = StatusCounts::default();
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM queue_entries
         WHERE ?1 IS NULL OR tenant_id = ?1
         GROUP BY status",
    )?;
    let rows = stmt.query_map(params![tenant_id], |row| {
        Ok((enum_col::<QueueStatus>(row, 0)?, row.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (status, count) = row?;
        counts.add(status, count as u64);
    }
    Ok(counts)
}

/// Persists a new entry as `pending`.
///
/// The recipient is normalized and validated first. Flow entries are
/// rejected with a conflict when the same step is already live for the
/// recipient. The queue position is the band's last position plus one, or
/// `band * 1000 + 1` for an empty band.
pub async fn enqueue(db: &Database, entry: NewQueueEntry) -> Result<QueueEntry, IndicaError> {
    let to = contact::canonicalize(&entry.to)?;
    if entry.tenant_id.trim().is_empty() {
        return Err(IndicaError::Validation("tenant_id must not be empty".into()));
    }
    if entry.trigger.trim().is_empty() {
        return Err(IndicaError::Validation("trigger must not be empty".into()));
    }
    if entry.content.body.trim().is_empty() {
        return Err(IndicaError::Validation(
            "message body must not be empty".into(),
        ));
    }
    if entry.max_retries == 0 {
        return Err(IndicaError::Validation(
            "max_retries must be at least 1".into(),
        ));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = format_ts(Utc::now());
    let content = to_json(&entry.content)?;
    let variables = to_json(&entry.variables)?;
    let trigger_data = to_json(&entry.trigger_data)?;
    let tags = to_json(&entry.metadata.tags)?;
    let band = entry.priority.band();
    let message_order = entry.metadata.message_order;
    let scheduled_for = entry.metadata.scheduled_for.map(format_ts);
    let campaign_id = entry
        .metadata
        .campaign_id
        .clone()
        .or_else(|| entry.trigger_data.campaign_id.clone());
    let NewQueueEntry {
        tenant_id,
        flow_id,
        template_id,
        from,
        trigger,
        max_retries,
        ..
    } = entry;

    db.connection()
        .call(move |conn| -> Result<QueueEntry, CallError> {
            let tx = conn.transaction()?;

            if let (Some(flow_id), Some(order)) = (&flow_id, message_order) {
                let live: bool = tx.query_row(
                    &format!(
                        "SELECT EXISTS(SELECT 1 FROM queue_entries
                         WHERE flow_id = ?1 AND recipient = ?2 AND message_order = ?3
                           AND status IN {LIVE_STATUSES})"
                    ),
                    params![flow_id, to, order],
                    |row| row.get(0),
                )?;
                if live {
                    return Err(IndicaError::Conflict(format!(
                        "step {order} of flow {flow_id} is already queued for {to}"
                    ))
                    .into());
                }
            }

            let position: i64 = tx.query_row(
                "SELECT COALESCE(MAX(queue_position), ?1) + 1
                 FROM queue_entries WHERE priority_band = ?2",
                params![band * 1000, band],
                |row| row.get(0),
            )?;

            tx.execute(
                "INSERT INTO queue_entries (
                    id, tenant_id, flow_id, template_id, recipient, sender, content,
                    variables, priority_band, status, trigger_type, trigger_data,
                    max_retries, queue_position, message_order, scheduled_for,
                    campaign_id, tags, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'pending', ?10, ?11,
                           ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?18)",
                params![
                    id,
                    tenant_id,
                    flow_id,
                    template_id,
                    to,
                    from,
                    content,
                    variables,
                    band,
                    trigger,
                    trigger_data,
                    max_retries,
                    position,
                    message_order,
                    scheduled_for,
                    campaign_id,
                    tags,
                    now,
                ],
            )?;

            let stored = require_entry(&tx, &id)?;
            tx.commit()?;
            Ok(stored)
        })
        .await
        .map_err(map_call_err)
}

pub async fn get_entry(db: &Database, id: &str) -> Result<Option<QueueEntry>, IndicaError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<QueueEntry>, rusqlite::Error> {
            fetch_entry(conn, &id)
        })
        .await
        .map_err(map_tr_err)
}

/// Entries ready to send at `now`.
///
/// Candidates are `pending`, or `retry` whose `next_retry_at` has passed,
/// with retry budget left and no future `scheduled_for`. A flow entry is
/// only eligible while it holds the lowest live step order of its
/// `(flow, recipient)` group, so step N+1 waits for step N to finish.
pub async fn list_eligible_for_dispatch(
    db: &Database,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<Vec<QueueEntry>, IndicaError> {
    let now = format_ts(now);
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<Vec<QueueEntry>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM queue_entries q
                 WHERE (q.status = 'pending' OR (q.status = 'retry' AND q.next_retry_at <= ?1))
                   AND q.retry_count < q.max_retries
                   AND (q.scheduled_for IS NULL OR q.scheduled_for <= ?1)
                   AND (q.flow_id IS NULL OR q.message_order IS NULL OR q.message_order = (
                        SELECT MIN(g.message_order) FROM queue_entries g
                        WHERE g.flow_id = q.flow_id
                          AND g.recipient = q.recipient
                          AND g.status IN {LIVE_STATUSES}))
                 ORDER BY q.priority_band ASC, q.queue_position ASC, q.created_at ASC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![now, limit], row_to_entry)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Applies a dispatcher state change.
///
/// `processing` may follow `pending` or `retry`; `completed` and `retry`
/// may only follow `processing`; `failed` may follow any live state.
pub async fn transition(
    db: &Database,
    id: &str,
    transition: Transition,
    backoff: &BackoffSchedule,
) -> Result<QueueEntry, IndicaError> {
    let id = id.to_string();
    let backoff = backoff.clone();
    let now = Utc::now();

    db.connection()
        .call(move |conn| -> Result<QueueEntry, CallError> {
            let tx = conn.transaction()?;
            let current = require_entry(&tx, &id)?;
            let target = transition.target();

            let allowed = match target {
                QueueStatus::Processing => {
                    matches!(current.status, QueueStatus::Pending | QueueStatus::Retry)
                }
                QueueStatus::Completed | QueueStatus::Retry => {
                    current.status == QueueStatus::Processing
                }
                QueueStatus::Failed => !current.status.is_terminal(),
                QueueStatus::Pending => false,
            };
            let rejected = || IndicaError::InvalidTransition {
                id: id.clone(),
                from: current.status,
                to: target,
            };
            if !allowed {
                return Err(rejected().into());
            }

            let now_s = format_ts(now);
            match &transition {
                Transition::Processing => tx.execute(
                    "UPDATE queue_entries
                     SET status = 'processing', last_attempt_at = ?2,
                         attempts_count = attempts_count + 1, updated_at = ?2
                     WHERE id = ?1",
                    params![id, now_s],
                )?,
                Transition::Completed {
                    provider_message_id,
                } => tx.execute(
                    "UPDATE queue_entries
                     SET status = 'completed', processed_at = ?2, provider_message_id = ?3,
                         attempts_count = attempts_count + 1, next_retry_at = NULL,
                         error_message = NULL, updated_at = ?2
                     WHERE id = ?1",
                    params![id, now_s, provider_message_id],
                )?,
                Transition::Retry { error } => {
                    let retry_count = current.retry_count + 1;
                    if retry_count > current.max_retries {
                        return Err(rejected().into());
                    }
                    let next_retry_at = TimeDelta::from_std(backoff.delay_for(retry_count))
                        .ok()
                        .and_then(|delay| now.checked_add_signed(delay))
                        .ok_or_else(|| {
                            IndicaError::Internal(format!(
                                "retry delay for attempt {retry_count} is out of range"
                            ))
                        })?;
                    tx.execute(
                        "UPDATE queue_entries
                         SET status = 'retry', retry_count = ?2,
                             attempts_count = attempts_count + 1, next_retry_at = ?3,
                             error_message = ?4, updated_at = ?5
                         WHERE id = ?1",
                        params![id, retry_count, format_ts(next_retry_at), error, now_s],
                    )?
                }
                Transition::Failed { error } => tx.execute(
                    "UPDATE queue_entries
                     SET status = 'failed', last_attempt_at = ?2, next_retry_at = NULL,
                         error_message = ?3, updated_at = ?2
                     WHERE id = ?1",
                    params![id, now_s, error],
                )?,
            };

            let updated = require_entry(&tx, &id)?;
            tx.commit()?;
            Ok(updated)
        })
        .await
        .map_err(map_call_err)
}

/// Puts an entry back to `pending` with cleared retry bookkeeping.
/// `scheduled_for` is kept.
pub async fn reset_to_pending(db: &Database, id: &str) -> Result<QueueEntry, IndicaError> {
    let id = id.to_string();
    let now = format_ts(Utc::now());
    db.connection()
        .call(move |conn| -> Result<QueueEntry, CallError> {
            let changed = conn.execute(
                "UPDATE queue_entries
                 SET status = 'pending', retry_count = 0, next_retry_at = NULL,
                     error_message = NULL, updated_at = ?2
                 WHERE id = ?1",
                params![id, now],
            )?;
            if changed == 0 {
                return Err(IndicaError::not_found("queue entry", &id).into());
            }
            require_entry(conn, &id)
        })
        .await
        .map_err(map_call_err)
}

/// Lowest-order pending or retry entry of `(flow_id, to)` after `after_order`.
pub async fn next_step_in_group(
    db: &Database,
    flow_id: &str,
    to: &str,
    after_order: u32,
) -> Result<Option<QueueEntry>, IndicaError> {
    let flow_id = flow_id.to_string();
    let to = to.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<QueueEntry>, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM queue_entries
                     WHERE flow_id = ?1 AND recipient = ?2 AND message_order > ?3
                       AND status IN ('pending', 'retry')
                     ORDER BY message_order ASC
                     LIMIT 1"
                ),
                params![flow_id, to, after_order],
                row_to_entry,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Deletes completed and failed entries whose last update is older than
/// `days` before `now`.
pub async fn purge_older_than(
    db: &Database,
    days: u32,
    now: DateTime<Utc>,
) -> Result<u64, IndicaError> {
    let cutoff = format_ts(now - TimeDelta::days(i64::from(days)));
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "DELETE FROM queue_entries
                 WHERE status IN ('completed', 'failed') AND updated_at < ?1",
                params![cutoff],
            )
        })
        .await
        .map(|n| n as u64)
        .map_err(map_tr_err)
}

/// Returns entries stuck in `processing` since before `cutoff` to `pending`.
pub async fn reclaim_stuck(db: &Database, cutoff: DateTime<Utc>) -> Result<u64, IndicaError> {
    let cutoff = format_ts(cutoff);
    let now = format_ts(Utc::now());
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE queue_entries
                 SET status = 'pending',
                     error_message = 'reclaimed after processing timeout',
                     updated_at = ?2
                 WHERE status = 'processing'
                   AND COALESCE(last_attempt_at, updated_at) < ?1",
                params![cutoff, now],
            )
        })
        .await
        .map(|n| n as u64)
        .map_err(map_tr_err)
}

/// Filtered listing, newest first.
pub async fn list_entries(
    db: &Database,
    filter: &QueueFilter,
    page: PageRequest,
) -> Result<Page<QueueEntry>, IndicaError> {
    let mut clauses: Vec<&'static str> = Vec::new();
    let mut args: Vec<Value> = Vec::new();
    if let Some(status) = filter.status {
        clauses.push("status = ?");
        args.push(Value::Text(status.to_string()));
    }
    if let Some(priority) = filter.priority {
        clauses.push("priority_band = ?");
        args.push(Value::Integer(priority.band()));
    }
    if let Some(trigger) = &filter.trigger {
        clauses.push("trigger_type = ?");
        args.push(Value::Text(trigger.clone()));
    }
    if let Some(tenant_id) = &filter.tenant_id {
        clauses.push("tenant_id = ?");
        args.push(Value::Text(tenant_id.clone()));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    let limit = i64::from(page.limit);
    let offset = i64::try_from(page.offset()).unwrap_or(i64::MAX);

    let (items, total) = db
        .connection()
        .call(move |conn| -> Result<(Vec<QueueEntry>, i64), rusqlite::Error> {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM queue_entries{where_sql}"),
                params_from_iter(args.iter()),
                |row| row.get(0),
            )?;
            let mut page_args = args;
            page_args.push(Value::Integer(limit));
            page_args.push(Value::Integer(offset));
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM queue_entries{where_sql}
                 ORDER BY created_at DESC, queue_position DESC
                 LIMIT ? OFFSET ?"
            ))?;
            let items = stmt
                .query_map(params_from_iter(page_args.iter()), row_to_entry)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok((items, total))
        })
        .await
        .map_err(map_tr_err)?;

    Ok(Page::new(items, total as u64, page))
}

/// Queue-wide counts by status and by priority.
pub async fn queue_overview(db: &Database) -> Result<QueueOverview, IndicaError> {
    db.connection()
        .call(|conn| -> Result<QueueOverview, rusqlite::Error> {
            let by_status = status_counts(conn, None)?;
            let mut by_priority = PriorityCounts::default();
            let mut stmt = conn.prepare(
                "SELECT priority_band, COUNT(*) FROM queue_entries GROUP BY priority_band",
            )?;
            let rows =
                stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
            for row in rows {
                let (band, count) = row?;
                if let Some(priority) = Priority::from_band(band) {
                    by_priority.add(priority, count as u64);
                }
            }
            Ok(QueueOverview {
                by_status,
                by_priority,
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Operator override of an entry's status.
///
/// `pending` clears retry bookkeeping, `retry` becomes due immediately,
/// `completed` stamps `processed_at` if unset. `processing` is reserved for
/// the dispatcher.
pub async fn force_status(
    db: &Database,
    id: &str,
    status: QueueStatus,
) -> Result<QueueEntry, IndicaError> {
    let set_sql = match status {
        QueueStatus::Pending => {
            "status = 'pending', retry_count = 0, next_retry_at = NULL, error_message = NULL"
        }
        QueueStatus::Retry => "status = 'retry', next_retry_at = ?2",
        QueueStatus::Completed => {
            "status = 'completed', processed_at = COALESCE(processed_at, ?2), next_retry_at = NULL"
        }
        QueueStatus::Failed => {
            "status = 'failed', next_retry_at = NULL, \
             error_message = COALESCE(error_message, 'failed by operator')"
        }
        QueueStatus::Processing => {
            return Err(IndicaError::Validation(
                "processing can only be entered by the dispatcher".into(),
            ));
        }
    };
    let id = id.to_string();
    let now = format_ts(Utc::now());
    db.connection()
        .call(move |conn| -> Result<QueueEntry, CallError> {
            let changed = conn.execute(
                &format!("UPDATE queue_entries SET {set_sql}, updated_at = ?2 WHERE id = ?1"),
                params![id, now],
            )?;
            if changed == 0 {
                return Err(IndicaError::not_found("queue entry", &id).into());
            }
            require_entry(conn, &id)
        })
        .await
        .map_err(map_call_err)
}

/// Deletes an entry that is pending, awaiting retry, or failed.
pub async fn delete_entry(db: &Database, id: &str) -> Result<(), IndicaError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<(), CallError> {
            let tx = conn.transaction()?;
            let entry = require_entry(&tx, &id)?;
            if matches!(
                entry.status,
                QueueStatus::Processing | QueueStatus::Completed
            ) {
                return Err(IndicaError::Conflict(format!(
                    "entry {id} is {} and cannot be deleted",
                    entry.status
                ))
                .into());
            }
            tx.execute("DELETE FROM queue_entries WHERE id = ?1", params![id])?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_call_err)
}

/// Resets failed and over-retried entries to `pending`.
///
/// Entries whose step is already live again for the same recipient are
/// skipped rather than duplicated.
pub async fn reset_failed(db: &Database, selector: &ResetSelector) -> Result<u64, IndicaError> {
    let mut sql = String::from(
        "UPDATE OR IGNORE queue_entries
         SET status = 'pending', retry_count = 0, next_retry_at = NULL,
             error_message = NULL, updated_at = ?
         WHERE (status = 'failed' OR (status = 'retry' AND retry_count >= max_retries))",
    );
    let mut args: Vec<Value> = vec![Value::Text(format_ts(Utc::now()))];
    if !selector.ids.is_empty() {
        let marks = vec!["?"; selector.ids.len()].join(", ");
        sql.push_str(&format!(" AND id IN ({marks})"));
        args.extend(selector.ids.iter().cloned().map(Value::Text));
    }
    if let Some(tenant_id) = &selector.tenant_id {
        sql.push_str(" AND tenant_id = ?");
        args.push(Value::Text(tenant_id.clone()));
    }
    if let Some(flow_id) = &selector.flow_id {
        sql.push_str(" AND flow_id = ?");
        args.push(Value::Text(flow_id.clone()));
    }

    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(&sql, params_from_iter(args.iter()))
        })
        .await
        .map(|n| n as u64)
        .map_err(map_tr_err)
}

pub async fn tenant_stats(db: &Database, tenant_id: &str) -> Result<TenantQueueStats, IndicaError> {
    let tenant = tenant_id.to_string();
    let counts = db
        .connection()
        .call(move |conn| -> Result<StatusCounts, rusqlite::Error> {
            status_counts(conn, Some(&tenant))
        })
        .await
        .map_err(map_tr_err)?;
    Ok(TenantQueueStats::from_counts(tenant_id, counts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indica_core::{MessageContent, TriggerData};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn adhoc(to: &str, priority: Priority) -> NewQueueEntry {
        NewQueueEntry {
            tenant_id: "tenant-1".into(),
            flow_id: None,
            template_id: None,
            to: to.into(),
            from: "+15550001111".into(),
            content: MessageContent {
                body: "hello".into(),
                ..Default::default()
            },
            variables: Default::default(),
            priority,
            trigger: "manual".into(),
            trigger_data: TriggerData::default(),
            max_retries: 1,
            metadata: EntryMetadata::default(),
        }
    }

    fn flow_step(flow_id: &str, to: &str, order: u32) -> NewQueueEntry {
        let mut entry = adhoc(to, Priority::High);
        entry.flow_id = Some(flow_id.into());
        entry.trigger = "indicator_joined".into();
        entry.metadata.message_order = Some(order);
        entry
    }

    async fn drive_to_processing(db: &Database, id: &str) {
        transition(db, id, Transition::Processing, &BackoffSchedule::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn enqueue_normalizes_and_starts_pending() {
        let (db, _dir) = setup_db().await;

        let entry = enqueue(&db, adhoc("(11) 99999-0000", Priority::Medium))
            .await
            .unwrap();
        assert_eq!(entry.to, "+5511999990000");
        assert_eq!(entry.status, QueueStatus::Pending);
        assert_eq!(entry.retry_count, 0);
        assert_eq!(entry.attempts_count, 0);
        assert_eq!(entry.queue_position, 2001);

        let fetched = get_entry(&db, &entry.id).await.unwrap().unwrap();
        assert_eq!(fetched, entry);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn enqueue_rejects_invalid_contact() {
        let (db, _dir) = setup_db().await;
        let err = enqueue(&db, adhoc("12345", Priority::Low)).await.unwrap_err();
        assert!(matches!(err, IndicaError::Validation(_)));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn positions_are_monotonic_per_band() {
        let (db, _dir) = setup_db().await;

        let h1 = enqueue(&db, adhoc("+5511999990001", Priority::High)).await.unwrap();
        let l1 = enqueue(&db, adhoc("+5511999990002", Priority::Low)).await.unwrap();
        let h2 = enqueue(&db, adhoc("+5511999990003", Priority::High)).await.unwrap();
        assert_eq!(h1.queue_position, 1001);
        assert_eq!(h2.queue_position, 1002);
        assert_eq!(l1.queue_position, 3001);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn eligible_drains_higher_band_first() {
        let (db, _dir) = setup_db().await;

        let low = enqueue(&db, adhoc("+5511999990001", Priority::Low)).await.unwrap();
        let medium = enqueue(&db, adhoc("+5511999990002", Priority::Medium)).await.unwrap();
        let high = enqueue(&db, adhoc("+5511999990003", Priority::High)).await.unwrap();

        let eligible = list_eligible_for_dispatch(&db, 10, Utc::now()).await.unwrap();
        let ids: Vec<&str> = eligible.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![high.id.as_str(), medium.id.as_str(), low.id.as_str()]);

        let limited = list_eligible_for_dispatch(&db, 1, Utc::now()).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, high.id);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn later_steps_wait_for_earlier_ones() {
        let (db, _dir) = setup_db().await;

        let step1 = enqueue(&db, flow_step("flow-1", "+5511999990000", 1)).await.unwrap();
        let step2 = enqueue(&db, flow_step("flow-1", "+5511999990000", 2)).await.unwrap();
        // Another recipient of the same flow is independent.
        let other = enqueue(&db, flow_step("flow-1", "+5511888880000", 1)).await.unwrap();

        let eligible = list_eligible_for_dispatch(&db, 10, Utc::now()).await.unwrap();
        let ids: Vec<&str> = eligible.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![step1.id.as_str(), other.id.as_str()]);

        drive_to_processing(&db, &step1.id).await;
        let eligible = list_eligible_for_dispatch(&db, 10, Utc::now()).await.unwrap();
        assert!(eligible.iter().all(|e| e.id != step2.id));

        transition(
            &db,
            &step1.id,
            Transition::Completed {
                provider_message_id: "SM1".into(),
            },
            &BackoffSchedule::default(),
        )
        .await
        .unwrap();
        let eligible = list_eligible_for_dispatch(&db, 10, Utc::now()).await.unwrap();
        assert!(eligible.iter().any(|e| e.id == step2.id));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn scheduled_entries_wait_until_due() {
        let (db, _dir) = setup_db().await;

        let mut entry = adhoc("+5511999990000", Priority::High);
        let due = Utc::now() + TimeDelta::minutes(10);
        entry.metadata.scheduled_for = Some(due);
        let stored = enqueue(&db, entry).await.unwrap();

        assert!(list_eligible_for_dispatch(&db, 10, Utc::now()).await.unwrap().is_empty());
        let later = list_eligible_for_dispatch(&db, 10, due + TimeDelta::seconds(1))
            .await
            .unwrap();
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].id, stored.id);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_live_step_is_rejected() {
        let (db, _dir) = setup_db().await;

        enqueue(&db, flow_step("flow-1", "+5511999990000", 1)).await.unwrap();
        let err = enqueue(&db, flow_step("flow-1", "11999990000", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, IndicaError::Conflict(_)));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn retry_schedules_backoff_and_becomes_due() {
        let (db, _dir) = setup_db().await;

        let mut new = adhoc("+5511999990000", Priority::Medium);
        new.max_retries = 3;
        let entry = enqueue(&db, new).await.unwrap();
        drive_to_processing(&db, &entry.id).await;

        let retried = transition(
            &db,
            &entry.id,
            Transition::Retry {
                error: "provider 503".into(),
            },
            &BackoffSchedule::default(),
        )
        .await
        .unwrap();
        assert_eq!(retried.status, QueueStatus::Retry);
        assert_eq!(retried.retry_count, 1);
        assert_eq!(retried.attempts_count, 2);
        assert_eq!(retried.error_message.as_deref(), Some("provider 503"));
        let next = retried.next_retry_at.unwrap();
        assert!(next > retried.last_attempt_at.unwrap());
        assert!(retried.retry_count <= retried.max_retries);

        assert!(list_eligible_for_dispatch(&db, 10, Utc::now()).await.unwrap().is_empty());
        let due = list_eligible_for_dispatch(&db, 10, next + TimeDelta::seconds(1))
            .await
            .unwrap();
        assert_eq!(due.len(), 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn terminal_entries_reject_transitions() {
        let (db, _dir) = setup_db().await;

        let entry = enqueue(&db, adhoc("+5511999990000", Priority::Medium)).await.unwrap();
        drive_to_processing(&db, &entry.id).await;
        let done = transition(
            &db,
            &entry.id,
            Transition::Completed {
                provider_message_id: "SM42".into(),
            },
            &BackoffSchedule::default(),
        )
        .await
        .unwrap();
        assert_eq!(done.status, QueueStatus::Completed);
        assert_eq!(done.provider_message_id.as_deref(), Some("SM42"));
        assert!(done.processed_at.is_some());
        assert_eq!(done.attempts_count, 2);

        let err = transition(
            &db,
            &entry.id,
            Transition::Failed {
                error: "late".into(),
            },
            &BackoffSchedule::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            IndicaError::InvalidTransition {
                from: QueueStatus::Completed,
                to: QueueStatus::Failed,
                ..
            }
        ));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn completed_requires_processing() {
        let (db, _dir) = setup_db().await;
        let entry = enqueue(&db, adhoc("+5511999990000", Priority::Medium)).await.unwrap();
        let err = transition(
            &db,
            &entry.id,
            Transition::Completed {
                provider_message_id: "x".into(),
            },
            &BackoffSchedule::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IndicaError::InvalidTransition { .. }));

        let missing = transition(&db, "nope", Transition::Processing, &BackoffSchedule::default())
            .await
            .unwrap_err();
        assert!(matches!(missing, IndicaError::NotFound { .. }));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn next_step_and_reset_to_pending() {
        let (db, _dir) = setup_db().await;

        let step1 = enqueue(&db, flow_step("flow-1", "+5511999990000", 1)).await.unwrap();
        let step2 = enqueue(&db, flow_step("flow-1", "+5511999990000", 2)).await.unwrap();

        let next = next_step_in_group(&db, "flow-1", "+5511999990000", 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.id, step2.id);
        assert!(
            next_step_in_group(&db, "flow-1", "+5511999990000", 2)
                .await
                .unwrap()
                .is_none()
        );

        drive_to_processing(&db, &step1.id).await;
        transition(
            &db,
            &step1.id,
            Transition::Failed {
                error: "rejected".into(),
            },
            &BackoffSchedule::default(),
        )
        .await
        .unwrap();
        let reset = reset_to_pending(&db, &step2.id).await.unwrap();
        assert_eq!(reset.status, QueueStatus::Pending);
        assert_eq!(reset.retry_count, 0);
        assert!(reset.next_retry_at.is_none());

        let err = reset_to_pending(&db, "missing").await.unwrap_err();
        assert!(matches!(err, IndicaError::NotFound { .. }));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn purge_removes_only_old_terminal_entries() {
        let (db, _dir) = setup_db().await;

        let done = enqueue(&db, adhoc("+5511999990001", Priority::Medium)).await.unwrap();
        let pending = enqueue(&db, adhoc("+5511999990002", Priority::Medium)).await.unwrap();
        drive_to_processing(&db, &done.id).await;
        transition(
            &db,
            &done.id,
            Transition::Completed {
                provider_message_id: "SM1".into(),
            },
            &BackoffSchedule::default(),
        )
        .await
        .unwrap();

        assert_eq!(purge_older_than(&db, 30, Utc::now()).await.unwrap(), 0);
        let future = Utc::now() + TimeDelta::days(31);
        assert_eq!(purge_older_than(&db, 30, future).await.unwrap(), 1);
        assert!(get_entry(&db, &done.id).await.unwrap().is_none());
        assert!(get_entry(&db, &pending.id).await.unwrap().is_some());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reclaim_resets_stale_processing() {
        let (db, _dir) = setup_db().await;

        let entry = enqueue(&db, adhoc("+5511999990000", Priority::Medium)).await.unwrap();
        drive_to_processing(&db, &entry.id).await;

        assert_eq!(
            reclaim_stuck(&db, Utc::now() - TimeDelta::minutes(15)).await.unwrap(),
            0
        );
        assert_eq!(
            reclaim_stuck(&db, Utc::now() + TimeDelta::seconds(1)).await.unwrap(),
            1
        );
        let entry = get_entry(&db, &entry.id).await.unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Pending);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_only_non_dispatched() {
        let (db, _dir) = setup_db().await;

        let pending = enqueue(&db, adhoc("+5511999990001", Priority::Medium)).await.unwrap();
        let busy = enqueue(&db, adhoc("+5511999990002", Priority::Medium)).await.unwrap();
        drive_to_processing(&db, &busy.id).await;

        delete_entry(&db, &pending.id).await.unwrap();
        assert!(get_entry(&db, &pending.id).await.unwrap().is_none());

        let err = delete_entry(&db, &busy.id).await.unwrap_err();
        assert!(matches!(err, IndicaError::Conflict(_)));
        let err = delete_entry(&db, "missing").await.unwrap_err();
        assert!(matches!(err, IndicaError::NotFound { .. }));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reset_failed_respects_selector() {
        let (db, _dir) = setup_db().await;

        let mut ids = Vec::new();
        for (i, tenant) in ["t-a", "t-a", "t-b"].iter().enumerate() {
            let mut new = adhoc(&format!("+551199999000{i}"), Priority::Medium);
            new.tenant_id = tenant.to_string();
            let entry = enqueue(&db, new).await.unwrap();
            drive_to_processing(&db, &entry.id).await;
            transition(
                &db,
                &entry.id,
                Transition::Failed {
                    error: "boom".into(),
                },
                &BackoffSchedule::default(),
            )
            .await
            .unwrap();
            ids.push(entry.id);
        }

        let only_first = ResetSelector {
            ids: vec![ids[0].clone()],
            ..Default::default()
        };
        assert_eq!(reset_failed(&db, &only_first).await.unwrap(), 1);

        let tenant_b = ResetSelector {
            tenant_id: Some("t-b".into()),
            ..Default::default()
        };
        assert_eq!(reset_failed(&db, &tenant_b).await.unwrap(), 1);

        assert_eq!(reset_failed(&db, &ResetSelector::default()).await.unwrap(), 1);
        assert_eq!(reset_failed(&db, &ResetSelector::default()).await.unwrap(), 0);

        let entry = get_entry(&db, &ids[1]).await.unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Pending);
        assert!(entry.error_message.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn force_status_overrides_terminal_state() {
        let (db, _dir) = setup_db().await;

        let entry = enqueue(&db, adhoc("+5511999990000", Priority::Medium)).await.unwrap();
        let failed = force_status(&db, &entry.id, QueueStatus::Failed).await.unwrap();
        assert_eq!(failed.status, QueueStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("failed by operator"));

        let pending = force_status(&db, &entry.id, QueueStatus::Pending).await.unwrap();
        assert_eq!(pending.status, QueueStatus::Pending);

        let retry = force_status(&db, &entry.id, QueueStatus::Retry).await.unwrap();
        assert!(retry.next_retry_at.is_some());

        let err = force_status(&db, &entry.id, QueueStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, IndicaError::Validation(_)));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn listing_filters_and_pages() {
        let (db, _dir) = setup_db().await;

        for i in 0..5 {
            let mut new = adhoc(&format!("+551199999000{i}"), Priority::High);
            new.tenant_id = if i % 2 == 0 { "even" } else { "odd" }.into();
            enqueue(&db, new).await.unwrap();
        }
        enqueue(&db, adhoc("+5511999990009", Priority::Low)).await.unwrap();

        let high = QueueFilter {
            priority: Some(Priority::High),
            ..Default::default()
        };
        let page = list_entries(&db, &high, PageRequest::new(1, 2)).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total_pages, 3);

        let last = list_entries(&db, &high, PageRequest::new(3, 2)).await.unwrap();
        assert_eq!(last.items.len(), 1);

        let even = QueueFilter {
            tenant_id: Some("even".into()),
            status: Some(QueueStatus::Pending),
            ..Default::default()
        };
        let page = list_entries(&db, &even, PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 3);

        let overview = queue_overview(&db).await.unwrap();
        assert_eq!(overview.by_status.pending, 6);
        assert_eq!(overview.by_status.total, 6);
        assert_eq!(overview.by_priority.high, 5);
        assert_eq!(overview.by_priority.low, 1);

        let stats = tenant_stats(&db, "odd").await.unwrap();
        assert_eq!(stats.counts.total, 2);
        assert_eq!(stats.success_rate, 0.0);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_enqueues_no_sqlite_busy() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("concurrent_test.db");
        let db = std::sync::Arc::new(Database::open(db_path.to_str().unwrap()).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..10 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                enqueue(&db, adhoc(&format!("+55119999900{i:02}"), Priority::Medium)).await
            }));
        }
        let mut positions = Vec::new();
        for handle in handles {
            let entry = handle.await.unwrap().expect("concurrent enqueue failed");
            positions.push(entry.queue_position);
        }
        positions.sort_unstable();
        positions.dedup();
        assert_eq!(positions.len(), 10, "queue positions must be unique");
    }
}
