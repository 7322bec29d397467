// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The flow trigger engine.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use indica_core::event::{INDICATOR_JOINED, LEAD_INDICATED};
use indica_core::{
    EntryMetadata, FlowDefinition, FlowRepository, FlowStep, IndicaError, NewQueueEntry,
    Participant, Priority, QueueStore, Referral, Reward, TemplateCatalog, TemplateStatus,
    TriggerEvent, TriggerPayload, contact,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::projection::{Projection, project};
use crate::render::{render_content, with_courtesy_line};

/// Values stamped on every entry the engine creates.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Sender identity recorded as the entry's `from`.
    pub sender: String,
    pub default_max_retries: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sender: String::new(),
            default_max_retries: 1,
        }
    }
}

/// Result of one trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TriggerOutcome {
    pub trigger_type: String,
    /// Flows that queued at least one message.
    pub flows_triggered: usize,
    pub messages_added: usize,
    pub errors: Vec<String>,
    pub success: bool,
}

/// Priority for every entry produced by `trigger`.
pub fn priority_for(trigger: &str) -> Priority {
    match trigger {
        INDICATOR_JOINED | LEAD_INDICATED => Priority::High,
        _ => Priority::Medium,
    }
}

/// Expands business events into queue entries for every active flow that
/// subscribes to them.
///
/// Held explicitly by whoever records participants and referrals; there
/// is no process-wide instance.
pub struct FlowTriggerEngine {
    flows: Arc<dyn FlowRepository>,
    templates: Arc<dyn TemplateCatalog>,
    queue: Arc<dyn QueueStore>,
    settings: EngineSettings,
}

impl FlowTriggerEngine {
    pub fn new(
        flows: Arc<dyn FlowRepository>,
        templates: Arc<dyn TemplateCatalog>,
        queue: Arc<dyn QueueStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            flows,
            templates,
            queue,
            settings,
        }
    }

    /// Runs every matching flow for `event`.
    ///
    /// Errors of one flow or step are recorded and never stop the others.
    /// A trigger with no subscribed flow succeeds with zero counts.
    pub async fn process_trigger(&self, event: &TriggerEvent) -> TriggerOutcome {
        let trigger = event.trigger_type().to_string();
        let mut outcome = TriggerOutcome {
            trigger_type: trigger.clone(),
            ..Default::default()
        };

        let flows = match self
            .flows
            .active_flows_for_trigger(&event.tenant_id, &trigger)
            .await
        {
            Ok(flows) => flows,
            Err(e) => {
                warn!(tenant_id = %event.tenant_id, trigger = %trigger, error = %e, "failed to load flows");
                outcome.errors.push(format!("failed to load flows: {e}"));
                return outcome;
            }
        };

        if flows.is_empty() {
            debug!(tenant_id = %event.tenant_id, trigger = %trigger, "no active flow for trigger");
            outcome.success = true;
            return outcome;
        }

        let projection = project(event, Utc::now());
        for flow in &flows {
            let added = self.run_flow(flow, event, &projection, &mut outcome.errors).await;
            if added > 0 {
                outcome.flows_triggered += 1;
                outcome.messages_added += added;
            }
        }

        outcome.success = outcome.errors.is_empty();
        info!(
            tenant_id = %event.tenant_id,
            trigger = %trigger,
            flows_triggered = outcome.flows_triggered,
            messages_added = outcome.messages_added,
            errors = outcome.errors.len(),
            "trigger processed"
        );
        outcome
    }

    /// Enqueues every step of `flow`, returning how many entries were added.
    async fn run_flow(
        &self,
        flow: &FlowDefinition,
        event: &TriggerEvent,
        projection: &Projection,
        errors: &mut Vec<String>,
    ) -> usize {
        let trigger = event.trigger_type();
        let Some(raw_contact) = projection.contact.as_deref() else {
            let message = format!("flow {}: event carries no contact address", flow.id);
            warn!(flow_id = %flow.id, trigger, "{message}");
            errors.push(message);
            return 0;
        };
        let to = match contact::canonicalize(raw_contact) {
            Ok(to) => to,
            Err(e) => {
                let message = format!("flow {}: {e}", flow.id);
                warn!(flow_id = %flow.id, trigger, "{message}");
                errors.push(message);
                return 0;
            }
        };

        let now = Utc::now();
        let mut added = 0;
        for step in flow.ordered_steps() {
            match self.enqueue_step(flow, step, event, projection, &to, now).await {
                Ok(entry_id) => {
                    debug!(flow_id = %flow.id, entry_id = %entry_id, order = step.order, "step queued");
                    added += 1;
                }
                Err(e) => {
                    let message = format!("flow {} step {}: {e}", flow.id, step.order);
                    warn!(flow_id = %flow.id, order = step.order, trigger, "{message}");
                    errors.push(message);
                }
            }
        }
        added
    }

    async fn enqueue_step(
        &self,
        flow: &FlowDefinition,
        step: &FlowStep,
        event: &TriggerEvent,
        projection: &Projection,
        to: &str,
        now: chrono::DateTime<Utc>,
    ) -> Result<String, IndicaError> {
        let trigger = event.trigger_type();
        let template = self
            .templates
            .resolve_template(&event.tenant_id, &step.template_id)
            .await?
            .ok_or_else(|| IndicaError::not_found("template", &step.template_id))?;
        if template.status != TemplateStatus::Approved {
            return Err(IndicaError::Config(format!(
                "template {} is {}, not approved",
                template.id, template.status
            )));
        }

        let delay = i64::try_from(step.delay_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| IndicaError::Validation(format!("step delay too large: {}s", step.delay_secs)))?;
        let content = with_courtesy_line(
            render_content(&template.content, &projection.variables),
            trigger,
        );

        let entry = self
            .queue
            .enqueue(NewQueueEntry {
                tenant_id: event.tenant_id.clone(),
                flow_id: Some(flow.id.clone()),
                template_id: Some(template.id.clone()),
                to: to.to_string(),
                from: self.settings.sender.clone(),
                content,
                variables: projection.variables.clone(),
                priority: priority_for(trigger),
                trigger: trigger.to_string(),
                trigger_data: projection.trigger_data.clone(),
                max_retries: self.settings.default_max_retries,
                metadata: EntryMetadata {
                    tags: vec!["flow".to_string(), trigger.to_string()],
                    message_order: Some(step.order),
                    scheduled_for: Some(now + delay),
                    campaign_id: event.campaign_id.clone(),
                },
            })
            .await?;
        Ok(entry.id)
    }

    pub async fn indicator_joined(
        &self,
        tenant_id: &str,
        participant: Participant,
        campaign_id: Option<String>,
    ) -> TriggerOutcome {
        self.process_trigger(&TriggerEvent {
            tenant_id: tenant_id.to_string(),
            campaign_id,
            event_data: Default::default(),
            payload: TriggerPayload::IndicatorJoined { participant },
        })
        .await
    }

    pub async fn lead_indicated(
        &self,
        tenant_id: &str,
        referral: Referral,
        campaign_id: Option<String>,
    ) -> TriggerOutcome {
        self.process_trigger(&TriggerEvent {
            tenant_id: tenant_id.to_string(),
            campaign_id,
            event_data: Default::default(),
            payload: TriggerPayload::LeadIndicated { referral },
        })
        .await
    }

    pub async fn reward_earned(
        &self,
        tenant_id: &str,
        participant: Participant,
        reward: Reward,
        campaign_id: Option<String>,
    ) -> TriggerOutcome {
        self.process_trigger(&TriggerEvent {
            tenant_id: tenant_id.to_string(),
            campaign_id,
            event_data: Default::default(),
            payload: TriggerPayload::RewardEarned { participant, reward },
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indica_config::model::StorageConfig;
    use indica_core::{
        FlowStatus, MessageContent, NewFlow, NewTemplate, QueueStatus, StorageAdapter,
    };
    use indica_storage::SqliteStorage;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    struct Fixture {
        storage: Arc<SqliteStorage>,
        engine: FlowTriggerEngine,
        _dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(SqliteStorage::new(StorageConfig {
            database_path: dir.path().join("flows.db").to_string_lossy().into_owned(),
            wal_mode: true,
        }));
        storage.initialize().await.unwrap();
        let engine = FlowTriggerEngine::new(
            storage.clone(),
            storage.clone(),
            storage.clone(),
            EngineSettings {
                sender: "+15550001111".into(),
                default_max_retries: 2,
            },
        );
        Fixture {
            storage,
            engine,
            _dir: dir,
        }
    }

    async fn approved_template(storage: &SqliteStorage, body: &str) -> String {
        storage
            .create_template(NewTemplate {
                tenant_id: Some("t1".into()),
                name: body.into(),
                content: MessageContent {
                    body: body.into(),
                    ..Default::default()
                },
                status: TemplateStatus::Approved,
            })
            .await
            .unwrap()
            .id
    }

    async fn active_flow(storage: &SqliteStorage, trigger: &str, templates: &[String]) -> String {
        let flow = storage
            .create_flow(NewFlow {
                tenant_id: "t1".into(),
                name: format!("{trigger} flow"),
                audience_tag: None,
                triggers: vec![trigger.into()],
                steps: templates
                    .iter()
                    .enumerate()
                    .map(|(i, t)| FlowStep {
                        order: i as u32 + 1,
                        template_id: t.clone(),
                        delay_secs: 60 * i as u64,
                    })
                    .collect(),
            })
            .await
            .unwrap();
        storage
            .set_flow_status(&flow.id, FlowStatus::Active)
            .await
            .unwrap();
        flow.id
    }

    fn ana() -> Participant {
        Participant {
            id: Some("p1".into()),
            name: "Ana".into(),
            phone: Some("11999990000".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn no_matching_flow_is_success() {
        let f = fixture().await;
        let outcome = f.engine.indicator_joined("t1", ana(), None).await;
        assert!(logs_contain("no active flow for trigger"));
        assert_eq!(
            outcome,
            TriggerOutcome {
                trigger_type: "indicator_joined".into(),
                flows_triggered: 0,
                messages_added: 0,
                errors: vec![],
                success: true,
            }
        );
    }

    #[tokio::test]
    async fn each_step_becomes_a_rendered_entry() {
        let f = fixture().await;
        let t1 = approved_template(&f.storage, "Olá {name}, bem-vinda!").await;
        let t2 = approved_template(&f.storage, "{name}, já indicou alguém? {unknown}").await;
        let flow_id = active_flow(&f.storage, "indicator_joined", &[t1, t2]).await;

        let outcome = f
            .engine
            .indicator_joined("t1", ana(), Some("c1".into()))
            .await;
        assert!(outcome.success, "{:?}", outcome.errors);
        assert_eq!(outcome.flows_triggered, 1);
        assert_eq!(outcome.messages_added, 2);

        let page = f
            .storage
            .list_entries(&Default::default(), Default::default())
            .await
            .unwrap();
        let mut entries = page.items;
        entries.sort_by_key(|e| e.metadata.message_order);
        assert_eq!(entries.len(), 2);

        let first = &entries[0];
        assert_eq!(first.flow_id.as_deref(), Some(flow_id.as_str()));
        assert_eq!(first.to, "+5511999990000");
        assert_eq!(first.from, "+15550001111");
        assert_eq!(first.status, QueueStatus::Pending);
        assert_eq!(first.priority, Priority::High);
        assert_eq!(first.max_retries, 2);
        assert_eq!(first.metadata.message_order, Some(1));
        assert_eq!(first.metadata.tags, vec!["flow", "indicator_joined"]);
        assert_eq!(first.metadata.campaign_id.as_deref(), Some("c1"));
        assert_eq!(first.trigger_data.participant_id.as_deref(), Some("p1"));
        assert!(first.content.body.starts_with("Olá Ana, bem-vinda!\n\n"));

        let second = &entries[1];
        assert!(second.content.body.starts_with("Ana, já indicou alguém? {unknown}"));
        let gap = second.metadata.scheduled_for.unwrap() - first.metadata.scheduled_for.unwrap();
        assert_eq!(gap.num_seconds(), 60);

        let eligible = f
            .storage
            .list_eligible_for_dispatch(10, Utc::now())
            .await
            .unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, first.id);
    }

    #[tokio::test]
    async fn reward_trigger_is_medium_priority() {
        let f = fixture().await;
        let t = approved_template(&f.storage, "Você ganhou R$ {reward_amount}").await;
        active_flow(&f.storage, "reward_earned", &[t]).await;

        let outcome = f
            .engine
            .reward_earned(
                "t1",
                ana(),
                Reward {
                    amount: 30.0,
                    reward_type: "pix".into(),
                    total_earned: None,
                },
                None,
            )
            .await;
        assert_eq!(outcome.messages_added, 1);

        let entries = f
            .storage
            .list_entries(&Default::default(), Default::default())
            .await
            .unwrap()
            .items;
        assert_eq!(entries[0].priority, Priority::Medium);
        assert!(entries[0].content.body.starts_with("Você ganhou R$ 30"));
    }

    #[tokio::test]
    async fn missing_contact_skips_flow_but_not_others() {
        let f = fixture().await;
        let t = approved_template(&f.storage, "Oi {lead_name}").await;
        active_flow(&f.storage, "lead_indicated", &[t.clone()]).await;
        active_flow(&f.storage, "lead_indicated", &[t]).await;

        let outcome = f
            .engine
            .lead_indicated(
                "t1",
                Referral {
                    lead_name: "Caio".into(),
                    ..Default::default()
                },
                None,
            )
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.errors.len(), 2);
        assert_eq!(outcome.messages_added, 0);
    }

    #[tokio::test]
    async fn unapproved_or_missing_template_is_recorded() {
        let f = fixture().await;
        let approved = approved_template(&f.storage, "passo 1").await;
        let pending = f
            .storage
            .create_template(NewTemplate {
                tenant_id: None,
                name: "draft".into(),
                content: MessageContent {
                    body: "rascunho".into(),
                    ..Default::default()
                },
                status: TemplateStatus::Pending,
            })
            .await
            .unwrap()
            .id;
        active_flow(
            &f.storage,
            "indicator_joined",
            &[approved, pending, "missing".to_string()],
        )
        .await;

        let outcome = f.engine.indicator_joined("t1", ana(), None).await;
        assert_eq!(outcome.messages_added, 1);
        assert_eq!(outcome.flows_triggered, 1);
        assert_eq!(outcome.errors.len(), 2);
        assert!(outcome.errors[0].contains("not approved"));
        assert!(outcome.errors[1].contains("not found"));
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn invalid_contact_is_rejected_before_enqueue() {
        let f = fixture().await;
        let t = approved_template(&f.storage, "oi").await;
        active_flow(&f.storage, "indicator_joined", &[t]).await;

        let mut participant = ana();
        participant.phone = Some("123".into());
        let outcome = f.engine.indicator_joined("t1", participant, None).await;
        assert_eq!(outcome.messages_added, 0);
        assert!(outcome.errors[0].contains("invalid contact"));
    }

    #[test]
    fn priority_follows_trigger() {
        assert_eq!(priority_for("indicator_joined"), Priority::High);
        assert_eq!(priority_for("lead_indicated"), Priority::High);
        assert_eq!(priority_for("reward_earned"), Priority::Medium);
        assert_eq!(priority_for("birthday"), Priority::Medium);
    }
}
