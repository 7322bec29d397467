// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-trigger projection of an event into a recipient, template variables
//! and the identifiers recorded on each queue entry.

use chrono::{DateTime, Utc};
use indica_core::{Participant, Referral, TriggerData, TriggerEvent, TriggerPayload, Variables};
use serde_json::{Value, json};

/// What a flow needs from an event.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// Raw contact string; normalized later.
    pub contact: Option<String>,
    pub variables: Variables,
    pub trigger_data: TriggerData,
}

fn put(vars: &mut Variables, key: &str, value: impl Into<Value>) {
    vars.insert(key.to_string(), value.into());
}

fn put_opt(vars: &mut Variables, key: &str, value: Option<&String>) {
    if let Some(value) = value {
        put(vars, key, value.as_str());
    }
}

fn participant_vars(vars: &mut Variables, participant: &Participant) {
    put(vars, "name", participant.name.as_str());
    put_opt(vars, "email", participant.email.as_ref());
    put_opt(vars, "phone", participant.phone.as_ref());
    put_opt(vars, "participant_id", participant.id.as_ref());
}

fn referral_vars(vars: &mut Variables, referral: &Referral) {
    put(vars, "lead_name", referral.lead_name.as_str());
    put_opt(vars, "lead_email", referral.lead_email.as_ref());
    put_opt(vars, "lead_phone", referral.lead_phone.as_ref());
    put_opt(vars, "indicator_name", referral.indicator_name.as_ref());
    put_opt(vars, "campaign_name", referral.campaign_name.as_ref());
    put_opt(vars, "referral_id", referral.id.as_ref());
}

/// Projects `event` for delivery. `now` supplies the join date when the
/// participant carries no creation time.
pub fn project(event: &TriggerEvent, now: DateTime<Utc>) -> Projection {
    let mut variables = Variables::new();
    let mut trigger_data = TriggerData {
        campaign_id: event.campaign_id.clone(),
        event_data: event.event_data.clone(),
        ..Default::default()
    };

    let contact = match &event.payload {
        TriggerPayload::IndicatorJoined { participant } => {
            participant_vars(&mut variables, participant);
            let joined = participant.created_at.unwrap_or(now);
            put(&mut variables, "join_date", joined.format("%d/%m/%Y").to_string());
            trigger_data.participant_id = participant.id.clone();
            participant.phone.clone()
        }
        TriggerPayload::LeadIndicated { referral } => {
            referral_vars(&mut variables, referral);
            trigger_data.referral_id = referral.id.clone();
            trigger_data.participant_id = referral.indicator_id.clone();
            referral.lead_phone.clone()
        }
        TriggerPayload::RewardEarned {
            participant,
            reward,
        } => {
            participant_vars(&mut variables, participant);
            put(&mut variables, "reward_amount", json!(reward.amount));
            put(&mut variables, "reward_type", reward.reward_type.as_str());
            if let Some(total) = reward.total_earned {
                put(&mut variables, "total_earned", json!(total));
            }
            trigger_data.participant_id = participant.id.clone();
            participant.phone.clone()
        }
        TriggerPayload::Custom {
            contact,
            variables: custom,
            ..
        } => {
            variables.extend(custom.iter().map(|(k, v)| (k.clone(), v.clone())));
            contact.clone()
        }
    };

    for (key, value) in &event.event_data {
        variables.entry(key.clone()).or_insert_with(|| value.clone());
    }
    if let Some(campaign_id) = &event.campaign_id {
        put(&mut variables, "campaign_id", campaign_id.as_str());
    }
    put(&mut variables, "tenant_id", event.tenant_id.as_str());

    Projection {
        contact: contact.filter(|c| !c.trim().is_empty()),
        variables,
        trigger_data,
    }
}
