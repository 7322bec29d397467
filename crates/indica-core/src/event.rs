// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Business events that drive the flow trigger engine.
//!
//! Each well-known trigger carries its own typed payload; anything else
//! arrives as [`TriggerPayload::Custom`] with a pre-resolved contact and
//! variable map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Variables;

pub const INDICATOR_JOINED: &str = "indicator_joined";
pub const LEAD_INDICATED: &str = "lead_indicated";
pub const REWARD_EARNED: &str = "reward_earned";

/// A participant (indicator) of a referral campaign.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A lead referred by a participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Referral {
    #[serde(default)]
    pub id: Option<String>,
    pub lead_name: String,
    #[serde(default)]
    pub lead_email: Option<String>,
    #[serde(default)]
    pub lead_phone: Option<String>,
    #[serde(default)]
    pub indicator_id: Option<String>,
    #[serde(default)]
    pub indicator_name: Option<String>,
    #[serde(default)]
    pub campaign_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    pub amount: f64,
    pub reward_type: String,
    #[serde(default)]
    pub total_earned: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum TriggerPayload {
    IndicatorJoined {
        participant: Participant,
    },
    LeadIndicated {
        referral: Referral,
    },
    RewardEarned {
        participant: Participant,
        reward: Reward,
    },
    Custom {
        trigger_type: String,
        #[serde(default)]
        contact: Option<String>,
        #[serde(default)]
        variables: Variables,
    },
}

/// An event handed to the trigger engine by the component that owns the
/// participant or referral record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub tenant_id: String,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub event_data: Variables,
    #[serde(flatten)]
    pub payload: TriggerPayload,
}

impl TriggerEvent {
    pub fn new(tenant_id: impl Into<String>, payload: TriggerPayload) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            campaign_id: None,
            event_data: Variables::new(),
            payload,
        }
    }

    pub fn with_campaign(mut self, campaign_id: impl Into<String>) -> Self {
        self.campaign_id = Some(campaign_id.into());
        self
    }

    /// The trigger type string flows subscribe to.
    pub fn trigger_type(&self) -> &str {
        match &self.payload {
            TriggerPayload::IndicatorJoined { .. } => INDICATOR_JOINED,
            TriggerPayload::LeadIndicated { .. } => LEAD_INDICATED,
            TriggerPayload::RewardEarned { .. } => REWARD_EARNED,
            TriggerPayload::Custom { trigger_type, .. } => trigger_type,
        }
    }
}
