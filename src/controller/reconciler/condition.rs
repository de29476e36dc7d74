//! # Condition
//!
//! Ready condition surfaced as annotations on the identity ConfigMap.
//!
//! The transition time only moves when status or reason changes, so a
//! repeated failure with a different message does not cause a write.

use crate::constants::{
    LAST_TRANSITION_ANNOTATION, MESSAGE_ANNOTATION, READY_ANNOTATION, REASON_ANNOTATION,
};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;

pub const REASON_BOOTSTRAPPED: &str = "Bootstrapped";
pub const REASON_WAITING_FOR_TOKEN: &str = "WaitingForToken";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub ready: bool,
    pub reason: String,
    pub message: String,
    /// RFC 3339 timestamp of the last status/reason change
    pub last_transition_time: String,
}

impl Condition {
    /// Read the condition from object annotations, if present
    #[must_use]
    pub fn from_annotations(annotations: Option<&BTreeMap<String, String>>) -> Option<Self> {
        let annotations = annotations?;
        let ready = match annotations.get(READY_ANNOTATION)?.as_str() {
            "True" => true,
            "False" => false,
            _ => return None,
        };
        Some(Self {
            ready,
            reason: annotations.get(REASON_ANNOTATION).cloned().unwrap_or_default(),
            message: annotations
                .get(MESSAGE_ANNOTATION)
                .cloned()
                .unwrap_or_default(),
            last_transition_time: annotations
                .get(LAST_TRANSITION_ANNOTATION)
                .cloned()
                .unwrap_or_default(),
        })
    }

    /// Build the next condition, keeping the previous transition time when
    /// status and reason are unchanged
    #[must_use]
    pub fn next(
        previous: Option<&Self>,
        ready: bool,
        reason: &str,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let last_transition_time = match previous {
            Some(p) if p.ready == ready && p.reason == reason && !p.last_transition_time.is_empty() => {
                p.last_transition_time.clone()
            }
            _ => now.to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        Self {
            ready,
            reason: reason.to_string(),
            message: message.into(),
            last_transition_time,
        }
    }

    /// Same status and reason
    #[must_use]
    pub fn same_state(&self, other: &Self) -> bool {
        self.ready == other.ready && self.reason == other.reason
    }

    /// Write all condition annotations
    pub fn write_to(&self, annotations: &mut BTreeMap<String, String>) {
        let status = if self.ready { "True" } else { "False" };
        annotations.insert(READY_ANNOTATION.to_string(), status.to_string());
        annotations.insert(REASON_ANNOTATION.to_string(), self.reason.clone());
        annotations.insert(MESSAGE_ANNOTATION.to_string(), self.message.clone());
        annotations.insert(
            LAST_TRANSITION_ANNOTATION.to_string(),
            self.last_transition_time.clone(),
        );
    }
}
