// SPDX-License-Identifier: MIT
//
// Copyright (c) 2025 Curation Collective
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors decoding inbound front-end events
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("malformed callback data: {0}")]
    MalformedCallback(String),
}

/// Per-user conversation state used by the front-end between messages.
///
/// Transitions are explicit: the state only moves through `next` and
/// invalid triggers leave it unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConversationState {
    /// No multi-step flow in progress
    #[default]
    Idle,
    /// The user was asked for the account name to delegate
    AwaitingAccountName,
    /// The user was asked for a power percentage
    AwaitingPowerValue,
    /// The user was shown the curation rules and asked to consent
    AwaitingCurationConsent,
}

/// Triggers that move the conversation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTrigger {
    /// The user started credential enrollment
    BeginEnrollment,
    /// An account name arrived while one was awaited
    AccountNameProvided,
    /// The user started a power change
    BeginPowerUpdate,
    /// A power value arrived while one was awaited
    PowerValueProvided,
    /// The user asked to become a curator
    BeginCurationConsent,
    /// The user consented to the curation rules
    ConsentGiven,
    /// Any flow was abandoned
    Cancel,
}

impl ConversationState {
    /// Transition table. Unexpected triggers keep the current state.
    pub fn next(self, trigger: SessionTrigger) -> ConversationState {
        use ConversationState::*;
        use SessionTrigger::*;
        match (self, trigger) {
            (_, BeginEnrollment) => AwaitingAccountName,
            (_, BeginPowerUpdate) => AwaitingPowerValue,
            (_, BeginCurationConsent) => AwaitingCurationConsent,
            (AwaitingAccountName, AccountNameProvided) => Idle,
            (AwaitingPowerValue, PowerValueProvided) => Idle,
            (AwaitingCurationConsent, ConsentGiven) => Idle,
            (_, Cancel) => Idle,
            (state, _) => state,
        }
    }
}

/// The action half of a curator callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseAction {
    Approve,
    Reject,
}

impl ResponseAction {
    /// Whether this action counts as an approval
    pub fn is_approve(self) -> bool {
        matches!(self, ResponseAction::Approve)
    }
}

/// A curator's button press, decoded once at the gateway boundary.
///
/// The wire form is `<proposal_id>_<good|bad>`; nothing downstream of
/// this type ever parses callback strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseEvent {
    pub proposal_id: i64,
    pub action: ResponseAction,
}

impl ResponseEvent {
    /// Decode wire-format callback data
    pub fn decode(data: &str) -> Result<Self, SessionError> {
        let (id_part, action_part) = data
            .split_once('_')
            .ok_or_else(|| SessionError::MalformedCallback(data.to_string()))?;
        let proposal_id: i64 = id_part
            .parse()
            .map_err(|_| SessionError::MalformedCallback(data.to_string()))?;
        let action = match action_part {
            "good" => ResponseAction::Approve,
            "bad" => ResponseAction::Reject,
            _ => return Err(SessionError::MalformedCallback(data.to_string())),
        };
        Ok(Self {
            proposal_id,
            action,
        })
    }

    /// Encode back to the wire form for outbound button markup
    pub fn encode(&self) -> String {
        let action = match self.action {
            ResponseAction::Approve => "good",
            ResponseAction::Reject => "bad",
        };
        format!("{}_{}", self.proposal_id, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_round_trip() {
        let event = ResponseEvent::decode("42_good").unwrap();
        assert_eq!(event.proposal_id, 42);
        assert_eq!(event.action, ResponseAction::Approve);
        assert_eq!(event.encode(), "42_good");

        let reject = ResponseEvent::decode("7_bad").unwrap();
        assert_eq!(reject.action, ResponseAction::Reject);
    }

    #[test]
    fn malformed_callbacks_are_rejected() {
        for data in ["", "nounderscore", "x_good", "12_maybe", "_good"] {
            assert!(ResponseEvent::decode(data).is_err(), "accepted {:?}", data);
        }
    }

    #[test]
    fn state_transitions_follow_table() {
        use ConversationState::*;
        use SessionTrigger::*;

        assert_eq!(Idle.next(BeginEnrollment), AwaitingAccountName);
        assert_eq!(AwaitingAccountName.next(AccountNameProvided), Idle);
        assert_eq!(Idle.next(BeginPowerUpdate), AwaitingPowerValue);
        assert_eq!(AwaitingPowerValue.next(PowerValueProvided), Idle);
        assert_eq!(Idle.next(BeginCurationConsent), AwaitingCurationConsent);
        assert_eq!(AwaitingCurationConsent.next(ConsentGiven), Idle);
    }

    #[test]
    fn unexpected_triggers_hold_state() {
        use ConversationState::*;
        use SessionTrigger::*;

        // A stray consent or value outside its flow changes nothing
        assert_eq!(Idle.next(ConsentGiven), Idle);
        assert_eq!(AwaitingAccountName.next(PowerValueProvided), AwaitingAccountName);
        // Starting a new flow from the middle of another is allowed
        assert_eq!(AwaitingAccountName.next(BeginPowerUpdate), AwaitingPowerValue);
        // Cancel always resets
        assert_eq!(AwaitingCurationConsent.next(Cancel), Idle);
    }
}
