use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::entry::EntryKind;
use crate::fraud::FraudScore;

/// A business event to be recorded in the ledger.
///
/// Produced by an external collaborator (ticketing, the simulator, an HTTP
/// client). The entry factory only checks that the identifying fields are
/// present; it does not judge business semantics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEvent {
    pub kind: EntryKind,
    pub amount: Amount,
    pub subject_id: String,
    pub actor_id: String,
    /// Optional score already known at submission time.
    #[serde(default)]
    pub fraud_score: Option<FraudScore>,
}

impl TransactionEvent {
    pub fn new(
        kind: EntryKind,
        amount: Amount,
        subject_id: impl Into<String>,
        actor_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            amount,
            subject_id: subject_id.into(),
            actor_id: actor_id.into(),
            fraud_score: None,
        }
    }

    pub fn sale(amount: Amount, subject_id: impl Into<String>, actor_id: impl Into<String>) -> Self {
        Self::new(EntryKind::Sale, amount, subject_id, actor_id)
    }

    pub fn with_fraud_score(mut self, score: FraudScore) -> Self {
        self.fraud_score = Some(score);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_wire_event_without_score() {
        let event: TransactionEvent = serde_json::from_str(
            r#"{"kind":"Sale","amount":"250.00","subjectId":"TKT-9","actorId":"UA-AG-002"}"#,
        )
        .unwrap();
        assert_eq!(event, TransactionEvent::sale(Amount::from_minor(25_000), "TKT-9", "UA-AG-002"));
    }

    #[test]
    fn missing_amount_is_rejected() {
        let result = serde_json::from_str::<TransactionEvent>(
            r#"{"kind":"Sale","subjectId":"TKT-9","actorId":"UA-AG-002"}"#,
        );
        assert!(result.is_err());
    }
}
