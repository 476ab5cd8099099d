//! Intervention priorities, executions and session outcomes

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Urgency of a detected pattern or decision
///
/// Ordering is significant: `Critical > High > Medium > Low`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
            Priority::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Known visitor identity used by rule conditions and revenue estimates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Identity {
    /// Stable identifier (email, CRM id)
    pub id: String,
    /// Account tier (`free`, `pro`, `enterprise`, ...)
    pub tier: Option<String>,
    /// Estimated account value
    pub value: Decimal,
}

/// Outcome of a single action inside an execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action: String,
    pub success: bool,
    pub error: Option<String>,
    pub detail: Option<serde_json::Value>,
}

impl ActionResult {
    pub fn ok(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            success: true,
            error: None,
            detail: None,
        }
    }

    pub fn failed(action: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            success: false,
            error: Some(error.into()),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Aggregate status of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Partial,
    Failed,
}

impl ExecutionStatus {
    pub fn from_results(results: &[ActionResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        if succeeded == results.len() && !results.is_empty() {
            ExecutionStatus::Success
        } else if succeeded > 0 {
            ExecutionStatus::Partial
        } else {
            ExecutionStatus::Failed
        }
    }
}

/// Record of one intervention firing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionExecution {
    pub id: Uuid,
    pub rule_id: String,
    pub variant_id: Option<String>,
    pub session_id: String,
    pub tenant_id: String,
    pub intervention_type: String,
    pub emotion: String,
    pub confidence: u8,
    pub results: Vec<ActionResult>,
    pub status: ExecutionStatus,
    pub revenue_impact: Decimal,
    pub executed_at: DateTime<Utc>,
}

/// Terminal outcome of a session, reported by the client or a checkout hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Converted,
    Abandoned,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::Converted => "converted",
            SessionOutcome::Abandoned => "abandoned",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn test_execution_status() {
        let all_ok = vec![ActionResult::ok("a"), ActionResult::ok("b")];
        let mixed = vec![ActionResult::ok("a"), ActionResult::failed("b", "boom")];
        let none_ok = vec![ActionResult::failed("a", "boom")];

        assert_eq!(ExecutionStatus::from_results(&all_ok), ExecutionStatus::Success);
        assert_eq!(ExecutionStatus::from_results(&mixed), ExecutionStatus::Partial);
        assert_eq!(ExecutionStatus::from_results(&none_ok), ExecutionStatus::Failed);
        assert_eq!(ExecutionStatus::from_results(&[]), ExecutionStatus::Failed);
    }

    #[test]
    fn test_priority_serde() {
        let json = serde_json::to_string(&Priority::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
    }
}
