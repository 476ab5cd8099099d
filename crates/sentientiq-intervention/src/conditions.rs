//! Rule condition evaluation

use rust_decimal::prelude::ToPrimitive;
use sentientiq_common::Identity;
use serde_json::Value;

use crate::rules::{ConditionKind, ConditionOperator, RuleCondition};

/// What a condition can look at
#[derive(Debug, Clone, Default)]
pub struct ConditionContext<'a> {
    pub identity: Option<&'a Identity>,
    pub page_url: Option<&'a str>,
    pub session_age_ms: i64,
    /// Recent emotion labels, oldest first
    pub previous_emotions: &'a [String],
}

/// All conditions must hold; an empty list always passes
pub fn all_satisfied(conditions: &[RuleCondition], ctx: &ConditionContext<'_>) -> bool {
    conditions.iter().all(|c| evaluate(c, ctx))
}

pub fn evaluate(condition: &RuleCondition, ctx: &ConditionContext<'_>) -> bool {
    match condition.kind {
        ConditionKind::IdentityTier => ctx
            .identity
            .and_then(|i| i.tier.as_deref())
            .map(|tier| compare_text(tier, condition.operator, &condition.value))
            .unwrap_or(false),
        ConditionKind::IdentityValue => ctx
            .identity
            .and_then(|i| i.value.to_f64())
            .map(|value| compare_number(value, condition.operator, &condition.value))
            .unwrap_or(false),
        ConditionKind::PageUrl => ctx
            .page_url
            .map(|url| compare_text(url, condition.operator, &condition.value))
            .unwrap_or(false),
        ConditionKind::TimeOnSite => {
            let seconds = ctx.session_age_ms as f64 / 1_000.0;
            compare_number(seconds, condition.operator, &condition.value)
        }
        ConditionKind::PreviousEmotion => ctx
            .previous_emotions
            .iter()
            .any(|emotion| compare_text(emotion, condition.operator, &condition.value)),
    }
}

fn compare_text(actual: &str, operator: ConditionOperator, expected: &Value) -> bool {
    match operator {
        ConditionOperator::Equals => expected.as_str() == Some(actual),
        ConditionOperator::Contains => expected
            .as_str()
            .map(|needle| actual.contains(needle))
            .unwrap_or(false),
        ConditionOperator::In => expected
            .as_array()
            .map(|items| items.iter().any(|v| v.as_str() == Some(actual)))
            .unwrap_or(false),
        ConditionOperator::GreaterThan | ConditionOperator::LessThan => actual
            .parse::<f64>()
            .map(|n| compare_number(n, operator, expected))
            .unwrap_or(false),
    }
}

fn compare_number(actual: f64, operator: ConditionOperator, expected: &Value) -> bool {
    match operator {
        ConditionOperator::Equals => as_number(expected)
            .map(|n| (actual - n).abs() < f64::EPSILON)
            .unwrap_or(false),
        ConditionOperator::GreaterThan => as_number(expected).map(|n| actual > n).unwrap_or(false),
        ConditionOperator::LessThan => as_number(expected).map(|n| actual < n).unwrap_or(false),
        ConditionOperator::In => expected
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(as_number)
                    .any(|n| (actual - n).abs() < f64::EPSILON)
            })
            .unwrap_or(false),
        ConditionOperator::Contains => false,
    }
}

/// Numbers may arrive as JSON numbers or numeric strings
fn as_number(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn condition(kind: ConditionKind, operator: ConditionOperator, value: Value) -> RuleCondition {
        RuleCondition {
            kind,
            operator,
            value,
        }
    }

    #[test]
    fn test_identity_conditions() {
        let identity = Identity {
            id: "vip@example.com".into(),
            tier: Some("enterprise".into()),
            value: dec!(12000),
        };
        let ctx = ConditionContext {
            identity: Some(&identity),
            ..Default::default()
        };

        assert!(evaluate(
            &condition(ConditionKind::IdentityTier, ConditionOperator::In, json!(["pro", "enterprise"])),
            &ctx
        ));
        assert!(evaluate(
            &condition(ConditionKind::IdentityValue, ConditionOperator::GreaterThan, json!(10000)),
            &ctx
        ));
        assert!(!evaluate(
            &condition(ConditionKind::IdentityValue, ConditionOperator::LessThan, json!("5000")),
            &ctx
        ));
    }

    #[test]
    fn test_anonymous_identity_fails_identity_conditions() {
        let ctx = ConditionContext::default();
        assert!(!evaluate(
            &condition(ConditionKind::IdentityTier, ConditionOperator::Equals, json!("pro")),
            &ctx
        ));
    }

    #[test]
    fn test_page_and_time_conditions() {
        let ctx = ConditionContext {
            page_url: Some("https://shop.example.com/pricing"),
            session_age_ms: 45_000,
            ..Default::default()
        };

        assert!(evaluate(
            &condition(ConditionKind::PageUrl, ConditionOperator::Contains, json!("/pricing")),
            &ctx
        ));
        assert!(evaluate(
            &condition(ConditionKind::TimeOnSite, ConditionOperator::GreaterThan, json!(30)),
            &ctx
        ));
        assert!(!evaluate(
            &condition(ConditionKind::TimeOnSite, ConditionOperator::LessThan, json!(30)),
            &ctx
        ));
    }

    #[test]
    fn test_previous_emotion() {
        let history = vec!["reading".to_string(), "sticker_shock".to_string()];
        let ctx = ConditionContext {
            previous_emotions: &history,
            ..Default::default()
        };
        let conditions = vec![
            condition(ConditionKind::PreviousEmotion, ConditionOperator::Equals, json!("sticker_shock")),
            condition(ConditionKind::PreviousEmotion, ConditionOperator::Contains, json!("read")),
        ];
        assert!(all_satisfied(&conditions, &ctx));
        assert!(all_satisfied(&[], &ctx));
    }
}
