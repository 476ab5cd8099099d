//! Revenue impact estimates

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Share of identity value at stake per emotion; negative marks upsell headroom
const EMOTION_MULTIPLIERS: &[(&str, Decimal)] = &[
    ("rage", dec!(0.8)),
    ("cart_abandonment", dec!(0.75)),
    ("abandonment_intent", dec!(0.7)),
    ("frustration", dec!(0.6)),
    ("cart_hesitation", dec!(0.6)),
    ("price_paralysis", dec!(0.55)),
    ("sticker_shock", dec!(0.5)),
    ("cart_shock", dec!(0.5)),
    ("confusion", dec!(0.4)),
    ("purchase_intent", dec!(0.3)),
    ("delight", dec!(-0.2)),
];

const DEFAULT_MULTIPLIER: Decimal = dec!(0.1);

pub fn emotion_multiplier(emotion: &str) -> Decimal {
    EMOTION_MULTIPLIERS
        .iter()
        .find(|(name, _)| *name == emotion)
        .map(|(_, m)| *m)
        .unwrap_or(DEFAULT_MULTIPLIER)
}

/// `|identity_value * multiplier(emotion)|`
pub fn revenue_impact(identity_value: Decimal, emotion: &str) -> Decimal {
    (identity_value * emotion_multiplier(emotion)).abs()
}
