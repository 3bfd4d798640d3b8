use serde::{Deserialize, Serialize};

/// How the unit cost of a counter-style item scales with the purchased count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CounterRule {
    #[default]
    PerUnit,
    /// The first unit is free; every further unit costs one unit cost.
    FirstFree,
    /// The k-th unit costs `1 + step * (k - 1)` unit costs.
    Scaling { step: i64 },
    /// Units above the baseline cost, units missing below it refund.
    Baseline { baseline: u32 },
}

/// Effective value a counter reports for display and downstream rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CounterValue {
    Linear { per_unit: i64 },
    /// Doubles with every unit: base, 2·base, 4·base, ...
    Doubling { base: i64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSpec {
    #[serde(default)]
    pub rule: CounterRule,
    #[serde(default)]
    pub max: Option<u32>,
    #[serde(default)]
    pub value: Option<CounterValue>,
}

/// Number of unit costs charged for `count` purchased units. May be negative
/// for baseline counters below their baseline. Saturates at the `i64` range.
pub fn counter_multiplier(rule: &CounterRule, count: u32) -> i64 {
    let n = i64::from(count);
    match *rule {
        CounterRule::PerUnit => n,
        CounterRule::FirstFree => (n - 1).max(0),
        CounterRule::Scaling { step } => {
            let n = i128::from(n);
            let units = n + i128::from(step) * n * (n - 1).max(0) / 2;
            i64::try_from(units).unwrap_or(if units < 0 { i64::MIN } else { i64::MAX })
        }
        CounterRule::Baseline { baseline } => n - i64::from(baseline),
    }
}

pub fn counter_value(value: &CounterValue, count: u32) -> i64 {
    match *value {
        CounterValue::Linear { per_unit } => per_unit.saturating_mul(i64::from(count)),
        CounterValue::Doubling { base } => {
            if count == 0 {
                0
            } else {
                base.saturating_mul(1i64 << (count - 1).min(62))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_unit_counts_every_unit() {
        assert_eq!(counter_multiplier(&CounterRule::PerUnit, 0), 0);
        assert_eq!(counter_multiplier(&CounterRule::PerUnit, 4), 4);
    }

    #[test]
    fn first_unit_is_free() {
        assert_eq!(counter_multiplier(&CounterRule::FirstFree, 0), 0);
        assert_eq!(counter_multiplier(&CounterRule::FirstFree, 1), 0);
        assert_eq!(counter_multiplier(&CounterRule::FirstFree, 3), 2);
    }

    #[test]
    fn scaling_adds_step_per_extra_unit() {
        let rule = CounterRule::Scaling { step: 1 };
        // 1 + 2 + 3
        assert_eq!(counter_multiplier(&rule, 3), 6);
        assert_eq!(counter_multiplier(&rule, 1), 1);
        assert_eq!(counter_multiplier(&rule, 0), 0);
    }

    #[test]
    fn baseline_flips_sign() {
        let rule = CounterRule::Baseline { baseline: 2 };
        assert_eq!(counter_multiplier(&rule, 0), -2);
        assert_eq!(counter_multiplier(&rule, 2), 0);
        assert_eq!(counter_multiplier(&rule, 5), 3);
    }

    #[test]
    fn doubling_value_at_three_is_four_times_base() {
        let value = CounterValue::Doubling { base: 10 };
        assert_eq!(counter_value(&value, 0), 0);
        assert_eq!(counter_value(&value, 1), 10);
        assert_eq!(counter_value(&value, 2), 20);
        assert_eq!(counter_value(&value, 3), 40);
        assert_eq!(counter_value(&value, 4), 80);
    }

    #[test]
    fn linear_value_scales_with_count() {
        assert_eq!(counter_value(&CounterValue::Linear { per_unit: 3 }, 4), 12);
    }

    #[test]
    fn uncapped_scaling_saturates_instead_of_overflowing() {
        let scaling = CounterRule::Scaling { step: 1 };
        assert_eq!(counter_multiplier(&scaling, 4_000_000_000), 8_000_000_002_000_000_000);
        assert_eq!(counter_multiplier(&CounterRule::Scaling { step: 2 }, 4_000_000_000), i64::MAX);
        assert_eq!(counter_multiplier(&CounterRule::Scaling { step: 3 }, u32::MAX), i64::MAX);
        assert_eq!(counter_value(&CounterValue::Linear { per_unit: i64::MAX }, 2), i64::MAX);
    }
}
