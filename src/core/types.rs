use serde::Serialize;

use super::error::ParameterError;

/// Months between two compounding events or two contributions.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Interval {
    Monthly,
    Quarterly,
    HalfYearly,
    Yearly,
}

impl Interval {
    pub const fn months(self) -> u32 {
        match self {
            Interval::Monthly => 1,
            Interval::Quarterly => 3,
            Interval::HalfYearly => 6,
            Interval::Yearly => 12,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Interval::Monthly => "monthly",
            Interval::Quarterly => "quarterly",
            Interval::HalfYearly => "half-yearly",
            Interval::Yearly => "yearly",
        }
    }

    /// True when `month` (1-indexed) closes one of these intervals.
    pub const fn ends_in(self, month: u32) -> bool {
        month % self.months() == 0
    }

    /// True when `month` (1-indexed) opens one of these intervals. Month 0 opens
    /// nothing.
    pub const fn starts_in(self, month: u32) -> bool {
        match month.checked_sub(1) {
            Some(previous) => previous % self.months() == 0,
            None => false,
        }
    }
}

impl TryFrom<u32> for Interval {
    type Error = ParameterError;

    fn try_from(months: u32) -> Result<Self, Self::Error> {
        match months {
            1 => Ok(Interval::Monthly),
            3 => Ok(Interval::Quarterly),
            6 => Ok(Interval::HalfYearly),
            12 => Ok(Interval::Yearly),
            other => Err(ParameterError::invalid(
                "interval",
                format!("must be one of 1, 3, 6 or 12 months, got {other}"),
            )),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContributionTiming {
    /// Contribution lands before the month's compounding check.
    StartOfPeriod,
    /// Contribution lands after the month's compounding check.
    EndOfPeriod,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaxPolicy {
    /// Tax is taken out of the interest at every compounding event.
    PerPeriod,
    /// Tax is taken once, on the total gain over the whole horizon.
    AtEnd,
}

impl TaxPolicy {
    pub const fn from_per_period_flag(per_period: bool) -> Self {
        if per_period {
            TaxPolicy::PerPeriod
        } else {
            TaxPolicy::AtEnd
        }
    }
}

/// Validated input of one calculation. Rates are kept in percent as entered.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationParameters {
    pub starting_capital: f64,
    pub years: u32,
    pub annual_interest_rate_percent: f64,
    pub compounding_interval: Interval,
    pub contribution_amount: f64,
    pub contribution_interval: Interval,
    pub tax_rate_percent: f64,
    pub contribution_timing: ContributionTiming,
    pub tax_policy: TaxPolicy,
}

impl CalculationParameters {
    /// Horizon in months, saturating at `u32::MAX` for horizons no boundary accepts.
    pub fn months(&self) -> u32 {
        self.years.saturating_mul(12)
    }

    pub fn annual_rate(&self) -> f64 {
        self.annual_interest_rate_percent / 100.0
    }

    pub fn tax_rate(&self) -> f64 {
        self.tax_rate_percent / 100.0
    }

    /// Equivalent rate of one compounding interval, as a growth multiplier.
    pub fn growth_factor(&self) -> f64 {
        (1.0 + self.annual_rate()).powf(f64::from(self.compounding_interval.months()) / 12.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrossResult {
    pub gross_final_capital: f64,
    pub total_contributions: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetResult {
    pub net_final_capital: f64,
    pub total_tax: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResult {
    pub gross_final_capital: f64,
    pub net_final_capital: f64,
    pub total_contributions: f64,
    pub gross_interest_gain: f64,
    pub net_interest_gain: f64,
    pub total_tax: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearTraceRow {
    pub year: u32,
    pub total_contributions: f64,
    pub gross_capital: f64,
    pub net_capital: f64,
    pub tax_to_date: f64,
}
