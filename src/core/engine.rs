use super::types::{
    CalculationParameters, CalculationResult, ContributionTiming, GrossResult, NetResult,
    TaxPolicy, YearTraceRow,
};

#[derive(Debug, Clone, Copy)]
struct YearEnd {
    value: f64,
    contributions: u32,
    tax_paid: f64,
}

#[derive(Debug, Clone)]
struct TrackOutcome {
    final_value: f64,
    contributions: u32,
    compounding_events: u32,
    tax_paid: f64,
    year_ends: Vec<YearEnd>,
}

/// Principal track and contribution track of the per-period tax policy.
#[derive(Debug, Clone)]
struct PerPeriodTracks {
    principal: TrackOutcome,
    savings: TrackOutcome,
}

impl PerPeriodTracks {
    fn net_at(&self, year_index: usize) -> NetResult {
        let principal = self.principal.year_ends[year_index];
        let savings = self.savings.year_ends[year_index];
        NetResult {
            net_final_capital: principal.value + savings.value,
            total_tax: principal.tax_paid + savings.tax_paid,
        }
    }

    fn net_final(&self) -> NetResult {
        NetResult {
            net_final_capital: self.principal.final_value + self.savings.final_value,
            total_tax: self.principal.tax_paid + self.savings.tax_paid,
        }
    }
}

pub fn calculate(params: &CalculationParameters) -> CalculationResult {
    let gross = compute_gross(params);
    let net = compute_net(params, Some(gross));

    CalculationResult {
        gross_final_capital: gross.gross_final_capital,
        net_final_capital: net.net_final_capital,
        total_contributions: gross.total_contributions,
        gross_interest_gain: gross.gross_final_capital - gross.total_contributions,
        net_interest_gain: net.net_final_capital - gross.total_contributions,
        total_tax: net.total_tax,
    }
}

/// Untaxed growth of the contributions plus the starting capital, which compounds
/// once per full year at the nominal annual rate.
pub fn compute_gross(params: &CalculationParameters) -> GrossResult {
    let track = simulate_track(params, 0.0, true, |_| 0.0);
    log::debug!(
        "gross track: {} months, {} compounding events, {} contributions",
        params.months(),
        track.compounding_events,
        track.contributions
    );
    gross_at(params, params.years, track.final_value, track.contributions)
}

/// Net capital and tax under the parameter set's tax policy.
///
/// `precomputed` is only consulted by [`TaxPolicy::AtEnd`]; per-period taxation
/// cannot be derived from the aggregate gross figure and is always simulated.
pub fn compute_net(params: &CalculationParameters, precomputed: Option<GrossResult>) -> NetResult {
    match params.tax_policy {
        TaxPolicy::PerPeriod => simulate_per_period_tracks(params).net_final(),
        TaxPolicy::AtEnd => {
            let gross = precomputed.unwrap_or_else(|| compute_gross(params));
            settle_tax_at_end(gross, params.tax_rate())
        }
    }
}

/// Balances at the end of every year of the horizon. The last row matches
/// [`calculate`]. Under [`TaxPolicy::AtEnd`] the net figures are what the
/// position would be worth if the horizon ended that year.
pub fn run_yearly_trace(params: &CalculationParameters) -> Vec<YearTraceRow> {
    let gross_track = simulate_track(params, 0.0, true, |_| 0.0);
    let per_period = match params.tax_policy {
        TaxPolicy::PerPeriod => Some(simulate_per_period_tracks(params)),
        TaxPolicy::AtEnd => None,
    };

    (1..=params.years)
        .zip(gross_track.year_ends.iter())
        .enumerate()
        .map(|(index, (year, year_end))| {
            let gross = gross_at(params, year, year_end.value, year_end.contributions);
            let net = match &per_period {
                Some(tracks) => tracks.net_at(index),
                None => settle_tax_at_end(gross, params.tax_rate()),
            };
            YearTraceRow {
                year,
                total_contributions: gross.total_contributions,
                gross_capital: gross.gross_final_capital,
                net_capital: net.net_final_capital,
                tax_to_date: net.total_tax,
            }
        })
        .collect()
}

fn gross_at(
    params: &CalculationParameters,
    year: u32,
    contribution_value: f64,
    contributions: u32,
) -> GrossResult {
    let principal = params.starting_capital * (1.0 + params.annual_rate()).powf(f64::from(year));
    GrossResult {
        gross_final_capital: contribution_value + principal,
        total_contributions: params.contribution_amount * f64::from(contributions)
            + params.starting_capital,
    }
}

fn settle_tax_at_end(gross: GrossResult, tax_rate: f64) -> NetResult {
    let total_tax = (gross.gross_final_capital - gross.total_contributions) * tax_rate;
    NetResult {
        net_final_capital: gross.gross_final_capital - total_tax,
        total_tax,
    }
}

fn simulate_per_period_tracks(params: &CalculationParameters) -> PerPeriodTracks {
    let tax_rate = params.tax_rate();
    let principal = simulate_track(params, params.starting_capital, false, |interest| {
        interest * tax_rate
    });
    let savings = simulate_track(params, 0.0, true, |interest| interest * tax_rate);
    log::debug!(
        "per-period tax: principal {:.2} after {:.2} tax, savings {:.2} after {:.2} tax",
        principal.final_value,
        principal.tax_paid,
        savings.final_value,
        savings.tax_paid
    );
    PerPeriodTracks { principal, savings }
}

fn contribution_due(params: &CalculationParameters, month: u32, timing: ContributionTiming) -> bool {
    if params.contribution_timing != timing {
        return false;
    }
    match timing {
        ContributionTiming::StartOfPeriod => params.contribution_interval.starts_in(month),
        ContributionTiming::EndOfPeriod => params.contribution_interval.ends_in(month),
    }
}

/// Steps month by month over the horizon. Start-of-period contributions land
/// before the compounding check, end-of-period ones after it. At every
/// compounding event `tax_on_interest` maps the interest just earned to the tax
/// deducted from the balance right away.
fn simulate_track<F>(
    params: &CalculationParameters,
    opening_value: f64,
    with_contributions: bool,
    mut tax_on_interest: F,
) -> TrackOutcome
where
    F: FnMut(f64) -> f64,
{
    let growth_factor = params.growth_factor();
    let mut value = opening_value;
    let mut contributions = 0;
    let mut compounding_events = 0;
    let mut tax_paid = 0.0;
    let mut year_ends = Vec::new();

    for month in 1..=params.months() {
        if with_contributions && contribution_due(params, month, ContributionTiming::StartOfPeriod)
        {
            value += params.contribution_amount;
            contributions += 1;
        }

        if params.compounding_interval.ends_in(month) {
            let grown = value * growth_factor;
            let tax = tax_on_interest(grown - value);
            tax_paid += tax;
            value = grown - tax;
            compounding_events += 1;
        }

        if with_contributions && contribution_due(params, month, ContributionTiming::EndOfPeriod) {
            value += params.contribution_amount;
            contributions += 1;
        }

        if month % 12 == 0 {
            year_ends.push(YearEnd {
                value,
                contributions,
                tax_paid,
            });
        }
    }

    TrackOutcome {
        final_value: value,
        contributions,
        compounding_events,
        tax_paid,
        year_ends,
    }
}
