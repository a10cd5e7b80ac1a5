use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::core::{
    CalculationParameters, CalculationResult, ContributionTiming, Interval, ParameterError,
    TaxPolicy, YearTraceRow, calculate, run_yearly_trace,
};

/// Longest accepted horizon in years.
pub const MAX_YEARS: u32 = 200;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliContributionTiming {
    StartOfPeriod,
    EndOfPeriod,
}

impl From<CliContributionTiming> for ContributionTiming {
    fn from(value: CliContributionTiming) -> Self {
        match value {
            CliContributionTiming::StartOfPeriod => ContributionTiming::StartOfPeriod,
            CliContributionTiming::EndOfPeriod => ContributionTiming::EndOfPeriod,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiContributionTiming {
    #[serde(alias = "startOfPeriod", alias = "start_of_period", alias = "start")]
    StartOfPeriod,
    #[serde(alias = "endOfPeriod", alias = "end_of_period", alias = "end")]
    EndOfPeriod,
}

impl From<ApiContributionTiming> for CliContributionTiming {
    fn from(value: ApiContributionTiming) -> Self {
        match value {
            ApiContributionTiming::StartOfPeriod => CliContributionTiming::StartOfPeriod,
            ApiContributionTiming::EndOfPeriod => CliContributionTiming::EndOfPeriod,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CalculatePayload {
    starting_capital: Option<f64>,
    years: Option<u32>,
    annual_interest_rate: Option<f64>,
    compounding_interval: Option<u32>,
    contribution: Option<f64>,
    contribution_interval: Option<u32>,
    tax_rate: Option<f64>,
    contribution_timing: Option<ApiContributionTiming>,
    tax_per_period: Option<bool>,
}

#[derive(Parser, Debug)]
#[command(
    name = "compound",
    about = "Compound interest calculator (periodic contributions + per-period or end-of-term tax)"
)]
struct Cli {
    #[arg(long)]
    starting_capital: f64,
    #[arg(long)]
    years: u32,
    #[arg(long, help = "Nominal annual interest rate in percent")]
    annual_interest_rate: f64,
    #[arg(
        long,
        default_value_t = 12,
        help = "Months between compounding events: 1, 3, 6 or 12"
    )]
    compounding_interval: u32,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Amount paid in once per contribution interval"
    )]
    contribution: f64,
    #[arg(
        long,
        default_value_t = 1,
        help = "Months between contributions: 1, 3, 6 or 12"
    )]
    contribution_interval: u32,
    #[arg(long, default_value_t = 0.0, help = "Tax on interest gains in percent")]
    tax_rate: f64,
    #[arg(long, value_enum, default_value_t = CliContributionTiming::StartOfPeriod)]
    contribution_timing: CliContributionTiming,
    #[arg(
        long,
        help = "Deduct tax at every compounding event instead of once on the total gain"
    )]
    tax_per_period: bool,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Args(#[from] clap::Error),
    #[error(transparent)]
    Parameters(#[from] ParameterError),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CalculateResponse {
    months: u32,
    compounding_interval: Interval,
    contribution_interval: Interval,
    contribution_timing: ContributionTiming,
    tax_policy: TaxPolicy,
    result: CalculationResult,
    yearly: Vec<YearTraceRow>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_parameters(cli: Cli) -> Result<CalculationParameters, ParameterError> {
    for (name, value) in [
        ("--starting-capital", cli.starting_capital),
        ("--annual-interest-rate", cli.annual_interest_rate),
        ("--contribution", cli.contribution),
        ("--tax-rate", cli.tax_rate),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(ParameterError::invalid(name, "must be a finite number >= 0"));
        }
    }

    if cli.tax_rate > 100.0 {
        return Err(ParameterError::invalid(
            "--tax-rate",
            "must be between 0 and 100",
        ));
    }

    if cli.years > MAX_YEARS {
        return Err(ParameterError::invalid(
            "--years",
            format!("must be <= {MAX_YEARS}"),
        ));
    }

    Ok(CalculationParameters {
        starting_capital: cli.starting_capital,
        years: cli.years,
        annual_interest_rate_percent: cli.annual_interest_rate,
        compounding_interval: interval_arg("--compounding-interval", cli.compounding_interval)?,
        contribution_amount: cli.contribution,
        contribution_interval: interval_arg("--contribution-interval", cli.contribution_interval)?,
        tax_rate_percent: cli.tax_rate,
        contribution_timing: cli.contribution_timing.into(),
        tax_policy: TaxPolicy::from_per_period_flag(cli.tax_per_period),
    })
}

fn interval_arg(name: &'static str, months: u32) -> Result<Interval, ParameterError> {
    Interval::try_from(months).map_err(|err| match err {
        ParameterError::InvalidParameter { reason, .. } => ParameterError::invalid(name, reason),
    })
}

/// Parses command line flags, runs the calculation and renders the report.
pub fn run_cli<I, T>(args: I) -> Result<String, CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::try_parse_from(args)?;
    let params = build_parameters(cli)?;
    let result = checked_calculate(&params)?;
    Ok(render_report(&params, &result))
}

/// Runs the engine and refuses results that overflowed to `inf`/`NaN`.
fn checked_calculate(params: &CalculationParameters) -> Result<CalculationResult, ParameterError> {
    let result = calculate(params);
    let all_finite = [
        result.gross_final_capital,
        result.net_final_capital,
        result.total_contributions,
        result.gross_interest_gain,
        result.net_interest_gain,
        result.total_tax,
    ]
    .iter()
    .all(|value| value.is_finite());

    if !all_finite {
        return Err(ParameterError::invalid(
            "--annual-interest-rate",
            "is too large for the horizon and amounts: the result is not a finite number",
        ));
    }
    Ok(result)
}

fn render_report(params: &CalculationParameters, result: &CalculationResult) -> String {
    let timing = match params.contribution_timing {
        ContributionTiming::StartOfPeriod => "start of period",
        ContributionTiming::EndOfPeriod => "end of period",
    };
    let tax = match params.tax_policy {
        TaxPolicy::PerPeriod => "deducted at every compounding event",
        TaxPolicy::AtEnd => "deducted once on the total gain",
    };

    let mut report = format!(
        "{} years at {}% p.a., compounded {}\n\
         contribution {} {} ({})\n\
         tax {}% {}\n\n",
        params.years,
        params.annual_interest_rate_percent,
        params.compounding_interval.label(),
        format_currency(params.contribution_amount),
        params.contribution_interval.label(),
        timing,
        params.tax_rate_percent,
        tax,
    );
    for (label, value) in [
        ("Gross capital", result.gross_final_capital),
        ("Net capital", result.net_final_capital),
        ("Contributions", result.total_contributions),
        ("Gross interest gain", result.gross_interest_gain),
        ("Net interest gain", result.net_interest_gain),
        ("Tax", result.total_tax),
    ] {
        report.push_str(&format!("{label:<22}{:>22}\n", format_currency(value)));
    }
    report
}

/// Grouped thousands, two decimals, euro sign: `1,234.56 €`.
pub fn format_currency(value: f64) -> String {
    let rounded = format!("{:.2}", value.abs());
    let (whole, cents) = rounded.split_once('.').unwrap_or((rounded.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let is_zero = !rounded.chars().any(|c| matches!(c, '1'..='9'));
    let sign = if value < 0.0 && !is_zero { "-" } else { "" };
    format!("{sign}{grouped}.{cents} €")
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    log::info!("compound interest API listening on http://{addr}");
    log::info!("local access: http://127.0.0.1:{port}/api/calculate");

    axum::serve(listener, router()).await
}

fn router() -> Router {
    Router::new()
        .route(
            "/api/calculate",
            get(calculate_get_handler).post(calculate_post_handler),
        )
        .fallback(not_found_handler)
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn calculate_get_handler(Query(payload): Query<CalculatePayload>) -> Response {
    respond_to(payload)
}

async fn calculate_post_handler(Json(payload): Json<CalculatePayload>) -> Response {
    respond_to(payload)
}

fn respond_to(payload: CalculatePayload) -> Response {
    match parameters_from_payload(payload).and_then(|params| build_calculate_response(&params)) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(err) => {
            log::warn!("rejected calculation request: {err}");
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
    }
}

fn build_calculate_response(
    params: &CalculationParameters,
) -> Result<CalculateResponse, ParameterError> {
    Ok(CalculateResponse {
        months: params.months(),
        compounding_interval: params.compounding_interval,
        contribution_interval: params.contribution_interval,
        contribution_timing: params.contribution_timing,
        tax_policy: params.tax_policy,
        result: checked_calculate(params)?,
        yearly: run_yearly_trace(params),
    })
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn parameters_from_json(json: &str) -> Result<CalculationParameters, String> {
    let payload = serde_json::from_str::<CalculatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    parameters_from_payload(payload).map_err(|e| e.to_string())
}

fn parameters_from_payload(
    payload: CalculatePayload,
) -> Result<CalculationParameters, ParameterError> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.starting_capital {
        cli.starting_capital = v;
    }
    if let Some(v) = payload.years {
        cli.years = v;
    }
    if let Some(v) = payload.annual_interest_rate {
        cli.annual_interest_rate = v;
    }
    if let Some(v) = payload.compounding_interval {
        cli.compounding_interval = v;
    }
    if let Some(v) = payload.contribution {
        cli.contribution = v;
    }
    if let Some(v) = payload.contribution_interval {
        cli.contribution_interval = v;
    }
    if let Some(v) = payload.tax_rate {
        cli.tax_rate = v;
    }
    if let Some(v) = payload.contribution_timing {
        cli.contribution_timing = v.into();
    }
    if let Some(v) = payload.tax_per_period {
        cli.tax_per_period = v;
    }

    build_parameters(cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        starting_capital: 10_000.0,
        years: 10,
        annual_interest_rate: 5.0,
        compounding_interval: 12,
        contribution: 100.0,
        contribution_interval: 1,
        tax_rate: 27.5,
        contribution_timing: CliContributionTiming::StartOfPeriod,
        tax_per_period: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_cli() -> Cli {
        default_cli_for_api()
    }

    #[test]
    fn build_parameters_maps_cli_flags_onto_parameters() {
        let mut cli = sample_cli();
        cli.compounding_interval = 3;
        cli.contribution_interval = 6;
        cli.contribution_timing = CliContributionTiming::EndOfPeriod;
        cli.tax_per_period = true;

        let params = build_parameters(cli).expect("valid parameters");
        assert_eq!(params.compounding_interval, Interval::Quarterly);
        assert_eq!(params.contribution_interval, Interval::HalfYearly);
        assert_eq!(params.contribution_timing, ContributionTiming::EndOfPeriod);
        assert_eq!(params.tax_policy, TaxPolicy::PerPeriod);
        assert_approx(params.annual_rate(), 0.05);
        assert_approx(params.tax_rate(), 0.275);
        assert_eq!(params.months(), 120);
    }

    #[test]
    fn build_parameters_rejects_unsupported_compounding_interval() {
        let mut cli = sample_cli();
        cli.compounding_interval = 2;

        let err = build_parameters(cli).expect_err("must reject interval of 2 months");
        assert!(err.to_string().contains("--compounding-interval"));
    }

    #[test]
    fn build_parameters_rejects_zero_contribution_interval() {
        let mut cli = sample_cli();
        cli.contribution_interval = 0;

        let err = build_parameters(cli).expect_err("must reject zero interval");
        assert!(err.to_string().contains("--contribution-interval"));
    }

    #[test]
    fn build_parameters_rejects_negative_and_non_finite_amounts() {
        let mut cli = sample_cli();
        cli.starting_capital = -1.0;
        let err = build_parameters(cli).expect_err("must reject negative capital");
        assert!(err.to_string().contains("--starting-capital"));

        let mut cli = sample_cli();
        cli.annual_interest_rate = f64::NAN;
        let err = build_parameters(cli).expect_err("must reject NaN rate");
        assert!(err.to_string().contains("--annual-interest-rate"));

        let mut cli = sample_cli();
        cli.contribution = f64::INFINITY;
        let err = build_parameters(cli).expect_err("must reject infinite contribution");
        assert!(err.to_string().contains("--contribution"));
    }

    #[test]
    fn build_parameters_rejects_tax_rate_above_hundred_percent() {
        let mut cli = sample_cli();
        cli.tax_rate = 100.5;

        let err = build_parameters(cli).expect_err("must reject tax above 100");
        assert!(err.to_string().contains("--tax-rate"));
    }

    #[test]
    fn build_parameters_rejects_overlong_horizon() {
        let mut cli = sample_cli();
        cli.years = MAX_YEARS + 1;

        let err = build_parameters(cli).expect_err("must reject long horizon");
        assert!(err.to_string().contains("--years"));
    }

    #[test]
    fn run_cli_rejects_rate_that_overflows_the_horizon() {
        let err = run_cli([
            "compound",
            "--starting-capital",
            "1000",
            "--years",
            "200",
            "--annual-interest-rate",
            "1e6",
            "--compounding-interval",
            "1",
            "--contribution",
            "100",
            "--tax-rate",
            "25",
            "--tax-per-period",
        ])
        .expect_err("must reject non-finite result");
        assert!(matches!(err, CliError::Parameters(_)));
        assert!(err.to_string().contains("--annual-interest-rate"));
    }

    #[test]
    fn respond_to_rejects_rate_that_overflows_the_horizon() {
        let json = r#"{
          "startingCapital": 1000,
          "years": 200,
          "annualInterestRate": 1e6,
          "compoundingInterval": 1,
          "contribution": 100,
          "taxPerPeriod": true,
          "taxRate": 25
        }"#;
        let payload =
            serde_json::from_str::<CalculatePayload>(json).expect("json should parse");
        let params = parameters_from_json(json).expect("inputs themselves are in range");
        let err = build_calculate_response(&params).expect_err("must reject overflow");
        assert!(err.to_string().contains("not a finite number"));

        let response = respond_to(payload);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn parameters_from_json_parses_web_keys() {
        let json = r#"{
          "startingCapital": 25000,
          "years": 15,
          "annualInterestRate": 6.5,
          "compoundingInterval": 1,
          "contribution": 250,
          "contributionInterval": 3,
          "taxRate": 25,
          "contributionTiming": "endOfPeriod",
          "taxPerPeriod": true
        }"#;
        let params = parameters_from_json(json).expect("json should parse");

        assert_approx(params.starting_capital, 25_000.0);
        assert_eq!(params.years, 15);
        assert_approx(params.annual_interest_rate_percent, 6.5);
        assert_eq!(params.compounding_interval, Interval::Monthly);
        assert_approx(params.contribution_amount, 250.0);
        assert_eq!(params.contribution_interval, Interval::Quarterly);
        assert_approx(params.tax_rate_percent, 25.0);
        assert_eq!(params.contribution_timing, ContributionTiming::EndOfPeriod);
        assert_eq!(params.tax_policy, TaxPolicy::PerPeriod);
    }

    #[test]
    fn parameters_from_json_fills_missing_keys_from_defaults() {
        let params = parameters_from_json(r#"{"years": 3}"#).expect("json should parse");
        assert_eq!(params.years, 3);
        assert_approx(params.starting_capital, 10_000.0);
        assert_eq!(params.compounding_interval, Interval::Yearly);
        assert_eq!(params.contribution_timing, ContributionTiming::StartOfPeriod);
        assert_eq!(params.tax_policy, TaxPolicy::AtEnd);
    }

    #[test]
    fn parameters_from_json_rejects_unknown_timing() {
        let err = parameters_from_json(r#"{"contributionTiming": "sometimes"}"#)
            .expect_err("must reject unknown timing");
        assert!(err.contains("Invalid API JSON payload"));
    }

    #[test]
    fn parameters_from_json_rejects_negative_capital() {
        let err = parameters_from_json(r#"{"startingCapital": -5}"#)
            .expect_err("must reject negative capital");
        assert!(err.contains("--starting-capital"));
    }

    #[test]
    fn calculate_response_serialization_contains_expected_fields() {
        let mut cli = sample_cli();
        cli.years = 3;
        cli.tax_per_period = true;

        let params = build_parameters(cli).expect("valid parameters");
        let response = build_calculate_response(&params).expect("finite result");
        assert_eq!(response.yearly.len(), 3);

        let json = serde_json::to_string(&response).expect("response should serialize");
        assert!(json.contains("\"months\":36"));
        assert!(json.contains("\"compoundingInterval\":\"yearly\""));
        assert!(json.contains("\"contributionInterval\":\"monthly\""));
        assert!(json.contains("\"contributionTiming\":\"start-of-period\""));
        assert!(json.contains("\"taxPolicy\":\"per-period\""));
        assert!(json.contains("\"grossFinalCapital\""));
        assert!(json.contains("\"netInterestGain\""));
        assert!(json.contains("\"taxToDate\""));
    }

    #[test]
    fn respond_to_rejects_invalid_payload_with_bad_request() {
        let payload = CalculatePayload {
            compounding_interval: Some(5),
            ..CalculatePayload::default()
        };
        let response = respond_to(payload);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
            Some(&b"no-store"[..])
        );
    }

    #[test]
    fn respond_to_accepts_default_payload() {
        let response = respond_to(CalculatePayload::default());
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn run_cli_renders_formatted_report() {
        let report = run_cli([
            "compound",
            "--starting-capital",
            "1000",
            "--years",
            "1",
            "--annual-interest-rate",
            "12",
        ])
        .expect("valid cli");

        assert!(report.contains("compounded yearly"));
        assert!(report.contains("1,120.00 €"));
        assert!(report.contains("1,000.00 €"));
        assert!(report.contains("120.00 €"));
    }

    #[test]
    fn run_cli_rejects_unsupported_interval() {
        let err = run_cli([
            "compound",
            "--starting-capital",
            "1000",
            "--years",
            "1",
            "--annual-interest-rate",
            "12",
            "--contribution-interval",
            "5",
        ])
        .expect_err("must reject interval");
        assert!(matches!(err, CliError::Parameters(_)));
    }

    #[test]
    fn run_cli_requires_core_flags() {
        let err = run_cli(["compound", "--years", "1"]).expect_err("must require flags");
        assert!(matches!(err, CliError::Args(_)));
    }

    #[test]
    fn format_currency_groups_thousands_with_two_decimals() {
        assert_eq!(format_currency(0.0), "0.00 €");
        assert_eq!(format_currency(12.5), "12.50 €");
        assert_eq!(format_currency(1_234.5), "1,234.50 €");
        assert_eq!(format_currency(999.999), "1,000.00 €");
        assert_eq!(format_currency(1_000_000.0), "1,000,000.00 €");
        assert_eq!(format_currency(-1_234.567), "-1,234.57 €");
        assert_eq!(format_currency(-0.001), "0.00 €");
    }
}
