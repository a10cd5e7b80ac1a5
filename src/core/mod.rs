mod engine;
mod error;
mod types;

pub use engine::{calculate, compute_gross, compute_net, run_yearly_trace};
pub use error::ParameterError;
pub use types::{
    CalculationParameters, CalculationResult, ContributionTiming, GrossResult, Interval,
    NetResult, TaxPolicy, YearTraceRow,
};
