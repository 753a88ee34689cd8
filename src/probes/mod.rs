pub mod availability;
pub mod availability_dates;
pub mod availability_timeslots;
pub mod availability_unified;
pub mod availability_variants;
pub mod booking;
pub mod catalog;
pub mod reservation;

use std::future::Future;
use std::pin::Pin;

use crate::domain::TestResult;
use crate::engine::{ProbeContext, ProbeError};

pub type ProbeResult = Result<TestResult, ProbeError>;
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = ProbeResult> + Send + 'a>>;
pub type ProbeFn = for<'a> fn(&'a ProbeContext) -> ProbeFuture<'a>;

/// One conformance test: a declared title (used verbatim in reports) and
/// the async function that runs it.
pub struct Probe {
    pub title: &'static str,
    pub run: ProbeFn,
}

macro_rules! probe {
    ($title:expr, $func:path) => {{
        fn run<'a>(
            ctx: &'a $crate::engine::ProbeContext,
        ) -> $crate::probes::ProbeFuture<'a> {
            Box::pin($func(ctx))
        }
        $crate::probes::Probe { title: $title, run }
    }};
}

pub(crate) use probe;
