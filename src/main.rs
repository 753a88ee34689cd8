use std::process::ExitCode;

use supplier_check::domain::ProtocolVersion;
use supplier_check::harness::{Harness, RunnerConfig, Target};
use supplier_check::report;

#[derive(Debug, Default)]
struct CliArgs {
    url: Option<String>,
    api_key: Option<String>,
    product_id: Option<String>,
    timeslots: bool,
    availability: bool,
    reservation: bool,
    booking: bool,
    catalog: bool,
    no_colors: bool,
    version_1: bool,
}

const USAGE: &str = "\
Test your Supplier API implementation.

Usage: supplier-check -u <URL> -k <API-KEY> [-p <PRODUCT-ID>] [flags]

  -u, --url <URL>            Server URL
  -k, --api-key <KEY>        API key
  -p, --product-id <ID>      Product ID to run the tests on
  -t, --timeslots            Product uses timeslots (v1 only)
  -a, --availability         Run availability tests
  -r, --reservation          Run reservation tests
  -b, --booking              Run booking tests
  -c, --catalog              Run product catalog tests
  -nc, --no-colors           Do not use colors on output
  -v1, --version-1           Test against API v1.x

Without -a/-r/-b/-c every test family runs.";

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut parsed = CliArgs::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-u" | "--url" => {
                parsed.url = Some(
                    iter.next()
                        .ok_or_else(|| format!("{arg} requires a value"))?
                        .clone(),
                );
            }
            "-k" | "--api-key" => {
                parsed.api_key = Some(
                    iter.next()
                        .ok_or_else(|| format!("{arg} requires a value"))?
                        .clone(),
                );
            }
            "-p" | "--product-id" => {
                parsed.product_id = Some(
                    iter.next()
                        .ok_or_else(|| format!("{arg} requires a value"))?
                        .clone(),
                );
            }
            "-t" | "--timeslots" => parsed.timeslots = true,
            "-a" | "--availability" => parsed.availability = true,
            "-r" | "--reservation" => parsed.reservation = true,
            "-b" | "--booking" => parsed.booking = true,
            "-c" | "--catalog" => parsed.catalog = true,
            "-nc" | "--no-colors" => parsed.no_colors = true,
            "-v1" | "--version-1" => parsed.version_1 = true,
            "-h" | "--help" => return Err(String::new()),
            other => return Err(format!("Unknown argument: {other}")),
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut parsed = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("{message}");
                eprintln!();
            }
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };

    if !(parsed.availability || parsed.reservation || parsed.booking || parsed.catalog) {
        parsed.availability = true;
        parsed.reservation = true;
        parsed.booking = true;
        parsed.catalog = true;
    }

    let (Some(url), Some(api_key)) = (parsed.url.clone(), parsed.api_key.clone()) else {
        eprintln!("Both --url and --api-key are required.");
        eprintln!();
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };

    let needs_product = parsed.availability || parsed.reservation || parsed.booking;
    let product_id = match (parsed.product_id.clone(), needs_product) {
        (Some(id), _) => id,
        (None, false) => String::new(),
        (None, true) => {
            eprintln!("--product-id is required for availability, reservation and booking tests.");
            return ExitCode::from(2);
        }
    };

    let version = if parsed.version_1 {
        ProtocolVersion::V1
    } else {
        ProtocolVersion::V2
    };

    let harness = match Harness::new(RunnerConfig {
        api_url: url,
        api_key,
        product_id,
        version,
        timeslots: parsed.timeslots,
    }) {
        Ok(harness) => harness,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };

    let mut targets = Vec::new();
    if parsed.availability {
        targets.push(Target::Availability);
    }
    if parsed.reservation {
        targets.push(Target::Reservation);
    }
    if parsed.booking {
        targets.push(Target::Booking);
    }
    if parsed.catalog {
        targets.push(Target::Catalog);
    }

    let mut any_failed = false;
    for target in targets {
        report::print_title(target.heading());
        let results = harness.run(target).await;
        report::print_results(&results, parsed.no_colors);
        report::print_failures(&results);
        any_failed |= results.iter().any(|r| r.is_fail());
    }

    if any_failed {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}
