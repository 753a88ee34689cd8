use std::process::ExitCode;

use supplier_check::mock;

const USAGE: &str = "\
Reference mock supplier for the conformance runner.

Usage: mock-server [--port <PORT>] [--api-key <KEY>]

  --port <PORT>       Port to listen on (default 8000)
  --api-key <KEY>     Accepted API key (default \"secret\")";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut port: u16 = 8000;
    let mut api_key = "secret".to_string();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--port" => {
                let Some(value) = iter.next().and_then(|v| v.parse().ok()) else {
                    eprintln!("--port requires a numeric value");
                    return ExitCode::from(2);
                };
                port = value;
            }
            "--api-key" => {
                let Some(value) = iter.next() else {
                    eprintln!("--api-key requires a value");
                    return ExitCode::from(2);
                };
                api_key = value.clone();
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                return ExitCode::SUCCESS;
            }
            other => {
                eprintln!("Unknown argument: {other}");
                eprintln!();
                eprintln!("{USAGE}");
                return ExitCode::from(2);
            }
        }
    }

    let addr = format!("0.0.0.0:{port}");
    match mock::spawn(&addr, &api_key).await {
        Ok((local_addr, handle)) => {
            println!("mock supplier listening on http://{local_addr}");
            let _ = handle.await;
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Failed to bind {addr}: {err}");
            ExitCode::from(1)
        }
    }
}
