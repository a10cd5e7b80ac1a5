use std::env;

use compound::api::{self, CliError};

#[tokio::main]
async fn main() {
    env_logger::init();

    let raw_args: Vec<String> = env::args().collect();
    if raw_args.get(1).map(|s| s.as_str()) == Some("serve") {
        let port = raw_args
            .get(2)
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(8080);
        if let Err(e) = api::run_http_server(port).await {
            log::error!("server error: {e}");
            std::process::exit(1);
        }
        return;
    }

    match api::run_cli(&raw_args) {
        Ok(report) => print!("{report}"),
        Err(CliError::Args(err)) => err.exit(),
        Err(err) => {
            log::warn!("rejected command line input: {err}");
            eprintln!("{err}");
            eprintln!("Usage: compound --starting-capital <X> --years <N> --annual-interest-rate <P> [...] | compound serve [port]");
            std::process::exit(2);
        }
    }
}
