// labctl - command line entry point

use std::process::ExitCode;

use labctl::utils::error::EXIT_CONFIG_ERROR;

#[tokio::main]
async fn main() -> ExitCode {
    match labctl::bootstrap::run().await {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(EXIT_CONFIG_ERROR as u8)
        }
    }
}
