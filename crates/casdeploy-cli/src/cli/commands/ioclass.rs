use casdeploy_core::IoClassPolicy;
use serde_json::json;

use crate::cli::args::{IoclassCmd, OutputFormat};
use crate::exit_codes::{EXIT_SUCCESS, VALIDATION_FAILED};

pub fn run(cmd: IoclassCmd, format: OutputFormat) -> anyhow::Result<i32> {
    let IoclassCmd::Validate { file } = cmd;

    match IoClassPolicy::from_file(&file) {
        Ok(policy) => {
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "valid": true,
                        "name": policy.name(),
                        "rules": policy.rules(),
                    }))?
                ),
                OutputFormat::Text => {
                    println!("{}: valid ({} rules)", policy.name(), policy.len())
                }
            }
            Ok(EXIT_SUCCESS)
        }
        Err(e) => {
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "valid": false,
                        "error": e.to_string(),
                    }))?
                ),
                OutputFormat::Text => eprintln!("error: {}", e),
            }
            Ok(VALIDATION_FAILED)
        }
    }
}
