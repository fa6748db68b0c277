// SPDX-License-Identifier: Apache-2.0

use colored::Colorize;
use klee_bench::bench_error::EXIT_CONFIGURATION;
use klee_bench::BenchError;

/// Reports a problem with the invocation itself (flags, toolchain file)
/// and exits with the configuration exit code.
pub fn report_cli_error_and_exit(
    message: &str,
    subcommand: Option<&str>,
    details: Vec<(&str, &str)>,
) -> ! {
    print_error(message, subcommand, &details);
    std::process::exit(EXIT_CONFIGURATION);
}

/// Reports a run-level failure and exits with the code for its kind.
pub fn report_bench_error_and_exit(error: &BenchError) -> ! {
    let code = error.exit_code().to_string();
    print_error(&error.to_string(), None, &[("exit code", &code)]);
    std::process::exit(error.exit_code());
}

fn print_error(message: &str, subcommand: Option<&str>, details: &[(&str, &str)]) {
    let subcommand_str = if let Some(subcommand) = subcommand {
        format!("{}: ", subcommand)
    } else {
        String::new()
    };
    eprintln!(
        "klee-bench-driver: {}{}",
        subcommand_str,
        message.red().bold()
    );
    for (key, value) in details {
        eprintln!("  {}: {}", key, value);
    }
}
