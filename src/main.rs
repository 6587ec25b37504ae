pub mod cli;
pub mod config;
pub mod emit;
pub mod errors;
pub mod grammar;
pub mod parse;
pub mod pipeline;
pub mod provider;
pub mod schema;
pub mod value;

use colored::Colorize as _;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let command_line_interface = cli::CommandLineInterface::load();
    if let Err(error) = command_line_interface.run() {
        eprintln!("{}", format!("error: {error:#}").red());
        std::process::exit(1);
    }
}
