// CLI modules
mod cli;
mod process;
mod state;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, Health, Init, Migrate, Plan, Version};

command_enum! {
    (Init, Init),
    (Plan, Plan),
    (Migrate, Migrate),
    (Health, Health),
    (Version, Version),
}

/// Some buckets failed or were cancelled; the report says which.
const EXIT_PARTIAL_FAILURE: i32 = 2;

impl OpOutput {
    fn exit_code(&self) -> i32 {
        match self {
            OpOutput::Migrate(output) if !output.success => EXIT_PARTIAL_FAILURE,
            _ => 0,
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let state = match state::AppState::load(args.config_path.clone()) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Error: Failed to load config: {}", e);
            std::process::exit(1);
        }
    };
    let log_level = match state.config.log_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let guards = process::init_logging(log_level, state.config.log_dir.as_deref());

    let ctx = cli::op::OpContext::new(state, args.config_path, args.format);

    let code = match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            output.exit_code()
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };

    // flush buffered log lines before exiting
    drop(guards);
    std::process::exit(code);
}
