use crate::server;
use clap::{Args, Parser, Subcommand};
use mortgage_decision::coordination::decision_matrix;
use mortgage_decision::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Mortgage Decision Engine",
    about = "Coordinate rule, model and fairness evaluations into underwriting decisions",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print how rule, model and bias verdicts resolve into a final decision
    Matrix,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Matrix => {
            print!("{}", render_matrix());
            Ok(())
        }
    }
}

fn render_matrix() -> String {
    let mut out = format!("{:<6} {:<9} {:<7} {}\n", "rule", "model", "biased", "decision");
    for (rule, ml, biased, decision) in decision_matrix() {
        out.push_str(&format!(
            "{:<6} {:<9} {:<7} {}\n",
            rule.label(),
            ml.label(),
            if biased { "yes" } else { "no" },
            decision
        ));
    }
    out
}
