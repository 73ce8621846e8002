use mortgage_decision_api::run;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("decision engine error: {err}");
        std::process::exit(1);
    }
}
