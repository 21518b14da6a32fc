use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = waybill::cli::Cli::parse();
    if let Err(e) = waybill::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
