mod app;
mod cli;

fn main() {
    let cli = cli::parse();

    // RUST_LOG wins; otherwise info, or debug with --verbose
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "clipfit=debug".to_string()
        } else {
            "clipfit=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(env_filter))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    app::run(cli);
}
