mod app;
mod cli;

use tracing_subscriber::{EnvFilter, fmt};

fn main() {
    // Job progress goes through the event stream; the logger only
    // carries diagnostics, quiet unless RUST_LOG says otherwise.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    app::run(cli::parse());
}
