// Entrypoint for the CLI application.
// - Keeps `main` small: set up logging, parse arguments against the command
//   table and hand the matches to the dispatcher.
// - Returns `anyhow::Result` so any failure exits non-zero with its context.

use mathemcli::ui::{build_cli, command_table, dispatch, Invocation};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never mix with rendered results.
    // `MATHEMCLI_LOG=debug` shows every request and token rotation.
    let filter = EnvFilter::try_from_env("MATHEMCLI_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let table = command_table();
    let matches = build_cli(&table).get_matches();

    let invocation = Invocation::from_env()?;
    dispatch(&table, &invocation, &matches)
}
