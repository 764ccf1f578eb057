mod command_line;
mod contracts;
mod deploy;
mod pipeline;
mod utils;

use anyhow::Result;
use command_line::CommandLine;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cmd = CommandLine::try_parse_lenient(std::env::args()).unwrap_or_else(|err| err.exit());
    cmd.execute().await
}
