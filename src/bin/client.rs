//! `client`: send one prompt to a running `localm-serve`
//!
//! ```text
//! client <prompt...>
//! client --stream <prompt...>
//! ```

use std::io;

use clap::Parser;

use localm_serve::client::Client;
use localm_serve::logging::init_tracing;
use localm_serve::types::ClientConfig;

#[derive(Debug, Parser)]
#[command(name = "client", about = "Send a prompt to the local model server")]
struct Args {
    /// Use the streaming route
    #[arg(long)]
    stream: bool,

    /// Prompt words, joined with single spaces
    #[arg(required = true, num_args = 1..)]
    prompt: Vec<String>,
}

#[tokio::main]
async fn main() {
    init_tracing("warn");
    let args = Args::parse();
    let prompt = args.prompt.join(" ");

    let client = Client::new(ClientConfig::default());
    let mut stdout = io::stdout();
    if args.stream {
        client.send_stream(&prompt, &mut stdout).await;
    } else {
        client.send_full(&prompt, &mut stdout).await;
    }
}
