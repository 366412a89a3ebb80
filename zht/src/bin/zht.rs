//! Command-line entry point: starts a node and hands the operator an
//! interactive shell talking to it over the local control endpoint.

use bytes::Bytes;
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use zht::fabric::ReqClient;
use zht::node::{Node, NodeConfig};

#[derive(Parser, Debug)]
#[command(name = "zht", about = "Partitioned, eventually-consistent DHT node")]
struct Args {
    /// Reply endpoint address, e.g. tcp://0.0.0.0:5555 or ipc://node-a-rep
    #[arg(short = 'r', long = "bind-addr-rep")]
    bind_addr_rep: String,

    /// Publish endpoint address, e.g. tcp://0.0.0.0:5556
    #[arg(short = 'p', long = "bind-addr-pub")]
    bind_addr_pub: String,

    /// Address of an existing node to join on startup
    #[arg(short = 'c', long = "connect-addr")]
    connect_addr: Option<String>,

    /// This node's identity, announced to peers during the handshake.
    /// Defaults to a random identifier if omitted.
    #[arg(short = 'i', long)]
    identity: Option<String>,
}

#[compio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let identity = args.identity.unwrap_or_else(random_identity);

    let config = NodeConfig::new(identity, args.bind_addr_rep, args.bind_addr_pub);
    let control_addr = config.control_addr.clone();

    let node = Node::bind(config).await?;
    node.start().await?;

    if let Some(addr) = args.connect_addr {
        node.connect(&addr).await;
    }

    run_shell(control_addr).await;
    Ok(())
}

fn random_identity() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 8] = rng.gen();
    hex::encode(bytes)
}

/// The operator shell: `connect`, `get`, `rget`, `put`, `peers`, and `EOF`
/// (Ctrl-D), each forwarded to the node's control endpoint as one request.
async fn run_shell(control_addr: String) {
    let client = match ReqClient::connect(&control_addr).await {
        Ok(client) => Arc::new(async_lock::Mutex::new(client)),
        Err(err) => {
            eprintln!("could not reach control endpoint: {err}");
            return;
        }
    };

    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("could not start line editor: {err}");
            return;
        }
    };

    loop {
        match editor.readline("zht> ") {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                if let Err(err) = dispatch_line(&client, &line).await {
                    eprintln!("error: {err}");
                }
            }
            Err(ReadlineError::Eof) => {
                let mut client = client.lock().await;
                let _ = client.request(vec![Bytes::from_static(b"EOF")]).await;
                break;
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(err) => {
                eprintln!("readline error: {err}");
                break;
            }
        }
    }
}

async fn dispatch_line(
    client: &Arc<async_lock::Mutex<ReqClient>>,
    line: &str,
) -> Result<(), String> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else { return Ok(()) };
    let rest: Vec<&str> = words.collect();

    let request = match command {
        "connect" => {
            let mut frames = vec![Bytes::from_static(b"CONNECT")];
            frames.extend(rest.iter().map(|addr| Bytes::from(addr.to_string())));
            frames
        }
        "get" => {
            let mut frames = vec![Bytes::from_static(b"GET")];
            frames.extend(rest.iter().map(|key| Bytes::from(key.to_string())));
            frames
        }
        "rget" => {
            let mut frames = vec![Bytes::from_static(b"RGET")];
            frames.extend(rest.iter().map(|key| Bytes::from(key.to_string())));
            frames
        }
        "put" => {
            if rest.len() != 2 {
                return Err("usage: put <key> <value>".to_string());
            }
            vec![
                Bytes::from_static(b"PUT"),
                Bytes::from(rest[0].to_string()),
                Bytes::from(rest[1].to_string()),
            ]
        }
        "peers" => vec![Bytes::from_static(b"PEERS")],
        other => return Err(format!("unknown command: {other}")),
    };

    let mut client = client.lock().await;
    let reply = client
        .request(request)
        .await
        .map_err(|err| err.to_string())?
        .ok_or_else(|| "connection closed".to_string())?;

    for frame in reply {
        println!("{}", String::from_utf8_lossy(&frame));
    }
    Ok(())
}
