//! Reference CLI client: connects to the collaborative editor server,
//! bootstraps a replica from the `welcome` handshake (spec.md §6), and
//! drives a terminal-buffer editor through the reconciliation layer —
//! spec.md §2's full data flow, end to end, minus the browser UI and the
//! real editor widget (both explicitly out of scope per spec.md §1).

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use protocol::{DownstreamMessage, WelcomeMessage};
use rga::{
    deliver_inbound, tie_outbound, EditorHandle, Op, OpSink, Reconciler, Replica, Sink,
    TerminalEditor, TokioQueue,
};

/// Forwards this replica's own broadcasts to the server as `downstream`
/// JSON text frames.
struct WsOutbound {
    tx: mpsc::UnboundedSender<Message>,
}

impl Sink for WsOutbound {
    fn deliver(&self, op: Op) {
        let msg: DownstreamMessage = op.into();
        match serde_json::to_string(&msg) {
            Ok(text) => {
                let _ = self.tx.send(Message::Text(text.into()));
            }
            Err(err) => eprintln!("[error] failed to serialize op: {err}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let server_url =
        std::env::var("SERVER_URL").unwrap_or_else(|_| "ws://127.0.0.1:9001/ws".to_string());

    println!("connecting to {server_url}...");
    let (ws_stream, _) = connect_async(&server_url)
        .await
        .context("failed to connect to server")?;
    println!("connected");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let welcome_text = match ws_rx.next().await {
        Some(Ok(Message::Text(text))) => text,
        other => bail!("expected a welcome message, got {other:?}"),
    };
    let welcome: WelcomeMessage =
        serde_json::from_str(&welcome_text).context("malformed welcome message")?;
    println!("assigned replica id {}", welcome.id);

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    let replica = Arc::new(
        Replica::from_history(welcome.id, welcome.history, Arc::new(TokioQueue::new()))
            .context("failed to bootstrap replica from welcome history")?,
    );

    let editor = TerminalEditor::new();
    let reconciler = Reconciler::new(replica.clone(), editor.clone());

    let sink_id = tie_outbound(&replica, Arc::new(WsOutbound { tx: tx.clone() }));

    let op_sink: Arc<dyn OpSink> = reconciler.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            if let Message::Text(text) = msg {
                match serde_json::from_str::<DownstreamMessage>(&text) {
                    Ok(wire) => {
                        if let Err(err) = deliver_inbound(&op_sink, wire.into(), sink_id) {
                            eprintln!("[error] rejected downstream op: {err}");
                            break;
                        }
                    }
                    Err(err) => eprintln!("[error] malformed downstream message: {err}"),
                }
            }
        }
        println!("[info] disconnected from server");
    });

    print_help();
    let stdin = io::stdin();
    let mut input = String::new();
    loop {
        print!("> ");
        io::stdout().flush().ok();
        input.clear();
        if stdin.read_line(&mut input).is_err() {
            break;
        }
        let trimmed = input.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            continue;
        }
        let mut parts = trimmed.splitn(2, ' ');
        let cmd = parts.next().unwrap_or("");
        let args = parts.next().unwrap_or("");
        match cmd {
            "help" | "h" | "?" => print_help(),
            "type" | "t" => editor.type_text(args),
            "show" | "s" => println!("{}", editor.value()),
            "quit" | "q" => break,
            _ => println!("[error] unknown command {cmd:?}; try 'help'"),
        }
    }

    send_task.abort();
    recv_task.abort();
    Ok(())
}

fn print_help() {
    println!("commands:");
    println!("  type <text>   append text to the shared document");
    println!("  show          print the current document");
    println!("  quit          disconnect");
}
