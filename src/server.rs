use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::error::Result;
use crate::pdns::{Handler, Lookup, MAX_LINE_LEN, Request, Response};
use crate::resolver::Resolver;
use crate::store::Query;

/// Adapts the resolver to the protocol handler's lookup callback.
pub struct ResolverLookup {
    resolver: Resolver,
}

impl ResolverLookup {
    pub fn new(resolver: Resolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Lookup for ResolverLookup {
    async fn lookup(&self, request: &Request) -> Result<Vec<Response>> {
        let query = Query {
            name: request.qname.clone(),
            record_type: request.qtype.clone(),
        };

        let entries = self.resolver.resolve(&query).await?;

        Ok(entries
            .into_iter()
            .map(|entry| Response {
                qname: request.qname.clone(),
                qclass: "IN".to_string(),
                qtype: entry.record_type,
                ttl: entry.ttl.to_string(),
                id: "1".to_string(),
                content: entry.payload,
            })
            .collect())
    }
}

/// Runs the co-process loop over stdin/stdout until stdin closes or a
/// termination signal arrives.
///
/// Four tasks cooperate: the input task frames stdin into lines, the
/// handler task owns the protocol state machine, the output task
/// serializes writes to stdout, and this function itself watches for
/// signals. One query is in flight at a time, so responses leave in
/// request order.
pub async fn run<L: Lookup + 'static>(lookup: L) -> Result<()> {
    let (input_tx, input_rx) = mpsc::channel::<String>(1);
    let (output_tx, mut output_rx) = mpsc::channel::<String>(32);

    let input_task = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.len() > MAX_LINE_LEN {
                        error!("input line exceeds {} bytes, giving up", MAX_LINE_LEN);
                        return;
                    }
                    if input_tx.send(line).await.is_err() {
                        return;
                    }
                }
                Ok(None) => {
                    info!("stdin closed");
                    return;
                }
                Err(err) => {
                    error!("error reading stdin: {}", err);
                    return;
                }
            }
        }
    });

    let mut handler_task = tokio::spawn(async move {
        Handler::new(lookup).run(input_rx, output_tx).await;
    });

    let output_task = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = output_rx.recv().await {
            if let Err(err) = stdout.write_all(line.as_bytes()).await {
                error!("error writing stdout: {}", err);
                return;
            }
            if let Err(err) = stdout.flush().await {
                error!("error flushing stdout: {}", err);
                return;
            }
        }
    });

    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down");
        }
        _ = &mut handler_task => {
            // Input ended; let the output task drain the pending replies.
            let _ = output_task.await;
            input_task.abort();
            return Ok(());
        }
    }

    input_task.abort();
    output_task.abort();
    Ok(())
}
