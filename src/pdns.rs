use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::{BackendError, Result};

const GREETING_ABI_V2: &str = "HELO\t2";
const GREETING_REPLY: &str = "OK\tpowerdns-consul\n";
const END_REPLY: &str = "END\n";
const FAIL_REPLY: &str = "FAIL\n";
const PONG_REPLY: &str = "PONG\n";

const KIND_Q: &str = "Q";
const KIND_PING: &str = "PING";
const KIND_AXFR: &str = "AXFR";

/// Longest input line the handler accepts. An overlong line aborts the
/// handler; recovery is best-effort only.
pub const MAX_LINE_LEN: usize = 16 * 1024;

/// A request line from the frontend, split into its tab-separated fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub kind: String,
    pub qname: String,
    pub qclass: String,
    pub qtype: String,
    pub id: String,
    pub remote_ip: String,
    pub local_ip: String,
}

/// One `DATA` line of a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub qname: String,
    pub qclass: String,
    pub qtype: String,
    pub ttl: String,
    pub id: String,
    pub content: String,
}

/// Resolves a parsed request into response lines.
#[async_trait]
pub trait Lookup: Send + Sync {
    async fn lookup(&self, request: &Request) -> Result<Vec<Response>>;
}

fn parse_request(line: &str) -> Result<Request> {
    let tokens: Vec<&str> = line.split('\t').collect();

    match tokens[0] {
        KIND_Q => {
            if tokens.len() < 7 {
                return Err(BackendError::Protocol(format!(
                    "unparseable line: {line:?}"
                )));
            }

            Ok(Request {
                kind: KIND_Q.to_string(),
                qname: tokens[1].to_string(),
                qclass: tokens[2].to_string(),
                qtype: tokens[3].to_string(),
                id: tokens[4].to_string(),
                remote_ip: tokens[5].to_string(),
                local_ip: tokens[6].to_string(),
            })
        }
        KIND_PING | KIND_AXFR => Ok(Request {
            kind: tokens[0].to_string(),
            ..Default::default()
        }),
        _ => Err(BackendError::Protocol(format!(
            "unparseable line: {line:?}"
        ))),
    }
}

fn format_response(response: &Response) -> String {
    format!(
        "DATA\t{}\t{}\t{}\t{}\t{}\t{}\n",
        response.qname,
        response.qclass,
        response.qtype,
        response.ttl,
        response.id,
        response.content,
    )
}

/// The co-process protocol state machine.
///
/// Starts out awaiting the `HELO\t2` handshake; once greeted, every
/// input line produces exactly one `END\n`-terminated response.
pub struct Handler<L> {
    lookup: L,
}

impl<L: Lookup> Handler<L> {
    pub fn new(lookup: L) -> Self {
        Self { lookup }
    }

    /// Drives the state machine until the input channel closes. Replies
    /// go out in request order; the output side serializes the writes.
    pub async fn run(&self, mut input: mpsc::Receiver<String>, output: mpsc::Sender<String>) {
        info!("started handler");
        let mut handshake_received = false;

        while let Some(line) = input.recv().await {
            for reply in self.process(&mut handshake_received, &line).await {
                if output.send(reply).await.is_err() {
                    return;
                }
            }
        }
    }

    /// Handles one input line, returning the reply lines it produces.
    async fn process(&self, handshake_received: &mut bool, line: &str) -> Vec<String> {
        if !*handshake_received {
            if line == GREETING_ABI_V2 {
                *handshake_received = true;
                return vec![GREETING_REPLY.to_string()];
            }

            warn!("handshake failed: {:?} != {:?}", line, GREETING_ABI_V2);
            return vec![FAIL_REPLY.to_string()];
        }

        let request = match parse_request(line) {
            Ok(request) => request,
            Err(err) => {
                warn!("failed parsing request: {}", err);
                return vec![FAIL_REPLY.to_string(), END_REPLY.to_string()];
            }
        };

        match request.kind.as_str() {
            KIND_Q => match self.lookup.lookup(&request).await {
                Ok(responses) => {
                    let mut lines: Vec<String> = responses.iter().map(format_response).collect();
                    lines.push(END_REPLY.to_string());
                    lines
                }
                Err(err) => {
                    error!("query for {} failed: {}", request.qname, err);
                    vec![FAIL_REPLY.to_string(), END_REPLY.to_string()]
                }
            },
            KIND_PING => vec![PONG_REPLY.to_string(), END_REPLY.to_string()],
            // AXFR is accepted but not implemented: terminator only.
            _ => vec![END_REPLY.to_string()],
        }
    }
}
