use std::sync::Arc;

use tokio::sync::mpsc;

use powerdns_consul::config::Config;
use powerdns_consul::pdns::Handler;
use powerdns_consul::resolver::Resolver;
use powerdns_consul::server::ResolverLookup;
use powerdns_consul::store::MemoryStore;

fn test_config() -> Config {
    Config {
        hostname: "ns.example.com.".to_string(),
        hostmaster_email_address: "hostmaster.example.com.".to_string(),
        kv_backend: "memory".to_string(),
        ..Default::default()
    }
}

/// Feeds the handler a scripted session and collects everything it
/// writes back, in order.
async fn drive(store: Arc<MemoryStore>, lines: &[&str]) -> Vec<String> {
    let resolver = Resolver::new(test_config(), store);
    let handler = Handler::new(ResolverLookup::new(resolver));

    let (input_tx, input_rx) = mpsc::channel(8);
    let (output_tx, mut output_rx) = mpsc::channel(64);
    let task = tokio::spawn(async move { handler.run(input_rx, output_tx).await });

    for line in lines {
        input_tx.send(line.to_string()).await.unwrap();
    }
    drop(input_tx);
    task.await.unwrap();

    let mut output = Vec::new();
    while let Some(line) = output_rx.recv().await {
        output.push(line);
    }
    output
}

#[tokio::test]
async fn test_handshake_and_simple_query() {
    let store = Arc::new(MemoryStore::new());
    store.put_with_index("zones/example.com/A", br#"[{"Payload":"10.0.0.1"}]"#, 1);

    let output = drive(
        store,
        &[
            "HELO\t2",
            "Q\texample.com\tIN\tA\t-1\t127.0.0.1\t127.0.0.1",
        ],
    )
    .await;

    assert_eq!(
        output,
        vec![
            "OK\tpowerdns-consul\n",
            "DATA\texample.com\tIN\tA\t60\t1\t10.0.0.1\n",
            "END\n",
        ]
    );
}

#[tokio::test]
async fn test_rejected_handshake_keeps_waiting() {
    let store = Arc::new(MemoryStore::new());
    store.put_with_index("zones/example.com/A", br#"[{"Payload":"10.0.0.1"}]"#, 1);

    let output = drive(
        store,
        &[
            "HELO\t1",
            "HELO\t2",
            "Q\texample.com\tIN\tA\t-1\t127.0.0.1\t127.0.0.1",
        ],
    )
    .await;

    assert_eq!(
        output,
        vec![
            "FAIL\n",
            "OK\tpowerdns-consul\n",
            "DATA\texample.com\tIN\tA\t60\t1\t10.0.0.1\n",
            "END\n",
        ]
    );
}

#[tokio::test]
async fn test_apex_any_query_synthesizes_soa_first() {
    let store = Arc::new(MemoryStore::new());
    store.put_with_index("zones/example.com/A", br#"[{"Payload":"10.0.0.1"}]"#, 1);
    store.put_with_index("zones/example.com/CNAME", b"invalid_json", 2);

    let output = drive(
        store,
        &[
            "HELO\t2",
            "Q\texample.com\tIN\tANY\t-1\t127.0.0.1\t127.0.0.1",
        ],
    )
    .await;

    assert_eq!(output.len(), 4);
    assert_eq!(output[0], "OK\tpowerdns-consul\n");
    // The serial is date-derived, so only the payload prefix is fixed.
    assert!(output[1].starts_with(
        "DATA\texample.com\tIN\tSOA\t60\t1\tns.example.com. hostmaster.example.com. "
    ));
    // The malformed CNAME key is dropped without failing the query.
    assert_eq!(output[2], "DATA\texample.com\tIN\tA\t60\t1\t10.0.0.1\n");
    assert_eq!(output[3], "END\n");
}

#[tokio::test]
async fn test_unmatched_zone_answers_empty() {
    let store = Arc::new(MemoryStore::new());
    store.put_with_index("zones/example.com/A", br#"[{"Payload":"10.0.0.1"}]"#, 1);

    let output = drive(
        store,
        &[
            "HELO\t2",
            "Q\texample.org\tIN\tA\t-1\t127.0.0.1\t127.0.0.1",
        ],
    )
    .await;

    assert_eq!(output, vec!["OK\tpowerdns-consul\n", "END\n"]);
}

#[tokio::test]
async fn test_sub_label_query() {
    let store = Arc::new(MemoryStore::new());
    store.put_with_index(
        "zones/example.com/www/CNAME",
        br#"[{"TTL":300,"Payload":"example.com."}]"#,
        1,
    );

    let output = drive(
        store,
        &[
            "HELO\t2",
            "Q\twww.example.com\tIN\tCNAME\t-1\t127.0.0.1\t127.0.0.1",
        ],
    )
    .await;

    assert_eq!(
        output,
        vec![
            "OK\tpowerdns-consul\n",
            "DATA\twww.example.com\tIN\tCNAME\t300\t1\texample.com.\n",
            "END\n",
        ]
    );
}

#[tokio::test]
async fn test_ping_and_malformed_lines() {
    let store = Arc::new(MemoryStore::new());

    let output = drive(
        store,
        &["HELO\t2", "PING\t\t\t\t\t\t", "BOGUS\tline", "Q\ttoo\tshort"],
    )
    .await;

    assert_eq!(
        output,
        vec![
            "OK\tpowerdns-consul\n",
            "PONG\n",
            "END\n",
            "FAIL\n",
            "END\n",
            "FAIL\n",
            "END\n",
        ]
    );
}

#[tokio::test]
async fn test_axfr_is_acknowledged_without_records() {
    let store = Arc::new(MemoryStore::new());

    let output = drive(store, &["HELO\t2", "AXFR\t\t\t\t\t\t"]).await;
    assert_eq!(output, vec!["OK\tpowerdns-consul\n", "END\n"]);
}

#[tokio::test]
async fn test_soa_serial_advances_when_zone_changes() {
    let store = Arc::new(MemoryStore::new());
    store.put_with_index("zones/example.com/A", br#"[{"Payload":"10.0.0.1"}]"#, 1);

    let first = drive(
        store.clone(),
        &[
            "HELO\t2",
            "Q\texample.com\tIN\tSOA\t-1\t127.0.0.1\t127.0.0.1",
        ],
    )
    .await;

    // Mutate the zone, then query again: the serial must move.
    store.put_with_index("zones/example.com/A", br#"[{"Payload":"10.0.0.2"}]"#, 50);

    let second = drive(
        store,
        &[
            "HELO\t2",
            "Q\texample.com\tIN\tSOA\t-1\t127.0.0.1\t127.0.0.1",
        ],
    )
    .await;

    assert_eq!(first.len(), 3);
    assert_eq!(second.len(), 3);
    assert_ne!(first[1], second[1]);
}
