//! End-to-end tests of the connection multiplexer and cursor engine against
//! a scripted in-process server.

mod support;

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use photondb_client::{connect, r, Datum, Error};

async fn connect_to(server: &support::MockServer) -> photondb_client::Connection {
    connect("127.0.0.1", server.addr.port(), "")
        .await
        .expect("connect to mock")
}

#[tokio::test]
async fn arithmetic_atom_query() {
    let mut server = support::spawn(|token, envelope| {
        assert_eq!(support::query_type(envelope), 1);
        vec![(token, json!({"t": 1, "r": [3]}))]
    })
    .await;
    let conn = connect_to(&server).await;

    let cursor = (r::expr(1) + 2).run(&conn).await.unwrap();
    assert!(cursor.is_single());
    let result = cursor.to_datum().await.unwrap();
    assert_eq!(result, Datum::Number(3.0));

    let (_, envelope) = server.next_frame().await;
    assert_eq!(envelope, json!([1, [24, [1, 2]]]));
}

#[tokio::test]
async fn range_count_returns_atom() {
    let mut server = support::spawn(|token, _| vec![(token, json!({"t": 1, "r": [4]}))]).await;
    let conn = connect_to(&server).await;

    let result = r::range(4)
        .count()
        .run(&conn)
        .await
        .unwrap()
        .to_datum()
        .await
        .unwrap();
    assert_eq!(result, Datum::Number(4.0));

    let (_, envelope) = server.next_frame().await;
    assert_eq!(envelope, json!([1, [43, [[173, [4]]]]]));
}

#[tokio::test]
async fn handshake_rejection_reports_server_message() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut greeting = [0u8; 12];
        stream.read_exact(&mut greeting).await.unwrap();
        stream.write_all(b"ERROR: unauthorized\0").await.unwrap();
    });

    match connect("127.0.0.1", addr.port(), "").await {
        Err(Error::Auth(message)) => assert_eq!(message, "ERROR: unauthorized"),
        other => panic!("unexpected connect result: {other:?}"),
    }
}

#[tokio::test]
async fn tokens_are_strictly_increasing() {
    let mut server = support::spawn(|token, _| vec![(token, json!({"t": 1, "r": [null]}))]).await;
    let conn = connect_to(&server).await;

    for _ in 0..3 {
        r::expr(1).run(&conn).await.unwrap();
    }

    let (t1, _) = server.next_frame().await;
    let (t2, _) = server.next_frame().await;
    let (t3, _) = server.next_frame().await;
    assert!(t1 < t2 && t2 < t3, "tokens {t1}, {t2}, {t3}");
    assert_eq!(t1, 1);
}

fn streaming_handler(
    total: u64,
    batch: u64,
) -> impl FnMut(u64, &Value) -> Vec<(u64, Value)> + Send + 'static {
    let mut progress: HashMap<u64, u64> = HashMap::new();
    move |token, envelope| {
        let sent = progress.entry(token).or_insert(0);
        match support::query_type(envelope) {
            1 | 2 => {
                let start = *sent;
                let end = (start + batch).min(total);
                *sent = end;
                let kind = if end == total { 2 } else { 3 };
                let values: Vec<u64> = (start..end).collect();
                vec![(token, json!({"t": kind, "r": values}))]
            }
            3 => vec![(token, json!({"t": 2, "r": []}))],
            other => panic!("unexpected query type {other}"),
        }
    }
}

#[tokio::test]
async fn streamed_range_yields_in_order() {
    let server = support::spawn(streaming_handler(10_000, 500)).await;
    let conn = connect_to(&server).await;

    let mut cursor = r::range(10_000).run(&conn).await.unwrap();
    let mut expected = 0u64;
    while let Some(datum) = cursor.try_next().await.unwrap() {
        assert_eq!(datum, Datum::Number(expected as f64));
        expected += 1;
    }
    assert_eq!(expected, 10_000);
    assert!(matches!(cursor.next().await, Err(Error::NoMoreData)));
}

#[tokio::test]
async fn to_array_after_partial_consumption_keeps_the_tail() {
    let server = support::spawn(streaming_handler(10_000, 500)).await;
    let conn = connect_to(&server).await;

    let mut cursor = r::range(10_000).run(&conn).await.unwrap();
    assert_eq!(cursor.next().await.unwrap(), Datum::Number(0.0));

    let rest = cursor.to_array().await.unwrap();
    assert_eq!(rest.len(), 9_999);
    assert_eq!(rest[0], Datum::Number(1.0));
    assert_eq!(rest[9_998], Datum::Number(9_999.0));
}

#[tokio::test]
async fn each_invokes_callback_in_order() {
    let server =
        support::spawn(|token, _| vec![(token, json!({"t": 2, "r": [0, 1, 2]}))]).await;
    let conn = connect_to(&server).await;

    let mut cursor = r::range(3).run(&conn).await.unwrap();
    let mut seen = Vec::new();
    cursor.each(|datum| seen.push(datum)).await.unwrap();
    assert_eq!(
        seen,
        vec![Datum::Number(0.0), Datum::Number(1.0), Datum::Number(2.0)]
    );
}

#[tokio::test]
async fn noreply_returns_terminated_cursor_without_blocking() {
    let mut server = support::spawn(|_, envelope| {
        assert_eq!(support::query_type(envelope), 1);
        Vec::new() // a noreply query gets no response
    })
    .await;
    let conn = connect_to(&server).await;

    let options = photondb_client::OptArgs::new().with("noreply", true);
    let doc = r::object(vec![r::expr("k"), r::expr(1)]);
    let cursor = r::table("x").insert(doc).run_with(&conn, options).await.unwrap();
    assert!(cursor.no_more());
    assert!(cursor.is_single());

    let (_, envelope) = server.next_frame().await;
    assert_eq!(envelope.get(2), Some(&json!({"noreply": true})));
    assert_eq!(cursor.to_datum().await.unwrap(), Datum::Null);
}

#[tokio::test]
async fn dropping_a_streaming_cursor_sends_stop_and_no_more_continues() {
    let mut server = support::spawn(streaming_handler(10_000, 500)).await;
    let conn = connect_to(&server).await;

    let cursor = r::range(10_000).run(&conn).await.unwrap();
    let token = cursor.token();

    let (start_token, start) = server.next_frame().await;
    assert_eq!(start_token, token);
    assert_eq!(support::query_type(&start), 1);

    drop(cursor);

    let (stop_token, stop) = server.next_frame().await;
    assert_eq!(stop_token, token);
    assert_eq!(stop, json!([3]));

    // no CONTINUE may follow the STOP
    server.assert_quiet(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn responses_demultiplex_by_token_in_order() {
    let server = support::spawn({
        let mut progress: HashMap<u64, u64> = HashMap::new();
        move |token, envelope| {
            let sent = progress.entry(token).or_insert(0);
            match support::query_type(envelope) {
                1 | 2 => {
                    let start = *sent;
                    *sent += 2;
                    let kind = if *sent >= 6 { 2 } else { 3 };
                    let values: Vec<String> =
                        (start..start + 2).map(|i| format!("{token}-{i}")).collect();
                    vec![(token, json!({"t": kind, "r": values}))]
                }
                3 => vec![(token, json!({"t": 2, "r": []}))],
                other => panic!("unexpected query type {other}"),
            }
        }
    })
    .await;
    let conn = connect_to(&server).await;

    let mut first = r::expr("a").run(&conn).await.unwrap();
    let mut second = r::expr("b").run(&conn).await.unwrap();
    let (t1, t2) = (first.token(), second.token());

    for i in 0..6 {
        let from_first = first.next().await.unwrap();
        let from_second = second.next().await.unwrap();
        assert_eq!(from_first, Datum::String(format!("{t1}-{i}")));
        assert_eq!(from_second, Datum::String(format!("{t2}-{i}")));
    }
    assert!(!first.has_next().await.unwrap());
    assert!(!second.has_next().await.unwrap());
}

#[tokio::test]
async fn pull_timeout_leaves_token_usable() {
    let server = support::spawn(|token, envelope| {
        match support::query_type(envelope) {
            1 => vec![(token, json!({"t": 3, "r": [0]}))],
            _ => Vec::new(), // never answer CONTINUE
        }
    })
    .await;
    let conn = connect_to(&server).await;

    let cursor = r::range(10).run(&conn).await.unwrap();
    let mut cursor = cursor.with_timeout(Duration::from_millis(100));
    assert_eq!(cursor.next().await.unwrap(), Datum::Number(0.0));
    assert!(matches!(cursor.next().await, Err(Error::Timeout)));
    // the token stays valid: a second pull times out again instead of
    // reporting a closed stream
    assert!(matches!(cursor.next().await, Err(Error::Timeout)));
}

#[tokio::test]
async fn close_wakes_pending_waiters() {
    let server = support::spawn(|token, envelope| match support::query_type(envelope) {
        1 => vec![(token, json!({"t": 3, "r": []}))],
        _ => Vec::new(),
    })
    .await;
    let conn = connect_to(&server).await;

    let mut cursor = r::range(10).run(&conn).await.unwrap();
    let waiter = tokio::spawn(async move { cursor.next().await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    conn.close().await.unwrap();

    match waiter.await.unwrap() {
        Err(Error::ConnectionClosed) => {}
        other => panic!("unexpected result: {other:?}"),
    }

    // the connection is closed for further work, and close is idempotent
    assert!(matches!(
        r::expr(1).run(&conn).await,
        Err(Error::ConnectionClosed)
    ));
    conn.close().await.unwrap();
}

#[tokio::test]
async fn server_errors_surface_with_their_kind() {
    let server = support::spawn(|token, _| {
        vec![(
            token,
            json!({"t": 18, "r": ["Table `x` does not exist"], "e": 3_100_000, "b": []}),
        )]
    })
    .await;
    let conn = connect_to(&server).await;

    match r::table("x").run(&conn).await {
        Err(Error::Server { kind, message, .. }) => {
            assert_eq!(kind, photondb_client::ServerErrorKind::NonExistence);
            assert_eq!(message, "Table `x` does not exist");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn malformed_atom_is_a_protocol_error() {
    let server = support::spawn(|token, _| vec![(token, json!({"t": 1, "r": [1, 2]}))]).await;
    let conn = connect_to(&server).await;

    assert!(matches!(
        r::expr(1).run(&conn).await,
        Err(Error::Protocol(_))
    ));
}

#[tokio::test]
async fn frames_for_unknown_tokens_are_dropped() {
    let server = support::spawn(|token, _| {
        vec![
            (9_999_999, json!({"t": 1, "r": ["stray"]})),
            (token, json!({"t": 1, "r": [7]})),
        ]
    })
    .await;
    let conn = connect_to(&server).await;

    let result = r::expr(7).run(&conn).await.unwrap().to_datum().await.unwrap();
    assert_eq!(result, Datum::Number(7.0));
}

#[tokio::test]
async fn noreply_wait_and_server_info_round_trip() {
    let server = support::spawn(|token, envelope| match support::query_type(envelope) {
        4 => vec![(token, json!({"t": 4, "r": []}))],
        5 => vec![(token, json!({"t": 5, "r": [{"name": "mock", "id": "00"}]}))],
        _ => vec![(token, json!({"t": 1, "r": [null]}))],
    })
    .await;
    let conn = connect_to(&server).await;

    conn.noreply_wait().await.unwrap();
    let info = conn.server_info().await.unwrap();
    assert_eq!(info.get_field("name").and_then(Datum::get_string), Some("mock"));
}

#[tokio::test]
async fn run_refuses_queries_with_free_variables() {
    let server = support::spawn(|token, _| vec![(token, json!({"t": 1, "r": [null]}))]).await;
    let conn = connect_to(&server).await;

    let mut escaped = None;
    let _function = r::func1(|x| {
        escaped = Some(r::expr(x.clone()));
        r::expr(x)
    });
    let query = escaped.expect("variable captured") + 1;

    match query.run(&conn).await {
        Err(Error::Driver(message)) => assert!(message.contains("free variables")),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn partially_consumed_single_cursor_drains_to_the_tail() {
    let server = support::spawn(|token, _| {
        vec![(token, json!({"t": 1, "r": [[10, 20, 30]]}))]
    })
    .await;
    let conn = connect_to(&server).await;

    let mut cursor = r::expr(vec![10, 20, 30]).run(&conn).await.unwrap();
    assert!(cursor.is_single());
    assert_eq!(cursor.next().await.unwrap(), Datum::Number(10.0));

    // pulling unwrapped the atom, so the rest drains as an array
    assert!(!cursor.is_single());
    let rest = cursor.to_datum().await.unwrap();
    assert_eq!(
        rest,
        Datum::Array(vec![Datum::Number(20.0), Datum::Number(30.0)])
    );
}

#[tokio::test]
async fn single_atom_unwraps_for_iteration_and_to_array() {
    let server = support::spawn(|token, _| {
        vec![(token, json!({"t": 1, "r": [[10, 20, 30]]}))]
    })
    .await;
    let conn = connect_to(&server).await;

    let cursor = r::expr(vec![10, 20, 30]).run(&conn).await.unwrap();
    let values = cursor.to_array().await.unwrap();
    assert_eq!(
        values,
        vec![Datum::Number(10.0), Datum::Number(20.0), Datum::Number(30.0)]
    );

    // a non-array atom refuses to become an array
    let cursor = r::expr(42).run(&conn).await.unwrap();
    assert!(matches!(cursor.to_array().await, Err(Error::Driver(_))));
}
