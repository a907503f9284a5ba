//! End-to-end scenarios over loopback UDP: a manager context talking to
//! an in-process agent.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use snmp_engine::agent::{Agent, NoopTransactions};
use snmp_engine::{
    oid, ClientRequest, ErrorStatus, MessageBody, PduType, SnmpMessage, StatKind, TrapV1Pdu,
    Value, VarBind, Version,
};

#[tokio::test]
async fn get_roundtrip() {
    let (agent, _store) = map_agent(&[(
        snmp_engine::oid::mib2::sys_descr(),
        Value::from("hello"),
    )])
    .await;
    let ctx = manager().await;

    let resp = ctx
        .send_request(quick_get(
            agent.local_addr(),
            [snmp_engine::oid::mib2::sys_descr()],
        ))
        .await
        .unwrap();

    assert_eq!(resp.pdu_type, PduType::Response);
    assert_eq!(resp.error_status, 0);
    assert_eq!(
        resp.varbinds,
        vec![VarBind::new(
            snmp_engine::oid::mib2::sys_descr(),
            Value::from("hello")
        )]
    );

    ctx.shutdown().await;
    agent.shutdown().await;
}

#[tokio::test]
async fn unknown_oid_answers_no_such_object() {
    let (agent, _store) = map_agent(&[
        (oid!(1, 3, 6, 1, 4, 1, 1, 1, 0), Value::Integer(1)),
        (oid!(1, 3, 6, 1, 4, 1, 1, 2, 0), Value::Integer(2)),
    ])
    .await;
    let ctx = manager().await;

    let resp = ctx
        .send_request(quick_get(agent.local_addr(), [oid!(1, 3, 6, 1, 4, 1, 2, 0)]))
        .await
        .unwrap();

    assert_eq!(resp.error_status, 0);
    assert_eq!(
        resp.varbinds,
        vec![VarBind::new(oid!(1, 3, 6, 1, 4, 1, 2, 0), Value::NoSuchObject)]
    );

    ctx.shutdown().await;
    agent.shutdown().await;
}

#[tokio::test]
async fn mixed_get_preserves_varbind_order() {
    let (agent, _store) = map_agent(&[(oid!(1, 3, 6, 1, 4, 1, 1, 1, 0), Value::Integer(7))]).await;
    let ctx = manager().await;

    let resp = ctx
        .send_request(quick_get(
            agent.local_addr(),
            [oid!(1, 3, 6, 1, 4, 1, 9, 9, 0), oid!(1, 3, 6, 1, 4, 1, 1, 1, 0)],
        ))
        .await
        .unwrap();

    assert_eq!(resp.varbinds.len(), 2);
    assert_eq!(resp.varbinds[0].value, Value::NoSuchObject);
    assert_eq!(resp.varbinds[1].value, Value::Integer(7));

    ctx.shutdown().await;
    agent.shutdown().await;
}

#[tokio::test]
async fn set_updates_the_store() {
    let target_oid = oid!(1, 3, 6, 1, 4, 1, 7, 1, 0);
    let (agent, store) = map_agent(&[(target_oid.clone(), Value::Integer(1))]).await;
    let ctx = manager().await;

    let resp = ctx
        .send_request(
            ClientRequest::set(
                agent.local_addr(),
                &b"private"[..],
                vec![VarBind::new(target_oid.clone(), Value::Integer(99))],
            )
            .timeout(Duration::from_secs(2)),
        )
        .await
        .unwrap();

    assert_eq!(resp.error_status, 0);
    assert_eq!(resp.varbinds[0].value, Value::Integer(99));
    assert_eq!(
        store.lock().unwrap().get(&target_oid),
        Some(&Value::Integer(99))
    );

    ctx.shutdown().await;
    agent.shutdown().await;
}

#[tokio::test]
async fn handler_error_reports_gen_err() {
    let agent = Agent::builder("failing-agent", 8, NoopTransactions)
        .bind_addr(loopback())
        .register_single_var_handler(oid!(1, 3, 6, 1, 4, 1, 5, 0), Arc::new(FailingHandler))
        .start()
        .await
        .unwrap();
    let ctx = manager().await;

    let resp = ctx
        .send_request(quick_get(agent.local_addr(), [oid!(1, 3, 6, 1, 4, 1, 5, 0)]))
        .await
        .unwrap();

    assert_eq!(resp.error_status_enum(), ErrorStatus::GenErr);
    assert_eq!(resp.error_index, 1);
    // the failing varbind is echoed back rather than dropped
    assert_eq!(resp.varbinds.len(), 1);
    assert_eq!(resp.varbinds[0].oid, oid!(1, 3, 6, 1, 4, 1, 5, 0));

    ctx.shutdown().await;
    agent.shutdown().await;
}

#[tokio::test]
async fn unsupported_request_types_report_gen_err() {
    let covered = oid!(1, 3, 6, 1, 4, 1, 5, 0);
    let (agent, _store) = map_agent(&[(covered.clone(), Value::Integer(3))]).await;
    let ctx = manager().await;

    // single-variable handlers have no next-lexicographic semantics
    let resp = ctx
        .send_request(
            ClientRequest::get_next(agent.local_addr(), &b"public"[..], [covered.clone()])
                .timeout(Duration::from_secs(2)),
        )
        .await
        .unwrap();
    assert_eq!(resp.error_status_enum(), ErrorStatus::GenErr);
    assert_eq!(resp.error_index, 1);
    assert_eq!(resp.varbinds, vec![VarBind::null(covered.clone())]);

    let resp = ctx
        .send_request(
            ClientRequest::get_bulk(agent.local_addr(), &b"public"[..], 0, 10, [covered.clone()])
                .timeout(Duration::from_secs(2)),
        )
        .await
        .unwrap();
    assert_eq!(resp.error_status_enum(), ErrorStatus::GenErr);
    assert_eq!(resp.error_index, 1);
    assert_eq!(resp.varbinds, vec![VarBind::null(covered)]);

    ctx.shutdown().await;
    agent.shutdown().await;
}

#[tokio::test]
async fn no_transaction_reports_resource_unavailable() {
    let agent = Agent::builder("denying-agent", 8, DenyingProvider)
        .bind_addr(loopback())
        .register_single_var_handler(
            oid!(1, 3, 6, 1, 4, 1, 5, 0),
            Arc::new(MapHandler::new(Default::default())),
        )
        .start()
        .await
        .unwrap();
    let ctx = manager().await;

    let resp = ctx
        .send_request(quick_get(agent.local_addr(), [oid!(1, 3, 6, 1, 4, 1, 5, 0)]))
        .await
        .unwrap();

    assert_eq!(resp.error_status_enum(), ErrorStatus::ResourceUnavailable);
    assert_eq!(resp.error_index, 1);
    assert!(resp.varbinds.is_empty());

    ctx.shutdown().await;
    agent.shutdown().await;
}

#[tokio::test]
async fn failed_set_aborts_the_transaction() {
    let provider = CountingProvider::default();
    let commits = provider.commits.clone();
    let aborts = provider.aborts.clone();

    let agent = Agent::builder("aborting-agent", 8, provider)
        .bind_addr(loopback())
        .register_single_var_handler(oid!(1, 3, 6, 1, 4, 1, 5, 0), Arc::new(FailingHandler))
        .start()
        .await
        .unwrap();
    let ctx = manager().await;

    let resp = ctx
        .send_request(
            ClientRequest::set(
                agent.local_addr(),
                &b"private"[..],
                vec![VarBind::new(oid!(1, 3, 6, 1, 4, 1, 5, 0), Value::Integer(1))],
            )
            .timeout(Duration::from_secs(2)),
        )
        .await
        .unwrap();

    assert_eq!(resp.error_status_enum(), ErrorStatus::GenErr);
    assert_eq!(aborts.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(commits.load(std::sync::atomic::Ordering::SeqCst), 0);

    ctx.shutdown().await;
    agent.shutdown().await;
}

#[tokio::test]
async fn successful_get_commits_the_transaction() {
    let provider = CountingProvider::default();
    let commits = provider.commits.clone();

    let agent = Agent::builder("committing-agent", 8, provider)
        .bind_addr(loopback())
        .register_single_var_handler(
            oid!(1, 3, 6, 1, 4, 1, 5, 0),
            Arc::new(MapHandler::new(Arc::new(std::sync::Mutex::new(
                [(oid!(1, 3, 6, 1, 4, 1, 5, 0), Value::Integer(3))]
                    .into_iter()
                    .collect(),
            )))),
        )
        .start()
        .await
        .unwrap();
    let ctx = manager().await;

    let resp = ctx
        .send_request(quick_get(agent.local_addr(), [oid!(1, 3, 6, 1, 4, 1, 5, 0)]))
        .await
        .unwrap();

    assert_eq!(resp.error_status, 0);
    assert_eq!(commits.load(std::sync::atomic::Ordering::SeqCst), 1);

    ctx.shutdown().await;
    agent.shutdown().await;
}

#[tokio::test]
async fn malformed_datagram_is_counted_not_fatal() {
    let (agent, _store) =
        map_agent(&[(oid!(1, 3, 6, 1, 4, 1, 1, 0), Value::Integer(1))]).await;

    let probe = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    probe
        .send_to(&[0x30, 0x05, 0xFF], agent.local_addr())
        .await
        .unwrap();

    wait_stat(&agent, StatKind::InboundMessagesUndecodable, 1).await;

    // the listener is still alive and serving
    let ctx = manager().await;
    let resp = ctx
        .send_request(quick_get(agent.local_addr(), [oid!(1, 3, 6, 1, 4, 1, 1, 0)]))
        .await
        .unwrap();
    assert_eq!(resp.varbinds[0].value, Value::Integer(1));

    ctx.shutdown().await;
    agent.shutdown().await;
}

#[tokio::test]
async fn timeout_with_retries_counts_attempts() {
    // an "agent" that never answers
    let silent = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let silent_addr = silent.local_addr().unwrap();

    let ctx = manager().await;
    let err = ctx
        .send_request(
            ClientRequest::get(silent_addr, &b"public"[..], [oid!(1, 3, 6, 1)])
                .timeout(Duration::from_millis(100))
                .retries(2),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        snmp_engine::Error::Timeout { target, retries: 2, .. } if target == silent_addr
    ));

    // three attempts arrived on the wire
    let mut buf = [0u8; 2000];
    let mut attempts = 0;
    for _ in 0..3 {
        match tokio::time::timeout(Duration::from_millis(500), silent.recv_from(&mut buf)).await {
            Ok(Ok(_)) => attempts += 1,
            _ => break,
        }
    }
    assert_eq!(attempts, 3);

    wait_stat(&ctx, StatKind::RequestsTimedOut, 2).await;
    wait_stat(&ctx, StatKind::RequestRetriesExhausted, 1).await;
    wait_stat(&ctx, StatKind::RequestsForwardedToFlowControl, 3).await;
    assert_eq!(ctx.stat(StatKind::RequestsSent, 0).await.unwrap(), 1);

    ctx.shutdown().await;
}

#[tokio::test]
async fn traps_are_counted_and_dropped() {
    let (agent, _store) = map_agent(&[(oid!(1, 3, 6, 1, 4, 1, 1, 0), Value::Integer(1))]).await;
    let probe = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();

    // v1 trap
    let trap = SnmpMessage {
        version: Version::V1,
        community: bytes::Bytes::from_static(b"public"),
        body: MessageBody::TrapV1(TrapV1Pdu {
            enterprise: oid!(1, 3, 6, 1, 4, 1, 42),
            agent_addr: [127, 0, 0, 1],
            generic_trap: 0,
            specific_trap: 0,
            time_stamp: 1,
            varbinds: vec![],
        }),
        peer: agent.local_addr(),
    };
    probe
        .send_to(&trap.encode(), agent.local_addr())
        .await
        .unwrap();
    wait_stat(&agent, StatKind::V1TrapsReceived, 1).await;

    // v2 trap: an ordinary PDU under the TrapV2 tag
    let mut v2 = snmp_engine::Pdu::get_request([oid!(1, 3, 6, 1)]);
    v2.pdu_type = PduType::TrapV2;
    let msg = SnmpMessage::community(Version::V2c, &b"public"[..], v2, agent.local_addr());
    probe
        .send_to(&msg.encode(), agent.local_addr())
        .await
        .unwrap();
    wait_stat(&agent, StatKind::V2TrapsReceived, 1).await;

    agent.shutdown().await;
}

#[tokio::test]
async fn request_to_manager_counts_no_processor() {
    let ctx = manager().await;
    let probe = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let mut pdu = snmp_engine::Pdu::get_request([oid!(1, 3, 6, 1)]);
    pdu.request_id = 1;
    let msg = SnmpMessage::community(Version::V2c, &b"public"[..], pdu, ctx.local_addr());
    probe.send_to(&msg.encode(), ctx.local_addr()).await.unwrap();

    wait_stat(&ctx, StatKind::CommunityRequestWithNoProcessor, 1).await;
    wait_stat(&ctx, StatKind::GetRequestsReceived, 1).await;

    ctx.shutdown().await;
}

#[tokio::test]
async fn stats_bin_snapshot_and_bounds() {
    let (agent, _store) = map_agent(&[(oid!(1, 3, 6, 1, 4, 1, 1, 0), Value::Integer(1))]).await;
    let ctx = manager().await;

    ctx.send_request(quick_get(agent.local_addr(), [oid!(1, 3, 6, 1, 4, 1, 1, 0)]))
        .await
        .unwrap();

    wait_stat(&ctx, StatKind::ResponsesReleasedToClient, 1).await;
    let bin = ctx.stats_bin(0).await.unwrap();
    assert_eq!(bin.get(StatKind::RequestsSent), 1);
    assert_eq!(bin.get(StatKind::OutboundMessagesSent), 1);
    assert_eq!(bin.get(StatKind::ResponsesReceived), 1);

    // bins that have not rolled over yet are unavailable
    assert!(matches!(
        ctx.stats_bin(1).await,
        Err(snmp_engine::Error::BinUnavailable { bin: 1 })
    ));
    assert!(matches!(
        ctx.stat(StatKind::RequestsSent, 200).await,
        Err(snmp_engine::Error::BinUnavailable { bin: 200 })
    ));

    ctx.shutdown().await;
    agent.shutdown().await;
}
