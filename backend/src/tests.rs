use super::*;
use crate::memory::MemoryStore;
use crate::mocks::{MockEngine, MockExecutor, CODE_TX_IN_CACHE, STATUS_SUCCESS};
use meridian_types::{
    keccak256, Account, Address, BlockNumber, Bytes, CallRequest, Log, RemovedLogsEvent,
    TransactionRecord, B256, U256,
};
use rand::{rngs::StdRng, RngCore, SeedableRng};
use std::time::Duration;
use tokio::time::timeout;

type TestBackend = Backend<MemoryStore, MockEngine, MockExecutor>;

struct Harness {
    backend: Arc<TestBackend>,
    store: Arc<MemoryStore>,
    engine: Arc<MockEngine>,
}

fn harness(genesis_height: u64) -> Harness {
    let config = Config::new(10001).validate().unwrap();
    let metrics = Arc::new(BackendMetrics::default());
    let feeds = Arc::new(EventFeeds::new(
        config.subscriber_buffer.get(),
        Arc::clone(&metrics),
    ));
    let store = Arc::new(MemoryStore::with_genesis_height(genesis_height));
    let engine = Arc::new(MockEngine::default().with_feeds(Arc::clone(&feeds)));
    let backend = Arc::new(Backend::with_feeds(
        config,
        Arc::clone(&store),
        Arc::clone(&engine),
        Arc::new(MockExecutor::default()),
        feeds,
        metrics,
    ));
    Harness {
        backend,
        store,
        engine,
    }
}

fn transfer(seed: u8, from: Address, to: Address, logs: Vec<Log>) -> TransactionRecord {
    TransactionRecord {
        hash: B256::repeat_byte(seed),
        from,
        to: Some(to),
        gas: 21_000,
        gas_used: 21_000,
        logs,
        status: 1,
        status_str: "success".into(),
        ..Default::default()
    }
}

fn random_payloads(count: usize) -> Vec<Bytes> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..count)
        .map(|_| {
            let mut raw = vec![0u8; 96];
            rng.fill_bytes(&mut raw);
            Bytes::from(raw)
        })
        .collect()
}

#[test]
fn single_transfer_is_visible_to_every_range_query() {
    let Harness { backend, store, .. } = harness(99);
    let a = Address::repeat_byte(0xa);
    let b = Address::repeat_byte(0xb);
    let t1 = B256::repeat_byte(0x71);
    let event = store.commit_block(vec![transfer(
        1,
        a,
        b,
        vec![Log {
            address: b,
            topics: vec![t1],
            ..Default::default()
        }],
    )]);
    assert_eq!(event.block.number, 100);

    let query = backend.query();
    let by_src = query.query_tx_by_src(&a, 100, 100).unwrap();
    assert_eq!(by_src.len(), 1);
    assert_eq!(by_src[0].hash, B256::repeat_byte(1));

    let by_dst = query.query_tx_by_dst(&b, 100, 100).unwrap();
    assert_eq!(by_dst.len(), 1);
    assert_eq!(by_dst[0].hash, B256::repeat_byte(1));

    assert!(query.query_tx_by_src(&b, 100, 100).unwrap().is_empty());
    assert!(query.query_tx_by_dst(&a, 100, 100).unwrap().is_empty());

    let logs = query.query_logs(vec![], vec![vec![t1]], 100, 100).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].address, b);
    assert_eq!(logs[0].transaction_hash, B256::repeat_byte(1));
    assert_eq!(logs[0].block_hash, event.hash);

    assert_eq!(query.query_logs(vec![], vec![], 100, 100).unwrap(), event.logs);
    assert!(query.query_logs(vec![], vec![], 101, 100).unwrap().is_empty());
    assert_eq!(store.open_readers(), 0);
}

#[tokio::test]
async fn concurrent_submissions_resolve_independently() {
    let Harness {
        backend, engine, ..
    } = harness(0);
    let payloads = random_payloads(32);

    let handles: Vec<_> = payloads
        .iter()
        .cloned()
        .map(|raw| {
            let backend = Arc::clone(&backend);
            tokio::spawn(async move { backend.submission().send_raw_tx(raw).await })
        })
        .collect();

    for (raw, handle) in payloads.iter().zip(handles) {
        let hash = timeout(Duration::from_secs(5), handle)
            .await
            .expect("submission timed out")
            .unwrap()
            .unwrap();
        assert_eq!(hash, keccak256(raw));
    }
    assert_eq!(engine.pool_size(), 32);
    assert_eq!(backend.metrics().submissions_accepted, 32);
}

#[tokio::test]
async fn duplicate_submission_is_not_a_new_success() {
    let Harness {
        backend, engine, ..
    } = harness(0);
    let raw = Bytes::from_static(b"signed transfer");

    let first = backend.submission().send_raw_tx(raw.clone()).await.unwrap();
    assert_eq!(first, keccak256(&raw));

    match backend.submission().send_raw_tx(raw).await {
        Err(BackendError::EngineRejected(response)) => {
            assert_eq!(response.code, CODE_TX_IN_CACHE);
            assert_eq!(response.log, "tx already exists in cache");
        }
        other => panic!("duplicate resolved as {other:?}"),
    }
    assert_eq!(engine.pool_size(), 1);

    let metrics = backend.metrics();
    assert_eq!(metrics.submissions_accepted, 1);
    assert_eq!(metrics.submissions_rejected, 1);
}

#[tokio::test]
async fn engine_rejection_text_reaches_caller() {
    let Harness {
        backend, engine, ..
    } = harness(0);
    engine.reject_next(CheckTxResponse::rejected(5, "insufficient funds for gas * price + value"));
    let err = backend
        .submission()
        .send_raw_tx(Bytes::from_static(b"tx"))
        .await
        .unwrap_err();
    assert!(err
        .to_string()
        .contains("insufficient funds for gas * price + value"));
    assert!(!err.is_not_found());
}

#[tokio::test]
async fn admitted_transactions_reach_pending_subscribers() {
    let Harness { backend, .. } = harness(0);
    let feeds = backend.feeds();
    let (sender, mut receiver) = feeds.channel();
    let _subscription = feeds.subscribe_new_txs_event(sender);

    let raw = Bytes::from_static(b"pending");
    let hash = backend.submission().send_raw_tx(raw.clone()).await.unwrap();

    let event = timeout(Duration::from_secs(1), receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.txs.len(), 1);
    assert_eq!(event.txs[0].hash, hash);
    assert_eq!(event.txs[0].raw, raw);
}

#[tokio::test]
async fn committed_blocks_fan_out_to_live_subscribers() {
    let Harness { backend, store, .. } = harness(0);
    let feeds = backend.feeds();

    let (head_a, mut head_a_rx) = feeds.channel();
    let (head_b, mut head_b_rx) = feeds.channel();
    let (logs_tx, mut logs_rx) = feeds.channel();
    let (removed_tx, mut removed_rx) = feeds.channel();
    let sub_a = feeds.subscribe_chain_event(head_a);
    let _sub_b = feeds.subscribe_chain_event(head_b);
    let _logs = feeds.subscribe_logs_event(logs_tx);
    let _removed = feeds.subscribe_removed_logs_event(removed_tx);

    let a = Address::repeat_byte(1);
    let first = store.commit_block(vec![transfer(1, a, a, vec![Log::default()])]);
    feeds.publish_block(first.clone());

    sub_a.unsubscribe();
    let second = store.commit_block(vec![]);
    feeds.publish_block(second.clone());
    feeds.publish_removed_logs(RemovedLogsEvent::new(first.logs.clone()));

    assert_eq!(head_a_rx.recv().await.unwrap().hash, first.hash);
    assert!(head_a_rx.recv().await.is_none());

    assert_eq!(head_b_rx.recv().await.unwrap().hash, first.hash);
    assert_eq!(head_b_rx.recv().await.unwrap().hash, second.hash);

    // the empty second block publishes no log batch
    assert_eq!(logs_rx.recv().await.unwrap(), first.logs);
    assert!(logs_rx.try_recv().is_err());

    let removed = removed_rx.recv().await.unwrap();
    assert!(removed.logs.iter().all(|log| log.removed));
}

#[test]
fn open_contexts_do_not_observe_concurrent_commits() {
    let Harness { store, .. } = harness(0);
    let ctx = ReadContext::history(store.as_ref()).unwrap();
    let before = ctx.latest_height().unwrap();

    let writer = {
        let store = Arc::clone(&store);
        std::thread::spawn(move || {
            for seed in 1..=5u8 {
                let a = Address::repeat_byte(seed);
                store.commit_block(vec![transfer(seed, a, a, vec![])]);
            }
        })
    };
    writer.join().unwrap();

    assert_eq!(ctx.latest_height().unwrap(), before);
    assert!(ctx.tx_by_hash(&B256::repeat_byte(1)).unwrap().is_none());
    ctx.close();

    let fresh = ReadContext::history(store.as_ref()).unwrap();
    assert_eq!(fresh.latest_height().unwrap(), before + 5);
}

#[test]
fn simulation_runs_against_latest_state() {
    let Harness { backend, store, .. } = harness(0);
    let sender = Address::repeat_byte(0x5);
    store.put_account(Account::new(sender, 0, U256::from(1_000_000u64), 1));

    let tx = CallRequest {
        to: Some(Address::repeat_byte(0x6)),
        value: U256::from(10),
        ..Default::default()
    };
    let call = backend.execution().call(&tx, sender).unwrap();
    assert_eq!(call.status, STATUS_SUCCESS);
    assert!(call.output.is_empty());

    let estimate = backend.execution().estimate_gas(&tx, sender).unwrap();
    assert_eq!(estimate.status, STATUS_SUCCESS);
    assert_eq!(estimate.gas, 21_000);
    assert_eq!(store.open_readers(), 0);
}

#[test]
fn chain_metadata_comes_from_config() {
    let Harness { backend, .. } = harness(0);
    assert_eq!(backend.chain_id(), U256::from(10001));
    assert_eq!(backend.protocol_version(), 63);
    assert_eq!(backend.bloom_status(), (4096, 0));
}

#[test]
fn every_query_releases_its_context() {
    let Harness { backend, store, .. } = harness(0);
    let a = Address::repeat_byte(1);
    let event = store.commit_block(vec![transfer(1, a, a, vec![Log::default()])]);
    let query = backend.query();

    let _ = query.get_balance(&a, BlockNumber::Latest);
    let _ = query.get_balance(&a, BlockNumber::Number(1));
    let _ = query.get_nonce(&a);
    let _ = query.get_code(&a);
    let _ = query.get_storage_at(&a, &B256::ZERO, BlockNumber::Latest);
    let _ = query.block_by_hash(&event.hash);
    let _ = query.block_by_number(7);
    let _ = query.current_block();
    let _ = query.latest_height();
    let _ = query.header_by_number(BlockNumber::Earliest);
    let _ = query.header_by_hash(&B256::ZERO);
    let _ = query.get_transaction(&B256::repeat_byte(1));
    let _ = query.get_transaction(&B256::repeat_byte(2));
    let _ = query.query_logs(vec![a], vec![], 0, 10);
    let _ = query.basic_query_logs(a, &[], 0, 10);
    let _ = query.query_tx_by_addr(&a, 0, 10);
    let _ = query.get_tx_list_by_height(1);
    let _ = query.get_logs(&event.hash);
    let _ = query.get_receipts(&event.hash);
    assert_eq!(store.open_readers(), 0);

    store.fail_reads(true);
    assert!(query.current_block().is_err());
    assert!(query.get_logs(&event.hash).is_err());
    assert!(backend
        .execution()
        .call(&CallRequest::default(), a)
        .is_ok_and(|outcome| outcome.status != STATUS_SUCCESS));
    assert_eq!(store.open_readers(), 0);
}
