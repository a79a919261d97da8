mod support;

use std::sync::Arc;

use ddb_pool::error::TxnError;
use ddb_pool::txn::{TransactionCoordinator, MAX_TRANSACTION_SIZE};

use support::{item, FakeFactory, FakeSession};

async fn fresh_session() -> Arc<FakeSession> {
    use ddb_pool::session::SessionFactory;
    let factory = FakeFactory::default();
    let properties = Arc::new(std::collections::BTreeMap::new());
    Arc::new(factory.create(&properties).await.unwrap())
}

#[tokio::test]
async fn s5_transaction_cancelled_reports_reasons_and_resets() {
    let session = fresh_session().await;
    *session.cancel_reasons.lock().unwrap() =
        vec!["ConditionalCheckFailed".to_string(), "None".to_string()];
    let txn = TransactionCoordinator::new(session);

    txn.begin().await.unwrap();
    txn.add_put("T1", item(&[("pk", "k1")])).await.unwrap();
    txn.add_delete("T1", item(&[("pk", "k2")])).await.unwrap();

    let err = txn.commit().await.unwrap_err();
    match &err {
        TxnError::TransactionCancelled(reasons) => {
            assert_eq!(
                reasons,
                &vec!["ConditionalCheckFailed".to_string(), "None".to_string()]
            );
        }
        other => panic!("expected TransactionCancelled, got {other:?}"),
    }
    assert_eq!(err.reasons().unwrap().len(), 2);
    assert!(!txn.is_active().await);
    assert_eq!(txn.size().await, 0);
}

#[tokio::test]
async fn s6_transaction_size_cap() {
    let session = fresh_session().await;
    let txn = TransactionCoordinator::new(session);

    txn.begin().await.unwrap();
    for i in 0..MAX_TRANSACTION_SIZE {
        txn.add_put("T1", item(&[("pk", &i.to_string())]))
            .await
            .unwrap();
    }
    assert_eq!(txn.size().await, MAX_TRANSACTION_SIZE);

    let err = txn
        .add_put("T1", item(&[("pk", "overflow")]))
        .await
        .unwrap_err();
    assert!(matches!(err, TxnError::TransactionFull));
    assert_eq!(txn.size().await, MAX_TRANSACTION_SIZE);

    txn.rollback().await.unwrap();
    assert_eq!(txn.size().await, 0);
    assert!(!txn.is_active().await);
}

#[tokio::test]
async fn invariant_8_rollback_clears_buffer_without_upstream_call() {
    let session = fresh_session().await;
    *session.cancel_reasons.lock().unwrap() = vec!["would have failed".to_string()];
    let txn = TransactionCoordinator::new(session);

    txn.begin().await.unwrap();
    txn.add_put("T1", item(&[("pk", "k1")])).await.unwrap();
    txn.add_update(
        "T1",
        item(&[("pk", "k2")]),
        "SET a = :a",
        std::collections::BTreeMap::new(),
        item(&[(":a", "1")]),
    )
    .await
    .unwrap();

    txn.rollback().await.unwrap();
    assert_eq!(txn.size().await, 0);
    assert!(!txn.is_active().await);
    // Had commit been called instead, batch_write would have returned the
    // cancellation reasons staged above; rollback must never reach it.
}

#[tokio::test]
async fn invariant_9_commit_with_empty_buffer_is_a_no_op() {
    let session = fresh_session().await;
    *session.cancel_reasons.lock().unwrap() = vec!["should never be seen".to_string()];
    let txn = TransactionCoordinator::new(session);

    txn.begin().await.unwrap();
    txn.commit().await.unwrap();
    assert!(!txn.is_active().await);
}

#[tokio::test]
async fn invariant_10_is_active_false_after_any_commit_outcome() {
    let ok_session = fresh_session().await;
    let txn_ok = TransactionCoordinator::new(ok_session);
    txn_ok.begin().await.unwrap();
    txn_ok
        .add_put("T1", item(&[("pk", "k1")]))
        .await
        .unwrap();
    txn_ok.commit().await.unwrap();
    assert!(!txn_ok.is_active().await);

    let failing_session = fresh_session().await;
    *failing_session.cancel_reasons.lock().unwrap() = vec!["ConditionalCheckFailed".to_string()];
    let txn_fail = TransactionCoordinator::new(failing_session);
    txn_fail.begin().await.unwrap();
    txn_fail
        .add_put("T1", item(&[("pk", "k1")]))
        .await
        .unwrap();
    assert!(txn_fail.commit().await.is_err());
    assert!(!txn_fail.is_active().await);
}

#[tokio::test]
async fn begin_while_active_is_rejected() {
    let session = fresh_session().await;
    let txn = TransactionCoordinator::new(session);
    txn.begin().await.unwrap();
    let err = txn.begin().await.unwrap_err();
    assert!(matches!(err, TxnError::NestedTransaction));
}

#[tokio::test]
async fn mutation_without_begin_is_rejected() {
    let session = fresh_session().await;
    let txn = TransactionCoordinator::new(session);
    let err = txn.add_put("T1", item(&[("pk", "k1")])).await.unwrap_err();
    assert!(matches!(err, TxnError::NotInTransaction));
}
