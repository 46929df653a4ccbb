// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Tests for the lifecycle of transactions.
//!
//! A transaction is either committed by accepting its root scope, or rejected, in which
//! case the store is left exactly as it was before the transaction began.

use typetx::{
    ChangeType, Error, Store, StoreConfig, Value,
    action::RejectReason,
    complex_type,
    transaction::{TransactionError, TransactionState},
    values,
};

fn register(store: &mut Store) {
    let node = complex_type!("node" {
        "name" => string,
        "weight" => number,
        "children" => [{"node"}],
        "partner" => {"node"},
    })
    .unwrap();
    store.register_type(node).unwrap();
}

fn store() -> Store {
    let mut store = Store::default();
    register(&mut store);
    store
}

fn rejection(error: Error) -> typetx::action::Rejection {
    match error {
        Error::Transaction(TransactionError::Rejected(rejection)) => rejection,
        other => panic!("expected a rejection, got {other:?}"),
    }
}

#[test]
fn dropped_root_scope_rolls_back() {
    let mut store = store();
    let node = store.create("node").unwrap();
    let child = store.create("node").unwrap();
    store.set(node, "name", "before").unwrap();
    let children = store.list_of(node, "children").unwrap();

    {
        let mut scope = store.begin();
        scope.set(node, "name", "after").unwrap();
        scope.set(node, "weight", 2).unwrap();
        scope.list_add(children, child).unwrap();
        assert_eq!(scope.get(node, "name").unwrap(), Some(Value::from("after")));
        assert_eq!(scope.list_len(children).unwrap(), 1);
        assert!(!scope.references(child).unwrap().is_empty());
        // dropped without accepting
    }

    assert_eq!(store.get(node, "name").unwrap(), Some(Value::from("before")));
    assert_eq!(store.get(node, "weight").unwrap(), None);
    assert_eq!(store.list_len(children).unwrap(), 0);
    assert!(store.references(child).unwrap().is_empty());
    assert!(store.current_transaction().is_none());
    // only the implicit transaction of the first `set` committed
    assert_eq!(store.version(node).unwrap(), 1);
    assert_eq!(store.version(children).unwrap(), 0);
}

#[test]
fn list_edits_replay_in_order() {
    let mut store = store();
    let list = store.create_list(typetx::value_type!(string), false);

    let mut scope = store.begin();
    assert!(scope.list_add(list, "A").unwrap());
    assert!(scope.list_add(list, "B").unwrap());
    assert!(scope.list_move(list, &Value::from("B"), 0).unwrap());
    let recorded: Vec<ChangeType> = scope
        .changeset(list)
        .unwrap()
        .changes()
        .iter()
        .map(|recorded| recorded.change().change_type())
        .collect();
    assert_eq!(recorded, [ChangeType::Add, ChangeType::Add, ChangeType::Move]);
    // the committed list is untouched until the commit
    assert_eq!(
        scope.transaction().unwrap().changeset(list).unwrap().as_list().unwrap().original().len(),
        0
    );
    scope.accept().unwrap();

    assert_eq!(store.list_elements(list).unwrap(), values!["B", "A"].as_slice());
    assert_eq!(store.version(list).unwrap(), 1);
}

#[test]
fn list_operations() {
    let mut store = store();
    let list = store.create_list(typetx::value_type!(number), false);
    for n in [3, 1, 2] {
        store.list_add(list, n).unwrap();
    }
    // keys are unique
    assert!(!store.list_add(list, 1).unwrap());
    store.list_insert(list, 0, 7).unwrap();
    assert_eq!(store.list_elements(list).unwrap(), values![7, 3, 1, 2].as_slice());

    store
        .list_sort_by(list, |a, b| {
            a.as_number().unwrap().total_cmp(&b.as_number().unwrap())
        })
        .unwrap();
    assert_eq!(store.list_elements(list).unwrap(), values![1, 2, 3, 7].as_slice());

    assert_eq!(store.list_remove_at(list, 1, 2).unwrap(), values![2, 3]);
    assert!(store.list_remove(list, &Value::from(7)).unwrap());
    assert!(!store.list_remove(list, &Value::from(7)).unwrap());
    assert_eq!(store.list_elements(list).unwrap(), values![1].as_slice());

    store.list_clear(list).unwrap();
    assert_eq!(store.list_len(list).unwrap(), 0);
}

#[test]
fn nested_scopes_share_the_transaction() {
    let mut store = store();
    let node = store.create("node").unwrap();

    let mut outer = store.enter_change();
    assert!(outer.is_root());
    outer.set(node, "name", "outer").unwrap();
    {
        let mut inner = outer.enter_change();
        assert!(!inner.is_root());
        assert_eq!(inner.transaction_id(), inner.current_transaction().unwrap());
        inner.set(node, "weight", 1).unwrap();
        assert!(matches!(
            inner.accept(),
            Err(Error::Transaction(TransactionError::NotRootScope(_)))
        ));
    }
    // exiting the nested scope neither committed nor rejected
    assert_eq!(
        outer.transaction().unwrap().state(),
        TransactionState::Open
    );
    assert_eq!(outer.get(node, "weight").unwrap(), Some(Value::from(1)));
    outer.accept().unwrap();

    assert_eq!(store.get(node, "name").unwrap(), Some(Value::from("outer")));
    assert_eq!(store.get(node, "weight").unwrap(), Some(Value::from(1)));
    assert_eq!(store.version(node).unwrap(), 1);
}

#[test]
fn transactions_are_isolated_and_conflicts_are_stale() {
    let mut store = store();
    let node = store.create("node").unwrap();

    let first = store.new_transaction();
    let mut a = store.enter(first).unwrap();
    a.set(node, "name", "from a").unwrap();
    {
        let mut b = a.begin();
        assert_ne!(b.transaction_id(), first);
        // `a`'s pending change is invisible here
        assert_eq!(b.get(node, "name").unwrap(), None);
        b.set(node, "name", "from b").unwrap();
        assert!(b.changeset(node).unwrap().has_local_changes());
        b.accept().unwrap();
    }
    assert_eq!(a.get(node, "name").unwrap(), Some(Value::from("from a")));

    let rejection = rejection(a.accept().unwrap_err());
    assert_eq!(rejection.transaction, first);
    assert_eq!(rejection.reason, RejectReason::Stale);
    assert_eq!(rejection.changeset, Some(node));

    assert_eq!(store.get(node, "name").unwrap(), Some(Value::from("from b")));
    assert!(store.transaction(first).is_none());
}

#[test]
fn exit_current_unwinds_the_transaction() {
    let mut store = store();
    let node = store.create("node").unwrap();

    let mut outer = store.begin();
    outer.set(node, "name", "gone").unwrap();
    let mut inner = outer.enter_change();
    assert_eq!(inner.exit_current(), 2);
    assert!(inner.current_transaction().is_none());
    drop(inner);
    assert!(outer.transaction().is_none());
    drop(outer);

    assert_eq!(store.get(node, "name").unwrap(), None);
    assert_eq!(store.exit_current(), 0);
}

#[test]
fn reject_reports_the_reason() {
    let mut store = store();
    let node = store.create("node").unwrap();
    let mut scope = store.begin();
    let id = scope.transaction_id();
    scope.set(node, "name", "x").unwrap();
    let rejection = scope.reject("undo").unwrap();
    assert_eq!(rejection.transaction, id);
    assert_eq!(rejection.reason, RejectReason::Requested("undo".to_owned()));
    assert_eq!(store.get(node, "name").unwrap(), None);
}

#[test]
fn open_transactions_survive_their_scope_when_configured() {
    let mut store = Store::with_config(StoreConfig {
        rollback_on_drop: false,
        ..StoreConfig::default()
    });
    register(&mut store);
    let node = store.create("node").unwrap();

    let id = {
        let mut scope = store.begin();
        scope.set(node, "name", "later").unwrap();
        scope.transaction_id()
    };
    assert_eq!(store.transaction(id).unwrap().state(), TransactionState::Open);
    assert_eq!(store.get(node, "name").unwrap(), None);

    let scope = store.enter(id).unwrap();
    assert!(scope.is_root());
    scope.accept().unwrap();
    assert_eq!(store.get(node, "name").unwrap(), Some(Value::from("later")));
    assert!(matches!(
        store.enter(id),
        Err(Error::Transaction(TransactionError::Resolved(_)))
    ));
}

#[test]
fn failed_implicit_transaction_leaves_nothing() {
    let mut store = store();
    let node = store.create("node").unwrap();
    assert!(matches!(
        store.set(node, "weight", "heavy"),
        Err(Error::TypeMismatch { .. })
    ));
    assert!(matches!(
        store.set(node, "children", 1),
        Err(Error::ListProperty { .. })
    ));
    assert!(store.current_transaction().is_none());
    assert_eq!(store.version(node).unwrap(), 0);
}

#[test]
fn repeated_sets_coalesce() {
    let mut store = store();
    let node = store.create("node").unwrap();
    store.set(node, "name", "committed").unwrap();

    let mut scope = store.begin();
    for name in ["a", "b", "c"] {
        scope.set(node, "name", name).unwrap();
    }
    let changeset = scope.changeset(node).unwrap();
    assert_eq!(changeset.changes().len(), 1);
    let complex = changeset.as_complex().unwrap();
    assert_eq!(complex.get_old("name"), Some(&Value::from("committed")));
    assert_eq!(complex.get_new("name"), Some(&Value::from("c")));

    // assigning the committed value again leaves no change behind
    scope.set(node, "name", "committed").unwrap();
    assert!(!scope.changeset(node).unwrap().has_local_changes());
    scope.accept().unwrap();
    assert_eq!(store.version(node).unwrap(), 1);
}

#[test]
fn committed_scope_reads_committed_state() {
    let mut store = store();
    let node = store.create("node").unwrap();
    let mut scope = store.begin();
    scope.set(node, "name", "pending").unwrap();
    {
        let mut committed = scope.enter_committed();
        assert_eq!(committed.get(node, "name").unwrap(), None);
        // runs in an implicit transaction of its own
        committed.set(node, "weight", 5).unwrap();
        assert_eq!(committed.get(node, "weight").unwrap(), Some(Value::from(5)));
    }
    assert_eq!(scope.get(node, "name").unwrap(), Some(Value::from("pending")));
    // the weight was committed after this transaction first touched the node
    assert_eq!(
        rejection(scope.accept().unwrap_err()).reason,
        RejectReason::Stale
    );
}

#[test]
fn removing_what_another_transaction_removed_is_stale() {
    let mut store = store();
    let [root, x, y] = [(); 3].map(|_| store.create("node").unwrap());
    let children = store.list_of(root, "children").unwrap();
    store.list_add(children, x).unwrap();

    let mut scope = store.begin();
    scope.list_add(children, y).unwrap();
    {
        let mut committed = scope.enter_committed();
        committed.list_remove(children, &Value::from(x)).unwrap();
    }
    // still in this transaction's view of the list
    assert!(scope.list_remove(children, &Value::from(x)).unwrap());
    let rejection = rejection(scope.accept().unwrap_err());
    assert_eq!(rejection.reason, RejectReason::Stale);
    assert_eq!(rejection.changeset, Some(children));

    assert!(store.references(x).unwrap().is_empty());
    assert!(store.references(y).unwrap().is_empty());
    assert_eq!(store.list_len(children).unwrap(), 0);
}

#[test]
fn replacing_what_another_transaction_unset_is_stale() {
    let mut store = store();
    let [a, x, y] = [(); 3].map(|_| store.create("node").unwrap());
    store.set(a, "partner", x).unwrap();

    let mut scope = store.begin();
    scope.set(a, "name", "first").unwrap();
    {
        let mut committed = scope.enter_committed();
        committed.unset(a, "partner").unwrap();
    }
    scope.set(a, "partner", y).unwrap();
    let rejection = rejection(scope.accept().unwrap_err());
    assert_eq!(rejection.reason, RejectReason::Stale);
    assert_eq!(rejection.changeset, Some(a));

    assert_eq!(store.get(a, "partner").unwrap(), None);
    assert!(store.references(x).unwrap().is_empty());
    assert!(store.references(y).unwrap().is_empty());
}
