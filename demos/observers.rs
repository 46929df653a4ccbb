// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use tracing_subscriber::EnvFilter;
use typetx::{
    Changeset, Store,
    action::{ChangeEvent, ChangeObserver, Rejection},
    complex_type,
};

/// Refuses negative balances, and prints what was committed.
struct Auditor;

impl ChangeObserver for Auditor {
    fn will_change(&mut self, event: &mut ChangeEvent, store: &mut Store) {
        if store.is_list(event.source()) {
            return;
        }
        if let Ok(Some(balance)) = store.get(event.source(), "balance") {
            if balance.as_number().is_some_and(|b| b < 0.0) {
                event.cancel("balance must not be negative");
            }
        }
    }

    fn did_change(&mut self, event: &ChangeEvent, changeset: &Changeset, _store: &Store) {
        println!("{}: committed {} change(s)", event.source(), changeset.changes().len());
    }

    fn rejected_change(&mut self, event: &ChangeEvent, _changeset: &Changeset, rejection: &Rejection) {
        println!("{}: {rejection}", event.source());
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut store = Store::default();
    store
        .register_type(complex_type!("account" { "balance" => number }).unwrap())
        .unwrap();
    store.add_observer(Box::new(Auditor));

    let account = store.create("account").unwrap();
    store.set(account, "balance", 100).unwrap();
    match store.set(account, "balance", -5) {
        Ok(()) => println!("overdrawn!"),
        Err(e) => println!("refused: {e}"),
    }
    println!("balance: {}", store.get(account, "balance").unwrap().unwrap());
}
