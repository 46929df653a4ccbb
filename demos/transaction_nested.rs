// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use typetx::{Store, Value, complex_type};

fn main() {
    let mut store = Store::default();
    store
        .register_type(
            complex_type!("folder" {
                "title" => string,
                "items" => [{"folder"}],
            })
            .unwrap(),
        )
        .unwrap();

    let root = store.create("folder").unwrap();
    let docs = store.create("folder").unwrap();
    let items = store.list_of(root, "items").unwrap();
    store.list_add(items, docs).unwrap();
    println!("{docs} is referred to by {:?}", store.references(docs).unwrap());

    let mut outer = store.begin();
    outer.set(root, "title", "Home").unwrap();
    {
        // joins the transaction of `outer`
        let mut inner = outer.enter_change();
        println!("inner scope is root: {}", inner.is_root());
        inner.set(docs, "title", "Documents").unwrap();
    }

    // the nested change shows up in the changesets of the containers
    for changeset in outer.transaction().unwrap().changesets() {
        println!(
            "{}: {} local change(s), touched at version {}",
            changeset.target(),
            changeset.changes().len(),
            changeset.transaction_version()
        );
    }
    outer.accept().unwrap();

    assert_eq!(store.get(docs, "title").unwrap(), Some(Value::from("Documents")));
    println!("Committed: {} / {}", store.get(root, "title").unwrap().unwrap(), store.get(docs, "title").unwrap().unwrap());
}
