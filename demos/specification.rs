// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use typetx::{Store, complex_type};

fn main() {
    let mut store = Store::default();
    store
        .register_type(
            complex_type!("person" {
                "name" => string,
                "friends" => [{"person"}],
            })
            .unwrap(),
        )
        .unwrap();

    let ann = store.create("person").unwrap();
    let bob = store.create("person").unwrap();
    {
        let mut tx = store.begin();
        tx.set(ann, "name", "Ann").unwrap();
        tx.set(bob, "name", "Bob").unwrap();
        let friends = tx.list_of(ann, "friends").unwrap();
        tx.list_add(friends, bob).unwrap();
        let friends = tx.list_of(bob, "friends").unwrap();
        tx.list_add(friends, ann).unwrap();
        tx.accept().unwrap();
    }

    // the cycle is written once and referred to by id
    let spec = store.to_spec(ann).unwrap();
    println!("{}", serde_json::to_string_pretty(&spec).unwrap());

    let mut copy = Store::default();
    copy.register_type(store.complex_type("person").unwrap().clone())
        .unwrap();
    let root = copy.from_spec(&spec).unwrap();
    println!("read back {} instances, root is {root}", copy.len());
}
