// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use typetx::{Store, Value, complex_type};

fn main() {
    let mut store = Store::default();
    let person = complex_type!("person" {
        "name" => string (required),
        "age" => number,
        "tags" => [string],
    })
    .unwrap();
    store.register_type(person).unwrap();

    let alice = store.create("person").unwrap();
    let tags = store.list_of(alice, "tags").unwrap();

    // Write some data in one transaction
    {
        let mut tx = store.begin();
        tx.set(alice, "name", "Alice").unwrap();
        tx.set(alice, "age", 30).unwrap();
        tx.list_add(tags, "admin").unwrap();
        tx.list_add(tags, "ops").unwrap();

        let changeset = tx.changeset(alice).unwrap();
        println!(
            "Pending on {alice}: {:?}",
            changeset.as_complex().unwrap().property_names().collect::<Vec<_>>()
        );
        tx.accept().unwrap();
    }

    println!("Name: {}", store.get(alice, "name").unwrap().unwrap());
    println!("Tags: {:?}", store.list_elements(tags).unwrap());
    store.validate(alice).unwrap();

    // Changes made outside of a transaction commit right away
    store.set(alice, "age", 31).unwrap();
    println!("Version of {alice}: {}", store.version(alice).unwrap());

    // A transaction that is dropped leaves nothing behind
    {
        let mut tx = store.begin();
        tx.set(alice, "name", "Mallory").unwrap();
        tx.list_clear(tags).unwrap();
    }
    assert_eq!(store.get(alice, "name").unwrap(), Some(Value::from("Alice")));
    assert_eq!(store.list_len(tags).unwrap(), 2);
    println!("Rolled back, name is still {}", store.get(alice, "name").unwrap().unwrap());
}
