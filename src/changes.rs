// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Primitive changes and the changesets that order them.
//!
//! A [`PrimitiveChange`] is an immutable description of one edit to one instance. It
//! knows how to [`prepare`](PrimitiveChange::prepare) itself (adjust the reference
//! lists of the values it adds or removes), how to undo that preparation
//! ([`cancel`](PrimitiveChange::cancel)) and how to [`apply`](PrimitiveChange::apply)
//! itself to the storage of its target.
//!
//! A [`Changeset`] collects the primitive changes made to one instance within one
//! transaction. Complex instances use a [`ComplexChangeset`] holding at most one `Set`
//! change per property; lists use a [`ListChangeset`] holding an ordered log of
//! `Add`/`Remove`/`Move`/`Clear`/`Sort` changes, together with a projection of the list
//! that reflects the log so far. Changesets of values held by other instances are
//! linked as children of the changesets of their containers.

mod changeset;
mod primitive;

pub use changeset::{
    Changeset, ChildLink, ComplexChangeset, ListChangeset, PropertyChange, RecordedChange,
};
pub use primitive::{ChangeTarget, ChangeType, PrimitiveChange, Referrer};
