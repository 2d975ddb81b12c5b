//-
// Copyright (c) 2026, Mailstore Upgrade Developers
//
// This file is part of mailstore-upgrade.
//
// mailstore-upgrade is free software: you can redistribute it and/or modify it
// under the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// mailstore-upgrade is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along with
// mailstore-upgrade. If not, see <http://www.gnu.org/licenses/>.

//! Assignment of `root`/`parent`/`seq` to `message_parts` rows inserted one
//! at a time.
//!
//! Each cursor value places exactly one row: `stamp` consumes it and hands
//! back the row's placement together with a slot, and the slot must be
//! consumed with the new row's id (`leaf` or `container`) to obtain the next
//! cursor. Since none of these types are `Clone`, a cursor cannot be stamped
//! twice or used after it has been advanced.

use crate::store::types::{MessagePartId, NO_PARENT};
use crate::support::error::Error;

/// The tree-position columns of one new row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    /// `None` for the root itself, whose `root` is filled in by the store.
    pub root: Option<MessagePartId>,
    pub parent: Option<MessagePartId>,
    pub seq: u32,
}

impl Placement {
    /// The value for the `parent` column.
    pub fn parent_value(&self) -> i64 {
        self.parent.map_or(NO_PARENT, |p| p.0)
    }
}

/// Something that can place the next row.
pub trait Cursor {
    type Slot: Slot;

    fn stamp(self) -> (Placement, Self::Slot);
}

/// A placed row waiting for its id.
pub trait Slot {
    /// What a leaf advances to.
    type Leaf;

    /// The row has no children; continue with its next sibling.
    fn leaf(self, id: MessagePartId) -> Self::Leaf;

    /// The row is a multipart container; continue with its first child.
    fn container(self, id: MessagePartId) -> PartCursor;

    /// Leave a container opened through a slot of this kind once all of its
    /// children have been placed.
    fn close(children: PartCursor) -> Result<Self::Leaf, Error>;
}

/// A message's tree once its last row has been placed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MimeTree {
    pub root: MessagePartId,
}

/// The cursor for the root row of a message.
#[must_use]
#[derive(Debug)]
pub struct RootCursor(());

impl RootCursor {
    pub fn new() -> Self {
        RootCursor(())
    }
}

#[must_use]
#[derive(Debug)]
pub struct RootSlot(());

impl Cursor for RootCursor {
    type Slot = RootSlot;

    fn stamp(self) -> (Placement, RootSlot) {
        (
            Placement {
                root: None,
                parent: None,
                seq: 0,
            },
            RootSlot(()),
        )
    }
}

impl Slot for RootSlot {
    /// A leaf root is the whole message.
    type Leaf = MimeTree;

    fn leaf(self, id: MessagePartId) -> MimeTree {
        MimeTree { root: id }
    }

    fn container(self, id: MessagePartId) -> PartCursor {
        PartCursor {
            root: id,
            parent: id,
            next_seq: 0,
            outer: Vec::new(),
        }
    }

    fn close(children: PartCursor) -> Result<MimeTree, Error> {
        Ok(children.finish())
    }
}

/// The cursor for rows below the root.
#[must_use]
#[derive(Debug)]
pub struct PartCursor {
    root: MessagePartId,
    parent: MessagePartId,
    next_seq: u32,
    /// `(parent, next_seq)` of each enclosing level, innermost last.
    outer: Vec<(MessagePartId, u32)>,
}

#[must_use]
#[derive(Debug)]
pub struct ChildSlot {
    cursor: PartCursor,
}

impl Cursor for PartCursor {
    type Slot = ChildSlot;

    fn stamp(self) -> (Placement, ChildSlot) {
        (
            Placement {
                root: Some(self.root),
                parent: Some(self.parent),
                seq: self.next_seq,
            },
            ChildSlot { cursor: self },
        )
    }
}

impl Slot for ChildSlot {
    type Leaf = PartCursor;

    fn leaf(self, _: MessagePartId) -> PartCursor {
        let mut cursor = self.cursor;
        cursor.next_seq += 1;
        cursor
    }

    fn container(self, id: MessagePartId) -> PartCursor {
        let mut cursor = self.cursor;
        cursor.outer.push((cursor.parent, cursor.next_seq + 1));
        cursor.parent = id;
        cursor.next_seq = 0;
        cursor
    }

    fn close(children: PartCursor) -> Result<PartCursor, Error> {
        children.ascend()
    }
}

impl PartCursor {
    /// Close the current container; following rows become its siblings.
    pub fn ascend(mut self) -> Result<PartCursor, Error> {
        let (parent, next_seq) = self.outer.pop().ok_or(Error::CursorUnderflow)?;
        self.parent = parent;
        self.next_seq = next_seq;
        Ok(self)
    }

    pub fn finish(self) -> MimeTree {
        MimeTree { root: self.root }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use proptest::prelude::*;

    use super::*;

    /// Stands in for the store: hands out ids and applies the root trigger.
    #[derive(Default)]
    struct Rows {
        rows: Vec<(MessagePartId, MessagePartId, i64, u32)>,
    }

    impl Rows {
        fn insert<C: Cursor>(&mut self, cursor: C) -> (MessagePartId, C::Slot) {
            let (placement, slot) = cursor.stamp();
            let id = MessagePartId(self.rows.len() as i64 + 1);
            self.rows.push((
                id,
                placement.root.unwrap_or(id),
                placement.parent_value(),
                placement.seq,
            ));
            (id, slot)
        }
    }

    #[test]
    fn mixed_with_nested_alternative() {
        let mut rows = Rows::default();
        let (mixed, slot) = rows.insert(RootCursor::new());
        let cursor = slot.container(mixed);
        let (alternative, slot) = rows.insert(cursor);
        let cursor = slot.container(alternative);
        let (plain, slot) = rows.insert(cursor);
        let cursor = slot.leaf(plain);
        let (html, slot) = rows.insert(cursor);
        let cursor = slot.leaf(html).ascend().unwrap();
        let (first, slot) = rows.insert(cursor);
        let cursor = slot.leaf(first);
        let (second, slot) = rows.insert(cursor);
        let tree = slot.leaf(second).finish();

        assert_eq!(mixed, tree.root);
        assert_eq!(
            vec![
                (mixed, mixed, NO_PARENT, 0),
                (alternative, mixed, mixed.0, 0),
                (plain, mixed, alternative.0, 0),
                (html, mixed, alternative.0, 1),
                (first, mixed, mixed.0, 1),
                (second, mixed, mixed.0, 2),
            ],
            rows.rows
        );
    }

    #[test]
    fn lone_leaf_is_its_own_root() {
        let mut rows = Rows::default();
        let (id, slot) = rows.insert(RootCursor::new());
        assert_eq!(MimeTree { root: id }, slot.leaf(id));
        assert_eq!(vec![(id, id, NO_PARENT, 0)], rows.rows);
    }

    #[test]
    fn ascending_from_the_root_level_fails() {
        let cursor = RootSlot(()).container(MessagePartId(1));
        assert_matches!(Err(Error::CursorUnderflow), cursor.ascend());
    }

    #[derive(Clone, Copy, Debug)]
    enum Op {
        Leaf,
        Container,
        Ascend,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![Just(Op::Leaf), Just(Op::Container), Just(Op::Ascend)]
    }

    proptest! {
        #[test]
        fn trees_are_consistent(ops in prop::collection::vec(op(), 0..40)) {
            let mut rows = Rows::default();
            let (root, slot) = rows.insert(RootCursor::new());
            let mut cursor = slot.container(root);
            // Expected parent of the next row, per level.
            let mut levels = vec![root];

            for op in ops {
                match op {
                    Op::Leaf => {
                        let (id, slot) = rows.insert(cursor);
                        cursor = slot.leaf(id);
                    }
                    Op::Container => {
                        let (id, slot) = rows.insert(cursor);
                        cursor = slot.container(id);
                        levels.push(id);
                    }
                    Op::Ascend => match cursor.ascend() {
                        Ok(c) => {
                            cursor = c;
                            levels.pop();
                        }
                        Err(_) => {
                            prop_assert_eq!(1, levels.len());
                            cursor = RootSlot(()).container(root);
                        }
                    },
                }
            }
            prop_assert_eq!(root, cursor.finish().root);

            let mut last_seq: HashMap<i64, u32> = HashMap::new();
            for &(id, row_root, parent, seq) in &rows.rows {
                prop_assert_eq!(root, row_root);
                if id == root {
                    prop_assert_eq!(NO_PARENT, parent);
                    continue;
                }
                prop_assert!(parent < id.0);
                if let Some(&prev) = last_seq.get(&parent) {
                    prop_assert_eq!(prev + 1, seq);
                } else {
                    prop_assert_eq!(0, seq);
                }
                last_seq.insert(parent, seq);
            }
        }
    }
}
