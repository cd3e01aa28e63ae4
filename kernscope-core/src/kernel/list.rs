use super::KernelIntrospector;
use crate::channel::{Address, Expression, TargetChannel};
use crate::error::{IntegrityViolation, IntrospectError, Result};
use std::collections::HashSet;

/// Shape of a circular doubly-linked kernel list.
pub(super) struct CircularList {
    /// Name used in integrity errors.
    pub structure: &'static str,
    pub node_type: &'static str,
    pub next: &'static str,
    pub prev: &'static str,
    /// When set, failing to read the head's forward link means the list is
    /// compiled out, reported as `TargetNotFound` with this description.
    pub compiled_out: Option<&'static str>,
}

impl<C: TargetChannel> KernelIntrospector<C> {
    /// Walk `list` from `head` until it closes, calling `visit` on each node.
    ///
    /// Every hop checks that the forward link is not null and that the new
    /// node's back link points at the node we came from. A list that revisits
    /// a node or grows past the configured bound is rejected.
    pub(super) fn walk_list<V>(
        &mut self,
        list: &CircularList,
        head: Address,
        mut visit: impl FnMut(&mut Self, Address) -> Result<V>,
    ) -> Result<Vec<(Address, V)>> {
        let limit = self.config.max_list_nodes;
        let violation = |v| IntrospectError::integrity(list.structure, v);

        let mut entries = Vec::new();
        let mut visited = HashSet::new();
        let mut current = head;
        loop {
            let forward = Expression::member(list.node_type, current, list.next);
            let next = match (self.fetch_address(&forward), list.compiled_out) {
                (Ok(next), _) => next,
                (Err(IntrospectError::Channel(e)), Some(what)) if current == head => {
                    log::debug!("{} link unavailable: {e}", list.structure);
                    return Err(IntrospectError::TargetNotFound(what.to_string()));
                }
                (Err(e), _) => return Err(e),
            };
            if next.is_null() {
                return Err(violation(IntegrityViolation::NullPointer { node: current }));
            }

            let back = self.fetch_address(&Expression::member(list.node_type, next, list.prev))?;
            if back.is_null() {
                return Err(violation(IntegrityViolation::NullPointer { node: next }));
            }
            if back != current {
                return Err(violation(IntegrityViolation::AsymmetricLink {
                    node: next,
                    expected: current,
                    found: back,
                }));
            }

            if next == head {
                break;
            }
            if !visited.insert(next) {
                return Err(violation(IntegrityViolation::Revisited { node: next }));
            }
            if entries.len() >= limit {
                return Err(violation(IntegrityViolation::Unbounded { limit }));
            }

            log::debug!("{} node {}", list.structure, next.hex());
            let record = visit(self, next)?;
            entries.push((next, record));
            current = next;
        }

        log::debug!("{} closed after {} nodes", list.structure, entries.len());
        Ok(entries)
    }
}
