//! Deferred notification queue.
//!
//! Notifications accumulate while resources apply and fire only after
//! every declared resource has reached a terminal state. The queue drops
//! exact (target, action) duplicates on enqueue and collapses to one
//! canonical action per target at drain time, `restart` dominating
//! `reload` dominating `enable`.

use crate::resource::{Action, Notify, ResourceId};

#[derive(Debug, Default)]
pub struct NotificationQueue {
    entries: Vec<Notify>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an action for a target. Exact duplicates are dropped.
    pub fn enqueue(&mut self, target: ResourceId, action: Action) {
        let duplicate = self
            .entries
            .iter()
            .any(|n| n.target == target && n.action == action);
        if duplicate {
            log::debug!("notification {action} -> {target} already queued");
            return;
        }
        self.entries.push(Notify { target, action });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Collapse to one action per target, highest priority winning, in
    /// first-enqueue order of the targets.
    pub fn drain(self) -> Vec<Notify> {
        let mut fired: Vec<Notify> = Vec::new();
        for entry in self.entries {
            match fired.iter_mut().find(|n| n.target == entry.target) {
                Some(existing) => {
                    if entry.action.priority() > existing.action.priority() {
                        existing.action = entry.action;
                    }
                }
                None => fired.push(entry),
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;

    fn service(name: &str) -> ResourceId {
        ResourceId::new(ResourceKind::Service, name)
    }

    #[test]
    fn test_exact_duplicates_collapse_to_one() {
        let mut queue = NotificationQueue::new();
        queue.enqueue(service("varnish"), Action::Restart);
        queue.enqueue(service("varnish"), Action::Restart);
        assert_eq!(queue.len(), 1);

        let fired = queue.drain();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].action, Action::Restart);
    }

    #[test]
    fn test_restart_dominates_reload() {
        let mut queue = NotificationQueue::new();
        queue.enqueue(service("varnish"), Action::Reload);
        queue.enqueue(service("varnish"), Action::Restart);
        let fired = queue.drain();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].action, Action::Restart);

        // Same outcome regardless of enqueue order
        let mut queue = NotificationQueue::new();
        queue.enqueue(service("varnish"), Action::Restart);
        queue.enqueue(service("varnish"), Action::Reload);
        let fired = queue.drain();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].action, Action::Restart);
    }

    #[test]
    fn test_reload_dominates_enable() {
        let mut queue = NotificationQueue::new();
        queue.enqueue(service("pgbouncer"), Action::Enable);
        queue.enqueue(service("pgbouncer"), Action::Reload);
        let fired = queue.drain();
        assert_eq!(fired[0].action, Action::Reload);
    }

    #[test]
    fn test_targets_keep_first_enqueue_order() {
        let mut queue = NotificationQueue::new();
        queue.enqueue(service("varnish"), Action::Reload);
        queue.enqueue(service("nginx"), Action::Restart);
        queue.enqueue(service("varnish"), Action::Restart);

        let fired = queue.drain();
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[0].target, service("varnish"));
        assert_eq!(fired[0].action, Action::Restart);
        assert_eq!(fired[1].target, service("nginx"));
    }
}
