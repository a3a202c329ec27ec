use crate::events::StatusChangeEvent;
use crate::{ServiceEntry, ServiceListing, ServiceStatus};
use std::collections::btree_map;

/// Result of writing a single status into a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Changed { previous: ServiceStatus },
    Unchanged,
    UnknownService,
}

/// Result of applying a stream event to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Updated {
        status: ServiceStatus,
        previous: ServiceStatus,
    },
    Unchanged,
    UnknownService,
    UnknownKind,
}

/// Mutation surface of the service registry.
///
/// `replace_all` is the snapshot path, `set_status` the stream path. Neither
/// can fail: unknown names are a no-op for `set_status`.
pub trait StatusStore {
    fn replace_all(&mut self, listing: ServiceListing);
    fn set_status(&mut self, name: &str, status: ServiceStatus) -> StatusUpdate;
    fn status(&self, name: &str) -> Option<&ServiceStatus>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryView {
    services: ServiceListing,
}

impl RegistryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ServiceEntry> {
        self.services.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Services in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, ServiceEntry> {
        self.services.iter()
    }

    pub fn count_with(&self, status: &ServiceStatus) -> usize {
        self.services
            .values()
            .filter(|entry| entry.status == *status)
            .count()
    }
}

impl StatusStore for RegistryView {
    fn replace_all(&mut self, listing: ServiceListing) {
        self.services = listing;
    }

    fn set_status(&mut self, name: &str, status: ServiceStatus) -> StatusUpdate {
        let Some(entry) = self.services.get_mut(name) else {
            return StatusUpdate::UnknownService;
        };
        if entry.status == status {
            return StatusUpdate::Unchanged;
        }
        let previous = std::mem::replace(&mut entry.status, status);
        StatusUpdate::Changed { previous }
    }

    fn status(&self, name: &str) -> Option<&ServiceStatus> {
        self.services.get(name).map(|entry| &entry.status)
    }
}

/// Applies a status change notification as a single-key upsert.
pub fn apply_event<S: StatusStore + ?Sized>(
    store: &mut S,
    event: &StatusChangeEvent,
) -> EventOutcome {
    let Some(status) = event.kind.target_status() else {
        return EventOutcome::UnknownKind;
    };
    match store.set_status(&event.service, status.clone()) {
        StatusUpdate::Changed { previous } => EventOutcome::Updated { status, previous },
        StatusUpdate::Unchanged => EventOutcome::Unchanged,
        StatusUpdate::UnknownService => EventOutcome::UnknownService,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    fn snapshot() -> ServiceListing {
        let mut listing = ServiceListing::new();
        listing.insert("web".to_string(), ServiceEntry::new(ServiceStatus::Stopped));
        listing.insert("db".to_string(), ServiceEntry::new(ServiceStatus::Started));
        listing
    }

    fn event(kind: EventKind, service: &str) -> StatusChangeEvent {
        StatusChangeEvent {
            kind,
            service: service.to_string(),
        }
    }

    #[test]
    fn replace_all_discards_previous_contents() {
        let mut registry = RegistryView::new();
        registry.replace_all(snapshot());
        let mut next = ServiceListing::new();
        next.insert("api".to_string(), ServiceEntry::new(ServiceStatus::Started));
        registry.replace_all(next);

        assert_eq!(registry.len(), 1);
        assert!(registry.contains("api"));
        assert!(!registry.contains("web"));
    }

    #[test]
    fn start_event_updates_only_named_service() {
        let mut registry = RegistryView::new();
        registry.replace_all(snapshot());

        let outcome = apply_event(&mut registry, &event(EventKind::Start, "web"));
        assert_eq!(
            outcome,
            EventOutcome::Updated {
                status: ServiceStatus::Started,
                previous: ServiceStatus::Stopped,
            }
        );
        assert_eq!(registry.status("web"), Some(&ServiceStatus::Started));
        assert_eq!(registry.status("db"), Some(&ServiceStatus::Started));
    }

    #[test]
    fn repeated_event_is_idempotent() {
        let mut once = RegistryView::new();
        once.replace_all(snapshot());
        apply_event(&mut once, &event(EventKind::Start, "web"));

        let mut many = RegistryView::new();
        many.replace_all(snapshot());
        for _ in 0..4 {
            apply_event(&mut many, &event(EventKind::Start, "web"));
        }

        assert_eq!(once, many);
        assert_eq!(
            apply_event(&mut many, &event(EventKind::Start, "web")),
            EventOutcome::Unchanged
        );
    }

    #[test]
    fn unknown_service_is_ignored() {
        let mut registry = RegistryView::new();
        registry.replace_all(snapshot());
        let before = registry.clone();

        let outcome = apply_event(&mut registry, &event(EventKind::Stop, "ghost"));
        assert_eq!(outcome, EventOutcome::UnknownService);
        assert_eq!(registry, before);
        assert!(!registry.contains("ghost"));
    }

    #[test]
    fn unknown_kind_leaves_state_untouched() {
        let mut registry = RegistryView::new();
        registry.replace_all(snapshot());
        let before = registry.clone();

        let outcome = apply_event(
            &mut registry,
            &event(EventKind::Other("restart".to_string()), "web"),
        );
        assert_eq!(outcome, EventOutcome::UnknownKind);
        assert_eq!(registry, before);
    }

    #[test]
    fn events_against_empty_registry_are_dropped() {
        let mut registry = RegistryView::new();
        let outcome = apply_event(&mut registry, &event(EventKind::Start, "web"));
        assert_eq!(outcome, EventOutcome::UnknownService);
        assert!(registry.is_empty());
    }

    #[test]
    fn any_interleaving_converges_to_last_event() {
        let sequence = [
            EventKind::Start,
            EventKind::Stop,
            EventKind::Stop,
            EventKind::Start,
            EventKind::Start,
            EventKind::Stop,
        ];
        let mut registry = RegistryView::new();
        registry.replace_all(snapshot());
        for kind in sequence.iter().cloned() {
            apply_event(&mut registry, &event(kind, "db"));
        }
        assert_eq!(registry.status("db"), Some(&ServiceStatus::Stopped));
        assert_eq!(registry.count_with(&ServiceStatus::Stopped), 2);
    }
}
