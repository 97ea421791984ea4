//! The worker-side state saved before a snapshot is installed.

use crate::errors::RestoreInvariantViolation;
use crate::snapshot::{CapturedEntry, ContextSnapshot};
use uuid::Uuid;

/// The worker's own state for exactly the slots of one snapshot.
pub(crate) struct Backup {
    snapshot_id: Uuid,
    entries: Vec<CapturedEntry>,
}

impl Backup {
    /// Reads the current thread's state for every slot in `snapshot`.
    pub(crate) fn take(snapshot: &ContextSnapshot) -> Self {
        let entries = snapshot
            .entries()
            .iter()
            .map(|entry| CapturedEntry {
                participant: entry.participant.clone(),
                state: entry.participant.backup(),
            })
            .collect();

        Self {
            snapshot_id: snapshot.id(),
            entries,
        }
    }

    /// Checks that this backup covers exactly the slots of `snapshot`.
    pub(crate) fn verify(&self, snapshot: &ContextSnapshot) -> Result<(), RestoreInvariantViolation> {
        if self.snapshot_id != snapshot.id() {
            return Err(RestoreInvariantViolation::new(
                snapshot.id(),
                format!("backup was taken for snapshot {}", self.snapshot_id),
            ));
        }

        let installed = snapshot.entries();
        if installed.len() != self.entries.len() {
            return Err(RestoreInvariantViolation::new(
                snapshot.id(),
                format!(
                    "backup covers {} slots but {} were installed",
                    self.entries.len(),
                    installed.len()
                ),
            ));
        }

        for (saved, applied) in self.entries.iter().zip(installed) {
            if saved.participant.id() != applied.participant.id() {
                return Err(RestoreInvariantViolation::new(
                    snapshot.id(),
                    format!(
                        "backup slot {} does not match installed slot {}",
                        saved.participant.id(),
                        applied.participant.id()
                    ),
                ));
            }
        }

        Ok(())
    }

    /// Writes every saved state back, last installed first.
    pub(crate) fn restore(&self) {
        for entry in self.entries.iter().rev() {
            entry.participant.restore(&entry.state);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ContextRegistry;
    use crate::slot::ContextSlot;

    #[test]
    fn test_backup_matches_its_snapshot() {
        let registry = ContextRegistry::new();
        let _slot = ContextSlot::<u8>::builder("a").register_in(&registry);
        let snapshot = ContextSnapshot::capture_from(&registry);

        let backup = Backup::take(&snapshot);
        assert_eq!(backup.len(), 1);
        assert!(backup.verify(&snapshot).is_ok());
    }

    #[test]
    fn test_backup_rejects_other_snapshot() {
        let registry = ContextRegistry::new();
        let _slot = ContextSlot::<u8>::builder("a").register_in(&registry);
        let first = ContextSnapshot::capture_from(&registry);
        let second = ContextSnapshot::capture_from(&registry);

        let backup = Backup::take(&first);
        let err = backup.verify(&second).unwrap_err();
        assert_eq!(err.snapshot_id, second.id());
        assert!(err.detail.contains(&first.id().to_string()));
    }

    #[test]
    fn test_backup_restores_absence() {
        let registry = ContextRegistry::new();
        let slot = ContextSlot::<String>::builder("a").register_in(&registry);
        let snapshot = ContextSnapshot::capture_from(&registry);

        let backup = Backup::take(&snapshot);
        slot.set("leaked".to_string()).unwrap();
        backup.restore();

        assert!(!slot.is_present());
    }
}
