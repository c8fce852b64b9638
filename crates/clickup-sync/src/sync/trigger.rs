//! Provenance tags for queue jobs.
//!
//! Every job records which change event caused it. Tags beginning with
//! `manual_` denote operator-initiated syncs rather than organic edits.

/// A post was created or updated.
pub const POST_SAVED: &str = "post_saved";

/// A post was permanently removed.
pub const POST_DELETED: &str = "post_deleted";

/// A taxonomy term was edited.
pub const TERM_EDITED: &str = "term_edited";

/// A taxonomy term was removed.
pub const TERM_DELETED: &str = "term_deleted";

/// Prefix marking operator-initiated syncs.
pub const MANUAL_PREFIX: &str = "manual_";

/// Whole-site resync from the admin surface.
pub const MANUAL_BULK_SYNC: &str = "manual_bulk_sync";

/// Whether a trigger means the entity was permanently removed. No task is
/// ever created for such a trigger: the entity's metadata may already be
/// gone, and a task for a ghost entity is worse than no task.
pub fn is_deletion(trigger: &str) -> bool {
    trigger == POST_DELETED || trigger == TERM_DELETED
}

/// Whether a trigger was operator-initiated.
pub fn is_manual(trigger: &str) -> bool {
    trigger.starts_with(MANUAL_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deletion_triggers() {
        assert!(is_deletion(POST_DELETED));
        assert!(is_deletion(TERM_DELETED));
        assert!(!is_deletion(POST_SAVED));
        assert!(!is_deletion(MANUAL_BULK_SYNC));
    }

    #[test]
    fn manual_triggers() {
        assert!(is_manual(MANUAL_BULK_SYNC));
        assert!(is_manual("manual_resync"));
        assert!(!is_manual(TERM_EDITED));
    }
}
