use crate::storage::Revision;
use chrono::{DateTime, SubsecRound, Utc};

/// Where an entity sits relative to its stored counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed by the caller and not mutated since.
    New,
    /// Produced by a fetch and untouched since.
    Loaded,
    /// Mutated since construction, fetch or the last save.
    Modified,
    /// Produced by a successful save and untouched since.
    Synchronized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Constructed,
    Fetched,
    Saved,
    Edited,
}

/// A talk that collects up and down votes.
///
/// Public setters always mark the entity dirty. Values decoded from storage
/// go through [`Presentation::hydrate`] instead, which leaves it clean.
#[derive(Debug, Clone, PartialEq)]
pub struct Presentation {
    id: Option<String>,
    title: String,
    created_at: DateTime<Utc>,
    up_votes: u32,
    down_votes: u32,
    dirty: bool,
    revision: Option<Revision>,
    origin: Origin,
}

impl Default for Presentation {
    fn default() -> Self {
        Self::new()
    }
}

impl Presentation {
    pub fn new() -> Self {
        Self {
            id: None,
            title: String::new(),
            created_at: Utc::now().trunc_subsecs(3),
            up_votes: 0,
            down_votes: 0,
            dirty: true,
            revision: None,
            origin: Origin::Constructed,
        }
    }

    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::new()
        }
    }

    pub(crate) fn hydrate(
        revision: Revision,
        title: String,
        created_at: DateTime<Utc>,
        up_votes: u32,
        down_votes: u32,
    ) -> Self {
        Self {
            id: Some(revision.id().to_string()),
            title,
            created_at,
            up_votes,
            down_votes,
            dirty: false,
            revision: Some(revision),
            origin: Origin::Fetched,
        }
    }

    pub(crate) fn into_synchronized(mut self) -> Self {
        self.origin = Origin::Saved;
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn up_votes(&self) -> u32 {
        self.up_votes
    }

    pub fn down_votes(&self) -> u32 {
        self.down_votes
    }

    pub fn score(&self) -> i64 {
        i64::from(self.up_votes) - i64::from(self.down_votes)
    }

    pub fn revision(&self) -> Option<&Revision> {
        self.revision.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn lifecycle(&self) -> Lifecycle {
        match (self.dirty, self.origin) {
            (true, Origin::Constructed) => Lifecycle::New,
            (true, _) => Lifecycle::Modified,
            (false, Origin::Saved) => Lifecycle::Synchronized,
            (false, _) => Lifecycle::Loaded,
        }
    }

    /// Sets the identifier if none is set yet. Returns whether it was taken.
    ///
    /// Never marks the entity dirty: an identifier alone is not worth a write.
    pub fn assign_id(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if id.is_empty() || self.id.as_deref().is_some_and(|current| !current.is_empty()) {
            return false;
        }
        self.id = Some(id);
        true
    }

    fn mark_edited(&mut self) {
        self.dirty = true;
        self.origin = Origin::Edited;
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.mark_edited();
        self.title = title.into();
    }

    pub fn set_created_at(&mut self, created_at: DateTime<Utc>) {
        self.mark_edited();
        self.created_at = created_at;
    }

    pub fn set_up_votes(&mut self, up_votes: u32) {
        self.mark_edited();
        self.up_votes = up_votes;
    }

    pub fn set_down_votes(&mut self, down_votes: u32) {
        self.mark_edited();
        self.down_votes = down_votes;
    }

    pub fn up_vote(&mut self) {
        self.set_up_votes(self.up_votes.saturating_add(1));
    }

    pub fn down_vote(&mut self) {
        self.set_down_votes(self.down_votes.saturating_add(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded() -> Presentation {
        Presentation::hydrate(
            Revision::new("p::rust", 4),
            "Rust".to_string(),
            DateTime::<Utc>::from_timestamp_millis(1_000).unwrap(),
            3,
            1,
        )
    }

    #[test]
    fn test_new_is_dirty_and_unidentified() {
        let presentation = Presentation::new();
        assert!(presentation.is_dirty());
        assert_eq!(presentation.id(), None);
        assert_eq!(presentation.revision(), None);
        assert_eq!(presentation.title(), "");
        assert_eq!(presentation.lifecycle(), Lifecycle::New);
        assert_eq!(presentation.created_at().timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn test_hydrate_is_clean() {
        let presentation = loaded();
        assert!(!presentation.is_dirty());
        assert_eq!(presentation.id(), Some("p::rust"));
        assert_eq!(presentation.lifecycle(), Lifecycle::Loaded);
        assert_eq!(presentation.score(), 2);
    }

    #[test]
    fn test_every_mutator_marks_dirty() {
        let mutators: Vec<fn(&mut Presentation)> = vec![
            |p| p.set_title("Other"),
            |p| p.set_created_at(DateTime::<Utc>::from_timestamp_millis(5).unwrap()),
            |p| p.set_up_votes(9),
            |p| p.set_down_votes(9),
            |p| p.up_vote(),
            |p| p.down_vote(),
        ];
        for mutate in mutators {
            let mut presentation = loaded();
            mutate(&mut presentation);
            assert!(presentation.is_dirty());
            assert_eq!(presentation.lifecycle(), Lifecycle::Modified);
            assert_eq!(presentation.id(), Some("p::rust"));
        }
    }

    #[test]
    fn test_constructed_entity_becomes_modified_on_mutation() {
        let mut presentation = Presentation::with_title("Fresh");
        assert_eq!(presentation.lifecycle(), Lifecycle::New);

        presentation.up_vote();
        assert!(presentation.is_dirty());
        assert_eq!(presentation.revision(), None);
        assert_eq!(presentation.lifecycle(), Lifecycle::Modified);

        let mut blank = Presentation::new();
        blank.set_title("Later");
        assert_eq!(blank.lifecycle(), Lifecycle::Modified);
    }

    #[test]
    fn test_identifier_is_write_once_and_never_dirties() {
        let mut presentation = loaded();
        assert!(!presentation.assign_id("p::other"));
        assert_eq!(presentation.id(), Some("p::rust"));
        assert!(!presentation.is_dirty());

        let mut fresh = Presentation::new();
        assert!(!fresh.assign_id(""));
        assert!(fresh.assign_id("custom"));
        assert!(!fresh.assign_id("again"));
        assert_eq!(fresh.id(), Some("custom"));

        fresh.set_title("Renamed");
        assert_eq!(fresh.id(), Some("custom"));
    }

    #[test]
    fn test_votes_saturate() {
        let mut presentation = Presentation::new();
        presentation.set_up_votes(u32::MAX);
        presentation.up_vote();
        assert_eq!(presentation.up_votes(), u32::MAX);
        presentation.down_vote();
        assert_eq!(presentation.score(), i64::from(u32::MAX) - 1);
    }
}
