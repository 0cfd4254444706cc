//! Skill vocabulary: the shared, append-only list of skill tags.
//!
//! Candidates carry skills as free-text strings copied from the vocabulary
//! at selection time. Growing the vocabulary is a privileged side effect:
//! only admins add entries, and a non-admin's attempt is silently skipped so
//! tagging flows never fail on permissions. Names are matched exactly, case
//! and whitespace included, once trimmed at the edges.

use tracing::{debug, warn};

use pk_core::{PkError, PkResult, Skill, User};

use crate::collection::CollectionClient;

pub struct SkillVocabulary {
    skills: CollectionClient<Skill>,
}

impl SkillVocabulary {
    pub fn new(skills: CollectionClient<Skill>) -> Self {
        Self { skills }
    }

    /// The full vocabulary, newest first. Served from the session cache
    /// between mutations.
    pub async fn tags(&self) -> PkResult<Vec<Skill>> {
        self.skills.fetch_all().await
    }

    /// Add `name` to the vocabulary unless it is already present.
    ///
    /// Edge whitespace is trimmed before comparison; the comparison itself is
    /// exact, so "rust" and "Rust" are distinct entries. For a non-admin
    /// actor this is a no-op, not an error. Two admins racing on the same
    /// name may both insert it; the duplicate is harmless (selection copies
    /// the string, not the record) and is not guarded against here.
    pub async fn ensure_tag(&self, name: &str, actor: Option<&User>) -> PkResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PkError::InvalidArgument("empty skill name".into()));
        }

        let is_admin = actor.map(User::is_admin).unwrap_or(false);
        if !is_admin {
            debug!(name, "skill creation skipped: actor is not an admin");
            return Ok(());
        }

        let existing = self.skills.fetch_all().await?;
        if existing.iter().any(|skill| skill.name == name) {
            return Ok(());
        }

        let created = self.skills.create(&Skill::new(name)).await?;
        debug!(name, id = created.id, "skill added to vocabulary");
        Ok(())
    }

    /// Remove a vocabulary entry. Admin-only; candidates that copied the
    /// name keep their free-text string, so removal only stops the tag from
    /// being suggested.
    pub async fn remove_tag(&self, id: &str, actor: Option<&User>) -> PkResult<()> {
        let is_admin = actor.map(User::is_admin).unwrap_or(false);
        if !is_admin {
            warn!(id, "skill removal refused: actor is not an admin");
            return Err(PkError::PermissionDenied(
                "skill removal requires the admin role".into(),
            ));
        }
        self.skills.delete(id).await
    }
}
