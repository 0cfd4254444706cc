//! Candidate ↔ opportunity association.
//!
//! The association lives on exactly one side: `opportunityId` on the
//! candidate record. A candidate references at most one opportunity; an
//! opportunity may be referenced by many candidates. Keeping the edge
//! single-sided means there is no second record to drift out of sync with.

use tracing::debug;

use pk_core::{Candidate, CandidatePatch, Filter, PkError, PkResult};

use crate::collection::CollectionClient;

pub struct AssociationResolver {
    candidates: CollectionClient<Candidate>,
}

impl AssociationResolver {
    pub fn new(candidates: CollectionClient<Candidate>) -> Self {
        Self { candidates }
    }

    /// Create a candidate that is born associated with an opportunity.
    pub async fn create_for_opportunity(
        &self,
        mut draft: Candidate,
        opportunity_id: &str,
    ) -> PkResult<Candidate> {
        if opportunity_id.is_empty() {
            return Err(PkError::InvalidArgument("missing opportunity id".into()));
        }
        draft.opportunity_id = Some(opportunity_id.to_string());
        self.candidates.create(&draft).await
    }

    /// Point an existing candidate at an opportunity.
    ///
    /// The patch carries only `opportunityId`: attaching must not resurrect
    /// other fields from whatever copy of the candidate the caller holds.
    /// Re-attaching an already-attached candidate overwrites the previous
    /// association; concurrent attachments resolve last-write-wins, which
    /// still ends with at most one opportunity per candidate.
    pub async fn attach(&self, candidate_id: &str, opportunity_id: &str) -> PkResult<()> {
        if opportunity_id.is_empty() {
            return Err(PkError::InvalidArgument("missing opportunity id".into()));
        }
        let patch = CandidatePatch {
            opportunity_id: Some(opportunity_id.to_string()),
            ..Default::default()
        };
        self.candidates.update(candidate_id, &patch).await?;
        debug!(candidate_id, opportunity_id, "candidate attached");
        Ok(())
    }

    /// The candidates associated with one opportunity, newest first.
    pub async fn for_opportunity(&self, opportunity_id: &str) -> PkResult<Vec<Candidate>> {
        self.candidates
            .fetch(&Filter::none().eq("opportunityId", opportunity_id))
            .await
    }

    /// The candidates eligible for a new association: those with no
    /// `opportunityId` at all. Membership here and in some opportunity's
    /// candidate list are mutually exclusive.
    pub async fn available(&self) -> PkResult<Vec<Candidate>> {
        let all = self.candidates.fetch_all().await?;
        Ok(all.into_iter().filter(Candidate::is_unattached).collect())
    }
}
