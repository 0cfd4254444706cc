use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

/// The document collections of the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Leads,
    Opportunities,
    Candidates,
    Interactions,
    Skills,
    Users,
    Teams,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leads => "leads",
            Self::Opportunities => "opportunities",
            Self::Candidates => "candidates",
            Self::Interactions => "interactions",
            Self::Skills => "skills",
            Self::Users => "users",
            Self::Teams => "teams",
        }
    }
}

impl std::str::FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leads" => Ok(Self::Leads),
            "opportunities" => Ok(Self::Opportunities),
            "candidates" => Ok(Self::Candidates),
            "interactions" => Ok(Self::Interactions),
            "skills" => Ok(Self::Skills),
            "users" => Ok(Self::Users),
            "teams" => Ok(Self::Teams),
            _ => Err(format!("unknown collection: {s}")),
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A top-level entity persisted in its own collection.
///
/// Identifiers and both timestamps are server-assigned; client-supplied
/// values for them are stripped at the store boundary before any write.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Attachment
// ---------------------------------------------------------------------------

/// One uploaded file, embedded by value in the owning entity's `attachments`
/// sequence. The `id` doubles as the blob object's storage key; the embedded
/// record and the blob must refer to the same bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub content_type: String,
    pub url: String,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Entity kinds that can own attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerKind {
    Lead,
    Opportunity,
    Candidate,
}

impl OwnerKind {
    pub fn collection(&self) -> Collection {
        match self {
            Self::Lead => Collection::Leads,
            Self::Opportunity => Collection::Opportunities,
            Self::Candidate => Collection::Candidates,
        }
    }
}

impl std::fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.collection().as_str())
    }
}

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Unqualified,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Qualified => "qualified",
            Self::Unqualified => "unqualified",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    pub company_name: String,
    pub contact_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub status: LeadStatus,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_contacted_at: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// A draft lead. The placeholder id and timestamps are stripped at the
    /// store boundary and replaced with server-assigned values on create.
    pub fn new(
        company_name: impl Into<String>,
        contact_name: impl Into<String>,
        email: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            company_name: company_name.into(),
            contact_name: contact_name.into(),
            email: email.into(),
            phone: None,
            status: LeadStatus::New,
            source: source.into(),
            notes: None,
            assigned_to: None,
            last_contacted_at: None,
            attachments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: LeadStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_assigned_to(mut self, user_id: impl Into<String>) -> Self {
        self.assigned_to = Some(user_id.into());
        self
    }
}

impl Record for Lead {
    const COLLECTION: Collection = Collection::Leads;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Sparse update for a lead; `None` fields are omitted from the wire write.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LeadStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_contacted_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Opportunity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStage {
    Discovery,
    Proposal,
    Negotiation,
    ClosedWon,
    ClosedLost,
}

impl OpportunityStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Proposal => "proposal",
            Self::Negotiation => "negotiation",
            Self::ClosedWon => "closed_won",
            Self::ClosedLost => "closed_lost",
        }
    }
}

impl std::fmt::Display for OpportunityStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub title: String,
    pub value: f64,
    pub stage: OpportunityStage,
    pub probability: u32,
    pub expected_close_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub products: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Opportunity {
    pub fn new(title: impl Into<String>, value: f64, expected_close_date: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            lead_id: None,
            client_id: None,
            title: title.into(),
            value,
            stage: OpportunityStage::Discovery,
            probability: 0,
            expected_close_date: expected_close_date.into(),
            assigned_to: None,
            products: Vec::new(),
            notes: None,
            attachments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_lead(mut self, lead_id: impl Into<String>) -> Self {
        self.lead_id = Some(lead_id.into());
        self
    }

    pub fn with_stage(mut self, stage: OpportunityStage) -> Self {
        self.stage = stage;
        self
    }
}

impl Record for Opportunity {
    const COLLECTION: Collection = Collection::Opportunities;

    fn id(&self) -> &str {
        &self.id
    }
}

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    New,
    Screening,
    Interviewing,
    Offered,
    Accepted,
    Rejected,
    Withdrawn,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Screening => "screening",
            Self::Interviewing => "interviewing",
            Self::Offered => "offered",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Withdrawn => "withdrawn",
        }
    }
}

impl std::fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recruiting candidate. `opportunity_id` is a weak reference: at most one
/// opportunity at any instant, and deleting the opportunity does not cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub status: CandidateStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_salary: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice_period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_url: Option<String>,
    /// Free-text skill tags: copied strings, not references into the shared
    /// vocabulary. Deleting a vocabulary entry does not touch these.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opportunity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Candidate {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            name: name.into(),
            email: email.into(),
            phone: None,
            status: CandidateStatus::New,
            current_role: None,
            current_company: None,
            expected_salary: None,
            notice_period: None,
            resume_url: None,
            skills: Vec::new(),
            notes: None,
            opportunity_id: None,
            assigned_to: None,
            attachments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_skills(mut self, skills: Vec<String>) -> Self {
        self.skills = skills;
        self
    }

    pub fn with_opportunity(mut self, opportunity_id: impl Into<String>) -> Self {
        self.opportunity_id = Some(opportunity_id.into());
        self
    }

    /// Whether this candidate is eligible for association with an opportunity.
    pub fn is_unattached(&self) -> bool {
        self.opportunity_id.is_none()
    }
}

impl Record for Candidate {
    const COLLECTION: Collection = Collection::Candidates;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Sparse update for a candidate; `None` fields are omitted from the wire
/// write, so a patch never clobbers fields the caller did not supply.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CandidateStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_salary: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice_period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opportunity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
}

// ---------------------------------------------------------------------------
// Interaction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Email,
    Call,
    Meeting,
    Note,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Call => "call",
            Self::Meeting => "meeting",
            Self::Note => "note",
        }
    }
}

impl std::fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A logged touchpoint, optionally scoped to a lead, opportunity, or
/// candidate for timeline views.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: InteractionKind,
    pub title: String,
    pub description: String,
    pub date: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opportunity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Interaction {
    pub fn new(
        kind: InteractionKind,
        title: impl Into<String>,
        description: impl Into<String>,
        date: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            kind,
            title: title.into(),
            description: description.into(),
            date: date.into(),
            user_id: user_id.into(),
            lead_id: None,
            opportunity_id: None,
            candidate_id: None,
            notes: None,
            attachments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn for_opportunity(mut self, opportunity_id: impl Into<String>) -> Self {
        self.opportunity_id = Some(opportunity_id.into());
        self
    }

    pub fn for_lead(mut self, lead_id: impl Into<String>) -> Self {
        self.lead_id = Some(lead_id.into());
        self
    }

    pub fn for_candidate(mut self, candidate_id: impl Into<String>) -> Self {
        self.candidate_id = Some(candidate_id.into());
        self
    }
}

impl Record for Interaction {
    const COLLECTION: Collection = Collection::Interactions;

    fn id(&self) -> &str {
        &self.id
    }
}

// ---------------------------------------------------------------------------
// Skill
// ---------------------------------------------------------------------------

/// One entry in the shared, append-only tag vocabulary. Never mutated, only
/// created or deleted; names are intended to be unique (case-sensitive) but
/// concurrent creation can produce duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Skill {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            name: name.into(),
            category: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

impl Record for Skill {
    const COLLECTION: Collection = Collection::Skills;

    fn id(&self) -> &str {
        &self.id
    }
}

// ---------------------------------------------------------------------------
// User / Team
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            name: name.into(),
            email: email.into(),
            role,
            team_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

impl Record for User {
    const COLLECTION: Collection = Collection::Users;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub name: String,
    pub manager_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Team {
    pub fn new(name: impl Into<String>, manager_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            name: name.into(),
            manager_id: manager_id.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for Team {
    const COLLECTION: Collection = Collection::Teams;

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_round_trips_through_str() {
        for c in [
            Collection::Leads,
            Collection::Opportunities,
            Collection::Candidates,
            Collection::Interactions,
            Collection::Skills,
            Collection::Users,
            Collection::Teams,
        ] {
            let parsed: Collection = c.as_str().parse().unwrap();
            assert_eq!(parsed, c);
        }
        assert!("payruns".parse::<Collection>().is_err());
    }

    #[test]
    fn lead_serializes_camel_case_and_omits_absent_fields() {
        let lead = Lead::new("Acme", "Jo", "jo@acme.com", "Website");
        let value = serde_json::to_value(&lead).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj["companyName"], "Acme");
        assert_eq!(obj["status"], "new");
        // Absent optionals are omitted, not serialized as null.
        assert!(!obj.contains_key("phone"));
        assert!(!obj.contains_key("notes"));
        assert!(!obj.contains_key("attachments"));
    }

    #[test]
    fn candidate_patch_serializes_only_supplied_fields() {
        let patch = CandidatePatch {
            opportunity_id: Some("OPP1".into()),
            ..Default::default()
        };
        let value = serde_json::to_value(&patch).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert_eq!(obj["opportunityId"], "OPP1");
    }

    #[test]
    fn interaction_kind_uses_type_field() {
        let interaction =
            Interaction::new(InteractionKind::Call, "Intro", "First call", "2026-08-28", "u1");
        let value = serde_json::to_value(&interaction).unwrap();
        assert_eq!(value["type"], "call");
    }

    #[test]
    fn unattached_candidate_has_no_opportunity() {
        let candidate = Candidate::new("A", "a@x.com");
        assert!(candidate.is_unattached());
        let attached = candidate.with_opportunity("OPP1");
        assert!(!attached.is_unattached());
    }

    #[test]
    fn owner_kind_maps_to_collection() {
        assert_eq!(OwnerKind::Lead.collection(), Collection::Leads);
        assert_eq!(OwnerKind::Candidate.to_string(), "candidates");
    }

    #[test]
    fn admin_role_grants_privilege() {
        assert!(User::new("A", "a@x.com", UserRole::Admin).is_admin());
        assert!(!User::new("B", "b@x.com", UserRole::User).is_admin());
    }
}
