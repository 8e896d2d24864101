use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::{position::Position, user::Gender},
    db::candidate::{Candidate, NewCandidate},
};

use super::id::ApiId;

/// A candidate as returned by the API, with details of the position they stand for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateDescription {
    pub id: ApiId,
    pub name: String,
    pub student_id: String,
    pub position_id: String,
    pub position_title: String,
    pub position_description: String,
    pub gender: Gender,
    pub department: String,
    pub manifesto: String,
    pub image_url: Option<String>,
    /// Only shown to admins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_count: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl CandidateDescription {
    /// Describe a candidate without revealing their ballot count.
    pub fn public(candidate: Candidate) -> Self {
        Self::describe(candidate, None)
    }

    /// Describe a candidate with a ballot count counted from the ballots themselves.
    pub fn with_count(candidate: Candidate, vote_count: u64) -> Self {
        Self::describe(candidate, Some(vote_count))
    }

    fn describe(candidate: Candidate, vote_count: Option<u64>) -> Self {
        let position = Position::lookup(&candidate.position_id);
        Self {
            id: candidate.id.into(),
            name: candidate.candidate.name,
            student_id: candidate.candidate.student_id,
            position_id: candidate.candidate.position_id,
            position_title: position.title.to_string(),
            position_description: position.description.to_string(),
            gender: candidate.candidate.gender,
            department: candidate.candidate.department,
            manifesto: candidate.candidate.manifesto,
            image_url: candidate.candidate.image_url,
            vote_count,
            created_at: candidate.candidate.created_at,
        }
    }
}

/// A candidate registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub name: String,
    pub student_id: String,
    pub position_id: String,
    pub gender: Gender,
    pub department: String,
    pub manifesto: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl CandidateSpec {
    /// Check the fields that can be checked without the database.
    pub fn validate(&self) -> Result<&'static Position> {
        let required = [
            ("name", &self.name),
            ("student_id", &self.student_id),
            ("position_id", &self.position_id),
            ("department", &self.department),
            ("manifesto", &self.manifesto),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| *field)
            .collect();
        if !missing.is_empty() {
            return Err(Error::bad_request(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }
        Position::get(&self.position_id)
            .ok_or_else(|| Error::bad_request(format!("Invalid position: {}", self.position_id)))
    }
}

impl From<CandidateSpec> for NewCandidate {
    fn from(spec: CandidateSpec) -> Self {
        Self {
            name: spec.name.trim().to_string(),
            student_id: spec.student_id.trim().to_string(),
            position_id: spec.position_id,
            gender: spec.gender,
            department: spec.department.trim().to_string(),
            manifesto: spec.manifesto,
            image_url: spec.image_url.filter(|url| !url.trim().is_empty()),
            seat: 0,
            vote_count: 0,
            created_at: Utc::now(),
        }
    }
}

/// Changes to an existing candidate. Absent fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub position_id: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub manifesto: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl CandidateUpdate {
    /// Apply the changes, rejecting blank values and unknown positions.
    pub fn apply_to(self, candidate: &mut NewCandidate) -> Result<()> {
        if let Some(position_id) = self.position_id {
            if Position::get(&position_id).is_none() {
                return Err(Error::bad_request(format!("Invalid position: {position_id}")));
            }
            candidate.position_id = position_id;
        }
        for (field, value, target) in [
            ("name", self.name, &mut candidate.name),
            ("department", self.department, &mut candidate.department),
            ("manifesto", self.manifesto, &mut candidate.manifesto),
        ] {
            if let Some(value) = value {
                if value.trim().is_empty() {
                    return Err(Error::bad_request(format!("{field} cannot be empty")));
                }
                *target = value.trim().to_string();
            }
        }
        if let Some(url) = self.image_url {
            candidate.image_url = Some(url).filter(|url| !url.trim().is_empty());
        }
        Ok(())
    }
}
