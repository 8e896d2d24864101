use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use mongodb::bson::{doc, Bson, Document};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    api::id::ApiId,
    common::{
        position::Position,
        user::{Gender, Role},
    },
    db::{ballot::Ballot, candidate::Candidate, election_status::ElectionStatus, user::User},
    mongodb::{Coll, Id},
};

/// A candidate together with their live ballot count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTally {
    pub id: ApiId,
    pub name: String,
    pub department: String,
    pub gender: Gender,
    pub position_id: String,
    pub image_url: Option<String>,
    pub vote_count: u64,
    /// Share of the position's ballots, to one decimal place. Filled in by [`compute_results`].
    #[serde(default)]
    pub vote_percentage: f64,
}

impl CandidateTally {
    pub fn new(candidate: Candidate, vote_count: u64) -> Self {
        Self {
            id: candidate.id.into(),
            name: candidate.candidate.name,
            department: candidate.candidate.department,
            gender: candidate.candidate.gender,
            position_id: candidate.candidate.position_id,
            image_url: candidate.candidate.image_url,
            vote_count,
            vote_percentage: 0.0,
        }
    }
}

/// The winning candidates of one position, per gender.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Winners {
    pub male: Vec<CandidateTally>,
    pub female: Vec<CandidateTally>,
}

/// The ranked candidates and winners of one position.
#[derive(Debug, Clone, Serialize)]
pub struct PositionResult {
    pub position: &'static Position,
    pub candidates: Vec<CandidateTally>,
    pub winners: Winners,
    /// Ballots cast for this position.
    pub total_votes: u64,
}

/// Percentage of `total` that `votes` makes up, to one decimal place; 0 when nothing was cast.
pub fn vote_share(votes: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (votes as f64 * 1000.0 / total as f64).round() / 10.0
}

/// Sort by ballot count, highest first; ties go to the lower candidate ID.
pub fn rank(candidates: &mut [CandidateTally]) {
    candidates.sort_by_key(|c| (Reverse(c.vote_count), c.id));
}

/// Fill each gender's seats from an already ranked list.
pub fn select_winners(position: &Position, ranked: &[CandidateTally]) -> Winners {
    let take = |gender: Gender| {
        ranked
            .iter()
            .filter(|c| c.gender == gender)
            .take(position.seats_for(gender))
            .cloned()
            .collect::<Vec<_>>()
    };
    Winners {
        male: take(Gender::Male),
        female: take(Gender::Female),
    }
}

/// Group candidates by position, rank each group and pick its winners.
///
/// Candidates for positions outside the catalog are dropped. Positions come
/// back in catalog display order.
pub fn compute_results(candidates: Vec<CandidateTally>) -> Vec<PositionResult> {
    let mut groups: BTreeMap<usize, Vec<CandidateTally>> = BTreeMap::new();
    for candidate in candidates {
        if Position::get(&candidate.position_id).is_none() {
            continue;
        }
        groups
            .entry(Position::display_order(&candidate.position_id))
            .or_default()
            .push(candidate);
    }

    groups
        .into_values()
        .filter_map(|mut group| {
            let position = Position::get(&group.first()?.position_id)?;
            let total_votes = group.iter().map(|c| c.vote_count).sum();
            for candidate in &mut group {
                candidate.vote_percentage = vote_share(candidate.vote_count, total_votes);
            }
            rank(&mut group);
            let winners = select_winners(position, &group);
            Some(PositionResult {
                position,
                candidates: group,
                winners,
                total_votes,
            })
        })
        .collect()
}

/// Aggregate participation figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Registered students.
    pub total_voters: u64,
    /// Ballots cast across all positions.
    pub total_votes: u64,
    /// Students who cast at least one ballot.
    pub voted_count: u64,
    /// Percentage of students who cast at least one ballot.
    pub voter_turnout: f64,
}

impl Statistics {
    pub fn new(total_voters: u64, total_votes: u64, voted_count: u64) -> Self {
        Self {
            total_voters,
            total_votes,
            voted_count,
            voter_turnout: turnout(voted_count, total_voters),
        }
    }
}

/// Percentage of voters who took part, within [0, 100]; 0 when there are no voters.
pub fn turnout(participants: u64, total_voters: u64) -> f64 {
    if total_voters == 0 {
        return 0.0;
    }
    let ratio = participants.min(total_voters) as f64 / total_voters as f64;
    (ratio * 100.0).clamp(0.0, 100.0)
}

/// Why public results are not available yet, if they aren't.
pub fn results_unavailable_reason(
    status: Option<&ElectionStatus>,
    now: DateTime<Utc>,
) -> Option<&'static str> {
    match status {
        None => Some("Results are not available yet"),
        Some(status) if status.is_active => Some("Results are not available yet"),
        Some(ElectionStatus {
            end_time: Some(end),
            ..
        }) if now < *end => Some("Results will be available after the election ends"),
        Some(_) => None,
    }
}

/// Load candidates, optionally for one position, with ballot counts aggregated from the ballots
/// themselves rather than the cached counter.
pub async fn load_tallies(
    candidates: &Coll<Candidate>,
    ballots: &Coll<Ballot>,
    position_id: Option<&str>,
) -> Result<Vec<CandidateTally>> {
    let filter = position_id.map(|id| doc! { "position_id": id });
    let all: Vec<Candidate> = candidates.find(filter.clone(), None).await?.try_collect().await?;
    let counts = ballot_counts(ballots, filter).await?;
    Ok(all
        .into_iter()
        .map(|candidate| {
            let count = counts.get(&candidate.id).copied().unwrap_or(0);
            CandidateTally::new(candidate, count)
        })
        .collect())
}

/// Number of ballots per candidate ID.
pub async fn ballot_counts(
    ballots: &Coll<Ballot>,
    filter: Option<Document>,
) -> Result<HashMap<Id, u64>> {
    let mut pipeline = Vec::new();
    if let Some(filter) = filter {
        pipeline.push(doc! { "$match": filter });
    }
    pipeline.push(doc! { "$group": { "_id": "$candidate_id", "count": { "$sum": 1 } } });

    let groups: Vec<Document> = ballots.aggregate(pipeline, None).await?.try_collect().await?;
    Ok(groups
        .into_iter()
        .filter_map(|group| {
            let id = group.get_object_id("_id").ok()?;
            Some((id.into(), count_field(&group)))
        })
        .collect())
}

/// Load participation figures.
pub async fn load_statistics(users: &Coll<User>, ballots: &Coll<Ballot>) -> Result<Statistics> {
    let total_voters = users
        .count_documents(doc! { "role": Role::Student }, None)
        .await?;
    let total_votes = ballots.count_documents(None, None).await?;
    let voted_count = ballots.distinct("voter_id", None, None).await?.len() as u64;
    Ok(Statistics::new(total_voters, total_votes, voted_count))
}

/// How many items share one value of a grouping field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakdown {
    /// The shared value; absent when the field is unset.
    pub key: Option<String>,
    pub count: u64,
}

/// Count students grouped by one of their fields, e.g. `department` or `gender`.
pub async fn student_breakdown(users: &Coll<User>, field: &str) -> Result<Vec<Breakdown>> {
    let pipeline = [
        doc! { "$match": { "role": Role::Student } },
        doc! { "$group": { "_id": format!("${field}"), "count": { "$sum": 1 } } },
        doc! { "$sort": { "_id": 1 } },
    ];
    let groups: Vec<Document> = users.aggregate(pipeline, None).await?.try_collect().await?;
    Ok(groups.iter().map(breakdown).collect())
}

/// Count ballots per position.
pub async fn position_breakdown(ballots: &Coll<Ballot>) -> Result<Vec<Breakdown>> {
    let pipeline = [
        doc! { "$group": { "_id": "$position_id", "count": { "$sum": 1 } } },
        doc! { "$sort": { "_id": 1 } },
    ];
    let groups: Vec<Document> = ballots.aggregate(pipeline, None).await?.try_collect().await?;
    Ok(groups.iter().map(breakdown).collect())
}

fn breakdown(group: &Document) -> Breakdown {
    Breakdown {
        key: group.get_str("_id").ok().map(str::to_string),
        count: count_field(group),
    }
}

/// `$sum` yields either 32 or 64 bit integers depending on size.
fn count_field(group: &Document) -> u64 {
    match group.get("count") {
        Some(Bson::Int32(n)) => u64::try_from(*n).unwrap_or(0),
        Some(Bson::Int64(n)) => u64::try_from(*n).unwrap_or(0),
        _ => 0,
    }
}
