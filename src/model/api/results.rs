use serde::Serialize;

use crate::model::common::position::Position;
use crate::voting::tally::{Breakdown, CandidateTally, PositionResult, Statistics, Winners};

use super::{election::ElectionStatusDescription, pagination::Paginated};

/// Final results, once the election has closed.
#[derive(Debug, Clone, Serialize)]
pub struct PublicResults {
    pub positions: Vec<PositionResult>,
    pub statistics: Statistics,
}

/// The winners of one position.
#[derive(Debug, Clone, Serialize)]
pub struct PositionWinners {
    pub position: &'static Position,
    pub winners: Winners,
}

impl From<PositionResult> for PositionWinners {
    fn from(result: PositionResult) -> Self {
        Self {
            position: result.position,
            winners: result.winners,
        }
    }
}

/// Live results for admins: one page of ranked candidates plus the current winners.
#[derive(Debug, Clone, Serialize)]
pub struct AdminResults {
    pub candidates: Paginated<CandidateTally>,
    pub winners: Vec<PositionWinners>,
    pub statistics: Statistics,
    pub by_department: Vec<Breakdown>,
    pub by_gender: Vec<Breakdown>,
}

/// Dashboard figures.
#[derive(Debug, Clone, Serialize)]
pub struct AdminStats {
    pub statistics: Statistics,
    pub total_candidates: u64,
    pub by_department: Vec<Breakdown>,
    pub by_gender: Vec<Breakdown>,
    pub by_position: Vec<Breakdown>,
    pub status: ElectionStatusDescription,
}
