use serde::Serialize;

use super::user::Gender;

/// An electable office with fixed per-gender seat counts.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct Position {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub male_seats: usize,
    pub female_seats: usize,
}

/// Returned for any position ID not in the catalog.
pub const UNKNOWN_POSITION: Position = Position {
    id: "unknown",
    title: "Unknown Position",
    description: "Position details not available",
    male_seats: 0,
    female_seats: 0,
};

/// Every position, in display order.
static POSITIONS: [Position; 6] = [
    Position {
        id: "chief_councillor",
        title: "Chief Councillor",
        description: "Lead the student body and represent student interests",
        male_seats: 1,
        female_seats: 1,
    },
    Position {
        id: "deputy_chief_councillor",
        title: "Deputy Chief Councillor",
        description: "Support the Chief Councillor and oversee student activities",
        male_seats: 1,
        female_seats: 1,
    },
    Position {
        id: "games_health_councillor",
        title: "Games and Health Councillor",
        description: "Oversee sports activities and health initiatives",
        male_seats: 1,
        female_seats: 1,
    },
    Position {
        id: "block_councillor",
        title: "Block Councillor",
        description: "Manage block-level activities and concerns",
        male_seats: 1,
        female_seats: 1,
    },
    Position {
        id: "cultural_councillor",
        title: "Cultural Councillor",
        description: "Organize cultural events and promote diversity",
        male_seats: 1,
        female_seats: 1,
    },
    Position {
        id: "college_academic_councillor",
        title: "College Academic Councillor",
        description: "Represent academic interests and concerns",
        male_seats: 1,
        female_seats: 1,
    },
];

impl Position {
    /// All catalog positions, in display order.
    pub fn all() -> &'static [Position] {
        &POSITIONS
    }

    /// Look up a position by ID, if it is in the catalog.
    pub fn get(id: &str) -> Option<&'static Position> {
        POSITIONS.iter().find(|position| position.id == id)
    }

    /// Look up a position by ID, falling back to [`UNKNOWN_POSITION`].
    pub fn lookup(id: &str) -> &'static Position {
        Self::get(id).unwrap_or(&UNKNOWN_POSITION)
    }

    /// Index of the given position in display order; unknown positions sort last.
    pub fn display_order(id: &str) -> usize {
        POSITIONS
            .iter()
            .position(|position| position.id == id)
            .unwrap_or(POSITIONS.len())
    }

    /// Number of seats reserved for the given gender.
    pub fn seats_for(&self, gender: Gender) -> usize {
        match gender {
            Gender::Male => self.male_seats,
            Gender::Female => self.female_seats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_six_positions_with_one_seat_each() {
        assert_eq!(Position::all().len(), 6);
        for position in Position::all() {
            assert_eq!(position.seats_for(Gender::Male), 1);
            assert_eq!(position.seats_for(Gender::Female), 1);
        }
    }

    #[test]
    fn unknown_position_is_sentinel() {
        assert_eq!(Position::get("treasurer"), None);
        let unknown = Position::lookup("treasurer");
        assert_eq!(unknown.title, "Unknown Position");
        assert_eq!(unknown.male_seats + unknown.female_seats, 0);
    }

    #[test]
    fn display_order_follows_catalog() {
        assert_eq!(Position::display_order("chief_councillor"), 0);
        assert_eq!(Position::display_order("college_academic_councillor"), 5);
        assert_eq!(Position::display_order("treasurer"), 6);
        assert_eq!(
            Position::lookup("block_councillor").title,
            "Block Councillor"
        );
    }
}
