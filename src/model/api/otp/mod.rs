mod challenge;
mod code;

pub use challenge::{Challenge, ChallengeError, CHALLENGE_COOKIE};
pub use code::{Code, ParseError as CodeParseError, LENGTH as CODE_LENGTH};
