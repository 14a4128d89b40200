/// League engine error types.
///
/// Store and I/O failures travel as `anyhow::Error`; these variants are the
/// domain failures callers may want to `downcast_ref` and act on.
#[derive(Debug, Clone, PartialEq)]
pub enum LeagueError {
    MatchNotFound(i64),
    TeamNotFound(i64),
    WagerNotFound(i64),
    UserNotFound(i64),
    SeasonNotFound(i64),
    /// Clock asked to move backward or by a negative delta.
    InvalidAdvance(String),
    InvalidWager(String),
    InvalidForecast(String),
    /// A user already has a forecast on this match.
    AlreadyForecast { user_id: i64, match_id: i64 },
    InsufficientBalance {
        user_id: i64,
        balance: f64,
        stake: f64,
    },
    /// The match no longer accepts wagers or forecasts.
    MatchNotOpen { match_id: i64, status: String },
}

impl std::fmt::Display for LeagueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MatchNotFound(id) => write!(f, "Match {} not found", id),
            Self::TeamNotFound(id) => write!(f, "Team {} not found", id),
            Self::WagerNotFound(id) => write!(f, "Wager {} not found", id),
            Self::UserNotFound(id) => write!(f, "User {} not found", id),
            Self::SeasonNotFound(id) => write!(f, "Season {} not found", id),
            Self::InvalidAdvance(msg) => write!(f, "Invalid clock advance: {}", msg),
            Self::InvalidWager(msg) => write!(f, "Invalid wager: {}", msg),
            Self::InvalidForecast(msg) => write!(f, "Invalid forecast: {}", msg),
            Self::AlreadyForecast { user_id, match_id } => write!(
                f,
                "User {} already has a forecast on match {}",
                user_id, match_id
            ),
            Self::InsufficientBalance {
                user_id,
                balance,
                stake,
            } => write!(
                f,
                "User {} balance {:.2} cannot cover stake {:.2}",
                user_id, balance, stake
            ),
            Self::MatchNotOpen { match_id, status } => {
                write!(f, "Match {} is {} and not open", match_id, status)
            }
        }
    }
}

impl std::error::Error for LeagueError {}

/// True when `err` carries a `LeagueError::*NotFound` anywhere in its chain.
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<LeagueError>(),
            Some(
                LeagueError::MatchNotFound(_)
                    | LeagueError::TeamNotFound(_)
                    | LeagueError::WagerNotFound(_)
                    | LeagueError::UserNotFound(_)
                    | LeagueError::SeasonNotFound(_)
            )
        )
    })
}
