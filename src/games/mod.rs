// Probabilistic wager games with server-authoritative settlement

pub mod coinflip;
pub mod mines;

pub use coinflip::{CoinSide, CoinflipEngine, FlipReceipt};
pub use mines::{
    calculate_multiplier, CashoutReceipt, MinesEngine, RevealOutcome, StartedWager, SweepStats,
    MAX_BET, MAX_MINES, MIN_MINES, TOTAL_TILES,
};
