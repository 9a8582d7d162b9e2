// Durable wager-session store
//
// Sessions are keyed by their opaque token and survive process restarts: a
// bet is debited before its session exists, so losing the session to a crash
// would leak the debit. Backed by a sled tree with JSON values.
//
// Conditional operations are the concurrency primitive here: the interactive
// reveal/cashout paths and the expiry sweep race on the same keys, and
// compare-and-swap (or claim-by-remove) guarantees at most one of them wins
// a terminal transition.

use std::path::Path;

use sled::IVec;

use crate::error::EngineError;
use crate::models::WagerSession;

const KEY_PREFIX: &str = "mines:";

pub struct SessionStore {
    tree: sled::Tree,
}

impl SessionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let db = sled::open(path)?;
        let tree = db.open_tree("wager_sessions")?;
        Ok(Self { tree })
    }

    fn key(token: &str) -> Vec<u8> {
        format!("{}{}", KEY_PREFIX, token).into_bytes()
    }

    /// Store a fresh session. Overwrites are not expected; tokens are random.
    pub fn insert(&self, session: &WagerSession) -> Result<(), EngineError> {
        let bytes = serde_json::to_vec(session)?;
        self.tree.insert(Self::key(&session.token), bytes)?;
        self.tree.flush()?;
        Ok(())
    }

    /// Load a session along with the exact stored bytes, which act as the
    /// version witness for the conditional operations below.
    pub fn load(&self, token: &str) -> Result<Option<(IVec, WagerSession)>, EngineError> {
        match self.tree.get(Self::key(token))? {
            Some(bytes) => {
                let session = serde_json::from_slice(&bytes)?;
                Ok(Some((bytes, session)))
            }
            None => Ok(None),
        }
    }

    /// Replace the session only if it is still exactly `witness`.
    /// Returns false when a concurrent writer got there first.
    pub fn swap(
        &self,
        token: &str,
        witness: &IVec,
        next: &WagerSession,
    ) -> Result<bool, EngineError> {
        let bytes = serde_json::to_vec(next)?;
        let swapped = self
            .tree
            .compare_and_swap(Self::key(token), Some(witness), Some(bytes))?
            .is_ok();
        if swapped {
            self.tree.flush()?;
        }
        Ok(swapped)
    }

    /// Conditionally delete: succeeds only if the stored bytes still equal
    /// `witness`. The caller that wins the delete owns the terminal
    /// transition (payout, refund, or forfeiture).
    pub fn remove_if(&self, token: &str, witness: &IVec) -> Result<bool, EngineError> {
        let removed = self
            .tree
            .compare_and_swap(Self::key(token), Some(witness), None::<Vec<u8>>)?
            .is_ok();
        if removed {
            self.tree.flush()?;
        }
        Ok(removed)
    }

    /// Unconditionally claim a session. Atomic: of any number of concurrent
    /// claimants, exactly one receives the session.
    pub fn take(&self, token: &str) -> Result<Option<WagerSession>, EngineError> {
        match self.tree.remove(Self::key(token))? {
            Some(bytes) => {
                self.tree.flush()?;
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            None => Ok(None),
        }
    }

    /// Enumerate every stored session for the expiry sweep.
    pub fn scan(&self) -> Result<Vec<(IVec, WagerSession)>, EngineError> {
        let mut sessions = Vec::new();
        for entry in self.tree.scan_prefix(KEY_PREFIX.as_bytes()) {
            let (_, bytes) = entry?;
            let session: WagerSession = serde_json::from_slice(&bytes)?;
            sessions.push((bytes, session));
        }
        Ok(sessions)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WagerStatus;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn temp_store() -> SessionStore {
        let path = std::env::temp_dir().join(format!("moonbag-store-{}", uuid::Uuid::new_v4()));
        SessionStore::open(path).unwrap()
    }

    fn session(token: &str) -> WagerSession {
        let now = Utc::now();
        WagerSession {
            token: token.to_string(),
            account_id: 1,
            bet: dec!(100),
            mine_count: 5,
            mine_positions: vec![0, 1, 2, 3, 4],
            revealed: Vec::new(),
            multiplier: 1.0,
            status: WagerStatus::Active,
            started_at: now,
            last_activity: now,
        }
    }

    #[test]
    fn round_trips_a_session() {
        let store = temp_store();
        store.insert(&session("abc123")).unwrap();

        let (_, loaded) = store.load("abc123").unwrap().unwrap();
        assert_eq!(loaded.token, "abc123");
        assert_eq!(loaded.bet, dec!(100));
        assert!(store.load("missing").unwrap().is_none());
    }

    #[test]
    fn swap_fails_on_stale_witness() {
        let store = temp_store();
        store.insert(&session("abc123")).unwrap();
        let (witness, mut loaded) = store.load("abc123").unwrap().unwrap();

        loaded.revealed.push(7);
        assert!(store.swap("abc123", &witness, &loaded).unwrap());

        // the old witness no longer matches
        loaded.revealed.push(8);
        assert!(!store.swap("abc123", &witness, &loaded).unwrap());
    }

    #[test]
    fn only_one_claimant_wins_a_conditional_delete() {
        let store = temp_store();
        store.insert(&session("abc123")).unwrap();
        let (witness, _) = store.load("abc123").unwrap().unwrap();

        assert!(store.remove_if("abc123", &witness).unwrap());
        assert!(!store.remove_if("abc123", &witness).unwrap());
        assert!(store.take("abc123").unwrap().is_none());
    }

    #[test]
    fn take_claims_exactly_once() {
        let store = temp_store();
        store.insert(&session("abc123")).unwrap();

        assert!(store.take("abc123").unwrap().is_some());
        assert!(store.take("abc123").unwrap().is_none());
    }

    #[test]
    fn scan_returns_all_sessions() {
        let store = temp_store();
        store.insert(&session("aaa")).unwrap();
        store.insert(&session("bbb")).unwrap();

        let sessions = store.scan().unwrap();
        assert_eq!(sessions.len(), 2);
    }
}
