use super::{AppState, Store};
use crate::error::GameError;
use crate::protocol::{PartySnapshot, PlayerInfo};
use crate::types::*;
use chrono::Utc;
use rand::Rng;

/// Party codes: 4 characters from A-Z and 0-9.
const CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LENGTH: usize = 4;
const MAX_CODE_ATTEMPTS: usize = 10;

pub const AVATARS: &[&str] = &[
    "cat",
    "dog",
    "bunny",
    "fox",
    "bear",
    "panda",
    "owl",
    "penguin",
    "frog",
    "monkey",
    "lion",
    "tiger",
    "elephant",
    "koala",
    "panda-red",
    "sloth",
    "raccoon",
    "deer",
    "hamster",
    "hedgehog",
    "hippo",
    "fish",
    "dolphin",
    "duck",
    "flamingo",
    "beaver",
    "squirrel",
    "zebra",
    "whale",
    "goat",
];

fn generate_party_code(store: &Store) -> Result<String, GameError> {
    let mut rng = rand::rng();
    for _ in 0..MAX_CODE_ATTEMPTS {
        let code: String = (0..CODE_LENGTH)
            .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
            .collect();
        if !store.codes.contains_key(&code) {
            return Ok(code);
        }
    }
    Err(GameError::CodeGenerationFailed)
}

fn pick_avatar(requested: &str) -> String {
    if requested.is_empty() {
        let mut rng = rand::rng();
        AVATARS[rng.random_range(0..AVATARS.len())].to_string()
    } else {
        requested.to_string()
    }
}

/// Result of a leave cascade.
#[derive(Debug)]
pub struct LeaveOutcome {
    pub party_id: PartyId,
    pub party_code: String,
    pub party_deleted: bool,
    pub returned_to_lobby: bool,
}

/// Result of a kick cascade.
#[derive(Debug)]
pub struct KickOutcome {
    pub kicked_player_id: PlayerId,
    pub leave: LeaveOutcome,
}

impl AppState {
    /// Creates a party with the caller as its active host.
    pub async fn create_party(
        &self,
        nickname: String,
        avatar: String,
        conn_id: &str,
    ) -> Result<(PartySnapshot, PlayerInfo), GameError> {
        let mut store = self.store.write().await;

        if let Some(existing) = store.player_by_conn(conn_id) {
            let code = store
                .parties
                .get(&existing.party_id)
                .map(|p| p.code.clone())
                .unwrap_or_default();
            return Err(GameError::AlreadyConnected(code));
        }

        let code = generate_party_code(&store)?;
        let party_id: PartyId = ulid::Ulid::new().to_string();
        let player_id: PlayerId = ulid::Ulid::new().to_string();
        let now = Utc::now();

        let player = Player {
            id: player_id.clone(),
            party_id: party_id.clone(),
            nickname,
            avatar: pick_avatar(&avatar),
            is_host: true,
            is_active: true,
            score: 0,
            conn_id: Some(conn_id.to_string()),
            joined_at: now,
        };

        let party = Party {
            id: party_id.clone(),
            code: code.clone(),
            status: PartyStatus::Lobby,
            mode: GameMode::Classic,
            host_id: Some(player_id.clone()),
            current_round_id: None,
            used_prompt_ids: Vec::new(),
            created_at: now,
        };

        tracing::info!(%code, party_id = %party_id, "party created");

        store.codes.insert(code, party_id.clone());
        store.parties.insert(party_id.clone(), party);
        let info = PlayerInfo::from(&player);
        store.players.insert(player_id, player);

        Ok((store.snapshot(&party_id)?, info))
    }

    /// Joins a lobby party. A stale inactive player with the same
    /// nickname is purged before the join proceeds; an active one blocks
    /// the nickname. The purge deletes only the record (lobby parties
    /// carry no rounds), never the party itself, so a solo party whose
    /// host went inactive survives the rejoin.
    pub async fn join_party(
        &self,
        code: &str,
        nickname: String,
        avatar: String,
        conn_id: &str,
    ) -> Result<(PartySnapshot, PlayerInfo), GameError> {
        let mut store = self.store.write().await;
        let party_id = store
            .party_id_by_code(code)
            .ok_or(GameError::PartyNotFound)?;

        {
            let party = store.parties.get(&party_id).ok_or(GameError::PartyNotFound)?;
            if party.status != PartyStatus::Lobby {
                return Err(GameError::GameInProgress);
            }
        }

        if let Some(existing) = store.player_by_conn(conn_id) {
            if existing.party_id == party_id {
                return Err(GameError::AlreadyConnected(code.to_string()));
            }
        }

        let stale_id = {
            let same_name: Vec<&Player> = store
                .members_ordered(&party_id)
                .into_iter()
                .filter(|p| p.nickname == nickname)
                .collect();
            if same_name.iter().any(|p| p.is_active) {
                return Err(GameError::NicknameTaken);
            }
            same_name.first().map(|p| p.id.clone())
        };
        let mut purged_host = false;
        if let Some(stale_id) = stale_id {
            tracing::debug!(player_id = %stale_id, "purging stale player before rejoin");
            purged_host = store
                .players
                .remove(&stale_id)
                .map(|p| p.is_host)
                .unwrap_or(false);
            if purged_host {
                store.promote_host(&party_id);
            }
        }

        let player_id: PlayerId = ulid::Ulid::new().to_string();
        let player = Player {
            id: player_id.clone(),
            party_id: party_id.clone(),
            nickname,
            avatar: pick_avatar(&avatar),
            is_host: false,
            is_active: true,
            score: 0,
            conn_id: Some(conn_id.to_string()),
            joined_at: Utc::now(),
        };
        store.players.insert(player_id.clone(), player);

        // The purge may have left the party hostless (solo inactive
        // host); the new member inherits the flag in that case.
        if purged_host {
            store.ensure_single_host(&party_id);
        }
        let info = store
            .players
            .get(&player_id)
            .map(PlayerInfo::from)
            .ok_or(GameError::PlayerNotFound)?;

        Ok((store.snapshot(&party_id)?, info))
    }

    /// Rebinds an existing player record to a new connection. Fails with
    /// `PlayerRemoved` if the record no longer exists (left or kicked).
    pub async fn reconnect_party(
        &self,
        code: &str,
        player_id: &str,
        conn_id: &str,
    ) -> Result<(PartySnapshot, PlayerInfo), GameError> {
        let mut store = self.store.write().await;
        let party_id = store
            .party_id_by_code(code)
            .ok_or(GameError::PartyNotFound)?;

        let player = store
            .players
            .get_mut(player_id)
            .ok_or(GameError::PlayerRemoved)?;
        if player.party_id != party_id {
            return Err(GameError::PlayerRemoved);
        }

        player.is_active = true;
        player.conn_id = Some(conn_id.to_string());
        let info = PlayerInfo::from(&*player);

        tracing::info!(%code, %player_id, "player reconnected");
        Ok((store.snapshot(&party_id)?, info))
    }

    /// Marks the player on this connection inactive. Host status is kept
    /// so a returning host resumes control. Returns the party code for
    /// the follow-up broadcast.
    pub async fn handle_disconnect(&self, conn_id: &str) -> Option<String> {
        let mut store = self.store.write().await;
        let player_id = store.player_by_conn(conn_id).map(|p| p.id.clone())?;

        let player = store.players.get_mut(&player_id)?;
        player.is_active = false;
        player.conn_id = None;
        let party_id = player.party_id.clone();

        tracing::info!(%player_id, "player disconnected");
        store.parties.get(&party_id).map(|p| p.code.clone())
    }

    /// Removes a player for good: their liar rounds, their rows in other
    /// rounds, the record itself, host succession, and the party-level
    /// follow-ups (auto return-to-lobby, empty-party deletion) all run
    /// under one lock.
    pub async fn leave_party(&self, player_id: &str) -> Result<LeaveOutcome, GameError> {
        let mut store = self.store.write().await;
        if !store.players.contains_key(player_id) {
            return Err(GameError::PlayerNotFound);
        }
        Ok(store.remove_player_cascade(player_id))
    }

    /// Host-only removal of another player. Same cascade as a leave.
    pub async fn kick_player(
        &self,
        code: &str,
        target_id: &str,
        conn_id: &str,
    ) -> Result<KickOutcome, GameError> {
        let mut store = self.store.write().await;
        let party_id = store
            .party_id_by_code(code)
            .ok_or(GameError::PartyNotFound)?;
        store.require_active_host(&party_id, conn_id)?;

        match store.players.get(target_id) {
            Some(target) if target.party_id == party_id => {}
            _ => return Err(GameError::PlayerNotFound),
        }

        tracing::info!(%code, %target_id, "player kicked");
        let leave = store.remove_player_cascade(target_id);
        Ok(KickOutcome {
            kicked_player_id: target_id.to_string(),
            leave,
        })
    }
}

impl Store {
    /// The shared removal cascade behind both leave and kick.
    pub(crate) fn remove_player_cascade(&mut self, player_id: &str) -> LeaveOutcome {
        let (party_id, was_host) = match self.players.get(player_id) {
            Some(p) => (p.party_id.clone(), p.is_host),
            None => {
                return LeaveOutcome {
                    party_id: String::new(),
                    party_code: String::new(),
                    party_deleted: false,
                    returned_to_lobby: false,
                }
            }
        };
        let party_code = self
            .parties
            .get(&party_id)
            .map(|p| p.code.clone())
            .unwrap_or_default();

        // Rounds where the player was the liar are unsalvageable.
        let liar_rounds: Vec<RoundId> = self
            .rounds
            .values()
            .filter(|r| r.liar_id.as_deref() == Some(player_id))
            .map(|r| r.id.clone())
            .collect();
        for round_id in liar_rounds {
            tracing::debug!(%round_id, "deleting round whose liar left");
            self.delete_round_cascade(&round_id);
        }

        // Their rows in surviving rounds.
        for responses in self.responses.values_mut() {
            responses.retain(|r| r.player_id != player_id);
        }
        for votes in self.votes.values_mut() {
            votes.retain(|v| {
                v.voter_id != player_id
                    && !matches!(&v.choice, VoteChoice::Accuse(id) if id == player_id)
            });
        }
        for assignments in self.assignments.values_mut() {
            assignments.retain(|a| a.player_id != player_id);
        }

        self.players.remove(player_id);

        if was_host {
            self.promote_host(&party_id);
        }

        // Party-level follow-ups.
        let remaining = self.members_ordered(&party_id).len();
        if remaining == 0 {
            tracing::info!(party_id = %party_id, "deleting empty party");
            self.delete_party_rounds(&party_id);
            if let Some(party) = self.parties.remove(&party_id) {
                self.codes.remove(&party.code);
            }
            return LeaveOutcome {
                party_id,
                party_code,
                party_deleted: true,
                returned_to_lobby: false,
            };
        }

        let mut returned_to_lobby = false;
        let playing = self
            .parties
            .get(&party_id)
            .map(|p| p.status == PartyStatus::Playing)
            .unwrap_or(false);
        if playing && self.active_player_ids(&party_id).len() <= 1 {
            tracing::info!(party_id = %party_id, "too few active players, returning to lobby");
            self.delete_party_rounds(&party_id);
            if let Some(party) = self.parties.get_mut(&party_id) {
                party.status = PartyStatus::Lobby;
            }
            returned_to_lobby = true;
        }

        LeaveOutcome {
            party_id,
            party_code,
            party_deleted: false,
            returned_to_lobby,
        }
    }

    /// Hands the host flag to the earliest-joined active player.
    fn promote_host(&mut self, party_id: &str) {
        let members: Vec<PlayerId> = self
            .members_ordered(party_id)
            .into_iter()
            .filter(|p| p.is_host)
            .map(|p| p.id.clone())
            .collect();
        for id in members {
            if let Some(p) = self.players.get_mut(&id) {
                p.is_host = false;
            }
        }

        let successor = self.active_player_ids(party_id).first().cloned();
        if let Some(ref id) = successor {
            if let Some(p) = self.players.get_mut(id) {
                p.is_host = true;
            }
            tracing::info!(party_id = %party_id, new_host = %id, "host promoted");
        }
        if let Some(party) = self.parties.get_mut(party_id) {
            party.host_id = successor;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn party_with_players(
        state: &AppState,
        nicks: &[&str],
    ) -> (String, Vec<PlayerInfo>) {
        let (_, host) = state
            .create_party(nicks[0].to_string(), String::new(), "conn-0")
            .await
            .unwrap();
        let code = {
            let store = state.store.read().await;
            store.parties.values().next().unwrap().code.clone()
        };
        let mut players = vec![host];
        for (i, nick) in nicks.iter().enumerate().skip(1) {
            let (_, p) = state
                .join_party(&code, nick.to_string(), String::new(), &format!("conn-{i}"))
                .await
                .unwrap();
            players.push(p);
        }
        (code, players)
    }

    #[tokio::test]
    async fn create_party_assigns_code_and_host() {
        let state = AppState::new();
        let (snapshot, host) = state
            .create_party("Ana".to_string(), String::new(), "conn-0")
            .await
            .unwrap();

        assert_eq!(snapshot.code.len(), 4);
        assert!(snapshot
            .code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        assert!(host.is_host);
        assert!(!host.avatar.is_empty());
        assert_eq!(snapshot.host_id, Some(host.id));
    }

    #[tokio::test]
    async fn same_connection_cannot_create_twice() {
        let state = AppState::new();
        state
            .create_party("Ana".to_string(), String::new(), "conn-0")
            .await
            .unwrap();
        let result = state
            .create_party("Ana2".to_string(), String::new(), "conn-0")
            .await;
        assert!(matches!(result, Err(GameError::AlreadyConnected(_))));
    }

    #[tokio::test]
    async fn active_nickname_blocks_join() {
        let state = AppState::new();
        let (code, _) = party_with_players(&state, &["Ana", "Ben"]).await;

        let result = state
            .join_party(&code, "Ben".to_string(), String::new(), "conn-x")
            .await;
        assert!(matches!(result, Err(GameError::NicknameTaken)));
    }

    #[tokio::test]
    async fn stale_nickname_is_purged_on_rejoin() {
        let state = AppState::new();
        let (code, players) = party_with_players(&state, &["Ana", "Ben"]).await;

        // Ben drops, then rejoins under the same name.
        state.handle_disconnect("conn-1").await.unwrap();
        let (snapshot, new_ben) = state
            .join_party(&code, "Ben".to_string(), String::new(), "conn-9")
            .await
            .unwrap();

        assert_ne!(new_ben.id, players[1].id);
        let bens: Vec<_> = snapshot
            .players
            .iter()
            .filter(|p| p.nickname == "Ben")
            .collect();
        assert_eq!(bens.len(), 1);
        assert!(bens[0].is_active);
    }

    #[tokio::test]
    async fn rejoining_a_solo_party_keeps_the_party_alive() {
        let state = AppState::new();
        let (snapshot, old_host) = state
            .create_party("Ana".to_string(), String::new(), "conn-a")
            .await
            .unwrap();
        let code = snapshot.code;

        // The lone host drops, then a new connection joins under the
        // same nickname.
        state.handle_disconnect("conn-a").await.unwrap();
        let (snapshot, new_ana) = state
            .join_party(&code, "Ana".to_string(), String::new(), "conn-b")
            .await
            .unwrap();

        assert_ne!(new_ana.id, old_host.id);
        assert!(new_ana.is_host);
        assert_eq!(snapshot.host_id, Some(new_ana.id.clone()));
        assert_eq!(snapshot.players.len(), 1);

        // The party and its code reservation survived the purge, and
        // the joining connection is bound to the fresh record.
        let store = state.store.read().await;
        assert_eq!(store.parties.len(), 1);
        assert!(store.codes.contains_key(&code));
        assert!(store.players.get(&old_host.id).is_none());
        let bound = store.player_by_conn("conn-b").unwrap();
        assert_eq!(bound.id, new_ana.id);
    }

    #[tokio::test]
    async fn join_rejected_while_playing() {
        let state = AppState::new();
        let (code, _) = party_with_players(&state, &["Ana", "Ben"]).await;
        state
            .start_round(&code, "conn-0", GameMode::Classic)
            .await
            .unwrap();

        let result = state
            .join_party(&code, "Cy".to_string(), String::new(), "conn-x")
            .await;
        assert!(matches!(result, Err(GameError::GameInProgress)));
    }

    #[tokio::test]
    async fn reconnect_restores_active_flag() {
        let state = AppState::new();
        let (code, players) = party_with_players(&state, &["Ana", "Ben"]).await;

        state.handle_disconnect("conn-1").await.unwrap();
        let (snapshot, ben) = state
            .reconnect_party(&code, &players[1].id, "conn-9")
            .await
            .unwrap();

        assert!(ben.is_active);
        assert_eq!(ben.id, players[1].id);
        assert!(snapshot.players.iter().all(|p| p.is_active));
    }

    #[tokio::test]
    async fn reconnect_after_kick_reports_removed() {
        let state = AppState::new();
        let (code, players) = party_with_players(&state, &["Ana", "Ben", "Cy"]).await;

        state
            .kick_player(&code, &players[1].id, "conn-0")
            .await
            .unwrap();
        let result = state.reconnect_party(&code, &players[1].id, "conn-9").await;
        assert!(matches!(result, Err(GameError::PlayerRemoved)));
    }

    #[tokio::test]
    async fn kick_requires_host() {
        let state = AppState::new();
        let (code, players) = party_with_players(&state, &["Ana", "Ben", "Cy"]).await;

        let result = state.kick_player(&code, &players[2].id, "conn-1").await;
        assert!(matches!(result, Err(GameError::NotHost)));
    }

    #[tokio::test]
    async fn disconnected_host_keeps_host_status() {
        let state = AppState::new();
        let (code, players) = party_with_players(&state, &["Ana", "Ben"]).await;

        state.handle_disconnect("conn-0").await.unwrap();
        let snapshot = state.party_snapshot(&code).await.unwrap();
        let ana = snapshot
            .players
            .iter()
            .find(|p| p.id == players[0].id)
            .unwrap();
        assert!(ana.is_host);
        assert!(!ana.is_active);
        assert_eq!(snapshot.host_id, Some(players[0].id.clone()));
    }

    #[tokio::test]
    async fn host_leaving_promotes_earliest_joined_active_player() {
        let state = AppState::new();
        let (code, players) = party_with_players(&state, &["Ana", "Ben", "Cy"]).await;

        state.leave_party(&players[0].id).await.unwrap();
        let snapshot = state.party_snapshot(&code).await.unwrap();

        assert_eq!(snapshot.host_id, Some(players[1].id.clone()));
        let ben = snapshot
            .players
            .iter()
            .find(|p| p.id == players[1].id)
            .unwrap();
        assert!(ben.is_host);
        assert_eq!(snapshot.players.iter().filter(|p| p.is_host).count(), 1);
    }

    #[tokio::test]
    async fn exactly_one_host_through_churn() {
        let state = AppState::new();
        let (code, players) = party_with_players(&state, &["Ana", "Ben", "Cy", "Di"]).await;

        state.handle_disconnect("conn-1").await.unwrap();
        state.leave_party(&players[0].id).await.unwrap();
        state
            .kick_player(&code, &players[3].id, "conn-2")
            .await
            .unwrap();

        let snapshot = state.party_snapshot(&code).await.unwrap();
        assert_eq!(snapshot.players.iter().filter(|p| p.is_host).count(), 1);
        // Ben disconnected but still precedes Cy in join order; the
        // promotion skips inactive players, so Cy holds the flag.
        assert_eq!(snapshot.host_id, Some(players[2].id.clone()));
    }

    #[tokio::test]
    async fn liar_leaving_deletes_the_round() {
        let state = AppState::new();
        let (code, _) = party_with_players(&state, &["Ana", "Ben", "Cy", "Di"]).await;
        state
            .start_round(&code, "conn-0", GameMode::Classic)
            .await
            .unwrap();

        let liar_id = {
            let mut store = state.store.write().await;
            let party_id = store.party_id_by_code(&code).unwrap();
            let round_id = store
                .parties
                .get(&party_id)
                .unwrap()
                .current_round_id
                .clone()
                .unwrap();
            // Force a liar so the test is deterministic.
            let first = store.active_player_ids(&party_id)[1].clone();
            store.rounds.get_mut(&round_id).unwrap().liar_id = Some(first.clone());
            first
        };

        state.leave_party(&liar_id).await.unwrap();

        let store = state.store.read().await;
        let party_id = store.party_id_by_code(&code).unwrap();
        assert!(store.rounds.values().all(|r| r.party_id != party_id));
        assert!(store.assignments.is_empty());
        assert!(store.responses.is_empty());
        assert!(store.votes.is_empty());
        assert!(store
            .parties
            .get(&party_id)
            .unwrap()
            .current_round_id
            .is_none());
    }

    #[tokio::test]
    async fn leave_below_two_active_returns_party_to_lobby() {
        let state = AppState::new();
        let (code, players) = party_with_players(&state, &["Ana", "Ben"]).await;
        state
            .start_round(&code, "conn-0", GameMode::Classic)
            .await
            .unwrap();

        let outcome = state.leave_party(&players[1].id).await.unwrap();
        assert!(outcome.returned_to_lobby);

        let snapshot = state.party_snapshot(&code).await.unwrap();
        assert_eq!(snapshot.status, PartyStatus::Lobby);
        assert!(snapshot.current_round.is_none());
    }

    #[tokio::test]
    async fn last_player_leaving_deletes_the_party() {
        let state = AppState::new();
        let (code, players) = party_with_players(&state, &["Ana"]).await;

        let outcome = state.leave_party(&players[0].id).await.unwrap();
        assert!(outcome.party_deleted);

        let store = state.store.read().await;
        assert!(store.parties.is_empty());
        assert!(store.codes.get(&code).is_none());
        assert!(store.players.is_empty());
    }
}
