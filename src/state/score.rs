use super::Store;
use crate::error::GameError;
use crate::types::*;
use chrono::Utc;
use std::collections::HashMap;

/// Result of counting a round's votes.
pub(crate) struct Tally {
    pub win_type: WinType,
    pub liar_caught: bool,
    pub scores_delta: HashMap<PlayerId, u32>,
}

/// Counts votes and applies the scoring table.
///
/// The winning option needs a strict majority of the eligible voters
/// (floor(n/2) + 1). On a tie at the top, the option that first
/// appeared in vote-arrival order takes the winner slot.
pub(crate) fn tally_votes(
    votes: &[Vote],
    liar_id: Option<&PlayerId>,
    truth_tellers: &[PlayerId],
    eligible_count: usize,
) -> Tally {
    let threshold = eligible_count / 2 + 1;

    // Option counts, remembering first-appearance order for tie-breaks.
    let mut order: Vec<VoteChoice> = Vec::new();
    let mut counts: HashMap<VoteChoice, usize> = HashMap::new();
    for vote in votes {
        let entry = counts.entry(vote.choice.clone()).or_insert(0);
        if *entry == 0 {
            order.push(vote.choice.clone());
        }
        *entry += 1;
    }

    let max_votes = counts.values().copied().max().unwrap_or(0);
    let winner = if max_votes >= threshold {
        order
            .iter()
            .find(|choice| counts.get(*choice).copied() == Some(max_votes))
    } else {
        None
    };

    let mut scores_delta: HashMap<PlayerId, u32> = HashMap::new();

    match liar_id {
        Some(liar) => {
            let accuse_liar = VoteChoice::Accuse(liar.clone());
            let liar_votes = counts.get(&accuse_liar).copied().unwrap_or(0);
            let liar_caught = winner == Some(&accuse_liar);

            let win_type = if liar_votes == 0 {
                // Nobody even suspected the liar.
                scores_delta.insert(liar.clone(), 3);
                WinType::PerfectLie
            } else if liar_caught {
                for player in truth_tellers {
                    scores_delta.insert(player.clone(), 1);
                }
                WinType::GroupWin
            } else {
                scores_delta.insert(liar.clone(), 2);
                WinType::LiarEscaped
            };

            Tally {
                win_type,
                liar_caught,
                scores_delta,
            }
        }
        None => {
            let win_type = if winner == Some(&VoteChoice::NoLiar) {
                for vote in votes {
                    if vote.choice == VoteChoice::NoLiar {
                        scores_delta.insert(vote.voter_id.clone(), 1);
                    }
                }
                WinType::GroupWin
            } else {
                WinType::MissedNoLiar
            };

            Tally {
                win_type,
                liar_caught: false,
                scores_delta,
            }
        }
    }
}

impl Store {
    /// Tallies the round, applies score deltas, and writes the immutable
    /// summary. Calling this again for an already-summarized round is a
    /// no-op, so results cannot be computed twice.
    pub(crate) fn finish_round(&mut self, round_id: &str) -> Result<(), GameError> {
        if self.summaries.contains_key(round_id) {
            return Ok(());
        }

        let (party_id, liar_id, creator_id) = {
            let round = self.rounds.get(round_id).ok_or(GameError::RoundNotFound)?;
            (
                round.party_id.clone(),
                round.liar_id.clone(),
                round.prompt_creator_id.clone(),
            )
        };

        let active = self.active_player_ids(&party_id);
        let eligible_count = active
            .iter()
            .filter(|id| Some(*id) != creator_id.as_ref())
            .count();

        let truth_tellers: Vec<PlayerId> = self
            .assignments
            .get(round_id)
            .map(|rows| {
                rows.iter()
                    .filter(|a| {
                        a.role == PlayerRole::Truth && Some(&a.player_id) != creator_id.as_ref()
                    })
                    .map(|a| a.player_id.clone())
                    .collect()
            })
            .unwrap_or_default();

        let empty = Vec::new();
        let votes = self.votes.get(round_id).unwrap_or(&empty);
        let tally = tally_votes(votes, liar_id.as_ref(), &truth_tellers, eligible_count);

        for (player_id, delta) in &tally.scores_delta {
            if let Some(player) = self.players.get_mut(player_id) {
                player.score += delta;
            }
        }

        // The summary lists every active player, answered or not.
        let responses = self.responses.get(round_id).cloned().unwrap_or_default();
        let answers: Vec<SummaryAnswer> = active
            .iter()
            .map(|player_id| SummaryAnswer {
                player_id: player_id.clone(),
                text: responses
                    .iter()
                    .find(|r| &r.player_id == player_id)
                    .map(|r| r.text.clone())
                    .unwrap_or_default(),
                is_liar: liar_id.as_ref() == Some(player_id),
            })
            .collect();

        tracing::info!(
            %round_id,
            win_type = ?tally.win_type,
            liar_caught = tally.liar_caught,
            "round finished"
        );

        self.summaries.insert(
            round_id.to_string(),
            RoundSummary {
                round_id: round_id.to_string(),
                liar_caught: tally.liar_caught,
                win_type: tally.win_type,
                scores_delta: tally.scores_delta,
                answers,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }
}
