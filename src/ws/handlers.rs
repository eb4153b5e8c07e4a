//! WebSocket message dispatch
//!
//! Each command runs one atomic state transaction, then hands the
//! resulting snapshots to the party broadcaster. The returned message,
//! if any, goes only to the requesting connection.

use crate::error::GameError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::{AppState, PhaseAdvance};
use std::sync::Arc;

use super::ConnSession;

fn error_reply(e: GameError) -> Option<ServerMessage> {
    Some(ServerMessage::Error {
        code: e.code().to_string(),
        msg: e.to_string(),
    })
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    session: &mut ConnSession,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::CreateParty { nickname, avatar } => {
            match state.create_party(nickname, avatar, &session.conn_id).await {
                Ok((party, player)) => {
                    session.bind(player.id.clone(), party.id.clone());
                    Some(ServerMessage::PartyCreated { party, player })
                }
                Err(e) => error_reply(e),
            }
        }

        ClientMessage::JoinParty {
            code,
            nickname,
            avatar,
        } => match state
            .join_party(&code, nickname, avatar, &session.conn_id)
            .await
        {
            Ok((party, player)) => {
                session.bind(player.id.clone(), party.id.clone());
                state
                    .broadcaster
                    .publish(
                        &party.id,
                        ServerMessage::PartyState {
                            party: party.clone(),
                        },
                    )
                    .await;
                Some(ServerMessage::PartyJoined { party, player })
            }
            Err(e) => error_reply(e),
        },

        ClientMessage::ReconnectParty { code, player_id } => {
            match state
                .reconnect_party(&code, &player_id, &session.conn_id)
                .await
            {
                Ok((party, player)) => {
                    session.bind(player.id.clone(), party.id.clone());
                    state
                        .broadcaster
                        .publish(
                            &party.id,
                            ServerMessage::PartyState {
                                party: party.clone(),
                            },
                        )
                        .await;
                    Some(ServerMessage::Reconnected { party, player })
                }
                Err(e) => error_reply(e),
            }
        }

        ClientMessage::LeaveParty { player_id } => match state.leave_party(&player_id).await {
            Ok(outcome) => {
                if session.player_id.as_deref() == Some(&player_id) {
                    session.unbind();
                }
                if outcome.party_deleted {
                    state.broadcaster.remove(&outcome.party_id).await;
                } else if let Ok(party) = state.party_snapshot(&outcome.party_code).await {
                    if outcome.returned_to_lobby {
                        state
                            .broadcaster
                            .publish(
                                &outcome.party_id,
                                ServerMessage::ReturnedToLobby {
                                    party: party.clone(),
                                },
                            )
                            .await;
                    }
                    state
                        .broadcaster
                        .publish(&outcome.party_id, ServerMessage::PartyState { party })
                        .await;
                }
                Some(ServerMessage::PartyLeft { success: true })
            }
            Err(GameError::PlayerNotFound) => Some(ServerMessage::PartyLeft { success: false }),
            Err(e) => error_reply(e),
        },

        ClientMessage::KickPlayer { code, player_id } => {
            match state.kick_player(&code, &player_id, &session.conn_id).await {
                Ok(outcome) => {
                    state
                        .broadcaster
                        .publish(
                            &outcome.leave.party_id,
                            ServerMessage::PlayerKicked {
                                player_id: outcome.kicked_player_id.clone(),
                            },
                        )
                        .await;
                    if outcome.leave.party_deleted {
                        state.broadcaster.remove(&outcome.leave.party_id).await;
                    } else if let Ok(party) = state.party_snapshot(&code).await {
                        if outcome.leave.returned_to_lobby {
                            state
                                .broadcaster
                                .publish(
                                    &outcome.leave.party_id,
                                    ServerMessage::ReturnedToLobby {
                                        party: party.clone(),
                                    },
                                )
                                .await;
                        }
                        state
                            .broadcaster
                            .publish(
                                &outcome.leave.party_id,
                                ServerMessage::PartyState { party },
                            )
                            .await;
                    }
                    Some(ServerMessage::KickAck {
                        player_id: outcome.kicked_player_id,
                    })
                }
                Err(e) => error_reply(e),
            }
        }

        ClientMessage::StartRound { code, mode } => {
            match state.start_round(&code, &session.conn_id, mode).await {
                Ok(started) => {
                    let party_id = started.snapshot.id.clone();
                    match started.prompt_creator {
                        Some(prompt_creator) => {
                            state
                                .broadcaster
                                .publish(
                                    &party_id,
                                    ServerMessage::PromptCreationPhase {
                                        party: started.snapshot,
                                        prompt_creator,
                                    },
                                )
                                .await;
                        }
                        None => {
                            state
                                .broadcaster
                                .publish(
                                    &party_id,
                                    ServerMessage::RoundStarted {
                                        party: started.snapshot,
                                    },
                                )
                                .await;
                        }
                    }
                    None
                }
                Err(e) => error_reply(e),
            }
        }

        ClientMessage::SubmitCustomPrompt {
            code,
            text_true,
            text_decoy,
        } => {
            match state
                .submit_custom_prompt(&code, &session.conn_id, text_true, text_decoy)
                .await
            {
                Ok(party) => {
                    let party_id = party.id.clone();
                    state
                        .broadcaster
                        .publish(&party_id, ServerMessage::PromptCreated { party })
                        .await;
                    None
                }
                Err(e) => error_reply(e),
            }
        }

        ClientMessage::SubmitAnswer { code, text } => {
            match state.submit_answer(&code, &session.conn_id, text).await {
                Ok((party, all_answered)) => {
                    let party_id = party.id.clone();
                    state
                        .broadcaster
                        .publish(&party_id, ServerMessage::PartyState { party })
                        .await;
                    if all_answered {
                        state
                            .broadcaster
                            .publish(&party_id, ServerMessage::AllAnswered)
                            .await;
                    }
                    Some(ServerMessage::AnswerAccepted)
                }
                Err(e) => error_reply(e),
            }
        }

        ClientMessage::SubmitVote { code, choice } => {
            match state.submit_vote(&code, &session.conn_id, choice).await {
                Ok((party, all_voted)) => {
                    let party_id = party.id.clone();
                    state
                        .broadcaster
                        .publish(&party_id, ServerMessage::PartyState { party })
                        .await;
                    if all_voted {
                        state
                            .broadcaster
                            .publish(&party_id, ServerMessage::AllVoted)
                            .await;
                    }
                    Some(ServerMessage::VoteAccepted)
                }
                Err(e) => error_reply(e),
            }
        }

        ClientMessage::AdvancePhase { code, phase } => {
            match state.advance_phase(&code, &session.conn_id, phase).await {
                Ok((party, event)) => {
                    let party_id = party.id.clone();
                    if let PhaseAdvance::SequentialRevealEntered {
                        start_at,
                        response_count,
                    } = &event
                    {
                        state
                            .broadcaster
                            .publish(
                                &party_id,
                                ServerMessage::RevealSequenceStarted {
                                    start_at: start_at.to_rfc3339(),
                                    response_count: *response_count,
                                },
                            )
                            .await;
                    }
                    state
                        .broadcaster
                        .publish(&party_id, ServerMessage::PhaseChanged { party })
                        .await;
                    None
                }
                Err(e) => error_reply(e),
            }
        }

        ClientMessage::RevealNext { code } => {
            match state.reveal_next(&code, &session.conn_id).await {
                Ok((index, party)) => {
                    let party_id = party.id.clone();
                    state
                        .broadcaster
                        .publish(&party_id, ServerMessage::RevealResponseShown { index })
                        .await;
                    state
                        .broadcaster
                        .publish(&party_id, ServerMessage::PartyState { party })
                        .await;
                    None
                }
                Err(e) => error_reply(e),
            }
        }

        ClientMessage::ReturnToLobby { code } => {
            match state.return_to_lobby(&code, &session.conn_id).await {
                Ok(party) => {
                    let party_id = party.id.clone();
                    state
                        .broadcaster
                        .publish(
                            &party_id,
                            ServerMessage::ReturnedToLobby {
                                party: party.clone(),
                            },
                        )
                        .await;
                    state
                        .broadcaster
                        .publish(&party_id, ServerMessage::PartyState { party })
                        .await;
                    None
                }
                Err(e) => error_reply(e),
            }
        }

        ClientMessage::GetPartyState { code } => match state.party_snapshot(&code).await {
            Ok(party) => Some(ServerMessage::PartyState { party }),
            Err(e) => error_reply(e),
        },

        ClientMessage::GetPrompt { round_id } => {
            match state.prompt_for_player(&round_id, &session.conn_id).await {
                Ok((text, role)) => Some(ServerMessage::PromptText { text, role }),
                Err(e) => error_reply(e),
            }
        }

        ClientMessage::GetTruePrompt { round_id } => match state.true_prompt(&round_id).await {
            Ok((text_true, text_decoy)) => Some(ServerMessage::TruePrompt {
                text_true,
                text_decoy,
            }),
            Err(e) => error_reply(e),
        },
    }
}
