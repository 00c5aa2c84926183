//! The turn state machine.
//!
//! One turn: acquire the per-player lock, apply any pending punishment,
//! validate the action, stream the completion, resolve an embedded
//! judgment, apply state deltas, dispatch abuse analysis out-of-band,
//! persist, and emit the terminal snapshot. The session is mutated only
//! here, only under the lock.

use std::sync::{Arc, Mutex as StdMutex};

use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use tenfold_core::chat::ChatMessage;
use tenfold_core::clock::Clock;
use tenfold_core::error::GameError;
use tenfold_core::player::PlayerId;
use tenfold_core::rng::RandomSource;
use tenfold_core::verdict::{AbuseLevel, Verdict};
use tenfold_gateway::{CompletionGateway, GatewayError, PromptContext};
use tenfold_judgment::JudgmentRoll;
use tenfold_sentinel::AbuseAnalyzer;
use tenfold_session::{
    DAILY_OPPORTUNITIES, GameSession, SessionStore, SessionSummary, StoreError,
};

use crate::bus::FrameBus;
use crate::config::{
    ASCENSION_MESSAGE, BLOCK_NOTICE, EngineConfig, RESTRICT_NOTICE, WARNING_NOTICE,
    is_start_trial,
};
use crate::frames::{StateSnapshot, TurnFrame};
use crate::locks::{SessionGuard, SessionLocks};
use crate::response::{self, TurnResponse};

/// Orchestrates turns for every player, one at a time per session.
pub struct TurnOrchestrator {
    store: Arc<dyn SessionStore>,
    gateway: Arc<CompletionGateway>,
    analyzer: Arc<dyn AbuseAnalyzer>,
    locks: Arc<SessionLocks>,
    bus: Arc<FrameBus>,
    clock: Arc<dyn Clock>,
    rng: Arc<StdMutex<dyn RandomSource>>,
    config: EngineConfig,
}

impl TurnOrchestrator {
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        gateway: Arc<CompletionGateway>,
        analyzer: Arc<dyn AbuseAnalyzer>,
        clock: Arc<dyn Clock>,
        rng: Arc<StdMutex<dyn RandomSource>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            analyzer,
            locks: Arc::new(SessionLocks::new()),
            bus: Arc::new(FrameBus::new()),
            clock,
            rng,
            config,
        }
    }

    /// Subscribes a connection to the player's outbound frames.
    #[must_use]
    pub fn subscribe(&self, player_id: &PlayerId) -> broadcast::Receiver<TurnFrame> {
        self.bus.subscribe(player_id)
    }

    /// Loads the player's current daily session, creating it on first
    /// contact and rolling it over on a new calendar day. A stale
    /// `is_processing` flag left by a crash is cleared here.
    ///
    /// # Errors
    ///
    /// Returns `GameError::StorageFailure` when the store fails.
    pub async fn ensure_session(&self, player_id: &PlayerId) -> Result<GameSession, GameError> {
        if let Some(session) = self.store.load(player_id).await.map_err(storage)? {
            let stale = session.is_processing && !self.locks.is_locked(player_id);
            if session.session_date == self.clock.today() && !stale {
                return Ok(session);
            }
        }
        let guard = self.locks.acquire(player_id).await;
        self.ensure_session_locked(player_id, &guard).await
    }

    /// Runs one full turn. Every frame, terminal errors included, goes
    /// out on the player's channel; the returned `Result` reports the
    /// same outcome to the caller for logging. A turn that could not
    /// start produces a single `error` frame; a turn that failed after
    /// streaming began closes the sequence with `stream_end` first.
    ///
    /// # Errors
    ///
    /// `SessionBusy` when a turn is already in flight, `InvalidAction`
    /// when the action does not fit the session state,
    /// `ProviderExhausted` or `StorageFailure` when the turn aborted.
    #[instrument(
        skip(self, action),
        fields(player_id = %player_id, turn_id = %Uuid::new_v4())
    )]
    pub async fn run_turn(&self, player_id: &PlayerId, action: &str) -> Result<(), GameError> {
        let Some(guard) = self.locks.try_acquire(player_id) else {
            warn!("turn rejected, session busy");
            return self.reject(player_id, GameError::SessionBusy);
        };
        self.execute_turn(player_id, action, &guard).await
    }

    async fn execute_turn(
        &self,
        player_id: &PlayerId,
        action: &str,
        guard: &SessionGuard,
    ) -> Result<(), GameError> {
        let mut session = match self.ensure_session_locked(player_id, guard).await {
            Ok(session) => session,
            Err(err) => return self.reject(player_id, err),
        };

        if self.apply_pending_punishment(&mut session) {
            if let Err(err) = self.persist(&mut session).await {
                return self.reject(player_id, err);
            }
        }

        let action = action.trim();
        let starting = is_start_trial(action);
        if let Err(err) = validate_action(&session, action, starting) {
            return self.reject(player_id, err);
        }

        session.is_processing = true;
        if let Err(err) = self.persist(&mut session).await {
            return self.reject(player_id, err);
        }

        self.bus.publish(player_id, TurnFrame::StreamStart);
        let full_text = match self.stream_stage(&session, action, starting).await {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "completion failed, aborting turn");
                return self.abort_started_turn(player_id, &mut session).await;
            }
        };

        let mut stage_one = response::parse_response(&full_text).unwrap_or_else(|| {
            warn!("response carried no parsable payload, treating it as plain narrative");
            TurnResponse {
                narrative: full_text.clone(),
                ..TurnResponse::default()
            }
        });

        let was_in_trial = session.is_in_trial;
        session.history.push(ChatMessage::user(action));
        session.display_history.push(format!("> {action}"));

        let state_update = if let Some(request) = stage_one.roll_request.take() {
            let roll = {
                let mut rng = self.rng.lock().expect("rng poisoned");
                tenfold_judgment::resolve(&request, self.config.judgment, &mut *rng)
            };
            info!(
                kind = %roll.kind,
                target = roll.target,
                result = roll.result,
                outcome = %roll.outcome,
                "judgment resolved"
            );
            self.bus.publish(player_id, TurnFrame::RollEvent(roll.clone()));

            if !stage_one.narrative.is_empty() {
                session.display_history.push(stage_one.narrative);
            }
            session.history.push(ChatMessage::assistant(full_text));
            session.display_history.push(roll.result_text());
            session.history.push(ChatMessage::system(roll.result_text()));

            match self.continuation_stage(&session, &roll).await {
                Ok(continuation_text) => {
                    let continuation = response::parse_response(&continuation_text)
                        .unwrap_or_else(|| {
                            warn!("continuation carried no parsable payload");
                            TurnResponse {
                                narrative: continuation_text.clone(),
                                ..TurnResponse::default()
                            }
                        });
                    if !continuation.narrative.is_empty() {
                        session.display_history.push(continuation.narrative);
                    }
                    session.history.push(ChatMessage::assistant(continuation_text));
                    continuation.state_update
                }
                Err(err) => {
                    warn!(error = %err, "judgment continuation failed, aborting turn");
                    return self.abort_started_turn(player_id, &mut session).await;
                }
            }
        } else {
            if !stage_one.narrative.is_empty() {
                session.display_history.push(stage_one.narrative);
            }
            session.history.push(ChatMessage::assistant(full_text));
            stage_one.state_update
        };

        response::apply_state_update(&mut session, &state_update);

        if response::trigger_name(&state_update) == Some("ascension") {
            session.daily_success_achieved = true;
            session.is_in_trial = false;
            session.display_history.push(ASCENSION_MESSAGE.to_owned());
            info!("player withdrew from the dream, day complete");
        }

        // The engine, not the model, is authoritative for trial
        // bookkeeping: a start turn enters the trial unless the model
        // explicitly ended it, and a resolved trial consumes exactly one
        // opportunity.
        if starting && !state_update.contains_key("is_in_trial") {
            session.is_in_trial = true;
        }
        if (was_in_trial || starting) && !session.is_in_trial {
            session.opportunities_remaining = (session.opportunities_remaining - 1).max(0);
            info!(
                remaining = session.opportunities_remaining,
                "trial resolved, opportunity consumed"
            );
        }
        session.unchecked_turns += 1;

        self.dispatch_analysis(&mut session, action);

        session.is_processing = false;
        if let Err(err) = self.persist(&mut session).await {
            return self.fail_started_turn(player_id, err);
        }

        self.bus.publish(player_id, TurnFrame::StreamEnd);
        self.bus
            .publish(player_id, TurnFrame::FullState(StateSnapshot::from(&session)));
        info!("turn complete");
        Ok(())
    }

    /// Streams the first completion stage, relaying each fragment to the
    /// player's channel while the full text accumulates for parsing.
    async fn stream_stage(
        &self,
        session: &GameSession,
        action: &str,
        starting: bool,
    ) -> Result<String, GatewayError> {
        let mut ctx = PromptContext::new(self.turn_prompt(session, action, starting))
            .with_history(session.history.clone());
        ctx.trim_to(self.config.history_budget);

        let (tx, mut rx) = mpsc::channel::<String>(32);
        let bus = Arc::clone(&self.bus);
        let player_id = session.player_id.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(content) = rx.recv().await {
                bus.publish(&player_id, TurnFrame::StreamChunk { content });
            }
        });

        let result = self
            .gateway
            .stream_completion(&ctx, self.config.provider_preference.as_deref(), &tx)
            .await;

        // Join the forwarder so every chunk frame is published before any
        // frame that must follow the chunks.
        drop(tx);
        let _ = forwarder.await;
        result
    }

    /// Runs the post-judgment continuation without streaming; its
    /// narrative reaches the client inside the terminal snapshot, keeping
    /// the frame order contract intact.
    async fn continuation_stage(
        &self,
        session: &GameSession,
        roll: &JudgmentRoll,
    ) -> Result<String, GatewayError> {
        let prompt = format!(
            "{}\n\nContinue the narrative strictly from this judgment outcome and answer \
             with the final JSON object carrying `narrative` and `state_update`. Current \
             game state JSON:\n{}",
            roll.result_text(),
            self.state_json(session),
        );
        let mut ctx = PromptContext::new(prompt).with_history(session.history.clone());
        ctx.trim_to(self.config.history_budget);
        self.gateway
            .complete(&ctx, self.config.provider_preference.as_deref())
            .await
    }

    fn turn_prompt(&self, session: &GameSession, action: &str, starting: bool) -> String {
        if starting && session.opportunities_remaining == DAILY_OPPORTUNITIES {
            "The player enters the dream for the first time today. Weave a brand new random \
             life for them and open the trial. Answer with a JSON object carrying \
             `narrative` and a `state_update` that fills `current_life`."
                .to_owned()
        } else if starting {
            format!(
                "The player opens a new trial with {} opportunities left; beginning it \
                 leaves {}. Weave a brand new random life, unrelated to earlier ones. \
                 Answer with a JSON object carrying `narrative` and a `state_update` that \
                 fills `current_life`.",
                session.opportunities_remaining,
                session.opportunities_remaining - 1,
            )
        } else {
            format!(
                "Current game state JSON:\n{}\n\nThe player's action is: \"{}\"\n\nAnswer \
                 with a JSON object carrying `narrative` and either `state_update` or \
                 `roll_request`. If the character dies, say so in the narrative and set \
                 `is_in_trial` to false and `current_life` to null.",
                self.state_json(session),
                action,
            )
        }
    }

    fn state_json(&self, session: &GameSession) -> String {
        let recent: String = session.display_history.join("\n");
        let tail_chars = recent.chars().count().saturating_sub(1000);
        let recent_tail: String = recent.chars().skip(tail_chars).collect();
        json!({
            "current_life": session.current_life,
            "opportunities_remaining": session.opportunities_remaining,
            "is_in_trial": session.is_in_trial,
            "recent_narrative": recent_tail,
        })
        .to_string()
    }

    /// Applies an unapplied pending punishment. Returns whether anything
    /// changed; re-applying an already applied punishment is a no-op.
    fn apply_pending_punishment(&self, session: &mut GameSession) -> bool {
        let Some(punishment) = &session.pending_punishment else {
            return false;
        };
        if punishment.applied {
            return false;
        }
        let level = punishment.level;
        let reason = punishment.reason.clone();

        match level {
            AbuseLevel::Warning => {
                session.display_history.push(WARNING_NOTICE.to_owned());
            }
            AbuseLevel::Restrict => {
                session.is_in_trial = false;
                session.current_life = None;
                session.history = vec![ChatMessage::system(&self.config.system_prompt)];
                session.display_history.push(RESTRICT_NOTICE.to_owned());
            }
            AbuseLevel::Block => {
                session.daily_success_achieved = true;
                session.is_in_trial = false;
                session.current_life = None;
                session.opportunities_remaining = 0;
                session.display_history.push(BLOCK_NOTICE.to_owned());
            }
        }
        if let Some(punishment) = session.pending_punishment.as_mut() {
            punishment.applied = true;
        }
        info!(player_id = %session.player_id, level = ?level, reason = %reason, "pending punishment applied");
        true
    }

    /// Submits the turn to the abuse analyzer on a detached task. The
    /// verdict, if any, is written back under a fresh short-lived lock;
    /// every failure along the way is swallowed.
    fn dispatch_analysis(&self, session: &mut GameSession, action: &str) {
        let batch: Vec<String> = if session.unchecked_turns >= self.config.sweep_interval {
            let window = self.config.sweep_window + session.unchecked_turns as usize;
            let batch = session
                .recent_player_inputs(window)
                .into_iter()
                .map(str::to_owned)
                .collect();
            session.unchecked_turns = 0;
            batch
        } else {
            vec![action.to_owned()]
        };
        let prior_narrative = session.display_history.last().cloned().unwrap_or_default();

        let analyzer = Arc::clone(&self.analyzer);
        let store = Arc::clone(&self.store);
        let locks = Arc::clone(&self.locks);
        let clock = Arc::clone(&self.clock);
        let player_id = session.player_id.clone();
        tokio::spawn(async move {
            let Some(verdict) = analyzer.analyze(&batch, &prior_narrative).await else {
                return;
            };
            warn!(player_id = %player_id, level = ?verdict.level, reason = %verdict.reason, "abuse verdict queued");
            let _guard = locks.acquire(&player_id).await;
            match store.load(&player_id).await {
                Ok(Some(mut session)) => {
                    session.queue_punishment(verdict);
                    session.last_modified = clock.now();
                    if let Err(err) = store.save(&mut session).await {
                        warn!(player_id = %player_id, error = %err, "failed to record verdict");
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(player_id = %player_id, error = %err, "failed to load session for verdict");
                }
            }
        });
    }

    async fn ensure_session_locked(
        &self,
        player_id: &PlayerId,
        _guard: &SessionGuard,
    ) -> Result<GameSession, GameError> {
        let today = self.clock.today();
        match self.store.load(player_id).await.map_err(storage)? {
            Some(mut session) if session.session_date == today => {
                if session.is_processing {
                    // We hold the lock, so no turn is running; the flag
                    // is a leftover from a crash mid-turn.
                    warn!(player_id = %player_id, "clearing stale processing flag");
                    session.is_processing = false;
                    self.persist(&mut session).await?;
                }
                Ok(session)
            }
            previous => {
                if previous.is_some() {
                    info!(player_id = %player_id, "daily rollover, starting fresh session");
                    self.store.clear(player_id).await.map_err(storage)?;
                } else {
                    info!(player_id = %player_id, "creating session on first contact");
                }
                let mut session = GameSession::fresh(
                    player_id.clone(),
                    today,
                    self.clock.now(),
                    &self.config.system_prompt,
                    &self.config.welcome_banner,
                );
                self.persist(&mut session).await?;
                Ok(session)
            }
        }
    }

    /// Persists with bounded retries. A revision conflict re-reads the
    /// stored revision and retries; the turn holds the only legitimate
    /// write path, so the newest write wins.
    async fn persist(&self, session: &mut GameSession) -> Result<(), GameError> {
        let mut last_error = String::new();
        for attempt in 0..self.config.save_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.config.save_backoff * 2u32.pow(attempt - 1)).await;
            }
            session.last_modified = self.clock.now();
            match self.store.save(session).await {
                Ok(()) => return Ok(()),
                Err(StoreError::Conflict { actual, .. }) => {
                    warn!(player_id = %session.player_id, attempt, actual, "save conflict, retrying against stored revision");
                    session.revision = actual;
                    last_error = "revision conflict".to_owned();
                }
                Err(err) => {
                    warn!(player_id = %session.player_id, attempt, error = %err, "save failed");
                    last_error = err.to_string();
                }
            }
        }
        Err(GameError::StorageFailure(last_error))
    }

    /// Abort path for a turn whose frame sequence has started: clears the
    /// processing flag best-effort and closes the sequence with
    /// `stream_end` followed by a generic `error`.
    async fn abort_started_turn(
        &self,
        player_id: &PlayerId,
        session: &mut GameSession,
    ) -> Result<(), GameError> {
        session.is_processing = false;
        session.last_modified = self.clock.now();
        if let Err(err) = self.store.save(session).await {
            warn!(player_id = %player_id, error = %err, "failed to clear processing flag after abort");
        }
        self.fail_started_turn(player_id, GameError::ProviderExhausted)
    }

    fn fail_started_turn(&self, player_id: &PlayerId, err: GameError) -> Result<(), GameError> {
        self.bus.publish(player_id, TurnFrame::StreamEnd);
        self.bus.publish(
            player_id,
            TurnFrame::Error {
                detail: err.client_detail().to_owned(),
            },
        );
        Err(err)
    }

    /// Rejection path for a turn that never started streaming: a single
    /// `error` frame, nothing else.
    fn reject(&self, player_id: &PlayerId, err: GameError) -> Result<(), GameError> {
        self.bus.publish(
            player_id,
            TurnFrame::Error {
                detail: err.client_detail().to_owned(),
            },
        );
        Err(err)
    }
}

fn validate_action(session: &GameSession, action: &str, starting: bool) -> Result<(), GameError> {
    if action.is_empty() {
        return Err(GameError::InvalidAction("empty action".to_owned()));
    }
    if session.daily_success_achieved {
        return Err(GameError::InvalidAction(
            "the day's trials are already complete".to_owned(),
        ));
    }
    if starting {
        if session.is_in_trial {
            return Err(GameError::InvalidAction(
                "a trial is already underway".to_owned(),
            ));
        }
        if session.opportunities_remaining <= 0 {
            return Err(GameError::InvalidAction(
                "no opportunities remaining today".to_owned(),
            ));
        }
    } else if !session.is_in_trial {
        return Err(GameError::InvalidAction(
            "start a trial before acting".to_owned(),
        ));
    }
    Ok(())
}

fn storage(err: StoreError) -> GameError {
    GameError::StorageFailure(err.to_string())
}

/// Administrative surface. Every mutation goes through the same lock and
/// persistence primitives as normal play.
impl TurnOrchestrator {
    /// Most recently active sessions, newest first.
    ///
    /// # Errors
    ///
    /// Returns `GameError::StorageFailure` when the store fails.
    pub async fn recent_sessions(&self, limit: usize) -> Result<Vec<SessionSummary>, GameError> {
        self.store.recent(limit).await.map_err(storage)
    }

    /// One player's full session record, transcript included.
    ///
    /// # Errors
    ///
    /// Returns `GameError::StorageFailure` when the store fails.
    pub async fn session_detail(
        &self,
        player_id: &PlayerId,
    ) -> Result<Option<GameSession>, GameError> {
        self.store.load(player_id).await.map_err(storage)
    }

    /// Resets a player's session to nothing.
    ///
    /// # Errors
    ///
    /// Returns `GameError::StorageFailure` when the store fails.
    pub async fn clear_session(&self, player_id: &PlayerId) -> Result<(), GameError> {
        let _guard = self.locks.acquire(player_id).await;
        info!(player_id = %player_id, "admin clear");
        self.store.clear(player_id).await.map_err(storage)
    }

    /// Force-sets the remaining opportunities. Setting a positive value
    /// re-opens a day that was already concluded. Returns the new
    /// snapshot, or `None` when the player has no session.
    ///
    /// # Errors
    ///
    /// Returns `GameError::StorageFailure` when persistence fails.
    pub async fn set_opportunities(
        &self,
        player_id: &PlayerId,
        opportunities: i32,
    ) -> Result<Option<StateSnapshot>, GameError> {
        let _guard = self.locks.acquire(player_id).await;
        let Some(mut session) = self.store.load(player_id).await.map_err(storage)? else {
            return Ok(None);
        };
        session.opportunities_remaining = opportunities.max(0);
        if opportunities > 0 && session.daily_success_achieved {
            session.daily_success_achieved = false;
        }
        self.persist(&mut session).await?;
        info!(player_id = %player_id, opportunities, "admin set opportunities");

        let snapshot = StateSnapshot::from(&session);
        self.bus
            .publish(player_id, TurnFrame::FullState(snapshot.clone()));
        Ok(Some(snapshot))
    }

    /// Queues a manual punishment, following the same severity override
    /// rule as analyzer verdicts. Returns `None` when the player has no
    /// session.
    ///
    /// # Errors
    ///
    /// Returns `GameError::StorageFailure` when persistence fails.
    pub async fn queue_manual_punishment(
        &self,
        player_id: &PlayerId,
        verdict: Verdict,
    ) -> Result<Option<()>, GameError> {
        let _guard = self.locks.acquire(player_id).await;
        let Some(mut session) = self.store.load(player_id).await.map_err(storage)? else {
            return Ok(None);
        };
        info!(player_id = %player_id, level = ?verdict.level, "admin queued punishment");
        session.queue_punishment(verdict);
        self.persist(&mut session).await?;
        self.bus
            .publish(player_id, TurnFrame::FullState(StateSnapshot::from(&session)));
        Ok(Some(()))
    }
}
