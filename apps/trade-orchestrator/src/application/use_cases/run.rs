//! Run bookkeeping shared by every orchestrator.

use std::sync::Arc;

use tokio::time::Instant;

use crate::application::ports::{Clock, TradingBackend};
use crate::application::services::{AutomationScheduler, RpcGuard};
use crate::config::OrchestratorConfig;
use crate::domain::events::EngineEvent;
use crate::domain::guards::GuardDecision;
use crate::domain::orchestration::{RunKind, RunOutcome, RunState, RunStateMachine, RunStatus};
use crate::domain::shared::{RunId, SubscriptionId, Ticket};
use crate::error::ExecutionError;
use crate::infrastructure::broadcast::EventBus;

/// Components an orchestrator run drives.
pub struct RunServices<B: ?Sized> {
    /// Guarded backend access.
    pub guard: Arc<RpcGuard<B>>,
    /// Automation scheduler for post-entry protection.
    pub scheduler: Arc<AutomationScheduler<B>>,
    /// Wall clock.
    pub clock: Arc<dyn Clock>,
    /// Orchestrator timing.
    pub config: OrchestratorConfig,
}

impl<B: ?Sized> Clone for RunServices<B> {
    fn clone(&self) -> Self {
        Self {
            guard: Arc::clone(&self.guard),
            scheduler: Arc::clone(&self.scheduler),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
        }
    }
}

impl<B: TradingBackend + ?Sized> RunServices<B> {
    /// Deadline for one orchestrator step starting now.
    pub fn step_deadline(&self) -> Instant {
        Instant::now() + self.config.step_timeout()
    }
}

/// Tracks one run's state, publishing every transition.
pub(crate) struct RunTracker {
    run_id: RunId,
    kind: RunKind,
    history: Vec<RunState>,
    ticket: Option<Ticket>,
    subscriptions: Vec<SubscriptionId>,
    guard: Option<GuardDecision>,
    events: EventBus,
    clock: Arc<dyn Clock>,
}

impl RunTracker {
    pub(crate) fn start<B: TradingBackend + ?Sized>(kind: RunKind, services: &RunServices<B>) -> Self {
        let run_id = RunId::generate();
        tracing::info!(%run_id, %kind, "Run started");
        Self {
            run_id,
            kind,
            history: vec![RunState::Idle],
            ticket: None,
            subscriptions: Vec::new(),
            guard: None,
            events: services.guard.events().clone(),
            clock: Arc::clone(&services.clock),
        }
    }

    pub(crate) const fn run_id(&self) -> RunId {
        self.run_id
    }

    pub(crate) fn state(&self) -> RunState {
        self.history.last().copied().unwrap_or(RunState::Idle)
    }

    pub(crate) const fn ticket(&self) -> Option<Ticket> {
        self.ticket
    }

    pub(crate) const fn set_ticket(&mut self, ticket: Ticket) {
        self.ticket = Some(ticket);
    }

    pub(crate) fn add_subscriptions(&mut self, ids: impl IntoIterator<Item = SubscriptionId>) {
        self.subscriptions.extend(ids);
    }

    pub(crate) fn set_guard(&mut self, decision: GuardDecision) {
        self.guard = Some(decision);
    }

    /// Apply a validated transition.
    pub(crate) fn transition(&mut self, to: RunState) -> Result<(), ExecutionError> {
        let from = self.state();
        RunStateMachine::validate_transition(self.kind, from, to)
            .map_err(|e| ExecutionError::internal(e.to_string()))?;
        self.history.push(to);
        tracing::debug!(run_id = %self.run_id, kind = %self.kind, %from, %to, "Run transition");
        self.events.publish(EngineEvent::RunTransition {
            run_id: self.run_id,
            kind: self.kind,
            from,
            to,
            at: self.clock.now(),
        });
        Ok(())
    }

    /// Successful end of the run.
    pub(crate) fn succeed(self, status: RunStatus) -> RunOutcome {
        self.outcome(status, None)
    }

    /// End the run with `error`: `Cancelled` for cancellations, `Failed` otherwise.
    pub(crate) fn fail(mut self, error: ExecutionError) -> RunOutcome {
        let (state, status) = if error.is_cancelled() {
            (RunState::Cancelled, RunStatus::Cancelled)
        } else {
            (RunState::Failed, RunStatus::Failed)
        };
        if !self.state().is_terminal(self.kind) {
            if let Err(e) = self.transition(state) {
                tracing::error!(run_id = %self.run_id, error = %e, "Terminal transition rejected");
            }
        }
        self.outcome(status, Some(error))
    }

    /// End the run with an explicit terminal state and status.
    pub(crate) fn end(
        mut self,
        state: RunState,
        status: RunStatus,
        error: Option<ExecutionError>,
    ) -> RunOutcome {
        if let Err(e) = self.transition(state) {
            tracing::error!(run_id = %self.run_id, error = %e, "Terminal transition rejected");
        }
        self.outcome(status, error)
    }

    fn outcome(self, status: RunStatus, error: Option<ExecutionError>) -> RunOutcome {
        match &error {
            Some(e) if !e.is_cancelled() => {
                tracing::warn!(run_id = %self.run_id, kind = %self.kind, status = ?status, error = %e, "Run ended");
            }
            _ => tracing::info!(run_id = %self.run_id, kind = %self.kind, status = ?status, "Run ended"),
        }
        RunOutcome {
            run_id: self.run_id,
            kind: self.kind,
            status,
            ticket: self.ticket,
            error,
            subscriptions: self.subscriptions,
            guard: self.guard,
            history: self.history,
        }
    }
}
