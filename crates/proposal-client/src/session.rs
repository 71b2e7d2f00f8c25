//! Session-scoped proposal lifecycle: `Unset -> Created -> Responded`.
//!
//! A session lazily creates its proposal on the first decision, then
//! responds against that id. One decision may be in flight at a time; the
//! loading flag is the only guard, and it is held by a drop-guard so a
//! cancelled attempt cannot leave the controls disabled. Failures never move
//! the state machine: the caller sees the controls come back and may retry.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use proposal_types::api::RespondRequest;
use proposal_types::{Decision, Proposal};

use crate::error::{LifecycleError, ServiceError, Step};
use crate::service::ProposalService;

/// Upper bound on each service call unless overridden.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// The fixed message sent alongside a decision.
pub fn decision_message(decision: Decision) -> &'static str {
    match decision {
        Decision::Yes => "Yes! I would love to get to know you!",
        Decision::No => "I need some time to think about this.",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unset,
    Created,
    Responded,
}

/// Point-in-time copy of the session state, for rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub proposal_id: Option<String>,
    pub is_loading: bool,
    pub response_submitted: bool,
    pub last_decision: Option<Decision>,
}

impl SessionSnapshot {
    pub fn phase(&self) -> Phase {
        match (&self.proposal_id, self.response_submitted) {
            (_, true) => Phase::Responded,
            (Some(_), false) => Phase::Created,
            (None, false) => Phase::Unset,
        }
    }
}

/// What a `submit_decision` call did.
#[derive(Debug)]
pub enum SubmitOutcome {
    Responded {
        proposal_id: String,
        decision: Decision,
    },
    /// The session already holds a response; nothing was sent.
    AlreadyResponded,
    /// Another decision is in flight; nothing was sent.
    Busy,
    /// The attempt was abandoned without a state change.
    Failed(LifecycleError),
}

#[derive(Debug, Default)]
struct SessionState {
    proposal_id: Option<String>,
    response_submitted: bool,
    last_decision: Option<Decision>,
}

pub struct ProposalSession<S> {
    service: S,
    proposal: Proposal,
    request_timeout: Option<Duration>,
    loading: AtomicBool,
    state: Mutex<SessionState>,
}

impl<S: ProposalService> ProposalSession<S> {
    pub fn new(service: S, proposal: Proposal) -> Self {
        Self {
            service,
            proposal,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            loading: AtomicBool::new(false),
            state: Mutex::new(SessionState::default()),
        }
    }

    /// `None` lets a service call wait forever.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn proposal(&self) -> &Proposal {
        &self.proposal
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state();
        SessionSnapshot {
            proposal_id: state.proposal_id.clone(),
            is_loading: self.is_loading(),
            response_submitted: state.response_submitted,
            last_decision: state.last_decision,
        }
    }

    /// Record `decision`, creating the proposal first if this session has
    /// none yet.
    pub async fn submit_decision(&self, decision: Decision) -> SubmitOutcome {
        if self.state().response_submitted {
            debug!(%decision, "Response already submitted, ignoring decision");
            return SubmitOutcome::AlreadyResponded;
        }

        let Some(_loading) = LoadingGuard::acquire(&self.loading) else {
            debug!(%decision, "Decision already in flight, ignoring");
            return SubmitOutcome::Busy;
        };

        // A concurrent attempt may have finished between the check above
        // and taking the guard.
        if self.state().response_submitted {
            return SubmitOutcome::AlreadyResponded;
        }

        match self.create_then_respond(decision).await {
            Ok(proposal_id) => {
                info!(proposal_id = %proposal_id, %decision, "Response submitted");
                SubmitOutcome::Responded {
                    proposal_id,
                    decision,
                }
            }
            Err(e) => {
                warn!(error = %e, %decision, "Decision abandoned, retry allowed");
                SubmitOutcome::Failed(e)
            }
        }
    }

    async fn create_then_respond(&self, decision: Decision) -> Result<String, LifecycleError> {
        let existing = self.state().proposal_id.clone();
        let proposal_id = match existing {
            Some(id) => id,
            None => {
                let id = self.create().await?;
                self.state().proposal_id = Some(id.clone());
                info!(proposal_id = %id, "Proposal created");
                id
            }
        };

        let request = RespondRequest {
            proposal_id: proposal_id.clone(),
            response: decision,
            message: decision_message(decision).to_string(),
        };
        let ack = self
            .bounded(Step::Respond, self.service.respond(&proposal_id, &request))
            .await?;
        if !ack.success {
            return Err(LifecycleError::Rejected {
                step: Step::Respond,
            });
        }

        let mut state = self.state();
        state.response_submitted = true;
        state.last_decision = Some(decision);
        Ok(proposal_id)
    }

    async fn create(&self) -> Result<String, LifecycleError> {
        let ack = self
            .bounded(Step::Create, self.service.create(&self.proposal))
            .await?;
        if !ack.success {
            return Err(LifecycleError::Rejected { step: Step::Create });
        }
        match ack.proposal_id {
            Some(id) if !id.trim().is_empty() => Ok(id),
            _ => Err(LifecycleError::MissingProposalId),
        }
    }

    async fn bounded<T>(
        &self,
        step: Step,
        call: impl Future<Output = Result<T, ServiceError>>,
    ) -> Result<T, LifecycleError> {
        let result = match self.request_timeout {
            Some(after) => tokio::time::timeout(after, call)
                .await
                .map_err(|_| LifecycleError::TimedOut { step, after })?,
            None => call.await,
        };
        result.map_err(|source| LifecycleError::Service { step, source })
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        // Nothing panics while holding the lock, so a poisoned state is
        // still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds the loading flag for as long as it lives.
struct LoadingGuard<'a>(&'a AtomicBool);

impl<'a> LoadingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use tokio::sync::Notify;

    use proposal_types::StoryChapter;
    use proposal_types::api::{CreateProposalResponse, RespondResponse};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Create,
        Respond {
            proposal_id: String,
            response: Decision,
            message: String,
        },
    }

    /// Replays queued results in order and records every call it sees.
    #[derive(Default)]
    struct ScriptedService {
        creates: Mutex<VecDeque<Result<CreateProposalResponse, ServiceError>>>,
        responds: Mutex<VecDeque<Result<RespondResponse, ServiceError>>>,
        calls: Mutex<Vec<Call>>,
        create_gate: Option<Arc<Notify>>,
        respond_gate: Option<Arc<Notify>>,
        hang_respond: bool,
    }

    impl ScriptedService {
        fn on_create(self, result: Result<CreateProposalResponse, ServiceError>) -> Self {
            self.creates.lock().unwrap().push_back(result);
            self
        }

        fn on_respond(self, result: Result<RespondResponse, ServiceError>) -> Self {
            self.responds.lock().unwrap().push_back(result);
            self
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn unscripted() -> ServiceError {
        ServiceError::Status {
            status: 599,
            body: "unscripted call".into(),
        }
    }

    impl ProposalService for ScriptedService {
        async fn create(&self, _proposal: &Proposal) -> Result<CreateProposalResponse, ServiceError> {
            self.calls.lock().unwrap().push(Call::Create);
            if let Some(gate) = &self.create_gate {
                gate.notified().await;
            }
            self.creates.lock().unwrap().pop_front().unwrap_or_else(|| Err(unscripted()))
        }

        async fn respond(
            &self,
            proposal_id: &str,
            request: &RespondRequest,
        ) -> Result<RespondResponse, ServiceError> {
            self.calls.lock().unwrap().push(Call::Respond {
                proposal_id: proposal_id.to_string(),
                response: request.response,
                message: request.message.clone(),
            });
            if let Some(gate) = &self.respond_gate {
                gate.notified().await;
            }
            if self.hang_respond {
                std::future::pending::<()>().await;
            }
            self.responds.lock().unwrap().pop_front().unwrap_or_else(|| Err(unscripted()))
        }
    }

    fn proposal() -> Proposal {
        Proposal {
            partner_name: "Maryam".into(),
            proposer_name: "Barzan".into(),
            message: "I would be honored if you gave me a chance.".into(),
            our_story: vec![
                StoryChapter {
                    date: "First Sight".into(),
                    description: "Time stood still.".into(),
                },
                StoryChapter {
                    date: "This Moment".into(),
                    description: "Today I find the courage.".into(),
                },
            ],
        }
    }

    fn created(id: &str) -> Result<CreateProposalResponse, ServiceError> {
        Ok(CreateProposalResponse {
            success: true,
            proposal_id: Some(id.into()),
            message: None,
        })
    }

    fn create_refused() -> Result<CreateProposalResponse, ServiceError> {
        Ok(CreateProposalResponse {
            success: false,
            proposal_id: None,
            message: None,
        })
    }

    fn acked() -> Result<RespondResponse, ServiceError> {
        Ok(RespondResponse {
            success: true,
            message: None,
            response_id: Some("r1".into()),
        })
    }

    fn respond_refused() -> Result<RespondResponse, ServiceError> {
        Ok(RespondResponse {
            success: false,
            message: None,
            response_id: None,
        })
    }

    fn unavailable() -> ServiceError {
        ServiceError::Status {
            status: 503,
            body: "unavailable".into(),
        }
    }

    fn respond_call(id: &str, decision: Decision) -> Call {
        Call::Respond {
            proposal_id: id.into(),
            response: decision,
            message: decision_message(decision).into(),
        }
    }

    #[test]
    fn decision_messages_differ_per_decision() {
        assert_ne!(decision_message(Decision::Yes), decision_message(Decision::No));
        assert!(decision_message(Decision::No).contains("time"));
    }

    #[test]
    fn fresh_session_is_unset() {
        let session = ProposalSession::new(ScriptedService::default(), proposal());
        let snapshot = session.snapshot();
        assert_eq!(snapshot, SessionSnapshot::default());
        assert_eq!(snapshot.phase(), Phase::Unset);
        assert!(session.service().calls().is_empty());
    }

    #[tokio::test]
    async fn creates_then_responds() {
        let svc = ScriptedService::default().on_create(created("abc123")).on_respond(acked());
        let session = ProposalSession::new(svc, proposal());

        let outcome = session.submit_decision(Decision::Yes).await;
        assert!(matches!(
            outcome,
            SubmitOutcome::Responded { ref proposal_id, decision: Decision::Yes } if proposal_id == "abc123"
        ));

        assert_eq!(
            session.snapshot(),
            SessionSnapshot {
                proposal_id: Some("abc123".into()),
                is_loading: false,
                response_submitted: true,
                last_decision: Some(Decision::Yes),
            }
        );
        assert_eq!(session.snapshot().phase(), Phase::Responded);
        assert_eq!(
            session.service().calls(),
            vec![Call::Create, respond_call("abc123", Decision::Yes)]
        );
    }

    #[tokio::test]
    async fn refused_create_leaves_session_unset() {
        let svc = ScriptedService::default().on_create(create_refused());
        let session = ProposalSession::new(svc, proposal());

        let outcome = session.submit_decision(Decision::Yes).await;
        assert!(matches!(
            outcome,
            SubmitOutcome::Failed(LifecycleError::Rejected { step: Step::Create })
        ));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.proposal_id, None);
        assert!(!snapshot.response_submitted);
        assert!(!snapshot.is_loading);
        assert_eq!(session.service().calls(), vec![Call::Create]);
    }

    #[tokio::test]
    async fn failed_create_is_retried_not_responded() {
        let svc = ScriptedService::default()
            .on_create(Err(unavailable()))
            .on_create(created("p2"))
            .on_respond(acked());
        let session = ProposalSession::new(svc, proposal());

        let first = session.submit_decision(Decision::No).await;
        match first {
            SubmitOutcome::Failed(e) => assert_eq!(e.step(), Step::Create),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(session.service().calls(), vec![Call::Create]);

        let second = session.submit_decision(Decision::No).await;
        assert!(matches!(second, SubmitOutcome::Responded { .. }));
        assert_eq!(
            session.service().calls(),
            vec![Call::Create, Call::Create, respond_call("p2", Decision::No)]
        );
    }

    #[tokio::test]
    async fn failed_respond_reuses_proposal_id() {
        let svc = ScriptedService::default()
            .on_create(created("p1"))
            .on_respond(respond_refused())
            .on_respond(Err(unavailable()))
            .on_respond(acked());
        let session = ProposalSession::new(svc, proposal());

        let first = session.submit_decision(Decision::Yes).await;
        assert!(matches!(
            first,
            SubmitOutcome::Failed(LifecycleError::Rejected { step: Step::Respond })
        ));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase(), Phase::Created);
        assert_eq!(snapshot.proposal_id.as_deref(), Some("p1"));
        assert!(!snapshot.is_loading);

        let second = session.submit_decision(Decision::Yes).await;
        assert!(matches!(
            second,
            SubmitOutcome::Failed(LifecycleError::Service { step: Step::Respond, .. })
        ));
        assert_eq!(session.snapshot().phase(), Phase::Created);

        let third = session.submit_decision(Decision::No).await;
        assert!(matches!(third, SubmitOutcome::Responded { decision: Decision::No, .. }));
        assert_eq!(session.snapshot().last_decision, Some(Decision::No));

        assert_eq!(
            session.service().calls(),
            vec![
                Call::Create,
                respond_call("p1", Decision::Yes),
                respond_call("p1", Decision::Yes),
                respond_call("p1", Decision::No),
            ]
        );
    }

    #[tokio::test]
    async fn responded_session_ignores_further_decisions() {
        let svc = ScriptedService::default().on_create(created("p1")).on_respond(acked());
        let session = ProposalSession::new(svc, proposal());

        session.submit_decision(Decision::Yes).await;
        let calls_after_response = session.service().calls().len();

        for decision in [Decision::No, Decision::Yes] {
            let outcome = session.submit_decision(decision).await;
            assert!(matches!(outcome, SubmitOutcome::AlreadyResponded));
        }

        assert_eq!(session.service().calls().len(), calls_after_response);
        let snapshot = session.snapshot();
        assert!(snapshot.response_submitted);
        assert_eq!(snapshot.last_decision, Some(Decision::Yes));
    }

    #[tokio::test]
    async fn create_without_id_never_responds() {
        let svc = ScriptedService::default()
            .on_create(Ok(CreateProposalResponse {
                success: true,
                proposal_id: None,
                message: None,
            }))
            .on_create(created("  "));
        let session = ProposalSession::new(svc, proposal());

        for _ in 0..2 {
            let outcome = session.submit_decision(Decision::Yes).await;
            assert!(matches!(
                outcome,
                SubmitOutcome::Failed(LifecycleError::MissingProposalId)
            ));
        }

        assert_eq!(session.service().calls(), vec![Call::Create, Call::Create]);
        assert_eq!(session.snapshot().phase(), Phase::Unset);
    }

    #[tokio::test]
    async fn malformed_create_body_is_a_plain_failure() {
        let malformed = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let svc = ScriptedService::default().on_create(Err(ServiceError::Malformed(malformed)));
        let session = ProposalSession::new(svc, proposal());

        let outcome = session.submit_decision(Decision::Yes).await;
        assert!(matches!(
            outcome,
            SubmitOutcome::Failed(LifecycleError::Service {
                step: Step::Create,
                source: ServiceError::Malformed(_),
            })
        ));
        assert_eq!(session.snapshot(), SessionSnapshot::default());
    }

    #[tokio::test]
    async fn second_decision_while_in_flight_is_ignored() {
        let gate = Arc::new(Notify::new());
        let svc = ScriptedService {
            create_gate: Some(gate.clone()),
            ..ScriptedService::default()
        }
        .on_create(created("p1"))
        .on_respond(acked());
        let session = ProposalSession::new(svc, proposal());

        let first = session.submit_decision(Decision::Yes);
        let second = async {
            tokio::task::yield_now().await;
            let loading_seen = session.is_loading();
            let outcome = session.submit_decision(Decision::No).await;
            gate.notify_one();
            (loading_seen, outcome)
        };

        let (first, (loading_seen, second)) = tokio::join!(first, second);

        assert!(loading_seen);
        assert!(matches!(second, SubmitOutcome::Busy));
        assert!(matches!(first, SubmitOutcome::Responded { decision: Decision::Yes, .. }));
        assert_eq!(
            session.service().calls(),
            vec![Call::Create, respond_call("p1", Decision::Yes)]
        );
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn second_decision_while_responding_is_ignored() {
        let gate = Arc::new(Notify::new());
        let svc = ScriptedService {
            respond_gate: Some(gate.clone()),
            ..ScriptedService::default()
        }
        .on_create(created("p1"))
        .on_respond(acked());
        let session = ProposalSession::new(svc, proposal());

        let first = session.submit_decision(Decision::Yes);
        let second = async {
            while session.service().calls().len() < 2 {
                tokio::task::yield_now().await;
            }
            let snapshot = session.snapshot();
            let outcome = session.submit_decision(Decision::No).await;
            gate.notify_one();
            (snapshot, outcome)
        };

        let (first, (during, second)) = tokio::join!(first, second);

        assert!(during.is_loading);
        assert_eq!(during.phase(), Phase::Created);
        assert!(matches!(second, SubmitOutcome::Busy));
        assert!(matches!(first, SubmitOutcome::Responded { decision: Decision::Yes, .. }));
        assert_eq!(
            session.service().calls(),
            vec![Call::Create, respond_call("p1", Decision::Yes)]
        );
        assert!(!session.is_loading());
        assert_eq!(session.snapshot().last_decision, Some(Decision::Yes));
    }

    #[tokio::test]
    async fn timed_out_respond_clears_loading() {
        let svc = ScriptedService {
            hang_respond: true,
            ..ScriptedService::default()
        }
        .on_create(created("p1"));
        let session = ProposalSession::new(svc, proposal())
            .with_request_timeout(Some(Duration::from_millis(20)));

        let outcome = session.submit_decision(Decision::Yes).await;
        assert!(matches!(
            outcome,
            SubmitOutcome::Failed(LifecycleError::TimedOut { step: Step::Respond, .. })
        ));

        let snapshot = session.snapshot();
        assert!(!snapshot.is_loading);
        assert!(!snapshot.response_submitted);
        assert_eq!(snapshot.proposal_id.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn dropped_attempt_releases_loading() {
        let gate = Arc::new(Notify::new());
        let svc = ScriptedService {
            create_gate: Some(gate),
            ..ScriptedService::default()
        }
        .on_create(created("p1"));
        let session = ProposalSession::new(svc, proposal()).with_request_timeout(None);

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            session.submit_decision(Decision::Yes),
        )
        .await;

        assert!(abandoned.is_err());
        assert!(!session.is_loading());
        assert_eq!(session.snapshot().phase(), Phase::Unset);
    }
}
