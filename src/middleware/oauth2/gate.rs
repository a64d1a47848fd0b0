//! OAuth2 admission gate.
//!
//! Per request the gate makes one of three calls:
//! - bypass: no credential, or one the classifier attributes to another
//!   namespace. Downstream runs without any authentication claim added here.
//! - gated: the handler chain runs; on success the identity's OAuth scopes
//!   are cleared (gateway mode only) before downstream runs.
//! - denied: no chain factory was registered; nothing runs.
//!
//! The chain is built on first use and cached. Concurrent first requests
//! wait on the single in-flight build.

use std::future::Future;
use std::sync::Arc;

use axum::{body::Body, http::Request, response::Response};
use tokio::sync::OnceCell;

use crate::api::v1::extractors::ValidatedIdentity;
use crate::error::GateError;
use crate::services::oauth2::chain::{ChainFactory, HandlerChain, Step};
use crate::services::oauth2::classifier::{
    CredentialClassifier, CredentialKind, LengthHeuristic,
};
use crate::services::oauth2::credential;
use crate::services::oauth2::options::GateConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
    NoCredential,
    ForeignCredential,
}

/// Per-request admission decision. A denial is `Err(GateError::Configuration)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Bypass(BypassReason),
    Gated,
}

pub struct OAuth2Gate {
    config: GateConfig,
    factory: Option<Arc<dyn ChainFactory>>,
    classifier: Arc<dyn CredentialClassifier>,
    chain: OnceCell<HandlerChain>,
}

impl std::fmt::Debug for OAuth2Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Gate")
            .field("config", &self.config)
            .field("factory_registered", &self.factory.is_some())
            .field("classifier", &self.classifier.name())
            .field("chain", &self.chain.get())
            .finish()
    }
}

impl OAuth2Gate {
    /// `factory == None` models an application that never configured OAuth2:
    /// every request is denied.
    pub fn new(config: GateConfig, factory: Option<Arc<dyn ChainFactory>>) -> Self {
        Self {
            config,
            factory,
            classifier: Arc::new(LengthHeuristic::default()),
            chain: OnceCell::new(),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn CredentialClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn classifier_name(&self) -> &'static str {
        self.classifier.name()
    }

    pub fn is_built(&self) -> bool {
        self.chain.initialized()
    }

    /// Drop the cached chain so the next request builds it again.
    ///
    /// Needs exclusive access, so it can never overlap request traffic.
    pub fn reset(&mut self) {
        if self.chain.take().is_some() {
            tracing::info!("oauth2 handler chain reset");
        }
    }

    /// The built chain, building it on first use.
    ///
    /// A failed build leaves the gate unbuilt; the next request tries again.
    pub async fn chain(&self) -> Result<&HandlerChain, GateError> {
        self.chain
            .get_or_try_init(|| async move {
                let chain = HandlerChain::build(self.factory.as_deref(), &self.config.options)?;
                tracing::info!(
                    handlers = ?chain.names(),
                    gateway_enabled = self.config.gateway_enabled,
                    classifier = self.classifier.name(),
                    "oauth2 handler chain built"
                );
                Ok(chain)
            })
            .await
    }

    /// Classify the request. The returned request carries its original body.
    pub async fn admit(&self, req: Request<Body>) -> Result<(Admission, Request<Body>), GateError> {
        if !self.config.gateway_enabled {
            return Ok((Admission::Gated, req));
        }

        let (req, credential) = credential::extract(req, self.config.body_limit_bytes).await?;
        let Some(credential) = credential else {
            return Ok((Admission::Bypass(BypassReason::NoCredential), req));
        };

        let kind = match self.classifier.classify(&credential).await {
            Ok(kind) => kind,
            Err(err) => {
                // cannot tell the namespace apart: let the chain decide
                tracing::warn!(
                    error = ?err,
                    classifier = self.classifier.name(),
                    "credential classification failed"
                );
                CredentialKind::OAuth
            }
        };

        let admission = match kind {
            CredentialKind::OAuth => Admission::Gated,
            CredentialKind::Foreign => Admission::Bypass(BypassReason::ForeignCredential),
        };

        Ok((admission, req))
    }

    /// Gate one request. `next` is the downstream continuation and runs at
    /// most once: on bypass, or after the chain forwarded.
    pub async fn run<F, Fut>(&self, req: Request<Body>, next: F) -> Result<Response, GateError>
    where
        F: FnOnce(Request<Body>) -> Fut,
        Fut: Future<Output = Response>,
    {
        let chain = match self.chain().await {
            Ok(chain) => chain,
            Err(err) => {
                tracing::warn!(error = %err, "oauth2 request denied");
                return Err(err);
            }
        };

        let (admission, req) = self.admit(req).await?;
        tracing::debug!(?admission, "oauth2 admission");

        if let Admission::Bypass(_) = admission {
            return Ok(next(req).await);
        }

        match chain.run(req).await {
            Ok(Step::Forward(mut req)) => {
                if self.config.gateway_enabled {
                    clear_scopes(&mut req);
                }
                Ok(next(req).await)
            }
            Ok(Step::Terminate(res)) => Ok(res),
            Err(err) => {
                tracing::warn!(error = ?err, "oauth2 authentication failed");
                Err(err.into())
            }
        }
    }
}

/// OAuth scopes were already enforced by the chain; downstream authorization
/// must not evaluate them a second time.
fn clear_scopes(req: &mut Request<Body>) {
    match req.extensions_mut().get_mut::<ValidatedIdentity>() {
        Some(identity) => identity.clear_scopes(),
        None => tracing::debug!("chain forwarded without attaching an identity"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::oauth2::chain::{AuthHandler, ChainError};
    use crate::services::oauth2::classifier::ClassifierError;
    use crate::services::oauth2::credential::Credential;
    use crate::services::cache::CacheError;
    use crate::services::oauth2::options::GateOptions;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::task::JoinSet;

    #[derive(Clone, Copy)]
    enum Outcome {
        Authenticate,
        Reject,
        Redirect,
    }

    struct TestHandler {
        calls: Arc<AtomicUsize>,
        outcome: Outcome,
    }

    #[async_trait]
    impl AuthHandler for TestHandler {
        fn name(&self) -> &'static str {
            "test"
        }

        async fn handle(&self, mut req: Request<Body>) -> Result<Step, ChainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                Outcome::Authenticate => {
                    req.extensions_mut()
                        .insert(ValidatedIdentity::new("alice").with_scopes(["read", "write"]));
                    Ok(Step::Forward(req))
                }
                Outcome::Reject => Err(ChainError::InvalidToken),
                Outcome::Redirect => Ok(Step::Terminate(StatusCode::FOUND.into_response())),
            }
        }
    }

    /// Factory that counts both builds and handler invocations.
    #[derive(Clone)]
    struct Counters {
        builds: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
    }

    impl Counters {
        fn new() -> Self {
            Self {
                builds: Arc::new(AtomicUsize::new(0)),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn factory(&self, outcome: Outcome) -> Arc<dyn ChainFactory> {
            let builds = self.builds.clone();
            let calls = self.calls.clone();
            Arc::new(move |_: &GateOptions| -> Vec<Arc<dyn AuthHandler>> {
                builds.fetch_add(1, Ordering::SeqCst);
                vec![Arc::new(TestHandler {
                    calls: calls.clone(),
                    outcome,
                }) as Arc<dyn AuthHandler>]
            })
        }

        fn builds(&self) -> usize {
            self.builds.load(Ordering::SeqCst)
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    /// Downstream continuation that records what it saw.
    #[derive(Clone, Default)]
    struct Downstream {
        calls: Arc<AtomicUsize>,
        seen: Arc<Mutex<Option<ValidatedIdentity>>>,
    }

    impl Downstream {
        fn next(&self) -> impl FnOnce(Request<Body>) -> std::future::Ready<Response> + use<> {
            let this = self.clone();
            move |req| {
                this.calls.fetch_add(1, Ordering::SeqCst);
                *this.seen.lock().unwrap() = req.extensions().get::<ValidatedIdentity>().cloned();
                std::future::ready(StatusCode::OK.into_response())
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn seen(&self) -> Option<ValidatedIdentity> {
            self.seen.lock().unwrap().clone()
        }
    }

    fn with_token(token: &str) -> Request<Body> {
        Request::builder()
            .uri(format!("/resource?access_token={token}"))
            .body(Body::empty())
            .unwrap()
    }

    fn without_token() -> Request<Body> {
        Request::builder().uri("/resource").body(Body::empty()).unwrap()
    }

    fn gate(enabled: bool, counters: &Counters, outcome: Outcome) -> OAuth2Gate {
        OAuth2Gate::new(GateConfig::gated(enabled), Some(counters.factory(outcome)))
    }

    #[tokio::test]
    async fn disabled_gateway_runs_chain_for_every_request() {
        let counters = Counters::new();
        let gate = gate(false, &counters, Outcome::Authenticate);
        let downstream = Downstream::default();

        let requests = [
            without_token(),
            with_token(&"a".repeat(10)),
            with_token(&"a".repeat(64)),
        ];
        for req in requests {
            let res = gate.run(req, downstream.next()).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }

        assert_eq!(counters.calls(), 3);
        assert_eq!(downstream.calls(), 3);
        assert_eq!(counters.builds(), 1);
    }

    #[tokio::test]
    async fn disabled_gateway_leaves_scopes_alone() {
        let counters = Counters::new();
        let gate = gate(false, &counters, Outcome::Authenticate);
        let downstream = Downstream::default();

        gate.run(with_token("abc"), downstream.next()).await.unwrap();

        let identity = downstream.seen().unwrap();
        assert_eq!(
            identity.scopes,
            Some(vec!["read".to_owned(), "write".to_owned()])
        );
    }

    #[tokio::test]
    async fn missing_credential_bypasses_chain() {
        let counters = Counters::new();
        let gate = gate(true, &counters, Outcome::Reject);
        let downstream = Downstream::default();

        let res = gate.run(without_token(), downstream.next()).await.unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(counters.calls(), 0);
        assert_eq!(downstream.calls(), 1);
        assert_eq!(downstream.seen(), None);
    }

    #[tokio::test]
    async fn short_credentials_are_gated_once() {
        for len in [1, 10, 32] {
            let counters = Counters::new();
            let gate = gate(true, &counters, Outcome::Authenticate);
            let downstream = Downstream::default();

            gate.run(with_token(&"a".repeat(len)), downstream.next())
                .await
                .unwrap();

            assert_eq!(counters.calls(), 1, "len {len}");
            assert_eq!(downstream.calls(), 1, "len {len}");
        }
    }

    #[tokio::test]
    async fn long_credentials_never_reach_chain() {
        for len in [33, 40, 64] {
            let counters = Counters::new();
            // a rejecting chain proves the chain was not consulted
            let gate = gate(true, &counters, Outcome::Reject);
            let downstream = Downstream::default();

            let res = gate
                .run(with_token(&"a".repeat(len)), downstream.next())
                .await
                .unwrap();

            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(counters.calls(), 0, "len {len}");
            assert_eq!(downstream.calls(), 1, "len {len}");
            assert_eq!(downstream.seen(), None);
        }
    }

    #[tokio::test]
    async fn gated_success_clears_scopes_before_downstream() {
        let counters = Counters::new();
        let gate = gate(true, &counters, Outcome::Authenticate);
        let downstream = Downstream::default();

        gate.run(with_token(&"a".repeat(10)), downstream.next())
            .await
            .unwrap();

        let identity = downstream.seen().unwrap();
        assert_eq!(identity.subject, "alice");
        assert_eq!(identity.scopes, None);
    }

    #[tokio::test]
    async fn chain_error_is_passed_through_and_downstream_skipped() {
        let counters = Counters::new();
        let gate = gate(true, &counters, Outcome::Reject);
        let downstream = Downstream::default();

        let err = gate
            .run(with_token("short"), downstream.next())
            .await
            .unwrap_err();

        assert!(matches!(err, GateError::Chain(ChainError::InvalidToken)));
        assert_eq!(counters.calls(), 1);
        assert_eq!(downstream.calls(), 0);
    }

    #[tokio::test]
    async fn terminating_chain_answers_without_downstream() {
        let counters = Counters::new();
        let gate = gate(false, &counters, Outcome::Redirect);
        let downstream = Downstream::default();

        let res = gate.run(with_token("short"), downstream.next()).await.unwrap();

        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(downstream.calls(), 0);
    }

    #[tokio::test]
    async fn unconfigured_gate_denies_everything() {
        let downstream = Downstream::default();

        for enabled in [false, true] {
            let gate = OAuth2Gate::new(GateConfig::gated(enabled), None);

            // even requests that would otherwise bypass are refused
            for req in [without_token(), with_token(&"a".repeat(64))] {
                let err = gate.run(req, downstream.next()).await.unwrap_err();
                assert!(matches!(err, GateError::Configuration));
            }
            assert!(!gate.is_built());
        }

        assert_eq!(downstream.calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_use_builds_once() {
        let counters = Counters::new();
        let gate = Arc::new(gate(true, &counters, Outcome::Authenticate));
        let downstream = Downstream::default();

        let mut tasks = JoinSet::new();
        for i in 0..32 {
            let gate = gate.clone();
            let next = downstream.next();
            tasks.spawn(async move {
                let req = if i % 2 == 0 {
                    with_token("short")
                } else {
                    with_token(&"a".repeat(64))
                };
                gate.run(req, next).await.map(|res| res.status())
            });
        }

        while let Some(joined) = tasks.join_next().await {
            assert_eq!(joined.unwrap().unwrap(), StatusCode::OK);
        }

        assert_eq!(counters.builds(), 1);
        assert_eq!(counters.calls(), 16);
        assert_eq!(downstream.calls(), 32);
        assert!(gate.is_built());
    }

    #[tokio::test]
    async fn reset_rebuilds_on_next_request() {
        let counters = Counters::new();
        let mut gate = gate(true, &counters, Outcome::Authenticate);

        gate.chain().await.unwrap();
        gate.chain().await.unwrap();
        assert_eq!(counters.builds(), 1);

        gate.reset();
        assert!(!gate.is_built());

        gate.run(without_token(), Downstream::default().next())
            .await
            .unwrap();
        assert_eq!(counters.builds(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn identical_gates_make_identical_decisions() {
        let first = Arc::new(gate(true, &Counters::new(), Outcome::Authenticate));
        let second = Arc::new(gate(true, &Counters::new(), Outcome::Authenticate));
        let lengths = [None, Some(10), Some(32), Some(33), Some(64)];

        let mut tasks = JoinSet::new();
        for _ in 0..8 {
            for (idx, len) in lengths.iter().copied().enumerate() {
                for (which, gate) in [(0, &first), (1, &second)] {
                    let gate = Arc::clone(gate);
                    tasks.spawn(async move {
                        let req = match len {
                            Some(n) => with_token(&"a".repeat(n)),
                            None => without_token(),
                        };
                        let (admission, _) = gate.admit(req).await?;
                        Ok::<_, GateError>((idx, which, admission))
                    });
                }
            }
        }

        let mut decisions: Vec<[Vec<Admission>; 2]> = vec![Default::default(); lengths.len()];
        while let Some(joined) = tasks.join_next().await {
            let (idx, which, admission) = joined.unwrap().unwrap();
            decisions[idx][which].push(admission);
        }

        let expected = [
            Admission::Bypass(BypassReason::NoCredential),
            Admission::Gated,
            Admission::Gated,
            Admission::Bypass(BypassReason::ForeignCredential),
            Admission::Bypass(BypassReason::ForeignCredential),
        ];
        for ((len, [a, b]), want) in lengths.iter().zip(&decisions).zip(expected) {
            assert_eq!(a.len(), 8, "length {len:?}");
            assert_eq!(a, b, "length {len:?}");
            assert!(a.iter().all(|d| *d == want), "length {len:?}: {a:?}");
        }
        assert!(first.is_built() && second.is_built());
    }

    struct BrokenClassifier;

    #[async_trait]
    impl CredentialClassifier for BrokenClassifier {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn classify(&self, _: &Credential) -> Result<CredentialKind, ClassifierError> {
            Err(CacheError::BackendConnection("down".into()).into())
        }
    }

    #[tokio::test]
    async fn classifier_failure_falls_back_to_the_chain() {
        let counters = Counters::new();
        let gate = gate(true, &counters, Outcome::Authenticate)
            .with_classifier(Arc::new(BrokenClassifier));

        let (admission, _) = gate.admit(with_token(&"a".repeat(64))).await.unwrap();

        assert_eq!(admission, Admission::Gated);
    }

    #[tokio::test]
    async fn custom_heuristic_moves_the_threshold() {
        let counters = Counters::new();
        let gate = OAuth2Gate::new(
            GateConfig::gated(true).with_options(GateOptions::new()),
            Some(counters.factory(Outcome::Authenticate)),
        )
        .with_classifier(Arc::new(LengthHeuristic {
            bypass_threshold: 64,
            ..LengthHeuristic::default()
        }));

        let (admission, _) = gate.admit(with_token(&"a".repeat(64))).await.unwrap();
        assert_eq!(admission, Admission::Gated);
    }
}
