//! HLR subscriber routing
//!
//! Subscribers of PLMNs still served by an HLR never reach the HSS; their
//! authentication goes to an `HlrRelay` instead.

use std::sync::Arc;

use crate::proxy::{validate_user_name, ServiceFuture, SwxProxyService};
use crate::types::{
    AuthenticationAnswer, AuthenticationRequest, DisableMessage, HealthStatus, RegistrationAnswer,
    RegistrationRequest, SwxProxyError,
};

/// Authentication source for HLR subscribers
pub trait HlrRelay: Send + Sync {
    fn authenticate(&self, request: AuthenticationRequest) -> ServiceFuture<'_, AuthenticationAnswer>;
}

/// Sends HLR subscribers to a relay and everyone else to the SWx service
pub struct HlrRouter {
    inner: Arc<dyn SwxProxyService>,
    plmn_ids: Vec<String>,
    relay: Option<Arc<dyn HlrRelay>>,
}

impl HlrRouter {
    pub fn new(inner: Arc<dyn SwxProxyService>, plmn_ids: Vec<String>, relay: Option<Arc<dyn HlrRelay>>) -> Self {
        Self { inner, plmn_ids, relay }
    }

    pub fn is_hlr_subscriber(&self, user_name: &str) -> bool {
        self.plmn_ids.iter().any(|plmn| user_name.starts_with(plmn.as_str()))
    }

    fn hlr_session_id(user_name: &str) -> String {
        format!("hlr;{};{}", user_name, uuid::Uuid::new_v4().simple())
    }

    /// HLR subscribers hold no SWx registration, so only a session id is issued
    fn registration(&self, request: RegistrationRequest) -> ServiceFuture<'_, RegistrationAnswer> {
        Box::pin(async move {
            validate_user_name(&request.user_name)?;
            log::debug!("[{}] HLR subscriber, skipping SAR", request.user_name);
            let session_id = request
                .session_id
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| Self::hlr_session_id(&request.user_name));
            Ok(RegistrationAnswer { session_id })
        })
    }
}

impl SwxProxyService for HlrRouter {
    fn authenticate(&self, request: AuthenticationRequest) -> ServiceFuture<'_, AuthenticationAnswer> {
        if !self.is_hlr_subscriber(&request.user_name) {
            return self.inner.authenticate(request);
        }
        match &self.relay {
            Some(relay) => {
                log::debug!("[{}] relaying to HLR", request.user_name);
                relay.authenticate(request)
            }
            None => Box::pin(async move {
                Err(SwxProxyError::Unavailable(format!(
                    "{} belongs to an HLR PLMN and no HLR relay is configured",
                    request.user_name
                )))
            }),
        }
    }

    fn register(&self, request: RegistrationRequest) -> ServiceFuture<'_, RegistrationAnswer> {
        if self.is_hlr_subscriber(&request.user_name) {
            return self.registration(request);
        }
        self.inner.register(request)
    }

    fn deregister(&self, request: RegistrationRequest) -> ServiceFuture<'_, RegistrationAnswer> {
        if self.is_hlr_subscriber(&request.user_name) {
            return self.registration(request);
        }
        self.inner.deregister(request)
    }

    fn disable(&self, request: DisableMessage) -> ServiceFuture<'_, ()> {
        self.inner.disable(request)
    }

    fn enable(&self) -> ServiceFuture<'_, ()> {
        self.inner.enable()
    }

    fn get_health_status(&self) -> ServiceFuture<'_, HealthStatus> {
        self.inner.get_health_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct Counting {
        calls: AtomicU32,
    }

    impl SwxProxyService for Counting {
        fn authenticate(&self, request: AuthenticationRequest) -> ServiceFuture<'_, AuthenticationAnswer> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                Ok(AuthenticationAnswer {
                    user_name: request.user_name,
                    session_id: "swx".into(),
                    ..Default::default()
                })
            })
        }

        fn register(&self, _request: RegistrationRequest) -> ServiceFuture<'_, RegistrationAnswer> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {
                Ok(RegistrationAnswer {
                    session_id: "swx".into(),
                })
            })
        }

        fn deregister(&self, request: RegistrationRequest) -> ServiceFuture<'_, RegistrationAnswer> {
            self.register(request)
        }

        fn disable(&self, _request: DisableMessage) -> ServiceFuture<'_, ()> {
            Box::pin(async { Ok(()) })
        }

        fn enable(&self) -> ServiceFuture<'_, ()> {
            Box::pin(async { Ok(()) })
        }

        fn get_health_status(&self) -> ServiceFuture<'_, HealthStatus> {
            Box::pin(async { Ok(HealthStatus::healthy("ok")) })
        }
    }

    struct FixedRelay;

    impl HlrRelay for FixedRelay {
        fn authenticate(&self, request: AuthenticationRequest) -> ServiceFuture<'_, AuthenticationAnswer> {
            Box::pin(async move {
                Ok(AuthenticationAnswer {
                    user_name: request.user_name,
                    session_id: "hlr".into(),
                    ..Default::default()
                })
            })
        }
    }

    fn auth(user_name: &str) -> AuthenticationRequest {
        AuthenticationRequest {
            user_name: user_name.into(),
            sip_num_auth_vectors: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_hlr_subscribers_go_to_relay() {
        let inner = Arc::new(Counting::default());
        let router = HlrRouter::new(inner.clone(), vec!["00102".into()], Some(Arc::new(FixedRelay)));

        let answer = router.authenticate(auth("001020000000001")).await.unwrap();
        assert_eq!(answer.session_id, "hlr");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 0);

        let answer = router.authenticate(auth("001010000000001")).await.unwrap();
        assert_eq!(answer.session_id, "swx");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_relay_is_unavailable() {
        let router = HlrRouter::new(Arc::new(Counting::default()), vec!["00102".into()], None);
        let err = router.authenticate(auth("001020000000001")).await.unwrap_err();
        assert_eq!(err.code(), StatusCode::Unavailable);
    }

    #[tokio::test]
    async fn test_hlr_registration_skips_hss() {
        let inner = Arc::new(Counting::default());
        let router = HlrRouter::new(inner.clone(), vec!["00102".into()], None);

        let answer = router
            .register(RegistrationRequest {
                user_name: "001020000000001".into(),
                session_id: Some("given".into()),
            })
            .await
            .unwrap();
        assert_eq!(answer.session_id, "given");

        let answer = router
            .deregister(RegistrationRequest {
                user_name: "001020000000001".into(),
                session_id: None,
            })
            .await
            .unwrap();
        assert!(answer.session_id.starts_with("hlr;001020000000001;"));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 0);
    }
}
