//! Routing across several HSS backends
//!
//! Each subscriber is pinned to one backend by a routing function over its
//! IMSI. Administrative calls fan out to every backend.

use std::sync::Arc;

use crate::proxy::{ServiceFuture, SwxProxyService};
use crate::types::{
    AuthenticationAnswer, AuthenticationRequest, DisableMessage, HealthStatus, RegistrationAnswer,
    RegistrationRequest, SwxProxyError, SwxProxyResult,
};

/// Maps a subscriber id to a backend index given the backend count
pub type RouteFn = dyn Fn(&str, usize) -> SwxProxyResult<usize> + Send + Sync;

/// Default route: numeric IMSI modulo backend count
pub fn imsi_modulo(user_name: &str, backends: usize) -> SwxProxyResult<usize> {
    if backends == 0 {
        return Err(SwxProxyError::Internal("no backends configured".into()));
    }
    let imsi: u64 = user_name.parse().map_err(|_| {
        SwxProxyError::InvalidArgument(format!("cannot route non-numeric user name '{}'", user_name))
    })?;
    Ok((imsi % backends as u64) as usize)
}

/// Dispatches to one of several proxies
pub struct SwxProxyMux {
    proxies: Vec<Arc<dyn SwxProxyService>>,
    route: Box<RouteFn>,
}

impl SwxProxyMux {
    pub fn new(proxies: Vec<Arc<dyn SwxProxyService>>) -> Self {
        Self::with_route(proxies, imsi_modulo)
    }

    pub fn with_route<F>(proxies: Vec<Arc<dyn SwxProxyService>>, route: F) -> Self
    where
        F: Fn(&str, usize) -> SwxProxyResult<usize> + Send + Sync + 'static,
    {
        Self {
            proxies,
            route: Box::new(route),
        }
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    fn select(&self, user_name: &str) -> SwxProxyResult<&Arc<dyn SwxProxyService>> {
        let index = (self.route)(user_name, self.proxies.len())?;
        self.proxies.get(index).ok_or_else(|| {
            SwxProxyError::Internal(format!(
                "route for '{}' gave index {} of {} backends",
                user_name,
                index,
                self.proxies.len()
            ))
        })
    }
}

impl SwxProxyService for SwxProxyMux {
    fn authenticate(&self, request: AuthenticationRequest) -> ServiceFuture<'_, AuthenticationAnswer> {
        Box::pin(async move { self.select(&request.user_name)?.authenticate(request).await })
    }

    fn register(&self, request: RegistrationRequest) -> ServiceFuture<'_, RegistrationAnswer> {
        Box::pin(async move { self.select(&request.user_name)?.register(request).await })
    }

    fn deregister(&self, request: RegistrationRequest) -> ServiceFuture<'_, RegistrationAnswer> {
        Box::pin(async move { self.select(&request.user_name)?.deregister(request).await })
    }

    fn disable(&self, request: DisableMessage) -> ServiceFuture<'_, ()> {
        Box::pin(async move {
            for (i, proxy) in self.proxies.iter().enumerate() {
                if let Err(e) = proxy.disable(request).await {
                    log::warn!("Disable of backend {} failed: {}", i, e);
                }
            }
            Ok(())
        })
    }

    fn enable(&self) -> ServiceFuture<'_, ()> {
        Box::pin(async move {
            let mut failures = Vec::new();
            for (i, proxy) in self.proxies.iter().enumerate() {
                if let Err(e) = proxy.enable().await {
                    failures.push(format!("backend {}: {}", i, e));
                }
            }
            if failures.is_empty() {
                Ok(())
            } else {
                Err(SwxProxyError::Unavailable(failures.join("; ")))
            }
        })
    }

    fn get_health_status(&self) -> ServiceFuture<'_, HealthStatus> {
        Box::pin(async move {
            for (i, proxy) in self.proxies.iter().enumerate() {
                let status = proxy.get_health_status().await?;
                if !status.is_healthy() {
                    return Ok(HealthStatus::unhealthy(format!(
                        "backend {}: {}",
                        i, status.health_message
                    )));
                }
            }
            Ok(HealthStatus::healthy(format!("all {} backends healthy", self.proxies.len())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Backend stub recording which calls reached it
    #[derive(Default)]
    struct Stub {
        calls: Mutex<Vec<String>>,
        disabled: AtomicU32,
        fail_enable: bool,
        unhealthy: bool,
    }

    impl Stub {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl SwxProxyService for Stub {
        fn authenticate(&self, request: AuthenticationRequest) -> ServiceFuture<'_, AuthenticationAnswer> {
            self.calls.lock().unwrap().push(format!("auth {}", request.user_name));
            Box::pin(async move {
                Ok(AuthenticationAnswer {
                    user_name: request.user_name,
                    ..Default::default()
                })
            })
        }

        fn register(&self, request: RegistrationRequest) -> ServiceFuture<'_, RegistrationAnswer> {
            self.calls.lock().unwrap().push(format!("register {}", request.user_name));
            Box::pin(async { Ok(RegistrationAnswer::default()) })
        }

        fn deregister(&self, request: RegistrationRequest) -> ServiceFuture<'_, RegistrationAnswer> {
            self.calls.lock().unwrap().push(format!("deregister {}", request.user_name));
            Box::pin(async { Ok(RegistrationAnswer::default()) })
        }

        fn disable(&self, _request: DisableMessage) -> ServiceFuture<'_, ()> {
            self.disabled.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(SwxProxyError::Internal("ignored".into())) })
        }

        fn enable(&self) -> ServiceFuture<'_, ()> {
            let fail = self.fail_enable;
            Box::pin(async move {
                if fail {
                    Err(SwxProxyError::Unavailable("connection refused".into()))
                } else {
                    Ok(())
                }
            })
        }

        fn get_health_status(&self) -> ServiceFuture<'_, HealthStatus> {
            let unhealthy = self.unhealthy;
            Box::pin(async move {
                Ok(if unhealthy {
                    HealthStatus::unhealthy("timeouts")
                } else {
                    HealthStatus::healthy("ok")
                })
            })
        }
    }

    fn mux(stubs: &[Arc<Stub>]) -> SwxProxyMux {
        SwxProxyMux::new(stubs.iter().map(|s| s.clone() as Arc<dyn SwxProxyService>).collect())
    }

    #[test]
    fn test_imsi_modulo() {
        assert_eq!(imsi_modulo("001010000000001", 2).unwrap(), 1);
        assert_eq!(imsi_modulo("001010000000002", 2).unwrap(), 0);
        assert_eq!(imsi_modulo("7", 3).unwrap(), 1);
        assert_eq!(imsi_modulo("abc", 2).unwrap_err().code(), StatusCode::InvalidArgument);
        assert_eq!(imsi_modulo("1", 0).unwrap_err().code(), StatusCode::Internal);
    }

    #[tokio::test]
    async fn test_requests_follow_route() {
        let stubs = [Arc::new(Stub::default()), Arc::new(Stub::default())];
        let mux = mux(&stubs);

        mux.authenticate(AuthenticationRequest {
            user_name: "001010000000001".into(),
            sip_num_auth_vectors: 1,
            ..Default::default()
        })
        .await
        .unwrap();
        mux.register(RegistrationRequest {
            user_name: "001010000000002".into(),
            session_id: None,
        })
        .await
        .unwrap();
        mux.deregister(RegistrationRequest {
            user_name: "001010000000003".into(),
            session_id: None,
        })
        .await
        .unwrap();

        assert_eq!(stubs[0].calls(), vec!["register 001010000000002"]);
        assert_eq!(
            stubs[1].calls(),
            vec!["auth 001010000000001", "deregister 001010000000003"]
        );
    }

    #[tokio::test]
    async fn test_out_of_range_route_fails() {
        let stubs = [Arc::new(Stub::default())];
        let mux = SwxProxyMux::with_route(vec![stubs[0].clone() as Arc<dyn SwxProxyService>], |_, _| Ok(4));

        let err = mux
            .register(RegistrationRequest {
                user_name: "1".into(),
                session_id: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::Internal);
        assert!(stubs[0].calls().is_empty());
    }

    #[tokio::test]
    async fn test_disable_reaches_all_and_succeeds() {
        let stubs = [Arc::new(Stub::default()), Arc::new(Stub::default())];
        let mux = mux(&stubs);

        mux.disable(DisableMessage { disable_period_secs: 5 }).await.unwrap();
        assert!(stubs.iter().all(|s| s.disabled.load(Ordering::SeqCst) == 1));
    }

    #[tokio::test]
    async fn test_enable_aggregates_failures() {
        let stubs = [
            Arc::new(Stub::default()),
            Arc::new(Stub {
                fail_enable: true,
                ..Default::default()
            }),
            Arc::new(Stub {
                fail_enable: true,
                ..Default::default()
            }),
        ];
        let err = mux(&stubs).enable().await.unwrap_err();

        assert_eq!(err.code(), StatusCode::Unavailable);
        assert!(!err.message().contains("backend 0"));
        assert!(err.message().contains("backend 1"));
        assert!(err.message().contains("backend 2"));
    }

    #[tokio::test]
    async fn test_first_unhealthy_backend_wins() {
        let healthy = [Arc::new(Stub::default()), Arc::new(Stub::default())];
        assert!(mux(&healthy).get_health_status().await.unwrap().is_healthy());

        let mixed = [
            Arc::new(Stub::default()),
            Arc::new(Stub {
                unhealthy: true,
                ..Default::default()
            }),
        ];
        let status = mux(&mixed).get_health_status().await.unwrap();
        assert!(!status.is_healthy());
        assert!(status.health_message.contains("backend 1"));
    }
}
