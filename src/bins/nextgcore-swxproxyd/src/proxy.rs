//! SWx proxy towards a single HSS
//!
//! Turns authentication and registration calls into MAR/SAR round trips,
//! serving and refilling the shared vector cache along the way.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use ogs_diameter::swx::{
    self, experimental_result, MultimediaAuthAnswer, Non3GppIpAccess, Non3gppUserData, ServerAssignmentAnswer,
    ServerAssignmentType, SwxEndpoint, SwxResult, SWX_APPLICATION_ID,
};
use ogs_diameter::{
    ConnectionManager, DiameterClientConfig, DiameterMessage, DiameterServerConfig, LocalPeer, RequestTracker,
};

use crate::cache::VectorCache;
use crate::config::SwxProxyConfig;
use crate::handler::SwxMessageHandler;
use crate::health::HealthTracker;
use crate::metrics::{MetricsRecorder, SwxEvent};
use crate::types::{
    AuthenticationAnswer, AuthenticationRequest, DisableMessage, HealthStatus, RegistrationAnswer,
    RegistrationRequest, SipAuthVector, SwxProxyError, SwxProxyResult, UserProfile,
};

/// Most vectors returned by one Authenticate call
pub const MAX_RETURNED_VECTORS: u32 = 5;

/// Least vectors asked of the HSS while caching is enabled
pub const MIN_REQUESTED_VECTORS: u32 = 5;

/// Longest accepted IMSI
const MAX_USER_NAME_LEN: usize = 15;

/// Boxed future returned by service operations
pub type ServiceFuture<'a, T> = Pin<Box<dyn Future<Output = SwxProxyResult<T>> + Send + 'a>>;

/// Operations exposed by the proxy
pub trait SwxProxyService: Send + Sync {
    fn authenticate(&self, request: AuthenticationRequest) -> ServiceFuture<'_, AuthenticationAnswer>;

    fn register(&self, request: RegistrationRequest) -> ServiceFuture<'_, RegistrationAnswer>;

    fn deregister(&self, request: RegistrationRequest) -> ServiceFuture<'_, RegistrationAnswer>;

    /// Drop backend connections and cached vectors for a period
    fn disable(&self, request: DisableMessage) -> ServiceFuture<'_, ()>;

    fn enable(&self) -> ServiceFuture<'_, ()>;

    fn get_health_status(&self) -> ServiceFuture<'_, HealthStatus>;
}

/// Behaviour switches shared by every backend
#[derive(Debug, Clone, PartialEq)]
pub struct SwxProxyOptions {
    pub verify_authorization: bool,
    pub register_on_auth: bool,
    pub derive_unregister_realm: bool,
    pub request_timeout: Duration,
    pub minimum_request_threshold: u32,
    pub request_failure_threshold: f32,
}

impl Default for SwxProxyOptions {
    fn default() -> Self {
        Self::from(&SwxProxyConfig::default())
    }
}

impl From<&SwxProxyConfig> for SwxProxyOptions {
    fn from(config: &SwxProxyConfig) -> Self {
        Self {
            verify_authorization: config.verify_authorization,
            register_on_auth: config.register_on_auth,
            derive_unregister_realm: config.derive_unregister_realm,
            request_timeout: config.request_timeout(),
            minimum_request_threshold: config.health.minimum_request_threshold,
            request_failure_threshold: config.health.request_failure_threshold,
        }
    }
}

/// Reject anything but 1 to 15 decimal digits
pub fn validate_user_name(user_name: &str) -> SwxProxyResult<()> {
    if user_name.is_empty() {
        return Err(SwxProxyError::InvalidArgument("user name is required".into()));
    }
    if user_name.len() > MAX_USER_NAME_LEN {
        return Err(SwxProxyError::InvalidArgument(format!(
            "user name '{}' is longer than {} digits",
            user_name, MAX_USER_NAME_LEN
        )));
    }
    if !user_name.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SwxProxyError::InvalidArgument(format!(
            "user name '{}' is not numeric",
            user_name
        )));
    }
    Ok(())
}

/// Realm part of a Diameter identity: everything after the first dot
fn realm_of(identity: &str) -> Option<&str> {
    identity.split_once('.').map(|(_, realm)| realm).filter(|r| !r.is_empty())
}

fn result_error(command: &str, user_name: &str, result: SwxResult) -> SwxProxyError {
    match result {
        SwxResult::ExperimentalFailure(experimental_result::USER_UNKNOWN) => {
            SwxProxyError::NotFound(format!("{} for {}: user unknown", command, user_name))
        }
        SwxResult::ExperimentalFailure(experimental_result::USER_NO_NON_3GPP_SUBSCRIPTION) => {
            SwxProxyError::PermissionDenied(format!(
                "{} for {}: user has no non-3GPP subscription",
                command, user_name
            ))
        }
        other => SwxProxyError::Internal(format!(
            "{} for {} failed with result code {}",
            command,
            user_name,
            other.code()
        )),
    }
}

impl From<&Non3gppUserData> for UserProfile {
    fn from(data: &Non3gppUserData) -> Self {
        Self {
            msisdn: data.msisdn.clone().unwrap_or_default(),
            apns: data.apns.clone(),
            context_identifier: data.context_identifier,
        }
    }
}

/// Proxy bound to one HSS connection
pub struct SwxProxy {
    endpoint: SwxEndpoint,
    retransmits: u32,
    options: SwxProxyOptions,
    connection: ConnectionManager,
    tracker: Arc<RequestTracker>,
    cache: Option<Arc<VectorCache>>,
    metrics: Arc<dyn MetricsRecorder>,
    health: HealthTracker,
}

impl SwxProxy {
    pub fn new(
        options: SwxProxyOptions,
        client: DiameterClientConfig,
        server: DiameterServerConfig,
        cache: Option<Arc<VectorCache>>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        let tracker = Arc::new(RequestTracker::new());
        let handler = Arc::new(SwxMessageHandler::new(
            client.host.clone(),
            client.realm.clone(),
            tracker.clone(),
            cache.clone(),
            metrics.clone(),
        ));
        let local = Arc::new(
            LocalPeer::new(client.host.clone(), client.realm.clone(), client.product_name.clone())
                .with_application(SWX_APPLICATION_ID),
        );
        let endpoint = SwxEndpoint {
            origin_host: client.host.clone(),
            origin_realm: client.realm.clone(),
            destination_host: server.dest_host.clone(),
            destination_realm: server.dest_realm.clone(),
        };

        Self {
            endpoint,
            retransmits: client.retransmits,
            health: HealthTracker::new(options.minimum_request_threshold, options.request_failure_threshold),
            options,
            connection: ConnectionManager::new(local, client, server, handler),
            tracker,
            cache,
            metrics,
        }
    }

    pub fn server(&self) -> &DiameterServerConfig {
        self.connection.server()
    }

    fn new_session_id(&self) -> String {
        swx::generate_session_id(&self.endpoint.origin_host, "swx")
    }

    /// Send `request` and wait for the answer carrying `session_id`
    async fn round_trip(
        &self,
        session_id: &str,
        request: DiameterMessage,
        sent: SwxEvent,
    ) -> SwxProxyResult<DiameterMessage> {
        let mut answer = self.tracker.register(session_id);
        self.metrics.record(sent);
        log::debug!(
            "[{}] Tx cmd {} session {}",
            self.endpoint.origin_host,
            request.header.command_code,
            session_id
        );

        if let Err(e) = self.connection.send_request(&request, self.retransmits).await {
            self.tracker.cancel(&answer);
            self.metrics.record(SwxEvent::SendFailure);
            log::error!("Failed to send request for session {}: {}", session_id, e);
            return Err(SwxProxyError::Unavailable(format!(
                "sending to {} failed: {}",
                self.connection.server().address,
                e
            )));
        }

        let outcome = tokio::time::timeout(self.options.request_timeout, &mut answer).await;
        match outcome {
            Ok(Ok(msg)) => {
                log::debug!("Rx cmd {} session {}", msg.header.command_code, session_id);
                Ok(msg)
            }
            // A concurrent call with the same Session-Id owns the entry now
            Ok(Err(_)) => Err(SwxProxyError::Internal(format!(
                "waiter for session {} was replaced",
                session_id
            ))),
            Err(_) => {
                self.tracker.cancel(&answer);
                self.metrics.record(SwxEvent::Timeout);
                log::error!(
                    "No answer for session {} within {:?}",
                    session_id,
                    self.options.request_timeout
                );
                Err(SwxProxyError::DeadlineExceeded(format!(
                    "no answer from {} within {:?}",
                    self.connection.server().address,
                    self.options.request_timeout
                )))
            }
        }
    }

    async fn send_mar(
        &self,
        request: &AuthenticationRequest,
        num_auth_items: u32,
    ) -> SwxProxyResult<MultimediaAuthAnswer> {
        let session_id = self.new_session_id();
        let mar = swx::create_mar(
            &session_id,
            &self.endpoint,
            &request.user_name,
            num_auth_items,
            request.authentication_scheme.as_str(),
            Some(request.resync_info.as_slice()),
        );

        let answer = self.round_trip(&session_id, mar, SwxEvent::MarSent).await?;
        MultimediaAuthAnswer::parse(&answer).map_err(|e| {
            self.metrics.record(SwxEvent::UnparseableMessage);
            log::error!("Unparseable MAA for session {}: {}", session_id, e);
            SwxProxyError::Internal(format!("unparseable MAA: {}", e))
        })
    }

    async fn send_sar(
        &self,
        session_id: &str,
        endpoint: &SwxEndpoint,
        user_name: &str,
        assignment_type: ServerAssignmentType,
    ) -> SwxProxyResult<ServerAssignmentAnswer> {
        let sar = swx::create_sar(session_id, endpoint, user_name, assignment_type);

        let answer = self.round_trip(session_id, sar, SwxEvent::SarSent).await?;
        ServerAssignmentAnswer::parse(&answer).map_err(|e| {
            self.metrics.record(SwxEvent::UnparseableMessage);
            log::error!("Unparseable SAA for session {}: {}", session_id, e);
            SwxProxyError::Internal(format!("unparseable SAA: {}", e))
        })
    }

    /// SAR that fails unless the HSS reports success
    async fn server_assignment(
        &self,
        session_id: &str,
        user_name: &str,
        assignment_type: ServerAssignmentType,
    ) -> SwxProxyResult<ServerAssignmentAnswer> {
        let saa = self.send_sar(session_id, &self.endpoint, user_name, assignment_type).await?;
        if !saa.result.is_success() {
            return Err(result_error("SAR", user_name, saa.result));
        }
        Ok(saa)
    }

    /// Clear a registration the HSS still holds for `user_name`
    async fn deregister_stale(&self, user_name: &str, aaa_server_name: Option<&str>) -> SwxProxyResult<()> {
        let mut endpoint = self.endpoint.clone();
        if self.options.derive_unregister_realm {
            if let Some(realm) = aaa_server_name.and_then(realm_of) {
                endpoint.origin_realm = realm.to_string();
            }
        }

        let session_id = self.new_session_id();
        let saa = self
            .send_sar(&session_id, &endpoint, user_name, ServerAssignmentType::UserDeregistration)
            .await?;
        if !saa.result.is_success() {
            return Err(result_error("SAR deregistration", user_name, saa.result));
        }
        Ok(())
    }

    /// MAR with one retry after clearing a stale registration
    async fn multimedia_auth(
        &self,
        request: &AuthenticationRequest,
        num_auth_items: u32,
    ) -> SwxProxyResult<MultimediaAuthAnswer> {
        let mut maa = self.send_mar(request, num_auth_items).await?;

        if maa.result == SwxResult::ExperimentalFailure(experimental_result::IDENTITY_ALREADY_REGISTERED) {
            log::info!(
                "[{}] already registered with {:?}, deregistering",
                request.user_name,
                maa.aaa_server_name
            );
            self.deregister_stale(&request.user_name, maa.aaa_server_name.as_deref())
                .await?;
            maa = self.send_mar(request, num_auth_items).await?;
        }

        if !maa.result.is_success() {
            return Err(result_error("MAR", &request.user_name, maa.result));
        }
        if maa.auth_data_items.is_empty() {
            return Err(SwxProxyError::Internal(format!(
                "MAA for {} carried no authentication vectors",
                request.user_name
            )));
        }
        Ok(maa)
    }

    /// Profile round trip, enforcing non-3GPP access when verification is on
    async fn fetch_user_profile(&self, session_id: &str, user_name: &str) -> SwxProxyResult<Option<UserProfile>> {
        let saa = match self
            .server_assignment(session_id, user_name, ServerAssignmentType::AaaUserDataRequest)
            .await
        {
            Err(e @ SwxProxyError::PermissionDenied(_)) => {
                self.metrics.record(SwxEvent::AuthorizationDenied);
                return Err(e);
            }
            other => other?,
        };

        let user_data = saa.non_3gpp_user_data;
        if self.options.verify_authorization {
            if let Some(data) = &user_data {
                if data.non_3gpp_ip_access == Non3GppIpAccess::SubscriptionBarred {
                    self.metrics.record(SwxEvent::AuthorizationDenied);
                    return Err(SwxProxyError::PermissionDenied(format!(
                        "non-3GPP access is barred for {}",
                        user_name
                    )));
                }
            }
        }

        Ok(user_data.as_ref().map(UserProfile::from))
    }

    async fn do_authenticate(&self, request: AuthenticationRequest) -> SwxProxyResult<AuthenticationAnswer> {
        validate_user_name(&request.user_name)?;
        if request.sip_num_auth_vectors == 0 {
            return Err(SwxProxyError::InvalidArgument(
                "sip_num_auth_vectors must be greater than zero".into(),
            ));
        }

        let wanted = request.sip_num_auth_vectors.clamp(1, MAX_RETURNED_VECTORS);
        let profile_required = self.options.verify_authorization || request.retrieve_user_profile;

        let mut cached = None;
        if let Some(cache) = &self.cache {
            if request.resync_info.is_empty() {
                cached = cache.get(&request.user_name, wanted as usize);
                match &cached {
                    Some(answer) => {
                        self.metrics.record(SwxEvent::CacheHit);
                        if answer.sip_auth_vectors.len() >= wanted as usize
                            && (!profile_required || answer.user_profile.is_some())
                        {
                            log::debug!("[{}] served {} cached vectors", request.user_name, wanted);
                            return Ok(answer.clone());
                        }
                    }
                    None => self.metrics.record(SwxEvent::CacheMiss),
                }
            }
        }

        let num_auth_items = if self.cache.is_some() {
            wanted.max(MIN_REQUESTED_VECTORS)
        } else {
            wanted
        };

        let maa = match self.multimedia_auth(&request, num_auth_items).await {
            Ok(maa) => maa,
            Err(e) => {
                return match cached {
                    Some(answer) if !answer.sip_auth_vectors.is_empty() => {
                        log::warn!(
                            "[{}] MAR failed ({}), returning {} cached vectors",
                            request.user_name,
                            e,
                            answer.sip_auth_vectors.len()
                        );
                        Ok(answer)
                    }
                    _ => Err(e),
                };
            }
        };

        let mut user_profile = None;
        if profile_required {
            user_profile = self.fetch_user_profile(&maa.session_id, &request.user_name).await?;
        }

        if self.options.register_on_auth && !self.options.verify_authorization {
            if let Err(e) = self
                .server_assignment(&maa.session_id, &request.user_name, ServerAssignmentType::Registration)
                .await
            {
                log::warn!("[{}] registration after authentication failed: {}", request.user_name, e);
            }
        }

        let mut fresh = AuthenticationAnswer {
            user_name: request.user_name.clone(),
            session_id: maa.session_id.clone(),
            sip_auth_vectors: maa.auth_data_items.iter().map(SipAuthVector::from).collect(),
            user_profile,
        };

        let cached_vectors = cached.map(|answer| answer.sip_auth_vectors).unwrap_or_default();
        let mut answer = match &self.cache {
            Some(cache) => {
                let owed = (wanted as usize).saturating_sub(cached_vectors.len());
                cache.put(fresh, owed)
            }
            None => {
                fresh.sip_auth_vectors.truncate(wanted as usize);
                fresh
            }
        };

        if !cached_vectors.is_empty() {
            let fresh_vectors = std::mem::replace(&mut answer.sip_auth_vectors, cached_vectors);
            answer.sip_auth_vectors.extend(fresh_vectors);
        }

        log::info!(
            "[{}] authenticated, returning {} vectors",
            answer.user_name,
            answer.sip_auth_vectors.len()
        );
        Ok(answer)
    }

    async fn assign(
        &self,
        request: RegistrationRequest,
        assignment_type: ServerAssignmentType,
    ) -> SwxProxyResult<RegistrationAnswer> {
        validate_user_name(&request.user_name)?;
        let session_id = request
            .session_id
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.new_session_id());

        self.server_assignment(&session_id, &request.user_name, assignment_type)
            .await?;
        log::info!("[{}] {:?} done (session {})", request.user_name, assignment_type, session_id);
        Ok(RegistrationAnswer { session_id })
    }

    async fn do_disable(&self, request: DisableMessage) -> SwxProxyResult<()> {
        self.connection
            .disable_for(Duration::from_secs(u64::from(request.disable_period_secs)))
            .await;
        if let Some(cache) = &self.cache {
            cache.clear_all();
        }
        Ok(())
    }

    async fn do_enable(&self) -> SwxProxyResult<()> {
        self.connection.enable().await;
        self.connection.check_connection().await.map_err(|e| {
            SwxProxyError::Unavailable(format!(
                "connecting to {} failed: {}",
                self.connection.server().address,
                e
            ))
        })
    }
}

impl SwxProxyService for SwxProxy {
    fn authenticate(&self, request: AuthenticationRequest) -> ServiceFuture<'_, AuthenticationAnswer> {
        Box::pin(self.do_authenticate(request))
    }

    fn register(&self, request: RegistrationRequest) -> ServiceFuture<'_, RegistrationAnswer> {
        Box::pin(self.assign(request, ServerAssignmentType::Registration))
    }

    fn deregister(&self, request: RegistrationRequest) -> ServiceFuture<'_, RegistrationAnswer> {
        Box::pin(self.assign(request, ServerAssignmentType::UserDeregistration))
    }

    fn disable(&self, request: DisableMessage) -> ServiceFuture<'_, ()> {
        Box::pin(self.do_disable(request))
    }

    fn enable(&self) -> ServiceFuture<'_, ()> {
        Box::pin(self.do_enable())
    }

    fn get_health_status(&self) -> ServiceFuture<'_, HealthStatus> {
        Box::pin(async move { Ok(self.health.evaluate(self.metrics.snapshot())) })
    }
}
