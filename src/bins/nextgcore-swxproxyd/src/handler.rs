//! Inbound SWx message dispatch
//!
//! Answers are handed to the waiter registered under their Session-Id.
//! Registration-Termination-Requests from the HSS evict the subscriber's
//! cached vectors before the answer goes back.

use std::sync::Arc;

use ogs_diameter::swx::{self, RegistrationTerminationRequest};
use ogs_diameter::{DiameterMessage, MessageHandler, RequestTracker, ResultCode};

use crate::cache::VectorCache;
use crate::metrics::{MetricsRecorder, SwxEvent};

pub struct SwxMessageHandler {
    origin_host: String,
    origin_realm: String,
    tracker: Arc<RequestTracker>,
    cache: Option<Arc<VectorCache>>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl SwxMessageHandler {
    pub fn new(
        origin_host: impl Into<String>,
        origin_realm: impl Into<String>,
        tracker: Arc<RequestTracker>,
        cache: Option<Arc<VectorCache>>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            origin_host: origin_host.into(),
            origin_realm: origin_realm.into(),
            tracker,
            cache,
            metrics,
        }
    }

    fn handle_rtr(&self, rtr: &DiameterMessage) -> DiameterMessage {
        self.metrics.record(SwxEvent::RtrReceived);

        match RegistrationTerminationRequest::parse(rtr) {
            Ok(req) => {
                log::info!(
                    "RTR for [{}] (session {}, reason {:?})",
                    req.user_name,
                    req.session_id,
                    req.reason_code
                );
                if let Some(cache) = &self.cache {
                    cache.remove(&req.user_name);
                }
                swx::create_rta(rtr, &self.origin_host, &self.origin_realm, ResultCode::Success as u32)
            }
            Err(e) => {
                log::error!("Invalid RTR: {}", e);
                self.metrics.record(SwxEvent::UnparseableMessage);
                swx::create_rta(rtr, &self.origin_host, &self.origin_realm, ResultCode::MissingAvp as u32)
            }
        }
    }
}

impl MessageHandler for SwxMessageHandler {
    fn handle_answer(&self, answer: DiameterMessage) {
        match answer.header.command_code {
            swx::cmd::MULTIMEDIA_AUTH => self.metrics.record(SwxEvent::MaaReceived),
            swx::cmd::SERVER_ASSIGNMENT => self.metrics.record(SwxEvent::SaaReceived),
            _ => {}
        }

        let Some(session_id) = answer.session_id().map(str::to_string) else {
            log::error!(
                "Answer (cmd {}) without Session-Id dropped",
                answer.header.command_code
            );
            self.metrics.record(SwxEvent::UnparseableMessage);
            return;
        };

        if !self.tracker.deliver(&session_id, answer) {
            log::warn!("No request waiting for session {}", session_id);
            self.metrics.record(SwxEvent::InvalidSession);
        }
    }

    fn handle_request(&self, request: DiameterMessage) -> Option<DiameterMessage> {
        match request.header.command_code {
            swx::cmd::REGISTRATION_TERMINATION => Some(self.handle_rtr(&request)),
            code => {
                log::warn!("Unsupported request (cmd {}) from HSS ignored", code);
                None
            }
        }
    }
}
