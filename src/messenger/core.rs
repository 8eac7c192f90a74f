//! Request/response correlator over one endpoint.
//!
//! A [`Messenger`] owns a dispatch task that drains the endpoint's inbound
//! listener and routes every protocol message:
//!
//! - Responses resolve the pending request with the same id and type
//! - Requests run every responder registered for their type
//! - Anything else sharing the transport is ignored
//!
//! Payload injection and handler invocation run in their own tasks, so a
//! slow handler never delays correlation of other traffic.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::hub::Hub;
use crate::identifiers::MessageId;
use crate::protocol::{Message, Payload, Transferable};
use crate::transport::{Delivery, EndpointRef, Listener, Mailbox};

use super::courier::{Courier, DirectCourier};
use super::relay::RelayCourier;
use super::responder::{Responder, ResponderTable};

// ============================================================================
// Constants
// ============================================================================

/// Default request budget.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Types
// ============================================================================

/// Map of request ids to response channels.
type CorrelationMap = FxHashMap<MessageId, PendingRequest>;

/// A request awaiting its response.
struct PendingRequest {
    message_type: String,
    response_tx: oneshot::Sender<Result<Message>>,
}

/// State shared with the dispatch task.
struct Shared {
    endpoint: EndpointRef,
    courier: Arc<dyn Courier>,
    correlation: Mutex<CorrelationMap>,
    responders: Mutex<ResponderTable>,
    activated: AtomicBool,
}

// ============================================================================
// Messenger
// ============================================================================

/// Correlates requests and responses over one endpoint.
///
/// Must be created inside a tokio runtime. Dropping the messenger stops
/// dispatch and fails every pending request with [`Error::Disconnected`].
///
/// # Example
///
/// ```ignore
/// let (a, b) = PortEndpoint::pair();
/// let server = Messenger::new(Arc::new(b));
/// server.response("echo", &Responder::new(|p: Payload| async move { Ok(p) }))?;
///
/// let client = Messenger::new(Arc::new(a));
/// let reply = client.request("echo", json!("hi"), None).await?;
/// ```
pub struct Messenger {
    shared: Arc<Shared>,
    dispatch: JoinHandle<()>,
}

impl fmt::Debug for Messenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Messenger")
            .field("endpoint", &self.shared.endpoint.id())
            .field("pending", &self.pending_count())
            .field("responders", &self.responder_count())
            .field("activated", &self.is_activated())
            .finish()
    }
}

// ============================================================================
// Messenger - Constructors
// ============================================================================

impl Messenger {
    /// Creates a messenger that posts directly over `endpoint`.
    #[must_use]
    pub fn new(endpoint: EndpointRef) -> Self {
        Self::with_courier(endpoint, Arc::new(DirectCourier))
    }

    /// Creates a messenger that parks payloads in `hub`.
    ///
    /// Only metadata crosses `endpoint`; receivers fetch the payload (and its
    /// transferables) from the hub by id.
    #[must_use]
    pub fn relayed(endpoint: EndpointRef, hub: Arc<Hub>) -> Self {
        Self::with_courier(endpoint, Arc::new(RelayCourier::new(hub)))
    }

    /// Creates a messenger with a custom send/inject strategy.
    #[must_use]
    pub fn with_courier(endpoint: EndpointRef, courier: Arc<dyn Courier>) -> Self {
        let listener = endpoint.listen();
        let shared = Arc::new(Shared {
            endpoint,
            courier,
            correlation: Mutex::new(FxHashMap::default()),
            responders: Mutex::new(ResponderTable::default()),
            activated: AtomicBool::new(true),
        });

        let dispatch = tokio::spawn(run_dispatch_loop(listener, Arc::clone(&shared)));
        debug!(endpoint = %shared.endpoint.id(), "Messenger started");

        Self { shared, dispatch }
    }
}

// ============================================================================
// Messenger - Requests
// ============================================================================

impl Messenger {
    /// Sends a request and waits for its response with the default budget.
    ///
    /// # Errors
    ///
    /// See [`Messenger::request_with_timeout`].
    pub async fn request(
        &self,
        message_type: impl Into<String>,
        data: Value,
        transfer: Option<Vec<Transferable>>,
    ) -> Result<Payload> {
        self.request_with_timeout(message_type, data, transfer, DEFAULT_REQUEST_TIMEOUT)
            .await
    }

    /// Sends a request and waits up to `request_timeout` for its response.
    ///
    /// The response listener is registered before the request leaves, so a
    /// fast responder cannot beat it.
    ///
    /// # Errors
    ///
    /// - [`Error::RequestTimeout`] if no response arrived in time
    /// - [`Error::Remote`] if the remote handler failed
    /// - [`Error::StoreFailed`] / [`Error::FetchFailed`] from a relay-aware messenger
    /// - [`Error::Disconnected`] if the messenger shut down while waiting
    pub async fn request_with_timeout(
        &self,
        message_type: impl Into<String>,
        data: Value,
        transfer: Option<Vec<Transferable>>,
        request_timeout: Duration,
    ) -> Result<Payload> {
        let payload = Payload::new(data).with_transfer(transfer.unwrap_or_default());
        let request = Message::request(message_type, payload);
        let id = request.id;
        let message_type = request.message_type.clone();

        let (response_tx, response_rx) = oneshot::channel();
        self.shared.correlation.lock().insert(
            id,
            PendingRequest {
                message_type: message_type.clone(),
                response_tx,
            },
        );
        let guard = PendingGuard {
            correlation: &self.shared.correlation,
            id,
        };

        trace!(%id, %message_type, "Sending request");
        self.shared
            .courier
            .send(self.shared.endpoint.as_ref(), request, None)
            .await?;

        let response = match timeout(request_timeout, response_rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(closed)) => return Err(closed.into()),
            Err(_) => {
                drop(guard);
                let timeout_ms = u64::try_from(request_timeout.as_millis()).unwrap_or(u64::MAX);
                debug!(%id, %message_type, timeout_ms, "Request timed out");
                return Err(Error::request_timeout(id, message_type, timeout_ms));
            }
        };

        if let Some(error) = response.error {
            return Err(Error::remote(message_type, error));
        }

        trace!(%id, %message_type, "Request resolved");
        Ok(response.into_payload())
    }
}

/// Removes a pending entry when its request finishes or is abandoned.
struct PendingGuard<'a> {
    correlation: &'a Mutex<CorrelationMap>,
    id: MessageId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.correlation.lock().remove(&self.id);
    }
}

// ============================================================================
// Messenger - Responders
// ============================================================================

impl Messenger {
    /// Attaches `responder` to every inbound request of `message_type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateResponder`] if this responder is already attached.
    pub fn response(&self, message_type: impl Into<String>, responder: &Responder) -> Result<()> {
        let message_type = message_type.into();
        self.shared
            .responders
            .lock()
            .insert(message_type.clone(), responder)?;
        debug!(%message_type, responder = %responder.id(), "Responder attached");
        Ok(())
    }

    /// Detaches one responder, or all of them when `responder` is `None`.
    ///
    /// Detaching a responder that is not attached is a no-op.
    pub fn deresponse(&self, responder: Option<&Responder>) {
        let removed = self.shared.responders.lock().remove(responder);
        if removed > 0 {
            debug!(removed, "Responders detached");
        }
    }

    /// Resumes answering inbound requests.
    #[inline]
    pub fn activate(&self) {
        self.shared.activated.store(true, Ordering::Release);
    }

    /// Stops answering inbound requests without detaching responders.
    ///
    /// Requests arriving while deactivated are dropped, not queued.
    #[inline]
    pub fn deactivate(&self) {
        self.shared.activated.store(false, Ordering::Release);
    }

    /// Returns `true` if inbound requests are answered.
    #[inline]
    #[must_use]
    pub fn is_activated(&self) -> bool {
        self.shared.activated.load(Ordering::Acquire)
    }
}

// ============================================================================
// Messenger - Accessors
// ============================================================================

impl Messenger {
    /// Returns the endpoint this messenger speaks over.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &EndpointRef {
        &self.shared.endpoint
    }

    /// Returns the number of requests awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.correlation.lock().len()
    }

    /// Returns the number of attached responders.
    #[inline]
    #[must_use]
    pub fn responder_count(&self) -> usize {
        self.shared.responders.lock().len()
    }
}

impl Drop for Messenger {
    fn drop(&mut self) {
        self.dispatch.abort();

        let pending: Vec<PendingRequest> = self
            .shared
            .correlation
            .lock()
            .drain()
            .map(|(_, pending)| pending)
            .collect();

        for request in pending {
            let _ = request.response_tx.send(Err(Error::Disconnected));
        }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Drains inbound deliveries until the endpoint goes away.
async fn run_dispatch_loop(mut listener: Listener, shared: Arc<Shared>) {
    while let Some(delivery) = listener.recv().await {
        let Delivery {
            data,
            transfer,
            source,
            ..
        } = delivery;

        let Some(message) = Message::from_wire(&data, transfer) else {
            trace!("Ignoring foreign traffic");
            continue;
        };

        if message.is_response() {
            route_response(&shared, message);
        } else if message.is_request() {
            route_request(&shared, message, source);
        } else {
            trace!(id = %message.id, "Ignoring message without kind");
        }
    }

    debug!(endpoint = %shared.endpoint.id(), "Dispatch loop terminated");
}

/// Resolves the pending request a response belongs to.
fn route_response(shared: &Arc<Shared>, mut response: Message) {
    let awaited = shared
        .correlation
        .lock()
        .get(&response.id)
        .is_some_and(|pending| pending.message_type == response.message_type);

    if !awaited {
        trace!(id = %response.id, message_type = %response.message_type, "Response for unknown request");
        return;
    }

    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let id = response.id;
        let injected = shared.courier.inject(&mut response).await;
        let result = injected
            .map(|()| response)
            .map_err(|e| e.into_fetch_failed(id));

        let pending = shared.correlation.lock().remove(&id);
        match pending {
            Some(pending) => {
                let _ = pending.response_tx.send(result);
            }
            None => trace!(%id, "Response arrived after its request finished"),
        }
    });
}

/// Runs the responders registered for a request's type.
fn route_request(shared: &Arc<Shared>, request: Message, source: Option<Mailbox>) {
    if !shared.activated.load(Ordering::Acquire) {
        trace!(id = %request.id, "Messenger deactivated, dropping request");
        return;
    }

    let responders = shared.responders.lock().matching(&request.message_type);
    if responders.is_empty() {
        trace!(id = %request.id, message_type = %request.message_type, "No responder for request");
        return;
    }

    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        answer(&shared, request, source, responders).await;
    });
}

/// Injects a request's payload and sends one response per responder.
///
/// A request whose payload cannot be fetched is dropped unanswered: on a
/// broadcast channel another member may already have consumed it.
async fn answer(shared: &Shared, mut request: Message, source: Option<Mailbox>, responders: Vec<Responder>) {
    let injected = shared.courier.inject(&mut request).await;
    if let Err(e) = injected {
        debug!(id = %request.id, error = %e, "Request payload unavailable, dropping request");
        return;
    }

    let payload = request.clone().into_payload();
    for responder in responders {
        let response = match responder.call(payload.clone()).await {
            Ok(result) => Message::response_to(&request, result),
            Err(e) => {
                debug!(id = %request.id, error = %e, "Responder failed");
                Message::error_response_to(&request, e.to_string())
            }
        };
        reply(shared, response, source.as_ref()).await;
    }
}

/// Sends a response; a failed send is reported to the requester as an error response.
async fn reply(shared: &Shared, response: Message, reply_to: Option<&Mailbox>) {
    let fallback = response.metadata();
    let Err(e) = shared
        .courier
        .send(shared.endpoint.as_ref(), response, reply_to)
        .await
    else {
        return;
    };

    if fallback.error.is_some() {
        warn!(id = %fallback.id, error = %e, "Failed to send error response");
        return;
    }

    let response = Message::error_response_to(&fallback, e.to_string());
    if let Err(e) = shared
        .courier
        .send(shared.endpoint.as_ref(), response, reply_to)
        .await
    {
        warn!(id = %fallback.id, error = %e, "Failed to send response");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    use crate::transport::{BroadcastChannel, PortEndpoint};

    fn pair() -> (Messenger, Messenger) {
        let (a, b) = PortEndpoint::pair();
        (Messenger::new(Arc::new(a)), Messenger::new(Arc::new(b)))
    }

    fn echo() -> Responder {
        Responder::new(|payload: Payload| async move { Ok(payload) })
    }

    #[tokio::test]
    async fn test_echo_roundtrip() {
        let (client, server) = pair();
        server.response("echo", &echo()).expect("attach");

        let reply = client
            .request("echo", json!({"greeting": "hi"}), None)
            .await
            .expect("reply");
        assert_eq!(reply.data, json!({"greeting": "hi"}));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_transfer_travels_with_request_and_response() {
        let (client, server) = pair();
        server.response("echo", &echo()).expect("attach");

        let buffer = Transferable::new(vec![5u8; 32]);
        let reply = client
            .request("echo", json!(null), Some(vec![buffer.clone()]))
            .await
            .expect("reply");
        assert!(reply.transfer[0].same_resource(&buffer));
    }

    #[tokio::test]
    async fn test_concurrent_requests_resolve_independently() {
        let (client, server) = pair();
        let double = Responder::new(|payload: Payload| async move {
            let n = payload.data.as_i64().unwrap_or_default();
            if n == 1 {
                tokio::time::sleep(Duration::from_millis(30)).await;
            }
            Ok(json!(n * 2))
        });
        server.response("double", &double).expect("attach");

        let (slow, fast) = tokio::join!(
            client.request("double", json!(1), None),
            client.request("double", json!(2), None),
        );
        assert_eq!(slow.expect("slow").data, json!(2));
        assert_eq!(fast.expect("fast").data, json!(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_responder() {
        let (client, _server) = pair();

        let err = client
            .request_with_timeout("nobody", json!(1), None, Duration::from_millis(100))
            .await
            .expect_err("timeout");

        assert!(matches!(err, Error::RequestTimeout { timeout_ms: 100, .. }));
        assert_eq!(client.pending_count(), 0);
    }

    /// Courier whose payloads are always gone by the time they are fetched.
    struct ConsumedCourier;

    #[async_trait::async_trait]
    impl Courier for ConsumedCourier {
        async fn inject(&self, message: &mut Message) -> Result<()> {
            Err(Error::message_not_found(message.id))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_request_payload_is_not_answered() {
        let (a, b) = PortEndpoint::pair();
        let client = Messenger::new(Arc::new(a));
        let server = Messenger::with_courier(Arc::new(b), Arc::new(ConsumedCourier));

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let counting = Responder::new(move |payload: Payload| {
            counted.fetch_add(1, Ordering::SeqCst);
            async move { Ok(payload) }
        });
        server.response("upload", &counting).expect("attach");

        let err = client
            .request_with_timeout("upload", json!(1), None, Duration::from_millis(50))
            .await
            .expect_err("no answer");
        assert!(matches!(err, Error::RequestTimeout { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_error_becomes_remote_error() {
        let (client, server) = pair();
        let failing = Responder::new(|_payload: Payload| async move {
            Err::<Value, Error>(Error::protocol("bad input"))
        });
        server.response("explode", &failing).expect("attach");

        let err = client
            .request("explode", json!(1), None)
            .await
            .expect_err("remote failure");
        assert!(matches!(err, Error::Remote { ref message, .. } if message.contains("bad input")));
    }

    #[tokio::test]
    async fn test_duplicate_responder() {
        let (_client, server) = pair();
        let responder = echo();
        server.response("a", &responder).expect("first");
        assert!(matches!(
            server.response("b", &responder),
            Err(Error::DuplicateResponder { .. })
        ));
        assert_eq!(server.responder_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deactivated_messenger_drops_requests() {
        let (client, server) = pair();
        server.response("echo", &echo()).expect("attach");
        server.deactivate();

        let err = client
            .request_with_timeout("echo", json!(1), None, Duration::from_millis(50))
            .await
            .expect_err("dropped");
        assert!(err.is_timeout());

        server.activate();
        let reply = client.request("echo", json!(2), None).await.expect("reply");
        assert_eq!(reply.data, json!(2));
    }

    #[tokio::test]
    async fn test_deresponse_all() {
        let (_client, server) = pair();
        server.response("a", &echo()).expect("attach");
        server.response("b", &echo()).expect("attach");

        server.deresponse(None);
        assert_eq!(server.responder_count(), 0);
        server.deresponse(None);
        assert_eq!(server.responder_count(), 0);
    }

    #[tokio::test]
    async fn test_request_and_response_share_one_transport() {
        let (a, b) = pair();
        a.response("who", &Responder::new(|_p: Payload| async move { Ok(json!("a")) }))
            .expect("attach");
        b.response("who", &Responder::new(|_p: Payload| async move { Ok(json!("b")) }))
            .expect("attach");

        assert_eq!(a.request("who", json!(null), None).await.expect("b").data, json!("b"));
        assert_eq!(b.request("who", json!(null), None).await.expect("a").data, json!("a"));
    }

    #[tokio::test]
    async fn test_every_matching_responder_answers() {
        let channel = BroadcastChannel::new("fanout");
        let client = Messenger::new(Arc::new(channel.join()));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut servers = Vec::new();
        for _ in 0..2 {
            let server = Messenger::new(Arc::new(channel.join()));
            let calls = Arc::clone(&calls);
            server
                .response(
                    "count",
                    &Responder::new(move |_p: Payload| {
                        let calls = Arc::clone(&calls);
                        async move { Ok(json!(calls.fetch_add(1, Ordering::SeqCst))) }
                    }),
                )
                .expect("attach");
            servers.push(server);
        }

        client.request("count", json!(null), None).await.expect("first answer");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_abandoned_request_is_forgotten() {
        let (client, _server) = pair();

        let request = client.request("never", json!(1), None);
        let abandoned = tokio::time::timeout(Duration::from_millis(10), request).await;
        assert!(abandoned.is_err());
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_send_failure_is_returned() {
        let server_side = crate::transport::ServerEndpoint::new(Mailbox::new());
        let client = Messenger::new(Arc::new(server_side));

        let err = client
            .request("echo", json!(1), None)
            .await
            .expect_err("no destination");
        assert!(matches!(err, Error::NoDestination { .. }));
        assert_eq!(client.pending_count(), 0);
    }
}
