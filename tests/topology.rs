//! Multi-context topologies over the in-memory transport.
//!
//! Each test builds a small browser: a storage relay at the relay origin,
//! relay frames opened on demand, app pages at a foreign origin, and
//! dedicated workers.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use post_relay::{
    BootstrapState, BroadcastChannel, ContextKind, Delivery, EndpointRef, Error, ExecutionContext,
    Host, HubOptions, HubState, Mailbox, Message, Payload, PortEndpoint, Responder, Result,
    ServerEndpoint, Transferable,
};
use serde_json::{Value, json};
use tokio_test::{assert_err, assert_ok};
use url::Url;

// ============================================================================
// Constants
// ============================================================================

const RELAY_ORIGIN: &str = "https://relay.example";
const RELAY_URL: &str = "https://relay.example/iframe/";
const APP_ORIGIN: &str = "https://app.example";

fn options() -> HubOptions {
    HubOptions::new()
        .with_relay_url(RELAY_URL)
        .with_request_timeout(Duration::from_secs(2))
}

// ============================================================================
// Hosts
// ============================================================================

/// Service worker at the relay origin.
struct StorageHost {
    scope: EndpointRef,
}

impl Host for StorageHost {
    fn scope(&self) -> Option<EndpointRef> {
        Some(Arc::clone(&self.scope))
    }

    fn origin(&self) -> Option<String> {
        Some(RELAY_ORIGIN.to_string())
    }
}

/// Page at the relay origin, usually a hidden frame.
struct RelayPageHost {
    scope: EndpointRef,
    own_box: Mailbox,
    controller: Option<EndpointRef>,
    parent: Option<Mailbox>,
    reloads: Arc<AtomicUsize>,
}

impl Host for RelayPageHost {
    fn scope(&self) -> Option<EndpointRef> {
        Some(Arc::clone(&self.scope))
    }

    fn origin(&self) -> Option<String> {
        Some(RELAY_ORIGIN.to_string())
    }

    fn controller(&self) -> Option<EndpointRef> {
        self.controller.clone()
    }

    fn signal_parent(&self, signal: &str) -> Result<()> {
        if let Some(parent) = &self.parent {
            parent.deliver(Delivery {
                data: json!(signal),
                transfer: Vec::new(),
                source: Some(self.own_box.clone()),
                origin: Some(RELAY_ORIGIN.to_string()),
            });
        }
        Ok(())
    }

    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }
}

/// Page at the app origin.
struct AppHost {
    scope_box: Mailbox,
    scope: EndpointRef,
    controller: Option<EndpointRef>,
    storage_box: Mailbox,
    frames: Mutex<Vec<Arc<ExecutionContext>>>,
    opened: AtomicUsize,
    frame_mode: FrameMode,
}

/// How a hidden relay frame behaves once opened.
#[derive(Debug, Clone, Copy)]
enum FrameMode {
    /// Boots right away.
    Prompt,
    /// Boots after a delay.
    Late(Duration),
    /// Never boots.
    Silent,
}

impl Host for AppHost {
    fn scope(&self) -> Option<EndpointRef> {
        Some(Arc::clone(&self.scope))
    }

    fn origin(&self) -> Option<String> {
        Some(APP_ORIGIN.to_string())
    }

    fn controller(&self) -> Option<EndpointRef> {
        self.controller.clone()
    }

    fn open_hidden_frame(&self, url: &Url) -> Result<EndpointRef> {
        assert_eq!(url.as_str(), RELAY_URL);
        self.opened.fetch_add(1, Ordering::SeqCst);

        let frame_box = Mailbox::with_origin(RELAY_ORIGIN);
        let to_frame: EndpointRef = Arc::new(PortEndpoint::new(
            Mailbox::with_origin(APP_ORIGIN),
            frame_box.clone(),
        ));
        let delay = match self.frame_mode {
            FrameMode::Prompt => Duration::ZERO,
            FrameMode::Late(delay) => delay,
            FrameMode::Silent => return Ok(to_frame),
        };

        let host = RelayPageHost {
            scope: Arc::new(ServerEndpoint::new(frame_box.clone())),
            own_box: frame_box,
            controller: Some(Arc::new(PortEndpoint::new(
                Mailbox::with_origin(RELAY_ORIGIN),
                self.storage_box.clone(),
            ))),
            parent: Some(self.scope_box.clone()),
            reloads: Arc::new(AtomicUsize::new(0)),
        };
        let frame = Arc::new(ExecutionContext::with_options(
            ContextKind::Page,
            Arc::new(host),
            options(),
        )?);
        self.frames.lock().push(Arc::clone(&frame));

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = frame.boot().await;
        });
        Ok(to_frame)
    }
}

/// Dedicated worker; its scope is the channel to its parent.
struct WorkerHost {
    scope: EndpointRef,
}

impl Host for WorkerHost {
    fn scope(&self) -> Option<EndpointRef> {
        Some(Arc::clone(&self.scope))
    }
}

// ============================================================================
// Browser
// ============================================================================

/// A running storage relay plus factories for the other contexts.
struct Browser {
    storage: Arc<ExecutionContext>,
    storage_box: Mailbox,
}

impl Browser {
    async fn start() -> Self {
        let storage_box = Mailbox::with_origin(RELAY_ORIGIN);
        let host = StorageHost {
            scope: Arc::new(ServerEndpoint::new(storage_box.clone())),
        };
        let storage = Arc::new(assert_ok!(ExecutionContext::with_options(
            ContextKind::Storage,
            Arc::new(host),
            options(),
        )));
        assert_ok!(storage.boot().await);

        Self { storage, storage_box }
    }

    fn app_host(&self, controlled: bool, frame_mode: FrameMode) -> Arc<AppHost> {
        let scope_box = Mailbox::with_origin(APP_ORIGIN);
        let controller: Option<EndpointRef> = controlled.then(|| {
            Arc::new(PortEndpoint::new(
                Mailbox::with_origin(APP_ORIGIN),
                self.storage_box.clone(),
            )) as EndpointRef
        });

        Arc::new(AppHost {
            scope: Arc::new(ServerEndpoint::new(scope_box.clone())),
            scope_box,
            controller,
            storage_box: self.storage_box.clone(),
            frames: Mutex::new(Vec::new()),
            opened: AtomicUsize::new(0),
            frame_mode,
        })
    }

    /// App page without a controller; discovers storage through a frame.
    fn app_page(&self) -> (ExecutionContext, Arc<AppHost>) {
        let host = self.app_host(false, FrameMode::Prompt);
        let page = assert_ok!(ExecutionContext::with_options(
            ContextKind::Page,
            host.clone(),
            options(),
        ));
        (page, host)
    }

    /// App page controlled by the storage relay.
    fn controlled_page(&self) -> ExecutionContext {
        let host = self.app_host(true, FrameMode::Prompt);
        assert_ok!(ExecutionContext::with_options(ContextKind::Page, host, options()))
    }
}

fn upload(n: i64, bytes: usize) -> (Message, Transferable) {
    let buffer = Transferable::new(vec![7u8; bytes]);
    let message = Message::request("upload", Payload::new(json!(n)).with_transfer(vec![buffer.clone()]));
    (message, buffer)
}

// ============================================================================
// Tests - Broadcast Relay
// ============================================================================

#[tokio::test]
async fn test_broadcast_relays_transferables_through_storage() {
    let browser = Browser::start().await;
    let (page_a, _) = browser.app_page();
    let (page_b, _) = browser.app_page();

    let channel = BroadcastChannel::new("uploads");
    let observer = channel.join();
    let mut wire = post_relay::Endpoint::listen(&observer);

    let sender = assert_ok!(page_a.messenger(Arc::new(channel.join())));
    let receiver = assert_ok!(page_b.messenger(Arc::new(channel.join())));

    let buffer = Transferable::new(vec![1u8; 1024]);
    let original = buffer.clone();
    let handler = Responder::new(move |payload: Payload| {
        let original = original.clone();
        async move {
            let same = payload
                .transfer
                .first()
                .is_some_and(|t| t.same_resource(&original));
            let reply = Payload::new(json!({
                "same": same,
                "len": payload.transfer.first().map_or(0, Transferable::len),
                "name": payload.data["name"].clone(),
            }))
            .with_transfer(vec![Transferable::new(vec![0xAB; 8])]);
            Ok::<Payload, Error>(reply)
        }
    });
    assert_ok!(receiver.response("upload", &handler));

    let reply = assert_ok!(
        sender
            .request("upload", json!({"name": "a.bin"}), Some(vec![buffer]))
            .await
    );
    assert_eq!(reply.data, json!({"same": true, "len": 1024, "name": "a.bin"}));
    assert_eq!(reply.transfer[0].as_bytes(), &[0xAB; 8]);

    let posted = wire.recv().await.expect("request metadata");
    assert!(posted.data.get("payload").is_none());
    assert_eq!(posted.data["__type"], "request");
    assert!(posted.transfer.is_empty());

    let hub_a = assert_ok!(page_a.hub());
    assert_eq!(hub_a.state(), HubState::On);
    assert_eq!(hub_a.bootstrap_state(), Some(BootstrapState::BoundIndirect));
    assert_eq!(sender.pending_count(), 0);
}

#[tokio::test]
async fn test_broadcast_without_transfer_skips_hub() {
    let browser = Browser::start().await;
    let (page_a, host_a) = browser.app_page();
    let (page_b, _) = browser.app_page();

    let channel = BroadcastChannel::new("chat");
    let sender = assert_ok!(page_a.messenger(Arc::new(channel.join())));
    let receiver = assert_ok!(page_b.messenger(Arc::new(channel.join())));
    let echo = Responder::new(|payload: Payload| async move { Ok(payload) });
    assert_ok!(receiver.response("say", &echo));

    let reply = assert_ok!(sender.request("say", json!("hello"), None).await);
    assert_eq!(reply.data, json!("hello"));

    assert_eq!(assert_ok!(page_a.hub()).state(), HubState::Off);
    assert_eq!(host_a.opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unfetchable_metadata_is_dropped_unanswered() {
    let browser = Browser::start().await;
    let (page, _) = browser.app_page();

    let channel = BroadcastChannel::new("stale");
    let raw = channel.join();
    let mut inbox = post_relay::Endpoint::listen(&raw);
    let receiver = assert_ok!(page.messenger(Arc::new(channel.join())));
    let echo = Responder::new(|payload: Payload| async move { Ok(payload) });
    assert_ok!(receiver.response("upload", &echo));

    let (never_stored, _) = upload(1, 4);
    let (wire, _) = assert_ok!(never_stored.metadata().into_wire());
    assert_ok!(post_relay::Endpoint::post(&raw, wire, Vec::new(), None));

    let answered = tokio::time::timeout(Duration::from_millis(300), inbox.recv()).await;
    assert!(answered.is_err(), "unexpected reply: {answered:?}");
    assert_eq!(assert_ok!(page.hub()).state(), HubState::On);
}

#[tokio::test]
async fn test_competing_relayed_responders_answer_once() {
    let browser = Browser::start().await;
    let (sender_page, _) = browser.app_page();
    let (first_page, _) = browser.app_page();
    let (second_page, _) = browser.app_page();

    let channel = BroadcastChannel::new("contended");
    let sender = assert_ok!(sender_page.messenger(Arc::new(channel.join())));
    let first = assert_ok!(first_page.messenger(Arc::new(channel.join())));
    let second = assert_ok!(second_page.messenger(Arc::new(channel.join())));

    let slow_echo = || {
        Responder::new(|payload: Payload| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(payload)
        })
    };
    assert_ok!(first.response("upload", &slow_echo()));
    assert_ok!(second.response("upload", &slow_echo()));

    for n in 0..10 {
        let buffer = Transferable::new(vec![n; 64]);
        let reply = assert_ok!(
            sender
                .request("upload", json!(n), Some(vec![buffer.clone()]))
                .await
        );
        assert_eq!(reply.data, json!(n));
        assert!(reply.transfer[0].same_resource(&buffer));
    }
    assert_eq!(sender.pending_count(), 0);
}

// ============================================================================
// Tests - Hub Topology
// ============================================================================

#[tokio::test]
async fn test_controlled_page_binds_directly() {
    let browser = Browser::start().await;
    let page = browser.controlled_page();
    let hub = assert_ok!(page.hub());

    let (message, buffer) = upload(5, 16);
    let id = message.id;
    assert_ok!(hub.store(message).await);
    assert_eq!(hub.bootstrap_state(), Some(BootstrapState::BoundDirect));

    let fetched = assert_ok!(hub.fetch(id).await);
    assert_eq!(fetched.payload, Some(json!(5)));
    assert!(fetched.transfer.expect("transfer")[0].same_resource(&buffer));
}

#[tokio::test]
async fn test_worker_forwards_to_parent_page() {
    let browser = Browser::start().await;
    let page = browser.controlled_page();

    let (to_worker, worker_scope) = PortEndpoint::worker_pair();
    let _to_worker = assert_ok!(page.messenger(Arc::new(to_worker)));
    let page_hub = assert_ok!(page.hub());
    assert_eq!(page_hub.source_count(), 1);

    let worker = assert_ok!(ExecutionContext::with_options(
        ContextKind::Worker,
        Arc::new(WorkerHost {
            scope: Arc::new(worker_scope),
        }),
        options(),
    ));
    let worker_hub = assert_ok!(worker.hub());
    assert_eq!(worker_hub.strategy_name(), "pass-through");

    let (message, buffer) = upload(9, 32);
    let id = message.id;
    assert_ok!(worker_hub.store(message).await);

    let fetched = assert_ok!(page_hub.fetch(id).await);
    assert!(fetched.transfer.expect("transfer")[0].same_resource(&buffer));
    assert_err!(worker_hub.fetch(id).await);
}

#[tokio::test]
async fn test_fetch_is_consumed_once() {
    let browser = Browser::start().await;
    let (page_a, _) = browser.app_page();
    let page_b = browser.controlled_page();
    let hub_a = assert_ok!(page_a.hub());
    let hub_b = assert_ok!(page_b.hub());

    let (message, _) = upload(3, 8);
    let id = message.id;
    assert_ok!(hub_a.store(message).await);
    assert_ok!(hub_b.init().await);

    let (a, b) = tokio::join!(hub_a.fetch(id), hub_b.fetch(id));
    let found = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(found, 1);

    let miss = a.err().or(b.err()).expect("one miss");
    assert!(miss.is_relay_error(), "unexpected error: {miss}");
}

#[tokio::test]
async fn test_pages_share_one_storage() {
    let browser = Browser::start().await;
    let (page, host) = browser.app_page();
    let hub = assert_ok!(page.hub());

    let (message, _) = upload(1, 1);
    let id = message.id;
    assert_ok!(hub.store(message).await);
    assert_eq!(host.opened.load(Ordering::SeqCst), 1);
    assert_eq!(host.frames.lock().len(), 1);

    let storage_hub = assert_ok!(browser.storage.hub());
    assert_eq!(assert_ok!(storage_hub.fetch(id).await).payload, Some(json!(1)));
}

#[tokio::test]
async fn test_rebind_reopens_relay_page() {
    let browser = Browser::start().await;
    let (page, host) = browser.app_page();
    let hub = assert_ok!(page.hub());
    assert_ok!(hub.init().await);

    assert_ok!(hub.rebind());
    assert_eq!(hub.state(), HubState::Off);

    let (message, _) = upload(2, 2);
    let id = message.id;
    assert_ok!(hub.store(message).await);
    assert_eq!(host.opened.load(Ordering::SeqCst), 2);
    assert_ok!(hub.fetch(id).await);
}

// ============================================================================
// Tests - Bootstrap Failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_relay_origin_without_controller_reloads() {
    let reloads = Arc::new(AtomicUsize::new(0));
    let own_box = Mailbox::with_origin(RELAY_ORIGIN);
    let host = RelayPageHost {
        scope: Arc::new(ServerEndpoint::new(own_box.clone())),
        own_box,
        controller: None,
        parent: None,
        reloads: Arc::clone(&reloads),
    };
    let page = assert_ok!(ExecutionContext::with_options(
        ContextKind::Page,
        Arc::new(host),
        options(),
    ));
    let hub = assert_ok!(page.hub());

    let (first, second) = tokio::join!(hub.init(), hub.init());
    assert!(matches!(first, Err(Error::ReloadScheduled { delay_ms: 1000 })));
    assert!(matches!(second, Err(Error::Bootstrap { .. })));

    assert_eq!(reloads.load(Ordering::SeqCst), 1);
    assert_eq!(hub.state(), HubState::Off);
    assert_eq!(hub.bootstrap_state(), Some(BootstrapState::Reloading));
}

#[tokio::test(start_paused = true)]
async fn test_silent_relay_page_times_out() {
    let browser = Browser::start().await;
    let host = browser.app_host(false, FrameMode::Silent);
    let page = assert_ok!(ExecutionContext::with_options(
        ContextKind::Page,
        host.clone(),
        options(),
    ));
    let hub = assert_ok!(page.hub());

    let err = assert_err!(hub.init().await);
    assert!(matches!(err, Error::BootstrapTimeout { attempts: 3, timeout_ms: 10_000 }));
    assert_eq!(host.opened.load(Ordering::SeqCst), 1);
    assert_eq!(hub.state(), HubState::Off);
}

#[tokio::test(start_paused = true)]
async fn test_late_relay_page_is_awaited_not_reopened() {
    let browser = Browser::start().await;
    let host = browser.app_host(false, FrameMode::Late(Duration::from_secs(15)));
    let page = assert_ok!(ExecutionContext::with_options(
        ContextKind::Page,
        host.clone(),
        options(),
    ));
    let hub = assert_ok!(page.hub());

    let (message, buffer) = upload(4, 16);
    let id = message.id;
    assert_ok!(hub.store(message).await);
    assert_eq!(host.opened.load(Ordering::SeqCst), 1);
    assert_eq!(hub.bootstrap_state(), Some(BootstrapState::BoundIndirect));

    let fetched = assert_ok!(hub.fetch(id).await);
    assert!(fetched.transfer.expect("transfer")[0].same_resource(&buffer));
}

#[tokio::test]
async fn test_worklet_messenger_needs_no_hub_for_ports() {
    let page = ExecutionContext::new(
        ContextKind::Worklet,
        Arc::new(WorkerHost {
            scope: Arc::new(ServerEndpoint::new(Mailbox::new())),
        }),
    );
    let (a, _b) = PortEndpoint::pair();
    assert_ok!(page.messenger(Arc::new(a)));

    let channel = BroadcastChannel::new("worklet");
    let err = assert_err!(page.messenger(Arc::new(channel.join())));
    assert!(matches!(err, Error::UnsupportedContext { .. }));
}

#[test]
fn test_request_timeout_names_budget_with_blocking_runtime() {
    let err: Value = tokio_test::block_on(async {
        let (a, _b) = PortEndpoint::pair();
        let client = post_relay::Messenger::new(Arc::new(a));
        let err = client
            .request_with_timeout("silent", json!(1), None, Duration::from_millis(20))
            .await
            .expect_err("timeout");
        json!(err.to_string())
    });
    assert!(err.as_str().unwrap_or_default().contains("20ms"));
}
