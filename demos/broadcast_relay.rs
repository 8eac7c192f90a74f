//! Moving a buffer across a broadcast channel through the storage relay.
//!
//! Demonstrates:
//! - Booting a storage relay context
//! - Two controlled pages joined to one broadcast channel
//! - A request carrying a transferable, relayed through the hub
//! - A response carrying a transferable back
//!
//! Usage:
//!   cargo run --example broadcast_relay
//!   cargo run --example broadcast_relay -- --debug

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use post_relay::{
    BroadcastChannel, ContextKind, EndpointRef, Error, ExecutionContext, Host, Mailbox, Payload,
    PortEndpoint, Responder, Result, ServerEndpoint, Transferable,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const RELAY_ORIGIN: &str = "https://freezm-ltd.github.io";
const APP_ORIGIN: &str = "https://app.example";

// ============================================================================
// Hosts
// ============================================================================

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

struct PageHost {
    scope: EndpointRef,
    controller: EndpointRef,
}

impl Host for PageHost {
    fn scope(&self) -> Option<EndpointRef> {
        Some(Arc::clone(&self.scope))
    }

    fn origin(&self) -> Option<String> {
        Some(APP_ORIGIN.to_string())
    }

    fn controller(&self) -> Option<EndpointRef> {
        Some(Arc::clone(&self.controller))
    }
}

fn page(storage_box: &Mailbox) -> ExecutionContext {
    let host = PageHost {
        scope: Arc::new(ServerEndpoint::new(Mailbox::with_origin(APP_ORIGIN))),
        controller: Arc::new(PortEndpoint::new(
            Mailbox::with_origin(APP_ORIGIN),
            storage_box.clone(),
        )),
    };
    ExecutionContext::new(ContextKind::Page, Arc::new(host))
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let debug = std::env::args().any(|a| a == "--debug");
    let filter = if debug { "post_relay=trace" } else { "post_relay=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    println!("=== Broadcast Relay ===\n");

    // ========================================================================
    // Storage Relay
    // ========================================================================

    println!("[1] Booting storage relay...");
    let storage_box = Mailbox::with_origin(RELAY_ORIGIN);
    let storage = ExecutionContext::new(
        ContextKind::Storage,
        Arc::new(StorageHost {
            scope: Arc::new(ServerEndpoint::new(storage_box.clone())),
        }),
    );
    storage.boot().await?;
    println!("    ✓ Storage relay on\n");

    // ========================================================================
    // Pages
    // ========================================================================

    println!("[2] Joining two pages to a broadcast channel...");
    let channel = BroadcastChannel::new("uploads");
    let sender_page = page(&storage_box);
    let receiver_page = page(&storage_box);

    let sender = sender_page.messenger(Arc::new(channel.join()))?;
    let receiver = receiver_page.messenger(Arc::new(channel.join()))?;

    let checksum = Responder::new(|payload: Payload| async move {
        let buffer = payload
            .transfer
            .first()
            .ok_or_else(|| Error::protocol("upload without buffer"))?;
        let sum: u64 = buffer.as_bytes().iter().map(|b| u64::from(*b)).sum();
        let receipt = Transferable::new(sum.to_le_bytes().to_vec());
        Ok::<Payload, Error>(Payload::new(json!({"name": payload.data["name"], "sum": sum})).with_transfer(vec![receipt]))
    });
    receiver.response("upload", &checksum)?;
    println!("    ✓ {} members\n", channel.member_count());

    // ========================================================================
    // Request
    // ========================================================================

    println!("[3] Sending a 64 KiB buffer...");
    let buffer = Transferable::new(vec![3u8; 64 * 1024]);
    let reply = sender
        .request("upload", json!({"name": "blob.bin"}), Some(vec![buffer]))
        .await?;

    println!("    ✓ Reply: {}", reply.data);
    println!("    ✓ Receipt buffer: {} bytes", reply.transfer.first().map_or(0, Transferable::len));

    println!("\n=== Done ===");
    Ok(())
}
