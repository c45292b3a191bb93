//! Property-based tests for toolgate
//!
//! These tests verify invariants that must hold for all inputs:
//! - Handshake detection never panics
//! - The registry never holds a closed transport
//! - Credential parsing accepts only the bearer scheme
//!
//! Run with: cargo test --test property_tests

use proptest::prelude::*;
use serde_json::{json, Value};

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        prop_oneof![Just("initialize".to_string()), "\\PC{0,12}"].prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(
                prop_oneof![Just("method".to_string()), Just("id".to_string()), "[a-z]{1,6}"],
                inner,
                0..4
            )
            .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

// ============================================================================
// HANDSHAKE DETECTION TESTS
// ============================================================================

mod handshake_tests {
    use super::*;
    use toolgate::mcp::is_initialize_request;

    fn is_initialize_object(value: &Value) -> bool {
        value.get("method").and_then(Value::as_str) == Some("initialize")
    }

    proptest! {
        /// Invariant: detection never panics and matches the definition
        #[test]
        fn matches_definition(body in arb_json()) {
            let expected = match &body {
                Value::Array(items) => items.iter().any(is_initialize_object),
                other => is_initialize_object(other),
            };
            prop_assert_eq!(is_initialize_request(&body), expected);
        }

        /// Invariant: an initialize anywhere in a batch is detected
        #[test]
        fn found_anywhere_in_batch(
            before in prop::collection::vec(arb_json(), 0..3),
            after in prop::collection::vec(arb_json(), 0..3),
        ) {
            let mut batch = before;
            batch.push(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}));
            batch.extend(after);
            prop_assert!(is_initialize_request(&Value::Array(batch)));
        }
    }
}

// ============================================================================
// CREDENTIAL TESTS
// ============================================================================

mod credential_tests {
    use super::*;
    use toolgate::context::Credential;

    proptest! {
        /// Invariant: any non-empty token after "Bearer " is accepted verbatim
        #[test]
        fn bearer_token_roundtrip(token in "\\PC{1,40}") {
            let header = format!("Bearer {}", token);
            let credential = Credential::from_authorization_header(Some(&header)).unwrap();
            prop_assert_eq!(credential.expose(), token.as_str());
        }

        /// Invariant: without the exact prefix nothing is accepted
        #[test]
        fn other_schemes_rejected(header in "\\PC{0,40}") {
            prop_assume!(!header.starts_with("Bearer "));
            prop_assert!(Credential::from_authorization_header(Some(&header)).is_err());
        }

        /// Invariant: debug output never reveals the secret
        #[test]
        fn debug_is_redacted(token in "[A-Za-z0-9]{8,40}") {
            let credential = Credential::new(&token).unwrap();
            let rendered = format!("{:?}", credential);
            prop_assert!(!rendered.contains(&token));
        }
    }
}

// ============================================================================
// REGISTRY INTERLEAVING TESTS
// ============================================================================

mod registry_tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use toolgate::error::{GatewayError, Result};
    use toolgate::mcp::{CloseCallback, Transport};
    use toolgate::session::SessionRegistry;

    #[derive(Default)]
    struct CountingTransport {
        closed: AtomicBool,
        close_calls: AtomicUsize,
        callback: Mutex<Option<CloseCallback>>,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn handle_message(&self, _body: Value) -> Result<Option<Value>> {
            Ok(None)
        }

        fn close(&self) -> Result<()> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            if self.closed.swap(true, Ordering::SeqCst) {
                return Err(GatewayError::TransportClosed);
            }
            let callback = self.callback.lock().take();
            if let Some(callback) = callback {
                callback();
            }
            Ok(())
        }

        fn on_close(&self, callback: CloseCallback) {
            *self.callback.lock() = Some(callback);
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[derive(Debug, Clone)]
    enum Op {
        Register { watched: bool },
        Touch(usize),
        Remove(usize),
        RemoveClosed(usize),
        SelfClose(usize),
        Sweep,
        DrainAll,
        Shutdown,
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => any::<bool>().prop_map(|watched| Op::Register { watched }),
            2 => (0usize..16).prop_map(Op::Touch),
            2 => (0usize..16).prop_map(Op::Remove),
            1 => (0usize..16).prop_map(Op::RemoveClosed),
            2 => (0usize..16).prop_map(Op::SelfClose),
            1 => Just(Op::Sweep),
            1 => Just(Op::DrainAll),
            1 => Just(Op::Shutdown),
        ]
    }

    proptest! {
        /// Invariant: no interleaving leaves a closed transport registered,
        /// no transport is ever closed twice by the registry, and nothing
        /// registers after shutdown
        #[test]
        fn never_holds_closed_transport(ops in prop::collection::vec(arb_op(), 1..60)) {
            let registry = SessionRegistry::new(Duration::from_secs(1800));
            let mut issued: Vec<(String, Arc<CountingTransport>)> = Vec::new();
            let mut own_closes: Vec<usize> = Vec::new();
            let mut shut_down = false;

            for op in ops {
                match op {
                    Op::Register { watched } => {
                        let transport = Arc::new(CountingTransport::default());
                        match registry.register(transport.clone()) {
                            Ok(id) => {
                                prop_assert!(!shut_down);
                                if watched {
                                    registry.watch_close(&id, transport.as_ref());
                                }
                                issued.push((id, transport));
                                own_closes.push(0);
                            }
                            Err(_) => {
                                prop_assert!(shut_down);
                                prop_assert_eq!(transport.close_calls.load(Ordering::SeqCst), 0);
                            }
                        }
                    }
                    Op::Touch(i) => {
                        if let Some((id, _)) = issued.get(i) {
                            let present = registry.contains(id);
                            prop_assert_eq!(registry.touch(id), present);
                        }
                    }
                    Op::Remove(i) => {
                        if let Some((id, _)) = issued.get(i) {
                            let present = registry.contains(id);
                            prop_assert_eq!(registry.remove(id, false), present);
                            prop_assert!(!registry.remove(id, false));
                        }
                    }
                    Op::RemoveClosed(i) => {
                        if let Some((id, transport)) = issued.get(i) {
                            if registry.contains(id) {
                                own_closes[i] += 1;
                                let _ = transport.close();
                                registry.remove(id, true);
                            }
                        }
                    }
                    Op::SelfClose(i) => {
                        if let Some((id, transport)) = issued.get(i) {
                            let watched = transport.callback.lock().is_some();
                            own_closes[i] += 1;
                            let _ = transport.close();
                            if !watched {
                                // Unwatched transports are reported by the owner.
                                registry.remove(id, true);
                            }
                        }
                    }
                    Op::Sweep => {
                        prop_assert_eq!(registry.sweep_expired(), 0);
                    }
                    Op::DrainAll => {
                        registry.drain_all();
                        prop_assert!(registry.is_empty());
                    }
                    Op::Shutdown => {
                        registry.shutdown();
                        shut_down = true;
                        prop_assert!(registry.is_empty());
                    }
                }

                for id in registry.session_ids() {
                    let transport = registry.lookup(&id).unwrap();
                    prop_assert!(!transport.is_closed());
                }
            }

            for ((_, transport), own) in issued.iter().zip(&own_closes) {
                let by_registry = transport.close_calls.load(Ordering::SeqCst) - own;
                prop_assert!(by_registry <= 1);
            }
        }
    }
}
