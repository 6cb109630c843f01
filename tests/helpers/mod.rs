//! Shared test helpers.

#![allow(dead_code)]

pub mod mock_lms;

use std::sync::Arc;

use sip2gate::config::{BranchConfig, GatewayConfig, VendorProfile};
use sip2gate::events::EventBus;
use sip2gate::masking::MaskingService;
use sip2gate::transport::ConnectionManager;
use sip2gate::transport::breaker::BreakerConfig;

/// Fixed master key so masked values are reproducible across assertions.
pub const TEST_MASTER_KEY: &[u8; 32] = b"0123456789abcdef0123456789abcdef";

pub fn test_masking() -> MaskingService {
    MaskingService::with_key(*TEST_MASTER_KEY)
}

/// A branch pointed at the mock LMS with a short timeout.
pub fn test_branch(id: &str, port: u16, timeout_ms: u64) -> BranchConfig {
    BranchConfig {
        id: id.to_string(),
        host: "127.0.0.1".to_string(),
        port,
        timeout_ms,
        institution_id: "MAIN".to_string(),
        tls: false,
        tls_verify: true,
        credentials: None,
        profile: None,
    }
}

/// A vendor profile that tolerates checksum failures.
pub fn lenient_profile() -> VendorProfile {
    VendorProfile {
        checksum_required: false,
        ..Default::default()
    }
}

/// A manager over the given branches with the fast breaker profile and a
/// keyed masking service. Returns the manager and its event bus.
pub fn test_manager(branches: Vec<BranchConfig>) -> (ConnectionManager, Arc<EventBus>) {
    let masking = test_masking();
    let events = EventBus::new(masking.clone());
    let manager = ConnectionManager::with_breaker(
        GatewayConfig {
            branches,
            location_code: "SC".to_string(),
        },
        masking,
        events.clone(),
        BreakerConfig::fast_test_profile(),
    )
    .expect("valid test config");
    (manager, events)
}
