//! DOM capability detection.

use log::debug;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

/// What the capability probe needs to know about the host environment.
pub trait DomEnvironment {
    fn has_window(&self) -> bool;
    fn has_document(&self) -> bool;
    fn can_create_element(&self) -> bool;
}

/// Probe `env` for a usable DOM.
///
/// A panic raised by the environment while probing counts as "no DOM".
pub fn probe_dom(env: &dyn DomEnvironment) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        env.has_window() && env.has_document() && env.can_create_element()
    }))
    .unwrap_or(false)
}

/// Whether this process runs with a DOM. Probed once, then cached.
pub fn can_use_dom() -> bool {
    static CAN_USE_DOM: OnceLock<bool> = OnceLock::new();
    *CAN_USE_DOM.get_or_init(|| {
        let available = probe_dom(&HostEnvironment);
        debug!("[Platform] DOM available: {}", available);
        available
    })
}

/// The environment the process is actually running in.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostEnvironment;

#[cfg(target_arch = "wasm32")]
impl DomEnvironment for HostEnvironment {
    fn has_window(&self) -> bool {
        web_sys::window().is_some()
    }

    fn has_document(&self) -> bool {
        web_sys::window()
            .and_then(|window| window.document())
            .is_some()
    }

    fn can_create_element(&self) -> bool {
        web_sys::window()
            .and_then(|window| window.document())
            .map(|document| document.create_element("div").is_ok())
            .unwrap_or(false)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl DomEnvironment for HostEnvironment {
    fn has_window(&self) -> bool {
        false
    }

    fn has_document(&self) -> bool {
        false
    }

    fn can_create_element(&self) -> bool {
        false
    }
}
