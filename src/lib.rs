//! Inkpost - blog backend and admin
//!
//! An axum API for authentication, posts and image uploads, a Leptos admin
//! shell, and a diagnostics client for checking a running server.

#![recursion_limit = "256"]

pub mod app;
pub mod core;
pub mod ui;

#[cfg(feature = "hydrate")]
#[wasm_bindgen::prelude::wasm_bindgen]
pub fn hydrate() {
    use crate::app::*;
    console_error_panic_hook::set_once();
    leptos::mount::hydrate_body(App);
}
