mod api;
mod app;
mod auth;
mod components;
mod config;
mod derived;
mod models;
mod pages;
mod realtime;
mod state;
mod storage;
mod store;
mod util;

use crate::app::App;
use crate::config::EnvConfig;
use leptos::prelude::*;

// Needed for `#[wasm_bindgen(start)]` on the wasm entrypoint.
#[cfg(all(target_arch = "wasm32", not(test)))]
use wasm_bindgen::prelude::wasm_bindgen;

/// Route `tracing` output to the browser console.
fn init_logging(config: &EnvConfig) {
    use tracing_subscriber::prelude::*;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false) // consoles don't render escape codes
        .without_time()
        .with_writer(tracing_web::MakeWebConsoleWriter::new());

    let _ = tracing_subscriber::registry()
        .with(config.level_filter())
        .with(fmt_layer)
        .try_init();
}

// Only register the WASM start function for normal builds (not for tests),
// otherwise wasm-bindgen-test will end up with multiple entry symbols.
#[cfg_attr(all(target_arch = "wasm32", not(test)), wasm_bindgen(start))]
pub fn main() {
    console_error_panic_hook::set_once();

    let config = EnvConfig::new();
    init_logging(&config);
    if !config.is_configured() {
        tracing::warn!("window.ENV.SUPABASE_ANON_KEY is not set; sign-in will fail");
    }
    tracing::info!(url = %config.supabase_url, "starting savora");

    mount_to_body(move || view! { <App config=config.clone() /> });
}
