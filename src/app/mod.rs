use crate::auth::{current_session, AuthChange};
use crate::config::EnvConfig;
use crate::pages::{DashboardPage, LoginPage, RequireSession};
use crate::state::{AppContext, AppState};
use leptos::prelude::*;
use leptos::task::spawn_local;
use leptos_router::components::{Route, Router, Routes};
use leptos_router::path;
use tracing::{info, warn};

/// Resolve the page-load session once and publish it.
async fn bootstrap_session(app: AppState) {
    let client = app.client.get_untracked();
    match current_session(&client).await {
        Ok(Some(session)) => {
            info!(user = %session.user.id, "session restored");
            app.apply_auth_change(AuthChange::SignedIn(session));
        }
        Ok(None) => app.session_checked.set(true),
        Err(e) => {
            warn!(error = %e, "session check failed");
            app.auth_error.set(Some(format!("Sign-in failed: {e}")));
            app.session_checked.set(true);
        }
    }
}

#[component]
pub fn App(config: EnvConfig) -> impl IntoView {
    let app = AppState::new(config);
    provide_context(AppContext(app.clone()));
    spawn_local(bootstrap_session(app));

    // IMPORTANT:
    // - Leptos CSR requires the `csr` feature on `leptos`.
    // - router hooks require a <Router> context.
    view! {
        <Router>
            <Routes fallback=|| view! { <div class="px-4 py-8 text-xs text-muted-foreground">"Not found"</div> }>
                <Route path=path!("dashboard") view=move || view! {
                    <RequireSession>
                        <DashboardPage />
                    </RequireSession>
                } />
                <Route path=path!("") view=LoginPage />
            </Routes>
        </Router>
    }
}
