use crate::auth::{
    refresh_session, sign_in_with_oauth, sign_out, AuthChange, SessionWatcher, DASHBOARD_PATH,
    OAUTH_PROVIDER,
};
use crate::components::ui::{
    Button, ButtonSize, ButtonVariant, DismissableAlert, Input, Label, Spinner,
};
use crate::components::{BookmarkCard, EditModal, EmptyState, LiveIndicator, Logo, StatsBar};
use crate::models::Bookmark;
use crate::realtime::{apply_inbound, LiveChannel, LiveStatus};
use crate::state::{AppContext, DashboardState};
use crate::store::{validate_input, MutationError};
use leptos::prelude::*;
use leptos::task::spawn_local;
use leptos_router::hooks::use_navigate;
use tracing::{info, warn};

/// Whether a guarded page has to send the visitor back to the landing page.
fn must_leave(session_checked: bool, has_session: bool, signed_out: bool) -> bool {
    signed_out || (session_checked && !has_session)
}

fn replace_options() -> leptos_router::NavigateOptions {
    leptos_router::NavigateOptions {
        replace: true,
        ..Default::default()
    }
}

#[component]
pub fn LoginPage() -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let navigate = StoredValue::new(use_navigate());
    let starting: RwSignal<bool> = RwSignal::new(false);

    let session = app_state.0.session;
    let checked = app_state.0.session_checked;
    let auth_error = app_state.0.auth_error;
    let client = app_state.0.client;

    // Already signed in: skip the landing page.
    Effect::new(move |_| {
        if checked.get() && session.with(|s| s.is_some()) {
            navigate.with_value(|nav| nav(DASHBOARD_PATH, replace_options()));
        }
    });

    let on_sign_in = move |_| {
        starting.set(true);
        auth_error.set(None);
        let result = client.with_untracked(|c| sign_in_with_oauth(c, OAUTH_PROVIDER));
        if let Err(e) = result {
            warn!(error = %e, "could not start sign-in");
            auth_error.set(Some(format!("Could not start sign-in: {e}")));
            starting.set(false);
        }
    };

    view! {
        <div class="min-h-screen bg-background">
            <div class="mx-auto flex min-h-screen w-full max-w-md flex-col justify-center gap-8 px-4 py-10">
                <div class="flex items-center justify-center">
                    <Logo />
                </div>

                <div class="flex flex-col gap-3 text-center">
                    <h1 class="text-3xl font-semibold tracking-tight">"Your bookmarks, in sync."</h1>
                    <p class="text-sm text-muted-foreground">
                        "Save links, find them again, and watch every tab update in real time."
                    </p>
                </div>

                <DismissableAlert message=auth_error />

                <Show
                    when=move || checked.get()
                    fallback=|| view! {
                        <div class="flex justify-center text-muted-foreground"><Spinner /></div>
                    }
                >
                    <Button
                        class="w-full"
                        variant=ButtonVariant::Brand
                        size=ButtonSize::Lg
                        attr:disabled=move || starting.get()
                        on:click=on_sign_in
                    >
                        <span class="inline-flex items-center gap-2">
                            <Show when=move || starting.get() fallback=|| ().into_view()>
                                <Spinner />
                            </Show>
                            {move || if starting.get() { "Redirecting..." } else { "Continue with Google" }}
                        </span>
                    </Button>
                </Show>
            </div>
        </div>
    }
}

/// Renders `children` only with a live session. Redirects to the landing page
/// when there is none, or as soon as the session goes away.
#[component]
pub fn RequireSession(children: ChildrenFn) -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let app = app_state.0.clone();
    let navigate = StoredValue::new(use_navigate());
    let kicked: RwSignal<bool> = RwSignal::new(false);

    let subscription = app.notifier.subscribe(move |change| {
        if *change == AuthChange::SignedOut {
            let _ = kicked.try_set(true);
        }
    });
    on_cleanup(move || subscription.unsubscribe());

    let session = app.session;
    let checked = app.session_checked;

    Effect::new(move |_| {
        if must_leave(checked.get(), session.with(|s| s.is_some()), kicked.get()) {
            navigate.with_value(|nav| nav("/", replace_options()));
        }
    });

    // One watcher per session value; a refreshed token replaces it.
    let watcher = StoredValue::new_local(None::<SessionWatcher>);
    Effect::new(move |_| {
        let current = session.get();
        let next = current.map(|s| {
            let due_app = app.clone();
            let due_session = s.clone();
            let removed_app = app.clone();
            SessionWatcher::start(
                &s,
                move || {
                    let app = due_app.clone();
                    let s = due_session.clone();
                    spawn_local(async move {
                        let client = app.client.get_untracked();
                        match refresh_session(&client, &s).await {
                            Ok(fresh) => app.apply_auth_change(AuthChange::TokenRefreshed(fresh)),
                            Err(e) => {
                                warn!(error = %e, "token refresh failed");
                                app.expire_session();
                            }
                        }
                    });
                },
                move || removed_app.apply_auth_change(AuthChange::SignedOut),
            )
        });
        watcher.try_update_value(|w| *w = next);
    });
    on_cleanup(move || {
        watcher.try_update_value(|w| {
            w.take();
        });
    });

    let children = StoredValue::new(children);

    view! {
        <Show
            when=move || session.with(|s| s.is_some())
            fallback=|| view! {
                <div class="flex min-h-screen items-center justify-center text-muted-foreground">
                    <Spinner />
                </div>
            }
        >
            {move || children.with_value(|c| c())}
        </Show>
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ListMode {
    Loading,
    Empty,
    NoMatches,
    Grid,
}

#[component]
pub fn DashboardPage() -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let app = app_state.0.clone();
    let config = app.config.clone();
    let session = app.session;
    let client = app.client;

    let state = DashboardState::new();
    on_cleanup(move || state.dispose());

    let saving: RwSignal<bool> = RwSignal::new(false);
    let new_title: RwSignal<String> = RwSignal::new(String::new());
    let new_url: RwSignal<String> = RwSignal::new(String::new());

    let session_lost = Callback::new({
        let app = app.clone();
        move |_: ()| app.expire_session()
    });

    let mutator = move || {
        session.with_untracked(|s| {
            s.as_ref()
                .map(|s| state.mutator(client.get_untracked(), &s.user.id))
        })
    };

    let fail = move |e: MutationError| {
        if e.is_unauthorized() {
            session_lost.run(());
        }
        state.report(&e);
    };

    let identity = Memo::new(move |_| session.with(|s| s.as_ref().map(|s| s.user.id.clone())));

    let load = move || {
        let Some(m) = mutator() else {
            return;
        };
        spawn_local(async move {
            if let Err(e) = m.load().await {
                warn!(error = %e, "fetching bookmarks failed");
                if e.is_unauthorized() {
                    session_lost.run(());
                } else {
                    let _ = state
                        .error
                        .try_set(Some("Could not load your bookmarks.".to_string()));
                }
            }
            let _ = state.loading.try_set(false);
        });
    };

    // Initial fetch and realtime channel, redone whenever the signed-in user changes.
    let realtime = StoredValue::new_local(None::<LiveChannel>);
    Effect::new(move |_| {
        let owner = identity.get();
        realtime.try_update_value(|r| {
            r.take();
        });
        let Some(owner) = owner else {
            let _ = state.live.try_set(LiveStatus::Closed);
            return;
        };

        let token = session
            .with_untracked(|s| s.as_ref().map(|s| s.access_token.clone()))
            .unwrap_or_default();
        let _ = state.loading.try_set(true);

        let channel = LiveChannel::open(
            &config,
            &owner,
            &token,
            move |inbound| {
                if let Some(status) = apply_inbound(&state.store, inbound) {
                    let _ = state.live.try_set(status);
                }
            },
            move |status| {
                let _ = state.live.try_set(status);
            },
            // Pick up whatever changed while the socket was down.
            load,
        );
        realtime.try_update_value(|r| *r = Some(channel));

        load();
    });

    // Keep the channel's row filter working across token refreshes.
    Effect::new(move |_| {
        let token = session.with(|s| s.as_ref().map(|s| s.access_token.clone()));
        if let Some(token) = token {
            realtime.try_with_value(|r| {
                if let Some(r) = r {
                    r.update_access_token(&token);
                }
            });
        }
    });

    on_cleanup(move || {
        realtime.try_update_value(|r| {
            r.take();
        });
    });

    let on_add = move |ev: web_sys::SubmitEvent| {
        ev.prevent_default();
        let title = new_title.get_untracked();
        let url = new_url.get_untracked();

        if let Err(e) = validate_input(&title, &url) {
            state.report(&e);
            return;
        }
        let Some(m) = mutator() else {
            return;
        };

        state.error.set(None);
        new_title.set(String::new());
        new_url.set(String::new());

        spawn_local(async move {
            if let Err(e) = m.create(&title, &url).await {
                fail(e);
            }
        });
    };

    let on_delete = Callback::new(move |id: String| {
        let Some(m) = mutator() else {
            return;
        };
        spawn_local(async move {
            if let Err(e) = m.delete(&id).await {
                fail(e);
            }
        });
    });

    let on_edit = Callback::new(move |b: Bookmark| state.editing.set(Some(b)));

    let on_save = Callback::new(move |(id, title, url): (String, String, String)| {
        let Some(m) = mutator() else {
            return;
        };
        saving.set(true);
        spawn_local(async move {
            let result = m.update(&id, &title, &url).await;
            let _ = saving.try_set(false);
            // Close either way; a failed save was rolled back and reported.
            let _ = state.editing.try_set(None);
            if let Err(e) = result {
                fail(e);
            }
        });
    });

    let on_sign_out = {
        let app = app.clone();
        move |_| {
            let app = app.clone();
            spawn_local(async move {
                let client = app.client.get_untracked();
                sign_out(&client).await;
                app.apply_auth_change(AuthChange::SignedOut);
            });
        }
    };

    let email = move || {
        session.with(|s| {
            s.as_ref()
                .and_then(|s| s.user.email.clone())
                .unwrap_or_default()
        })
    };

    let count_label = move || {
        let n = state.visible().len();
        if n == 1 {
            "(1 item)".to_string()
        } else {
            format!("({n} items)")
        }
    };

    // Only a change of branch rebuilds the list; the grid itself is keyed.
    let mode = Memo::new(move |_| {
        if state.store.with(|s| s.is_empty()) {
            if state.loading.get() {
                ListMode::Loading
            } else {
                ListMode::Empty
            }
        } else if state.visible().is_empty() {
            ListMode::NoMatches
        } else {
            ListMode::Grid
        }
    });

    let list = move || match mode.get() {
        ListMode::Loading => view! {
            <div class="flex justify-center py-16 text-muted-foreground"><Spinner /></div>
        }
        .into_any(),
        ListMode::Empty => view! { <EmptyState /> }.into_any(),
        ListMode::NoMatches => view! {
            <div class="py-16 text-center text-sm text-muted-foreground">"No matches"</div>
        }
        .into_any(),
        ListMode::Grid => view! {
            <div class="grid grid-cols-1 gap-4 sm:grid-cols-2 lg:grid-cols-3">
                <For
                    each=move || state.visible()
                    // An edit or a confirmed create changes the key and redraws that card only.
                    key=|b| (b.id.clone(), b.title.clone(), b.url.clone())
                    children=move |b| view! { <BookmarkCard bookmark=b on_edit=on_edit on_delete=on_delete /> }
                />
            </div>
        }
        .into_any(),
    };

    info!("dashboard mounted");

    view! {
        <div class="min-h-screen bg-background">
            <header class="border-b">
                <div class="mx-auto flex h-14 w-full max-w-5xl items-center justify-between px-4">
                    <Logo />
                    <div class="flex items-center gap-3">
                        <LiveIndicator status=state.live />
                        <span class="hidden text-xs text-muted-foreground sm:inline">{email}</span>
                        <Button variant=ButtonVariant::Outline size=ButtonSize::Sm on:click=on_sign_out>
                            "Sign out"
                        </Button>
                    </div>
                </div>
            </header>

            <main class="mx-auto flex w-full max-w-5xl flex-col gap-6 px-4 py-8">
                <DismissableAlert message=state.error />

                <StatsBar stats=Signal::derive(move || state.stats()) />

                <form class="flex flex-col gap-3 rounded-xl border p-4 sm:flex-row sm:items-end" on:submit=on_add>
                    <div class="flex flex-1 flex-col gap-1.5">
                        <Label html_for="new-title">"Title"</Label>
                        <Input id="new-title" placeholder="Design Inspiration" bind_value=new_title class="h-9 text-sm" />
                    </div>
                    <div class="flex flex-1 flex-col gap-1.5">
                        <Label html_for="new-url">"URL"</Label>
                        <Input id="new-url" r#type="url" placeholder="https://example.com" bind_value=new_url class="h-9 text-sm" />
                    </div>
                    <Button size=ButtonSize::Default class="sm:w-auto w-full">"Add bookmark"</Button>
                </form>

                <div class="flex flex-col gap-3">
                    <div class="flex items-center justify-between gap-3">
                        <h2 class="text-sm font-semibold">
                            "Your bookmarks "
                            <span class="font-normal text-muted-foreground">{count_label}</span>
                        </h2>
                        <Input
                            r#type="search"
                            placeholder="Search title or URL"
                            aria_label="Search bookmarks"
                            bind_value=state.query
                            on_escape=Callback::new(move |_| state.query.set(String::new()))
                            class="h-8 max-w-xs text-sm"
                        />
                    </div>
                    {list}
                </div>
            </main>

            <EditModal editing=state.editing saving=saving on_save=on_save />
        </div>
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::still_checking(false, false, false, false)]
    #[case::signed_in(true, true, false, false)]
    #[case::no_session(true, false, false, true)]
    #[case::signed_out_elsewhere(true, true, true, true)]
    #[case::signed_out_before_check(false, false, true, true)]
    fn test_must_leave(
        #[case] checked: bool,
        #[case] has_session: bool,
        #[case] signed_out: bool,
        #[case] expected: bool,
    ) {
        assert_eq!(must_leave(checked, has_session, signed_out), expected);
    }

    #[test]
    fn test_replace_options_replace_history() {
        assert!(replace_options().replace);
    }
}
