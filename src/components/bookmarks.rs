use crate::components::ui::{
    Button, ButtonSize, ButtonVariant, Card, CardDescription, CardFooter, CardHeader, CardTitle,
    Dialog, DialogDescription, DialogFooter, DialogHeader, DialogTitle, Input, Label, Spinner,
    StatLabel, StatTile, StatValue,
};
use crate::derived::{
    avatar_url, display_hostname, favicon_url, relative_time, smart_tag, SmartTag, Stats,
};
use crate::models::Bookmark;
use crate::realtime::LiveStatus;
use crate::store::validate_input;
use chrono::Utc;
use leptos::prelude::*;

fn tag_class(tag: SmartTag) -> &'static str {
    match tag {
        SmartTag::Video => "bg-red-50 text-red-700 ring-red-200",
        SmartTag::Code => "bg-zinc-100 text-zinc-800 ring-zinc-300",
        SmartTag::Article => "bg-amber-50 text-amber-700 ring-amber-200",
        SmartTag::Design => "bg-fuchsia-50 text-fuchsia-700 ring-fuchsia-200",
        SmartTag::Social => "bg-sky-50 text-sky-700 ring-sky-200",
        SmartTag::Link => "bg-muted text-muted-foreground ring-border",
    }
}

#[component]
pub fn Logo() -> impl IntoView {
    view! {
        <a href="/" class="inline-flex items-center gap-2 text-sm font-semibold text-foreground">
            <span class="inline-flex size-7 items-center justify-center rounded-lg bg-primary text-primary-foreground">
                "S"
            </span>
            "Savora"
        </a>
    }
}

#[component]
pub fn LiveIndicator(#[prop(into)] status: Signal<LiveStatus>) -> impl IntoView {
    let label = move || match status.get() {
        LiveStatus::Connecting => "Connecting…",
        LiveStatus::Live => "Live Sync Active",
        LiveStatus::Closed => "Offline",
    };
    let dot = move || match status.get() {
        LiveStatus::Connecting => "size-2 rounded-full bg-amber-400",
        LiveStatus::Live => "size-2 rounded-full bg-emerald-500 animate-pulse",
        LiveStatus::Closed => "size-2 rounded-full bg-zinc-400",
    };

    view! {
        <span class="inline-flex items-center gap-2 text-xs text-muted-foreground" data-name="LiveIndicator">
            <span class=dot />
            {label}
        </span>
    }
}

#[component]
pub fn StatsBar(#[prop(into)] stats: Signal<Stats>) -> impl IntoView {
    let total = move || stats.with(|s| s.total.to_string());
    let top = move || {
        stats.with(|s| s.top_source.clone().unwrap_or_else(|| "None".to_string()))
    };
    let last = move || {
        stats.with(|s| {
            s.last_added
                .map(|t| relative_time(t, Utc::now()))
                .unwrap_or_else(|| "Never".to_string())
        })
    };

    view! {
        <div class="grid grid-cols-1 gap-3 sm:grid-cols-3">
            <StatTile>
                <StatLabel>"Total Bookmarks"</StatLabel>
                <StatValue>{total}</StatValue>
            </StatTile>
            <StatTile>
                <StatLabel>"Top Source"</StatLabel>
                <StatValue>{top}</StatValue>
            </StatTile>
            <StatTile>
                <StatLabel>"Last Added"</StatLabel>
                <StatValue>{last}</StatValue>
            </StatTile>
        </div>
    }
}

#[component]
pub fn EmptyState() -> impl IntoView {
    view! {
        <div class="flex flex-col items-center justify-center gap-2 rounded-xl border border-dashed px-6 py-16 text-center">
            <svg
                xmlns="http://www.w3.org/2000/svg"
                width="28"
                height="28"
                viewBox="0 0 24 24"
                fill="none"
                stroke="currentColor"
                stroke-width="2"
                stroke-linecap="round"
                stroke-linejoin="round"
                class="text-muted-foreground"
                aria-hidden="true"
            >
                <path d="m19 21-7-4-7 4V5a2 2 0 0 1 2-2h10a2 2 0 0 1 2 2v16z" />
            </svg>
            <div class="text-sm font-medium">"No bookmarks yet"</div>
            <div class="text-xs text-muted-foreground">"Add your first link above and it will show up here."</div>
        </div>
    }
}

#[component]
pub fn BookmarkCard(
    bookmark: Bookmark,
    #[prop(into)] on_edit: Callback<Bookmark>,
    #[prop(into)] on_delete: Callback<String>,
) -> impl IntoView {
    let pending = bookmark.is_pending();
    let tag = smart_tag(&bookmark.url);
    let host = display_hostname(&bookmark.url);
    let added = relative_time(bookmark.created_at, Utc::now());

    let icon_failed: RwSignal<bool> = RwSignal::new(false);
    let favicon = favicon_url(&host);
    let avatar = avatar_url(&host);
    let icon_src = move || {
        if icon_failed.get() {
            avatar.clone()
        } else {
            favicon.clone()
        }
    };

    let id_for_delete = bookmark.id.clone();
    let href = bookmark.url.clone();
    let icon_href = bookmark.url.clone();
    let open_href = bookmark.url.clone();
    let title = bookmark.title.clone();
    let host_alt = host.clone();

    view! {
        <Card
            class=if pending { "opacity-60" } else { "group transition-colors hover:ring-1 hover:ring-border" }
            attr:data-pending=pending.to_string()
        >
            <CardHeader>
                <div class="flex w-full items-center justify-between gap-2">
                    <span class=format!(
                        "inline-flex items-center rounded-md px-2 py-0.5 text-[11px] font-medium ring-1 ring-inset {}",
                        tag_class(tag),
                    )>{tag.to_string()}</span>
                    <Show when=move || pending fallback=|| ().into_view()>
                        <Spinner class="size-3.5 text-muted-foreground" />
                    </Show>
                </div>
                <div class="flex min-w-0 items-start gap-3">
                    <a
                        href=icon_href
                        target="_blank"
                        rel="noopener noreferrer"
                        class="flex size-10 shrink-0 items-center justify-center overflow-hidden rounded-lg border bg-muted"
                    >
                        <img
                            src=icon_src
                            alt=host_alt
                            class="size-5 object-contain"
                            on:error=move |_| icon_failed.set(true)
                        />
                    </a>
                    <div class="min-w-0 flex-1">
                        <CardTitle class="line-clamp-2 text-sm">
                            <a href=href target="_blank" rel="noopener noreferrer" class="hover:underline">
                                {title}
                            </a>
                        </CardTitle>
                        <CardDescription class="truncate text-xs">{host}</CardDescription>
                    </div>
                </div>
            </CardHeader>

            <CardFooter>
                <span class="text-xs text-muted-foreground">{added}</span>
                <div class="flex items-center gap-1">
                    <Button
                        variant=ButtonVariant::Ghost
                        size=ButtonSize::Icon
                        class="h-7 w-7"
                        attr:title="Edit"
                        attr:disabled=pending
                        on:click=move |_| on_edit.run(bookmark.clone())
                    >
                        <svg
                            xmlns="http://www.w3.org/2000/svg"
                            width="16"
                            height="16"
                            viewBox="0 0 24 24"
                            fill="none"
                            stroke="currentColor"
                            stroke-width="2"
                            stroke-linecap="round"
                            stroke-linejoin="round"
                            class="text-muted-foreground"
                            aria-hidden="true"
                        >
                            <path d="M12 20h9" />
                            <path d="M16.5 3.5a2.121 2.121 0 0 1 3 3L7 19l-4 1 1-4Z" />
                        </svg>
                    </Button>
                    <a
                        href=open_href
                        target="_blank"
                        rel="noopener noreferrer"
                        title="Open Link"
                        class="inline-flex h-7 w-7 items-center justify-center rounded-md text-muted-foreground hover:bg-accent hover:text-accent-foreground"
                    >
                        <svg
                            xmlns="http://www.w3.org/2000/svg"
                            width="16"
                            height="16"
                            viewBox="0 0 24 24"
                            fill="none"
                            stroke="currentColor"
                            stroke-width="2"
                            stroke-linecap="round"
                            stroke-linejoin="round"
                            aria-hidden="true"
                        >
                            <path d="M15 3h6v6" />
                            <path d="M10 14 21 3" />
                            <path d="M18 13v6a2 2 0 0 1-2 2H5a2 2 0 0 1-2-2V8a2 2 0 0 1 2-2h6" />
                        </svg>
                    </a>
                    <Button
                        variant=ButtonVariant::Ghost
                        size=ButtonSize::Icon
                        class="h-7 w-7 text-destructive"
                        attr:title="Delete"
                        attr:disabled=pending
                        on:click=move |_| on_delete.run(id_for_delete.clone())
                    >
                        <svg
                            xmlns="http://www.w3.org/2000/svg"
                            width="16"
                            height="16"
                            viewBox="0 0 24 24"
                            fill="none"
                            stroke="currentColor"
                            stroke-width="2"
                            stroke-linecap="round"
                            stroke-linejoin="round"
                            aria-hidden="true"
                        >
                            <path d="M3 6h18" />
                            <path d="M19 6v14a2 2 0 0 1-2 2H7a2 2 0 0 1-2-2V6" />
                            <path d="M8 6V4a2 2 0 0 1 2-2h4a2 2 0 0 1 2 2v2" />
                        </svg>
                    </Button>
                </div>
            </CardFooter>
        </Card>
    }
}

/// Edit form for the bookmark in `editing`. `on_save` gets `(id, title, url)`;
/// the caller closes the modal by clearing `editing` once the save lands.
#[component]
pub fn EditModal(
    editing: RwSignal<Option<Bookmark>>,
    #[prop(into)] saving: Signal<bool>,
    #[prop(into)] on_save: Callback<(String, String, String)>,
) -> impl IntoView {
    let title: RwSignal<String> = RwSignal::new(String::new());
    let url: RwSignal<String> = RwSignal::new(String::new());
    let error: RwSignal<Option<String>> = RwSignal::new(None);

    // Prefill whenever a different bookmark is opened.
    Effect::new(move |_| {
        if let Some(b) = editing.get() {
            title.set(b.title);
            url.set(b.url);
            error.set(None);
        }
    });

    let on_submit = move |ev: web_sys::SubmitEvent| {
        ev.prevent_default();
        let Some(id) = editing.with_untracked(|b| b.as_ref().map(|b| b.id.clone())) else {
            return;
        };
        match validate_input(&title.get_untracked(), &url.get_untracked()) {
            Ok(patch) => {
                error.set(None);
                on_save.run((id, patch.title, patch.url));
            }
            Err(e) => error.set(Some(e.banner_message())),
        }
    };

    view! {
        <Dialog
            open=Signal::derive(move || editing.with(|b| b.is_some()))
            on_close=Callback::new(move |_| editing.set(None))
        >
            <DialogHeader>
                <DialogTitle>"Edit bookmark"</DialogTitle>
                <DialogDescription>"Update the title or link."</DialogDescription>
            </DialogHeader>

            <form class="flex flex-col gap-3" on:submit=on_submit>
                <div class="flex flex-col gap-1.5">
                    <Label html_for="edit-title">"Title"</Label>
                    <Input id="edit-title" bind_value=title required=true class="h-8 text-sm" />
                </div>
                <div class="flex flex-col gap-1.5">
                    <Label html_for="edit-url">"URL"</Label>
                    <Input id="edit-url" r#type="url" bind_value=url required=true class="h-8 text-sm" />
                </div>

                <Show when=move || error.with(|e| e.is_some()) fallback=|| ().into_view()>
                    <div class="text-xs text-destructive">{move || error.get().unwrap_or_default()}</div>
                </Show>

                <DialogFooter>
                    <Button
                        variant=ButtonVariant::Outline
                        size=ButtonSize::Sm
                        attr:r#type="button"
                        on:click=move |_| editing.set(None)
                    >
                        "Cancel"
                    </Button>
                    <Button size=ButtonSize::Sm attr:disabled=move || saving.get()>
                        <span class="inline-flex items-center gap-2">
                            <Show when=move || saving.get() fallback=|| ().into_view()>
                                <Spinner />
                            </Show>
                            {move || if saving.get() { "Saving..." } else { "Save changes" }}
                        </span>
                    </Button>
                </DialogFooter>
            </form>
        </Dialog>
    }
}
