use icons::X;
use leptos::prelude::*;
use leptos_ui::clx;

mod components {
    use super::*;
    clx! {Alert, div, "relative w-full rounded-lg border px-4 py-3 text-sm flex items-start gap-3"}
    clx! {AlertDescription, p, "flex-1 text-sm [&_p]:leading-relaxed"}
}

pub use components::*;

/// Error banner bound to `message`. The close button clears it.
#[component]
pub fn DismissableAlert(message: RwSignal<Option<String>>) -> impl IntoView {
    view! {
        <Show when=move || message.with(|m| m.is_some()) fallback=|| ().into_view()>
            <Alert class="border-destructive/30 bg-destructive/5" attr:role="alert">
                <AlertDescription class="text-destructive text-xs">
                    {move || message.get().unwrap_or_default()}
                </AlertDescription>
                <button
                    type="button"
                    class="rounded-sm p-0.5 text-destructive/70 hover:text-destructive [&_svg]:size-3.5"
                    aria-label="Dismiss"
                    on:click=move |_| message.set(None)
                >
                    <X />
                </button>
            </Alert>
        </Show>
    }
}
