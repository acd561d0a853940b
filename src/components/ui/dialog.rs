use icons::X;
use leptos::ev;
use leptos::prelude::*;
use leptos_dom::helpers::window_event_listener;
use leptos_ui::clx;
use tw_merge::*;

mod components {
    use super::*;
    clx! {DialogHeader, div, "flex flex-col gap-2 text-center sm:text-left"}
    clx! {DialogTitle, h3, "text-lg leading-none font-semibold"}
    clx! {DialogDescription, p, "text-muted-foreground text-sm"}
    clx! {DialogFooter, footer, "flex flex-col-reverse gap-2 sm:flex-row sm:justify-end"}
}

pub use components::*;

/* ========================================================== */
/*                     ✨ FUNCTIONS ✨                        */
/* ========================================================== */

/// Signal-driven modal. Backdrop click, the close button and Escape all call `on_close`.
#[component]
pub fn Dialog(
    #[prop(into)] open: Signal<bool>,
    #[prop(into)] on_close: Callback<()>,
    #[prop(optional, into)] class: String,
    children: ChildrenFn,
) -> impl IntoView {
    let merged_class = tw_merge!(
        "fixed top-[50%] left-[50%] z-60 flex w-full max-w-[calc(100%-2rem)] translate-x-[-50%] translate-y-[-50%] flex-col gap-4 rounded-2xl border bg-background p-6 shadow-lg sm:max-w-md",
        class
    );

    let key_handle = window_event_listener(ev::keydown, move |e: web_sys::KeyboardEvent| {
        if e.key() == "Escape" && open.get_untracked() {
            e.prevent_default();
            on_close.run(());
        }
    });
    on_cleanup(move || key_handle.remove());

    view! {
        <Show when=move || open.get() fallback=|| ().into_view()>
            <div
                data-name="DialogBackdrop"
                class="fixed inset-0 z-50 bg-black/50"
                on:click=move |_| on_close.run(())
            />
            <div data-name="DialogContent" role="dialog" aria-modal="true" class=merged_class.clone()>
                <button
                    type="button"
                    class="absolute top-4 right-4 rounded-sm p-1 focus:ring-2 focus:ring-ring focus:outline-none [&_svg:not([class*='size-'])]:size-4"
                    aria-label="Close dialog"
                    on:click=move |_| on_close.run(())
                >
                    <X />
                </button>
                {children()}
            </div>
        </Show>
    }
}
