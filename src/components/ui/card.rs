use leptos::prelude::*;
use leptos_ui::clx;

mod components {
    use super::*;
    clx! {Card, div, "bg-card text-card-foreground flex flex-col gap-3 rounded-xl border py-4 shadow-sm"}
    clx! {CardHeader, div, "flex flex-col items-start gap-1.5 px-4"}
    clx! {CardTitle, h2, "leading-snug font-semibold"}
    clx! {CardDescription, p, "text-muted-foreground text-sm"}
    clx! {CardFooter, footer, "flex items-center justify-between px-4", "gap-2"}

    // Dashboard stats.
    clx! {StatTile, div, "flex flex-col gap-1 rounded-xl border bg-card px-4 py-3 shadow-xs"}
    clx! {StatLabel, span, "text-xs uppercase tracking-wide text-muted-foreground"}
    clx! {StatValue, span, "truncate text-lg font-semibold"}
}

pub use components::*;
