//! Page header for admin screens
//!
//! A back link above the page title, with an optional description underneath
//! and an actions slot on the right.

use leptos::prelude::*;
use leptos_router::components::A;

#[component]
pub fn AdminHeader(
    /// Where the back link points
    #[prop(into)]
    back_href: String,
    #[prop(into)]
    back_label: String,
    #[prop(into)]
    title: String,
    #[prop(optional, into)]
    description: Option<String>,
    /// Buttons or links shown beside the title
    #[prop(optional, into)]
    actions: Option<ViewFn>,
) -> impl IntoView {
    view! {
        <header class="admin-header border-b border-theme bg-theme-primary">
            <div class="max-w-4xl mx-auto px-4 py-6">
                <A
                    href=back_href
                    attr:class="admin-header__back text-sm font-medium text-theme-secondary hover:text-theme-primary transition-colors"
                >
                    {format!("← {}", back_label)}
                </A>

                <div class="mt-2 flex items-start justify-between gap-4">
                    <div>
                        <h1 class="admin-header__title text-2xl font-bold text-theme-primary">
                            {title}
                        </h1>
                        {description.map(|text| view! {
                            <p class="admin-header__description mt-1 text-theme-secondary">{text}</p>
                        })}
                    </div>

                    {actions.map(|actions| view! {
                        <div class="admin-header__actions flex items-center gap-2">
                            {actions.run()}
                        </div>
                    })}
                </div>
            </div>
        </header>
    }
}
