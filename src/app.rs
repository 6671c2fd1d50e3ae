use leptos::prelude::*;
use leptos_meta::{MetaTags, Stylesheet, Title, provide_meta_context};
use leptos_router::{
    components::{Route, Router, Routes},
    path,
};

use crate::ui::{AdminHeader, token_storage};

pub fn shell(options: LeptosOptions) -> impl IntoView {
    view! {
        <!DOCTYPE html>
        <html lang="en">
            <head>
                <meta charset="utf-8"/>
                <meta name="viewport" content="width=device-width, initial-scale=1"/>
                <AutoReload options=options.clone() />
                <HydrationScripts options/>
                <MetaTags/>
            </head>
            <body>
                <App/>
            </body>
        </html>
    }
}

#[component]
pub fn App() -> impl IntoView {
    // Provides context that manages stylesheets, titles, meta tags, etc.
    provide_meta_context();

    view! {
        // id=leptos means cargo-leptos will hot-reload this stylesheet
        <Stylesheet id="leptos" href="/pkg/inkpost.css"/>

        <Title text="Inkpost Admin"/>

        <Router>
            <main class="min-h-screen bg-theme-primary">
                <Routes fallback=|| view! { <p class="p-8">"Page not found."</p> }>
                    <Route path=path!("/") view=StatusPage/>
                </Routes>
            </main>
        </Router>
    }
}

/// What the status page currently shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthView {
    Loading,
    Loaded(String),
    Failed(String),
}

/// Re-indent a JSON response body for display
pub fn pretty_json(text: &str) -> Result<String, String> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| format!("Invalid health response: {}", e))?;
    serde_json::to_string_pretty(&value).map_err(|e| e.to_string())
}

#[cfg(feature = "hydrate")]
async fn fetch_health() -> Result<String, String> {
    use gloo_net::http::Request;

    let response = Request::get("/health")
        .send()
        .await
        .map_err(|e| format!("Network error: {}", e))?;

    if !response.ok() {
        return Err(format!(
            "Health check failed with status {}",
            response.status()
        ));
    }

    let text = response
        .text()
        .await
        .map_err(|e| format!("Failed to read response: {}", e))?;
    pretty_json(&text)
}

/// Landing page of the admin: current server health as JSON
#[component]
fn StatusPage() -> impl IntoView {
    let health = RwSignal::new(HealthView::Loading);
    let signed_in = RwSignal::new(false);

    let reload = move || {
        health.set(HealthView::Loading);
        #[cfg(feature = "hydrate")]
        leptos::task::spawn_local(async move {
            health.set(match fetch_health().await {
                Ok(body) => HealthView::Loaded(body),
                Err(e) => HealthView::Failed(e),
            });
        });
    };

    // Effects only run in the browser
    Effect::new(move |_| {
        signed_in.set(token_storage::has_valid_access_token());
        reload();
    });

    view! {
        <AdminHeader
            back_href="/"
            back_label="Site"
            title="Server status"
            description="Live response from GET /health"
            actions=move || view! {
                <button
                    class="px-3 py-1.5 text-sm border border-theme rounded-lg hover:bg-theme-secondary"
                    on:click=move |_| reload()
                >
                    "Refresh"
                </button>
            }
        />

        <section class="max-w-4xl mx-auto px-4 py-6">
            <p class="mb-4 text-sm text-theme-secondary">
                {move || if signed_in.get() { "Signed in" } else { "Not signed in" }}
            </p>

            {move || match health.get() {
                HealthView::Loading => view! {
                    <p class="text-theme-tertiary">"Loading…"</p>
                }.into_any(),
                HealthView::Loaded(body) => view! {
                    <pre class="health-json p-4 rounded-lg bg-theme-secondary overflow-x-auto">{body}</pre>
                }.into_any(),
                HealthView::Failed(error) => view! {
                    <p class="error-message">{error}</p>
                }.into_any(),
            }}
        </section>
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pretty_json_indents() {
        let pretty = pretty_json(r#"{"status":"ok","database":"up"}"#).unwrap();
        assert!(pretty.contains("\n  \"status\": \"ok\""));
    }

    #[test]
    fn test_pretty_json_rejects_non_json() {
        let err = pretty_json("<html>").unwrap_err();
        assert!(err.starts_with("Invalid health response"));
    }
}
