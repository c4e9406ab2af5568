//! Browser-backed session and transport.
//!
//! [`HarvestBrowser`] launches Chrome, restores a captured login, waits for
//! the platform's web client to come up and snapshots its operation list and
//! feature switches. It then issues GraphQL calls through the client's own
//! dispatcher so requests carry whatever signing the client applies.

mod scripts;

use async_trait::async_trait;
use eoka::{Browser, Page};
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::config::{BrowserConfig, Config, DiscoveryConfig, PlatformConfig};
use crate::graphql::{FeatureFlagState, GraphqlRequest, OperationCatalog};
use crate::session::SessionState;
use crate::transport::GraphqlTransport;
use crate::{Error, Result};

/// Interval between checks on an in-flight dispatcher call.
const POLL_INTERVAL_MS: u64 = 100;

/// How long an uncollected call result may outlive the request timeout in the page.
const SLOT_GRACE_MS: u64 = 60_000;

/// A logged-in page with a discovered catalog.
pub struct HarvestBrowser {
    browser: Browser,
    page: Page,
    catalog: OperationCatalog,
    flags: FeatureFlagState,
    next_call: AtomicU64,
    slot_ttl_ms: u64,
}

impl HarvestBrowser {
    /// Launch, restore `session` and run discovery.
    pub async fn open(config: &Config, session: &SessionState) -> Result<Self> {
        let (browser, page) = launch(&config.browser).await?;
        restore_session(&page, &config.platform, session).await?;
        install_hooks(&page).await?;
        page.goto(&config.platform.landing_url()).await?;

        let (catalog, flags) = match discover(&page, &config.discovery).await {
            Ok(found) => found,
            Err(e) => {
                if let Err(close_err) = browser.close().await {
                    warn!("failed to close browser: {}", close_err);
                }
                return Err(e);
            }
        };
        info!(
            "discovered {} operations, {} feature switches",
            catalog.len(),
            flags.len()
        );

        Ok(Self {
            browser,
            page,
            catalog,
            flags,
            next_call: AtomicU64::new(0),
            slot_ttl_ms: config.pacing.request_timeout_ms + SLOT_GRACE_MS,
        })
    }

    pub fn catalog(&self) -> &OperationCatalog {
        &self.catalog
    }

    pub fn flags(&self) -> &FeatureFlagState {
        &self.flags
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Close the browser.
    pub async fn close(self) -> Result<()> {
        self.browser.close().await?;
        Ok(())
    }
}

/// Launch Chrome with the configured stealth settings and a blank page.
pub async fn launch(config: &BrowserConfig) -> Result<(Browser, Page)> {
    let stealth = eoka::StealthConfig {
        headless: config.headless,
        proxy: config.proxy.clone(),
        user_agent: config.user_agent.clone(),
        viewport_width: config.viewport.as_ref().map(|v| v.width).unwrap_or(1280),
        viewport_height: config.viewport.as_ref().map(|v| v.height).unwrap_or(720),
        ..Default::default()
    };

    debug!(
        "launching browser (headless: {}, proxy: {:?})",
        config.headless, config.proxy
    );
    let browser = Browser::launch_with_config(stealth).await?;
    let page = browser.new_page("about:blank").await?;
    Ok((browser, page))
}

/// Open the platform origin and put the captured cookies and storage in place.
///
/// Storage is origin-scoped, so this leaves the page on `base_url`.
pub async fn restore_session(
    page: &Page,
    platform: &PlatformConfig,
    session: &SessionState,
) -> Result<()> {
    page.goto(&platform.base_url).await?;

    for cookie in &session.cookies {
        page.set_cookie(
            &cookie.name,
            &cookie.value,
            cookie.domain.as_deref(),
            cookie.path.as_deref(),
        )
        .await?;
    }
    if !session.local_storage.is_empty() || !session.session_storage.is_empty() {
        page.execute(&scripts::restore_storage(
            &session.local_storage,
            &session.session_storage,
        ))
        .await?;
    }
    debug!(
        "restored {} cookies, {} localStorage, {} sessionStorage entries",
        session.cookies.len(),
        session.local_storage.len(),
        session.session_storage.len()
    );
    Ok(())
}

/// Register the init-state trap and dispatcher hook for every new document,
/// and arm the dispatcher hook in the current one.
///
/// Takes effect for the client on the next navigation.
pub async fn install_hooks(page: &Page) -> Result<()> {
    let session = page.session();
    session
        .add_script_to_evaluate_on_new_document(scripts::INIT_STATE_TRAP_JS)
        .await?;
    session
        .add_script_to_evaluate_on_new_document(scripts::INSTALL_DISPATCH_HOOK_JS)
        .await?;
    page.execute(scripts::INSTALL_DISPATCH_HOOK_JS).await?;
    Ok(())
}

/// Poll the page until the operation list, feature switches and dispatcher
/// are all available, or `discovery.attempts` is exhausted.
pub async fn discover(
    page: &Page,
    discovery: &DiscoveryConfig,
) -> Result<(OperationCatalog, FeatureFlagState)> {
    let attempts = discovery.attempts.max(1);
    let mut last = Error::Discovery("no discovery attempt made".into());
    for attempt in 1..=attempts {
        page.wait(discovery.wait_ms).await;
        match snapshot(page).await {
            Ok(found) => return Ok(found),
            Err(e) if e.is_retryable() => {
                debug!("discovery attempt {}/{}: {}", attempt, attempts, e);
                last = e;
            }
            Err(e) => return Err(e),
        }
    }
    Err(last)
}

/// Raw discovery readback from the page.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    #[serde(default)]
    operations: Value,
    #[serde(default)]
    init_state: Value,
    #[serde(default)]
    client_ready: bool,
}

/// Take one snapshot. Fails with a retryable error while anything is missing.
pub async fn snapshot(page: &Page) -> Result<(OperationCatalog, FeatureFlagState)> {
    let json: Option<String> = page.evaluate(&scripts::discover()).await?;
    let json = json.ok_or_else(|| Error::Discovery("page returned no snapshot".into()))?;
    let snap: Snapshot = serde_json::from_str(&json)?;

    let catalog = OperationCatalog::from_snapshot(&snap.operations)?;
    let flags = FeatureFlagState::from_init_state(&snap.init_state)?;
    if !snap.client_ready {
        return Err(Error::Discovery(
            "web client dispatcher not captured yet".into(),
        ));
    }
    Ok((catalog, flags))
}

/// Settled dispatcher call as parked in the page.
#[derive(Debug, Deserialize)]
struct Settled {
    ok: bool,
    #[serde(default)]
    value: Value,
    error: Option<String>,
}

#[async_trait]
impl GraphqlTransport for HarvestBrowser {
    /// Start the call in the page and poll its slot until it settles.
    ///
    /// Never returns on its own while the call is pending; the caller's
    /// timeout bounds it.
    async fn execute(&self, request: &GraphqlRequest) -> Result<Value> {
        let id = self.next_call.fetch_add(1, Ordering::Relaxed);
        debug!("dispatch #{} {} {}", id, request.method, request.path);

        self.page
            .execute(&scripts::dispatch(id, self.slot_ttl_ms, &request.dispatch_payload()))
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let poll = scripts::poll(id);
        loop {
            let settled: Option<String> = self
                .page
                .evaluate(&poll)
                .await
                .map_err(|e| Error::Transport(e.to_string()))?;
            if let Some(text) = settled {
                let settled: Settled = serde_json::from_str(&text)
                    .map_err(|e| Error::Transport(format!("unreadable dispatch result: {}", e)))?;
                return if settled.ok {
                    Ok(settled.value)
                } else {
                    Err(Error::Transport(
                        settled.error.unwrap_or_else(|| "dispatch failed".into()),
                    ))
                };
            }
            self.page.wait(POLL_INTERVAL_MS).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_decodes_partial_readback() {
        let snap: Snapshot = serde_json::from_str(r#"{"operations": null}"#).unwrap();
        assert!(snap.operations.is_null());
        assert!(snap.init_state.is_null());
        assert!(!snap.client_ready);
    }

    #[test]
    fn test_settled_error_slot() {
        let settled: Settled =
            serde_json::from_str(r#"{"ok": false, "error": "Rate limit exceeded"}"#).unwrap();
        assert!(!settled.ok);
        assert!(settled.value.is_null());
        assert_eq!(settled.error.as_deref(), Some("Rate limit exceeded"));
    }
}
