// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of GasWatch.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Portal session: lazily created cookie-carrying HTTP client, rate-limited
//! fetches with retry, the login sequence and the session probe.

use gaswatch_types::Credentials;
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER};
use reqwest::{Client, Method};
use scraper::Html;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::PortalConfig;
use crate::error::{PortalError, Result};
use crate::parser::{UsageParser, UsageReport, selector};
use crate::rate_limit::{RateGate, RetryPolicy, cancellable_sleep};
use crate::verify::{Outcome, ResponseClassifier};

const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,application/vnd.ms-excel;q=0.8,*/*;q=0.7";

/// One outbound request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    /// Sent as `application/x-www-form-urlencoded` when present
    pub form: Option<Vec<(String, String)>>,
    pub referer: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            query: Vec::new(),
            form: None,
            referer: None,
        }
    }

    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            method: Method::POST,
            form: Some(form),
            ..Self::get(url)
        }
    }

    #[must_use]
    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_owned(), value.to_owned()));
        self
    }

    #[must_use]
    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }
}

/// Response of a request that reached the portal and was not rejected.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    /// URL after redirects were followed
    pub final_url: String,
    pub bytes: Vec<u8>,
}

impl FetchedPage {
    /// 2xx and 302 count as request-level success; redirects are judged by
    /// the verification heuristics, not here.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status) || self.status == 302
    }

    fn is_transient_failure(&self) -> bool {
        self.status >= 500
    }
}

/// Client for one portal account.
///
/// Every request goes through one [`RateGate`], so calls on the same client
/// are serialised even when issued from several tasks.
#[derive(Debug)]
pub struct PortalClient {
    config: PortalConfig,
    credentials: Credentials,
    session: Mutex<Option<Client>>,
    gate: RateGate,
    retry: RetryPolicy,
    classifier: ResponseClassifier,
    parser: UsageParser,
}

impl PortalClient {
    pub fn new(config: PortalConfig, credentials: Credentials) -> Result<Self> {
        config.validate()?;
        let gate = RateGate::new(config.min_request_interval());
        let retry = RetryPolicy::new(config.max_attempts, config.backoff_base());

        Ok(Self {
            config,
            credentials,
            session: Mutex::new(None),
            gate,
            retry,
            classifier: ResponseClassifier::default(),
            parser: UsageParser::default(),
        })
    }

    /// Replace the default indicator table used for every classification.
    #[must_use]
    pub fn with_classifier(mut self, classifier: ResponseClassifier) -> Self {
        self.parser = UsageParser::new(classifier.clone());
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn classifier(&self) -> &ResponseClassifier {
        &self.classifier
    }

    pub fn has_session(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Drop the session and its cookies. The next request starts a new one.
    pub fn close(&self) {
        if self.session.lock().take().is_some() {
            debug!("Portal session closed");
        }
    }

    fn session(&self) -> Result<Client> {
        let mut session = self.session.lock();
        if let Some(client) = session.as_ref() {
            return Ok(client.clone());
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .cookie_store(true)
            .timeout(self.config.request_timeout())
            .user_agent(self.config.user_agent.as_str())
            .default_headers(headers)
            .build()
            .map_err(|e| PortalError::Config(format!("Failed to build HTTP client: {e}")))?;

        debug!("Created new portal session for {}", self.credentials.masked_username());
        *session = Some(client.clone());
        Ok(client)
    }

    async fn send_once(client: &Client, request: &FetchRequest) -> reqwest::Result<FetchedPage> {
        let mut builder = client.request(request.method.clone(), &request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(form) = &request.form {
            builder = builder.form(form);
        }
        if let Some(referer) = &request.referer {
            builder = builder.header(REFERER, referer);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let bytes = response.bytes().await?.to_vec();

        Ok(FetchedPage {
            status,
            final_url,
            bytes,
        })
    }

    /// Issue one logical request: wait for the rate gate, then try up to
    /// `max_attempts` times.
    ///
    /// Transport errors and 5xx responses are retried with exponential
    /// backoff; any other non-success status is returned immediately.
    pub async fn fetch(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage> {
        let client = self.session()?;
        let _permit = self.gate.acquire(cancel).await?;
        let mut retry = self.retry.start();

        loop {
            let attempt = retry.begin_attempt();
            debug!(
                "🌐 [PORTAL] {} {} (attempt {}/{})",
                request.method,
                request.url,
                attempt,
                retry.max_attempts()
            );

            let sent = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(PortalError::Cancelled),
                sent = Self::send_once(&client, request) => sent,
            };

            let (status, reason) = match sent {
                Ok(page) if page.is_success() => return Ok(page),
                Ok(page) if page.is_transient_failure() => {
                    (Some(page.status), format!("HTTP {}", page.status))
                }
                Ok(page) => {
                    error!(
                        "❌ [PORTAL] {} {} returned HTTP {}",
                        request.method, request.url, page.status
                    );
                    return Err(PortalError::api_status(
                        page.status,
                        format!("{} {}", request.method, request.url),
                    ));
                }
                Err(e) => (e.status().map(|s| s.as_u16()), e.to_string()),
            };

            let Some(delay) = retry.backoff() else {
                error!(
                    "❌ [PORTAL] {} {} failed after {} attempts: {}",
                    request.method, request.url, attempt, reason
                );
                let message = format!(
                    "{} {} failed after {attempt} attempts: {reason}",
                    request.method, request.url
                );
                return Err(match status {
                    Some(status) => PortalError::api_status(status, message),
                    None => PortalError::api(message),
                });
            };

            warn!(
                "⚠️ [PORTAL] Request failed (attempt {}/{}): {}. Retrying in {:?}",
                attempt,
                retry.max_attempts(),
                reason,
                delay
            );
            cancellable_sleep(delay, cancel).await?;
        }
    }

    /// Probe the protected landing page.
    ///
    /// Never fails: any error or non-OK classification means "not
    /// authenticated". Without a session no request is made at all.
    pub async fn check_session(&self, cancel: &CancellationToken) -> bool {
        if !self.has_session() {
            debug!("No portal session yet");
            return false;
        }

        let url = self.config.url(&self.config.endpoints.usage_landing);
        match self.fetch(&FetchRequest::get(url), cancel).await {
            Ok(page) => match self.classifier.classify(Some(&page.final_url), &page.bytes) {
                Outcome::Ok => true,
                outcome => {
                    debug!("Session probe failed: {:?}", outcome);
                    false
                }
            },
            Err(e) => {
                debug!("Session probe request failed: {}", e);
                false
            }
        }
    }

    /// Log in unless the current session still works.
    pub async fn ensure_authenticated(&self, cancel: &CancellationToken) -> Result<()> {
        if self.check_session(cancel).await {
            debug!("Existing portal session is still valid");
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(PortalError::Cancelled);
        }
        self.login(cancel).await
    }

    /// Run the three-step login: scrape the form, post it, warm the session.
    pub async fn login(&self, cancel: &CancellationToken) -> Result<()> {
        if !self.credentials.is_complete() {
            return Err(PortalError::Authentication(
                "username and password are required".to_owned(),
            ));
        }
        info!(
            "🔐 [PORTAL] Logging in as {}",
            self.credentials.masked_username()
        );

        let endpoints = &self.config.endpoints;
        let login_url = self.config.url(&endpoints.login_page);
        let page = self
            .fetch(&FetchRequest::get(login_url.as_str()), cancel)
            .await?;
        // Never post credentials into an error or maintenance page
        self.classifier
            .classify_portal_error(&page.final_url, &page.bytes)
            .into_result("login page")?;
        let mut form = hidden_fields(&String::from_utf8_lossy(&page.bytes))?;
        debug!("Scraped {} hidden login form fields", form.len());

        form.push(("username".to_owned(), self.credentials.username().to_owned()));
        form.push(("password".to_owned(), self.credentials.password().to_owned()));
        form.push(("button.Login".to_owned(), "Login".to_owned()));

        let auth_url = self.config.url(&endpoints.authenticate);
        let page = self
            .fetch(
                &FetchRequest::post_form(auth_url.as_str(), form).referer(login_url),
                cancel,
            )
            .await?;
        self.verify_login_step(&page, &auth_url, "credential submission")?;

        let landing_url = self.config.url(&endpoints.usage_landing);
        let page = self
            .fetch(&FetchRequest::get(landing_url.as_str()), cancel)
            .await?;
        self.verify_login_step(&page, &landing_url, "session warm-up")?;

        info!("✅ [PORTAL] Logged in");
        Ok(())
    }

    /// Any non-OK classification during login means the credentials or the
    /// session were rejected.
    fn verify_login_step(&self, page: &FetchedPage, request_url: &str, step: &str) -> Result<()> {
        // The authenticate action's own URL matches the login markers, so
        // the URL only counts once a redirect moved us elsewhere.
        let final_url = (page.final_url != request_url).then_some(page.final_url.as_str());

        match self.classifier.classify(final_url, &page.bytes) {
            Outcome::Ok => Ok(()),
            Outcome::AuthRequired(indicator) | Outcome::PortalError(indicator) => {
                warn!("🔐 [PORTAL] Login {} rejected: {}", step, indicator);
                Err(PortalError::Authentication(format!(
                    "{step} rejected: {indicator}"
                )))
            }
        }
    }

    /// Download and parse the current billing period's daily usage.
    pub async fn download_usage(&self, cancel: &CancellationToken) -> Result<UsageReport> {
        let endpoints = &self.config.endpoints;
        let request = FetchRequest::get(self.config.url(&endpoints.usage_download))
            .query("billingPeriod", &endpoints.billing_period)
            .referer(self.config.url(&endpoints.usage_page));

        let page = self.fetch(&request, cancel).await?;
        info!(
            "📥 [PORTAL] Downloaded usage payload: {} bytes (HTTP {})",
            page.bytes.len(),
            page.status
        );

        self.classifier
            .classify_url(&page.final_url)
            .into_result("usage download")?;
        self.parser.parse(&page.bytes)
    }

    /// Log in and close the session again; no data is fetched.
    pub async fn verify_credentials(&self, cancel: &CancellationToken) -> Result<()> {
        let result = self.login(cancel).await;
        self.close();
        result
    }
}

/// Name/value pairs of every hidden `<input>` on a page.
fn hidden_fields(html: &str) -> Result<Vec<(String, String)>> {
    let document = Html::parse_document(html);
    let inputs = selector("input")?;

    Ok(document
        .select(&inputs)
        .filter(|input| {
            input
                .value()
                .attr("type")
                .is_some_and(|kind| kind.eq_ignore_ascii_case("hidden"))
        })
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value").unwrap_or_default();
            Some((name.to_owned(), value.to_owned()))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_fields_scraped() {
        let html = r#"<html><form action="authenticate.html" method="post">
            <input type="HIDDEN" name="formId" value="loginForm">
            <input type="hidden" name="__RequestVerificationToken" value="abc123">
            <input type="hidden" value="nameless">
            <input type="text" name="username">
            <input type="password" name="password">
        </form></html>"#;
        let fields = hidden_fields(html).unwrap();
        assert_eq!(
            fields,
            vec![
                ("formId".to_owned(), "loginForm".to_owned()),
                ("__RequestVerificationToken".to_owned(), "abc123".to_owned()),
            ]
        );
    }

    #[test]
    fn test_success_statuses() {
        let page = |status| FetchedPage {
            status,
            final_url: String::new(),
            bytes: Vec::new(),
        };
        assert!(page(200).is_success());
        assert!(page(204).is_success());
        assert!(page(302).is_success());
        assert!(!page(404).is_success());
        assert!(page(503).is_transient_failure());
        assert!(!page(403).is_transient_failure());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = PortalConfig {
            base_url: "not a url".to_owned(),
            ..Default::default()
        };
        let result = PortalClient::new(config, Credentials::new("user", "pw"));
        assert!(matches!(result, Err(PortalError::Config(_))));
    }

    #[tokio::test]
    async fn test_login_without_credentials_fails_fast() {
        let client = PortalClient::new(
            PortalConfig::for_base_url("http://127.0.0.1:9"),
            Credentials::new("", ""),
        )
        .unwrap();
        let result = client.login(&CancellationToken::new()).await;
        assert!(matches!(result, Err(PortalError::Authentication(_))));
        assert!(!client.has_session());
    }
}
