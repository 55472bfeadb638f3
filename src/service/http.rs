//! HTTP implementation of the lending service protocol
//!
//! Talks to the real service with a cookie-holding reqwest client. The borrow
//! handshake is three form posts (grant access, browse, create token); page
//! authorization rides the cookie jar established by the token step, with the
//! token value retained on the [`Loan`] for bookkeeping and release.

use regex::Regex;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, REFERER};
use std::sync::OnceLock;
use url::Url;

use crate::config::ServiceConfig;
use crate::error::{AuthError, Error, FetchError, LoanError, MetadataError, Result};
use crate::types::{Credentials, Loan, Manifest, PageDescriptor, Session, TitleId};

use super::LendingService;

const LOGIN_PATH: &str = "/account/login";
const LOGOUT_PATH: &str = "/account/logout";
const LOAN_PATH: &str = "/services/loans/loan/";
const GRANT_PATH: &str = "/services/loans/loan/searchInside.php";
const DETAILS_PATH: &str = "/details/";

/// Production [`LendingService`] speaking HTTPS to the lending service.
pub struct HttpLendingService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLendingService {
    /// Build a client for the configured service endpoint.
    ///
    /// The client keeps a cookie store; the session and loan tokens issued by
    /// the service live there and authorize subsequent requests.
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url).map_err(|e| Error::Config {
            message: format!("invalid service base URL {:?}: {e}", config.base_url),
            key: Some("service.base_url".to_string()),
        })?;
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout)
            .user_agent(concat!("lendfetch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base.as_str().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Headers the image servers expect on page requests.
    fn image_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(referer) = HeaderValue::from_str(&format!("{}/", self.base_url)) {
            headers.insert(REFERER, referer);
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("image/avif,image/webp,image/apng,image/*,*/*;q=0.8"),
        );
        headers
    }

    async fn post_loan_action(
        &self,
        path: &str,
        action: &str,
        title: &TitleId,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(self.url(path))
            .form(&[("action", action), ("identifier", title.as_str())])
            .send()
            .await
    }
}

#[async_trait::async_trait]
impl LendingService for HttpLendingService {
    async fn login(&self, credentials: &Credentials) -> std::result::Result<Session, AuthError> {
        tracing::info!(account = %credentials.email, "Logging in to lending service");

        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .form(&[
                ("username", credentials.email.as_str()),
                ("password", credentials.password()),
                ("remember", "true"),
                ("action", "login"),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Network {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AuthError::InvalidCredentials);
        }
        if !status.is_success() {
            return Err(AuthError::Network {
                reason: format!("login returned status {status}"),
            });
        }

        // The service reports soft failures inside a 200 body.
        if let Ok(body) = response.json::<serde_json::Value>().await {
            match body.get("status").and_then(|s| s.as_str()) {
                Some("bad_login") => return Err(AuthError::InvalidCredentials),
                Some("locked") => {
                    let reason = body
                        .get("message")
                        .and_then(|m| m.as_str())
                        .unwrap_or("account locked")
                        .to_string();
                    return Err(AuthError::Lockout { reason });
                }
                _ => {}
            }
        }

        tracing::info!(account = %credentials.email, "Login succeeded");
        Ok(Session::new(credentials.email.clone()))
    }

    async fn logout(&self, session: &Session) -> std::result::Result<(), AuthError> {
        tracing::debug!(account = %session.account, "Logging out");
        self.client
            .get(self.url(LOGOUT_PATH))
            .send()
            .await
            .map_err(|e| AuthError::Network {
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn acquire_loan(
        &self,
        _session: &Session,
        title: &TitleId,
    ) -> std::result::Result<Loan, LoanError> {
        // Grant-access is advisory; a refusal here is not a borrow failure.
        if let Err(e) = self.post_loan_action(GRANT_PATH, "grant_access", title).await {
            tracing::debug!(title = %title, error = %e, "Grant access request failed");
        }

        let response = self
            .post_loan_action(LOAN_PATH, "browse_book", title)
            .await
            .map_err(|e| LoanError::Network {
                title: title.to_string(),
                reason: e.to_string(),
            })?;
        check_loan_response(response, title).await?;

        let response = self
            .post_loan_action(LOAN_PATH, "create_token", title)
            .await
            .map_err(|e| LoanError::Network {
                title: title.to_string(),
                reason: e.to_string(),
            })?;
        let response = check_loan_response(response, title).await?;

        let body: serde_json::Value =
            response.json().await.map_err(|e| LoanError::Network {
                title: title.to_string(),
                reason: format!("malformed loan token response: {e}"),
            })?;

        match body.get("token").and_then(|t| t.as_str()) {
            Some(token) if !token.is_empty() => {
                tracing::info!(title = %title, "Loan acquired");
                Ok(Loan::new(title.clone(), token))
            }
            _ => Err(LoanError::Unavailable {
                title: title.to_string(),
                reason: "no loan token granted; the account may lack permission to borrow"
                    .to_string(),
            }),
        }
    }

    async fn release_loan(
        &self,
        _session: &Session,
        loan: &Loan,
    ) -> std::result::Result<(), LoanError> {
        let title = &loan.title;
        let response = self
            .post_loan_action(LOAN_PATH, "return_loan", title)
            .await
            .map_err(|e| LoanError::Network {
                title: title.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let acknowledged =
            status.is_success() && body.get("success").and_then(|s| s.as_bool()) == Some(true);
        if acknowledged {
            tracing::info!(title = %title, "Loan returned");
            Ok(())
        } else {
            Err(LoanError::Network {
                title: title.to_string(),
                reason: format!("return was not acknowledged (status {status})"),
            })
        }
    }

    async fn page_manifest(
        &self,
        _session: &Session,
        loan: &Loan,
    ) -> std::result::Result<Manifest, MetadataError> {
        let title = &loan.title;
        tracing::info!(title = %title, "Fetching title manifest");

        let details = self
            .client
            .get(format!("{}{}{}", self.base_url, DETAILS_PATH, title))
            .send()
            .await
            .map_err(|e| MetadataError::Network(e.to_string()))?
            .text()
            .await
            .map_err(|e| MetadataError::Network(e.to_string()))?;

        let manifest_url = extract_manifest_url(&details).ok_or_else(|| {
            MetadataError::Malformed("details page has no reader manifest URL".to_string())
        })?;

        let body: serde_json::Value = self
            .client
            .get(&manifest_url)
            .send()
            .await
            .map_err(|e| MetadataError::Network(e.to_string()))?
            .json()
            .await
            .map_err(|e| MetadataError::Malformed(format!("manifest is not JSON: {e}")))?;

        parse_manifest(&body)
    }

    async fn fetch_page(
        &self,
        _session: &Session,
        _loan: &Loan,
        descriptor: &PageDescriptor,
    ) -> std::result::Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(&descriptor.locator)
            .headers(self.image_headers())
            .send()
            .await
            .map_err(classify_send_error)?;

        classify_fetch_status(response.status())?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transient(format!("failed to read page body: {e}")))?;
        Ok(bytes.to_vec())
    }
}

/// Map a loan-endpoint response to a typed refusal, passing successes through.
async fn check_loan_response(
    response: reqwest::Response,
    title: &TitleId,
) -> std::result::Result<reqwest::Response, LoanError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(LoanError::RateLimited {
            title: title.to_string(),
        });
    }
    if status == StatusCode::BAD_REQUEST {
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let reason = body
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or("the service refused the loan")
            .to_string();
        return Err(LoanError::Unavailable {
            title: title.to_string(),
            reason,
        });
    }
    if !status.is_success() {
        return Err(LoanError::Network {
            title: title.to_string(),
            reason: format!("loan endpoint returned status {status}"),
        });
    }
    Ok(response)
}

/// Pull the reader manifest URL out of the details page markup.
///
/// The page embeds it as `"url":"//<host>/...&..."` inside a script
/// block, protocol-relative and with ampersands JSON-escaped.
fn extract_manifest_url(details_page: &str) -> Option<String> {
    static URL_RE: OnceLock<Regex> = OnceLock::new();
    let re = URL_RE.get_or_init(|| {
        #[allow(clippy::expect_used)]
        Regex::new(r#""url":"((?:https?:)?//[^"]+)""#).expect("manifest URL pattern is valid")
    });

    let raw = re.captures(details_page)?.get(1)?.as_str();
    let unescaped = raw.replace("\\u0026", "&");
    Some(if unescaped.starts_with("//") {
        format!("https:{unescaped}")
    } else {
        unescaped
    })
}

/// Build a [`Manifest`] from the reader's JSON payload.
fn parse_manifest(body: &serde_json::Value) -> std::result::Result<Manifest, MetadataError> {
    let data = body
        .get("data")
        .ok_or_else(|| MetadataError::Malformed("manifest has no data object".to_string()))?;
    let metadata = data.get("metadata").cloned().unwrap_or_default();
    let reader = data
        .get("brOptions")
        .ok_or_else(|| MetadataError::Malformed("manifest has no reader options".to_string()))?;

    let title = reader
        .get("bookTitle")
        .and_then(|t| t.as_str())
        .unwrap_or("unknown")
        .trim()
        .to_string();

    let mut locators = Vec::new();
    if let Some(spreads) = reader.get("data").and_then(|d| d.as_array()) {
        for spread in spreads {
            let Some(pages) = spread.as_array() else {
                continue;
            };
            for page in pages {
                if let Some(uri) = page.get("uri").and_then(|u| u.as_str()) {
                    locators.push(uri.to_string());
                }
            }
        }
    }

    if locators.is_empty() {
        return Err(MetadataError::Malformed(
            "no page locators found in manifest".to_string(),
        ));
    }

    // The catalog-level image count, when present, is the authoritative page
    // count; enumeration is checked against it downstream.
    let page_count = metadata
        .get("imagecount")
        .and_then(|c| {
            c.as_u64()
                .or_else(|| c.as_str().and_then(|s| s.parse().ok()))
        })
        .map(|c| c as usize)
        .unwrap_or(locators.len());

    Ok(Manifest {
        title,
        page_count,
        locators,
        metadata,
    })
}

/// Classify a transport-level send failure.
fn classify_send_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Transient(format!("request timed out: {e}"))
    } else if e.is_connect() {
        FetchError::Transient(format!("connection failed: {e}"))
    } else {
        FetchError::Transient(e.to_string())
    }
}

/// Classify a page-fetch response status.
///
/// 403 under an active loan means the loan no longer authorizes fetches,
/// which is its own failure reason, distinct from transient network trouble.
fn classify_fetch_status(status: StatusCode) -> std::result::Result<(), FetchError> {
    if status.is_success() {
        return Ok(());
    }
    Err(match status {
        StatusCode::FORBIDDEN => FetchError::LoanExpired,
        StatusCode::NOT_FOUND => FetchError::Permanent("page not found".to_string()),
        StatusCode::TOO_MANY_REQUESTS => {
            FetchError::Transient("image server is rate-limiting".to_string())
        }
        s if s.is_server_error() => FetchError::Transient(format!("server error {s}")),
        s => FetchError::Permanent(format!("unexpected status {s}")),
    })
}
