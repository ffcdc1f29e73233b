//! W3C WebDriver backed UI surface.
//!
//! Talks plain JSON over HTTP to chromedriver or geckodriver. Only the handful of
//! commands the harness needs are implemented.

use crate::ui::{UiError, UiSurface};
use log::{debug, info, warn};
use reqwest::{Client, ClientBuilder, Method};
use serde_json::{Value, json};
use std::time::Duration;

/// Key under which W3C drivers return element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const NO_SUCH_ELEMENT: &str = "no such element";
const STALE_ELEMENT: &str = "stale element reference";

#[derive(Debug)]
pub struct WebDriverSurface {
    client: Client,
    base_url: String,
    session_id: String,
}

fn capabilities(browser: &str, headless: bool) -> Value {
    match browser {
        "firefox" => {
            let args: Vec<&str> = if headless { vec!["-headless"] } else { vec![] };
            json!({
                "capabilities": {
                    "alwaysMatch": {
                        "browserName": "firefox",
                        "moz:firefoxOptions": { "args": args }
                    }
                }
            })
        }
        _ => {
            let mut args = vec!["--no-sandbox", "--disable-dev-shm-usage"];
            if headless {
                args.push("--headless=new");
            }
            json!({
                "capabilities": {
                    "alwaysMatch": {
                        "browserName": "chrome",
                        "goog:chromeOptions": { "args": args }
                    }
                }
            })
        }
    }
}

fn css_for(test_id: &str) -> String {
    format!("[data-testid=\"{}\"]", test_id.replace('"', "\\\""))
}

fn element_id(value: &Value) -> Result<String, UiError> {
    value
        .get(ELEMENT_KEY)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| UiError::Protocol(format!("missing element reference in {}", value)))
}

impl WebDriverSurface {
    /// Starts a new browser session on the WebDriver at `webdriver_url`.
    pub async fn connect(
        webdriver_url: &str,
        browser: &str,
        headless: bool,
        timeout: Duration,
    ) -> Result<Self, UiError> {
        let client = ClientBuilder::new().timeout(timeout).build()?;
        let base_url = webdriver_url.trim_end_matches('/').to_string();

        let response = client
            .post(format!("{}/session", base_url))
            .json(&capabilities(browser, headless))
            .send()
            .await?;
        let value = Self::read_value(response).await?;
        let session_id = value
            .get("sessionId")
            .and_then(|s| s.as_str())
            .ok_or_else(|| UiError::Protocol(format!("missing sessionId in {}", value)))?
            .to_string();

        info!("Started {} WebDriver session {}", browser, session_id);
        Ok(Self {
            client,
            base_url,
            session_id,
        })
    }

    /// Reuses a browser session that is already open, e.g. one left on a job's result page.
    pub async fn attach(
        webdriver_url: &str,
        session_id: &str,
        timeout: Duration,
    ) -> Result<Self, UiError> {
        let surface = Self {
            client: ClientBuilder::new().timeout(timeout).build()?,
            base_url: webdriver_url.trim_end_matches('/').to_string(),
            session_id: session_id.to_string(),
        };
        let current = surface.command(Method::GET, "url", None).await?;
        info!("Attached to WebDriver session {} at {}", session_id, current);
        Ok(surface)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Unwraps the `value` member of a W3C response, mapping error objects to `UiError`.
    async fn read_value(response: reqwest::Response) -> Result<Value, UiError> {
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| UiError::Protocol(format!("non-JSON response ({}): {}", status, e)))?;
        let value = body.get("value").cloned().unwrap_or(Value::Null);

        if !status.is_success() {
            let error = value
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown error")
                .to_string();
            let message = value
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or_default()
                .to_string();
            return Err(UiError::WebDriver {
                status: status.as_u16(),
                error,
                message,
            });
        }
        Ok(value)
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, UiError> {
        let url = format!("{}/session/{}/{}", self.base_url, self.session_id, path);
        debug!("{} {}", method, url);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        Self::read_value(response).await
    }

    async fn find(&self, css: &str) -> Result<Option<String>, UiError> {
        let body = json!({ "using": "css selector", "value": css });
        match self.command(Method::POST, "element", Some(body)).await {
            Ok(value) => element_id(&value).map(Some),
            Err(e) if e.webdriver_code() == Some(NO_SUCH_ELEMENT) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn find_all(&self, css: &str) -> Result<Vec<String>, UiError> {
        let body = json!({ "using": "css selector", "value": css });
        let value = self.command(Method::POST, "elements", Some(body)).await?;
        let items = value
            .as_array()
            .ok_or_else(|| UiError::Protocol(format!("expected element list, got {}", value)))?;
        items.iter().map(element_id).collect()
    }

    async fn require(&self, test_id: &str) -> Result<String, UiError> {
        self.find(&css_for(test_id))
            .await?
            .ok_or_else(|| UiError::NoSuchElement {
                test_id: test_id.to_string(),
            })
    }

    async fn click_element(&self, element: &str) -> Result<(), UiError> {
        self.command(Method::POST, &format!("element/{}/click", element), Some(json!({})))
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl UiSurface for WebDriverSurface {
    async fn open(&self, url: &str) -> Result<(), UiError> {
        self.command(Method::POST, "url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn is_visible(&self, test_id: &str) -> Result<bool, UiError> {
        let Some(element) = self.find(&css_for(test_id)).await? else {
            return Ok(false);
        };
        match self
            .command(Method::GET, &format!("element/{}/displayed", element), None)
            .await
        {
            Ok(value) => Ok(value.as_bool().unwrap_or(false)),
            // The page re-rendered between lookup and query.
            Err(e) if e.webdriver_code() == Some(STALE_ELEMENT) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn text(&self, test_id: &str) -> Result<Option<String>, UiError> {
        let Some(element) = self.find(&css_for(test_id)).await? else {
            return Ok(None);
        };
        let value = self
            .command(Method::GET, &format!("element/{}/text", element), None)
            .await?;
        Ok(Some(value.as_str().unwrap_or_default().trim().to_string()))
    }

    async fn fill(&self, test_id: &str, value: &str) -> Result<(), UiError> {
        let element = self.require(test_id).await?;
        self.command(Method::POST, &format!("element/{}/clear", element), Some(json!({})))
            .await?;
        self.command(
            Method::POST,
            &format!("element/{}/value", element),
            Some(json!({ "text": value })),
        )
        .await?;
        Ok(())
    }

    async fn select(&self, test_id: &str, value: &str) -> Result<(), UiError> {
        let css = format!(
            "{} option[value=\"{}\"]",
            css_for(test_id),
            value.replace('"', "\\\"")
        );
        let option = self
            .find(&css)
            .await?
            .ok_or_else(|| UiError::NoSuchElement {
                test_id: format!("{} option {}", test_id, value),
            })?;
        self.click_element(&option).await
    }

    async fn click(&self, test_id: &str) -> Result<(), UiError> {
        let element = self.require(test_id).await?;
        self.click_element(&element).await
    }

    async fn link_hrefs(&self, container_test_id: &str) -> Result<Vec<String>, UiError> {
        let links = self
            .find_all(&format!("{} a", css_for(container_test_id)))
            .await?;
        let mut hrefs = Vec::with_capacity(links.len());
        for link in links {
            let value = self
                .command(Method::GET, &format!("element/{}/attribute/href", link), None)
                .await?;
            if let Some(href) = value.as_str() {
                hrefs.push(href.to_string());
            }
        }
        Ok(hrefs)
    }

    async fn close(&self) -> Result<(), UiError> {
        let url = format!("{}/session/{}", self.base_url, self.session_id);
        match self.client.delete(&url).send().await {
            Ok(response) => {
                Self::read_value(response).await?;
                info!("Closed WebDriver session {}", self.session_id);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to close WebDriver session {}: {}", self.session_id, e);
                Err(e.into())
            }
        }
    }
}
