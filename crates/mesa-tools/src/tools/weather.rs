//! Weather tool - Mars weather from NASA's InSight Weather Service
//!
//! One GET per call. No retry, no caching, no schema validation: the parsed
//! body is handed back exactly as the service sent it. Data gaps are normal
//! upstream and are left for the model to explain.

use crate::registry::{Tool, ToolResult};
use mesa_core::config::DEFAULT_WEATHER_URL;
use mesa_core::{Error, Result, Secret};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

const SERVICE: &str = "insight_weather";
const LATEST: &str = "latest";
const MAX_ERROR_BODY: usize = 512;

pub struct WeatherTool {
    client: Client,
    api_key: Option<Secret>,
    endpoint: String,
}

impl WeatherTool {
    pub const NAME: &'static str = "get_mars_weather";

    pub fn new(api_key: Option<Secret>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            endpoint: DEFAULT_WEATHER_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = url.into();
        self
    }

    /// Query parameters for one request. `sol` is forwarded as-is unless it
    /// is the `latest` token.
    fn query<'a>(api_key: &'a Secret, sol: &'a str) -> Vec<(&'static str, &'a str)> {
        let mut params = vec![
            ("api_key", api_key.expose()),
            ("feedtype", "json"),
            ("ver", "1.0"),
        ];
        let sol = sol.trim();
        if !sol.is_empty() && !sol.eq_ignore_ascii_case(LATEST) {
            params.push(("sol", sol));
        }
        params
    }

    /// Fetch the weather record for `sol` ("latest" or a sol number).
    pub async fn fetch(&self, sol: &str) -> Result<Value> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::Config("NASA_API_KEY is not set".into()))?;

        debug!("{}: GET {} sol={}", Self::NAME, self.endpoint, sol);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&Self::query(api_key, sol))
            .send()
            .await
            .map_err(|e| Error::Connection(format!("{}: {}", SERVICE, e.without_url())))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Connection(format!("{}: {}", SERVICE, e.without_url())))?;

        if !status.is_success() {
            let mut body = body;
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
                body.truncate(cut);
            }
            warn!("{} returned {}", SERVICE, status);
            return Err(Error::remote_service(SERVICE, status.as_u16(), body));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// Accept `sol` as a string or a bare number; anything else means "latest".
fn sol_argument(args: &Value) -> String {
    match args.get("sol") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => LATEST.to_string(),
    }
}

#[async_trait::async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Fetch Mars weather data from NASA's InSight Weather Service. \
         Returns the raw sol summaries (temperature, pressure, wind, season)."
    }

    fn prompt(&self) -> &str {
        "Missing sensor readings in get_mars_weather results are normal power-management gaps, not failures."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sol": {
                    "type": "string",
                    "description": "Martian day (sol number) or 'latest'",
                    "default": LATEST
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let sol = sol_argument(&args);
        match self.fetch(&sol).await {
            Ok(record) => ToolResult::Json(record),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}
