use std::sync::Arc;

use anyhow::anyhow;
use chipp_http::{HttpClient, NoInterceptor};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::error;

use crate::store::{StateStore, WeatherCache};

/// How long a fetched forecast stays fresh.
const CACHE_TTL_MINUTES: i64 = 5;

#[derive(Debug, Deserialize)]
struct Forecast {
    properties: ForecastProperties,
}

#[derive(Debug, Deserialize)]
struct ForecastProperties {
    periods: Vec<ForecastPeriod>,
}

#[derive(Debug, Deserialize)]
struct ForecastPeriod {
    number: i64,
    temperature: f64,
}

/// Outdoor forecast lookup with a 5-minute cache in the state store's
/// auxiliary key. Failures fall back to the last cached value and are
/// never propagated to callers.
pub struct WeatherService {
    url: Option<String>,
    store: Arc<StateStore>,
    client: HttpClient<NoInterceptor>,
}

impl WeatherService {
    pub fn new(url: Option<String>, store: Arc<StateStore>) -> anyhow::Result<Self> {
        // Requests carry their own absolute URL; the base is never used.
        let client = HttpClient::new("http://0.0.0.0")
            .map_err(|err| anyhow!("failed to build weather http client: {err}"))?;
        Ok(Self { url, store, client })
    }

    /// First-period forecast temperature, or None when no URL is
    /// configured and nothing was ever fetched.
    pub async fn outdoor_temperature(&self) -> Option<f64> {
        let Some(url) = self.url.as_deref() else {
            return None;
        };

        let cached = match self.store.load_weather().await {
            Ok(cached) => cached,
            Err(err) => {
                error!("failed to load weather cache: {err:#}");
                None
            }
        };

        if let Some(cache) = &cached {
            if is_fresh(cache, Utc::now()) {
                return cache.outdoor_temp;
            }
        }

        match self.fetch_first_period(url).await {
            Ok(temperature) => {
                let cache = WeatherCache {
                    weather_ts: Utc::now().to_rfc3339(),
                    outdoor_temp: Some(temperature),
                };
                if let Err(err) = self.store.save_weather(&cache).await {
                    error!("failed to save weather cache: {err:#}");
                }
                Some(temperature)
            }
            Err(err) => {
                error!("weather lookup failed: {err:#}");
                cached.and_then(|cache| cache.outdoor_temp)
            }
        }
    }

    async fn fetch_first_period(&self, url: &str) -> anyhow::Result<f64> {
        let request = self
            .client
            .new_request_with_url(url)
            .map_err(|err| anyhow!("invalid weather url {url:?}: {err}"))?;

        let forecast: Forecast = self
            .client
            .perform_request(request, chipp_http::json::parse_json)
            .await
            .map_err(|err| anyhow!("weather request failed: {err}"))?;

        first_period_temperature(&forecast)
    }
}

fn first_period_temperature(forecast: &Forecast) -> anyhow::Result<f64> {
    forecast
        .properties
        .periods
        .iter()
        .find(|period| period.number == 1)
        .map(|period| period.temperature)
        .ok_or_else(|| anyhow!("forecast has no period number 1"))
}

fn is_fresh(cache: &WeatherCache, now: DateTime<Utc>) -> bool {
    let Ok(stamp) = DateTime::parse_from_rfc3339(&cache.weather_ts) else {
        return false;
    };
    now.signed_duration_since(stamp.with_timezone(&Utc)) <= Duration::minutes(CACHE_TTL_MINUTES)
}
