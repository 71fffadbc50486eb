//! Interceptor: an ordered list of pattern-matching synthetic responses
//! with optional use-count limits, checked ahead of both passthrough and
//! playback.

use serde_json::Value;
use ulid::Ulid;

#[derive(Debug, Clone)]
pub struct Intercept {
    pub id: Ulid,
    pub service: String,
    pub url_pattern: Option<String>,
    pub response: Value,
    pub times: Option<u32>,
    pub uses: u32,
}

#[derive(Debug, Default)]
pub struct Interceptor {
    intercepts: Vec<Intercept>,
}

impl Interceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an intercept at the end of the list, returning its id.
    pub fn register(&mut self, service: String, url_pattern: Option<String>, response: Value, times: Option<u32>) -> Ulid {
        let id = Ulid::new();
        self.intercepts.push(Intercept {
            id,
            service,
            url_pattern,
            response,
            times,
            uses: 0,
        });
        id
    }

    pub fn unregister(&mut self, id: Ulid) -> bool {
        let before = self.intercepts.len();
        self.intercepts.retain(|i| i.id != id);
        self.intercepts.len() != before
    }

    /// Walks the list in insertion order; the first intercept whose
    /// `service` matches exactly and whose `urlPattern` is absent or a
    /// substring of `payload.url` wins. Retires the intercept once its
    /// `times` budget is exhausted.
    pub fn match_command(&mut self, service: &str, payload: &Value) -> Option<Value> {
        let url = payload.get("url").and_then(Value::as_str);
        let position = self.intercepts.iter().position(|intercept| {
            intercept.service == service
                && match (&intercept.url_pattern, url) {
                    (None, _) => true,
                    (Some(pattern), Some(url)) => url.contains(pattern.as_str()),
                    (Some(_), None) => false,
                }
        })?;

        let intercept = &mut self.intercepts[position];
        intercept.uses += 1;
        let response = intercept.response.clone();
        let retire = intercept.times.is_some_and(|times| intercept.uses == times);
        if retire {
            self.intercepts.remove(position);
        }
        Some(response)
    }
}
