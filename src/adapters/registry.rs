//! ARES public-register gateway.

use crate::domain::model::{
    EntityKind, EntityRecord, OwnerKind, OwnerRecord, PROVENANCE_SHAREHOLDERS,
    PROVENANCE_STOCKHOLDERS,
};
use crate::domain::overrides::normalize_domestic_id;
use crate::domain::ports::RegistryGateway;
use crate::utils::error::{Result, UboError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const DEFAULT_ENDPOINT: &str =
    "https://ares.gov.cz/ekonomicke-subjekty-v-be/rest/ekonomicke-subjekty-vr/{id}";
pub const DEFAULT_PUBLIC_REGISTER_URL: &str =
    "https://or.justice.cz/ias/ui/rejstrik-$firma?ico={id}&jenPlatne=VSECHNY";
const MAX_BACKOFF: Duration = Duration::from_secs(6);

/// `[registry]` section of a case file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Lookup URL with an `{id}` placeholder.
    pub endpoint: String,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub min_interval_ms: u64,
    pub user_agent: String,
    pub public_register_url: Option<String>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_seconds: 20,
            retry_attempts: 4,
            retry_delay_ms: 700,
            min_interval_ms: 250,
            user_agent: concat!("ubo-resolver/", env!("CARGO_PKG_VERSION")).to_string(),
            public_register_url: Some(DEFAULT_PUBLIC_REGISTER_URL.to_string()),
        }
    }
}

impl RegistrySettings {
    pub fn url_for(&self, id: &str) -> String {
        self.endpoint.replace("{id}", id)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.retry_delay_ms.saturating_mul(factor)).min(MAX_BACKOFF)
    }
}

enum Attempt {
    Done(Value),
    Terminal(UboError),
    Retry(String),
}

/// [`RegistryGateway`] over the ARES VR REST API.
///
/// Answers are cached per identifier for the lifetime of the gateway, so an
/// entity shared by several branches costs one request.
pub struct AresGateway {
    client: Client,
    settings: RegistrySettings,
    last_request: Mutex<Option<Instant>>,
    cache: Mutex<HashMap<String, EntityRecord>>,
}

impl AresGateway {
    pub fn new(settings: RegistrySettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .user_agent(settings.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            settings,
            last_request: Mutex::new(None),
            cache: Mutex::new(HashMap::new()),
        })
    }

    async fn throttle(&self) {
        let min_interval = Duration::from_millis(self.settings.min_interval_ms);
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < min_interval {
                tokio::time::sleep(min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn attempt(&self, id: &str, url: &str) -> Attempt {
        let response = match self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Attempt::Retry(e.to_string()),
        };

        let status = response.status();
        if status.is_success() {
            return match response.json::<Value>().await {
                Ok(payload) => Attempt::Done(payload),
                Err(e) => Attempt::Terminal(UboError::RegistryPayload {
                    id: id.to_string(),
                    message: e.to_string(),
                }),
            };
        }
        if status == StatusCode::BAD_REQUEST || status == StatusCode::NOT_FOUND {
            return Attempt::Terminal(UboError::RegistryError {
                id: id.to_string(),
                code: status.as_u16().to_string(),
            });
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Attempt::Retry(format!("HTTP {}", status.as_u16()));
        }
        Attempt::Terminal(UboError::RegistryError {
            id: id.to_string(),
            code: status.as_u16().to_string(),
        })
    }

    async fn fetch(&self, id: &str) -> Result<Value> {
        let url = self.settings.url_for(id);
        let mut last_error = String::new();

        for attempt in 0..=self.settings.retry_attempts {
            self.throttle().await;
            tracing::debug!("🌐 GET {} (attempt {})", url, attempt + 1);
            match self.attempt(id, &url).await {
                Attempt::Done(payload) => return Ok(payload),
                Attempt::Terminal(e) => return Err(e),
                Attempt::Retry(reason) => {
                    if attempt < self.settings.retry_attempts {
                        let delay = self.settings.backoff(attempt);
                        tracing::debug!("🔁 {} for {}, retrying in {:?}", reason, id, delay);
                        tokio::time::sleep(delay).await;
                    }
                    last_error = reason;
                }
            }
        }

        Err(UboError::RegistryError {
            id: id.to_string(),
            code: format!("{} (retries exhausted)", last_error),
        })
    }
}

#[async_trait]
impl RegistryGateway for AresGateway {
    async fn get_entity(&self, normalized_id: &str) -> Result<EntityRecord> {
        if let Some(hit) = self.cache.lock().await.get(normalized_id) {
            tracing::debug!("📦 Cache hit for {}", normalized_id);
            return Ok(hit.clone());
        }
        let payload = self.fetch(normalized_id).await?;
        let record = extract_entity(normalized_id, &payload)?;
        self.cache
            .lock()
            .await
            .insert(normalized_id.to_string(), record.clone());
        Ok(record)
    }
}

fn is_current(entry: &Value) -> bool {
    entry.get("datumVymazu").map_or(true, Value::is_null)
}

fn text(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Current value of a historised list such as `obchodniJmeno`.
fn current_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Array(items) => items
            .iter()
            .find(|item| is_current(item))
            .or_else(|| items.first())
            .and_then(|item| text(item, "hodnota")),
        _ => None,
    }
}

fn primary_record(payload: &Value) -> Option<&Value> {
    let records = payload.get("zaznamy")?.as_array()?;
    records
        .iter()
        .find(|r| r.get("primarniZaznam").and_then(Value::as_bool) == Some(true))
        .or_else(|| records.first())
}

fn amount_text(field: &str, amount: &Value) -> Option<String> {
    let value = text(amount, "hodnota")?;
    let unit = text(amount, "typObnos").unwrap_or_default().to_uppercase();
    Some(match unit.as_str() {
        "PROCENTA" => format!("{}: {} PROCENTA", field, value),
        _ => format!("{}: {}", field, value),
    })
}

/// Share text of a member, e.g. `obchodni_podil: 50 PROCENTA, splaceno: 100 PROCENTA`.
fn share_text(member: &Value) -> Option<String> {
    let shares = member.get("podil").and_then(Value::as_array)?;
    let parts: Vec<String> = shares
        .iter()
        .filter(|share| is_current(share))
        .flat_map(|share| {
            let size = share
                .get("velikostPodilu")
                .and_then(|v| amount_text("obchodni_podil", v));
            let paid = share
                .get("splaceni")
                .and_then(|v| amount_text("splaceno", v));
            size.into_iter().chain(paid)
        })
        .collect();
    (!parts.is_empty()).then(|| parts.join(", "))
}

fn person_name(person: &Value) -> Option<String> {
    let parts: Vec<String> = ["titulPredJmenem", "jmeno", "prijmeni", "titulZaJmenem"]
        .iter()
        .filter_map(|key| text(person, key))
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}

fn owner_from_member(member: &Value, provenance: &str) -> Option<OwnerRecord> {
    let person = member.get("osoba").unwrap_or(member);
    let raw_share = share_text(member);

    if let Some(natural) = person.get("fyzickaOsoba") {
        let name = person_name(natural)?;
        return Some(OwnerRecord {
            kind: OwnerKind::Person,
            name,
            identifier: None,
            raw_share,
            share: None,
            provenance: provenance.to_string(),
        });
    }

    let legal = person.get("pravnickaOsoba")?;
    let name = current_value(legal.get("obchodniJmeno")).unwrap_or_else(|| "?".to_string());
    let domestic = text(legal, "ico").and_then(|id| normalize_domestic_id(&id));
    let (kind, identifier) = match domestic {
        Some(id) => (OwnerKind::Company, Some(id)),
        None => (
            OwnerKind::ForeignEntity,
            text(legal, "zahranicniIdentifikator").or_else(|| text(legal, "ico")),
        ),
    };
    Some(OwnerRecord {
        kind,
        name,
        identifier,
        raw_share,
        share: None,
        provenance: provenance.to_string(),
    })
}

/// Members of a `spolecnici` / `akcionari` list. Entries are either grouped
/// under a nested member key or listed flat.
fn members<'a>(record: &'a Value, list: &str, nested: &str) -> Vec<&'a Value> {
    let Some(groups) = record.get(list).and_then(Value::as_array) else {
        return Vec::new();
    };
    groups
        .iter()
        .filter(|group| is_current(group))
        .flat_map(|group| match group.get(nested).and_then(Value::as_array) {
            Some(inner) => inner.iter().collect::<Vec<_>>(),
            None => vec![group],
        })
        .filter(|member| is_current(member))
        .collect()
}

/// Reads an ARES VR payload into an [`EntityRecord`].
///
/// Only the primary record, the current business name and current
/// shareholders and stockholders are taken; deleted entries are skipped.
pub fn extract_entity(requested_id: &str, payload: &Value) -> Result<EntityRecord> {
    let record = primary_record(payload).ok_or_else(|| UboError::RegistryPayload {
        id: requested_id.to_string(),
        message: "payload has no records".to_string(),
    })?;

    let id = text(record, "ico")
        .or_else(|| text(payload, "icoId"))
        .and_then(|raw| normalize_domestic_id(&raw))
        .unwrap_or_else(|| requested_id.to_string());
    let name = current_value(record.get("obchodniJmeno"))
        .unwrap_or_else(|| format!("Company (reg. no. {})", id));

    let mut owners = Vec::new();
    for member in members(record, "spolecnici", "spolecnik") {
        owners.extend(owner_from_member(member, PROVENANCE_SHAREHOLDERS));
    }
    for member in members(record, "akcionari", "akcionar") {
        owners.extend(owner_from_member(member, PROVENANCE_STOCKHOLDERS));
    }

    tracing::debug!("📄 {} ({}): {} current owners", name, id, owners.len());
    Ok(EntityRecord {
        id,
        name,
        kind: EntityKind::Domestic,
        owners,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "icoId": "12345678",
            "zaznamy": [
                {
                    "primarniZaznam": false,
                    "obchodniJmeno": [{"hodnota": "Old Record s.r.o."}]
                },
                {
                    "primarniZaznam": true,
                    "ico": "12345678",
                    "obchodniJmeno": [
                        {"hodnota": "Former Name s.r.o.", "datumVymazu": "2019-01-01"},
                        {"hodnota": "Alpha s.r.o."}
                    ],
                    "spolecnici": [{
                        "spolecnik": [
                            {
                                "osoba": {"fyzickaOsoba": {"jmeno": "Jan", "prijmeni": "Novák"}},
                                "podil": [{
                                    "velikostPodilu": {"typObnos": "PROCENTA", "hodnota": "50"},
                                    "splaceni": {"typObnos": "PROCENTA", "hodnota": "100"}
                                }]
                            },
                            {
                                "osoba": {"pravnickaOsoba": {
                                    "ico": "1234567",
                                    "obchodniJmeno": "Beta a.s."
                                }},
                                "podil": [{"velikostPodilu": {"typObnos": "ZLOMEK", "hodnota": "1/2"}}]
                            },
                            {
                                "datumVymazu": "2020-05-05",
                                "osoba": {"fyzickaOsoba": {"jmeno": "Gone", "prijmeni": "Owner"}}
                            }
                        ]
                    }],
                    "akcionari": [{
                        "osoba": {"pravnickaOsoba": {
                            "obchodniJmeno": "Gamma Holdings Ltd",
                            "zahranicniIdentifikator": "HE 123"
                        }}
                    }]
                }
            ]
        })
    }

    fn fast_settings(server: &MockServer) -> RegistrySettings {
        RegistrySettings {
            endpoint: format!("{}/vr/{{id}}", server.base_url()),
            retry_attempts: 2,
            retry_delay_ms: 1,
            min_interval_ms: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_extract_entity_reads_current_owners() {
        let entity = extract_entity("12345678", &payload()).unwrap();

        assert_eq!(entity.id, "12345678");
        assert_eq!(entity.name, "Alpha s.r.o.");
        assert_eq!(entity.owners.len(), 3);

        let jan = &entity.owners[0];
        assert_eq!(jan.kind, OwnerKind::Person);
        assert_eq!(jan.name, "Jan Novák");
        assert_eq!(
            jan.raw_share.as_deref(),
            Some("obchodni_podil: 50 PROCENTA, splaceno: 100 PROCENTA")
        );

        let beta = &entity.owners[1];
        assert_eq!(beta.kind, OwnerKind::Company);
        assert_eq!(beta.identifier.as_deref(), Some("01234567"));
        assert_eq!(beta.raw_share.as_deref(), Some("obchodni_podil: 1/2"));

        let gamma = &entity.owners[2];
        assert_eq!(gamma.kind, OwnerKind::ForeignEntity);
        assert_eq!(gamma.provenance, PROVENANCE_STOCKHOLDERS);
        assert_eq!(gamma.raw_share, None);
    }

    #[test]
    fn test_extract_entity_without_records_fails() {
        let err = extract_entity("12345678", &json!({"zaznamy": []})).unwrap_err();
        assert!(matches!(err, UboError::RegistryPayload { .. }));
    }

    #[test]
    fn test_backoff_is_capped() {
        let settings = RegistrySettings::default();
        assert_eq!(settings.backoff(0), Duration::from_millis(700));
        assert_eq!(settings.backoff(1), Duration::from_millis(1400));
        assert_eq!(settings.backoff(10), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn test_get_entity_success_and_cache() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET).path("/vr/12345678");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(payload());
        });

        let gateway = AresGateway::new(fast_settings(&server)).unwrap();
        let first = gateway.get_entity("12345678").await.unwrap();
        let second = gateway.get_entity("12345678").await.unwrap();

        api_mock.assert_hits(1);
        assert_eq!(first, second);
        assert_eq!(first.name, "Alpha s.r.o.");
    }

    #[tokio::test]
    async fn test_get_entity_not_found_is_terminal() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET).path("/vr/87654321");
            then.status(404);
        });

        let gateway = AresGateway::new(fast_settings(&server)).unwrap();
        let err = gateway.get_entity("87654321").await.unwrap_err();

        api_mock.assert_hits(1);
        assert!(matches!(err, UboError::RegistryError { ref code, .. } if code == "404"));
    }

    #[tokio::test]
    async fn test_get_entity_retries_server_errors() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET).path("/vr/11111111");
            then.status(503);
        });

        let gateway = AresGateway::new(fast_settings(&server)).unwrap();
        let err = gateway.get_entity("11111111").await.unwrap_err();

        api_mock.assert_hits(3);
        assert!(err.to_string().contains("retries exhausted"));
    }
}
