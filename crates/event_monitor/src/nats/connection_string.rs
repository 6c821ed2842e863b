use common::domain::{DomainError, DomainResult};
use std::fmt;
use std::str::FromStr;

/// `Endpoint=<url>;EntityPath=<stream>[;SharedAccessKeyName=<user>;SharedAccessKey=<password>]`
///
/// Keys are case-insensitive and an `sb://` endpoint is read as `tls://`.
#[derive(Clone, PartialEq, Eq)]
pub struct BusConnectionString {
    pub endpoint: String,
    pub entity_path: String,
    pub key_name: Option<String>,
    pub key: Option<String>,
}

impl BusConnectionString {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let mut endpoint = None;
        let mut entity_path = None;
        let mut key_name = None;
        let mut key = None;

        for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((name, value)) = part.split_once('=') else {
                return Err(DomainError::InvalidConnectionString(format!(
                    "segment '{}' is not a key=value pair",
                    part
                )));
            };
            let value = value.trim().to_string();
            match name.trim().to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(normalize_endpoint(&value)),
                "entitypath" => entity_path = Some(value),
                "sharedaccesskeyname" => key_name = Some(value),
                "sharedaccesskey" => key = Some(value),
                _ => {}
            }
        }

        let endpoint = endpoint
            .filter(|e| !e.is_empty())
            .ok_or_else(|| DomainError::InvalidConnectionString("missing Endpoint".to_string()))?;
        let entity_path = entity_path.filter(|e| !e.is_empty()).ok_or_else(|| {
            DomainError::InvalidConnectionString("missing EntityPath".to_string())
        })?;

        Ok(Self {
            endpoint,
            entity_path,
            key_name,
            key,
        })
    }

    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.key_name, &self.key) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            _ => None,
        }
    }
}

impl FromStr for BusConnectionString {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// Keeps the shared key out of logs
impl fmt::Debug for BusConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusConnectionString")
            .field("endpoint", &self.endpoint)
            .field("entity_path", &self.entity_path)
            .field("key_name", &self.key_name)
            .field("key", &self.key.as_ref().map(|_| "***"))
            .finish()
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    match endpoint.strip_prefix("sb://") {
        Some(host) => format!("tls://{}", host),
        None => endpoint.to_string(),
    }
}
