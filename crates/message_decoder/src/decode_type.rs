use serde::{Deserialize, Serialize};
use std::fmt;

/// How message bodies are interpreted by the console
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeType {
    /// Bodies are shown as delivered; no schema involved
    #[default]
    #[serde(rename = "JSON")]
    Json,
    /// Raw buffers are decoded through a resolved protobuf type
    Protobuf,
}

impl fmt::Display for DecodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "JSON"),
            Self::Protobuf => write!(f, "Protobuf"),
        }
    }
}

impl std::str::FromStr for DecodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "protobuf" | "proto" => Ok(Self::Protobuf),
            _ => Err(format!("unknown decode type: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&DecodeType::Json).unwrap(), "\"JSON\"");
        assert_eq!(
            serde_json::to_string(&DecodeType::Protobuf).unwrap(),
            "\"Protobuf\""
        );
    }

    #[test]
    fn test_from_str() {
        assert_eq!("JSON".parse::<DecodeType>().unwrap(), DecodeType::Json);
        assert_eq!("protobuf".parse::<DecodeType>().unwrap(), DecodeType::Protobuf);
        assert!("avro".parse::<DecodeType>().is_err());
    }
}
