use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Registry of external MCP servers compiled into the binary.
const EMBEDDED_REGISTRY: &str = include_str!("resources/registry.json");

/// Root of a registry document: server name → descriptor, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRoot {
    #[serde(default, with = "document_order")]
    pub servers: Vec<(String, RegistryServerInfo)>,
}

/// (De)serialises a JSON object as an ordered list of entries.
mod document_order {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    use super::RegistryServerInfo;

    type Entries = Vec<(String, RegistryServerInfo)>;

    pub fn serialize<S: Serializer>(entries: &Entries, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (name, info) in entries {
            map.serialize_entry(name, info)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Entries, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = Entries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of server name to server descriptor")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Entries, A::Error> {
                let mut entries: Entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, info)) = access.next_entry::<String, RegistryServerInfo>()? {
                    match entries.iter_mut().find(|(existing, _)| *existing == name) {
                        Some(slot) => slot.1 = info,
                        None => entries.push((name, info)),
                    }
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// Static descriptor of one external MCP server.
///
/// Either `url` (remote HTTP transport) or `type = "stdio"` with `command`
/// (child process) must be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryServerInfo {
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub transport_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Merged over the inherited environment when spawning a stdio server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
}

/// How to reach a registry server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryTransport {
    Remote {
        url: String,
    },
    Stdio {
        command: String,
        args: Vec<String>,
        env: BTreeMap<String, String>,
    },
}

impl RegistryServerInfo {
    /// Resolve the transport for the server registered as `name`.
    pub fn transport(&self, name: &str) -> Result<RegistryTransport> {
        if let Some(url) = self.url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Ok(RegistryTransport::Remote {
                url: url.to_string(),
            });
        }

        match self.transport_type.as_deref() {
            Some(kind) if kind.eq_ignore_ascii_case("stdio") => {
                let command = self
                    .command
                    .as_deref()
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| {
                        Error::Configuration(format!(
                            "Registry server '{name}' does not have a valid command for stdio transport."
                        ))
                    })?;

                Ok(RegistryTransport::Stdio {
                    command: command.to_string(),
                    args: self.args.clone().unwrap_or_default(),
                    env: self.env.clone().unwrap_or_default(),
                })
            }
            _ => Err(Error::Configuration(format!(
                "Registry server '{name}' does not have a valid url or type for transport."
            ))),
        }
    }
}

impl RegistryRoot {
    pub fn parse(document: &str) -> Result<Self> {
        serde_json::from_str(document)
            .map_err(|e| Error::Configuration(format!("invalid registry document: {e}")))
    }

    /// The registry shipped inside the binary.
    pub fn embedded() -> Result<Self> {
        Self::parse(EMBEDDED_REGISTRY)
    }
}
